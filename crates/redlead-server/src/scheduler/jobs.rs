//! One function per scheduled stage. Failures are logged; the next tick
//! simply tries again.

use redlead_pipeline::{
    run_engagement_update, run_post_queue, run_qualify, run_scan, run_warmup_enqueue,
    EngagementRequest, PostQueueRequest, QualifyRequest, ScanRequest,
};

use crate::api::AppState;

pub(super) async fn scan(state: AppState) {
    let Some(reddit) = state.reddit.as_ref() else {
        return;
    };
    match run_scan(
        state.store.as_ref(),
        reddit.search.as_ref(),
        &state.settings,
        ScanRequest::default(),
    )
    .await
    {
        Ok(summary) => tracing::info!(
            leads_created = summary.leads_created,
            keywords_failed = summary.keywords_failed,
            "scheduler: scan complete"
        ),
        Err(e) => tracing::error!(error = %e, "scheduler: scan failed"),
    }
}

pub(super) async fn qualify(state: AppState) {
    let Some(llm) = state.llm.as_ref() else {
        return;
    };
    match run_qualify(
        state.store.as_ref(),
        llm.as_ref(),
        &state.settings,
        QualifyRequest::default(),
    )
    .await
    {
        Ok(summary) => tracing::info!(
            processed = summary.processed,
            qualified = summary.succeeded,
            "scheduler: qualify complete"
        ),
        Err(e) => tracing::error!(error = %e, "scheduler: qualify failed"),
    }
}

pub(super) async fn post(state: AppState) {
    let Some(reddit) = state.reddit.as_ref() else {
        return;
    };
    match run_post_queue(
        state.store.as_ref(),
        reddit.publisher.as_ref(),
        &state.settings,
        PostQueueRequest::default(),
    )
    .await
    {
        Ok(summary) => tracing::info!(
            completed = summary.completed,
            failed = summary.failed,
            "scheduler: post complete"
        ),
        Err(e) => tracing::error!(error = %e, "scheduler: post failed"),
    }
}

pub(super) async fn engagement(state: AppState) {
    let Some(reddit) = state.reddit.as_ref() else {
        return;
    };
    match run_engagement_update(
        state.store.as_ref(),
        reddit.engagement.as_ref(),
        &state.settings,
        EngagementRequest::default(),
    )
    .await
    {
        Ok(summary) => tracing::info!(
            updated = summary.succeeded,
            "scheduler: engagement complete"
        ),
        Err(e) => tracing::error!(error = %e, "scheduler: engagement failed"),
    }
}

pub(super) async fn warmup(state: AppState) {
    let (Some(reddit), Some(llm)) = (state.reddit.as_ref(), state.llm.as_ref()) else {
        return;
    };
    match run_warmup_enqueue(
        state.store.as_ref(),
        reddit.search.as_ref(),
        llm.as_ref(),
        &state.settings,
    )
    .await
    {
        Ok(summary) => tracing::info!(
            enqueued = summary.replies_enqueued,
            "scheduler: warm-up complete"
        ),
        Err(e) => tracing::error!(error = %e, "scheduler: warm-up failed"),
    }
}
