//! Posting: publish due queue items through their Reddit account.
//!
//! Items are claimed one at a time so that a second, overlapping run only
//! ever picks up items this run has not claimed. A publish attempt that fails
//! transiently goes back to `pending` with a fixed delay until the item's
//! attempts are exhausted; a permanent failure fails the item at once.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use redlead_core::{
    PipelineSettings, PostingQueueItem, QueueStatus, RedditAccount, Reply, ReplyKind, ReplyStatus,
};
use redlead_db::{DbError, Store};
use redlead_reddit::PublishedThing;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::seconds;
use crate::sources::Publisher;

/// Link recorded for private messages, which have no public permalink.
const SENT_MESSAGES_URL: &str = "https://www.reddit.com/message/sent/";
/// How long a daily-capped account waits before its items are re-checked.
const DAILY_CAP_RECHECK_SECS: u64 = 3_600;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PostQueueRequest {
    /// Defaults to the configured batch size when absent.
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PostSummary {
    pub processed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    pub deferred: usize,
    pub reclaimed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Completed,
    Retried,
    Failed,
    Deferred,
}

/// Post up to `batch_size` due queue items.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if stale items cannot be reclaimed or the
/// next item cannot be claimed. Failures while handling a claimed item are
/// logged; the item is then reclaimed by a later run.
pub async fn run_post_queue(
    store: &dyn Store,
    publisher: &dyn Publisher,
    settings: &PipelineSettings,
    request: PostQueueRequest,
) -> Result<PostSummary, PipelineError> {
    let mut summary = PostSummary::default();
    let batch_size = request.batch_size.unwrap_or(settings.post_batch_size);

    let timeout = seconds(settings.processing_timeout_secs);
    let reclaimed = store.reclaim_stale_items(Utc::now() - timeout).await?;
    for item in &reclaimed {
        tracing::warn!(
            queue_item_id = %item.id,
            status = %item.status,
            retry_count = item.retry_count,
            "reclaimed stale processing item"
        );
        if item.status == QueueStatus::Failed {
            fail_reply_best_effort(store, item, "processing timed out").await;
        }
    }
    summary.reclaimed = reclaimed.len();

    let mut published_any = false;
    while summary.processed < batch_size {
        let Some(item) = store.claim_next_due(Utc::now()).await? else {
            break;
        };
        summary.processed += 1;

        match process_item(store, publisher, settings, &item, &mut published_any).await {
            Ok(ItemOutcome::Completed) => summary.completed += 1,
            Ok(ItemOutcome::Retried) => summary.retried += 1,
            Ok(ItemOutcome::Failed) => summary.failed += 1,
            Ok(ItemOutcome::Deferred) => summary.deferred += 1,
            Err(e) if e.is_invalid_transition() => {
                tracing::warn!(
                    queue_item_id = %item.id,
                    error = %e,
                    "queue item changed concurrently; skipping"
                );
            }
            Err(e) => {
                tracing::error!(
                    queue_item_id = %item.id,
                    error = %e,
                    "failed to process queue item"
                );
            }
        }
    }

    tracing::info!(
        processed = summary.processed,
        completed = summary.completed,
        retried = summary.retried,
        failed = summary.failed,
        deferred = summary.deferred,
        reclaimed = summary.reclaimed,
        "queue run finished"
    );
    Ok(summary)
}

async fn process_item(
    store: &dyn Store,
    publisher: &dyn Publisher,
    settings: &PipelineSettings,
    item: &PostingQueueItem,
    published_any: &mut bool,
) -> Result<ItemOutcome, DbError> {
    let Some(reply) = store.get_reply(item.reply_id).await? else {
        store.fail_item(item.id, "reply not found").await?;
        return Ok(ItemOutcome::Failed);
    };
    if reply.status != ReplyStatus::Queued {
        let error = format!("reply is {}, not queued", reply.status);
        store.fail_item(item.id, &error).await?;
        return Ok(ItemOutcome::Failed);
    }

    let account = match store.get_account(item.account_id).await? {
        Some(account) if account.is_active => account,
        _ => {
            let error = "posting account missing or inactive";
            let updated = store.fail_item(item.id, error).await?;
            fail_reply_best_effort(store, &updated, error).await;
            return Ok(ItemOutcome::Failed);
        }
    };

    let now = Utc::now();
    if let Some(until) = pacing_block(store, settings, &account, now).await? {
        tracing::info!(
            queue_item_id = %item.id,
            account = %account.username,
            until = %until,
            "account paced; deferring item"
        );
        store.defer_item(item.id, until).await?;
        return Ok(ItemOutcome::Deferred);
    }

    if *published_any && settings.post_delay_ms > 0 {
        tokio::time::sleep(StdDuration::from_millis(settings.post_delay_ms)).await;
    }
    *published_any = true;

    match publish(publisher, &account, &reply).await {
        Ok(thing) => {
            let at = Utc::now();
            store.complete_item(item.id, &thing.url, at).await?;
            if let Err(e) = store
                .mark_reply_posted(reply.id, &thing.url, &thing.fullname, at)
                .await
            {
                tracing::error!(
                    reply_id = %reply.id,
                    error = %e,
                    "posted but failed to mark reply"
                );
            }
            if let Err(e) = store.record_account_post(account.id, at).await {
                tracing::warn!(
                    account_id = %account.id,
                    error = %e,
                    "failed to record account post"
                );
            }
            tracing::info!(
                queue_item_id = %item.id,
                reply_id = %reply.id,
                kind = %reply.kind,
                url = %thing.url,
                "reply posted"
            );
            Ok(ItemOutcome::Completed)
        }
        Err(e) if e.is_transient() => {
            let next_attempt_at = Utc::now() + seconds(settings.post_retry_delay_secs);
            let updated = store
                .retry_item(item.id, &e.to_string(), next_attempt_at)
                .await?;
            if updated.status == QueueStatus::Failed {
                tracing::warn!(
                    queue_item_id = %item.id,
                    attempts = updated.retry_count,
                    error = %e,
                    "publish failed; attempts exhausted"
                );
                fail_reply_best_effort(store, &updated, &e.to_string()).await;
                Ok(ItemOutcome::Failed)
            } else {
                tracing::warn!(
                    queue_item_id = %item.id,
                    attempt = updated.retry_count,
                    next_attempt_at = %updated.scheduled_for,
                    error = %e,
                    "publish failed; will retry"
                );
                Ok(ItemOutcome::Retried)
            }
        }
        Err(e) => {
            tracing::warn!(queue_item_id = %item.id, error = %e, "publish failed permanently");
            let updated = store.fail_item(item.id, &e.to_string()).await?;
            fail_reply_best_effort(store, &updated, &e.to_string()).await;
            Ok(ItemOutcome::Failed)
        }
    }
}

/// The earliest time `account` may post again, if it may not post now.
async fn pacing_block(
    store: &dyn Store,
    settings: &PipelineSettings,
    account: &RedditAccount,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, DbError> {
    if let Some(last) = account.last_posted_at {
        let next_allowed = last + seconds(settings.post_min_interval_secs);
        if next_allowed > now {
            return Ok(Some(next_allowed));
        }
    }

    if settings.post_daily_limit > 0 {
        let posted = store
            .count_account_posts_since(account.id, now - Duration::hours(24))
            .await?;
        if posted >= i64::from(settings.post_daily_limit) {
            return Ok(Some(now + seconds(DAILY_CAP_RECHECK_SECS)));
        }
    }
    Ok(None)
}

async fn publish(
    publisher: &dyn Publisher,
    account: &RedditAccount,
    reply: &Reply,
) -> Result<PublishedThing, redlead_reddit::RedditError> {
    match reply.kind {
        ReplyKind::Comment | ReplyKind::Warmup => {
            publisher
                .submit_comment(&account.refresh_token, &reply.target_id, &reply.body)
                .await
        }
        ReplyKind::Dm => {
            let subject = reply.subject.as_deref().unwrap_or("Re: your post");
            publisher
                .send_message(&account.refresh_token, &reply.target_id, subject, &reply.body)
                .await?;
            Ok(PublishedThing {
                fullname: format!("dm:{}", reply.target_id),
                url: SENT_MESSAGES_URL.to_string(),
            })
        }
    }
}

async fn fail_reply_best_effort(store: &dyn Store, item: &PostingQueueItem, error: &str) {
    if let Err(e) = store.mark_reply_failed(item.reply_id, error).await {
        tracing::warn!(reply_id = %item.reply_id, error = %e, "failed to mark reply failed");
    }
}
