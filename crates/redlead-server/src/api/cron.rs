//! Stage triggers called by an external cron (or by hand).
//!
//! Parameters come from the query string so that plain `POST`s without a
//! body work. Each handler returns the stage summary.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use redlead_pipeline::{
    run_engagement_update, run_post_queue, run_qualify, run_scan, run_warmup_enqueue,
    EngagementRequest, PostQueueRequest, PostSummary, QualifyRequest, ScanRequest, ScanSummary,
    StageSummary, WarmupSummary,
};

use crate::middleware::RequestId;

use super::{
    map_pipeline_error, normalize_batch_size, unavailable, ApiError, ApiResponse, AppState,
};

const REDDIT: &str = "Reddit client";
const OPENAI: &str = "OpenAI client";

pub(super) async fn scan(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(request): Query<ScanRequest>,
) -> Result<Json<ApiResponse<ScanSummary>>, ApiError> {
    let reddit = state
        .reddit
        .as_ref()
        .ok_or_else(|| unavailable(req_id.0.clone(), REDDIT))?;

    let summary = run_scan(
        state.store.as_ref(),
        reddit.search.as_ref(),
        &state.settings,
        request,
    )
    .await
    .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(req_id.0, summary))
}

pub(super) async fn qualify(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(mut request): Query<QualifyRequest>,
) -> Result<Json<ApiResponse<StageSummary>>, ApiError> {
    let llm = state
        .llm
        .as_ref()
        .ok_or_else(|| unavailable(req_id.0.clone(), OPENAI))?;
    request.batch_size = normalize_batch_size(request.batch_size);

    let summary = run_qualify(state.store.as_ref(), llm.as_ref(), &state.settings, request)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(req_id.0, summary))
}

pub(super) async fn process_queue(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(mut request): Query<PostQueueRequest>,
) -> Result<Json<ApiResponse<PostSummary>>, ApiError> {
    let reddit = state
        .reddit
        .as_ref()
        .ok_or_else(|| unavailable(req_id.0.clone(), REDDIT))?;
    request.batch_size = normalize_batch_size(request.batch_size);

    let summary = run_post_queue(
        state.store.as_ref(),
        reddit.publisher.as_ref(),
        &state.settings,
        request,
    )
    .await
    .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(req_id.0, summary))
}

pub(super) async fn update_engagement(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(mut request): Query<EngagementRequest>,
) -> Result<Json<ApiResponse<StageSummary>>, ApiError> {
    let reddit = state
        .reddit
        .as_ref()
        .ok_or_else(|| unavailable(req_id.0.clone(), REDDIT))?;
    request.batch_size = normalize_batch_size(request.batch_size);

    let summary = run_engagement_update(
        state.store.as_ref(),
        reddit.engagement.as_ref(),
        &state.settings,
        request,
    )
    .await
    .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(req_id.0, summary))
}

pub(super) async fn warmup(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<WarmupSummary>>, ApiError> {
    let reddit = state
        .reddit
        .as_ref()
        .ok_or_else(|| unavailable(req_id.0.clone(), REDDIT))?;
    let llm = state
        .llm
        .as_ref()
        .ok_or_else(|| unavailable(req_id.0.clone(), OPENAI))?;

    let summary = run_warmup_enqueue(
        state.store.as_ref(),
        reddit.search.as_ref(),
        llm.as_ref(),
        &state.settings,
    )
    .await
    .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(req_id.0, summary))
}
