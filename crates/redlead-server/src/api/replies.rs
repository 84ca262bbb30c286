use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use redlead_core::PostingQueueItem;
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_pipeline_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct ApproveQuery {
    /// RFC 3339 timestamp; posts as soon as possible when absent.
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Approve a reply draft and put it on the posting queue.
pub(super) async fn approve_reply(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(reply_id): Path<Uuid>,
    Query(query): Query<ApproveQuery>,
) -> Result<Json<ApiResponse<PostingQueueItem>>, ApiError> {
    let item = redlead_pipeline::enqueue_reply(
        state.store.as_ref(),
        &state.settings,
        reply_id,
        query.scheduled_for,
    )
    .await
    .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(req_id.0, item))
}
