use axum::{extract::State, Extension, Json};
use redlead_core::QueueStats;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

pub(super) async fn queue_stats(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<QueueStats>>, ApiError> {
    let stats = state
        .store
        .queue_stats()
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(req_id.0, stats))
}
