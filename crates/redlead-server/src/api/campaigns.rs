use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use redlead_core::{Campaign, LeadStatus, PotentialLead};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct LeadsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// Most recent leads of a campaign, optionally filtered by status.
pub(super) async fn list_leads(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<LeadsQuery>,
) -> Result<Json<ApiResponse<Vec<PotentialLead>>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<LeadStatus>)
        .transpose()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;

    let campaign = state
        .store
        .get_campaign(campaign_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    if campaign.is_none() {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            format!("campaign {campaign_id} not found"),
        ));
    }

    let leads = state
        .store
        .list_leads(campaign_id, status, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(req_id.0, leads))
}

pub(super) async fn pause_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Campaign>>, ApiError> {
    set_active(&state, req_id, campaign_id, false).await
}

pub(super) async fn resume_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Campaign>>, ApiError> {
    set_active(&state, req_id, campaign_id, true).await
}

async fn set_active(
    state: &AppState,
    req_id: RequestId,
    campaign_id: Uuid,
    active: bool,
) -> Result<Json<ApiResponse<Campaign>>, ApiError> {
    let campaign = state
        .store
        .set_campaign_active(campaign_id, active)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(campaign_id = %campaign.id, active, "campaign activity changed");
    Ok(ApiResponse::new(req_id.0, campaign))
}
