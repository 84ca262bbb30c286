mod campaigns;
mod cron;
mod queue;
mod replies;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use redlead_core::PipelineSettings;
use redlead_db::{DbError, Store};
use redlead_pipeline::{EngagementSource, LeadEvaluator, PipelineError, Publisher, SearchSource};
use redlead_reddit::RedditClient;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;
const MAX_BATCH_SIZE: usize = 100;

/// The Reddit-facing halves of the pipeline, usually all backed by one
/// [`RedditClient`].
#[derive(Clone)]
pub struct RedditHandles {
    pub search: Arc<dyn SearchSource>,
    pub publisher: Arc<dyn Publisher>,
    pub engagement: Arc<dyn EngagementSource>,
}

impl RedditHandles {
    #[must_use]
    pub fn from_client(client: RedditClient) -> Self {
        let client = Arc::new(client);
        Self {
            search: client.clone(),
            publisher: client.clone(),
            engagement: client,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub settings: Arc<PipelineSettings>,
    /// `None` when Reddit credentials are not configured.
    pub reddit: Option<RedditHandles>,
    /// `None` when no OpenAI key is configured.
    pub llm: Option<Arc<dyn LeadEvaluator>>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(request_id: String, data: T) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "service_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// `None` keeps the configured default for the stage.
pub(super) fn normalize_batch_size(batch_size: Option<usize>) -> Option<usize> {
    batch_size.map(|n| n.clamp(1, MAX_BATCH_SIZE))
}

pub(super) fn map_db_error(request_id: String, error: &DbError) -> ApiError {
    match error {
        DbError::NotFound { .. } => ApiError::new(request_id, "not_found", error.to_string()),
        DbError::InvalidTransition { .. } => {
            ApiError::new(request_id, "conflict", error.to_string())
        }
        _ => {
            tracing::error!(error = %error, "database query failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

pub(super) fn map_pipeline_error(request_id: String, error: &PipelineError) -> ApiError {
    match error {
        PipelineError::Db(e) => map_db_error(request_id, e),
        PipelineError::NoActiveAccount(_) => {
            ApiError::new(request_id, "conflict", error.to_string())
        }
        PipelineError::Reddit(e) => {
            tracing::error!(error = %e, "reddit request failed");
            ApiError::new(request_id, "internal_error", "reddit request failed")
        }
    }
}

pub(super) fn unavailable(request_id: String, service: &str) -> ApiError {
    ApiError::new(
        request_id,
        "service_unavailable",
        format!("{service} is not configured"),
    )
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/cron/scan", post(cron::scan))
        .route("/api/v1/cron/qualify", post(cron::qualify))
        .route("/api/v1/cron/process-queue", post(cron::process_queue))
        .route(
            "/api/v1/cron/update-engagement",
            post(cron::update_engagement),
        )
        .route("/api/v1/cron/warmup", post(cron::warmup))
        .route(
            "/api/v1/replies/{reply_id}/approve",
            post(replies::approve_reply),
        )
        .route(
            "/api/v1/campaigns/{campaign_id}/leads",
            get(campaigns::list_leads),
        )
        .route(
            "/api/v1/campaigns/{campaign_id}/pause",
            post(campaigns::pause_campaign),
        )
        .route(
            "/api/v1/campaigns/{campaign_id}/resume",
            post(campaigns::resume_campaign),
        )
        .route("/api/v1/queue/stats", get(queue::queue_stats))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use redlead_core::{
        AccountConfig, CampaignConfig, NewReply, ReplyKind, ReplyStatus,
    };
    use redlead_db::MemoryStore;
    use redlead_reddit::{RedditError, RedditPost};
    use tower::ServiceExt;
    use uuid::Uuid;

    struct EmptySearch;

    #[async_trait]
    impl SearchSource for EmptySearch {
        async fn search_new(
            &self,
            _query: &str,
            _subreddits: &[String],
            _limit: u32,
        ) -> Result<Vec<RedditPost>, RedditError> {
            Ok(Vec::new())
        }

        async fn hot_posts(
            &self,
            _subreddit: &str,
            _limit: u32,
        ) -> Result<Vec<RedditPost>, RedditError> {
            Ok(Vec::new())
        }
    }

    struct NoPublish;

    #[async_trait]
    impl Publisher for NoPublish {
        async fn submit_comment(
            &self,
            _refresh_token: &str,
            _parent_fullname: &str,
            _text: &str,
        ) -> Result<redlead_reddit::PublishedThing, RedditError> {
            Err(RedditError::Auth("not in tests".to_string()))
        }

        async fn send_message(
            &self,
            _refresh_token: &str,
            _to: &str,
            _subject: &str,
            _text: &str,
        ) -> Result<(), RedditError> {
            Err(RedditError::Auth("not in tests".to_string()))
        }
    }

    #[async_trait]
    impl EngagementSource for NoPublish {
        async fn fetch_comment_metrics(
            &self,
            _post_id: &str,
            _comment_id: &str,
        ) -> Result<redlead_core::EngagementMetrics, RedditError> {
            Err(RedditError::Auth("not in tests".to_string()))
        }
    }

    fn state_with(store: Arc<MemoryStore>, reddit: bool) -> AppState {
        let reddit = reddit.then(|| RedditHandles {
            search: Arc::new(EmptySearch),
            publisher: Arc::new(NoPublish),
            engagement: Arc::new(NoPublish),
        });
        AppState {
            store,
            settings: Arc::new(PipelineSettings {
                scan_batch_delay_ms: 0,
                post_delay_ms: 0,
                ..PipelineSettings::default()
            }),
            reddit,
            llm: None,
        }
    }

    fn open_app(state: AppState) -> Router {
        let auth = AuthState::from_secrets(std::iter::empty(), true).expect("auth");
        build_app(state, auth, default_rate_limit_state())
    }

    fn post_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json parse")
    }

    async fn seed_campaign(store: &MemoryStore, org: Uuid) -> redlead_core::Campaign {
        store
            .upsert_campaign(&CampaignConfig {
                organization_id: org,
                name: "dev-shop".to_string(),
                business_name: "Acme".to_string(),
                business_description: "Agency".to_string(),
                keywords: vec!["need developer".to_string()],
                excluded_keywords: vec![],
                subreddits: vec![],
                scan_interval_minutes: 60,
                min_relevance_score: 70,
                auto_approve: false,
                generate_dms: false,
            })
            .await
            .expect("campaign")
    }

    async fn seed_draft(store: &MemoryStore, org: Uuid) -> redlead_core::Reply {
        store
            .insert_reply(&NewReply {
                organization_id: org,
                campaign_id: None,
                lead_id: None,
                kind: ReplyKind::Comment,
                target_id: "t3_abc".to_string(),
                subreddit: None,
                subject: None,
                body: "hello".to_string(),
                status: ReplyStatus::New,
            })
            .await
            .expect("reply")
    }

    #[test]
    fn normalize_limit_applies_defaults_and_bounds() {
        assert_eq!(normalize_limit(None), 50);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(1_000)), 200);
        assert_eq!(normalize_limit(Some(25)), 25);
    }

    #[test]
    fn normalize_batch_size_clamps_only_when_given() {
        assert_eq!(normalize_batch_size(None), None);
        assert_eq!(normalize_batch_size(Some(0)), Some(1));
        assert_eq!(normalize_batch_size(Some(500)), Some(100));
    }

    #[test]
    fn api_error_validation_error_maps_to_bad_request() {
        let response = ApiError::new("req-1", "validation_error", "invalid input").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_ok_and_echoes_request_id() {
        let app = open_app(state_with(Arc::new(MemoryStore::new()), false));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
            Some("req-42")
        );
        let json = body_json(response).await;
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["meta"]["request_id"], "req-42");
    }

    #[tokio::test]
    async fn cron_routes_require_bearer_secret() {
        let auth = AuthState::from_secrets(["s3cret"], false).expect("auth");
        let app = build_app(
            state_with(Arc::new(MemoryStore::new()), true),
            auth,
            default_rate_limit_state(),
        );

        let denied = app
            .clone()
            .oneshot(post_request("/api/v1/cron/scan"))
            .await
            .expect("response");
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/cron/scan")
                    .header(header::AUTHORIZATION, "Bearer s3cret")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cron_scan_returns_summary() {
        let store = Arc::new(MemoryStore::new());
        seed_campaign(&store, Uuid::new_v4()).await;
        let app = open_app(state_with(store, true));

        let response = app
            .oneshot(post_request("/api/v1/cron/scan?force=true"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["monitors_scanned"], 1);
        assert_eq!(json["data"]["leads_created"], 0);
    }

    #[tokio::test]
    async fn stages_without_clients_are_unavailable() {
        let app = open_app(state_with(Arc::new(MemoryStore::new()), false));

        for uri in [
            "/api/v1/cron/process-queue",
            "/api/v1/cron/qualify",
            "/api/v1/cron/warmup",
        ] {
            let response = app
                .clone()
                .oneshot(post_request(uri))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{uri}");
            let json = body_json(response).await;
            assert_eq!(json["error"]["code"], "service_unavailable");
        }
    }

    #[tokio::test]
    async fn process_queue_with_empty_queue_reports_nothing_done() {
        let app = open_app(state_with(Arc::new(MemoryStore::new()), true));
        let response = app
            .oneshot(post_request("/api/v1/cron/process-queue?batch_size=500"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["processed"], 0);
    }

    #[tokio::test]
    async fn approve_reply_enqueues_and_then_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let org = Uuid::new_v4();
        store
            .upsert_account(
                &AccountConfig {
                    organization_id: org,
                    username: "acme_helper".to_string(),
                    refresh_token_env: "UNUSED".to_string(),
                    warmup_enabled: false,
                    warmup_subreddits: vec![],
                    warmup_daily_limit: 0,
                },
                "token",
            )
            .await
            .expect("account");
        let reply = seed_draft(&store, org).await;
        let app = open_app(state_with(store, false));
        let uri = format!("/api/v1/replies/{}/approve", reply.id);

        let first = app
            .clone()
            .oneshot(post_request(&uri))
            .await
            .expect("response");
        assert_eq!(first.status(), StatusCode::OK);
        let json = body_json(first).await;
        assert_eq!(json["data"]["status"], "pending");
        assert_eq!(json["data"]["reply_id"], reply.id.to_string());

        let second = app.oneshot(post_request(&uri)).await.expect("response");
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn approve_unknown_reply_is_not_found() {
        let app = open_app(state_with(Arc::new(MemoryStore::new()), false));
        let uri = format!("/api/v1/replies/{}/approve", Uuid::new_v4());
        let response = app.oneshot(post_request(&uri)).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn approve_without_account_is_conflict() {
        let store = Arc::new(MemoryStore::new());
        let reply = seed_draft(&store, Uuid::new_v4()).await;
        let app = open_app(state_with(store, false));
        let uri = format!("/api/v1/replies/{}/approve", reply.id);
        let response = app.oneshot(post_request(&uri)).await.expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn list_leads_validates_status() {
        let store = Arc::new(MemoryStore::new());
        let campaign = seed_campaign(&store, Uuid::new_v4()).await;
        let app = open_app(state_with(store, false));

        let bad = app
            .clone()
            .oneshot(get_request(&format!(
                "/api/v1/campaigns/{}/leads?status=hot",
                campaign.id
            )))
            .await
            .expect("response");
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        let json = body_json(bad).await;
        assert_eq!(json["error"]["code"], "validation_error");

        let ok = app
            .oneshot(get_request(&format!(
                "/api/v1/campaigns/{}/leads?status=new&limit=5",
                campaign.id
            )))
            .await
            .expect("response");
        assert_eq!(ok.status(), StatusCode::OK);
        let json = body_json(ok).await;
        assert_eq!(json["data"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn list_leads_for_unknown_campaign_is_not_found() {
        let app = open_app(state_with(Arc::new(MemoryStore::new()), false));
        let response = app
            .oneshot(get_request(&format!(
                "/api/v1/campaigns/{}/leads",
                Uuid::new_v4()
            )))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pause_and_resume_toggle_campaign() {
        let store = Arc::new(MemoryStore::new());
        let campaign = seed_campaign(&store, Uuid::new_v4()).await;
        let app = open_app(state_with(store.clone(), false));

        let paused = app
            .clone()
            .oneshot(post_request(&format!(
                "/api/v1/campaigns/{}/pause",
                campaign.id
            )))
            .await
            .expect("response");
        assert_eq!(paused.status(), StatusCode::OK);
        assert_eq!(body_json(paused).await["data"]["is_active"], false);
        assert!(store
            .list_active_monitors(None)
            .await
            .expect("monitors")
            .is_empty());

        let resumed = app
            .oneshot(post_request(&format!(
                "/api/v1/campaigns/{}/resume",
                campaign.id
            )))
            .await
            .expect("response");
        assert_eq!(body_json(resumed).await["data"]["is_active"], true);
    }

    #[tokio::test]
    async fn queue_stats_counts_statuses() {
        let app = open_app(state_with(Arc::new(MemoryStore::new()), false));
        let response = app
            .oneshot(get_request("/api/v1/queue/stats"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["pending"], 0);
        assert_eq!(json["data"]["failed"], 0);
    }
}
