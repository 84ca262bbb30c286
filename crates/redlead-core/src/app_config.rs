use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Batch sizes, pacing and retry limits for the pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub scan_concurrency: usize,
    pub scan_batch_delay_ms: u64,
    pub scan_result_limit: u32,
    pub initial_lookback_hours: u32,
    pub qualify_batch_size: usize,
    pub post_batch_size: usize,
    pub post_max_attempts: u32,
    pub post_retry_delay_secs: u64,
    pub post_min_interval_secs: u64,
    pub post_daily_limit: u32,
    pub post_delay_ms: u64,
    pub processing_timeout_secs: u64,
    pub engagement_min_age_secs: u64,
    pub engagement_refresh_secs: u64,
    pub engagement_batch_size: usize,
    pub warmup_spacing_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            scan_concurrency: 3,
            scan_batch_delay_ms: 1_000,
            scan_result_limit: 25,
            initial_lookback_hours: 24,
            qualify_batch_size: 10,
            post_batch_size: 5,
            post_max_attempts: 3,
            post_retry_delay_secs: 600,
            post_min_interval_secs: 600,
            post_daily_limit: 10,
            post_delay_ms: 2_000,
            processing_timeout_secs: 900,
            engagement_min_age_secs: 3_600,
            engagement_refresh_secs: 21_600,
            engagement_batch_size: 25,
            warmup_spacing_secs: 1_800,
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub reddit_client_id: Option<String>,
    pub reddit_client_secret: Option<String>,
    pub reddit_user_agent: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub http_timeout_secs: u64,
    pub http_max_retries: u32,
    pub http_retry_backoff_base_ms: u64,
    pub scheduler_enabled: bool,
    pub pipeline: PipelineSettings,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("reddit_client_id", &self.reddit_client_id)
            .field(
                "reddit_client_secret",
                &self.reddit_client_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("reddit_user_agent", &self.reddit_user_agent)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("openai_model", &self.openai_model)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("http_max_retries", &self.http_max_retries)
            .field(
                "http_retry_backoff_base_ms",
                &self.http_retry_backoff_base_ms,
            )
            .field("scheduler_enabled", &self.scheduler_enabled)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
