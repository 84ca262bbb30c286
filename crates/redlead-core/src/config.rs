use crate::app_config::{AppConfig, Environment, PipelineSettings};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing is decoupled from the process environment so it can be tested with
/// a plain `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        match or_default(var, default).trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got '{other}'"))),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("REDLEAD_ENV", "development"));

    let bind_addr = or_default("REDLEAD_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("REDLEAD_BIND_ADDR", e))?;
    let log_level = or_default("REDLEAD_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("REDLEAD_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("REDLEAD_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("REDLEAD_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let reddit_client_id = optional("REDDIT_CLIENT_ID");
    let reddit_client_secret = optional("REDDIT_CLIENT_SECRET");
    let reddit_user_agent = or_default("REDDIT_USER_AGENT", "redlead/0.1 (lead-discovery)");
    let openai_api_key = optional("OPENAI_API_KEY");
    let openai_model = or_default("REDLEAD_OPENAI_MODEL", "gpt-4o-mini");

    let http_timeout_secs = parse_u64("REDLEAD_HTTP_TIMEOUT_SECS", "30")?;
    let http_max_retries = parse_u32("REDLEAD_HTTP_MAX_RETRIES", "3")?;
    let http_retry_backoff_base_ms = parse_u64("REDLEAD_HTTP_RETRY_BACKOFF_BASE_MS", "1000")?;
    let scheduler_enabled = parse_bool("REDLEAD_SCHEDULER_ENABLED", "false")?;

    let pipeline = PipelineSettings {
        scan_concurrency: parse_usize("REDLEAD_SCAN_CONCURRENCY", "3")?.max(1),
        scan_batch_delay_ms: parse_u64("REDLEAD_SCAN_BATCH_DELAY_MS", "1000")?,
        scan_result_limit: parse_u32("REDLEAD_SCAN_RESULT_LIMIT", "25")?.clamp(1, 100),
        initial_lookback_hours: parse_u32("REDLEAD_INITIAL_LOOKBACK_HOURS", "24")?,
        qualify_batch_size: parse_usize("REDLEAD_QUALIFY_BATCH_SIZE", "10")?,
        post_batch_size: parse_usize("REDLEAD_POST_BATCH_SIZE", "5")?,
        post_max_attempts: parse_u32("REDLEAD_POST_MAX_ATTEMPTS", "3")?,
        post_retry_delay_secs: parse_u64("REDLEAD_POST_RETRY_DELAY_SECS", "600")?,
        post_min_interval_secs: parse_u64("REDLEAD_POST_MIN_INTERVAL_SECS", "600")?,
        post_daily_limit: parse_u32("REDLEAD_POST_DAILY_LIMIT", "10")?,
        post_delay_ms: parse_u64("REDLEAD_POST_DELAY_MS", "2000")?,
        processing_timeout_secs: parse_u64("REDLEAD_PROCESSING_TIMEOUT_SECS", "900")?,
        engagement_min_age_secs: parse_u64("REDLEAD_ENGAGEMENT_MIN_AGE_SECS", "3600")?,
        engagement_refresh_secs: parse_u64("REDLEAD_ENGAGEMENT_REFRESH_SECS", "21600")?,
        engagement_batch_size: parse_usize("REDLEAD_ENGAGEMENT_BATCH_SIZE", "25")?,
        warmup_spacing_secs: parse_u64("REDLEAD_WARMUP_SPACING_SECS", "1800")?,
    };

    if pipeline.post_max_attempts == 0 {
        return Err(invalid(
            "REDLEAD_POST_MAX_ATTEMPTS",
            "must allow at least one attempt",
        ));
    }

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        reddit_client_id,
        reddit_client_secret,
        reddit_user_agent,
        openai_api_key,
        openai_model,
        http_timeout_secs,
        http_max_retries,
        http_retry_backoff_base_ms,
        scheduler_enabled,
        pipeline,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

impl AppConfig {
    /// Reddit app credentials, required by every stage that talks to Reddit.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] naming the first missing variable.
    pub fn reddit_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let id = self
            .reddit_client_id
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("REDDIT_CLIENT_ID".to_string()))?;
        let secret = self
            .reddit_client_secret
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("REDDIT_CLIENT_SECRET".to_string()))?;
        Ok((id, secret))
    }

    /// `OpenAI` key, required by the qualifier and warm-up stages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when `OPENAI_API_KEY` is unset.
    pub fn openai_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))
    }
}
