mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use redlead_ai::{OpenAiClient, OpenAiConfig};
use redlead_db::PgStore;
use redlead_pipeline::LeadEvaluator;
use redlead_reddit::{RedditClient, RedditConfig};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState, RedditHandles},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = redlead_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let auth = AuthState::from_env(matches!(
        config.env,
        redlead_core::Environment::Development
    ))?;

    let pool_config = redlead_db::PoolConfig::from_app_config(&config);
    let pool = redlead_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = redlead_db::run_migrations(&pool).await?;
    tracing::info!(applied, "database ready");

    let reddit = match RedditConfig::from_app_config(&config) {
        Ok(reddit_config) => Some(RedditHandles::from_client(RedditClient::new(
            reddit_config,
        )?)),
        Err(e) => {
            tracing::warn!(error = %e, "Reddit client disabled; Reddit-backed routes return 503");
            None
        }
    };
    let llm: Option<Arc<dyn LeadEvaluator>> = match OpenAiConfig::from_app_config(&config) {
        Ok(ai_config) => Some(Arc::new(OpenAiClient::new(ai_config)?)),
        Err(e) => {
            tracing::warn!(error = %e, "OpenAI client disabled; qualify and warm-up return 503");
            None
        }
    };

    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        settings: Arc::new(config.pipeline.clone()),
        reddit,
        llm,
    };

    let _scheduler = if config.scheduler_enabled {
        Some(scheduler::build_scheduler(state.clone()).await?)
    } else {
        None
    };

    let app = build_app(state, auth, default_rate_limit_state());

    tracing::info!(addr = %config.bind_addr, env = %config.env, "redlead-server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
