//! Pipeline stage command handlers.
//!
//! Each handler builds the external clients its stage needs from the app
//! config and runs the stage once against Postgres.

use anyhow::Context;
use redlead_ai::{OpenAiClient, OpenAiConfig};
use redlead_core::AppConfig;
use redlead_db::PgStore;
use redlead_pipeline::{
    EngagementRequest, PostQueueRequest, PostSummary, QualifyRequest, ScanRequest, ScanSummary,
    StageSummary, WarmupSummary,
};
use redlead_reddit::{RedditClient, RedditConfig};
use uuid::Uuid;

fn reddit_client(config: &AppConfig) -> anyhow::Result<RedditClient> {
    let reddit_config =
        RedditConfig::from_app_config(config).context("Reddit client is not configured")?;
    Ok(RedditClient::new(reddit_config)?)
}

fn openai_client(config: &AppConfig) -> anyhow::Result<OpenAiClient> {
    let ai_config =
        OpenAiConfig::from_app_config(config).context("OpenAI client is not configured")?;
    Ok(OpenAiClient::new(ai_config)?)
}

pub(crate) async fn run_scan(
    store: &PgStore,
    config: &AppConfig,
    organization_id: Option<Uuid>,
    force: bool,
) -> anyhow::Result<ScanSummary> {
    let reddit = reddit_client(config)?;
    let request = ScanRequest {
        organization_id,
        force,
    };
    let summary = redlead_pipeline::run_scan(store, &reddit, &config.pipeline, request).await?;
    tracing::info!(leads_created = summary.leads_created, "scan finished");
    Ok(summary)
}

pub(crate) async fn run_qualify(
    store: &PgStore,
    config: &AppConfig,
    batch_size: Option<usize>,
    organization_id: Option<Uuid>,
) -> anyhow::Result<StageSummary> {
    let llm = openai_client(config)?;
    let request = QualifyRequest {
        batch_size,
        organization_id,
    };
    Ok(redlead_pipeline::run_qualify(store, &llm, &config.pipeline, request).await?)
}

pub(crate) async fn run_post(
    store: &PgStore,
    config: &AppConfig,
    batch_size: Option<usize>,
) -> anyhow::Result<PostSummary> {
    let reddit = reddit_client(config)?;
    let request = PostQueueRequest { batch_size };
    Ok(redlead_pipeline::run_post_queue(store, &reddit, &config.pipeline, request).await?)
}

pub(crate) async fn run_engagement(
    store: &PgStore,
    config: &AppConfig,
    batch_size: Option<usize>,
) -> anyhow::Result<StageSummary> {
    let reddit = reddit_client(config)?;
    let request = EngagementRequest { batch_size };
    Ok(redlead_pipeline::run_engagement_update(store, &reddit, &config.pipeline, request).await?)
}

pub(crate) async fn run_warmup(store: &PgStore, config: &AppConfig) -> anyhow::Result<WarmupSummary> {
    let reddit = reddit_client(config)?;
    let llm = openai_client(config)?;
    Ok(redlead_pipeline::run_warmup_enqueue(store, &reddit, &llm, &config.pipeline).await?)
}
