//! Domain types and configuration shared by every redlead crate.

pub mod app_config;
pub mod campaigns;
pub mod config;
pub mod models;
pub mod status;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, PipelineSettings};
pub use campaigns::{
    load_campaigns, parse_campaigns, AccountConfig, CampaignConfig, CampaignsFile,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use models::{
    Campaign, EngagementMetrics, Monitor, NewLead, NewQueueItem, NewReply, PostingQueueItem,
    PotentialLead, QualificationOutcome, QueueStats, RedditAccount, Reply,
};
pub use status::{LeadStatus, QueueStatus, ReplyKind, ReplyStatus};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read campaigns file {path}: {source}")]
    CampaignsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse campaigns file: {0}")]
    CampaignsFileParse(#[from] serde_yaml::Error),

    #[error("campaigns validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown {kind} status: {value}")]
    UnknownStatus { kind: &'static str, value: String },

    #[error("unknown reply kind: {0}")]
    UnknownReplyKind(String),
}
