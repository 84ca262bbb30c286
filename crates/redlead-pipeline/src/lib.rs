//! The lead pipeline stages: scan, qualify, enqueue, post, track
//! engagement and warm up accounts.
//!
//! Every stage is a free function over a [`redlead_db::Store`] and the
//! external-service traits in [`sources`], so the same code runs against
//! Postgres in production and [`redlead_db::MemoryStore`] in tests.

pub mod engagement;
pub mod enqueue;
pub mod error;
pub mod poster;
pub mod qualifier;
pub mod scanner;
pub mod sources;
pub mod warmup;

pub use engagement::{run_engagement_update, EngagementRequest};
pub use enqueue::enqueue_reply;
pub use error::PipelineError;
pub use poster::{run_post_queue, PostQueueRequest, PostSummary};
pub use qualifier::{run_qualify, QualifyRequest, StageSummary};
pub use scanner::{run_scan, ScanRequest, ScanSummary};
pub use sources::{EngagementSource, LeadEvaluator, Publisher, SearchSource};
pub use warmup::{run_warmup_enqueue, WarmupSummary};

/// Whole seconds as a chrono duration, saturating far beyond any configured value.
pub(crate) fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::from(u32::try_from(secs).unwrap_or(u32::MAX)))
}
