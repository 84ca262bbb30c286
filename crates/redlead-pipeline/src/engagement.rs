//! Engagement tracking for posted public replies.

use chrono::Utc;
use redlead_core::{PipelineSettings, Reply};
use redlead_db::Store;
use serde::Deserialize;

use crate::error::PipelineError;
use crate::qualifier::StageSummary;
use crate::seconds;
use crate::sources::EngagementSource;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct EngagementRequest {
    /// Defaults to the configured batch size when absent.
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// Refresh score, reply count and removal state of posted comments.
///
/// `succeeded` counts refreshed replies, `skipped` replies that cannot be
/// looked up (no recorded comment id) and `failed` lookup or write errors.
/// Skipped and failed replies are still stamped as checked, so they wait a
/// full refresh interval before being tried again.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] only if the replies cannot be listed.
pub async fn run_engagement_update(
    store: &dyn Store,
    source: &dyn EngagementSource,
    settings: &PipelineSettings,
    request: EngagementRequest,
) -> Result<StageSummary, PipelineError> {
    let now = Utc::now();
    let batch_size = request.batch_size.unwrap_or(settings.engagement_batch_size);
    let replies = store
        .list_replies_for_engagement(
            now - seconds(settings.engagement_min_age_secs),
            now - seconds(settings.engagement_refresh_secs),
            batch_size,
        )
        .await?;

    let mut summary = StageSummary::default();
    for reply in &replies {
        summary.processed += 1;

        let Some((post_id, comment_id)) = comment_ids(reply) else {
            tracing::debug!(reply_id = %reply.id, "reply has no comment id; skipping");
            mark_checked(store, reply).await;
            summary.skipped += 1;
            continue;
        };

        let metrics = match source.fetch_comment_metrics(post_id, comment_id).await {
            Ok(metrics) => metrics,
            Err(e) => {
                tracing::warn!(reply_id = %reply.id, error = %e, "failed to fetch engagement");
                mark_checked(store, reply).await;
                summary.failed += 1;
                continue;
            }
        };

        match store.record_engagement(reply.id, metrics, Utc::now()).await {
            Ok(()) => {
                if metrics.is_removed {
                    tracing::info!(reply_id = %reply.id, "posted reply was removed");
                }
                summary.succeeded += 1;
            }
            Err(e) => {
                tracing::error!(reply_id = %reply.id, error = %e, "failed to record engagement");
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        processed = summary.processed,
        updated = summary.succeeded,
        failed = summary.failed,
        "engagement update finished"
    );
    Ok(summary)
}

/// Push a reply that produced no metrics behind the others in the refresh order.
async fn mark_checked(store: &dyn Store, reply: &Reply) {
    if let Err(e) = store.mark_engagement_checked(reply.id, Utc::now()).await {
        tracing::error!(reply_id = %reply.id, error = %e, "failed to stamp engagement check");
    }
}

/// Base-36 ids of the parent post and of the posted comment.
///
/// Only replies to posts (`t3_` parents) with a `t1_` comment id qualify.
fn comment_ids(reply: &Reply) -> Option<(&str, &str)> {
    let post_id = reply.target_id.strip_prefix("t3_")?;
    let comment_id = reply.posted_id.as_deref()?.strip_prefix("t1_")?;
    Some((post_id, comment_id))
}

#[cfg(test)]
mod tests {
    use redlead_core::{ReplyKind, ReplyStatus};
    use uuid::Uuid;

    use super::*;

    fn reply(target_id: &str, posted_id: Option<&str>) -> Reply {
        let now = Utc::now();
        Reply {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            campaign_id: None,
            lead_id: None,
            kind: ReplyKind::Comment,
            target_id: target_id.to_string(),
            subreddit: Some("startups".to_string()),
            subject: None,
            body: "hi".to_string(),
            status: ReplyStatus::Posted,
            posted_url: None,
            posted_id: posted_id.map(str::to_string),
            error: None,
            score: None,
            reply_count: None,
            is_removed: false,
            posted_at: Some(now),
            metrics_updated_at: None,
            engagement_checked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn comment_ids_strip_kind_prefixes() {
        let r = reply("t3_abc1", Some("t1_c9"));
        assert_eq!(comment_ids(&r), Some(("abc1", "c9")));
    }

    #[test]
    fn comment_ids_need_both_ids() {
        assert_eq!(comment_ids(&reply("t3_abc1", None)), None);
        assert_eq!(comment_ids(&reply("founder42", Some("dm:founder42"))), None);
    }
}
