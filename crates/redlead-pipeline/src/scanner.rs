//! Discovery: search Reddit for each monitor's keywords and store new posts
//! as `new` leads.
//!
//! A failed keyword search is logged and counted; it never blocks the other
//! keywords, and its cursor stays where it was so the next run searches the
//! same window again.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use redlead_core::{Campaign, Monitor, NewLead, PipelineSettings};
use redlead_db::{DbError, Store};
use redlead_reddit::{mentions_all_words, mentions_phrase, RedditPost};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::sources::SearchSource;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    /// Scan monitors even if their interval has not elapsed.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub monitors_scanned: usize,
    pub monitors_skipped: usize,
    pub keywords_searched: usize,
    pub keywords_failed: usize,
    pub posts_seen: usize,
    pub leads_created: usize,
}

#[derive(Debug, Default)]
struct KeywordOutcome {
    posts_seen: usize,
    leads_created: usize,
}

/// Run one discovery pass over every due monitor.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] only if the monitors cannot be listed.
/// Per-monitor and per-keyword failures are logged and counted.
pub async fn run_scan(
    store: &dyn Store,
    source: &dyn SearchSource,
    settings: &PipelineSettings,
    request: ScanRequest,
) -> Result<ScanSummary, PipelineError> {
    let monitors = store.list_active_monitors(request.organization_id).await?;
    let now = Utc::now();
    let mut summary = ScanSummary::default();

    for monitor in &monitors {
        if !request.force && !monitor.is_due(now) {
            summary.monitors_skipped += 1;
            continue;
        }

        if summary.monitors_scanned > 0 && settings.scan_batch_delay_ms > 0 {
            tokio::time::sleep(StdDuration::from_millis(settings.scan_batch_delay_ms)).await;
        }

        let campaign = match store.get_campaign(monitor.campaign_id).await {
            Ok(Some(campaign)) => campaign,
            Ok(None) => {
                tracing::warn!(
                    monitor_id = %monitor.id,
                    campaign_id = %monitor.campaign_id,
                    "monitor has no campaign; skipping"
                );
                summary.monitors_skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::error!(
                    monitor_id = %monitor.id,
                    error = %e,
                    "failed to load campaign; skipping monitor"
                );
                summary.monitors_skipped += 1;
                continue;
            }
        };

        scan_monitor(store, source, settings, &campaign, monitor, now, &mut summary).await;

        if let Err(e) = store.mark_monitor_scanned(monitor.id, now).await {
            tracing::warn!(monitor_id = %monitor.id, error = %e, "failed to mark monitor scanned");
        }
        summary.monitors_scanned += 1;
    }

    tracing::info!(
        monitors_scanned = summary.monitors_scanned,
        monitors_skipped = summary.monitors_skipped,
        keywords_failed = summary.keywords_failed,
        leads_created = summary.leads_created,
        "scan finished"
    );
    Ok(summary)
}

async fn scan_monitor(
    store: &dyn Store,
    source: &dyn SearchSource,
    settings: &PipelineSettings,
    campaign: &Campaign,
    monitor: &Monitor,
    now: DateTime<Utc>,
    summary: &mut ScanSummary,
) {
    // Futures are built eagerly (they stay lazy until polled) so the stream's type does not
    // carry the closure, which trips rustc's higher-ranked `Send` inference (rust#102211).
    let searches: Vec<_> = campaign
        .keywords
        .iter()
        .map(|keyword| async move {
            let result = source
                .search_new(keyword, &monitor.subreddits, settings.scan_result_limit)
                .await;
            (keyword, result)
        })
        .collect();
    let results: Vec<(&String, Result<Vec<RedditPost>, _>)> = stream::iter(searches)
        .buffer_unordered(settings.scan_concurrency.max(1))
        .collect()
        .await;

    for (keyword, result) in results {
        summary.keywords_searched += 1;
        let posts = match result {
            Ok(posts) => posts,
            Err(e) => {
                tracing::warn!(
                    campaign_id = %campaign.id,
                    keyword = %keyword,
                    error = %e,
                    "keyword search failed"
                );
                summary.keywords_failed += 1;
                continue;
            }
        };

        match store_keyword_results(store, settings, campaign, monitor, keyword, &posts, now).await
        {
            Ok(outcome) => {
                summary.posts_seen += outcome.posts_seen;
                summary.leads_created += outcome.leads_created;
            }
            Err(e) => {
                tracing::error!(
                    campaign_id = %campaign.id,
                    keyword = %keyword,
                    error = %e,
                    "failed to store keyword results"
                );
                summary.keywords_failed += 1;
            }
        }
    }
}

async fn store_keyword_results(
    store: &dyn Store,
    settings: &PipelineSettings,
    campaign: &Campaign,
    monitor: &Monitor,
    keyword: &str,
    posts: &[RedditPost],
    now: DateTime<Utc>,
) -> Result<KeywordOutcome, DbError> {
    let cursor = store.keyword_cursor(monitor.id, keyword).await?;
    let floor = cursor
        .unwrap_or_else(|| now - Duration::hours(i64::from(settings.initial_lookback_hours)));

    let mut outcome = KeywordOutcome::default();
    let mut newest: Option<DateTime<Utc>> = None;

    for post in posts {
        outcome.posts_seen += 1;
        newest = newest.max(Some(post.created_at));

        if post.created_at <= floor || !is_candidate(post, keyword, &campaign.excluded_keywords) {
            continue;
        }

        let lead = NewLead {
            campaign_id: campaign.id,
            organization_id: campaign.organization_id,
            source_id: post.id.clone(),
            subreddit: post.subreddit.clone(),
            author: post.author.clone(),
            title: post.title.clone(),
            body: post.body.clone(),
            permalink: post.permalink.clone(),
            matched_keyword: keyword.to_string(),
            posted_at: post.created_at,
        };
        if let Some(created) = store.insert_lead_if_new(&lead).await? {
            tracing::debug!(lead_id = %created.id, source_id = %created.source_id, "lead created");
            outcome.leads_created += 1;
        }
    }

    if let Some(newest) = newest {
        store
            .advance_keyword_cursor(monitor.id, keyword, newest)
            .await?;
    }
    Ok(outcome)
}

/// Whether a search hit is worth qualifying.
fn is_candidate(post: &RedditPost, keyword: &str, excluded: &[String]) -> bool {
    if post.is_removed || post.is_automoderator() {
        return false;
    }
    let text = post.text();
    mentions_all_words(&text, keyword) && !excluded.iter().any(|ex| mentions_phrase(&text, ex))
}
