//! Warm-up: keep posting accounts active in their communities with short,
//! non-promotional comments on hot posts.
//!
//! Warm-up replies are stored already approved and go through the regular
//! posting queue at the lowest priority.

use chrono::{DateTime, Duration, Utc};
use rand::seq::IndexedRandom;
use redlead_core::{NewReply, PipelineSettings, RedditAccount, Reply, ReplyKind, ReplyStatus};
use redlead_db::Store;
use redlead_reddit::RedditPost;
use serde::Serialize;

use crate::enqueue::schedule_approved;
use crate::error::PipelineError;
use crate::seconds;
use crate::sources::{LeadEvaluator, SearchSource};

/// Hot posts fetched per warm-up subreddit.
const HOT_POST_LIMIT: u32 = 25;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarmupSummary {
    pub accounts_considered: usize,
    pub accounts_at_limit: usize,
    pub accounts_failed: usize,
    pub replies_enqueued: usize,
    /// Warm-up replies that were written but could not be stored or queued.
    pub replies_failed: usize,
}

/// Generate and enqueue warm-up comments for every warm-up-enabled account
/// with daily capacity left.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] only if the accounts cannot be listed.
pub async fn run_warmup_enqueue(
    store: &dyn Store,
    source: &dyn SearchSource,
    writer: &dyn LeadEvaluator,
    settings: &PipelineSettings,
) -> Result<WarmupSummary, PipelineError> {
    let accounts = store.list_warmup_accounts().await?;
    let now = Utc::now();
    let mut summary = WarmupSummary::default();

    for account in &accounts {
        summary.accounts_considered += 1;

        let used = match store
            .count_warmups_enqueued_since(account.id, now - Duration::hours(24))
            .await
        {
            Ok(used) => used,
            Err(e) => {
                tracing::error!(
                    account_id = %account.id,
                    error = %e,
                    "failed to count warm-ups"
                );
                summary.accounts_failed += 1;
                continue;
            }
        };
        let remaining = usize::try_from(i64::from(account.warmup_daily_limit) - used).unwrap_or(0);
        if remaining == 0 {
            summary.accounts_at_limit += 1;
            continue;
        }

        match warm_up_account(store, source, writer, settings, account, remaining, now).await {
            Ok(outcome) => {
                summary.replies_enqueued += outcome.enqueued;
                summary.replies_failed += outcome.failed;
            }
            Err(e) => {
                tracing::warn!(account = %account.username, error = %e, "warm-up failed");
                summary.accounts_failed += 1;
            }
        }
    }

    tracing::info!(
        accounts = summary.accounts_considered,
        enqueued = summary.replies_enqueued,
        failed = summary.accounts_failed,
        replies_failed = summary.replies_failed,
        "warm-up enqueue finished"
    );
    Ok(summary)
}

#[derive(Debug, Default)]
struct AccountOutcome {
    enqueued: usize,
    failed: usize,
}

/// Only a failed hot-posts fetch aborts the account; per-post failures are
/// logged and counted so the remaining posts still get a chance.
async fn warm_up_account(
    store: &dyn Store,
    source: &dyn SearchSource,
    writer: &dyn LeadEvaluator,
    settings: &PipelineSettings,
    account: &RedditAccount,
    remaining: usize,
    now: DateTime<Utc>,
) -> Result<AccountOutcome, PipelineError> {
    let Some(subreddit) = pick_subreddit(&account.warmup_subreddits) else {
        return Ok(AccountOutcome::default());
    };

    let posts = source.hot_posts(&subreddit, HOT_POST_LIMIT).await?;

    let mut outcome = AccountOutcome::default();
    for post in posts.iter().filter(|p| is_warmup_target(p)) {
        if outcome.enqueued >= remaining {
            break;
        }

        let body = match writer
            .write_warmup_comment(&subreddit, &post.title, &post.body)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    post_id = %post.id,
                    error = %e,
                    "warm-up comment generation failed"
                );
                continue;
            }
        };

        let inserted = store
            .insert_reply(&NewReply {
                organization_id: account.organization_id,
                campaign_id: None,
                lead_id: None,
                kind: ReplyKind::Warmup,
                target_id: post.fullname(),
                subreddit: Some(subreddit.clone()),
                subject: None,
                body,
                status: ReplyStatus::Approved,
            })
            .await;
        let reply = match inserted {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(post_id = %post.id, error = %e, "failed to store warm-up reply");
                outcome.failed += 1;
                continue;
            }
        };

        let spacing = seconds(settings.warmup_spacing_secs)
            * i32::try_from(outcome.enqueued).unwrap_or(i32::MAX);
        match schedule_approved(store, settings, &reply, account, now + spacing).await {
            Ok(_) => outcome.enqueued += 1,
            Err(e) => {
                tracing::error!(reply_id = %reply.id, error = %e, "failed to queue warm-up reply");
                abandon_reply(store, &reply, &e).await;
                outcome.failed += 1;
            }
        }
    }

    Ok(outcome)
}

/// Close out a warm-up reply whose queue item was never created. The reply
/// is already `queued` unless the status transition itself failed, in which
/// case it stays `approved` and can be queued by hand.
async fn abandon_reply(store: &dyn Store, reply: &Reply, cause: &PipelineError) {
    if let Err(e) = store.mark_reply_failed(reply.id, &cause.to_string()).await {
        tracing::warn!(
            reply_id = %reply.id,
            error = %e,
            "warm-up reply left without a queue item"
        );
    }
}

fn pick_subreddit(subreddits: &[String]) -> Option<String> {
    subreddits.choose(&mut rand::rng()).cloned()
}

fn is_warmup_target(post: &RedditPost) -> bool {
    !post.is_removed && !post.is_closed && !post.is_automoderator()
}
