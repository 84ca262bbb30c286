//! Approval and scheduling of reply drafts.

use chrono::{DateTime, Utc};
use redlead_core::{
    NewQueueItem, PipelineSettings, PostingQueueItem, RedditAccount, Reply, ReplyStatus,
};
use redlead_db::{DbError, Store};
use uuid::Uuid;

use crate::error::PipelineError;

/// Approve a draft (if it is still `new`) and schedule it on the
/// organization's posting account.
///
/// `scheduled_for` defaults to now.
///
/// # Errors
///
/// - [`PipelineError::Db`] with `NotFound` for an unknown reply.
/// - [`PipelineError::Db`] with `InvalidTransition` when the reply is already
///   queued, posted or failed.
/// - [`PipelineError::NoActiveAccount`] when the organization has no active account.
pub async fn enqueue_reply(
    store: &dyn Store,
    settings: &PipelineSettings,
    reply_id: Uuid,
    scheduled_for: Option<DateTime<Utc>>,
) -> Result<PostingQueueItem, PipelineError> {
    let reply = store.get_reply(reply_id).await?.ok_or(DbError::NotFound {
        entity: "reply",
        id: reply_id,
    })?;
    if !matches!(reply.status, ReplyStatus::New | ReplyStatus::Approved) {
        return Err(DbError::InvalidTransition {
            entity: "reply",
            id: reply_id,
            expected: ReplyStatus::Approved.as_str(),
        }
        .into());
    }

    let account = store
        .active_account_for_organization(reply.organization_id)
        .await?
        .ok_or(PipelineError::NoActiveAccount(reply.organization_id))?;

    let reply = if reply.status == ReplyStatus::New {
        store
            .transition_reply(reply.id, ReplyStatus::New, ReplyStatus::Approved)
            .await?
    } else {
        reply
    };

    schedule_approved(
        store,
        settings,
        &reply,
        &account,
        scheduled_for.unwrap_or_else(Utc::now),
    )
    .await
}

/// Queue an `approved` reply on `account` (`approved → queued`) and create
/// its posting queue item.
pub(crate) async fn schedule_approved(
    store: &dyn Store,
    settings: &PipelineSettings,
    reply: &Reply,
    account: &RedditAccount,
    scheduled_for: DateTime<Utc>,
) -> Result<PostingQueueItem, PipelineError> {
    store
        .transition_reply(reply.id, ReplyStatus::Approved, ReplyStatus::Queued)
        .await?;

    let item = store
        .enqueue(&NewQueueItem {
            reply_id: reply.id,
            account_id: account.id,
            organization_id: reply.organization_id,
            scheduled_for,
            priority: reply.kind.default_priority(),
            max_attempts: i32::try_from(settings.post_max_attempts).unwrap_or(i32::MAX),
        })
        .await?;

    tracing::info!(
        reply_id = %reply.id,
        queue_item_id = %item.id,
        account = %account.username,
        kind = %reply.kind,
        scheduled_for = %item.scheduled_for,
        "reply enqueued"
    );
    Ok(item)
}
