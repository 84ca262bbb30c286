//! Storage seam used by the pipeline stages.
//!
//! Every status-changing write is guarded by the expected current status. A
//! write whose guard does not match returns [`DbError::InvalidTransition`]
//! and changes nothing, which is how overlapping invocations are kept from
//! double-processing a record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redlead_core::{
    AccountConfig, Campaign, CampaignConfig, EngagementMetrics, LeadStatus, Monitor, NewLead,
    NewQueueItem, NewReply, PostingQueueItem, PotentialLead, QualificationOutcome, QueueStats,
    RedditAccount, Reply, ReplyStatus,
};
use uuid::Uuid;

use crate::DbError;

#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<(), DbError>;

    // -- campaigns & monitors ------------------------------------------------

    /// Create or update a campaign (keyed by organization + name) and its monitor.
    async fn upsert_campaign(&self, config: &CampaignConfig) -> Result<Campaign, DbError>;

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, DbError>;

    /// Pause or resume a campaign. Paused campaigns keep their leads.
    async fn set_campaign_active(&self, id: Uuid, active: bool) -> Result<Campaign, DbError>;

    /// Active monitors whose campaign is active, optionally for one organization.
    async fn list_active_monitors(
        &self,
        organization_id: Option<Uuid>,
    ) -> Result<Vec<Monitor>, DbError>;

    async fn mark_monitor_scanned(&self, monitor_id: Uuid, at: DateTime<Utc>)
        -> Result<(), DbError>;

    async fn keyword_cursor(
        &self,
        monitor_id: Uuid,
        keyword: &str,
    ) -> Result<Option<DateTime<Utc>>, DbError>;

    /// Move the keyword cursor forward; an older `seen_until` is ignored.
    async fn advance_keyword_cursor(
        &self,
        monitor_id: Uuid,
        keyword: &str,
        seen_until: DateTime<Utc>,
    ) -> Result<(), DbError>;

    // -- leads ---------------------------------------------------------------

    /// Insert a lead unless `(campaign_id, source_id)` already exists.
    ///
    /// Returns `None` when the lead was already known.
    async fn insert_lead_if_new(&self, lead: &NewLead) -> Result<Option<PotentialLead>, DbError>;

    /// Move up to `limit` `new` leads to `qualifying` and return them, oldest first.
    async fn claim_new_leads(
        &self,
        limit: usize,
        organization_id: Option<Uuid>,
    ) -> Result<Vec<PotentialLead>, DbError>;

    /// Leads left in `qualifying` since before `claimed_before` by a run that
    /// never finished. Each becomes `ignored` with
    /// [`crate::QUALIFICATION_TIMED_OUT`]; leads get one attempt only.
    async fn reclaim_stale_leads(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<Vec<PotentialLead>, DbError>;

    /// Return unprocessed `qualifying` leads to `new` so a later run can
    /// claim them again. Returns how many were released.
    async fn release_lead_claims(&self, lead_ids: &[Uuid]) -> Result<usize, DbError>;

    /// Write the qualification result onto a `qualifying` lead.
    async fn complete_qualification(
        &self,
        lead_id: Uuid,
        outcome: &QualificationOutcome,
    ) -> Result<PotentialLead, DbError>;

    async fn get_lead(&self, id: Uuid) -> Result<Option<PotentialLead>, DbError>;

    async fn list_leads(
        &self,
        campaign_id: Uuid,
        status: Option<LeadStatus>,
        limit: i64,
    ) -> Result<Vec<PotentialLead>, DbError>;

    // -- replies -------------------------------------------------------------

    async fn insert_reply(&self, reply: &NewReply) -> Result<Reply, DbError>;

    async fn get_reply(&self, id: Uuid) -> Result<Option<Reply>, DbError>;

    /// Guarded status change for the approval path (`new → approved → queued`).
    async fn transition_reply(
        &self,
        id: Uuid,
        from: ReplyStatus,
        to: ReplyStatus,
    ) -> Result<Reply, DbError>;

    async fn mark_reply_posted(
        &self,
        id: Uuid,
        posted_url: &str,
        posted_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError>;

    async fn mark_reply_failed(&self, id: Uuid, error: &str) -> Result<(), DbError>;

    /// Posted public replies older than `posted_before` that were never
    /// checked or last checked before `stale_before`, least recently checked
    /// first. Failed lookups count as checks.
    async fn list_replies_for_engagement(
        &self,
        posted_before: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reply>, DbError>;

    /// Store the latest counters on the reply and append a snapshot.
    async fn record_engagement(
        &self,
        reply_id: Uuid,
        metrics: EngagementMetrics,
        at: DateTime<Utc>,
    ) -> Result<(), DbError>;

    /// Stamp a lookup attempt that produced no metrics.
    async fn mark_engagement_checked(&self, reply_id: Uuid, at: DateTime<Utc>)
        -> Result<(), DbError>;

    // -- accounts ------------------------------------------------------------

    async fn upsert_account(
        &self,
        config: &AccountConfig,
        refresh_token: &str,
    ) -> Result<RedditAccount, DbError>;

    async fn get_account(&self, id: Uuid) -> Result<Option<RedditAccount>, DbError>;

    /// The posting account used for an organization's lead replies.
    async fn active_account_for_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<RedditAccount>, DbError>;

    async fn list_warmup_accounts(&self) -> Result<Vec<RedditAccount>, DbError>;

    async fn record_account_post(&self, account_id: Uuid, at: DateTime<Utc>)
        -> Result<(), DbError>;

    /// Completed posts by the account since `since`.
    async fn count_account_posts_since(
        &self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, DbError>;

    /// Warm-up items enqueued for the account since `since`.
    async fn count_warmups_enqueued_since(
        &self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, DbError>;

    // -- posting queue -------------------------------------------------------

    async fn enqueue(&self, item: &NewQueueItem) -> Result<PostingQueueItem, DbError>;

    async fn get_queue_item(&self, id: Uuid) -> Result<Option<PostingQueueItem>, DbError>;

    /// Claim the highest-priority due `pending` item (`pending → processing`).
    async fn claim_next_due(&self, now: DateTime<Utc>)
        -> Result<Option<PostingQueueItem>, DbError>;

    async fn complete_item(
        &self,
        id: Uuid,
        result_link: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError>;

    /// Count a failed attempt on a `processing` item. The item returns to
    /// `pending` at `next_attempt_at`, or becomes `failed` when that was its
    /// last allowed attempt. Callers inspect the returned status.
    async fn retry_item(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<PostingQueueItem, DbError>;

    /// Terminally fail a `processing` item, counting the attempt.
    async fn fail_item(&self, id: Uuid, error: &str) -> Result<PostingQueueItem, DbError>;

    /// Return a `processing` item to `pending` without counting an attempt.
    /// Used when account pacing blocked the post before anything was sent.
    async fn defer_item(&self, id: Uuid, until: DateTime<Utc>) -> Result<(), DbError>;

    /// Items stuck in `processing` since before `started_before` count one
    /// failed attempt each: they return to `pending`, or become `failed` when
    /// exhausted. Returns the updated items.
    async fn reclaim_stale_items(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<PostingQueueItem>, DbError>;

    async fn queue_stats(&self) -> Result<QueueStats, DbError>;
}
