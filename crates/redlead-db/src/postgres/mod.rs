//! Postgres-backed [`Store`].
//!
//! Queries use runtime-checked `sqlx::query_as` so the crate builds without a
//! live database. Status columns are plain `TEXT` with `CHECK` constraints and
//! are parsed back into the core enums at the row boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redlead_core::{
    AccountConfig, Campaign, CampaignConfig, EngagementMetrics, LeadStatus, Monitor, NewLead,
    NewQueueItem, NewReply, PostingQueueItem, PotentialLead, QualificationOutcome, QueueStats,
    RedditAccount, Reply, ReplyStatus,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, Store};

mod accounts;
mod campaigns;
mod leads;
mod queue;
mod replies;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Parse a stored status/kind column, reporting bad values as corruption.
fn parse_column<T>(entity: &'static str, value: &str) -> Result<T, DbError>
where
    T: std::str::FromStr<Err = redlead_core::CoreError>,
{
    value.parse().map_err(|e: redlead_core::CoreError| DbError::Corrupt {
        entity,
        reason: e.to_string(),
    })
}

/// A guarded `UPDATE` matched nothing: tell a missing row apart from one in
/// the wrong status.
async fn guard_failure(
    pool: &PgPool,
    table: &'static str,
    entity: &'static str,
    id: Uuid,
    expected: &'static str,
) -> DbError {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)");
    match sqlx::query_scalar::<_, bool>(&sql)
        .bind(id)
        .fetch_one(pool)
        .await
    {
        Ok(true) => DbError::InvalidTransition {
            entity,
            id,
            expected,
        },
        Ok(false) => DbError::NotFound { entity, id },
        Err(e) => DbError::Sqlx(e),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> Result<(), DbError> {
        crate::ping(&self.pool).await.map_err(DbError::from)
    }

    async fn upsert_campaign(&self, config: &CampaignConfig) -> Result<Campaign, DbError> {
        campaigns::upsert_campaign(&self.pool, config).await
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, DbError> {
        campaigns::get_campaign(&self.pool, id).await
    }

    async fn set_campaign_active(&self, id: Uuid, active: bool) -> Result<Campaign, DbError> {
        campaigns::set_campaign_active(&self.pool, id, active).await
    }

    async fn list_active_monitors(
        &self,
        organization_id: Option<Uuid>,
    ) -> Result<Vec<Monitor>, DbError> {
        campaigns::list_active_monitors(&self.pool, organization_id).await
    }

    async fn mark_monitor_scanned(
        &self,
        monitor_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        campaigns::mark_monitor_scanned(&self.pool, monitor_id, at).await
    }

    async fn keyword_cursor(
        &self,
        monitor_id: Uuid,
        keyword: &str,
    ) -> Result<Option<DateTime<Utc>>, DbError> {
        campaigns::keyword_cursor(&self.pool, monitor_id, keyword).await
    }

    async fn advance_keyword_cursor(
        &self,
        monitor_id: Uuid,
        keyword: &str,
        seen_until: DateTime<Utc>,
    ) -> Result<(), DbError> {
        campaigns::advance_keyword_cursor(&self.pool, monitor_id, keyword, seen_until).await
    }

    async fn insert_lead_if_new(&self, lead: &NewLead) -> Result<Option<PotentialLead>, DbError> {
        leads::insert_lead_if_new(&self.pool, lead).await
    }

    async fn claim_new_leads(
        &self,
        limit: usize,
        organization_id: Option<Uuid>,
    ) -> Result<Vec<PotentialLead>, DbError> {
        leads::claim_new_leads(&self.pool, limit, organization_id).await
    }

    async fn reclaim_stale_leads(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<Vec<PotentialLead>, DbError> {
        leads::reclaim_stale_leads(&self.pool, claimed_before).await
    }

    async fn release_lead_claims(&self, lead_ids: &[Uuid]) -> Result<usize, DbError> {
        leads::release_lead_claims(&self.pool, lead_ids).await
    }

    async fn complete_qualification(
        &self,
        lead_id: Uuid,
        outcome: &QualificationOutcome,
    ) -> Result<PotentialLead, DbError> {
        leads::complete_qualification(&self.pool, lead_id, outcome).await
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<PotentialLead>, DbError> {
        leads::get_lead(&self.pool, id).await
    }

    async fn list_leads(
        &self,
        campaign_id: Uuid,
        status: Option<LeadStatus>,
        limit: i64,
    ) -> Result<Vec<PotentialLead>, DbError> {
        leads::list_leads(&self.pool, campaign_id, status, limit).await
    }

    async fn insert_reply(&self, reply: &NewReply) -> Result<Reply, DbError> {
        replies::insert_reply(&self.pool, reply).await
    }

    async fn get_reply(&self, id: Uuid) -> Result<Option<Reply>, DbError> {
        replies::get_reply(&self.pool, id).await
    }

    async fn transition_reply(
        &self,
        id: Uuid,
        from: ReplyStatus,
        to: ReplyStatus,
    ) -> Result<Reply, DbError> {
        replies::transition_reply(&self.pool, id, from, to).await
    }

    async fn mark_reply_posted(
        &self,
        id: Uuid,
        posted_url: &str,
        posted_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        replies::mark_reply_posted(&self.pool, id, posted_url, posted_id, at).await
    }

    async fn mark_reply_failed(&self, id: Uuid, error: &str) -> Result<(), DbError> {
        replies::mark_reply_failed(&self.pool, id, error).await
    }

    async fn list_replies_for_engagement(
        &self,
        posted_before: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reply>, DbError> {
        replies::list_replies_for_engagement(&self.pool, posted_before, stale_before, limit).await
    }

    async fn record_engagement(
        &self,
        reply_id: Uuid,
        metrics: EngagementMetrics,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        replies::record_engagement(&self.pool, reply_id, metrics, at).await
    }

    async fn mark_engagement_checked(
        &self,
        reply_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        replies::mark_engagement_checked(&self.pool, reply_id, at).await
    }

    async fn upsert_account(
        &self,
        config: &AccountConfig,
        refresh_token: &str,
    ) -> Result<RedditAccount, DbError> {
        accounts::upsert_account(&self.pool, config, refresh_token).await
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<RedditAccount>, DbError> {
        accounts::get_account(&self.pool, id).await
    }

    async fn active_account_for_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<RedditAccount>, DbError> {
        accounts::active_account_for_organization(&self.pool, organization_id).await
    }

    async fn list_warmup_accounts(&self) -> Result<Vec<RedditAccount>, DbError> {
        accounts::list_warmup_accounts(&self.pool).await
    }

    async fn record_account_post(
        &self,
        account_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        accounts::record_account_post(&self.pool, account_id, at).await
    }

    async fn count_account_posts_since(
        &self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        accounts::count_account_posts_since(&self.pool, account_id, since).await
    }

    async fn count_warmups_enqueued_since(
        &self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        accounts::count_warmups_enqueued_since(&self.pool, account_id, since).await
    }

    async fn enqueue(&self, item: &NewQueueItem) -> Result<PostingQueueItem, DbError> {
        queue::enqueue(&self.pool, item).await
    }

    async fn get_queue_item(&self, id: Uuid) -> Result<Option<PostingQueueItem>, DbError> {
        queue::get_queue_item(&self.pool, id).await
    }

    async fn claim_next_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<PostingQueueItem>, DbError> {
        queue::claim_next_due(&self.pool, now).await
    }

    async fn complete_item(
        &self,
        id: Uuid,
        result_link: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        queue::complete_item(&self.pool, id, result_link, at).await
    }

    async fn retry_item(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<PostingQueueItem, DbError> {
        queue::retry_item(&self.pool, id, error, next_attempt_at).await
    }

    async fn fail_item(&self, id: Uuid, error: &str) -> Result<PostingQueueItem, DbError> {
        queue::fail_item(&self.pool, id, error).await
    }

    async fn defer_item(&self, id: Uuid, until: DateTime<Utc>) -> Result<(), DbError> {
        queue::defer_item(&self.pool, id, until).await
    }

    async fn reclaim_stale_items(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<PostingQueueItem>, DbError> {
        queue::reclaim_stale_items(&self.pool, started_before).await
    }

    async fn queue_stats(&self) -> Result<QueueStats, DbError> {
        queue::queue_stats(&self.pool).await
    }
}
