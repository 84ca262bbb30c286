//! Database operations for `generated_replies` and `engagement_snapshots`.

use chrono::{DateTime, Utc};
use redlead_core::{EngagementMetrics, NewReply, Reply, ReplyStatus};
use sqlx::PgPool;
use uuid::Uuid;

use super::{guard_failure, parse_column};
use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
struct ReplyRow {
    id: Uuid,
    organization_id: Uuid,
    campaign_id: Option<Uuid>,
    lead_id: Option<Uuid>,
    kind: String,
    target_id: String,
    subreddit: Option<String>,
    subject: Option<String>,
    body: String,
    status: String,
    posted_url: Option<String>,
    posted_id: Option<String>,
    error: Option<String>,
    score: Option<i32>,
    reply_count: Option<i32>,
    is_removed: bool,
    posted_at: Option<DateTime<Utc>>,
    metrics_updated_at: Option<DateTime<Utc>>,
    engagement_checked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReplyRow> for Reply {
    type Error = DbError;

    fn try_from(row: ReplyRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            organization_id: row.organization_id,
            campaign_id: row.campaign_id,
            lead_id: row.lead_id,
            kind: parse_column("reply", &row.kind)?,
            target_id: row.target_id,
            subreddit: row.subreddit,
            subject: row.subject,
            body: row.body,
            status: parse_column("reply", &row.status)?,
            posted_url: row.posted_url,
            posted_id: row.posted_id,
            error: row.error,
            score: row.score,
            reply_count: row.reply_count,
            is_removed: row.is_removed,
            posted_at: row.posted_at,
            metrics_updated_at: row.metrics_updated_at,
            engagement_checked_at: row.engagement_checked_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const REPLY_COLUMNS: &str = "id, organization_id, campaign_id, lead_id, kind, target_id, \
     subreddit, subject, body, status, posted_url, posted_id, error, score, reply_count, \
     is_removed, posted_at, metrics_updated_at, engagement_checked_at, created_at, updated_at";

pub(super) async fn insert_reply(pool: &PgPool, reply: &NewReply) -> Result<Reply, DbError> {
    let sql = format!(
        "INSERT INTO generated_replies \
             (id, organization_id, campaign_id, lead_id, kind, target_id, subreddit, subject, \
              body, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING {REPLY_COLUMNS}"
    );
    sqlx::query_as::<_, ReplyRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(reply.organization_id)
        .bind(reply.campaign_id)
        .bind(reply.lead_id)
        .bind(reply.kind.as_str())
        .bind(&reply.target_id)
        .bind(&reply.subreddit)
        .bind(&reply.subject)
        .bind(&reply.body)
        .bind(reply.status.as_str())
        .fetch_one(pool)
        .await?
        .try_into()
}

pub(super) async fn get_reply(pool: &PgPool, id: Uuid) -> Result<Option<Reply>, DbError> {
    let sql = format!("SELECT {REPLY_COLUMNS} FROM generated_replies WHERE id = $1");
    let row = sqlx::query_as::<_, ReplyRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(Reply::try_from).transpose()
}

pub(super) async fn transition_reply(
    pool: &PgPool,
    id: Uuid,
    from: ReplyStatus,
    to: ReplyStatus,
) -> Result<Reply, DbError> {
    if !from.can_transition_to(to) {
        return Err(DbError::InvalidTransition {
            entity: "reply",
            id,
            expected: from.as_str(),
        });
    }

    let sql = format!(
        "UPDATE generated_replies SET status = $3, updated_at = GREATEST(NOW(), created_at) \
         WHERE id = $1 AND status = $2 \
         RETURNING {REPLY_COLUMNS}"
    );
    let row = sqlx::query_as::<_, ReplyRow>(&sql)
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => row.try_into(),
        None => Err(guard_failure(pool, "generated_replies", "reply", id, from.as_str()).await),
    }
}

pub(super) async fn mark_reply_posted(
    pool: &PgPool,
    id: Uuid,
    posted_url: &str,
    posted_id: &str,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE generated_replies SET \
             status = 'posted', posted_url = $2, posted_id = $3, posted_at = $4, error = NULL, \
             updated_at = GREATEST(NOW(), created_at) \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .bind(posted_url)
    .bind(posted_id)
    .bind(at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(guard_failure(pool, "generated_replies", "reply", id, "queued").await);
    }
    Ok(())
}

pub(super) async fn mark_reply_failed(pool: &PgPool, id: Uuid, error: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE generated_replies SET \
             status = 'failed', error = $2, updated_at = GREATEST(NOW(), created_at) \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(guard_failure(pool, "generated_replies", "reply", id, "queued").await);
    }
    Ok(())
}

pub(super) async fn list_replies_for_engagement(
    pool: &PgPool,
    posted_before: DateTime<Utc>,
    stale_before: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<Reply>, DbError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let sql = format!(
        "SELECT {REPLY_COLUMNS} FROM generated_replies \
         WHERE status = 'posted' \
           AND kind IN ('comment', 'warmup') \
           AND posted_id IS NOT NULL \
           AND posted_at <= $1 \
           AND (engagement_checked_at IS NULL OR engagement_checked_at <= $2) \
         ORDER BY engagement_checked_at NULLS FIRST, posted_at \
         LIMIT $3"
    );
    let rows = sqlx::query_as::<_, ReplyRow>(&sql)
        .bind(posted_before)
        .bind(stale_before)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(Reply::try_from).collect()
}

/// Writes the latest counters onto the reply and appends an
/// `engagement_snapshots` row in one transaction.
pub(super) async fn record_engagement(
    pool: &PgPool,
    reply_id: Uuid,
    metrics: EngagementMetrics,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE generated_replies SET \
             score = $2, reply_count = $3, is_removed = $4, metrics_updated_at = $5, \
             engagement_checked_at = $5, \
             updated_at = GREATEST(NOW(), created_at) \
         WHERE id = $1 AND status = 'posted'",
    )
    .bind(reply_id)
    .bind(metrics.score)
    .bind(metrics.reply_count)
    .bind(metrics.is_removed)
    .bind(at)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(guard_failure(pool, "generated_replies", "reply", reply_id, "posted").await);
    }

    sqlx::query(
        "INSERT INTO engagement_snapshots (reply_id, score, reply_count, is_removed, captured_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(reply_id)
    .bind(metrics.score)
    .bind(metrics.reply_count)
    .bind(metrics.is_removed)
    .bind(at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub(super) async fn mark_engagement_checked(
    pool: &PgPool,
    reply_id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE generated_replies SET \
             engagement_checked_at = $2, \
             updated_at = GREATEST(NOW(), created_at) \
         WHERE id = $1 AND status = 'posted'",
    )
    .bind(reply_id)
    .bind(at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(guard_failure(pool, "generated_replies", "reply", reply_id, "posted").await);
    }
    Ok(())
}
