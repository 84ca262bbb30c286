//! Database operations for `posting_queue`.
//!
//! Every transition is guarded by the item's current status so that two
//! poster runs can never both own or both finish the same item.

use chrono::{DateTime, Utc};
use redlead_core::{NewQueueItem, PostingQueueItem, QueueStats, QueueStatus};
use sqlx::PgPool;
use uuid::Uuid;

use super::{guard_failure, parse_column};
use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
struct QueueRow {
    id: Uuid,
    reply_id: Uuid,
    account_id: Uuid,
    organization_id: Uuid,
    scheduled_for: DateTime<Utc>,
    priority: i16,
    status: String,
    retry_count: i32,
    max_attempts: i32,
    last_error: Option<String>,
    result_link: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<QueueRow> for PostingQueueItem {
    type Error = DbError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            reply_id: row.reply_id,
            account_id: row.account_id,
            organization_id: row.organization_id,
            scheduled_for: row.scheduled_for,
            priority: row.priority,
            status: parse_column("queue item", &row.status)?,
            retry_count: row.retry_count,
            max_attempts: row.max_attempts,
            last_error: row.last_error,
            result_link: row.result_link,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const QUEUE_COLUMNS: &str = "id, reply_id, account_id, organization_id, scheduled_for, priority, \
     status, retry_count, max_attempts, last_error, result_link, started_at, completed_at, \
     created_at, updated_at";

/// Counts one failed attempt: `pending` while attempts remain, `failed` otherwise.
const FAILED_ATTEMPT_SET: &str = "retry_count = retry_count + 1, \
     status = CASE WHEN retry_count + 1 >= max_attempts THEN 'failed' ELSE 'pending' END, \
     completed_at = CASE WHEN retry_count + 1 >= max_attempts THEN NOW() ELSE NULL END, \
     started_at = NULL, \
     updated_at = GREATEST(NOW(), created_at)";

pub(super) async fn enqueue(
    pool: &PgPool,
    item: &NewQueueItem,
) -> Result<PostingQueueItem, DbError> {
    let sql = format!(
        "INSERT INTO posting_queue \
             (id, reply_id, account_id, organization_id, scheduled_for, priority, max_attempts) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {QUEUE_COLUMNS}"
    );
    sqlx::query_as::<_, QueueRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(item.reply_id)
        .bind(item.account_id)
        .bind(item.organization_id)
        .bind(item.scheduled_for)
        .bind(item.priority)
        .bind(item.max_attempts)
        .fetch_one(pool)
        .await?
        .try_into()
}

pub(super) async fn get_queue_item(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<PostingQueueItem>, DbError> {
    let sql = format!("SELECT {QUEUE_COLUMNS} FROM posting_queue WHERE id = $1");
    let row = sqlx::query_as::<_, QueueRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(PostingQueueItem::try_from).transpose()
}

/// Claims the next due item: highest priority first, then earliest
/// `scheduled_for`.
pub(super) async fn claim_next_due(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Option<PostingQueueItem>, DbError> {
    let sql = format!(
        "UPDATE posting_queue SET \
             status = 'processing', \
             started_at = $1, \
             updated_at = GREATEST(NOW(), created_at) \
         WHERE id = ( \
             SELECT id FROM posting_queue \
             WHERE status = 'pending' AND scheduled_for <= $1 \
             ORDER BY priority DESC, scheduled_for ASC, created_at ASC \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED \
         ) \
         RETURNING {QUEUE_COLUMNS}"
    );
    let row = sqlx::query_as::<_, QueueRow>(&sql)
        .bind(now)
        .fetch_optional(pool)
        .await?;
    row.map(PostingQueueItem::try_from).transpose()
}

pub(super) async fn complete_item(
    pool: &PgPool,
    id: Uuid,
    result_link: &str,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE posting_queue SET \
             status = 'completed', result_link = $2, completed_at = $3, last_error = NULL, \
             updated_at = GREATEST(NOW(), created_at) \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(result_link)
    .bind(at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(processing_guard(pool, id).await);
    }
    Ok(())
}

pub(super) async fn retry_item(
    pool: &PgPool,
    id: Uuid,
    error: &str,
    next_attempt_at: DateTime<Utc>,
) -> Result<PostingQueueItem, DbError> {
    let sql = format!(
        "UPDATE posting_queue SET {FAILED_ATTEMPT_SET}, last_error = $2, scheduled_for = $3 \
         WHERE id = $1 AND status = 'processing' \
         RETURNING {QUEUE_COLUMNS}"
    );
    let row = sqlx::query_as::<_, QueueRow>(&sql)
        .bind(id)
        .bind(error)
        .bind(next_attempt_at)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => row.try_into(),
        None => Err(processing_guard(pool, id).await),
    }
}

pub(super) async fn fail_item(
    pool: &PgPool,
    id: Uuid,
    error: &str,
) -> Result<PostingQueueItem, DbError> {
    let sql = format!(
        "UPDATE posting_queue SET \
             status = 'failed', \
             retry_count = LEAST(retry_count + 1, max_attempts), \
             last_error = $2, \
             completed_at = NOW(), \
             started_at = NULL, \
             updated_at = GREATEST(NOW(), created_at) \
         WHERE id = $1 AND status = 'processing' \
         RETURNING {QUEUE_COLUMNS}"
    );
    let row = sqlx::query_as::<_, QueueRow>(&sql)
        .bind(id)
        .bind(error)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => row.try_into(),
        None => Err(processing_guard(pool, id).await),
    }
}

pub(super) async fn defer_item(
    pool: &PgPool,
    id: Uuid,
    until: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE posting_queue SET \
             status = 'pending', scheduled_for = $2, started_at = NULL, \
             updated_at = GREATEST(NOW(), created_at) \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(until)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(processing_guard(pool, id).await);
    }
    Ok(())
}

pub(super) async fn reclaim_stale_items(
    pool: &PgPool,
    started_before: DateTime<Utc>,
) -> Result<Vec<PostingQueueItem>, DbError> {
    let sql = format!(
        "UPDATE posting_queue SET {FAILED_ATTEMPT_SET}, \
             last_error = 'processing timed out' \
         WHERE status = 'processing' AND started_at < $1 \
         RETURNING {QUEUE_COLUMNS}"
    );
    let rows = sqlx::query_as::<_, QueueRow>(&sql)
        .bind(started_before)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(PostingQueueItem::try_from).collect()
}

pub(super) async fn queue_stats(pool: &PgPool) -> Result<QueueStats, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM posting_queue GROUP BY status",
    )
    .fetch_all(pool)
    .await?;

    let mut stats = QueueStats::default();
    for (status, count) in rows {
        match parse_column::<QueueStatus>("queue item", &status)? {
            QueueStatus::Pending => stats.pending = count,
            QueueStatus::Processing => stats.processing = count,
            QueueStatus::Completed => stats.completed = count,
            QueueStatus::Failed => stats.failed = count,
        }
    }
    Ok(stats)
}

async fn processing_guard(pool: &PgPool, id: Uuid) -> DbError {
    guard_failure(
        pool,
        "posting_queue",
        "queue item",
        id,
        QueueStatus::Processing.as_str(),
    )
    .await
}
