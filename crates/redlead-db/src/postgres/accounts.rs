//! Database operations for `reddit_accounts` and per-account posting counts.

use chrono::{DateTime, Utc};
use redlead_core::{AccountConfig, RedditAccount};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

#[derive(Clone, sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    organization_id: Uuid,
    username: String,
    refresh_token: String,
    is_active: bool,
    warmup_enabled: bool,
    warmup_subreddits: Vec<String>,
    warmup_daily_limit: i32,
    last_posted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for RedditAccount {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            organization_id: row.organization_id,
            username: row.username,
            refresh_token: row.refresh_token,
            is_active: row.is_active,
            warmup_enabled: row.warmup_enabled,
            warmup_subreddits: row.warmup_subreddits,
            warmup_daily_limit: row.warmup_daily_limit,
            last_posted_at: row.last_posted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const ACCOUNT_COLUMNS: &str = "id, organization_id, username, refresh_token, is_active, \
     warmup_enabled, warmup_subreddits, warmup_daily_limit, last_posted_at, created_at, updated_at";

/// Upserts an account on `username`, replacing the stored refresh token.
pub(super) async fn upsert_account(
    pool: &PgPool,
    config: &AccountConfig,
    refresh_token: &str,
) -> Result<RedditAccount, DbError> {
    let sql = format!(
        "INSERT INTO reddit_accounts \
             (id, organization_id, username, refresh_token, warmup_enabled, warmup_subreddits, \
              warmup_daily_limit) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (username) DO UPDATE SET \
             organization_id    = EXCLUDED.organization_id, \
             refresh_token      = EXCLUDED.refresh_token, \
             warmup_enabled     = EXCLUDED.warmup_enabled, \
             warmup_subreddits  = EXCLUDED.warmup_subreddits, \
             warmup_daily_limit = EXCLUDED.warmup_daily_limit, \
             updated_at         = GREATEST(NOW(), reddit_accounts.created_at) \
         RETURNING {ACCOUNT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, AccountRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(config.organization_id)
        .bind(&config.username)
        .bind(refresh_token)
        .bind(config.warmup_enabled)
        .bind(&config.warmup_subreddits)
        .bind(config.warmup_daily_limit)
        .fetch_one(pool)
        .await?;
    Ok(row.into())
}

pub(super) async fn get_account(pool: &PgPool, id: Uuid) -> Result<Option<RedditAccount>, DbError> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM reddit_accounts WHERE id = $1");
    let row = sqlx::query_as::<_, AccountRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(RedditAccount::from))
}

/// The least recently used active account of the organization.
pub(super) async fn active_account_for_organization(
    pool: &PgPool,
    organization_id: Uuid,
) -> Result<Option<RedditAccount>, DbError> {
    let sql = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM reddit_accounts \
         WHERE organization_id = $1 AND is_active \
         ORDER BY last_posted_at NULLS FIRST, created_at \
         LIMIT 1"
    );
    let row = sqlx::query_as::<_, AccountRow>(&sql)
        .bind(organization_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(RedditAccount::from))
}

pub(super) async fn list_warmup_accounts(pool: &PgPool) -> Result<Vec<RedditAccount>, DbError> {
    let sql = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM reddit_accounts \
         WHERE is_active AND warmup_enabled \
         ORDER BY username"
    );
    let rows = sqlx::query_as::<_, AccountRow>(&sql)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(RedditAccount::from).collect())
}

pub(super) async fn record_account_post(
    pool: &PgPool,
    account_id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE reddit_accounts SET \
             last_posted_at = GREATEST(COALESCE(last_posted_at, $2), $2), \
             updated_at = GREATEST(NOW(), created_at) \
         WHERE id = $1",
    )
    .bind(account_id)
    .bind(at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound {
            entity: "account",
            id: account_id,
        });
    }
    Ok(())
}

pub(super) async fn count_account_posts_since(
    pool: &PgPool,
    account_id: Uuid,
    since: DateTime<Utc>,
) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM posting_queue \
         WHERE account_id = $1 AND status = 'completed' AND completed_at >= $2",
    )
    .bind(account_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub(super) async fn count_warmups_enqueued_since(
    pool: &PgPool,
    account_id: Uuid,
    since: DateTime<Utc>,
) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM posting_queue q \
         JOIN generated_replies r ON r.id = q.reply_id \
         WHERE q.account_id = $1 AND r.kind = 'warmup' AND q.created_at >= $2",
    )
    .bind(account_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
