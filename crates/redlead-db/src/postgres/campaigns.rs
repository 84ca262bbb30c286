//! Database operations for `campaigns`, `monitors` and `monitor_cursors`.

use chrono::{DateTime, Utc};
use redlead_core::{Campaign, CampaignConfig, Monitor};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
struct CampaignRow {
    id: Uuid,
    organization_id: Uuid,
    name: String,
    business_name: String,
    business_description: String,
    keywords: Vec<String>,
    excluded_keywords: Vec<String>,
    min_relevance_score: i16,
    auto_approve: bool,
    generate_dms: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CampaignRow> for Campaign {
    fn from(row: CampaignRow) -> Self {
        Self {
            id: row.id,
            organization_id: row.organization_id,
            name: row.name,
            business_name: row.business_name,
            business_description: row.business_description,
            keywords: row.keywords,
            excluded_keywords: row.excluded_keywords,
            min_relevance_score: row.min_relevance_score,
            auto_approve: row.auto_approve,
            generate_dms: row.generate_dms,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct MonitorRow {
    id: Uuid,
    campaign_id: Uuid,
    organization_id: Uuid,
    subreddits: Vec<String>,
    scan_interval_minutes: i32,
    last_scanned_at: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MonitorRow> for Monitor {
    fn from(row: MonitorRow) -> Self {
        Self {
            id: row.id,
            campaign_id: row.campaign_id,
            organization_id: row.organization_id,
            subreddits: row.subreddits,
            scan_interval_minutes: row.scan_interval_minutes,
            last_scanned_at: row.last_scanned_at,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const CAMPAIGN_COLUMNS: &str = "id, organization_id, name, business_name, business_description, \
     keywords, excluded_keywords, min_relevance_score, auto_approve, generate_dms, is_active, \
     created_at, updated_at";

// ---------------------------------------------------------------------------
// campaigns operations
// ---------------------------------------------------------------------------

/// Upserts a campaign on `(organization_id, name)` together with its monitor.
///
/// Re-seeding an existing campaign updates its settings but leaves
/// `is_active` alone, so a paused campaign stays paused.
pub(super) async fn upsert_campaign(
    pool: &PgPool,
    config: &CampaignConfig,
) -> Result<Campaign, DbError> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "INSERT INTO campaigns \
             (id, organization_id, name, business_name, business_description, keywords, \
              excluded_keywords, min_relevance_score, auto_approve, generate_dms) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (organization_id, name) DO UPDATE SET \
             business_name        = EXCLUDED.business_name, \
             business_description = EXCLUDED.business_description, \
             keywords             = EXCLUDED.keywords, \
             excluded_keywords    = EXCLUDED.excluded_keywords, \
             min_relevance_score  = EXCLUDED.min_relevance_score, \
             auto_approve         = EXCLUDED.auto_approve, \
             generate_dms         = EXCLUDED.generate_dms, \
             updated_at           = GREATEST(NOW(), campaigns.created_at) \
         RETURNING {CAMPAIGN_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CampaignRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(config.organization_id)
        .bind(&config.name)
        .bind(&config.business_name)
        .bind(&config.business_description)
        .bind(&config.keywords)
        .bind(&config.excluded_keywords)
        .bind(config.min_relevance_score)
        .bind(config.auto_approve)
        .bind(config.generate_dms)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO monitors (id, campaign_id, organization_id, subreddits, scan_interval_minutes) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (campaign_id) DO UPDATE SET \
             subreddits            = EXCLUDED.subreddits, \
             scan_interval_minutes = EXCLUDED.scan_interval_minutes, \
             updated_at            = GREATEST(NOW(), monitors.created_at)",
    )
    .bind(Uuid::new_v4())
    .bind(row.id)
    .bind(config.organization_id)
    .bind(&config.subreddits)
    .bind(config.scan_interval_minutes)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row.into())
}

pub(super) async fn get_campaign(pool: &PgPool, id: Uuid) -> Result<Option<Campaign>, DbError> {
    let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1");
    let row = sqlx::query_as::<_, CampaignRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Campaign::from))
}

/// Pauses or resumes a campaign and its monitor.
pub(super) async fn set_campaign_active(
    pool: &PgPool,
    id: Uuid,
    active: bool,
) -> Result<Campaign, DbError> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "UPDATE campaigns SET is_active = $2, updated_at = GREATEST(NOW(), created_at) \
         WHERE id = $1 RETURNING {CAMPAIGN_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CampaignRow>(&sql)
        .bind(id)
        .bind(active)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound {
            entity: "campaign",
            id,
        })?;

    sqlx::query(
        "UPDATE monitors SET is_active = $2, updated_at = GREATEST(NOW(), created_at) \
         WHERE campaign_id = $1",
    )
    .bind(id)
    .bind(active)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row.into())
}

// ---------------------------------------------------------------------------
// monitors operations
// ---------------------------------------------------------------------------

pub(super) async fn list_active_monitors(
    pool: &PgPool,
    organization_id: Option<Uuid>,
) -> Result<Vec<Monitor>, DbError> {
    let rows = sqlx::query_as::<_, MonitorRow>(
        "SELECT m.id, m.campaign_id, m.organization_id, m.subreddits, m.scan_interval_minutes, \
                m.last_scanned_at, m.is_active, m.created_at, m.updated_at \
         FROM monitors m \
         JOIN campaigns c ON c.id = m.campaign_id \
         WHERE m.is_active AND c.is_active \
           AND ($1::uuid IS NULL OR m.organization_id = $1) \
         ORDER BY m.last_scanned_at NULLS FIRST, m.created_at",
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Monitor::from).collect())
}

pub(super) async fn mark_monitor_scanned(
    pool: &PgPool,
    monitor_id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE monitors SET last_scanned_at = $2, updated_at = GREATEST(NOW(), created_at) \
         WHERE id = $1",
    )
    .bind(monitor_id)
    .bind(at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound {
            entity: "monitor",
            id: monitor_id,
        });
    }
    Ok(())
}

pub(super) async fn keyword_cursor(
    pool: &PgPool,
    monitor_id: Uuid,
    keyword: &str,
) -> Result<Option<DateTime<Utc>>, DbError> {
    let cursor = sqlx::query_scalar::<_, DateTime<Utc>>(
        "SELECT last_seen_at FROM monitor_cursors WHERE monitor_id = $1 AND keyword = $2",
    )
    .bind(monitor_id)
    .bind(keyword)
    .fetch_optional(pool)
    .await?;
    Ok(cursor)
}

pub(super) async fn advance_keyword_cursor(
    pool: &PgPool,
    monitor_id: Uuid,
    keyword: &str,
    seen_until: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO monitor_cursors (monitor_id, keyword, last_seen_at) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (monitor_id, keyword) DO UPDATE SET \
             last_seen_at = GREATEST(monitor_cursors.last_seen_at, EXCLUDED.last_seen_at), \
             updated_at   = NOW()",
    )
    .bind(monitor_id)
    .bind(keyword)
    .bind(seen_until)
    .execute(pool)
    .await?;
    Ok(())
}
