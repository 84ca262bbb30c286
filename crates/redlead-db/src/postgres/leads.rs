//! Database operations for `potential_leads`.

use chrono::{DateTime, Utc};
use redlead_core::{LeadStatus, NewLead, PotentialLead, QualificationOutcome};
use sqlx::PgPool;
use uuid::Uuid;

use super::{guard_failure, parse_column};
use crate::{DbError, QUALIFICATION_TIMED_OUT};

#[derive(Debug, Clone, sqlx::FromRow)]
struct LeadRow {
    id: Uuid,
    campaign_id: Uuid,
    organization_id: Uuid,
    source_id: String,
    subreddit: String,
    author: String,
    title: String,
    body: String,
    permalink: String,
    matched_keyword: String,
    posted_at: DateTime<Utc>,
    status: String,
    relevance_score: Option<i16>,
    qualification_reasoning: Option<String>,
    qualification_error: Option<String>,
    qualified_at: Option<DateTime<Utc>>,
    claimed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LeadRow> for PotentialLead {
    type Error = DbError;

    fn try_from(row: LeadRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            campaign_id: row.campaign_id,
            organization_id: row.organization_id,
            source_id: row.source_id,
            subreddit: row.subreddit,
            author: row.author,
            title: row.title,
            body: row.body,
            permalink: row.permalink,
            matched_keyword: row.matched_keyword,
            posted_at: row.posted_at,
            status: parse_column("lead", &row.status)?,
            relevance_score: row.relevance_score,
            qualification_reasoning: row.qualification_reasoning,
            qualification_error: row.qualification_error,
            qualified_at: row.qualified_at,
            claimed_at: row.claimed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const LEAD_COLUMNS: &str = "id, campaign_id, organization_id, source_id, subreddit, author, \
     title, body, permalink, matched_keyword, posted_at, status, relevance_score, \
     qualification_reasoning, qualification_error, qualified_at, claimed_at, created_at, \
     updated_at";

fn convert(rows: Vec<LeadRow>) -> Result<Vec<PotentialLead>, DbError> {
    rows.into_iter().map(PotentialLead::try_from).collect()
}

/// Inserts a lead; a repeat of `(campaign_id, source_id)` is a no-op.
pub(super) async fn insert_lead_if_new(
    pool: &PgPool,
    lead: &NewLead,
) -> Result<Option<PotentialLead>, DbError> {
    let sql = format!(
        "INSERT INTO potential_leads \
             (id, campaign_id, organization_id, source_id, subreddit, author, title, body, \
              permalink, matched_keyword, posted_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (campaign_id, source_id) DO NOTHING \
         RETURNING {LEAD_COLUMNS}"
    );
    let row = sqlx::query_as::<_, LeadRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(lead.campaign_id)
        .bind(lead.organization_id)
        .bind(&lead.source_id)
        .bind(&lead.subreddit)
        .bind(&lead.author)
        .bind(&lead.title)
        .bind(&lead.body)
        .bind(&lead.permalink)
        .bind(&lead.matched_keyword)
        .bind(lead.posted_at)
        .fetch_optional(pool)
        .await?;
    row.map(PotentialLead::try_from).transpose()
}

/// Claims up to `limit` `new` leads by moving them to `qualifying`.
///
/// `SKIP LOCKED` lets two overlapping qualify runs split the backlog instead
/// of blocking on or double-claiming the same rows.
pub(super) async fn claim_new_leads(
    pool: &PgPool,
    limit: usize,
    organization_id: Option<Uuid>,
) -> Result<Vec<PotentialLead>, DbError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let sql = format!(
        "UPDATE potential_leads SET \
             status = 'qualifying', \
             claimed_at = NOW(), \
             updated_at = GREATEST(NOW(), created_at) \
         WHERE id IN ( \
             SELECT id FROM potential_leads \
             WHERE status = 'new' AND ($2::uuid IS NULL OR organization_id = $2) \
             ORDER BY created_at \
             LIMIT $1 \
             FOR UPDATE SKIP LOCKED \
         ) \
         RETURNING {LEAD_COLUMNS}"
    );
    let rows = sqlx::query_as::<_, LeadRow>(&sql)
        .bind(limit)
        .bind(organization_id)
        .fetch_all(pool)
        .await?;

    // RETURNING does not preserve the subquery order.
    let mut leads = convert(rows)?;
    leads.sort_by_key(|lead| lead.created_at);
    Ok(leads)
}

/// Expires `qualifying` claims older than `claimed_before` to `ignored`.
pub(super) async fn reclaim_stale_leads(
    pool: &PgPool,
    claimed_before: DateTime<Utc>,
) -> Result<Vec<PotentialLead>, DbError> {
    let sql = format!(
        "UPDATE potential_leads SET \
             status = 'ignored', \
             relevance_score = NULL, \
             qualification_reasoning = NULL, \
             qualification_error = $2, \
             qualified_at = NULL, \
             updated_at = GREATEST(NOW(), created_at) \
         WHERE status = 'qualifying' AND claimed_at < $1 \
         RETURNING {LEAD_COLUMNS}"
    );
    let rows = sqlx::query_as::<_, LeadRow>(&sql)
        .bind(claimed_before)
        .bind(QUALIFICATION_TIMED_OUT)
        .fetch_all(pool)
        .await?;
    convert(rows)
}

pub(super) async fn release_lead_claims(
    pool: &PgPool,
    lead_ids: &[Uuid],
) -> Result<usize, DbError> {
    let result = sqlx::query(
        "UPDATE potential_leads SET \
             status = 'new', \
             claimed_at = NULL, \
             updated_at = GREATEST(NOW(), created_at) \
         WHERE id = ANY($1) AND status = 'qualifying'",
    )
    .bind(lead_ids)
    .execute(pool)
    .await?;
    Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
}

pub(super) async fn complete_qualification(
    pool: &PgPool,
    lead_id: Uuid,
    outcome: &QualificationOutcome,
) -> Result<PotentialLead, DbError> {
    let (score, reasoning, error) = match outcome {
        QualificationOutcome::Qualified { score, reasoning }
        | QualificationOutcome::Ignored { score, reasoning } => {
            (Some(*score), Some(reasoning.as_str()), None)
        }
        QualificationOutcome::Errored { error } => (None, None, Some(error.as_str())),
    };
    let status = outcome.status();

    let sql = format!(
        "UPDATE potential_leads SET \
             status = $2, \
             relevance_score = $3, \
             qualification_reasoning = $4, \
             qualification_error = $5, \
             qualified_at = CASE WHEN $2 = 'qualified_lead' THEN NOW() ELSE NULL END, \
             updated_at = GREATEST(NOW(), created_at) \
         WHERE id = $1 AND status = 'qualifying' \
         RETURNING {LEAD_COLUMNS}"
    );
    let row = sqlx::query_as::<_, LeadRow>(&sql)
        .bind(lead_id)
        .bind(status.as_str())
        .bind(score)
        .bind(reasoning)
        .bind(error)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => row.try_into(),
        None => Err(guard_failure(
            pool,
            "potential_leads",
            "lead",
            lead_id,
            LeadStatus::Qualifying.as_str(),
        )
        .await),
    }
}

pub(super) async fn get_lead(pool: &PgPool, id: Uuid) -> Result<Option<PotentialLead>, DbError> {
    let sql = format!("SELECT {LEAD_COLUMNS} FROM potential_leads WHERE id = $1");
    let row = sqlx::query_as::<_, LeadRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(PotentialLead::try_from).transpose()
}

/// Newest first.
pub(super) async fn list_leads(
    pool: &PgPool,
    campaign_id: Uuid,
    status: Option<LeadStatus>,
    limit: i64,
) -> Result<Vec<PotentialLead>, DbError> {
    let sql = format!(
        "SELECT {LEAD_COLUMNS} FROM potential_leads \
         WHERE campaign_id = $1 AND ($2::text IS NULL OR status = $2) \
         ORDER BY created_at DESC \
         LIMIT $3"
    );
    let rows = sqlx::query_as::<_, LeadRow>(&sql)
        .bind(campaign_id)
        .bind(status.map(LeadStatus::as_str))
        .bind(limit)
        .fetch_all(pool)
        .await?;
    convert(rows)
}
