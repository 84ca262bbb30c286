//! Live integration tests for redlead-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/redlead-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use chrono::{Duration, Utc};
use redlead_core::{
    AccountConfig, CampaignConfig, EngagementMetrics, LeadStatus, NewLead, NewQueueItem, NewReply,
    QualificationOutcome, QueueStatus, ReplyKind, ReplyStatus,
};
use redlead_db::{PgStore, Store, QUALIFICATION_TIMED_OUT};
use sqlx::PgPool;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn campaign_config(org: Uuid) -> CampaignConfig {
    CampaignConfig {
        organization_id: org,
        name: "Live campaign".to_string(),
        business_name: "Northwind".to_string(),
        business_description: "We build apps".to_string(),
        keywords: vec!["need developer".to_string()],
        excluded_keywords: vec!["hiring".to_string()],
        subreddits: vec!["startups".to_string()],
        scan_interval_minutes: 30,
        min_relevance_score: 70,
        auto_approve: false,
        generate_dms: true,
    }
}

fn account_config(org: Uuid) -> AccountConfig {
    AccountConfig {
        organization_id: org,
        username: "live_account".to_string(),
        refresh_token_env: "TOKEN".to_string(),
        warmup_enabled: true,
        warmup_subreddits: vec!["webdev".to_string()],
        warmup_daily_limit: 2,
    }
}

fn new_lead(campaign_id: Uuid, org: Uuid, source_id: &str) -> NewLead {
    NewLead {
        campaign_id,
        organization_id: org,
        source_id: source_id.to_string(),
        subreddit: "startups".to_string(),
        author: "founder42".to_string(),
        title: "Need developer for MVP".to_string(),
        body: String::new(),
        permalink: format!("/r/startups/comments/{source_id}/"),
        matched_keyword: "need developer".to_string(),
        posted_at: Utc::now() - Duration::minutes(3),
    }
}

async fn queued_reply(store: &PgStore, org: Uuid, kind: ReplyKind) -> redlead_core::Reply {
    store
        .insert_reply(&NewReply {
            organization_id: org,
            campaign_id: None,
            lead_id: None,
            kind,
            target_id: "t3_live".to_string(),
            subreddit: Some("startups".to_string()),
            subject: None,
            body: "Happy to help".to_string(),
            status: ReplyStatus::Queued,
        })
        .await
        .unwrap_or_else(|e| panic!("insert reply failed: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn health_check_succeeds(pool: PgPool) {
    let store = PgStore::new(pool);
    store.health_check().await.expect("health check");
}

#[sqlx::test(migrations = "../../migrations")]
async fn campaign_upsert_creates_one_monitor(pool: PgPool) {
    let store = PgStore::new(pool);
    let org = Uuid::new_v4();

    let first = store.upsert_campaign(&campaign_config(org)).await.unwrap();
    let second = store.upsert_campaign(&campaign_config(org)).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.excluded_keywords, vec!["hiring".to_string()]);

    let monitors = store.list_active_monitors(Some(org)).await.unwrap();
    assert_eq!(monitors.len(), 1);
    assert_eq!(monitors[0].scan_interval_minutes, 30);

    store.set_campaign_active(first.id, false).await.unwrap();
    assert!(store.list_active_monitors(Some(org)).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn cursor_never_moves_backwards(pool: PgPool) {
    let store = PgStore::new(pool);
    let campaign = store
        .upsert_campaign(&campaign_config(Uuid::new_v4()))
        .await
        .unwrap();
    let monitor = store.list_active_monitors(None).await.unwrap()[0].clone();
    assert_eq!(monitor.campaign_id, campaign.id);

    let now = Utc::now();
    store
        .advance_keyword_cursor(monitor.id, "need developer", now)
        .await
        .unwrap();
    store
        .advance_keyword_cursor(monitor.id, "need developer", now - Duration::hours(2))
        .await
        .unwrap();

    let cursor = store
        .keyword_cursor(monitor.id, "need developer")
        .await
        .unwrap()
        .expect("cursor");
    // Postgres stores microseconds.
    assert!((cursor - now).num_milliseconds().abs() < 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn lead_insert_is_idempotent_and_qualification_guarded(pool: PgPool) {
    let store = PgStore::new(pool);
    let org = Uuid::new_v4();
    let campaign = store.upsert_campaign(&campaign_config(org)).await.unwrap();

    let lead = store
        .insert_lead_if_new(&new_lead(campaign.id, org, "p1"))
        .await
        .unwrap()
        .expect("first insert");
    assert!(store
        .insert_lead_if_new(&new_lead(campaign.id, org, "p1"))
        .await
        .unwrap()
        .is_none());

    let outcome = QualificationOutcome::Ignored {
        score: 20,
        reasoning: "not a buyer".to_string(),
    };
    let err = store
        .complete_qualification(lead.id, &outcome)
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());

    let claimed = store.claim_new_leads(5, Some(org)).await.unwrap();
    assert_eq!(claimed.len(), 1);
    let done = store.complete_qualification(lead.id, &outcome).await.unwrap();
    assert_eq!(done.status, LeadStatus::Ignored);
    assert_eq!(done.relevance_score, Some(20));

    let listed = store
        .list_leads(campaign.id, Some(LeadStatus::Ignored), 10)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let err = store
        .complete_qualification(Uuid::new_v4(), &outcome)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[sqlx::test(migrations = "../../migrations")]
async fn queue_lifecycle_respects_attempt_bound(pool: PgPool) {
    let store = PgStore::new(pool);
    let org = Uuid::new_v4();
    let account = store
        .upsert_account(&account_config(org), "refresh")
        .await
        .unwrap();
    let reply = queued_reply(&store, org, ReplyKind::Comment).await;
    let now = Utc::now();

    let item = store
        .enqueue(&NewQueueItem {
            reply_id: reply.id,
            account_id: account.id,
            organization_id: org,
            scheduled_for: now - Duration::minutes(1),
            priority: 10,
            max_attempts: 2,
        })
        .await
        .unwrap();

    store.claim_next_due(now).await.unwrap().expect("claim 1");
    assert!(store.claim_next_due(now).await.unwrap().is_none());
    let retried = store.retry_item(item.id, "timeout", now).await.unwrap();
    assert_eq!(retried.status, QueueStatus::Pending);

    store.claim_next_due(now).await.unwrap().expect("claim 2");
    let failed = store.retry_item(item.id, "timeout", now).await.unwrap();
    assert_eq!(failed.status, QueueStatus::Failed);
    assert_eq!(failed.retry_count, 2);

    let stats = store.queue_stats().await.unwrap();
    assert_eq!(stats.failed, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn completed_post_updates_reply_and_engagement(pool: PgPool) {
    let store = PgStore::new(pool);
    let org = Uuid::new_v4();
    let account = store
        .upsert_account(&account_config(org), "refresh")
        .await
        .unwrap();
    let reply = queued_reply(&store, org, ReplyKind::Warmup).await;
    let now = Utc::now();

    let item = store
        .enqueue(&NewQueueItem {
            reply_id: reply.id,
            account_id: account.id,
            organization_id: org,
            scheduled_for: now,
            priority: 0,
            max_attempts: 3,
        })
        .await
        .unwrap();
    assert_eq!(
        store
            .count_warmups_enqueued_since(account.id, now - Duration::hours(24))
            .await
            .unwrap(),
        1
    );

    store.claim_next_due(now).await.unwrap().expect("claim");
    store
        .complete_item(item.id, "https://www.reddit.com/r/webdev/comments/p/_/c1", now)
        .await
        .unwrap();
    store
        .mark_reply_posted(reply.id, "https://www.reddit.com/r/webdev/comments/p/_/c1", "t1_c1", now)
        .await
        .unwrap();
    store.record_account_post(account.id, now).await.unwrap();

    assert_eq!(
        store
            .count_account_posts_since(account.id, now - Duration::hours(24))
            .await
            .unwrap(),
        1
    );

    let err = store
        .complete_item(item.id, "https://example", now)
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());

    store
        .record_engagement(
            reply.id,
            EngagementMetrics {
                score: 3,
                reply_count: 0,
                is_removed: false,
            },
            now,
        )
        .await
        .unwrap();
    let stored = store.get_reply(reply.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReplyStatus::Posted);
    assert_eq!(stored.score, Some(3));
}

#[sqlx::test(migrations = "../../migrations")]
async fn lead_claims_expire_or_are_released(pool: PgPool) {
    let store = PgStore::new(pool);
    let org = Uuid::new_v4();
    let campaign = store.upsert_campaign(&campaign_config(org)).await.unwrap();
    for id in ["p1", "p2"] {
        store
            .insert_lead_if_new(&new_lead(campaign.id, org, id))
            .await
            .unwrap();
    }
    let claimed = store.claim_new_leads(5, Some(org)).await.unwrap();
    assert_eq!(claimed.len(), 2);
    assert!(claimed.iter().all(|lead| lead.claimed_at.is_some()));

    assert!(store
        .reclaim_stale_leads(Utc::now() - Duration::minutes(15))
        .await
        .unwrap()
        .is_empty());

    let released = store.release_lead_claims(&[claimed[1].id]).await.unwrap();
    assert_eq!(released, 1);

    let expired = store
        .reclaim_stale_leads(Utc::now() + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, claimed[0].id);
    assert_eq!(expired[0].status, LeadStatus::Ignored);
    assert_eq!(
        expired[0].qualification_error.as_deref(),
        Some(QUALIFICATION_TIMED_OUT)
    );

    let fresh = store.claim_new_leads(5, Some(org)).await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].id, claimed[1].id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn stale_processing_item_is_reclaimed(pool: PgPool) {
    let store = PgStore::new(pool);
    let org = Uuid::new_v4();
    let account = store
        .upsert_account(&account_config(org), "refresh")
        .await
        .unwrap();
    let reply = queued_reply(&store, org, ReplyKind::Comment).await;
    let an_hour_ago = Utc::now() - Duration::hours(1);

    let item = store
        .enqueue(&NewQueueItem {
            reply_id: reply.id,
            account_id: account.id,
            organization_id: org,
            scheduled_for: an_hour_ago,
            priority: 10,
            max_attempts: 3,
        })
        .await
        .unwrap();
    store.claim_next_due(an_hour_ago).await.unwrap().expect("claim");

    let reclaimed = store
        .reclaim_stale_items(Utc::now() - Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, item.id);
    assert_eq!(reclaimed[0].status, QueueStatus::Pending);
    assert_eq!(reclaimed[0].retry_count, 1);
}
