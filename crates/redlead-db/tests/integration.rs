//! Offline tests for redlead-db: pool configuration and the in-memory store.
//! These tests do not require a live database connection.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use chrono::{Duration, Utc};
use redlead_core::{
    AccountConfig, AppConfig, CampaignConfig, EngagementMetrics, Environment, LeadStatus, NewLead,
    NewQueueItem, NewReply, PipelineSettings, QualificationOutcome, QueueStatus, ReplyKind,
    ReplyStatus,
};
use redlead_db::{MemoryStore, PoolConfig, Store, QUALIFICATION_TIMED_OUT};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn campaign_config(org: Uuid) -> CampaignConfig {
    CampaignConfig {
        organization_id: org,
        name: "Freelance dev".to_string(),
        business_name: "Northwind".to_string(),
        business_description: "We build mobile apps".to_string(),
        keywords: vec!["need developer".to_string()],
        excluded_keywords: vec![],
        subreddits: vec!["startups".to_string()],
        scan_interval_minutes: 60,
        min_relevance_score: 70,
        auto_approve: false,
        generate_dms: false,
    }
}

fn account_config(org: Uuid) -> AccountConfig {
    AccountConfig {
        organization_id: org,
        username: "northwind_builds".to_string(),
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
        title: "We need developer help".to_string(),
        body: "Looking for someone to build our MVP".to_string(),
        permalink: format!("/r/startups/comments/{source_id}/we_need_developer_help/"),
        matched_keyword: "need developer".to_string(),
        posted_at: Utc::now() - Duration::minutes(5),
    }
}

/// Seed an approved reply and a pending queue item for it.
async fn seed_queue_item(
    store: &MemoryStore,
    org: Uuid,
    account_id: Uuid,
    priority: i16,
    scheduled_for: chrono::DateTime<Utc>,
    max_attempts: i32,
) -> redlead_core::PostingQueueItem {
    let reply = store
        .insert_reply(&NewReply {
            organization_id: org,
            campaign_id: None,
            lead_id: None,
            kind: ReplyKind::Comment,
            target_id: "t3_abc".to_string(),
            subreddit: Some("startups".to_string()),
            subject: None,
            body: "Happy to help".to_string(),
            status: ReplyStatus::Queued,
        })
        .await
        .expect("insert reply");
    store
        .enqueue(&NewQueueItem {
            reply_id: reply.id,
            account_id,
            organization_id: org,
            scheduled_for,
            priority,
            max_attempts,
        })
        .await
        .expect("enqueue")
}

// ---------------------------------------------------------------------------
// Pool configuration
// ---------------------------------------------------------------------------

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        reddit_client_id: None,
        reddit_client_secret: None,
        reddit_user_agent: "ua".to_string(),
        openai_api_key: None,
        openai_model: "gpt-4o-mini".to_string(),
        http_timeout_secs: 30,
        http_max_retries: 3,
        http_retry_backoff_base_ms: 500,
        scheduler_enabled: false,
        pipeline: PipelineSettings::default(),
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

// ---------------------------------------------------------------------------
// Campaigns, monitors and cursors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upsert_campaign_is_keyed_by_org_and_name() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();

    let first = store.upsert_campaign(&campaign_config(org)).await.unwrap();
    let mut changed = campaign_config(org);
    changed.min_relevance_score = 85;
    let second = store.upsert_campaign(&changed).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.min_relevance_score, 85);
    assert_eq!(store.list_active_monitors(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn paused_campaign_monitors_are_not_listed() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let campaign = store.upsert_campaign(&campaign_config(org)).await.unwrap();

    store.set_campaign_active(campaign.id, false).await.unwrap();
    assert!(store.list_active_monitors(Some(org)).await.unwrap().is_empty());

    store.set_campaign_active(campaign.id, true).await.unwrap();
    assert_eq!(store.list_active_monitors(Some(org)).await.unwrap().len(), 1);
    assert!(store
        .list_active_monitors(Some(Uuid::new_v4()))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn pausing_unknown_campaign_is_not_found() {
    let store = MemoryStore::new();
    let err = store
        .set_campaign_active(Uuid::new_v4(), false)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn keyword_cursor_only_moves_forward() {
    let store = MemoryStore::new();
    let monitor = Uuid::new_v4();
    let now = Utc::now();

    assert!(store.keyword_cursor(monitor, "a").await.unwrap().is_none());
    store.advance_keyword_cursor(monitor, "a", now).await.unwrap();
    store
        .advance_keyword_cursor(monitor, "a", now - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(store.keyword_cursor(monitor, "a").await.unwrap(), Some(now));
    assert!(store.keyword_cursor(monitor, "b").await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Leads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_lead_is_not_inserted_twice() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let campaign = store.upsert_campaign(&campaign_config(org)).await.unwrap();

    let first = store
        .insert_lead_if_new(&new_lead(campaign.id, org, "abc123"))
        .await
        .unwrap();
    let second = store
        .insert_lead_if_new(&new_lead(campaign.id, org, "abc123"))
        .await
        .unwrap();

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(store.leads().await.len(), 1);
}

#[tokio::test]
async fn claimed_leads_cannot_be_claimed_again() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let campaign = store.upsert_campaign(&campaign_config(org)).await.unwrap();
    for id in ["a1", "a2", "a3"] {
        store
            .insert_lead_if_new(&new_lead(campaign.id, org, id))
            .await
            .unwrap();
    }

    let first = store.claim_new_leads(2, None).await.unwrap();
    let second = store.claim_new_leads(10, None).await.unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(first[0].source_id, "a1");
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].source_id, "a3");
    assert!(first
        .iter()
        .all(|lead| lead.status == LeadStatus::Qualifying));
}

#[tokio::test]
async fn stale_lead_claims_expire_and_fresh_ones_can_be_released() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let campaign = store.upsert_campaign(&campaign_config(org)).await.unwrap();
    for id in ["a1", "a2"] {
        store
            .insert_lead_if_new(&new_lead(campaign.id, org, id))
            .await
            .unwrap();
    }
    let claimed = store.claim_new_leads(10, None).await.unwrap();
    assert!(claimed.iter().all(|lead| lead.claimed_at.is_some()));

    let none = store
        .reclaim_stale_leads(Utc::now() - Duration::minutes(15))
        .await
        .unwrap();
    assert!(none.is_empty());

    let released = store.release_lead_claims(&[claimed[1].id]).await.unwrap();
    assert_eq!(released, 1);
    let again = store.release_lead_claims(&[claimed[1].id]).await.unwrap();
    assert_eq!(again, 0);

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

    let reclaimable = store.claim_new_leads(10, None).await.unwrap();
    assert_eq!(reclaimable.len(), 1);
    assert_eq!(reclaimable[0].source_id, "a2");
}

#[tokio::test]
async fn qualification_requires_qualifying_status() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let campaign = store.upsert_campaign(&campaign_config(org)).await.unwrap();
    let lead = store
        .insert_lead_if_new(&new_lead(campaign.id, org, "q1"))
        .await
        .unwrap()
        .unwrap();

    let outcome = QualificationOutcome::Qualified {
        score: 90,
        reasoning: "asks for a developer".to_string(),
    };
    let err = store
        .complete_qualification(lead.id, &outcome)
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());

    store.claim_new_leads(1, Some(org)).await.unwrap();
    let qualified = store.complete_qualification(lead.id, &outcome).await.unwrap();
    assert_eq!(qualified.status, LeadStatus::QualifiedLead);
    assert_eq!(qualified.relevance_score, Some(90));
    assert!(qualified.qualified_at.is_some());

    // Terminal: a second write is rejected.
    let err = store
        .complete_qualification(lead.id, &outcome)
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());
}

// ---------------------------------------------------------------------------
// Replies and engagement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reply_transition_is_guarded_by_current_status() {
    let store = MemoryStore::new();
    let reply = store
        .insert_reply(&NewReply {
            organization_id: Uuid::new_v4(),
            campaign_id: None,
            lead_id: None,
            kind: ReplyKind::Comment,
            target_id: "t3_x".to_string(),
            subreddit: None,
            subject: None,
            body: "hi".to_string(),
            status: ReplyStatus::New,
        })
        .await
        .unwrap();

    let approved = store
        .transition_reply(reply.id, ReplyStatus::New, ReplyStatus::Approved)
        .await
        .unwrap();
    assert_eq!(approved.status, ReplyStatus::Approved);

    let err = store
        .transition_reply(reply.id, ReplyStatus::New, ReplyStatus::Approved)
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());

    let err = store
        .transition_reply(reply.id, ReplyStatus::Approved, ReplyStatus::Posted)
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());
}

#[tokio::test]
async fn engagement_appends_snapshots() {
    let store = MemoryStore::new();
    let reply = store
        .insert_reply(&NewReply {
            organization_id: Uuid::new_v4(),
            campaign_id: None,
            lead_id: None,
            kind: ReplyKind::Comment,
            target_id: "t3_x".to_string(),
            subreddit: None,
            subject: None,
            body: "hi".to_string(),
            status: ReplyStatus::Queued,
        })
        .await
        .unwrap();
    let posted_at = Utc::now() - Duration::hours(2);
    store
        .mark_reply_posted(reply.id, "https://reddit.com/x", "t1_c1", posted_at)
        .await
        .unwrap();

    let due = store
        .list_replies_for_engagement(Utc::now() - Duration::hours(1), Utc::now(), 10)
        .await
        .unwrap();
    assert_eq!(due.len(), 1);

    let metrics = EngagementMetrics {
        score: 4,
        reply_count: 1,
        is_removed: false,
    };
    store
        .record_engagement(reply.id, metrics, Utc::now())
        .await
        .unwrap();
    store
        .record_engagement(reply.id, metrics, Utc::now())
        .await
        .unwrap();

    assert_eq!(store.snapshots().await.len(), 2);
    let stored = store.get_reply(reply.id).await.unwrap().unwrap();
    assert_eq!(stored.score, Some(4));

    // Freshly refreshed replies drop out of the due list.
    let due = store
        .list_replies_for_engagement(
            Utc::now() - Duration::hours(1),
            Utc::now() - Duration::hours(6),
            10,
        )
        .await
        .unwrap();
    assert!(due.is_empty());
}

#[tokio::test]
async fn failed_lookups_move_replies_to_the_back() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let mut ids = Vec::new();
    for (n, hours_ago) in [(1, 3), (2, 2)] {
        let reply = store
            .insert_reply(&NewReply {
                organization_id: org,
                campaign_id: None,
                lead_id: None,
                kind: ReplyKind::Comment,
                target_id: format!("t3_p{n}"),
                subreddit: None,
                subject: None,
                body: "hi".to_string(),
                status: ReplyStatus::Queued,
            })
            .await
            .unwrap();
        store
            .mark_reply_posted(
                reply.id,
                "https://reddit.com/x",
                &format!("t1_c{n}"),
                Utc::now() - Duration::hours(hours_ago),
            )
            .await
            .unwrap();
        ids.push(reply.id);
    }

    let due = store
        .list_replies_for_engagement(Utc::now(), Utc::now(), 1)
        .await
        .unwrap();
    assert_eq!(due[0].id, ids[0]);

    store
        .mark_engagement_checked(ids[0], Utc::now())
        .await
        .unwrap();
    let due = store
        .list_replies_for_engagement(Utc::now(), Utc::now(), 1)
        .await
        .unwrap();
    assert_eq!(due[0].id, ids[1]);

    let stored = store.get_reply(ids[0]).await.unwrap().unwrap();
    assert!(stored.engagement_checked_at.is_some());
    assert!(stored.metrics_updated_at.is_none());
}

// ---------------------------------------------------------------------------
// Posting queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn claim_orders_by_priority_then_schedule() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let account = store
        .upsert_account(&account_config(org), "token")
        .await
        .unwrap();
    let now = Utc::now();

    let warmup = seed_queue_item(&store, org, account.id, 0, now - Duration::hours(2), 3).await;
    let late = seed_queue_item(&store, org, account.id, 10, now - Duration::minutes(1), 3).await;
    let early = seed_queue_item(&store, org, account.id, 10, now - Duration::hours(1), 3).await;
    let future = seed_queue_item(&store, org, account.id, 10, now + Duration::hours(1), 3).await;

    let order: Vec<Uuid> = [
        store.claim_next_due(now).await.unwrap().unwrap().id,
        store.claim_next_due(now).await.unwrap().unwrap().id,
        store.claim_next_due(now).await.unwrap().unwrap().id,
    ]
    .to_vec();
    assert_eq!(order, vec![early.id, late.id, warmup.id]);
    assert!(store.claim_next_due(now).await.unwrap().is_none());
    assert_eq!(
        store.get_queue_item(future.id).await.unwrap().unwrap().status,
        QueueStatus::Pending
    );
}

#[tokio::test]
async fn retries_stop_at_max_attempts() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let account = store
        .upsert_account(&account_config(org), "token")
        .await
        .unwrap();
    let now = Utc::now();
    let item = seed_queue_item(&store, org, account.id, 10, now, 2).await;

    store.claim_next_due(now).await.unwrap().unwrap();
    let after_first = store.retry_item(item.id, "503", now).await.unwrap();
    assert_eq!(after_first.status, QueueStatus::Pending);
    assert_eq!(after_first.retry_count, 1);

    store.claim_next_due(now).await.unwrap().unwrap();
    let after_second = store.retry_item(item.id, "503", now).await.unwrap();
    assert_eq!(after_second.status, QueueStatus::Failed);
    assert_eq!(after_second.retry_count, 2);
    assert!(after_second.completed_at.is_some());

    assert!(store.claim_next_due(now).await.unwrap().is_none());
}

#[tokio::test]
async fn defer_does_not_count_an_attempt() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let account = store
        .upsert_account(&account_config(org), "token")
        .await
        .unwrap();
    let now = Utc::now();
    let item = seed_queue_item(&store, org, account.id, 10, now, 3).await;

    store.claim_next_due(now).await.unwrap().unwrap();
    store
        .defer_item(item.id, now + Duration::minutes(10))
        .await
        .unwrap();

    let stored = store.get_queue_item(item.id).await.unwrap().unwrap();
    assert_eq!(stored.status, QueueStatus::Pending);
    assert_eq!(stored.retry_count, 0);
    assert!(store.claim_next_due(now).await.unwrap().is_none());
}

#[tokio::test]
async fn completed_item_cannot_be_completed_again() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let account = store
        .upsert_account(&account_config(org), "token")
        .await
        .unwrap();
    let now = Utc::now();
    let item = seed_queue_item(&store, org, account.id, 10, now, 3).await;

    store.claim_next_due(now).await.unwrap().unwrap();
    store
        .complete_item(item.id, "https://reddit.com/c1", now)
        .await
        .unwrap();
    let err = store
        .complete_item(item.id, "https://reddit.com/c1", now)
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());

    assert_eq!(
        store
            .count_account_posts_since(account.id, now - Duration::hours(24))
            .await
            .unwrap(),
        1
    );
    let stats = store.queue_stats().await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn stale_processing_items_are_reclaimed_as_attempts() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let account = store
        .upsert_account(&account_config(org), "token")
        .await
        .unwrap();
    let then = Utc::now() - Duration::hours(1);
    let retryable = seed_queue_item(&store, org, account.id, 10, then, 3).await;
    let exhausted = seed_queue_item(&store, org, account.id, 10, then, 1).await;

    store.claim_next_due(then).await.unwrap().unwrap();
    store.claim_next_due(then).await.unwrap().unwrap();

    let reclaimed = store
        .reclaim_stale_items(Utc::now() - Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 2);

    let retryable = store.get_queue_item(retryable.id).await.unwrap().unwrap();
    assert_eq!(retryable.status, QueueStatus::Pending);
    assert_eq!(retryable.retry_count, 1);
    let exhausted = store.get_queue_item(exhausted.id).await.unwrap().unwrap();
    assert_eq!(exhausted.status, QueueStatus::Failed);
}

#[tokio::test]
async fn same_reply_cannot_be_enqueued_twice() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let account = store
        .upsert_account(&account_config(org), "token")
        .await
        .unwrap();
    let item = seed_queue_item(&store, org, account.id, 10, Utc::now(), 3).await;

    let err = store
        .enqueue(&NewQueueItem {
            reply_id: item.reply_id,
            account_id: account.id,
            organization_id: org,
            scheduled_for: Utc::now(),
            priority: 10,
            max_attempts: 3,
        })
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());
}

#[tokio::test]
async fn least_recently_used_account_is_picked() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let first = store
        .upsert_account(&account_config(org), "t1")
        .await
        .unwrap();
    let mut other = account_config(org);
    other.username = "second_account".to_string();
    let second = store.upsert_account(&other, "t2").await.unwrap();

    store.record_account_post(first.id, Utc::now()).await.unwrap();
    let picked = store
        .active_account_for_organization(org)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(picked.id, second.id);
}
