//! In-process [`Store`] with the same guarded-transition semantics as
//! [`crate::PgStore`]. Used by the pipeline, server and CLI tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redlead_core::{
    AccountConfig, Campaign, CampaignConfig, EngagementMetrics, LeadStatus, Monitor, NewLead,
    NewQueueItem, NewReply, PostingQueueItem, PotentialLead, QualificationOutcome, QueueStats,
    QueueStatus, RedditAccount, Reply, ReplyKind, ReplyStatus,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{DbError, Store, QUALIFICATION_TIMED_OUT};

#[derive(Debug, Clone, PartialEq)]
pub struct EngagementSnapshot {
    pub reply_id: Uuid,
    pub metrics: EngagementMetrics,
    pub captured_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    campaigns: Vec<Campaign>,
    monitors: Vec<Monitor>,
    cursors: HashMap<(Uuid, String), DateTime<Utc>>,
    leads: Vec<PotentialLead>,
    replies: Vec<Reply>,
    accounts: Vec<RedditAccount>,
    queue: Vec<PostingQueueItem>,
    snapshots: Vec<EngagementSnapshot>,
    fail_campaign_reads: bool,
    fail_queue_writes: bool,
}

impl State {
    fn lead_mut(&mut self, id: Uuid) -> Result<&mut PotentialLead, DbError> {
        self.leads
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(DbError::NotFound { entity: "lead", id })
    }

    fn reply_mut(&mut self, id: Uuid) -> Result<&mut Reply, DbError> {
        self.replies
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(DbError::NotFound {
                entity: "reply",
                id,
            })
    }

    fn account_mut(&mut self, id: Uuid) -> Result<&mut RedditAccount, DbError> {
        self.accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(DbError::NotFound {
                entity: "account",
                id,
            })
    }

    /// The item, provided it is currently `processing`.
    fn processing_item_mut(&mut self, id: Uuid) -> Result<&mut PostingQueueItem, DbError> {
        let item = self
            .queue
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or(DbError::NotFound {
                entity: "queue item",
                id,
            })?;
        if item.status != QueueStatus::Processing {
            return Err(DbError::InvalidTransition {
                entity: "queue item",
                id,
                expected: QueueStatus::Processing.as_str(),
            });
        }
        Ok(item)
    }
}

fn touch(created_at: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(created_at)
}

/// Apply one failed attempt to a `processing` item.
fn count_failed_attempt(item: &mut PostingQueueItem, error: &str) {
    let now = Utc::now();
    item.retry_count += 1;
    item.last_error = Some(error.to_string());
    item.started_at = None;
    if item.retry_count >= item.max_attempts {
        item.status = QueueStatus::Failed;
        item.completed_at = Some(now);
    } else {
        item.status = QueueStatus::Pending;
    }
    item.updated_at = touch(item.created_at);
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All engagement snapshots recorded so far, oldest first.
    pub async fn snapshots(&self) -> Vec<EngagementSnapshot> {
        self.state.lock().await.snapshots.clone()
    }

    /// Every queue item, in insertion order.
    pub async fn queue_items(&self) -> Vec<PostingQueueItem> {
        self.state.lock().await.queue.clone()
    }

    /// Every reply, in insertion order.
    pub async fn replies(&self) -> Vec<Reply> {
        self.state.lock().await.replies.clone()
    }

    /// Every lead, in insertion order.
    pub async fn leads(&self) -> Vec<PotentialLead> {
        self.state.lock().await.leads.clone()
    }

    /// Make `get_campaign` fail until switched back, to exercise the
    /// stages' handling of store outages.
    pub async fn fail_campaign_reads(&self, fail: bool) {
        self.state.lock().await.fail_campaign_reads = fail;
    }

    /// Make `enqueue` fail until switched back.
    pub async fn fail_queue_writes(&self, fail: bool) {
        self.state.lock().await.fail_queue_writes = fail;
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn upsert_campaign(&self, config: &CampaignConfig) -> Result<Campaign, DbError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let campaign = if let Some(existing) = state
            .campaigns
            .iter_mut()
            .find(|c| c.organization_id == config.organization_id && c.name == config.name)
        {
            existing.business_name.clone_from(&config.business_name);
            existing
                .business_description
                .clone_from(&config.business_description);
            existing.keywords.clone_from(&config.keywords);
            existing
                .excluded_keywords
                .clone_from(&config.excluded_keywords);
            existing.min_relevance_score = config.min_relevance_score;
            existing.auto_approve = config.auto_approve;
            existing.generate_dms = config.generate_dms;
            existing.updated_at = touch(existing.created_at);
            existing.clone()
        } else {
            let campaign = Campaign {
                id: Uuid::new_v4(),
                organization_id: config.organization_id,
                name: config.name.clone(),
                business_name: config.business_name.clone(),
                business_description: config.business_description.clone(),
                keywords: config.keywords.clone(),
                excluded_keywords: config.excluded_keywords.clone(),
                min_relevance_score: config.min_relevance_score,
                auto_approve: config.auto_approve,
                generate_dms: config.generate_dms,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            state.campaigns.push(campaign.clone());
            campaign
        };

        if let Some(monitor) = state
            .monitors
            .iter_mut()
            .find(|m| m.campaign_id == campaign.id)
        {
            monitor.subreddits.clone_from(&config.subreddits);
            monitor.scan_interval_minutes = config.scan_interval_minutes;
            monitor.updated_at = touch(monitor.created_at);
        } else {
            state.monitors.push(Monitor {
                id: Uuid::new_v4(),
                campaign_id: campaign.id,
                organization_id: campaign.organization_id,
                subreddits: config.subreddits.clone(),
                scan_interval_minutes: config.scan_interval_minutes,
                last_scanned_at: None,
                is_active: true,
                created_at: now,
                updated_at: now,
            });
        }

        Ok(campaign)
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, DbError> {
        let state = self.state.lock().await;
        if state.fail_campaign_reads {
            return Err(DbError::Corrupt {
                entity: "campaign",
                reason: "campaign reads disabled".to_string(),
            });
        }
        Ok(state.campaigns.iter().find(|c| c.id == id).cloned())
    }

    async fn set_campaign_active(&self, id: Uuid, active: bool) -> Result<Campaign, DbError> {
        let mut state = self.state.lock().await;
        let campaign = state
            .campaigns
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(DbError::NotFound {
                entity: "campaign",
                id,
            })?;
        campaign.is_active = active;
        campaign.updated_at = touch(campaign.created_at);
        let campaign = campaign.clone();

        for monitor in state.monitors.iter_mut().filter(|m| m.campaign_id == id) {
            monitor.is_active = active;
            monitor.updated_at = touch(monitor.created_at);
        }
        Ok(campaign)
    }

    async fn list_active_monitors(
        &self,
        organization_id: Option<Uuid>,
    ) -> Result<Vec<Monitor>, DbError> {
        let state = self.state.lock().await;
        let mut monitors: Vec<Monitor> = state
            .monitors
            .iter()
            .filter(|m| m.is_active)
            .filter(|m| organization_id.is_none_or(|org| m.organization_id == org))
            .filter(|m| {
                state
                    .campaigns
                    .iter()
                    .any(|c| c.id == m.campaign_id && c.is_active)
            })
            .cloned()
            .collect();
        monitors.sort_by_key(|m| (m.last_scanned_at, m.created_at));
        Ok(monitors)
    }

    async fn mark_monitor_scanned(
        &self,
        monitor_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let monitor = state
            .monitors
            .iter_mut()
            .find(|m| m.id == monitor_id)
            .ok_or(DbError::NotFound {
                entity: "monitor",
                id: monitor_id,
            })?;
        monitor.last_scanned_at = Some(at);
        monitor.updated_at = touch(monitor.created_at);
        Ok(())
    }

    async fn keyword_cursor(
        &self,
        monitor_id: Uuid,
        keyword: &str,
    ) -> Result<Option<DateTime<Utc>>, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .cursors
            .get(&(monitor_id, keyword.to_string()))
            .copied())
    }

    async fn advance_keyword_cursor(
        &self,
        monitor_id: Uuid,
        keyword: &str,
        seen_until: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        state
            .cursors
            .entry((monitor_id, keyword.to_string()))
            .and_modify(|current| *current = (*current).max(seen_until))
            .or_insert(seen_until);
        Ok(())
    }

    async fn insert_lead_if_new(&self, lead: &NewLead) -> Result<Option<PotentialLead>, DbError> {
        let mut state = self.state.lock().await;
        if state
            .leads
            .iter()
            .any(|l| l.campaign_id == lead.campaign_id && l.source_id == lead.source_id)
        {
            return Ok(None);
        }

        let now = Utc::now();
        let row = PotentialLead {
            id: Uuid::new_v4(),
            campaign_id: lead.campaign_id,
            organization_id: lead.organization_id,
            source_id: lead.source_id.clone(),
            subreddit: lead.subreddit.clone(),
            author: lead.author.clone(),
            title: lead.title.clone(),
            body: lead.body.clone(),
            permalink: lead.permalink.clone(),
            matched_keyword: lead.matched_keyword.clone(),
            posted_at: lead.posted_at,
            status: LeadStatus::New,
            relevance_score: None,
            qualification_reasoning: None,
            qualification_error: None,
            qualified_at: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        };
        state.leads.push(row.clone());
        Ok(Some(row))
    }

    async fn claim_new_leads(
        &self,
        limit: usize,
        organization_id: Option<Uuid>,
    ) -> Result<Vec<PotentialLead>, DbError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut claimed = Vec::new();
        // Leads are stored in insertion order, which is created_at order.
        for lead in state
            .leads
            .iter_mut()
            .filter(|l| l.status == LeadStatus::New)
            .filter(|l| organization_id.is_none_or(|org| l.organization_id == org))
            .take(limit)
        {
            lead.status = LeadStatus::Qualifying;
            lead.claimed_at = Some(now);
            lead.updated_at = touch(lead.created_at);
            claimed.push(lead.clone());
        }
        Ok(claimed)
    }

    async fn reclaim_stale_leads(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<Vec<PotentialLead>, DbError> {
        let mut state = self.state.lock().await;
        let mut expired = Vec::new();
        for lead in state.leads.iter_mut().filter(|l| {
            l.status == LeadStatus::Qualifying && l.claimed_at.is_some_and(|at| at < claimed_before)
        }) {
            lead.status = LeadStatus::Ignored;
            lead.relevance_score = None;
            lead.qualification_reasoning = None;
            lead.qualification_error = Some(QUALIFICATION_TIMED_OUT.to_string());
            lead.qualified_at = None;
            lead.updated_at = touch(lead.created_at);
            expired.push(lead.clone());
        }
        Ok(expired)
    }

    async fn release_lead_claims(&self, lead_ids: &[Uuid]) -> Result<usize, DbError> {
        let mut state = self.state.lock().await;
        let mut released = 0;
        for lead in state
            .leads
            .iter_mut()
            .filter(|l| l.status == LeadStatus::Qualifying && lead_ids.contains(&l.id))
        {
            lead.status = LeadStatus::New;
            lead.claimed_at = None;
            lead.updated_at = touch(lead.created_at);
            released += 1;
        }
        Ok(released)
    }

    async fn complete_qualification(
        &self,
        lead_id: Uuid,
        outcome: &QualificationOutcome,
    ) -> Result<PotentialLead, DbError> {
        let mut state = self.state.lock().await;
        let lead = state.lead_mut(lead_id)?;
        if lead.status != LeadStatus::Qualifying {
            return Err(DbError::InvalidTransition {
                entity: "lead",
                id: lead_id,
                expected: LeadStatus::Qualifying.as_str(),
            });
        }

        match outcome {
            QualificationOutcome::Qualified { score, reasoning }
            | QualificationOutcome::Ignored { score, reasoning } => {
                lead.relevance_score = Some(*score);
                lead.qualification_reasoning = Some(reasoning.clone());
                lead.qualification_error = None;
            }
            QualificationOutcome::Errored { error } => {
                lead.relevance_score = None;
                lead.qualification_reasoning = None;
                lead.qualification_error = Some(error.clone());
            }
        }
        lead.status = outcome.status();
        lead.qualified_at = (lead.status == LeadStatus::QualifiedLead).then(Utc::now);
        lead.updated_at = touch(lead.created_at);
        Ok(lead.clone())
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<PotentialLead>, DbError> {
        let state = self.state.lock().await;
        Ok(state.leads.iter().find(|l| l.id == id).cloned())
    }

    async fn list_leads(
        &self,
        campaign_id: Uuid,
        status: Option<LeadStatus>,
        limit: i64,
    ) -> Result<Vec<PotentialLead>, DbError> {
        let state = self.state.lock().await;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state
            .leads
            .iter()
            .rev()
            .filter(|l| l.campaign_id == campaign_id)
            .filter(|l| status.is_none_or(|s| l.status == s))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_reply(&self, reply: &NewReply) -> Result<Reply, DbError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let row = Reply {
            id: Uuid::new_v4(),
            organization_id: reply.organization_id,
            campaign_id: reply.campaign_id,
            lead_id: reply.lead_id,
            kind: reply.kind,
            target_id: reply.target_id.clone(),
            subreddit: reply.subreddit.clone(),
            subject: reply.subject.clone(),
            body: reply.body.clone(),
            status: reply.status,
            posted_url: None,
            posted_id: None,
            error: None,
            score: None,
            reply_count: None,
            is_removed: false,
            posted_at: None,
            metrics_updated_at: None,
            engagement_checked_at: None,
            created_at: now,
            updated_at: now,
        };
        state.replies.push(row.clone());
        Ok(row)
    }

    async fn get_reply(&self, id: Uuid) -> Result<Option<Reply>, DbError> {
        let state = self.state.lock().await;
        Ok(state.replies.iter().find(|r| r.id == id).cloned())
    }

    async fn transition_reply(
        &self,
        id: Uuid,
        from: ReplyStatus,
        to: ReplyStatus,
    ) -> Result<Reply, DbError> {
        let mut state = self.state.lock().await;
        let reply = state.reply_mut(id)?;
        if reply.status != from || !from.can_transition_to(to) {
            return Err(DbError::InvalidTransition {
                entity: "reply",
                id,
                expected: from.as_str(),
            });
        }
        reply.status = to;
        reply.updated_at = touch(reply.created_at);
        Ok(reply.clone())
    }

    async fn mark_reply_posted(
        &self,
        id: Uuid,
        posted_url: &str,
        posted_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let reply = state.reply_mut(id)?;
        if reply.status != ReplyStatus::Queued {
            return Err(DbError::InvalidTransition {
                entity: "reply",
                id,
                expected: ReplyStatus::Queued.as_str(),
            });
        }
        reply.status = ReplyStatus::Posted;
        reply.posted_url = Some(posted_url.to_string());
        reply.posted_id = Some(posted_id.to_string());
        reply.posted_at = Some(at);
        reply.error = None;
        reply.updated_at = touch(reply.created_at);
        Ok(())
    }

    async fn mark_reply_failed(&self, id: Uuid, error: &str) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let reply = state.reply_mut(id)?;
        if reply.status != ReplyStatus::Queued {
            return Err(DbError::InvalidTransition {
                entity: "reply",
                id,
                expected: ReplyStatus::Queued.as_str(),
            });
        }
        reply.status = ReplyStatus::Failed;
        reply.error = Some(error.to_string());
        reply.updated_at = touch(reply.created_at);
        Ok(())
    }

    async fn list_replies_for_engagement(
        &self,
        posted_before: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reply>, DbError> {
        let state = self.state.lock().await;
        let mut replies: Vec<Reply> = state
            .replies
            .iter()
            .filter(|r| r.status == ReplyStatus::Posted && r.kind.is_public())
            .filter(|r| r.posted_id.is_some())
            .filter(|r| r.posted_at.is_some_and(|at| at <= posted_before))
            .filter(|r| r.engagement_checked_at.is_none_or(|at| at <= stale_before))
            .cloned()
            .collect();
        replies.sort_by_key(|r| (r.engagement_checked_at, r.posted_at));
        replies.truncate(limit);
        Ok(replies)
    }

    async fn record_engagement(
        &self,
        reply_id: Uuid,
        metrics: EngagementMetrics,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let reply = state.reply_mut(reply_id)?;
        if reply.status != ReplyStatus::Posted {
            return Err(DbError::InvalidTransition {
                entity: "reply",
                id: reply_id,
                expected: ReplyStatus::Posted.as_str(),
            });
        }
        reply.score = Some(metrics.score);
        reply.reply_count = Some(metrics.reply_count);
        reply.is_removed = metrics.is_removed;
        reply.metrics_updated_at = Some(at);
        reply.engagement_checked_at = Some(at);
        reply.updated_at = touch(reply.created_at);
        state.snapshots.push(EngagementSnapshot {
            reply_id,
            metrics,
            captured_at: at,
        });
        Ok(())
    }

    async fn mark_engagement_checked(
        &self,
        reply_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let reply = state.reply_mut(reply_id)?;
        if reply.status != ReplyStatus::Posted {
            return Err(DbError::InvalidTransition {
                entity: "reply",
                id: reply_id,
                expected: ReplyStatus::Posted.as_str(),
            });
        }
        reply.engagement_checked_at = Some(at);
        reply.updated_at = touch(reply.created_at);
        Ok(())
    }

    async fn upsert_account(
        &self,
        config: &AccountConfig,
        refresh_token: &str,
    ) -> Result<RedditAccount, DbError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .accounts
            .iter_mut()
            .find(|a| a.username == config.username)
        {
            existing.organization_id = config.organization_id;
            existing.refresh_token = refresh_token.to_string();
            existing.warmup_enabled = config.warmup_enabled;
            existing
                .warmup_subreddits
                .clone_from(&config.warmup_subreddits);
            existing.warmup_daily_limit = config.warmup_daily_limit;
            existing.updated_at = touch(existing.created_at);
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let account = RedditAccount {
            id: Uuid::new_v4(),
            organization_id: config.organization_id,
            username: config.username.clone(),
            refresh_token: refresh_token.to_string(),
            is_active: true,
            warmup_enabled: config.warmup_enabled,
            warmup_subreddits: config.warmup_subreddits.clone(),
            warmup_daily_limit: config.warmup_daily_limit,
            last_posted_at: None,
            created_at: now,
            updated_at: now,
        };
        state.accounts.push(account.clone());
        Ok(account)
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<RedditAccount>, DbError> {
        let state = self.state.lock().await;
        Ok(state.accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn active_account_for_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<RedditAccount>, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .iter()
            .filter(|a| a.organization_id == organization_id && a.is_active)
            .min_by_key(|a| (a.last_posted_at, a.created_at))
            .cloned())
    }

    async fn list_warmup_accounts(&self) -> Result<Vec<RedditAccount>, DbError> {
        let state = self.state.lock().await;
        let mut accounts: Vec<RedditAccount> = state
            .accounts
            .iter()
            .filter(|a| a.is_active && a.warmup_enabled)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(accounts)
    }

    async fn record_account_post(
        &self,
        account_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let account = state.account_mut(account_id)?;
        account.last_posted_at = Some(account.last_posted_at.map_or(at, |last| last.max(at)));
        account.updated_at = touch(account.created_at);
        Ok(())
    }

    async fn count_account_posts_since(
        &self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let state = self.state.lock().await;
        let count = state
            .queue
            .iter()
            .filter(|q| q.account_id == account_id && q.status == QueueStatus::Completed)
            .filter(|q| q.completed_at.is_some_and(|at| at >= since))
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn count_warmups_enqueued_since(
        &self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let state = self.state.lock().await;
        let count = state
            .queue
            .iter()
            .filter(|q| q.account_id == account_id && q.created_at >= since)
            .filter(|q| {
                state
                    .replies
                    .iter()
                    .any(|r| r.id == q.reply_id && r.kind == ReplyKind::Warmup)
            })
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn enqueue(&self, item: &NewQueueItem) -> Result<PostingQueueItem, DbError> {
        let mut state = self.state.lock().await;
        if state.fail_queue_writes {
            return Err(DbError::Corrupt {
                entity: "queue item",
                reason: "queue writes disabled".to_string(),
            });
        }
        if let Some(existing) = state.queue.iter().find(|q| q.reply_id == item.reply_id) {
            return Err(DbError::InvalidTransition {
                entity: "queue item",
                id: existing.id,
                expected: "absent",
            });
        }

        let now = Utc::now();
        let row = PostingQueueItem {
            id: Uuid::new_v4(),
            reply_id: item.reply_id,
            account_id: item.account_id,
            organization_id: item.organization_id,
            scheduled_for: item.scheduled_for,
            priority: item.priority,
            status: QueueStatus::Pending,
            retry_count: 0,
            max_attempts: item.max_attempts,
            last_error: None,
            result_link: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        state.queue.push(row.clone());
        Ok(row)
    }

    async fn get_queue_item(&self, id: Uuid) -> Result<Option<PostingQueueItem>, DbError> {
        let state = self.state.lock().await;
        Ok(state.queue.iter().find(|q| q.id == id).cloned())
    }

    async fn claim_next_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<PostingQueueItem>, DbError> {
        let mut state = self.state.lock().await;
        let next = state
            .queue
            .iter_mut()
            .filter(|q| q.status == QueueStatus::Pending && q.scheduled_for <= now)
            .min_by_key(|q| (std::cmp::Reverse(q.priority), q.scheduled_for, q.created_at));

        Ok(next.map(|item| {
            item.status = QueueStatus::Processing;
            item.started_at = Some(now);
            item.updated_at = touch(item.created_at);
            item.clone()
        }))
    }

    async fn complete_item(
        &self,
        id: Uuid,
        result_link: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let item = state.processing_item_mut(id)?;
        item.status = QueueStatus::Completed;
        item.result_link = Some(result_link.to_string());
        item.completed_at = Some(at);
        item.last_error = None;
        item.updated_at = touch(item.created_at);
        Ok(())
    }

    async fn retry_item(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<PostingQueueItem, DbError> {
        let mut state = self.state.lock().await;
        let item = state.processing_item_mut(id)?;
        count_failed_attempt(item, error);
        item.scheduled_for = next_attempt_at;
        Ok(item.clone())
    }

    async fn fail_item(&self, id: Uuid, error: &str) -> Result<PostingQueueItem, DbError> {
        let mut state = self.state.lock().await;
        let item = state.processing_item_mut(id)?;
        item.retry_count = (item.retry_count + 1).min(item.max_attempts);
        item.status = QueueStatus::Failed;
        item.last_error = Some(error.to_string());
        item.completed_at = Some(Utc::now());
        item.started_at = None;
        item.updated_at = touch(item.created_at);
        Ok(item.clone())
    }

    async fn defer_item(&self, id: Uuid, until: DateTime<Utc>) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let item = state.processing_item_mut(id)?;
        item.status = QueueStatus::Pending;
        item.scheduled_for = until;
        item.started_at = None;
        item.updated_at = touch(item.created_at);
        Ok(())
    }

    async fn reclaim_stale_items(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<PostingQueueItem>, DbError> {
        let mut state = self.state.lock().await;
        let mut reclaimed = Vec::new();
        for item in state.queue.iter_mut().filter(|q| {
            q.status == QueueStatus::Processing
                && q.started_at.is_some_and(|at| at < started_before)
        }) {
            count_failed_attempt(item, "processing timed out");
            reclaimed.push(item.clone());
        }
        Ok(reclaimed)
    }

    async fn queue_stats(&self) -> Result<QueueStats, DbError> {
        let state = self.state.lock().await;
        let mut stats = QueueStats::default();
        for item in &state.queue {
            match item.status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::Processing => stats.processing += 1,
                QueueStatus::Completed => stats.completed += 1,
                QueueStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}
