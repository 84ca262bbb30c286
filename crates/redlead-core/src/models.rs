//! Persistent entities of the lead pipeline.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{LeadStatus, QueueStatus, ReplyKind, ReplyStatus};

/// An organization's set of keywords plus the business context the LLM needs
/// to judge relevance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub business_name: String,
    pub business_description: String,
    pub keywords: Vec<String>,
    /// Posts mentioning any of these are dropped before qualification.
    pub excluded_keywords: Vec<String>,
    /// Minimum LLM relevance score (0-100) for a lead to be accepted.
    pub min_relevance_score: i16,
    /// Approve and enqueue generated drafts without human review.
    pub auto_approve: bool,
    pub generate_dms: bool,
    /// `false` once the campaign is paused; paused campaigns are not scanned.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-campaign scanning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub organization_id: Uuid,
    /// Subreddits to restrict the search to. Empty searches all of Reddit.
    pub subreddits: Vec<String>,
    pub scan_interval_minutes: i32,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    /// Whether enough time has passed since the last scan.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_scanned_at {
            None => true,
            Some(last) => last + Duration::minutes(i64::from(self.scan_interval_minutes)) <= now,
        }
    }
}

/// A Reddit post discovered by the scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PotentialLead {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub organization_id: Uuid,
    /// Reddit base-36 post id (without the `t3_` prefix).
    pub source_id: String,
    pub subreddit: String,
    pub author: String,
    pub title: String,
    pub body: String,
    pub permalink: String,
    pub matched_keyword: String,
    pub posted_at: DateTime<Utc>,
    pub status: LeadStatus,
    pub relevance_score: Option<i16>,
    pub qualification_reasoning: Option<String>,
    pub qualification_error: Option<String>,
    pub qualified_at: Option<DateTime<Utc>>,
    /// Set when the lead moves to `qualifying`.
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PotentialLead {
    /// Reddit "fullname" of the post, used as the parent of a comment.
    #[must_use]
    pub fn fullname(&self) -> String {
        format!("t3_{}", self.source_id)
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("https://www.reddit.com{}", self.permalink)
    }
}

#[derive(Debug, Clone)]
pub struct NewLead {
    pub campaign_id: Uuid,
    pub organization_id: Uuid,
    pub source_id: String,
    pub subreddit: String,
    pub author: String,
    pub title: String,
    pub body: String,
    pub permalink: String,
    pub matched_keyword: String,
    pub posted_at: DateTime<Utc>,
}

/// Result of one qualification attempt, written back onto the lead.
#[derive(Debug, Clone, PartialEq)]
pub enum QualificationOutcome {
    Qualified { score: i16, reasoning: String },
    Ignored { score: i16, reasoning: String },
    Errored { error: String },
}

impl QualificationOutcome {
    #[must_use]
    pub fn status(&self) -> LeadStatus {
        match self {
            Self::Qualified { .. } => LeadStatus::QualifiedLead,
            Self::Ignored { .. } | Self::Errored { .. } => LeadStatus::Ignored,
        }
    }
}

/// A generated comment, DM or warm-up comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
    pub kind: ReplyKind,
    /// Fullname of the parent thing for comments, username for DMs.
    pub target_id: String,
    pub subreddit: Option<String>,
    /// DM subject line.
    pub subject: Option<String>,
    pub body: String,
    pub status: ReplyStatus,
    pub posted_url: Option<String>,
    /// Fullname of the created comment (`t1_…`).
    pub posted_id: Option<String>,
    pub error: Option<String>,
    pub score: Option<i32>,
    pub reply_count: Option<i32>,
    pub is_removed: bool,
    pub posted_at: Option<DateTime<Utc>>,
    pub metrics_updated_at: Option<DateTime<Utc>>,
    /// Last engagement lookup attempt, including failed ones.
    pub engagement_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReply {
    pub organization_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
    pub kind: ReplyKind,
    pub target_id: String,
    pub subreddit: Option<String>,
    pub subject: Option<String>,
    pub body: String,
    /// Either [`ReplyStatus::New`] or [`ReplyStatus::Approved`].
    pub status: ReplyStatus,
}

/// A posting identity connected by an organization.
#[derive(Clone, Serialize, Deserialize)]
pub struct RedditAccount {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub is_active: bool,
    pub warmup_enabled: bool,
    pub warmup_subreddits: Vec<String>,
    pub warmup_daily_limit: i32,
    pub last_posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for RedditAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditAccount")
            .field("id", &self.id)
            .field("organization_id", &self.organization_id)
            .field("username", &self.username)
            .field("refresh_token", &"[redacted]")
            .field("is_active", &self.is_active)
            .field("warmup_enabled", &self.warmup_enabled)
            .field("warmup_subreddits", &self.warmup_subreddits)
            .field("warmup_daily_limit", &self.warmup_daily_limit)
            .field("last_posted_at", &self.last_posted_at)
            .finish_non_exhaustive()
    }
}

/// A scheduled posting attempt for one reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingQueueItem {
    pub id: Uuid,
    pub reply_id: Uuid,
    pub account_id: Uuid,
    pub organization_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
    /// Higher runs first.
    pub priority: i16,
    pub status: QueueStatus,
    pub retry_count: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub result_link: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostingQueueItem {
    /// Whether one more failed attempt exhausts the item.
    #[must_use]
    pub fn is_last_attempt(&self) -> bool {
        self.retry_count + 1 >= self.max_attempts
    }
}

#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub reply_id: Uuid,
    pub account_id: Uuid,
    pub organization_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
    pub priority: i16,
    pub max_attempts: i32,
}

/// Counters refreshed by the engagement tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub score: i32,
    pub reply_count: i32,
    pub is_removed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(last_scanned_at: Option<DateTime<Utc>>, interval: i32) -> Monitor {
        let now = Utc::now();
        Monitor {
            id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            subreddits: vec![],
            scan_interval_minutes: interval,
            last_scanned_at,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn never_scanned_monitor_is_due() {
        assert!(monitor(None, 60).is_due(Utc::now()));
    }

    #[test]
    fn monitor_is_throttled_within_interval() {
        let now = Utc::now();
        let m = monitor(Some(now - Duration::minutes(10)), 60);
        assert!(!m.is_due(now));
        assert!(m.is_due(now + Duration::minutes(50)));
    }

    #[test]
    fn errored_qualification_maps_to_ignored() {
        let outcome = QualificationOutcome::Errored {
            error: "bad json".to_string(),
        };
        assert_eq!(outcome.status(), LeadStatus::Ignored);
    }

    #[test]
    fn last_attempt_is_detected_from_retry_count() {
        let now = Utc::now();
        let mut item = PostingQueueItem {
            id: Uuid::new_v4(),
            reply_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            scheduled_for: now,
            priority: 10,
            status: QueueStatus::Processing,
            retry_count: 0,
            max_attempts: 3,
            last_error: None,
            result_link: None,
            started_at: Some(now),
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(!item.is_last_attempt());
        item.retry_count = 2;
        assert!(item.is_last_attempt());
    }

    #[test]
    fn account_debug_redacts_refresh_token() {
        let now = Utc::now();
        let account = RedditAccount {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            username: "acme_helper".to_string(),
            refresh_token: "super-secret".to_string(),
            is_active: true,
            warmup_enabled: false,
            warmup_subreddits: vec![],
            warmup_daily_limit: 0,
            last_posted_at: None,
            created_at: now,
            updated_at: now,
        };
        let debug = format!("{account:?}");
        assert!(!debug.contains("super-secret"));
        let json = serde_json::to_string(&account).expect("serialize");
        assert!(!json.contains("super-secret"));
    }
}
