//! Lifecycle enums for leads, replies and posting queue items.
//!
//! Every status is stored as its `snake_case` string. Transitions are
//! forward-only; [`QueueStatus`] is the one exception, where
//! `processing -> pending` re-enters the queue either as a counted retry or
//! as a pacing deferral that never reached Reddit.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Qualifying,
    QualifiedLead,
    Ignored,
}

impl LeadStatus {
    pub const ALL: [Self; 4] = [
        Self::New,
        Self::Qualifying,
        Self::QualifiedLead,
        Self::Ignored,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Qualifying => "qualifying",
            Self::QualifiedLead => "qualified_lead",
            Self::Ignored => "ignored",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::QualifiedLead | Self::Ignored)
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::Qualifying)
                | (Self::Qualifying, Self::QualifiedLead | Self::Ignored)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    New,
    Approved,
    Queued,
    Posted,
    Failed,
}

impl ReplyStatus {
    pub const ALL: [Self; 5] = [
        Self::New,
        Self::Approved,
        Self::Queued,
        Self::Posted,
        Self::Failed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Approved => "approved",
            Self::Queued => "queued",
            Self::Posted => "posted",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Posted | Self::Failed)
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::Approved)
                | (Self::Approved, Self::Queued)
                | (Self::Queued, Self::Posted | Self::Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub const ALL: [Self; 4] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// `Processing -> Pending` is a retry (paired with an incremented retry
    /// count) or a deferral where no publish was attempted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed | Self::Failed | Self::Pending)
        )
    }
}

/// What a generated reply is posted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    /// Public comment on the lead's post.
    Comment,
    /// Private message to the lead's author.
    Dm,
    /// Non-promotional comment that seasons an account.
    Warmup,
}

impl ReplyKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Dm => "dm",
            Self::Warmup => "warmup",
        }
    }

    /// Public comments have engagement metrics; DMs do not.
    #[must_use]
    pub fn is_public(self) -> bool {
        matches!(self, Self::Comment | Self::Warmup)
    }

    /// Queue priority used when enqueuing a reply of this kind.
    #[must_use]
    pub fn default_priority(self) -> i16 {
        match self {
            Self::Comment | Self::Dm => 10,
            Self::Warmup => 0,
        }
    }
}

macro_rules! impl_status_text {
    ($ty:ty, $kind:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .into_iter()
                    .find(|status| status.as_str() == s)
                    .ok_or_else(|| CoreError::UnknownStatus {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }
    };
}

impl_status_text!(LeadStatus, "lead");
impl_status_text!(ReplyStatus, "reply");
impl_status_text!(QueueStatus, "queue");

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplyKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comment" => Ok(Self::Comment),
            "dm" => Ok(Self::Dm),
            "warmup" => Ok(Self::Warmup),
            other => Err(CoreError::UnknownReplyKind(other.to_string())),
        }
    }
}
