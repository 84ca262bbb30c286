//! Wire types for the Reddit API and the simplified values handed to callers.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::text::is_removed_marker;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// OAuth token response. Reddit answers some failed grants with `200` and an
/// `error` field instead of a token.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: Option<String>,
    pub(crate) expires_in: Option<u64>,
    pub(crate) error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Listing {
    pub(crate) data: ListingData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListingData {
    pub(crate) children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Child {
    pub(crate) kind: String,
    pub(crate) data: PostData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostData {
    pub(crate) id: String,
    pub(crate) subreddit: Option<String>,
    pub(crate) author: Option<String>,
    pub(crate) title: Option<String>,
    pub(crate) selftext: Option<String>,
    pub(crate) permalink: Option<String>,
    pub(crate) created_utc: Option<f64>,
    pub(crate) removed_by_category: Option<String>,
    #[serde(default)]
    pub(crate) locked: bool,
    #[serde(default)]
    pub(crate) archived: bool,
}

/// Envelope of `api_type=json` write endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct JsonEnvelope {
    pub(crate) json: JsonBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonBody {
    /// `[[code, message, field], …]`
    #[serde(default)]
    pub(crate) errors: Vec<Vec<serde_json::Value>>,
    pub(crate) data: Option<JsonData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonData {
    #[serde(default)]
    pub(crate) things: Vec<CreatedThing>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedThing {
    pub(crate) data: CreatedThingData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedThingData {
    pub(crate) name: String,
    pub(crate) permalink: Option<String>,
}

// ---------------------------------------------------------------------------
// Public values
// ---------------------------------------------------------------------------

/// A submission returned by search or a subreddit listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RedditPost {
    /// Base-36 id without the `t3_` prefix.
    pub id: String,
    pub subreddit: String,
    pub author: String,
    pub title: String,
    pub body: String,
    pub permalink: String,
    pub created_at: DateTime<Utc>,
    /// Deleted by its author or removed by moderators.
    pub is_removed: bool,
    /// Locked or archived threads no longer accept comments.
    pub is_closed: bool,
}

impl RedditPost {
    #[must_use]
    pub fn fullname(&self) -> String {
        format!("t3_{}", self.id)
    }

    /// Title and body joined for keyword matching.
    #[must_use]
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.body)
    }

    #[must_use]
    pub fn is_automoderator(&self) -> bool {
        self.author.eq_ignore_ascii_case("automoderator")
    }

    pub(crate) fn from_child(child: Child) -> Option<Self> {
        if child.kind != "t3" {
            return None;
        }
        let data = child.data;
        let permalink = data.permalink?;
        let created_utc = data.created_utc?;
        #[allow(clippy::cast_possible_truncation)]
        let created_at = DateTime::from_timestamp(created_utc.trunc() as i64, 0)?;

        let author = data.author.unwrap_or_else(|| "[deleted]".to_string());
        let body = data.selftext.unwrap_or_default();
        let is_removed =
            data.removed_by_category.is_some() || is_removed_marker(&body) || author == "[deleted]";

        Some(Self {
            id: data.id,
            subreddit: data.subreddit.unwrap_or_default(),
            author,
            title: data.title.unwrap_or_default(),
            body,
            permalink,
            created_at,
            is_removed,
            is_closed: data.locked || data.archived,
        })
    }
}

/// A comment or message created by a write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedThing {
    /// Fullname, e.g. `t1_k2x9q0a`.
    pub fullname: String,
    /// Absolute link to the created thing.
    pub url: String,
}
