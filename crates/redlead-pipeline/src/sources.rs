//! Seams between the stages and the external services they call.
//!
//! Production wiring implements these on [`RedditClient`] and
//! [`OpenAiClient`]; tests substitute in-memory fakes.

use async_trait::async_trait;
use redlead_ai::{AiError, OpenAiClient, Qualification};
use redlead_core::{Campaign, EngagementMetrics, PotentialLead};
use redlead_reddit::{PublishedThing, RedditClient, RedditError, RedditPost};

/// Read access to Reddit submissions.
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Newest submissions matching `query`, restricted to `subreddits` when non-empty.
    async fn search_new(
        &self,
        query: &str,
        subreddits: &[String],
        limit: u32,
    ) -> Result<Vec<RedditPost>, RedditError>;

    async fn hot_posts(&self, subreddit: &str, limit: u32)
        -> Result<Vec<RedditPost>, RedditError>;
}

/// Account-scoped writes. Implementations must not retry internally.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn submit_comment(
        &self,
        refresh_token: &str,
        parent_fullname: &str,
        text: &str,
    ) -> Result<PublishedThing, RedditError>;

    async fn send_message(
        &self,
        refresh_token: &str,
        to: &str,
        subject: &str,
        text: &str,
    ) -> Result<(), RedditError>;
}

#[async_trait]
pub trait EngagementSource: Send + Sync {
    async fn fetch_comment_metrics(
        &self,
        post_id: &str,
        comment_id: &str,
    ) -> Result<EngagementMetrics, RedditError>;
}

/// The LLM side of the pipeline.
#[async_trait]
pub trait LeadEvaluator: Send + Sync {
    async fn qualify_lead(
        &self,
        campaign: &Campaign,
        lead: &PotentialLead,
    ) -> Result<Qualification, AiError>;

    async fn write_warmup_comment(
        &self,
        subreddit: &str,
        title: &str,
        body: &str,
    ) -> Result<String, AiError>;
}

#[async_trait]
impl SearchSource for RedditClient {
    async fn search_new(
        &self,
        query: &str,
        subreddits: &[String],
        limit: u32,
    ) -> Result<Vec<RedditPost>, RedditError> {
        RedditClient::search_new(self, query, subreddits, limit).await
    }

    async fn hot_posts(
        &self,
        subreddit: &str,
        limit: u32,
    ) -> Result<Vec<RedditPost>, RedditError> {
        RedditClient::hot_posts(self, subreddit, limit).await
    }
}

#[async_trait]
impl Publisher for RedditClient {
    async fn submit_comment(
        &self,
        refresh_token: &str,
        parent_fullname: &str,
        text: &str,
    ) -> Result<PublishedThing, RedditError> {
        RedditClient::submit_comment(self, refresh_token, parent_fullname, text).await
    }

    async fn send_message(
        &self,
        refresh_token: &str,
        to: &str,
        subject: &str,
        text: &str,
    ) -> Result<(), RedditError> {
        RedditClient::send_message(self, refresh_token, to, subject, text).await
    }
}

#[async_trait]
impl EngagementSource for RedditClient {
    async fn fetch_comment_metrics(
        &self,
        post_id: &str,
        comment_id: &str,
    ) -> Result<EngagementMetrics, RedditError> {
        RedditClient::fetch_comment_metrics(self, post_id, comment_id).await
    }
}

#[async_trait]
impl LeadEvaluator for OpenAiClient {
    async fn qualify_lead(
        &self,
        campaign: &Campaign,
        lead: &PotentialLead,
    ) -> Result<Qualification, AiError> {
        OpenAiClient::qualify_lead(self, campaign, lead).await
    }

    async fn write_warmup_comment(
        &self,
        subreddit: &str,
        title: &str,
        body: &str,
    ) -> Result<String, AiError> {
        OpenAiClient::write_warmup_comment(self, subreddit, title, body).await
    }
}
