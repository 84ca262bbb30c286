//! HTTP client for the Reddit API.
//!
//! Reads (search, listings, comment trees) use an application-only token from
//! the client-credentials grant, cached until shortly before it expires.
//! Writes (comments, private messages) act as a connected account and
//! exchange that account's refresh token for a short-lived user token.

use std::time::{Duration, Instant};

use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use redlead_core::{AppConfig, ConfigError, EngagementMetrics};

use crate::error::RedditError;
use crate::retry::retry_with_backoff;
use crate::text::is_removed_marker;
use crate::types::{JsonEnvelope, Listing, PublishedThing, RedditPost, TokenResponse};

const DEFAULT_AUTH_BASE_URL: &str = "https://www.reddit.com/";
const DEFAULT_API_BASE_URL: &str = "https://oauth.reddit.com/";
const WEB_BASE_URL: &str = "https://www.reddit.com";
/// Refresh the cached app token this long before Reddit expires it.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Credentials and transport settings for [`RedditClient`].
#[derive(Clone)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl std::fmt::Debug for RedditConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("user_agent", &self.user_agent)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .finish()
    }
}

impl RedditConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when the app credentials are unset.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let (client_id, client_secret) = config.reddit_credentials()?;
        Ok(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            user_agent: config.reddit_user_agent.clone(),
            timeout_secs: config.http_timeout_secs,
            max_retries: config.http_max_retries,
            backoff_base_ms: config.http_retry_backoff_base_ms,
        })
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Client for the Reddit REST API.
///
/// Use [`RedditClient::new`] for production or [`RedditClient::with_base_urls`]
/// to point at a mock server in tests.
pub struct RedditClient {
    http: Client,
    config: RedditConfig,
    auth_base: Url,
    api_base: Url,
    app_token: Mutex<Option<CachedToken>>,
}

impl RedditClient {
    /// Creates a client pointed at the production Reddit endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`RedditError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(config: RedditConfig) -> Result<Self, RedditError> {
        Self::with_base_urls(config, DEFAULT_AUTH_BASE_URL, DEFAULT_API_BASE_URL)
    }

    /// Creates a client with custom token and API base URLs (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`RedditError::Http`] if the `reqwest::Client` cannot be
    /// constructed, or [`RedditError::InvalidUrl`] if a base URL is invalid.
    pub fn with_base_urls(
        config: RedditConfig,
        auth_base: &str,
        api_base: &str,
    ) -> Result<Self, RedditError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            config,
            auth_base: parse_base_url(auth_base)?,
            api_base: parse_base_url(api_base)?,
            app_token: Mutex::new(None),
        })
    }

    // -- reads ---------------------------------------------------------------

    /// Searches submissions matching `query`, newest first.
    ///
    /// With a non-empty `subreddits` list the search is restricted to those
    /// subreddits; otherwise it covers all of Reddit.
    ///
    /// # Errors
    ///
    /// Returns a [`RedditError`] once retries on transient failures are exhausted.
    pub async fn search_new(
        &self,
        query: &str,
        subreddits: &[String],
        limit: u32,
    ) -> Result<Vec<RedditPost>, RedditError> {
        let mut url = if subreddits.is_empty() {
            self.api_url("search")?
        } else {
            self.api_url(&format!("r/{}/search", subreddits.join("+")))?
        };
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("sort", "new")
            .append_pair("type", "link")
            .append_pair(
                "restrict_sr",
                if subreddits.is_empty() { "false" } else { "true" },
            )
            .append_pair("limit", &limit.to_string())
            .append_pair("raw_json", "1");

        let listing: Listing = self.get_json(&url, "search").await?;
        let posts: Vec<RedditPost> = listing
            .data
            .children
            .into_iter()
            .filter_map(RedditPost::from_child)
            .collect();

        tracing::debug!(query, results = posts.len(), "Reddit search completed");
        Ok(posts)
    }

    /// Current hot submissions of one subreddit.
    ///
    /// # Errors
    ///
    /// Returns a [`RedditError`] once retries on transient failures are exhausted.
    pub async fn hot_posts(
        &self,
        subreddit: &str,
        limit: u32,
    ) -> Result<Vec<RedditPost>, RedditError> {
        let mut url = self.api_url(&format!("r/{subreddit}/hot"))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("raw_json", "1");

        let listing: Listing = self.get_json(&url, "hot").await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .filter_map(RedditPost::from_child)
            .collect())
    }

    /// Score, direct reply count and removal state of one comment.
    ///
    /// `post_id` and `comment_id` are base-36 ids without their `t3_`/`t1_`
    /// prefixes. A comment missing from the tree is reported as removed.
    ///
    /// # Errors
    ///
    /// Returns a [`RedditError`] once retries on transient failures are exhausted.
    pub async fn fetch_comment_metrics(
        &self,
        post_id: &str,
        comment_id: &str,
    ) -> Result<EngagementMetrics, RedditError> {
        let mut url = self.api_url(&format!("comments/{post_id}/_/{comment_id}"))?;
        url.query_pairs_mut()
            .append_pair("depth", "2")
            .append_pair("limit", "100")
            .append_pair("raw_json", "1");

        let tree: Value = self.get_json(&url, "comment tree").await?;
        Ok(metrics_from_tree(&tree, comment_id))
    }

    // -- writes --------------------------------------------------------------

    /// Posts `text` as a reply to `parent_fullname` (a `t3_` post or `t1_` comment).
    ///
    /// # Errors
    ///
    /// Returns [`RedditError::Auth`] for a revoked refresh token,
    /// [`RedditError::Api`] for application errors such as `THREAD_LOCKED`,
    /// or a transport/status error.
    pub async fn submit_comment(
        &self,
        refresh_token: &str,
        parent_fullname: &str,
        text: &str,
    ) -> Result<PublishedThing, RedditError> {
        let token = self.user_token(refresh_token).await?;
        let url = self.api_url("api/comment")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .form(&[
                ("api_type", "json"),
                ("thing_id", parent_fullname),
                ("text", text),
            ])
            .send()
            .await?;
        let envelope: JsonEnvelope = read_json(check_status(response).await?, "comment").await?;
        check_api_errors(&envelope)?;

        let thing = envelope
            .json
            .data
            .and_then(|data| data.things.into_iter().next())
            .ok_or_else(|| RedditError::Api {
                code: "NO_THING".to_string(),
                message: "comment response did not include the created comment".to_string(),
            })?;

        let url = match thing.data.permalink {
            Some(permalink) => format!("{WEB_BASE_URL}{permalink}"),
            None => format!(
                "{WEB_BASE_URL}/comments/{}/_/{}",
                strip_kind(parent_fullname),
                strip_kind(&thing.data.name)
            ),
        };
        Ok(PublishedThing {
            fullname: thing.data.name,
            url,
        })
    }

    /// Sends a private message from the account to `to`.
    ///
    /// # Errors
    ///
    /// Same classification as [`RedditClient::submit_comment`].
    pub async fn send_message(
        &self,
        refresh_token: &str,
        to: &str,
        subject: &str,
        text: &str,
    ) -> Result<(), RedditError> {
        let token = self.user_token(refresh_token).await?;
        let url = self.api_url("api/compose")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .form(&[
                ("api_type", "json"),
                ("to", to),
                ("subject", subject),
                ("text", text),
            ])
            .send()
            .await?;
        let envelope: JsonEnvelope = read_json(check_status(response).await?, "compose").await?;
        check_api_errors(&envelope)
    }

    // -- tokens --------------------------------------------------------------

    async fn app_token(&self) -> Result<String, RedditError> {
        let mut cached = self.app_token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let (value, ttl) = retry_with_backoff(
            self.config.max_retries,
            self.config.backoff_base_ms,
            || self.request_token(&[("grant_type", "client_credentials")]),
        )
        .await?;
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });
        Ok(value)
    }

    async fn user_token(&self, refresh_token: &str) -> Result<String, RedditError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let (value, _) = retry_with_backoff(
            self.config.max_retries,
            self.config.backoff_base_ms,
            || self.request_token(&form),
        )
        .await?;
        Ok(value)
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<(String, Duration), RedditError> {
        let url = self
            .auth_base
            .join("api/v1/access_token")
            .map_err(|e| RedditError::InvalidUrl(e.to_string()))?;
        let response = self
            .http
            .post(url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(RedditError::Auth(format!(
                "token request rejected with status {status}"
            )));
        }
        let token: TokenResponse = read_json(check_status(response).await?, "token").await?;

        if let Some(error) = token.error {
            return Err(RedditError::Auth(error));
        }
        let value = token
            .access_token
            .ok_or_else(|| RedditError::Auth("token response without access_token".to_string()))?;
        Ok((value, Duration::from_secs(token.expires_in.unwrap_or(3_600))))
    }

    // -- plumbing ------------------------------------------------------------

    fn api_url(&self, path: &str) -> Result<Url, RedditError> {
        self.api_base
            .join(path)
            .map_err(|e| RedditError::InvalidUrl(format!("{path}: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        context: &str,
    ) -> Result<T, RedditError> {
        retry_with_backoff(
            self.config.max_retries,
            self.config.backoff_base_ms,
            || async move {
                let token = self.app_token().await?;
                let response = self.http.get(url.clone()).bearer_auth(token).send().await?;
                read_json(check_status(response).await?, context).await
            },
        )
        .await
    }
}

fn parse_base_url(base_url: &str) -> Result<Url, RedditError> {
    // Exactly one trailing slash so `join` appends instead of replacing the last segment.
    let normalised = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| RedditError::InvalidUrl(format!("{base_url}: {e}")))
}

/// `t3_abc` → `abc`; ids without a kind prefix pass through.
fn strip_kind(fullname: &str) -> &str {
    match fullname.split_once('_') {
        Some((kind, id)) if kind.len() == 2 && kind.starts_with('t') => id,
        _ => fullname,
    }
}

async fn check_status(response: Response) -> Result<Response, RedditError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().split('.').next()?.parse::<u64>().ok());
        return Err(RedditError::RateLimited { retry_after_secs });
    }
    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(MAX_ERROR_BODY_CHARS)
        .collect();
    Err(RedditError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response, context: &str) -> Result<T, RedditError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| RedditError::Deserialize {
        context: context.to_string(),
        source: e,
    })
}

fn check_api_errors(envelope: &JsonEnvelope) -> Result<(), RedditError> {
    let Some(first) = envelope.json.errors.first() else {
        return Ok(());
    };
    let field = |i: usize| {
        first
            .get(i)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Err(RedditError::Api {
        code: field(0),
        message: field(1),
    })
}

fn metrics_from_tree(tree: &Value, comment_id: &str) -> EngagementMetrics {
    let comment = tree
        .get(1)
        .and_then(|listing| listing.pointer("/data/children"))
        .and_then(Value::as_array)
        .and_then(|children| {
            children.iter().find(|child| {
                child["kind"] == "t1" && child["data"]["id"].as_str() == Some(comment_id)
            })
        });

    let Some(comment) = comment else {
        return EngagementMetrics {
            score: 0,
            reply_count: 0,
            is_removed: true,
        };
    };
    let data = &comment["data"];

    let score = data["score"]
        .as_i64()
        .map_or(0, |s| i32::try_from(s).unwrap_or(i32::MAX));
    let reply_count: usize = data
        .pointer("/replies/data/children")
        .and_then(Value::as_array)
        .map_or(0, |children| {
            children
                .iter()
                .map(|child| match child["kind"].as_str() {
                    Some("t1") => 1,
                    // Collapsed siblings: their ids are listed without bodies.
                    Some("more") => child["data"]["children"].as_array().map_or(0, Vec::len),
                    _ => 0,
                })
                .sum()
        });
    let is_removed = data["body"].as_str().is_some_and(is_removed_marker)
        || data["author"].as_str() == Some("[deleted]")
        || !data["removed_by_category"].is_null();

    EngagementMetrics {
        score,
        reply_count: i32::try_from(reply_count).unwrap_or(i32::MAX),
        is_removed,
    }
}
