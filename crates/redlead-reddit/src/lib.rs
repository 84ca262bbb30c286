//! Reddit API client: search and listings for discovery, account-scoped
//! writes for posting, and comment trees for engagement tracking.

pub mod client;
pub mod error;
pub(crate) mod retry;
pub mod text;
pub mod types;

pub use client::{RedditClient, RedditConfig};
pub use error::RedditError;
pub use text::{is_removed_marker, mentions_all_words, mentions_phrase, normalize_text_for_match};
pub use types::{PublishedThing, RedditPost};
