//! LLM access for lead qualification and warm-up comments.
//!
//! Talks to OpenAI chat completions in JSON mode and validates the answers
//! into typed verdicts.

pub mod client;
pub mod error;
pub mod parse;
pub mod prompts;
pub(crate) mod retry;
pub mod util;

pub use client::{OpenAiClient, OpenAiConfig};
pub use error::AiError;
pub use parse::{parse_qualification, parse_warmup, Qualification};
