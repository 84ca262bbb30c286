//! Prompt construction for qualification and warm-up comments.

use std::fmt::Write as _;

use redlead_core::{Campaign, PotentialLead};

use crate::util::truncate_to_char_boundary;

/// Post bodies longer than this are cut before they reach the prompt.
const MAX_POST_BODY_BYTES: usize = 4_000;

const QUALIFICATION_SYSTEM: &str = "You evaluate Reddit posts as sales leads for a business. \
A good lead is a person who currently needs what the business offers and would plausibly \
welcome a helpful answer. Job postings, self-promotion, memes and people who already \
solved their problem are not leads. \
Replies you draft must read like a knowledgeable community member: answer the question \
first, mention the business at most once and only where it genuinely helps, never use \
sales language, links or hashtags. Respond with a single JSON object and nothing else.";

const WARMUP_SYSTEM: &str = "You write short Reddit comments for an account that takes part \
in communities it cares about. Comments are 1-3 sentences, specific to the post, friendly \
and never promotional: no links, no product or company names, no calls to action. \
Respond with a single JSON object and nothing else.";

/// System and user messages asking for a verdict on `lead`.
#[must_use]
pub fn qualification_prompt(campaign: &Campaign, lead: &PotentialLead) -> (String, String) {
    let mut user = String::new();
    let _ = writeln!(user, "Business: {}", campaign.business_name);
    let _ = writeln!(user, "What it offers: {}", campaign.business_description);
    let _ = writeln!(user, "Matched keyword: {}", lead.matched_keyword);
    let _ = writeln!(user);
    let _ = writeln!(user, "Subreddit: r/{}", lead.subreddit);
    let _ = writeln!(user, "Title: {}", lead.title);
    let _ = writeln!(
        user,
        "Body:\n{}",
        truncate_to_char_boundary(lead.body.trim(), MAX_POST_BODY_BYTES)
    );
    let _ = writeln!(user);
    user.push_str(
        "Return JSON with these fields:\n\
         - relevance_score: integer 0-100, how well the post matches the business\n\
         - is_lead: boolean\n\
         - reasoning: one or two sentences\n\
         - comment: a helpful public reply to the post, or null when is_lead is false\n",
    );
    if campaign.generate_dms {
        user.push_str(
            "- dm: a short private message to the author, or null when is_lead is false\n",
        );
    }

    (QUALIFICATION_SYSTEM.to_string(), user)
}

/// System and user messages asking for a warm-up comment on a hot post.
#[must_use]
pub fn warmup_prompt(subreddit: &str, title: &str, body: &str) -> (String, String) {
    let mut user = String::new();
    let _ = writeln!(user, "Subreddit: r/{subreddit}");
    let _ = writeln!(user, "Title: {title}");
    if !body.trim().is_empty() {
        let _ = writeln!(
            user,
            "Body:\n{}",
            truncate_to_char_boundary(body.trim(), MAX_POST_BODY_BYTES)
        );
    }
    user.push_str("\nReturn JSON: {\"comment\": \"...\"}\n");
    (WARMUP_SYSTEM.to_string(), user)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use redlead_core::LeadStatus;
    use uuid::Uuid;

    use super::*;

    fn campaign() -> Campaign {
        let now = Utc::now();
        Campaign {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: "mvp-builders".to_string(),
            business_name: "Northwind Studio".to_string(),
            business_description: "Fixed-price MVP development for early-stage founders"
                .to_string(),
            keywords: vec!["need developer".to_string()],
            excluded_keywords: vec![],
            min_relevance_score: 70,
            auto_approve: false,
            generate_dms: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn lead(body: String) -> PotentialLead {
        let now = Utc::now();
        PotentialLead {
            id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            source_id: "abc1".to_string(),
            subreddit: "startups".to_string(),
            author: "founder42".to_string(),
            title: "Need developer for MVP".to_string(),
            body,
            permalink: "/r/startups/comments/abc1/slug/".to_string(),
            matched_keyword: "need developer".to_string(),
            posted_at: now,
            status: LeadStatus::Qualifying,
            relevance_score: None,
            qualification_reasoning: None,
            qualification_error: None,
            qualified_at: None,
            claimed_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn qualification_prompt_carries_business_and_post() {
        let (system, user) =
            qualification_prompt(&campaign(), &lead("We have a design.".to_string()));
        assert!(system.contains("JSON"));
        assert!(user.contains("Northwind Studio"));
        assert!(user.contains("r/startups"));
        assert!(user.contains("We have a design."));
        assert!(!user.contains("- dm:"));
    }

    #[test]
    fn dm_field_requested_only_when_enabled() {
        let mut campaign = campaign();
        campaign.generate_dms = true;
        let (_, user) = qualification_prompt(&campaign, &lead(String::new()));
        assert!(user.contains("- dm:"));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let (_, user) = qualification_prompt(&campaign(), &lead("y".repeat(10_000)));
        assert!(user.len() < 5_000);
    }

    #[test]
    fn warmup_prompt_skips_empty_body() {
        let (_, user) = warmup_prompt("rust", "Show your side project", "  ");
        assert!(!user.contains("Body:"));
        assert!(user.contains("r/rust"));
    }
}
