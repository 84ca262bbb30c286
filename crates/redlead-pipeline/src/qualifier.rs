//! Qualification: ask the LLM whether each `new` lead is worth answering and
//! store reply drafts for the ones that are.

use std::collections::HashMap;

use chrono::Utc;
use redlead_ai::Qualification;
use redlead_core::{
    Campaign, NewReply, PipelineSettings, PotentialLead, QualificationOutcome, ReplyKind,
    ReplyStatus,
};
use redlead_db::Store;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enqueue::schedule_approved;
use crate::error::PipelineError;
use crate::seconds;
use crate::sources::LeadEvaluator;

/// Reddit caps message subjects at 100 characters.
const MAX_SUBJECT_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct QualifyRequest {
    /// Defaults to the configured batch size when absent.
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
}

/// Per-invocation counters shared by the qualifier and the engagement tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Qualify one batch of `new` leads.
///
/// Each claimed lead gets exactly one attempt: malformed model output or an
/// API error marks it `ignored` with the error recorded. Claims left behind
/// by a run that never finished are expired to `ignored` first, once older
/// than `processing_timeout_secs`.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if stale claims cannot be expired, leads
/// cannot be claimed, or a campaign cannot be loaded. In the last case the
/// leads not yet processed are handed back to `new` before returning.
pub async fn run_qualify(
    store: &dyn Store,
    evaluator: &dyn LeadEvaluator,
    settings: &PipelineSettings,
    request: QualifyRequest,
) -> Result<StageSummary, PipelineError> {
    let expired = store
        .reclaim_stale_leads(Utc::now() - seconds(settings.processing_timeout_secs))
        .await?;
    for lead in &expired {
        tracing::warn!(lead_id = %lead.id, "qualifying claim expired; lead ignored");
    }

    let batch_size = request.batch_size.unwrap_or(settings.qualify_batch_size);
    let leads = store
        .claim_new_leads(batch_size, request.organization_id)
        .await?;

    let mut summary = StageSummary::default();
    let mut campaigns: HashMap<Uuid, Option<Campaign>> = HashMap::new();

    for (index, lead) in leads.iter().enumerate() {
        summary.processed += 1;

        let campaign = match campaigns.get(&lead.campaign_id) {
            Some(cached) => cached.clone(),
            None => match store.get_campaign(lead.campaign_id).await {
                Ok(loaded) => {
                    campaigns.insert(lead.campaign_id, loaded.clone());
                    loaded
                }
                Err(e) => {
                    tracing::error!(lead_id = %lead.id, error = %e, "failed to load campaign");
                    release_claims(store, &leads[index..]).await;
                    return Err(e.into());
                }
            },
        };

        let (outcome, verdict) = match &campaign {
            None => (
                QualificationOutcome::Errored {
                    error: format!("campaign {} not found", lead.campaign_id),
                },
                None,
            ),
            Some(campaign) => match evaluator.qualify_lead(campaign, lead).await {
                Ok(verdict) => (outcome_for(campaign, &verdict), Some(verdict)),
                Err(e) => {
                    tracing::warn!(lead_id = %lead.id, error = %e, "qualification failed");
                    (
                        QualificationOutcome::Errored {
                            error: e.to_string(),
                        },
                        None,
                    )
                }
            },
        };

        if let Err(e) = store.complete_qualification(lead.id, &outcome).await {
            if e.is_invalid_transition() {
                tracing::warn!(lead_id = %lead.id, "lead left qualifying concurrently; skipping");
            } else {
                tracing::error!(lead_id = %lead.id, error = %e, "failed to store qualification");
            }
            summary.failed += 1;
            continue;
        }

        match outcome {
            QualificationOutcome::Qualified { score, .. } => {
                summary.succeeded += 1;
                tracing::info!(lead_id = %lead.id, score, "lead qualified");
                if let (Some(campaign), Some(verdict)) = (&campaign, &verdict) {
                    store_drafts(store, settings, campaign, lead, verdict).await;
                }
            }
            QualificationOutcome::Ignored { score, .. } => {
                summary.skipped += 1;
                tracing::debug!(lead_id = %lead.id, score, "lead ignored");
            }
            QualificationOutcome::Errored { .. } => summary.failed += 1,
        }
    }

    tracing::info!(
        processed = summary.processed,
        qualified = summary.succeeded,
        ignored = summary.skipped,
        failed = summary.failed,
        "qualification finished"
    );
    Ok(summary)
}

/// Hand unprocessed claims back to `new`. If this fails too, the claims
/// expire on a later run.
async fn release_claims(store: &dyn Store, leads: &[PotentialLead]) {
    let ids: Vec<Uuid> = leads.iter().map(|lead| lead.id).collect();
    match store.release_lead_claims(&ids).await {
        Ok(released) => tracing::warn!(released, "released unprocessed lead claims"),
        Err(e) => tracing::error!(error = %e, "failed to release lead claims"),
    }
}

fn outcome_for(campaign: &Campaign, verdict: &Qualification) -> QualificationOutcome {
    let score = verdict.relevance_score;
    let reasoning = verdict.reasoning.clone();
    if verdict.is_lead && score >= campaign.min_relevance_score {
        QualificationOutcome::Qualified { score, reasoning }
    } else {
        QualificationOutcome::Ignored { score, reasoning }
    }
}

/// Store the comment and DM drafts for a qualified lead, approving and
/// enqueuing them straight away for auto-approve campaigns. Failures are
/// logged; the lead stays qualified either way.
async fn store_drafts(
    store: &dyn Store,
    settings: &PipelineSettings,
    campaign: &Campaign,
    lead: &PotentialLead,
    verdict: &Qualification,
) {
    let status = if campaign.auto_approve {
        ReplyStatus::Approved
    } else {
        ReplyStatus::New
    };

    let mut drafts = Vec::new();
    if let Some(comment) = &verdict.comment {
        drafts.push(NewReply {
            organization_id: lead.organization_id,
            campaign_id: Some(campaign.id),
            lead_id: Some(lead.id),
            kind: ReplyKind::Comment,
            target_id: lead.fullname(),
            subreddit: Some(lead.subreddit.clone()),
            subject: None,
            body: comment.clone(),
            status,
        });
    }
    if campaign.generate_dms && lead.author != "[deleted]" {
        if let Some(dm) = &verdict.dm {
            drafts.push(NewReply {
                organization_id: lead.organization_id,
                campaign_id: Some(campaign.id),
                lead_id: Some(lead.id),
                kind: ReplyKind::Dm,
                target_id: lead.author.clone(),
                subreddit: Some(lead.subreddit.clone()),
                subject: Some(dm_subject(&lead.title)),
                body: dm.clone(),
                status,
            });
        }
    }

    for draft in &drafts {
        let reply = match store.insert_reply(draft).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    lead_id = %lead.id,
                    kind = %draft.kind,
                    error = %e,
                    "failed to store draft"
                );
                continue;
            }
        };
        if !campaign.auto_approve {
            continue;
        }

        let account = match store
            .active_account_for_organization(lead.organization_id)
            .await
        {
            Ok(Some(account)) => account,
            Ok(None) => {
                tracing::warn!(
                    reply_id = %reply.id,
                    organization_id = %lead.organization_id,
                    "no active account; draft left approved"
                );
                continue;
            }
            Err(e) => {
                tracing::error!(reply_id = %reply.id, error = %e, "failed to load posting account");
                continue;
            }
        };
        if let Err(e) = schedule_approved(store, settings, &reply, &account, Utc::now()).await {
            tracing::error!(reply_id = %reply.id, error = %e, "failed to enqueue approved draft");
        }
    }
}

fn dm_subject(title: &str) -> String {
    let subject = format!("Re: {}", title.trim());
    if subject.chars().count() <= MAX_SUBJECT_CHARS {
        subject
    } else {
        subject.chars().take(MAX_SUBJECT_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(min_relevance_score: i16) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: "c".to_string(),
            business_name: "b".to_string(),
            business_description: "d".to_string(),
            keywords: vec!["need developer".to_string()],
            excluded_keywords: vec![],
            min_relevance_score,
            auto_approve: false,
            generate_dms: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn verdict(score: i16, is_lead: bool) -> Qualification {
        Qualification {
            relevance_score: score,
            is_lead,
            reasoning: "r".to_string(),
            comment: None,
            dm: None,
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(matches!(
            outcome_for(&campaign(70), &verdict(70, true)),
            QualificationOutcome::Qualified { score: 70, .. }
        ));
        assert!(matches!(
            outcome_for(&campaign(70), &verdict(69, true)),
            QualificationOutcome::Ignored { score: 69, .. }
        ));
    }

    #[test]
    fn high_score_without_lead_flag_is_ignored() {
        assert!(matches!(
            outcome_for(&campaign(50), &verdict(95, false)),
            QualificationOutcome::Ignored { .. }
        ));
    }

    #[test]
    fn dm_subject_is_capped() {
        assert_eq!(dm_subject("  Need developer "), "Re: Need developer");
        assert_eq!(dm_subject(&"x".repeat(300)).chars().count(), MAX_SUBJECT_CHARS);
    }
}
