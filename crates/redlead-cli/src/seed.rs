//! `seed` command: upsert campaigns, their monitors and posting accounts
//! from the YAML seed file.

use std::path::Path;

use anyhow::Context;
use redlead_core::CampaignsFile;
use redlead_db::Store;
use serde::Serialize;

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub(crate) struct SeedSummary {
    pub campaigns: usize,
    pub accounts: usize,
}

pub(crate) async fn run_seed<F>(
    store: &dyn Store,
    path: &Path,
    lookup_env: F,
) -> anyhow::Result<SeedSummary>
where
    F: Fn(&str) -> Option<String>,
{
    let file = redlead_core::load_campaigns(path)
        .with_context(|| format!("loading {}", path.display()))?;
    seed_file(store, &file, lookup_env).await
}

/// Seed an already-parsed file. Every account's refresh token is resolved
/// before anything is written, so a missing variable leaves the store untouched.
///
/// # Errors
///
/// Returns an error if a refresh-token variable is unset or empty, or if a
/// store write fails.
pub(crate) async fn seed_file<F>(
    store: &dyn Store,
    file: &CampaignsFile,
    lookup_env: F,
) -> anyhow::Result<SeedSummary>
where
    F: Fn(&str) -> Option<String>,
{
    let tokens = file
        .accounts
        .iter()
        .map(|account| {
            lookup_env(&account.refresh_token_env)
                .filter(|token| !token.trim().is_empty())
                .with_context(|| {
                    format!(
                        "refresh token for account '{}' not found in ${}",
                        account.username, account.refresh_token_env
                    )
                })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut summary = SeedSummary::default();
    for campaign in &file.campaigns {
        let stored = store.upsert_campaign(campaign).await?;
        tracing::info!(campaign_id = %stored.id, name = %stored.name, "campaign seeded");
        summary.campaigns += 1;
    }
    for (account, token) in file.accounts.iter().zip(&tokens) {
        let stored = store.upsert_account(account, token).await?;
        tracing::info!(account_id = %stored.id, username = %stored.username, "account seeded");
        summary.accounts += 1;
    }

    Ok(summary)
}
