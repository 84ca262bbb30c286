//! YAML seed file describing campaigns, their monitors and posting accounts.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ConfigError;

fn default_scan_interval() -> i32 {
    60
}

fn default_min_relevance_score() -> i16 {
    70
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub organization_id: Uuid,
    pub name: String,
    pub business_name: String,
    pub business_description: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub excluded_keywords: Vec<String>,
    #[serde(default)]
    pub subreddits: Vec<String>,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_minutes: i32,
    #[serde(default = "default_min_relevance_score")]
    pub min_relevance_score: i16,
    #[serde(default)]
    pub auto_approve: bool,
    #[serde(default)]
    pub generate_dms: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub organization_id: Uuid,
    pub username: String,
    /// Name of the environment variable holding the OAuth2 refresh token.
    pub refresh_token_env: String,
    #[serde(default)]
    pub warmup_enabled: bool,
    #[serde(default)]
    pub warmup_subreddits: Vec<String>,
    #[serde(default)]
    pub warmup_daily_limit: i32,
}

#[derive(Debug, Deserialize)]
pub struct CampaignsFile {
    pub campaigns: Vec<CampaignConfig>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// Load and validate the campaigns seed file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_campaigns(path: &Path) -> Result<CampaignsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CampaignsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_campaigns(&content)
}

/// Parse and validate campaigns YAML already in memory.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_campaigns(content: &str) -> Result<CampaignsFile, ConfigError> {
    let mut file: CampaignsFile = serde_yaml::from_str(content)?;
    for campaign in &mut file.campaigns {
        campaign.keywords = normalize_terms(&campaign.keywords);
        campaign.excluded_keywords = normalize_terms(&campaign.excluded_keywords);
        campaign.subreddits = campaign
            .subreddits
            .iter()
            .map(|s| s.trim().trim_start_matches("r/").to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    validate_campaigns(&file)?;
    Ok(file)
}

/// Trim, lowercase and de-duplicate keyword lists, preserving order.
fn normalize_terms(terms: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn validate_campaigns(file: &CampaignsFile) -> Result<(), ConfigError> {
    let mut seen_names = HashSet::new();

    for campaign in &file.campaigns {
        if campaign.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "campaign name must be non-empty".to_string(),
            ));
        }

        if campaign.keywords.is_empty() {
            return Err(ConfigError::Validation(format!(
                "campaign '{}' has no keywords",
                campaign.name
            )));
        }

        if !(0..=100).contains(&campaign.min_relevance_score) {
            return Err(ConfigError::Validation(format!(
                "campaign '{}' has invalid min_relevance_score {}; must be 0-100",
                campaign.name, campaign.min_relevance_score
            )));
        }

        if campaign.scan_interval_minutes < 1 {
            return Err(ConfigError::Validation(format!(
                "campaign '{}' has invalid scan_interval_minutes {}",
                campaign.name, campaign.scan_interval_minutes
            )));
        }

        let key = (campaign.organization_id, campaign.name.to_lowercase());
        if !seen_names.insert(key) {
            return Err(ConfigError::Validation(format!(
                "duplicate campaign name '{}' within organization {}",
                campaign.name, campaign.organization_id
            )));
        }
    }

    let mut seen_accounts = HashSet::new();
    for account in &file.accounts {
        if account.username.trim().is_empty() {
            return Err(ConfigError::Validation(
                "account username must be non-empty".to_string(),
            ));
        }
        if !seen_accounts.insert(account.username.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate account username '{}'",
                account.username
            )));
        }
        if account.warmup_enabled && account.warmup_subreddits.is_empty() {
            return Err(ConfigError::Validation(format!(
                "account '{}' enables warm-up without warmup_subreddits",
                account.username
            )));
        }
    }

    Ok(())
}
