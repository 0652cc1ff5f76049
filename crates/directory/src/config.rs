//! Configuration loading for directory sync
//!
//! Sync settings come from `dirsync.json` in the dirsync config directory
//! (or an explicit path) with every field optional. API credentials are
//! loaded from (in order of priority):
//! 1. JSON file (`credentials.json` in the config directory)
//! 2. Runtime environment variables

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{FieldMapping, MappingError};
use crate::okta::{OperationKind, PageErrorPolicy};
use crate::sync::JobKind;

/// Sync settings filename in the dirsync config directory
pub const SETTINGS_FILE: &str = "dirsync.json";

/// Credentials filename in the dirsync config directory
const CREDENTIALS_FILE: &str = "credentials.json";

const DEFAULT_CACHE_TTL_SECS: u64 = 86400;

/// Error raised when a configuration value is unusable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("remote id field {0:?} is not part of the field mapping")]
    UnmappedRemoteIdField(String),
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Page cache lifetimes per operation kind, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    pub users: u64,
    pub groups: u64,
    pub group_members: u64,
}

impl CacheTtls {
    pub fn for_kind(&self, kind: OperationKind) -> Duration {
        let secs = match kind {
            OperationKind::Users => self.users,
            OperationKind::Groups => self.groups,
            OperationKind::GroupMembers => self.group_members,
        };
        Duration::from_secs(secs)
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            users: DEFAULT_CACHE_TTL_SECS,
            groups: DEFAULT_CACHE_TTL_SECS,
            group_members: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

/// A job queued after another job completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpJob {
    pub job: JobKind,
    /// The job whose completion queues this one; `None` means any other job
    #[serde(default)]
    pub after: Option<JobKind>,
    #[serde(default = "default_follow_up_delay")]
    pub delay_secs: u64,
}

impl FollowUpJob {
    /// Whether finishing a job of `kind` queues this follow-up
    pub fn follows(&self, kind: JobKind) -> bool {
        match self.after {
            Some(after) => after == kind,
            None => self.job != kind,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

fn default_follow_up_delay() -> u64 {
    30
}

/// Immutable settings shared by every sync component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Records requested per page
    pub page_limit: usize,
    pub cache_ttl: CacheTtls,
    /// Maximum members per bulk insert
    pub insert_batch_size: usize,
    /// Maximum members per conditional bulk update
    pub update_batch_size: usize,
    /// Deleting more members than this in one run logs a warning
    pub delete_warning_threshold: usize,
    pub field_mapping: FieldMapping,
    /// Local field holding the remote user id, used by incremental refresh
    pub remote_id_field: String,
    /// User statuses pulled by the users query
    pub statuses_to_sync: Vec<String>,
    pub incremental_lookback_secs: u64,
    pub full_sync_interval_secs: u64,
    pub incremental_interval_secs: u64,
    pub group_sync_interval_secs: u64,
    pub follow_up_jobs: Vec<FollowUpJob>,
    pub on_page_error: PageErrorPolicy,
    /// Apply deletes even when the remote snapshot is known to be incomplete
    pub delete_on_partial_snapshot: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_limit: 100,
            cache_ttl: CacheTtls::default(),
            insert_batch_size: 500,
            update_batch_size: 300,
            delete_warning_threshold: 20,
            field_mapping: FieldMapping::directory_default(),
            remote_id_field: "OktaID".to_string(),
            statuses_to_sync: ["ACTIVE", "PASSWORD_EXPIRED", "LOCKED_OUT", "RECOVERY"]
                .into_iter()
                .map(String::from)
                .collect(),
            incremental_lookback_secs: 300,
            full_sync_interval_secs: 86400,
            incremental_interval_secs: 60,
            group_sync_interval_secs: 86400,
            follow_up_jobs: Vec::new(),
            on_page_error: PageErrorPolicy::default(),
            delete_on_partial_snapshot: false,
        }
    }
}

impl SyncConfig {
    /// Load settings from the config directory, or defaults when no file exists
    pub fn load() -> Result<Self> {
        if config::config_exists(SETTINGS_FILE) {
            let settings: Self = config::load_json(SETTINGS_FILE)?;
            settings.validate()?;
            return Ok(settings);
        }
        Ok(Self::default())
    }

    /// Load settings from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings: Self = config::load_json_file(path)?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json).context("Failed to parse settings JSON")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check values that deserialization alone cannot rule out
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("page_limit", self.page_limit),
            ("insert_batch_size", self.insert_batch_size),
            ("update_batch_size", self.update_batch_size),
        ];
        if let Some((field, _)) = positive.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero { field });
        }

        if self.field_mapping.path_for(&self.remote_id_field).is_none() {
            return Err(ConfigError::UnmappedRemoteIdField(
                self.remote_id_field.clone(),
            ));
        }

        Ok(())
    }

    pub fn incremental_lookback(&self) -> Duration {
        Duration::from_secs(self.incremental_lookback_secs)
    }

    /// Follow-up jobs queued when a job of `kind` completes
    pub fn follow_ups_for(&self, kind: JobKind) -> impl Iterator<Item = &FollowUpJob> {
        self.follow_up_jobs.iter().filter(move |f| f.follows(kind))
    }

    /// Delay before a job of `kind` runs again
    pub fn reschedule_delay(&self, kind: JobKind) -> Duration {
        let secs = match kind {
            JobKind::FullUserSync => self.full_sync_interval_secs,
            JobKind::IncrementalUserSync => self.incremental_interval_secs,
            JobKind::GroupSync => self.group_sync_interval_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Identity API location and token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredentials {
    /// API base, e.g. `https://acme.okta.com/api/v1`
    pub base_url: String,
    pub api_token: String,
}

impl ApiCredentials {
    /// Load credentials using the following priority:
    /// 1. JSON file (~/.config/dirsync/credentials.json)
    /// 2. Runtime environment variables
    pub fn load() -> Result<Self> {
        if config::config_exists(CREDENTIALS_FILE) {
            return config::load_json(CREDENTIALS_FILE);
        }

        Self::from_env()
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse credentials from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse credentials JSON")
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("DIRSYNC_API_URL")
            .context("DIRSYNC_API_URL environment variable not set")?;
        let api_token = std::env::var("DIRSYNC_API_TOKEN")
            .context("DIRSYNC_API_TOKEN environment variable not set")?;

        Ok(Self {
            base_url,
            api_token,
        })
    }

    /// Get the default credentials file path (~/.config/dirsync/credentials.json)
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SyncConfig::default();
        assert_eq!(settings.insert_batch_size, 500);
        assert_eq!(settings.update_batch_size, 300);
        assert_eq!(settings.delete_warning_threshold, 20);
        assert_eq!(settings.field_mapping.unique_field(), "Email");
        assert_eq!(settings.incremental_lookback(), Duration::from_secs(300));
        assert_eq!(
            settings.cache_ttl.for_kind(OperationKind::GroupMembers),
            Duration::from_secs(86400)
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = SyncConfig::from_json(
            r#"{
                "page_limit": 200,
                "cache_ttl": {"users": 60},
                "follow_up_jobs": [{"job": "incremental_user_sync"}]
            }"#,
        )
        .unwrap();

        assert_eq!(settings.page_limit, 200);
        assert_eq!(settings.cache_ttl.for_kind(OperationKind::Users), Duration::from_secs(60));
        assert_eq!(
            settings.cache_ttl.for_kind(OperationKind::Groups),
            Duration::from_secs(86400)
        );
        assert_eq!(settings.insert_batch_size, 500);
        assert_eq!(
            settings.follow_up_jobs,
            vec![FollowUpJob {
                job: JobKind::IncrementalUserSync,
                after: None,
                delay_secs: 30
            }]
        );
    }

    #[test]
    fn test_follow_up_selection() {
        let settings = SyncConfig::from_json(
            r#"{
                "follow_up_jobs": [
                    {"job": "incremental_user_sync", "after": "full_user_sync", "delay_secs": 5},
                    {"job": "group_sync"}
                ]
            }"#,
        )
        .unwrap();

        let after_full: Vec<JobKind> = settings
            .follow_ups_for(JobKind::FullUserSync)
            .map(|f| f.job)
            .collect();
        assert_eq!(after_full, vec![JobKind::IncrementalUserSync, JobKind::GroupSync]);

        let after_groups: Vec<JobKind> = settings
            .follow_ups_for(JobKind::GroupSync)
            .map(|f| f.job)
            .collect();
        assert!(after_groups.is_empty());
    }

    #[test]
    fn test_custom_mapping_from_file() {
        let settings = SyncConfig::from_json(
            r#"{
                "field_mapping": {
                    "unique_field": "Login",
                    "fields": {"Login": "profile.login", "OktaID": "id"}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(settings.field_mapping.unique_field(), "Login");
        assert_eq!(settings.field_mapping.len(), 2);
    }

    #[test]
    fn test_deep_mapping_path_rejected_at_load() {
        let result = SyncConfig::from_json(
            r#"{
                "field_mapping": {
                    "unique_field": "Email",
                    "fields": {"Email": "profile.emails.work", "OktaID": "id"}
                }
            }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = SyncConfig::from_json(r#"{"update_batch_size": 0}"#).unwrap_err();
        assert!(err.to_string().contains("update_batch_size"));
    }

    #[test]
    fn test_remote_id_field_must_be_mapped() {
        let settings = SyncConfig {
            remote_id_field: "ExternalID".to_string(),
            ..SyncConfig::default()
        };
        assert_eq!(
            settings.validate(),
            Err(ConfigError::UnmappedRemoteIdField("ExternalID".to_string()))
        );
    }

    #[test]
    fn test_reschedule_delays() {
        let settings = SyncConfig::default();
        assert_eq!(
            settings.reschedule_delay(JobKind::FullUserSync),
            Duration::from_secs(86400)
        );
        assert_eq!(
            settings.reschedule_delay(JobKind::IncrementalUserSync),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_parse_credentials() {
        let creds = ApiCredentials::from_json(
            r#"{"base_url": "https://acme.okta.com/api/v1", "api_token": "00abc"}"#,
        )
        .unwrap();
        assert_eq!(creds.base_url, "https://acme.okta.com/api/v1");
        assert_eq!(creds.api_token, "00abc");
    }

    #[test]
    fn test_invalid_credentials_json() {
        assert!(ApiCredentials::from_json(r#"{"base_url": "x"}"#).is_err());
    }
}
