//! Runtime configuration for VibeDesk hosts.
//!
//! Read from `<config_dir>/vibedesk/config.json` when present. Sync
//! credentials may instead come from `VIBEDESK_SYNC_URL` and
//! `VIBEDESK_SYNC_TOKEN`, which take precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alerts::{AlertSettings, DEFAULT_ALERT_SOUND, FALLBACK_CONTACT};
use crate::db::SyncConfig;
use crate::error::{Error, Result};
use crate::playback::DEFAULT_VOLUME;
use crate::util::normalize_text_option;

const CONFIG_FILE_NAME: &str = "config.json";
const APP_DIR_NAME: &str = "vibedesk";
const MIN_POLL_INTERVAL_MS: u64 = 100;

pub const SYNC_URL_ENV: &str = "VIBEDESK_SYNC_URL";
pub const SYNC_TOKEN_ENV: &str = "VIBEDESK_SYNC_TOKEN";

/// Host configuration. Secrets other than the sync token never belong here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct DeskConfig {
    /// Directory holding both databases. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
    pub blob_db_file: String,
    pub mirror_db_file: String,
    /// Embedded-replica sync of the mirror database
    pub sync: Option<SyncSettings>,
    pub alert_sound_url: String,
    pub default_volume: f32,
    pub alert_poll_interval_ms: u64,
    pub fallback_contact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncSettings {
    pub url: String,
    pub auth_token: String,
    /// Seconds between automatic pulls; `None` means manual only.
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            blob_db_file: "vibedesk-blobs.db".to_string(),
            mirror_db_file: "vibedesk-mirror.db".to_string(),
            sync: None,
            alert_sound_url: DEFAULT_ALERT_SOUND.to_string(),
            default_volume: DEFAULT_VOLUME,
            alert_poll_interval_ms: 1_000,
            fallback_contact: FALLBACK_CONTACT.to_string(),
        }
    }
}

/// Location of the config file, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

impl DeskConfig {
    /// Load from the default location and the environment.
    pub fn load() -> Result<Self> {
        let config = match default_config_path() {
            Some(path) => Self::load_from_path(&path)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Load a config file, falling back to defaults when it does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw).map_err(|error| {
            Error::InvalidInput(format!("config at {}: {error}", path.display()))
        })
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        Ok(config.normalized())
    }

    /// Apply sync credentials from the environment. Both values must be
    /// present and non-empty to take effect.
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let url = normalize_text_option(lookup(SYNC_URL_ENV));
        let token = normalize_text_option(lookup(SYNC_TOKEN_ENV));
        if let (Some(url), Some(auth_token)) = (url, token) {
            let sync_interval_secs = self.sync.as_ref().and_then(|s| s.sync_interval_secs);
            self.sync = Some(SyncSettings {
                url,
                auth_token,
                sync_interval_secs,
            });
        }
        self
    }

    /// Trim values and replace blanks with defaults.
    #[must_use]
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let or_default = |value: String, fallback: String| {
            normalize_text_option(Some(value)).unwrap_or(fallback)
        };

        Self {
            data_dir: self
                .data_dir
                .filter(|dir| !dir.as_os_str().is_empty()),
            blob_db_file: or_default(self.blob_db_file, defaults.blob_db_file),
            mirror_db_file: or_default(self.mirror_db_file, defaults.mirror_db_file),
            sync: self.sync.and_then(|sync| {
                Some(SyncSettings {
                    url: normalize_text_option(Some(sync.url))?,
                    auth_token: normalize_text_option(Some(sync.auth_token))?,
                    sync_interval_secs: sync.sync_interval_secs.filter(|secs| *secs > 0),
                })
            }),
            alert_sound_url: or_default(self.alert_sound_url, defaults.alert_sound_url),
            default_volume: if self.default_volume.is_finite() {
                self.default_volume.clamp(0.0, 1.0)
            } else {
                defaults.default_volume
            },
            alert_poll_interval_ms: self.alert_poll_interval_ms.max(MIN_POLL_INTERVAL_MS),
            fallback_contact: or_default(self.fallback_contact, defaults.fallback_contact),
        }
    }

    /// Directory for local databases.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .or_else(dirs::data_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME)
        })
    }

    pub fn blob_db_path(&self) -> PathBuf {
        self.data_dir().join(&self.blob_db_file)
    }

    pub fn mirror_db_path(&self) -> PathBuf {
        self.data_dir().join(&self.mirror_db_file)
    }

    /// libSQL sync settings for the mirror, when configured.
    pub fn sync_config(&self) -> Option<SyncConfig> {
        let sync = self.sync.as_ref()?;
        let config = SyncConfig::new(&sync.url, &sync.auth_token);
        Some(match sync.sync_interval_secs {
            Some(secs) => config.with_sync_interval(Duration::from_secs(secs)),
            None => config.without_auto_sync(),
        })
    }

    pub const fn alert_poll_interval(&self) -> Duration {
        Duration::from_millis(self.alert_poll_interval_ms)
    }

    /// Alert settings addressed to `contact`, or the fallback contact.
    pub fn alert_settings(&self, contact: Option<&str>) -> AlertSettings {
        AlertSettings {
            sound_url: self.alert_sound_url.clone(),
            contact: self.fallback_contact.clone(),
        }
        .with_contact(contact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_object_yields_defaults() {
        assert_eq!(DeskConfig::parse("{}").unwrap(), DeskConfig::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = DeskConfig::parse(r#"{ "theme": "dark" }"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn blanks_fall_back_and_values_are_clamped() {
        let config = DeskConfig::parse(
            r#"{
              "blob_db_file": "  ",
              "default_volume": 3.0,
              "alert_poll_interval_ms": 5,
              "fallback_contact": "",
              "sync": { "url": " ", "auth_token": "t" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.blob_db_file, "vibedesk-blobs.db");
        assert!((config.default_volume - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.alert_poll_interval(), Duration::from_millis(100));
        assert_eq!(config.fallback_contact, FALLBACK_CONTACT);
        assert!(config.sync.is_none());
    }

    #[test]
    fn env_overrides_sync_credentials() {
        let file = DeskConfig::parse(
            r#"{ "sync": { "url": "libsql://a.turso.io", "auth_token": "old", "sync_interval_secs": 30 } }"#,
        )
        .unwrap();

        let config = file.with_env_overrides(|key| match key {
            SYNC_URL_ENV => Some("libsql://b.turso.io".to_string()),
            SYNC_TOKEN_ENV => Some("new".to_string()),
            _ => None,
        });

        let sync = config.sync_config().unwrap();
        assert_eq!(sync.url.as_deref(), Some("libsql://b.turso.io"));
        assert_eq!(sync.auth_token.as_deref(), Some("new"));
        assert_eq!(sync.sync_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn partial_env_is_ignored() {
        let config = DeskConfig::default()
            .with_env_overrides(|key| (key == SYNC_URL_ENV).then(|| "libsql://x".to_string()));
        assert!(config.sync_config().is_none());
    }

    #[test]
    fn paths_live_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = DeskConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..DeskConfig::default()
        };
        assert_eq!(config.mirror_db_path(), dir.path().join("vibedesk-mirror.db"));
        assert_eq!(
            DeskConfig::load_from_path(&dir.path().join("missing.json")).unwrap(),
            DeskConfig::default()
        );
    }

    #[test]
    fn alert_settings_prefer_signed_in_contact() {
        let config = DeskConfig::default();
        assert_eq!(config.alert_settings(None).contact, FALLBACK_CONTACT);
        assert_eq!(
            config.alert_settings(Some("me@example.com")).contact,
            "me@example.com"
        );
    }
}
