//! Per-user settings documents

use serde::{Deserialize, Serialize};

use super::{MoodType, SettingsDocument};
use crate::blob::BlobKey;

/// Collection holding singleton settings documents.
pub const SETTINGS_COLLECTION: &str = "settings";

/// Display name used for tracks picked by URL.
pub const EXTERNAL_STREAM_NAME: &str = "External Stream";

/// The user's selected background track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicSetting {
    /// Blob key for uploaded files, otherwise the stream URL
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub updated_at: String,
}

impl MusicSetting {
    /// Setting for an uploaded file, named after its stem.
    #[must_use]
    pub fn local(key: &BlobKey, file_name: &str) -> Self {
        Self {
            url: key.as_str().to_string(),
            name: crate::util::file_stem(file_name).to_string(),
            updated_at: crate::util::rfc3339_now(),
        }
    }

    #[must_use]
    pub fn external(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: EXTERNAL_STREAM_NAME.to_string(),
            updated_at: crate::util::rfc3339_now(),
        }
    }

    #[must_use]
    pub fn key(&self) -> BlobKey {
        BlobKey::new(self.url.clone())
    }
}

impl SettingsDocument for MusicSetting {
    const DOCUMENT_ID: &'static str = "music";
}

/// Advice and summary surviving reloads. Always written with merge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_advice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_mood: Option<MoodType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl SettingsDocument for DashboardState {
    const DOCUMENT_ID: &'static str = "dashboard_state";
}
