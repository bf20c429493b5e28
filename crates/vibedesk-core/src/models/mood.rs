//! Mood, focus scoring and analysis results

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::CollectionRecord;
use crate::mirror::OrderBy;

/// Detected user mood.
///
/// Unknown labels decode as [`MoodType::Neutral`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum MoodType {
    Happy,
    Sad,
    Stressed,
    Angry,
    Tired,
    #[default]
    Neutral,
}

impl MoodType {
    pub const ALL: [Self; 6] = [
        Self::Happy,
        Self::Sad,
        Self::Stressed,
        Self::Angry,
        Self::Tired,
        Self::Neutral,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Happy => "Happy",
            Self::Sad => "Sad",
            Self::Stressed => "Stressed",
            Self::Angry => "Angry",
            Self::Tired => "Tired",
            Self::Neutral => "Neutral",
        }
    }

    /// Case-insensitive lookup that falls back to `Neutral`.
    #[must_use]
    pub fn parse_lenient(label: &str) -> Self {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|mood| mood.as_str().eq_ignore_ascii_case(label))
            .unwrap_or_else(|| {
                tracing::warn!(label, "Unknown mood, defaulting to Neutral");
                Self::Neutral
            })
    }

    /// Focus score before any completed tasks are counted.
    #[must_use]
    pub const fn focus_base(self) -> u8 {
        match self {
            Self::Happy => 75,
            Self::Neutral => 65,
            Self::Tired => 40,
            Self::Sad => 35,
            Self::Stressed => 30,
            Self::Angry => 25,
        }
    }

    /// `base + 5 * completed`, capped at 100.
    #[must_use]
    pub fn focus_score(self, completed_tasks: usize) -> u8 {
        let bonus = completed_tasks.saturating_mul(5);
        let score = usize::from(self.focus_base()).saturating_add(bonus).min(100);
        u8::try_from(score).unwrap_or(100)
    }
}

impl fmt::Display for MoodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MoodType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Self::parse_lenient(&label))
    }
}

/// Coarse focus band shown next to the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusLevel {
    Drained,
    Distracted,
    Steady,
    Sharp,
}

impl FocusLevel {
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        match score {
            0..=29 => Self::Drained,
            30..=59 => Self::Distracted,
            60..=79 => Self::Steady,
            _ => Self::Sharp,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Drained => "Drained",
            Self::Distracted => "Distracted",
            Self::Steady => "Steady",
            Self::Sharp => "Sharp",
        }
    }

    #[must_use]
    pub const fn hint(self) -> &'static str {
        match self {
            Self::Drained => "Take a break.",
            Self::Distracted => "Start small.",
            Self::Steady => "Good flow.",
            Self::Sharp => "Peak focus.",
        }
    }
}

/// One mood check-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodLogEntry {
    pub mood: MoodType,
    #[serde(default)]
    pub focus_score: u8,
    #[serde(default)]
    pub note: String,
    /// RFC 3339
    pub timestamp: String,
}

impl CollectionRecord for MoodLogEntry {
    const COLLECTION: &'static str = "mood_logs";

    fn ordering() -> Vec<OrderBy> {
        vec![OrderBy::asc("timestamp")]
    }
}

/// Output of the external mood analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub mood: MoodType,
    #[serde(default)]
    pub focus_score: u8,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub suggested_tasks: Vec<String>,
    #[serde(default)]
    pub short_summary: Option<String>,
}
