//! Task model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{CollectionRecord, MoodType};
use crate::error::{Error, Result};
use crate::mirror::OrderBy;

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::InvalidInput(format!("unknown priority '{other}'"))),
        }
    }
}

/// A to-do item on the dashboard board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    /// Mood whose analysis suggested this task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_tag: Option<MoodType>,
    /// RFC 3339 creation time
    #[serde(default)]
    pub created_at: String,
}

impl Task {
    /// Create an open, medium-priority task.
    pub fn new(title: impl Into<String>) -> Result<Self> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(Error::InvalidInput("Task title cannot be empty".to_string()));
        }
        Ok(Self {
            title,
            completed: false,
            priority: Priority::Medium,
            mood_tag: None,
            created_at: crate::util::rfc3339_now(),
        })
    }
}

impl CollectionRecord for Task {
    const COLLECTION: &'static str = "tasks";

    fn ordering() -> Vec<OrderBy> {
        vec![OrderBy::asc("title")]
    }
}
