//! Habit model

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::CollectionRecord;
use crate::error::{Error, Result};
use crate::mirror::OrderBy;

/// A daily habit with a completion streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub name: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub streak: u32,
    /// `YYYY-MM-DD` of the last completion, empty when undone
    #[serde(default)]
    pub last_completed_date: String,
}

impl Habit {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput("Habit name cannot be empty".to_string()));
        }
        Ok(Self {
            name,
            completed: false,
            streak: 0,
            last_completed_date: String::new(),
        })
    }

    /// Field update for flipping this habit on `today`.
    ///
    /// Completing bumps the streak and stamps the date; undoing takes the
    /// streak back down (never below zero) and clears the date.
    #[must_use]
    pub fn toggle_fields(&self, today: &str) -> Value {
        if self.completed {
            json!({
                "completed": false,
                "streak": self.streak.saturating_sub(1),
                "lastCompletedDate": "",
            })
        } else {
            json!({
                "completed": true,
                "streak": self.streak.saturating_add(1),
                "lastCompletedDate": today,
            })
        }
    }

    /// Completed on an earlier day and due to be unchecked for `today`.
    #[must_use]
    pub fn needs_daily_reset(&self, today: &str) -> bool {
        self.completed && self.last_completed_date != today
    }
}

impl CollectionRecord for Habit {
    const COLLECTION: &'static str = "habits";

    fn ordering() -> Vec<OrderBy> {
        vec![OrderBy::asc("name")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn habit(completed: bool, streak: u32, date: &str) -> Habit {
        Habit {
            name: "Drink Water".to_string(),
            completed,
            streak,
            last_completed_date: date.to_string(),
        }
    }

    #[test]
    fn test_complete_increments_streak() {
        let fields = habit(false, 3, "").toggle_fields("2024-05-01");
        assert_eq!(fields["completed"], true);
        assert_eq!(fields["streak"], 4);
        assert_eq!(fields["lastCompletedDate"], "2024-05-01");
    }

    #[test]
    fn test_undo_floors_streak_at_zero() {
        let fields = habit(true, 0, "2024-05-01").toggle_fields("2024-05-01");
        assert_eq!(fields["completed"], false);
        assert_eq!(fields["streak"], 0);
        assert_eq!(fields["lastCompletedDate"], "");
    }

    #[test]
    fn test_daily_reset_only_for_stale_completions() {
        assert!(habit(true, 2, "2024-04-30").needs_daily_reset("2024-05-01"));
        assert!(!habit(true, 2, "2024-05-01").needs_daily_reset("2024-05-01"));
        assert!(!habit(false, 2, "2024-04-30").needs_daily_reset("2024-05-01"));
    }

    #[test]
    fn test_habit_new_rejects_blank() {
        assert!(Habit::new(" ").is_err());
        assert_eq!(Habit::new("Read").unwrap().streak, 0);
    }
}
