//! Scheduled event model

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::CollectionRecord;
use crate::error::{Error, Result};
use crate::mirror::OrderBy;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M";

/// A calendar entry that raises an alert when its minute arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`, 24-hour local time
    pub time: String,
    pub title: String,
    /// Set once when the alert has gone out. Stored as `notified`.
    #[serde(rename = "notified", default)]
    pub fired: bool,
}

impl ScheduleEvent {
    /// Create a pending event, validating date and time formats.
    pub fn new(date: &str, time: &str, title: impl Into<String>) -> Result<Self> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(Error::InvalidInput(
                "Event title cannot be empty".to_string(),
            ));
        }
        let date = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
            .map_err(|_| Error::InvalidInput(format!("invalid date '{date}', expected YYYY-MM-DD")))?;
        let time = NaiveTime::parse_from_str(time.trim(), TIME_FORMAT)
            .map_err(|_| Error::InvalidInput(format!("invalid time '{time}', expected HH:MM")))?;

        Ok(Self {
            date: date.format(DATE_FORMAT).to_string(),
            time: time.format(TIME_FORMAT).to_string(),
            title,
            fired: false,
        })
    }

    /// Whether this event's minute is `now` and it has not fired yet.
    #[must_use]
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        !self.fired
            && self.date == now.format(DATE_FORMAT).to_string()
            && self.time == now.format(TIME_FORMAT).to_string()
    }

    /// Field update that marks the event fired.
    #[must_use]
    pub fn fired_fields() -> Value {
        json!({ "notified": true })
    }
}

impl CollectionRecord for ScheduleEvent {
    const COLLECTION: &'static str = "schedule";

    fn ordering() -> Vec<OrderBy> {
        vec![OrderBy::asc("date"), OrderBy::asc("time")]
    }
}
