//! Tasks, habits and mood check-ins.

use std::collections::HashSet;
use std::future::Future;

use chrono::NaiveDate;
use serde_json::json;

use crate::error::Result;
use crate::mirror::{Record, RemoteMirror, SetMode, SyncWriter};
use crate::models::{
    AnalysisResult, CollectionRecord, DashboardState, Habit, MoodLogEntry, MoodType,
    SettingsDocument, Task,
};

/// Suggested tasks taken from one analysis.
const MAX_SUGGESTED_TASKS: usize = 2;

/// Input handed to the mood analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisInput {
    Text(String),
    Image { mime_type: String, bytes: Vec<u8> },
    Audio { mime_type: String, bytes: Vec<u8> },
}

/// External mood analysis. Treated as a black box; only its output is kept.
pub trait MoodAnalyzer: Send + Sync {
    fn analyze(&self, input: AnalysisInput) -> impl Future<Output = Result<AnalysisResult>> + Send;
}

/// What [`Dashboard::record_analysis`] wrote.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordedAnalysis {
    pub mood: MoodType,
    /// Id of the mood log entry, when the write succeeded
    pub entry_id: Option<String>,
    /// Titles of tasks added from suggestions
    pub added_tasks: Vec<String>,
}

/// `YYYY-MM-DD` form used for habit completion dates.
pub fn day_string(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Focus score for `mood` given the task list.
pub fn focus_score(mood: MoodType, tasks: &[Record<Task>]) -> u8 {
    mood.focus_score(tasks.iter().filter(|task| task.data.completed).count())
}

/// Writes for the dashboard widgets of one user.
#[derive(Debug, Clone)]
pub struct Dashboard<M> {
    scope: String,
    writer: SyncWriter<M>,
}

impl<M: RemoteMirror> Dashboard<M> {
    pub fn new(scope: impl Into<String>, writer: SyncWriter<M>) -> Self {
        Self {
            scope: scope.into(),
            writer,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub const fn writer(&self) -> &SyncWriter<M> {
        &self.writer
    }

    /// Add an open task; `Ok(None)` when the write failed.
    pub async fn add_task(&self, title: &str) -> Result<Option<String>> {
        let task = Task::new(title)?;
        Ok(self.writer.add(&self.scope, Task::COLLECTION, &task).await)
    }

    pub async fn toggle_task(&self, task: &Record<Task>) -> bool {
        self.writer
            .update(
                &Task::path(&self.scope, &task.id),
                json!({ "completed": !task.data.completed }),
            )
            .await
    }

    pub async fn delete_task(&self, id: &str) -> bool {
        self.writer.delete(&Task::path(&self.scope, id)).await
    }

    pub async fn add_habit(&self, name: &str) -> Result<Option<String>> {
        let habit = Habit::new(name)?;
        Ok(self.writer.add(&self.scope, Habit::COLLECTION, &habit).await)
    }

    pub async fn toggle_habit(&self, habit: &Record<Habit>, today: &str) -> bool {
        self.writer
            .update(
                &Habit::path(&self.scope, &habit.id),
                habit.data.toggle_fields(today),
            )
            .await
    }

    /// Uncheck habits completed on an earlier day. Streaks are kept.
    ///
    /// Returns how many habits were reset.
    pub async fn reset_stale_habits(&self, habits: &[Record<Habit>], today: &str) -> usize {
        let mut reset = 0;
        for habit in habits.iter().filter(|h| h.data.needs_daily_reset(today)) {
            tracing::debug!(id = %habit.id, name = %habit.data.name, "Daily habit reset");
            if self
                .writer
                .update(
                    &Habit::path(&self.scope, &habit.id),
                    json!({ "completed": false }),
                )
                .await
            {
                reset += 1;
            }
        }
        reset
    }

    /// Run the analyzer and keep its output.
    pub async fn analyze<A: MoodAnalyzer>(
        &self,
        analyzer: &A,
        input: AnalysisInput,
        tasks: &[Record<Task>],
    ) -> Result<RecordedAnalysis> {
        let result = analyzer.analyze(input).await?;
        Ok(self.record_analysis(&result, tasks).await)
    }

    /// Persist an analysis: a mood log entry, the merged dashboard state
    /// and up to two suggested tasks not already on the board.
    pub async fn record_analysis(
        &self,
        result: &AnalysisResult,
        tasks: &[Record<Task>],
    ) -> RecordedAnalysis {
        let now = crate::util::rfc3339_now();

        let entry = MoodLogEntry {
            mood: result.mood,
            focus_score: result.focus_score,
            note: result.reasoning.clone(),
            timestamp: now.clone(),
        };
        let entry_id = self
            .writer
            .add(&self.scope, MoodLogEntry::COLLECTION, &entry)
            .await;

        let state = DashboardState {
            ai_advice: result.suggested_tasks.first().cloned(),
            journal_summary: result
                .short_summary
                .clone()
                .filter(|summary| !summary.trim().is_empty()),
            last_mood: Some(result.mood),
            updated_at: Some(now),
        };
        self.writer
            .set(&DashboardState::path(&self.scope), &state, SetMode::Merge)
            .await;

        let mut seen: HashSet<&str> = tasks.iter().map(|t| t.data.title.as_str()).collect();
        let mut added_tasks = Vec::new();
        for title in result
            .suggested_tasks
            .iter()
            .take(MAX_SUGGESTED_TASKS)
            .map(|title| title.trim())
        {
            if title.is_empty() || !seen.insert(title) {
                continue;
            }
            let Ok(mut task) = Task::new(title) else {
                continue;
            };
            task.mood_tag = Some(result.mood);
            if self
                .writer
                .add(&self.scope, Task::COLLECTION, &task)
                .await
                .is_some()
            {
                added_tasks.push(task.title);
            }
        }

        tracing::info!(
            mood = %result.mood,
            added = added_tasks.len(),
            "Recorded mood analysis"
        );
        RecordedAnalysis {
            mood: result.mood,
            entry_id,
            added_tasks,
        }
    }
}
