use std::path::PathBuf;

use serde::Serialize;
use tokio::task::JoinHandle;
use vibedesk_core::blob::LibSqlBlobStore;
use vibedesk_core::config::DeskConfig;
use vibedesk_core::mirror::{LibSqlMirror, Record, RemoteMirror};
use vibedesk_core::models::{CollectionRecord, ScheduleEvent, Task};

use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

/// Resolved configuration and identity for one invocation.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: DeskConfig,
    pub scope: String,
    pub contact: Option<String>,
}

impl Context {
    pub fn new(
        config_path: Option<PathBuf>,
        data_dir: Option<PathBuf>,
        scope: &str,
        contact: Option<String>,
    ) -> Result<Self, CliError> {
        let mut config = match config_path {
            Some(path) => DeskConfig::load_from_path(&path)?
                .with_env_overrides(|key| std::env::var(key).ok()),
            None => DeskConfig::load()?,
        };
        if data_dir.is_some() {
            config.data_dir = data_dir;
        }

        let scope = scope.trim();
        if scope.is_empty() || scope.contains('/') {
            return Err(CliError::Empty("Scope"));
        }

        Ok(Self {
            config,
            scope: scope.to_string(),
            contact: vibedesk_core::util::normalize_text_option(contact),
        })
    }

    pub async fn open_mirror(&self) -> Result<LibSqlMirror, CliError> {
        let path = self.config.mirror_db_path();
        let sync = self.config.sync_config();
        if sync.is_some() {
            tracing::info!("Sync enabled for {}", path.display());
        }
        Ok(LibSqlMirror::open(&path, sync).await?)
    }

    pub fn blob_store(&self) -> LibSqlBlobStore {
        LibSqlBlobStore::at_path(self.config.blob_db_path())
    }
}

#[derive(Debug, Serialize)]
pub struct EventListItem {
    pub id: String,
    pub date: String,
    pub time: String,
    pub title: String,
    pub fired: bool,
}

#[derive(Debug, Serialize)]
pub struct TaskListItem {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub priority: String,
}

/// Current contents of a collection.
pub async fn load_records<T: CollectionRecord>(
    mirror: &LibSqlMirror,
    scope: &str,
) -> Result<Vec<Record<T>>, CliError> {
    let subscription = mirror.subscribe(T::query(scope)).await?;
    Ok(subscription
        .latest()
        .map(|snapshot| snapshot.decode())
        .unwrap_or_default())
}

/// Find a record by full id or unique id prefix.
pub fn resolve_record<'a, T>(
    records: &'a [Record<T>],
    query: &str,
    collection: &'static str,
) -> Result<&'a Record<T>, CliError> {
    let query = normalize_identifier(query)?;
    if let Some(record) = records.iter().find(|record| record.id == query) {
        return Ok(record);
    }

    let matching: Vec<&Record<T>> = records
        .iter()
        .filter(|record| record.id.starts_with(&query))
        .collect();
    match matching.as_slice() {
        [] => Err(CliError::NotFound {
            collection,
            id: query,
        }),
        [record] => Ok(record),
        many => {
            let options = many
                .iter()
                .take(3)
                .map(|record| short_id(&record.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Wait for a background task, logging how it ended. Returns whether it
/// finished normally.
pub async fn await_background(name: &str, task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(error) if error.is_cancelled() => {
            tracing::debug!(task = name, "Background task cancelled");
            false
        }
        Err(error) => {
            tracing::error!(task = name, "Background task panicked: {error}");
            false
        }
    }
}

pub fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::Empty("ID"))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Join free-form words into one trimmed title.
pub fn join_words(parts: &[String], what: &'static str) -> Result<String, CliError> {
    let joined = parts.join(" ");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        Err(CliError::Empty(what))
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

pub fn format_event_lines(events: &[Record<ScheduleEvent>]) -> Vec<String> {
    events
        .iter()
        .map(|event| {
            let short_id = short_id(&event.id);
            let state = if event.data.fired { "notified" } else { "pending" };
            format!(
                "{short_id:<13}  {} {}  {:<8}  {}",
                event.data.date, event.data.time, state, event.data.title
            )
        })
        .collect()
}

pub fn format_task_lines(tasks: &[Record<Task>]) -> Vec<String> {
    tasks
        .iter()
        .map(|task| {
            let short_id = short_id(&task.id);
            let mark = if task.data.completed { "x" } else { " " };
            format!(
                "{short_id:<13}  [{mark}] {:<40}  {}",
                task.data.title, task.data.priority
            )
        })
        .collect()
}

pub fn event_to_list_item(event: &Record<ScheduleEvent>) -> EventListItem {
    EventListItem {
        id: event.id.clone(),
        date: event.data.date.clone(),
        time: event.data.time.clone(),
        title: event.data.title.clone(),
        fired: event.data.fired,
    }
}

pub fn task_to_list_item(task: &Record<Task>) -> TaskListItem {
    TaskListItem {
        id: task.id.clone(),
        title: task.data.title.clone(),
        completed: task.data.completed,
        priority: task.data.priority.to_string(),
    }
}
