//! Data models for VibeDesk
//!
//! Payloads are stored in the remote mirror as camelCase JSON so documents
//! written by older clients keep decoding.

mod attachment;
mod habit;
mod mood;
mod note;
mod schedule;
mod settings;
mod task;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::mirror::{DocPath, OrderBy, Query};

pub use attachment::{Attachment, AttachmentKind, StoredAttachment};
pub use habit::Habit;
pub use mood::{AnalysisResult, FocusLevel, MoodLogEntry, MoodType};
pub use note::{Note, UNTITLED_NOTE};
pub use schedule::ScheduleEvent;
pub use settings::{DashboardState, MusicSetting, EXTERNAL_STREAM_NAME, SETTINGS_COLLECTION};
pub use task::{Priority, Task};

/// A payload living in a per-user collection.
pub trait CollectionRecord: Serialize + DeserializeOwned {
    /// Collection name under the user scope.
    const COLLECTION: &'static str;

    /// Ordering of the collection's snapshots.
    fn ordering() -> Vec<OrderBy> {
        Vec::new()
    }

    /// Query for every record of this type owned by `scope`.
    fn query(scope: &str) -> Query {
        Self::ordering()
            .into_iter()
            .fold(Query::collection(scope, Self::COLLECTION), Query::order_by)
    }

    /// Path of one record of this type.
    fn path(scope: &str, id: &str) -> DocPath {
        DocPath::new(scope, Self::COLLECTION, id)
    }
}

/// A singleton document under `settings/`.
pub trait SettingsDocument: Serialize + DeserializeOwned {
    const DOCUMENT_ID: &'static str;

    fn path(scope: &str) -> DocPath {
        DocPath::new(scope, SETTINGS_COLLECTION, Self::DOCUMENT_ID)
    }

    fn query(scope: &str) -> Query {
        Query::document(&Self::path(scope))
    }
}
