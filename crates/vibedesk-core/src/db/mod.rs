//! libSQL persistence shared by the blob cache and the document mirror

mod connection;
mod migrations;

pub use connection::{Database, SyncConfig};
pub use migrations::Schema;
