//! vibedesk-core - Core library for VibeDesk
//!
//! Local-first pieces of a personal dashboard: a durable blob cache, a
//! push-subscribable document mirror, attachment resolution for notes,
//! single-flight audio playback and minute-granular schedule alerts.
//!
//! Hosts construct each engine explicitly and inject its collaborators;
//! nothing here keeps global state or installs a tracing subscriber.

pub mod alerts;
pub mod attachments;
pub mod blob;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod handles;
pub mod mirror;
pub mod models;
pub mod music;
pub mod notice;
pub mod playback;
pub mod util;

pub use error::{Error, ErrorKind, Result};
pub use notice::{NoticeBoard, UserNotice};
