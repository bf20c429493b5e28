pub mod alerts;
pub mod blob;
pub mod common;
pub mod play;
pub mod schedule;
pub mod sync;
pub mod tasks;
