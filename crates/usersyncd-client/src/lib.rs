//! usersyncd client - directory service access with event streaming

pub mod directory;
pub mod icinga;

pub use directory::{
    DirectoryClient, DirectoryError, DirectoryResult, EventStream, Subscription,
};
pub use icinga::{parse_event_stream, Icinga2Client};
