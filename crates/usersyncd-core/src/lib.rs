//! usersyncd core - domain types, configuration, and error handling

pub mod config;
pub mod error;
pub mod types;

pub use config::{ApiSettings, ConfigFile, CredentialTemplate, Overrides, Settings};
pub use error::{Error, Result};
pub use types::*;
