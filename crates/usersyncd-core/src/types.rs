//! Domain types shared by the client and the reconcilers

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Object type of the tracked resources.
pub const HOST_TYPE: &str = "Host";

/// A monitored object whose existence implies exactly one credential.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A credential record as listed by the directory. The name is the full,
/// prefixed object name; the owning resource is derived from it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
}

impl Credential {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// What to send when creating a credential object.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CredentialSpec {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<String>,
    pub attrs: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "ObjectCreated")]
    Created,
    #[serde(rename = "ObjectDeleted")]
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "ObjectCreated",
            Self::Deleted => "ObjectDeleted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded event-stream payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub object_type: String,
    pub object_name: String,
    #[serde(default)]
    pub timestamp: f64,
}

impl Event {
    pub fn created(object_type: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Created,
            object_type: object_type.into(),
            object_name: object_name.into(),
            timestamp: 0.0,
        }
    }

    pub fn deleted(object_type: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Deleted,
            object_type: object_type.into(),
            object_name: object_name.into(),
            timestamp: 0.0,
        }
    }

    /// Decode a single JSON payload line.
    pub fn decode(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| Error::Protocol(format!("{}: {}", e, line.trim())))
    }

    pub fn is_about(&self, object_type: &str) -> bool {
        self.object_type == object_type
    }
}
