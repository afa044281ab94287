//! Directory client trait

use futures::Stream;
use std::pin::Pin;
use usersyncd_core::{Credential, CredentialSpec, Event, EventKind, Resource, HOST_TYPE};

/// Result type for directory operations
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Directory error types
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    /// A single undecodable stream item. The stream itself stays usable.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("tls setup failed: {0}")]
    Tls(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl DirectoryError {
    /// Whether this item error leaves the stream intact.
    pub fn is_item_error(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// Live event stream. Dropping it releases the subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = DirectoryResult<Event>> + Send>>;

/// Parameters of an event subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub types: Vec<EventKind>,
    pub queue: String,
    pub filter: Option<String>,
}

impl Subscription {
    /// Created/deleted events for hosts on the given queue.
    pub fn hosts(queue: impl Into<String>) -> Self {
        Self {
            types: vec![EventKind::Created, EventKind::Deleted],
            queue: queue.into(),
            filter: Some(format!("event.object_type == \"{}\"", HOST_TYPE)),
        }
    }
}

/// Access to the directory service: the system of record for hosts,
/// credentials, and their change events.
///
/// Every call may fail transiently; callers decide what a failure means.
#[async_trait::async_trait]
pub trait DirectoryClient: Send + Sync {
    /// All hosts, optionally narrowed by a filter expression.
    async fn list_resources(&self, filter: Option<&str>) -> DirectoryResult<Vec<Resource>>;

    /// A single host by name, `None` if it does not exist or the filter
    /// excludes it.
    async fn get_resource(
        &self,
        name: &str,
        filter: Option<&str>,
    ) -> DirectoryResult<Option<Resource>>;

    /// All credential objects, managed or not.
    async fn list_credentials(&self) -> DirectoryResult<Vec<Credential>>;

    async fn create_credential(&self, name: &str, spec: &CredentialSpec) -> DirectoryResult<()>;

    async fn delete_credential(&self, name: &str) -> DirectoryResult<()>;

    /// Open a long-lived event subscription.
    async fn subscribe(&self, subscription: &Subscription) -> DirectoryResult<EventStream>;
}
