//! ApiUser management on top of the directory client

use std::sync::Arc;
use tracing::debug;
use usersyncd_client::DirectoryClient;
use usersyncd_core::{CredentialTemplate, Error, Result, Settings};

/// Maps host names to credential names and creates/deletes them.
///
/// Stateless: no existence pre-checks. A duplicate create or a delete of
/// a missing credential comes back as an `Operation` error for the caller
/// to log.
#[derive(Clone)]
pub struct CredentialManager {
    client: Arc<dyn DirectoryClient>,
    prefix: String,
    template: CredentialTemplate,
}

impl CredentialManager {
    pub fn new(
        client: Arc<dyn DirectoryClient>,
        prefix: impl Into<String>,
        template: CredentialTemplate,
    ) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            template,
        }
    }

    pub fn from_settings(client: Arc<dyn DirectoryClient>, settings: &Settings) -> Self {
        Self::new(client, settings.prefix.clone(), settings.credential.clone())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn credential_name(&self, resource: &str) -> String {
        format!("{}{}", self.prefix, resource)
    }

    /// Owning host of a credential, or `None` for credentials this daemon
    /// does not manage.
    pub fn resource_name<'a>(&self, credential: &'a str) -> Option<&'a str> {
        credential
            .strip_prefix(self.prefix.as_str())
            .filter(|name| !name.is_empty())
    }

    pub async fn add(&self, resource: &str) -> Result<()> {
        let name = self.credential_name(resource);
        debug!(resource, credential = %name, "adding ApiUser");
        self.client
            .create_credential(&name, &self.template.spec_for(resource))
            .await
            .map_err(|e| Error::operation("add", resource, e))
    }

    pub async fn remove(&self, resource: &str) -> Result<()> {
        let name = self.credential_name(resource);
        debug!(resource, credential = %name, "removing ApiUser");
        self.client
            .delete_credential(&name)
            .await
            .map_err(|e| Error::operation("remove", resource, e))
    }
}
