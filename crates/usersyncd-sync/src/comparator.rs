//! Full reconciliation pass
//!
//! Lists every host and every ApiUser, then creates the missing
//! credentials and deletes the orphaned ones. Individual failures are
//! logged and counted; only a failed listing aborts the pass.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info};
use usersyncd_client::DirectoryClient;
use usersyncd_core::{Credential, Error, Resource, Result};

use crate::credentials::CredentialManager;

/// Corrective operations for one pass. The two sets are disjoint.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_add: BTreeSet<String>,
    pub to_remove: BTreeSet<String>,
}

impl SyncPlan {
    pub fn compute(
        manager: &CredentialManager,
        resources: &[Resource],
        credentials: &[Credential],
    ) -> Self {
        let resource_names: BTreeSet<&str> = resources.iter().map(|r| r.name.as_str()).collect();
        let credential_names: BTreeSet<&str> = credentials
            .iter()
            .filter_map(|c| manager.resource_name(&c.name))
            .collect();

        Self {
            to_add: resource_names
                .difference(&credential_names)
                .map(|s| s.to_string())
                .collect(),
            to_remove: credential_names
                .difference(&resource_names)
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub added: usize,
    pub removed: usize,
    pub failed: usize,
}

pub struct Comparator {
    client: Arc<dyn DirectoryClient>,
    manager: CredentialManager,
    filter: Option<String>,
}

impl Comparator {
    pub fn new(
        client: Arc<dyn DirectoryClient>,
        manager: CredentialManager,
        filter: Option<String>,
    ) -> Self {
        Self {
            client,
            manager,
            filter,
        }
    }

    /// Run one pass. Fails only if a listing fails.
    pub async fn run(&self) -> Result<PassReport> {
        // ApiUsers before hosts: a host created mid-pass must not look orphaned.
        debug!("[Comparator] Requesting list of ApiUsers...");
        let credentials = self
            .client
            .list_credentials()
            .await
            .map_err(|e| Error::connection(format!("listing ApiUsers: {}", e)))?;

        debug!("[Comparator] Requesting list of Hosts...");
        let resources = self
            .client
            .list_resources(self.filter.as_deref())
            .await
            .map_err(|e| Error::connection(format!("listing hosts: {}", e)))?;

        let plan = SyncPlan::compute(&self.manager, &resources, &credentials);
        debug!(
            hosts = resources.len(),
            apiusers = credentials.len(),
            to_add = plan.to_add.len(),
            to_remove = plan.to_remove.len(),
            "[Comparator] Computed plan"
        );

        let mut report = PassReport::default();

        for name in &plan.to_add {
            match self.manager.add(name).await {
                Ok(()) => report.added += 1,
                Err(e) => {
                    error!("[Comparator] Error while trying to add ApiUser \"{}\": {}", name, e);
                    report.failed += 1;
                }
            }
        }

        for name in &plan.to_remove {
            match self.manager.remove(name).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    error!("[Comparator] Error while trying to remove ApiUser \"{}\": {}", name, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            added = report.added,
            removed = report.removed,
            failed = report.failed,
            "[Comparator] ApiUsers synchronized."
        );
        Ok(report)
    }
}
