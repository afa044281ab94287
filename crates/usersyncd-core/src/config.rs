//! Daemon configuration
//!
//! Settings are resolved once at startup from layers: built-in defaults,
//! the TOML config file, environment variables, then command-line
//! overrides. The result is an immutable [`Settings`] handed to every
//! component.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::CredentialSpec;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/icinga2-usersyncd/config.toml";
pub const DEFAULT_URL: &str = "https://localhost:5665/";
pub const DEFAULT_QUEUE: &str = "icinga2-usersyncd";
pub const DEFAULT_PREFIX: &str = "host-";
pub const DEFAULT_TEMPLATES: &[&str] = &["usersync"];
pub const DEFAULT_DELAY_SECS: u64 = 1;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Permission granted by default when credentials are shaped by permissions.
pub const DEFAULT_PERMISSION: &str = "actions/process-check-result";

const ENV_URL: &str = "ICINGA2_API_URL";
const ENV_USERNAME: &str = "ICINGA2_API_USERNAME";
const ENV_PASSWORD: &str = "ICINGA2_API_PASSWORD";

// ============================================================
// Layers
// ============================================================

/// One configuration layer. Every key is optional; unset keys fall
/// through to the layer below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub api: ApiSection,
    pub daemon: DaemonSection,
}

/// Command-line overrides use the same shape as the file.
pub type Overrides = ConfigFile;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Client certificate (PEM).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<PathBuf>,
    /// Private key for the client certificate (PEM).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,
    /// CA certificate used to verify the API endpoint (PEM).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonSection {
    /// Event queue name used for the subscription.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    /// Host filter expression, e.g. `host.zone == "master"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates: Option<Vec<String>>,
    /// When non-empty, credentials carry these permissions (scoped to the
    /// host) instead of importing templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_sync_interval_secs: Option<u64>,
}

impl ConfigFile {
    /// Load a layer from a TOML file.
    ///
    /// A missing file yields an empty layer unless `explicit` is set, in
    /// which case the caller asked for that file and it must exist.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                tracing::debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Error::config(format!("cannot read {}: {}", path.display(), e)));
            }
        };
        let layer: Self = toml::from_str(&content)
            .map_err(|e| Error::config(format!("cannot parse {}: {}", path.display(), e)))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(layer)
    }

    /// Build a layer from environment variables.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api: ApiSection {
                url: lookup(ENV_URL),
                username: lookup(ENV_USERNAME),
                password: lookup(ENV_PASSWORD),
                ..ApiSection::default()
            },
            daemon: DaemonSection::default(),
        }
    }

    /// Lay `over` on top of `self`: keys set in `over` win.
    pub fn merge(self, over: ConfigFile) -> ConfigFile {
        let (a, b) = (self.api, over.api);
        let (d, e) = (self.daemon, over.daemon);
        ConfigFile {
            api: ApiSection {
                url: b.url.or(a.url),
                username: b.username.or(a.username),
                password: b.password.or(a.password),
                certificate: b.certificate.or(a.certificate),
                key: b.key.or(a.key),
                ca_certificate: b.ca_certificate.or(a.ca_certificate),
                timeout_secs: b.timeout_secs.or(a.timeout_secs),
            },
            daemon: DaemonSection {
                queue: e.queue.or(d.queue),
                filter: e.filter.or(d.filter),
                prefix: e.prefix.or(d.prefix),
                templates: e.templates.or(d.templates),
                permissions: e.permissions.or(d.permissions),
                delay_secs: e.delay_secs.or(d.delay_secs),
                full_sync_interval_secs: e.full_sync_interval_secs.or(d.full_sync_interval_secs),
            },
        }
    }
}

// ============================================================
// Resolved settings
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub certificate: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub ca_certificate: Option<PathBuf>,
    pub timeout: Duration,
}

/// How a credential object is shaped for its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialTemplate {
    /// Import these templates.
    Templates(Vec<String>),
    /// Grant these permissions, each filtered to the owning host.
    Permissions(Vec<String>),
}

impl Default for CredentialTemplate {
    fn default() -> Self {
        Self::Templates(DEFAULT_TEMPLATES.iter().map(|t| t.to_string()).collect())
    }
}

impl CredentialTemplate {
    /// Object body for the credential owned by `resource`.
    pub fn spec_for(&self, resource: &str) -> CredentialSpec {
        match self {
            Self::Templates(templates) => CredentialSpec {
                templates: templates.clone(),
                attrs: json!({ "client_cn": resource }),
            },
            Self::Permissions(permissions) => {
                let filter = format!("host.name == {}", json!(resource));
                let grants: Vec<_> = permissions
                    .iter()
                    .map(|p| json!({ "permission": p, "filter": filter }))
                    .collect();
                CredentialSpec {
                    templates: Vec::new(),
                    attrs: json!({ "client_cn": resource, "permissions": grants }),
                }
            }
        }
    }
}

/// Fully resolved, immutable daemon settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api: ApiSettings,
    pub queue: String,
    pub filter: Option<String>,
    pub prefix: String,
    pub credential: CredentialTemplate,
    /// Back-off between reconnect and restart attempts.
    pub delay: Duration,
    /// Repeat the full pass this often; `None` runs it once per connection.
    pub full_sync_interval: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api: ApiSettings {
                url: DEFAULT_URL.to_string(),
                username: None,
                password: None,
                certificate: None,
                key: None,
                ca_certificate: None,
                timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            },
            queue: DEFAULT_QUEUE.to_string(),
            filter: None,
            prefix: DEFAULT_PREFIX.to_string(),
            credential: CredentialTemplate::default(),
            delay: Duration::from_secs(DEFAULT_DELAY_SECS),
            full_sync_interval: None,
        }
    }
}

impl Settings {
    /// Resolve defaults < file < environment < overrides.
    pub fn resolve(file: ConfigFile, env: ConfigFile, overrides: Overrides) -> Result<Self> {
        let merged = file.merge(env).merge(overrides);
        Self::from_layer(merged)
    }

    /// Resolve a single, already merged layer against the defaults.
    pub fn from_layer(layer: ConfigFile) -> Result<Self> {
        let defaults = Settings::default();
        let ConfigFile { api, daemon } = layer;

        let credential = match (daemon.permissions, daemon.templates) {
            (Some(perms), _) if !perms.is_empty() => CredentialTemplate::Permissions(perms),
            (_, Some(templates)) => CredentialTemplate::Templates(templates),
            _ => defaults.credential,
        };

        let settings = Settings {
            api: ApiSettings {
                url: api.url.unwrap_or(defaults.api.url),
                username: api.username,
                password: api.password,
                certificate: api.certificate,
                key: api.key,
                ca_certificate: api.ca_certificate,
                timeout: api
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.api.timeout),
            },
            queue: daemon.queue.unwrap_or(defaults.queue),
            filter: daemon.filter.filter(|f| !f.trim().is_empty()),
            prefix: daemon.prefix.unwrap_or(defaults.prefix),
            credential,
            delay: daemon
                .delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.delay),
            full_sync_interval: daemon
                .full_sync_interval_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.url.trim().is_empty() {
            return Err(Error::config("api.url must not be empty"));
        }
        if self.prefix.is_empty() {
            return Err(Error::config("daemon.prefix must not be empty"));
        }
        if self.queue.trim().is_empty() {
            return Err(Error::config("daemon.queue must not be empty"));
        }
        if self.api.certificate.is_some() && self.api.key.is_none() {
            return Err(Error::config("api.key is required when api.certificate is set"));
        }
        if self.api.username.is_some() != self.api.password.is_some() {
            return Err(Error::config(
                "api.username and api.password must be given together",
            ));
        }
        Ok(())
    }

    /// Render the settings back as a config layer, password redacted.
    pub fn to_config_file(&self) -> ConfigFile {
        let (templates, permissions) = match &self.credential {
            CredentialTemplate::Templates(t) => (Some(t.clone()), None),
            CredentialTemplate::Permissions(p) => (None, Some(p.clone())),
        };
        ConfigFile {
            api: ApiSection {
                url: Some(self.api.url.clone()),
                username: self.api.username.clone(),
                password: self.api.password.as_ref().map(|_| "********".to_string()),
                certificate: self.api.certificate.clone(),
                key: self.api.key.clone(),
                ca_certificate: self.api.ca_certificate.clone(),
                timeout_secs: Some(self.api.timeout.as_secs()),
            },
            daemon: DaemonSection {
                queue: Some(self.queue.clone()),
                filter: self.filter.clone(),
                prefix: Some(self.prefix.clone()),
                templates,
                permissions,
                delay_secs: Some(self.delay.as_secs()),
                full_sync_interval_secs: self.full_sync_interval.map(|d| d.as_secs()),
            },
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.to_config_file())
            .map_err(|e| Error::config(format!("cannot render settings: {}", e)))
    }
}
