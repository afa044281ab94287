//! Command-line interface

use clap::Parser;
use std::path::PathBuf;
use usersyncd_core::config::{ApiSection, DaemonSection, DEFAULT_CONFIG_PATH};
use usersyncd_core::{ConfigFile, Overrides, Result, Settings};

#[derive(Parser, Debug)]
#[command(
    name = "icinga2-usersyncd",
    about = "Keep one Icinga 2 ApiUser per Host, driven by the event stream",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Cli {
    /// Config file (TOML). Defaults to /etc/icinga2-usersyncd/config.toml if present.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Icinga 2 API URL (or set ICINGA2_API_URL)
    #[arg(long)]
    pub url: Option<String>,

    /// API username for basic auth (or set ICINGA2_API_USERNAME)
    #[arg(short, long)]
    pub username: Option<String>,

    /// API password for basic auth (or set ICINGA2_API_PASSWORD)
    #[arg(short, long)]
    pub password: Option<String>,

    /// Client certificate (PEM)
    #[arg(long)]
    pub certificate: Option<PathBuf>,

    /// Private key for the client certificate (PEM)
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// CA certificate for the API endpoint (PEM)
    #[arg(long)]
    pub ca_certificate: Option<PathBuf>,

    /// Request timeout in seconds (not applied to the event stream)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Event queue name
    #[arg(short, long)]
    pub queue: Option<String>,

    /// Host filter, e.g. 'host.zone == "master"'
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Prefix for ApiUser names
    #[arg(long)]
    pub prefix: Option<String>,

    /// Template imported by created ApiUsers (repeatable)
    #[arg(short, long = "template")]
    pub templates: Vec<String>,

    /// Permission granted on the own host instead of templates (repeatable)
    #[arg(long = "permission")]
    pub permissions: Vec<String>,

    /// Seconds to wait before reconnecting or retrying a failed pass
    #[arg(short, long)]
    pub delay: Option<u64>,

    /// Repeat the full comparison every N seconds (0 disables)
    #[arg(long)]
    pub full_sync_interval: Option<u64>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Write logs to a file (in addition to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Emit JSON log lines on stderr
    #[arg(long, default_value_t = false)]
    pub json_logs: bool,

    /// Print the resolved configuration and exit
    #[arg(long, default_value_t = false)]
    pub dump_config: bool,
}

impl Cli {
    /// Config file to read, and whether the user named it.
    pub fn config_path(&self) -> (PathBuf, bool) {
        match &self.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        }
    }

    /// The topmost configuration layer.
    pub fn overrides(&self) -> Overrides {
        ConfigFile {
            api: ApiSection {
                url: self.url.clone(),
                username: self.username.clone(),
                password: self.password.clone(),
                certificate: self.certificate.clone(),
                key: self.key.clone(),
                ca_certificate: self.ca_certificate.clone(),
                timeout_secs: self.timeout,
            },
            daemon: DaemonSection {
                queue: self.queue.clone(),
                filter: self.filter.clone(),
                prefix: self.prefix.clone(),
                templates: non_empty(&self.templates),
                permissions: non_empty(&self.permissions),
                delay_secs: self.delay,
                full_sync_interval_secs: self.full_sync_interval,
            },
        }
    }

    pub fn load_settings(&self) -> Result<Settings> {
        self.load_settings_with(ConfigFile::from_env())
    }

    /// Resolve settings against a given environment layer.
    pub fn load_settings_with(&self, env: ConfigFile) -> Result<Settings> {
        let (path, explicit) = self.config_path();
        let file = ConfigFile::load(&path, explicit)?;
        Settings::resolve(file, env, self.overrides())
    }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    (!values.is_empty()).then(|| values.to_vec())
}
