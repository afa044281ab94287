//! Command-line and config resolution tests for icinga2-usersyncd

use clap::Parser;
use icinga2_usersyncd::cli::Cli;
use std::io::Write;
use std::time::Duration;
use usersyncd_core::{ConfigFile, CredentialTemplate, Error};

fn cli(args: &[&str]) -> Cli {
    let mut argv = vec!["icinga2-usersyncd"];
    argv.extend_from_slice(args);
    Cli::parse_from(argv)
}

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn env(pairs: &[(&str, &str)]) -> ConfigFile {
    let pairs: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ConfigFile::from_env_with(|key| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
}

// ===========================================================================
// Layering
// ===========================================================================

#[test]
fn flags_override_file_and_env() {
    let file = config_file(
        r#"
[api]
url = "https://file:5665/"

[daemon]
queue = "from-file"
prefix = "agent-"
delay_secs = 5
"#,
    );
    let path = file.path().to_str().unwrap();
    let cli = cli(&["-c", path, "--queue", "from-cli", "--url", "https://cli:5665/"]);

    let settings = cli
        .load_settings_with(env(&[("ICINGA2_API_URL", "https://env:5665/")]))
        .unwrap();

    assert_eq!(settings.api.url, "https://cli:5665/");
    assert_eq!(settings.queue, "from-cli");
    assert_eq!(settings.prefix, "agent-");
    assert_eq!(settings.delay, Duration::from_secs(5));
}

#[test]
fn env_overrides_file() {
    let file = config_file("[api]\nurl = \"https://file:5665/\"\n");
    let cli = cli(&["--config", file.path().to_str().unwrap()]);
    let settings = cli
        .load_settings_with(env(&[
            ("ICINGA2_API_URL", "https://env:5665/"),
            ("ICINGA2_API_USERNAME", "usersyncd"),
            ("ICINGA2_API_PASSWORD", "secret"),
        ]))
        .unwrap();
    assert_eq!(settings.api.url, "https://env:5665/");
    assert_eq!(settings.api.username.as_deref(), Some("usersyncd"));
}

#[test]
fn permission_flags_select_permission_shape() {
    let file = config_file("[daemon]\ntemplates = [\"usersync\"]\n");
    let cli = cli(&[
        "-c",
        file.path().to_str().unwrap(),
        "--permission",
        "actions/process-check-result",
        "--permission",
        "objects/query/Host",
    ]);
    let settings = cli.load_settings_with(ConfigFile::default()).unwrap();
    assert_eq!(
        settings.credential,
        CredentialTemplate::Permissions(vec![
            "actions/process-check-result".into(),
            "objects/query/Host".into(),
        ])
    );
}

#[test]
fn full_sync_interval_flag() {
    let file = config_file("");
    let cli = cli(&["-c", file.path().to_str().unwrap(), "--full-sync-interval", "300"]);
    let settings = cli.load_settings_with(ConfigFile::default()).unwrap();
    assert_eq!(settings.full_sync_interval, Some(Duration::from_secs(300)));
}

// ===========================================================================
// Errors
// ===========================================================================

#[test]
fn explicit_missing_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    let cli = cli(&["-c", missing.to_str().unwrap()]);
    let err = cli.load_settings_with(ConfigFile::default()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn certificate_without_key_is_rejected() {
    let file = config_file("");
    let cli = cli(&[
        "-c",
        file.path().to_str().unwrap(),
        "--certificate",
        "/etc/icinga2/pki/usersyncd.crt",
    ]);
    let err = cli.load_settings_with(ConfigFile::default()).unwrap_err();
    assert!(err.to_string().contains("api.key"));
}

#[test]
fn unknown_config_key_is_rejected() {
    let file = config_file("[daemon]\nqueues = \"typo\"\n");
    let cli = cli(&["-c", file.path().to_str().unwrap()]);
    assert!(matches!(
        cli.load_settings_with(ConfigFile::default()),
        Err(Error::Config(_))
    ));
}

// ===========================================================================
// --dump-config
// ===========================================================================

#[test]
fn dump_config_redacts_password() {
    let file = config_file("[api]\nusername = \"root\"\npassword = \"hunter2\"\n");
    let cli = cli(&["-c", file.path().to_str().unwrap(), "--dump-config"]);
    assert!(cli.dump_config);

    let dumped = cli
        .load_settings_with(ConfigFile::default())
        .unwrap()
        .to_toml()
        .unwrap();

    assert!(!dumped.contains("hunter2"));
    assert!(dumped.contains("********"));
    assert!(dumped.contains("queue = \"icinga2-usersyncd\""));
}
