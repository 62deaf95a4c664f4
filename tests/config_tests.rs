//! Unit tests for configuration loading and validation.

use std::time::Duration;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use gce_machines::config::ConfigError;
use gce_machines::credentials::CredentialsError;
use gce_machines::instance::{DEFAULT_MACHINE_TYPE, DEFAULT_SOURCE_IMAGE};
use gce_machines::test_support::EnvGuard;
use gce_machines::{ChangePolicy, ComputeConfig, DriverUrl};
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn valid_config() -> ComputeConfig {
    ComputeConfig {
        project: Some(String::from("demo-project")),
        zone: Some(String::from("europe-west1-b")),
        driver_url: None,
        access_token: Some(String::from("ya29.example")),
        credentials_file: None,
        api_base: String::from("https://compute.googleapis.com/compute/v1"),
        poll_interval_secs: 5,
        poll_attempts: 30,
        default_machine_type: String::from(DEFAULT_MACHINE_TYPE),
        default_image: String::from(DEFAULT_SOURCE_IMAGE),
        default_ssh_username: String::from("ubuntu"),
        strict_metadata_changes: false,
    }
}

fn write_file(dir: &TempDir, name: &str, contents: &str) -> String {
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
    Dir::open_ambient_dir(&root, ambient_authority())
        .unwrap_or_else(|err| panic!("open temp dir: {err}"))
        .write(name, contents)
        .unwrap_or_else(|err| panic!("write {name}: {err}"));
    root.join(name).into_string()
}

#[rstest]
fn valid_config_passes_validation(valid_config: ComputeConfig) {
    valid_config
        .validate()
        .unwrap_or_else(|err| panic!("valid config: {err}"));
}

/// Each missing value names both its environment variable and its TOML key.
#[rstest]
#[case::project(|cfg: &mut ComputeConfig| cfg.project = None, "GCE_PROJECT", "project")]
#[case::zone(|cfg: &mut ComputeConfig| cfg.zone = Some(String::from("  ")), "GCE_ZONE", "zone")]
#[case::image(|cfg: &mut ComputeConfig| cfg.default_image.clear(), "GCE_DEFAULT_IMAGE", "default_image")]
#[case::machine_type(
    |cfg: &mut ComputeConfig| cfg.default_machine_type.clear(),
    "GCE_DEFAULT_MACHINE_TYPE",
    "default_machine_type"
)]
fn validation_errors_are_actionable(
    valid_config: ComputeConfig,
    #[case] mutate: fn(&mut ComputeConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    mutate(&mut cfg);

    let error = cfg.validate().expect_err("validation should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error}");
    };
    assert!(message.contains(env_var), "should mention {env_var}: {message}");
    assert!(message.contains(toml_key), "should mention {toml_key}: {message}");
    assert!(
        message.contains("gce-machines.toml"),
        "should mention the config file: {message}"
    );
}

#[rstest]
fn driver_url_takes_precedence_over_project_and_zone(valid_config: ComputeConfig) {
    let cfg = ComputeConfig {
        driver_url: Some(String::from("google:us-central1-a:other-project")),
        ..valid_config
    };

    let url = cfg
        .resolve_driver_url()
        .unwrap_or_else(|err| panic!("driver url: {err}"));
    assert_eq!(url, DriverUrl::new("us-central1-a", "other-project"));
}

#[rstest]
fn driver_url_alone_is_enough(valid_config: ComputeConfig) {
    let cfg = ComputeConfig {
        project: None,
        zone: None,
        driver_url: Some(String::from("google:asia-east1-c:solo")),
        ..valid_config
    };

    cfg.validate()
        .unwrap_or_else(|err| panic!("driver url should satisfy validation: {err}"));
}

#[rstest]
fn malformed_driver_url_is_rejected(valid_config: ComputeConfig) {
    let cfg = ComputeConfig {
        driver_url: Some(String::from("gce:zone:project")),
        ..valid_config
    };

    assert_eq!(
        cfg.validate(),
        Err(ConfigError::InvalidDriverUrl(String::from("gce:zone:project")))
    );
}

#[rstest]
fn zero_poll_attempts_are_rejected(valid_config: ComputeConfig) {
    let cfg = ComputeConfig {
        poll_attempts: 0,
        ..valid_config
    };

    assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
}

#[rstest]
fn derived_settings_follow_fields(valid_config: ComputeConfig) {
    let cfg = ComputeConfig {
        poll_interval_secs: 2,
        poll_attempts: 7,
        strict_metadata_changes: true,
        default_machine_type: String::from("e2-small"),
        ..valid_config
    };

    let policy = cfg.poll_policy();
    assert_eq!(policy.interval(), Duration::from_secs(2));
    assert_eq!(policy.attempts(), 7);
    assert_eq!(cfg.change_policy(), ChangePolicy::ContentOnly);
    assert_eq!(cfg.create_template().machine_type, "e2-small");
}

#[rstest]
fn missing_access_token_is_actionable(valid_config: ComputeConfig) {
    let cfg = ComputeConfig {
        access_token: None,
        ..valid_config
    };

    let message = cfg
        .token_source()
        .expect_err("token is required")
        .to_string();
    assert!(message.contains("GCE_ACCESS_TOKEN"), "got {message}");
}

#[rstest]
fn complete_credentials_file_is_accepted(valid_config: ComputeConfig) {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = write_file(
        &tmp,
        "service.json",
        r#"{"issuer": "svc@demo.iam.gserviceaccount.com", "p12_path": "/keys/svc.p12", "passphrase": "notasecret"}"#,
    );
    let cfg = ComputeConfig {
        credentials_file: Some(path),
        ..valid_config
    };

    let credentials = cfg
        .credentials()
        .unwrap_or_else(|err| panic!("credentials: {err}"))
        .unwrap_or_else(|| panic!("credentials should be loaded"));
    assert_eq!(credentials.issuer(), "svc@demo.iam.gserviceaccount.com");
}

#[rstest]
fn incomplete_credentials_file_lists_missing_keys(valid_config: ComputeConfig) {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = write_file(&tmp, "service.json", r#"{"issuer": "svc@demo"}"#);
    let cfg = ComputeConfig {
        credentials_file: Some(path),
        ..valid_config
    };

    assert_eq!(
        cfg.credentials(),
        Err(ConfigError::Credentials(CredentialsError::MissingKeys(vec![
            String::from("p12_path"),
            String::from("passphrase"),
        ])))
    );
}

#[tokio::test]
async fn credentials_path_expands_tilde() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let home = tmp.path().to_string_lossy().to_string();
    let _guard = EnvGuard::set_vars(&[("HOME", home.as_str())]).await;
    write_file(
        &tmp,
        "gce.json",
        r#"{"issuer": "svc@demo", "p12_path": "~/svc.p12", "passphrase": "pw"}"#,
    );
    let cfg = ComputeConfig {
        credentials_file: Some(String::from("~/gce.json")),
        ..valid_config()
    };

    let credentials = cfg
        .credentials()
        .unwrap_or_else(|err| panic!("credentials: {err}"));
    assert!(credentials.is_some());
}

#[tokio::test]
async fn environment_overrides_defaults() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let home = tmp.path().to_string_lossy().to_string();
    let _guard = EnvGuard::apply(&[
        ("HOME", Some(home.as_str())),
        ("XDG_CONFIG_HOME", Some(home.as_str())),
        ("GCE_MACHINES_CONFIG_PATH", None),
        ("GCE_PROJECT", Some("env-project")),
        ("GCE_ZONE", Some("europe-west4-a")),
        ("GCE_DRIVER_URL", None),
        ("GCE_POLL_ATTEMPTS", Some("12")),
        ("GCE_STRICT_METADATA_CHANGES", None),
    ])
    .await;

    let cfg = ComputeConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("load from env: {err}"));

    assert_eq!(cfg.project.as_deref(), Some("env-project"));
    assert_eq!(cfg.poll_attempts, 12);
    assert_eq!(cfg.poll_interval_secs, 5);
    assert_eq!(cfg.default_ssh_username, "ubuntu");
    assert_eq!(
        cfg.resolve_driver_url()
            .unwrap_or_else(|err| panic!("driver url: {err}"))
            .to_string(),
        "google:europe-west4-a:env-project"
    );
}
