//! Configuration loading via `ortho-config`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::credentials::{Credentials, CredentialsError, StaticToken};
use crate::gateway::DEFAULT_API_BASE;
use crate::instance::{CreateTemplate, DEFAULT_MACHINE_TYPE, DEFAULT_SOURCE_IMAGE};
use crate::metadata::ChangePolicy;
use crate::operation::PollPolicy;

const DRIVER_SCHEME: &str = "google";

/// Compute Engine settings derived from configuration files, environment
/// variables, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "GCE",
    discovery(
        app_name = "gce-machines",
        env_var = "GCE_MACHINES_CONFIG_PATH",
        config_file_name = "gce-machines.toml",
        dotfile_name = ".gce-machines.toml",
        project_file_name = "gce-machines.toml"
    )
)]
pub struct ComputeConfig {
    /// Project that owns the instances and the metadata document.
    pub project: Option<String>,
    /// Zone instances are created in.
    pub zone: Option<String>,
    /// Driver URL of the form `google:<zone>:<project>`. Takes precedence
    /// over `project` and `zone` when set.
    pub driver_url: Option<String>,
    /// Bearer token sent with each request, such as the output of
    /// `gcloud auth print-access-token`.
    pub access_token: Option<String>,
    /// Service-account credentials file checked for completeness on start.
    pub credentials_file: Option<String>,
    /// Base URL of the Compute Engine v1 REST API.
    #[ortho_config(default = DEFAULT_API_BASE.to_owned())]
    pub api_base: String,
    /// Seconds between status polls.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Polls made before a wait gives up.
    #[ortho_config(default = 30)]
    pub poll_attempts: u32,
    /// Machine type for new instances.
    #[ortho_config(default = DEFAULT_MACHINE_TYPE.to_owned())]
    pub default_machine_type: String,
    /// Boot image for new instances.
    #[ortho_config(default = DEFAULT_SOURCE_IMAGE.to_owned())]
    pub default_image: String,
    /// Login name used when neither the machine reference nor the options
    /// name one.
    #[ortho_config(default = "ubuntu".to_owned())]
    pub default_ssh_username: String,
    /// Only write the metadata document when an edit changed its content.
    #[ortho_config(default = false)]
    pub strict_metadata_changes: bool,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to gce-machines.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const PROJECT: FieldMetadata = FieldMetadata::new("project", "GCE_PROJECT", "project");
const ZONE: FieldMetadata = FieldMetadata::new("zone", "GCE_ZONE", "zone");
const ACCESS_TOKEN: FieldMetadata =
    FieldMetadata::new("API access token", "GCE_ACCESS_TOKEN", "access_token");
const MACHINE_TYPE: FieldMetadata = FieldMetadata::new(
    "machine type",
    "GCE_DEFAULT_MACHINE_TYPE",
    "default_machine_type",
);
const IMAGE: FieldMetadata = FieldMetadata::new("boot image", "GCE_DEFAULT_IMAGE", "default_image");
const API_BASE: FieldMetadata = FieldMetadata::new("API base URL", "GCE_API_BASE", "api_base");

fn require_field<'a>(value: Option<&'a str>, metadata: &FieldMetadata) -> Result<&'a str, ConfigError> {
    match value.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => Ok(trimmed),
        _ => Err(metadata.missing()),
    }
}

impl ComputeConfig {
    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("gce-machines")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that supply a missing value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the target cannot be resolved, a required
    /// value is blank, or the polling budget is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolve_driver_url()?;
        require_field(Some(self.api_base.as_str()), &API_BASE)?;
        require_field(Some(self.default_machine_type.as_str()), &MACHINE_TYPE)?;
        require_field(Some(self.default_image.as_str()), &IMAGE)?;
        if self.poll_attempts == 0 {
            return Err(ConfigError::Invalid(String::from(
                "poll_attempts must be at least 1 (GCE_POLL_ATTEMPTS)",
            )));
        }
        Ok(())
    }

    /// Resolves the project and zone, preferring `driver_url` when present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDriverUrl`] for a malformed URL, or
    /// [`ConfigError::MissingField`] when project or zone is unset.
    pub fn resolve_driver_url(&self) -> Result<DriverUrl, ConfigError> {
        if let Some(raw) = self.driver_url.as_deref()
            && !raw.trim().is_empty()
        {
            return DriverUrl::parse(raw.trim());
        }
        let project = require_field(self.project.as_deref(), &PROJECT)?;
        let zone = require_field(self.zone.as_deref(), &ZONE)?;
        Ok(DriverUrl::new(zone, project))
    }

    /// Builds the bearer token source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when no token is configured.
    pub fn token_source(&self) -> Result<StaticToken, ConfigError> {
        require_field(self.access_token.as_deref(), &ACCESS_TOKEN).map(StaticToken::new)
    }

    /// Loads and checks the credentials file, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Credentials`] when the file is unreadable or
    /// incomplete.
    pub fn credentials(&self) -> Result<Option<Credentials>, ConfigError> {
        self.credentials_file
            .as_deref()
            .filter(|path| !path.trim().is_empty())
            .map(Credentials::from_file)
            .transpose()
            .map_err(ConfigError::from)
    }

    /// Polling cadence for operation, status, and transport waits.
    #[must_use]
    pub const fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            self.poll_attempts,
        )
    }

    /// How metadata edits decide whether the document must be written.
    #[must_use]
    pub const fn change_policy(&self) -> ChangePolicy {
        if self.strict_metadata_changes {
            ChangePolicy::ContentOnly
        } else {
            ChangePolicy::EveryEdit
        }
    }

    /// Template for the minimal create request.
    #[must_use]
    pub fn create_template(&self) -> CreateTemplate {
        CreateTemplate {
            machine_type: self.default_machine_type.clone(),
            source_image: self.default_image.clone(),
        }
    }
}

/// Identifies the project and zone a machine belongs to, rendered as
/// `google:<zone>:<project>`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DriverUrl {
    zone: String,
    project: String,
}

impl DriverUrl {
    /// Builds a driver URL from its parts.
    pub fn new(zone: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            project: project.into(),
        }
    }

    /// Parses `google:<zone>:<project>`. The zone runs up to the first `:`
    /// after the scheme; the project is the remainder.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDriverUrl`] when the scheme is not
    /// `google` or either part is empty.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidDriverUrl(raw.to_owned());
        let rest = raw
            .strip_prefix(DRIVER_SCHEME)
            .and_then(|tail| tail.strip_prefix(':'))
            .ok_or_else(invalid)?;
        let (zone, project) = rest.split_once(':').ok_or_else(invalid)?;
        if zone.is_empty() || project.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(zone, project))
    }

    /// Zone part.
    #[must_use]
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Project part.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }
}

impl fmt::Display for DriverUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DRIVER_SCHEME}:{}:{}", self.zone, self.project)
    }
}

impl FromStr for DriverUrl {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds a value outside its accepted range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Raised when a driver URL is not `google:<zone>:<project>`.
    #[error("invalid driver URL `{0}`: expected google:<zone>:<project>")]
    InvalidDriverUrl(String),
    /// Surfaces credential file problems.
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
