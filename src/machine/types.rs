use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default TCP port probed for SSH.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Caller-supplied options for one machine.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct MachineOptions {
    /// Fields merged onto the default `instances.insert` body.
    pub insert_options: Option<Value>,
    /// Login name to connect with.
    pub ssh_username: Option<String>,
    /// Whether commands need a `sudo ` prefix; derived from the user when unset.
    pub sudo: Option<bool>,
    /// Jump host to reach the instance through.
    pub ssh_gateway: Option<String>,
    /// Name of the key pair used to log in.
    pub key_name: Option<String>,
    /// Node that requested the machine, recorded for bookkeeping.
    pub host_node: Option<String>,
    /// TCP port probed for SSH availability.
    pub ssh_port: Option<u16>,
}

/// Facts recorded when a machine is allocated, persisted by the caller.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MachineReference {
    /// Version of the crate that allocated the machine.
    pub driver_version: String,
    /// Driver URL (`google:<zone>:<project>`) the machine belongs to.
    pub driver_url: String,
    /// Allocation time in UTC.
    pub allocated_at: DateTime<Utc>,
    /// Node that requested the machine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_node: Option<String>,
    /// Login name chosen at allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_username: Option<String>,
    /// Explicit sudo preference chosen at allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sudo: Option<bool>,
    /// Jump host chosen at allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_gateway: Option<String>,
    /// Key pair chosen at allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
}

impl MachineReference {
    /// Records a fresh allocation for `driver_url` from `options`.
    #[must_use]
    pub fn record(driver_url: impl Into<String>, options: &MachineOptions) -> Self {
        Self {
            driver_version: env!("CARGO_PKG_VERSION").to_owned(),
            driver_url: driver_url.into(),
            allocated_at: Utc::now(),
            host_node: options.host_node.clone(),
            ssh_username: options.ssh_username.clone(),
            sudo: options.sudo,
            ssh_gateway: options.ssh_gateway.clone(),
            key_name: options.key_name.clone(),
        }
    }
}

/// A logical machine: its name and, once allocated, its reference.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MachineSpec {
    /// Instance name.
    pub name: String,
    /// Reference recorded at allocation, if any.
    #[serde(default)]
    pub reference: Option<MachineReference>,
}

impl MachineSpec {
    /// A machine that has not been allocated yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: None,
        }
    }

    /// A machine with a previously recorded reference.
    pub fn with_reference(name: impl Into<String>, reference: MachineReference) -> Self {
        Self {
            name: name.into(),
            reference: Some(reference),
        }
    }
}

/// Everything an SSH transport needs to reach a ready machine.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ConnectionTarget {
    /// Public address of the instance.
    pub host: String,
    /// TCP port of the SSH daemon.
    pub port: u16,
    /// Login name.
    pub username: String,
    /// Command prefix, `sudo ` for non-root users unless disabled.
    pub prefix: Option<String>,
    /// Alias under which the host key is recorded.
    pub host_key_alias: String,
    /// Key pair to authenticate with.
    pub key_name: Option<String>,
    /// Jump host, if any.
    pub ssh_gateway: Option<String>,
}

impl ConnectionTarget {
    /// `user@host` rendering.
    #[must_use]
    pub fn login(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}
