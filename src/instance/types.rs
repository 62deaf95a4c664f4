use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::gateway::ComputeError;

/// Lifecycle status reported by the provider for an instance.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum InstanceStatus {
    /// Resources are being allocated.
    Provisioning,
    /// Resources are acquired and the instance is preparing to boot.
    Staging,
    /// The instance is booting or running.
    Running,
    /// The instance is shutting down.
    Stopping,
    /// The instance has been stopped.
    Stopped,
    /// The instance is being suspended.
    Suspending,
    /// The instance is suspended.
    Suspended,
    /// The instance is powered off.
    Terminated,
    /// Any status this crate does not model explicitly.
    Other(String),
}

impl InstanceStatus {
    /// Parses the provider's upper-case status string.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "PROVISIONING" => Self::Provisioning,
            "STAGING" => Self::Staging,
            "RUNNING" => Self::Running,
            "STOPPING" => Self::Stopping,
            "STOPPED" => Self::Stopped,
            "SUSPENDING" => Self::Suspending,
            "SUSPENDED" => Self::Suspended,
            "TERMINATED" => Self::Terminated,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Provider spelling of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Provisioning => "PROVISIONING",
            Self::Staging => "STAGING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Suspending => "SUSPENDING",
            Self::Suspended => "SUSPENDED",
            Self::Terminated => "TERMINATED",
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One access configuration on a network interface.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct AccessConfig {
    /// Access configuration name, such as `External NAT`.
    #[serde(default)]
    pub name: Option<String>,
    /// Public address assigned by the provider.
    #[serde(default, rename = "natIP")]
    pub nat_ip: Option<String>,
}

/// One network interface attached to an instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    /// Interface name, such as `nic0`.
    #[serde(default)]
    pub name: Option<String>,
    /// Internal address.
    #[serde(default, rename = "networkIP")]
    pub network_ip: Option<String>,
    /// Access configurations in provider order.
    #[serde(default)]
    pub access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstancePayload {
    name: String,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    network_interfaces: Vec<NetworkInterface>,
}

/// Immutable snapshot of one compute instance.
///
/// Re-fetch through the registry to observe status transitions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instance {
    name: String,
    id: String,
    status: InstanceStatus,
    network_interfaces: Vec<NetworkInterface>,
}

impl Instance {
    /// Decodes an instance from an `instances.get` body.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Malformed`] when the body lacks a `name`.
    pub fn from_value(value: &Value) -> Result<Self, ComputeError> {
        let payload = InstancePayload::deserialize(value)
            .map_err(|err| ComputeError::malformed("instance", err))?;
        let id = match payload.id {
            Some(Value::String(id)) => id,
            Some(Value::Number(id)) => id.to_string(),
            _ => String::new(),
        };
        Ok(Self {
            name: payload.name,
            id,
            status: InstanceStatus::parse(&payload.status),
            network_interfaces: payload.network_interfaces,
        })
    }

    /// Instance name, unique within its project and zone.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provider-assigned identifier; empty when the provider omitted it.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Status observed when this snapshot was taken.
    #[must_use]
    pub const fn status(&self) -> &InstanceStatus {
        &self.status
    }

    /// Network interfaces in provider order.
    #[must_use]
    pub fn network_interfaces(&self) -> &[NetworkInterface] {
        &self.network_interfaces
    }

    /// True when the instance is `RUNNING`.
    #[must_use]
    pub fn running(&self) -> bool {
        self.status == InstanceStatus::Running
    }

    /// True when the instance is `STOPPING`.
    #[must_use]
    pub fn stopping(&self) -> bool {
        self.status == InstanceStatus::Stopping
    }

    /// True when the instance is `STOPPED`.
    #[must_use]
    pub fn stopped(&self) -> bool {
        self.status == InstanceStatus::Stopped
    }

    /// True when the instance is `TERMINATED`.
    #[must_use]
    pub fn terminated(&self) -> bool {
        self.status == InstanceStatus::Terminated
    }

    /// Returns the first public address found across all interfaces.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::NoPublicAddress`] when no access configuration
    /// carries an address.
    pub fn determine_remote_host(&self) -> Result<&str, ComputeError> {
        self.network_interfaces
            .iter()
            .flat_map(|interface| &interface.access_configs)
            .find_map(|config| config.nat_ip.as_deref())
            .ok_or_else(|| ComputeError::NoPublicAddress {
                instance: self.name.clone(),
            })
    }
}
