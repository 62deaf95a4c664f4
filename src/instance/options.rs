//! Create-request templates and override merging.

use serde_json::{Map, Value, json};

/// Machine type used when neither configuration nor overrides name one.
pub const DEFAULT_MACHINE_TYPE: &str = "f1-micro";
/// Boot image used when neither configuration nor overrides name one.
pub const DEFAULT_SOURCE_IMAGE: &str =
    "projects/ubuntu-os-cloud/global/images/family/ubuntu-2204-lts";

/// Values substituted into the minimal create request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateTemplate {
    /// Short machine type name, such as `e2-small`.
    pub machine_type: String,
    /// Source image for the boot disk.
    pub source_image: String,
}

impl Default for CreateTemplate {
    fn default() -> Self {
        Self {
            machine_type: DEFAULT_MACHINE_TYPE.to_owned(),
            source_image: DEFAULT_SOURCE_IMAGE.to_owned(),
        }
    }
}

/// Builds the minimal `instances.insert` body for `name` in `zone`.
///
/// The body has one auto-deleted persistent boot disk and one interface on
/// the default network with an ephemeral public address.
#[must_use]
pub fn default_create_options(zone: &str, name: &str, template: &CreateTemplate) -> Value {
    json!({
        "machineType": format!("zones/{zone}/machineTypes/{}", template.machine_type),
        "name": name,
        "disks": [{
            "deviceName": name,
            "autoDelete": true,
            "boot": true,
            "initializeParams": { "sourceImage": template.source_image },
            "type": "PERSISTENT",
        }],
        "networkInterfaces": [{
            "network": "global/networks/default",
            "name": "nic0",
            "accessConfigs": [{ "type": "ONE_TO_ONE_NAT", "name": "External NAT" }],
        }],
    })
}

/// Merges `overrides` onto `base`, recursing only through objects.
///
/// Arrays and scalars in `overrides` replace the base value wholesale. A
/// `null` override leaves the base value in place.
#[must_use]
pub fn merge_options(base: Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (base_value, Value::Null) => base_value,
        (Value::Object(mut target), Value::Object(source)) => {
            merge_objects(&mut target, source);
            Value::Object(target)
        }
        (_, replacement) => replacement.clone(),
    }
}

fn merge_objects(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        let merged = match target.remove(key) {
            Some(existing) => merge_options(existing, value),
            None if value.is_null() => continue,
            None => value.clone(),
        };
        target.insert(key.clone(), merged);
    }
}
