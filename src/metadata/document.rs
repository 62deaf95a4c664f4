use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::codec::{SSH_KEYS_KEY, SSH_MAPPINGS_KEY, decode_map, decode_pairs, encode_pairs};
use crate::gateway::ComputeError;

/// One `{key, value}` entry of the metadata document.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MetadataItem {
    /// Item key, unique within the document.
    pub key: String,
    /// Item value.
    #[serde(default)]
    pub value: String,
}

impl MetadataItem {
    /// Creates an item.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Decides when a sub-map edit marks the document as changed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ChangePolicy {
    /// Every mutation call marks the document changed, even when it removes
    /// something that was not there.
    #[default]
    EveryEdit,
    /// Only mutations that alter the encoded sub-map mark the document
    /// changed.
    ContentOnly,
}

#[derive(Debug, Default, Deserialize)]
struct CommonInstanceMetadata {
    #[serde(default)]
    fingerprint: Option<String>,
    #[serde(default)]
    items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectPayload {
    #[serde(default)]
    common_instance_metadata: CommonInstanceMetadata,
}

#[derive(Clone, Copy, Debug)]
enum SubMap {
    Keys,
    Mappings,
}

impl SubMap {
    const fn key(self) -> &'static str {
        match self {
            Self::Keys => SSH_KEYS_KEY,
            Self::Mappings => SSH_MAPPINGS_KEY,
        }
    }

    fn decode(self, raw: &str) -> Vec<(String, String)> {
        match self {
            Self::Keys => decode_pairs(raw),
            Self::Mappings => decode_map(raw),
        }
    }
}

/// Project-wide metadata fetched from the provider, with staged SSH edits.
///
/// The SSH key list and the name-to-key mappings are decoded lazily from
/// their items and cached. Edits apply to the cached sub-maps; [`Self::items`]
/// re-encodes every edited sub-map into a fresh, key-sorted item list. Once
/// set, [`Self::changed`] stays true for the lifetime of the value.
#[derive(Clone, Debug)]
pub struct ProjectMetadata {
    fingerprint: Option<String>,
    items: Vec<MetadataItem>,
    ssh_keys: OnceLock<Vec<(String, String)>>,
    ssh_mappings: OnceLock<Vec<(String, String)>>,
    keys_edited: bool,
    mappings_edited: bool,
    changed: bool,
    policy: ChangePolicy,
}

impl ProjectMetadata {
    /// Builds a document from its fingerprint and items.
    ///
    /// Duplicate keys keep the last value.
    #[must_use]
    pub fn new(fingerprint: Option<String>, items: Vec<MetadataItem>, policy: ChangePolicy) -> Self {
        let mut unique: Vec<MetadataItem> = Vec::with_capacity(items.len());
        for item in items {
            unique.retain(|existing| existing.key != item.key);
            unique.push(item);
        }
        unique.sort_by(|lhs, rhs| lhs.key.cmp(&rhs.key));
        Self {
            fingerprint,
            items: unique,
            ssh_keys: OnceLock::new(),
            ssh_mappings: OnceLock::new(),
            keys_edited: false,
            mappings_edited: false,
            changed: false,
            policy,
        }
    }

    /// Decodes the `commonInstanceMetadata` of a `projects.get` body.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Malformed`] when the metadata has the wrong
    /// shape.
    pub fn from_project(value: &Value, policy: ChangePolicy) -> Result<Self, ComputeError> {
        let payload = ProjectPayload::deserialize(value)
            .map_err(|err| ComputeError::malformed("project metadata", err))?;
        let metadata = payload.common_instance_metadata;
        Ok(Self::new(metadata.fingerprint, metadata.items, policy))
    }

    /// Compare-and-swap token captured when the document was fetched.
    #[must_use]
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// True once any SSH key or mapping edit has been applied.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.changed
    }

    /// Policy deciding when edits mark the document changed.
    #[must_use]
    pub const fn policy(&self) -> ChangePolicy {
        self.policy
    }

    /// Returns the value of an item.
    #[must_use]
    pub fn item(&self, key: &str) -> Option<&str> {
        find_item(&self.items, key)
    }

    /// `(username, public key)` pairs in stored order.
    #[must_use]
    pub fn ssh_keys(&self) -> &[(String, String)] {
        self.sub_map(SubMap::Keys)
    }

    /// `(resource name, public key)` mappings in stored order.
    #[must_use]
    pub fn ssh_mappings(&self) -> &[(String, String)] {
        self.sub_map(SubMap::Mappings)
    }

    /// Public key last uploaded for a resource name.
    #[must_use]
    pub fn ssh_mapping(&self, name: &str) -> Option<&str> {
        self.ssh_mappings()
            .iter()
            .find(|(mapped, _)| mapped == name)
            .map(|(_, key)| key.as_str())
    }

    /// Appends `key` for `username`. Other keys filed under the same
    /// username are kept; only an identical pair moves to the end.
    pub fn ensure_key(&mut self, username: &str, key: &str) {
        self.edit(SubMap::Keys, |keys| {
            keys.retain(|(existing_user, existing_key)| {
                existing_user != username || existing_key != key
            });
            keys.push((username.to_owned(), key.to_owned()));
        });
    }

    /// Removes every pair whose public key equals `key`, whatever its
    /// username.
    pub fn delete_ssh_key(&mut self, key: &str) {
        self.edit(SubMap::Keys, |keys| {
            keys.retain(|(_, existing)| existing != key);
        });
    }

    /// Records `key` as the public key uploaded for resource `name`.
    pub fn set_ssh_mapping(&mut self, name: &str, key: &str) {
        self.edit(SubMap::Mappings, |mappings| {
            match mappings.iter_mut().find(|(mapped, _)| mapped == name) {
                Some(entry) => key.clone_into(&mut entry.1),
                None => mappings.push((name.to_owned(), key.to_owned())),
            }
        });
    }

    /// Forgets the mapping for resource `name`.
    pub fn delete_ssh_mapping(&mut self, name: &str) {
        self.edit(SubMap::Mappings, |mappings| {
            mappings.retain(|(mapped, _)| mapped != name);
        });
    }

    /// Full item list to write back, sorted by key.
    ///
    /// Edited sub-maps are re-encoded from their current state. A sub-map
    /// that had no item when fetched and is empty now is left out.
    #[must_use]
    pub fn items(&self) -> Vec<MetadataItem> {
        let mut items = self.items.clone();
        for (sub_map, edited) in [
            (SubMap::Keys, self.keys_edited),
            (SubMap::Mappings, self.mappings_edited),
        ] {
            if !edited {
                continue;
            }
            let key = sub_map.key();
            let pairs = self.sub_map(sub_map);
            let existed = items.iter().any(|item| item.key == key);
            items.retain(|item| item.key != key);
            if existed || !pairs.is_empty() {
                items.push(MetadataItem::new(key, encode_pairs(pairs)));
            }
        }
        items.sort_by(|lhs, rhs| lhs.key.cmp(&rhs.key));
        items
    }

    fn sub_map(&self, sub_map: SubMap) -> &[(String, String)] {
        let cell = match sub_map {
            SubMap::Keys => &self.ssh_keys,
            SubMap::Mappings => &self.ssh_mappings,
        };
        cell.get_or_init(|| {
            find_item(&self.items, sub_map.key()).map_or_else(Vec::new, |raw| sub_map.decode(raw))
        })
    }

    fn edit(&mut self, sub_map: SubMap, apply: impl FnOnce(&mut Vec<(String, String)>)) {
        let (cell, edited) = match sub_map {
            SubMap::Keys => (&mut self.ssh_keys, &mut self.keys_edited),
            SubMap::Mappings => (&mut self.ssh_mappings, &mut self.mappings_edited),
        };
        let mut pairs = cell.take().unwrap_or_else(|| {
            find_item(&self.items, sub_map.key()).map_or_else(Vec::new, |raw| sub_map.decode(raw))
        });
        let before = encode_pairs(&pairs);
        apply(&mut pairs);
        let differs = encode_pairs(&pairs) != before;
        *cell = OnceLock::from(pairs);

        let marks = match self.policy {
            ChangePolicy::EveryEdit => true,
            ChangePolicy::ContentOnly => differs,
        };
        if marks {
            *edited = true;
            self.changed = true;
        }
    }
}

fn find_item<'a>(items: &'a [MetadataItem], key: &str) -> Option<&'a str> {
    items
        .iter()
        .find(|item| item.key == key)
        .map(|item| item.value.as_str())
}
