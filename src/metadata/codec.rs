//! Line-oriented `name:value` encoding used for the SSH sub-maps.
//!
//! Names must not contain `:` and values must not contain a newline; neither
//! is validated.

/// Metadata key holding the project's SSH public keys.
pub const SSH_KEYS_KEY: &str = "sshKeys";
/// Metadata key holding the resource-name to public-key mappings.
pub const SSH_MAPPINGS_KEY: &str = "gce-machines-ssh-mappings";

const KEY_VALUE_SEPARATOR: char = ':';
const ITEM_SEPARATOR: char = '\n';

/// Renders pairs as `name:value` lines.
#[must_use]
pub fn encode_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| format!("{name}{KEY_VALUE_SEPARATOR}{value}"))
        .collect::<Vec<_>>()
        .join(&ITEM_SEPARATOR.to_string())
}

/// Parses `name:value` lines, splitting each at its first `:`.
///
/// Blank lines are skipped; a line without a separator yields an empty value.
#[must_use]
pub fn decode_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(ITEM_SEPARATOR)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_once(KEY_VALUE_SEPARATOR).map_or_else(
                || (line.to_owned(), String::new()),
                |(name, value)| (name.to_owned(), value.to_owned()),
            )
        })
        .collect()
}

/// Parses pairs as a map: a repeated name keeps its first position and its
/// last value.
#[must_use]
pub fn decode_map(raw: &str) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = Vec::new();
    for (name, value) in decode_pairs(raw) {
        match entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => entries.push((name, value)),
        }
    }
    entries
}
