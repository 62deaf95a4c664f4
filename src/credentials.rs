//! Service-account credentials and access-token sources.
//!
//! Credentials are an opaque bag of named fields loaded from a flat JSON
//! object. They are checked for completeness before any executor is built.
//! Exchanging them for an OAuth token is left to an external tool; the
//! executor only consumes a bearer token through [`TokenSource`].

use std::collections::BTreeMap;

use thiserror::Error;

use crate::files;

/// Keys every credentials file must provide.
pub const REQUIRED_KEYS: [&str; 3] = ["p12_path", "issuer", "passphrase"];

/// Errors raised while loading or validating credentials.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CredentialsError {
    /// Raised when required keys are absent or blank.
    #[error("credentials are missing required keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),
    /// Raised when the credentials file cannot be read.
    #[error("failed to read credentials file `{path}`: {message}")]
    Read {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the credentials file is not a flat JSON object of strings.
    #[error("failed to parse credentials file `{path}`: {message}")]
    Parse {
        /// Path of the file.
        path: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when no access token is available.
    #[error("no access token configured")]
    NoToken,
}

/// Validated service-account credentials.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    fields: BTreeMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("issuer", &self.issuer())
            .field("client_email", &self.client_email())
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Builds credentials from named fields, rejecting incomplete input.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::MissingKeys`] listing every required key
    /// that is absent or blank.
    pub fn from_fields(fields: BTreeMap<String, String>) -> Result<Self, CredentialsError> {
        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| fields.get(**key).is_none_or(|value| value.trim().is_empty()))
            .map(|key| (*key).to_owned())
            .collect();
        if !missing.is_empty() {
            return Err(CredentialsError::MissingKeys(missing));
        }
        Ok(Self { fields })
    }

    /// Loads credentials from a JSON file such as
    /// `{"issuer": "...", "p12_path": "...", "passphrase": "..."}`.
    ///
    /// A leading `~/` is expanded to the home directory.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError`] when the file cannot be read or parsed,
    /// or when it lacks required keys.
    pub fn from_file(path: &str) -> Result<Self, CredentialsError> {
        let expanded = files::expand_tilde(path);
        let contents =
            files::read_to_string(&expanded).map_err(|message| CredentialsError::Read {
                path: expanded.clone(),
                message,
            })?;
        let fields: BTreeMap<String, String> =
            serde_json::from_str(&contents).map_err(|err| CredentialsError::Parse {
                path: expanded,
                message: err.to_string(),
            })?;
        Self::from_fields(fields)
    }

    /// Returns a named field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Account that issues token requests.
    #[must_use]
    pub fn issuer(&self) -> &str {
        self.get("issuer").unwrap_or_default()
    }

    /// Path to the signing key.
    #[must_use]
    pub fn signing_key_path(&self) -> &str {
        self.get("p12_path").unwrap_or_default()
    }

    /// Passphrase protecting the signing key.
    #[must_use]
    pub fn passphrase(&self) -> &str {
        self.get("passphrase").unwrap_or_default()
    }

    /// Optional client e-mail of the service account.
    #[must_use]
    pub fn client_email(&self) -> Option<&str> {
        self.get("client_email")
    }
}

/// Supplies bearer tokens for authenticated requests.
pub trait TokenSource: Send + Sync {
    /// Returns the current access token.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError`] when no token can be produced.
    fn access_token(&self) -> Result<String, CredentialsError>;
}

/// Token source returning a token obtained out of band (for example from
/// `gcloud auth print-access-token`).
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    /// Wraps a pre-issued access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(..)")
    }
}

impl TokenSource for StaticToken {
    fn access_token(&self) -> Result<String, CredentialsError> {
        if self.token.trim().is_empty() {
            return Err(CredentialsError::NoToken);
        }
        Ok(self.token.trim().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[rstest]
    fn from_fields_accepts_complete_credentials() {
        let credentials = Credentials::from_fields(fields(&[
            ("p12_path", "/keys/service.p12"),
            ("issuer", "svc@example.iam.gserviceaccount.com"),
            ("passphrase", "notasecret"),
        ]))
        .expect("credentials should validate");

        assert_eq!(credentials.issuer(), "svc@example.iam.gserviceaccount.com");
        assert_eq!(credentials.signing_key_path(), "/keys/service.p12");
        assert_eq!(credentials.client_email(), None);
    }

    #[rstest]
    #[case(&[("issuer", "a"), ("passphrase", "b")], &["p12_path"])]
    #[case(&[("p12_path", "a")], &["issuer", "passphrase"])]
    #[case(&[("p12_path", "a"), ("issuer", " "), ("passphrase", "b")], &["issuer"])]
    fn from_fields_lists_missing_keys(
        #[case] given: &[(&str, &str)],
        #[case] expected: &[&str],
    ) {
        let err = Credentials::from_fields(fields(given)).expect_err("should be incomplete");
        assert_eq!(
            err,
            CredentialsError::MissingKeys(expected.iter().map(|key| (*key).to_owned()).collect())
        );
    }

    #[test]
    fn debug_output_hides_passphrase() {
        let credentials = Credentials::from_fields(fields(&[
            ("p12_path", "a"),
            ("issuer", "issuer@example"),
            ("passphrase", "hunter2"),
        ]))
        .expect("credentials should validate");

        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("hunter2"), "leaked secret: {rendered}");
    }

    #[test]
    fn static_token_rejects_blank_token() {
        assert_eq!(
            StaticToken::new("  ").access_token(),
            Err(CredentialsError::NoToken)
        );
        assert_eq!(
            StaticToken::new("ya29.token\n").access_token(),
            Ok(String::from("ya29.token"))
        );
    }
}
