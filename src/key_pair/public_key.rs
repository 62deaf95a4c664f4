use std::fmt;

use super::KeyPairError;
use crate::files;

const KNOWN_PREFIXES: [&str; 3] = ["ssh-", "ecdsa-", "sk-"];

/// An OpenSSH public key line: `<algorithm> <base64> [comment]`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenSshPublicKey {
    algorithm: String,
    material: String,
    comment: Option<String>,
}

impl OpenSshPublicKey {
    /// Parses a single public key line.
    ///
    /// # Errors
    ///
    /// Returns [`KeyPairError::InvalidKey`] when the algorithm or key
    /// material is missing or unrecognised.
    pub fn parse(raw: &str) -> Result<Self, KeyPairError> {
        let invalid = |message: &str| KeyPairError::InvalidKey(message.to_owned());
        let mut fields = raw.split_whitespace();
        let algorithm = fields
            .next()
            .ok_or_else(|| invalid("public key is empty"))?;
        if !KNOWN_PREFIXES
            .iter()
            .any(|prefix| algorithm.starts_with(prefix))
        {
            return Err(invalid(&format!("unsupported key type `{algorithm}`")));
        }
        let material = fields
            .next()
            .ok_or_else(|| invalid("public key has no key material"))?;
        let comment = fields.collect::<Vec<_>>().join(" ");

        Ok(Self {
            algorithm: algorithm.to_owned(),
            material: material.to_owned(),
            comment: (!comment.is_empty()).then_some(comment),
        })
    }

    /// Reads and parses the first non-blank line of a `.pub` file.
    ///
    /// # Errors
    ///
    /// Returns [`KeyPairError::Read`] when the file cannot be read and
    /// [`KeyPairError::InvalidKey`] when it does not hold a public key.
    pub fn from_file(path: &str) -> Result<Self, KeyPairError> {
        let expanded = files::expand_tilde(path);
        let contents = files::read_to_string(&expanded).map_err(|message| KeyPairError::Read {
            path: expanded.clone(),
            message,
        })?;
        let line = contents
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap_or_default();
        Self::parse(line)
    }

    /// Key algorithm, such as `ssh-ed25519`.
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Trailing comment, conventionally `user@host`.
    #[must_use]
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Login name taken from a `user@host` comment.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        let comment = self.comment.as_deref()?;
        let user = comment.split('@').next().unwrap_or_default().trim();
        (!user.is_empty() && !user.contains(char::is_whitespace)).then_some(user)
    }

    /// Canonical single-line rendering, as stored in project metadata.
    #[must_use]
    pub fn to_openssh(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for OpenSshPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.algorithm, self.material)?;
        if let Some(comment) = &self.comment {
            write!(f, " {comment}")?;
        }
        Ok(())
    }
}
