//! Remote model identifiers.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use url::Url;

/// Opaque remote identifier (URL) of a model artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelReference(Url);

impl ModelReference {
    /// Parses a reference from a URL string.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not a valid absolute URL.
    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Url::parse(url).map(Self)
    }

    /// The underlying URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.0
    }

    /// Stable file-name-safe key: the hex SHA-256 of the URL.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("{:x}", Sha256::digest(self.0.as_str().as_bytes()))
    }
}

impl From<Url> for ModelReference {
    fn from(url: Url) -> Self {
        Self(url)
    }
}

impl FromStr for ModelReference {
    type Err = url::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
