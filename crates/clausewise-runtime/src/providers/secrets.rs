//! API keys for completion backends.
//!
//! A key is wrapped in [`SecretString`] the moment it is read. Formatting an
//! [`ApiKey`] prints where it came from, never the key.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Env(&'static str),
    Explicit,
}

pub struct ApiKey {
    secret: SecretString,
    source: KeySource,
}

impl ApiKey {
    pub fn explicit(key: impl Into<String>) -> Self {
        Self {
            secret: SecretString::from(key.into()),
            source: KeySource::Explicit,
        }
    }

    /// Read a key from `var`; unset or blank counts as missing.
    pub fn from_env(var: &'static str) -> Result<Self, ProviderError> {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Ok(Self {
                secret: SecretString::from(value),
                source: KeySource::Env(var),
            }),
            _ => Err(ProviderError::MissingCredential(format!("set {} to use this backend", var))),
        }
    }

    /// The raw key, for building a request header.
    pub fn reveal(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn source(&self) -> KeySource {
        self.source
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self)
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            KeySource::Env(var) => write!(f, "${} [REDACTED]", var),
            KeySource::Explicit => f.write_str("explicit [REDACTED]"),
        }
    }
}
