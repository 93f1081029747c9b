//! Secret resolution.

use crate::errors::ExecutorFailure;
use async_trait::async_trait;
use std::fmt;

/// A resolved credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Resolves named credentials, e.g. a source-control access token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretsProvider: Send + Sync {
    /// Resolves the secret called `name`.
    async fn resolve(&self, name: &str) -> Result<Secret, ExecutorFailure>;
}
