//! Token supply for authenticated requests.
//!
//! Providers are asynchronous so implementations can refresh credentials
//! from a remote source between requests.

use async_trait::async_trait;

use crate::error::Result;

/// Supplies the token attached to every request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current token, or `None` for unauthenticated backends.
    async fn token(&self) -> Result<Option<String>>;
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// A provider that never sends a token.
    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<Option<String>> {
        Ok(self.token.clone())
    }
}

/// Reads the token from an environment variable on every request.
#[derive(Debug, Clone)]
pub struct EnvTokenProvider {
    var: String,
}

impl EnvTokenProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvTokenProvider {
    fn default() -> Self {
        Self::new("ASTRA_DB_APPLICATION_TOKEN")
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn token(&self) -> Result<Option<String>> {
        Ok(std::env::var(&self.var).ok().filter(|t| !t.is_empty()))
    }
}
