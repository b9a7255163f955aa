//! Bearer token seam.
//!
//! Tokens arrive already acquired; refreshing them is someone else's job.

use crate::error::TokenError;

/// Produces the bearer token attached to outgoing requests.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Result<String, TokenError>;
}

/// A fixed, pre-acquired token.
#[derive(Clone)]
pub struct StaticToken {
    scope: &'static str,
    token: Option<String>,
}

impl StaticToken {
    pub fn new(scope: &'static str, token: impl Into<String>) -> Self {
        Self {
            scope,
            token: Some(token.into()),
        }
    }

    /// A source that fails every request; used when nothing was configured.
    pub fn missing(scope: &'static str) -> Self {
        Self { scope, token: None }
    }

    /// Build from an optional configured value. Blank counts as missing.
    pub fn from_option(scope: &'static str, token: Option<String>) -> Self {
        match token {
            Some(token) if !token.trim().is_empty() => Self::new(scope, token),
            _ => Self::missing(scope),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("scope", &self.scope)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl TokenSource for StaticToken {
    fn bearer_token(&self) -> Result<String, TokenError> {
        self.token.clone().ok_or(TokenError::Missing(self.scope))
    }
}
