//! Provider error types

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// Categorizes provider failures so callers can react without string-matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Authentication/API key issues
    Auth,
    /// Rate limiting
    RateLimit,
    /// Quota exceeded
    Quota,
    /// Request or deadline timeout
    Timeout,
    /// Network connectivity
    Network,
    /// Invalid request parameters
    Validation,
    /// Provider server error
    ServerError,
    /// Unexpected error
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Quota => "quota",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::Validation => "validation",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised by (or on behalf of) a single provider
///
/// Always carries the originating provider name; the wrapped cause is optional.
#[derive(Debug, Error)]
#[error("{provider}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Auth, message)
    }

    pub fn rate_limit(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::RateLimit, message)
    }

    pub fn quota(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Quota, message)
    }

    pub fn timeout(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Timeout, message)
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Network, message)
    }

    pub fn validation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Validation, message)
    }

    pub fn server(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::ServerError, message)
    }

    pub fn unknown(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Unknown, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Check if this is a rate limit error
    pub fn is_rate_limit(&self) -> bool {
        self.kind == ErrorKind::RateLimit
    }

    /// Check if this error came from the shared run deadline
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }
}

// Results embed provider errors; serialize the taxonomy, not the boxed cause.
impl Serialize for ProviderError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("ProviderError", 3)?;
        state.serialize_field("provider", &self.provider)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("message", &self.message)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_provider() {
        let err = ProviderError::auth("openai-gpt-4o", "invalid API key");
        assert_eq!(err.to_string(), "openai-gpt-4o: invalid API key");
    }

    #[test]
    fn test_kind_predicates() {
        assert!(ProviderError::rate_limit("p", "slow down").is_rate_limit());
        assert!(ProviderError::timeout("p", "deadline exceeded").is_timeout());
        assert!(!ProviderError::network("p", "connection reset").is_rate_limit());
    }

    #[test]
    fn test_source_is_preserved() {
        let cause = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = ProviderError::network("anthropic-haiku", "request failed").with_source(cause);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_serializes_taxonomy() {
        let err = ProviderError::server("openai-gpt-4o", "HTTP 500");
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(
            json,
            r#"{"provider":"openai-gpt-4o","kind":"server_error","message":"HTTP 500"}"#
        );
    }
}
