//! Domain error types
//!
//! Two error types live here: [`DomainError`], raised by newtype
//! constructors on invalid input, and [`CloudError`], the `{code, message}`
//! pair every provider operation and the request engine report through.

use thiserror::Error;

/// Errors raised when constructing a validated domain newtype.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote path format
    #[error("invalid remote path: {0}")]
    InvalidRemotePath(String),

    /// Invalid remote ID format
    #[error("invalid remote id: {0}")]
    InvalidRemoteId(String),

    /// Invalid or empty content hash
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    /// Invalid or empty delta/page token
    #[error("invalid delta token: {0}")]
    InvalidDeltaToken(String),
}

/// Numeric status codes an operation can terminate with.
///
/// Matches the scheme used throughout the provider adapters: real HTTP
/// status codes pass through unchanged, with three synthetic codes for
/// conditions that never reach the wire.
pub mod code {
    /// 2xx: request succeeded.
    pub const OK: u16 = 200;
    /// 206: partial content, used by the streaming proxy.
    pub const PARTIAL: u16 = 206;
    /// 400: malformed request.
    pub const BAD: u16 = 400;
    /// 401: missing or expired credentials.
    pub const UNAUTHORIZED: u16 = 401;
    /// 403: state/CSRF mismatch or provider-level access refusal.
    pub const FORBIDDEN: u16 = 403;
    /// 404: item or route not found.
    pub const NOT_FOUND: u16 = 404;
    /// 416: requested byte range not satisfiable.
    pub const RANGE_INVALID: u16 = 416;
    /// 503: streaming proxy not yet authorized.
    pub const SERVICE_UNAVAILABLE: u16 = 503;
    /// 600: request was cancelled.
    pub const ABORTED: u16 = 600;
    /// 700: transport-level failure with no HTTP status to report.
    pub const UNKNOWN: u16 = 700;
    /// 800: parser or adapter failure (includes "operation not supported").
    pub const FAILURE: u16 = 800;
}

/// An error pair: a numeric code and a human-readable message.
///
/// Codes are HTTP status codes when the failure came from the wire, or one
/// of the three synthetic codes ([`code::ABORTED`], [`code::UNKNOWN`],
/// [`code::FAILURE`]) for conditions the engine itself detects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct CloudError {
    pub code: u16,
    pub message: String,
}

impl CloudError {
    /// Build an error from a raw numeric code and message.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// A request was cancelled (code 600).
    pub fn aborted() -> Self {
        Self::new(code::ABORTED, "request aborted")
    }

    /// A transport failure with no HTTP status (code 700).
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(code::UNKNOWN, message)
    }

    /// A parser or adapter failure (code 800), e.g. an unsupported operation.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(code::FAILURE, message)
    }

    /// An authorization failure that survived a one-shot re-authorization
    /// retry (code 401).
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(code::UNAUTHORIZED, message)
    }

    /// The operation's builder produced no request: this provider does not
    /// implement it.
    pub fn not_supported(operation: &str) -> Self {
        Self::failure(format!("operation not supported: {operation}"))
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code / 100 == 2
    }

    #[must_use]
    pub fn is_redirect(&self) -> bool {
        self.code / 100 == 3
    }

    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self.code / 100, 4 | 5)
    }

    #[must_use]
    pub fn is_authorization_error(&self) -> bool {
        self.code == code::UNAUTHORIZED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_error_display() {
        let err = DomainError::InvalidRemotePath("/bad//path".to_string());
        assert_eq!(err.to_string(), "invalid remote path: /bad//path");
    }

    #[test]
    fn cloud_error_classification() {
        assert!(CloudError::new(200, "ok").is_success());
        assert!(CloudError::new(302, "moved").is_redirect());
        assert!(CloudError::new(404, "missing").is_client_error());
        assert!(CloudError::new(401, "nope").is_authorization_error());
        assert!(!CloudError::new(200, "ok").is_authorization_error());
    }

    #[test]
    fn synthetic_codes() {
        assert_eq!(CloudError::aborted().code, code::ABORTED);
        assert_eq!(CloudError::unknown("x").code, code::UNKNOWN);
        assert_eq!(CloudError::failure("x").code, code::FAILURE);
    }

    #[test]
    fn not_supported_uses_failure_code() {
        let err = CloudError::not_supported("upload_file");
        assert_eq!(err.code, code::FAILURE);
        assert!(err.message.contains("upload_file"));
    }
}
