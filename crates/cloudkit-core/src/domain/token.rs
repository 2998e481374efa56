//! The OAuth credential pair owned by the auth state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access/refresh token pair, mutated only by the initial exchange or a
/// refresh (see `cloudkit-auth`'s state machine). Readable by callers so
/// they can persist it: this crate never writes a token to disk itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    /// Absent for providers or flows that never issue a refresh token.
    pub refresh_token: Option<String>,
    /// Absolute expiry. `None` means the token never expires or the
    /// provider doesn't report an expiry (callers should treat it as
    /// short-lived and retry on 401 regardless).
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// A token seeded without a refresh round-trip, e.g. from `hints()`'s
    /// `access_token` key.
    #[must_use]
    pub fn seeded(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() >= at,
            None => false,
        }
    }

    #[must_use]
    pub fn expires_within(&self, duration: chrono::Duration) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() + duration >= at,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_token_never_reports_expired() {
        let token = Token::seeded("AT");
        assert!(!token.is_expired());
        assert!(!token.expires_within(chrono::Duration::days(365)));
    }

    #[test]
    fn expiry_is_inclusive_of_now() {
        let token = Token {
            access_token: "AT".to_string(),
            refresh_token: Some("RT".to_string()),
            expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
        };
        assert!(token.is_expired());
    }

    #[test]
    fn expires_within_checks_lookahead_window() {
        let token = Token {
            access_token: "AT".to_string(),
            refresh_token: None,
            expires_at: Some(Utc::now() + chrono::Duration::seconds(30)),
        };
        assert!(!token.is_expired());
        assert!(token.expires_within(chrono::Duration::seconds(60)));
        assert!(!token.expires_within(chrono::Duration::seconds(5)));
    }
}
