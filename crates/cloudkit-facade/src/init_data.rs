//! `InitData` — the explicit configuration object `CloudRegistry::create`
//! accepts: a token to resume from, an access-level hint, injectable
//! collaborators, and the recognized `hints` string map.

use std::sync::Arc;

use cloudkit_auth::ConsentCallback;
use cloudkit_core::domain::{Hints, Permission};
use cloudkit_http::HttpEngine;

/// Per-instance configuration for [`crate::CloudRegistry::create`].
///
/// A separate server factory or thread pool has no counterpart here:
/// this workspace has exactly one loopback server implementation
/// ([`cloudkit_server::AuthorizationServer`]/[`cloudkit_server::FileProviderServer`])
/// and one async runtime (`tokio`), so there is nothing to inject in their
/// place — only `http_engine` varies in practice (tests swap in an engine
/// pointed at a mock server).
#[derive(Clone)]
pub struct InitData {
    pub token: Option<String>,
    pub permission: Permission,
    pub http_engine: Option<Arc<HttpEngine>>,
    pub auth_callback: Option<ConsentCallback>,
    pub hints: Hints,
}

impl Default for InitData {
    fn default() -> Self {
        Self {
            token: None,
            permission: Permission::ReadWrite,
            http_engine: None,
            auth_callback: None,
            hints: Hints::new(),
        }
    }
}

impl InitData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    #[must_use]
    pub fn with_http_engine(mut self, http_engine: Arc<HttpEngine>) -> Self {
        self.http_engine = Some(http_engine);
        self
    }

    #[must_use]
    pub fn with_auth_callback(mut self, callback: ConsentCallback) -> Self {
        self.auth_callback = Some(callback);
        self
    }

    #[must_use]
    pub fn with_hints(mut self, hints: Hints) -> Self {
        self.hints = hints;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_read_write_with_no_token() {
        let init_data = InitData::new();
        assert!(init_data.token.is_none());
        assert_eq!(init_data.permission, Permission::ReadWrite);
    }

    #[test]
    fn builder_methods_chain() {
        let mut hints = Hints::new();
        hints.set("client_id", "abc");
        let init_data = InitData::new()
            .with_token("seeded")
            .with_permission(Permission::ReadOnly)
            .with_hints(hints);

        assert_eq!(init_data.token.as_deref(), Some("seeded"));
        assert_eq!(init_data.permission, Permission::ReadOnly);
        assert_eq!(init_data.hints.get("client_id"), Some("abc"));
    }
}
