//! `hints()` — the recognized string-keyed configuration carried alongside
//! a persisted token.

use std::collections::HashMap;

/// Requested access level for a provider instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    ReadWrite,
    ReadOnly,
}

use serde::{Deserialize, Serialize};

macro_rules! hint_keys {
    ($($const_name:ident => $key:literal),+ $(,)?) => {
        $(
            #[doc = concat!("The `", $key, "` hint key.")]
            pub const $const_name: &str = $key;
        )+
    };
}

hint_keys! {
    CLIENT_ID => "client_id",
    CLIENT_SECRET => "client_secret",
    REDIRECT_URI => "redirect_uri",
    REDIRECT_URI_PORT => "redirect_uri_port",
    STATE => "state",
    LOGIN_PAGE => "login_page",
    SUCCESS_PAGE => "success_page",
    ERROR_PAGE => "error_page",
    TEMPORARY_DIRECTORY => "temporary_directory",
    FILE_URL => "file_url",
    ACCESS_TOKEN => "access_token",
}

/// A string→string settings map. Unrecognized keys round-trip untouched;
/// recognized keys (the `hint_keys!` constants above) have typed
/// accessors. Property #6 from the testable-properties list: a provider
/// reinitialized with the `hints()` and token from a prior instance
/// reaches `Authenticated` without user consent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hints(HashMap<String, String>);

impl Hints {
    #[must_use]
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// An enumerable snapshot of every recognized key currently set.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.0.clone()
    }

    pub fn redirect_uri_port(&self) -> Option<u16> {
        self.get(REDIRECT_URI_PORT).and_then(|p| p.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_keys_round_trip() {
        let mut hints = Hints::new();
        hints.set("custom_key", "custom_value");
        assert_eq!(hints.get("custom_key"), Some("custom_value"));
    }

    #[test]
    fn redirect_uri_port_parses_typed_accessor() {
        let mut hints = Hints::new();
        hints.set(REDIRECT_URI_PORT, "51234");
        assert_eq!(hints.redirect_uri_port(), Some(51234));
    }

    #[test]
    fn snapshot_is_a_full_copy() {
        let mut hints = Hints::new();
        hints.set(CLIENT_ID, "abc");
        let snap = hints.snapshot();
        assert_eq!(snap.get(CLIENT_ID), Some(&"abc".to_string()));
    }
}
