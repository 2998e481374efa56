//! A minimal credential-string [`CloudProvider`] double, exercising
//! `cloudkit_auth::credential` the way [`crate::mega::MegaProvider`] does
//! but without an in-memory node table or a real `FileProviderServer` —
//! for auth-machine and facade tests that only care about the login/token
//! round trip, not file operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use cloudkit_auth::credential;
use cloudkit_core::domain::{CloudError, Hints, Item, RemoteId, Token};
use cloudkit_core::domain::config;
use cloudkit_core::ports::{CloudProvider, SupportedOps};

pub struct CredentialTestProvider {
    login_page_origin: String,
    state: String,
    authorized: AtomicBool,
    username: Mutex<Option<String>>,
}

impl CredentialTestProvider {
    #[must_use]
    pub fn new(login_page_origin: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            login_page_origin: login_page_origin.into(),
            state: state.into(),
            authorized: AtomicBool::new(false),
            username: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CloudProvider for CredentialTestProvider {
    fn name(&self) -> &str {
        "credential-test"
    }

    fn root_directory(&self) -> Item {
        Item::root(RemoteId::new("root".to_string()).expect("literal id is valid"))
    }

    fn hints(&self) -> Hints {
        let mut hints = Hints::new();
        hints.set(config::STATE, self.state.clone());
        hints
    }

    fn authorize_library_url(&self) -> Option<String> {
        Some(format!("{}/login?state={}", self.login_page_origin.trim_end_matches('/'), self.state))
    }

    fn supported_operations(&self) -> SupportedOps {
        SupportedOps::EXCHANGE_CODE
    }

    async fn exchange_code(&self, code: &str) -> Result<Token, CloudError> {
        let (user, _hash) = credential::split_code(code).ok_or_else(|| CloudError::failure("malformed credential code"))?;
        *self.username.lock().expect("username mutex poisoned") = Some(user.to_string());
        self.authorized.store(true, Ordering::SeqCst);
        Ok(Token::seeded(code.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exchange_code_marks_the_double_authorized() {
        let provider = CredentialTestProvider::new("http://127.0.0.1:9/", "s1");
        assert!(!provider.is_authorized());
        let code = credential::synthesize_code("bob", "secret");
        provider.exchange_code(&code).await.unwrap();
        assert!(provider.is_authorized());
    }

    #[test]
    fn authorize_url_is_the_loopback_login_page() {
        let provider = CredentialTestProvider::new("http://127.0.0.1:9/", "s2");
        assert_eq!(provider.authorize_library_url().unwrap(), "http://127.0.0.1:9/login?state=s2");
    }
}
