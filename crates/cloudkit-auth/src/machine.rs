//! The auth state machine: holds the current token, drives the
//! authorization code/refresh exchange through a [`CloudProvider`], and
//! gates requests on being `Authenticated`.
//!
//! The flow (generate URL → wait for a loopback redirect → exchange
//! code) works against any [`CloudProvider`], with the interactive login
//! and the 401-triggered refresh kept as separate entry points with
//! independent coalescing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cloudkit_core::domain::{CloudError, Hints, Token};
use cloudkit_core::ports::{AuthConsent, CloudProvider};
use cloudkit_server::{AuthorizationHandler, AuthorizationServer};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::pages::{default_error_page, default_login_page, default_success_page};
use crate::state::AuthState;

/// Consent hook: called with the provider name, decides how (or whether)
/// to drive the user through an interactive login.
pub type ConsentCallback = Arc<dyn Fn(&str) -> AuthConsent + Send + Sync>;

pub struct AuthMachine {
    provider: Arc<dyn CloudProvider>,
    consent: ConsentCallback,
    csrf_state: String,
    token: Mutex<Option<Token>>,
    phase: Mutex<AuthState>,
    generation: AtomicU64,
    code_tx: Mutex<Option<oneshot::Sender<Result<String, CloudError>>>>,
    success_page: Mutex<String>,
    error_page: Mutex<String>,
    login_page: Mutex<String>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl AuthMachine {
    #[must_use]
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        consent: ConsentCallback,
        initial_token: Option<Token>,
        hints: &Hints,
    ) -> Arc<Self> {
        let phase = if initial_token.is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        let csrf_state = hints
            .get(cloudkit_core::domain::config::STATE)
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);

        Arc::new(Self {
            success_page: Mutex::new(
                hints
                    .get(cloudkit_core::domain::config::SUCCESS_PAGE)
                    .map_or_else(|| default_success_page(provider.name()), str::to_string),
            ),
            error_page: Mutex::new(
                hints
                    .get(cloudkit_core::domain::config::ERROR_PAGE)
                    .map_or_else(|| default_error_page(""), str::to_string),
            ),
            login_page: Mutex::new(String::new()),
            provider,
            consent,
            csrf_state,
            token: Mutex::new(initial_token),
            phase: Mutex::new(phase),
            generation: AtomicU64::new(0),
            code_tx: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    #[must_use]
    pub fn state(&self) -> AuthState {
        self.phase.lock().unwrap().clone()
    }

    #[must_use]
    pub fn csrf_state(&self) -> &str {
        &self.csrf_state
    }

    /// The current token, if any has ever been obtained. Does not trigger
    /// a refresh; callers hitting 401 should use [`Self::on_unauthorized`].
    pub fn token(&self) -> Result<Token, CloudError> {
        self.current_token()
    }

    fn set_phase(&self, phase: AuthState) {
        *self.phase.lock().unwrap() = phase;
    }

    fn current_token(&self) -> Result<Token, CloudError> {
        self.token
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| CloudError::unauthorized("not authenticated"))
    }

    /// Drives `Unauthenticated`/`Refreshing` to `Authenticated`, opening an
    /// interactive loopback login only if no refresh token survives from a
    /// previous session. Idempotent: returns immediately if already
    /// authenticated with a live token.
    pub async fn login(self: &Arc<Self>, server: &AuthorizationServer) -> Result<Token, CloudError> {
        let existing = self.token.lock().unwrap().clone();
        if let Some(token) = existing {
            if !token.is_expired() {
                self.set_phase(AuthState::Authenticated);
                return Ok(token);
            }
            if token.refresh_token.is_some() {
                return self.refresh_or_wait().await;
            }
        }
        self.authenticate_interactively(server).await
    }

    /// Called by the request engine when a request comes back 401.
    /// Concurrent callers coalesce onto the same refresh via
    /// `refresh_lock`; only the first actually calls the provider.
    pub async fn on_unauthorized(self: &Arc<Self>) -> Result<Token, CloudError> {
        self.refresh_or_wait().await
    }

    async fn refresh_or_wait(self: &Arc<Self>) -> Result<Token, CloudError> {
        let seen = self.generation.load(Ordering::SeqCst);
        let _permit = self.refresh_lock.lock().await;

        // Someone else refreshed while we waited for the lock.
        if self.generation.load(Ordering::SeqCst) != seen {
            return self.current_token();
        }

        self.set_phase(AuthState::Refreshing);
        let old = self.current_token()?;
        match self.provider.refresh_token(&old).await {
            Ok(new_token) => {
                *self.token.lock().unwrap() = Some(new_token.clone());
                self.generation.fetch_add(1, Ordering::SeqCst);
                self.set_phase(AuthState::Authenticated);
                Ok(new_token)
            }
            Err(err) => {
                warn!(provider = self.provider.name(), error = %err, "token refresh failed");
                self.set_phase(AuthState::Failed(err.clone()));
                Err(err)
            }
        }
    }

    async fn authenticate_interactively(self: &Arc<Self>, server: &AuthorizationServer) -> Result<Token, CloudError> {
        match (self.consent)(self.provider.name()) {
            AuthConsent::None => {
                let err = CloudError::unauthorized("user consent required but no interactive callback was registered");
                self.set_phase(AuthState::Failed(err.clone()));
                Err(err)
            }
            AuthConsent::WaitForAuthorizationCode | AuthConsent::RedirectUri(_) => {
                let authorize_url = self.provider.authorize_library_url();
                *self.login_page.lock().unwrap() = authorize_url
                    .as_deref()
                    .map_or_else(String::new, default_login_page);

                let (tx, rx) = oneshot::channel();
                *self.code_tx.lock().unwrap() = Some(tx);
                let guard = server.register(self.csrf_state.clone(), self.clone() as Arc<dyn AuthorizationHandler>);
                self.set_phase(AuthState::AwaitingCode);
                info!(provider = self.provider.name(), "awaiting OAuth redirect");

                let received = rx.await.map_err(|_| CloudError::aborted());
                drop(guard);
                let code = received??;

                self.set_phase(AuthState::Exchanging);
                match self.provider.exchange_code(&code).await {
                    Ok(token) => {
                        *self.token.lock().unwrap() = Some(token.clone());
                        self.generation.fetch_add(1, Ordering::SeqCst);
                        self.set_phase(AuthState::Authenticated);
                        Ok(token)
                    }
                    Err(err) => {
                        self.set_phase(AuthState::Failed(err.clone()));
                        Err(err)
                    }
                }
            }
        }
    }
}

impl AuthorizationHandler for AuthMachine {
    fn on_code(&self, code: &str) -> String {
        if let Some(tx) = self.code_tx.lock().unwrap().take() {
            let _ = tx.send(Ok(code.to_string()));
        }
        self.success_page.lock().unwrap().clone()
    }

    fn on_error(&self, error: &str) -> String {
        if let Some(tx) = self.code_tx.lock().unwrap().take() {
            let _ = tx.send(Err(CloudError::unauthorized(error)));
        }
        let mut page = self.error_page.lock().unwrap().clone();
        if page.is_empty() {
            page = default_error_page(error);
        }
        page
    }

    fn login_page(&self) -> String {
        self.login_page.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cloudkit_core::domain::{Item, RemoteId};

    struct StubProvider {
        refresh_result: Result<Token, CloudError>,
        exchange_result: Result<Token, CloudError>,
    }

    #[async_trait]
    impl CloudProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn root_directory(&self) -> Item {
            Item::root(RemoteId::new("root").unwrap())
        }

        fn authorize_library_url(&self) -> Option<String> {
            Some("https://example.invalid/authorize".to_string())
        }

        async fn exchange_code(&self, _code: &str) -> Result<Token, CloudError> {
            self.exchange_result.clone()
        }

        async fn refresh_token(&self, _token: &Token) -> Result<Token, CloudError> {
            self.refresh_result.clone()
        }
    }

    fn provider(refresh: Result<Token, CloudError>, exchange: Result<Token, CloudError>) -> Arc<dyn CloudProvider> {
        Arc::new(StubProvider {
            refresh_result: refresh,
            exchange_result: exchange,
        })
    }

    #[tokio::test]
    async fn unauthenticated_with_refresh_token_refreshes_directly() {
        let initial = Token {
            access_token: "stale".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_at: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
        };
        let refreshed = Token::seeded("fresh");
        let provider = provider(Ok(refreshed.clone()), Err(CloudError::unknown("unused")));
        let machine = AuthMachine::new(provider, Arc::new(|_| AuthConsent::None), Some(initial), &Hints::new());

        let server = AuthorizationServer::bind().await.unwrap();
        let token = machine.login(&server).await.unwrap();

        assert_eq!(token.access_token, "fresh");
        assert_eq!(machine.state(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn no_consent_callback_fails_without_a_token() {
        let provider = provider(Err(CloudError::unknown("unused")), Err(CloudError::unknown("unused")));
        let machine = AuthMachine::new(provider, Arc::new(|_| AuthConsent::None), None, &Hints::new());

        let server = AuthorizationServer::bind().await.unwrap();
        let err = machine.login(&server).await.unwrap_err();

        assert_eq!(machine.state(), AuthState::Failed(err.clone()));
        assert!(err.is_authorization_error());
    }

    #[tokio::test]
    async fn concurrent_refresh_calls_coalesce_onto_one_provider_call() {
        let initial = Token {
            access_token: "stale".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_at: None,
        };
        let provider = provider(Ok(Token::seeded("fresh")), Err(CloudError::unknown("unused")));
        let machine = AuthMachine::new(provider, Arc::new(|_| AuthConsent::None), Some(initial), &Hints::new());

        let (a, b) = tokio::join!(machine.on_unauthorized(), machine.on_unauthorized());
        assert_eq!(a.unwrap().access_token, "fresh");
        assert_eq!(b.unwrap().access_token, "fresh");
    }

    #[tokio::test]
    async fn redirect_callback_completes_the_pending_login() {
        let provider = provider(Err(CloudError::unknown("unused")), Ok(Token::seeded("exchanged")));
        let machine = AuthMachine::new(
            provider,
            Arc::new(|_| AuthConsent::WaitForAuthorizationCode),
            None,
            &Hints::new(),
        );

        let server = AuthorizationServer::bind().await.unwrap();
        let port = server.port();
        let login_task = {
            let machine = machine.clone();
            tokio::spawn(async move { machine.login(&server).await })
        };

        // Give `login` a moment to register its handler before the redirect arrives.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(machine.state(), AuthState::AwaitingCode);

        let state = machine.csrf_state().to_string();
        let url = format!("http://127.0.0.1:{port}/?state={state}&code=the-code");
        let response = reqwest::get(url).await.unwrap();
        assert_eq!(response.status(), 200);

        let token = login_task.await.unwrap().unwrap();
        assert_eq!(token.access_token, "exchanged");
        assert_eq!(machine.state(), AuthState::Authenticated);
    }
}
