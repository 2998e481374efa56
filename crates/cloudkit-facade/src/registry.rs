//! `CloudRegistry` — enumerates built-in providers and assembles a new
//! instance's adapter, auth machine and request engine around a shared
//! pair of loopback servers. One registry owns the `HttpEngine`/
//! `AuthorizationServer`/`FileProviderServer` handles once and hands them
//! to every provider instance it creates, rather than each instance
//! binding its own sockets.

use std::sync::Arc;

use cloudkit_auth::AuthMachine;
use cloudkit_core::domain::{code, config, CloudError, Token};
use cloudkit_core::ports::{AuthConsent, CloudProvider};
use cloudkit_engine::RequestEngine;
use cloudkit_http::HttpEngine;
use cloudkit_providers::mega::MegaProvider;
use cloudkit_providers::onedrive::{OneDriveConfig, OneDriveProvider};
use cloudkit_server::{AuthorizationServer, FileProviderServer};

use crate::access::CloudAccess;
use crate::init_data::InitData;

/// Built-in provider names `CloudRegistry::create` recognizes.
pub const PROVIDER_NAMES: &[&str] = &["onedrive", "mega"];

/// A single requester's worth of in-flight concurrency per provider
/// instance.
const DEFAULT_CONCURRENCY: usize = 8;

pub struct CloudRegistry {
    http: Arc<HttpEngine>,
    auth_server: Arc<AuthorizationServer>,
    file_server: Arc<FileProviderServer>,
}

impl CloudRegistry {
    /// Binds the two shared loopback sockets once. Every provider created
    /// from this registry multiplexes its OAuth redirect and (if opaque)
    /// its streaming-proxy traffic onto these same two sockets, dispatched
    /// by `state`.
    pub async fn bind() -> Result<Self, CloudError> {
        let auth_server = AuthorizationServer::bind().await.map_err(|e| CloudError::failure(e.to_string()))?;
        let file_server = FileProviderServer::bind().await.map_err(|e| CloudError::failure(e.to_string()))?;
        Ok(Self {
            http: Arc::new(HttpEngine::new()),
            auth_server: Arc::new(auth_server),
            file_server: Arc::new(file_server),
        })
    }

    #[must_use]
    pub fn provider_names() -> &'static [&'static str] {
        PROVIDER_NAMES
    }

    #[must_use]
    pub fn redirect_uri(&self) -> String {
        self.auth_server.redirect_uri()
    }

    #[must_use]
    pub fn file_endpoint(&self) -> String {
        self.file_server.endpoint()
    }

    pub fn create(&self, name: &str, init_data: InitData) -> Result<CloudAccess, CloudError> {
        match name {
            "onedrive" => self.create_onedrive(init_data),
            "mega" => self.create_mega(init_data),
            other => Err(CloudError::new(code::BAD, format!("unknown provider \"{other}\""))),
        }
    }

    fn http_for(&self, init_data: &InitData) -> Arc<HttpEngine> {
        init_data.http_engine.clone().unwrap_or_else(|| self.http.clone())
    }

    fn state_for(&self, init_data: &InitData) -> String {
        init_data
            .hints
            .get(config::STATE)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    fn create_onedrive(&self, init_data: InitData) -> Result<CloudAccess, CloudError> {
        let hints = init_data.hints.clone();
        let state = self.state_for(&init_data);
        let redirect_uri = hints.get(config::REDIRECT_URI).map(str::to_string).unwrap_or_else(|| self.auth_server.redirect_uri());
        let client_id = hints.get(config::CLIENT_ID).unwrap_or_default().to_string();

        let mut onedrive_config = OneDriveConfig::new(client_id, redirect_uri);
        if let Some(secret) = hints.get(config::CLIENT_SECRET) {
            onedrive_config = onedrive_config.with_client_secret(secret);
        }

        let http = self.http_for(&init_data);
        let concrete = Arc::new(OneDriveProvider::new(http, &onedrive_config, state.clone())?);

        let seeded = init_data.token.clone().or_else(|| hints.get(config::ACCESS_TOKEN).map(str::to_string));
        if let Some(access_token) = &seeded {
            concrete.set_access_token(access_token.clone());
        }

        let sync_token: Arc<dyn Fn(&str) + Send + Sync> = {
            let concrete = concrete.clone();
            Arc::new(move |token: &str| concrete.set_access_token(token.to_string()))
        };
        let provider: Arc<dyn CloudProvider> = concrete;

        let access = self.assemble(provider, init_data, seeded, sync_token, None);
        Ok(access)
    }

    fn create_mega(&self, init_data: InitData) -> Result<CloudAccess, CloudError> {
        let hints = init_data.hints.clone();
        let state = self.state_for(&init_data);
        let auth_redirect_uri = hints.get(config::REDIRECT_URI).map(str::to_string).unwrap_or_else(|| self.auth_server.redirect_uri());
        let file_url = hints.get(config::FILE_URL).map(str::to_string).unwrap_or_else(|| self.file_server.endpoint());

        let concrete = Arc::new(MegaProvider::new(auth_redirect_uri, file_url, state.clone()));

        // The credential-string `code` doubles as the re-auth token, so a
        // seeded token also carries the username to restore.
        let seeded = init_data.token.clone().or_else(|| hints.get(config::ACCESS_TOKEN).map(str::to_string));
        if let Some(code) = &seeded {
            if let Some((user, _hash)) = cloudkit_auth::credential::split_code(code) {
                concrete.seed_authorized(user);
            }
        }

        let sync_token: Arc<dyn Fn(&str) + Send + Sync> = Arc::new(|_token: &str| {});
        let provider: Arc<dyn CloudProvider> = concrete;

        let proxy: Arc<dyn cloudkit_server::FileProviderHandler> = Arc::new(cloudkit_proxy::StreamingProxyHandler::new(provider.clone()));
        let file_registration = self.file_server.register(state.clone(), proxy);
        let access = self.assemble(provider, init_data, seeded, sync_token, Some(Box::new(file_registration)));
        Ok(access)
    }

    fn assemble(
        &self,
        provider: Arc<dyn CloudProvider>,
        init_data: InitData,
        seeded_token: Option<String>,
        sync_token: Arc<dyn Fn(&str) + Send + Sync>,
        file_registration: Option<Box<dyn std::any::Any + Send + Sync>>,
    ) -> CloudAccess {
        let initial_token = seeded_token.map(Token::seeded);
        let consent = init_data.auth_callback.clone().unwrap_or_else(|| Arc::new(|_: &str| AuthConsent::WaitForAuthorizationCode));
        let auth = AuthMachine::new(provider.clone(), consent, initial_token, &init_data.hints);
        let engine = RequestEngine::new(auth.clone(), DEFAULT_CONCURRENCY);

        CloudAccess::new(
            provider,
            auth,
            engine,
            self.auth_server.clone(),
            sync_token,
            file_registration,
            init_data.hints,
            init_data.permission,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn provider_names_lists_the_two_built_in_adapters() {
        assert_eq!(CloudRegistry::provider_names(), &["onedrive", "mega"]);
    }

    #[tokio::test]
    async fn create_rejects_an_unknown_provider_name() {
        let registry = CloudRegistry::bind().await.unwrap();
        let err = registry.create("dropbox", InitData::new()).unwrap_err();
        assert_eq!(err.code, code::BAD);
    }

    #[tokio::test]
    async fn onedrive_instance_reports_its_name_and_directory_root() {
        let registry = CloudRegistry::bind().await.unwrap();
        let access = registry.create("onedrive", InitData::new()).unwrap();
        assert_eq!(access.name(), "onedrive");
        assert!(access.root().is_directory());
    }

    #[tokio::test]
    async fn mega_instance_seeded_with_a_prior_code_is_already_authorized() {
        let registry = CloudRegistry::bind().await.unwrap();
        let code = cloudkit_auth::credential::synthesize_code("alice", "hunter2");
        let access = registry.create("mega", InitData::new().with_token(code)).unwrap();

        let data = access.general_data().await.unwrap();
        assert_eq!(data.username, "alice");
    }
}
