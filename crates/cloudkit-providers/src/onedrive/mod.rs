//! The OneDrive adapter: OAuth2 + PKCE auth, Microsoft Graph REST calls.
//!
//! Uses the `oauth2` crate's standard PKCE wiring (`BasicClient`,
//! `PkceCodeChallenge`, `CsrfToken`, `AuthorizationCode`, `RefreshToken`)
//! and plain Graph REST requests for listing, download, upload, user info
//! and quota, mapped onto the shared [`cloudkit_core::domain::Token`]/
//! [`Item`] model rather than a Graph-specific type.
//!
//! This adapter does not hold the auth state machine: [`CloudProvider`]
//! methods take `&self` with no token parameter, and threading a handle
//! back to the auth machine would create a `Provider -> AuthMachine ->
//! Provider` reference cycle. Instead the adapter keeps its own
//! bearer-token cache behind a `Mutex` (`CloudProvider` methods take
//! `&self`, but refreshing needs to mutate the cached token) and exposes
//! [`OneDriveProvider::set_access_token`] for whatever owns the auth
//! machine to call after a login or a refresh.

mod model;
mod upload;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use cloudkit_core::domain::{code, CloudError, DeltaToken, Hints, Item, ItemType, PageData, RemoteId, RemotePath, Token};
use cloudkit_core::ports::{
    AuthConsent, ByteRange, CloudProvider, DownloadSink, GeneralData, SupportedOps, UploadProgress,
};
use cloudkit_core::domain::config;
use cloudkit_http::{HttpEngine, HttpRequestSpec};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, PkceCodeVerifier,
    RedirectUrl, RefreshToken as OAuthRefreshToken, Scope, TokenResponse, TokenUrl,
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const AUTH_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
const TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_SCOPES: &[&str] = &["Files.ReadWrite.All", "offline_access", "User.Read"];

/// Client registration and redirect settings, with Graph-specific
/// defaults (authorize/token URLs, default scopes).
#[derive(Debug, Clone)]
pub struct OneDriveConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl OneDriveConfig {
    #[must_use]
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }
}

pub struct OneDriveProvider {
    http: Arc<HttpEngine>,
    oauth: BasicClient,
    scopes: Vec<String>,
    /// The CSRF state this provider's authorize URL embeds. Must be the
    /// same value the caller registers with `AuthorizationServer`/
    /// `AuthMachine`, since the remote OAuth server echoes it back
    /// verbatim on redirect and dispatch is keyed on it.
    state: String,
    access_token: Mutex<String>,
    pkce_verifier: Mutex<Option<PkceCodeVerifier>>,
}

impl OneDriveProvider {
    /// # Errors
    /// Returns an error if the configured URLs don't parse.
    pub fn new(http: Arc<HttpEngine>, config: &OneDriveConfig, state: impl Into<String>) -> Result<Self, CloudError> {
        let client_secret = config.client_secret.clone().map(ClientSecret::new);
        let oauth = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            client_secret,
            AuthUrl::new(AUTH_URL.to_string()).map_err(|e| CloudError::failure(e.to_string()))?,
            Some(TokenUrl::new(TOKEN_URL.to_string()).map_err(|e| CloudError::failure(e.to_string()))?),
        )
        .set_redirect_uri(RedirectUrl::new(config.redirect_uri.clone()).map_err(|e| CloudError::failure(e.to_string()))?);

        Ok(Self {
            http,
            oauth,
            scopes: config.scopes.clone(),
            state: state.into(),
            access_token: Mutex::new(String::new()),
            pkce_verifier: Mutex::new(None),
        })
    }

    /// Called by whatever owns the auth state machine after a successful
    /// login or refresh. Not part of `CloudProvider` since the trait is
    /// deliberately token-parameter-free.
    pub fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.lock().expect("access token mutex poisoned") = token.into();
    }

    fn token(&self) -> String {
        self.access_token.lock().expect("access token mutex poisoned").clone()
    }

    fn graph_url(&self, path: &str) -> String {
        format!("{GRAPH_BASE_URL}{path}")
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, CloudError> {
        let spec = HttpRequestSpec::new(Method::GET, self.graph_url(path)).bearer(self.token());
        let response = self.http.execute_with_retry(&spec, "metadata", &CancellationToken::new()).await?;
        if response.status >= 400 {
            return Err(self.error_from_status(response.status, &response.body));
        }
        serde_json::from_slice(&response.body).map_err(|e| CloudError::failure(format!("invalid graph response: {e}")))
    }

    fn error_from_status(&self, status: u16, body: &[u8]) -> CloudError {
        let message = std::str::from_utf8(body).unwrap_or("<non-utf8 body>").to_string();
        if status == code::UNAUTHORIZED {
            CloudError::unauthorized(message)
        } else {
            CloudError::new(status, message)
        }
    }
}

#[async_trait]
impl CloudProvider for OneDriveProvider {
    fn name(&self) -> &str {
        "onedrive"
    }

    fn endpoint(&self) -> Option<String> {
        Some(GRAPH_BASE_URL.to_string())
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
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let state = self.state.clone();
        let mut request = self.oauth.authorize_url(move || CsrfToken::new(state.clone()));
        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        let (auth_url, _csrf) = request.set_pkce_challenge(pkce_challenge).url();
        *self.pkce_verifier.lock().expect("pkce verifier mutex poisoned") = Some(pkce_verifier);
        Some(auth_url.to_string())
    }

    fn supported_operations(&self) -> SupportedOps {
        SupportedOps::EXCHANGE_CODE
            | SupportedOps::REFRESH_TOKEN
            | SupportedOps::GET_ITEM_DATA
            | SupportedOps::LIST_DIRECTORY
            | SupportedOps::GET_ITEM_URL
            | SupportedOps::DOWNLOAD_FILE
            | SupportedOps::UPLOAD_FILE
            | SupportedOps::DELETE_ITEM
            | SupportedOps::CREATE_DIRECTORY
            | SupportedOps::MOVE_ITEM
            | SupportedOps::RENAME_ITEM
            | SupportedOps::GET_THUMBNAIL
            | SupportedOps::GENERAL_DATA
    }

    async fn exchange_code(&self, code: &str) -> Result<Token, CloudError> {
        let verifier = self
            .pkce_verifier
            .lock()
            .expect("pkce verifier mutex poisoned")
            .take()
            .ok_or_else(|| CloudError::failure("exchange_code called before authorize_library_url"))?;

        let http_client = self.http.client().clone();
        let result = self
            .oauth
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(verifier)
            .request_async(&http_client)
            .await
            .map_err(|e| CloudError::unauthorized(e.to_string()))?;

        Ok(token_from_response(&result))
    }

    async fn refresh_token(&self, token: &Token) -> Result<Token, CloudError> {
        let refresh_token = token
            .refresh_token
            .as_ref()
            .ok_or_else(|| CloudError::failure("no refresh token available"))?;

        let http_client = self.http.client().clone();
        let result = self
            .oauth
            .exchange_refresh_token(&OAuthRefreshToken::new(refresh_token.clone()))
            .request_async(&http_client)
            .await
            .map_err(|e| CloudError::unauthorized(e.to_string()))?;

        let mut fresh = token_from_response(&result);
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = Some(refresh_token.clone());
        }
        Ok(fresh)
    }

    async fn get_item_data(&self, id: &RemoteId) -> Result<Item, CloudError> {
        let path = if id.as_str() == "root" {
            "/me/drive/root".to_string()
        } else {
            format!("/me/drive/items/{}", id.as_str())
        };
        let item: model::DriveItem = self.get_json(&path).await?;
        model::to_item(item).ok_or_else(|| CloudError::failure("driveItem response carried an invalid id"))
    }

    async fn list_directory(&self, item: &Item, page_token: Option<&DeltaToken>) -> Result<PageData, CloudError> {
        let path = page_token.map(DeltaToken::as_str).map(str::to_string).unwrap_or_else(|| {
            if item.id.as_str() == "root" {
                self.graph_url("/me/drive/root/children")
            } else {
                self.graph_url(&format!("/me/drive/items/{}/children", item.id.as_str()))
            }
        });
        let spec = HttpRequestSpec::new(Method::GET, path).bearer(self.token());
        let response = self.http.execute_with_retry(&spec, "list", &CancellationToken::new()).await?;
        if response.status >= 400 {
            return Err(self.error_from_status(response.status, &response.body));
        }
        let page: model::DriveItemPage =
            serde_json::from_slice(&response.body).map_err(|e| CloudError::failure(format!("invalid page response: {e}")))?;

        let items = page.value.into_iter().filter_map(model::to_item).collect();
        let next_page_token = page.next_link.and_then(|link| DeltaToken::new(link).ok());
        Ok(PageData { items, next_page_token })
    }

    async fn get_item_url(&self, item: &Item) -> Result<Option<String>, CloudError> {
        if item.is_directory() {
            return Err(CloudError::new(code::SERVICE_UNAVAILABLE, "directories have no direct url"));
        }
        if let Some(cached) = item.url() {
            return Ok(Some(cached));
        }
        let fetched = self.get_item_data(&item.id).await?;
        Ok(fetched.url())
    }

    async fn download_file(&self, item: &Item, range: Option<ByteRange>, sink: &mut dyn DownloadSink) -> Result<(), CloudError> {
        let url = self
            .get_item_url(item)
            .await?
            .ok_or_else(|| CloudError::failure("item has no downloadable url"))?;

        let mut spec = HttpRequestSpec::new(Method::GET, url);
        if let Some(range) = range {
            spec = spec.header("Range", format!("bytes={}-{}", range.start, range.end));
        }

        let total = item.size.unwrap_or(0);
        let mut received = 0u64;
        let status = self
            .http
            .download_stream(&spec, CancellationToken::new(), None, |chunk| {
                received += chunk.len() as u64;
                sink.receive_data(&chunk);
                sink.progress(total, received);
                Ok(())
            })
            .await?;

        if status >= 400 {
            return Err(self.error_from_status(status, b""));
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        parent: &RemotePath,
        name: &str,
        data: &[u8],
        _if_match_etag: Option<&str>,
    ) -> Result<Item, CloudError> {
        upload::upload_small(&self.http, GRAPH_BASE_URL, &self.token(), parent, name, data).await
    }

    async fn upload_file_session(
        &self,
        parent: &RemotePath,
        name: &str,
        data: &[u8],
        progress: Option<UploadProgress>,
    ) -> Result<Item, CloudError> {
        upload::upload_large(&self.http, GRAPH_BASE_URL, &self.token(), parent, name, data, progress).await
    }

    async fn delete_item(&self, item: &Item) -> Result<(), CloudError> {
        let spec = HttpRequestSpec::new(Method::DELETE, self.graph_url(&format!("/me/drive/items/{}", item.id.as_str())))
            .bearer(self.token());
        let response = self.http.execute_with_retry(&spec, "metadata", &CancellationToken::new()).await?;
        if response.status >= 400 {
            return Err(self.error_from_status(response.status, &response.body));
        }
        Ok(())
    }

    async fn create_directory(&self, parent: &Item, name: &str) -> Result<Item, CloudError> {
        let path = if parent.id.as_str() == "root" {
            "/me/drive/root/children".to_string()
        } else {
            format!("/me/drive/items/{}/children", parent.id.as_str())
        };
        let body = serde_json::to_vec(&json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": "fail",
        }))
        .expect("literal json always serializes");

        let spec = HttpRequestSpec::new(Method::POST, self.graph_url(&path))
            .bearer(self.token())
            .header("Content-Type", "application/json")
            .body(body);
        let response = self.http.execute_with_retry(&spec, "metadata", &CancellationToken::new()).await?;
        if response.status >= 400 {
            return Err(self.error_from_status(response.status, &response.body));
        }
        let item: model::DriveItem =
            serde_json::from_slice(&response.body).map_err(|e| CloudError::failure(format!("invalid driveItem response: {e}")))?;
        model::to_item(item).ok_or_else(|| CloudError::failure("driveItem response carried an invalid id"))
    }

    async fn move_item(&self, item: &Item, new_parent: &Item) -> Result<Item, CloudError> {
        let body = serde_json::to_vec(&json!({
            "parentReference": { "id": new_parent.id.as_str() },
        }))
        .expect("literal json always serializes");

        let spec = HttpRequestSpec::new(Method::PATCH, self.graph_url(&format!("/me/drive/items/{}", item.id.as_str())))
            .bearer(self.token())
            .header("Content-Type", "application/json")
            .body(body);
        let response = self.http.execute_with_retry(&spec, "metadata", &CancellationToken::new()).await?;
        if response.status >= 400 {
            return Err(self.error_from_status(response.status, &response.body));
        }
        let item: model::DriveItem =
            serde_json::from_slice(&response.body).map_err(|e| CloudError::failure(format!("invalid driveItem response: {e}")))?;
        model::to_item(item).ok_or_else(|| CloudError::failure("driveItem response carried an invalid id"))
    }

    async fn rename_item(&self, item: &Item, new_name: &str) -> Result<Item, CloudError> {
        let body = serde_json::to_vec(&json!({ "name": new_name })).expect("literal json always serializes");

        let spec = HttpRequestSpec::new(Method::PATCH, self.graph_url(&format!("/me/drive/items/{}", item.id.as_str())))
            .bearer(self.token())
            .header("Content-Type", "application/json")
            .body(body);
        let response = self.http.execute_with_retry(&spec, "metadata", &CancellationToken::new()).await?;
        if response.status >= 400 {
            return Err(self.error_from_status(response.status, &response.body));
        }
        let item: model::DriveItem =
            serde_json::from_slice(&response.body).map_err(|e| CloudError::failure(format!("invalid driveItem response: {e}")))?;
        model::to_item(item).ok_or_else(|| CloudError::failure("driveItem response carried an invalid id"))
    }

    async fn get_thumbnail(&self, item: &Item, sink: &mut dyn DownloadSink) -> Result<(), CloudError> {
        let path = format!("/me/drive/items/{}/thumbnails/0/medium", item.id.as_str());
        let thumb: ThumbnailResponse = self.get_json(&path).await?;
        let spec = HttpRequestSpec::new(Method::GET, thumb.url);
        let mut received = 0u64;
        self.http
            .download_stream(&spec, CancellationToken::new(), None, |chunk| {
                received += chunk.len() as u64;
                sink.receive_data(&chunk);
                sink.progress(0, received);
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn general_data(&self) -> Result<GeneralData, CloudError> {
        let user: GraphUser = self.get_json("/me").await?;
        let drive: GraphDrive = self.get_json("/me/drive").await?;
        Ok(GeneralData {
            username: user.user_principal_name.or(user.display_name).unwrap_or_default(),
            quota_used: drive.quota.used,
            quota_total: drive.quota.total,
        })
    }
}

fn token_from_response(result: &oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>) -> Token {
    let expires_at = result.expires_in().map(|d| Utc::now() + chrono::Duration::from_std(d).unwrap_or_default());
    Token {
        access_token: result.access_token().secret().clone(),
        refresh_token: result.refresh_token().map(|t| t.secret().clone()),
        expires_at,
    }
}

/// What auth state the caller should start from when `hints()`/stored
/// token don't already provide one. `OneDriveProvider` never opens its
/// own browser; the owner of `AuthMachine` decides based on this.
#[must_use]
pub fn default_consent() -> AuthConsent {
    AuthConsent::WaitForAuthorizationCode
}

#[derive(Debug, Deserialize)]
struct ThumbnailResponse {
    url: String,
}

#[derive(Debug, Deserialize, Default)]
struct GraphUser {
    #[serde(rename = "userPrincipalName")]
    user_principal_name: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphDrive {
    quota: GraphQuota,
}

#[derive(Debug, Deserialize)]
struct GraphQuota {
    used: u64,
    total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OneDriveConfig {
        OneDriveConfig::new("client-id", "http://127.0.0.1:9999/")
    }

    #[test]
    fn root_directory_is_a_directory_named_slash() {
        let provider = OneDriveProvider::new(Arc::new(HttpEngine::new()), &config(), "state-1").unwrap();
        let root = provider.root_directory();
        assert!(root.is_directory());
        assert_eq!(root.name, "/");
    }

    #[test]
    fn authorize_url_embeds_the_caller_supplied_state_not_a_random_one() {
        let provider = OneDriveProvider::new(Arc::new(HttpEngine::new()), &config(), "fixed-state").unwrap();
        let url = provider.authorize_library_url().unwrap();
        assert!(url.contains("state=fixed-state"), "url was {url}");
    }

    #[test]
    fn hints_carry_the_same_state_the_authorize_url_uses() {
        let provider = OneDriveProvider::new(Arc::new(HttpEngine::new()), &config(), "shared-state").unwrap();
        assert_eq!(provider.hints().get(config::STATE), Some("shared-state"));
    }

    #[test]
    fn supported_operations_covers_every_overridden_method() {
        let provider = OneDriveProvider::new(Arc::new(HttpEngine::new()), &config(), "s").unwrap();
        let ops = provider.supported_operations();
        assert!(ops.contains(SupportedOps::GET_THUMBNAIL));
        assert!(ops.contains(SupportedOps::LIST_DIRECTORY));
        assert!(ops.contains(SupportedOps::GENERAL_DATA));
    }

    #[tokio::test]
    async fn exchange_code_without_a_prior_authorize_call_fails_fast() {
        let provider = OneDriveProvider::new(Arc::new(HttpEngine::new()), &config(), "s").unwrap();
        let err = provider.exchange_code("some-code").await.unwrap_err();
        assert_eq!(err.code, code::FAILURE);
    }
}
