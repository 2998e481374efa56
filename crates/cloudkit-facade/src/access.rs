//! `CloudAccess` — the typed async facade over one provider instance.
//! Every method here is a thin forwarder onto the underlying
//! `CloudProvider` call, run through [`CloudAccess::with_auth_retry`] (or
//! the equivalent inline shape for the two sink-taking transfers): ensure
//! the auth machine is `Authenticated`, run the call, and on a single
//! `401` refresh once and retry.

use std::future::Future;
use std::sync::Arc;

use cloudkit_auth::AuthMachine;
use cloudkit_core::domain::{code, CloudError, DeltaToken, Hints, Item, PageData, Permission, RemoteId, RemotePath, Token};
use cloudkit_core::ports::{ByteRange, CloudProvider, DownloadSink, GeneralData, UploadProgress};
use cloudkit_engine::RequestEngine;
use cloudkit_server::AuthorizationServer;

/// A live, authenticated-or-authenticating handle to one provider
/// instance, as returned by [`crate::CloudRegistry::create`].
pub struct CloudAccess {
    provider: Arc<dyn CloudProvider>,
    auth: Arc<AuthMachine>,
    engine: RequestEngine,
    auth_server: Arc<AuthorizationServer>,
    /// Pushes a freshly obtained access token into the concrete adapter's
    /// own token cache (e.g. `OneDriveProvider::set_access_token`):
    /// `CloudProvider` is deliberately token-parameter-free, so whoever
    /// erases the concrete type to `Arc<dyn CloudProvider>` must also hand
    /// back a way to feed it tokens. A no-op for adapters (like
    /// [`cloudkit_providers::mega::MegaProvider`]) that derive their
    /// authorized state from `exchange_code` alone.
    sync_token: Arc<dyn Fn(&str) + Send + Sync>,
    /// Keeps a streaming-proxy handler registered with the shared
    /// `FileProviderServer` for as long as this instance lives; `None` for
    /// providers (OneDrive) that hand out direct provider URLs instead.
    _file_registration: Option<Box<dyn std::any::Any + Send + Sync>>,
    base_hints: Hints,
    permission: Permission,
}

impl CloudAccess {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        provider: Arc<dyn CloudProvider>,
        auth: Arc<AuthMachine>,
        engine: RequestEngine,
        auth_server: Arc<AuthorizationServer>,
        sync_token: Arc<dyn Fn(&str) + Send + Sync>,
        file_registration: Option<Box<dyn std::any::Any + Send + Sync>>,
        base_hints: Hints,
        permission: Permission,
    ) -> Self {
        Self {
            provider,
            auth,
            engine,
            auth_server,
            sync_token,
            _file_registration: file_registration,
            base_hints,
            permission,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.provider.name()
    }

    #[must_use]
    pub fn root(&self) -> Item {
        self.provider.root_directory()
    }

    /// The caller-persisted credential: callers are responsible for
    /// storing `token()` themselves between processes.
    pub fn token(&self) -> Result<Token, CloudError> {
        self.auth.token()
    }

    /// The consent page to send a user to before calling [`Self::login`],
    /// if this provider needs one (`None` for a credential-string provider
    /// that exchanges a code directly, no browser round-trip involved).
    #[must_use]
    pub fn authorize_url(&self) -> Option<String> {
        self.provider.authorize_library_url()
    }

    /// Drives authentication to completion and hands back the resulting
    /// token, for callers (e.g. the example CLI) that want to log in
    /// explicitly rather than on the first API call.
    pub async fn login(&self) -> Result<Token, CloudError> {
        self.ensure_authenticated().await?;
        self.token()
    }

    /// An enumerable snapshot of recognized configuration plus
    /// per-provider metadata, merging what this instance was created with
    /// and whatever the adapter itself reports (e.g. its CSRF `state`) so
    /// a later `CloudRegistry::create` call with this snapshot and
    /// [`Self::token`] reproduces the same instance.
    #[must_use]
    pub fn hints(&self) -> Hints {
        let mut hints = self.base_hints.clone();
        for (key, value) in self.provider.hints().snapshot() {
            hints.set(key, value);
        }
        hints
    }

    /// Cancels every in-flight call on this instance and refuses future
    /// ones. Dropping a `CloudAccess` does not itself cancel anything
    /// (Rust has no asynchronous destructors), so callers that need the
    /// drain-before-drop guarantee call this explicitly before dropping
    /// their handle.
    pub fn shutdown(&self) {
        self.engine.shutdown();
    }

    async fn ensure_authenticated(&self) -> Result<(), CloudError> {
        let token = self.auth.login(&self.auth_server).await?;
        (self.sync_token)(&token.access_token);
        Ok(())
    }

    fn require_read_write(&self) -> Result<(), CloudError> {
        if self.permission == Permission::ReadOnly {
            return Err(CloudError::new(code::FORBIDDEN, "provider instance is read-only"));
        }
        Ok(())
    }

    /// Runs `op` once authenticated; on a single `401` refreshes and
    /// retries exactly once more. `op` is `FnMut` rather than `Fn` so
    /// callers carrying one-shot state (e.g. a progress callback that
    /// shouldn't fire twice) can consume it on the first attempt only.
    async fn with_auth_retry<T, F, Fut>(&self, mut op: F) -> Result<T, CloudError>
    where
        F: FnMut(Arc<dyn CloudProvider>) -> Fut,
        Fut: Future<Output = Result<T, CloudError>>,
    {
        self.engine
            .run(async {
                self.ensure_authenticated().await?;
                match op(self.provider.clone()).await {
                    Err(e) if e.is_authorization_error() => {
                        let token = self.auth.on_unauthorized().await?;
                        (self.sync_token)(&token.access_token);
                        op(self.provider.clone()).await
                    }
                    other => other,
                }
            })
            .await
    }

    pub async fn exchange_code(&self, code: &str) -> Result<Token, CloudError> {
        let token = self.provider.exchange_code(code).await?;
        (self.sync_token)(&token.access_token);
        Ok(token)
    }

    pub async fn general_data(&self) -> Result<GeneralData, CloudError> {
        self.with_auth_retry(|provider| async move { provider.general_data().await }).await
    }

    pub async fn get_item_data(&self, id: &RemoteId) -> Result<Item, CloudError> {
        let id = id.clone();
        self.with_auth_retry(move |provider| {
            let id = id.clone();
            async move { provider.get_item_data(&id).await }
        })
        .await
    }

    pub async fn list_directory_page(&self, item: &Item, page_token: Option<&DeltaToken>) -> Result<PageData, CloudError> {
        let item = item.clone();
        let page_token = page_token.cloned();
        self.with_auth_retry(move |provider| {
            let item = item.clone();
            let page_token = page_token.clone();
            async move { provider.list_directory(&item, page_token.as_ref()).await }
        })
        .await
    }

    /// Walks every page of `item`'s listing and concatenates the results
    /// into one non-paginated `list_directory(item) -> [Item]` call.
    pub async fn list_directory(&self, item: &Item) -> Result<Vec<Item>, CloudError> {
        let mut items = Vec::new();
        let mut token: Option<DeltaToken> = None;
        loop {
            let page = self.list_directory_page(item, token.as_ref()).await?;
            items.extend(page.items);
            if page.is_last_page() {
                break;
            }
            token = page.next_page_token;
        }
        Ok(items)
    }

    /// Resolves a path by walking directory listings from the root: no
    /// built-in adapter exposes a server-side path-lookup endpoint here,
    /// so this always walks.
    pub async fn get_item(&self, path: &RemotePath) -> Result<Item, CloudError> {
        if path.as_str() == "/" {
            return Ok(self.root());
        }
        let mut current = self.root();
        for segment in path.as_str().trim_start_matches('/').split('/') {
            if segment.is_empty() {
                continue;
            }
            let children = self.list_directory(&current).await?;
            current = children
                .into_iter()
                .find(|item| item.name == segment)
                .ok_or_else(|| CloudError::new(code::NOT_FOUND, format!("no such item: {segment}")))?;
        }
        Ok(current)
    }

    pub async fn get_item_url(&self, item: &Item) -> Result<Option<String>, CloudError> {
        let item = item.clone();
        self.with_auth_retry(move |provider| {
            let item = item.clone();
            async move { provider.get_item_url(&item).await }
        })
        .await
    }

    /// Streams `item`'s content (optionally one byte range) into `sink`,
    /// retried once on a single `401`. Safe to retry: a `401` is the
    /// response status, so it always arrives before any body bytes reach
    /// `sink`. Handled inline rather than via [`Self::with_auth_retry`]
    /// since `DownloadSink` isn't `Clone` — `sink` is simply reborrowed
    /// for the second attempt.
    pub async fn download_file(&self, item: &Item, range: Option<ByteRange>, sink: &mut dyn DownloadSink) -> Result<(), CloudError> {
        self.engine
            .run(async {
                self.ensure_authenticated().await?;
                match self.provider.download_file(item, range, sink).await {
                    Err(e) if e.is_authorization_error() => {
                        let token = self.auth.on_unauthorized().await?;
                        (self.sync_token)(&token.access_token);
                        self.provider.download_file(item, range, sink).await
                    }
                    other => other,
                }
            })
            .await
    }

    /// Same single-retry shape as [`Self::download_file`].
    pub async fn get_thumbnail(&self, item: &Item, sink: &mut dyn DownloadSink) -> Result<(), CloudError> {
        self.engine
            .run(async {
                self.ensure_authenticated().await?;
                match self.provider.get_thumbnail(item, sink).await {
                    Err(e) if e.is_authorization_error() => {
                        let token = self.auth.on_unauthorized().await?;
                        (self.sync_token)(&token.access_token);
                        self.provider.get_thumbnail(item, sink).await
                    }
                    other => other,
                }
            })
            .await
    }

    pub async fn upload_file(&self, parent: &RemotePath, name: &str, data: &[u8], if_match_etag: Option<&str>) -> Result<Item, CloudError> {
        self.require_read_write()?;
        let parent = parent.clone();
        let name = name.to_string();
        self.with_auth_retry(move |provider| {
            let parent = parent.clone();
            let name = name.clone();
            async move { provider.upload_file(&parent, &name, data, if_match_etag).await }
        })
        .await
    }

    /// `progress` fires on the first attempt only: it's consumed by
    /// `Option::take`, so a `401`-triggered retry uploads silently rather
    /// than replaying already-reported progress through a stale callback.
    pub async fn upload_file_session(
        &self,
        parent: &RemotePath,
        name: &str,
        data: &[u8],
        mut progress: Option<UploadProgress>,
    ) -> Result<Item, CloudError> {
        self.require_read_write()?;
        let parent = parent.clone();
        let name = name.to_string();
        self.with_auth_retry(move |provider| {
            let parent = parent.clone();
            let name = name.clone();
            let progress = progress.take();
            async move { provider.upload_file_session(&parent, &name, data, progress).await }
        })
        .await
    }

    pub async fn delete_item(&self, item: &Item) -> Result<(), CloudError> {
        self.require_read_write()?;
        let item = item.clone();
        self.with_auth_retry(move |provider| {
            let item = item.clone();
            async move { provider.delete_item(&item).await }
        })
        .await
    }

    pub async fn create_directory(&self, parent: &Item, name: &str) -> Result<Item, CloudError> {
        self.require_read_write()?;
        let parent = parent.clone();
        let name = name.to_string();
        self.with_auth_retry(move |provider| {
            let parent = parent.clone();
            let name = name.clone();
            async move { provider.create_directory(&parent, &name).await }
        })
        .await
    }

    pub async fn move_item(&self, item: &Item, new_parent: &Item) -> Result<Item, CloudError> {
        self.require_read_write()?;
        let item = item.clone();
        let new_parent = new_parent.clone();
        self.with_auth_retry(move |provider| {
            let item = item.clone();
            let new_parent = new_parent.clone();
            async move { provider.move_item(&item, &new_parent).await }
        })
        .await
    }

    pub async fn rename_item(&self, item: &Item, new_name: &str) -> Result<Item, CloudError> {
        self.require_read_write()?;
        let item = item.clone();
        let new_name = new_name.to_string();
        self.with_auth_retry(move |provider| {
            let item = item.clone();
            let new_name = new_name.clone();
            async move { provider.rename_item(&item, &new_name).await }
        })
        .await
    }
}
