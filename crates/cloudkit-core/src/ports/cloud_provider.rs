//! The provider adapter contract (driven/secondary port).
//!
//! Every backend (OneDrive, Mega, …) implements [`CloudProvider`]. Each
//! trait method is the builder+parser pair for one row of the operation
//! table: the method shapes the provider-specific HTTP request (builder),
//! drives it through `cloudkit-engine`, and maps the response into the
//! shared [`Item`]/[`Token`] model (parser). A method whose builder has no
//! request to build — the operation genuinely doesn't exist for this
//! provider — returns `CloudError::not_supported` synchronously, without
//! issuing any HTTP, and is absent from
//! `supported_operations()`.
//!
//! ## Design notes
//!
//! - Returns `Result<_, CloudError>`, not `anyhow::Result`: callers need
//!   the numeric code to decide on retry/refresh, so the port boundary is
//!   typed here rather than opaque.
//! - Default method bodies make every operation optional to implement;
//!   adapters override only what they support and flip the matching bit
//!   in `supported_operations()`.

use serde::{Deserialize, Serialize};

use crate::domain::{CloudError, DeltaToken, Hints, Item, PageData, RemoteId, RemotePath, Token};

use super::supported_ops::SupportedOps;
use super::transfer::{ByteRange, DownloadSink, UploadProgress};

/// `general_data`'s parsed response: `{username, quota_used, quota_total}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralData {
    pub username: String,
    pub quota_used: u64,
    pub quota_total: u64,
}

/// How the consent callback wants the auth state
/// machine to proceed after emitting `userConsentRequired`.
#[derive(Debug, Clone)]
pub enum AuthConsent {
    /// Don't start an interactive flow (e.g. caller already has a token).
    None,
    /// Open the loopback server and publish the authorize URL.
    WaitForAuthorizationCode,
    /// Caller will supply the redirect manually; use this URI.
    RedirectUri(String),
}

#[async_trait::async_trait]
pub trait CloudProvider: Send + Sync {
    /// The provider's built-in name, e.g. `"onedrive"`, `"mega"`.
    fn name(&self) -> &str;

    /// The endpoint/base URL this adapter talks to, if fixed.
    fn endpoint(&self) -> Option<String> {
        None
    }

    /// Synthesize the provider's root item (a
    /// empty or sentinel id specific to the provider).
    fn root_directory(&self) -> Item;

    /// Recognized configuration to persist alongside the token.
    fn hints(&self) -> Hints {
        Hints::new()
    }

    /// The `/login`-style URL for credential-string providers, or the
    /// OAuth2 authorize URL once the auth machine has built one.
    fn authorize_library_url(&self) -> Option<String> {
        None
    }

    /// Which of the operations below this adapter actually implements.
    fn supported_operations(&self) -> SupportedOps {
        SupportedOps::empty()
    }

    /// Exchange an authorization code for a token.
    async fn exchange_code(&self, _code: &str) -> Result<Token, CloudError> {
        Err(CloudError::not_supported("exchange_code"))
    }

    /// Exchange a refresh token for a fresh access token.
    async fn refresh_token(&self, _token: &Token) -> Result<Token, CloudError> {
        Err(CloudError::not_supported("refresh_token"))
    }

    async fn get_item_data(&self, _id: &RemoteId) -> Result<Item, CloudError> {
        Err(CloudError::not_supported("get_item_data"))
    }

    /// List one page of a directory's children.
    async fn list_directory(
        &self,
        _item: &Item,
        _page_token: Option<&DeltaToken>,
    ) -> Result<PageData, CloudError> {
        Err(CloudError::not_supported("list_directory"))
    }

    /// A direct URL for the item, or `None` if the provider has no such
    /// concept (opaque providers return a streaming-proxy URL here
    /// instead). Directories return
    /// `CloudError::new(code::SERVICE_UNAVAILABLE, ..)` rather than a
    /// virtual listing URL.
    async fn get_item_url(&self, _item: &Item) -> Result<Option<String>, CloudError> {
        Err(CloudError::not_supported("get_item_url"))
    }

    /// Stream a file's content (optionally a byte range) into `sink`.
    async fn download_file(
        &self,
        _item: &Item,
        _range: Option<ByteRange>,
        _sink: &mut dyn DownloadSink,
    ) -> Result<(), CloudError> {
        Err(CloudError::not_supported("download_file"))
    }

    /// Upload a file in one request.
    async fn upload_file(
        &self,
        _parent: &RemotePath,
        _name: &str,
        _data: &[u8],
        _if_match_etag: Option<&str>,
    ) -> Result<Item, CloudError> {
        Err(CloudError::not_supported("upload_file"))
    }

    /// Upload a file via a resumable session, reporting progress.
    async fn upload_file_session(
        &self,
        _parent: &RemotePath,
        _name: &str,
        _data: &[u8],
        _progress: Option<UploadProgress>,
    ) -> Result<Item, CloudError> {
        Err(CloudError::not_supported("upload_file_session"))
    }

    async fn delete_item(&self, _item: &Item) -> Result<(), CloudError> {
        Err(CloudError::not_supported("delete_item"))
    }

    async fn create_directory(&self, _parent: &Item, _name: &str) -> Result<Item, CloudError> {
        Err(CloudError::not_supported("create_directory"))
    }

    async fn move_item(&self, _item: &Item, _new_parent: &Item) -> Result<Item, CloudError> {
        Err(CloudError::not_supported("move_item"))
    }

    async fn rename_item(&self, _item: &Item, _new_name: &str) -> Result<Item, CloudError> {
        Err(CloudError::not_supported("rename_item"))
    }

    async fn get_thumbnail(
        &self,
        _item: &Item,
        _sink: &mut dyn DownloadSink,
    ) -> Result<(), CloudError> {
        Err(CloudError::not_supported("get_thumbnail"))
    }

    async fn general_data(&self) -> Result<GeneralData, CloudError> {
        Err(CloudError::not_supported("general_data"))
    }
}
