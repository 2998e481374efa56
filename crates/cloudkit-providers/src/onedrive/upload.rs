//! Small- and large-file upload paths (`upload_small`/
//! `create_upload_session`/`upload_chunk`), built against [`HttpEngine`]
//! and the shared [`Item`] model.

use bytes::Bytes;
use cloudkit_core::domain::{CloudError, RemotePath};
use cloudkit_core::ports::transfer::UploadProgress;
use cloudkit_http::{HttpEngine, HttpRequestSpec};
use reqwest::Method;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::model;
use cloudkit_core::domain::Item;

/// 10 MiB, a multiple of the 320 KiB Graph requires for session chunks.
const CHUNK_SIZE: usize = 10 * 1024 * 1024;

fn item_path(parent: &RemotePath, name: &str, suffix: &str) -> String {
    if parent.as_str() == "/" {
        format!("/me/drive/root:/{name}:/{suffix}")
    } else {
        format!("/me/drive/root:{}/{name}:/{suffix}", parent.as_str())
    }
}

pub async fn upload_small(
    http: &HttpEngine,
    base_url: &str,
    token: &str,
    parent: &RemotePath,
    name: &str,
    data: &[u8],
) -> Result<Item, CloudError> {
    let url = format!("{base_url}{}", item_path(parent, name, "content"));
    debug!(name, bytes = data.len(), "uploading small file");

    let spec = HttpRequestSpec::new(Method::PUT, url)
        .bearer(token)
        .header("Content-Type", "application/octet-stream")
        .body(Bytes::copy_from_slice(data));

    let response = http.execute_with_retry(&spec, "upload", &CancellationToken::new()).await?;
    parse_drive_item(&response.body)
}

#[derive(Deserialize)]
struct UploadSessionResponse {
    #[serde(rename = "uploadUrl")]
    upload_url: String,
}

pub async fn upload_large(
    http: &HttpEngine,
    base_url: &str,
    token: &str,
    parent: &RemotePath,
    name: &str,
    data: &[u8],
    mut progress: Option<UploadProgress>,
) -> Result<Item, CloudError> {
    let session_url = format!("{base_url}{}", item_path(parent, name, "createUploadSession"));
    let spec = HttpRequestSpec::new(Method::POST, session_url)
        .bearer(token)
        .header("Content-Type", "application/json")
        .body(Bytes::from_static(b"{}"));
    let response = http.execute_with_retry(&spec, "upload", &CancellationToken::new()).await?;
    let session: UploadSessionResponse = serde_json::from_slice(&response.body)
        .map_err(|e| CloudError::failure(format!("invalid upload session response: {e}")))?;

    let total = data.len() as u64;
    let mut offset = 0usize;
    let mut last_item = None;
    while offset < data.len() {
        let end = (offset + CHUNK_SIZE).min(data.len());
        let chunk = &data[offset..end];
        let content_range = format!("bytes {offset}-{}/{total}", end - 1);

        let spec = HttpRequestSpec::new(Method::PUT, session.upload_url.clone())
            .header("Content-Range", content_range)
            .body(Bytes::copy_from_slice(chunk));
        let response = http.execute_with_retry(&spec, "upload", &CancellationToken::new()).await?;

        if let Some(cb) = progress.as_mut() {
            cb(total, end as u64);
        }

        if end == data.len() {
            last_item = Some(parse_drive_item(&response.body)?);
        }
        offset = end;
    }

    last_item.ok_or_else(|| CloudError::failure("empty upload produced no session chunks"))
}

fn parse_drive_item(body: &[u8]) -> Result<Item, CloudError> {
    let item: model::DriveItem =
        serde_json::from_slice(body).map_err(|e| CloudError::failure(format!("invalid driveItem response: {e}")))?;
    model::to_item(item).ok_or_else(|| CloudError::failure("driveItem response carried an invalid id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_path_at_root_omits_the_parent_segment() {
        assert_eq!(item_path(&RemotePath::root(), "a.txt", "content"), "/me/drive/root:/a.txt:/content");
    }

    #[test]
    fn item_path_under_a_folder_includes_it() {
        let parent = RemotePath::new("/Documents".to_string()).unwrap();
        assert_eq!(
            item_path(&parent, "a.txt", "createUploadSession"),
            "/me/drive/root:/Documents/a.txt:/createUploadSession"
        );
    }
}
