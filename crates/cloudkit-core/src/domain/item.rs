//! The uniform file/directory representation handed to every caller.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::newtypes::{DeltaToken, FileHash, RemoteId};

/// Coarse content classification, derived by each adapter's parser from a
/// mime type or file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    Unknown,
    Audio,
    Image,
    Video,
    Directory,
}

impl ItemType {
    /// Classify a mime type the way adapter parsers do, e.g. `"image/png"`
    /// -> `Image`. Unrecognized or absent mime types fall back to
    /// extension-based classification via [`ItemType::from_extension`].
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        let top_level = mime.split('/').next().unwrap_or("");
        match top_level {
            "audio" => Self::Audio,
            "image" => Self::Image,
            "video" => Self::Video,
            _ => Self::Unknown,
        }
    }

    /// Classify by file extension when no mime type is available.
    #[must_use]
    pub fn from_extension(name: &str) -> Self {
        let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
        match ext.as_str() {
            "mp3" | "flac" | "wav" | "ogg" | "m4a" => Self::Audio,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "heic" => Self::Image,
            "mp4" | "mkv" | "avi" | "mov" | "webm" => Self::Video,
            _ => Self::Unknown,
        }
    }
}

/// A file or directory as returned by a provider adapter.
///
/// Built by adapter parsers and never mutated after being handed to a
/// caller, except that `url` may be memoized the first time it's resolved
/// via `get_item_url` — that's the one sanctioned interior mutation, kept
/// behind a mutex so `Item` stays cheaply `Clone`.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: RemoteId,
    pub name: String,
    pub item_type: ItemType,
    pub size: Option<u64>,
    pub hash: Option<FileHash>,
    pub parent_ids: Vec<RemoteId>,
    pub hidden: bool,
    thumbnail_url: Option<String>,
    url: Arc<Mutex<Option<String>>>,
}

impl Item {
    #[must_use]
    pub fn new(id: RemoteId, name: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            id,
            name: name.into(),
            item_type,
            size: None,
            hash: None,
            parent_ids: Vec::new(),
            hidden: false,
            thumbnail_url: None,
            url: Arc::new(Mutex::new(None)),
        }
    }

    /// Synthesize the provider's root item: type `Directory`, id chosen by
    /// the adapter (often empty or a sentinel like `"root"`).
    #[must_use]
    pub fn root(id: RemoteId) -> Self {
        let mut item = Self::new(id, "/", ItemType::Directory);
        item.hidden = false;
        item
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.item_type == ItemType::Directory
    }

    #[must_use]
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }

    pub fn set_thumbnail_url(&mut self, url: impl Into<String>) {
        self.thumbnail_url = Some(url.into());
    }

    /// The memoized direct URL, if one has already been resolved.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.url.lock().expect("item url mutex poisoned").clone()
    }

    /// Memoize the direct URL resolved by `get_item_url`. Subsequent calls
    /// overwrite the cached value; adapters that re-resolve per request
    /// (e.g. the streaming proxy, which is keyed by id rather than URL)
    /// simply call this again.
    pub fn memoize_url(&self, url: impl Into<String>) {
        *self.url.lock().expect("item url mutex poisoned") = Some(url.into());
    }
}

/// A page of directory listing results plus an opaque continuation token.
#[derive(Debug, Clone)]
pub struct PageData {
    pub items: Vec<Item>,
    /// `None` marks the last page (modeled as
    /// `Option::None` rather than an empty string).
    pub next_page_token: Option<DeltaToken>,
}

impl PageData {
    #[must_use]
    pub fn is_last_page(&self) -> bool {
        self.next_page_token.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> RemoteId {
        RemoteId::new(s.to_string()).unwrap()
    }

    #[test]
    fn item_type_from_mime_falls_back_to_unknown() {
        assert_eq!(ItemType::from_mime("image/png"), ItemType::Image);
        assert_eq!(ItemType::from_mime("application/json"), ItemType::Unknown);
    }

    #[test]
    fn item_type_from_extension() {
        assert_eq!(ItemType::from_extension("song.mp3"), ItemType::Audio);
        assert_eq!(ItemType::from_extension("movie.MKV"), ItemType::Video);
        assert_eq!(ItemType::from_extension("noext"), ItemType::Unknown);
    }

    #[test]
    fn root_item_is_directory() {
        let root = Item::root(id("root"));
        assert!(root.is_directory());
        assert_eq!(root.url(), None);
    }

    #[test]
    fn url_memoization_is_visible_through_clone() {
        let item = Item::new(id("abc"), "file.txt", ItemType::Unknown);
        let cloned = item.clone();
        item.memoize_url("https://example.test/abc");
        assert_eq!(cloned.url().as_deref(), Some("https://example.test/abc"));
    }

    #[test]
    fn page_data_last_page() {
        let page = PageData {
            items: vec![],
            next_page_token: None,
        };
        assert!(page.is_last_page());
    }
}
