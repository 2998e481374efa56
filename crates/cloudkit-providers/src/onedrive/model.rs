//! Parses Microsoft Graph `driveItem` JSON into the shared [`Item`] model.
//!
//! One shared parser used by listing, delta queries, and upload
//! responses, so all three call sites agree on field mapping instead of
//! each carrying its own copy of this struct.

use cloudkit_core::domain::{FileHash, Item, ItemType, RemoteId};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub size: Option<u64>,
    pub parent_reference: Option<ParentReference>,
    pub file: Option<FileFacet>,
    pub folder: Option<serde_json::Value>,
    pub deleted: Option<serde_json::Value>,
    #[serde(rename = "@microsoft.graph.downloadUrl")]
    pub download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileFacet {
    pub hashes: Option<FileHashes>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHashes {
    pub quick_xor_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DriveItemPage {
    #[serde(default)]
    pub value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Converts one Graph `driveItem` into an [`Item`], skipping items whose
/// `id` fails newtype validation rather than failing the whole page.
pub fn to_item(item: DriveItem) -> Option<Item> {
    let id = RemoteId::new(item.id).ok()?;
    let is_directory = item.folder.is_some();
    let mime = item.file.as_ref().and_then(|f| f.mime_type.as_deref());
    let item_type = if is_directory {
        ItemType::Directory
    } else {
        mime.map_or_else(|| ItemType::from_extension(&item.name), ItemType::from_mime)
    };

    let mut built = Item::new(id, item.name, item_type);
    built.size = item.size;
    built.hash = item
        .file
        .as_ref()
        .and_then(|f| f.hashes.as_ref())
        .and_then(|h| h.quick_xor_hash.clone())
        .and_then(|h| FileHash::new(h).ok());
    built.hidden = item.deleted.is_some();
    if let Some(parent_id) = item.parent_reference.and_then(|pr| pr.id).and_then(|id| RemoteId::new(id).ok()) {
        built.parent_ids.push(parent_id);
    }
    if let Some(url) = item.download_url {
        built.memoize_url(url);
    }
    Some(built)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_file_item() {
        let json = r#"{
            "id": "FILE001",
            "name": "report.png",
            "size": 2048,
            "parentReference": {"id": "PARENT1"},
            "file": {"hashes": {"quickXorHash": "abc123"}, "mimeType": "image/png"}
        }"#;
        let item = to_item(serde_json::from_str(json).unwrap()).unwrap();
        assert_eq!(item.id.as_str(), "FILE001");
        assert_eq!(item.item_type, ItemType::Image);
        assert_eq!(item.size, Some(2048));
        assert_eq!(item.hash.unwrap().as_str(), "abc123");
        assert_eq!(item.parent_ids[0].as_str(), "PARENT1");
        assert!(!item.is_directory());
    }

    #[test]
    fn parses_a_folder_item() {
        let json = r#"{"id": "DIR1", "name": "Photos", "folder": {"childCount": 3}}"#;
        let item = to_item(serde_json::from_str(json).unwrap()).unwrap();
        assert!(item.is_directory());
        assert!(item.hash.is_none());
    }

    #[test]
    fn invalid_id_is_dropped_not_fatal() {
        let json = r#"{"id": "", "name": "broken"}"#;
        assert!(to_item(serde_json::from_str(json).unwrap()).is_none());
    }

    #[test]
    fn download_url_is_memoized_onto_the_item() {
        let json = r#"{"id": "F1", "name": "f.bin", "@microsoft.graph.downloadUrl": "https://cdn.example/f"}"#;
        let item = to_item(serde_json::from_str(json).unwrap()).unwrap();
        assert_eq!(item.url().as_deref(), Some("https://cdn.example/f"));
    }
}
