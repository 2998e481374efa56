//! Validated newtypes for provider identifiers and paths.
//!
//! Each wrapper validates at construction time so the rest of the engine
//! can treat the contained string as already well-formed.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// A remote path, provider-relative and always absolute, e.g. "/Documents/file.txt".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemotePath(String);

impl RemotePath {
    /// # Errors
    /// Returns an error if the path doesn't start with `/`, contains `..`,
    /// or has a double slash.
    pub fn new(path: String) -> Result<Self, DomainError> {
        if !path.starts_with('/') {
            return Err(DomainError::InvalidRemotePath(format!(
                "remote path must start with '/': {path}"
            )));
        }
        if path.len() > 1 && path.contains("//") {
            return Err(DomainError::InvalidRemotePath(format!(
                "remote path contains a double slash: {path}"
            )));
        }
        if path.contains("..") {
            return Err(DomainError::InvalidRemotePath(format!(
                "remote path contains a traversal component: {path}"
            )));
        }
        Ok(Self(path))
    }

    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// # Errors
    /// Returns an error if `component` is empty or itself contains a slash.
    pub fn join(&self, component: &str) -> Result<Self, DomainError> {
        if component.is_empty() || component.contains('/') || component.contains("..") {
            return Err(DomainError::InvalidRemotePath(format!(
                "invalid path component: {component}"
            )));
        }
        let joined = if self.0 == "/" {
            format!("/{component}")
        } else {
            format!("{}/{component}", self.0)
        };
        Self::new(joined)
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0 == "/" {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.0 == "/" {
            return None;
        }
        self.0.rsplit('/').next()
    }
}

impl Display for RemotePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemotePath {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemotePath {
    type Error = DomainError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}

/// A provider-specific item identifier, opaque outside its own provider.
///
/// Only the character set is validated; the format otherwise varies per
/// provider (base64-like strings for OneDrive, numeric handles for Mega,
/// UUIDs for Dropbox, …).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteId(String);

impl RemoteId {
    /// # Errors
    /// Returns an error if `id` is empty or contains characters outside
    /// `[A-Za-z0-9!_-]`.
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "remote id cannot be empty".to_string(),
            ));
        }
        if !id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '!' || c == '-' || c == '_')
        {
            return Err(DomainError::InvalidRemoteId(format!(
                "remote id contains invalid characters: {id}"
            )));
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteId {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemoteId {
    type Error = DomainError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteId> for String {
    fn from(id: RemoteId) -> Self {
        id.0
    }
}

/// An opaque, provider-declared content hash used for integrity checks.
///
/// The algorithm (quickXorHash, MD5, SHA-1, CRC32, …) is provider-specific;
/// this type only guarantees the value is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileHash(String);

impl FileHash {
    /// # Errors
    /// Returns an error if `hash` is empty.
    pub fn new(hash: String) -> Result<Self, DomainError> {
        if hash.is_empty() {
            return Err(DomainError::InvalidHash("hash cannot be empty".to_string()));
        }
        Ok(Self(hash))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FileHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileHash {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for FileHash {
    type Error = DomainError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<FileHash> for String {
    fn from(hash: FileHash) -> Self {
        hash.0
    }
}

/// An opaque continuation token: a page token from `list_directory`, or
/// the `""` sentinel meaning "no more pages".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeltaToken(String);

impl DeltaToken {
    /// # Errors
    /// Returns an error if `token` is empty. Use `PageData::next_page_token
    /// = None` rather than an empty `DeltaToken` to signal end-of-pages.
    pub fn new(token: String) -> Result<Self, DomainError> {
        if token.is_empty() {
            return Err(DomainError::InvalidDeltaToken(
                "delta token cannot be empty".to_string(),
            ));
        }
        Ok(Self(token))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeltaToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeltaToken {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for DeltaToken {
    type Error = DomainError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DeltaToken> for String {
    fn from(token: DeltaToken) -> Self {
        token.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_path_requires_leading_slash() {
        assert!(RemotePath::new("no-leading-slash".to_string()).is_err());
        assert!(RemotePath::new("/ok".to_string()).is_ok());
    }

    #[test]
    fn remote_path_rejects_traversal_and_double_slash() {
        assert!(RemotePath::new("/a/../b".to_string()).is_err());
        assert!(RemotePath::new("/a//b".to_string()).is_err());
    }

    #[test]
    fn remote_path_join_and_parent() {
        let root = RemotePath::root();
        let docs = root.join("Documents").unwrap();
        assert_eq!(docs.as_str(), "/Documents");
        let file = docs.join("file.txt").unwrap();
        assert_eq!(file.as_str(), "/Documents/file.txt");
        assert_eq!(file.file_name(), Some("file.txt"));
        assert_eq!(file.parent().unwrap().as_str(), "/Documents");
    }

    #[test]
    fn remote_id_rejects_empty_and_slashes() {
        assert!(RemoteId::new(String::new()).is_err());
        assert!(RemoteId::new("has/slash".to_string()).is_err());
        assert!(RemoteId::new("01BYE5RZ6QN3".to_string()).is_ok());
    }

    #[test]
    fn file_hash_rejects_empty() {
        assert!(FileHash::new(String::new()).is_err());
        assert!(FileHash::new("d41d8cd98f00b204e9800998ecf8427e".to_string()).is_ok());
    }

    #[test]
    fn delta_token_rejects_empty() {
        assert!(DeltaToken::new(String::new()).is_err());
        assert!(DeltaToken::new("opaque-cursor".to_string()).is_ok());
    }
}
