//! Storage keys and the object layout derived from them.
//!
//! A storage key is allocated once per upload session and never changes. It
//! names the final artifact and namespaces the temporary chunk payloads, so
//! it must be safe to embed in an object key no matter what the client sent
//! as the original filename.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Longest extension carried over from the original filename.
const MAX_EXTENSION_LEN: usize = 16;

/// Internal name under which an upload's chunks and artifact are stored.
///
/// Format: 32 lowercase hex characters, optionally followed by `.` and a
/// lowercase alphanumeric extension taken from the original filename.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageKey(String);

impl StorageKey {
    /// Allocate a fresh key, keeping a sanitized extension of `original_name`.
    pub fn generate(original_name: &str) -> Self {
        let stem = Uuid::new_v4().simple().to_string();
        match sanitized_extension(original_name) {
            Some(ext) => Self(format!("{stem}.{ext}")),
            None => Self(stem),
        }
    }

    /// Parse and validate a key read back from persistent state.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let (stem, ext) = match s.split_once('.') {
            Some((stem, ext)) => (stem, Some(ext)),
            None => (s, None),
        };

        let stem_ok = stem.len() == 32
            && stem
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        let ext_ok = ext.is_none_or(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext
                    .bytes()
                    .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
        });

        if stem_ok && ext_ok {
            Ok(Self(s.to_string()))
        } else {
            Err(crate::Error::InvalidStorageKey(s.to_string()))
        }
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Object key of the assembled artifact.
    pub fn artifact_object_key(&self) -> String {
        format!("files/{}", self.0)
    }

    /// Prefix under which all chunk payloads of this upload live.
    pub fn chunk_prefix(&self) -> String {
        format!("temp/{}/", self.0)
    }

    /// Object key of a single chunk payload.
    ///
    /// Indices are zero padded so a lexicographic listing matches index order.
    pub fn chunk_object_key(&self, chunk_index: u32) -> String {
        format!("temp/{}/{:08}.part", self.0, chunk_index)
    }
}

fn sanitized_extension(original_name: &str) -> Option<String> {
    let (_, ext) = original_name.rsplit_once('.')?;
    let ext: String = ext
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(MAX_EXTENSION_LEN)
        .collect();
    (!ext.is_empty()).then_some(ext)
}

impl TryFrom<String> for StorageKey {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        key.0
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({})", self.0)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_keeps_lowercased_extension() {
        let key = StorageKey::generate("Holiday Photos.TAR");
        assert!(key.as_str().ends_with(".tar"));
        assert_eq!(key.as_str().len(), 32 + 4);
        assert!(StorageKey::parse(key.as_str()).is_ok());
    }

    #[test]
    fn test_generate_without_extension() {
        let key = StorageKey::generate("README");
        assert_eq!(key.as_str().len(), 32);
        assert!(!key.as_str().contains('.'));
    }

    #[test]
    fn test_generate_strips_hostile_extension() {
        let key = StorageKey::generate("evil.../../etc/passwd");
        assert!(!key.as_str().contains('/'));
        assert!(key.as_str().ends_with(".etcpasswd"));

        let key = StorageKey::generate("trailing.");
        assert_eq!(key.as_str().len(), 32);
    }

    #[test]
    fn test_generate_is_unique() {
        let a = StorageKey::generate("a.bin");
        let b = StorageKey::generate("a.bin");
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        assert!(StorageKey::parse("").is_err());
        assert!(StorageKey::parse("../secret").is_err());
        assert!(StorageKey::parse("0123456789abcdef0123456789abcdef.").is_err());
        assert!(StorageKey::parse("0123456789ABCDEF0123456789abcdef").is_err());
        assert!(StorageKey::parse("0123456789abcdef0123456789abcdef.t/r").is_err());
        assert!(StorageKey::parse("0123456789abcdef0123456789abcdef.tar").is_ok());
    }

    #[test]
    fn test_object_layout() {
        let key = StorageKey::parse("0123456789abcdef0123456789abcdef.iso").unwrap();
        assert_eq!(
            key.artifact_object_key(),
            "files/0123456789abcdef0123456789abcdef.iso"
        );
        assert_eq!(
            key.chunk_object_key(7),
            "temp/0123456789abcdef0123456789abcdef.iso/00000007.part"
        );
        assert!(key.chunk_object_key(7).starts_with(&key.chunk_prefix()));
    }
}
