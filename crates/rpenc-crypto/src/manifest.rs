//! Key manifest: the `{path, key}` list sealed inside `contents.json`
//!
//! JSON shape:
//! ```text
//! {"content":[{"path":"textures/blocks/stone.png","key":"<32 key bytes>"}, ...]}
//! ```
//!
//! Keys are written as JSON strings holding the raw key bytes, which is what
//! the consuming runtime reads. A key that is not valid UTF-8 has no such
//! representation and fails serialization.

use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};

use crate::cipher::encrypt_cfb8;
use crate::keys::{FileKey, MasterKey};

/// A single encrypted file and the key it was encrypted with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyManifestEntry {
    /// Entry name inside the pack, forward-slash separated
    pub path: String,
    #[serde(serialize_with = "serialize_key", deserialize_with = "deserialize_key")]
    pub key: FileKey,
}

/// Every encrypted file of a pack, in visitation order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyManifest {
    pub content: Vec<KeyManifestEntry>,
}

impl KeyManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>, key: FileKey) {
        self.content.push(KeyManifestEntry {
            path: path.into(),
            key,
        });
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| anyhow::anyhow!("key manifest serialization: {e}"))
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| anyhow::anyhow!("key manifest deserialization: {e}"))
    }

    /// Serialize and encrypt under the master key (IV = master key prefix).
    pub fn seal(&self, master: &MasterKey) -> anyhow::Result<Vec<u8>> {
        let json = self.to_bytes()?;
        Ok(encrypt_cfb8(master.as_bytes(), &master.iv(), &json))
    }
}

fn serialize_key<S: Serializer>(key: &FileKey, serializer: S) -> Result<S::Ok, S::Error> {
    let text = std::str::from_utf8(key.as_bytes())
        .map_err(|_| <S::Error as ser::Error>::custom("file key is not valid UTF-8"))?;
    serializer.serialize_str(text)
}

fn deserialize_key<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FileKey, D::Error> {
    let text = String::deserialize(deserializer)?;
    FileKey::from_slice(text.as_bytes()).map_err(de::Error::custom)
}
