//! Key types: master key and per-file keys, length-checked and zeroized on drop

use thiserror::Error;
use zeroize::Zeroize;

use crate::{IV_SIZE, KEY_SIZE};

/// A key of the wrong length was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} must be {expected} bytes (received {actual})")]
pub struct InvalidKeyLength {
    pub kind: &'static str,
    pub expected: usize,
    pub actual: usize,
}

fn to_array(kind: &'static str, bytes: &[u8]) -> Result<[u8; KEY_SIZE], InvalidKeyLength> {
    bytes.try_into().map_err(|_| InvalidKeyLength {
        kind,
        expected: KEY_SIZE,
        actual: bytes.len(),
    })
}

fn iv_of(bytes: &[u8; KEY_SIZE]) -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&bytes[..IV_SIZE]);
    iv
}

/// The 256-bit key that encrypts a pack's key manifest.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Length-checked construction from caller input.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, InvalidKeyLength> {
        to_array("master key", bytes).map(Self::from_bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// CFB8 IV: the first 16 bytes of the key.
    pub fn iv(&self) -> [u8; IV_SIZE] {
        iv_of(&self.bytes)
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A per-file 256-bit encryption key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct FileKey {
    bytes: [u8; KEY_SIZE],
}

impl FileKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Length-checked construction from a deriver's output.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, InvalidKeyLength> {
        to_array("derived file key", bytes).map(Self::from_bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// CFB8 IV: the first 16 bytes of the key.
    pub fn iv(&self) -> [u8; IV_SIZE] {
        iv_of(&self.bytes)
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_key_from_slice() {
        let key = MasterKey::from_slice(&[7u8; KEY_SIZE]).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; KEY_SIZE]);
    }

    #[test]
    fn test_master_key_wrong_length() {
        let err = MasterKey::from_slice(&[0u8; 16]).unwrap_err();
        assert_eq!(err.expected, KEY_SIZE);
        assert_eq!(err.actual, 16);
        assert_eq!(err.to_string(), "master key must be 32 bytes (received 16)");
    }

    #[test]
    fn test_file_key_rejects_off_by_one() {
        assert!(FileKey::from_slice(&[1u8; 31]).is_err());
        assert!(FileKey::from_slice(&[1u8; 33]).is_err());
        assert!(FileKey::from_slice(&[1u8; 32]).is_ok());
    }

    #[test]
    fn test_iv_is_key_prefix() {
        let mut bytes = [0u8; KEY_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let key = FileKey::from_bytes(bytes);
        assert_eq!(&key.iv()[..], &bytes[..IV_SIZE]);

        let master = MasterKey::from_bytes(bytes);
        assert_eq!(master.iv(), key.iv());
    }

    #[test]
    fn test_debug_redacts() {
        let key = MasterKey::from_bytes([0x41; KEY_SIZE]);
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("65"));
    }
}
