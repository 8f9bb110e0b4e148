//! `contents.json` container: fixed 256-byte header + encrypted key manifest
//!
//! Layout:
//! ```text
//! offset  len  field
//!      0    4  version (zero)
//!      4    4  type tag FC B9 CF 9B
//!      8    8  padding (zero)
//!     16    1  separator 0x24
//!     17   36  pack UUID (canonical text form)
//!     53  203  padding (zero)
//!    256    n  AES-256-CFB8 ciphertext of the key manifest
//! ```

use thiserror::Error;

/// Total size of the fixed header.
pub const HEADER_SIZE: usize = 256;

/// Version field (always zero).
pub const VERSION: [u8; 4] = [0x00; 4];

/// Type tag identifying an encrypted contents container.
pub const MAGIC: [u8; 4] = [0xFC, 0xB9, 0xCF, 0x9B];

/// Separator byte preceding the pack UUID.
pub const SEPARATOR: u8 = 0x24;

/// Length of a canonical textual UUID.
pub const UUID_LEN: usize = 36;

const MAGIC_OFFSET: usize = 4;
const SEPARATOR_OFFSET: usize = 16;
const UUID_OFFSET: usize = 17;

/// The pack UUID is not exactly 36 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pack UUID must be 36 bytes (received {0})")]
pub struct InvalidPackUuid(pub usize);

/// A pack UUID in canonical textual form, exactly 36 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackUuid([u8; UUID_LEN]);

impl PackUuid {
    pub fn as_bytes(&self) -> &[u8; UUID_LEN] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Only ever constructed from a &str
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl TryFrom<&str> for PackUuid {
    type Error = InvalidPackUuid;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let bytes: [u8; UUID_LEN] = s
            .as_bytes()
            .try_into()
            .map_err(|_| InvalidPackUuid(s.len()))?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for PackUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the complete `contents.json` entry: header followed by `ciphertext`.
pub fn build_contents(uuid: &PackUuid, ciphertext: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    buf.extend_from_slice(&VERSION);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&[0u8; 8]);
    buf.push(SEPARATOR);
    buf.extend_from_slice(uuid.as_bytes());
    buf.resize(HEADER_SIZE, 0);
    buf.extend_from_slice(ciphertext);
    buf
}

/// Parsed header of an existing `contents.json` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentsHeader {
    pub uuid: PackUuid,
}

impl ContentsHeader {
    /// Parse the header from the start of a `contents.json` entry.
    ///
    /// Returns `None` when the bytes are not an encrypted container (too
    /// short, wrong type tag or separator, or a non-UTF-8 UUID).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        if bytes[MAGIC_OFFSET..MAGIC_OFFSET + 4] != MAGIC || bytes[SEPARATOR_OFFSET] != SEPARATOR {
            return None;
        }
        let uuid = std::str::from_utf8(&bytes[UUID_OFFSET..UUID_OFFSET + UUID_LEN]).ok()?;
        let uuid = PackUuid::try_from(uuid).ok()?;
        Some(Self { uuid })
    }

    /// The ciphertext following the header.
    pub fn payload(bytes: &[u8]) -> &[u8] {
        bytes.get(HEADER_SIZE..).unwrap_or_default()
    }
}
