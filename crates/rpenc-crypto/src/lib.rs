//! rpenc-crypto: cryptography for encrypted content packs
//!
//! Cipher: AES-256 in CFB mode with an 8-bit feedback segment (CFB8). It is a
//! byte-level stream cipher, so ciphertext length equals plaintext length.
//!
//! Key hierarchy:
//! ```text
//! Master Key (32 bytes, caller supplied)
//!   └── contents.json: AES-256-CFB8(key=master, iv=master[..16]) of the key manifest
//!         └── Key manifest: [{path, key}] for every encrypted file
//! File Key (32 bytes, per file, from a FileKeyDeriver)
//!   └── file body: AES-256-CFB8(key=file_key, iv=file_key[..16])
//! ```
//!
//! The IV is the key's own prefix. The consuming runtime expects exactly this,
//! so it must not change.

pub mod cipher;
pub mod container;
pub mod kdf;
pub mod keys;
pub mod manifest;

pub use cipher::encrypt_cfb8;
pub use container::{build_contents, ContentsHeader, InvalidPackUuid, PackUuid};
pub use kdf::{machine_master_key, random_master_key, ContentHashDeriver, FileKeyDeriver};
pub use keys::{FileKey, InvalidKeyLength, MasterKey};
pub use manifest::{KeyManifest, KeyManifestEntry};

/// Size of a master or per-file key in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// Size of the CFB8 initialization vector (one AES block)
pub const IV_SIZE: usize = 16;
