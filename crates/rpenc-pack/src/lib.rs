//! rpenc-pack: encrypts unpacked content packs into zip archives
//!
//! Pipeline:
//! ```text
//! archive ──extract──▶ scratch dir ──find manifest.json──▶ pack root
//!   for each file (sorted):
//!     manifest.json, pack_icon.png  → copied verbatim
//!     everything else               → AES-256-CFB8 with a derived per-file key
//!   key manifest {path, key}        → sealed with the master key into contents.json
//! ```
//!
//! The output lives in a temporary file owned by [`EncryptedPack`]; dropping
//! it deletes the archive.

pub mod archive;
pub mod engine;
pub mod manifest;
pub mod materialize;
pub mod walk;

pub use engine::{encrypt_dir, EncryptedPack, PackEncrypter};
pub use materialize::encrypt_archive;

/// The pack manifest; its directory is the pack root.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Pack icon, shown before the pack is unlocked.
pub const PACK_ICON_FILE: &str = "pack_icon.png";

/// Entry holding the sealed key manifest.
pub const CONTENTS_FILE: &str = "contents.json";

/// Files the consuming runtime must read before it has the key.
pub const PASSTHROUGH_FILES: [&str; 2] = [MANIFEST_FILE, PACK_ICON_FILE];

/// Whether `relative_path` is copied into the output unencrypted.
pub fn is_passthrough(relative_path: &str) -> bool {
    PASSTHROUGH_FILES.contains(&relative_path)
}
