//! Pack encryption engine
//!
//! Turns an unpacked pack directory into an encrypted zip:
//!   - `manifest.json` and `pack_icon.png` are copied verbatim
//!   - every other file is encrypted with AES-256-CFB8 under its own derived key
//!   - the `{path, key}` list is sealed with the master key into `contents.json`
//!
//! The archive is built in a temporary file. On any error that file is
//! dropped (and deleted) before the error is returned.

use std::fs::File;
use std::path::{Path, PathBuf};

use rpenc_core::{RpencError, RpencResult};
use rpenc_crypto::{build_contents, encrypt_cfb8, FileKey, FileKeyDeriver, KeyManifest, MasterKey, PackUuid};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::archive::PackWriter;
use crate::manifest::PackManifest;
use crate::walk::{self, io_context};
use crate::{is_passthrough, CONTENTS_FILE, MANIFEST_FILE};

/// An encrypted pack held in a temporary file.
///
/// The archive exists only as long as this value (or the [`NamedTempFile`]
/// taken from it) is alive. Call [`EncryptedPack::persist`] to keep it.
#[derive(Debug)]
pub struct EncryptedPack {
    file: NamedTempFile,
    uuid: PackUuid,
    name: Option<String>,
    encrypted_files: usize,
    passthrough_files: usize,
}

impl EncryptedPack {
    /// Location of the finalized archive.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// `header.uuid` of the pack, as embedded in `contents.json`.
    pub fn uuid(&self) -> &PackUuid {
        &self.uuid
    }

    /// `header.name` of the pack, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of files encrypted (entries in the key manifest).
    pub fn encrypted_files(&self) -> usize {
        self.encrypted_files
    }

    /// Number of files copied verbatim.
    pub fn passthrough_files(&self) -> usize {
        self.passthrough_files
    }

    /// Open a fresh read handle to the archive.
    pub fn open(&self) -> RpencResult<File> {
        self.file
            .reopen()
            .map_err(|e| io_context(e, "reopening", self.file.path()))
    }

    /// Move the archive to `dest`, ending its temporary lifetime.
    ///
    /// Falls back to copying when `dest` is on another filesystem.
    pub fn persist(self, dest: impl AsRef<Path>) -> RpencResult<PathBuf> {
        let dest = dest.as_ref();
        match self.file.persist(dest) {
            Ok(_) => Ok(dest.to_path_buf()),
            Err(err) => {
                debug!(dest = %dest.display(), error = %err.error, "rename failed, copying");
                std::fs::copy(err.file.path(), dest)
                    .map_err(|e| io_context(e, "copying encrypted pack to", dest))?;
                Ok(dest.to_path_buf())
            }
        }
    }

    /// Hand over the owning temporary file.
    pub fn into_temp_file(self) -> NamedTempFile {
        self.file
    }
}

/// Encrypts packs, placing temporary output under a working directory.
#[derive(Debug, Clone, Default)]
pub struct PackEncrypter {
    /// Base for scratch directories and unfinalized archives
    /// (default: the system temp dir)
    working_dir: Option<PathBuf>,
}

impl PackEncrypter {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(working_dir.into()),
        }
    }

    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub(crate) fn ensure_working_dir(&self) -> RpencResult<PathBuf> {
        let dir = self.working_dir();
        std::fs::create_dir_all(&dir).map_err(|e| io_context(e, "creating working dir", &dir))?;
        Ok(dir)
    }

    /// Encrypt the pack found under `dir`.
    ///
    /// `dir` may wrap the pack root at any depth; the first directory holding
    /// a `manifest.json` is used. `master_key` must be 32 bytes.
    pub fn encrypt_dir<D>(&self, dir: &Path, master_key: &[u8], deriver: &D) -> RpencResult<EncryptedPack>
    where
        D: FileKeyDeriver + ?Sized,
    {
        let master = MasterKey::from_slice(master_key).map_err(|e| RpencError::InputKey(e.to_string()))?;

        let root = walk::find_pack_root(dir)?
            .ok_or_else(|| RpencError::ManifestNotFound(dir.to_path_buf()))?;
        debug!(root = %root.display(), "located pack root");

        let files = walk::collect_files(&root)?;

        let working_dir = self.ensure_working_dir()?;
        let temp = tempfile::Builder::new()
            .prefix("rpenc-")
            .suffix(".zip")
            .tempfile_in(&working_dir)
            .map_err(|e| io_context(e, "creating temporary archive in", &working_dir))?;

        let mut writer = PackWriter::new(temp);
        let mut keys = KeyManifest::new();
        let mut manifest: Option<PackManifest> = None;
        let mut passthrough_files = 0usize;

        for file in &files {
            let path = file.relative_path.as_str();

            let contents = std::fs::read(&file.path).map_err(|e| io_context(e, "reading", &file.path))?;

            if path == MANIFEST_FILE {
                manifest = Some(PackManifest::parse(&contents)?);
            }

            if is_passthrough(path) {
                debug!(path, bytes = contents.len(), "passthrough");
                writer.add(path, &contents)?;
                passthrough_files += 1;
                continue;
            }

            let derived = deriver.derive_key(path, &contents);
            let key = FileKey::from_slice(&derived)
                .map_err(|e| RpencError::InputKey(format!("{e} for {path}")))?;
            let encrypted = encrypt_cfb8(key.as_bytes(), &key.iv(), &contents);
            debug!(path, bytes = contents.len(), "encrypted");

            if path == CONTENTS_FILE {
                // The entry name belongs to the sealed key manifest; the
                // input file keeps its key but its bytes are not written
                warn!(path, bytes = contents.len(), "input contents.json replaced by sealed key manifest");
            } else {
                writer.add(path, &encrypted)?;
            }
            keys.push(path, key);
        }

        let manifest = manifest.ok_or_else(|| {
            RpencError::Internal(format!(
                "{MANIFEST_FILE} located in {} but not visited during traversal",
                root.display()
            ))
        })?;

        let sealed = keys.seal(&master).map_err(|e| RpencError::Encoding(e.to_string()))?;
        writer.add(CONTENTS_FILE, &build_contents(&manifest.uuid, &sealed))?;
        let file = writer.finish()?;

        info!(
            uuid = %manifest.uuid,
            name = manifest.name.as_deref().unwrap_or(""),
            encrypted = keys.len(),
            passthrough = passthrough_files,
            "pack encrypted"
        );

        Ok(EncryptedPack {
            file,
            uuid: manifest.uuid,
            name: manifest.name,
            encrypted_files: keys.len(),
            passthrough_files,
        })
    }
}

/// Encrypt the pack under `dir`, with temporary output in the system temp dir.
pub fn encrypt_dir<D>(dir: &Path, master_key: &[u8], deriver: &D) -> RpencResult<EncryptedPack>
where
    D: FileKeyDeriver + ?Sized,
{
    PackEncrypter::default().encrypt_dir(dir, master_key, deriver)
}
