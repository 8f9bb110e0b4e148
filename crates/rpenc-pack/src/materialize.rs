//! Archive materializer: zip → scratch directory → engine
//!
//! Every call extracts into its own uniquely named scratch directory, so
//! concurrent encryptions sharing a working directory never collide. The
//! directory is removed on every exit path.

use std::path::Path;

use rpenc_core::{RpencError, RpencResult};
use rpenc_crypto::{FileKeyDeriver, MasterKey};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::archive::extract_archive;
use crate::engine::{EncryptedPack, PackEncrypter};
use crate::walk::io_context;

impl PackEncrypter {
    /// Extract the zip at `archive` and encrypt the pack inside it.
    pub fn encrypt_archive<D>(
        &self,
        archive: &Path,
        master_key: &[u8],
        deriver: &D,
    ) -> RpencResult<EncryptedPack>
    where
        D: FileKeyDeriver + ?Sized,
    {
        // Reject a bad key before doing any extraction work
        MasterKey::from_slice(master_key).map_err(|e| RpencError::InputKey(e.to_string()))?;

        let scratch = self.scratch_dir()?;
        debug!(
            archive = %archive.display(),
            scratch = %scratch.path().display(),
            "extracting pack"
        );
        extract_archive(archive, scratch.path())?;

        let result = self.encrypt_dir(scratch.path(), master_key, deriver);

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(scratch = %scratch_path.display(), "failed to remove scratch dir: {e}");
        }
        result
    }

    fn scratch_dir(&self) -> RpencResult<TempDir> {
        let base = self.ensure_working_dir()?;
        tempfile::Builder::new()
            .prefix("scratch-")
            .tempdir_in(&base)
            .map_err(|e| io_context(e, "creating scratch dir in", &base))
    }
}

/// Encrypt the zip at `archive`, using the system temp dir for scratch space.
pub fn encrypt_archive<D>(archive: &Path, master_key: &[u8], deriver: &D) -> RpencResult<EncryptedPack>
where
    D: FileKeyDeriver + ?Sized,
{
    PackEncrypter::default().encrypt_archive(archive, master_key, deriver)
}
