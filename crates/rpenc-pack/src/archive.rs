//! Zip archive plumbing: deterministic writer, extraction, encrypted-pack probe

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use rpenc_core::{RpencError, RpencResult};
use rpenc_crypto::container::{ContentsHeader, HEADER_SIZE};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::walk::io_context;
use crate::CONTENTS_FILE;

pub(crate) fn archive_err(context: &str, err: ZipError) -> RpencError {
    match err {
        ZipError::Io(e) => RpencError::Io(std::io::Error::new(e.kind(), format!("{context}: {e}"))),
        other => RpencError::Archive(format!("{context}: {other}")),
    }
}

/// Options for every entry: deflate, fixed timestamp and permissions, so the
/// same input always yields the same archive bytes.
fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

/// Write side of an output pack.
pub struct PackWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
}

impl<W: Write + Seek> PackWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            zip: ZipWriter::new(inner),
        }
    }

    /// Add one entry named `name` holding `data`.
    pub fn add(&mut self, name: &str, data: &[u8]) -> RpencResult<()> {
        self.zip
            .start_file(name, entry_options())
            .map_err(|e| archive_err(&format!("adding {name}"), e))?;
        self.zip
            .write_all(data)
            .map_err(|e| RpencError::Io(std::io::Error::new(e.kind(), format!("writing {name}: {e}"))))?;
        Ok(())
    }

    /// Write the central directory and hand back the underlying writer.
    pub fn finish(self) -> RpencResult<W> {
        self.zip
            .finish()
            .map_err(|e| archive_err("finalizing archive", e))
    }
}

/// Extract every entry of the zip at `archive` into `dest`.
///
/// Entry names that would escape `dest` are rejected by the zip reader.
pub fn extract_archive(archive: &Path, dest: &Path) -> RpencResult<()> {
    let file = File::open(archive).map_err(|e| io_context(e, "opening archive", archive))?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| archive_err(&format!("reading {}", archive.display()), e))?;
    zip.extract(dest)
        .map_err(|e| archive_err(&format!("extracting {}", archive.display()), e))
}

/// Look for an encrypted `contents.json` in the zip at `archive`.
///
/// Returns the parsed header when the archive is already an encrypted pack,
/// `None` otherwise. Only the header is read; nothing is decrypted.
pub fn read_contents_header(archive: &Path) -> RpencResult<Option<ContentsHeader>> {
    let file = File::open(archive).map_err(|e| io_context(e, "opening archive", archive))?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| archive_err(&format!("reading {}", archive.display()), e))?;

    // The pack root may sit inside a wrapper directory
    let names: Vec<String> = zip
        .file_names()
        .filter(|n| *n == CONTENTS_FILE || n.ends_with(&format!("/{CONTENTS_FILE}")))
        .map(str::to_owned)
        .collect();

    for name in names {
        let entry = zip
            .by_name(&name)
            .map_err(|e| archive_err(&format!("reading {name}"), e))?;
        let mut head = Vec::with_capacity(HEADER_SIZE);
        entry
            .take(HEADER_SIZE as u64)
            .read_to_end(&mut head)
            .map_err(|e| io_context(e, "reading", Path::new(&name)))?;
        if let Some(header) = ContentsHeader::from_bytes(&head) {
            return Ok(Some(header));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = PackWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            writer.add(name, data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_writer_is_deterministic() {
        let build = || {
            let mut writer = PackWriter::new(Cursor::new(Vec::new()));
            writer.add("a.txt", b"alpha").unwrap();
            writer.add("dir/b.txt", b"beta").unwrap();
            writer.finish().unwrap().into_inner()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut writer = PackWriter::new(Cursor::new(Vec::new()));
        writer.add("a.txt", b"alpha").unwrap();
        assert!(writer.add("a.txt", b"again").is_err());
    }

    #[test]
    fn test_extract_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let zip_path = tmp.path().join("pack.zip");
        write_zip(
            &zip_path,
            &[("manifest.json", &b"{}"[..]), ("textures/a.png", &b"png"[..])],
        );

        let dest = tmp.path().join("out");
        extract_archive(&zip_path, &dest).unwrap();

        assert_eq!(std::fs::read(dest.join("manifest.json")).unwrap(), b"{}");
        assert_eq!(std::fs::read(dest.join("textures/a.png")).unwrap(), b"png");
    }

    #[test]
    fn test_extract_corrupt_archive() {
        let tmp = TempDir::new().unwrap();
        let zip_path = tmp.path().join("broken.zip");
        std::fs::write(&zip_path, b"not a zip archive, just some plain text bytes".repeat(4)).unwrap();

        let err = extract_archive(&zip_path, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, RpencError::Archive(_)), "got {err:?}");
    }

    #[test]
    fn test_contents_header_probe() {
        let tmp = TempDir::new().unwrap();
        let uuid = rpenc_crypto::PackUuid::try_from("0f7a6c2e-4d1b-4c3a-9e8f-7b6a5d4c3b2a").unwrap();
        let contents = rpenc_crypto::build_contents(&uuid, b"sealed");

        let encrypted = tmp.path().join("enc.zip");
        write_zip(&encrypted, &[("Pack/contents.json", contents.as_slice())]);
        let header = read_contents_header(&encrypted).unwrap().unwrap();
        assert_eq!(header.uuid, uuid);

        let plain = tmp.path().join("plain.zip");
        write_zip(&plain, &[("contents.json", &br#"{"content":[]}"#[..])]);
        assert!(read_contents_header(&plain).unwrap().is_none());
    }
}
