//! Key derivation: per-file key derivers and default master keys
//!
//! Keys produced here are 32 printable hex characters so they can be written
//! into the key manifest and `<pack>.key` files as-is.

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

use crate::KEY_SIZE;

/// BLAKE3 derive-key context for machine-bound master keys
const MACHINE_KEY_CONTEXT: &str = "rpenc 2024-05-01 machine master key";

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Derives the encryption key for one file of a pack.
///
/// `path` is the entry name relative to the pack root (forward slashes). The
/// result must be exactly 32 bytes; the engine rejects anything else.
pub trait FileKeyDeriver {
    fn derive_key(&self, path: &str, contents: &[u8]) -> Vec<u8>;
}

impl<F> FileKeyDeriver for F
where
    F: Fn(&str, &[u8]) -> Vec<u8>,
{
    fn derive_key(&self, path: &str, contents: &[u8]) -> Vec<u8> {
        self(path, contents)
    }
}

/// Default deriver: the first 32 hex characters of BLAKE3(path || contents).
///
/// Deterministic, so re-encrypting an unchanged pack gives identical output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHashDeriver;

impl FileKeyDeriver for ContentHashDeriver {
    fn derive_key(&self, path: &str, contents: &[u8]) -> Vec<u8> {
        let hash = blake3::Hasher::new()
            .update(path.as_bytes())
            .update(contents)
            .finalize();
        hash.to_hex().as_bytes()[..KEY_SIZE].to_vec()
    }
}

/// Master key bound to this machine: 32 hex characters derived from the
/// machine identifier (`/etc/machine-id`, then the D-Bus id, then hostname).
pub fn machine_master_key() -> anyhow::Result<String> {
    let id = machine_id()?;
    let hash = blake3::Hasher::new_derive_key(MACHINE_KEY_CONTEXT)
        .update(id.as_bytes())
        .finalize();
    Ok(hash.to_hex()[..KEY_SIZE].to_string())
}

/// A fresh random master key of 32 alphanumeric characters.
pub fn random_master_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_SIZE)
        .map(char::from)
        .collect()
}

fn machine_id() -> anyhow::Result<String> {
    for path in MACHINE_ID_PATHS {
        if let Ok(id) = std::fs::read_to_string(path) {
            let id = id.trim();
            if !id.is_empty() {
                debug!(source = %path, "using machine id");
                return Ok(id.to_string());
            }
        }
    }

    let host = hostname::get()
        .map_err(|e| anyhow::anyhow!("no machine id and hostname lookup failed: {e}"))?
        .into_string()
        .map_err(|_| anyhow::anyhow!("hostname is not valid UTF-8"))?;
    debug!("using hostname as machine id");
    Ok(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_deterministic() {
        let a = ContentHashDeriver.derive_key("textures/a.png", b"pixels");
        let b = ContentHashDeriver.derive_key("textures/a.png", b"pixels");
        assert_eq!(a, b, "deriver must be deterministic");
        assert_eq!(a.len(), KEY_SIZE);
        assert!(a.iter().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_hash_depends_on_path_and_contents() {
        let base = ContentHashDeriver.derive_key("a.json", b"{}");
        assert_ne!(base, ContentHashDeriver.derive_key("b.json", b"{}"));
        assert_ne!(base, ContentHashDeriver.derive_key("a.json", b"[]"));
    }

    #[test]
    fn test_closure_deriver() {
        let deriver = |path: &str, _contents: &[u8]| format!("{path:0>32}").into_bytes();
        assert_eq!(
            deriver.derive_key("x", b""),
            b"0000000000000000000000000000000x".to_vec()
        );
    }

    #[test]
    fn test_random_master_key() {
        let k1 = random_master_key();
        let k2 = random_master_key();
        assert_eq!(k1.len(), KEY_SIZE);
        assert!(k1.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(k1, k2, "random keys must differ");
    }

    #[test]
    fn test_machine_master_key_stable() {
        // Every supported platform has either a machine id or a hostname
        let k1 = machine_master_key().unwrap();
        let k2 = machine_master_key().unwrap();
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), KEY_SIZE);
    }
}
