//! AES-256-CFB8 stream encryption
//!
//! ```text
//! ciphertext = AES-256-CFB8(key, iv = key[0..16], plaintext)
//! len(ciphertext) == len(plaintext)
//! ```
//!
//! No padding, no authentication tag: the consuming runtime reads the bytes as
//! a plain CFB8 stream.

use aes::Aes256;
use cfb8::cipher::{AsyncStreamCipher, KeyIvInit};

use crate::{IV_SIZE, KEY_SIZE};

type Aes256Cfb8Enc = cfb8::Encryptor<Aes256>;

/// Encrypt `plaintext` with AES-256-CFB8.
pub fn encrypt_cfb8(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE], plaintext: &[u8]) -> Vec<u8> {
    let mut buf = plaintext.to_vec();
    encrypt_cfb8_in_place(key, iv, &mut buf);
    buf
}

/// Encrypt `buf` in place with AES-256-CFB8.
pub fn encrypt_cfb8_in_place(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE], buf: &mut [u8]) {
    Aes256Cfb8Enc::new(key.into(), iv.into()).encrypt(buf);
}


#[cfg(test)]
mod proptest_suite {
    use super::*;
    use proptest::prelude::*;

    type Aes256Cfb8Dec = cfb8::Decryptor<Aes256>;

    proptest! {
        #[test]
        fn length_preserved(key in any::<[u8; KEY_SIZE]>(), data in prop::collection::vec(any::<u8>(), 0..2048)) {
            let iv: [u8; IV_SIZE] = key[..IV_SIZE].try_into().unwrap();
            let encrypted = encrypt_cfb8(&key, &iv, &data);
            prop_assert_eq!(encrypted.len(), data.len());
        }

        #[test]
        fn roundtrip(key in any::<[u8; KEY_SIZE]>(), data in prop::collection::vec(any::<u8>(), 0..2048)) {
            let iv: [u8; IV_SIZE] = key[..IV_SIZE].try_into().unwrap();
            let mut buf = encrypt_cfb8(&key, &iv, &data);
            Aes256Cfb8Dec::new((&key).into(), (&iv).into()).decrypt(&mut buf);
            prop_assert_eq!(buf, data);
        }
    }
}
