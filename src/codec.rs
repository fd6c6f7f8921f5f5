// src/codec.rs
//! Conversion between a plaintext secret and its stored form.
//!
//! Stored forms carry a leading tag so that older rows can still be read
//! after the encoding changes:
//!
//! * `$enc-v1$<hex(nonce || ciphertext)>` - ChaCha20Poly1305 under the vault key.
//!   This is the only form written.
//! * `$plain$<text>` - tagged passthrough.
//! * `$argon2...`, `$scrypt$...` or scrypt `<hex hash>.<hex salt>` - one-way
//!   hashes. These can never be decoded.
//! * anything else - untagged plaintext from before tagging existed.

use std::fmt;

use crate::crypto::{self, KEY_LEN, NONCE_LEN};
use crate::error::{CryptoError, SecretError, SecretResult};

const ENCRYPTED_V1_TAG: &str = "$enc-v1$";
const PLAIN_TAG: &str = "$plain$";
// chacha20poly1305 appends a 16 byte tag to every ciphertext
const AEAD_TAG_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretFormat {
    EncryptedV1,
    TaggedPlain,
    OneWayHash,
    LegacyPlain,
}

impl SecretFormat {
    pub fn detect(stored: &str) -> SecretFormat {
        if stored.starts_with(ENCRYPTED_V1_TAG) {
            SecretFormat::EncryptedV1
        } else if stored.starts_with(PLAIN_TAG) {
            SecretFormat::TaggedPlain
        } else if stored.starts_with("$argon2") || stored.starts_with("$scrypt$") || is_scrypt_pair(stored) {
            SecretFormat::OneWayHash
        } else {
            SecretFormat::LegacyPlain
        }
    }

    pub fn is_recoverable(self) -> bool {
        self != SecretFormat::OneWayHash
    }
}

/// `<hex>.<hex>` with a 64-byte key and 16-byte salt, the shape the old
/// account-password scrypt helper produced.
fn is_scrypt_pair(stored: &str) -> bool {
    match stored.split_once('.') {
        Some((hash, salt)) => {
            hash.len() == 128
                && salt.len() == 32
                && hash.bytes().all(|b| b.is_ascii_hexdigit())
                && salt.bytes().all(|b| b.is_ascii_hexdigit())
        }
        None => false,
    }
}

#[derive(Clone)]
pub struct SecretCodec {
    key: [u8; KEY_LEN],
}

impl fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCodec").field("key", &"[REDACTED]").finish()
    }
}

impl SecretCodec {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        SecretCodec { key }
    }

    /// Codec with a throwaway random key, for stores that never outlive the
    /// process.
    pub fn ephemeral() -> Self {
        SecretCodec::new(crypto::generate_chacha_key())
    }

    pub fn encode(&self, plaintext: &str) -> SecretResult<String> {
        let nonce = crypto::generate_chacha_nonce();
        let ciphertext = crypto::encrypt_data(plaintext.as_bytes(), &self.key, &nonce)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", ENCRYPTED_V1_TAG, hex::encode(payload)))
    }

    pub fn decode(&self, stored: &str) -> SecretResult<String> {
        match SecretFormat::detect(stored) {
            SecretFormat::EncryptedV1 => self.decrypt_v1(&stored[ENCRYPTED_V1_TAG.len()..]),
            SecretFormat::TaggedPlain => Ok(stored[PLAIN_TAG.len()..].to_string()),
            SecretFormat::OneWayHash => Err(SecretError::Unrecoverable),
            SecretFormat::LegacyPlain => Ok(stored.to_string()),
        }
    }

    fn decrypt_v1(&self, body: &str) -> SecretResult<String> {
        let payload = hex::decode(body).map_err(|e| CryptoError::HexDecoding(e.to_string()))?;
        if payload.len() < NONCE_LEN + AEAD_TAG_LEN {
            return Err(SecretError::Malformed(format!(
                "encrypted payload too short ({} bytes)",
                payload.len()
            )));
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);

        let plaintext = crypto::decrypt_data(ciphertext, &self.key, &nonce)?;
        String::from_utf8(plaintext).map_err(|e| SecretError::Malformed(format!("decrypted secret is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_assorted_plaintexts() {
        let codec = SecretCodec::ephemeral();
        let long = "x".repeat(100_000);
        let samples = [
            "",
            "s3cr3t",
            "pässwörd 🔐 パスワード",
            "$plain$looks-tagged",
            "$argon2id$v=19$looks-hashed",
            long.as_str(),
        ];

        for plaintext in samples {
            let stored = codec.encode(plaintext).unwrap();
            assert_eq!(SecretFormat::detect(&stored), SecretFormat::EncryptedV1);
            assert_eq!(codec.decode(&stored).unwrap(), plaintext);
        }
    }

    #[test]
    fn stored_form_hides_plaintext_and_is_randomized() {
        let codec = SecretCodec::ephemeral();
        let first = codec.encode("s3cr3t").unwrap();
        let second = codec.encode("s3cr3t").unwrap();

        assert_ne!(first, "s3cr3t");
        assert!(!first.contains("s3cr3t"));
        assert_ne!(first, second);
    }

    #[test]
    fn different_key_cannot_decode() {
        let stored = SecretCodec::ephemeral().encode("s3cr3t").unwrap();
        let other = SecretCodec::ephemeral();
        assert!(matches!(other.decode(&stored), Err(SecretError::Crypto(CryptoError::ChaCha(_)))));
    }

    #[test]
    fn legacy_hashes_are_unrecoverable() {
        let codec = SecretCodec::ephemeral();
        let scrypt = format!("{}.{}", "ab".repeat(64), "cd".repeat(16));
        let hashes = [
            "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2g",
            "$scrypt$ln=15,r=8,p=1$c2FsdA$aGFzaA",
            scrypt.as_str(),
        ];

        for stored in hashes {
            assert!(!SecretFormat::detect(stored).is_recoverable());
            assert!(matches!(codec.decode(stored), Err(SecretError::Unrecoverable)));
        }
    }

    #[test]
    fn plain_forms_pass_through() {
        let codec = SecretCodec::ephemeral();
        assert_eq!(codec.decode("$plain$hunter2").unwrap(), "hunter2");
        assert_eq!(codec.decode("hunter2").unwrap(), "hunter2");
        // not the scrypt shape: salt part is too short
        assert_eq!(codec.decode("abcdef.0123").unwrap(), "abcdef.0123");
    }

    #[test]
    fn damaged_ciphertext_is_reported() {
        let codec = SecretCodec::ephemeral();
        assert!(matches!(codec.decode("$enc-v1$zz"), Err(SecretError::Crypto(CryptoError::HexDecoding(_)))));
        assert!(matches!(codec.decode("$enc-v1$00ff"), Err(SecretError::Malformed(_))));

        let mut stored = codec.encode("s3cr3t").unwrap();
        let last = stored.pop().unwrap();
        stored.push(if last == '0' { '1' } else { '0' });
        assert!(matches!(codec.decode(&stored), Err(SecretError::Crypto(CryptoError::ChaCha(_)))));
    }

    #[test]
    fn debug_output_redacts_key() {
        let codec = SecretCodec::new([7u8; KEY_LEN]);
        assert!(format!("{:?}", codec).contains("REDACTED"));
    }
}
