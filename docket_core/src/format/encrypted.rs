//! Passphrase-encrypted wrapper around another format.
//!
//! Each file is laid out as `salt || nonce || ciphertext`. The key is derived
//! per file from the passphrase and the random salt using Argon2id, and the
//! inner format's bytes are sealed with an AEAD cipher.

use super::Format;
use crate::document::Document;
use crate::error::{Error, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit, Nonce};
use chacha20poly1305::{ChaCha20Poly1305, XChaCha20Poly1305};
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, Zeroizing};

/// Suffix appended to the inner format's extension.
pub const ENCRYPTED_SUFFIX: &str = ".enc";

const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

// Argon2id cost parameters.
const ARGON2_M_COST: u32 = 19 * 1024; // 19 MiB
const ARGON2_T_COST: u32 = 2;
const ARGON2_P_COST: u32 = 1;

/// AEAD cipher used to seal documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cipher {
    #[default]
    ChaCha20Poly1305,
    XChaCha20Poly1305,
}

impl Cipher {
    /// Get the cipher name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Cipher::ChaCha20Poly1305 => "chacha20poly1305",
            Cipher::XChaCha20Poly1305 => "xchacha20poly1305",
        }
    }

    /// Nonce length in bytes.
    pub fn nonce_len(&self) -> usize {
        match self {
            Cipher::ChaCha20Poly1305 => 12,
            Cipher::XChaCha20Poly1305 => 24,
        }
    }

    fn seal(&self, key: &[u8; KEY_LEN], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Cipher::ChaCha20Poly1305 => seal_with::<ChaCha20Poly1305>(key, nonce, plaintext),
            Cipher::XChaCha20Poly1305 => seal_with::<XChaCha20Poly1305>(key, nonce, plaintext),
        }
    }

    fn open(&self, key: &[u8; KEY_LEN], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Cipher::ChaCha20Poly1305 => open_with::<ChaCha20Poly1305>(key, nonce, ciphertext),
            Cipher::XChaCha20Poly1305 => open_with::<XChaCha20Poly1305>(key, nonce, ciphertext),
        }
    }
}

impl fmt::Display for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cipher {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chacha20poly1305" | "chacha20-poly1305" => Ok(Cipher::ChaCha20Poly1305),
            "xchacha20poly1305" | "xchacha20-poly1305" => Ok(Cipher::XChaCha20Poly1305),
            _ => Err(Error::unsupported_cipher(s)),
        }
    }
}

fn seal_with<C: Aead + KeyInit>(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher =
        C::new_from_slice(key).map_err(|e| Error::encryption(format!("cipher init: {e}")))?;
    cipher
        .encrypt(Nonce::<C>::from_slice(nonce), plaintext)
        .map_err(|e| Error::encryption(format!("encrypt: {e}")))
}

fn open_with<C: Aead + KeyInit>(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher =
        C::new_from_slice(key).map_err(|e| Error::decryption(format!("cipher init: {e}")))?;
    cipher
        .decrypt(Nonce::<C>::from_slice(nonce), ciphertext)
        .map_err(|_| Error::decryption("wrong passphrase or corrupted document"))
}

/// Derive a 32-byte key from a passphrase and salt using Argon2id.
fn derive_key(passphrase: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(KEY_LEN))
        .map_err(|e| Error::encryption(format!("argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase, salt, &mut key)
        .map_err(|e| Error::encryption(format!("argon2 hash: {e}")))?;
    Ok(key)
}

/// A format that encrypts the output of an inner format.
pub struct Encrypted<F> {
    cipher: Cipher,
    passphrase: Zeroizing<Vec<u8>>,
    inner: F,
    extension: String,
}

impl<F: Format> Encrypted<F> {
    /// Wrap `inner`, sealing its bytes with `cipher` under `passphrase`.
    pub fn new(cipher: Cipher, passphrase: impl AsRef<[u8]>, inner: F) -> Self {
        let extension = format!("{}{}", inner.extension(), ENCRYPTED_SUFFIX);
        Self {
            cipher,
            passphrase: Zeroizing::new(passphrase.as_ref().to_vec()),
            inner,
            extension,
        }
    }

    pub fn cipher(&self) -> Cipher {
        self.cipher
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F> fmt::Debug for Encrypted<F>
where
    F: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encrypted")
            .field("cipher", &self.cipher)
            .field("inner", &self.inner)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

impl<F: Format> Format for Encrypted<F> {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn serialize(&self, document: &Document) -> Result<Vec<u8>> {
        let plaintext = Zeroizing::new(self.inner.serialize(document)?);

        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);
        let mut nonce = vec![0u8; self.cipher.nonce_len()];
        rng.fill_bytes(&mut nonce);

        let mut key = derive_key(&self.passphrase, &salt)?;
        let sealed = self.cipher.seal(&key, &nonce, &plaintext);
        key.zeroize();
        let ciphertext = sealed?;

        let mut out = Vec::with_capacity(SALT_LEN + nonce.len() + ciphertext.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Document> {
        let nonce_len = self.cipher.nonce_len();
        if bytes.len() < SALT_LEN + nonce_len {
            return Err(Error::decryption(format!(
                "document too short: {} bytes",
                bytes.len()
            )));
        }

        let (salt, rest) = bytes.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(nonce_len);

        let mut key = derive_key(&self.passphrase, salt)?;
        let opened = self.cipher.open(&key, nonce, ciphertext);
        key.zeroize();
        let plaintext = Zeroizing::new(opened?);

        self.inner.deserialize(&plaintext)
    }
}
