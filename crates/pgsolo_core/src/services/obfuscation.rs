//! Reversible obfuscation of secrets stored in configuration files.
//!
//! **This is not a security boundary.** The key is derived from a passphrase compiled
//! into this crate, so anyone holding the binary (or this source) can decode every
//! value. The only purpose is to keep a literal clear-text password out of a config
//! file that is read over someone's shoulder or pasted into a ticket. Use a secrets
//! manager when confidentiality matters.
//!
//! Two encodings exist:
//!
//! - **Legacy**: AES-256-CTR with the key and counter block derived from the
//!   passphrase the way OpenSSL's `EVP_BytesToKey` does (MD5, one round, no salt),
//!   encoded as `hex(ciphertext)`. The same input always produces the same output,
//!   and values written by older tooling decode unchanged.
//! - **IV-tagged**: AES-256-GCM under `SHA-256(passphrase)` with a fresh random IV
//!   per call, encoded as `hex(iv)::hex(ciphertext)`. Encoding the same input twice
//!   produces different strings.
//!
//! [`decode_secret`] tells the two apart by the `::` delimiter, which never appears
//! in hex output.

use crate::error::{SoloError, SoloResult};

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use md5::{Digest, Md5};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Built-in passphrase both keys are derived from.
const PASSPHRASE: &[u8] = b"X3f18bH!";

const LEGACY_KEY_LEN: usize = 32;
const LEGACY_IV_LEN: usize = 16;

/// Separator between the IV and the cipher text in IV-tagged encodings.
pub const IV_DELIMITER: &str = "::";

const IV_AAD: &[u8] = b"pgsolo:iv";

/// Encoding scheme of an obfuscated secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Deterministic, no IV
    Legacy,
    /// Random IV carried alongside the cipher text
    WithIv,
}

/// A parsed obfuscated secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObfuscatedSecret {
    /// Legacy encoding
    Legacy {
        /// Cipher text, same length as the clear text
        ciphertext: Vec<u8>,
    },
    /// IV-tagged encoding
    WithIv {
        /// Initialization vector
        iv: [u8; NONCE_LEN],
        /// Cipher text with authentication tag
        ciphertext: Vec<u8>,
    },
}

impl ObfuscatedSecret {
    /// Parse an encoded secret, detecting its scheme from the delimiter.
    pub fn parse(encoded: &str) -> SoloResult<Self> {
        match encoded.split_once(IV_DELIMITER) {
            Some((iv_hex, ct_hex)) => {
                let iv = hex::decode(iv_hex)
                    .map_err(|e| SoloError::obfuscation(format!("invalid IV hex: {e}")))?;
                let iv: [u8; NONCE_LEN] = iv.try_into().map_err(|v: Vec<u8>| {
                    SoloError::obfuscation(format!(
                        "IV must be {NONCE_LEN} bytes, got {}",
                        v.len()
                    ))
                })?;
                let ciphertext = hex::decode(ct_hex)
                    .map_err(|e| SoloError::obfuscation(format!("invalid cipher text hex: {e}")))?;
                Ok(Self::WithIv { iv, ciphertext })
            }
            None => {
                let ciphertext = hex::decode(encoded)
                    .map_err(|e| SoloError::obfuscation(format!("invalid cipher text hex: {e}")))?;
                Ok(Self::Legacy { ciphertext })
            }
        }
    }

    /// Get the scheme this secret was encoded with.
    pub fn scheme(&self) -> Scheme {
        match self {
            Self::Legacy { .. } => Scheme::Legacy,
            Self::WithIv { .. } => Scheme::WithIv,
        }
    }

    /// Recover the clear text.
    pub fn reveal(&self) -> SoloResult<String> {
        let plain = match self {
            Self::Legacy { ciphertext } => {
                let mut in_out = ciphertext.clone();
                legacy_keystream(&mut in_out)?;
                in_out
            }
            Self::WithIv { iv, ciphertext } => {
                let mut in_out = ciphertext.clone();
                let nonce = Nonce::assume_unique_for_key(*iv);
                let plain = obfuscation_key()?
                    .open_in_place(nonce, Aad::from(IV_AAD), &mut in_out)
                    .map_err(|_| {
                        SoloError::obfuscation("secret does not decode under the built-in key")
                    })?;
                plain.to_vec()
            }
        };

        String::from_utf8(plain)
            .map_err(|_| SoloError::obfuscation("decoded secret is not valid UTF-8"))
    }
}

impl std::fmt::Display for ObfuscatedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy { ciphertext } => f.write_str(&hex::encode(ciphertext)),
            Self::WithIv { iv, ciphertext } => {
                write!(f, "{}{IV_DELIMITER}{}", hex::encode(iv), hex::encode(ciphertext))
            }
        }
    }
}

/// Derive the legacy key and counter block like `EVP_BytesToKey(MD5, no salt, 1)`:
/// `D1 = MD5(passphrase)`, `Dn = MD5(Dn-1 || passphrase)`, concatenated until the
/// key and IV are filled.
fn legacy_key_iv() -> ([u8; LEGACY_KEY_LEN], [u8; LEGACY_IV_LEN]) {
    let mut material = Vec::with_capacity(LEGACY_KEY_LEN + LEGACY_IV_LEN);
    let mut block: Vec<u8> = Vec::new();
    while material.len() < LEGACY_KEY_LEN + LEGACY_IV_LEN {
        let mut hasher = Md5::new();
        hasher.update(&block);
        hasher.update(PASSPHRASE);
        block = hasher.finalize().to_vec();
        material.extend_from_slice(&block);
    }

    let mut key = [0u8; LEGACY_KEY_LEN];
    let mut iv = [0u8; LEGACY_IV_LEN];
    key.copy_from_slice(&material[..LEGACY_KEY_LEN]);
    iv.copy_from_slice(&material[LEGACY_KEY_LEN..LEGACY_KEY_LEN + LEGACY_IV_LEN]);
    (key, iv)
}

/// Apply the legacy keystream in place. Encoding and decoding are the same operation.
fn legacy_keystream(data: &mut [u8]) -> SoloResult<()> {
    let (key, iv) = legacy_key_iv();
    let mut cipher = Aes256Ctr::new_from_slices(&key, &iv)
        .map_err(|_| SoloError::internal("failed to build legacy cipher"))?;
    cipher.apply_keystream(data);
    Ok(())
}

fn obfuscation_key() -> SoloResult<LessSafeKey> {
    let key_bytes = digest(&SHA256, PASSPHRASE);
    let unbound = UnboundKey::new(&AES_256_GCM, key_bytes.as_ref())
        .map_err(|_| SoloError::internal("failed to build obfuscation key"))?;
    Ok(LessSafeKey::new(unbound))
}

fn seal(clear: &str, nonce: [u8; NONCE_LEN]) -> SoloResult<Vec<u8>> {
    let mut in_out = clear.as_bytes().to_vec();
    let nonce = Nonce::assume_unique_for_key(nonce);
    obfuscation_key()?
        .seal_in_place_append_tag(nonce, Aad::from(IV_AAD), &mut in_out)
        .map_err(|_| SoloError::internal("failed to obfuscate secret"))?;
    Ok(in_out)
}

/// Obfuscate a secret with the deterministic legacy scheme.
pub fn encode_secret_legacy(clear: &str) -> SoloResult<String> {
    let mut ciphertext = clear.as_bytes().to_vec();
    legacy_keystream(&mut ciphertext)?;
    Ok(ObfuscatedSecret::Legacy { ciphertext }.to_string())
}

/// Decode a secret produced by [`encode_secret_legacy`].
pub fn decode_secret_legacy(encoded: &str) -> SoloResult<String> {
    match ObfuscatedSecret::parse(encoded)? {
        secret @ ObfuscatedSecret::Legacy { .. } => secret.reveal(),
        ObfuscatedSecret::WithIv { .. } => {
            Err(SoloError::obfuscation("expected a legacy secret, found an IV-tagged one"))
        }
    }
}

/// Obfuscate a secret with a fresh random IV.
pub fn encode_secret_with_iv(clear: &str) -> SoloResult<String> {
    let mut iv = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut iv)
        .map_err(|_| SoloError::internal("failed to generate IV"))?;
    let ciphertext = seal(clear, iv)?;
    Ok(ObfuscatedSecret::WithIv { iv, ciphertext }.to_string())
}

/// Decode a secret produced by [`encode_secret_with_iv`].
pub fn decode_secret_with_iv(encoded: &str) -> SoloResult<String> {
    match ObfuscatedSecret::parse(encoded)? {
        secret @ ObfuscatedSecret::WithIv { .. } => secret.reveal(),
        ObfuscatedSecret::Legacy { .. } => {
            Err(SoloError::obfuscation("expected an IV-tagged secret, found a legacy one"))
        }
    }
}

/// Decode a secret produced by either scheme.
pub fn decode_secret(encoded: &str) -> SoloResult<String> {
    let secret = ObfuscatedSecret::parse(encoded)?;
    tracing::trace!(scheme = ?secret.scheme(), "Decoding obfuscated secret");
    secret.reveal()
}
