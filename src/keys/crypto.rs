//! Cryptographic primitives for account keys.
//!
//! # Algorithms
//!
//! - **Key Generation**: ECDSA secp256k1 or Ed25519
//! - **Master Secret Derivation**: Argon2id (when configured from a passphrase)
//! - **Encryption**: ChaCha20-Poly1305 envelope encryption
//!
//! # Envelope Layout
//!
//! A fresh data key encrypts the private key; the data key itself is
//! sealed under the master secret:
//!
//! ```text
//! version (1) | kek nonce (12) | sealed data key (48) | data nonce (12) | ciphertext
//! ```

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use ed25519_dalek::{Signer as _, Verifier as _};
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Digest as _;
use zeroize::Zeroizing;

use super::{HashAlgorithm, SignatureAlgorithm};
use crate::types::{KeyError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Argon2id memory cost in KiB (64 MB)
pub const ARGON2_MEMORY_KB: u32 = 65536;

/// Argon2id iteration count
pub const ARGON2_ITERATIONS: u32 = 3;

/// Argon2id parallelism (threads)
pub const ARGON2_PARALLELISM: u32 = 4;

/// Minimum salt length for passphrase derivation
pub const MIN_SALT_LEN: usize = 16;

/// Symmetric key length (master secret and data keys)
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// Nonce length for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_LEN: usize = 12;

/// ChaCha20-Poly1305 auth tag length (16 bytes)
pub const AUTH_TAG_LEN: usize = 16;

/// Private key length for both supported curves
pub const PRIVATE_KEY_LEN: usize = 32;

/// Current envelope format version
pub const ENVELOPE_VERSION: u8 = 1;

const SEALED_DATA_KEY_LEN: usize = SYMMETRIC_KEY_LEN + AUTH_TAG_LEN;
const ENVELOPE_HEADER_LEN: usize = 1 + NONCE_LEN + SEALED_DATA_KEY_LEN + NONCE_LEN;

// =============================================================================
// Randomness
// =============================================================================

/// Fill a fixed-size buffer from the OS random number generator.
///
/// Unlike `OsRng::fill_bytes` this reports RNG failure instead of panicking.
pub fn generate_random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| KeyError::Generation(format!("OS randomness unavailable: {e}")))?;
    Ok(bytes)
}

// =============================================================================
// Key Generation
// =============================================================================

/// Generate a new private key and return it with its encoded public key.
///
/// Public keys are encoded as 64 bytes (uncompressed point without the
/// SEC1 prefix) for secp256k1 and 32 bytes for Ed25519.
pub fn generate_keypair(sign_algo: SignatureAlgorithm) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>)> {
    let seed = Zeroizing::new(generate_random_bytes::<PRIVATE_KEY_LEN>()?);
    let secret = Zeroizing::new(seed.to_vec());
    let public_key = public_key_from_private(sign_algo, &secret)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    Ok((secret, public_key))
}

/// Derive the encoded public key for a private key.
pub fn public_key_from_private(sign_algo: SignatureAlgorithm, secret: &[u8]) -> Result<Vec<u8>> {
    match sign_algo {
        SignatureAlgorithm::Ed25519 => Ok(ed25519_signing_key(secret)?
            .verifying_key()
            .to_bytes()
            .to_vec()),
        SignatureAlgorithm::EcdsaSecp256k1 => {
            let signing_key = secp256k1_signing_key(secret)?;
            let point = signing_key.verifying_key().to_encoded_point(false);
            Ok(point.as_bytes()[1..].to_vec())
        }
    }
}

fn ed25519_signing_key(secret: &[u8]) -> Result<ed25519_dalek::SigningKey> {
    let bytes: &[u8; PRIVATE_KEY_LEN] = secret.try_into().map_err(|_| {
        KeyError::Signing(format!(
            "invalid Ed25519 key length: expected {}, got {}",
            PRIVATE_KEY_LEN,
            secret.len()
        ))
    })?;
    Ok(ed25519_dalek::SigningKey::from_bytes(bytes))
}

fn secp256k1_signing_key(secret: &[u8]) -> Result<k256::ecdsa::SigningKey> {
    k256::ecdsa::SigningKey::from_slice(secret)
        .map_err(|e| KeyError::Signing(format!("invalid secp256k1 key: {e}")))
}

// =============================================================================
// Hashing / Signing
// =============================================================================

/// Hash a message with the given algorithm.
pub fn hash_message(hash_algo: HashAlgorithm, message: &[u8]) -> Vec<u8> {
    match hash_algo {
        HashAlgorithm::Sha3_256 => sha3::Sha3_256::digest(message).to_vec(),
        HashAlgorithm::Sha2_256 => sha2::Sha256::digest(message).to_vec(),
    }
}

/// Sign a message with a local private key.
///
/// ECDSA signs the digest of the message and returns `r || s` (64 bytes).
/// Ed25519 signs the message itself (64 bytes).
pub fn sign_message(
    sign_algo: SignatureAlgorithm,
    hash_algo: HashAlgorithm,
    secret: &[u8],
    message: &[u8],
) -> Result<Vec<u8>> {
    match sign_algo {
        SignatureAlgorithm::Ed25519 => {
            let signing_key = ed25519_signing_key(secret)?;
            Ok(signing_key.sign(message).to_bytes().to_vec())
        }
        SignatureAlgorithm::EcdsaSecp256k1 => {
            let signing_key = secp256k1_signing_key(secret)?;
            let digest = hash_message(hash_algo, message);
            let signature: k256::ecdsa::Signature = signing_key
                .sign_prehash(&digest)
                .map_err(|e| KeyError::Signing(format!("ECDSA signing failed: {e}")))?;
            Ok(signature.to_bytes().to_vec())
        }
    }
}

/// Verify a signature produced by [`sign_message`] or a remote signer.
pub fn verify_signature(
    sign_algo: SignatureAlgorithm,
    hash_algo: HashAlgorithm,
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> bool {
    match sign_algo {
        SignatureAlgorithm::Ed25519 => {
            let Ok(bytes) = <&[u8; 32]>::try_from(public_key) else {
                return false;
            };
            let Ok(verifying_key) = ed25519_dalek::VerifyingKey::from_bytes(bytes) else {
                return false;
            };
            let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
                return false;
            };
            verifying_key.verify(message, &signature).is_ok()
        }
        SignatureAlgorithm::EcdsaSecp256k1 => {
            let mut sec1 = Vec::with_capacity(public_key.len() + 1);
            sec1.push(0x04);
            sec1.extend_from_slice(public_key);
            let Ok(verifying_key) = k256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1) else {
                return false;
            };
            let Ok(signature) = k256::ecdsa::Signature::from_slice(signature) else {
                return false;
            };
            let digest = hash_message(hash_algo, message);
            verifying_key.verify_prehash(&digest, &signature).is_ok()
        }
    }
}

// =============================================================================
// Master Secret Derivation
// =============================================================================

/// Derive a 256-bit master secret from a passphrase using Argon2id.
pub fn derive_key_encryption_key(
    passphrase: &[u8],
    salt: &[u8],
) -> Result<Zeroizing<[u8; SYMMETRIC_KEY_LEN]>> {
    if salt.len() < MIN_SALT_LEN {
        return Err(KeyError::Config(format!(
            "salt must be at least {MIN_SALT_LEN} bytes, got {}",
            salt.len()
        )));
    }

    let params = Params::new(
        ARGON2_MEMORY_KB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(SYMMETRIC_KEY_LEN),
    )
    .map_err(|e| KeyError::Config(format!("Invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
    argon2
        .hash_password_into(passphrase, salt, &mut key[..])
        .map_err(|e| KeyError::Config(format!("Key derivation failed: {e}")))?;

    Ok(key)
}

// =============================================================================
// Envelope Encryption
// =============================================================================

fn seal(key: &[u8; SYMMETRIC_KEY_LEN], nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| KeyError::Encoding(format!("Encryption failed: {e}")))
}

fn open(
    key: &[u8; SYMMETRIC_KEY_LEN],
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| {
            KeyError::Decryption("authentication failed (wrong master secret or tampered value)".into())
        })
}

/// Encrypt plaintext key material under a fresh data key sealed by `kek`.
pub fn envelope_encrypt(kek: &[u8; SYMMETRIC_KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let data_key = Zeroizing::new(
        generate_random_bytes::<SYMMETRIC_KEY_LEN>()
            .map_err(|e| KeyError::Encoding(e.to_string()))?,
    );
    let kek_nonce: [u8; NONCE_LEN] =
        generate_random_bytes().map_err(|e| KeyError::Encoding(e.to_string()))?;
    let data_nonce: [u8; NONCE_LEN] =
        generate_random_bytes().map_err(|e| KeyError::Encoding(e.to_string()))?;

    let sealed_data_key = seal(kek, &kek_nonce, data_key.as_slice())?;
    let ciphertext = seal(&data_key, &data_nonce, plaintext)?;

    let mut envelope = Vec::with_capacity(ENVELOPE_HEADER_LEN + ciphertext.len());
    envelope.push(ENVELOPE_VERSION);
    envelope.extend_from_slice(&kek_nonce);
    envelope.extend_from_slice(&sealed_data_key);
    envelope.extend_from_slice(&data_nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt an envelope produced by [`envelope_encrypt`].
///
/// # Errors
///
/// Returns [`KeyError::Decryption`] if:
/// - The envelope is truncated or has an unknown version
/// - The master secret is wrong
/// - Any part of the envelope was tampered with
pub fn envelope_decrypt(
    kek: &[u8; SYMMETRIC_KEY_LEN],
    envelope: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if envelope.len() < ENVELOPE_HEADER_LEN + AUTH_TAG_LEN {
        return Err(KeyError::Decryption(format!(
            "envelope too short: {} bytes",
            envelope.len()
        )));
    }
    if envelope[0] != ENVELOPE_VERSION {
        return Err(KeyError::Decryption(format!(
            "unsupported envelope version {}",
            envelope[0]
        )));
    }

    let (kek_nonce, rest) = envelope[1..].split_at(NONCE_LEN);
    let (sealed_data_key, rest) = rest.split_at(SEALED_DATA_KEY_LEN);
    let (data_nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let data_key_bytes = open(kek, kek_nonce, sealed_data_key)?;
    let mut data_key = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
    data_key.copy_from_slice(&data_key_bytes);

    open(&data_key, data_nonce, ciphertext)
}

// =============================================================================
// Tests
// =============================================================================
