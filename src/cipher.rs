//! AES primitive wrappers: key generation, CTR keystream, GCM seal/open.
//!
//! Everything here is a thin composition layer over `ring` (AES-256-GCM and
//! the system RNG) and the `aes`/`ctr` stream cipher stack (AES-256-CTR with
//! big-endian whole-block counter increment). The engine in [`crate::blob`]
//! and the header layering in [`crate::header`] are the only callers.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::Error;
use crate::iv::Iv;
use crate::{IV_SIZE, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// AES-256 in counter mode, stepping the whole 128-bit counter big-endian.
///
/// This must stay in lockstep with the [`Iv`] arithmetic: the engine selects
/// a layer's starting counter with `base_iv + i`, and the keystream for that
/// layer continues from there block by block.
type Aes256Ctr = Ctr128BE<Aes256>;

/// Generates a fresh random AES-256 key.
///
/// # Panics
/// On system RNG failure. An RNG that cannot produce 32 bytes is an
/// unrecoverable fault, not an error the caller can handle.
pub fn gen_key() -> [u8; KEY_SIZE] {
    let rng = SystemRandom::new();
    let mut key = [0u8; KEY_SIZE];
    rng.fill(&mut key).expect("system RNG failure");
    key
}

/// Generates a fresh random 16-byte base IV.
///
/// # Panics
/// On system RNG failure, like [`gen_key`].
pub fn gen_random_iv() -> Iv {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; IV_SIZE];
    rng.fill(&mut bytes).expect("system RNG failure");
    Iv::new(bytes)
}

/// The all-zero AES-GCM nonce.
///
/// Sound here only because every seal uses a fresh random DEK; no key is
/// ever sealed under twice.
pub fn zero_nonce() -> [u8; NONCE_SIZE] {
    [0u8; NONCE_SIZE]
}

/// Applies the AES-256-CTR keystream to `data` in place, starting at `iv`.
///
/// CTR is an XOR stream: encryption and decryption are the same call.
///
/// # Errors
/// [`Error::BadKeySize`] if `key` is not 32 bytes.
pub fn ctr_xor(data: &mut [u8], key: &[u8], iv: &Iv) -> Result<(), Error> {
    let mut cipher =
        Aes256Ctr::new_from_slices(key, iv.as_bytes()).map_err(|_| Error::BadKeySize {
            expected: KEY_SIZE,
            got: key.len(),
        })?;
    cipher.apply_keystream(data);
    Ok(())
}

fn gcm_key(key: &[u8]) -> Result<LessSafeKey, Error> {
    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| Error::BadKeySize {
        expected: KEY_SIZE,
        got: key.len(),
    })?;
    Ok(LessSafeKey::new(unbound))
}

/// Seals `plaintext` with AES-256-GCM, returning `ciphertext ‖ tag`.
///
/// The buffer is encrypted in place and the 16-byte tag appended.
///
/// # Errors
/// [`Error::BadKeySize`] for a non-32-byte key, [`Error::OversizePayload`] if
/// the plaintext exceeds the AES-GCM single-message limit.
pub fn gcm_seal(
    mut plaintext: Vec<u8>,
    key: &[u8],
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
) -> Result<Vec<u8>, Error> {
    let sealing = gcm_key(key)?;
    sealing
        .seal_in_place_append_tag(
            Nonce::assume_unique_for_key(*nonce),
            Aad::from(aad),
            &mut plaintext,
        )
        .map_err(|_| Error::OversizePayload)?;
    Ok(plaintext)
}

/// Opens `ciphertext ‖ tag` produced by [`gcm_seal`], returning the plaintext.
///
/// Consumes the sealed buffer; on failure its contents are discarded, never
/// handed back partially decrypted.
///
/// # Errors
/// [`Error::BadKeySize`] for a non-32-byte key, [`Error::AeadAuthFailed`] on
/// tag mismatch.
pub fn gcm_open(
    mut sealed: Vec<u8>,
    key: &[u8],
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
) -> Result<Vec<u8>, Error> {
    let opening = gcm_key(key)?;
    let plaintext_len = opening
        .open_in_place(
            Nonce::assume_unique_for_key(*nonce),
            Aad::from(aad),
            &mut sealed,
        )
        .map_err(|_| Error::AeadAuthFailed)?
        .len();
    sealed.truncate(plaintext_len);
    Ok(sealed)
}

/// Splits a sealed buffer into its ciphertext and 16-byte tag.
///
/// A 16-byte input is valid: it is the seal of an empty plaintext, and splits
/// into an empty ciphertext plus its tag.
///
/// # Errors
/// [`Error::TooShort`] if the buffer cannot hold a whole tag.
pub fn split_ct_tag(mut sealed: Vec<u8>) -> Result<(Vec<u8>, [u8; TAG_SIZE]), Error> {
    if sealed.len() < TAG_SIZE {
        return Err(Error::TooShort(sealed.len()));
    }
    let tag_start = sealed.len() - TAG_SIZE;
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&sealed[tag_start..]);
    sealed.truncate(tag_start);
    Ok((sealed, tag))
}
