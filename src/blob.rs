//! The blob engine: seal, re-wrap, and unseal.
//!
//! Three operations compose the IV arithmetic, the AES primitives, and the
//! layered header:
//!
//! - [`encrypt`] seals a plaintext under a fresh DEK and wraps that DEK in a
//!   one-entry header encrypted under the caller's KEK.
//! - [`reencrypt`] adds one AES-CTR layer over the payload with a fresh DEK,
//!   records the old KEK in a new header entry, and re-marshals the header
//!   under a freshly generated KEK which becomes the new access credential.
//! - [`decrypt`] peels every CTR layer in reverse and finally opens the
//!   innermost AEAD seal, which is the only authenticity check.
//!
//! All three borrow their inputs and return fresh buffers; caller buffers are
//! never mutated. Each operation is synchronous, CPU-bound, and touches no
//! shared state, so concurrent calls on disjoint inputs need no coordination.

use tracing::debug;
use zeroize::Zeroizing;

use crate::cipher;
use crate::error::Error;
use crate::header::{Entry, Header};
use crate::iv::Iv;
use crate::KEY_SIZE;

/// Splits a blob into its header and payload parts using the size prefix.
///
/// An empty payload is legal: it is what sealing an empty plaintext produces.
///
/// # Errors
/// [`Error::BadBlob`] if the blob cannot hold a size prefix or the prefix
/// exceeds the blob length.
pub fn split_header_payload(blob: &[u8]) -> Result<(&[u8], &[u8]), Error> {
    if blob.len() < 4 {
        return Err(Error::BadBlob {
            header_size: 4,
            blob_len: blob.len(),
        });
    }
    let size = u32::from_be_bytes(blob[..4].try_into().expect("4-byte slice")) as usize;
    if size > blob.len() {
        return Err(Error::BadBlob {
            header_size: size,
            blob_len: blob.len(),
        });
    }
    Ok(blob.split_at(size))
}

/// Seals `plaintext` into a new blob under the caller-supplied KEK.
///
/// A fresh random DEK seals the plaintext with AES-256-GCM under the zero
/// nonce (sound because the DEK is never reused). The resulting tag and DEK
/// go into a one-entry header encrypted under `kek` at counter `base_iv`.
/// The caller keeps `kek`; it is the blob's only access credential.
///
/// # Errors
/// [`Error::BadKeySize`] if `kek` is not 32 bytes,
/// [`Error::OversizePayload`] past the AES-GCM length limit.
pub fn encrypt(plaintext: &[u8], kek: &[u8], base_iv: Iv) -> Result<Vec<u8>, Error> {
    if kek.len() != KEY_SIZE {
        return Err(Error::BadKeySize {
            expected: KEY_SIZE,
            got: kek.len(),
        });
    }

    let dek = Zeroizing::new(cipher::gen_key());
    let sealed = cipher::gcm_seal(plaintext.to_vec(), &dek[..], &cipher::zero_nonce(), &[])?;
    let (payload, tag) = cipher::split_ct_tag(sealed)?;

    let mut header = Header::new(base_iv, tag);
    header.add_entry(Entry::first(*dek));

    let mut blob = header.marshal(kek)?;
    blob.reserve(payload.len());
    blob.extend_from_slice(&payload);

    debug!(
        plaintext_len = plaintext.len(),
        blob_len = blob.len(),
        "sealed new blob"
    );
    Ok(blob)
}

/// Adds one encryption layer to `blob` and rotates its KEK.
///
/// The payload is re-encrypted in place (on an internal copy) with a fresh
/// DEK at counter `base_iv + n`, where `n` is the pre-existing entry count.
/// The entry appended to the header records the KEK the caller supplied, so
/// that decryption can later walk the chain back; the header itself is
/// re-encrypted under the returned KEK, which replaces the caller's copy as
/// the sole access credential. The plaintext is never exposed.
///
/// # Errors
/// Any header parse error from [`Header::unmarshal`], plus
/// [`Error::BadBlob`] for an inconsistent size prefix.
pub fn reencrypt(blob: &[u8], kek: &[u8]) -> Result<(Vec<u8>, [u8; KEY_SIZE]), Error> {
    let (header_bytes, payload) = split_header_payload(blob)?;
    let mut header = Header::unmarshal(header_bytes, kek)?;
    let num_layers = header.entries().len();

    let new_kek = cipher::gen_key();
    let dek = Zeroizing::new(cipher::gen_key());

    let mut kek_prev = [0u8; KEY_SIZE];
    kek_prev.copy_from_slice(kek);
    header.add_entry(Entry::new(kek_prev, *dek));

    // The new layer's slot: base_iv + n, one past the previous outermost.
    let mut iv = header.base_iv();
    iv.add(num_layers as i64);

    let mut payload = payload.to_vec();
    cipher::ctr_xor(&mut payload, &dek[..], &iv)?;

    let mut out = header.marshal(&new_kek)?;
    out.reserve(payload.len());
    out.extend_from_slice(&payload);

    debug!(
        layers = num_layers + 1,
        blob_len = out.len(),
        "re-wrapped blob under rotated KEK"
    );
    Ok((out, new_kek))
}

/// Peels every layer of `blob` and returns the plaintext.
///
/// CTR layers come off outermost-first, each keyed by its entry's DEK at the
/// matching counter; the innermost AEAD seal is opened last with the header's
/// tag re-attached. No plaintext is returned unless that tag verifies.
///
/// # Errors
/// Any header parse error from [`Header::unmarshal`];
/// [`Error::AeadAuthFailed`] if the tag does not verify.
pub fn decrypt(blob: &[u8], kek: &[u8]) -> Result<Vec<u8>, Error> {
    let (header_bytes, payload) = split_header_payload(blob)?;
    let header = Header::unmarshal(header_bytes, kek)?;
    let num_layers = header.entries().len();

    let mut payload = payload.to_vec();
    let mut iv = header.base_iv();
    iv.add(num_layers as i64 - 1); // fast-forward to the outermost slot

    for entry in header.entries()[1..].iter().rev() {
        cipher::ctr_xor(&mut payload, entry.dek(), &iv)?;
        iv.dec();
    }

    payload.extend_from_slice(header.tag());
    let plaintext = cipher::gcm_open(
        payload,
        header.entries()[0].dek(),
        &cipher::zero_nonce(),
        &[],
    )?;

    debug!(
        layers = num_layers,
        plaintext_len = plaintext.len(),
        "unsealed blob"
    );
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_rejects_blob_shorter_than_prefix() {
        let err = split_header_payload(&[0u8; 3]).unwrap_err();
        assert_eq!(
            err,
            Error::BadBlob {
                header_size: 4,
                blob_len: 3
            }
        );
    }

    #[test]
    fn test_split_rejects_size_past_end() {
        let mut blob = vec![0u8; 40];
        blob[..4].copy_from_slice(&41u32.to_be_bytes());
        let err = split_header_payload(&blob).unwrap_err();
        assert_eq!(
            err,
            Error::BadBlob {
                header_size: 41,
                blob_len: 40
            }
        );
    }

    #[test]
    fn test_split_allows_empty_payload() {
        let mut blob = vec![0u8; 40];
        blob[..4].copy_from_slice(&40u32.to_be_bytes());
        let (header, payload) = split_header_payload(&blob).unwrap();
        assert_eq!(header.len(), 40);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_encrypt_rejects_short_kek() {
        let err = encrypt(b"data", &[0u8; 16], Iv::from_u128(0)).unwrap_err();
        assert_eq!(
            err,
            Error::BadKeySize {
                expected: KEY_SIZE,
                got: 16
            }
        );
    }

    #[test]
    fn test_encrypt_does_not_mutate_input() {
        let plaintext = b"immutable caller buffer".to_vec();
        let kek = cipher::gen_key();
        let _ = encrypt(&plaintext, &kek, Iv::from_u128(3)).unwrap();
        assert_eq!(plaintext, b"immutable caller buffer".to_vec());
    }

    #[test]
    fn test_payload_region_differs_after_reencrypt() {
        let kek = cipher::gen_key();
        let blob = encrypt(b"watch the payload churn", &kek, Iv::from_u128(9)).unwrap();
        let (rewrapped, _) = reencrypt(&blob, &kek).unwrap();

        let (_, payload_before) = split_header_payload(&blob).unwrap();
        let (_, payload_after) = split_header_payload(&rewrapped).unwrap();
        assert_eq!(payload_before.len(), payload_after.len());
        assert_ne!(payload_before, payload_after);
    }
}
