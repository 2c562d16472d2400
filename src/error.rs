//! Error types for blob and header operations.

use thiserror::Error;

/// Errors surfaced by the re-encryption engine.
///
/// Every variant is recoverable and propagated to the caller. RNG failure is
/// the one fatal condition; it panics inside key generation instead of
/// appearing here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A KEK, DEK, IV, or tag buffer has the wrong length.
    #[error("bad key size: expected {expected} bytes, got {got}")]
    BadKeySize { expected: usize, got: usize },

    /// The blob's size prefix is inconsistent with the blob length.
    #[error("blob of {blob_len} bytes cannot hold a header of {header_size} bytes")]
    BadBlob { header_size: usize, blob_len: usize },

    /// The header size field does not match the header byte length.
    #[error("header size field says {expected} bytes but header data is {actual} bytes")]
    SizeMismatch { expected: usize, actual: usize },

    /// The encrypted header region is not a tag followed by whole entries.
    #[error("encrypted header region of {0} bytes holds a partial entry")]
    PartialEntry(usize),

    /// The header contains no entries.
    #[error("header has zero entries")]
    EmptyHeader,

    /// The innermost AEAD tag failed to verify: wrong key chain, corrupted
    /// payload, or tampered blob.
    #[error("payload authentication failed")]
    AeadAuthFailed,

    /// A sealed buffer is shorter than the AEAD tag it must carry.
    #[error("sealed buffer too short: {0} bytes")]
    TooShort(usize),

    /// Peeling the header produced a first entry whose predecessor KEK is not
    /// zero, which means the supplied KEK (or some key in the chain) is wrong.
    ///
    /// Advisory only: authenticity is established solely by the payload's
    /// AEAD tag.
    #[error("wrong key: header chain does not terminate in a zero predecessor KEK")]
    WrongKey,

    /// The plaintext exceeds the AES-GCM single-message length limit.
    #[error("payload exceeds the AES-GCM length limit")]
    OversizePayload,
}
