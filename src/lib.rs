//! # rewrap
//!
//! Nested re-encryption of byte blobs. A sealed blob can be re-wrapped under
//! fresh key material any number of times without ever exposing the
//! plaintext; decryption peels all layers back in one pass. The access
//! credential (the key-encryption key, KEK) rotates on every re-wrap.
//!
//! ## Blob format
//!
//! ```text
//! BLOB        := HEADER PAYLOAD
//! HEADER      := SIZE(4, u32 BE) BASE_IV(16) ENC_HEADER
//! ENC_HEADER  := TAG(16) ENTRY(0) ENTRY(1) … ENTRY(n-1)   -- n CTR layers deep
//! ENTRY       := KEK_PREV(32) DEK(32)
//! PAYLOAD     := AES-GCM ciphertext under (n-1) AES-CTR layers
//! ```
//!
//! Layer 0 is an AES-256-GCM seal with a fresh random data-encryption key
//! (DEK); its 16-byte tag lives in the header and is the blob's only
//! authenticity anchor. Every re-wrap XORs one more AES-256-CTR keystream
//! over the payload with a fresh DEK at counter `BASE_IV + layer`, and adds
//! one header entry recording that DEK together with the KEK being retired.
//! The header itself is encrypted in the same concentric fashion, so the
//! single current KEK unlocks the whole chain.
//!
//! Intermediate CTR layers are deliberately unauthenticated; tampering is
//! only detected when the innermost tag is checked at decryption time.
//!
//! ## Quick start
//!
//! ```rust
//! use rewrap::{decrypt, encrypt, gen_key, gen_random_iv, reencrypt};
//!
//! let kek = gen_key();
//! let blob = encrypt(b"attack at dawn", &kek, gen_random_iv()).unwrap();
//!
//! // Rotate the credential: the old KEK stops working.
//! let (blob, kek) = reencrypt(&blob, &kek).unwrap();
//!
//! assert_eq!(decrypt(&blob, &kek).unwrap(), b"attack at dawn");
//! ```

pub mod blob;
pub mod cipher;
pub mod error;
pub mod header;
pub mod iv;

pub use blob::{decrypt, encrypt, reencrypt, split_header_payload};
pub use cipher::{gen_key, gen_random_iv};
pub use error::Error;
pub use header::{Entry, Header};
pub use iv::Iv;

/// AES-256 key length in bytes; DEKs and KEKs are both this size.
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce length in bytes.
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_SIZE: usize = 16;

/// CTR counter / base IV length in bytes.
pub const IV_SIZE: usize = 16;

/// Serialized header entry length: a predecessor KEK plus a DEK.
pub const ENTRY_SIZE: usize = 2 * KEY_SIZE;
