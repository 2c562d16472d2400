//! The blob header: an encrypted chain of key records.
//!
//! On the wire a header is
//!
//! ```text
//! HEADER      := SIZE(4, u32 BE) BASE_IV(16) ENC_HEADER
//! ENC_HEADER  := TAG(16) ENTRY(0) ENTRY(1) … ENTRY(n-1)
//! ENTRY       := KEK_PREV(32) DEK(32)
//! ```
//!
//! `SIZE` counts the whole header, itself included. `ENC_HEADER` is written
//! as a stack of AES-CTR layers: the layer added together with entry `i`
//! covers `TAG ‖ ENTRY(0) … ENTRY(i-1)` (everything that existed at that
//! point), keyed by `ENTRY(i).kek_prev` at counter `base_iv + (i-1)`, and the
//! outermost layer covers the full region under the caller's current KEK at
//! counter `base_iv + (n-1)`. Unmarshalling peels the stack outside-in: each
//! decryption exposes exactly one entry, whose `kek_prev` field is the key
//! for the next layer down. Entry 0 has no predecessor; its `kek_prev` is
//! all zero bytes, and the peel stops structurally when only the tag region
//! is left.

use std::fmt;

use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::cipher;
use crate::error::Error;
use crate::iv::Iv;
use crate::{ENTRY_SIZE, IV_SIZE, KEY_SIZE, TAG_SIZE};

/// Byte length of the plaintext prefix: the size field plus the base IV.
pub(crate) const PLAIN_SIZE: usize = 4 + IV_SIZE;

/// Smallest possible header: plaintext prefix, tag, one entry.
pub(crate) const MIN_HEADER_SIZE: usize = PLAIN_SIZE + TAG_SIZE + ENTRY_SIZE;

/// One layer's key record.
///
/// `kek_prev` is the KEK the header was encrypted under immediately before
/// this layer was added; `dek` is the key that encrypted the payload at this
/// layer. Entry 0 (the AEAD layer) has no predecessor, so its `kek_prev` is
/// all zeros. Key material is erased from memory on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Entry {
    kek_prev: [u8; KEY_SIZE],
    dek: [u8; KEY_SIZE],
}

impl Entry {
    pub fn new(kek_prev: [u8; KEY_SIZE], dek: [u8; KEY_SIZE]) -> Self {
        Self { kek_prev, dek }
    }

    /// The chain's first record: a DEK with a zeroed predecessor KEK.
    pub fn first(dek: [u8; KEY_SIZE]) -> Self {
        Self::new([0u8; KEY_SIZE], dek)
    }

    pub fn kek_prev(&self) -> &[u8; KEY_SIZE] {
        &self.kek_prev
    }

    pub fn dek(&self) -> &[u8; KEY_SIZE] {
        &self.dek
    }

    fn is_first(&self) -> bool {
        self.kek_prev.iter().all(|&b| b == 0)
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.kek_prev);
        out.extend_from_slice(&self.dek);
    }

    /// Parses one entry out of a decrypted 64-byte region.
    fn read_from(bytes: &[u8; ENTRY_SIZE]) -> Self {
        let mut kek_prev = [0u8; KEY_SIZE];
        let mut dek = [0u8; KEY_SIZE];
        kek_prev.copy_from_slice(&bytes[..KEY_SIZE]);
        dek.copy_from_slice(&bytes[KEY_SIZE..]);
        Self::new(kek_prev, dek)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("kek_prev", &"[REDACTED]")
            .field("dek", &"[REDACTED]")
            .finish()
    }
}

/// In-memory form of a blob header: base IV, innermost AEAD tag, and the
/// entry chain, one entry per encryption layer.
#[derive(Debug)]
pub struct Header {
    base_iv: Iv,
    tag: [u8; TAG_SIZE],
    entries: Vec<Entry>,
}

impl Header {
    /// Creates a header with no entries yet. [`Header::marshal`] refuses to
    /// serialize it until at least one entry is added.
    pub fn new(base_iv: Iv, tag: [u8; TAG_SIZE]) -> Self {
        Self {
            base_iv,
            tag,
            entries: Vec::new(),
        }
    }

    pub fn base_iv(&self) -> Iv {
        self.base_iv
    }

    pub fn tag(&self) -> &[u8; TAG_SIZE] {
        &self.tag
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn add_entry(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Total serialized byte length, the value of the wire `SIZE` field.
    pub fn size(&self) -> usize {
        PLAIN_SIZE + TAG_SIZE + ENTRY_SIZE * self.entries.len()
    }

    /// Serializes and encrypts the header under the current external KEK.
    ///
    /// Layers are applied innermost-first: the loop reconstructs each
    /// historical layer from the `kek_prev` recorded when it was added, then
    /// the outermost layer is written under `kek` at `base_iv + (n-1)`.
    ///
    /// # Errors
    /// [`Error::EmptyHeader`] if there are no entries,
    /// [`Error::BadKeySize`] if `kek` is not 32 bytes.
    pub fn marshal(&self, kek: &[u8]) -> Result<Vec<u8>, Error> {
        if self.entries.is_empty() {
            return Err(Error::EmptyHeader);
        }
        if kek.len() != KEY_SIZE {
            return Err(Error::BadKeySize {
                expected: KEY_SIZE,
                got: kek.len(),
            });
        }

        // Plaintext layout of the encrypted region. The buffer holds every
        // key in the chain until the layers are applied, so it is zeroized
        // on drop.
        let mut body = Zeroizing::new(Vec::with_capacity(self.size() - PLAIN_SIZE));
        body.extend_from_slice(&self.tag);
        for entry in &self.entries {
            entry.write_to(&mut body);
        }

        let mut iv = self.base_iv;
        let mut layer_end = TAG_SIZE + ENTRY_SIZE;
        for entry in &self.entries[1..] {
            cipher::ctr_xor(&mut body[..layer_end], entry.kek_prev(), &iv)?;
            layer_end += ENTRY_SIZE;
            iv.inc();
        }
        // layer_end now spans the whole region; the outermost layer belongs
        // to the caller's KEK.
        cipher::ctr_xor(&mut body[..layer_end], kek, &iv)?;

        let mut out = Vec::with_capacity(self.size());
        out.extend_from_slice(&(self.size() as u32).to_be_bytes());
        out.extend_from_slice(self.base_iv.as_bytes());
        out.extend_from_slice(&body);

        debug!(entries = self.entries.len(), size = out.len(), "marshalled header");
        Ok(out)
    }

    /// Decrypts and parses a serialized header using the current external KEK.
    ///
    /// Peels the CTR stack outside-in, recovering one entry per layer; each
    /// entry's `kek_prev` keys the next layer down. The terminal condition is
    /// structural: the peel stops when only the tag region remains.
    ///
    /// # Errors
    /// [`Error::SizeMismatch`] if the size field disagrees with `data`'s
    /// length, [`Error::PartialEntry`] if the encrypted region is not a tag
    /// plus whole entries, [`Error::EmptyHeader`] if it holds no entries,
    /// [`Error::BadKeySize`] if `kek` is not 32 bytes, and the advisory
    /// [`Error::WrongKey`] if the recovered chain does not terminate in a
    /// zero predecessor KEK.
    pub fn unmarshal(data: &[u8], kek: &[u8]) -> Result<Self, Error> {
        if kek.len() != KEY_SIZE {
            return Err(Error::BadKeySize {
                expected: KEY_SIZE,
                got: kek.len(),
            });
        }
        if data.len() < PLAIN_SIZE {
            return Err(Error::SizeMismatch {
                expected: MIN_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let size = u32::from_be_bytes(data[..4].try_into().expect("4-byte slice")) as usize;
        if size != data.len() {
            return Err(Error::SizeMismatch {
                expected: size,
                actual: data.len(),
            });
        }
        let base_iv = Iv::from_slice(&data[4..PLAIN_SIZE])?;

        let body_len = data.len() - PLAIN_SIZE;
        if body_len < TAG_SIZE || (body_len - TAG_SIZE) % ENTRY_SIZE != 0 {
            return Err(Error::PartialEntry(body_len));
        }
        let num_entries = (body_len - TAG_SIZE) / ENTRY_SIZE;
        if num_entries == 0 {
            return Err(Error::EmptyHeader);
        }

        // Working copy of the encrypted region; it turns into key plaintext
        // as the layers come off, so it is zeroized on drop.
        let mut body = Zeroizing::new(data[PLAIN_SIZE..].to_vec());

        let mut iv = base_iv;
        iv.add(num_entries as i64 - 1); // fast-forward to the outermost layer
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(kek);

        // Entries surface outermost-first; collect and reverse at the end.
        let mut entries: Vec<Entry> = Vec::with_capacity(num_entries);
        let mut layer_end = body.len();
        while layer_end > TAG_SIZE {
            cipher::ctr_xor(&mut body[..layer_end], &key[..], &iv)?;

            let entry_start = layer_end - ENTRY_SIZE;
            let raw: &[u8; ENTRY_SIZE] = body[entry_start..layer_end]
                .try_into()
                .expect("entry-sized slice");
            let entry = Entry::read_from(raw);
            key.copy_from_slice(entry.kek_prev());
            entries.push(entry);

            layer_end = entry_start;
            iv.dec();
        }
        entries.reverse();

        // With a wrong KEK the peel yields garbage; the first entry's
        // predecessor is zero only with probability 2^-256. Advisory check,
        // authenticity still rests on the payload tag.
        if !entries[0].is_first() {
            return Err(Error::WrongKey);
        }

        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&body[..TAG_SIZE]);

        debug!(entries = num_entries, size, "unmarshalled header");
        Ok(Self {
            base_iv,
            tag,
            entries,
        })
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "header: {} bytes, {} layers, base iv {:?}",
            self.size(),
            self.entries.len(),
            self.base_iv
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Deterministic key tuples in the style of a key schedule table: KEKs
    // count up, DEKs walk the alphabet.
    fn key_tuple(i: usize) -> ([u8; KEY_SIZE], [u8; KEY_SIZE]) {
        ([b'1' + i as u8; KEY_SIZE], [b'a' + i as u8; KEY_SIZE])
    }

    fn build_header(num_entries: usize) -> Header {
        let mut header = Header::new(Iv::from_u128(1000), [0x5a; TAG_SIZE]);
        header.add_entry(Entry::first(key_tuple(0).1));
        for i in 1..num_entries {
            let (prev_kek, _) = key_tuple(i - 1);
            header.add_entry(Entry::new(prev_kek, key_tuple(i).1));
        }
        header
    }

    fn assert_headers_equal(a: &Header, b: &Header) {
        assert_eq!(a.size(), b.size());
        assert_eq!(a.base_iv(), b.base_iv());
        assert_eq!(a.tag(), b.tag());
        assert_eq!(a.entries().len(), b.entries().len());
        for (x, y) in a.entries().iter().zip(b.entries()) {
            assert_eq!(x.kek_prev(), y.kek_prev());
            assert_eq!(x.dek(), y.dek());
        }
    }

    #[test]
    fn test_marshal_unmarshal_roundtrip_single_entry() {
        let header = build_header(1);
        let (kek, _) = key_tuple(0);
        let data = header.marshal(&kek).unwrap();
        assert_eq!(data.len(), header.size());
        let parsed = Header::unmarshal(&data, &kek).unwrap();
        assert_headers_equal(&header, &parsed);
    }

    #[test]
    fn test_marshal_unmarshal_roundtrip_many_entries() {
        for n in 2..=5 {
            let header = build_header(n);
            let (outer_kek, _) = key_tuple(n - 1);
            let data = header.marshal(&outer_kek).unwrap();
            let parsed = Header::unmarshal(&data, &outer_kek).unwrap();
            assert_headers_equal(&header, &parsed);
        }
    }

    #[test]
    fn test_size_field_and_base_iv_are_plaintext() {
        let header = build_header(3);
        let (kek, _) = key_tuple(2);
        let data = header.marshal(&kek).unwrap();

        let size = u32::from_be_bytes(data[..4].try_into().unwrap()) as usize;
        assert_eq!(size, PLAIN_SIZE + TAG_SIZE + 3 * ENTRY_SIZE);
        assert_eq!(&data[4..PLAIN_SIZE], Iv::from_u128(1000).as_bytes());
    }

    #[test]
    fn test_encrypted_region_hides_tag() {
        let header = build_header(1);
        let (kek, _) = key_tuple(0);
        let data = header.marshal(&kek).unwrap();
        assert_ne!(&data[PLAIN_SIZE..PLAIN_SIZE + TAG_SIZE], header.tag());
    }

    #[test]
    fn test_marshal_empty_header_fails() {
        let header = Header::new(Iv::from_u128(0), [0u8; TAG_SIZE]);
        assert_eq!(header.marshal(&[0x11; KEY_SIZE]).unwrap_err(), Error::EmptyHeader);
    }

    #[test]
    fn test_marshal_short_kek_fails() {
        let header = build_header(1);
        let err = header.marshal(&[0x11; 31]).unwrap_err();
        assert_eq!(
            err,
            Error::BadKeySize {
                expected: KEY_SIZE,
                got: 31
            }
        );
    }

    #[test]
    fn test_unmarshal_wrong_kek_reports_wrong_key() {
        let header = build_header(2);
        let (kek, _) = key_tuple(1);
        let data = header.marshal(&kek).unwrap();
        let err = Header::unmarshal(&data, &[0x77; KEY_SIZE]).unwrap_err();
        assert_eq!(err, Error::WrongKey);
    }

    #[test]
    fn test_unmarshal_size_field_mismatch() {
        let header = build_header(1);
        let (kek, _) = key_tuple(0);
        let mut data = header.marshal(&kek).unwrap();
        data[3] ^= 0x01; // size field no longer matches the data length
        let err = Header::unmarshal(&data, &kek).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
    }

    #[test]
    fn test_unmarshal_partial_entry() {
        let header = build_header(1);
        let (kek, _) = key_tuple(0);
        let mut data = header.marshal(&kek).unwrap();
        // Lop off one byte and fix up the size field so only the entry
        // alignment is wrong.
        data.pop();
        let size = (data.len()) as u32;
        data[..4].copy_from_slice(&size.to_be_bytes());
        let err = Header::unmarshal(&data, &kek).unwrap_err();
        assert!(matches!(err, Error::PartialEntry(_)));
    }

    #[test]
    fn test_unmarshal_no_entries() {
        // A header that is exactly plaintext prefix + tag parses as empty.
        let mut data = Vec::new();
        data.extend_from_slice(&((PLAIN_SIZE + TAG_SIZE) as u32).to_be_bytes());
        data.extend_from_slice(Iv::from_u128(0).as_bytes());
        data.extend_from_slice(&[0u8; TAG_SIZE]);
        let err = Header::unmarshal(&data, &[0x11; KEY_SIZE]).unwrap_err();
        assert_eq!(err, Error::EmptyHeader);
    }

    #[test]
    fn test_unmarshal_truncated_plain_prefix() {
        let err = Header::unmarshal(&[0u8; 10], &[0x11; KEY_SIZE]).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
    }

    #[test]
    fn test_entry_debug_redacts_keys() {
        let entry = Entry::first([0xaa; KEY_SIZE]);
        let rendered = format!("{entry:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("170")); // 0xaa
    }
}
