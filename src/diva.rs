//! Integration layer: a `Diva` pairs a `BoundaryTrie` with the key-width and
//! sizing parameters needed to extract and reconstruct infixes at its
//! boundaries. Construction (`new`/`bulk_load`) samples a boundary every
//! `TARGET_SIZE` keys and hands each interval's slice of the sorted key set
//! to `BoundaryTrie::bulk_load`; everything else delegates to the trie.

use crate::boundary_trie::BoundaryTrie;
use crate::error::{DivaError, Result};
use crate::infix_store::{extract_infix, InfixStore, SIZE_SCALAR, TARGET_SIZE};
use crate::key::{longest_common_prefix_bits, max_boundary, min_boundary, BoundaryKey, Key};

/// `load_factor_alt`, the demotion threshold, is derived rather than
/// user-tunable — callers only get the one FPR-shaped knob.
const LOAD_FACTOR_ALT_RATIO: f64 = 0.5;

/// Fixed canonical key width for instances built without a known key set.
/// Covers `Key::Int` exactly (8-byte big-endian); shorter `Key::Bytes` are
/// zero-padded out to this width (see `canonicalize`).
const DEFAULT_KEY_WIDTH: usize = 8;

/// Bit in the serialized `flags` word marking that every key stored was
/// built from `Key::Int`, i.e. every boundary's canonical width is fixed at
/// `DEFAULT_KEY_WIDTH` rather than inferred from the longest byte key seen.
const FLAG_INTEGER_KEYS: u16 = 1 << 0;

pub struct Diva {
    trie: BoundaryTrie,
    key_width: usize,
    seed: u64,
    integer_keys: bool,
}

impl Diva {
    pub fn new(infix_size: u8, seed: u64, load_factor: f64) -> Self {
        let key_width = DEFAULT_KEY_WIDTH;
        let load_factor_alt = load_factor * LOAD_FACTOR_ALT_RATIO;
        let trie = BoundaryTrie::new(
            min_boundary(key_width),
            max_boundary(key_width),
            infix_size,
            load_factor,
            load_factor_alt,
        );
        Self { trie, key_width, seed, integer_keys: true }
    }

    /// Build directly from a known key set, skipping per-key insertion.
    /// Samples a boundary every `TARGET_SIZE` keys and builds each
    /// interval's infix store from the keys that fall between consecutive
    /// samples.
    pub fn bulk_load<K: Into<Key>>(
        infix_size: u8,
        keys: impl IntoIterator<Item = K>,
        integer_keys: bool,
        seed: u64,
        load_factor: f64,
    ) -> Self {
        let mut canon: Vec<BoundaryKey> =
            keys.into_iter().map(|k| k.into().canonical_bytes().into_owned()).collect();

        let key_width = if integer_keys {
            DEFAULT_KEY_WIDTH
        } else {
            canon.iter().map(|k| k.len()).max().unwrap_or(DEFAULT_KEY_WIDTH).max(DEFAULT_KEY_WIDTH)
        };
        for k in canon.iter_mut() {
            while k.len() < key_width {
                k.push(0);
            }
        }
        canon.sort();
        canon.dedup();

        let load_factor_alt = load_factor * LOAD_FACTOR_ALT_RATIO;

        if canon.is_empty() {
            let trie = BoundaryTrie::new(
                min_boundary(key_width),
                max_boundary(key_width),
                infix_size,
                load_factor,
                load_factor_alt,
            );
            return Self { trie, key_width, seed, integer_keys };
        }

        let stride = TARGET_SIZE.max(1);
        let mut boundaries: Vec<BoundaryKey> = vec![min_boundary(key_width)];
        boundaries.extend(canon.iter().step_by(stride).cloned());
        boundaries.push(max_boundary(key_width));
        boundaries.dedup();
        if boundaries.len() < 2 {
            boundaries = vec![min_boundary(key_width), max_boundary(key_width)];
        }

        let mut stores = Vec::with_capacity(boundaries.len() - 1);
        let mut pos = 0usize;
        for w in boundaries.windows(2) {
            let (l, r) = (&w[0], &w[1]);
            let shared = longest_common_prefix_bits(l, r);
            let mut items = Vec::new();
            while pos < canon.len() && canon[pos].as_slice() < r.as_slice() {
                let (q, rem) = extract_infix(&canon[pos], shared, infix_size);
                items.push((q, rem | 1));
                pos += 1;
            }
            items.sort_by_key(|&(q, _)| q);
            let store = InfixStore::build_from_sorted(&items, infix_size, false, 0, load_factor, load_factor_alt)
                .unwrap_or_else(|_| InfixStore::empty(infix_size, load_factor, load_factor_alt));
            stores.push(store);
        }

        let trie = BoundaryTrie::bulk_load(boundaries, stores, infix_size, load_factor, load_factor_alt);
        Self { trie, key_width, seed, integer_keys }
    }

    /// Reduce a key to its canonical byte form, zero-padded out to this
    /// instance's key width so every stored and queried key is compared at
    /// the same width the boundary trie's sentinels were built for.
    fn canonicalize(&self, key: impl Into<Key>) -> Result<BoundaryKey> {
        let mut bytes = key.into().canonical_bytes().into_owned();
        if bytes.is_empty() {
            return Err(DivaError::KeyTooShort);
        }
        while bytes.len() < self.key_width {
            bytes.push(0);
        }
        Ok(bytes)
    }

    pub fn insert(&mut self, key: impl Into<Key>) -> Result<()> {
        let bytes = self.canonicalize(key)?;
        self.trie.insert(&bytes)
    }

    pub fn delete(&mut self, key: impl Into<Key>) -> bool {
        match self.canonicalize(key) {
            Ok(bytes) => self.trie.delete(&bytes),
            Err(_) => false,
        }
    }

    pub fn point_query(&self, key: impl Into<Key>) -> bool {
        match self.canonicalize(key) {
            Ok(bytes) => self.trie.point_query(&bytes),
            Err(_) => false,
        }
    }

    pub fn range_query(&self, lo: impl Into<Key>, hi: impl Into<Key>) -> bool {
        let (lo, hi) = match (self.canonicalize(lo), self.canonicalize(hi)) {
            (Ok(l), Ok(h)) => (l, h),
            _ => return false,
        };
        self.trie.range_query(&lo, &hi)
    }

    pub fn shrink_infix_size(&mut self, new_size: u8) {
        let _ = self.trie.shrink_infix_size(new_size);
    }

    /// Little-endian container format: `magic:4 | version:2 | flags:2 |
    /// infix_size:4 | seed:8 | load_factor:8 | load_factor_alt:8 |
    /// size_scalar_count:4 | size_scalars[..]:8 each | n_boundaries:8 |`
    /// then, per boundary in ascending order, `boundary_len:4 |
    /// boundary_bytes | store_status:4 | store_slot_word_count:4 |
    /// store_words[..]:8 each`. The key width isn't stored explicitly; a
    /// reader infers it from the first boundary's length.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        const MAGIC: u32 = 0x4149_5644; // "DVIA" read little-endian
        const VERSION: u16 = 1;
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&VERSION.to_le_bytes());

        let flags: u16 = if self.integer_keys { FLAG_INTEGER_KEYS } else { 0 };
        out.extend_from_slice(&flags.to_le_bytes());

        out.extend_from_slice(&(self.trie.infix_size() as u32).to_le_bytes());
        out.extend_from_slice(&self.seed.to_le_bytes());
        out.extend_from_slice(&self.trie.load_factor().to_le_bytes());
        out.extend_from_slice(&self.trie.load_factor_alt().to_le_bytes());

        out.extend_from_slice(&(SIZE_SCALAR.len() as u32).to_le_bytes());
        for scalar in SIZE_SCALAR.iter() {
            out.extend_from_slice(&scalar.to_le_bytes());
        }

        let pairs = self.trie.iter_boundaries();
        out.extend_from_slice(&(pairs.len() as u64).to_le_bytes());
        for (boundary, store) in &pairs {
            out.extend_from_slice(&(boundary.len() as u32).to_le_bytes());
            out.extend_from_slice(boundary);
            store.to_bytes(out);
        }
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        const MAGIC: u32 = 0x4149_5644;
        const VERSION: u16 = 1;

        fn need(buf: &[u8], pos: usize, n: usize) -> Result<()> {
            if buf.len() < pos + n {
                Err(DivaError::Truncated { expected: pos + n, got: buf.len() })
            } else {
                Ok(())
            }
        }

        let mut pos = 0usize;
        need(buf, pos, 4)?;
        let magic = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap());
        if magic != MAGIC {
            return Err(DivaError::BadMagic(magic));
        }
        pos += 4;

        need(buf, pos, 2)?;
        let version = u16::from_le_bytes(buf[pos..pos + 2].try_into().unwrap());
        if version != VERSION {
            return Err(DivaError::BadVersion(version));
        }
        pos += 2;

        need(buf, pos, 2)?;
        let flags = u16::from_le_bytes(buf[pos..pos + 2].try_into().unwrap());
        let integer_keys = flags & FLAG_INTEGER_KEYS != 0;
        pos += 2;

        need(buf, pos, 4)?;
        let infix_size = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as u8;
        pos += 4;

        need(buf, pos, 8)?;
        let seed = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
        pos += 8;

        need(buf, pos, 8)?;
        let load_factor = f64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
        pos += 8;

        need(buf, pos, 8)?;
        let load_factor_alt = f64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
        pos += 8;

        need(buf, pos, 4)?;
        let scalar_count = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        need(buf, pos, scalar_count * 8)?;
        pos += scalar_count * 8; // size scalars are read but this implementation's grade table is fixed

        need(buf, pos, 8)?;
        let count = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap()) as usize;
        pos += 8;

        let mut boundaries = Vec::with_capacity(count);
        let mut stores = Vec::with_capacity(count);
        for _ in 0..count {
            need(buf, pos, 4)?;
            let blen = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            need(buf, pos, blen)?;
            boundaries.push(buf[pos..pos + blen].to_vec());
            pos += blen;

            let (store, consumed) = InfixStore::from_bytes(&buf[pos..], infix_size, load_factor, load_factor_alt)?;
            pos += consumed;
            stores.push(store);
        }

        let key_width = boundaries.first().map(|b| b.len()).unwrap_or(DEFAULT_KEY_WIDTH);
        boundaries.push(max_boundary(key_width));

        let trie = if boundaries.len() < 2 {
            BoundaryTrie::new(min_boundary(key_width), max_boundary(key_width), infix_size, load_factor, load_factor_alt)
        } else {
            BoundaryTrie::bulk_load(boundaries, stores, infix_size, load_factor, load_factor_alt)
        };
        Ok(Self { trie, key_width, seed, integer_keys })
    }

    pub fn size_in_bytes(&self) -> usize {
        let mut out = Vec::new();
        self.serialize(&mut out);
        out.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_query_after_insert() {
        let mut diva = Diva::new(8, 42, 0.95);
        diva.insert(100u64).unwrap();
        diva.insert(200u64).unwrap();
        assert!(diva.point_query(100u64));
        assert!(diva.point_query(200u64));
    }

    #[test]
    fn test_delete() {
        let mut diva = Diva::new(8, 42, 0.95);
        diva.insert(100u64).unwrap();
        assert!(diva.delete(100u64));
        assert!(!diva.delete(100u64));
    }

    #[test]
    fn test_range_query_true_and_false() {
        let mut diva = Diva::new(8, 42, 0.95);
        diva.insert(10u64).unwrap();
        diva.insert(10_000u64).unwrap();
        assert!(diva.range_query(5u64, 20u64));
        assert!(!diva.range_query(11u64, 9_999u64));
    }

    #[test]
    fn test_bulk_load_point_queries() {
        let keys: Vec<u64> = (0..2000u64).map(|i| i * 37).collect();
        let diva = Diva::bulk_load(8, keys.clone(), true, 7, 0.95);
        for &k in keys.iter().step_by(50) {
            assert!(diva.point_query(k));
        }
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut diva = Diva::new(8, 1, 0.95);
        diva.insert(10u64).unwrap();
        diva.insert(20u64).unwrap();
        diva.insert(30u64).unwrap();

        let mut buf = Vec::new();
        diva.serialize(&mut buf);
        let restored = Diva::deserialize(&buf).unwrap();

        assert!(restored.point_query(10u64));
        assert!(restored.point_query(20u64));
        assert!(restored.point_query(30u64));
    }

    #[test]
    fn test_deserialize_rejects_bad_magic() {
        let buf = vec![0u8; 32];
        assert!(matches!(Diva::deserialize(&buf), Err(DivaError::BadMagic(_))));
    }

    #[test]
    fn test_serialized_header_matches_field_widths() {
        let diva = Diva::new(8, 0xABCD_1234_5678_9876, 0.95);
        let mut buf = Vec::new();
        diva.serialize(&mut buf);

        assert_eq!(&buf[0..4], &0x4149_5644u32.to_le_bytes());
        assert_eq!(&buf[4..6], &1u16.to_le_bytes());
        let flags = u16::from_le_bytes(buf[6..8].try_into().unwrap());
        assert_eq!(flags & FLAG_INTEGER_KEYS, FLAG_INTEGER_KEYS);
        let infix_size = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        assert_eq!(infix_size, 8);
        let seed = u64::from_le_bytes(buf[12..20].try_into().unwrap());
        assert_eq!(seed, 0xABCD_1234_5678_9876);
        let load_factor = f64::from_le_bytes(buf[20..28].try_into().unwrap());
        assert_eq!(load_factor, 0.95);
        let load_factor_alt = f64::from_le_bytes(buf[28..36].try_into().unwrap());
        assert_eq!(load_factor_alt, 0.95 * LOAD_FACTOR_ALT_RATIO);
        let scalar_count = u32::from_le_bytes(buf[36..40].try_into().unwrap()) as usize;
        assert_eq!(scalar_count, SIZE_SCALAR.len());
        let scalars_end = 40 + scalar_count * 8;
        let n_boundaries = u64::from_le_bytes(buf[scalars_end..scalars_end + 8].try_into().unwrap());
        assert_eq!(n_boundaries, 1); // one empty store spanning [min, max)
    }

    #[test]
    fn test_shrink_infix_size() {
        let mut diva = Diva::new(10, 3, 0.95);
        diva.insert(500u64).unwrap();
        diva.shrink_infix_size(5);
        assert!(diva.point_query(500u64));
    }

    #[test]
    fn test_string_keys_are_zero_padded_consistently() {
        let mut diva = Diva::new(6, 9, 0.95);
        diva.insert("banana").unwrap();
        diva.insert("cherry").unwrap();
        assert!(diva.point_query("banana"));
        assert!(diva.point_query("cherry"));
        assert!(!diva.point_query("apple!"));
    }

    #[test]
    fn test_max_representable_key_does_not_panic() {
        let mut diva = Diva::new(8, 5, 0.95);
        assert!(!diva.point_query(u64::MAX));
        diva.insert(u64::MAX).unwrap();
        assert!(diva.point_query(u64::MAX));
        assert!(diva.delete(u64::MAX));
        assert!(!diva.point_query(u64::MAX));
    }

    #[test]
    #[ignore]
    fn test_large_scale_no_false_negatives() {
        let keys: Vec<u64> = (0..1_000_000u64).map(|i| i * 3).collect();
        let diva = Diva::bulk_load(8, keys.clone(), true, 123, 0.95);
        for &k in keys.iter().step_by(997) {
            assert!(diva.point_query(k));
        }
    }
}
