//! Concurrent ordered map from boundary keys to infix stores. Structured as
//! a small concurrent B+tree: a root `RwLock<Arc<TrieSnapshot>>` published
//! atomically on structural change, with `Arc` refcounting giving readers a
//! stable snapshot to traverse, and a per-leaf `RwLock` guarding in-place
//! mutation that doesn't change the set of leaves.

use std::sync::{Arc, Mutex, RwLock};

use crate::error::Result;
use crate::infix_store::{extract_infix, InfixStore};
use crate::key::{longest_common_prefix_bits, BoundaryKey};

/// Maximum number of boundaries (one more than stores) a leaf may carry
/// before it is split structurally.
const LEAF_MAX_BOUNDARIES: usize = 64;
/// Minimum number of boundaries a leaf may carry before it is merged with a
/// neighbor, below which point-lookup latency would be dominated by root
/// traversal rather than the per-leaf binary search it's meant to amortize.
const LEAF_MIN_BOUNDARIES: usize = 8;
/// Bulk load packs each leaf to about 80% of capacity.
const LEAF_TARGET_BOUNDARIES: usize = (LEAF_MAX_BOUNDARIES * 4) / 5;

struct TrieSnapshot {
    /// Sorted by `leaf.min`; `leaves[i].max == leaves[i + 1].min`.
    leaves: Vec<Arc<Leaf>>,
}

struct Leaf {
    /// Immutable for the leaf's lifetime — only structural split/merge
    /// replaces a leaf outright; leaf-internal operations only touch the
    /// interior boundaries strictly between `min` and `max`.
    min: BoundaryKey,
    max: BoundaryKey,
    guard: RwLock<LeafData>,
}

struct LeafData {
    /// Sorted ascending, `boundaries.len() == stores.len() + 1`.
    boundaries: Vec<BoundaryKey>,
    stores: Vec<InfixStore>,
}

impl LeafData {
    /// Index `i` such that `boundaries[i] <= key < boundaries[i + 1]`, for
    /// any `key` in `[boundaries[0], boundaries.last()]` inclusive. A key
    /// equal to the final boundary (the leaf's max sentinel) still maps to
    /// the last store rather than one past it.
    fn store_index_for(&self, key: &[u8]) -> usize {
        let idx = self.boundaries.partition_point(|b| b.as_slice() <= key).saturating_sub(1);
        idx.min(self.stores.len() - 1)
    }
}

pub struct BoundaryTrie {
    root: RwLock<Arc<TrieSnapshot>>,
    meta_lock: Mutex<()>,
    infix_size: u8,
    load_factor: f64,
    load_factor_alt: f64,
}

impl BoundaryTrie {
    pub fn new(min: BoundaryKey, max: BoundaryKey, infix_size: u8, load_factor: f64, load_factor_alt: f64) -> Self {
        let store = InfixStore::empty(infix_size, load_factor, load_factor_alt);
        let leaf = Arc::new(Leaf {
            min: min.clone(),
            max: max.clone(),
            guard: RwLock::new(LeafData {
                boundaries: vec![min, max],
                stores: vec![store],
            }),
        });
        Self {
            root: RwLock::new(Arc::new(TrieSnapshot { leaves: vec![leaf] })),
            meta_lock: Mutex::new(()),
            infix_size,
            load_factor,
            load_factor_alt,
        }
    }

    /// Build a trie directly from pre-sorted boundaries and their
    /// corresponding pre-built infix stores. Skips per-key insertion
    /// entirely, greedily packing leaves to about 80% of capacity.
    pub fn bulk_load(
        boundaries: Vec<BoundaryKey>,
        stores: Vec<InfixStore>,
        infix_size: u8,
        load_factor: f64,
        load_factor_alt: f64,
    ) -> Self {
        assert_eq!(boundaries.len(), stores.len() + 1);
        let mut leaves = Vec::new();
        let mut start = 0usize;
        while start < stores.len() {
            let end = (start + LEAF_TARGET_BOUNDARIES).min(stores.len());
            let leaf_boundaries = boundaries[start..=end].to_vec();
            let leaf_stores = stores[start..end].to_vec();
            leaves.push(Arc::new(Leaf {
                min: leaf_boundaries[0].clone(),
                max: leaf_boundaries[leaf_boundaries.len() - 1].clone(),
                guard: RwLock::new(LeafData {
                    boundaries: leaf_boundaries,
                    stores: leaf_stores,
                }),
            }));
            start = end;
        }
        Self {
            root: RwLock::new(Arc::new(TrieSnapshot { leaves })),
            meta_lock: Mutex::new(()),
            infix_size,
            load_factor,
            load_factor_alt,
        }
    }

    fn leaf_for(snapshot: &TrieSnapshot, key: &[u8]) -> Arc<Leaf> {
        let idx = snapshot.leaves.partition_point(|l| l.min.as_slice() <= key).saturating_sub(1);
        snapshot.leaves[idx].clone()
    }

    pub fn point_query(&self, key: &[u8]) -> bool {
        let snapshot = self.root.read().unwrap().clone();
        let leaf = Self::leaf_for(&snapshot, key);
        debug_assert!(key < leaf.max.as_slice(), "leaf_for returned a leaf that doesn't span key");
        let data = leaf.guard.read().unwrap();
        let idx = data.store_index_for(key);
        let l = &data.boundaries[idx];
        let r = &data.boundaries[idx + 1];
        let shared = longest_common_prefix_bits(l, r);
        let (q, rem) = extract_infix(key, shared, self.infix_size);
        data.stores[idx].point_query(q, rem)
    }

    /// `lo` and `hi` are both inclusive.
    pub fn range_query(&self, lo: &[u8], hi: &[u8]) -> bool {
        let snapshot = self.root.read().unwrap().clone();
        if snapshot.leaves.is_empty() {
            return false;
        }
        let mut leaf_idx = snapshot.leaves.partition_point(|l| l.min.as_slice() <= lo).saturating_sub(1);
        let mut data = snapshot.leaves[leaf_idx].guard.read().unwrap();
        let mut store_idx = data.store_index_for(lo);

        loop {
            let l = data.boundaries[store_idx].clone();
            let r = data.boundaries[store_idx + 1].clone();
            if l.as_slice() > hi {
                return false;
            }
            let clamp_lo: &[u8] = if lo > l.as_slice() { lo } else { &l };
            let clamp_hi: &[u8] = if hi < r.as_slice() { hi } else { &r };
            let shared = longest_common_prefix_bits(&l, &r);
            let (q_lo, r_lo) = extract_infix(clamp_lo, shared, self.infix_size);
            let (q_hi, r_hi) = extract_infix(clamp_hi, shared, self.infix_size);
            if data.stores[store_idx].range_query(q_lo, r_lo, q_hi, r_hi) {
                return true;
            }
            if r.as_slice() > hi {
                return false;
            }
            store_idx += 1;
            if store_idx + 1 >= data.boundaries.len() {
                leaf_idx += 1;
                if leaf_idx >= snapshot.leaves.len() {
                    return false;
                }
                data = snapshot.leaves[leaf_idx].guard.read().unwrap();
                store_idx = 0;
            }
        }
    }

    pub fn insert(&self, key: &[u8]) -> Result<()> {
        let snapshot = self.root.read().unwrap().clone();
        let leaf = Self::leaf_for(&snapshot, key);
        let needs_structural_split = {
            let mut data = leaf.guard.write().unwrap();
            let idx = data.store_index_for(key);
            let l = data.boundaries[idx].clone();
            let r = data.boundaries[idx + 1].clone();
            let shared = longest_common_prefix_bits(&l, &r);
            let (q, rem) = extract_infix(key, shared, self.infix_size);

            match data.stores[idx].insert(q, rem) {
                Ok(()) => {}
                Err(crate::error::DivaError::OutOfMemory) => {
                    let (left_store, right_store) = data.stores[idx].split(&l, key, &r)?;
                    data.stores[idx] = left_store;
                    data.stores.insert(idx + 1, right_store);
                    data.boundaries.insert(idx + 1, key.to_vec());

                    let idx2 = data.store_index_for(key);
                    let l2 = data.boundaries[idx2].clone();
                    let r2 = data.boundaries[idx2 + 1].clone();
                    let shared2 = longest_common_prefix_bits(&l2, &r2);
                    let (q2, rem2) = extract_infix(key, shared2, self.infix_size);
                    data.stores[idx2].insert(q2, rem2)?;
                }
                Err(e) => return Err(e),
            }
            data.boundaries.len() > LEAF_MAX_BOUNDARIES
        };
        if needs_structural_split {
            self.structural_split(&leaf)?;
        }
        Ok(())
    }

    pub fn delete(&self, key: &[u8]) -> bool {
        let snapshot = self.root.read().unwrap().clone();
        let leaf = Self::leaf_for(&snapshot, key);
        let (removed, needs_structural_merge) = {
            let mut data = leaf.guard.write().unwrap();
            let idx = data.store_index_for(key);
            let l = data.boundaries[idx].clone();
            let r = data.boundaries[idx + 1].clone();
            let shared = longest_common_prefix_bits(&l, &r);
            let (q, rem) = extract_infix(key, shared, self.infix_size);
            let removed = data.stores[idx].delete(q, rem);
            if removed && data.stores[idx].elem_count() == 0 && data.stores.len() > 1 {
                Self::try_merge_in_leaf(&mut data, idx);
            }
            (removed, data.boundaries.len() < LEAF_MIN_BOUNDARIES)
        };
        if needs_structural_merge {
            let _ = self.structural_merge(&leaf);
        }
        removed
    }

    /// Merge the now-empty store at `idx` with an adjacent one in the same
    /// leaf, dropping the boundary between them.
    fn try_merge_in_leaf(data: &mut LeafData, idx: usize) {
        let neighbor = if idx + 1 < data.stores.len() {
            idx
        } else if idx > 0 {
            idx - 1
        } else {
            return;
        };
        let l = data.boundaries[neighbor].clone();
        let mid = data.boundaries[neighbor + 1].clone();
        let r = data.boundaries[neighbor + 2].clone();
        let merged = match InfixStore::merge(&data.stores[neighbor], &l, &mid, &data.stores[neighbor + 1], &r) {
            Ok(m) => m,
            Err(_) => return,
        };
        data.stores[neighbor] = merged;
        data.stores.remove(neighbor + 1);
        data.boundaries.remove(neighbor + 1);
    }

    fn structural_split(&self, leaf: &Arc<Leaf>) -> Result<()> {
        let _guard = self.meta_lock.lock().unwrap();
        let mut current = self.root.write().unwrap();
        let Some(pos) = current.leaves.iter().position(|l| Arc::ptr_eq(l, leaf)) else {
            return Ok(());
        };
        let data = leaf.guard.read().unwrap();
        if data.boundaries.len() <= LEAF_MAX_BOUNDARIES {
            return Ok(());
        }
        let mid = data.boundaries.len() / 2;
        let left_boundaries = data.boundaries[..=mid].to_vec();
        let left_stores = data.stores[..mid].to_vec();
        let right_boundaries = data.boundaries[mid..].to_vec();
        let right_stores = data.stores[mid..].to_vec();
        drop(data);

        let left_leaf = Arc::new(Leaf {
            min: left_boundaries[0].clone(),
            max: left_boundaries[left_boundaries.len() - 1].clone(),
            guard: RwLock::new(LeafData { boundaries: left_boundaries, stores: left_stores }),
        });
        let right_leaf = Arc::new(Leaf {
            min: right_boundaries[0].clone(),
            max: right_boundaries[right_boundaries.len() - 1].clone(),
            guard: RwLock::new(LeafData { boundaries: right_boundaries, stores: right_stores }),
        });

        let mut new_leaves = current.leaves.clone();
        new_leaves.splice(pos..=pos, [left_leaf, right_leaf]);
        *current = Arc::new(TrieSnapshot { leaves: new_leaves });
        Ok(())
    }

    fn structural_merge(&self, leaf: &Arc<Leaf>) -> Result<()> {
        let _guard = self.meta_lock.lock().unwrap();
        let mut current = self.root.write().unwrap();
        let Some(pos) = current.leaves.iter().position(|l| Arc::ptr_eq(l, leaf)) else {
            return Ok(());
        };
        if current.leaves.len() <= 1 {
            return Ok(());
        }
        if leaf.guard.read().unwrap().boundaries.len() >= LEAF_MIN_BOUNDARIES {
            return Ok(());
        }

        let neighbor_pos = if pos + 1 < current.leaves.len() { pos + 1 } else { pos - 1 };
        let (left_pos, right_pos) = if neighbor_pos > pos { (pos, neighbor_pos) } else { (neighbor_pos, pos) };

        let left_data = current.leaves[left_pos].guard.read().unwrap();
        let right_data = current.leaves[right_pos].guard.read().unwrap();

        let mut boundaries = left_data.boundaries.clone();
        boundaries.pop();
        boundaries.extend(right_data.boundaries.iter().cloned());
        let mut stores = left_data.stores.clone();
        stores.extend(right_data.stores.iter().cloned());
        drop(left_data);
        drop(right_data);

        let merged_leaf = Arc::new(Leaf {
            min: boundaries[0].clone(),
            max: boundaries[boundaries.len() - 1].clone(),
            guard: RwLock::new(LeafData { boundaries, stores }),
        });

        let mut new_leaves = current.leaves.clone();
        new_leaves.splice(left_pos..=right_pos, [merged_leaf]);
        *current = Arc::new(TrieSnapshot { leaves: new_leaves });
        Ok(())
    }

    pub fn leaf_count(&self) -> usize {
        self.root.read().unwrap().leaves.len()
    }

    pub fn boundary_count(&self) -> usize {
        self.root
            .read()
            .unwrap()
            .leaves
            .iter()
            .map(|l| l.guard.read().unwrap().boundaries.len())
            .sum()
    }

    /// Drop the low bits of every stored remainder across every store in
    /// the trie.
    pub fn shrink_infix_size(&mut self, new_size: u8) -> Result<()> {
        let current = self.root.get_mut().unwrap().clone();
        for leaf in current.leaves.iter() {
            let mut data = leaf.guard.write().unwrap();
            for store in data.stores.iter_mut() {
                store.shrink_infix_size(new_size)?;
            }
        }
        self.infix_size = new_size;
        Ok(())
    }

    pub fn infix_size(&self) -> u8 {
        self.infix_size
    }

    /// All (boundary, store) pairs in ascending order, used by
    /// `Diva::serialize`.
    pub fn iter_boundaries(&self) -> Vec<(BoundaryKey, InfixStore)> {
        let snapshot = self.root.read().unwrap().clone();
        let mut out = Vec::new();
        for leaf in snapshot.leaves.iter() {
            let data = leaf.guard.read().unwrap();
            for i in 0..data.stores.len() {
                out.push((data.boundaries[i].clone(), data.stores[i].clone()));
            }
        }
        out
    }

    pub fn last_boundary(&self) -> BoundaryKey {
        let snapshot = self.root.read().unwrap().clone();
        let last = snapshot.leaves.last().expect("trie always has at least one leaf");
        last.max.clone()
    }

    pub fn load_factor(&self) -> f64 {
        self.load_factor
    }

    pub fn load_factor_alt(&self) -> f64 {
        self.load_factor_alt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trie() -> BoundaryTrie {
        BoundaryTrie::new(vec![0u8; 8], vec![0xffu8; 8], 8, 0.95, 0.5)
    }

    #[test]
    fn test_insert_and_point_query() {
        let trie = sample_trie();
        trie.insert(&10u64.to_be_bytes()).unwrap();
        trie.insert(&20u64.to_be_bytes()).unwrap();

        assert!(trie.point_query(&10u64.to_be_bytes()));
        assert!(trie.point_query(&20u64.to_be_bytes()));
        assert!(!trie.point_query(&15u64.to_be_bytes()));
    }

    #[test]
    fn test_delete() {
        let trie = sample_trie();
        trie.insert(&10u64.to_be_bytes()).unwrap();
        assert!(trie.point_query(&10u64.to_be_bytes()));
        assert!(trie.delete(&10u64.to_be_bytes()));
        assert!(!trie.point_query(&10u64.to_be_bytes()));
        assert!(!trie.delete(&10u64.to_be_bytes()));
    }

    #[test]
    fn test_range_query() {
        let trie = sample_trie();
        trie.insert(&10u64.to_be_bytes()).unwrap();
        trie.insert(&1000u64.to_be_bytes()).unwrap();

        assert!(trie.range_query(&5u64.to_be_bytes(), &20u64.to_be_bytes()));
        assert!(trie.range_query(&0u64.to_be_bytes(), &u64::MAX.to_be_bytes()));
        assert!(!trie.range_query(&11u64.to_be_bytes(), &999u64.to_be_bytes()));
    }

    #[test]
    fn test_leaf_splits_under_heavy_insertion() {
        let trie = BoundaryTrie::new(vec![0u8; 8], vec![0xffu8; 8], 4, 0.95, 0.5);
        for i in 0..20_000u64 {
            trie.insert(&(i * 97).to_be_bytes()).unwrap();
        }
        for i in 0..20_000u64 {
            assert!(trie.point_query(&(i * 97).to_be_bytes()));
        }
        assert!(trie.leaf_count() >= 1);
    }

    #[test]
    fn test_max_sentinel_key_does_not_panic() {
        let trie = sample_trie();
        let max_key = [0xffu8; 8];
        assert!(!trie.point_query(&max_key));
        trie.insert(&max_key).unwrap();
        assert!(trie.point_query(&max_key));
        assert!(trie.range_query(&max_key, &max_key));
        assert!(trie.delete(&max_key));
        assert!(!trie.point_query(&max_key));
    }

    #[test]
    fn test_bulk_load_basic() {
        let boundaries: Vec<BoundaryKey> = (0..=10u64).map(|i| (i * 100).to_be_bytes().to_vec()).collect();
        let mut stores = Vec::new();
        for i in 0..10 {
            let l = &boundaries[i];
            let r = &boundaries[i + 1];
            let shared = longest_common_prefix_bits(l, r);
            let mut store = InfixStore::empty(8, 0.95, 0.5);
            let mid = (i as u64 * 100) + 50;
            let (q, rem) = extract_infix(&mid.to_be_bytes(), shared, 8);
            store.insert(q, rem).unwrap();
            stores.push(store);
        }
        let trie = BoundaryTrie::bulk_load(boundaries, stores, 8, 0.95, 0.5);
        for i in 0..10u64 {
            let mid = i * 100 + 50;
            assert!(trie.point_query(&mid.to_be_bytes()));
        }
    }
}
