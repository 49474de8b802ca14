//! Quotient-filter-style container for the infixes of one boundary interval:
//! packed occupied/runend bitmaps plus a bit-packed slot array, with
//! insert/delete/point query/range query and resize/split/merge support.

use crate::bitmap::{clear_bit, get_bit, rank, select, set_bit, shift_bits_left, shift_bits_right};
use crate::error::{DivaError, Result};
use crate::key::{copy_bits, extract_bits, longest_common_prefix_bits, write_bits};
use crate::slots::{get_slot, set_slot, shift_slots_left, shift_slots_right};

const U64_BITS: usize = 64;

/// Number of bits addressing the occupied bitmap. Fixed across all size
/// grades in this implementation (see DESIGN.md): a grade only scales the
/// *physical* slot/runend capacity, not the quotient domain, which keeps
/// split/merge re-extraction a single formula instead of one parameterized
/// by grade.
pub const BASE_IMPLICIT_SIZE: u32 = 10;
/// Fixed quotient address space.
pub const TARGET_SIZE: usize = 1 << BASE_IMPLICIT_SIZE;
const OCCUPIED_WORDS: usize = TARGET_SIZE / U64_BITS;

/// Size-scalar table: grade `g`'s physical slot capacity is `TARGET_SIZE *
/// SIZE_SCALAR[g]`, rounded up to a multiple of 64. Strictly monotone.
pub const SIZE_SCALAR: [f64; 5] = [1.0, 1.25, 1.5, 2.0, 3.0];
pub const MAX_SIZE_GRADE: u8 = (SIZE_SCALAR.len() - 1) as u8;

/// A slot value with a nonzero low bit is a normal infix whose remainder
/// bits live above bit 0 (the least-significant bit of the remainder is
/// forced to 1). A slot value that is nonzero but has a zero low bit is a
/// partial/void infix: it matches any remainder for its quotient. A slot
/// value of exactly zero is an empty slot.
pub const PARTIAL_MARKER: u64 = 0b10;

#[inline]
fn is_partial_slot(v: u64) -> bool {
    v != 0 && v & 1 == 0
}

pub fn scaled_size(grade: u8) -> usize {
    let raw = (TARGET_SIZE as f64 * SIZE_SCALAR[grade as usize]).ceil() as usize;
    raw.div_ceil(U64_BITS) * U64_BITS
}

pub fn choose_size_grade(num_elements: usize, load_factor: f64) -> u8 {
    for g in 0..=MAX_SIZE_GRADE {
        let cap = (scaled_size(g) as f64 * load_factor) as usize;
        if cap >= num_elements {
            return g;
        }
    }
    MAX_SIZE_GRADE
}

/// Extract a store's (quotient, raw remainder bits) pair for a key, given
/// the `shared` prefix length (bits) of the boundary interval it falls in
/// and the store's `infix_size`.
pub fn extract_infix(bytes: &[u8], shared: u32, infix_size: u8) -> (usize, u64) {
    let start = shared + 1; // skip the shared prefix and the one "ignore" bit
    let q = extract_bits(bytes, start, BASE_IMPLICIT_SIZE) as usize;
    let r = extract_bits(bytes, start + BASE_IMPLICIT_SIZE, infix_size as u32);
    (q, r)
}

/// Rebuild an approximate bit-string standing in for whatever key produced
/// `(q, v)` under a store anchored at `boundary` with the given `shared`
/// prefix length. Used only by split/merge re-extraction — the true
/// original key is gone, so this reconstructs the best available
/// approximation from the boundary plus the stored quotient and remainder.
fn reconstruct_bits(boundary: &[u8], shared: u32, infix_size: u8, q: usize, v: u64) -> Vec<u8> {
    let total_bits = shared as usize + 1 + BASE_IMPLICIT_SIZE as usize + infix_size as usize + 1;
    let mut buf = vec![0u8; total_bits.div_ceil(8)];
    copy_bits(&mut buf, 0, boundary, 0, shared + 1);
    write_bits(&mut buf, shared + 1, q as u64, BASE_IMPLICIT_SIZE);
    write_bits(&mut buf, shared + 1 + BASE_IMPLICIT_SIZE, v, infix_size as u32 + 1);
    buf
}

/// Re-address one stored (quotient, slot value) pair from the window it
/// was extracted in (`old_shared` bits of prefix under `source_boundary`)
/// into a new window (`new_shared` bits of prefix, same anchor). Returns a
/// void/partial slot value whenever the new window would need bits beyond
/// what was actually recorded.
fn reextract(
    source_boundary: &[u8],
    old_shared: u32,
    infix_size: u8,
    q: usize,
    v: u64,
    new_shared: u32,
) -> (usize, u64) {
    let reconstructed = reconstruct_bits(source_boundary, old_shared, infix_size, q, v);
    let (new_q, new_r) = extract_infix(&reconstructed, new_shared, infix_size);

    if is_partial_slot(v) {
        return (new_q, PARTIAL_MARKER);
    }

    let old_window_end = old_shared as u64 + 1 + BASE_IMPLICIT_SIZE as u64 + infix_size as u64;
    let new_window_end = new_shared as u64 + 1 + BASE_IMPLICIT_SIZE as u64 + infix_size as u64;
    if new_window_end > old_window_end {
        (new_q, PARTIAL_MARKER)
    } else {
        (new_q, new_r | 1)
    }
}

#[derive(Debug, Clone)]
pub struct InfixStore {
    is_partial_key: bool,
    invalid_bits: u8,
    size_grade: u8,
    elem_count: u32,
    infix_size: u8,
    load_factor: f64,
    load_factor_alt: f64,
    data: Box<[u64]>,
}

impl InfixStore {
    pub fn empty(infix_size: u8, load_factor: f64, load_factor_alt: f64) -> Self {
        Self::build_from_sorted_at_grade(&[], infix_size, 0, false, 0, load_factor, load_factor_alt)
            .expect("grade 0 always has room for zero elements")
    }

    /// Build a store from a slice of combined `quotient|remainder` infixes,
    /// where `remainder` occupies the low `infix_size` bits.
    pub fn new_with_infixes(
        infixes: &[u64],
        infix_size: u8,
        load_factor: f64,
        load_factor_alt: f64,
    ) -> Result<Self> {
        let mut items: Vec<(usize, u64)> = infixes
            .iter()
            .map(|&w| {
                let q = (w >> infix_size) as usize;
                let r = w & ((1u64 << infix_size) - 1);
                (q, r | 1)
            })
            .collect();
        items.sort_by_key(|&(q, _)| q);
        Self::build_from_sorted(&items, infix_size, false, 0, load_factor, load_factor_alt)
    }

    pub fn build_from_sorted(
        items: &[(usize, u64)],
        infix_size: u8,
        is_partial_key: bool,
        invalid_bits: u8,
        load_factor: f64,
        load_factor_alt: f64,
    ) -> Result<Self> {
        let grade = choose_size_grade(items.len(), load_factor);
        Self::build_from_sorted_at_grade(
            items,
            infix_size,
            grade,
            is_partial_key,
            invalid_bits,
            load_factor,
            load_factor_alt,
        )
    }

    fn build_from_sorted_at_grade(
        items: &[(usize, u64)],
        infix_size: u8,
        grade: u8,
        is_partial_key: bool,
        invalid_bits: u8,
        load_factor: f64,
        load_factor_alt: f64,
    ) -> Result<Self> {
        let capacity = scaled_size(grade);
        let slot_width = infix_size + 1;
        let runend_words = capacity / U64_BITS;
        let slot_words = (capacity * slot_width as usize).div_ceil(U64_BITS);
        let total_words = 1 + OCCUPIED_WORDS + runend_words + slot_words;
        let mut data = vec![0u64; total_words].into_boxed_slice();

        let occ_off = 1;
        let runend_off = occ_off + OCCUPIED_WORDS;
        let slots_off = runend_off + runend_words;

        let mut prev_run_end: Option<usize> = None;
        let mut occ_count: u32 = 0;
        let mut i = 0;
        while i < items.len() {
            let q = items[i].0;
            let mut j = i;
            while j < items.len() && items[j].0 == q {
                j += 1;
            }
            let count = j - i;
            let run_start = match prev_run_end {
                None => q,
                Some(end) => (end + 1).max(q),
            };
            let run_end = run_start + count - 1;
            if run_end >= capacity {
                return Err(DivaError::OutOfMemory);
            }
            set_bit(&mut data[occ_off..occ_off + OCCUPIED_WORDS], q);
            {
                let slots = &mut data[slots_off..slots_off + slot_words];
                for (k, &(_, v)) in items[i..j].iter().enumerate() {
                    set_slot(slots, run_start + k, v, slot_width);
                }
            }
            set_bit(&mut data[runend_off..runend_off + runend_words], run_end);
            prev_run_end = Some(run_end);
            occ_count += 1;
            i = j;
        }
        data[0] = ((occ_count as u64) << 32) | (occ_count as u64);

        Ok(Self {
            is_partial_key,
            invalid_bits,
            size_grade: grade,
            elem_count: items.len() as u32,
            infix_size,
            load_factor,
            load_factor_alt,
            data,
        })
    }

    pub fn elem_count(&self) -> u32 {
        self.elem_count
    }

    pub fn size_grade(&self) -> u8 {
        self.size_grade
    }

    pub fn infix_size(&self) -> u8 {
        self.infix_size
    }

    pub fn is_partial_key(&self) -> bool {
        self.is_partial_key
    }

    pub fn invalid_bits(&self) -> u8 {
        self.invalid_bits
    }

    pub fn capacity(&self) -> usize {
        scaled_size(self.size_grade)
    }

    fn slot_width(&self) -> u8 {
        self.infix_size + 1
    }

    fn runend_words(&self) -> usize {
        scaled_size(self.size_grade) / U64_BITS
    }

    fn slot_words(&self) -> usize {
        (scaled_size(self.size_grade) * self.slot_width() as usize).div_ceil(U64_BITS)
    }

    fn occupied_offset(&self) -> usize {
        1
    }

    fn runend_offset(&self) -> usize {
        self.occupied_offset() + OCCUPIED_WORDS
    }

    fn slots_offset(&self) -> usize {
        self.runend_offset() + self.runend_words()
    }

    fn occupied(&self) -> &[u64] {
        let o = self.occupied_offset();
        &self.data[o..o + OCCUPIED_WORDS]
    }

    fn occupied_mut(&mut self) -> &mut [u64] {
        let o = self.occupied_offset();
        &mut self.data[o..o + OCCUPIED_WORDS]
    }

    fn runend(&self) -> &[u64] {
        let o = self.runend_offset();
        let w = self.runend_words();
        &self.data[o..o + w]
    }

    fn runend_mut(&mut self) -> &mut [u64] {
        let o = self.runend_offset();
        let w = self.runend_words();
        &mut self.data[o..o + w]
    }

    fn slots(&self) -> &[u64] {
        let o = self.slots_offset();
        let w = self.slot_words();
        &self.data[o..o + w]
    }

    fn slots_mut(&mut self) -> &mut [u64] {
        let o = self.slots_offset();
        let w = self.slot_words();
        &mut self.data[o..o + w]
    }

    fn find_run_start(&self, q: usize) -> usize {
        let r = rank(self.occupied(), q);
        if r == 0 {
            q
        } else {
            let prev_end = select(self.runend(), r - 1).expect("rank/runend consistency");
            (prev_end + 1).max(q)
        }
    }

    fn run_end_for(&self, q: usize) -> usize {
        let r = rank(self.occupied(), q);
        select(self.runend(), r).expect("occupied/runend consistency")
    }

    // --- queries ---------------------------------------------------------

    pub fn point_query(&self, quotient: usize, remainder: u64) -> bool {
        if !get_bit(self.occupied(), quotient) {
            return false;
        }
        let target = remainder | 1;
        let run_start = self.find_run_start(quotient);
        let run_end = self.run_end_for(quotient);
        let slot_width = self.slot_width();
        for i in run_start..=run_end {
            let v = get_slot(self.slots(), i, slot_width);
            if is_partial_slot(v) || v == target {
                return true;
            }
        }
        false
    }

    pub fn range_query(&self, q_lo: usize, r_lo: u64, q_hi: usize, r_hi: u64) -> bool {
        debug_assert!(q_lo <= q_hi);
        if q_lo == q_hi {
            return self.run_has_remainder_in_range(q_lo, r_lo, r_hi);
        }
        if q_hi > q_lo + 1 {
            let between = rank(self.occupied(), q_hi) - rank(self.occupied(), q_lo + 1);
            if between > 0 {
                return true;
            }
        }
        if get_bit(self.occupied(), q_lo) && self.run_has_remainder_at_least(q_lo, r_lo) {
            return true;
        }
        if get_bit(self.occupied(), q_hi) && self.run_has_remainder_at_most(q_hi, r_hi) {
            return true;
        }
        false
    }

    fn run_has_remainder_at_least(&self, q: usize, lo: u64) -> bool {
        let slot_width = self.slot_width();
        let (start, end) = (self.find_run_start(q), self.run_end_for(q));
        (start..=end).any(|i| {
            let v = get_slot(self.slots(), i, slot_width);
            is_partial_slot(v) || v >= lo
        })
    }

    fn run_has_remainder_at_most(&self, q: usize, hi: u64) -> bool {
        let slot_width = self.slot_width();
        let (start, end) = (self.find_run_start(q), self.run_end_for(q));
        (start..=end).any(|i| {
            let v = get_slot(self.slots(), i, slot_width);
            is_partial_slot(v) || v <= hi
        })
    }

    fn run_has_remainder_in_range(&self, q: usize, lo: u64, hi: u64) -> bool {
        if !get_bit(self.occupied(), q) {
            return false;
        }
        let slot_width = self.slot_width();
        let (start, end) = (self.find_run_start(q), self.run_end_for(q));
        (start..=end).any(|i| {
            let v = get_slot(self.slots(), i, slot_width);
            is_partial_slot(v) || (v >= lo && v <= hi)
        })
    }

    // --- mutation ---------------------------------------------------------

    /// returns false if there's no room at or after `pos` before `capacity`
    fn make_room_at(&mut self, pos: usize) -> bool {
        let capacity = scaled_size(self.size_grade);
        let slot_width = self.slot_width();
        let mut end = pos;
        while end < capacity && get_slot(self.slots(), end, slot_width) != 0 {
            end += 1;
        }
        if end >= capacity {
            return false;
        }
        shift_slots_right(self.slots_mut(), pos, end, 1, slot_width, capacity);
        shift_bits_right(self.runend_mut(), pos, end, 1);
        true
    }

    fn insert_no_resize(&mut self, quotient: usize, value: u64) -> Option<bool> {
        let was_occupied = get_bit(self.occupied(), quotient);
        let slot_width = self.slot_width();
        let run_start = self.find_run_start(quotient);

        if !was_occupied {
            if !self.make_room_at(run_start) {
                return None;
            }
            set_slot(self.slots_mut(), run_start, value, slot_width);
            set_bit(self.occupied_mut(), quotient);
            set_bit(self.runend_mut(), run_start);
            return Some(true);
        }

        let old_run_end = self.run_end_for(quotient);
        let mut pos = run_start;
        while pos <= old_run_end {
            let existing = get_slot(self.slots(), pos, slot_width);
            if existing > value {
                break;
            }
            pos += 1;
        }
        let appended_at_end = pos == old_run_end + 1;
        if !self.make_room_at(pos) {
            return None;
        }
        set_slot(self.slots_mut(), pos, value, slot_width);
        if appended_at_end {
            clear_bit(self.runend_mut(), old_run_end);
            set_bit(self.runend_mut(), pos);
        }
        Some(false)
    }

    fn insert_value(&mut self, quotient: usize, value: u64) -> Result<()> {
        loop {
            match self.insert_no_resize(quotient, value) {
                Some(new_run) => {
                    self.elem_count += 1;
                    if new_run {
                        let occ = rank(self.occupied(), TARGET_SIZE) as u64;
                        self.data[0] = (occ << 32) | occ;
                    }
                    let load = self.elem_count as f64 / self.capacity() as f64;
                    if load > self.load_factor && self.size_grade < MAX_SIZE_GRADE {
                        self.resize_to_grade(self.size_grade + 1)?;
                    }
                    return Ok(());
                }
                None => {
                    if self.size_grade >= MAX_SIZE_GRADE {
                        return Err(DivaError::OutOfMemory);
                    }
                    self.resize_to_grade(self.size_grade + 1)?;
                }
            }
        }
    }

    pub fn insert(&mut self, quotient: usize, remainder: u64) -> Result<()> {
        self.insert_value(quotient, remainder | 1)
    }

    pub fn insert_partial(&mut self, quotient: usize) -> Result<()> {
        self.insert_value(quotient, PARTIAL_MARKER)
    }

    pub fn delete(&mut self, quotient: usize, remainder: u64) -> bool {
        let target = remainder | 1;
        if !get_bit(self.occupied(), quotient) {
            return false;
        }
        let slot_width = self.slot_width();
        let run_start = self.find_run_start(quotient);
        let run_end = self.run_end_for(quotient);

        let Some(pos) = (run_start..=run_end).find(|&i| get_slot(self.slots(), i, slot_width) == target) else {
            return false;
        };

        let capacity = scaled_size(self.size_grade);
        let mut cluster_end = pos;
        while cluster_end < capacity && get_slot(self.slots(), cluster_end, slot_width) != 0 {
            cluster_end += 1;
        }
        shift_slots_left(self.slots_mut(), pos, cluster_end, 1, slot_width);
        shift_bits_left(self.runend_mut(), pos, cluster_end, 1);

        if pos == run_end {
            if run_start == run_end {
                clear_bit(self.occupied_mut(), quotient);
                let occ = rank(self.occupied(), TARGET_SIZE) as u64;
                self.data[0] = (occ << 32) | occ;
            } else {
                set_bit(self.runend_mut(), run_end - 1);
            }
        }

        self.elem_count -= 1;
        self.maybe_demote();
        true
    }

    fn maybe_demote(&mut self) {
        if self.size_grade == 0 {
            return;
        }
        let lower_capacity = scaled_size(self.size_grade - 1) as f64;
        if self.elem_count as f64 <= lower_capacity * self.load_factor_alt {
            let _ = self.resize_to_grade(self.size_grade - 1);
        }
    }

    fn resize_to_grade(&mut self, new_grade: u8) -> Result<()> {
        let items = self.iter_infixes();
        let resized = Self::build_from_sorted_at_grade(
            &items,
            self.infix_size,
            new_grade,
            self.is_partial_key,
            self.invalid_bits,
            self.load_factor,
            self.load_factor_alt,
        )?;
        *self = resized;
        Ok(())
    }

    /// All stored (quotient, raw slot value) pairs in ascending quotient
    /// order, each quotient's values in their stored (ascending remainder)
    /// order. `O(TARGET_SIZE^2)` worst case; used only by resize, split,
    /// merge and serialization, never on the query hot path.
    pub fn iter_infixes(&self) -> Vec<(usize, u64)> {
        let mut out = Vec::with_capacity(self.elem_count as usize);
        let slot_width = self.slot_width();
        for q in 0..TARGET_SIZE {
            if get_bit(self.occupied(), q) {
                let start = self.find_run_start(q);
                let end = self.run_end_for(q);
                for i in start..=end {
                    out.push((q, get_slot(self.slots(), i, slot_width)));
                }
            }
        }
        out
    }

    /// Split this store, which covers `[old_l, old_r)`, at `cut` into a
    /// left store covering `[old_l, cut)` and a right store covering
    /// `[cut, old_r)`.
    pub fn split(&self, old_l: &[u8], cut: &[u8], old_r: &[u8]) -> Result<(Self, Self)> {
        let old_shared = longest_common_prefix_bits(old_l, old_r);
        let (cut_q, _) = extract_infix(cut, old_shared, self.infix_size);
        let left_shared = longest_common_prefix_bits(old_l, cut);
        let right_shared = longest_common_prefix_bits(cut, old_r);

        let mut left_items = Vec::new();
        let mut right_items = Vec::new();

        for (q, v) in self.iter_infixes() {
            match q.cmp(&cut_q) {
                std::cmp::Ordering::Less => {
                    left_items.push(reextract(old_l, old_shared, self.infix_size, q, v, left_shared));
                }
                std::cmp::Ordering::Greater => {
                    right_items.push(reextract(old_l, old_shared, self.infix_size, q, v, right_shared));
                }
                std::cmp::Ordering::Equal => {
                    let (lq, _) = reextract(old_l, old_shared, self.infix_size, q, v, left_shared);
                    let (rq, _) = reextract(old_l, old_shared, self.infix_size, q, v, right_shared);
                    left_items.push((lq, PARTIAL_MARKER));
                    right_items.push((rq, PARTIAL_MARKER));
                }
            }
        }
        left_items.sort_by_key(|&(q, _)| q);
        right_items.sort_by_key(|&(q, _)| q);

        let left = Self::build_from_sorted(
            &left_items,
            self.infix_size,
            false,
            0,
            self.load_factor,
            self.load_factor_alt,
        )?;
        let right = Self::build_from_sorted(
            &right_items,
            self.infix_size,
            false,
            0,
            self.load_factor,
            self.load_factor_alt,
        )?;
        Ok((left, right))
    }

    /// Merge `left` (covering `[l, mid)`) and `right` (covering `[mid, r)`)
    /// into a single store covering `[l, r)`.
    pub fn merge(left: &Self, l: &[u8], mid: &[u8], right: &Self, r: &[u8]) -> Result<Self> {
        let infix_size = left.infix_size;
        let left_old_shared = longest_common_prefix_bits(l, mid);
        let right_old_shared = longest_common_prefix_bits(mid, r);
        let merged_shared = longest_common_prefix_bits(l, r);

        let mut items = Vec::with_capacity(left.elem_count as usize + right.elem_count as usize);
        for (q, v) in left.iter_infixes() {
            items.push(reextract(l, left_old_shared, infix_size, q, v, merged_shared));
        }
        for (q, v) in right.iter_infixes() {
            items.push(reextract(mid, right_old_shared, infix_size, q, v, merged_shared));
        }
        items.sort_by_key(|&(q, _)| q);
        Self::build_from_sorted(&items, infix_size, false, 0, left.load_factor, left.load_factor_alt)
    }

    /// Drop the low `old_size - new_size` bits of every stored remainder.
    pub fn shrink_infix_size(&mut self, new_size: u8) -> Result<()> {
        debug_assert!(new_size < self.infix_size);
        let drop_bits = self.infix_size - new_size;
        let items: Vec<(usize, u64)> = self
            .iter_infixes()
            .into_iter()
            .map(|(q, v)| {
                if is_partial_slot(v) {
                    (q, PARTIAL_MARKER)
                } else {
                    let shrunk = v >> drop_bits;
                    (q, shrunk | 1)
                }
            })
            .collect();
        let resized = Self::build_from_sorted(
            &items,
            new_size,
            self.is_partial_key,
            self.invalid_bits,
            self.load_factor,
            self.load_factor_alt,
        )?;
        *self = resized;
        Ok(())
    }

    fn pack_status(&self) -> u32 {
        ((self.is_partial_key as u32) << 31)
            | (((self.invalid_bits as u32) & 0x7F) << 24)
            | (((self.size_grade as u32) & 0xFF) << 16)
            | (self.elem_count & 0xFFFF)
    }

    pub fn to_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.pack_status().to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        for w in self.data.iter() {
            out.extend_from_slice(&w.to_le_bytes());
        }
    }

    pub fn from_bytes(
        buf: &[u8],
        infix_size: u8,
        load_factor: f64,
        load_factor_alt: f64,
    ) -> Result<(Self, usize)> {
        if buf.len() < 8 {
            return Err(DivaError::Truncated { expected: 8, got: buf.len() });
        }
        let status = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let word_count = u32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize;
        let needed = 8 + word_count * 8;
        if buf.len() < needed {
            return Err(DivaError::Truncated { expected: needed, got: buf.len() });
        }
        let is_partial_key = (status >> 31) & 1 == 1;
        let invalid_bits = ((status >> 24) & 0x7F) as u8;
        let size_grade = ((status >> 16) & 0xFF) as u8;
        let elem_count = status & 0xFFFF;

        let mut data = vec![0u64; word_count].into_boxed_slice();
        for (i, word) in data.iter_mut().enumerate() {
            let off = 8 + i * 8;
            *word = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        }

        Ok((
            Self {
                is_partial_key,
                invalid_bits,
                size_grade,
                elem_count,
                infix_size,
                load_factor,
                load_factor_alt,
                data,
            },
            needed,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LF: f64 = 0.95;
    const LFA: f64 = 0.5;

    #[test]
    fn test_new_with_infixes_matches_packed_layout() {
        let infixes = vec![(129u64 << 8) | 170, (129u64 << 8) | 188, (340u64 << 8) | 51];
        let store = InfixStore::new_with_infixes(&infixes, 8, LF, LFA).unwrap();
        assert_eq!(store.elem_count(), 3);
        assert!(store.point_query(129, 170));
        assert!(store.point_query(129, 188));
        assert!(store.point_query(340, 51));
        assert!(!store.point_query(129, 171));
        assert!(!store.point_query(200, 0));
    }

    #[test]
    fn test_insert_new_run() {
        let mut store = InfixStore::empty(8, LF, LFA);
        store.insert(5, 42).unwrap();
        assert!(store.point_query(5, 42));
        assert!(!store.point_query(5, 43));
        assert_eq!(store.elem_count(), 1);
    }

    #[test]
    fn test_insert_same_quotient_multiple() {
        let mut store = InfixStore::empty(8, LF, LFA);
        store.insert(5, 10).unwrap();
        store.insert(5, 200).unwrap();
        store.insert(5, 100).unwrap();
        assert!(store.point_query(5, 10));
        assert!(store.point_query(5, 100));
        assert!(store.point_query(5, 200));
        assert!(!store.point_query(5, 150));
        assert_eq!(store.elem_count(), 3);
    }

    #[test]
    fn test_insert_cascades_across_adjacent_runs() {
        let mut store = InfixStore::empty(8, LF, LFA);
        // pack q=0 and q=1 so they sit in adjacent physical slots, then
        // insert again into q=0 to force q=1's run to shift right
        store.insert(0, 1).unwrap();
        store.insert(1, 1).unwrap();
        store.insert(0, 2).unwrap();
        assert!(store.point_query(0, 1));
        assert!(store.point_query(0, 2));
        assert!(store.point_query(1, 1));
        assert_eq!(store.elem_count(), 3);
    }

    #[test]
    fn test_delete_removes_and_preserves_others() {
        let mut store = InfixStore::empty(8, LF, LFA);
        store.insert(5, 10).unwrap();
        store.insert(5, 20).unwrap();
        store.insert(6, 30).unwrap();

        assert!(store.delete(5, 10));
        assert!(!store.point_query(5, 10));
        assert!(store.point_query(5, 20));
        assert!(store.point_query(6, 30));
        assert_eq!(store.elem_count(), 2);

        assert!(store.delete(5, 20));
        assert!(!store.point_query(5, 20));
        assert!(store.point_query(6, 30));
        assert_eq!(store.elem_count(), 1);

        assert!(!store.delete(5, 10));
    }

    #[test]
    fn test_delete_last_in_multi_run_updates_runend() {
        let mut store = InfixStore::empty(8, LF, LFA);
        store.insert(5, 10).unwrap();
        store.insert(5, 20).unwrap();
        store.insert(5, 30).unwrap();
        assert!(store.delete(5, 30));
        assert!(store.point_query(5, 10));
        assert!(store.point_query(5, 20));
        assert!(!store.point_query(5, 30));
        // insert again to make sure the run end is still correctly tracked
        store.insert(5, 40).unwrap();
        assert!(store.point_query(5, 40));
    }

    #[test]
    fn test_range_query() {
        let mut store = InfixStore::empty(8, LF, LFA);
        store.insert(10, 50).unwrap();
        store.insert(20, 60).unwrap();

        assert!(store.range_query(10, 40, 10, 60)); // within q=10's run
        assert!(!store.range_query(10, 60, 10, 255)); // above the only value at q=10
        assert!(store.range_query(10, 0, 20, 0)); // spans both occupied quotients
        assert!(!store.range_query(11, 0, 19, 0)); // strictly between, nothing there
    }

    #[test]
    fn test_partial_infix_matches_anything() {
        let mut store = InfixStore::empty(8, LF, LFA);
        store.insert_partial(7).unwrap();
        assert!(store.point_query(7, 0));
        assert!(store.point_query(7, 255));
        assert!(!store.point_query(8, 0));
    }

    #[test]
    fn test_promotes_on_overflow_and_keeps_all_entries() {
        let mut store = InfixStore::empty(5, LF, LFA);
        let initial_grade = store.size_grade();
        for i in 0..900u64 {
            store.insert((i % 1024) as usize, i % 32).unwrap();
        }
        assert!(store.size_grade() >= initial_grade);
        for i in 0..900u64 {
            assert!(store.point_query((i % 1024) as usize, i % 32));
        }
    }

    #[test]
    fn test_split_preserves_membership() {
        let mut store = InfixStore::empty(9, LF, LFA);
        let l = [0u8; 8];
        let r = [0xffu8; 8];
        // keys spread across the whole byte-string space under boundary [l, r)
        let keys: Vec<[u8; 8]> = (1u64..50)
            .map(|i| (i * 0x0404_0404_0404_0404u64).to_be_bytes())
            .collect();
        let shared = longest_common_prefix_bits(&l, &r);
        for k in &keys {
            let (q, rem) = extract_infix(k, shared, store.infix_size());
            store.insert(q, rem).unwrap();
        }

        let cut = 25u64.to_be_bytes();
        let (left, right) = store.split(&l, &cut, &r).unwrap();

        for k in &keys {
            let under_left = k.as_slice() < cut.as_slice();
            let (shared_half, half) = if under_left {
                (longest_common_prefix_bits(&l, &cut), &left)
            } else {
                (longest_common_prefix_bits(&cut, &r), &right)
            };
            let (q, rem) = extract_infix(k, shared_half, store.infix_size());
            assert!(half.point_query(q, rem), "key {:?} missing after split", k);
        }
    }

    #[test]
    fn test_merge_preserves_membership() {
        let l = [0u8; 8];
        let mid = 25u64.to_be_bytes();
        let r = [0xffu8; 8];
        let infix_size = 9;

        let mut left = InfixStore::empty(infix_size, LF, LFA);
        let mut right = InfixStore::empty(infix_size, LF, LFA);

        let left_keys: Vec<[u8; 8]> = (1u64..20).map(|i| i.to_be_bytes()).collect();
        let right_keys: Vec<[u8; 8]> = (30u64..50).map(|i| i.to_be_bytes()).collect();

        let left_shared = longest_common_prefix_bits(&l, &mid);
        for k in &left_keys {
            let (q, rem) = extract_infix(k, left_shared, infix_size);
            left.insert(q, rem).unwrap();
        }
        let right_shared = longest_common_prefix_bits(&mid, &r);
        for k in &right_keys {
            let (q, rem) = extract_infix(k, right_shared, infix_size);
            right.insert(q, rem).unwrap();
        }

        let merged = InfixStore::merge(&left, &l, &mid, &right, &r).unwrap();
        let merged_shared = longest_common_prefix_bits(&l, &r);
        for k in left_keys.iter().chain(right_keys.iter()) {
            let (q, rem) = extract_infix(k, merged_shared, infix_size);
            assert!(merged.point_query(q, rem), "key {:?} missing after merge", k);
        }
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut store = InfixStore::new_with_infixes(&[(10u64 << 8) | 1, (20u64 << 8) | 2], 8, LF, LFA).unwrap();
        store.insert(30, 99).unwrap();
        let mut buf = Vec::new();
        store.to_bytes(&mut buf);
        let (restored, consumed) = InfixStore::from_bytes(&buf, 8, LF, LFA).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(restored.elem_count(), store.elem_count());
        assert!(restored.point_query(10, 1));
        assert!(restored.point_query(20, 2));
        assert!(restored.point_query(30, 99));
    }

    #[test]
    fn test_shrink_infix_size_keeps_positives() {
        let mut store = InfixStore::empty(10, LF, LFA);
        store.insert(5, 500).unwrap();
        store.insert(5, 777).unwrap();
        store.shrink_infix_size(6).unwrap();
        assert_eq!(store.infix_size(), 6);
        assert!(store.point_query(5, 500 >> 4));
        assert!(store.point_query(5, 777 >> 4));
    }
}
