//! Bit-packed sort keys and the fixed-capacity list that sorts them.
//!
//! High bits carry coarse grouping (mesh, shader, cascade) and low bits fine
//! tiebreaks, so a plain ascending integer sort clusters state-compatible
//! entries next to each other.

use std::cmp::Reverse;
use std::fmt;

use rayon::slice::ParallelSliceMut;

use super::store::ItemIndex;
use crate::error::{Pool, ScheduleError, ScheduleResult};

/// Lists at least this long sort on the rayon pool.
const PARALLEL_SORT_THRESHOLD: usize = 8 * 1024;

pub trait SortKey: Copy + fmt::Debug + Send + Sync {
    /// Packed value; ordering is defined by this alone.
    fn bits(&self) -> u64;
}

/// Which item store an entry's item index refers to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ListId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortEntry<K> {
    pub key: K,
    pub list: ListId,
    pub item: ItemIndex,
}

/// Quantises a non-negative depth to 16 bits by taking the upper half of its
/// IEEE-754 representation. Monotonic for non-negative input, no division.
pub fn quantize_depth(depth: f32) -> u16 {
    debug_assert!(!(depth < 0.0), "depth {depth} must be culled before keying");
    if depth > 0.0 {
        (depth.to_bits() >> 16) as u16
    } else {
        0
    }
}

/// `mesh:24 | shader:32 | layer:8`, most significant first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColorKey(u64);

impl ColorKey {
    pub const MESH_BITS: u32 = 24;
    const MESH_SHIFT: u32 = 40;
    const SHADER_SHIFT: u32 = 8;

    pub fn new(mesh: u32, shader: u32, layer: u8) -> Self {
        let mesh = (mesh & ((1 << Self::MESH_BITS) - 1)) as u64;
        Self((mesh << Self::MESH_SHIFT) | ((shader as u64) << Self::SHADER_SHIFT) | layer as u64)
    }

    pub fn mesh(&self) -> u32 {
        (self.0 >> Self::MESH_SHIFT) as u32
    }

    pub fn shader(&self) -> u32 {
        (self.0 >> Self::SHADER_SHIFT) as u32
    }

    pub fn layer(&self) -> u8 {
        self.0 as u8
    }
}

impl SortKey for ColorKey {
    fn bits(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ColorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColorKey")
            .field("mesh", &self.mesh())
            .field("shader", &self.shader())
            .field("layer", &self.layer())
            .finish()
    }
}

/// Quantised view-space depth, for the depth-only prepass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepthKey(u16);

impl DepthKey {
    pub fn new(view_depth: f32) -> Self {
        Self(quantize_depth(view_depth))
    }

    pub fn depth(&self) -> u16 {
        self.0
    }
}

impl SortKey for DepthKey {
    fn bits(&self) -> u64 {
        self.0 as u64
    }
}

/// `cascade:8 | depth:16`, most significant first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShadowKey(u32);

impl ShadowKey {
    pub fn new(cascade: u8, light_depth: f32) -> Self {
        Self(((cascade as u32) << 16) | quantize_depth(light_depth) as u32)
    }

    pub fn cascade(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn depth(&self) -> u16 {
        self.0 as u16
    }
}

impl SortKey for ShadowKey {
    fn bits(&self) -> u64 {
        self.0 as u64
    }
}

impl fmt::Debug for ShadowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowKey")
            .field("cascade", &self.cascade())
            .field("depth", &self.depth())
            .finish()
    }
}

/// Fixed-capacity list of sort entries, append-only within a frame.
pub struct SortKeyList<K> {
    entries: Vec<SortEntry<K>>,
    capacity: usize,
}

impl<K: SortKey> SortKeyList<K> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn add(&mut self, key: K, list: ListId, item: ItemIndex) -> ScheduleResult<usize> {
        if self.entries.len() >= self.capacity {
            return Err(ScheduleError::capacity(Pool::SortEntries, self.capacity));
        }
        let slot = self.entries.len();
        self.entries.push(SortEntry { key, list, item });
        Ok(slot)
    }

    /// Stable, so already-sorted input comes back untouched.
    pub fn sort_ascending(&mut self) {
        if self.entries.len() >= PARALLEL_SORT_THRESHOLD {
            self.entries.par_sort_by_key(|entry| entry.key.bits());
        } else {
            self.entries.sort_by_key(|entry| entry.key.bits());
        }
    }

    pub fn sort_descending(&mut self) {
        if self.entries.len() >= PARALLEL_SORT_THRESHOLD {
            self.entries
                .par_sort_by_key(|entry| Reverse(entry.key.bits()));
        } else {
            self.entries.sort_by_key(|entry| Reverse(entry.key.bits()));
        }
    }

    /// Entries are `Copy`, so this is O(1).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[SortEntry<K>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits<K: SortKey>(list: &SortKeyList<K>) -> Vec<u64> {
        list.entries().iter().map(|entry| entry.key.bits()).collect()
    }

    #[test]
    fn shader_outranks_layer() {
        let mut list = SortKeyList::with_capacity(4);
        list.add(ColorKey::new(5, 100, 0), ListId(0), ItemIndex(0)).unwrap();
        list.add(ColorKey::new(5, 50, 255), ListId(0), ItemIndex(1)).unwrap();

        list.sort_ascending();

        assert_eq!(list.entries()[0].key.shader(), 50);
        assert_eq!(list.entries()[0].item, ItemIndex(1));
        assert_eq!(list.entries()[1].key.shader(), 100);
    }

    #[test]
    fn equal_coarse_bits_sort_by_layer_regardless_of_insertion() {
        for order in [[3u8, 1], [1, 3]] {
            let mut list = SortKeyList::with_capacity(2);
            for (i, layer) in order.iter().enumerate() {
                list.add(ColorKey::new(2, 7, *layer), ListId(0), ItemIndex(i as u32))
                    .unwrap();
            }
            list.sort_ascending();
            let layers: Vec<u8> = list.entries().iter().map(|e| e.key.layer()).collect();
            assert_eq!(layers, vec![1, 3]);
        }
    }

    #[test]
    fn ascending_descending_and_resort() {
        let mut list = SortKeyList::with_capacity(16);
        for (i, depth) in [4.0f32, 0.5, 12.0, 3.25, 0.0, 7.5].iter().enumerate() {
            list.add(DepthKey::new(*depth), ListId(0), ItemIndex(i as u32))
                .unwrap();
        }

        list.sort_ascending();
        let ascending = bits(&list);
        assert!(ascending.windows(2).all(|w| w[0] <= w[1]));

        let before = list.entries().to_vec();
        list.sort_ascending();
        assert_eq!(list.entries(), before.as_slice());

        list.sort_descending();
        let descending = bits(&list);
        assert!(descending.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn parallel_sort_matches_sequential_order() {
        let count = PARALLEL_SORT_THRESHOLD + 17;
        let mut list = SortKeyList::with_capacity(count);
        for i in 0..count as u32 {
            let scrambled = i.wrapping_mul(2_654_435_761) % 997;
            list.add(ColorKey::new(scrambled % 13, scrambled, 0), ListId(0), ItemIndex(i))
                .unwrap();
        }
        let mut expected: Vec<_> = list.entries().to_vec();
        expected.sort_by_key(|entry| entry.key.bits());

        list.sort_ascending();
        assert_eq!(list.entries(), expected.as_slice());
    }

    #[test]
    fn add_fails_at_capacity_and_clear_resets() {
        let mut list = SortKeyList::with_capacity(1);
        assert_eq!(list.add(DepthKey::new(1.0), ListId(0), ItemIndex(0)), Ok(0));
        let err = list
            .add(DepthKey::new(2.0), ListId(0), ItemIndex(1))
            .unwrap_err();
        assert!(err.is_capacity());

        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.add(DepthKey::new(2.0), ListId(0), ItemIndex(1)), Ok(0));
    }

    #[test]
    fn depth_quantization_is_monotonic() {
        let depths = [0.0f32, 1e-3, 0.1, 0.5, 1.0, 2.0, 10.0, 250.0, 1e4];
        let quantized: Vec<u16> = depths.iter().map(|d| quantize_depth(*d)).collect();
        assert!(quantized.windows(2).all(|w| w[0] <= w[1]));
        assert!(quantize_depth(1.0) < quantize_depth(2.0));
    }

    #[test]
    fn shadow_key_groups_by_cascade_first() {
        let near_far_cascade = ShadowKey::new(1, 0.5);
        let far_near_cascade = ShadowKey::new(0, 900.0);
        assert!(far_near_cascade.bits() < near_far_cascade.bits());
        assert_eq!(near_far_cascade.cascade(), 1);
        assert_eq!(near_far_cascade.depth(), quantize_depth(0.5));
    }

    #[test]
    fn color_key_fields_round_trip() {
        let key = ColorKey::new(0x00AB_CDEF, 0xDEAD_BEEF, 42);
        assert_eq!(key.mesh(), 0x00AB_CDEF);
        assert_eq!(key.shader(), 0xDEAD_BEEF);
        assert_eq!(key.layer(), 42);
        assert_eq!(ColorKey::new(0x0100_0001, 0, 0).mesh(), 1);
    }
}
