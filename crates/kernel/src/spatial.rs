//! Spatial hash index for neighbor queries.
//!
//! The index is the GPU-style sorted-lookup structure rather than a
//! `HashMap`: an array of `(cell key, particle index)` entries, one per
//! particle, sorted by key with a bitonic network, plus a dense offset table
//! mapping each key to the first sorted position holding it. Everything is
//! flat `u32` data so the layout maps directly onto storage buffers.
//!
//! Keys are the cell hash reduced modulo the particle count, so distinct
//! cells can share a key. Lookups therefore produce *candidates*, not
//! neighbors; callers re-filter by true squared distance.

use bytemuck::{Pod, Zeroable};
use glam::{IVec2, Vec2};

use crate::dispatch;

/// Sentinel stored in the offset table for keys with no particles.
///
/// The all-ones pattern is never a valid sorted-array position and must not
/// be dereferenced.
pub const NO_OFFSET: u32 = u32::MAX;

const HASH_K1: u32 = 15823;
const HASH_K2: u32 = 9737333;

/// One sortable entry of the spatial lookup: the reduced cell key and the
/// index of the particle that produced it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct CellEntry {
    /// Reduced cell key in `[0, particle_count)`.
    pub key: u32,
    /// Particle index in `[0, particle_count)`.
    pub index: u32,
}

/// Integer cell coordinate of a position.
///
/// The boundary's positive extents serve as the coordinate shift, so every
/// in-bounds position lands on non-negative cell coordinates. Out-of-bounds
/// positions still map to a well-defined cell.
pub fn cell_coord(position: Vec2, radius: f32, shift: Vec2) -> IVec2 {
    ((position + shift) / radius).floor().as_ivec2()
}

/// Hash of a cell coordinate.
///
/// Wrapping u32 arithmetic is part of the contract: overflow is defined
/// wraparound, not an error, and negative coordinates wrap the same way on
/// every platform.
pub fn hash_cell(cell: IVec2) -> u32 {
    (cell.x as u32)
        .wrapping_mul(HASH_K1)
        .wrapping_add((cell.y as u32).wrapping_mul(HASH_K2))
}

/// Reduce a cell hash to a key in `[0, table_size)`.
pub fn key_from_hash(hash: u32, table_size: u32) -> u32 {
    hash % table_size
}

// ---------------------------------------------------------------------------
// Bitonic sorting network
// ---------------------------------------------------------------------------

/// Parameters of one compare-exchange pass of the bitonic network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortPass {
    /// Lane-to-pair grouping width; always a power of two.
    pub group_width: u32,
    /// Span of a pair group, `2 * group_width - 1`.
    pub group_height: u32,
    /// Position of the pass within its stage; `0` is the mirrored merge step.
    pub step_index: u32,
}

/// The full bitonic schedule for an array of `len` elements.
///
/// Enumerates `ilog2(next_power_of_two(len))` stages, each with one mirrored
/// merge pass followed by halving shear passes. Running the passes in order,
/// with a barrier between them, sorts any input of length `len`, including
/// non-power-of-two lengths (lanes whose partner falls off the array are
/// no-ops).
pub fn sort_schedule(len: usize) -> impl Iterator<Item = SortPass> {
    let padded = len.max(1).next_power_of_two() as u32;
    let num_stages = padded.ilog2();
    (0..num_stages).flat_map(|stage| {
        (0..=stage).map(move |step| {
            let group_width = 1u32 << (stage - step);
            SortPass {
                group_width,
                group_height: 2 * group_width - 1,
                step_index: step,
            }
        })
    })
}

/// Run one compare-exchange pass over the entry array.
///
/// Each lane resolves its `(left, right)` pair from the pass parameters and
/// swaps the two entries in place when they are out of order by key. The
/// pass has no data-dependent control flow: every lane executes the same
/// index arithmetic regardless of the data.
fn compare_exchange_pass(entries: &mut [CellEntry], pass: SortPass) {
    let len = entries.len();
    let lanes = len.max(1).next_power_of_two() / 2;
    dispatch::par_lanes(entries, lanes, |lane, shared| {
        let i = lane as u32;
        let h = i & (pass.group_width - 1);
        let index_left = h + (pass.group_height + 1) * (i / pass.group_width);
        let right_step = if pass.step_index == 0 {
            pass.group_height - 2 * h
        } else {
            (pass.group_height + 1) / 2
        };
        let index_right = index_left + right_step;
        if index_right as usize >= len {
            return;
        }
        // SAFETY: the network pairs every array index with at most one lane
        // per pass (the pairs partition [0, padded_len)), so no other lane
        // of this dispatch touches index_left or index_right.
        unsafe {
            let left = shared.get(index_left as usize);
            let right = shared.get(index_right as usize);
            if left.key > right.key {
                shared.set(index_left as usize, right);
                shared.set(index_right as usize, left);
            }
        }
    });
}

/// Sort an entry array ascending by key by driving the full bitonic
/// schedule, one barriered pass per schedule element.
///
/// Ties are broken arbitrarily: the network is not stable on the particle
/// index, and no caller depends on the order within a key run.
pub fn sort_entries(entries: &mut [CellEntry]) {
    for pass in sort_schedule(entries.len()) {
        compare_exchange_pass(entries, pass);
    }
}

// ---------------------------------------------------------------------------
// The index
// ---------------------------------------------------------------------------

/// Spatial hash index over a fixed particle population.
///
/// Rebuilt once per frame from predicted positions; between rebuilds it
/// answers candidate queries against the state it was last built from, which
/// is exactly what the density pass wants (it reads the previous frame's
/// index by design).
pub struct SpatialHash {
    /// `(key, index)` per particle; ascending by key after a rebuild.
    entries: Vec<CellEntry>,
    /// First sorted position per key, [`NO_OFFSET`] for absent keys.
    offsets: Vec<u32>,
}

impl SpatialHash {
    /// Create an index for `particle_count` particles.
    pub fn new(particle_count: usize) -> Self {
        Self {
            entries: vec![CellEntry::zeroed(); particle_count],
            offsets: vec![NO_OFFSET; particle_count],
        }
    }

    /// The entry array, sorted by key after the last [`SpatialHash::rebuild`].
    pub fn entries(&self) -> &[CellEntry] {
        &self.entries
    }

    /// The per-key offset table.
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Rebuild the index from the given positions: bin, sort, offsets.
    /// Each phase is a separate dispatch with a barrier in between.
    pub fn rebuild(&mut self, positions: &[Vec2], radius: f32, shift: Vec2) {
        debug_assert_eq!(positions.len(), self.entries.len());
        let table_size = self.offsets.len() as u32;
        if table_size == 0 {
            return;
        }

        dispatch::par_fill(&mut self.entries, |i| CellEntry {
            key: key_from_hash(hash_cell(cell_coord(positions[i], radius, shift)), table_size),
            index: i as u32,
        });

        sort_entries(&mut self.entries);

        self.compute_offsets();
        tracing::trace!(particles = positions.len(), "rebuilt spatial index");
    }

    /// Derive the offset table from the sorted entry array.
    ///
    /// A sorted position writes its index iff its key differs from the
    /// previous position's key, which marks exactly the first occurrence of
    /// every key present. Keys never present keep the sentinel.
    fn compute_offsets(&mut self) {
        dispatch::par_fill(&mut self.offsets, |_| NO_OFFSET);

        let entries = &self.entries;
        dispatch::par_lanes(&mut self.offsets, entries.len(), |i, shared| {
            let key = entries[i].key;
            let key_prev = if i == 0 { NO_OFFSET } else { entries[i - 1].key };
            if key != key_prev {
                // SAFETY: only the first position of a key run passes the
                // boundary test, so each offset slot is written by at most
                // one lane of this dispatch.
                unsafe { shared.set(key as usize, i as u32) };
            }
        });
    }

    /// Enumerate candidate particle indices near `position`.
    ///
    /// Walks the 3x3 block of cells around the position's cell and yields
    /// every particle filed under those cells' keys. The forward scan from
    /// each key's offset relies on the entries being sorted by key; it stops
    /// at the first mismatching key. Candidates include false positives from
    /// key collisions (and the querying particle itself, if its position is
    /// in the index) -- callers filter by true squared distance.
    pub fn for_each_candidate<F>(&self, position: Vec2, radius: f32, shift: Vec2, mut f: F)
    where
        F: FnMut(usize),
    {
        let table_size = self.offsets.len() as u32;
        if table_size == 0 {
            return;
        }
        let origin = cell_coord(position, radius, shift);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let cell = origin + IVec2::new(dx, dy);
                let key = key_from_hash(hash_cell(cell), table_size);
                let start = self.offsets[key as usize];
                if start == NO_OFFSET {
                    continue;
                }
                for entry in &self.entries[start as usize..] {
                    if entry.key != key {
                        break;
                    }
                    f(entry.index as usize);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys_of(entries: &[CellEntry]) -> Vec<u32> {
        entries.iter().map(|e| e.key).collect()
    }

    fn entries_from_keys(keys: &[u32]) -> Vec<CellEntry> {
        keys.iter()
            .enumerate()
            .map(|(index, &key)| CellEntry {
                key,
                index: index as u32,
            })
            .collect()
    }

    #[test]
    fn hash_is_pure_and_key_in_range() {
        let table_size = 37;
        for cx in -5..5 {
            for cy in -5..5 {
                let cell = IVec2::new(cx, cy);
                let a = key_from_hash(hash_cell(cell), table_size);
                let b = key_from_hash(hash_cell(cell), table_size);
                assert_eq!(a, b, "key must be deterministic for cell {cell:?}");
                assert!(a < table_size, "key {a} out of range for cell {cell:?}");
            }
        }
    }

    #[test]
    fn hash_wraps_instead_of_overflowing() {
        // Large coordinates force u32 wraparound; the result is still a
        // well-defined value.
        let cell = IVec2::new(i32::MAX, i32::MIN);
        assert_eq!(hash_cell(cell), hash_cell(cell));
    }

    #[test]
    fn cell_coord_uses_positive_extent_shift() {
        let shift = Vec2::new(10.0, 10.0);
        // The minimum corner (-10, -10) maps to cell (0, 0).
        assert_eq!(cell_coord(Vec2::new(-10.0, -10.0), 1.0, shift), IVec2::ZERO);
        assert_eq!(
            cell_coord(Vec2::new(-9.5, 3.2), 1.0, shift),
            IVec2::new(0, 13)
        );
        // Out-of-bounds positions still map to a well-defined (negative) cell.
        assert_eq!(
            cell_coord(Vec2::new(-11.5, 0.0), 1.0, shift),
            IVec2::new(-2, 10)
        );
    }

    #[test]
    fn schedule_shape_matches_padded_length() {
        // 7 elements pad to 8: 3 stages with 1, 2, 3 passes.
        let passes: Vec<SortPass> = sort_schedule(7).collect();
        assert_eq!(passes.len(), 6);
        assert_eq!(
            passes[0],
            SortPass {
                group_width: 1,
                group_height: 1,
                step_index: 0
            }
        );
        // Every stage opens with a mirrored merge pass.
        for pass in &passes {
            assert_eq!(pass.group_height, 2 * pass.group_width - 1);
            if pass.step_index == 0 {
                assert!(pass.group_width.is_power_of_two());
            }
        }
        // Trivial lengths need no passes at all.
        assert_eq!(sort_schedule(0).count(), 0);
        assert_eq!(sort_schedule(1).count(), 0);
    }

    #[test]
    fn sorts_small_arrays() {
        let cases: Vec<Vec<u32>> = vec![
            vec![],
            vec![5],
            vec![2, 1],
            vec![3, 2, 1],
            vec![2, 3, 1],
            vec![4, 3, 2, 1],
            vec![1, 1, 1, 1],
            vec![7, 0, 7, 0, 7, 0, 7],
            vec![9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
        ];
        for keys in cases {
            let mut entries = entries_from_keys(&keys);
            sort_entries(&mut entries);
            let sorted = keys_of(&entries);
            let mut expected = keys.clone();
            expected.sort_unstable();
            assert_eq!(sorted, expected, "input {keys:?}");

            // The index multiset is a permutation of 0..n.
            let mut indices: Vec<u32> = entries.iter().map(|e| e.index).collect();
            indices.sort_unstable();
            let expected_indices: Vec<u32> = (0..keys.len() as u32).collect();
            assert_eq!(indices, expected_indices, "input {keys:?}");
        }
    }

    #[test]
    fn offsets_mark_first_occurrence() {
        let mut index = SpatialHash::new(6);
        // Keys chosen to exercise runs and gaps over a table of size 6.
        index.entries = entries_from_keys(&[3, 1, 1, 5, 3, 1]);
        sort_entries(&mut index.entries);
        index.compute_offsets();

        assert_eq!(keys_of(&index.entries), vec![1, 1, 1, 3, 3, 5]);
        assert_eq!(index.offsets(), &[NO_OFFSET, 0, NO_OFFSET, 3, NO_OFFSET, 5]);
    }

    #[test]
    fn binning_groups_cellmates() {
        // Four particles, two per cell, cells far apart. The first pair must
        // share a key that differs from the second pair's key; the absence of
        // a collision is established by direct hash computation below.
        let radius = 1.0;
        let shift = Vec2::new(10.0, 10.0);
        let positions = [
            Vec2::new(0.1, 0.1),
            Vec2::new(0.4, 0.3),
            Vec2::new(7.1, 8.2),
            Vec2::new(7.3, 8.4),
        ];
        let table_size = positions.len() as u32;

        let key_a = key_from_hash(hash_cell(cell_coord(positions[0], radius, shift)), table_size);
        let key_b = key_from_hash(hash_cell(cell_coord(positions[2], radius, shift)), table_size);
        assert_ne!(key_a, key_b, "test layout must not collide");

        let mut index = SpatialHash::new(positions.len());
        index.rebuild(&positions, radius, shift);

        let key_of = |particle: u32| {
            index
                .entries()
                .iter()
                .find(|e| e.index == particle)
                .expect("every particle is binned")
                .key
        };
        assert_eq!(key_of(0), key_of(1));
        assert_eq!(key_of(2), key_of(3));
        assert_ne!(key_of(0), key_of(2));
    }

    #[test]
    fn candidates_cover_adjacent_cells() {
        let radius = 1.0;
        let shift = Vec2::new(10.0, 10.0);
        // Particle 1 sits in the cell to the right of particle 0, within the
        // stencil; particle 2 is far away.
        let positions = [
            Vec2::new(0.9, 0.5),
            Vec2::new(1.1, 0.5),
            Vec2::new(8.0, 8.0),
        ];
        let mut index = SpatialHash::new(positions.len());
        index.rebuild(&positions, radius, shift);

        let mut candidates = Vec::new();
        index.for_each_candidate(positions[0], radius, shift, |j| candidates.push(j));
        candidates.sort_unstable();
        candidates.dedup();
        assert!(candidates.contains(&0), "query cell itself is scanned");
        assert!(candidates.contains(&1), "adjacent cell is scanned");
        // Particle 2 may only appear through a key collision; verify the
        // layout avoids one so the assertion below is meaningful.
        let key_far = key_from_hash(hash_cell(cell_coord(positions[2], radius, shift)), 3);
        let mut stencil_keys = Vec::new();
        let origin = cell_coord(positions[0], radius, shift);
        for dy in -1..=1 {
            for dx in -1..=1 {
                stencil_keys.push(key_from_hash(hash_cell(origin + IVec2::new(dx, dy)), 3));
            }
        }
        if !stencil_keys.contains(&key_far) {
            assert!(!candidates.contains(&2), "distant particle is not scanned");
        }
    }

    #[test]
    fn absent_keys_keep_the_sentinel() {
        let shift = Vec2::new(5.0, 5.0);
        let positions = [Vec2::ZERO; 4];
        let mut index = SpatialHash::new(4);
        index.rebuild(&positions, 1.0, shift);

        // One occupied cell: a single offset is real (the run starts at
        // sorted position 0) and every other key keeps the sentinel.
        let real: Vec<u32> = index
            .offsets()
            .iter()
            .copied()
            .filter(|&offset| offset != NO_OFFSET)
            .collect();
        assert_eq!(real, vec![0]);

        // A query at the occupied cell sees every particle; colliding
        // stencil keys may rescan the run, so dedup before comparing.
        let mut candidates = Vec::new();
        index.for_each_candidate(Vec2::ZERO, 1.0, shift, |j| candidates.push(j));
        candidates.sort_unstable();
        candidates.dedup();
        assert_eq!(candidates, vec![0, 1, 2, 3]);
    }
}
