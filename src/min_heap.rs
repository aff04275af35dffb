//! Array-backed minimum tracker with cheap arbitrary-position updates.
//!
//! Unlike a conventional binary heap, values never move: slot `i` always
//! holds the value for entry `i`, and each slot additionally caches the
//! position of the minimum over the subtree rooted at it (slot 0 therefore
//! always knows the global minimum). An update walks only the root path of
//! the changed slot and stops as soon as it can no longer affect an
//! ancestor's cached minimum, which makes typical updates near O(1) and the
//! worst case O(log n).

/// Sentinel stored in removed or never-filled slots.
const DEAD_VALUE: f64 = f64::MAX;

#[derive(Debug, Clone, Copy)]
struct Slot {
    value: f64,
    /// Position of the minimum value within this slot's subtree
    /// (including the slot itself).
    min: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct MinHeap {
    slots: Vec<Slot>,
}

impl MinHeap {
    /// Build a heap over `values`. Slot `i` corresponds to `values[i]`.
    pub fn new(values: &[f64]) -> Self {
        Self::with_max_size(values, values.len())
    }

    /// Build a heap that can later grow to `max_size` slots via
    /// `update`; slots beyond `values.len()` start out dead.
    pub fn with_max_size(values: &[f64], max_size: usize) -> Self {
        assert!(max_size >= values.len());
        let mut slots = Vec::with_capacity(max_size);
        for (i, &v) in values.iter().enumerate() {
            slots.push(Slot {
                value: v,
                min: i as u32,
            });
        }
        for i in values.len()..max_size {
            slots.push(Slot {
                value: DEAD_VALUE,
                min: i as u32,
            });
        }

        // Bubble subtree minima towards the root.
        let mut heap = Self { slots };
        for i in (1..heap.slots.len()).rev() {
            let parent = (i - 1) / 2;
            let here_min = heap.slots[i].min;
            let parent_min = heap.slots[parent].min;
            if heap.slots[here_min as usize].value < heap.slots[parent_min as usize].value {
                heap.slots[parent].min = here_min;
            }
        }
        heap
    }

    /// Position of the global minimum.
    #[inline]
    pub fn min_position(&self) -> usize {
        self.slots[0].min as usize
    }

    /// The global minimum value.
    #[inline]
    pub fn min_value(&self) -> f64 {
        self.slots[self.slots[0].min as usize].value
    }

    #[cfg(test)]
    pub fn value_at(&self, pos: usize) -> f64 {
        self.slots[pos].value
    }

    /// Logically remove the entry at `pos`. The slot must not be reused
    /// afterwards except through `update` with a fresh value.
    #[inline]
    pub fn remove(&mut self, pos: usize) {
        self.update(pos, DEAD_VALUE);
    }

    /// Change the value at `pos` and repair the cached minima along the
    /// path to the root. Out-of-range positions are a programming error.
    pub fn update(&mut self, pos: usize, new_value: f64) {
        assert!(
            pos < self.slots.len(),
            "heap position {} out of range ({} slots)",
            pos,
            self.slots.len()
        );

        let start = pos as u32;
        let start_min = self.slots[pos].min;

        // If the subtree minimum lies below us and we are not undercutting
        // it, nothing above can change.
        if start_min != start && !(new_value < self.slots[start_min as usize].value) {
            self.slots[pos].value = new_value;
            return;
        }

        self.slots[pos].value = new_value;
        self.slots[pos].min = start;

        let n = self.slots.len();
        let mut loc = pos;
        let mut change_made = true;
        while change_made {
            change_made = false;

            // A cached minimum that pointed at the changed slot is stale
            // and must be recomputed from the children.
            if self.slots[loc].min == start {
                self.slots[loc].min = loc as u32;
                change_made = true;
            }

            let child = 2 * loc + 1;
            if child < n {
                let cmin = self.slots[child].min;
                if self.slots[cmin as usize].value
                    < self.slots[self.slots[loc].min as usize].value
                {
                    self.slots[loc].min = cmin;
                    change_made = true;
                }
            }
            let child = 2 * loc + 2;
            if child < n {
                let cmin = self.slots[child].min;
                if self.slots[cmin as usize].value
                    < self.slots[self.slots[loc].min as usize].value
                {
                    self.slots[loc].min = cmin;
                    change_made = true;
                }
            }

            if loc == 0 {
                break;
            }
            loc = (loc - 1) / 2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Reference minimum over the live slots of a shadow array.
    fn brute_force_min(values: &[f64]) -> (usize, f64) {
        let mut best = 0;
        for i in 1..values.len() {
            if values[i] < values[best] {
                best = i;
            }
        }
        (best, values[best])
    }

    #[test]
    fn test_initial_minimum() {
        let values = [5.0, 3.0, 8.0, 1.0, 9.0, 2.5];
        let heap = MinHeap::new(&values);
        assert_eq!(heap.min_position(), 3);
        assert_eq!(heap.min_value(), 1.0);
    }

    #[test]
    fn test_single_value() {
        let heap = MinHeap::new(&[42.0]);
        assert_eq!(heap.min_position(), 0);
        assert_eq!(heap.min_value(), 42.0);
    }

    #[test]
    fn test_update_and_remove_small() {
        let mut heap = MinHeap::new(&[5.0, 3.0, 8.0]);
        heap.update(2, 0.5);
        assert_eq!(heap.min_position(), 2);
        heap.remove(2);
        assert_eq!(heap.min_position(), 1);
        heap.update(0, 1.0);
        assert_eq!(heap.min_position(), 0);
        assert_eq!(heap.min_value(), 1.0);
    }

    #[test]
    fn test_headroom_slots_start_dead() {
        let mut heap = MinHeap::with_max_size(&[4.0, 6.0], 5);
        assert_eq!(heap.min_position(), 0);
        heap.update(4, 0.25);
        assert_eq!(heap.min_position(), 4);
        assert_eq!(heap.min_value(), 0.25);
    }

    #[test]
    fn test_randomized_updates_match_brute_force() {
        let mut rng = ChaCha8Rng::seed_from_u64(987654);
        for n in [1usize, 2, 3, 7, 16, 63, 200] {
            let mut shadow: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..100.0)).collect();
            let mut heap = MinHeap::new(&shadow);

            for step in 0..500 {
                let pos = rng.gen_range(0..n);
                if rng.gen_bool(0.15) && shadow.iter().filter(|v| **v < DEAD_VALUE).count() > 1 {
                    heap.remove(pos);
                    shadow[pos] = DEAD_VALUE;
                } else {
                    let v = rng.gen_range(0.0..100.0);
                    heap.update(pos, v);
                    shadow[pos] = v;
                }

                let (_, want_val) = brute_force_min(&shadow);
                assert_eq!(
                    heap.min_value(),
                    want_val,
                    "n={}, step={}: heap min {} at {} but brute force says {}",
                    n,
                    step,
                    heap.min_value(),
                    heap.min_position(),
                    want_val
                );
                // the position must agree with the shadow value it claims
                assert_eq!(shadow[heap.min_position()], heap.min_value());
            }
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_update_panics() {
        let mut heap = MinHeap::new(&[1.0, 2.0]);
        heap.update(7, 0.0);
    }
}
