//! Dynamic closest-pair maintenance in 2D through shifted bit-interleaved
//! orderings (Chan's algorithm), and the angle-only clustering driver
//! built on it.
//!
//! No single space-filling order guarantees that a point's true nearest
//! neighbour sits nearby in the order, but the union of candidate windows
//! from three orderings whose coordinates are shifted by 0, ⌊2³¹/3⌋ and
//! ⌊2³¹·2/3⌋ provably does. Each ordering lives in a circular search tree;
//! a min-heap over every point's best-known neighbour distance yields the
//! global closest pair in O(log N).

mod search_tree;

use glam::DVec2;
use search_tree::SearchTree;

use crate::history::ClusterSequence;
use crate::measure::Recombiner;
use crate::min_heap::MinHeap;
use crate::types::{MAX_RAP, TWO_PI};

pub(crate) const NONE: u32 = u32::MAX;

const NSHIFT: usize = 3;
const TWO_POW_31: f64 = 2_147_483_648.0;

/// Window of circular-order neighbours examined per ordering; large
/// enough that the three windows jointly always contain the true nearest
/// neighbour.
const CP_SEARCH_RANGE: usize = 30;

// review flags
const REMOVE_HEAP_ENTRY: u8 = 1;
const REVIEW_HEAP_ENTRY: u8 = 2;
const REVIEW_NEIGHBOUR: u8 = 4;

/// A point's coordinates scaled to 31-bit integers and offset by one of
/// the shifts; ordered by most-significant differing bit pair.
#[derive(Debug, Clone, Copy, Default)]
struct Shuffle {
    x: u32,
    y: u32,
    point: u32,
}

/// `floor(log2 x) < floor(log2 y)` without computing either logarithm.
#[inline]
fn floor_log2_less(x: u32, y: u32) -> bool {
    x < y && x < (x ^ y)
}

impl Shuffle {
    #[inline]
    fn less(&self, other: &Shuffle) -> bool {
        if floor_log2_less(self.x ^ other.x, self.y ^ other.y) {
            self.y < other.y
        } else {
            self.x < other.x
        }
    }
}

impl PartialEq for Shuffle {
    fn eq(&self, other: &Self) -> bool {
        !self.less(other) && !other.less(self)
    }
}
impl Eq for Shuffle {}
impl PartialOrd for Shuffle {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Shuffle {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        if self.less(other) {
            std::cmp::Ordering::Less
        } else if other.less(self) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CpPoint {
    coord: DVec2,
    neighbour: u32,
    neighbour_dist2: f64,
    /// One node id per ordering.
    circ: [u32; NSHIFT],
    review_flag: u8,
}

impl Default for CpPoint {
    fn default() -> Self {
        Self {
            coord: DVec2::ZERO,
            neighbour: NONE,
            neighbour_dist2: f64::MAX,
            circ: [NONE; NSHIFT],
            review_flag: 0,
        }
    }
}

/// Closest-pair structure over a dynamic 2D point set.
pub(crate) struct ClosestPair2D {
    trees: Vec<SearchTree<Shuffle>>,
    heap: MinHeap,
    points: Vec<CpPoint>,
    available: Vec<u32>,
    under_review: Vec<u32>,
    left_corner: DVec2,
    range: f64,
    shifts: [u32; NSHIFT],
}

impl ClosestPair2D {
    /// Build over `positions`, all of which must lie inside the
    /// `left_corner`..`right_corner` box. The structure can hold up to
    /// `max_size` points as removals free up slots.
    pub fn new(
        positions: &[DVec2],
        left_corner: DVec2,
        right_corner: DVec2,
        max_size: usize,
    ) -> Self {
        let n = positions.len();
        assert!(n >= 1 && max_size >= n);

        let range = (right_corner.x - left_corner.x).max(right_corner.y - left_corner.y);

        let mut shifts = [0u32; NSHIFT];
        for (k, s) in shifts.iter_mut().enumerate() {
            // double precision: the product overflows u32 arithmetic
            *s = (TWO_POW_31 * k as f64 / NSHIFT as f64) as u32;
        }

        let mut points: Vec<CpPoint> = vec![CpPoint::default(); max_size];
        for (i, &c) in positions.iter().enumerate() {
            points[i].coord = c;
        }
        let available: Vec<u32> = (n as u32..max_size as u32).collect();

        let mut cp = ClosestPair2D {
            trees: Vec::with_capacity(NSHIFT),
            heap: MinHeap::with_max_size(&[], max_size),
            points,
            available,
            under_review: Vec::with_capacity(NSHIFT * CP_SEARCH_RANGE),
            left_corner,
            range,
            shifts,
        };

        let cp_range = CP_SEARCH_RANGE.min(n - 1);
        for ishift in 0..NSHIFT {
            let mut shuffles: Vec<Shuffle> = (0..n as u32)
                .map(|i| cp.make_shuffle(i as usize, cp.shifts[ishift]))
                .collect();
            shuffles.sort_unstable();
            let tree = SearchTree::new(&shuffles, max_size);

            // walk the ring once: record each point's node and seed its
            // neighbour from the forward window
            let start = tree.somewhere();
            let mut circ = start;
            loop {
                let this_point = tree.value(circ).point as usize;
                cp.points[this_point].circ[ishift] = circ;
                let mut other = circ;
                for _ in 0..cp_range {
                    other = tree.succ(other);
                    let op = tree.value(other).point;
                    let dist2 = cp.distance2(this_point, op as usize);
                    if dist2 < cp.points[this_point].neighbour_dist2 {
                        cp.points[this_point].neighbour_dist2 = dist2;
                        cp.points[this_point].neighbour = op;
                    }
                }
                circ = tree.succ(circ);
                if circ == start {
                    break;
                }
            }
            cp.trees.push(tree);
        }

        let mindists: Vec<f64> = (0..n).map(|i| cp.points[i].neighbour_dist2).collect();
        cp.heap = MinHeap::with_max_size(&mindists, max_size);
        cp
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.points.len() - self.available.len()
    }

    #[inline]
    fn distance2(&self, a: usize, b: usize) -> f64 {
        (self.points[a].coord - self.points[b].coord).length_squared()
    }

    fn make_shuffle(&self, point: usize, shift: u32) -> Shuffle {
        let renorm = (self.points[point].coord - self.left_corner) / self.range;
        debug_assert!(
            (0.0..=1.0).contains(&renorm.x) && (0.0..=1.0).contains(&renorm.y),
            "point ({}, {}) outside the declared bounding box",
            self.points[point].coord.x,
            self.points[point].coord.y
        );
        Shuffle {
            x: ((TWO_POW_31 * renorm.x) as u32).wrapping_add(shift),
            y: ((TWO_POW_31 * renorm.y) as u32).wrapping_add(shift),
            point: point as u32,
        }
    }

    /// The ids of the current closest pair and their squared distance.
    pub fn closest_pair(&self) -> (usize, usize, f64) {
        let id1 = self.heap.min_position();
        let id2 = self.points[id1].neighbour as usize;
        let dist2 = self.points[id1].neighbour_dist2;
        if id1 > id2 {
            (id2, id1, dist2)
        } else {
            (id1, id2, dist2)
        }
    }

    fn add_label(&mut self, point: usize, flag: u8) {
        if self.points[point].review_flag == 0 {
            self.under_review.push(point as u32);
        }
        self.points[point].review_flag |= flag;
    }

    fn set_label(&mut self, point: usize, flag: u8) {
        if self.points[point].review_flag == 0 {
            self.under_review.push(point as u32);
        }
        self.points[point].review_flag = flag;
    }

    fn allocate(&mut self, coord: DVec2) -> usize {
        let id = self
            .available
            .pop()
            .expect("closest-pair capacity exceeded") as usize;
        self.points[id].coord = coord;
        id
    }

    /// Insert a new position, returning its id.
    #[allow(dead_code)]
    pub fn insert(&mut self, coord: DVec2) -> usize {
        let id = self.allocate(coord);
        self.insert_into_search_trees(id);
        self.deal_with_points_to_review();
        id
    }

    /// Remove the point with the given id.
    #[allow(dead_code)]
    pub fn remove(&mut self, id: usize) {
        self.remove_from_search_trees(id);
        self.deal_with_points_to_review();
    }

    /// Remove two points and insert one in their place, returning the
    /// new id.
    #[allow(dead_code)]
    pub fn replace(&mut self, id1: usize, id2: usize, coord: DVec2) -> usize {
        self.remove_from_search_trees(id1);
        self.remove_from_search_trees(id2);
        let id = self.allocate(coord);
        self.insert_into_search_trees(id);
        self.deal_with_points_to_review();
        id
    }

    /// Remove `ids` and insert `new_positions`, reporting the allocated
    /// ids in `new_ids`.
    pub fn replace_many(&mut self, ids: &[u32], new_positions: &[DVec2], new_ids: &mut Vec<u32>) {
        for &id in ids {
            self.remove_from_search_trees(id as usize);
        }
        new_ids.clear();
        for &pos in new_positions {
            let id = self.allocate(pos);
            self.insert_into_search_trees(id);
            new_ids.push(id as u32);
        }
        self.deal_with_points_to_review();
    }

    fn remove_from_search_trees(&mut self, id: usize) {
        // freeing the slot first also shrinks size(), which sets the
        // window for who could have had `id` as their neighbour
        self.available.push(id as u32);
        self.set_label(id, REMOVE_HEAP_ENTRY);

        let cp_range = CP_SEARCH_RANGE.min(self.size() - 1);

        for ishift in 0..NSHIFT {
            let removed_circ = self.points[id].circ[ishift];
            let orig_right_end = self.trees[ishift].succ(removed_circ);
            self.trees[ishift].remove(removed_circ);

            let mut right_end = orig_right_end;
            let mut left_end = orig_right_end;
            for _ in 0..cp_range {
                left_end = self.trees[ishift].pred(left_end);
            }
            if self.size() - 1 < CP_SEARCH_RANGE {
                // the window is narrower than it was when neighbours were
                // found, so reach one further back
                left_end = self.trees[ishift].pred(left_end);
                right_end = self.trees[ishift].pred(right_end);
            }

            loop {
                let left_point = *self.trees[ishift].value(left_end);
                let lp = left_point.point as usize;
                if self.points[lp].neighbour == id as u32 {
                    // lost its neighbour; rescan later in the review pass
                    self.add_label(lp, REVIEW_NEIGHBOUR);
                } else {
                    // the window shifted: the right-end point is the one
                    // candidate that newly entered lp's range
                    let rp = self.trees[ishift].value(right_end).point as usize;
                    let dist2 = self.distance2(lp, rp);
                    if dist2 < self.points[lp].neighbour_dist2 {
                        self.points[lp].neighbour = rp as u32;
                        self.points[lp].neighbour_dist2 = dist2;
                        self.add_label(lp, REVIEW_HEAP_ENTRY);
                    }
                }
                right_end = self.trees[ishift].succ(right_end);
                left_end = self.trees[ishift].succ(left_end);
                if left_end == orig_right_end {
                    break;
                }
            }
        }
    }

    fn insert_into_search_trees(&mut self, id: usize) {
        self.set_label(id, REVIEW_HEAP_ENTRY);
        self.points[id].neighbour_dist2 = f64::MAX;
        self.points[id].neighbour = NONE;

        let cp_range = CP_SEARCH_RANGE.min(self.size() - 1);

        for ishift in 0..NSHIFT {
            let shuffle = self.make_shuffle(id, self.shifts[ishift]);
            let new_circ = self.trees[ishift].insert(shuffle);
            self.points[id].circ[ishift] = new_circ;

            let mut right_edge = self.trees[ishift].succ(new_circ);
            let mut left_edge = new_circ;
            for _ in 0..cp_range {
                left_edge = self.trees[ishift].pred(left_edge);
            }

            loop {
                let lp = self.trees[ishift].value(left_edge).point as usize;
                let rp = self.trees[ishift].value(right_edge).point as usize;

                // the new point may beat the left point's neighbour
                let dist2 = self.distance2(lp, id);
                if dist2 < self.points[lp].neighbour_dist2 {
                    self.points[lp].neighbour_dist2 = dist2;
                    self.points[lp].neighbour = id as u32;
                    self.add_label(lp, REVIEW_HEAP_ENTRY);
                }

                // and the right point may be the new point's neighbour
                let dist2 = self.distance2(id, rp);
                if dist2 < self.points[id].neighbour_dist2 {
                    self.points[id].neighbour_dist2 = dist2;
                    self.points[id].neighbour = rp as u32;
                }

                // the insertion pushed the right point out of the left
                // point's window; if it was the neighbour, rescan
                if self.points[lp].neighbour == rp as u32 {
                    self.add_label(lp, REVIEW_NEIGHBOUR);
                }

                right_edge = self.trees[ishift].succ(right_edge);
                left_edge = self.trees[ishift].succ(left_edge);
                if left_edge == new_circ {
                    break;
                }
            }
        }
    }

    /// Apply the actions accumulated on the review list: drop removed
    /// points from the heap, rescan lost neighbours, refresh heap keys.
    fn deal_with_points_to_review(&mut self) {
        let cp_range = CP_SEARCH_RANGE.min(self.size() - 1);

        while let Some(id) = self.under_review.pop() {
            let id = id as usize;
            let flag = self.points[id].review_flag;

            if flag & REMOVE_HEAP_ENTRY != 0 {
                debug_assert_eq!(flag, REMOVE_HEAP_ENTRY, "removed point with extra labels");
                self.heap.remove(id);
            } else {
                if flag & REVIEW_NEIGHBOUR != 0 {
                    self.points[id].neighbour_dist2 = f64::MAX;
                    self.points[id].neighbour = NONE;
                    for ishift in 0..NSHIFT {
                        let mut other = self.points[id].circ[ishift];
                        for _ in 0..cp_range {
                            other = self.trees[ishift].succ(other);
                            let op = self.trees[ishift].value(other).point;
                            let dist2 = self.distance2(id, op as usize);
                            if dist2 < self.points[id].neighbour_dist2 {
                                self.points[id].neighbour_dist2 = dist2;
                                self.points[id].neighbour = op;
                            }
                        }
                    }
                }
                self.heap.update(id, self.points[id].neighbour_dist2);
            }

            self.points[id].review_flag = 0;
        }
    }
}

// ---- angle-only clustering driver --------------------------------------

/// Mirror a coordinate across the azimuthal seam when it lies within
/// `d_lim` of it.
fn make_mirror(p: &mut DVec2, d_lim: f64) -> bool {
    if p.y < d_lim {
        p.y += TWO_PI;
        return true;
    }
    if TWO_PI - p.y < d_lim {
        p.y -= TWO_PI;
        return true;
    }
    false
}

/// Cluster all pairs below distance `d_lim`, leaving anything wider for a
/// later stage (or the final beam absorption).
fn limited_cluster(cs: &mut ClusterSequence, recombiner: &dyn Recombiner, d_lim: f64) {
    let cap = 2 * cs.initial_n;
    // per arena point: its coordinate id and that of its mirror copy
    let mut orig_id = vec![NONE; cap];
    let mut mirror_id = vec![NONE; cap];
    let mut jet_of_coord = vec![NONE; cap];
    let mut coords: Vec<DVec2> = Vec::with_capacity(cap);

    // Mirroring beyond π would push copies outside the fixed strip, and
    // by then every point has a copy anyway.
    let d_lim4mirror = d_lim.min(std::f64::consts::PI);

    let mut min_rap = f64::MAX;
    let mut max_rap = -f64::MAX;
    let mut n_active = 0usize;

    for jet_i in 0..cs.points.len() {
        // skip consumed jets and those parked at infinite rapidity
        if cs.history[cs.point_history[jet_i] as usize].child.is_some()
            || cs.geoms[jet_i].rap.abs() >= MAX_RAP
        {
            continue;
        }
        n_active += 1;

        let c = DVec2::new(cs.geoms[jet_i].rap, cs.geoms[jet_i].phi);
        orig_id[jet_i] = coords.len() as u32;
        jet_of_coord[coords.len()] = jet_i as u32;
        coords.push(c);
        min_rap = min_rap.min(c.x);
        max_rap = max_rap.max(c.x);

        let mut m = c;
        if make_mirror(&mut m, d_lim4mirror) {
            mirror_id[jet_i] = coords.len() as u32;
            jet_of_coord[coords.len()] = jet_i as u32;
            coords.push(m);
        }
    }

    if n_active < 2 {
        return;
    }

    // a strip wide enough for every mirror copy, with rapidity leeway
    let left_edge = DVec2::new(min_rap - 1.0, -3.15);
    let right_edge = DVec2::new(max_rap + 1.0, 9.45);
    let max_size = coords.len();
    let mut cp = ClosestPair2D::new(&coords, left_edge, right_edge, max_size);

    let mut to_remove: Vec<u32> = Vec::with_capacity(4);
    let mut new_points: Vec<DVec2> = Vec::with_capacity(2);
    let mut new_ids: Vec<u32> = Vec::with_capacity(2);

    loop {
        let (cid1, cid2, dist2) = cp.closest_pair();
        if dist2 > d_lim * d_lim {
            break;
        }

        let jet_i = jet_of_coord[cid1] as usize;
        let jet_j = jet_of_coord[cid2] as usize;
        assert_ne!(jet_i, jet_j, "closest pair matched a point with its own mirror");
        let newjet = cs.do_ij_recombination(jet_i, jet_j, dist2 * cs.inv_r2, recombiner);

        // with one active point left there is nothing more to pair (and
        // the search structure cannot be emptied further)
        n_active -= 1;
        if n_active == 1 {
            break;
        }

        to_remove.clear();
        to_remove.push(orig_id[jet_i]);
        to_remove.push(orig_id[jet_j]);
        if mirror_id[jet_i] != NONE {
            to_remove.push(mirror_id[jet_i]);
        }
        if mirror_id[jet_j] != NONE {
            to_remove.push(mirror_id[jet_j]);
        }

        let mut np = DVec2::new(cs.geoms[newjet].rap, cs.geoms[newjet].phi);
        new_points.clear();
        new_points.push(np);
        if make_mirror(&mut np, d_lim4mirror) {
            new_points.push(np);
        }

        cp.replace_many(&to_remove, &new_points, &mut new_ids);

        orig_id[newjet] = new_ids[0];
        jet_of_coord[new_ids[0] as usize] = newjet as u32;
        if new_ids.len() == 2 {
            mirror_id[newjet] = new_ids[1];
            jet_of_coord[new_ids[1] as usize] = newjet as u32;
        } else {
            mirror_id[newjet] = NONE;
        }
    }
}

/// The O(N log N) angle-only clustering path: a thinning pass at a small
/// distance cap, the full pass up to R, then beam absorption of every
/// surviving jet at unit distance.
pub(crate) fn closest_pair_cam_cluster(cs: &mut ClusterSequence, recombiner: &dyn Recombiner) {
    debug_assert!(
        cs.algorithm.is_geometric(),
        "closest-pair path requires a geometric measure"
    );

    // clustering the short-range pairs first keeps the mirrored strip
    // sparse for the expensive full-distance stage
    if cs.r >= 0.39 {
        limited_cluster(cs, recombiner, (cs.r / 2.0).min(0.3));
    }
    limited_cluster(cs, recombiner, cs.r);

    let n = cs.history.len();
    for h in 0..n {
        if cs.history[h].child.is_none() {
            let p = cs.history[h]
                .point
                .expect("live history row must reference a point");
            cs.do_beam_recombination(p as usize, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_coords(n: usize, seed: u64) -> Vec<DVec2> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| DVec2::new(rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0)))
            .collect()
    }

    fn brute_force_closest(coords: &[Option<DVec2>]) -> f64 {
        let mut best = f64::MAX;
        let live: Vec<DVec2> = coords.iter().flatten().copied().collect();
        for i in 0..live.len() {
            for j in (i + 1)..live.len() {
                best = best.min((live[i] - live[j]).length_squared());
            }
        }
        best
    }

    #[test]
    fn test_shuffle_ordering_is_total() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let shuffles: Vec<Shuffle> = (0..60)
            .map(|i| Shuffle {
                x: rng.gen(),
                y: rng.gen(),
                point: i,
            })
            .collect();
        for a in &shuffles {
            for b in &shuffles {
                // antisymmetry of the bit-interleaved comparison
                assert!(!(a.less(b) && b.less(a)));
                for c in &shuffles {
                    if a.less(b) && b.less(c) {
                        assert!(a.less(c), "transitivity violated");
                    }
                }
            }
        }
    }

    #[test]
    fn test_initial_closest_pair_matches_brute_force() {
        for seed in 0..5u64 {
            let coords = random_coords(60, seed);
            let boxed: Vec<Option<DVec2>> = coords.iter().copied().map(Some).collect();
            let cp = ClosestPair2D::new(
                &coords,
                DVec2::new(-1.0, -1.0),
                DVec2::new(11.0, 11.0),
                coords.len(),
            );
            let (i, j, d2) = cp.closest_pair();
            assert_ne!(i, j);
            let want = brute_force_closest(&boxed);
            assert!(
                (d2 - want).abs() < 1e-12,
                "seed {}: closest pair {} but brute force {}",
                seed,
                d2,
                want
            );
        }
    }

    #[test]
    fn test_closest_pair_tracks_removals_and_inserts() {
        let mut rng = ChaCha8Rng::seed_from_u64(777);
        let coords = random_coords(80, 99);
        let mut shadow: Vec<Option<DVec2>> = coords.iter().copied().map(Some).collect();
        let mut cp = ClosestPair2D::new(
            &coords,
            DVec2::new(-1.0, -1.0),
            DVec2::new(11.0, 11.0),
            coords.len(),
        );

        for step in 0..60 {
            // remove a random live point, insert a fresh one
            let live: Vec<usize> = (0..shadow.len()).filter(|&i| shadow[i].is_some()).collect();
            if live.len() > 2 {
                let victim = live[rng.gen_range(0..live.len())];
                cp.remove(victim);
                shadow[victim] = None;
            }
            if rng.gen_bool(0.7) {
                let c = DVec2::new(rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0));
                let id = cp.insert(c);
                shadow[id] = Some(c);
            }

            let (_, _, d2) = cp.closest_pair();
            let want = brute_force_closest(&shadow);
            assert!(
                (d2 - want).abs() < 1e-12,
                "step {}: closest pair {} but brute force {}",
                step,
                d2,
                want
            );
        }
    }

    #[test]
    fn test_replace_reuses_slots() {
        let coords = random_coords(10, 3);
        let mut cp = ClosestPair2D::new(
            &coords,
            DVec2::new(-1.0, -1.0),
            DVec2::new(11.0, 11.0),
            coords.len(),
        );
        let before = cp.size();
        let id = cp.replace(0, 1, DVec2::new(5.0, 5.0));
        assert!(id < coords.len());
        assert_eq!(cp.size(), before - 1);
    }

    #[test]
    fn test_make_mirror() {
        let mut p = DVec2::new(0.0, 0.1);
        assert!(make_mirror(&mut p, 0.5));
        assert!((p.y - (TWO_PI + 0.1)).abs() < 1e-12);

        let mut q = DVec2::new(0.0, TWO_PI - 0.1);
        assert!(make_mirror(&mut q, 0.5));
        assert!((q.y - (-0.1)).abs() < 1e-12);

        let mut r = DVec2::new(0.0, 3.0);
        assert!(!make_mirror(&mut r, 0.5));
    }
}
