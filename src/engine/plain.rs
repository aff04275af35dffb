//! Index-free engines: the O(N³) reference loop and the flat-array O(N²)
//! engine with nearest-neighbour caches.

use crate::history::ClusterSequence;
use crate::measure::Recombiner;
use crate::types::{geom_dist2, PointGeom};

pub(crate) const NONE: u32 = u32::MAX;

/// Working record for one active point. Slots are compacted as points
/// disappear; `nn` refers to slots, `point` to the arena.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BriefPoint {
    pub geom: PointGeom,
    pub scale: f64,
    pub nn_dist: f64,
    pub nn: u32,
    pub point: u32,
}

#[inline]
pub(crate) fn set_jetinfo(cs: &ClusterSequence, point: usize) -> BriefPoint {
    BriefPoint {
        geom: cs.geoms[point],
        scale: cs.scale(point),
        // no neighbour within R is encoded as nn_dist = R², which makes
        // the combined distance formula collapse to the beam distance
        nn_dist: cs.r2,
        nn: NONE,
        point: point as u32,
    }
}

/// Combined distance of a slot, carrying the engine-internal factor of R²
/// that extraction divides back out.
#[inline]
pub(crate) fn bj_dij(bj: &[BriefPoint], i: usize) -> f64 {
    let mut scale = bj[i].scale;
    if bj[i].nn != NONE {
        let other = bj[bj[i].nn as usize].scale;
        if other < scale {
            scale = other;
        }
    }
    bj[i].nn_dist * scale
}

/// Recompute slot `i`'s nearest neighbour from scratch, leaving every
/// other slot untouched.
fn set_nn_nocross(bj: &mut [BriefPoint], i: usize, n: usize, r2: f64) {
    let mut nn_dist = r2;
    let mut nn = NONE;
    for j in 0..n {
        if j == i {
            continue;
        }
        let dist = geom_dist2(&bj[i].geom, &bj[j].geom);
        if dist < nn_dist {
            nn_dist = dist;
            nn = j as u32;
        }
    }
    bj[i].nn_dist = nn_dist;
    bj[i].nn = nn;
}

/// Recompute every pairwise distance on every iteration. Cubic and only
/// useful as a differential oracle for the indexed engines.
pub(crate) fn really_dumb_cluster(cs: &mut ClusterSequence, recombiner: &dyn Recombiner) {
    let mut active: Vec<usize> = (0..cs.n_inputs()).collect();

    while !active.is_empty() {
        let mut best_d = f64::MAX;
        let mut best_i = 0usize;
        let mut best_j: Option<usize> = None;

        for ia in 0..active.len() {
            let dib = cs.scale(active[ia]);
            if dib < best_d {
                best_d = dib;
                best_i = ia;
                best_j = None;
            }
            for ib in (ia + 1)..active.len() {
                let scale = cs.scale(active[ia]).min(cs.scale(active[ib]));
                let dij =
                    geom_dist2(&cs.geoms[active[ia]], &cs.geoms[active[ib]]) * cs.inv_r2 * scale;
                if dij < best_d {
                    best_d = dij;
                    best_i = ia;
                    best_j = Some(ib);
                }
            }
        }

        match best_j {
            Some(ib) => {
                let merged =
                    cs.do_ij_recombination(active[best_i], active[ib], best_d, recombiner);
                active[best_i] = merged;
                active.remove(ib);
            }
            None => {
                cs.do_beam_recombination(active[best_i], best_d);
                active.remove(best_i);
            }
        }
    }
}

/// Flat-array O(N²) engine: exact nearest-neighbour caches, global
/// minimum by linear scan, localized repair after each event.
pub(crate) fn plain_n2_cluster(cs: &mut ClusterSequence, recombiner: &dyn Recombiner) {
    let n0 = cs.n_inputs();
    let mut bj: Vec<BriefPoint> = (0..n0).map(|i| set_jetinfo(cs, i)).collect();

    // Initial nearest neighbours: each new slot scans its predecessors,
    // cross-updating them in the same pass.
    for i in 1..n0 {
        let mut nn_dist = cs.r2;
        let mut nn = NONE;
        for j in 0..i {
            let dist = geom_dist2(&bj[i].geom, &bj[j].geom);
            if dist < nn_dist {
                nn_dist = dist;
                nn = j as u32;
            }
            if dist < bj[j].nn_dist {
                bj[j].nn_dist = dist;
                bj[j].nn = i as u32;
            }
        }
        bj[i].nn_dist = nn_dist;
        bj[i].nn = nn;
    }

    let mut dij: Vec<f64> = (0..n0).map(|i| bj_dij(&bj, i)).collect();

    let mut n = n0;
    while n > 0 {
        let mut best = 0;
        for i in 1..n {
            if dij[i] < dij[best] {
                best = i;
            }
        }

        let mut a = best;
        let d_min = dij[a] * cs.inv_r2;
        let b_slot = bj[a].nn;

        let b = if b_slot == NONE {
            cs.do_beam_recombination(bj[a].point as usize, d_min);
            None
        } else {
            let mut b = b_slot as usize;
            // keep the surviving slot below the vacated one, so that the
            // tail compaction below cannot clobber the merged point
            if a < b {
                std::mem::swap(&mut a, &mut b);
            }
            let merged =
                cs.do_ij_recombination(bj[a].point as usize, bj[b].point as usize, d_min, recombiner);
            bj[b] = set_jetinfo(cs, merged);
            Some(b)
        };

        n -= 1;
        let tail = n;
        if a != tail {
            bj[a] = bj[tail];
            dij[a] = dij[tail];
        }

        // Repair pass: slots that pointed at the two consumed points get a
        // fresh scan, everyone is compared against the merged point, and
        // references to the moved tail slot are redirected.
        for i in 0..n {
            let nn_i = bj[i].nn;
            if nn_i == a as u32 || (b.is_some() && nn_i as usize == b.unwrap()) {
                set_nn_nocross(&mut bj, i, n, cs.r2);
                dij[i] = bj_dij(&bj, i);
            }
            if let Some(b) = b {
                if i != b {
                    let dist = geom_dist2(&bj[i].geom, &bj[b].geom);
                    if dist < bj[i].nn_dist {
                        bj[i].nn_dist = dist;
                        bj[i].nn = b as u32;
                        dij[i] = bj_dij(&bj, i);
                    }
                    if dist < bj[b].nn_dist {
                        bj[b].nn_dist = dist;
                        bj[b].nn = i as u32;
                    }
                }
            }
            if bj[i].nn == tail as u32 {
                bj[i].nn = a as u32;
            }
        }

        if let Some(b) = b {
            dij[b] = bj_dij(&bj, b);
        }
    }
}
