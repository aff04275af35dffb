//! Tiled engines with eager neighbour repair: after each event the full
//! tile neighbourhood of every affected tile is rescanned. The two
//! variants differ only in how the global minimum is extracted.

use super::{TiledWorking, NONE};
use crate::history::ClusterSequence;
use crate::measure::Recombiner;
use crate::min_heap::MinHeap;

/// One entry of the compacted combined-distance table.
#[derive(Debug, Clone, Copy)]
struct DijEntry {
    dij: f64,
    slot: u32,
}

/// Shared per-event bookkeeping: extract the pair, write the history,
/// update the tiling, and return `(a, b, old_b_tile)` where `a` is the
/// vacated slot and `b` the slot now holding the merged point.
fn recombine_minimal(
    w: &mut TiledWorking,
    cs: &mut ClusterSequence,
    recombiner: &dyn Recombiner,
    mut a: usize,
    d_min: f64,
) -> (usize, Option<usize>, usize) {
    let b_slot = w.pts[a].nn;
    if b_slot == NONE {
        cs.do_beam_recombination(w.pts[a].point as usize, d_min);
        w.remove_from_tile(a);
        return (a, None, 0);
    }

    let mut bs = b_slot as usize;
    // keep the surviving slot at the lower index; the vacated slot is
    // then always `a`
    if a < bs {
        std::mem::swap(&mut a, &mut bs);
    }
    let merged = cs.do_ij_recombination(
        w.pts[a].point as usize,
        w.pts[bs].point as usize,
        d_min,
        recombiner,
    );
    w.remove_from_tile(a);
    let old_b_tile = w.pts[bs].tile as usize;
    w.remove_from_tile(bs);
    w.set_jetinfo(cs, bs, merged);
    (a, Some(bs), old_b_tile)
}

/// Gather the tiles whose occupants may need repair: the neighbourhoods
/// of the vacated slot's tile, the merged point's new tile and the
/// consumed partner's old tile, deduplicated through the tile tags.
fn gather_tile_union(
    w: &mut TiledWorking,
    a: usize,
    b: Option<usize>,
    old_b_tile: usize,
    tile_union: &mut Vec<u32>,
) {
    tile_union.clear();
    let a_tile = w.pts[a].tile as usize;
    w.add_untagged_neighbours(a_tile, tile_union);
    if let Some(bs) = b {
        let new_tile = w.pts[bs].tile as usize;
        if new_tile != a_tile {
            w.add_untagged_neighbours(new_tile, tile_union);
        }
        if old_b_tile != a_tile && old_b_tile != new_tile {
            w.add_untagged_neighbours(old_b_tile, tile_union);
        }
    }
}

/// Rebuild slot `i`'s nearest neighbour by scanning its own tile
/// neighbourhood in full.
fn rescan_neighbourhood(w: &mut TiledWorking, i: usize, r2: f64) {
    w.pts[i].nn_dist = r2;
    w.pts[i].nn = NONE;
    let t = w.pts[i].tile as usize;
    for k in 0..w.grid.neighbors_of(t).len() {
        let nt = w.grid.neighbors_of(t)[k] as usize;
        let mut j = w.grid.heads[nt];
        while j != NONE {
            if j as usize != i {
                let dist = w.dist(i, j as usize);
                if dist < w.pts[i].nn_dist {
                    w.pts[i].nn_dist = dist;
                    w.pts[i].nn = j;
                }
            }
            j = w.pts[j as usize].next;
        }
    }
}

/// Tiled engine with the global minimum found by a linear scan over a
/// compacted distance table. The cross-check baseline for the heap and
/// lazy variants.
pub(crate) fn tiled_n2_cluster(cs: &mut ClusterSequence, recombiner: &dyn Recombiner) {
    let mut w = TiledWorking::new(cs, 1);
    w.init_nearest_neighbours();

    let n0 = cs.n_inputs();
    let mut dij: Vec<DijEntry> = Vec::with_capacity(n0);
    for i in 0..n0 {
        w.pts[i].dij_posn = i as u32;
        dij.push(DijEntry {
            dij: w.dij(i),
            slot: i as u32,
        });
    }

    let mut tile_union: Vec<u32> = Vec::with_capacity(3 * 9);
    let mut n = n0;

    while n > 0 {
        let mut best = 0usize;
        for i in 1..n {
            if dij[i].dij < dij[best].dij {
                best = i;
            }
        }
        let a0 = dij[best].slot as usize;
        let d_min = dij[best].dij * cs.inv_r2;

        let (a, b, old_b_tile) = recombine_minimal(&mut w, cs, recombiner, a0, d_min);
        gather_tile_union(&mut w, a, b, old_b_tile, &mut tile_union);

        // compact the distance table over the vacated slot
        n -= 1;
        let a_pos = w.pts[a].dij_posn as usize;
        w.pts[dij[n].slot as usize].dij_posn = a_pos as u32;
        dij[a_pos] = dij[n];

        for ui in 0..tile_union.len() {
            let t = tile_union[ui] as usize;
            w.grid.tags[t] = false;
            let mut i = w.grid.heads[t];
            while i != NONE {
                let islot = i as usize;
                let nn_i = w.pts[islot].nn;
                if nn_i == a as u32 || b.map_or(false, |bs| nn_i == bs as u32) {
                    rescan_neighbourhood(&mut w, islot, cs.r2);
                    dij[w.pts[islot].dij_posn as usize].dij = w.dij(islot);
                }
                if let Some(bs) = b {
                    if islot != bs {
                        let dist = w.dist(islot, bs);
                        if dist < w.pts[islot].nn_dist {
                            w.pts[islot].nn_dist = dist;
                            w.pts[islot].nn = bs as u32;
                            dij[w.pts[islot].dij_posn as usize].dij = w.dij(islot);
                        }
                        if dist < w.pts[bs].nn_dist {
                            w.pts[bs].nn_dist = dist;
                            w.pts[bs].nn = i;
                        }
                    }
                }
                i = w.pts[islot].next;
            }
        }

        if let Some(bs) = b {
            dij[w.pts[bs].dij_posn as usize].dij = w.dij(bs);
        }
    }
}

/// Tiled engine with heap-based minimum extraction; heap updates are
/// coalesced through a pending list so each touched slot is pushed once.
pub(crate) fn minheap_tiled_n2_cluster(cs: &mut ClusterSequence, recombiner: &dyn Recombiner) {
    let mut w = TiledWorking::new(cs, 1);
    w.init_nearest_neighbours();

    let n0 = cs.n_inputs();
    let dijs: Vec<f64> = (0..n0).map(|i| w.dij(i)).collect();
    let mut heap = MinHeap::new(&dijs);

    let mut pending: Vec<u32> = Vec::with_capacity(n0);
    let mut tile_union: Vec<u32> = Vec::with_capacity(3 * 9);
    let mut n = n0;

    while n > 0 {
        let d_min = heap.min_value() * cs.inv_r2;
        let a0 = heap.min_position();

        let (a, b, old_b_tile) = recombine_minimal(&mut w, cs, recombiner, a0, d_min);
        heap.remove(a);
        gather_tile_union(&mut w, a, b, old_b_tile, &mut tile_union);

        if let Some(bs) = b {
            w.pts[bs].heap_pending = true;
            pending.push(bs as u32);
        }

        for ui in 0..tile_union.len() {
            let t = tile_union[ui] as usize;
            w.grid.tags[t] = false;
            let mut i = w.grid.heads[t];
            while i != NONE {
                let islot = i as usize;
                let nn_i = w.pts[islot].nn;
                if nn_i == a as u32 || b.map_or(false, |bs| nn_i == bs as u32) {
                    if !w.pts[islot].heap_pending {
                        w.pts[islot].heap_pending = true;
                        pending.push(i);
                    }
                    rescan_neighbourhood(&mut w, islot, cs.r2);
                }
                if let Some(bs) = b {
                    if islot != bs {
                        let dist = w.dist(islot, bs);
                        if dist < w.pts[islot].nn_dist {
                            w.pts[islot].nn_dist = dist;
                            w.pts[islot].nn = bs as u32;
                            if !w.pts[islot].heap_pending {
                                w.pts[islot].heap_pending = true;
                                pending.push(i);
                            }
                        }
                        if dist < w.pts[bs].nn_dist {
                            w.pts[bs].nn_dist = dist;
                            w.pts[bs].nn = i;
                        }
                    }
                }
                i = w.pts[islot].next;
            }
        }

        while let Some(islot) = pending.pop() {
            let islot = islot as usize;
            heap.update(islot, w.dij(islot));
            w.pts[islot].heap_pending = false;
        }
        n -= 1;
    }
}
