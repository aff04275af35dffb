//! Lazy tiled engine: per-tile upper bounds on the cached
//! nearest-neighbour distances let both the bulk initialization and the
//! per-event repair skip whole tiles that provably cannot matter. Runs
//! with either the 3×3 or the 5×5 neighbourhood.

use super::{TiledPoint, TiledWorking, NONE, TILE_EDGE_SECURITY_MARGIN};
use crate::history::ClusterSequence;
use crate::measure::Recombiner;
use crate::min_heap::MinHeap;
use crate::types::{geom_dist2, geom_dist2_not_periodic};

/// Recompute slot `i`'s nearest neighbour, skipping neighbour tiles whose
/// nearest edge is already further than the best distance found so far.
fn set_nn(w: &mut TiledWorking, i: usize, r2: f64, pending: &mut Vec<u32>) {
    w.pts[i].nn_dist = r2;
    w.pts[i].nn = NONE;
    if !w.pts[i].heap_pending {
        w.pts[i].heap_pending = true;
        pending.push(i as u32);
    }
    let t = w.pts[i].tile as usize;
    for k in 0..w.grid.neighbors_of(t).len() {
        let nt = w.grid.neighbors_of(t)[k] as usize;
        // zero for the own tile, so that one is never skipped
        if w.pts[i].nn_dist < w.grid.distance_to_tile(&w.pts[i].geom, t, nt) {
            continue;
        }
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

/// Compare slot `i` against the merged point `x`, updating whichever side
/// improves. Only `i`'s side needs a heap touch; `x` is already pending.
fn update_x_i(w: &mut TiledWorking, x: usize, i: usize, pending: &mut Vec<u32>) {
    if i == x {
        return;
    }
    let dist = w.dist(i, x);
    if dist < w.pts[i].nn_dist {
        w.pts[i].nn_dist = dist;
        w.pts[i].nn = x as u32;
        if !w.pts[i].heap_pending {
            w.pts[i].heap_pending = true;
            pending.push(i as u32);
        }
    }
    if dist < w.pts[x].nn_dist {
        w.pts[x].nn_dist = dist;
        w.pts[x].nn = i as u32;
    }
}

/// Tag and collect the neighbour tiles of `p` that could still hold a
/// point whose cached neighbour was invalidated: a tile can be skipped
/// when even its nearest edge is further from `p` than the largest
/// neighbour distance cached inside it.
fn add_untagged_neighbours_using_max_info(
    w: &mut TiledWorking,
    p: &TiledPoint,
    tile_union: &mut Vec<u32>,
) {
    let t = p.tile as usize;
    for k in 0..w.grid.neighbors_of(t).len() {
        let nt = w.grid.neighbors_of(t)[k] as usize;
        if w.grid.tags[nt] {
            continue;
        }
        // a rounding slip here would silently skip a tile we must visit
        let dist = w.grid.distance_to_tile(&p.geom, t, nt) - TILE_EDGE_SECURITY_MARGIN;
        if dist > w.grid.max_nn_dist[nt] {
            continue;
        }
        w.grid.tags[nt] = true;
        tile_union.push(nt as u32);
    }
}

/// Exact nearest-neighbour initialization with tile-bound pruning. Within
/// a tile the azimuthal wrap test is never needed; across tiles it is
/// needed only near the seam.
fn init_nearest_neighbours_lazy(w: &mut TiledWorking) {
    for t in 0..w.grid.n_tiles() {
        let mut a = w.grid.heads[t];
        while a != NONE {
            let mut b = w.grid.heads[t];
            while b != a {
                let dist =
                    geom_dist2_not_periodic(&w.pts[a as usize].geom, &w.pts[b as usize].geom);
                if dist < w.pts[a as usize].nn_dist {
                    w.pts[a as usize].nn_dist = dist;
                    w.pts[a as usize].nn = b;
                }
                if dist < w.pts[b as usize].nn_dist {
                    w.pts[b as usize].nn_dist = dist;
                    w.pts[b as usize].nn = a;
                }
                b = w.pts[b as usize].next;
            }
            a = w.pts[a as usize].next;
        }
        // provisional per-tile bound from the within-tile pass
        let mut max = w.grid.max_nn_dist[t];
        let mut a = w.grid.heads[t];
        while a != NONE {
            if w.pts[a as usize].nn_dist > max {
                max = w.pts[a as usize].nn_dist;
            }
            a = w.pts[a as usize].next;
        }
        w.grid.max_nn_dist[t] = max;
    }

    for t in 0..w.grid.n_tiles() {
        let periodic = w.grid.periodic_dphi[t];
        for k in 0..w.grid.rh_neighbors_of(t).len() {
            let rt = w.grid.rh_neighbors_of(t)[k] as usize;
            let mut a = w.grid.heads[t];
            while a != NONE {
                let aslot = a as usize;
                let dist_to_tile = w.grid.distance_to_tile(&w.pts[aslot].geom, t, rt);
                // the tile matters if it could improve a's neighbour, or
                // if a could improve somebody's neighbour inside it
                let relevant_for_a = dist_to_tile <= w.pts[aslot].nn_dist;
                let relevant_for_tile = dist_to_tile <= w.grid.max_nn_dist[rt];
                if relevant_for_a || relevant_for_tile {
                    let mut b = w.grid.heads[rt];
                    while b != NONE {
                        let bslot = b as usize;
                        let dist = if periodic {
                            geom_dist2(&w.pts[aslot].geom, &w.pts[bslot].geom)
                        } else {
                            geom_dist2_not_periodic(&w.pts[aslot].geom, &w.pts[bslot].geom)
                        };
                        if dist < w.pts[aslot].nn_dist {
                            w.pts[aslot].nn_dist = dist;
                            w.pts[aslot].nn = b;
                        }
                        if dist < w.pts[bslot].nn_dist {
                            w.pts[bslot].nn_dist = dist;
                            w.pts[bslot].nn = a;
                        }
                        b = w.pts[bslot].next;
                    }
                }
                a = w.pts[aslot].next;
            }
        }
    }

    // tighten the bounds now that the neighbour caches are final
    for t in 0..w.grid.n_tiles() {
        let mut max = 0.0f64;
        let mut a = w.grid.heads[t];
        while a != NONE {
            if w.pts[a as usize].nn_dist > max {
                max = w.pts[a as usize].nn_dist;
            }
            a = w.pts[a as usize].next;
        }
        w.grid.max_nn_dist[t] = max;
    }
}

/// The lazy tiled recombination loop. `half` selects the neighbourhood:
/// 1 for 3×3, 2 for 5×5 (with half-size tiles).
pub(crate) fn lazy_tiled_cluster(cs: &mut ClusterSequence, recombiner: &dyn Recombiner, half: usize) {
    let mut w = TiledWorking::new(cs, half);
    init_nearest_neighbours_lazy(&mut w);

    let n0 = cs.n_inputs();
    let dijs: Vec<f64> = (0..n0).map(|i| w.dij(i)).collect();
    let mut heap = MinHeap::new(&dijs);

    let width = 2 * half + 1;
    let mut pending: Vec<u32> = Vec::with_capacity(n0);
    let mut tile_union: Vec<u32> = Vec::with_capacity(3 * width * width);
    let mut n = n0;

    while n > 0 {
        let d_min = heap.min_value() * cs.inv_r2;
        let mut a = heap.min_position();

        let b_slot = w.pts[a].nn;
        let b: Option<usize>;
        let mut old_b = w.pts[a]; // placeholder, only read when b exists
        if b_slot != NONE {
            let mut bs = b_slot as usize;
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
            old_b = w.pts[bs];
            w.remove_from_tile(bs);
            w.set_jetinfo(cs, bs, merged);
            b = Some(bs);
        } else {
            cs.do_beam_recombination(w.pts[a].point as usize, d_min);
            w.remove_from_tile(a);
            b = None;
        }
        heap.remove(a);

        tile_union.clear();

        // First sweep: the merged point's own neighbourhood. Tiles are
        // visited when they matter for the merged point or it for them;
        // stale caches found on the way are repaired immediately since
        // the visit is already paid for.
        if let Some(bs) = b {
            let jb_tile = w.pts[bs].tile as usize;
            for k in 0..w.grid.neighbors_of(jb_tile).len() {
                let nt = w.grid.neighbors_of(jb_tile)[k] as usize;
                let dist_to_tile =
                    w.grid.distance_to_tile(&w.pts[bs].geom, jb_tile, nt);
                let relevant_for_b = dist_to_tile <= w.pts[bs].nn_dist;
                let relevant_for_tile = dist_to_tile <= w.grid.max_nn_dist[nt];
                if !(relevant_for_b || relevant_for_tile) {
                    continue;
                }
                w.grid.tags[nt] = true;
                tile_union.push(nt as u32);

                let mut i = w.grid.heads[nt];
                while i != NONE {
                    let islot = i as usize;
                    let nn_i = w.pts[islot].nn;
                    if nn_i == a as u32 || nn_i == bs as u32 {
                        set_nn(&mut w, islot, cs.r2, &mut pending);
                    }
                    update_x_i(&mut w, bs, islot, &mut pending);
                    i = w.pts[islot].next;
                }
            }
        }
        let n_done = tile_union.len();

        // Second sweep: tiles near the two consumed points that the
        // per-tile bounds cannot rule out.
        let old_a = w.pts[a];
        add_untagged_neighbours_using_max_info(&mut w, &old_a, &mut tile_union);
        if let Some(bs) = b {
            add_untagged_neighbours_using_max_info(&mut w, &old_b, &mut tile_union);
            w.pts[bs].heap_pending = true;
            pending.push(bs as u32);
        }

        for ui in 0..n_done {
            w.grid.tags[tile_union[ui] as usize] = false;
        }
        for ui in n_done..tile_union.len() {
            let t = tile_union[ui] as usize;
            w.grid.tags[t] = false;
            let mut i = w.grid.heads[t];
            while i != NONE {
                let islot = i as usize;
                let nn_i = w.pts[islot].nn;
                if nn_i == a as u32 || b.map_or(false, |bs| nn_i == bs as u32) {
                    set_nn(&mut w, islot, cs.r2, &mut pending);
                }
                i = w.pts[islot].next;
            }
        }

        // apply the coalesced heap updates and keep the tile bounds
        // honest for the slots whose distance may have grown
        while let Some(islot) = pending.pop() {
            let islot = islot as usize;
            heap.update(islot, w.dij(islot));
            w.pts[islot].heap_pending = false;
            let t = w.pts[islot].tile as usize;
            if w.grid.max_nn_dist[t] < w.pts[islot].nn_dist {
                w.grid.max_nn_dist[t] = w.pts[islot].nn_dist;
            }
        }
        n -= 1;
    }
}
