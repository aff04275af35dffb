//! Tiled spatial index over the rapidity–azimuth cylinder.
//!
//! The cylinder is cut into rectangular tiles at least R on a side (half
//! that for the finer 5×5 variant), so a point's nearest neighbour within
//! R can only sit in the tile neighbourhood around it. Azimuth wraps; the
//! rapidity range is estimated from the input distribution. Active points
//! sit in intrusive doubly-linked per-tile lists and carry exact
//! nearest-neighbour caches that the engines repair incrementally after
//! every merge.

mod eager;
mod extent;
mod lazy;

pub(crate) use eager::{minheap_tiled_n2_cluster, tiled_n2_cluster};
pub(crate) use lazy::lazy_tiled_cluster;

use crate::history::ClusterSequence;
use crate::types::{geom_dist2, PointGeom, TWO_PI};

pub(crate) const NONE: u32 = u32::MAX;

/// Pruning slack added when a distance bound decides whether a whole tile
/// can be skipped; absorbs rounding in the tile-edge geometry.
pub(crate) const TILE_EDGE_SECURITY_MARGIN: f64 = 1.0e-7;

/// The fixed tile grid of one run.
pub(crate) struct TileGrid {
    pub tile_size_rap: f64,
    pub tile_size_phi: f64,
    pub half_size_rap: f64,
    pub half_size_phi: f64,
    pub n_tiles_phi: usize,
    irap_min: i64,
    irap_max: i64,
    rap_min: f64,
    rap_max: f64,

    /// Flattened neighbour lists, `stride` entries per tile:
    /// `[self, already-visited half.., still-to-visit half..]`.
    neighbors: Vec<u32>,
    n_neighbors: Vec<u8>,
    /// Offset of the still-to-visit ("right-hand") half within each
    /// tile's neighbour slice.
    rh_begin: Vec<u8>,
    stride: usize,

    /// Head of each tile's intrusive point list.
    pub heads: Vec<u32>,
    /// Scratch tag used to deduplicate tile unions.
    pub tags: Vec<bool>,
    /// Largest cached nearest-neighbour distance among the tile's
    /// occupants; an upper bound, only tightened lazily.
    pub max_nn_dist: Vec<f64>,
    pub rap_centre: Vec<f64>,
    pub phi_centre: Vec<f64>,
    /// Whether delta-phi against this tile's occupants needs the
    /// periodic wrap test.
    pub periodic_dphi: Vec<bool>,
}

impl TileGrid {
    /// Lay out the grid for the given inputs. `half` is the neighbourhood
    /// half-width: 1 gives 3×3 tiles of edge max(0.1, R), 2 gives 5×5
    /// tiles of half that edge.
    pub fn new(geoms: &[PointGeom], r: f64, half: usize) -> Self {
        debug_assert!(half == 1 || half == 2);
        let width = 2 * half + 1;

        let default_size = r.max(0.1) / half as f64;
        let tile_size_rap = default_size;
        // never fewer than `width` tiles in phi, so that any pair within
        // π of each other lies in adjacent-or-same neighbourhoods
        let n_tiles_phi = width.max((TWO_PI / default_size).floor() as usize);
        let tile_size_phi = TWO_PI / n_tiles_phi as f64;

        let (rap_lo, rap_hi) = extent::rapidity_extent(geoms);
        let irap_min = (rap_lo / tile_size_rap).floor() as i64;
        let irap_max = (rap_hi / tile_size_rap).floor() as i64;
        let rap_min = irap_min as f64 * tile_size_rap;
        let rap_max = irap_max as f64 * tile_size_rap;

        let n_rows = (irap_max - irap_min + 1) as usize;
        let n_tiles = n_rows * n_tiles_phi;
        let stride = width * width;

        let mut grid = TileGrid {
            tile_size_rap,
            tile_size_phi,
            half_size_rap: 0.5 * tile_size_rap,
            half_size_phi: 0.5 * tile_size_phi,
            n_tiles_phi,
            irap_min,
            irap_max,
            rap_min,
            rap_max,
            neighbors: vec![NONE; n_tiles * stride],
            n_neighbors: vec![0; n_tiles],
            rh_begin: vec![0; n_tiles],
            stride,
            heads: vec![NONE; n_tiles],
            tags: vec![false; n_tiles],
            max_nn_dist: vec![0.0; n_tiles],
            rap_centre: vec![0.0; n_tiles],
            phi_centre: vec![0.0; n_tiles],
            periodic_dphi: vec![false; n_tiles],
        };
        grid.build_cross_references(half);
        grid
    }

    fn build_cross_references(&mut self, half: usize) {
        let h = half as i64;
        let mut buf: Vec<u32> = Vec::with_capacity(self.stride);
        for irap in self.irap_min..=self.irap_max {
            for iphi in 0..self.n_tiles_phi as i64 {
                let t = self.tile_index_ij(irap, iphi);
                buf.clear();

                // self first, then the already-visited half: the rows
                // below and the same-row tiles to the left
                buf.push(t as u32);
                for d in 1..=h {
                    if irap - d >= self.irap_min {
                        for dphi in -h..=h {
                            buf.push(self.tile_index_ij(irap - d, iphi + dphi) as u32);
                        }
                    }
                }
                for dphi in 1..=h {
                    buf.push(self.tile_index_ij(irap, iphi - dphi) as u32);
                }
                self.rh_begin[t] = buf.len() as u8;

                // the still-to-visit half: same-row right, rows above
                for dphi in 1..=h {
                    buf.push(self.tile_index_ij(irap, iphi + dphi) as u32);
                }
                for d in 1..=h {
                    if irap + d <= self.irap_max {
                        for dphi in -h..=h {
                            buf.push(self.tile_index_ij(irap + d, iphi + dphi) as u32);
                        }
                    }
                }
                self.n_neighbors[t] = buf.len() as u8;
                let base = t * self.stride;
                self.neighbors[base..base + buf.len()].copy_from_slice(&buf);

                self.rap_centre[t] =
                    (irap - self.irap_min) as f64 * self.tile_size_rap + self.rap_min
                        + self.half_size_rap;
                self.phi_centre[t] = (iphi as f64 + 0.5) * self.tile_size_phi;
                self.periodic_dphi[t] = self.n_tiles_phi <= 2 * half + 1
                    || (iphi as usize) < half
                    || iphi as usize >= self.n_tiles_phi - half;
            }
        }
    }

    #[inline]
    pub fn n_tiles(&self) -> usize {
        self.heads.len()
    }

    /// Tile index from integer row/column, wrapping the column.
    #[inline]
    fn tile_index_ij(&self, irap: i64, iphi: i64) -> usize {
        let nphi = self.n_tiles_phi as i64;
        ((irap - self.irap_min) * nphi + (iphi + nphi) % nphi) as usize
    }

    /// Tile index for a position; rapidity outside the tiled range is
    /// clamped into the edge rows.
    pub fn tile_index(&self, rap: f64, phi: f64) -> usize {
        let row = if rap <= self.rap_min {
            0
        } else if rap >= self.rap_max {
            (self.irap_max - self.irap_min) as usize
        } else {
            let row = ((rap - self.rap_min) / self.tile_size_rap) as usize;
            // guard against rounding just past the last row
            row.min((self.irap_max - self.irap_min) as usize)
        };
        let iphi = ((phi + TWO_PI) / self.tile_size_phi) as usize % self.n_tiles_phi;
        row * self.n_tiles_phi + iphi
    }

    /// Neighbourhood of `t`, self first.
    #[inline]
    pub fn neighbors_of(&self, t: usize) -> &[u32] {
        &self.neighbors[t * self.stride..t * self.stride + self.n_neighbors[t] as usize]
    }

    /// The still-to-visit half of the neighbourhood, used by the bulk
    /// initialization pass so every pair is visited exactly once.
    #[inline]
    pub fn rh_neighbors_of(&self, t: usize) -> &[u32] {
        &self.neighbors
            [t * self.stride + self.rh_begin[t] as usize..t * self.stride + self.n_neighbors[t] as usize]
    }

    /// Squared distance from a point to the closest edge of a tile, zero
    /// for the point's own tile row/column overlaps.
    pub fn distance_to_tile(&self, g: &PointGeom, own_tile: usize, tile: usize) -> f64 {
        // Tile rows at the rapidity edges extend to infinity, so measure
        // against centres rather than the point's own offset.
        let drap = if self.rap_centre[own_tile] == self.rap_centre[tile] {
            0.0
        } else {
            (g.rap - self.rap_centre[tile]).abs() - self.half_size_rap
        };

        let mut dphi = (g.phi - self.phi_centre[tile]).abs();
        if dphi > std::f64::consts::PI {
            dphi = TWO_PI - dphi;
        }
        dphi -= self.half_size_phi;
        if dphi < 0.0 {
            dphi = 0.0;
        }

        dphi * dphi + drap * drap
    }
}

/// Working record for one active point.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TiledPoint {
    pub geom: PointGeom,
    pub scale: f64,
    pub nn_dist: f64,
    pub nn: u32,
    pub point: u32,
    pub tile: u32,
    pub prev: u32,
    pub next: u32,
    /// Position in the compacted distance table (scan engine only).
    pub dij_posn: u32,
    /// Set while the point sits on the pending heap-update list.
    pub heap_pending: bool,
}

/// The tile grid plus the slot array the engines work on. Slot `i`
/// initially holds input `i`; a merge reuses the consumed partner's slot
/// for the merged point, so the working set never grows.
pub(crate) struct TiledWorking {
    pub grid: TileGrid,
    pub pts: Vec<TiledPoint>,
}

impl TiledWorking {
    pub fn new(cs: &ClusterSequence, half: usize) -> Self {
        let n = cs.n_inputs();
        let grid = TileGrid::new(&cs.geoms[..n], cs.r, half);
        let mut working = TiledWorking {
            grid,
            pts: Vec::with_capacity(n),
        };
        for i in 0..n {
            working.pts.push(TiledPoint {
                geom: cs.geoms[i],
                scale: cs.algorithm.momentum_scale(cs.geoms[i].kt2),
                nn_dist: cs.r2,
                nn: NONE,
                point: i as u32,
                tile: 0,
                prev: NONE,
                next: NONE,
                dij_posn: 0,
                heap_pending: false,
            });
            working.insert_into_tile(i);
        }
        working
    }

    /// (Re)initialize slot `slot` for arena point `point` and link it
    /// into the tile its geometry implies.
    pub fn set_jetinfo(&mut self, cs: &ClusterSequence, slot: usize, point: usize) {
        let geom = cs.geoms[point];
        self.pts[slot] = TiledPoint {
            geom,
            scale: cs.algorithm.momentum_scale(geom.kt2),
            nn_dist: cs.r2,
            nn: NONE,
            point: point as u32,
            tile: 0,
            prev: NONE,
            next: NONE,
            dij_posn: self.pts[slot].dij_posn,
            heap_pending: self.pts[slot].heap_pending,
        };
        self.insert_into_tile(slot);
    }

    fn insert_into_tile(&mut self, slot: usize) {
        let t = self
            .grid
            .tile_index(self.pts[slot].geom.rap, self.pts[slot].geom.phi);
        self.pts[slot].tile = t as u32;
        self.pts[slot].prev = NONE;
        let head = self.grid.heads[t];
        self.pts[slot].next = head;
        if head != NONE {
            self.pts[head as usize].prev = slot as u32;
        }
        self.grid.heads[t] = slot as u32;
    }

    /// Unlink `slot` from its tile list.
    pub fn remove_from_tile(&mut self, slot: usize) {
        let p = self.pts[slot];
        if p.prev == NONE {
            self.grid.heads[p.tile as usize] = p.next;
        } else {
            self.pts[p.prev as usize].next = p.next;
        }
        if p.next != NONE {
            self.pts[p.next as usize].prev = p.prev;
        }
    }

    #[inline]
    pub fn dist(&self, a: usize, b: usize) -> f64 {
        geom_dist2(&self.pts[a].geom, &self.pts[b].geom)
    }

    /// Combined distance of a slot (carrying the internal factor of R²).
    #[inline]
    pub fn dij(&self, i: usize) -> f64 {
        let p = &self.pts[i];
        let mut scale = p.scale;
        if p.nn != NONE {
            let other = self.pts[p.nn as usize].scale;
            if other < scale {
                scale = other;
            }
        }
        p.nn_dist * scale
    }

    /// Exact nearest-neighbour initialization: all pairs within each
    /// tile, then each tile against its still-to-visit neighbours.
    pub fn init_nearest_neighbours(&mut self) {
        for t in 0..self.grid.n_tiles() {
            let mut a = self.grid.heads[t];
            while a != NONE {
                let mut b = self.grid.heads[t];
                while b != a {
                    let dist = self.dist(a as usize, b as usize);
                    if dist < self.pts[a as usize].nn_dist {
                        self.pts[a as usize].nn_dist = dist;
                        self.pts[a as usize].nn = b;
                    }
                    if dist < self.pts[b as usize].nn_dist {
                        self.pts[b as usize].nn_dist = dist;
                        self.pts[b as usize].nn = a;
                    }
                    b = self.pts[b as usize].next;
                }
                a = self.pts[a as usize].next;
            }

            for k in 0..self.grid.rh_neighbors_of(t).len() {
                let rt = self.grid.rh_neighbors_of(t)[k] as usize;
                let mut a = self.grid.heads[t];
                while a != NONE {
                    let mut b = self.grid.heads[rt];
                    while b != NONE {
                        let dist = self.dist(a as usize, b as usize);
                        if dist < self.pts[a as usize].nn_dist {
                            self.pts[a as usize].nn_dist = dist;
                            self.pts[a as usize].nn = b;
                        }
                        if dist < self.pts[b as usize].nn_dist {
                            self.pts[b as usize].nn_dist = dist;
                            self.pts[b as usize].nn = a;
                        }
                        b = self.pts[b as usize].next;
                    }
                    a = self.pts[a as usize].next;
                }
            }
            // the already-visited half was covered when those tiles ran
            // their own still-to-visit pass
        }
    }

    /// Append the untagged neighbourhood of `tile` to `union`, tagging as
    /// it goes.
    pub fn add_untagged_neighbours(&mut self, tile: usize, union: &mut Vec<u32>) {
        for k in 0..self.grid.neighbors_of(tile).len() {
            let nt = self.grid.neighbors_of(tile)[k] as usize;
            if !self.grid.tags[nt] {
                self.grid.tags[nt] = true;
                union.push(nt as u32);
            }
        }
    }
}
