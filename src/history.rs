//! The recombination history: an append-only log of merge and
//! beam-absorption events plus the arena of every point ever created.
//!
//! Points live in a growable arena addressed by stable `u32` indices;
//! history entries cross-reference each other and the arena by index only,
//! so the structure stays valid however the arena grows. The history is
//! the sole durable output of a clustering run: all scratch structures
//! (tiles, heaps, search trees) are dropped when the recombination loop
//! finishes.

use crate::error::ClusterError;
use crate::measure::{JetAlgorithm, Recombiner};
use crate::strategy::Strategy;
use crate::types::{FourMomentum, PointGeom};
use crate::warnings;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Conditionally parallel iterator over a slice.
macro_rules! maybe_par_iter {
    ($slice:expr) => {{
        #[cfg(feature = "parallel")]
        {
            $slice.par_iter()
        }
        #[cfg(not(feature = "parallel"))]
        {
            $slice.iter()
        }
    }};
}

/// Second parent of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent2 {
    /// The entry is an original input and has no parents at all.
    Inexistent,
    /// The entry records a beam absorption: its first parent was removed
    /// without a pairwise partner.
    Beam,
    /// The entry records a merge with this other history entry.
    Entry(u32),
}

/// One immutable row of the clustering history.
///
/// Rows `0..n_inputs` describe the inputs; every later row describes
/// exactly one merge or beam absorption, in the order the events fired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    /// First parent entry, `None` for an original input.
    pub parent1: Option<u32>,
    /// Second parent entry, beam marker, or input marker.
    pub parent2: Parent2,
    /// Entry that later consumed this one, `None` while live.
    pub child: Option<u32>,
    /// Arena index of this entry's momentum; `None` for the pure
    /// bookkeeping row written by a beam absorption.
    pub point: Option<u32>,
    /// The weighted distance at which this event fired (0 for inputs).
    pub dij: f64,
    /// Running maximum of `dij` over the sequence up to this row.
    pub max_dij_so_far: f64,
}

/// The finished (or in-progress) clustering of one event.
pub struct ClusterSequence {
    pub(crate) algorithm: JetAlgorithm,
    pub(crate) r: f64,
    pub(crate) r2: f64,
    pub(crate) inv_r2: f64,
    pub(crate) strategy_used: Strategy,

    /// Arena of all points ever created: inputs, intermediates, finals.
    pub(crate) points: Vec<FourMomentum>,
    /// Cached geometry, parallel to `points`.
    pub(crate) geoms: Vec<PointGeom>,
    /// History index currently associated with each arena point.
    pub(crate) point_history: Vec<u32>,
    pub(crate) history: Vec<HistoryEntry>,
    pub(crate) initial_n: usize,
}

impl ClusterSequence {
    pub(crate) fn new(
        points: Vec<FourMomentum>,
        algorithm: JetAlgorithm,
        r: f64,
        strategy_used: Strategy,
    ) -> Self {
        let n = points.len();
        // cached geometry for the inputs, pure per element
        let geoms: Vec<PointGeom> = maybe_par_iter!(points).map(PointGeom::of).collect();
        let mut cs = Self {
            algorithm,
            r,
            r2: r * r,
            inv_r2: 1.0 / (r * r),
            strategy_used,
            points,
            geoms,
            point_history: (0..n as u32).collect(),
            history: Vec::new(),
            initial_n: n,
        };
        cs.fill_initial_history();
        cs
    }

    fn fill_initial_history(&mut self) {
        self.points.reserve(self.points.len());
        self.history.reserve(2 * self.points.len());
        for i in 0..self.points.len() {
            self.history.push(HistoryEntry {
                parent1: None,
                parent2: Parent2::Inexistent,
                child: None,
                point: Some(i as u32),
                dij: 0.0,
                max_dij_so_far: 0.0,
            });
        }
    }

    /// Momentum scale of an arena point under the configured measure.
    #[inline]
    pub(crate) fn scale(&self, point: usize) -> f64 {
        self.algorithm.momentum_scale(self.geoms[point].kt2)
    }

    /// Record a merge of arena points `jet_i` and `jet_j` at distance
    /// `dij`; returns the arena index of the merged point.
    pub(crate) fn do_ij_recombination(
        &mut self,
        jet_i: usize,
        jet_j: usize,
        dij: f64,
        recombiner: &dyn Recombiner,
    ) -> usize {
        let newjet = recombiner.recombine(&self.points[jet_i], &self.points[jet_j]);
        self.points.push(newjet);
        self.geoms.push(PointGeom::of(&newjet));
        self.point_history.push(0); // patched by add_step_to_history
        let newjet_k = self.points.len() - 1;

        let hist_i = self.point_history[jet_i];
        let hist_j = self.point_history[jet_j];
        self.add_step_to_history(
            hist_i.min(hist_j),
            Parent2::Entry(hist_i.max(hist_j)),
            Some(newjet_k as u32),
            dij,
        );
        newjet_k
    }

    /// Record the absorption of arena point `jet_i` by the beam at
    /// distance `dib`.
    pub(crate) fn do_beam_recombination(&mut self, jet_i: usize, dib: f64) {
        let hist_i = self.point_history[jet_i];
        self.add_step_to_history(hist_i, Parent2::Beam, None, dib);
    }

    fn add_step_to_history(
        &mut self,
        parent1: u32,
        parent2: Parent2,
        point: Option<u32>,
        dij: f64,
    ) {
        let prev_max = self
            .history
            .last()
            .map(|h| h.max_dij_so_far)
            .unwrap_or(0.0);
        self.history.push(HistoryEntry {
            parent1: Some(parent1),
            parent2,
            child: None,
            point,
            dij,
            max_dij_so_far: dij.max(prev_max),
        });
        let step = (self.history.len() - 1) as u32;

        debug_assert!(
            self.history[parent1 as usize].child.is_none(),
            "parent {} consumed twice",
            parent1
        );
        self.history[parent1 as usize].child = Some(step);
        if let Parent2::Entry(p2) = parent2 {
            debug_assert!(self.history[p2 as usize].child.is_none());
            self.history[p2 as usize].child = Some(step);
        }
        if let Some(p) = point {
            self.point_history[p as usize] = step;
        }
    }

    // ---- accessors -----------------------------------------------------

    /// All points ever created: the first `n_inputs()` entries are the
    /// inputs, later entries are merge results in creation order.
    #[inline]
    pub fn points(&self) -> &[FourMomentum] {
        &self.points
    }

    /// The full event history, one row per input and per event.
    #[inline]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    #[inline]
    pub fn n_inputs(&self) -> usize {
        self.initial_n
    }

    /// The measure this sequence was clustered with.
    #[inline]
    pub fn algorithm(&self) -> JetAlgorithm {
        self.algorithm
    }

    /// The geometry radius parameter of the run.
    #[inline]
    pub fn r(&self) -> f64 {
        self.r
    }

    /// The execution path that actually ran (after auto-selection and any
    /// compatibility downgrades).
    #[inline]
    pub fn strategy_used(&self) -> Strategy {
        self.strategy_used
    }

    /// History index currently associated with an arena point.
    #[inline]
    pub fn history_index(&self, point: usize) -> u32 {
        self.point_history[point]
    }

    // ---- inclusive and exclusive results -------------------------------

    /// Arena indices of all inclusive jets with transverse momentum of at
    /// least `ptmin`, i.e. every point that ended its life absorbed by the
    /// beam and passes the cut.
    pub fn inclusive_jet_indices(&self, ptmin: f64) -> Vec<u32> {
        let dcut = ptmin * ptmin;
        let mut jets = Vec::new();
        match self.algorithm {
            JetAlgorithm::Kt => {
                // With dij = min(kt2) ΔR²/R² and diB = kt2, a beam
                // absorption's dij equals the jet's kt2, so the running
                // maximum lets us stop early.
                for i in (0..self.history.len()).rev() {
                    let h = &self.history[i];
                    if h.max_dij_so_far < dcut {
                        break;
                    }
                    if h.parent2 == Parent2::Beam && h.dij >= dcut {
                        let parent1 = h.parent1.expect("beam row without parent");
                        jets.push(self.history[parent1 as usize].point.unwrap());
                    }
                }
            }
            JetAlgorithm::CambridgeAachen => {
                // Beam absorptions all sit at the end of the sequence.
                for i in (0..self.history.len()).rev() {
                    let h = &self.history[i];
                    if h.parent2 != Parent2::Beam {
                        break;
                    }
                    let parent1 = h.parent1.expect("beam row without parent");
                    let p = self.history[parent1 as usize].point.unwrap();
                    if self.points[p as usize].perp2() >= dcut {
                        jets.push(p);
                    }
                }
            }
            _ => {
                // No assumption about the relation of dij to momenta.
                for h in self.history.iter().rev() {
                    if h.parent2 == Parent2::Beam {
                        let parent1 = h.parent1.expect("beam row without parent");
                        let p = self.history[parent1 as usize].point.unwrap();
                        if self.points[p as usize].perp2() >= dcut {
                            jets.push(p);
                        }
                    }
                }
            }
        }
        jets
    }

    /// Momenta of all inclusive jets above `ptmin`.
    pub fn inclusive_jets(&self, ptmin: f64) -> Vec<FourMomentum> {
        self.inclusive_jet_indices(ptmin)
            .into_iter()
            .map(|p| self.points[p as usize])
            .collect()
    }

    /// The number of jets an exclusive run with merge-scale cutoff `dcut`
    /// would have stopped at.
    pub fn n_exclusive_jets(&self, dcut: f64) -> usize {
        let mut i = self.history.len() as isize - 1;
        while i >= 0 {
            if self.history[i as usize].max_dij_so_far <= dcut {
                break;
            }
            i -= 1;
        }
        let stop_point = (i + 1) as usize;
        2 * self.initial_n - stop_point
    }

    /// Exclusive jets for a merge-scale cutoff `dcut`.
    pub fn exclusive_jets_dcut(&self, dcut: f64) -> Result<Vec<FourMomentum>, ClusterError> {
        self.exclusive_jets_up_to(self.n_exclusive_jets(dcut))
    }

    /// The event unclustered back to exactly `njets` jets. Fails when
    /// more jets are requested than there were inputs.
    pub fn exclusive_jets(&self, njets: usize) -> Result<Vec<FourMomentum>, ClusterError> {
        if njets > self.initial_n {
            return Err(ClusterError::TooFewInputs {
                requested: njets,
                available: self.initial_n,
            });
        }
        self.exclusive_jets_up_to(njets)
    }

    /// Like `exclusive_jets`, but returns all inputs when fewer than
    /// `njets` are available.
    pub fn exclusive_jets_up_to(&self, njets: usize) -> Result<Vec<FourMomentum>, ClusterError> {
        Ok(self
            .exclusive_jet_indices_up_to(njets)?
            .into_iter()
            .map(|p| self.points[p as usize])
            .collect())
    }

    /// Arena indices of the jets of the `njets`-jet exclusive state.
    pub fn exclusive_jet_indices_up_to(&self, njets: usize) -> Result<Vec<u32>, ClusterError> {
        if !self.algorithm.has_monotonic_scales() {
            warnings::warn_once(&format!(
                "exclusive jets for the {} measure do not have a monotonic \
                 merge scale and should be interpreted with care",
                self.algorithm.name()
            ));
        }

        // One point disappears per event, so the n-jet state ends at row
        // 2N - n.
        let stop_point = (2 * self.initial_n).saturating_sub(njets).max(self.initial_n);

        if 2 * self.initial_n != self.history.len() {
            return Err(ClusterError::Internal(format!(
                "history has {} rows for {} inputs (expected {})",
                self.history.len(),
                self.initial_n,
                2 * self.initial_n
            )));
        }

        // A parent created before the stopping point and consumed after it
        // is exactly a jet of the n-jet state.
        let mut jets = Vec::new();
        for i in stop_point..self.history.len() {
            let h = &self.history[i];
            if let Some(p1) = h.parent1 {
                if (p1 as usize) < stop_point {
                    jets.push(self.history[p1 as usize].point.unwrap());
                }
            }
            if let Parent2::Entry(p2) = h.parent2 {
                if (p2 as usize) < stop_point {
                    jets.push(self.history[p2 as usize].point.unwrap());
                }
            }
        }

        if jets.len() != njets.min(self.initial_n) {
            return Err(ClusterError::Internal(format!(
                "exclusive jet reconstruction found {} jets where {} were expected",
                jets.len(),
                njets.min(self.initial_n)
            )));
        }
        Ok(jets)
    }

    /// The merge scale of the event that went from `njets + 1` to `njets`
    /// jets; 0 when `njets >= n_inputs()`.
    pub fn exclusive_dmerge(&self, njets: usize) -> f64 {
        if njets >= self.initial_n {
            return 0.0;
        }
        self.history[2 * self.initial_n - njets - 1].dij
    }

    /// As `exclusive_dmerge`, but the running maximum up to that event;
    /// identical unless merge scales are non-monotonic.
    pub fn exclusive_dmerge_max(&self, njets: usize) -> f64 {
        if njets >= self.initial_n {
            return 0.0;
        }
        self.history[2 * self.initial_n - njets - 1].max_dij_so_far
    }

    // ---- structure queries ---------------------------------------------

    /// The two history entries merged to create entry `i`, ordered by
    /// history index. `None` for inputs and beam-absorption rows.
    pub fn parents_of(&self, i: usize) -> Option<(u32, u32)> {
        let h = &self.history[i];
        match (h.parent1, h.parent2) {
            (Some(p1), Parent2::Entry(p2)) => Some((p1, p2)),
            _ => None,
        }
    }

    /// The entry that consumed entry `i` in a merge, if any. Beam
    /// absorptions are bookkeeping rows, not jets, and do not count.
    pub fn child_of(&self, i: usize) -> Option<u32> {
        let c = self.history[i].child?;
        if self.history[c as usize].point.is_some() {
            Some(c)
        } else {
            None
        }
    }

    /// The entry that `i` was merged with, if `i` was consumed by a
    /// merge.
    pub fn partner_of(&self, i: usize) -> Option<u32> {
        let c = self.history[i].child? as usize;
        match (self.history[c].parent1, self.history[c].parent2) {
            (Some(p1), Parent2::Entry(p2)) => Some(if p1 as usize == i { p2 } else { p1 }),
            _ => None,
        }
    }

    /// True when history entry `descendant` is (or folds into) history
    /// entry `ancestor` through the merge tree.
    pub fn is_descendant_of(&self, descendant: usize, ancestor: usize) -> bool {
        let mut here = descendant;
        loop {
            if here == ancestor {
                return true;
            }
            match self.child_of(here) {
                Some(c) => here = c as usize,
                None => return false,
            }
        }
    }

    /// Arena indices of the original inputs that fold into history entry
    /// `i`, in tree order.
    pub fn constituent_indices(&self, i: usize) -> Vec<u32> {
        let mut constituents = Vec::new();
        let mut stack = vec![i as u32];
        while let Some(e) = stack.pop() {
            let h = &self.history[e as usize];
            match h.parent1 {
                None => constituents.push(h.point.expect("input row without point")),
                Some(p1) => {
                    // push parent2 first so parent1's subtree is emitted first
                    if let Parent2::Entry(p2) = h.parent2 {
                        stack.push(p2);
                    }
                    stack.push(p1);
                }
            }
        }
        constituents
    }

    /// Momenta of the original inputs that fold into history entry `i`.
    pub fn constituents(&self, i: usize) -> Vec<FourMomentum> {
        self.constituent_indices(i)
            .into_iter()
            .map(|p| self.points[p as usize])
            .collect()
    }

    /// Inputs that never took part in any event. Non-empty only for
    /// degenerate runs.
    pub fn unclustered_inputs(&self) -> Vec<u32> {
        (0..self.initial_n as u32)
            .filter(|&i| self.history[i as usize].child.is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::EScheme;
    use crate::types::FourMomentum;

    fn two_point_sequence() -> ClusterSequence {
        let points = vec![
            FourMomentum::from_pt_rap_phi(1.0, 0.0, 0.0),
            FourMomentum::from_pt_rap_phi(2.0, 0.1, 0.0),
        ];
        let mut cs =
            ClusterSequence::new(points, JetAlgorithm::CambridgeAachen, 1.0, Strategy::N2Plain);
        let merged = cs.do_ij_recombination(0, 1, 0.01, &EScheme);
        cs.do_beam_recombination(merged, 1.0);
        cs
    }

    #[test]
    fn test_history_bookkeeping() {
        let cs = two_point_sequence();
        assert_eq!(cs.history().len(), 4);
        assert_eq!(cs.points().len(), 3);

        let merge = &cs.history()[2];
        assert_eq!(merge.parent1, Some(0));
        assert_eq!(merge.parent2, Parent2::Entry(1));
        assert_eq!(merge.point, Some(2));
        assert_eq!(merge.child, Some(3));

        let beam = &cs.history()[3];
        assert_eq!(beam.parent1, Some(2));
        assert_eq!(beam.parent2, Parent2::Beam);
        assert_eq!(beam.point, None);

        // inputs were both consumed by the merge
        assert_eq!(cs.history()[0].child, Some(2));
        assert_eq!(cs.history()[1].child, Some(2));
        assert!(cs.unclustered_inputs().is_empty());
    }

    #[test]
    fn test_max_dij_running_maximum() {
        let cs = two_point_sequence();
        assert_eq!(cs.history()[2].max_dij_so_far, 0.01);
        assert_eq!(cs.history()[3].max_dij_so_far, 1.0);
    }

    #[test]
    fn test_structure_queries() {
        let cs = two_point_sequence();
        assert_eq!(cs.parents_of(2), Some((0, 1)));
        assert_eq!(cs.parents_of(0), None);
        assert_eq!(cs.parents_of(3), None, "beam rows have no merge parents");
        assert_eq!(cs.child_of(0), Some(2));
        assert_eq!(cs.child_of(2), None, "beam rows do not count as children");
        assert_eq!(cs.partner_of(0), Some(1));
        assert_eq!(cs.partner_of(1), Some(0));
        assert!(cs.is_descendant_of(0, 2));
        assert!(cs.is_descendant_of(1, 2));
        assert!(!cs.is_descendant_of(2, 0));
        assert_eq!(cs.constituent_indices(2), vec![0, 1]);
    }

    #[test]
    fn test_inclusive_and_exclusive() {
        let cs = two_point_sequence();
        let incl = cs.inclusive_jet_indices(0.0);
        assert_eq!(incl, vec![2]);

        let excl2 = cs.exclusive_jets(2).expect("two inputs available");
        assert_eq!(excl2.len(), 2);
        let excl1 = cs.exclusive_jets(1).expect("one jet");
        assert_eq!(excl1.len(), 1);
        assert!(matches!(
            cs.exclusive_jets(3),
            Err(ClusterError::TooFewInputs {
                requested: 3,
                available: 2
            })
        ));

        assert_eq!(cs.exclusive_dmerge(1), 0.01);
        assert_eq!(cs.exclusive_dmerge(2), 0.0);
    }
}
