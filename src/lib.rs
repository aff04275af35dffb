//! Sequential recombination clustering on the rapidity–azimuth cylinder.
//!
//! Given N weighted points in the periodic (rapidity, azimuth) plane,
//! this crate repeatedly finds the globally closest pair under a
//! momentum-weighted distance measure, merges it, and records every event
//! in a persistent history tree, until every point has been absorbed.
//! This is the pairwise-recombination engine of particle-physics jet
//! clustering, with dynamically maintained nearest-neighbour state over a
//! tiled spatial index (or, for angle-only measures at large
//! multiplicity, a shifted-ordering closest-pair structure).
//!
//! Several execution strategies are available; they trade set-up cost
//! against asymptotic behaviour and are selected automatically from
//! benchmark-fitted transition curves. The strategy never changes the
//! answer, only the running time.
//!
//! # Example
//!
//! ```
//! use cyl_cluster::{cluster, FourMomentum, JetAlgorithm};
//!
//! let particles = vec![
//!     FourMomentum::from_pt_rap_phi(50.0, 0.2, 1.0),
//!     FourMomentum::from_pt_rap_phi(30.0, 0.3, 1.1),
//!     FourMomentum::from_pt_rap_phi(40.0, -1.0, 4.0),
//! ];
//!
//! let seq = cluster(&particles, JetAlgorithm::AntiKt, 0.4).expect("clustering should succeed");
//! let jets = seq.inclusive_jets(10.0);
//! assert_eq!(jets.len(), 2);
//! ```

mod engine;
mod error;
mod history;
mod measure;
mod min_heap;
mod strategy;
mod types;
mod warnings;

pub use error::ClusterError;
pub use history::{ClusterSequence, HistoryEntry, Parent2};
pub use measure::{EScheme, JetAlgorithm, Recombiner};
pub use strategy::{CostModel, Line, Parabola, Strategy};
pub use types::{FourMomentum, FourMomentumLike, MAX_RAP};

use std::sync::{Arc, Weak};

/// Configuration for one clustering run.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// The distance measure family.
    pub algorithm: JetAlgorithm,
    /// The geometry radius parameter R.
    pub r: f64,
    /// Execution path; `Auto` picks from the cost model. An explicit
    /// choice is honoured unless it would be incorrect for the measure.
    pub strategy: Strategy,
    /// Transition curves used by `Strategy::Auto`. Performance only.
    pub cost_model: CostModel,
}

impl ClusterConfig {
    pub fn new(algorithm: JetAlgorithm, r: f64) -> Self {
        Self {
            algorithm,
            r,
            strategy: Strategy::Auto,
            cost_model: CostModel::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Cluster `particles` with the given measure and radius, with automatic
/// strategy selection and E-scheme recombination.
pub fn cluster<P: FourMomentumLike>(
    particles: &[P],
    algorithm: JetAlgorithm,
    r: f64,
) -> Result<ClusterSequence, ClusterError> {
    cluster_with(particles, ClusterConfig::new(algorithm, r))
}

/// Cluster with explicit configuration.
pub fn cluster_with<P: FourMomentumLike>(
    particles: &[P],
    config: ClusterConfig,
) -> Result<ClusterSequence, ClusterError> {
    cluster_with_recombiner(particles, config, &EScheme)
}

/// Cluster with explicit configuration and a custom recombination scheme.
pub fn cluster_with_recombiner<P: FourMomentumLike>(
    particles: &[P],
    config: ClusterConfig,
    recombiner: &dyn Recombiner,
) -> Result<ClusterSequence, ClusterError> {
    let points = engine::admit_inputs(particles, recombiner)?;
    let strategy = engine::resolve_strategy(
        config.strategy,
        points.len(),
        config.r,
        config.algorithm,
        &config.cost_model,
    )?;
    let mut cs = ClusterSequence::new(points, config.algorithm, config.r, strategy);
    engine::run(&mut cs, recombiner);
    Ok(cs)
}

/// A finished clustering under shared ownership.
///
/// [`Jet`] handles obtained from it keep weak back-references: they stay
/// cheap to copy around, never extend the sequence's lifetime, and their
/// structure queries fail with [`ClusterError::StaleSequence`] once the
/// last `SharedClusterSequence` clone is dropped. Teardown is
/// deterministic reference counting, not collection.
#[derive(Clone)]
pub struct SharedClusterSequence {
    inner: Arc<ClusterSequence>,
}

impl ClusterSequence {
    /// Move this sequence behind shared ownership, enabling [`Jet`]
    /// handles.
    pub fn into_shared(self) -> SharedClusterSequence {
        SharedClusterSequence {
            inner: Arc::new(self),
        }
    }
}

impl SharedClusterSequence {
    /// Direct access to the underlying sequence.
    #[inline]
    pub fn sequence(&self) -> &ClusterSequence {
        &self.inner
    }

    fn jet_from_point(&self, point: u32) -> Jet {
        Jet {
            momentum: self.inner.points()[point as usize],
            history_index: self.inner.history_index(point as usize),
            seq: Arc::downgrade(&self.inner),
        }
    }

    /// Inclusive jets above `ptmin`, as handles.
    pub fn inclusive_jets(&self, ptmin: f64) -> Vec<Jet> {
        self.inner
            .inclusive_jet_indices(ptmin)
            .into_iter()
            .map(|p| self.jet_from_point(p))
            .collect()
    }

    /// Exclusive jets at fixed count, as handles.
    pub fn exclusive_jets(&self, njets: usize) -> Result<Vec<Jet>, ClusterError> {
        if njets > self.inner.n_inputs() {
            return Err(ClusterError::TooFewInputs {
                requested: njets,
                available: self.inner.n_inputs(),
            });
        }
        Ok(self
            .inner
            .exclusive_jet_indices_up_to(njets)?
            .into_iter()
            .map(|p| self.jet_from_point(p))
            .collect())
    }
}

/// A jet handle tied to a shared clustering sequence.
#[derive(Clone)]
pub struct Jet {
    momentum: FourMomentum,
    history_index: u32,
    seq: Weak<ClusterSequence>,
}

impl Jet {
    /// The jet's four-momentum. Always available; only structure queries
    /// need the sequence to still exist.
    #[inline]
    pub fn momentum(&self) -> FourMomentum {
        self.momentum
    }

    #[inline]
    pub fn pt(&self) -> f64 {
        self.momentum.perp()
    }

    #[inline]
    pub fn history_index(&self) -> u32 {
        self.history_index
    }

    fn sequence(&self) -> Result<Arc<ClusterSequence>, ClusterError> {
        self.seq.upgrade().ok_or(ClusterError::StaleSequence)
    }

    /// Momenta of the original inputs folded into this jet.
    pub fn constituents(&self) -> Result<Vec<FourMomentum>, ClusterError> {
        Ok(self.sequence()?.constituents(self.history_index as usize))
    }

    /// Arena indices of the original inputs folded into this jet.
    pub fn constituent_indices(&self) -> Result<Vec<u32>, ClusterError> {
        Ok(self
            .sequence()?
            .constituent_indices(self.history_index as usize))
    }

    /// The two jets merged to form this one, if it is a merge product.
    pub fn parents(&self) -> Result<Option<(Jet, Jet)>, ClusterError> {
        let seq = self.sequence()?;
        Ok(seq
            .parents_of(self.history_index as usize)
            .map(|(p1, p2)| {
                let jet_of = |h: u32| Jet {
                    momentum: seq.points()[seq.history()[h as usize].point.unwrap() as usize],
                    history_index: h,
                    seq: self.seq.clone(),
                };
                (jet_of(p1), jet_of(p2))
            }))
    }

    /// True when `other` is folded into this jet somewhere along the
    /// merge tree.
    pub fn contains(&self, other: &Jet) -> Result<bool, ClusterError> {
        let seq = self.sequence()?;
        Ok(seq.is_descendant_of(other.history_index as usize, self.history_index as usize))
    }
}
