//! Execution engines for the recombination loop.
//!
//! Every engine drives the same bookkeeping on [`ClusterSequence`] and
//! differs only in how it finds the globally closest pair and how much
//! nearest-neighbour state it repairs per event. `run` dispatches on the
//! resolved strategy; the choice never changes the resulting history.

pub(crate) mod closest_pair;
pub(crate) mod plain;
pub(crate) mod tiled;

use crate::error::ClusterError;
use crate::history::ClusterSequence;
use crate::measure::{JetAlgorithm, Recombiner};
use crate::strategy::{best_strategy, CostModel, Strategy};
use crate::types::{FourMomentum, FourMomentumLike, TWO_PI};
use crate::warnings;

/// Convert, preprocess and validate the input particles. Admission is the
/// only place momenta are allowed to fail; the loop itself assumes finite
/// geometry throughout.
pub(crate) fn admit_inputs<P: FourMomentumLike>(
    particles: &[P],
    recombiner: &dyn Recombiner,
) -> Result<Vec<FourMomentum>, ClusterError> {
    let mut points: Vec<FourMomentum> = particles
        .iter()
        .map(|p| FourMomentum::from_like(p))
        .collect();
    for p in points.iter_mut() {
        recombiner.preprocess(p);
    }
    for (i, p) in points.iter().enumerate() {
        if !p.is_finite() {
            return Err(ClusterError::NonFiniteMomentum { index: i });
        }
    }
    Ok(points)
}

/// Resolve the requested strategy against multiplicity, radius and
/// measure, enforcing the combinations that correctness requires.
pub(crate) fn resolve_strategy(
    requested: Strategy,
    n: usize,
    r: f64,
    algorithm: JetAlgorithm,
    model: &CostModel,
) -> Result<Strategy, ClusterError> {
    if !(r.is_finite() && r > 0.0) {
        return Err(ClusterError::InvalidConfig(format!(
            "radius must be finite and positive, got {}",
            r
        )));
    }
    if let JetAlgorithm::GenKt(p) = algorithm {
        if !p.is_finite() {
            return Err(ClusterError::InvalidConfig(
                "generalized-kt exponent must be finite".into(),
            ));
        }
    }

    if requested == Strategy::NlnNClosestPair && !algorithm.is_geometric() {
        return Err(ClusterError::InvalidConfig(format!(
            "the closest-pair strategy requires a purely geometric measure, \
             not {}",
            algorithm.name()
        )));
    }

    let mut resolved = if requested == Strategy::Auto {
        best_strategy(n, r, algorithm, model)
    } else {
        requested
    };

    // With R >= 2π a mirrored strip no longer separates a point from its
    // own copy, so the closest-pair path cannot be trusted. The tiled
    // paths remain valid for any R (azimuth differences never exceed π).
    if r >= TWO_PI && resolved == Strategy::NlnNClosestPair {
        resolved = Strategy::N2TiledHeap;
        if requested != Strategy::Auto {
            warnings::warn_once(&format!(
                "strategy {} automatically changed to {} because the former \
                 is not supported for R = {} >= 2π",
                requested.name(),
                resolved.name(),
                r
            ));
        }
    }

    debug_assert_ne!(resolved, Strategy::Auto);
    Ok(resolved)
}

/// Run the resolved engine over the sequence's inputs.
pub(crate) fn run(cs: &mut ClusterSequence, recombiner: &dyn Recombiner) {
    if cs.n_inputs() == 0 {
        return;
    }
    match cs.strategy_used() {
        Strategy::N3Dumb => plain::really_dumb_cluster(cs, recombiner),
        Strategy::N2Plain => plain::plain_n2_cluster(cs, recombiner),
        Strategy::N2Tiled => tiled::tiled_n2_cluster(cs, recombiner),
        Strategy::N2TiledHeap => tiled::minheap_tiled_n2_cluster(cs, recombiner),
        Strategy::N2TiledLazy9 => tiled::lazy_tiled_cluster(cs, recombiner, 1),
        Strategy::N2TiledLazy25 => tiled::lazy_tiled_cluster(cs, recombiner, 2),
        Strategy::NlnNClosestPair => closest_pair::closest_pair_cam_cluster(cs, recombiner),
        Strategy::Auto => unreachable!("strategy resolved before running"),
    }
}
