//! Execution-path selection.
//!
//! Every strategy produces the same history for the same input; the
//! selector only decides which engine is expected to be cheapest for a
//! given multiplicity, radius and measure family. The transition curves
//! are empirical fits from benchmark runs and live in a replaceable
//! [`CostModel`] table; re-fit them when porting to very different
//! hardware, but nothing about correctness depends on them.

use crate::measure::JetAlgorithm;

/// The available execution paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Pick automatically from the cost model. The default.
    Auto,
    /// Recompute every pairwise distance each iteration. O(N³); only a
    /// cross-check baseline.
    N3Dumb,
    /// Nearest-neighbour caches over a flat point array, global minimum
    /// by linear scan. O(N²) with a small constant; best for small N.
    N2Plain,
    /// Tiled spatial index, eager neighbour repair, minimum by scan over
    /// a compacted distance table.
    N2Tiled,
    /// Tiled spatial index with heap-based minimum extraction.
    N2TiledHeap,
    /// Tiled index with per-tile distance bounds that let the repair pass
    /// skip untouched tiles; 3×3 tile neighbourhood. The recommended
    /// mid-range path.
    N2TiledLazy9,
    /// As `N2TiledLazy9` with half-size tiles and a 5×5 neighbourhood;
    /// wins at high multiplicity.
    N2TiledLazy25,
    /// Closest-pair engine over shifted bit-interleaved orderings,
    /// O(N log N). Valid only for purely geometric measures
    /// (Cambridge/Aachen).
    NlnNClosestPair,
}

impl Strategy {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Strategy::Auto => "auto",
            Strategy::N3Dumb => "n3-dumb",
            Strategy::N2Plain => "n2-plain",
            Strategy::N2Tiled => "n2-tiled",
            Strategy::N2TiledHeap => "n2-tiled-heap",
            Strategy::N2TiledLazy9 => "n2-tiled-lazy9",
            Strategy::N2TiledLazy25 => "n2-tiled-lazy25",
            Strategy::NlnNClosestPair => "nlnn-closest-pair",
        }
    }
}

/// `a x² + b x + c`
#[derive(Debug, Clone, Copy)]
pub struct Parabola {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Parabola {
    const fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    #[inline]
    fn eval(&self, x: f64) -> f64 {
        (self.a * x + self.b) * x + self.c
    }
}

/// `a x + b`
#[derive(Debug, Clone, Copy)]
pub struct Line {
    pub a: f64,
    pub b: f64,
}

impl Line {
    const fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    #[inline]
    fn eval(&self, x: f64) -> f64 {
        self.a * x + self.b
    }
}

/// Fitted transition boundaries between execution paths.
///
/// Boundaries prefixed `n_` compare against N directly, `ln_` against
/// ln N. Separate curves exist per measure family where the benchmark
/// fits differed.
#[derive(Debug, Clone)]
pub struct CostModel {
    /// Below this multiplicity the indexing overhead never pays off.
    pub small_n: f64,
    /// Second small-N shortcut, scaled by radius: N ≤ small_n_over_r /
    /// (R + 0.6) also goes to the plain path.
    pub small_n_over_r: f64,

    // R < 0.65
    pub n_tiled_to_heap_low_r: Parabola,
    pub ln_heap_to_lazy9_low_r: Parabola,
    pub ln_lazy9_to_lazy25_akt_low_r: Parabola,
    pub ln_lazy9_to_lazy25_kt_low_r: Parabola,
    pub ln_lazy25_to_nlnn_akt_low_r: Parabola,
    pub ln_lazy25_to_nlnn_kt_low_r: Parabola,
    pub ln_lazy25_to_nlnn_cam_low_r: Parabola,

    // 0.65 <= R < π/2
    pub ln_tiled_to_lazy9_med_r: Line,

    // R >= π/2
    pub n_plain_to_lazy9_large_r: f64,
    pub n_lazy9_to_lazy25_akt_large_r: f64,
    pub n_lazy9_to_lazy25_kt_large_r: f64,
    pub n_lazy25_to_nlnn_akt_large_r: f64,
    pub n_lazy25_to_nlnn_kt_large_r: f64,
    pub n_lazy25_to_nlnn_cam_large_r: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            small_n: 30.0,
            small_n_over_r: 39.0,

            n_tiled_to_heap_low_r: Parabola::new(-45.4947, 54.3528, 44.6283),
            ln_heap_to_lazy9_low_r: Parabola::new(0.677807, -1.05006, 10.6994),
            ln_lazy9_to_lazy25_akt_low_r: Parabola::new(0.169967, -0.512589, 12.1572),
            ln_lazy9_to_lazy25_kt_low_r: Parabola::new(0.16237, -0.484612, 12.3373),
            ln_lazy25_to_nlnn_akt_low_r: Parabola::new(0.0472051, -0.22043, 15.9196),
            ln_lazy25_to_nlnn_kt_low_r: Parabola::new(0.118609, -0.326811, 14.8287),
            ln_lazy25_to_nlnn_cam_low_r: Parabola::new(0.10119, -0.295748, 14.3924),

            ln_tiled_to_lazy9_med_r: Line::new(-1.31304, 7.29621),

            n_plain_to_lazy9_large_r: 75.0,
            n_lazy9_to_lazy25_akt_large_r: 700.0,
            n_lazy9_to_lazy25_kt_large_r: 1000.0,
            n_lazy25_to_nlnn_akt_large_r: 100_000.0,
            n_lazy25_to_nlnn_kt_large_r: 40_000.0,
            n_lazy25_to_nlnn_cam_large_r: 15_000.0,
        }
    }
}

/// Measure family used for curve lookup. Timing fits exist for kt, anti-kt
/// and Cambridge/Aachen; generalized-kt borrows the family its `p` makes
/// it behave like.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Family {
    Kt,
    AntiKt,
    Cam,
}

fn family_of(algorithm: JetAlgorithm) -> Family {
    match algorithm {
        JetAlgorithm::Kt => Family::Kt,
        JetAlgorithm::AntiKt => Family::AntiKt,
        JetAlgorithm::CambridgeAachen => Family::Cam,
        JetAlgorithm::GenKt(p) => {
            if p < 0.0 {
                Family::AntiKt
            } else {
                Family::Kt
            }
        }
    }
}

/// The N log N path only exists for purely geometric measures; anything
/// else caps out at the finest tiled path.
fn nlnn_or_fallback(family: Family) -> Strategy {
    if family == Family::Cam {
        Strategy::NlnNClosestPair
    } else {
        Strategy::N2TiledLazy25
    }
}

/// Pick the expected-cheapest strategy for `n` points at radius `r`.
pub(crate) fn best_strategy(
    n: usize,
    r: f64,
    algorithm: JetAlgorithm,
    model: &CostModel,
) -> Strategy {
    // the fits are not trusted below R = 0.1
    let bounded_r = r.max(0.1);
    let nf = n as f64;

    if nf <= model.small_n || nf <= model.small_n_over_r / (bounded_r + 0.6) {
        return Strategy::N2Plain;
    }

    let family = family_of(algorithm);
    let ln_n = nf.ln();

    if bounded_r < 0.65 {
        if nf < model.n_tiled_to_heap_low_r.eval(bounded_r) {
            return Strategy::N2Tiled;
        }
        if ln_n < model.ln_heap_to_lazy9_low_r.eval(bounded_r) {
            return Strategy::N2TiledHeap;
        }
        let (to_25, to_nlnn) = match family {
            Family::AntiKt => (
                model.ln_lazy9_to_lazy25_akt_low_r,
                model.ln_lazy25_to_nlnn_akt_low_r,
            ),
            Family::Kt => (
                model.ln_lazy9_to_lazy25_kt_low_r,
                model.ln_lazy25_to_nlnn_kt_low_r,
            ),
            // the kt fit doubles for Cambridge/Aachen on the 9→25 boundary
            Family::Cam => (
                model.ln_lazy9_to_lazy25_kt_low_r,
                model.ln_lazy25_to_nlnn_cam_low_r,
            ),
        };
        if ln_n < to_25.eval(bounded_r) {
            Strategy::N2TiledLazy9
        } else if ln_n < to_nlnn.eval(bounded_r) {
            Strategy::N2TiledLazy25
        } else {
            nlnn_or_fallback(family)
        }
    } else if bounded_r < 0.5 * std::f64::consts::PI {
        if ln_n < model.ln_tiled_to_lazy9_med_r.eval(bounded_r) {
            return Strategy::N2Tiled;
        }
        // the 9→25 and 25→NlnN boundaries are R-independent here
        let (to_25, to_nlnn) = match family {
            Family::AntiKt => (
                model.ln_lazy9_to_lazy25_akt_low_r,
                model.ln_lazy25_to_nlnn_akt_low_r,
            ),
            Family::Kt => (
                model.ln_lazy9_to_lazy25_kt_low_r,
                model.ln_lazy25_to_nlnn_kt_low_r,
            ),
            Family::Cam => (
                model.ln_lazy9_to_lazy25_kt_low_r,
                model.ln_lazy25_to_nlnn_cam_low_r,
            ),
        };
        if ln_n < to_25.eval(bounded_r) {
            Strategy::N2TiledLazy9
        } else if ln_n < to_nlnn.eval(bounded_r) {
            Strategy::N2TiledLazy25
        } else {
            nlnn_or_fallback(family)
        }
    } else {
        if nf < model.n_plain_to_lazy9_large_r {
            return Strategy::N2Plain;
        }
        let (to_25, to_nlnn) = match family {
            Family::AntiKt => (
                model.n_lazy9_to_lazy25_akt_large_r,
                model.n_lazy25_to_nlnn_akt_large_r,
            ),
            Family::Kt => (
                model.n_lazy9_to_lazy25_kt_large_r,
                model.n_lazy25_to_nlnn_kt_large_r,
            ),
            Family::Cam => (
                model.n_lazy9_to_lazy25_kt_large_r,
                model.n_lazy25_to_nlnn_cam_large_r,
            ),
        };
        if nf < to_25 {
            Strategy::N2TiledLazy9
        } else if nf < to_nlnn {
            Strategy::N2TiledLazy25
        } else {
            nlnn_or_fallback(family)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_n_always_plain() {
        let model = CostModel::default();
        for n in [1, 5, 30] {
            for alg in [
                JetAlgorithm::Kt,
                JetAlgorithm::AntiKt,
                JetAlgorithm::CambridgeAachen,
            ] {
                assert_eq!(
                    best_strategy(n, 0.4, alg, &model),
                    Strategy::N2Plain,
                    "n={}",
                    n
                );
            }
        }
    }

    #[test]
    fn test_selection_scales_with_n() {
        let model = CostModel::default();
        // at R = 0.4 the path should climb through the tiled variants
        assert_eq!(
            best_strategy(50, 0.4, JetAlgorithm::Kt, &model),
            Strategy::N2Tiled
        );
        let mid = best_strategy(3_000, 0.4, JetAlgorithm::Kt, &model);
        assert!(
            matches!(mid, Strategy::N2TiledHeap | Strategy::N2TiledLazy9),
            "mid N chose {:?}",
            mid
        );
        let big = best_strategy(2_000_000, 0.4, JetAlgorithm::Kt, &model);
        assert_eq!(big, Strategy::N2TiledLazy25, "kt has no NlnN path");
    }

    #[test]
    fn test_only_cam_reaches_closest_pair() {
        let model = CostModel::default();
        let cam = best_strategy(2_000_000, 0.4, JetAlgorithm::CambridgeAachen, &model);
        assert_eq!(cam, Strategy::NlnNClosestPair);
        let akt = best_strategy(2_000_000, 0.4, JetAlgorithm::AntiKt, &model);
        assert_eq!(akt, Strategy::N2TiledLazy25);
    }

    #[test]
    fn test_genkt_borrows_family() {
        let model = CostModel::default();
        let pos = best_strategy(5_000, 1.0, JetAlgorithm::GenKt(0.5), &model);
        let kt = best_strategy(5_000, 1.0, JetAlgorithm::Kt, &model);
        assert_eq!(pos, kt);
        let neg = best_strategy(5_000, 1.0, JetAlgorithm::GenKt(-0.5), &model);
        let akt = best_strategy(5_000, 1.0, JetAlgorithm::AntiKt, &model);
        assert_eq!(neg, akt);
    }
}
