//! Distance measures and recombination schemes.
//!
//! A measure contributes two ingredients to the engine: a per-point
//! momentum scale and the shared cylinder geometry of [`crate::types`].
//! The weighted pair distance is `min(scale_a, scale_b) * Δ²/R²` and the
//! beam distance is the point's own scale. All built-in measures satisfy
//! the dominance condition that makes tiled nearest-neighbour pruning
//! exact; only the angle-only measure is eligible for the closest-pair
//! (N log N) execution path.

use crate::types::FourMomentum;

/// Floor applied to kt² before inverting it, so that zero-pt particles do
/// not produce infinite scales.
const KT2_FLOOR: f64 = 1e-300;

/// Scale ceiling paired with [`KT2_FLOOR`].
const SCALE_CEIL: f64 = 1e300;

/// The family of momentum-weighted distance measures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JetAlgorithm {
    /// scale = kt²; clusters soft particles first.
    Kt,
    /// scale = 1; purely geometric, clusters closest angles first.
    CambridgeAachen,
    /// scale = 1/kt²; clusters around hard particles first.
    AntiKt,
    /// scale = (kt²)^p; p = 1 is kt, p = 0 is Cambridge/Aachen,
    /// p = -1 is anti-kt.
    GenKt(f64),
}

impl JetAlgorithm {
    /// Momentum scale factor for a point with squared transverse
    /// momentum `kt2`.
    #[inline]
    pub fn momentum_scale(&self, kt2: f64) -> f64 {
        match *self {
            JetAlgorithm::Kt => kt2,
            JetAlgorithm::CambridgeAachen => 1.0,
            JetAlgorithm::AntiKt => {
                if kt2 > KT2_FLOOR {
                    1.0 / kt2
                } else {
                    SCALE_CEIL
                }
            }
            JetAlgorithm::GenKt(p) => {
                let kt2 = if p <= 0.0 && kt2 < KT2_FLOOR {
                    KT2_FLOOR
                } else {
                    kt2
                };
                kt2.powf(p)
            }
        }
    }

    /// True when the measure reduces to a pure geometric distance, which
    /// is what the closest-pair engine requires.
    #[inline]
    pub fn is_geometric(&self) -> bool {
        matches!(self, JetAlgorithm::CambridgeAachen)
    }

    /// True when merge scales grow monotonically along the clustering
    /// sequence, which is what gives exclusive (fixed-count) jets a clean
    /// interpretation.
    #[inline]
    pub(crate) fn has_monotonic_scales(&self) -> bool {
        match *self {
            JetAlgorithm::Kt | JetAlgorithm::CambridgeAachen => true,
            JetAlgorithm::AntiKt => false,
            JetAlgorithm::GenKt(p) => p >= 0.0,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            JetAlgorithm::Kt => "kt",
            JetAlgorithm::CambridgeAachen => "cambridge-aachen",
            JetAlgorithm::AntiKt => "anti-kt",
            JetAlgorithm::GenKt(_) => "generalized-kt",
        }
    }
}

/// Combines two points into their merged successor.
///
/// Implementations must be pure functions of their arguments: a run may
/// execute next to other runs on other threads, and repairs assume the
/// merged momentum does not depend on evaluation order within one merge.
pub trait Recombiner {
    /// Combine `a` and `b` into the momentum of the merged point.
    fn recombine(&self, a: &FourMomentum, b: &FourMomentum) -> FourMomentum;

    /// Hook applied to every input before clustering starts. The default
    /// leaves inputs untouched.
    fn preprocess(&self, _p: &mut FourMomentum) {}
}

/// Four-vector addition, the default recombination scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct EScheme;

impl Recombiner for EScheme {
    #[inline]
    fn recombine(&self, a: &FourMomentum, b: &FourMomentum) -> FourMomentum {
        a.add(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_momentum_scales() {
        let kt2 = 4.0;
        assert_eq!(JetAlgorithm::Kt.momentum_scale(kt2), 4.0);
        assert_eq!(JetAlgorithm::CambridgeAachen.momentum_scale(kt2), 1.0);
        assert_eq!(JetAlgorithm::AntiKt.momentum_scale(kt2), 0.25);
        assert_eq!(JetAlgorithm::GenKt(1.0).momentum_scale(kt2), 4.0);
        assert_eq!(JetAlgorithm::GenKt(0.0).momentum_scale(kt2), 1.0);
        assert_eq!(JetAlgorithm::GenKt(-1.0).momentum_scale(kt2), 0.25);
    }

    #[test]
    fn test_zero_kt_guards() {
        // anti-kt and negative-p genkt must not return infinity for
        // zero-pt particles
        let s = JetAlgorithm::AntiKt.momentum_scale(0.0);
        assert!(s.is_finite());
        let s = JetAlgorithm::GenKt(-0.5).momentum_scale(0.0);
        assert!(s.is_finite(), "genkt scale = {}", s);
    }

    #[test]
    fn test_e_scheme_is_componentwise_sum() {
        let a = FourMomentum::new(1.0, 0.0, 0.5, 2.0);
        let b = FourMomentum::new(0.0, 1.0, -0.5, 2.0);
        let c = EScheme.recombine(&a, &b);
        assert_eq!(c, FourMomentum::new(1.0, 1.0, 0.0, 4.0));
    }
}
