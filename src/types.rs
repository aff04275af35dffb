//! Core types for cylinder clustering.

use bytemuck::{Pod, Zeroable};

/// Rapidity assigned to massless particles travelling exactly along the
/// beam axis, for which true rapidity is infinite. Large enough to park
/// such particles far outside any physical tiling region.
pub const MAX_RAP: f64 = 1e5;

pub(crate) const TWO_PI: f64 = 2.0 * std::f64::consts::PI;

/// A four-momentum `(px, py, pz, E)`.
///
/// This type provides a small `#[repr(C)]` representation with a stable
/// layout. No mass-shell or positivity constraints are enforced; the
/// clustering engine only requires every component to be finite.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FourMomentum {
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    pub e: f64,
}

impl FourMomentum {
    #[inline]
    pub const fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self { px, py, pz, e }
    }

    /// Create from any type implementing `FourMomentumLike`.
    #[inline]
    pub fn from_like<P: FourMomentumLike>(p: &P) -> Self {
        Self::new(p.px(), p.py(), p.pz(), p.e())
    }

    /// Build a massless four-momentum from transverse momentum, rapidity
    /// and azimuth. Mainly useful for constructing test events.
    pub fn from_pt_rap_phi(pt: f64, rap: f64, phi: f64) -> Self {
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * rap.sinh();
        let e = pt * rap.cosh();
        Self::new(px, py, pz, e)
    }

    /// Squared transverse momentum.
    #[inline]
    pub fn perp2(&self) -> f64 {
        self.px * self.px + self.py * self.py
    }

    /// Transverse momentum.
    #[inline]
    pub fn perp(&self) -> f64 {
        self.perp2().sqrt()
    }

    /// Squared invariant mass (may be negative for unphysical input).
    #[inline]
    pub fn m2(&self) -> f64 {
        self.e * self.e - self.px * self.px - self.py * self.py - self.pz * self.pz
    }

    /// Rapidity, evaluated in a form that stays accurate for large boosts.
    ///
    /// Particles with zero transverse momentum and `E == |pz|` have no
    /// finite rapidity and are parked at `±(MAX_RAP + |pz|)`.
    pub fn rap(&self) -> f64 {
        let kt2 = self.perp2();
        if self.e == self.pz.abs() && kt2 == 0.0 {
            let max_rap_here = MAX_RAP + self.pz.abs();
            return if self.pz >= 0.0 {
                max_rap_here
            } else {
                -max_rap_here
            };
        }
        // rap = 0.5 ln[(kt2 + m2) / (E + |pz|)^2], sign-corrected, avoids
        // the catastrophic cancellation of 0.5 ln[(E+pz)/(E-pz)].
        let effective_m2 = self.m2().max(0.0);
        let e_plus_pz = self.e + self.pz.abs();
        let mut rap = 0.5 * ((kt2 + effective_m2) / (e_plus_pz * e_plus_pz)).ln();
        if self.pz > 0.0 {
            rap = -rap;
        }
        rap
    }

    /// Azimuthal angle in `[0, 2π)`; zero for particles with no
    /// transverse momentum.
    pub fn phi_02pi(&self) -> f64 {
        if self.perp2() == 0.0 {
            return 0.0;
        }
        let mut phi = self.py.atan2(self.px);
        if phi < 0.0 {
            phi += TWO_PI;
        }
        if phi >= TWO_PI {
            phi -= TWO_PI;
        }
        phi
    }

    /// Component-wise sum, the E-scheme recombination.
    #[inline]
    pub fn add(&self, other: &Self) -> Self {
        Self::new(
            self.px + other.px,
            self.py + other.py,
            self.pz + other.pz,
            self.e + other.e,
        )
    }

    /// True when all four components are finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.px.is_finite() && self.py.is_finite() && self.pz.is_finite() && self.e.is_finite()
    }
}

impl From<[f64; 4]> for FourMomentum {
    #[inline]
    fn from([px, py, pz, e]: [f64; 4]) -> Self {
        Self::new(px, py, pz, e)
    }
}

impl From<FourMomentum> for [f64; 4] {
    #[inline]
    fn from(p: FourMomentum) -> Self {
        [p.px, p.py, p.pz, p.e]
    }
}

impl std::ops::Add for FourMomentum {
    type Output = FourMomentum;
    #[inline]
    fn add(self, other: FourMomentum) -> FourMomentum {
        FourMomentum::add(&self, &other)
    }
}

/// Trait for types that can be used as input particles.
///
/// This allows zero-copy input from various event representations.
pub trait FourMomentumLike {
    fn px(&self) -> f64;
    fn py(&self) -> f64;
    fn pz(&self) -> f64;
    fn e(&self) -> f64;
}

impl FourMomentumLike for FourMomentum {
    #[inline]
    fn px(&self) -> f64 {
        self.px
    }
    #[inline]
    fn py(&self) -> f64 {
        self.py
    }
    #[inline]
    fn pz(&self) -> f64 {
        self.pz
    }
    #[inline]
    fn e(&self) -> f64 {
        self.e
    }
}

impl FourMomentumLike for [f64; 4] {
    #[inline]
    fn px(&self) -> f64 {
        self[0]
    }
    #[inline]
    fn py(&self) -> f64 {
        self[1]
    }
    #[inline]
    fn pz(&self) -> f64 {
        self[2]
    }
    #[inline]
    fn e(&self) -> f64 {
        self[3]
    }
}

impl FourMomentumLike for (f64, f64, f64, f64) {
    #[inline]
    fn px(&self) -> f64 {
        self.0
    }
    #[inline]
    fn py(&self) -> f64 {
        self.1
    }
    #[inline]
    fn pz(&self) -> f64 {
        self.2
    }
    #[inline]
    fn e(&self) -> f64 {
        self.3
    }
}

/// Cached geometry for one point in the arena: position on the cylinder
/// plus the measure-independent squared transverse momentum. Computed once
/// when the point is admitted or created by a merge.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PointGeom {
    pub rap: f64,
    pub phi: f64,
    pub kt2: f64,
}

impl PointGeom {
    #[inline]
    pub fn of(p: &FourMomentum) -> Self {
        Self {
            rap: p.rap(),
            phi: p.phi_02pi(),
            kt2: p.perp2(),
        }
    }
}

/// Squared cylinder distance between two cached positions; the azimuthal
/// difference wraps at π.
#[inline]
pub(crate) fn geom_dist2(a: &PointGeom, b: &PointGeom) -> f64 {
    let mut dphi = (a.phi - b.phi).abs();
    let drap = a.rap - b.rap;
    if dphi > std::f64::consts::PI {
        dphi = TWO_PI - dphi;
    }
    dphi * dphi + drap * drap
}

/// Squared cylinder distance without the periodic wrap test, valid when
/// both points are known to be far from the azimuthal seam.
#[inline]
pub(crate) fn geom_dist2_not_periodic(a: &PointGeom, b: &PointGeom) -> f64 {
    let dphi = a.phi - b.phi;
    let drap = a.rap - b.rap;
    dphi * dphi + drap * drap
}
