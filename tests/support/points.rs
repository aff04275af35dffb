#![allow(dead_code)]

use cyl_cluster::FourMomentum;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::f64::consts::TAU;

/// Particles thrown uniformly over the cylinder with a falling
/// transverse-momentum spectrum.
pub fn random_event(n: usize, seed: u64) -> Vec<FourMomentum> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    random_event_with_rng(n, &mut rng)
}

pub fn random_event_with_rng<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<FourMomentum> {
    (0..n)
        .map(|_| {
            let pt = 1.0 / rng.gen_range(0.02..1.0f64);
            let rap = rng.gen_range(-4.0..4.0);
            let phi = rng.gen_range(0.0..TAU);
            FourMomentum::from_pt_rap_phi(pt, rap, phi)
        })
        .collect()
}

/// A handful of collimated cores plus soft background, so that events
/// contain genuine jet structure rather than uniform noise.
pub fn jetty_event(n_cores: usize, per_core: usize, n_soft: usize, seed: u64) -> Vec<FourMomentum> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut particles = Vec::with_capacity(n_cores * per_core + n_soft);

    for _ in 0..n_cores {
        let core_rap = rng.gen_range(-2.0..2.0);
        let core_phi = rng.gen_range(0.0..TAU);
        for _ in 0..per_core {
            let pt = rng.gen_range(5.0..50.0);
            let rap = core_rap + rng.gen_range(-0.15..0.15);
            let mut phi = core_phi + rng.gen_range(-0.15..0.15);
            if phi < 0.0 {
                phi += TAU;
            }
            if phi >= TAU {
                phi -= TAU;
            }
            particles.push(FourMomentum::from_pt_rap_phi(pt, rap, phi));
        }
    }
    for _ in 0..n_soft {
        let pt = rng.gen_range(0.1..1.0);
        let rap = rng.gen_range(-4.0..4.0);
        let phi = rng.gen_range(0.0..TAU);
        particles.push(FourMomentum::from_pt_rap_phi(pt, rap, phi));
    }
    particles
}

/// An event hugging the azimuthal seam, to exercise the periodic wrap in
/// every engine.
pub fn seam_event(n: usize, seed: u64) -> Vec<FourMomentum> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let pt = rng.gen_range(1.0..20.0);
            let rap = rng.gen_range(-1.0..1.0);
            // within ±0.3 of phi = 0, on either side of the seam
            let mut phi = rng.gen_range(-0.3..0.3f64);
            if phi < 0.0 {
                phi += TAU;
            }
            FourMomentum::from_pt_rap_phi(pt, rap, phi)
        })
        .collect()
}
