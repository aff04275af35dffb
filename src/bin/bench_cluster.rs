//! Benchmark cyl-cluster at various multiplicities.
//!
//! Run with: cargo run --release --bin bench_cluster
//!
//! Usage:
//!   bench_cluster                 Run default sizes
//!   bench_cluster -n 1k 10k 100k  Run specific sizes
//!   bench_cluster --all-strategies  Time every execution path
//!   bench_cluster -r 1.0 --algorithm kt

use clap::Parser;
use cyl_cluster::{cluster_with, ClusterConfig, FourMomentum, JetAlgorithm, Strategy};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Instant;

fn parse_count(s: &str) -> Result<usize, String> {
    let s = s.to_lowercase();
    let (num_str, multiplier) = if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 1_000_000)
    } else if let Some(stripped) = s.strip_suffix('k') {
        (stripped, 1_000)
    } else {
        (s.as_str(), 1)
    };

    num_str
        .parse::<f64>()
        .map(|n| (n * multiplier as f64) as usize)
        .map_err(|e| format!("Invalid count '{}': {}", s, e))
}

fn parse_algorithm(s: &str) -> Result<JetAlgorithm, String> {
    match s {
        "kt" => Ok(JetAlgorithm::Kt),
        "antikt" | "anti-kt" => Ok(JetAlgorithm::AntiKt),
        "cam" | "cambridge-aachen" => Ok(JetAlgorithm::CambridgeAachen),
        other => other
            .parse::<f64>()
            .map(JetAlgorithm::GenKt)
            .map_err(|_| format!("Unknown algorithm '{}'", other)),
    }
}

#[derive(Parser)]
#[command(about = "Benchmark sequential recombination clustering")]
struct Args {
    /// Event sizes (supports k/m suffixes)
    #[arg(short = 'n', value_parser = parse_count, num_args = 1.., default_values = ["1k", "10k"])]
    sizes: Vec<usize>,

    /// Radius parameter
    #[arg(short = 'r', long, default_value_t = 0.4)]
    radius: f64,

    /// kt, antikt, cam, or a generalized-kt exponent
    #[arg(long, value_parser = parse_algorithm, default_value = "antikt")]
    algorithm: JetAlgorithm,

    /// Repetitions per measurement
    #[arg(long, default_value_t = 3)]
    repeat: usize,

    /// Time every execution path instead of the automatic one
    #[arg(long)]
    all_strategies: bool,

    /// Random seed for event generation
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// A crude event: particles thrown uniformly in |y| < 5 with a falling
/// transverse momentum spectrum.
fn random_event(n: usize, rng: &mut impl Rng) -> Vec<FourMomentum> {
    use std::f64::consts::TAU;
    (0..n)
        .map(|_| {
            let pt = 1.0 / rng.gen_range(0.02..1.0f64);
            let rap = rng.gen_range(-5.0..5.0);
            let phi = rng.gen_range(0.0..TAU);
            FourMomentum::from_pt_rap_phi(pt, rap, phi)
        })
        .collect()
}

fn time_strategy(
    particles: &[FourMomentum],
    algorithm: JetAlgorithm,
    r: f64,
    strategy: Strategy,
    repeat: usize,
) -> Option<(f64, usize, Strategy)> {
    let mut best = f64::MAX;
    let mut njets = 0;
    let mut used = strategy;
    for _ in 0..repeat {
        let config = ClusterConfig::new(algorithm, r).with_strategy(strategy);
        let start = Instant::now();
        let seq = match cluster_with(particles, config) {
            Ok(seq) => seq,
            Err(_) => return None,
        };
        let elapsed = start.elapsed().as_secs_f64();
        njets = seq.inclusive_jets(0.0).len();
        used = seq.strategy_used();
        best = best.min(elapsed);
    }
    Some((best, njets, used))
}

fn main() {
    let args = Args::parse();
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    let strategies: &[Strategy] = if args.all_strategies {
        &[
            Strategy::N3Dumb,
            Strategy::N2Plain,
            Strategy::N2Tiled,
            Strategy::N2TiledHeap,
            Strategy::N2TiledLazy9,
            Strategy::N2TiledLazy25,
            Strategy::NlnNClosestPair,
            Strategy::Auto,
        ]
    } else {
        &[Strategy::Auto]
    };

    println!(
        "# algorithm={:?} R={} repeat={}",
        args.algorithm, args.radius, args.repeat
    );

    for &n in &args.sizes {
        let particles = random_event(n, &mut rng);
        for &strategy in strategies {
            // the cubic baseline becomes unreasonable quickly
            if strategy == Strategy::N3Dumb && n > 2_000 {
                continue;
            }
            match time_strategy(&particles, args.algorithm, args.radius, strategy, args.repeat) {
                Some((secs, njets, used)) => println!(
                    "n={:>9}  requested={:<18?} ran={:<16?} {:>10.3} ms   {} jets",
                    n,
                    strategy,
                    used,
                    secs * 1e3,
                    njets
                ),
                None => println!(
                    "n={:>9}  requested={:<18?} (not valid for this configuration)",
                    n, strategy
                ),
            }
        }
    }
}
