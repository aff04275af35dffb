//! Public API integration tests for cyl-cluster.

mod support;

use cyl_cluster::{
    cluster, cluster_with, ClusterConfig, ClusterError, FourMomentum, JetAlgorithm, Parent2,
    Strategy,
};
use support::points::{jetty_event, random_event, seam_event};

#[test]
fn test_empty_event() {
    let particles: Vec<FourMomentum> = Vec::new();
    let seq = cluster(&particles, JetAlgorithm::Kt, 0.4).expect("empty event is not an error");
    assert!(seq.history().is_empty());
    assert!(seq.inclusive_jets(0.0).is_empty());
    assert_eq!(seq.exclusive_jets(0).unwrap().len(), 0);
}

#[test]
fn test_single_particle() {
    let particles = vec![FourMomentum::from_pt_rap_phi(10.0, 0.5, 1.0)];
    let seq = cluster(&particles, JetAlgorithm::Kt, 0.4).unwrap();

    // one input row plus one beam absorption, no merges
    assert_eq!(seq.history().len(), 2);
    assert_eq!(seq.history()[1].parent2, Parent2::Beam);
    assert_eq!(seq.history()[1].parent1, Some(0));

    let jets = seq.inclusive_jets(0.0);
    assert_eq!(jets.len(), 1);
    assert!((jets[0].perp() - 10.0).abs() < 1e-9);
}

#[test]
fn test_history_size_and_monotonic_max() {
    for (alg, seed) in [
        (JetAlgorithm::Kt, 11u64),
        (JetAlgorithm::AntiKt, 12),
        (JetAlgorithm::CambridgeAachen, 13),
        (JetAlgorithm::GenKt(0.5), 14),
    ] {
        for n in [1usize, 2, 7, 60, 250] {
            let particles = random_event(n, seed ^ n as u64);
            let seq = cluster(&particles, alg, 0.6).unwrap();

            // every point is consumed by exactly one event
            assert_eq!(
                seq.history().len(),
                2 * n,
                "history size for n={} with {:?}",
                n,
                alg
            );

            let mut prev = 0.0;
            for (i, h) in seq.history().iter().enumerate() {
                assert!(
                    h.max_dij_so_far >= prev,
                    "max_dij_so_far decreased at row {} for {:?}",
                    i,
                    alg
                );
                prev = h.max_dij_so_far;
            }
        }
    }
}

#[test]
fn test_determinism() {
    let particles = jetty_event(4, 20, 100, 321);
    let a = cluster(&particles, JetAlgorithm::Kt, 0.5).unwrap();
    let b = cluster(&particles, JetAlgorithm::Kt, 0.5).unwrap();

    assert_eq!(a.history().len(), b.history().len());
    for (ha, hb) in a.history().iter().zip(b.history().iter()) {
        assert_eq!(ha, hb);
    }
    assert_eq!(a.points().len(), b.points().len());
    for (pa, pb) in a.points().iter().zip(b.points().iter()) {
        assert_eq!(pa, pb);
    }
}

#[test]
fn test_four_point_ladder() {
    // rapidity ladder: -0.2, -0.1, 0.1, 0.2 at the same azimuth with
    // unit scale and an angle-only measure
    let particles = vec![
        FourMomentum::from_pt_rap_phi(1.0, -0.2, 0.0),
        FourMomentum::from_pt_rap_phi(1.0, -0.1, 0.0),
        FourMomentum::from_pt_rap_phi(1.0, 0.1, 0.0),
        FourMomentum::from_pt_rap_phi(1.0, 0.2, 0.0),
    ];
    let r = 0.5;
    let seq = cluster(&particles, JetAlgorithm::CambridgeAachen, r).unwrap();

    // the first merge joins one of the 0.1-separated pairs
    let first_merge = &seq.history()[4];
    assert!(matches!(first_merge.parent2, Parent2::Entry(_)));
    let expected = 0.1 * 0.1 / (r * r);
    assert!(
        (first_merge.dij - expected).abs() < 1e-9,
        "first merge at {} (expected {})",
        first_merge.dij,
        expected
    );

    // everything within R of its neighbour: a single final jet holding
    // all four inputs
    let jets = seq.inclusive_jet_indices(0.0);
    assert_eq!(jets.len(), 1);
    let mut constituents =
        seq.constituent_indices(seq.history_index(jets[0] as usize) as usize);
    constituents.sort_unstable();
    assert_eq!(constituents, vec![0, 1, 2, 3]);
}

#[test]
fn test_two_separated_jets() {
    let particles = vec![
        FourMomentum::from_pt_rap_phi(40.0, 0.0, 1.0),
        FourMomentum::from_pt_rap_phi(20.0, 0.1, 1.05),
        FourMomentum::from_pt_rap_phi(35.0, 0.0, 4.0),
        FourMomentum::from_pt_rap_phi(10.0, -0.1, 4.1),
    ];
    for alg in [
        JetAlgorithm::Kt,
        JetAlgorithm::AntiKt,
        JetAlgorithm::CambridgeAachen,
    ] {
        let seq = cluster(&particles, alg, 0.6).unwrap();
        let jets = seq.inclusive_jet_indices(5.0);
        assert_eq!(jets.len(), 2, "{:?} found {} jets", alg, jets.len());

        let mut sets: Vec<Vec<u32>> = jets
            .iter()
            .map(|&p| {
                let mut c = seq.constituent_indices(seq.history_index(p as usize) as usize);
                c.sort_unstable();
                c
            })
            .collect();
        sets.sort();
        assert_eq!(sets, vec![vec![0, 1], vec![2, 3]]);
    }
}

#[test]
fn test_seam_pairs_cluster_across_wrap() {
    // two particles straddling phi = 0 must merge despite the wrap
    let particles = vec![
        FourMomentum::from_pt_rap_phi(10.0, 0.0, 0.05),
        FourMomentum::from_pt_rap_phi(12.0, 0.0, std::f64::consts::TAU - 0.05),
    ];
    for strategy in [
        Strategy::N2Plain,
        Strategy::N2Tiled,
        Strategy::N2TiledHeap,
        Strategy::N2TiledLazy9,
        Strategy::N2TiledLazy25,
    ] {
        let config = ClusterConfig::new(JetAlgorithm::Kt, 0.4).with_strategy(strategy);
        let seq = cluster_with(&particles, config).unwrap();
        let jets = seq.inclusive_jets(0.0);
        assert_eq!(
            jets.len(),
            1,
            "{:?}: seam pair did not merge",
            strategy
        );
    }
}

#[test]
fn test_exclusive_jets_counts_and_errors() {
    let particles = random_event(24, 5);
    let seq = cluster(&particles, JetAlgorithm::Kt, 0.7).unwrap();

    for njets in [1usize, 2, 5, 24] {
        let jets = seq.exclusive_jets(njets).unwrap();
        assert_eq!(jets.len(), njets);
    }
    assert!(matches!(
        seq.exclusive_jets(25),
        Err(ClusterError::TooFewInputs {
            requested: 25,
            available: 24
        })
    ));

    // dmerge scales bracket the dcut-based counts
    let d5 = seq.exclusive_dmerge(5);
    assert!(d5 > 0.0);
    assert_eq!(seq.n_exclusive_jets(seq.exclusive_dmerge_max(5)), 5);

    // a dcut above every merge scale lets the clustering run to
    // completion: nothing is left unabsorbed
    let huge = seq.history().last().unwrap().max_dij_so_far * 2.0;
    assert_eq!(seq.n_exclusive_jets(huge), 0);
    assert!(seq.exclusive_jets_dcut(huge).unwrap().is_empty());
}

#[test]
fn test_exclusive_jets_are_disjoint() {
    let particles = random_event(30, 8);
    let seq = cluster(&particles, JetAlgorithm::Kt, 0.8).unwrap();

    // the 3-jet state: three live jets with non-overlapping constituents
    let jets = seq.exclusive_jet_indices_up_to(3).unwrap();
    assert_eq!(jets.len(), 3);
    let mut all: Vec<u32> = jets
        .iter()
        .flat_map(|&p| seq.constituent_indices(seq.history_index(p as usize) as usize))
        .collect();
    let total = all.len();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), total, "exclusive jets share constituents");
    assert!(all.iter().all(|&i| i < 30));
}

#[test]
fn test_constituents_partition_event() {
    for alg in [JetAlgorithm::Kt, JetAlgorithm::AntiKt] {
        let particles = seam_event(80, 17);
        let seq = cluster(&particles, alg, 0.4).unwrap();
        let jets = seq.inclusive_jet_indices(0.0);

        let mut all: Vec<u32> = jets
            .iter()
            .flat_map(|&p| seq.constituent_indices(seq.history_index(p as usize) as usize))
            .collect();
        all.sort_unstable();
        let want: Vec<u32> = (0..80).collect();
        assert_eq!(all, want, "{:?}: inclusive jets must partition the event", alg);
    }
}

#[test]
fn test_non_finite_input_rejected() {
    let particles = vec![
        FourMomentum::new(1.0, 0.0, 0.0, 1.0),
        FourMomentum::new(0.0, f64::INFINITY, 0.0, 1.0),
    ];
    let err = cluster(&particles, JetAlgorithm::Kt, 0.4).unwrap_err();
    assert!(matches!(err, ClusterError::NonFiniteMomentum { index: 1 }));
}

#[test]
fn test_beam_parallel_input_survives() {
    // a zero-pt particle along the beam axis is finite and admissible;
    // it ends up beam-absorbed on its own
    let particles = vec![
        FourMomentum::new(0.0, 0.0, 5.0, 5.0),
        FourMomentum::from_pt_rap_phi(10.0, 0.0, 1.0),
        FourMomentum::from_pt_rap_phi(11.0, 0.1, 1.1),
    ];
    for strategy in [Strategy::N2Plain, Strategy::N2TiledLazy9] {
        let config = ClusterConfig::new(JetAlgorithm::Kt, 0.5).with_strategy(strategy);
        let seq = cluster_with(&particles, config).unwrap();
        assert_eq!(seq.history().len(), 6);
        let jets = seq.inclusive_jet_indices(1.0);
        assert_eq!(jets.len(), 1, "{:?}", strategy);
    }
}

#[test]
fn test_huge_r_clusters_everything() {
    // R beyond the full extent of the event: every pair is within reach,
    // so the event collapses to a single jet
    let particles = seam_event(40, 23);
    let seq = cluster(&particles, JetAlgorithm::CambridgeAachen, 7.0).unwrap();
    let jets = seq.inclusive_jet_indices(0.0);
    assert_eq!(jets.len(), 1);
    assert_eq!(
        seq.constituent_indices(seq.history_index(jets[0] as usize) as usize)
            .len(),
        40
    );
}

#[test]
fn test_genkt_limits_match_named_measures() {
    let particles = jetty_event(3, 10, 40, 77);

    let kt = cluster(&particles, JetAlgorithm::Kt, 0.5).unwrap();
    let genkt1 = cluster(&particles, JetAlgorithm::GenKt(1.0), 0.5).unwrap();
    assert_eq!(kt.history().len(), genkt1.history().len());
    for (a, b) in kt.history().iter().zip(genkt1.history().iter()) {
        assert_eq!(a.parent1, b.parent1);
        assert_eq!(a.parent2, b.parent2);
    }

    let akt = cluster(&particles, JetAlgorithm::AntiKt, 0.5).unwrap();
    let genktm1 = cluster(&particles, JetAlgorithm::GenKt(-1.0), 0.5).unwrap();
    for (a, b) in akt.history().iter().zip(genktm1.history().iter()) {
        assert_eq!(a.parent1, b.parent1);
        assert_eq!(a.parent2, b.parent2);
    }
}
