//! Integration tests for the tiling pipeline.

use polytile::analysis::{time_dim_size, time_tiling};
use polytile::prelude::*;
use polytile::prelude::Strategy;
use polytile::transform::split::phase_pieces;
use proptest::prelude::*;

fn all_phases(phases: &[UnionSet]) -> UnionSet {
    phases.iter().fold(UnionSet::new(), |acc, p| acc.union(p))
}

fn pairwise_disjoint(phases: &[UnionSet]) -> bool {
    phases
        .iter()
        .enumerate()
        .all(|(a, pa)| phases[a + 1..].iter().all(|pb| pa.is_disjoint(pb)))
}

#[test]
fn test_heat_1d_split_scenario() {
    let scop = kernels::heat_1d(10, 20);
    let config = TilingConfig::new().strategy(Strategy::Split).tile_sizes(vec![4, 4]);
    let (schedule, outcome) = polytile::tile(&scop, &config).expect("split tiling failed");

    let probe = outcome.probe.as_ref().expect("split tiling reports its probe");
    assert!(probe.factor.is_integer() && probe.factor.to_integer().abs() == 1);
    assert_eq!(probe.n_phases, 2);
    assert_eq!(outcome.phases.len(), 2);

    let domain = scop.domain().unwrap();
    assert!(pairwise_disjoint(&outcome.phases));
    assert_eq!(all_phases(&outcome.phases), domain);
    assert_eq!(schedule.leaf_instances(), domain);
    assert!(!outcome.has_problems());
}

#[test]
fn test_heat_1d_overlap_scenario() {
    let scop = kernels::heat_1d(10, 20);
    let config = TilingConfig::new()
        .strategy(Strategy::Overlapped { multi_dim: 1 })
        .tile_sizes(vec![4, 4]);
    let (schedule, outcome) = polytile::tile(&scop, &config).expect("overlapped tiling failed");

    assert_eq!(outcome.strategy_applied, Strategy::Overlapped { multi_dim: 1 });
    let halo = outcome.halo.as_ref().expect("overlapped tiling reports its halo");
    assert_eq!(halo.coefficients["S"], vec![2]);
    assert!(halo.is_sound());

    // recomputed points stay inside the domain
    let domain = scop.domain().unwrap();
    let expansion = outcome.expansion.as_ref().unwrap();
    assert!(expansion.iter().all(|(_, point)| domain.contains(point)));
    assert_eq!(schedule.leaf_instances(), domain);
}

#[test]
fn test_split_and_overlap_agree_on_domain() {
    let scop = kernels::jacobi_1d(8, 16);
    let domain = scop.domain().unwrap();
    for strategy in [Strategy::Plain, Strategy::Split, Strategy::Overlapped { multi_dim: 1 }] {
        let config = TilingConfig::new().strategy(strategy).tile_sizes(vec![4, 4]);
        let (schedule, outcome) = polytile::tile(&scop, &config).unwrap();
        assert_eq!(outcome.strategy_applied, strategy);
        assert_eq!(schedule.leaf_instances(), domain, "{} lost instances", strategy.name());
    }
}

#[test]
fn test_overlap_fallback_is_plain_tiling() {
    let scop = kernels::heat_1d(10, 20);
    let sizes = vec![4, 64];
    let plain = TilingConfig::new().tile_sizes(sizes.clone());
    let (expected, _) = polytile::tile(&scop, &plain).unwrap();

    let overlapped = plain.clone().strategy(Strategy::Overlapped { multi_dim: 1 });
    let (schedule, outcome) = polytile::tile(&scop, &overlapped).unwrap();
    assert!(outcome.fell_back);
    assert_eq!(schedule, expected);
}

#[test]
fn test_heat_2d_split_phases() {
    let scop = kernels::heat_2d(4, 6);
    let config = TilingConfig::new().strategy(Strategy::Split).tile_sizes(vec![2, 4, 4]);
    let (schedule, outcome) = polytile::tile(&scop, &config).unwrap();
    assert_eq!(outcome.strategy_applied, Strategy::Split);
    let domain = scop.domain().unwrap();
    assert!(pairwise_disjoint(&outcome.phases));
    assert_eq!(all_phases(&outcome.phases), domain);
    assert_eq!(schedule.leaf_count(), domain.len());
}

#[test]
fn test_phase_pieces_cover_every_statement() {
    let scop = kernels::jacobi_1d(8, 16);
    let config = TilingConfig::new().strategy(Strategy::Split).tile_sizes(vec![4, 4]);
    let (_, outcome) = polytile::tile(&scop, &config).unwrap();
    let probe = outcome.probe.unwrap();
    let pieces = phase_pieces(&scop, &probe, &outcome.sizes).unwrap();
    assert_eq!(pieces.pieces.len(), probe.n_phases);
    assert!(pieces.pieces.iter().all(|p| p.len() == scop.statements.len()));
}

#[test]
fn test_config_file_drives_tiling() {
    let config = TilingConfig::from_json(r#"{ "strategy": "split", "tile_sizes": [4, 4] }"#).unwrap();
    let scop = kernels::heat_1d(10, 20);
    let (_, outcome) = polytile::tile(&scop, &config).unwrap();
    assert_eq!(outcome.strategy_applied, Strategy::Split);
}

#[test]
fn test_scop_json_round_trip_tiles_the_same() {
    let scop = kernels::heat_1d(6, 8);
    let loaded = Scop::from_json(&scop.to_json().unwrap()).unwrap();
    assert_eq!(loaded, scop);

    let config = TilingConfig::new().strategy(Strategy::Split).tile_sizes(vec![2, 4]);
    let (a, _) = polytile::tile(&scop, &config).unwrap();
    let (b, _) = polytile::tile(&loaded, &config).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_outcome_serializes() {
    let scop = kernels::heat_1d(6, 8);
    let config = TilingConfig::new().strategy(Strategy::Split).tile_sizes(vec![2, 4]);
    let (schedule, outcome) = polytile::tile(&scop, &config).unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["strategy_applied"], serde_json::json!("split"));
    assert_eq!(json["phases"].as_array().map(|p| p.len()), Some(outcome.phases.len()));
    assert!(serde_json::to_string(&schedule).is_ok());
}

#[test]
fn test_printed_split_tree() {
    let scop = kernels::heat_1d(10, 20);
    let config = TilingConfig::new().strategy(Strategy::Split).tile_sizes(vec![4, 4]);
    let (schedule, outcome) = polytile::tile(&scop, &config).unwrap();
    let output = print_schedule(&schedule, &scop);
    assert!(output.contains("sequence"));
    assert_eq!(output.matches("filter: ").count(), 2);

    let grid = visualize_phases(&outcome.phases, "S");
    assert_eq!(grid.lines().count(), 11);
}

#[test]
fn test_missing_band_is_an_error() {
    let scop = kernels::heat_1d(4, 4);
    let mut schedule = scop.schedule().unwrap();
    let before = schedule.clone();
    let leaf = NodePath::root().child(0);
    let config = TilingConfig::new().strategy(Strategy::Split).tile_sizes(vec![2, 2]);
    let err = tile_band(&mut schedule, &leaf, &scop, &config).unwrap_err();
    assert!(matches!(err, TileError::Transform(_)));
    assert_eq!(schedule, before);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Split phases partition the domain, every dependence source runs
    /// before its sink, and the pass falls back only where the probe rejects
    #[test]
    fn split_phases_partition(
        jacobi in any::<bool>(),
        t_steps in 2i64..8,
        n in 4i64..12,
        time_size in 1i64..5,
        space_size in 2i64..7,
    ) {
        let scop = if jacobi { kernels::jacobi_1d(t_steps, n) } else { kernels::heat_1d(t_steps, n) };
        let config = TilingConfig::new()
            .strategy(Strategy::Split)
            .tile_sizes(vec![time_size, space_size]);
        let (schedule, outcome) = polytile::tile(&scop, &config).unwrap();
        let domain = scop.domain().unwrap();
        let flow = scop.flow().unwrap();

        prop_assert_eq!(schedule.leaf_instances(), domain.clone());
        prop_assert_eq!(schedule.leaf_count(), domain.len());
        let unordered = schedule.first_unordered(&flow);
        prop_assert!(unordered.is_none(), "{:?} runs sink first", unordered);

        let band = scop.band();
        let (sizes, delta) = time_tiling(&config.sizes_for(2), time_dim_size(&domain), config.min_sync);
        let probe = DependenceProbe::new(&scop, &band, &sizes, config.options())
            .and_then(|probe| probe.run(&domain, delta));
        prop_assert_eq!(outcome.strategy_applied == Strategy::Split, probe.is_ok(), "{:?}", probe);
        if outcome.strategy_applied == Strategy::Split {
            prop_assert!(pairwise_disjoint(&outcome.phases));
            prop_assert_eq!(all_phases(&outcome.phases), domain);
        }
    }

    /// Overlapped tiling keeps the domain and covers every intra-tile source
    #[test]
    fn overlap_round_trip(
        t_steps in 2i64..7,
        n in 4i64..12,
        time_size in 1i64..4,
        space_size in 2i64..8,
    ) {
        let scop = kernels::heat_1d(t_steps, n);
        let config = TilingConfig::new()
            .strategy(Strategy::Overlapped { multi_dim: 1 })
            .tile_sizes(vec![time_size, space_size]);
        let (schedule, outcome) = polytile::tile(&scop, &config).unwrap();

        prop_assert_eq!(schedule.leaf_instances(), scop.domain().unwrap());
        prop_assert!(schedule.first_unordered(&scop.flow().unwrap()).is_none());
        if let Some(halo) = outcome.halo {
            prop_assert!(halo.exact);
            prop_assert_eq!(halo.uncovered, 0);
            prop_assert_eq!(outcome.strategy_applied, Strategy::Overlapped { multi_dim: 1 });
        }
    }
}
