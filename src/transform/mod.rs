//! Tiling strategies and their dispatch.

pub mod parallel;
pub mod split;
pub mod overlap;

pub use overlap::{overlap_tile, HaloReport};
pub use parallel::{annotate_parallel, is_member_parallel};
pub use split::split_tile;

use crate::analysis::{ProbeResult, Scop};
use crate::config::{Strategy, TilingConfig};
use crate::polyhedral::{UnionMap, UnionSet};
use crate::schedule::{Band, NodePath, Schedule};
use crate::utils::errors::{
    Diagnostic, ScopErrorKind, TileError, TileResult, TransformError, TransformErrorKind,
};
use log::{info, warn};
use serde::Serialize;

/// What a tiling pass did.
#[derive(Debug, Clone, Serialize)]
pub struct TilingOutcome {
    /// The tiled node; the tile band stays here
    pub path: NodePath,
    /// The strategy whose tree was committed
    pub strategy_applied: Strategy,
    /// A plain tiling replaced the requested strategy
    pub fell_back: bool,
    /// Warnings and notes collected on the way
    pub diagnostics: Vec<Diagnostic>,
    /// Tile sizes used, time first
    pub sizes: Vec<i64>,
    /// Probe of split tiling
    pub probe: Option<ProbeResult>,
    /// Phase filters of split tiling
    pub phases: Vec<UnionSet>,
    /// Per phase, whether the space-tile band is parallel
    pub phase_parallel: Vec<bool>,
    /// Expansion of overlapped tiling
    pub expansion: Option<UnionMap>,
    /// Halo check of overlapped tiling
    pub halo: Option<HaloReport>,
}

impl TilingOutcome {
    /// An outcome with nothing but the basics filled in.
    pub fn new(path: NodePath, strategy_applied: Strategy, sizes: Vec<i64>) -> Self {
        Self {
            path,
            strategy_applied,
            fell_back: false,
            diagnostics: Vec::new(),
            sizes,
            probe: None,
            phases: Vec::new(),
            phase_parallel: Vec::new(),
            expansion: None,
            halo: None,
        }
    }

    /// Any warning or error among the diagnostics.
    pub fn has_problems(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_problem)
    }
}

/// A way of tiling one band.
pub trait TilingStrategy {
    /// Strategy name.
    fn name(&self) -> &str;

    /// Whether the band has the shape the strategy needs.
    fn is_applicable(&self, band: &Band) -> bool;

    /// Tile the band at `path`. On error `schedule` is left untouched.
    fn apply(
        &self,
        schedule: &mut Schedule,
        path: &NodePath,
        scop: &Scop,
        config: &TilingConfig,
    ) -> TileResult<TilingOutcome>;
}

/// Parallelogram tiling with the caller's options.
pub struct PlainTiling;

impl TilingStrategy for PlainTiling {
    fn name(&self) -> &str {
        "plain"
    }

    fn is_applicable(&self, band: &Band) -> bool {
        band.n_member() > 0
    }

    fn apply(
        &self,
        schedule: &mut Schedule,
        path: &NodePath,
        _scop: &Scop,
        config: &TilingConfig,
    ) -> TileResult<TilingOutcome> {
        let n = schedule.band(path).map(Band::n_member).unwrap_or(0);
        let sizes = config.sizes_for(n);
        schedule.tile(path, &sizes, config.options())?;
        Ok(TilingOutcome::new(path.clone(), Strategy::Plain, sizes))
    }
}

/// Split tiling, see [`split`].
pub struct SplitTiling;

impl TilingStrategy for SplitTiling {
    fn name(&self) -> &str {
        "split"
    }

    fn is_applicable(&self, band: &Band) -> bool {
        band.n_member() >= 2
    }

    fn apply(
        &self,
        schedule: &mut Schedule,
        path: &NodePath,
        scop: &Scop,
        config: &TilingConfig,
    ) -> TileResult<TilingOutcome> {
        split_tile(schedule, path, scop, config)
    }
}

/// Overlapped tiling, see [`overlap`].
pub struct OverlappedTiling {
    /// Number of leading space members overlapped
    pub multi_dim: usize,
}

impl TilingStrategy for OverlappedTiling {
    fn name(&self) -> &str {
        "overlapped"
    }

    fn is_applicable(&self, band: &Band) -> bool {
        self.multi_dim >= 1 && band.n_member() > self.multi_dim
    }

    fn apply(
        &self,
        schedule: &mut Schedule,
        path: &NodePath,
        scop: &Scop,
        config: &TilingConfig,
    ) -> TileResult<TilingOutcome> {
        overlap_tile(schedule, path, scop, config, self.multi_dim)
    }
}

/// The strategy object for `strategy`.
pub fn strategy_for(strategy: Strategy) -> Box<dyn TilingStrategy> {
    match strategy {
        Strategy::Plain => Box::new(PlainTiling),
        Strategy::Split => Box::new(SplitTiling),
        Strategy::Overlapped { multi_dim } => Box::new(OverlappedTiling { multi_dim }),
    }
}

/// Errors that stop the dispatcher instead of degrading to plain tiling.
fn is_fatal(err: &TileError) -> bool {
    match err {
        TileError::Transform(e) => matches!(
            e.kind,
            TransformErrorKind::MalformedInput | TransformErrorKind::InvalidTileSize
        ),
        TileError::Set(_) | TileError::Internal(_) => false,
        TileError::Scop(_) | TileError::Config(_) | TileError::Json(_) | TileError::Io(_) => true,
    }
}

/// Tile the band at `path` with the strategy `config` asks for.
///
/// A single-member band is tiled plainly. When the split or overlapped
/// strategy cannot handle the band, plain tiling is applied instead and the
/// reason is reported as an error [`Diagnostic`]. Malformed input, bad tile
/// sizes and invalid SCoPs are returned as `Err` with `schedule` untouched.
pub fn tile_band(
    schedule: &mut Schedule,
    path: &NodePath,
    scop: &Scop,
    config: &TilingConfig,
) -> TileResult<TilingOutcome> {
    config.validate()?;
    scop.validate().map_err(|e| match e.kind {
        ScopErrorKind::NonContiguousParams => TileError::from(TransformError::unsupported("scop", e.message)),
        _ => TileError::from(e),
    })?;
    let band = schedule
        .band(path)
        .ok_or_else(|| {
            let found = schedule.node(path).map(|n| n.kind()).unwrap_or("nothing");
            TransformError::malformed("tile_band", format!("expected a band at {}, found {}", path, found))
        })?
        .clone();

    let strategy = strategy_for(config.strategy);
    if config.strategy != Strategy::Plain && !strategy.is_applicable(&band) {
        info!(
            "{} tiling needs more than {} members at {}, tiling plainly",
            strategy.name(),
            band.n_member(),
            path
        );
        let mut outcome = PlainTiling.apply(schedule, path, scop, config)?;
        outcome.fell_back = true;
        outcome.diagnostics.push(Diagnostic::note(format!(
            "band at {} has {} member(s); {} tiling does not apply",
            path,
            band.n_member(),
            strategy.name()
        )));
        return Ok(outcome);
    }

    info!("{} tiling at {} with sizes {:?}", strategy.name(), path, config.sizes_for(band.n_member()));
    match strategy.apply(schedule, path, scop, config) {
        Ok(outcome) => Ok(outcome),
        Err(err) if config.strategy == Strategy::Plain || is_fatal(&err) => Err(err),
        Err(err) => {
            warn!("{} tiling failed at {}: {}; tiling plainly", strategy.name(), path, err);
            let mut outcome = PlainTiling.apply(schedule, path, scop, config)?;
            outcome.fell_back = true;
            outcome.diagnostics.push(
                Diagnostic::error(format!("{} tiling failed: {}", strategy.name(), err))
                    .with_note("the band was tiled without phases or halos"),
            );
            Ok(outcome)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels;
    use crate::polyhedral::{AffineExpr, AffineMap, BasicSet, Constraint, Space};
    use crate::schedule::{ScheduleNode, TileOptions};
    use crate::utils::errors::DiagnosticSeverity;

    fn plain_of(scop: &Scop, sizes: &[i64]) -> Schedule {
        let mut schedule = scop.schedule().unwrap();
        schedule.tile(&NodePath::root(), sizes, TileOptions::default()).unwrap();
        schedule
    }

    #[test]
    fn test_dispatch_split() {
        let scop = kernels::heat_1d(10, 20);
        let mut schedule = scop.schedule().unwrap();
        let config = TilingConfig::new().strategy(Strategy::Split).tile_sizes(vec![4, 4]);
        let outcome = tile_band(&mut schedule, &NodePath::root(), &scop, &config).unwrap();
        assert_eq!(outcome.strategy_applied, Strategy::Split);
        assert!(!outcome.fell_back);
        assert_eq!(outcome.phases.len(), 2);
        assert_eq!(outcome.probe.as_ref().unwrap().n_phases, 2);
    }

    #[test]
    fn test_dispatch_plain_matches_surgeon() {
        let scop = kernels::heat_1d(6, 8);
        let mut schedule = scop.schedule().unwrap();
        let config = TilingConfig::new().tile_sizes(vec![2, 4]);
        let outcome = tile_band(&mut schedule, &NodePath::root(), &scop, &config).unwrap();
        assert_eq!(outcome.strategy_applied, Strategy::Plain);
        assert_eq!(schedule, plain_of(&scop, &[2, 4]));
    }

    #[test]
    fn test_single_member_band_is_tiled_plainly() {
        let mut scop = Scop::new("copy").with_param("N", 6);
        let mut domain = BasicSet::universe(Space::named_set("S", 1));
        domain.add_constraint(Constraint::var_ge(0, 0, 1, 0));
        domain.add_constraint(Constraint::var_le(0, 5, 1, 0));
        scop.add_statement("S", domain, AffineMap::from_rows(1, &[&[1, 0]]));
        let mut schedule = scop.schedule().unwrap();
        let config = TilingConfig::new().strategy(Strategy::Split).tile_sizes(vec![4]);
        let outcome = tile_band(&mut schedule, &NodePath::root(), &scop, &config).unwrap();
        assert!(outcome.fell_back);
        assert_eq!(outcome.strategy_applied, Strategy::Plain);
        assert_eq!(outcome.diagnostics[0].severity, DiagnosticSeverity::Note);
        assert_eq!(schedule.leaf_instances(), scop.domain().unwrap());
    }

    #[test]
    fn test_unsupported_pattern_degrades() {
        // a same-time dependence gives the probe no time step
        let mut scop = kernels::heat_1d(6, 8);
        scop.flow.clear();
        let domain = scop.statements[0].domain.clone();
        let mut dep = domain.lift_to_domain(&domain.space);
        for c in domain.lift_to_range(&domain.space).constraints.constraints {
            dep.add_constraint(c);
        }
        let (n, np) = (dep.n_vars(), dep.n_param());
        dep.add_constraint(Constraint::eq(AffineExpr::var(2, n, np), AffineExpr::var(0, n, np)));
        dep.add_constraint(Constraint::eq(
            AffineExpr::var(3, n, np),
            AffineExpr::var(1, n, np) + AffineExpr::constant(1, n, np),
        ));
        scop.add_flow(dep);

        let mut schedule = scop.schedule().unwrap();
        let config = TilingConfig::new().strategy(Strategy::Split).tile_sizes(vec![2, 4]);
        let outcome = tile_band(&mut schedule, &NodePath::root(), &scop, &config).unwrap();
        assert!(outcome.fell_back);
        assert_eq!(outcome.diagnostics[0].severity, DiagnosticSeverity::Error);
        assert_eq!(schedule, plain_of(&scop, &[2, 4]));
    }

    #[test]
    fn test_malformed_input_is_an_error() {
        let scop = kernels::heat_1d(4, 4);
        let mut schedule = scop.schedule().unwrap();
        let before = schedule.clone();
        let leaf = NodePath::root().child(0);
        let config = TilingConfig::new().strategy(Strategy::Split);
        let err = tile_band(&mut schedule, &leaf, &scop, &config).unwrap_err();
        assert!(matches!(err, TileError::Transform(ref e) if e.kind == TransformErrorKind::MalformedInput));
        assert_eq!(schedule, before);
        assert!(matches!(schedule.node(&leaf), Some(ScheduleNode::Leaf)));
    }

    #[test]
    fn test_invalid_sizes_are_an_error() {
        let scop = kernels::heat_1d(4, 4);
        let mut schedule = scop.schedule().unwrap();
        let config = TilingConfig::new().strategy(Strategy::Split).tile_sizes(vec![4]);
        let err = tile_band(&mut schedule, &NodePath::root(), &scop, &config).unwrap_err();
        assert!(matches!(err, TileError::Transform(ref e) if e.kind == TransformErrorKind::InvalidTileSize));
        let config = TilingConfig::new().tile_sizes(vec![4, -1]);
        assert!(matches!(
            tile_band(&mut schedule, &NodePath::root(), &scop, &config),
            Err(TileError::Config(_))
        ));
    }

    #[test]
    fn test_non_contiguous_params_are_unsupported() {
        let mut scop = kernels::heat_1d(4, 4);
        let mut schedule = scop.schedule().unwrap();
        scop.statements[0].domain.space.param_names = vec!["N".into()];
        let err = tile_band(&mut schedule, &NodePath::root(), &scop, &TilingConfig::new()).unwrap_err();
        assert!(matches!(err, TileError::Transform(ref e) if e.kind == TransformErrorKind::UnsupportedPattern));
    }

    #[test]
    fn test_strategy_objects() {
        let band = kernels::heat_1d(2, 2).band();
        assert!(strategy_for(Strategy::Split).is_applicable(&band));
        assert!(!strategy_for(Strategy::Overlapped { multi_dim: 2 }).is_applicable(&band));
        assert_eq!(strategy_for(Strategy::Overlapped { multi_dim: 1 }).name(), "overlapped");
    }
}
