//! Split tiling.
//!
//! Within every time tile, the space tiles of a parallelogram-tiled band are
//! cut along the dependence cone into `n_phases` phases. Phase 0 of every
//! space tile only depends on earlier time tiles and its own tile, so all
//! space tiles run phase 0 concurrently; the later phases then pick up the
//! points whose dependences cross into the neighbouring tile.
//!
//! The cut is taken in the band's own coordinates. With `u`, `v` the offsets
//! of members 0 and 1 inside their tiles and `c` the cone of the probe, an
//! instance belongs to phase `k` when `-k*S <= v - c*u < -(k-1)*S`.
//!
//! ```text
//!   u ^      phase 1  /\  phase 1
//!     |   \ phase 0 /  \ phase 0 /
//!     +--------------------------> v
//! ```

use crate::analysis::probe::{time_dim_size, time_tiling, DependenceProbe, ProbeResult};
use crate::analysis::Scop;
use crate::config::{Strategy, TilingConfig};
use crate::polyhedral::{AffineExpr, AffineMap, BasicSet, Constraint, UnionSet};
use crate::schedule::{NodePath, Schedule};
use crate::transform::parallel::annotate_parallel;
use crate::transform::TilingOutcome;
use crate::utils::errors::{TileResult, TransformError, TransformErrorKind};
use log::{debug, info};

/// Phase constraints of one statement, over its iteration variables.
#[derive(Debug, Clone)]
pub struct PhaseBuilder {
    /// Point-loop difference `point_1 - point_0`
    pub expr: AffineExpr,
    /// Offset of member 0 inside its time tile, `point_0`
    pub tail: AffineExpr,
    /// Steepest dependence, member-1 steps per member-0 step
    pub cone: i64,
    /// Space tile size
    pub space_size: i64,
    /// Number of phases
    pub n_phases: usize,
}

impl PhaseBuilder {
    /// Builder for a statement scheduled by `map`, or `None` when the
    /// statement is exempt because both point members coincide.
    pub fn new(map: &AffineMap, probe: &ProbeResult, sizes: &[i64]) -> Result<Option<Self>, TransformError> {
        let (Some(s0), Some(s1)) = (map.member(0), map.member(1)) else {
            return Err(TransformError::malformed(
                "split",
                format!("schedule of {} has fewer than two members", map.tuple_name()),
            ));
        };
        if map.n_in() < 2 {
            return Err(TransformError::unsupported(
                "split",
                format!("statement {} has no space dimension", map.tuple_name()),
            ));
        }
        let (time_size, space_size) = (sizes[0], sizes[1]);
        let tail = s0.modulo(time_size);
        let expr = s1.modulo(space_size) - tail.clone();
        if expr.is_zero() {
            return Ok(None);
        }
        Ok(Some(Self {
            expr,
            tail,
            cone: probe.cone,
            space_size,
            n_phases: probe.n_phases,
        }))
    }

    /// The bound `B` of phase 0: `point_1 - point_0 >= (cone - 1)*point_0`.
    pub fn bound(&self) -> AffineExpr {
        self.tail.scale(self.cone - 1)
    }

    /// Lower bound of phase `k` on the point difference.
    pub fn lower(&self, k: usize) -> AffineExpr {
        let n = self.expr.n_dim();
        let np = self.expr.n_param();
        self.bound() - AffineExpr::constant(k as i64 * self.space_size, n, np)
    }

    /// Constraints of phase `k`: `lower(k) <= expr < lower(k - 1)`, open
    /// below for the last phase and above for phase 0.
    pub fn constraints(&self, k: usize) -> Vec<Constraint> {
        let mut out = Vec::new();
        if k + 1 < self.n_phases {
            out.push(Constraint::le(self.lower(k), self.expr.clone()));
        }
        if k > 0 {
            out.push(Constraint::lt(self.expr.clone(), self.lower(k - 1)));
        }
        out
    }
}

/// Symbolic phases: `pieces[k]` holds one set per statement.
#[derive(Debug, Clone, Default)]
pub struct PhasePieces {
    /// Per phase, per statement
    pub pieces: Vec<Vec<BasicSet>>,
}

/// Build the symbolic phase pieces of every statement in `scop`.
pub fn phase_pieces(scop: &Scop, probe: &ProbeResult, sizes: &[i64]) -> Result<PhasePieces, TransformError> {
    let mut pieces = vec![Vec::new(); probe.n_phases];
    for stmt in &scop.statements {
        let builder = PhaseBuilder::new(&stmt.schedule, probe, sizes)?;
        for (k, phase) in pieces.iter_mut().enumerate() {
            let mut set = stmt.domain.clone();
            if let Some(builder) = &builder {
                for c in builder.constraints(k) {
                    set.add_constraint(c);
                }
            }
            phase.push(set);
        }
    }
    Ok(PhasePieces { pieces })
}

/// Materialize the phases and make them disjoint and exhaustive over `reaching`.
///
/// Phase `k` loses every instance an earlier phase already holds and the
/// last phase receives whatever is left.
pub fn materialize_phases(pieces: &PhasePieces, params: &[i64], reaching: &UnionSet) -> TileResult<Vec<UnionSet>> {
    let mut claimed = UnionSet::new();
    let mut phases = Vec::with_capacity(pieces.pieces.len());
    let last = pieces.pieces.len().saturating_sub(1);
    for (k, sets) in pieces.pieces.iter().enumerate() {
        let mut raw = UnionSet::new();
        for set in sets {
            raw.extend(set.to_union_set(params)?.iter().cloned());
        }
        let raw = raw.intersect(reaching);
        let overlap = raw.intersect(&claimed).len();
        if overlap > 0 {
            debug!("phase {} overlaps earlier phases in {} instances", k, overlap);
        }
        let phase = if k == last {
            let rest = reaching.subtract(&claimed);
            let extra = rest.subtract(&raw).len();
            if extra > 0 {
                debug!("last phase absorbs {} unclaimed instances", extra);
            }
            rest
        } else {
            raw.subtract(&claimed)
        };
        claimed = claimed.union(&phase);
        debug!("phase {}: {} instances in {} pieces", k, phase.len(), phase.coalesce().len());
        phases.push(phase);
    }
    Ok(phases)
}

/// Split-tile the band at `path`.
///
/// The tree below `path` becomes: time-tile band, sequence of phase
/// filters, space-tile band (and any remaining tile members), point band.
pub fn split_tile(schedule: &mut Schedule, path: &NodePath, scop: &Scop, config: &TilingConfig) -> TileResult<TilingOutcome> {
    let band = schedule
        .band(path)
        .ok_or_else(|| TransformError::malformed("split", format!("no band at {}", path)))?
        .clone();
    let n = band.n_member();
    if n < 2 {
        return Err(TransformError::malformed("split", "split tiling needs at least two band members").into());
    }
    let reaching = schedule
        .instances_at(path)
        .ok_or_else(|| TransformError::malformed("split", format!("no node at {}", path)))?;
    let options = config.options();
    let requested = config.sizes_for(n);
    let (sizes, delta) = time_tiling(&requested, time_dim_size(&reaching), config.min_sync);
    if sizes.len() < n || sizes.iter().take(n).any(|&s| s <= 0) {
        return Err(TransformError::new(
            TransformErrorKind::InvalidTileSize,
            "split",
            format!("tile sizes {:?} for a band of {} members", sizes, n),
        )
        .into());
    }

    let probe = DependenceProbe::new(scop, &band, &sizes, options)?.run(&reaching, delta)?;
    let pieces = phase_pieces(scop, &probe, &sizes)?;
    let phases = materialize_phases(&pieces, &schedule.params, &reaching)?;

    let mut work = schedule.clone();
    work.tile(path, &sizes, options)?;
    if n > 2 {
        work.split(path, 2)?;
    }
    work.split(path, 1)?;
    let seq = work.insert_sequence(&path.child(0), phases.clone())?;

    let flow = scop.flow()?.intersect_domain(&reaching).intersect_range(&reaching);
    if let Some((src, dst)) = work.first_unordered(&flow) {
        return Err(TransformError::unsupported(
            "split",
            format!("phase order runs {} no later than its source {}", dst, src),
        )
        .into());
    }
    let mut phase_parallel = Vec::with_capacity(phases.len());
    for k in 0..phases.len() {
        let space = seq.child(k).child(0);
        let flags = annotate_parallel(&mut work, &space, &flow)?;
        phase_parallel.push(flags.first().copied().unwrap_or(false));
    }

    *schedule = work;
    info!(
        "split tiling at {}: {} phases, sizes {:?}, parallel {:?}",
        path,
        phases.len(),
        sizes,
        phase_parallel
    );
    let mut outcome = TilingOutcome::new(path.clone(), Strategy::Split, sizes);
    outcome.probe = Some(probe);
    outcome.phases = phases;
    outcome.phase_parallel = phase_parallel;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels;
    use crate::polyhedral::Instance;
    use crate::schedule::ScheduleNode;

    fn heat_split(t_steps: i64, n: i64, sizes: Vec<i64>) -> (Scop, Schedule, TilingOutcome) {
        let scop = kernels::heat_1d(t_steps, n);
        let mut schedule = scop.schedule().unwrap();
        let config = TilingConfig::new().strategy(Strategy::Split).tile_sizes(sizes);
        let outcome = split_tile(&mut schedule, &NodePath::root(), &scop, &config).unwrap();
        (scop, schedule, outcome)
    }

    fn phase_of(phases: &[UnionSet], inst: &Instance) -> usize {
        phases.iter().position(|p| p.contains(inst)).unwrap()
    }

    #[test]
    fn test_heat_phases_partition_domain() {
        let (scop, schedule, outcome) = heat_split(10, 20, vec![4, 4]);
        let domain = scop.domain().unwrap();
        assert_eq!(outcome.phases.len(), 2);
        assert!(outcome.phases[0].is_disjoint(&outcome.phases[1]));
        assert_eq!(outcome.phases[0].union(&outcome.phases[1]), domain);
        assert_eq!(schedule.leaf_instances(), domain);
        assert_eq!(schedule.leaf_count(), domain.len());
    }

    #[test]
    fn test_phase_zero_is_the_lower_cone() {
        let (_, _, outcome) = heat_split(10, 20, vec![4, 4]);
        // phase 0 holds the points with (t + i) mod 4 >= 2 * (t mod 4)
        for inst in outcome.phases[0].iter() {
            let (t, i) = (inst.coords[0], inst.coords[1]);
            assert!((t + i).rem_euclid(4) >= 2 * t.rem_euclid(4), "{}", inst);
        }
        for inst in outcome.phases[1].iter() {
            let (t, i) = (inst.coords[0], inst.coords[1]);
            assert!((t + i).rem_euclid(4) < 2 * t.rem_euclid(4), "{}", inst);
        }
    }

    #[test]
    fn test_phases_respect_dependences() {
        let (scop, _, outcome) = heat_split(10, 20, vec![4, 4]);
        let tile = |inst: &Instance| (inst.coords[0].div_euclid(4), (inst.coords[0] + inst.coords[1]).div_euclid(4));
        for (p, q) in scop.flow().unwrap().iter() {
            let (tp, sp) = tile(p);
            let (tq, sq) = tile(q);
            if tp != tq {
                continue;
            }
            let (kp, kq) = (phase_of(&outcome.phases, p), phase_of(&outcome.phases, q));
            assert!(kp <= kq, "{} (phase {}) -> {} (phase {})", p, kp, q, kq);
            if sp != sq {
                assert!(kq > 0, "{} crosses into phase 0 of another tile", q);
            }
        }
    }

    #[test]
    fn test_tree_shape() {
        let (_, schedule, outcome) = heat_split(10, 20, vec![4, 4]);
        let root = NodePath::root();
        assert_eq!(schedule.band(&root).unwrap().n_member(), 1);
        let seq = root.child(0);
        assert!(matches!(schedule.node(&seq), Some(ScheduleNode::Sequence(c)) if c.len() == 2));
        for k in 0..2 {
            let space = seq.child(k).child(0);
            assert_eq!(schedule.band(&space).unwrap().n_member(), 1);
            assert_eq!(schedule.first_band_below(&space), Some(space.child(0)));
        }
        assert_eq!(outcome.phase_parallel, vec![true, false]);
        assert_eq!(schedule.band(&seq.child(0).child(0)).unwrap().coincident, vec![true]);
    }

    #[test]
    fn test_three_member_band_keeps_suffix() {
        let scop = kernels::heat_2d(4, 6);
        let mut schedule = scop.schedule().unwrap();
        let config = TilingConfig::new().tile_sizes(vec![2, 4, 4]);
        let outcome = split_tile(&mut schedule, &NodePath::root(), &scop, &config).unwrap();
        let space = NodePath::root().child(0).child(0).child(0);
        assert_eq!(schedule.band(&space).unwrap().n_member(), 1);
        let suffix = space.child(0);
        assert_eq!(schedule.band(&suffix).unwrap().n_member(), 1);
        assert_eq!(schedule.band(&suffix.child(0)).unwrap().n_member(), 3);
        let domain = scop.domain().unwrap();
        let all = outcome.phases.iter().fold(UnionSet::new(), |acc, p| acc.union(p));
        assert_eq!(all, domain);
        assert_eq!(schedule.leaf_count(), domain.len());
    }

    fn split_of(scop: &Scop, sizes: Vec<i64>) -> (Schedule, TilingOutcome) {
        let mut schedule = scop.schedule().unwrap();
        let config = TilingConfig::new().tile_sizes(sizes);
        let outcome = split_tile(&mut schedule, &NodePath::root(), scop, &config).unwrap();
        (schedule, outcome)
    }

    /// Every flow pair runs source first and, with more than one phase, no
    /// pair enters phase 0 of a time tile from a different space tile.
    fn assert_ordered(scop: &Scop, schedule: &Schedule, outcome: &TilingOutcome) {
        let flow = scop.flow().unwrap();
        assert_eq!(schedule.first_unordered(&flow), None);
        let params = scop.param_values();
        let band = scop.band();
        let (time_size, space_size) = (outcome.sizes[0], outcome.sizes[1]);
        for (p, q) in flow.iter() {
            let (a, b) = (band.values(p, &params).unwrap(), band.values(q, &params).unwrap());
            if a[0].div_euclid(time_size) != b[0].div_euclid(time_size) {
                continue;
            }
            let (kp, kq) = (phase_of(&outcome.phases, p), phase_of(&outcome.phases, q));
            assert!(kp <= kq, "{} (phase {}) -> {} (phase {})", p, kp, q, kq);
            if outcome.phases.len() > 1 && a[1].div_euclid(space_size) != b[1].div_euclid(space_size) {
                assert!(kq > 0, "{} crosses into phase 0 of another tile", q);
            }
        }
    }

    #[test]
    fn test_jacobi_partition() {
        let scop = kernels::jacobi_1d(8, 16);
        let (schedule, outcome) = split_of(&scop, vec![4, 4]);
        let domain = scop.domain().unwrap();
        for (a, pa) in outcome.phases.iter().enumerate() {
            for pb in &outcome.phases[a + 1..] {
                assert!(pa.is_disjoint(pb));
            }
        }
        assert_eq!(schedule.leaf_instances(), domain);
        assert_eq!(schedule.leaf_count(), domain.len());
    }

    #[test]
    fn test_jacobi_runs_sources_first() {
        let scop = kernels::jacobi_1d(8, 16);
        for sizes in [vec![4, 4], vec![2, 4], vec![6, 5], vec![3, 8]] {
            let (schedule, outcome) = split_of(&scop, sizes);
            assert_eq!(outcome.probe.as_ref().unwrap().cone, 2);
            assert_ordered(&scop, &schedule, &outcome);
        }
        let (_, outcome) = split_of(&scop, vec![4, 4]);
        assert_eq!(outcome.phases.len(), 3);
        assert!(outcome.phase_parallel[0]);
    }

    #[test]
    fn test_shifted_copy_phases() {
        let scop = kernels::jacobi_1d_shifted(8, 16);
        let (schedule, outcome) = split_of(&scop, vec![4, 4]);
        let probe = outcome.probe.as_ref().unwrap();
        assert_eq!(probe.space_shift, -2);
        assert_eq!(probe.cone, 2);
        assert_eq!(probe.n_phases, 2);

        let domain = scop.domain().unwrap();
        assert!(outcome.phases[0].is_disjoint(&outcome.phases[1]));
        assert_eq!(outcome.phases[0].union(&outcome.phases[1]), domain);
        assert_eq!(schedule.leaf_count(), domain.len());
        assert_ordered(&scop, &schedule, &outcome);
        // both statements appear in both phases
        for phase in &outcome.phases {
            assert_eq!(phase.tuples(), vec!["S0".to_string(), "S1".to_string()]);
        }
    }

    #[test]
    fn test_exempt_statement() {
        let probe = ProbeResult {
            statement: "S".into(),
            source_tile: vec![0, 0],
            source_point: vec![0, 0],
            time_dim_size: Some(4),
            delta: 3,
            factor: 1.into(),
            sink_point: vec![3, 3],
            sink_tile: vec![0, 4],
            n_phases: 2,
            slope: 1.into(),
            space_shift: 0,
            cone: 2,
        };
        let flat = AffineMap::from_rows(2, &[&[1, 0, 0], &[1, 0, 0]]);
        assert!(PhaseBuilder::new(&flat, &probe, &[4, 4]).unwrap().is_none());
        let skew = AffineMap::from_rows(2, &[&[1, 0, 0], &[1, 1, 0]]);
        let builder = PhaseBuilder::new(&skew, &probe, &[4, 4]).unwrap().unwrap();
        assert_eq!(builder.constraints(0).len(), 1);
        assert_eq!(builder.constraints(1).len(), 1);
        // t = 1, t + i = 2 sits on the cut, t + i = 1 just below it
        assert!(builder.constraints(0)[0].holds_at(&[1, 1], &[]));
        assert!(!builder.constraints(0)[0].holds_at(&[1, 0], &[]));
        assert!(builder.constraints(1)[0].holds_at(&[1, 0], &[]));
    }

    #[test]
    fn test_min_sync_single_time_tile() {
        let scop = kernels::heat_1d(6, 12);
        let mut schedule = scop.schedule().unwrap();
        let config = TilingConfig::new().tile_sizes(vec![2, 4]).min_sync(true);
        let outcome = split_tile(&mut schedule, &NodePath::root(), &scop, &config).unwrap();
        assert_eq!(outcome.sizes[0], 6);
        assert_eq!(outcome.probe.as_ref().unwrap().delta, 5);
        let domain = scop.domain().unwrap();
        assert_eq!(schedule.leaf_instances(), domain);
        assert_eq!(schedule.leaf_count(), domain.len());
    }
}
