//! Overlapped tiling.
//!
//! Each space tile of the first `multi_dim` space members recomputes a halo
//! of points owned by its neighbours, so tiles inside one time tile need no
//! synchronization. The halo shrinks by the dependence cone width with every
//! time step until it vanishes at the top of the time tile. The tree gets an
//! expansion node above the point band that maps the anchor of every tile
//! (its lexmin instance) to the points the tile executes.
//!
//! The expansion is checked against the transitive closure of the flow
//! inside each time tile. If some tile misses a source it reads, the band is
//! tiled without overlap instead.

use crate::analysis::dependence::halo_coefficient;
use crate::analysis::Scop;
use crate::config::{Strategy, TilingConfig};
use crate::polyhedral::{AffineExpr, AffineMap, BasicSet, Constraint, Instance, UnionMap, UnionSet};
use crate::schedule::{Band, NodePath, Schedule};
use crate::transform::TilingOutcome;
use crate::utils::errors::{Diagnostic, TileResult, TransformError, TransformErrorKind};
use log::{debug, info, warn};
use num_integer::Integer;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Result of checking that every tile recomputes what it reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HaloReport {
    /// Halo growth per time step, per statement and overlapped member
    pub coefficients: BTreeMap<String, Vec<i64>>,
    /// Whether the transitive closure converged within the round limit
    pub exact: bool,
    /// Number of (time tile, space tile) groups checked
    pub checked_tiles: usize,
    /// Transitive sources missing from their tile's expansion
    pub uncovered: usize,
}

impl HaloReport {
    /// Exact closure and nothing uncovered.
    pub fn is_sound(&self) -> bool {
        self.exact && self.uncovered == 0
    }
}

/// Tile grid of the band being overlapped.
#[derive(Debug, Clone, Copy)]
pub struct TileGrid<'a> {
    /// Band being tiled
    pub band: &'a Band,
    /// Parameter values the band is evaluated under
    pub params: &'a [i64],
    /// Tile size per band member
    pub sizes: &'a [i64],
    /// Number of overlapped space members after the time member
    pub multi_dim: usize,
}

impl TileGrid<'_> {
    /// Tile starts of `inst`, `None` if the band does not schedule it.
    fn starts(&self, inst: &Instance) -> Option<Vec<i64>> {
        self.band.values(inst, self.params).map(|v| tile_starts(&v, self.sizes))
    }

    /// Tiles whose halo holds a point with schedule `values`.
    ///
    /// Along each overlapped member `j` the point belongs to its own tile and
    /// to the following tiles whose start lies within `coeff_j*(T - 1 - dt)`
    /// steps of it.
    fn covering_tiles(&self, values: &[i64], coeffs: &[i64]) -> Vec<Vec<i64>> {
        let own = tile_starts(values, self.sizes);
        let remaining = own[0] + self.sizes[0] - 1 - values[0];
        let mut tiles = vec![own.clone()];
        for j in 1..=self.multi_dim {
            let reach = coeffs.get(j - 1).copied().unwrap_or(0) * remaining;
            let size = self.sizes[j];
            let starts: Vec<i64> = (0..)
                .map(|m| own[j] + m * size)
                .take_while(|&start| start - reach <= values[j])
                .collect();
            tiles = tiles
                .iter()
                .flat_map(|tile| {
                    starts.iter().map(move |&start| {
                        let mut next = tile.clone();
                        next[j] = start;
                        next
                    })
                })
                .collect();
        }
        tiles
    }
}

/// First overlapped member whose tile size spans the whole schedule extent.
///
/// Returns `(statement, member, extent)`.
fn fitting_member(grid: &TileGrid, reaching: &UnionSet) -> Option<(String, usize, i64)> {
    let mut ranges: BTreeMap<(&str, usize), (i64, i64)> = BTreeMap::new();
    for inst in reaching {
        let Some(values) = grid.band.values(inst, grid.params) else { continue };
        for j in 1..=grid.multi_dim {
            let Some(&v) = values.get(j) else { continue };
            let range = ranges.entry((inst.tuple.as_str(), j)).or_insert((v, v));
            range.0 = range.0.min(v);
            range.1 = range.1.max(v);
        }
    }
    ranges.into_iter().find_map(|((stmt, j), (lo, hi))| {
        let extent = hi - lo + 1;
        (grid.sizes[j] >= extent).then(|| (stmt.to_string(), j, extent))
    })
}

/// First schedule value of every tile member, `S*floor(s/S)`.
fn tile_starts(values: &[i64], sizes: &[i64]) -> Vec<i64> {
    values
        .iter()
        .zip(sizes)
        .map(|(&v, &size)| size * Integer::div_floor(&v, &size))
        .collect()
}

/// Points of one statement executed by the tile starting at `starts`.
///
/// The tile keeps its nominal extent on the time member and on members past
/// `coeffs.len()`. Along each overlapped member `j` it reaches back
/// `coeff_j*(T - 1 - dt)` schedule steps, `dt` being the time offset of the
/// point inside the time tile.
pub fn halo_set(domain: &BasicSet, map: &AffineMap, starts: &[i64], sizes: &[i64], coeffs: &[i64]) -> TileResult<BasicSet> {
    let n = domain.dim();
    let np = domain.n_param().max(map.n_param());
    let konst = |v: i64| AffineExpr::constant(v, n, np);
    let member = |k: usize| {
        map.member(k).cloned().ok_or_else(|| {
            TransformError::malformed("overlap", format!("schedule of {} has no member {}", map.tuple_name(), k))
        })
    };

    let mut set = domain.clone();
    let time = member(0)?;
    let time_size = sizes[0];
    set.add_constraint(Constraint::ge(time.clone(), konst(starts[0])));
    set.add_constraint(Constraint::le(time.clone(), konst(starts[0] + time_size - 1)));
    let remaining = konst(starts[0] + time_size - 1) - time;
    for k in 1..starts.len() {
        let s = member(k)?;
        let end = starts[k] + sizes[k] - 1;
        set.add_constraint(Constraint::le(s.clone(), konst(end)));
        match coeffs.get(k - 1) {
            Some(&coeff) => set.add_constraint(Constraint::ge(s, konst(starts[k]) - remaining.scale(coeff))),
            None => set.add_constraint(Constraint::ge(s, konst(starts[k]))),
        }
    }
    Ok(set)
}

/// Expansion of every tile with a non-empty halo: an anchor maps to the
/// points of [`halo_set`] of each statement.
///
/// A tile's anchor is its lexmin instance. A tile without instances of its
/// own hangs from the next tile of the same time and overlapped members; it
/// is dropped when no such tile exists, as nothing would read its halo.
pub fn build_expansion(
    grid: &TileGrid,
    scop: &Scop,
    reaching: &UnionSet,
    coefficients: &BTreeMap<String, Vec<i64>>,
) -> TileResult<UnionMap> {
    let mut nominal: BTreeMap<Vec<i64>, &Instance> = BTreeMap::new();
    let mut tiles: BTreeSet<Vec<i64>> = BTreeSet::new();
    for inst in reaching {
        let Some(values) = grid.band.values(inst, grid.params) else { continue };
        nominal.entry(tile_starts(&values, grid.sizes)).or_insert(inst);
        let coeffs = coefficients.get(&inst.tuple).map(Vec::as_slice).unwrap_or(&[]);
        tiles.extend(grid.covering_tiles(&values, coeffs));
    }

    let mut expansion = UnionMap::new();
    let mut dropped = 0;
    for starts in &tiles {
        let column = &starts[..=grid.multi_dim];
        let owner = nominal.range(starts.clone()..).next().filter(|(key, _)| key.starts_with(column));
        let Some((_, anchor)) = owner else {
            dropped += 1;
            continue;
        };
        for (name, map) in &grid.band.schedule {
            let (Some(stmt), Some(coeffs)) = (scop.statement(name), coefficients.get(name)) else {
                continue;
            };
            let points = halo_set(&stmt.domain, map, starts, grid.sizes, coeffs)?.to_union_set(grid.params)?;
            expansion.extend(points.intersect(reaching).iter().map(|p| ((*anchor).clone(), p.clone())));
        }
    }
    debug!(
        "{} tiles ({} anchored, {} without a consumer), {} expansion pairs",
        tiles.len(),
        nominal.len(),
        dropped,
        expansion.len()
    );
    Ok(expansion)
}

/// Check that each tile's expansion holds the transitive sources of its
/// nominal instances inside the same time tile.
///
/// Tiles are grouped by their time and overlapped members. Returns
/// `(exact, groups, uncovered)`.
fn check_halo(
    grid: &TileGrid,
    reaching: &UnionSet,
    flow: &UnionMap,
    expansion: &UnionMap,
    closure_limit: usize,
) -> (bool, usize, usize) {
    let starts = |inst: &Instance| grid.starts(inst).unwrap_or_default();
    let intra = flow.filter(|p, q| starts(p).first() == starts(q).first());
    let closure = intra.transitive_closure(closure_limit);
    let sources = closure.map.reverse();

    let mut groups: BTreeMap<Vec<i64>, UnionSet> = BTreeMap::new();
    for inst in reaching {
        let key: Vec<i64> = starts(inst).into_iter().take(grid.multi_dim + 1).collect();
        groups.entry(key).or_default().insert(inst.clone());
    }

    let anchors = expansion.domain();
    let mut uncovered = 0;
    for (key, nominal) in &groups {
        let covered = nominal.intersect(&anchors).apply(expansion);
        let required = nominal.union(&nominal.apply(&sources));
        let missing = required.subtract(&covered);
        if !missing.is_empty() {
            debug!("tile {:?} misses {} of {} required instances", key, missing.len(), required.len());
            uncovered += missing.len();
        }
    }
    (closure.exact, groups.len(), uncovered)
}

/// Plain-tile the band at `path` in place of an overlapped tiling.
fn tile_without_overlap(
    schedule: &mut Schedule,
    path: &NodePath,
    config: &TilingConfig,
    sizes: Vec<i64>,
    halo: HaloReport,
    diagnostic: Diagnostic,
) -> TileResult<TilingOutcome> {
    schedule.tile(path, &sizes, config.options())?;
    let mut outcome = TilingOutcome::new(path.clone(), Strategy::Plain, sizes);
    outcome.fell_back = true;
    outcome.halo = Some(halo);
    outcome.diagnostics.push(diagnostic);
    Ok(outcome)
}

/// Overlap-tile the band at `path` along its first `multi_dim` space members.
pub fn overlap_tile(
    schedule: &mut Schedule,
    path: &NodePath,
    scop: &Scop,
    config: &TilingConfig,
    multi_dim: usize,
) -> TileResult<TilingOutcome> {
    let band = schedule
        .band(path)
        .ok_or_else(|| TransformError::malformed("overlap", format!("no band at {}", path)))?
        .clone();
    let n = band.n_member();
    if multi_dim == 0 || multi_dim >= n {
        return Err(TransformError::malformed(
            "overlap",
            format!("cannot overlap {} members of a band of {}", multi_dim, n),
        )
        .into());
    }
    let sizes = config.sizes_for(n);
    if sizes.len() < n || sizes.iter().take(n).any(|&s| s <= 0) {
        return Err(TransformError::new(
            TransformErrorKind::InvalidTileSize,
            "overlap",
            format!("tile sizes {:?} for a band of {} members", sizes, n),
        )
        .into());
    }
    let reaching = schedule
        .instances_at(path)
        .ok_or_else(|| TransformError::malformed("overlap", format!("no node at {}", path)))?;
    let params = schedule.params.clone();
    let grid = TileGrid { band: &band, params: &params, sizes: &sizes, multi_dim };

    if let Some((stmt, j, extent)) = fitting_member(&grid, &reaching) {
        info!("tile size {} spans member {} of {}, tiling without overlap", sizes[j], j, stmt);
        schedule.tile(path, &sizes, config.options())?;
        let mut outcome = TilingOutcome::new(path.clone(), Strategy::Plain, sizes.clone());
        outcome.fell_back = true;
        outcome.diagnostics.push(Diagnostic::note(format!(
            "tile size {} covers the whole extent {} of member {} of {}; no halo needed",
            sizes[j], extent, j, stmt
        )));
        return Ok(outcome);
    }

    let flow = scop.flow()?.intersect_domain(&reaching).intersect_range(&reaching);
    let mut coefficients = BTreeMap::new();
    for (name, map) in &band.schedule {
        let stmt = scop
            .statement(name)
            .ok_or_else(|| TransformError::malformed("overlap", format!("no statement {} in the SCoP", name)))?;
        if stmt.domain.dim() <= multi_dim {
            return Err(TransformError::unsupported(
                "overlap",
                format!("statement {} has only {} dimensions", name, stmt.domain.dim()),
            )
            .into());
        }
        for j in 1..=multi_dim {
            let c = map.member(j).map(|m| m.coeff(j)).unwrap_or(0);
            if c != 1 {
                return Err(TransformError::unsupported(
                    "overlap",
                    format!("member {} of {} has coefficient {} on its own dimension", j, name, c),
                )
                .into());
            }
        }
        let coeffs: Vec<i64> = (1..=multi_dim).map(|j| halo_coefficient(&flow, name, j)).collect();
        debug!("halo coefficients of {}: {:?}", name, coeffs);
        coefficients.insert(name.clone(), coeffs);
    }
    let expansion = build_expansion(&grid, scop, &reaching, &coefficients)?;
    let (exact, checked_tiles, uncovered) = check_halo(&grid, &reaching, &flow, &expansion, config.closure_limit);
    let halo = HaloReport { coefficients, exact, checked_tiles, uncovered };

    let mut diagnostics = Vec::new();
    if !exact {
        warn!("transitive closure did not converge in {} rounds", config.closure_limit);
        if config.fallback_on_inexact {
            let diagnostic = Diagnostic::warning("halo check is inexact; tiled without overlap")
                .with_suggestion("raise closure_limit");
            return tile_without_overlap(schedule, path, config, sizes, halo, diagnostic);
        }
        diagnostics.push(
            Diagnostic::warning(format!("transitive closure is inexact after {} rounds", config.closure_limit))
                .with_note("the halo check may miss transitive sources")
                .with_suggestion("raise closure_limit"),
        );
    }
    if uncovered > 0 {
        warn!("{} transitive sources fall outside their tile's halo, tiling without overlap", uncovered);
        let diagnostic = Diagnostic::warning(format!(
            "{} transitive sources are not recomputed by their tile; tiled without overlap",
            uncovered
        ))
        .with_note("the schedule skews the space members more steeply than the dependences")
        .with_suggestion("overlap fewer members or use a flatter schedule");
        let mut outcome = tile_without_overlap(schedule, path, config, sizes, halo, diagnostic)?;
        diagnostics.append(&mut outcome.diagnostics);
        outcome.diagnostics = diagnostics;
        return Ok(outcome);
    }

    let mut work = schedule.clone();
    work.tile(path, &sizes, config.options().with_shift_point_loops(false))?;
    let at = if config.after_mapping {
        work.split(&path.child(0), 1)?;
        path.child(0).child(0)
    } else {
        path.child(0)
    };
    work.insert_expansion(&at, UnionMap::new(), expansion.clone())?;
    *schedule = work;
    info!(
        "overlapped tiling at {}: {} anchors expand to {} instances over {} tiles",
        path,
        expansion.domain().len(),
        expansion.len(),
        checked_tiles
    );

    let mut outcome = TilingOutcome::new(path.clone(), Strategy::Overlapped { multi_dim }, sizes);
    outcome.diagnostics = diagnostics;
    outcome.expansion = Some(expansion);
    outcome.halo = Some(halo);
    Ok(outcome)
}
