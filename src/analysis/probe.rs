//! Dependence probe for split tiling.
//!
//! The probe samples one representative dependence trajectory of a
//! parallelogram-tiled band: it starts at the first point of the first
//! tile, follows the flow dependences for one step to obtain the
//! propagation factor, and extrapolates over the time tile to find how many
//! space tiles a wavefront crosses. That count is the number of phases.

use crate::analysis::dependence::{as_integer, ratio, same_time_shift, schedule_cone};
use crate::analysis::scop::{Scop, Statement};
use crate::polyhedral::{AffineExpr, AffineMap, BasicSet, Constraint, Instance, UnionSet};
use crate::schedule::{Band, TileOptions};
use crate::utils::errors::{TileResult, TransformError};
use log::debug;
use num_integer::Integer;
use num_rational::Rational64;
use serde::Serialize;
use std::collections::BTreeMap;

/// Representative trajectory and derived quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    /// Statement the source point belongs to
    pub statement: String,
    /// Lexicographically smallest tile of the domain
    pub source_tile: Vec<i64>,
    /// First iteration point covered by the source tile, padding included
    pub source_point: Vec<i64>,
    /// Extent of the time coordinate, `None` when it is a single value
    pub time_dim_size: Option<i64>,
    /// Time steps between source and sink
    pub delta: i64,
    /// Space advance per time step along the trajectory
    pub factor: Rational64,
    /// `source_point` advanced by `delta` time steps
    pub sink_point: Vec<i64>,
    /// Tile of `sink_point`
    pub sink_tile: Vec<i64>,
    /// Number of phases
    pub n_phases: usize,
    /// Time advance per space step between source and sink
    pub slope: Rational64,
    /// Most negative same-time space offset, capped at 0
    pub space_shift: i64,
    /// Steepest dependence in the band's own coordinates, `ceil(Δs1/Δs0)`
    pub cone: i64,
}

/// Extent of coordinate 0 over the domain, `None` when it does not vary.
pub fn time_dim_size(domain: &UnionSet) -> Option<i64> {
    let times = domain.iter().filter_map(|i| i.coords.first().copied());
    let (lo, hi) = times.fold((i64::MAX, i64::MIN), |(lo, hi), t| (lo.min(t), hi.max(t)));
    if lo >= hi {
        None
    } else {
        Some(hi - lo + 1)
    }
}

/// Effective tile sizes and the probe distance `delta`.
///
/// With `min_sync` and a finite time extent the whole time dimension becomes
/// a single time tile.
pub fn time_tiling(sizes: &[i64], time_dim_size: Option<i64>, min_sync: bool) -> (Vec<i64>, i64) {
    let mut sizes = sizes.to_vec();
    match (min_sync, time_dim_size, sizes.first_mut()) {
        (true, Some(extent), Some(first)) => {
            *first = extent;
            (sizes, extent - 1)
        }
        (_, _, Some(first)) => {
            let delta = *first - 1;
            (sizes, delta)
        }
        _ => (sizes, 0),
    }
}

/// Probe of one band before it is tiled.
pub struct DependenceProbe<'a> {
    scop: &'a Scop,
    band: &'a Band,
    sizes: &'a [i64],
    options: TileOptions,
    tiled: BTreeMap<String, AffineMap>,
    params: Vec<i64>,
}

impl<'a> DependenceProbe<'a> {
    /// Prepare a probe of `band` tiled with `sizes`.
    pub fn new(scop: &'a Scop, band: &'a Band, sizes: &'a [i64], options: TileOptions) -> TileResult<Self> {
        if band.n_member() < 2 {
            return Err(TransformError::malformed(
                "probe",
                format!("band has {} members, a time and a space member are needed", band.n_member()),
            )
            .into());
        }
        let mut tiled = BTreeMap::new();
        for (stmt, map) in &band.schedule {
            let (tile, _) = map
                .tile(sizes, options.scale_tile_loops, options.shift_point_loops)
                .ok_or_else(|| TransformError::malformed("probe", format!("no tile sizes for {}", stmt)))?;
            tiled.insert(stmt.clone(), tile);
        }
        Ok(Self {
            scop,
            band,
            sizes,
            options,
            tiled,
            params: scop.param_values(),
        })
    }

    /// Tile coordinates of an iteration point of `stmt`.
    pub fn tile_of(&self, stmt: &str, coords: &[i64]) -> Option<Vec<i64>> {
        self.tiled.get(stmt).map(|m| m.apply(coords, &self.params))
    }

    /// Iteration points of `stmt` whose schedule falls in `tile`.
    ///
    /// The result ignores the domain, except that variables the band leaves
    /// unbounded are confined to the domain's bounding box.
    pub fn covered_points(&self, stmt: &Statement, tile: &[i64]) -> BasicSet {
        let mut covered = BasicSet::universe(stmt.domain.space.clone());
        if let Some(map) = self.band.schedule.get(&stmt.name) {
            for (k, s) in map.outputs.iter().enumerate() {
                let (Some(&size), Some(&v)) = (self.sizes.get(k), tile.get(k)) else {
                    continue;
                };
                let lo = if self.options.scale_tile_loops { v } else { v * size };
                let n = s.n_dim();
                let np = s.n_param();
                covered.add_constraint(Constraint::ge(s.clone(), AffineExpr::constant(lo, n, np)));
                covered.add_constraint(Constraint::le(s.clone(), AffineExpr::constant(lo + size - 1, n, np)));
            }
        }
        let own = covered.bounds(&self.params);
        let frame = stmt.domain.bounds(&self.params);
        let n = covered.n_vars();
        let np = covered.n_param();
        for (var, (mine, outer)) in own.iter().zip(&frame).enumerate() {
            if mine.lo.is_none() {
                if let Some(lo) = outer.lo {
                    covered.add_constraint(Constraint::var_ge(var, lo, n, np));
                }
            }
            if mine.hi.is_none() {
                if let Some(hi) = outer.hi {
                    covered.add_constraint(Constraint::var_le(var, hi, n, np));
                }
            }
        }
        covered
    }

    /// Run the probe over the instances `domain` reaching the band.
    pub fn run(&self, domain: &UnionSet, delta: i64) -> TileResult<ProbeResult> {
        let source_tile = domain
            .iter()
            .filter_map(|i| self.tile_of(&i.tuple, &i.coords))
            .min()
            .ok_or_else(|| TransformError::malformed("probe", "no instance reaches the band"))?;

        let mut source = None;
        for name in self.scop.statement_names() {
            let Some(stmt) = self.scop.statement(name) else { continue };
            if !self.band.schedule.contains_key(name) {
                continue;
            }
            if let Some(point) = self.covered_points(stmt, &source_tile).lexmin(&self.params)? {
                source = Some(Instance::new(name, point));
                break;
            }
        }
        let source = source
            .ok_or_else(|| TransformError::malformed("probe", "source tile covers no iteration point"))?;
        if source.dim() < 2 {
            return Err(TransformError::unsupported(
                "probe",
                format!("statement {} has no space dimension", source.tuple),
            )
            .into());
        }

        let image = self.step(&source)?;
        let target = image.iter().max_by(|a, b| a.coords.cmp(&b.coords)).ok_or_else(|| {
            TransformError::unsupported("probe", format!("dependences give no image of {}", source))
        })?;
        let dt = target.coords[0] - source.coords[0];
        let ds = target.coords.get(1).copied().unwrap_or(source.coords[1]) - source.coords[1];
        let factor = ratio(ds, dt)
            .ok_or_else(|| TransformError::unsupported("probe", "dependence does not advance time"))?;
        let step = as_integer(factor)
            .map(|f| f * delta)
            .ok_or_else(|| TransformError::unsupported("probe", format!("non-integral factor {}", factor)))?;

        let mut sink_point = source.coords.clone();
        sink_point[0] += delta;
        sink_point[1] += step;
        let sink_tile = self
            .tile_of(&source.tuple, &sink_point)
            .ok_or_else(|| TransformError::malformed("probe", "sink point has no tile"))?;

        let mut tile_steps = sink_tile[1] - source_tile[1];
        if self.options.scale_tile_loops {
            tile_steps = Integer::div_floor(&tile_steps, &self.sizes[1]);
        }
        if tile_steps < 0 {
            return Err(TransformError::unsupported(
                "probe",
                format!("wavefront moves backwards across {} space tiles", -tile_steps),
            )
            .into());
        }

        let slope = ratio(delta, step)
            .filter(|s| s.is_integer())
            .ok_or_else(|| {
                TransformError::unsupported(
                    "probe",
                    format!("no integral slope for {} time and {} space steps", delta, step),
                )
            })?;

        let flow = self.scop.flow()?.intersect_domain(domain).intersect_range(domain);
        let cone = schedule_cone(&flow, self.band, &self.params).ok_or_else(|| {
            TransformError::unsupported("probe", "a dependence runs against the first two band members")
        })?;
        let space_shift = if self.scop.statements.len() > 1 {
            same_time_shift(&flow)
        } else {
            0
        };

        let result = ProbeResult {
            statement: source.tuple.clone(),
            source_tile,
            source_point: source.coords.clone(),
            time_dim_size: time_dim_size(domain),
            delta,
            factor,
            sink_point,
            sink_tile,
            n_phases: tile_steps as usize + 1,
            slope,
            space_shift,
            cone,
        };
        debug!(
            "probe: source {:?} in tile {:?}, sink {:?} in tile {:?}, factor {}, slope {}, cone {}, {} phases",
            result.source_point,
            result.source_tile,
            result.sink_point,
            result.sink_tile,
            result.factor,
            result.slope,
            result.cone,
            result.n_phases
        );
        Ok(result)
    }

    /// Image of `source` under one homogeneous dependence step.
    ///
    /// With several statements this is the dependences leaving the source
    /// statement followed by the dependences leaving any other statement,
    /// so the walk returns to a statement of the source's kind.
    fn step(&self, source: &Instance) -> TileResult<Vec<Instance>> {
        let mut frontier = vec![source.clone()];
        let rounds = if self.scop.statements.len() > 1 { 2 } else { 1 };
        for round in 0..rounds {
            let mut next = Vec::new();
            for point in &frontier {
                for dep in &self.scop.flow {
                    let from = dep.space.in_tuple_name();
                    let leaves_source = from == source.tuple;
                    if from != point.tuple || (round == 1 && leaves_source) {
                        continue;
                    }
                    let gisted = self.scop.gisted_flow(dep)?;
                    for coords in gisted.image_of_point(&point.coords, &self.params)? {
                        next.push(Instance::new(dep.tuple_name(), coords));
                    }
                }
            }
            frontier = next;
        }
        Ok(frontier)
    }
}
