//! Geometry of flow dependences.
//!
//! The tiling strategies only need a few summaries of the dependence pairs:
//! - distance and direction vectors, for reporting
//! - the range of per-time-step offsets along a space dimension (halo width)
//! - the most negative same-time space offset (phase shift)
//! - the steepest dependence in the skewed schedule (phase cut)

use crate::polyhedral::{Instance, UnionMap};
use crate::schedule::Band;
use num_integer::Integer;
use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Direction of a dependence along one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// < (forward dependence, positive distance)
    Lt,
    /// = (same iteration, zero distance)
    Eq,
    /// > (backward dependence, negative distance)
    Gt,
    /// <= (forward or same)
    Le,
    /// >= (backward or same)
    Ge,
    /// * (any direction)
    Star,
}

impl Direction {
    /// Direction of a single distance.
    pub fn of(distance: i64) -> Self {
        match distance.signum() {
            1 => Direction::Lt,
            0 => Direction::Eq,
            _ => Direction::Gt,
        }
    }

    /// Get the character representation.
    pub fn to_char(&self) -> char {
        match self {
            Direction::Lt => '<',
            Direction::Eq => '=',
            Direction::Gt => '>',
            Direction::Le => '≤',
            Direction::Ge => '≥',
            Direction::Star => '*',
        }
    }

    /// Combine two directions (union).
    pub fn union(&self, other: &Direction) -> Direction {
        if self == other {
            return *self;
        }
        match (self, other) {
            (Direction::Lt, Direction::Eq) | (Direction::Eq, Direction::Lt) => Direction::Le,
            (Direction::Gt, Direction::Eq) | (Direction::Eq, Direction::Gt) => Direction::Ge,
            (Direction::Le, Direction::Lt | Direction::Eq)
            | (Direction::Lt | Direction::Eq, Direction::Le) => Direction::Le,
            (Direction::Ge, Direction::Gt | Direction::Eq)
            | (Direction::Gt | Direction::Eq, Direction::Ge) => Direction::Ge,
            _ => Direction::Star,
        }
    }
}

/// Coordinate difference `dst - src`, `None` across different dimensionalities.
pub fn distance(src: &Instance, dst: &Instance) -> Option<Vec<i64>> {
    if src.dim() != dst.dim() {
        return None;
    }
    Some(dst.coords.iter().zip(&src.coords).map(|(d, s)| d - s).collect())
}

/// Distinct distance vectors of a dependence relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DistanceSummary {
    /// Number of dependence pairs
    pub n_pairs: usize,
    /// Distinct distance vectors
    pub distances: BTreeSet<Vec<i64>>,
}

impl DistanceSummary {
    /// Summarize every pair of `flow`.
    pub fn of(flow: &UnionMap) -> Self {
        let distances = flow.iter().filter_map(|(s, d)| distance(s, d)).collect();
        Self { n_pairs: flow.len(), distances }
    }

    /// A single distance vector covers every pair.
    pub fn is_uniform(&self) -> bool {
        self.distances.len() == 1
    }

    /// Direction vector summarizing all distances.
    pub fn directions(&self) -> Vec<Direction> {
        let mut out: Vec<Direction> = Vec::new();
        for dist in &self.distances {
            for (k, &d) in dist.iter().enumerate() {
                match out.get_mut(k) {
                    Some(dir) => *dir = dir.union(&Direction::of(d)),
                    None => out.push(Direction::of(d)),
                }
            }
        }
        out
    }
}

impl fmt::Display for DistanceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dirs: String = self.directions().iter().map(|d| d.to_char()).collect();
        let dists: Vec<String> = self
            .distances
            .iter()
            .map(|d| format!("({})", d.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")))
            .collect();
        write!(f, "{} pairs, dir=<{}>, distances {}", self.n_pairs, dirs, dists.join(" "))
    }
}

/// Range of `Δx_dim / Δx_0` over the pairs touching `stmt` that advance time.
pub fn slope_range(flow: &UnionMap, stmt: &str, dim: usize) -> Option<(Rational64, Rational64)> {
    flow.iter()
        .filter(|(s, d)| s.tuple == stmt || d.tuple == stmt)
        .filter_map(|(s, d)| {
            let dt = d.coords.first()? - s.coords.first()?;
            let dx = d.coords.get(dim)? - s.coords.get(dim)?;
            (dt > 0).then(|| Rational64::new(dx, dt))
        })
        .fold(None, |acc, r| match acc {
            None => Some((r, r)),
            Some((lo, hi)) => Some((lo.min(r), hi.max(r))),
        })
}

/// Halo growth per time step along `dim`: `ceil(max slope) - floor(min slope)`.
pub fn halo_coefficient(flow: &UnionMap, stmt: &str, dim: usize) -> i64 {
    match slope_range(flow, stmt, dim) {
        Some((lo, hi)) => hi.ceil().to_integer() - lo.floor().to_integer(),
        None => 0,
    }
}

/// Most negative space offset among same-time pairs, capped at 0.
pub fn same_time_shift(flow: &UnionMap) -> i64 {
    flow.iter()
        .filter(|(s, d)| s.coords.first() == d.coords.first())
        .filter_map(|(s, d)| Some(d.coords.get(1)? - s.coords.get(1)?))
        .fold(0, i64::min)
}

/// Steepest advance of band member 1 per step of member 0, `ceil(Δs1/Δs0)`
/// over every pair the band schedules.
///
/// `None` when a pair moves member 1 backwards, or moves it forward without
/// advancing member 0.
pub fn schedule_cone(flow: &UnionMap, band: &Band, params: &[i64]) -> Option<i64> {
    let mut cone = 0;
    for (src, dst) in flow.iter() {
        let (Some(a), Some(b)) = (band.values(src, params), band.values(dst, params)) else {
            continue;
        };
        let du = b.first()? - a.first()?;
        let dv = b.get(1)? - a.get(1)?;
        if du < 0 || dv < 0 || (du == 0 && dv > 0) {
            return None;
        }
        if du > 0 {
            cone = cone.max(Integer::div_ceil(&dv, &du));
        }
    }
    Some(cone)
}

/// Reduce a rational known to be integral, `None` otherwise.
pub fn as_integer(r: Rational64) -> Option<i64> {
    r.is_integer().then(|| r.to_integer())
}

/// Rational `num / den`, `None` for a zero denominator.
pub fn ratio(num: i64, den: i64) -> Option<Rational64> {
    (den != 0).then(|| Rational64::new(num, den))
}
