//! Basic sets: conjunctions of quasi-affine constraints.
//!
//! A [`BasicSet`] over a set space describes a polyhedron such as an
//! iteration domain. Over a relation space (`n_in > 0`) it describes a
//! relation, with the input variables indexed first. Sets stay symbolic
//! until they are enumerated under concrete parameter values into a
//! [`UnionSet`] or [`UnionMap`].

use crate::polyhedral::constraint::{Constraint, ConstraintKind, ConstraintSystem};
use crate::polyhedral::expr::{floor_div_i64, AffineExpr, Interval};
use crate::polyhedral::space::Space;
use crate::polyhedral::union_map::UnionMap;
use crate::polyhedral::union_set::{Instance, UnionSet};
use crate::utils::errors::{SetError, SetErrorKind};
use log::trace;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper limit on the number of points a single enumeration may produce.
pub const MAX_ENUMERATION: usize = 1 << 20;

/// Upper limit on the number of search nodes visited by one enumeration.
const MAX_SEARCH_NODES: usize = MAX_ENUMERATION * 16;

/// An integer set (or relation) defined by quasi-affine constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicSet {
    /// The space the set lives in
    pub space: Space,
    /// The constraints, over `space.n_vars()` variables
    pub constraints: ConstraintSystem,
}

impl BasicSet {
    /// The set of all points of `space`.
    pub fn universe(space: Space) -> Self {
        let constraints = ConstraintSystem::new(space.n_vars(), space.n_param);
        Self { space, constraints }
    }

    /// The empty set of `space`.
    pub fn empty(space: Space) -> Self {
        let mut set = Self::universe(space);
        let expr = AffineExpr::constant(-1, set.n_vars(), set.n_param());
        set.add_constraint(Constraint::nonneg(expr));
        set
    }

    /// A named box `0 <= x_k < extents[k]`.
    pub fn rectangular(tuple: impl Into<String>, extents: &[i64]) -> Self {
        let n_dim = extents.len();
        let mut set = Self::universe(Space::named_set(tuple, n_dim));
        for (k, &extent) in extents.iter().enumerate() {
            for c in Constraint::var_range(k, 0, extent - 1, n_dim, 0) {
                set.add_constraint(c);
            }
        }
        set
    }

    /// Number of variables (inputs and outputs for a relation).
    pub fn n_vars(&self) -> usize {
        self.space.n_vars()
    }

    /// Number of set or output dimensions.
    pub fn dim(&self) -> usize {
        self.space.n_dim
    }

    /// Number of parameters.
    pub fn n_param(&self) -> usize {
        self.space.n_param
    }

    /// Statement name of the set, or of the range of a relation.
    pub fn tuple_name(&self) -> &str {
        self.space.tuple_name()
    }

    /// Whether this describes a relation.
    pub fn is_map(&self) -> bool {
        self.space.is_map()
    }

    /// Add a constraint in place.
    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.add(constraint);
    }

    /// Builder-style [`add_constraint`](Self::add_constraint).
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.add_constraint(constraint);
        self
    }

    /// Set variable names for printing.
    pub fn with_dim_names(mut self, names: Vec<String>) -> Self {
        self.space = self.space.with_dim_names(names);
        self
    }

    /// Set parameter names.
    pub fn with_param_names(mut self, names: Vec<String>) -> Self {
        self.space = self.space.with_param_names(names);
        self.constraints.n_param = self.space.n_param;
        self
    }

    /// Membership test.
    pub fn contains(&self, point: &[i64], params: &[i64]) -> bool {
        point.len() == self.n_vars() && self.constraints.holds_at(point, params)
    }

    /// A constraint is trivially false.
    pub fn is_obviously_empty(&self) -> bool {
        self.constraints.constraints.iter().any(|c| match c.expr.as_constant() {
            Some(v) => match c.kind {
                ConstraintKind::Inequality => v < 0,
                ConstraintKind::Equality => v != 0,
            },
            None => false,
        })
    }

    /// Conjunction of two sets over the same number of variables.
    pub fn intersect(&self, other: &BasicSet) -> Result<BasicSet, SetError> {
        if self.n_vars() != other.n_vars() {
            return Err(SetError::new(
                SetErrorKind::SpaceMismatch,
                format!("cannot intersect {} with {}", self.space, other.space),
            ));
        }
        let mut result = self.clone();
        result.constraints.extend(other.constraints.constraints.iter().cloned());
        Ok(result)
    }

    /// Drop every constraint that also occurs in `context`.
    pub fn gist(&self, context: &BasicSet) -> BasicSet {
        let mut result = self.clone();
        result
            .constraints
            .constraints
            .retain(|c| !context.constraints.constraints.contains(c));
        result
    }

    /// Embed a set as the domain of a relation whose range is `range`.
    ///
    /// The constraints of `self` constrain the input variables only.
    pub fn lift_to_domain(&self, range: &Space) -> BasicSet {
        let n_in = self.dim();
        let space = relation_space(&self.space, range);
        let mapping: Vec<usize> = (0..n_in).collect();
        self.lifted(space, &mapping)
    }

    /// Embed a set as the range of a relation whose domain is `domain`.
    pub fn lift_to_range(&self, domain: &Space) -> BasicSet {
        let n_in = domain.n_dim;
        let space = relation_space(domain, &self.space);
        let mapping: Vec<usize> = (0..self.dim()).map(|k| n_in + k).collect();
        self.lifted(space, &mapping)
    }

    fn lifted(&self, space: Space, mapping: &[usize]) -> BasicSet {
        let n_vars = space.n_vars();
        let mut result = BasicSet::universe(space);
        result.constraints.n_param = self.n_param();
        for c in &self.constraints.constraints {
            result.add_constraint(c.remap(n_vars, mapping));
        }
        result
    }

    /// Swap domain and range of a relation.
    pub fn reverse(&self) -> BasicSet {
        let n_in = self.space.n_in;
        let n_out = self.space.n_dim;
        let mapping: Vec<usize> = (0..n_in)
            .map(|k| n_out + k)
            .chain(0..n_out)
            .collect();
        let mut result = BasicSet::universe(self.space.reverse());
        result.constraints.n_param = self.n_param();
        for c in &self.constraints.constraints {
            result.add_constraint(c.remap(self.n_vars(), &mapping));
        }
        result
    }

    /// The set of range points related to the input point `point`.
    pub fn fix_domain(&self, point: &[i64]) -> BasicSet {
        let n_in = self.space.n_in;
        let n_vars = self.n_vars();
        let mut range = BasicSet::universe(self.space.range());
        range.constraints.n_param = self.n_param();
        let mapping: Vec<usize> = (0..n_in)
            .map(|_| 0)
            .chain(0..self.dim())
            .collect();
        for c in &self.constraints.constraints {
            let mut fixed = c.clone();
            for (k, &v) in point.iter().enumerate().take(n_in) {
                let value = AffineExpr::constant(v, n_vars, self.n_param());
                fixed = fixed.substitute(k, &value);
            }
            range.add_constraint(fixed.remap(self.dim(), &mapping));
        }
        range
    }

    /// Enumerate the image of `point` under a relation.
    pub fn image_of_point(&self, point: &[i64], params: &[i64]) -> Result<Vec<Vec<i64>>, SetError> {
        self.fix_domain(point).enumerate(params)
    }

    /// Bounding box of the set by interval propagation.
    ///
    /// Each round tightens every variable from every constraint in which it
    /// occurs linearly, using the current box for the other variables.
    pub fn bounds(&self, params: &[i64]) -> Vec<Interval> {
        let n = self.n_vars();
        let mut bounds = vec![Interval::unbounded(); n];
        for _round in 0..(2 * n + 2) {
            let mut changed = false;
            for var in 0..n {
                let mut others = bounds.clone();
                others[var] = Interval::point(0);
                let mut refined = bounds[var];
                for c in &self.constraints.constraints {
                    if let Some(b) = bound_from(c, var, &others, params) {
                        refined = refined.meet(&b);
                    }
                }
                if refined != bounds[var] {
                    bounds[var] = refined;
                    changed = true;
                }
                if refined.is_empty() {
                    return bounds;
                }
            }
            if !changed {
                break;
            }
        }
        bounds
    }

    /// List every integer point in lexicographic order.
    pub fn enumerate(&self, params: &[i64]) -> Result<Vec<Vec<i64>>, SetError> {
        let mut points = Vec::new();
        self.search(params, |p| {
            points.push(p.to_vec());
            if points.len() > MAX_ENUMERATION {
                return Err(SetError::new(
                    SetErrorKind::TooLarge,
                    format!("more than {} points", MAX_ENUMERATION),
                ));
            }
            Ok(true)
        })?;
        trace!("enumerated {} points of {}", points.len(), self.space);
        Ok(points)
    }

    /// The lexicographically smallest point, if any.
    pub fn lexmin(&self, params: &[i64]) -> Result<Option<Vec<i64>>, SetError> {
        let mut first = None;
        self.search(params, |p| {
            first = Some(p.to_vec());
            Ok(false)
        })?;
        Ok(first)
    }

    /// Emptiness test by search.
    pub fn is_empty(&self, params: &[i64]) -> Result<bool, SetError> {
        Ok(self.lexmin(params)?.is_none())
    }

    /// Materialize a set into tagged instances.
    pub fn to_union_set(&self, params: &[i64]) -> Result<UnionSet, SetError> {
        let tuple = self.tuple_name().to_string();
        Ok(self
            .enumerate(params)?
            .into_iter()
            .map(|coords| Instance::new(tuple.clone(), coords))
            .collect())
    }

    /// Materialize a relation into tagged instance pairs.
    pub fn to_union_map(&self, params: &[i64]) -> Result<UnionMap, SetError> {
        let n_in = self.space.n_in;
        let src = self.space.in_tuple_name().to_string();
        let dst = self.tuple_name().to_string();
        Ok(self
            .enumerate(params)?
            .into_iter()
            .map(|mut p| {
                let out = p.split_off(n_in);
                (Instance::new(src.clone(), p), Instance::new(dst.clone(), out))
            })
            .collect())
    }

    /// Depth-first search over the points in lexicographic order.
    ///
    /// `visit` returns `Ok(false)` to stop early.
    fn search<F>(&self, params: &[i64], mut visit: F) -> Result<(), SetError>
    where
        F: FnMut(&[i64]) -> Result<bool, SetError>,
    {
        if self.is_obviously_empty() {
            return Ok(());
        }
        let n = self.n_vars();
        let bounds = self.bounds(params);
        if bounds.iter().any(|b| b.is_empty()) {
            return Ok(());
        }
        if let Some(var) = bounds.iter().position(|b| !b.is_bounded()) {
            let names = self.space.all_dim_names();
            return Err(SetError::new(
                SetErrorKind::Unbounded,
                format!(
                    "variable {} of {} has no finite bound",
                    names.get(var).map(String::as_str).unwrap_or("?"),
                    self.space
                ),
            ));
        }

        // constraints are checked as soon as their last variable is fixed
        let mut check_at: Vec<Vec<&Constraint>> = vec![Vec::new(); n + 1];
        for c in &self.constraints.constraints {
            let level = c.expr.involved_dims().last().map(|&d| d + 1).unwrap_or(0);
            check_at[level.min(n)].push(c);
        }
        if !check_at[0].iter().all(|c| c.holds_at(&[], params)) {
            return Ok(());
        }

        let mut state = SearchState {
            set: self,
            params,
            bounds,
            check_at,
            point: vec![0; n],
            nodes: 0,
        };
        state.descend(0, &mut visit)?;
        Ok(())
    }
}

struct SearchState<'a> {
    set: &'a BasicSet,
    params: &'a [i64],
    bounds: Vec<Interval>,
    check_at: Vec<Vec<&'a Constraint>>,
    point: Vec<i64>,
    nodes: usize,
}

impl SearchState<'_> {
    /// Returns `Ok(false)` once the visitor asked to stop.
    fn descend<F>(&mut self, var: usize, visit: &mut F) -> Result<bool, SetError>
    where
        F: FnMut(&[i64]) -> Result<bool, SetError>,
    {
        if var == self.point.len() {
            return visit(&self.point);
        }
        let mut ranges = self.bounds.clone();
        for (k, &v) in self.point.iter().enumerate().take(var) {
            ranges[k] = Interval::point(v);
        }
        ranges[var] = Interval::point(0);
        let mut range = self.bounds[var];
        for c in &self.set.constraints.constraints {
            if let Some(b) = bound_from(c, var, &ranges, self.params) {
                range = range.meet(&b);
            }
        }
        let (lo, hi) = match (range.lo, range.hi) {
            (Some(lo), Some(hi)) if lo <= hi => (lo, hi),
            _ => return Ok(true),
        };
        for v in lo..=hi {
            self.nodes += 1;
            if self.nodes > MAX_SEARCH_NODES {
                return Err(SetError::new(
                    SetErrorKind::TooLarge,
                    format!("search of {} exceeds {} nodes", self.set.space, MAX_SEARCH_NODES),
                ));
            }
            self.point[var] = v;
            let prefix = &self.point[..=var];
            if !self.check_at[var + 1].iter().all(|c| c.holds_at(prefix, self.params)) {
                continue;
            }
            if !self.descend(var + 1, visit)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Bound on `var` implied by `c`, given ranges for the other variables.
///
/// `others[var]` must be the point 0. Constraints in which `var` occurs
/// inside a floor term give no bound.
fn bound_from(c: &Constraint, var: usize, others: &[Interval], params: &[i64]) -> Option<Interval> {
    let a = c.expr.coeff(var);
    if a == 0 || c.expr.involves_in_divs(var) {
        return None;
    }
    let rest = c.expr.range(others, params);
    // a*x + rest >= 0 (or = 0)
    let mut bound = Interval::unbounded();
    if a > 0 {
        bound.lo = rest.hi.map(|h| ceil_div(-h, a));
        if c.is_equality() {
            bound.hi = rest.lo.map(|l| floor_div_i64(-l, a));
        }
    } else {
        bound.hi = rest.hi.map(|h| floor_div_i64(h, -a));
        if c.is_equality() {
            bound.lo = rest.lo.map(|l| ceil_div(l, -a));
        }
    }
    Some(bound)
}

fn ceil_div(a: i64, b: i64) -> i64 {
    -floor_div_i64(-a, b)
}

fn relation_space(domain: &Space, range: &Space) -> Space {
    let mut space = Space::map(domain.n_dim, range.n_dim)
        .with_param_names(domain.param_names.clone());
    space.n_param = domain.n_param.max(range.n_param);
    space.in_tuple = domain.tuple.clone();
    space.tuple = range.tuple.clone();
    space.dim_names = domain
        .all_dim_names()
        .into_iter()
        .chain(range.all_dim_names().into_iter().map(|n| {
            if domain.dim_names.contains(&n) {
                format!("{}'", n)
            } else {
                n
            }
        }))
        .collect();
    space
}

impl fmt::Display for BasicSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dim_names = self.space.all_dim_names();
        let param_names = self.space.all_param_names();
        let (ins, outs) = dim_names.split_at(self.space.n_in);
        if !param_names.is_empty() {
            write!(f, "[{}] -> ", param_names.join(", "))?;
        }
        write!(f, "{{ ")?;
        if self.is_map() {
            write!(f, "{}[{}] -> ", self.space.in_tuple_name(), ins.join(", "))?;
        }
        write!(f, "{}[{}]", self.tuple_name(), outs.join(", "))?;
        if !self.constraints.is_empty() {
            write!(f, " : ")?;
            for (i, c) in self.constraints.constraints.iter().enumerate() {
                if i > 0 {
                    write!(f, " and ")?;
                }
                write!(f, "{}", c.to_string_with_names(&dim_names, &param_names))?;
            }
        }
        write!(f, " }}")
    }
}
