//! Quasi-affine constraints.
//!
//! Every constraint is normalized against zero: `expr >= 0` or `expr = 0`,
//! where `expr` may carry floor terms. Variables are the tuple dimensions of
//! the owning set (domain first, then range for relations), followed by the
//! parameters.

use crate::polyhedral::expr::AffineExpr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One constraint over the variables and parameters of a set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Constraint {
    /// Left-hand side, compared against zero
    pub expr: AffineExpr,
    /// Comparison against zero
    pub kind: ConstraintKind,
}

/// Comparison of a [`Constraint`] against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// `expr >= 0`
    Inequality,
    /// `expr = 0`
    Equality,
}

impl Constraint {
    /// `expr >= 0`
    pub fn nonneg(expr: AffineExpr) -> Self {
        Self { expr, kind: ConstraintKind::Inequality }
    }

    /// `expr = 0`
    pub fn zero(expr: AffineExpr) -> Self {
        Self { expr, kind: ConstraintKind::Equality }
    }

    /// `lhs >= rhs`
    pub fn ge(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self::nonneg(lhs - rhs)
    }

    /// `lhs <= rhs`
    pub fn le(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self::nonneg(rhs - lhs)
    }

    /// `lhs < rhs`, stored as `rhs - lhs - 1 >= 0`.
    pub fn lt(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        let mut expr = rhs - lhs;
        expr.constant -= 1;
        Self::nonneg(expr)
    }

    /// `lhs = rhs`
    pub fn eq(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self::zero(lhs - rhs)
    }

    /// `x_var >= lo`
    pub fn var_ge(var: usize, lo: i64, n_dim: usize, n_param: usize) -> Self {
        Self::ge(AffineExpr::var(var, n_dim, n_param), AffineExpr::constant(lo, n_dim, n_param))
    }

    /// `x_var <= hi`
    pub fn var_le(var: usize, hi: i64, n_dim: usize, n_param: usize) -> Self {
        Self::le(AffineExpr::var(var, n_dim, n_param), AffineExpr::constant(hi, n_dim, n_param))
    }

    /// `lo <= x_var <= hi` as two constraints.
    pub fn var_range(var: usize, lo: i64, hi: i64, n_dim: usize, n_param: usize) -> [Self; 2] {
        [Self::var_ge(var, lo, n_dim, n_param), Self::var_le(var, hi, n_dim, n_param)]
    }

    /// True for `expr = 0`.
    pub fn is_equality(&self) -> bool {
        self.kind == ConstraintKind::Equality
    }

    /// Whether the constraint holds at `point` for the bound `params`.
    pub fn holds_at(&self, point: &[i64], params: &[i64]) -> bool {
        let value = self.expr.evaluate(point, params);
        match self.kind {
            ConstraintKind::Inequality => value >= 0,
            ConstraintKind::Equality => value == 0,
        }
    }

    /// Whether the constraint mentions dimension `dim`.
    pub fn involves(&self, dim: usize) -> bool {
        self.expr.involves(dim)
    }

    /// Move the constraint into a space of `n_dim` variables, see [`AffineExpr::remap`].
    pub fn remap(&self, n_dim: usize, mapping: &[usize]) -> Self {
        Self { expr: self.expr.remap(n_dim, mapping), kind: self.kind }
    }

    /// Replace dimension `dim` by `replacement`.
    pub fn substitute(&self, dim: usize, replacement: &AffineExpr) -> Self {
        Self { expr: self.expr.substitute(dim, replacement), kind: self.kind }
    }

    /// Number of variables.
    pub fn n_dim(&self) -> usize {
        self.expr.n_dim()
    }

    /// Number of parameters.
    pub fn n_param(&self) -> usize {
        self.expr.n_param()
    }

    /// Render with the given variable and parameter names.
    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let op = if self.is_equality() { "=" } else { ">=" };
        format!("{} {} 0", self.expr.to_string_with_names(dim_names, param_names), op)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = (0..self.n_dim()).map(|i| format!("i{}", i)).collect();
        let params: Vec<String> = (0..self.n_param()).map(|i| format!("p{}", i)).collect();
        f.write_str(&self.to_string_with_names(&dims, &params))
    }
}

/// Conjunction of constraints over `n_dim` variables and `n_param` parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSystem {
    /// The constraints, without duplicates
    pub constraints: Vec<Constraint>,
    /// Number of variables
    pub n_dim: usize,
    /// Number of parameters
    pub n_param: usize,
}

impl ConstraintSystem {
    /// The unconstrained system.
    pub fn new(n_dim: usize, n_param: usize) -> Self {
        Self { constraints: Vec::new(), n_dim, n_param }
    }

    /// Add a constraint unless it is already present.
    pub fn add(&mut self, constraint: Constraint) {
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
    }

    /// Whether every constraint holds at `point`.
    pub fn holds_at(&self, point: &[i64], params: &[i64]) -> bool {
        self.constraints.iter().all(|c| c.holds_at(point, params))
    }

    /// True when nothing constrains the space.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Number of distinct constraints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Iterate over the constraints.
    pub fn iter(&self) -> std::slice::Iter<'_, Constraint> {
        self.constraints.iter()
    }
}

impl Extend<Constraint> for ConstraintSystem {
    fn extend<I: IntoIterator<Item = Constraint>>(&mut self, iter: I) {
        for c in iter {
            self.add(c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_range() {
        let [lo, hi] = Constraint::var_range(1, -2, 3, 2, 0);
        for j in -4..6 {
            let inside = (-2..=3).contains(&j);
            assert_eq!(lo.holds_at(&[0, j], &[]) && hi.holds_at(&[0, j], &[]), inside);
        }
    }

    #[test]
    fn test_strict_less_than() {
        let x = AffineExpr::var(0, 2, 0);
        let y = AffineExpr::var(1, 2, 0);
        let c = Constraint::lt(x, y);
        assert!(c.holds_at(&[1, 2], &[]));
        assert!(!c.holds_at(&[2, 2], &[]));
    }

    #[test]
    fn test_modular_equality() {
        // i mod 4 = 1
        let c = Constraint::zero(AffineExpr::var(0, 1, 0).modulo(4) - AffineExpr::constant(1, 1, 0));
        let hits: Vec<i64> = (-4..9).filter(|&i| c.holds_at(&[i], &[])).collect();
        assert_eq!(hits, vec![-3, 1, 5]);
    }

    #[test]
    fn test_parametric_bound() {
        // i < N
        let c = Constraint::lt(AffineExpr::var(0, 1, 1), AffineExpr::param(0, 1, 1));
        assert!(c.holds_at(&[4], &[5]));
        assert!(!c.holds_at(&[5], &[5]));
        assert_eq!(c.to_string(), "-i0 + p0 - 1 >= 0");
    }

    #[test]
    fn test_system_drops_duplicates() {
        let mut sys = ConstraintSystem::new(2, 0);
        sys.extend(Constraint::var_range(0, 0, 9, 2, 0));
        sys.extend(Constraint::var_range(1, 0, 9, 2, 0));
        sys.add(Constraint::var_ge(1, 0, 2, 0));

        assert_eq!(sys.len(), 4);
        assert!(sys.holds_at(&[0, 0], &[]));
        assert!(sys.holds_at(&[9, 9], &[]));
        assert!(!sys.holds_at(&[10, 0], &[]));
        assert!(!sys.holds_at(&[-1, 0], &[]));
    }
}
