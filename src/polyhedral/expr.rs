//! Quasi-affine expressions for polyhedral representation.
//!
//! An affine expression is a linear combination of variables plus a constant:
//! `aff(x) = c0 + c1*x1 + c2*x2 + ... + cn*xn`
//!
//! Tiling needs integer division, so an expression may also carry floor
//! terms `k * floor(e / d)` where `e` is itself quasi-affine and `d > 0`.
//! Every operation is structural: expressions are built from coefficient
//! vectors and never from text, and equal floor terms are merged so that two
//! expressions built along different paths compare equal.

use num_integer::Integer;
use serde::{Serialize, Deserialize};
use std::fmt;
use std::ops::{Add, Sub, Neg};

/// Integer floor division (rounds toward negative infinity).
pub fn floor_div_i64(a: i64, b: i64) -> i64 {
    if b == 0 { return 0; }
    Integer::div_floor(&a, &b)
}

/// Non-negative remainder of `a` modulo `b` (for `b > 0`).
pub fn mod_floor_i64(a: i64, b: i64) -> i64 {
    if b == 0 { return a; }
    Integer::mod_floor(&a, &b)
}

/// `floor(numerator / divisor)` with a strictly positive divisor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FloorTerm {
    /// The expression being divided
    pub numerator: AffineExpr,
    /// The divisor (always > 0)
    pub divisor: i64,
}

/// A floor term together with its coefficient in the enclosing expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DivTerm {
    /// Coefficient of the floor term
    pub coeff: i64,
    /// The floor term
    pub floor: FloorTerm,
}

/// A closed or half-open integer interval; `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Interval {
    /// Lower bound
    pub lo: Option<i64>,
    /// Upper bound
    pub hi: Option<i64>,
}

impl Interval {
    /// The unbounded interval.
    pub fn unbounded() -> Self {
        Self { lo: None, hi: None }
    }

    /// A bounded interval `[lo, hi]`.
    pub fn new(lo: i64, hi: i64) -> Self {
        Self { lo: Some(lo), hi: Some(hi) }
    }

    /// A single value.
    pub fn point(v: i64) -> Self {
        Self::new(v, v)
    }

    /// Both ends are finite.
    pub fn is_bounded(&self) -> bool {
        self.lo.is_some() && self.hi.is_some()
    }

    /// No integer lies in the interval.
    pub fn is_empty(&self) -> bool {
        matches!((self.lo, self.hi), (Some(lo), Some(hi)) if lo > hi)
    }

    /// Intersection of two intervals.
    pub fn meet(&self, other: &Interval) -> Interval {
        let lo = match (self.lo, other.lo) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let hi = match (self.hi, other.hi) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Interval { lo, hi }
    }

    fn add(&self, other: &Interval) -> Interval {
        let add = |a: Option<i64>, b: Option<i64>| match (a, b) {
            (Some(a), Some(b)) => a.checked_add(b),
            _ => None,
        };
        Interval { lo: add(self.lo, other.lo), hi: add(self.hi, other.hi) }
    }

    fn scale(&self, k: i64) -> Interval {
        let mul = |a: Option<i64>| a.and_then(|a| a.checked_mul(k));
        match k {
            0 => Interval::point(0),
            k if k > 0 => Interval { lo: mul(self.lo), hi: mul(self.hi) },
            _ => Interval { lo: mul(self.hi), hi: mul(self.lo) },
        }
    }

    fn floor_div(&self, d: i64) -> Interval {
        Interval {
            lo: self.lo.map(|v| floor_div_i64(v, d)),
            hi: self.hi.map(|v| floor_div_i64(v, d)),
        }
    }
}

/// A quasi-affine expression: constant + sum(coeff[i] * var[i]) + floor terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AffineExpr {
    /// Constant term
    pub constant: i64,
    /// Coefficients for each dimension (index = dimension index)
    pub coeffs: Vec<i64>,
    /// Coefficients for parameters (index = parameter index)
    pub param_coeffs: Vec<i64>,
    /// Floor terms, kept sorted and merged
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub divs: Vec<DivTerm>,
}

impl AffineExpr {
    /// Create a zero expression.
    pub fn zero(n_dim: usize, n_param: usize) -> Self {
        Self {
            constant: 0,
            coeffs: vec![0; n_dim],
            param_coeffs: vec![0; n_param],
            divs: Vec::new(),
        }
    }

    /// Create a constant expression.
    pub fn constant(value: i64, n_dim: usize, n_param: usize) -> Self {
        let mut expr = Self::zero(n_dim, n_param);
        expr.constant = value;
        expr
    }

    /// Create an expression for a single dimension variable.
    pub fn var(dim: usize, n_dim: usize, n_param: usize) -> Self {
        let mut expr = Self::zero(n_dim, n_param);
        if dim < n_dim {
            expr.coeffs[dim] = 1;
        }
        expr
    }

    /// Create an expression for a parameter.
    pub fn param(param_idx: usize, n_dim: usize, n_param: usize) -> Self {
        let mut expr = Self::zero(n_dim, n_param);
        if param_idx < n_param {
            expr.param_coeffs[param_idx] = 1;
        }
        expr
    }

    /// Build a linear expression from coefficients and a constant.
    pub fn linear(coeffs: &[i64], constant: i64, n_param: usize) -> Self {
        Self {
            constant,
            coeffs: coeffs.to_vec(),
            param_coeffs: vec![0; n_param],
            divs: Vec::new(),
        }
    }

    /// Check if this is a constant expression.
    pub fn is_constant(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0)
            && self.param_coeffs.iter().all(|&c| c == 0)
            && self.divs.is_empty()
    }

    /// Check if this expression is zero.
    pub fn is_zero(&self) -> bool {
        self.constant == 0 && self.is_constant()
    }

    /// True when the expression has no floor terms.
    pub fn is_affine(&self) -> bool {
        self.divs.is_empty()
    }

    /// Get the constant value if this is a constant expression.
    pub fn as_constant(&self) -> Option<i64> {
        if self.is_constant() {
            Some(self.constant)
        } else {
            None
        }
    }

    /// Get the number of dimensions.
    pub fn n_dim(&self) -> usize {
        self.coeffs.len()
    }

    /// Get the number of parameters.
    pub fn n_param(&self) -> usize {
        self.param_coeffs.len()
    }

    /// Get coefficient for a dimension (outside floor terms).
    pub fn coeff(&self, dim: usize) -> i64 {
        self.coeffs.get(dim).copied().unwrap_or(0)
    }

    /// Get coefficient for a parameter.
    pub fn param_coeff(&self, idx: usize) -> i64 {
        self.param_coeffs.get(idx).copied().unwrap_or(0)
    }

    /// Set coefficient for a dimension.
    pub fn set_coeff(&mut self, dim: usize, value: i64) {
        if dim < self.coeffs.len() {
            self.coeffs[dim] = value;
        }
    }

    /// Whether the dimension occurs anywhere, floor terms included.
    pub fn involves(&self, dim: usize) -> bool {
        self.coeff(dim) != 0 || self.divs.iter().any(|d| d.floor.numerator.involves(dim))
    }

    /// Whether the dimension occurs inside a floor term.
    pub fn involves_in_divs(&self, dim: usize) -> bool {
        self.divs.iter().any(|d| d.floor.numerator.involves(dim))
    }

    /// Whether any parameter occurs.
    pub fn involves_params(&self) -> bool {
        self.param_coeffs.iter().any(|&c| c != 0)
            || self.divs.iter().any(|d| d.floor.numerator.involves_params())
    }

    /// Dimensions occurring anywhere in the expression.
    pub fn involved_dims(&self) -> Vec<usize> {
        (0..self.n_dim()).filter(|&d| self.involves(d)).collect()
    }

    /// Evaluate the expression given concrete values.
    pub fn evaluate(&self, dim_values: &[i64], param_values: &[i64]) -> i64 {
        let mut result = self.constant;
        for (i, &c) in self.coeffs.iter().enumerate() {
            if let Some(&v) = dim_values.get(i) {
                result += c * v;
            }
        }
        for (i, &c) in self.param_coeffs.iter().enumerate() {
            if let Some(&v) = param_values.get(i) {
                result += c * v;
            }
        }
        for d in &self.divs {
            let n = d.floor.numerator.evaluate(dim_values, param_values);
            result += d.coeff * floor_div_i64(n, d.floor.divisor);
        }
        result
    }

    /// Range of the expression when each dimension ranges over an interval.
    pub fn range(&self, dims: &[Interval], param_values: &[i64]) -> Interval {
        let mut acc = Interval::point(self.constant);
        for (i, &c) in self.param_coeffs.iter().enumerate() {
            let v = param_values.get(i).copied().unwrap_or(0);
            acc = acc.add(&Interval::point(c * v));
        }
        for (i, &c) in self.coeffs.iter().enumerate() {
            if c != 0 {
                let iv = dims.get(i).copied().unwrap_or_else(Interval::unbounded);
                acc = acc.add(&iv.scale(c));
            }
        }
        for d in &self.divs {
            let inner = d.floor.numerator.range(dims, param_values);
            acc = acc.add(&inner.floor_div(d.floor.divisor).scale(d.coeff));
        }
        acc
    }

    /// Scale the expression by a constant.
    pub fn scale(&self, factor: i64) -> Self {
        if factor == 0 {
            return Self::zero(self.n_dim(), self.n_param());
        }
        Self {
            constant: self.constant * factor,
            coeffs: self.coeffs.iter().map(|&c| c * factor).collect(),
            param_coeffs: self.param_coeffs.iter().map(|&c| c * factor).collect(),
            divs: self.divs.iter()
                .map(|d| DivTerm { coeff: d.coeff * factor, floor: d.floor.clone() })
                .collect(),
        }
    }

    /// `floor(self / divisor)`.
    ///
    /// The integral part of every coefficient is pulled out of the floor and
    /// the remaining numerator is reduced by its gcd with the divisor, so
    /// `floor((x + 4)/4)` becomes `x_floor + 1` and exact divisions produce
    /// no floor term at all.
    pub fn floor_div(&self, divisor: i64) -> Self {
        if divisor == 0 {
            return self.clone();
        }
        if divisor < 0 {
            return self.neg_ref().floor_div(-divisor);
        }
        if divisor == 1 {
            return self.clone();
        }

        // self = divisor * quotient + remainder, remainder coefficients in [0, divisor)
        let split = |c: i64| (floor_div_i64(c, divisor), mod_floor_i64(c, divisor));
        let mut quotient = Self::zero(self.n_dim(), self.n_param());
        let mut remainder = Self::zero(self.n_dim(), self.n_param());
        let (q, r) = split(self.constant);
        quotient.constant = q;
        remainder.constant = r;
        for (i, &c) in self.coeffs.iter().enumerate() {
            let (q, r) = split(c);
            quotient.coeffs[i] = q;
            remainder.coeffs[i] = r;
        }
        for (i, &c) in self.param_coeffs.iter().enumerate() {
            let (q, r) = split(c);
            quotient.param_coeffs[i] = q;
            remainder.param_coeffs[i] = r;
        }
        for d in &self.divs {
            let (q, r) = split(d.coeff);
            if q != 0 {
                quotient.push_div(q, d.floor.clone());
            }
            if r != 0 {
                remainder.push_div(r, d.floor.clone());
            }
        }

        if remainder.is_constant() {
            // 0 <= remainder < divisor, so its floor vanishes
            return quotient;
        }

        let g = remainder.content().gcd(&divisor);
        let (numerator, divisor) = if g > 1 {
            (remainder.exact_div(g), divisor / g)
        } else {
            (remainder, divisor)
        };
        if divisor == 1 {
            return quotient + numerator;
        }
        quotient.push_div(1, FloorTerm { numerator, divisor });
        quotient
    }

    /// `self mod m`, i.e. `self - m*floor(self/m)`, for `m > 0`.
    pub fn modulo(&self, m: i64) -> Self {
        self.clone() - self.floor_div(m).scale(m)
    }

    /// GCD of the non-constant coefficients (0 for a constant expression).
    pub fn content(&self) -> i64 {
        let mut g = 0i64;
        for &c in self.coeffs.iter().chain(&self.param_coeffs) {
            g = g.gcd(&c);
        }
        for d in &self.divs {
            g = g.gcd(&d.coeff);
        }
        g
    }

    fn exact_div(&self, g: i64) -> Self {
        Self {
            constant: self.constant / g,
            coeffs: self.coeffs.iter().map(|&c| c / g).collect(),
            param_coeffs: self.param_coeffs.iter().map(|&c| c / g).collect(),
            divs: self.divs.iter()
                .map(|d| DivTerm { coeff: d.coeff / g, floor: d.floor.clone() })
                .collect(),
        }
    }

    fn neg_ref(&self) -> Self {
        self.scale(-1)
    }

    fn push_div(&mut self, coeff: i64, floor: FloorTerm) {
        if let Some(existing) = self.divs.iter_mut().find(|d| d.floor == floor) {
            existing.coeff += coeff;
        } else {
            self.divs.push(DivTerm { coeff, floor });
        }
        self.divs.retain(|d| d.coeff != 0);
        self.divs.sort();
    }

    /// Move every dimension `i` to position `mapping[i]` in a space of `n_dim`
    /// variables. Used to embed a set expression into one side of a relation.
    pub fn remap(&self, n_dim: usize, mapping: &[usize]) -> Self {
        let mut out = Self::zero(n_dim, self.n_param());
        out.constant = self.constant;
        out.param_coeffs = self.param_coeffs.clone();
        for (i, &c) in self.coeffs.iter().enumerate() {
            if c != 0 {
                if let Some(&j) = mapping.get(i) {
                    if j < n_dim {
                        out.coeffs[j] += c;
                    }
                }
            }
        }
        for d in &self.divs {
            let numerator = d.floor.numerator.remap(n_dim, mapping);
            out.push_div(d.coeff, FloorTerm { numerator, divisor: d.floor.divisor });
        }
        out
    }

    /// Replace dimension `dim` by `replacement` everywhere.
    pub fn substitute(&self, dim: usize, replacement: &AffineExpr) -> Self {
        let c = self.coeff(dim);
        let mut base = self.clone();
        base.set_coeff(dim, 0);
        base.divs.clear();
        let mut out = base + replacement.scale(c);
        for d in &self.divs {
            let numerator = d.floor.numerator.substitute(dim, replacement);
            let floor = numerator.floor_div(d.floor.divisor);
            out = out + floor.scale(d.coeff);
        }
        out
    }

    /// Convert to string with given dimension and parameter names.
    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let mut parts = Vec::new();

        let name_of = |names: &[String], i: usize, prefix: &str| {
            names.get(i).cloned().unwrap_or_else(|| format!("{}{}", prefix, i))
        };
        let term = |c: i64, name: String| match c {
            1 => name,
            -1 => format!("-{}", name),
            c => format!("{}*{}", c, name),
        };

        for (i, &c) in self.coeffs.iter().enumerate() {
            if c != 0 {
                parts.push(term(c, name_of(dim_names, i, "d")));
            }
        }
        for (i, &c) in self.param_coeffs.iter().enumerate() {
            if c != 0 {
                parts.push(term(c, name_of(param_names, i, "p")));
            }
        }
        for d in &self.divs {
            let inner = d.floor.numerator.to_string_with_names(dim_names, param_names);
            parts.push(term(d.coeff, format!("floor(({})/{})", inner, d.floor.divisor)));
        }
        if self.constant != 0 || parts.is_empty() {
            parts.push(format!("{}", self.constant));
        }

        parts.join(" + ").replace("+ -", "- ")
    }

    fn zip_with(self, other: Self, f: impl Fn(i64, i64) -> i64) -> Self {
        let n_dim = self.n_dim().max(other.n_dim());
        let n_param = self.n_param().max(other.n_param());
        let mut out = Self::zero(n_dim, n_param);
        out.constant = f(self.constant, other.constant);
        for i in 0..n_dim {
            out.coeffs[i] = f(self.coeff(i), other.coeff(i));
        }
        for i in 0..n_param {
            out.param_coeffs[i] = f(self.param_coeff(i), other.param_coeff(i));
        }
        for d in self.divs {
            out.push_div(f(d.coeff, 0), d.floor);
        }
        for d in other.divs {
            out.push_div(f(0, d.coeff), d.floor);
        }
        out
    }
}

impl Add for AffineExpr {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.zip_with(other, |a, b| a + b)
    }
}

impl Sub for AffineExpr {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self.zip_with(other, |a, b| a - b)
    }
}

impl Neg for AffineExpr {
    type Output = Self;

    fn neg(self) -> Self {
        self.scale(-1)
    }
}

impl fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dim_names: Vec<String> = (0..self.n_dim()).map(|i| format!("d{}", i)).collect();
        let param_names: Vec<String> = (0..self.n_param()).map(|i| format!("p{}", i)).collect();
        write!(f, "{}", self.to_string_with_names(&dim_names, &param_names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_constant() {
        let expr = AffineExpr::constant(5, 2, 1);
        assert!(expr.is_constant());
        assert_eq!(expr.evaluate(&[1, 2], &[3]), 5);
    }

    #[test]
    fn test_var() {
        let expr = AffineExpr::var(0, 2, 0);
        assert!(!expr.is_constant());
        assert_eq!(expr.evaluate(&[7, 3], &[]), 7);
    }

    #[test]
    fn test_add_and_scale() {
        let e1 = AffineExpr::var(0, 2, 0);
        let e2 = AffineExpr::var(1, 2, 0);
        let sum = e1 + e2.scale(3);
        assert_eq!(sum.evaluate(&[3, 4], &[]), 15);
    }

    #[test]
    fn test_floor_div_rounds_down() {
        let x = AffineExpr::var(0, 1, 0);
        let f = x.floor_div(4);
        assert_eq!(f.evaluate(&[7], &[]), 1);
        assert_eq!(f.evaluate(&[-1], &[]), -1);
        assert_eq!(f.evaluate(&[-4], &[]), -1);
        assert_eq!(f.evaluate(&[-5], &[]), -2);
    }

    #[test]
    fn test_floor_div_extracts_integer_part() {
        let x = AffineExpr::var(0, 1, 0);
        let shifted = (x.clone() + AffineExpr::constant(4, 1, 0)).floor_div(4);
        let plain = x.floor_div(4) + AffineExpr::constant(1, 1, 0);
        assert_eq!(shifted, plain);
    }

    #[test]
    fn test_exact_division_has_no_floor() {
        let e = AffineExpr::linear(&[4, 8], 12, 0);
        let q = e.floor_div(4);
        assert!(q.is_affine());
        assert_eq!(q, AffineExpr::linear(&[1, 2], 3, 0));
    }

    #[test]
    fn test_modulo_is_non_negative() {
        let x = AffineExpr::var(0, 1, 0);
        let m = x.modulo(4);
        for v in -9..9 {
            let r = m.evaluate(&[v], &[]);
            assert!((0..4).contains(&r));
            assert_eq!((v - r) % 4, 0);
        }
    }

    #[test]
    fn test_identical_floor_terms_cancel() {
        let s = AffineExpr::linear(&[1, 1], 0, 0);
        let a = s.modulo(4);
        let b = s.modulo(4);
        assert!((a - b).is_zero());
    }

    #[test]
    fn test_substitute_inside_floor() {
        // floor((t + i)/4) with i := i' in a 3-variable space
        let e = AffineExpr::linear(&[1, 1, 0], 0, 0).floor_div(4);
        let sub = e.substitute(1, &AffineExpr::var(2, 3, 0));
        assert_eq!(sub.evaluate(&[1, 100, 3], &[]), 1);
        assert!(!sub.involves(1));
        assert!(sub.involves_in_divs(2));
    }

    #[test]
    fn test_remap_moves_into_relation_space() {
        let e = AffineExpr::linear(&[2, -1], 5, 0).floor_div(3);
        let moved = e.remap(4, &[2, 3]);
        assert_eq!(moved.evaluate(&[0, 0, 4, 1], &[]), e.evaluate(&[4, 1], &[]));
    }

    #[test]
    fn test_range_through_floor() {
        let e = AffineExpr::var(0, 1, 0).modulo(4);
        let r = e.range(&[Interval::new(0, 9)], &[]);
        assert!(r.lo.unwrap_or(i64::MAX) <= 0);
        assert!(r.hi.unwrap_or(i64::MIN) >= 3);
        let unbounded = e.range(&[Interval::unbounded()], &[]);
        assert!(!unbounded.is_bounded());
    }

    #[test]
    fn test_display() {
        let mut expr = AffineExpr::zero(2, 1);
        expr.constant = 5;
        expr.coeffs[0] = 2;
        expr.coeffs[1] = -1;
        expr.param_coeffs[0] = 1;

        let s = expr.to_string_with_names(&names(&["i", "j"]), &names(&["N"]));
        assert!(s.contains("2*i"));
        assert!(s.contains("- j"));

        let m = AffineExpr::var(0, 1, 0).modulo(4);
        assert_eq!(m.to_string_with_names(&names(&["t"]), &[]), "t - 4*floor((t)/4)");
    }
}
