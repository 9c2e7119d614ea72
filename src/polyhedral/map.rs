//! Affine maps: per-statement partial schedules.
//!
//! An [`AffineMap`] gives one quasi-affine expression per schedule member
//! over the iteration variables of a single statement. A band of a schedule
//! tree holds one map per statement.

use crate::polyhedral::expr::AffineExpr;
use crate::polyhedral::space::Space;
use crate::polyhedral::union_set::{Instance, UnionSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A quasi-affine map from a statement's iteration space to schedule space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffineMap {
    /// Domain tuple and dimension counts
    pub space: Space,
    /// Output expressions (one per output dimension)
    pub outputs: Vec<AffineExpr>,
}

impl AffineMap {
    /// Create an identity map of given dimension.
    pub fn identity(n_dim: usize) -> Self {
        let outputs = (0..n_dim).map(|i| AffineExpr::var(i, n_dim, 0)).collect();
        Self::from_outputs(n_dim, outputs)
    }

    /// Create from output expressions.
    pub fn from_outputs(n_in: usize, outputs: Vec<AffineExpr>) -> Self {
        let n_param = outputs.iter().map(|e| e.n_param()).max().unwrap_or(0);
        let mut space = Space::map(n_in, outputs.len());
        space.n_param = n_param;
        Self { space, outputs }
    }

    /// Create from integer rows `[c_0, .., c_{n-1}, constant]`.
    pub fn from_rows(n_in: usize, rows: &[&[i64]]) -> Self {
        let outputs = rows
            .iter()
            .map(|row| {
                let (coeffs, constant) = row.split_at(n_in.min(row.len()));
                AffineExpr::linear(coeffs, constant.first().copied().unwrap_or(0), 0)
            })
            .collect();
        Self::from_outputs(n_in, outputs)
    }

    /// Attach the statement name.
    pub fn with_tuple(mut self, tuple: impl Into<String>) -> Self {
        self.space.in_tuple = Some(tuple.into());
        self
    }

    /// Statement name.
    pub fn tuple_name(&self) -> &str {
        self.space.in_tuple_name()
    }

    /// Get input dimensions.
    pub fn n_in(&self) -> usize {
        self.space.n_in
    }

    /// Get output dimensions.
    pub fn n_out(&self) -> usize {
        self.outputs.len()
    }

    /// Get number of parameters.
    pub fn n_param(&self) -> usize {
        self.space.n_param
    }

    /// Output expression `k`.
    pub fn member(&self, k: usize) -> Option<&AffineExpr> {
        self.outputs.get(k)
    }

    /// Apply the map to a point.
    pub fn apply(&self, input: &[i64], params: &[i64]) -> Vec<i64> {
        self.outputs
            .iter()
            .map(|expr| expr.evaluate(input, params))
            .collect()
    }

    /// Compose two maps: `self` after `other`.
    ///
    /// Returns `None` when the dimensions do not line up.
    pub fn compose(&self, other: &AffineMap) -> Option<AffineMap> {
        if self.n_in() != other.n_out() {
            return None;
        }
        let n_in = other.n_in();
        // first move self's inputs to fresh positions after other's inputs
        let fresh: Vec<usize> = (0..self.n_in()).map(|k| n_in + k).collect();
        let outputs = self
            .outputs
            .iter()
            .map(|out| {
                let mut expr = out.remap(n_in + self.n_in(), &fresh);
                for (k, inner) in other.outputs.iter().enumerate() {
                    let widened = inner.remap(n_in + self.n_in(), &(0..n_in).collect::<Vec<_>>());
                    expr = expr.substitute(n_in + k, &widened);
                }
                expr.remap(n_in, &(0..n_in).collect::<Vec<_>>())
            })
            .collect();
        let mut map = AffineMap::from_outputs(n_in, outputs);
        map.space.in_tuple = other.space.in_tuple.clone();
        Some(map)
    }

    /// The leading `n` members.
    pub fn prefix(&self, n: usize) -> AffineMap {
        self.select(0..n.min(self.n_out()))
    }

    /// The members from `pos` on.
    pub fn suffix(&self, pos: usize) -> AffineMap {
        self.select(pos.min(self.n_out())..self.n_out())
    }

    fn select(&self, range: std::ops::Range<usize>) -> AffineMap {
        let mut map = self.clone();
        map.outputs = self.outputs[range].to_vec();
        map.space.n_dim = map.outputs.len();
        map
    }

    /// Tile-loop expression of member `k`: `floor(s/S)`, or `S*floor(s/S)` when scaled.
    pub fn tile_member(&self, k: usize, size: i64, scale: bool) -> Option<AffineExpr> {
        let quotient = self.member(k)?.floor_div(size);
        Some(if scale { quotient.scale(size) } else { quotient })
    }

    /// Point-loop expression of member `k`: `s`, or `s - S*floor(s/S)` when shifted.
    pub fn point_member(&self, k: usize, size: i64, shift: bool) -> Option<AffineExpr> {
        let s = self.member(k)?;
        Some(if shift { s.modulo(size) } else { s.clone() })
    }

    /// Tile and point maps for the given per-member sizes.
    pub fn tile(&self, sizes: &[i64], scale: bool, shift: bool) -> Option<(AffineMap, AffineMap)> {
        if sizes.len() < self.n_out() {
            return None;
        }
        let mut tile = self.clone();
        let mut point = self.clone();
        for (k, &size) in sizes.iter().enumerate().take(self.n_out()) {
            tile.outputs[k] = self.tile_member(k, size, scale)?;
            point.outputs[k] = self.point_member(k, size, shift)?;
        }
        Some((tile, point))
    }

    /// Image of the statement's instances in `domain`, tagged with `tuple`.
    pub fn image(&self, domain: &UnionSet, params: &[i64], tuple: &str) -> UnionSet {
        domain
            .restrict_tuple(self.tuple_name())
            .iter()
            .map(|inst| Instance::new(tuple, self.apply(&inst.coords, params)))
            .collect()
    }

    /// Render with named iteration variables.
    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let outs: Vec<String> = self
            .outputs
            .iter()
            .map(|e| e.to_string_with_names(dim_names, param_names))
            .collect();
        format!("{}[{}] -> [{}]", self.tuple_name(), dim_names.join(", "), outs.join(", "))
    }
}

impl fmt::Display for AffineMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dim_names: Vec<String> = (0..self.n_in()).map(|i| format!("i{}", i)).collect();
        let param_names = self.space.all_param_names();
        write!(f, "{{ {} }}", self.to_string_with_names(&dim_names, &param_names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let map = AffineMap::identity(3);
        assert_eq!(map.apply(&[1, 2, 3], &[]), vec![1, 2, 3]);
    }

    #[test]
    fn test_compose_skew() {
        // skew [t, i] -> [t, t + i], then shift the second member by one
        let skew = AffineMap::from_rows(2, &[&[1, 0, 0], &[1, 1, 0]]);
        let shift = AffineMap::from_rows(2, &[&[1, 0, 0], &[0, 1, 1]]);
        let composed = shift.compose(&skew).unwrap();
        assert_eq!(composed.apply(&[3, 4], &[]), vec![3, 8]);
        assert!(skew.compose(&AffineMap::identity(3)).is_none());
    }

    #[test]
    fn test_compose_keeps_floor_terms() {
        let skew = AffineMap::from_rows(2, &[&[1, 0, 0], &[1, 1, 0]]);
        let (tile, _) = AffineMap::identity(2).tile(&[4, 4], false, true).unwrap();
        let composed = tile.compose(&skew).unwrap();
        assert_eq!(composed.apply(&[5, 6], &[]), vec![1, 2]);
    }

    #[test]
    fn test_tile_members() {
        let sched = AffineMap::from_rows(2, &[&[1, 0, 0], &[1, 1, 0]]).with_tuple("S");
        let (tile, point) = sched.tile(&[4, 4], true, true).unwrap();
        // [t, i] = [5, 6] -> schedule [5, 11]
        assert_eq!(tile.apply(&[5, 6], &[]), vec![4, 8]);
        assert_eq!(point.apply(&[5, 6], &[]), vec![1, 3]);
        let (tile, point) = sched.tile(&[4, 4], false, false).unwrap();
        assert_eq!(tile.apply(&[5, 6], &[]), vec![1, 2]);
        assert_eq!(point.apply(&[5, 6], &[]), vec![5, 11]);
        assert!(sched.tile(&[4], true, true).is_none());
    }

    #[test]
    fn test_prefix_suffix() {
        let sched = AffineMap::identity(3);
        assert_eq!(sched.prefix(2).n_out(), 2);
        assert_eq!(sched.suffix(2).apply(&[1, 2, 3], &[]), vec![3]);
    }
}
