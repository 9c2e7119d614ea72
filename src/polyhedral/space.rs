//! Spaces name the tuples that sets and relations live in.
//!
//! A space describes:
//! - Input dimensions (relations only)
//! - Output or set dimensions
//! - Parameter dimensions (symbolic constants)
//! - Tuple names (statement names)
//!
//! Expressions over a relation space index the input dimensions first,
//! followed by the output dimensions.

use serde::{Serialize, Deserialize};
use std::fmt;

/// Dimensions and tuple names of a set or relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Space {
    /// Number of set/output dimensions
    pub n_dim: usize,
    /// Number of parameter dimensions
    pub n_param: usize,
    /// Number of input dimensions (relations only)
    pub n_in: usize,
    /// Names of the variables, inputs first (optional, for printing)
    #[serde(default)]
    pub dim_names: Vec<String>,
    /// Names of parameters
    #[serde(default)]
    pub param_names: Vec<String>,
    /// Name of the set tuple, or of the range tuple of a relation
    #[serde(default)]
    pub tuple: Option<String>,
    /// Name of the domain tuple of a relation
    #[serde(default)]
    pub in_tuple: Option<String>,
}

impl Space {
    /// Anonymous set space of `n_dim` dimensions.
    pub fn set(n_dim: usize) -> Self {
        Self {
            n_dim,
            n_param: 0,
            n_in: 0,
            dim_names: Vec::new(),
            param_names: Vec::new(),
            tuple: None,
            in_tuple: None,
        }
    }

    /// Create a named set space, e.g. the domain space of statement `S`.
    pub fn named_set(tuple: impl Into<String>, n_dim: usize) -> Self {
        let mut space = Self::set(n_dim);
        space.tuple = Some(tuple.into());
        space
    }

    /// Anonymous relation space `[n_in] -> [n_out]`.
    pub fn map(n_in: usize, n_out: usize) -> Self {
        let mut space = Self::set(n_out);
        space.n_in = n_in;
        space
    }

    /// Create a map space between two named tuples.
    pub fn named_map(
        in_tuple: impl Into<String>,
        n_in: usize,
        out_tuple: impl Into<String>,
        n_out: usize,
    ) -> Self {
        let mut space = Self::map(n_in, n_out);
        space.in_tuple = Some(in_tuple.into());
        space.tuple = Some(out_tuple.into());
        space
    }

    /// True for relation spaces.
    pub fn is_map(&self) -> bool {
        self.n_in > 0 || self.in_tuple.is_some()
    }

    /// Number of set dimensions, or of range dimensions of a relation.
    pub fn dim(&self) -> usize {
        self.n_dim
    }

    /// Number of variables an expression over this space indexes.
    pub fn n_vars(&self) -> usize {
        self.n_in + self.n_dim
    }

    /// Set dimension names.
    pub fn with_dim_names(mut self, names: Vec<String>) -> Self {
        self.dim_names = names;
        self
    }

    /// Set parameter names.
    pub fn with_param_names(mut self, names: Vec<String>) -> Self {
        self.n_param = names.len();
        self.param_names = names;
        self
    }

    /// Tuple name of the set, or of the range of a relation.
    pub fn tuple_name(&self) -> &str {
        self.tuple.as_deref().unwrap_or("")
    }

    /// Tuple name of the domain of a relation.
    pub fn in_tuple_name(&self) -> &str {
        self.in_tuple.as_deref().unwrap_or("")
    }

    /// Variable names, `i{k}` for unnamed inputs and `o{k}` for unnamed outputs.
    pub fn all_dim_names(&self) -> Vec<String> {
        (0..self.n_vars())
            .map(|i| match self.dim_names.get(i) {
                Some(name) => name.clone(),
                None if i < self.n_in => format!("i{}", i),
                None => format!("o{}", i - self.n_in),
            })
            .collect()
    }

    /// Parameter names, `p{k}` for unnamed ones.
    pub fn all_param_names(&self) -> Vec<String> {
        (0..self.n_param)
            .map(|i| self.param_names.get(i).cloned().unwrap_or_else(|| format!("p{}", i)))
            .collect()
    }

    /// The domain space of a relation space.
    pub fn domain(&self) -> Space {
        let mut space = Space::set(self.n_in).with_param_names(self.param_names.clone());
        space.n_param = self.n_param;
        space.tuple = self.in_tuple.clone();
        space.dim_names = self.all_dim_names()[..self.n_in].to_vec();
        space
    }

    /// The range space of a relation space.
    pub fn range(&self) -> Space {
        let mut space = Space::set(self.n_dim).with_param_names(self.param_names.clone());
        space.n_param = self.n_param;
        space.tuple = self.tuple.clone();
        space.dim_names = self.all_dim_names()[self.n_in..].to_vec();
        space
    }

    /// Swap domain and range of a relation space.
    pub fn reverse(&self) -> Space {
        let names = self.all_dim_names();
        let (ins, outs) = names.split_at(self.n_in);
        Space {
            n_dim: self.n_in,
            n_param: self.n_param,
            n_in: self.n_dim,
            dim_names: outs.iter().chain(ins.iter()).cloned().collect(),
            param_names: self.param_names.clone(),
            tuple: self.in_tuple.clone(),
            in_tuple: self.tuple.clone(),
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_map() {
            write!(f, "{}[{}] -> {}[{}]",
                self.in_tuple_name(), self.n_in, self.tuple_name(), self.n_dim)?;
        } else {
            write!(f, "{}[{}]", self.tuple_name(), self.n_dim)?;
        }
        if self.n_param > 0 {
            write!(f, " : {} params", self.n_param)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_space() {
        let space = Space::named_set("S", 3);
        assert!(!space.is_map());
        assert_eq!(space.dim(), 3);
        assert_eq!(space.tuple_name(), "S");
    }

    #[test]
    fn test_map_space() {
        let space = Space::named_map("S", 2, "T", 3);
        assert!(space.is_map());
        assert_eq!(space.n_in, 2);
        assert_eq!(space.n_vars(), 5);
        assert_eq!(space.domain().tuple_name(), "S");
        assert_eq!(space.range().dim(), 3);
    }

    #[test]
    fn test_reverse_swaps_names() {
        let space = Space::named_map("S", 1, "T", 2)
            .with_dim_names(vec!["a".into(), "b".into(), "c".into()]);
        let rev = space.reverse();
        assert_eq!(rev.in_tuple_name(), "T");
        assert_eq!(rev.n_in, 2);
        assert_eq!(rev.all_dim_names(), vec!["b", "c", "a"]);
    }
}
