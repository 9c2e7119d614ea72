//! Polyhedral data structures and operations.
//!
//! This module provides the set-algebra facade the tiling algorithms run on:
//! - Quasi-affine expressions and constraints
//! - Basic sets and relations (symbolic)
//! - Union sets and union maps (explicit, under bound parameters)
//! - Affine maps (per-statement schedules)

pub mod space;
pub mod expr;
pub mod constraint;
pub mod set;
pub mod union_set;
pub mod union_map;
pub mod map;

pub use space::Space;
pub use expr::{AffineExpr, Interval};
pub use constraint::{Constraint, ConstraintKind, ConstraintSystem};
pub use set::BasicSet;
pub use union_set::{BoxPiece, Instance, UnionSet};
pub use union_map::{Closure, UnionMap};
pub use map::AffineMap;
