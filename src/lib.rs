//! # PolyTile - Split and Overlapped Tiling of Polyhedral Schedules
//!
//! Schedule-tree tiling for iterative stencils, including:
//! - A dependence probe that measures how far a flow dependence travels
//!   across time tiles
//! - Split tiling: each time tile becomes a sequence of disjoint phases,
//!   every phase free of cross-tile dependences
//! - Overlapped tiling: each tile recomputes a halo of the instances it
//!   reads, hung from an expansion node
//! - Plain parallelogram tiling as the fallback of both
//!
//! ## Architecture
//!
//! ```text
//! Scop → Schedule → Probe → Split / Overlap → Schedule Surgeon → Schedule tree
//!                                   ↘ parallel annotation ↗
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use polytile::prelude::*;
//!
//! let scop = kernels::heat_1d(10, 20);
//! let mut schedule = scop.schedule()?;
//! let config = TilingConfig::new().strategy(Strategy::Split).tile_sizes(vec![4, 4]);
//! let outcome = tile_band(&mut schedule, &NodePath::root(), &scop, &config)?;
//! assert_eq!(outcome.phases.len(), 2);
//! println!("{}", print_schedule(&schedule, &scop));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod polyhedral;
pub mod analysis;
pub mod schedule;
pub mod transform;
pub mod config;
pub mod kernels;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and functions.

    pub use crate::analysis::{DependenceProbe, ProbeResult, Scop, Statement};
    pub use crate::config::{Strategy, TilingConfig};
    pub use crate::kernels;
    pub use crate::polyhedral::{
        AffineExpr, AffineMap, BasicSet, Constraint, Instance, Space, UnionMap, UnionSet,
    };
    pub use crate::schedule::{Band, NodePath, Schedule, ScheduleNode, TileOptions};
    pub use crate::transform::{tile_band, HaloReport, TilingOutcome, TilingStrategy};
    pub use crate::utils::errors::{Diagnostic, DiagnosticSeverity, TileError, TileResult};
    pub use crate::utils::{print_schedule, print_scop, visualize_phases};
}

use analysis::Scop;
use config::TilingConfig;
use schedule::{NodePath, Schedule};
use transform::TilingOutcome;
use utils::errors::TileResult;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tile the outermost band of `scop`'s initial schedule.
///
/// Returns the transformed tree together with the outcome of the pass.
pub fn tile(scop: &Scop, config: &TilingConfig) -> TileResult<(Schedule, TilingOutcome)> {
    let mut schedule = scop.schedule()?;
    let root = NodePath::root();
    let path = match schedule.band(&root) {
        Some(_) => root,
        None => schedule.first_band_below(&root).unwrap_or(root),
    };
    let outcome = transform::tile_band(&mut schedule, &path, scop, config)?;
    Ok((schedule, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_tile_outermost_band() {
        let scop = kernels::heat_1d(6, 8);
        let config = TilingConfig::new().tile_sizes(vec![2, 4]);
        let (schedule, outcome) = tile(&scop, &config).unwrap();
        assert_eq!(outcome.path, NodePath::root());
        assert_eq!(schedule.leaf_instances(), scop.domain().unwrap());
    }
}
