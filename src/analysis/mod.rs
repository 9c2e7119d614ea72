//! Analysis of the tiling input.
//!
//! - [`scop`]: the SCoP description (domains, flow dependences, schedule)
//! - [`dependence`]: distance, direction and slope summaries of flow pairs
//! - [`probe`]: the dependence probe driving split tiling

pub mod scop;
pub mod dependence;
pub mod probe;

pub use scop::{Parameter, Scop, Statement};
pub use dependence::{halo_coefficient, slope_range, Direction, DistanceSummary};
pub use probe::{time_dim_size, time_tiling, DependenceProbe, ProbeResult};
