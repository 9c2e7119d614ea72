//! Utility modules.
//!
//! - Error types and diagnostics
//! - Polyhedral and schedule-tree printing

pub mod errors;
pub mod poly_print;

// Re-exports
pub use errors::*;
pub use poly_print::{print_domain, print_schedule, print_scop, visualize_phases, PolyPrinter};
