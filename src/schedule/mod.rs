//! Schedule trees and the structural operations that rewrite them.

pub mod options;
pub mod tree;
pub mod surgeon;

pub use options::TileOptions;
pub use tree::{Band, Filter, NodePath, Schedule, ScheduleNode};
pub use surgeon::{split_band, tile_band};
