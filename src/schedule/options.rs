//! Tiling options threaded explicitly through the surgeon.

use serde::{Deserialize, Serialize};

/// How `tile` shapes the tile and point members of a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileOptions {
    /// Tile member is `S*floor(s/S)` instead of `floor(s/S)`
    pub scale_tile_loops: bool,
    /// Point member is `s - S*floor(s/S)` instead of `s`
    pub shift_point_loops: bool,
}

impl Default for TileOptions {
    fn default() -> Self {
        Self {
            scale_tile_loops: true,
            shift_point_loops: true,
        }
    }
}

impl TileOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set tile-loop scaling.
    pub fn with_scale_tile_loops(mut self, scale: bool) -> Self {
        self.scale_tile_loops = scale;
        self
    }

    /// Set point-loop shifting. Returns a copy, so an override stays scoped.
    pub fn with_shift_point_loops(mut self, shift: bool) -> Self {
        self.shift_point_loops = shift;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_is_a_copy() {
        let caller = TileOptions::default();
        let scoped = caller.with_shift_point_loops(false);
        assert!(caller.shift_point_loops);
        assert!(!scoped.shift_point_loops);
        assert!(scoped.scale_tile_loops);
    }
}
