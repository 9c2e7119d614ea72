//! Tiling configuration.

use crate::schedule::TileOptions;
use crate::utils::errors::{ConfigError, TileResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which tiling strategy `tile_band` applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Parallelogram tiling only
    #[default]
    Plain,
    /// Split tiling: a sequence of phases per time tile
    Split,
    /// Overlapped tiling: redundant halos per tile
    Overlapped {
        /// Number of leading space dimensions overlapped (1 or 2)
        multi_dim: usize,
    },
}

impl Strategy {
    /// Short name.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Plain => "plain",
            Strategy::Split => "split",
            Strategy::Overlapped { .. } => "overlapped",
        }
    }
}

/// Configuration of a tiling pass
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    /// Per-member tile sizes, time first; empty means `tile_size` everywhere
    pub tile_sizes: Vec<i64>,

    /// Tile size used for every member when `tile_sizes` is empty
    pub tile_size: i64,

    /// Strategy
    pub strategy: Strategy,

    /// Use one time tile spanning the whole time dimension (split tiling)
    pub min_sync: bool,

    /// Tile members are `S*floor(s/S)`
    pub scale_tile_loops: bool,

    /// Point members are `s mod S`
    pub shift_point_loops: bool,

    /// Insert the expansion below the first point member (overlapped tiling)
    pub after_mapping: bool,

    /// Maximum rounds of the transitive closure in the halo check
    pub closure_limit: usize,

    /// Return plain tiling when the halo check is inexact
    pub fallback_on_inexact: bool,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            tile_sizes: Vec::new(),
            tile_size: 32,
            strategy: Strategy::Plain,
            min_sync: false,
            scale_tile_loops: true,
            shift_point_loops: true,
            after_mapping: false,
            closure_limit: 64,
            fallback_on_inexact: false,
        }
    }
}

impl TilingConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set per-member tile sizes
    pub fn tile_sizes(mut self, sizes: Vec<i64>) -> Self {
        self.tile_sizes = sizes;
        self
    }

    /// Set the strategy
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Enable/disable minimal synchronization
    pub fn min_sync(mut self, on: bool) -> Self {
        self.min_sync = on;
        self
    }

    /// Enable/disable tile-loop scaling
    pub fn scale_tile_loops(mut self, on: bool) -> Self {
        self.scale_tile_loops = on;
        self
    }

    /// Enable/disable point-loop shifting
    pub fn shift_point_loops(mut self, on: bool) -> Self {
        self.shift_point_loops = on;
        self
    }

    /// Enable/disable expansion after the first point member
    pub fn after_mapping(mut self, on: bool) -> Self {
        self.after_mapping = on;
        self
    }

    /// Set the closure round limit
    pub fn closure_limit(mut self, rounds: usize) -> Self {
        self.closure_limit = rounds;
        self
    }

    /// Enable/disable the plain fallback on inexact closures
    pub fn fallback_on_inexact(mut self, on: bool) -> Self {
        self.fallback_on_inexact = on;
        self
    }

    /// The tile options the surgeon is called with
    pub fn options(&self) -> TileOptions {
        TileOptions::new()
            .with_scale_tile_loops(self.scale_tile_loops)
            .with_shift_point_loops(self.shift_point_loops)
    }

    /// Tile sizes for a band of `n_member` members
    pub fn sizes_for(&self, n_member: usize) -> Vec<i64> {
        if self.tile_sizes.is_empty() {
            vec![self.tile_size; n_member]
        } else {
            self.tile_sizes.clone()
        }
    }

    /// Reject sizes and limits no strategy can work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size <= 0 {
            return Err(ConfigError::new("tile_size", format!("tile size {} is not positive", self.tile_size)));
        }
        if let Some(bad) = self.tile_sizes.iter().find(|&&s| s <= 0) {
            return Err(ConfigError::new("tile_sizes", format!("tile size {} is not positive", bad)));
        }
        if let Strategy::Overlapped { multi_dim } = self.strategy {
            if !(1..=2).contains(&multi_dim) {
                return Err(ConfigError::new(
                    "strategy.overlapped.multi_dim",
                    format!("{} overlapped dimensions, expected 1 or 2", multi_dim),
                ));
            }
        }
        if self.closure_limit == 0 {
            return Err(ConfigError::new("closure_limit", "at least one round is needed"));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> TileResult<Self> {
        let config: TilingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> TileResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TilingConfig::default();
        assert_eq!(config.sizes_for(3), vec![32, 32, 32]);
        assert_eq!(config.options(), TileOptions::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = TilingConfig::from_json(
            r#"{ "tile_sizes": [4, 4], "strategy": { "overlapped": { "multi_dim": 2 } } }"#,
        )
        .unwrap();
        assert_eq!(config.sizes_for(2), vec![4, 4]);
        assert_eq!(config.strategy, Strategy::Overlapped { multi_dim: 2 });
        assert_eq!(config.closure_limit, 64);

        let split = TilingConfig::from_json(r#"{ "strategy": "split", "min_sync": true }"#).unwrap();
        assert_eq!(split.strategy, Strategy::Split);
        assert!(split.min_sync);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let err = TilingConfig::new().tile_sizes(vec![4, 0]).validate().unwrap_err();
        assert_eq!(err.field, "tile_sizes");
        let err = TilingConfig::new()
            .strategy(Strategy::Overlapped { multi_dim: 3 })
            .validate()
            .unwrap_err();
        assert!(err.field.contains("multi_dim"));
        assert!(TilingConfig::new().closure_limit(0).validate().is_err());
        assert!(TilingConfig::from_json(r#"{ "tile_size": -1 }"#).is_err());
    }

    #[test]
    fn test_options_follow_flags() {
        let options = TilingConfig::new().scale_tile_loops(false).options();
        assert!(!options.scale_tile_loops);
        assert!(options.shift_point_loops);
    }
}
