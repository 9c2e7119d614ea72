//! Structural rewrites of schedule trees.
//!
//! Every operation validates its input first and replaces the addressed
//! node only once the new subtree is complete, so a failed call leaves the
//! tree untouched.

use crate::polyhedral::{UnionMap, UnionSet};
use crate::schedule::options::TileOptions;
use crate::schedule::tree::{Band, Filter, NodePath, Schedule, ScheduleNode};
use crate::utils::errors::{TransformError, TransformErrorKind};
use log::debug;

/// Tile a band: a tile band over `floor(s/S)` members with a point band below.
pub fn tile_band(band: &Band, sizes: &[i64], options: TileOptions) -> Result<Band, TransformError> {
    let n = band.n_member();
    if sizes.len() < n {
        return Err(TransformError::new(
            TransformErrorKind::InvalidTileSize,
            "tile",
            format!("{} tile sizes for a band of {} members", sizes.len(), n),
        ));
    }
    if let Some(bad) = sizes.iter().take(n).find(|&&s| s <= 0) {
        return Err(TransformError::new(
            TransformErrorKind::InvalidTileSize,
            "tile",
            format!("tile size {} is not positive", bad),
        ));
    }

    let mut tile = band.schedule.clone();
    let mut point = band.schedule.clone();
    for (stmt, map) in &band.schedule {
        let (t, p) = map
            .tile(&sizes[..n], options.scale_tile_loops, options.shift_point_loops)
            .ok_or_else(|| {
                TransformError::malformed("tile", format!("schedule of {} is not {}-dimensional", stmt, n))
            })?;
        tile.insert(stmt.clone(), t);
        point.insert(stmt.clone(), p);
    }

    let point_band = Band {
        schedule: point,
        coincident: band.coincident.clone(),
        permutable: band.permutable,
        child: band.child.clone(),
    };
    Ok(Band {
        schedule: tile,
        coincident: band.coincident.clone(),
        permutable: band.permutable,
        child: Box::new(ScheduleNode::Band(point_band)),
    })
}

/// Split a band after member `pos`.
pub fn split_band(band: &Band, pos: usize) -> Result<Band, TransformError> {
    let n = band.n_member();
    if pos == 0 || pos >= n {
        return Err(TransformError::malformed(
            "split",
            format!("cannot split a band of {} members at {}", n, pos),
        ));
    }
    let mut outer = band.members(0, pos);
    let inner = band.members(pos, n);
    outer.child = Box::new(ScheduleNode::Band(inner));
    Ok(outer)
}

impl Schedule {
    fn rewrite<F>(&mut self, path: &NodePath, what: &str, f: F) -> Result<(), TransformError>
    where
        F: FnOnce(&ScheduleNode) -> Result<ScheduleNode, TransformError>,
    {
        let node = self
            .node_mut(path)
            .ok_or_else(|| TransformError::malformed(what, format!("no node at {}", path)))?;
        let new = f(node)?;
        *node = new;
        debug!("{} at {}", what, path);
        Ok(())
    }

    fn expect_band<'a>(node: &'a ScheduleNode, what: &str) -> Result<&'a Band, TransformError> {
        node.as_band().ok_or_else(|| {
            TransformError::malformed(what, format!("expected a band node, found {}", node.kind()))
        })
    }

    /// Tile the band at `path`; the tile band stays at `path`.
    pub fn tile(&mut self, path: &NodePath, sizes: &[i64], options: TileOptions) -> Result<NodePath, TransformError> {
        self.rewrite(path, "tile", |node| {
            let band = Self::expect_band(node, "tile")?;
            Ok(ScheduleNode::Band(tile_band(band, sizes, options)?))
        })?;
        Ok(path.clone())
    }

    /// Split the band at `path` after member `pos`.
    pub fn split(&mut self, path: &NodePath, pos: usize) -> Result<NodePath, TransformError> {
        self.rewrite(path, "split", |node| {
            let band = Self::expect_band(node, "split")?;
            Ok(ScheduleNode::Band(split_band(band, pos)?))
        })?;
        Ok(path.clone())
    }

    /// Insert a sequence of filters at `path`; each filter gets a copy of the old subtree.
    pub fn insert_sequence(&mut self, path: &NodePath, filters: Vec<UnionSet>) -> Result<NodePath, TransformError> {
        if filters.is_empty() {
            return Err(TransformError::malformed("insert_sequence", "no filters"));
        }
        self.rewrite(path, "insert_sequence", |node| {
            let children = filters
                .into_iter()
                .map(|filter| {
                    ScheduleNode::Filter(Filter { filter, child: Box::new(node.clone()) })
                })
                .collect();
            Ok(ScheduleNode::Sequence(children))
        })?;
        Ok(path.clone())
    }

    /// Insert an expansion node at `path`.
    ///
    /// At an existing expansion the new one is nested inside it.
    pub fn insert_expansion(
        &mut self,
        path: &NodePath,
        contraction: UnionMap,
        expansion: UnionMap,
    ) -> Result<NodePath, TransformError> {
        let nested = match self.node(path) {
            Some(node) => matches!(node, ScheduleNode::Expansion { .. }),
            None => {
                return Err(TransformError::malformed("insert_expansion", format!("no node at {}", path)));
            }
        };
        if nested {
            return self.insert_expansion(&path.child(0), contraction, expansion);
        }
        self.rewrite(path, "insert_expansion", |node| {
            Ok(ScheduleNode::Expansion {
                contraction,
                expansion,
                child: Box::new(node.clone()),
            })
        })?;
        Ok(path.clone())
    }
}
