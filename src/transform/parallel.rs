//! Parallel-loop annotation of band members.
//!
//! A member is parallel when no dependence is carried by it: every
//! dependence pair that agrees on all enclosing schedule values (outer bands,
//! sequence positions, and the earlier members of the band itself) also
//! agrees on the member.

use crate::polyhedral::UnionMap;
use crate::schedule::{NodePath, Schedule, ScheduleNode};
use crate::utils::errors::TransformError;
use log::debug;

/// Whether member `member` of the band at `path` carries none of `deps`.
///
/// Only pairs whose both ends reach the band are considered.
pub fn is_member_parallel(schedule: &Schedule, path: &NodePath, member: usize, deps: &UnionMap) -> bool {
    let (Some(band), Some(reaching)) = (schedule.band(path), schedule.instances_at(path)) else {
        return false;
    };
    if member >= band.n_member() {
        return false;
    }
    let params = &schedule.params;
    deps.iter()
        .filter(|(p, q)| reaching.contains(p) && reaching.contains(q))
        .all(|(p, q)| {
            if schedule.outer_values(path, p) != schedule.outer_values(path, q) {
                return true;
            }
            match (band.values(p, params), band.values(q, params)) {
                (Some(a), Some(b)) => a[..member] != b[..member] || a[member] == b[member],
                _ => true,
            }
        })
}

/// Set the coincident flags of the band at `path` from `deps`.
pub fn annotate_parallel(
    schedule: &mut Schedule,
    path: &NodePath,
    deps: &UnionMap,
) -> Result<Vec<bool>, TransformError> {
    let n = schedule
        .band(path)
        .map(|b| b.n_member())
        .ok_or_else(|| TransformError::malformed("annotate_parallel", format!("no band at {}", path)))?;
    let flags: Vec<bool> = (0..n).map(|k| is_member_parallel(schedule, path, k, deps)).collect();
    if let Some(ScheduleNode::Band(band)) = schedule.node_mut(path) {
        band.coincident = flags.clone();
    }
    debug!("band at {} coincident {:?}", path, flags);
    Ok(flags)
}
