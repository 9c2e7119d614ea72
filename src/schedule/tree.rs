//! Schedule trees.
//!
//! A [`Schedule`] owns the statement instances it orders and a tree of
//! nodes below them. Nodes are addressed by a [`NodePath`], the child
//! indices taken from the root.

use crate::polyhedral::{AffineMap, Instance, UnionMap, UnionSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Child indices from the root to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodePath(pub Vec<usize>);

impl NodePath {
    /// The root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path of child `i`.
    pub fn child(&self, i: usize) -> Self {
        let mut p = self.0.clone();
        p.push(i);
        Self(p)
    }

    /// Path of the parent, `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.0.split_last()?;
        Some(Self(init.to_vec()))
    }

    /// Distance from the root.
    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for i in &self.0 {
            write!(f, "/{}", i)?;
        }
        Ok(())
    }
}

/// A band: one or more schedule members shared by its statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    /// Partial schedule, one map per statement
    pub schedule: BTreeMap<String, AffineMap>,
    /// Per-member "carries no dependence" flags
    pub coincident: Vec<bool>,
    /// Members may be freely permuted
    pub permutable: bool,
    /// The subtree below
    pub child: Box<ScheduleNode>,
}

impl Band {
    /// A band over `schedule` with no flags set and a leaf below.
    pub fn new(schedule: BTreeMap<String, AffineMap>) -> Self {
        let n = schedule.values().map(|m| m.n_out()).max().unwrap_or(0);
        Self {
            schedule,
            coincident: vec![false; n],
            permutable: false,
            child: Box::new(ScheduleNode::Leaf),
        }
    }

    /// Number of members.
    pub fn n_member(&self) -> usize {
        self.coincident.len()
    }

    /// Schedule values of one instance, `None` for a foreign statement.
    pub fn values(&self, inst: &Instance, params: &[i64]) -> Option<Vec<i64>> {
        self.schedule
            .get(&inst.tuple)
            .map(|m| m.apply(&inst.coords, params))
    }

    /// The band restricted to members `[from, to)`.
    pub fn members(&self, from: usize, to: usize) -> Band {
        let to = to.min(self.n_member());
        let from = from.min(to);
        Band {
            schedule: self
                .schedule
                .iter()
                .map(|(s, m)| (s.clone(), m.suffix(from).prefix(to - from)))
                .collect(),
            coincident: self.coincident[from..to].to_vec(),
            permutable: self.permutable,
            child: self.child.clone(),
        }
    }
}

/// A filter: only the listed instances continue below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Instances passing the filter
    pub filter: UnionSet,
    /// The subtree below
    pub child: Box<ScheduleNode>,
}

/// A node of the schedule tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleNode {
    /// A band of schedule members
    Band(Band),
    /// Children executed in order; every child is a filter
    Sequence(Vec<ScheduleNode>),
    /// A filter
    Filter(Filter),
    /// Each instance reaching the node is replaced by its expansion image
    Expansion {
        /// Expanded instance to contracted instance
        contraction: UnionMap,
        /// Contracted instance to expanded instances
        expansion: UnionMap,
        /// The subtree below
        child: Box<ScheduleNode>,
    },
    /// Statement execution
    Leaf,
}

impl ScheduleNode {
    /// Short kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            ScheduleNode::Band(_) => "band",
            ScheduleNode::Sequence(_) => "sequence",
            ScheduleNode::Filter(_) => "filter",
            ScheduleNode::Expansion { .. } => "expansion",
            ScheduleNode::Leaf => "leaf",
        }
    }

    /// Number of children.
    pub fn n_children(&self) -> usize {
        match self {
            ScheduleNode::Sequence(children) => children.len(),
            ScheduleNode::Leaf => 0,
            _ => 1,
        }
    }

    /// Child `i`.
    pub fn child(&self, i: usize) -> Option<&ScheduleNode> {
        match self {
            ScheduleNode::Band(b) if i == 0 => Some(&*b.child),
            ScheduleNode::Filter(f) if i == 0 => Some(&*f.child),
            ScheduleNode::Expansion { child, .. } if i == 0 => Some(&**child),
            ScheduleNode::Sequence(children) => children.get(i),
            _ => None,
        }
    }

    pub(crate) fn child_mut(&mut self, i: usize) -> Option<&mut ScheduleNode> {
        match self {
            ScheduleNode::Band(b) if i == 0 => Some(&mut *b.child),
            ScheduleNode::Filter(f) if i == 0 => Some(&mut *f.child),
            ScheduleNode::Expansion { child, .. } if i == 0 => Some(&mut **child),
            ScheduleNode::Sequence(children) => children.get_mut(i),
            _ => None,
        }
    }

    /// The band, if this is one.
    pub fn as_band(&self) -> Option<&Band> {
        match self {
            ScheduleNode::Band(b) => Some(b),
            _ => None,
        }
    }

    /// Instances reaching the leaves of this subtree, starting from `set`.
    pub fn leaf_instances(&self, set: &UnionSet) -> UnionSet {
        match self {
            ScheduleNode::Leaf => set.clone(),
            ScheduleNode::Band(b) => b.child.leaf_instances(set),
            ScheduleNode::Filter(f) => f.child.leaf_instances(&set.intersect(&f.filter)),
            ScheduleNode::Sequence(children) => children
                .iter()
                .fold(UnionSet::new(), |acc, c| acc.union(&c.leaf_instances(set))),
            ScheduleNode::Expansion { expansion, child, .. } => {
                child.leaf_instances(&set.apply(expansion))
            }
        }
    }

    /// Instances reaching the leaves, counted once per leaf reached.
    ///
    /// Unlike [`leaf_instances`](Self::leaf_instances) this sees an instance
    /// executed by two sequence children twice.
    pub fn leaf_count(&self, set: &UnionSet) -> usize {
        match self {
            ScheduleNode::Leaf => set.len(),
            ScheduleNode::Band(b) => b.child.leaf_count(set),
            ScheduleNode::Filter(f) => f.child.leaf_count(&set.intersect(&f.filter)),
            ScheduleNode::Sequence(children) => {
                children.iter().map(|c| c.leaf_count(set)).sum()
            }
            ScheduleNode::Expansion { expansion, child, .. } => set
                .iter()
                .map(|anchor| {
                    let slice: UnionSet = expansion.image(anchor).cloned().collect();
                    child.leaf_count(&slice)
                })
                .sum(),
        }
    }
}

/// A schedule tree together with the instances it schedules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// All statement instances
    pub domain: UnionSet,
    /// Parameter values the domain was materialized with
    pub params: Vec<i64>,
    /// Top node
    pub root: ScheduleNode,
}

impl Schedule {
    /// A schedule whose root is a single band.
    pub fn from_band(domain: UnionSet, params: Vec<i64>, band: Band) -> Self {
        Self { domain, params, root: ScheduleNode::Band(band) }
    }

    /// The node at `path`.
    pub fn node(&self, path: &NodePath) -> Option<&ScheduleNode> {
        path.0.iter().try_fold(&self.root, |node, &i| node.child(i))
    }

    pub(crate) fn node_mut(&mut self, path: &NodePath) -> Option<&mut ScheduleNode> {
        path.0.iter().try_fold(&mut self.root, |node, &i| node.child_mut(i))
    }

    /// The band at `path`.
    pub fn band(&self, path: &NodePath) -> Option<&Band> {
        self.node(path).and_then(ScheduleNode::as_band)
    }

    /// Parent of the node at `path`, if both exist.
    pub fn parent(&self, path: &NodePath) -> Option<NodePath> {
        self.node(path)?;
        path.parent()
    }

    /// Child `i` of the node at `path`, if it exists.
    pub fn child(&self, path: &NodePath, i: usize) -> Option<NodePath> {
        self.node(path)?.child(i)?;
        Some(path.child(i))
    }

    /// First band strictly below `path`, skipping filters and expansions.
    pub fn first_band_below(&self, path: &NodePath) -> Option<NodePath> {
        let mut current = self.child(path, 0)?;
        loop {
            match self.node(&current)? {
                ScheduleNode::Band(_) => return Some(current),
                ScheduleNode::Filter(_) | ScheduleNode::Expansion { .. } => {
                    current = current.child(0);
                }
                _ => return None,
            }
        }
    }

    /// Instances reaching the node at `path`.
    pub fn instances_at(&self, path: &NodePath) -> Option<UnionSet> {
        let mut set = self.domain.clone();
        let mut node = &self.root;
        for &i in &path.0 {
            match node {
                ScheduleNode::Filter(f) => set = set.intersect(&f.filter),
                ScheduleNode::Expansion { expansion, .. } => set = set.apply(expansion),
                _ => {}
            }
            node = node.child(i)?;
        }
        Some(set)
    }

    /// Values of every band and sequence position above `path` for `inst`.
    pub fn outer_values(&self, path: &NodePath, inst: &Instance) -> Option<Vec<i64>> {
        let mut values = Vec::new();
        let mut node = &self.root;
        for &i in &path.0 {
            match node {
                ScheduleNode::Band(b) => values.extend(b.values(inst, &self.params)?),
                ScheduleNode::Sequence(_) => values.push(i as i64),
                _ => {}
            }
            node = node.child(i)?;
        }
        Some(values)
    }

    /// Position of `inst` in the execution order: the band values and
    /// sequence positions on the way from the root to its leaf.
    ///
    /// `None` for an instance no leaf executes, and below an expansion,
    /// where one instance may run in several tiles.
    pub fn execution_key(&self, inst: &Instance) -> Option<Vec<i64>> {
        let mut key = Vec::new();
        let mut node = &self.root;
        loop {
            node = match node {
                ScheduleNode::Leaf => return Some(key),
                ScheduleNode::Band(b) => {
                    key.extend(b.values(inst, &self.params)?);
                    &*b.child
                }
                ScheduleNode::Filter(f) => {
                    if !f.filter.contains(inst) {
                        return None;
                    }
                    &*f.child
                }
                ScheduleNode::Sequence(children) => {
                    let pos = children.iter().position(|c| match c {
                        ScheduleNode::Filter(f) => f.filter.contains(inst),
                        _ => true,
                    })?;
                    key.push(pos as i64);
                    &children[pos]
                }
                ScheduleNode::Expansion { .. } => return None,
            };
        }
    }

    /// First pair of `deps` whose target does not run strictly after its
    /// source. Pairs without an [`execution_key`](Self::execution_key) are
    /// skipped.
    pub fn first_unordered<'a>(&self, deps: &'a UnionMap) -> Option<&'a (Instance, Instance)> {
        deps.iter().find(|(src, dst)| match (self.execution_key(src), self.execution_key(dst)) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        })
    }

    /// Instances reaching the leaves of the whole tree.
    pub fn leaf_instances(&self) -> UnionSet {
        self.root.leaf_instances(&self.domain)
    }

    /// Number of executions, counting redundant ones.
    pub fn leaf_count(&self) -> usize {
        self.root.leaf_count(&self.domain)
    }

    /// Paths of all nodes in pre-order.
    pub fn paths(&self) -> Vec<NodePath> {
        fn walk(node: &ScheduleNode, path: NodePath, out: &mut Vec<NodePath>) {
            out.push(path.clone());
            for i in 0..node.n_children() {
                if let Some(c) = node.child(i) {
                    walk(c, path.child(i), out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.root, NodePath::root(), &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Schedule {
        let domain: UnionSet = (0..3)
            .flat_map(|t| (0..4).map(move |i| Instance::new("S", vec![t, i])))
            .collect();
        let mut sched = BTreeMap::new();
        sched.insert("S".to_string(), AffineMap::identity(2).with_tuple("S"));
        Schedule::from_band(domain, Vec::new(), Band::new(sched))
    }

    #[test]
    fn test_navigation() {
        let s = small();
        let root = NodePath::root();
        assert_eq!(s.node(&root).map(|n| n.kind()), Some("band"));
        assert_eq!(s.child(&root, 0), Some(root.child(0)));
        assert_eq!(s.child(&root, 1), None);
        assert_eq!(s.parent(&root.child(0)), Some(root.clone()));
        assert_eq!(s.parent(&root), None);
        assert!(s.first_band_below(&root).is_none());
        assert_eq!(root.child(0).child(2).to_string(), "/0/2");
    }

    #[test]
    fn test_leaf_instances_is_domain() {
        let s = small();
        assert_eq!(s.leaf_instances(), s.domain);
        assert_eq!(s.leaf_count(), 12);
        assert_eq!(s.paths().len(), 2);
    }

    #[test]
    fn test_execution_key_follows_sequence() {
        let mut s = small();
        let early: UnionSet = (0..4).map(|i| Instance::new("S", vec![2, i])).collect();
        let late = s.domain.subtract(&early);
        s.insert_sequence(&NodePath::root(), vec![early, late]).unwrap();

        let first = Instance::new("S", vec![2, 3]);
        let second = Instance::new("S", vec![0, 0]);
        assert_eq!(s.execution_key(&first), Some(vec![0, 2, 3]));
        assert_eq!(s.execution_key(&second), Some(vec![1, 0, 0]));
        assert_eq!(s.execution_key(&Instance::new("S", vec![5, 0])), None);

        let mut deps = UnionMap::new();
        deps.insert(first.clone(), Instance::new("S", vec![2, 4]));
        deps.insert(Instance::new("S", vec![1, 1]), Instance::new("S", vec![1, 2]));
        assert!(s.first_unordered(&deps).is_none());
        // row 2 runs before row 0
        deps.insert(second.clone(), Instance::new("S", vec![2, 0]));
        assert_eq!(s.first_unordered(&deps).map(|(src, _)| src), Some(&second));
    }

    #[test]
    fn test_band_members() {
        let s = small();
        let band = s.band(&NodePath::root()).unwrap();
        assert_eq!(band.n_member(), 2);
        let inner = band.members(1, 2);
        assert_eq!(inner.n_member(), 1);
        let inst = Instance::new("S", vec![2, 3]);
        assert_eq!(inner.values(&inst, &[]), Some(vec![3]));
        assert_eq!(band.values(&Instance::new("T", vec![0]), &[]), None);
    }
}
