//! Explicit union sets: finite sets of statement instances.

use crate::polyhedral::union_map::UnionMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One dynamic instance of a named statement, e.g. `S[3, 7]`.
///
/// Instances order by statement name first, then lexicographically by
/// coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instance {
    /// Statement name
    pub tuple: String,
    /// Integer coordinates
    pub coords: Vec<i64>,
}

impl Instance {
    /// Create an instance.
    pub fn new(tuple: impl Into<String>, coords: Vec<i64>) -> Self {
        Self { tuple: tuple.into(), coords }
    }

    /// The smallest instance in the ordering.
    pub fn min_value() -> Self {
        Self { tuple: String::new(), coords: Vec::new() }
    }

    /// Number of coordinates.
    pub fn dim(&self) -> usize {
        self.coords.len()
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.tuple)?;
        for (i, c) in self.coords.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "]")
    }
}

/// An axis-aligned box of points of one statement, bounds inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxPiece {
    /// Statement name
    pub tuple: String,
    /// Lower corner
    pub lo: Vec<i64>,
    /// Upper corner
    pub hi: Vec<i64>,
}

impl BoxPiece {
    /// Number of points in the box.
    pub fn len(&self) -> usize {
        self.lo
            .iter()
            .zip(&self.hi)
            .map(|(l, h)| (h - l + 1).max(0) as usize)
            .product()
    }

    /// Always false: a piece holds at least its seed point.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render with the given dimension names.
    pub fn to_string_with_names(&self, names: &[String]) -> String {
        let name = |k: usize| names.get(k).cloned().unwrap_or_else(|| format!("i{}", k));
        let vars: Vec<String> = (0..self.lo.len()).map(name).collect();
        let ranges: Vec<String> = (0..self.lo.len())
            .map(|k| {
                if self.lo[k] == self.hi[k] {
                    format!("{} = {}", vars[k], self.lo[k])
                } else {
                    format!("{} <= {} <= {}", self.lo[k], vars[k], self.hi[k])
                }
            })
            .collect();
        if ranges.is_empty() {
            format!("{}[]", self.tuple)
        } else {
            format!("{}[{}] : {}", self.tuple, vars.join(", "), ranges.join(" and "))
        }
    }
}

impl fmt::Display for BoxPiece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_names(&[]))
    }
}

/// A finite set of instances, possibly of several statements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnionSet {
    instances: BTreeSet<Instance>,
}

impl UnionSet {
    /// The empty union set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// No instances.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Membership test.
    pub fn contains(&self, instance: &Instance) -> bool {
        self.instances.contains(instance)
    }

    /// Add one instance.
    pub fn insert(&mut self, instance: Instance) -> bool {
        self.instances.insert(instance)
    }

    /// Iterate in order.
    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter()
    }

    /// Set union.
    pub fn union(&self, other: &UnionSet) -> UnionSet {
        self.instances.union(&other.instances).cloned().collect()
    }

    /// Set intersection.
    pub fn intersect(&self, other: &UnionSet) -> UnionSet {
        self.instances.intersection(&other.instances).cloned().collect()
    }

    /// Set difference.
    pub fn subtract(&self, other: &UnionSet) -> UnionSet {
        self.instances.difference(&other.instances).cloned().collect()
    }

    /// Every instance of `self` is in `other`.
    pub fn is_subset(&self, other: &UnionSet) -> bool {
        self.instances.is_subset(&other.instances)
    }

    /// No instance in common.
    pub fn is_disjoint(&self, other: &UnionSet) -> bool {
        self.instances.is_disjoint(&other.instances)
    }

    /// Keep the instances satisfying `pred`.
    pub fn filter(&self, pred: impl Fn(&Instance) -> bool) -> UnionSet {
        self.instances.iter().filter(|i| pred(i)).cloned().collect()
    }

    /// Statement names present, in order.
    pub fn tuples(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for inst in &self.instances {
            if names.last() != Some(&inst.tuple) {
                names.push(inst.tuple.clone());
            }
        }
        names
    }

    /// The instances of statement `tuple`.
    pub fn restrict_tuple(&self, tuple: &str) -> UnionSet {
        self.tuple_range(tuple).cloned().collect()
    }

    fn tuple_range<'a>(&'a self, tuple: &str) -> impl Iterator<Item = &'a Instance> + 'a {
        let start = Instance::new(tuple, Vec::new());
        let name = start.tuple.clone();
        self.instances
            .range(start..)
            .take_while(move |i| i.tuple == name)
    }

    /// Lexicographic minimum among the instances of `tuple`.
    pub fn lexmin(&self, tuple: &str) -> Option<&Instance> {
        self.tuple_range(tuple).next()
    }

    /// Lexicographic maximum among the instances of `tuple`.
    pub fn lexmax(&self, tuple: &str) -> Option<&Instance> {
        self.tuple_range(tuple).last()
    }

    /// Any instance; the smallest one.
    pub fn sample(&self) -> Option<&Instance> {
        self.instances.iter().next()
    }

    /// Image under a relation.
    pub fn apply(&self, map: &UnionMap) -> UnionSet {
        let mut out = UnionSet::new();
        for inst in &self.instances {
            for img in map.image(inst) {
                out.insert(img.clone());
            }
        }
        out
    }

    /// Greedy cover by maximal boxes, per statement.
    ///
    /// Seeds are taken in lexicographic order and each box is grown along the
    /// innermost dimension first.
    pub fn coalesce(&self) -> Vec<BoxPiece> {
        let mut by_tuple: BTreeMap<&str, BTreeSet<&[i64]>> = BTreeMap::new();
        for inst in &self.instances {
            by_tuple.entry(&inst.tuple).or_default().insert(&inst.coords);
        }

        let mut pieces = Vec::new();
        for (tuple, points) in by_tuple {
            let mut covered: BTreeSet<Vec<i64>> = BTreeSet::new();
            for &seed in &points {
                if covered.contains(seed) {
                    continue;
                }
                let lo = seed.to_vec();
                let mut hi = seed.to_vec();
                for k in (0..seed.len()).rev() {
                    loop {
                        let mut layer_lo = lo.clone();
                        let mut layer_hi = hi.clone();
                        layer_lo[k] = hi[k] + 1;
                        layer_hi[k] = hi[k] + 1;
                        let free = box_points(&layer_lo, &layer_hi)
                            .iter()
                            .all(|p| points.contains(p.as_slice()) && !covered.contains(p));
                        if !free {
                            break;
                        }
                        hi[k] += 1;
                    }
                }
                covered.extend(box_points(&lo, &hi));
                pieces.push(BoxPiece { tuple: tuple.to_string(), lo, hi });
            }
        }
        pieces
    }
}

/// All points of the inclusive box `[lo, hi]`, lexicographically.
fn box_points(lo: &[i64], hi: &[i64]) -> Vec<Vec<i64>> {
    let mut points = vec![Vec::with_capacity(lo.len())];
    for (&l, &h) in lo.iter().zip(hi) {
        points = points
            .into_iter()
            .flat_map(|p| {
                (l..=h).map(move |v| {
                    let mut q = p.clone();
                    q.push(v);
                    q
                })
            })
            .collect();
    }
    points
}

impl FromIterator<Instance> for UnionSet {
    fn from_iter<I: IntoIterator<Item = Instance>>(iter: I) -> Self {
        Self { instances: iter.into_iter().collect() }
    }
}

impl Extend<Instance> for UnionSet {
    fn extend<I: IntoIterator<Item = Instance>>(&mut self, iter: I) {
        self.instances.extend(iter);
    }
}

impl<'a> IntoIterator for &'a UnionSet {
    type Item = &'a Instance;
    type IntoIter = std::collections::btree_set::Iter<'a, Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.instances.iter()
    }
}

impl fmt::Display for UnionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pieces: Vec<String> = self.coalesce().iter().map(|p| p.to_string()).collect();
        write!(f, "{{ {} }}", pieces.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(tuple: &str, n: i64, m: i64) -> UnionSet {
        (0..n)
            .flat_map(|i| (0..m).map(move |j| Instance::new(tuple, vec![i, j])))
            .collect()
    }

    #[test]
    fn test_set_operations() {
        let a = grid("S", 2, 3);
        let b = grid("S", 3, 2);
        assert_eq!(a.intersect(&b).len(), 4);
        assert_eq!(a.union(&b).len(), 8);
        assert_eq!(a.subtract(&b).len(), 2);
        assert!(a.intersect(&b).is_subset(&a));
        assert!(a.subtract(&b).is_disjoint(&b));
    }

    #[test]
    fn test_lexmin_per_tuple() {
        let u = grid("S", 2, 2).union(&grid("T", 3, 1));
        assert_eq!(u.tuples(), vec!["S".to_string(), "T".to_string()]);
        assert_eq!(u.lexmin("T"), Some(&Instance::new("T", vec![0, 0])));
        assert_eq!(u.lexmax("S"), Some(&Instance::new("S", vec![1, 1])));
        assert_eq!(u.restrict_tuple("T").len(), 3);
        assert!(u.lexmin("U").is_none());
        let last = {
            let name = String::from("T");
            u.lexmax(&name)
        };
        assert_eq!(last, Some(&Instance::new("T", vec![2, 0])));
        assert_eq!(u.sample(), Some(&Instance::new("S", vec![0, 0])));
        assert!(UnionSet::new().sample().is_none());
    }

    #[test]
    fn test_coalesce_rectangle_is_one_piece() {
        let pieces = grid("S", 4, 5).coalesce();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].lo, vec![0, 0]);
        assert_eq!(pieces[0].hi, vec![3, 4]);
        assert_eq!(pieces[0].len(), 20);
    }

    #[test]
    fn test_coalesce_covers_exactly() {
        // an L shape
        let u = grid("S", 3, 1).union(&grid("S", 1, 3));
        let pieces = u.coalesce();
        let total: usize = pieces.iter().map(|p| p.len()).sum();
        assert_eq!(total, u.len());
        assert_eq!(pieces.len(), 2);
    }

    #[test]
    fn test_display() {
        let u = grid("S", 2, 2);
        assert_eq!(u.to_string(), "{ S[i0, i1] : 0 <= i0 <= 1 and 0 <= i1 <= 1 }");
    }
}
