//! Explicit union maps: finite relations between statement instances.

use crate::polyhedral::union_set::{Instance, UnionSet};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A finite relation, stored as ordered `(source, target)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionMap {
    pairs: BTreeSet<(Instance, Instance)>,
}

/// Result of [`UnionMap::transitive_closure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Closure {
    /// The (possibly truncated) closure `R+`
    pub map: UnionMap,
    /// False when the iteration limit was reached before a fixpoint
    pub exact: bool,
}

impl UnionMap {
    /// The empty relation.
    pub fn new() -> Self {
        Self::default()
    }

    /// `{ x -> x : x in set }`.
    pub fn identity(set: &UnionSet) -> Self {
        set.iter().map(|i| (i.clone(), i.clone())).collect()
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// No pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Add a pair.
    pub fn insert(&mut self, src: Instance, dst: Instance) -> bool {
        self.pairs.insert((src, dst))
    }

    /// Membership test.
    pub fn contains(&self, src: &Instance, dst: &Instance) -> bool {
        self.pairs.contains(&(src.clone(), dst.clone()))
    }

    /// Iterate over pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = &(Instance, Instance)> {
        self.pairs.iter()
    }

    /// Targets related to `src`.
    pub fn image<'a>(&'a self, src: &'a Instance) -> impl Iterator<Item = &'a Instance> + 'a {
        let start = (src.clone(), Instance::min_value());
        self.pairs
            .range(start..)
            .take_while(move |(s, _)| s == src)
            .map(|(_, d)| d)
    }

    /// Swap sources and targets.
    pub fn reverse(&self) -> UnionMap {
        self.pairs.iter().map(|(s, d)| (d.clone(), s.clone())).collect()
    }

    /// All sources.
    pub fn domain(&self) -> UnionSet {
        self.pairs.iter().map(|(s, _)| s.clone()).collect()
    }

    /// All targets.
    pub fn range(&self) -> UnionSet {
        self.pairs.iter().map(|(_, d)| d.clone()).collect()
    }

    /// Relation union.
    pub fn union(&self, other: &UnionMap) -> UnionMap {
        self.pairs.union(&other.pairs).cloned().collect()
    }

    /// Relation difference.
    pub fn subtract(&self, other: &UnionMap) -> UnionMap {
        self.pairs.difference(&other.pairs).cloned().collect()
    }

    /// Keep the pairs satisfying `pred`.
    pub fn filter(&self, pred: impl Fn(&Instance, &Instance) -> bool) -> UnionMap {
        self.pairs.iter().filter(|(s, d)| pred(s, d)).cloned().collect()
    }

    /// Composition: `self` followed by `other`.
    pub fn apply_range(&self, other: &UnionMap) -> UnionMap {
        let mut out = UnionMap::new();
        for (s, mid) in &self.pairs {
            for d in other.image(mid) {
                out.insert(s.clone(), d.clone());
            }
        }
        out
    }

    /// Keep pairs whose source lies in `set`.
    pub fn intersect_domain(&self, set: &UnionSet) -> UnionMap {
        self.filter(|s, _| set.contains(s))
    }

    /// Drop pairs whose source lies in `set`.
    pub fn subtract_domain(&self, set: &UnionSet) -> UnionMap {
        self.filter(|s, _| !set.contains(s))
    }

    /// Keep pairs whose target lies in `set`.
    pub fn intersect_range(&self, set: &UnionSet) -> UnionMap {
        self.filter(|_, d| set.contains(d))
    }

    /// Simplify against a domain context.
    ///
    /// In explicit form this is restriction: pairs outside the context can
    /// never be observed.
    pub fn gist_domain(&self, context: &UnionSet) -> UnionMap {
        self.intersect_domain(context)
    }

    /// Simplify against a range context.
    pub fn gist_range(&self, context: &UnionSet) -> UnionMap {
        self.intersect_range(context)
    }

    /// `R+` by repeated composition, at most `limit` extra rounds.
    pub fn transitive_closure(&self, limit: usize) -> Closure {
        let mut succ: BTreeMap<&Instance, Vec<&Instance>> = BTreeMap::new();
        for (s, d) in &self.pairs {
            succ.entry(s).or_default().push(d);
        }

        let mut closure = self.pairs.clone();
        let mut frontier: Vec<(Instance, Instance)> = self.pairs.iter().cloned().collect();
        for round in 0..limit {
            let mut next = Vec::new();
            for (s, mid) in &frontier {
                if let Some(targets) = succ.get(mid) {
                    for &d in targets {
                        let pair = (s.clone(), d.clone());
                        if !closure.contains(&pair) {
                            closure.insert(pair.clone());
                            next.push(pair);
                        }
                    }
                }
            }
            if next.is_empty() {
                debug!("transitive closure converged after {} rounds", round);
                return Closure { map: UnionMap { pairs: closure }, exact: true };
            }
            frontier = next;
        }
        // a final probe tells whether the truncated result happens to be complete
        let exact = frontier.iter().all(|(s, mid)| {
            succ.get(mid)
                .map(|ts| ts.iter().all(|&d| closure.contains(&(s.clone(), d.clone()))))
                .unwrap_or(true)
        });
        debug!("transitive closure stopped at limit {} (exact: {})", limit, exact);
        Closure { map: UnionMap { pairs: closure }, exact }
    }
}

impl FromIterator<(Instance, Instance)> for UnionMap {
    fn from_iter<I: IntoIterator<Item = (Instance, Instance)>>(iter: I) -> Self {
        Self { pairs: iter.into_iter().collect() }
    }
}

impl Extend<(Instance, Instance)> for UnionMap {
    fn extend<I: IntoIterator<Item = (Instance, Instance)>>(&mut self, iter: I) {
        self.pairs.extend(iter);
    }
}

impl fmt::Display for UnionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self.pairs.iter().map(|(s, d)| format!("{} -> {}", s, d)).collect();
        write!(f, "{{ {} }}", pairs.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(i: i64) -> Instance {
        Instance::new("S", vec![i])
    }

    fn chain(n: i64) -> UnionMap {
        (0..n - 1).map(|i| (s(i), s(i + 1))).collect()
    }

    #[test]
    fn test_domain_range_reverse() {
        let m = chain(4);
        assert_eq!(m.domain().len(), 3);
        assert!(m.range().contains(&s(3)));
        assert!(m.reverse().contains(&s(1), &s(0)));
        assert_eq!(m.image(&s(1)).collect::<Vec<_>>(), vec![&s(2)]);
    }

    #[test]
    fn test_apply_range() {
        let m = chain(4);
        let two = m.apply_range(&m);
        assert_eq!(two.len(), 2);
        assert!(two.contains(&s(0), &s(2)));
    }

    #[test]
    fn test_closure_exact() {
        let c = chain(5).transitive_closure(8);
        assert!(c.exact);
        // 4 + 3 + 2 + 1 pairs
        assert_eq!(c.map.len(), 10);
        assert!(c.map.contains(&s(0), &s(4)));
    }

    #[test]
    fn test_closure_inexact_at_limit() {
        let c = chain(10).transitive_closure(2);
        assert!(!c.exact);
        assert!(c.map.contains(&s(0), &s(3)));
        assert!(!c.map.contains(&s(0), &s(9)));
    }

    #[test]
    fn test_restrictions() {
        let m = chain(4);
        let set: UnionSet = vec![s(0), s(1)].into_iter().collect();
        assert_eq!(m.intersect_domain(&set).len(), 2);
        assert_eq!(m.subtract_domain(&set).len(), 1);
        assert_eq!(m.intersect_range(&set).len(), 1);
        assert_eq!(m.gist_domain(&set), m.intersect_domain(&set));
        assert_eq!(m.gist_range(&set), m.intersect_range(&set));
    }
}
