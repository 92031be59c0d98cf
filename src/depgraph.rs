//! Bidirectional dependency graph (spec.md §4.7).
//!
//! No teacher analog — Windjammer type-checks one file into one Rust module
//! and never tracks a cross-file call graph. Written per spec.md §4.7's
//! "keyed map owned by the graph; `dependsOn`/`usedBy` are transposes of each
//! other" design and the REDESIGN FLAGS guidance that nodes hold key
//! references rather than owning pointers to each other.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// One node's forward (`depends_on`) and inverse (`used_by`) edge sets,
/// keyed by the graph's own key type rather than holding pointers to sibling
/// nodes.
#[derive(Debug, Clone)]
struct DependencyNode<K> {
    depends_on: HashSet<K>,
    used_by: HashSet<K>,
}

impl<K> Default for DependencyNode<K> {
    fn default() -> Self {
        Self { depends_on: HashSet::new(), used_by: HashSet::new() }
    }
}

/// A bidirectional graph over fully-qualified script names (spec.md §3's
/// `"[trigger,name]"` key). `add_dependency(a, b)` records both that `a`
/// depends on `b` and, as its transpose, that `b` is used by `a`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph<K: Eq + Hash + Clone> {
    nodes: HashMap<K, DependencyNode<K>>,
}

impl<K: Eq + Hash + Clone> DependencyGraph<K> {
    pub fn new() -> Self {
        Self { nodes: HashMap::new() }
    }

    pub fn find_or_create(&mut self, key: &K) {
        self.nodes.entry(key.clone()).or_default();
    }

    pub fn contains(&self, key: &K) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.nodes.keys()
    }

    /// Records that `from` depends on `to`, creating either node that does
    /// not already exist.
    pub fn add_dependency(&mut self, from: &K, to: &K) {
        self.find_or_create(from);
        self.find_or_create(to);
        self.nodes.get_mut(from).unwrap().depends_on.insert(to.clone());
        self.nodes.get_mut(to).unwrap().used_by.insert(from.clone());
    }

    pub fn depends_on(&self, key: &K) -> impl Iterator<Item = &K> {
        self.nodes.get(key).into_iter().flat_map(|n| n.depends_on.iter())
    }

    pub fn used_by(&self, key: &K) -> impl Iterator<Item = &K> {
        self.nodes.get(key).into_iter().flat_map(|n| n.used_by.iter())
    }

    /// Drops `key` and every edge that referenced it, in both directions —
    /// spec.md §4.7 requires removal to leave no dangling forward or inverse
    /// reference behind.
    pub fn remove(&mut self, key: &K) {
        let Some(node) = self.nodes.remove(key) else {
            return;
        };
        for dep in &node.depends_on {
            if let Some(n) = self.nodes.get_mut(dep) {
                n.used_by.remove(key);
            }
        }
        for user in &node.used_by {
            if let Some(n) = self.nodes.get_mut(user) {
                n.depends_on.remove(key);
            }
        }
    }

    /// Replaces `key`'s outgoing `depends_on` edges with `new_deps`, used
    /// when re-analyzing a file whose call set changed. Leaves `used_by`
    /// (who depends on `key`) untouched.
    pub fn set_dependencies(&mut self, key: &K, new_deps: impl IntoIterator<Item = K>) {
        let old: Vec<K> = self.depends_on(key).cloned().collect();
        for dep in &old {
            if let Some(n) = self.nodes.get_mut(dep) {
                n.used_by.remove(key);
            }
        }
        self.find_or_create(key);
        self.nodes.get_mut(key).unwrap().depends_on.clear();
        for dep in new_deps {
            self.add_dependency(key, &dep);
        }
    }

    /// All nodes transitively reachable via `used_by` from `key`, including
    /// `key` itself — the fan-out set `cache.rs`'s incremental recompile
    /// walks, visited-set guarded so a dependency cycle is never revisited
    /// (spec.md §4.8.2).
    pub fn transitive_used_by(&self, key: &K) -> HashSet<K> {
        let mut visited = HashSet::new();
        let mut stack = vec![key.clone()];
        while let Some(k) = stack.pop() {
            if !visited.insert(k.clone()) {
                continue;
            }
            for user in self.used_by(&k) {
                if !visited.contains(user) {
                    stack.push(user.clone());
                }
            }
        }
        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_dependency_is_visible_from_both_sides() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(&"a", &"b");
        assert_eq!(graph.depends_on(&"a").collect::<Vec<_>>(), vec![&"b"]);
        assert_eq!(graph.used_by(&"b").collect::<Vec<_>>(), vec![&"a"]);
    }

    #[test]
    fn remove_drops_both_directions() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(&"a", &"b");
        graph.remove(&"b");
        assert!(!graph.contains(&"b"));
        assert_eq!(graph.depends_on(&"a").count(), 0);
    }

    #[test]
    fn set_dependencies_preserves_used_by() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(&"a", &"old");
        graph.add_dependency(&"caller", &"a");
        graph.set_dependencies(&"a", ["new"]);
        assert_eq!(graph.depends_on(&"a").collect::<Vec<_>>(), vec![&"new"]);
        assert_eq!(graph.used_by(&"old").count(), 0);
        assert_eq!(graph.used_by(&"a").collect::<Vec<_>>(), vec![&"caller"]);
    }

    #[test]
    fn transitive_used_by_is_cycle_safe() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(&"a", &"b");
        graph.add_dependency(&"b", &"a"); // cycle
        graph.add_dependency(&"c", &"a");
        let reach = graph.transitive_used_by(&"b");
        assert_eq!(reach, HashSet::from(["b", "a", "c"]));
    }
}
