//! Dependency-aware topological ordering for `steward-graph`.
//!
//! [`sort`] orders any collection of items exposing (identity,
//! dependency-identities) so that every dependency precedes its dependents.
//! The sorter never inspects artefact content. Properties:
//!
//! - Kahn's algorithm; dependencies pointing outside the given item set are
//!   treated as already satisfied (they belong to artefacts handled in an
//!   earlier pass or by an earlier-priority plugin).
//! - Ties break by original input order, so output is deterministic for a
//!   given input ordering.
//! - Cycles are not a crash condition: cycle members come back in `failed`
//!   with a cyclic reason; items that merely depend on a cycle transitively
//!   come back with an unresolved reason; everything else still sorts.

use std::collections::HashMap;

use thiserror::Error;

use steward_core::types::ArtefactKey;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// An item the sorter can order: an identity plus the identities it
/// depends on.
pub trait DependencyNode {
    fn key(&self) -> &ArtefactKey;
    fn dependencies(&self) -> Vec<ArtefactKey>;
}

/// Why a node could not be ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SortFailure {
    /// The node participates in a dependency cycle; it will never succeed
    /// without the definitions being edited.
    #[error("cyclic dependency")]
    Cyclic,

    /// The node depends (transitively) on a cyclic node within this set.
    #[error("unresolved dependency")]
    Unresolved,
}

/// Result of a sort: orderable nodes in dependency order, plus the nodes
/// that could not be ordered and why.
#[derive(Debug)]
pub struct SortOutcome<N> {
    pub ordered: Vec<N>,
    /// In input order.
    pub failed: Vec<(N, SortFailure)>,
}

impl<N: DependencyNode> SortOutcome<N> {
    pub fn failure_for(&self, key: &ArtefactKey) -> Option<SortFailure> {
        self.failed
            .iter()
            .find(|(n, _)| n.key() == key)
            .map(|(_, f)| *f)
    }
}

// ---------------------------------------------------------------------------
// Sort
// ---------------------------------------------------------------------------

/// Topologically sort `nodes`. See the module docs for the contract.
pub fn sort<N: DependencyNode>(nodes: Vec<N>) -> SortOutcome<N> {
    let len = nodes.len();
    let mut key_to_idx: HashMap<ArtefactKey, usize> = HashMap::with_capacity(len);
    for (i, node) in nodes.iter().enumerate() {
        key_to_idx.entry(node.key().clone()).or_insert(i);
    }

    // Edges restricted to the item set; out-of-set dependencies are
    // already satisfied.
    let mut indegree = vec![0usize; len];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); len];
    let mut self_loop = vec![false; len];
    for (i, node) in nodes.iter().enumerate() {
        for dep in node.dependencies() {
            match key_to_idx.get(&dep) {
                Some(&j) if j == i => {
                    self_loop[i] = true;
                    indegree[i] += 1;
                }
                Some(&j) => {
                    dependents[j].push(i);
                    indegree[i] += 1;
                }
                None => {}
            }
        }
    }

    // Kahn's algorithm; the ready set is ordered by input index so equal
    // in-degree resolves by insertion order.
    let mut ready: std::collections::BTreeSet<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| i)
        .collect();
    let mut order: Vec<usize> = Vec::with_capacity(len);
    while let Some(&i) = ready.iter().next() {
        ready.remove(&i);
        order.push(i);
        for &j in &dependents[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.insert(j);
            }
        }
    }

    let mut emitted = vec![false; len];
    for &i in &order {
        emitted[i] = true;
    }

    // Whatever Kahn left behind is cyclic, or downstream of a cycle.
    let cyclic = cyclic_members(&nodes, &key_to_idx, &emitted, &self_loop);

    let mut slots: Vec<Option<N>> = nodes.into_iter().map(Some).collect();
    let ordered = order.iter().filter_map(|&i| slots[i].take()).collect();
    let failed = slots
        .into_iter()
        .enumerate()
        .filter_map(|(i, slot)| {
            let node = slot?;
            let failure = if cyclic[i] {
                SortFailure::Cyclic
            } else {
                SortFailure::Unresolved
            };
            Some((node, failure))
        })
        .collect();

    SortOutcome { ordered, failed }
}

/// Mark leftover nodes that sit on a cycle (strongly connected component of
/// size > 1, or a self-loop) within the leftover subgraph. Iterative Tarjan.
fn cyclic_members<N: DependencyNode>(
    nodes: &[N],
    key_to_idx: &HashMap<ArtefactKey, usize>,
    emitted: &[bool],
    self_loop: &[bool],
) -> Vec<bool> {
    let len = nodes.len();
    // Leftover-subgraph adjacency: node -> in-set dependencies not emitted.
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); len];
    for (i, node) in nodes.iter().enumerate() {
        if emitted[i] {
            continue;
        }
        for dep in node.dependencies() {
            if let Some(&j) = key_to_idx.get(&dep) {
                if !emitted[j] && j != i {
                    adjacency[i].push(j);
                }
            }
        }
    }

    const UNVISITED: usize = usize::MAX;
    let mut index = vec![UNVISITED; len];
    let mut lowlink = vec![0usize; len];
    let mut on_stack = vec![false; len];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut cyclic = vec![false; len];

    for start in 0..len {
        if emitted[start] || index[start] != UNVISITED {
            continue;
        }
        // (node, next child position)
        let mut call_stack: Vec<(usize, usize)> = vec![(start, 0)];
        while let Some(&(v, child)) = call_stack.last() {
            if child == 0 && index[v] == UNVISITED {
                index[v] = next_index;
                lowlink[v] = next_index;
                next_index += 1;
                stack.push(v);
                on_stack[v] = true;
            }
            if child < adjacency[v].len() {
                if let Some(frame) = call_stack.last_mut() {
                    frame.1 += 1;
                }
                let w = adjacency[v][child];
                if index[w] == UNVISITED {
                    call_stack.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
                continue;
            }

            call_stack.pop();
            if let Some(&(parent, _)) = call_stack.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }
            if lowlink[v] == index[v] {
                // Root of a strongly connected component.
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                if component.len() > 1 {
                    for w in component {
                        cyclic[w] = true;
                    }
                } else if self_loop[v] {
                    cyclic[v] = true;
                }
            }
        }
    }

    cyclic
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::types::ArtefactType;

    pub(crate) struct TestNode {
        key: ArtefactKey,
        deps: Vec<ArtefactKey>,
    }

    pub(crate) fn key(name: &str) -> ArtefactKey {
        ArtefactKey::derive(&ArtefactType::from("test"), name)
    }

    pub(crate) fn node(name: &str, deps: &[&str]) -> TestNode {
        TestNode {
            key: key(name),
            deps: deps.iter().map(|d| key(d)).collect(),
        }
    }

    impl DependencyNode for TestNode {
        fn key(&self) -> &ArtefactKey {
            &self.key
        }
        fn dependencies(&self) -> Vec<ArtefactKey> {
            self.deps.clone()
        }
    }

    #[test]
    fn self_dependency_is_cyclic() {
        let outcome = sort(vec![node("a", &["a"]), node("b", &[])]);
        assert_eq!(outcome.ordered.len(), 1);
        assert_eq!(outcome.failure_for(&key("a")), Some(SortFailure::Cyclic));
    }

    #[test]
    fn out_of_set_dependency_counts_as_satisfied() {
        let outcome = sort(vec![node("a", &["elsewhere"])]);
        assert_eq!(outcome.ordered.len(), 1);
        assert!(outcome.failed.is_empty());
    }

    #[test]
    fn dependent_of_cycle_is_unresolved_not_cyclic() {
        let outcome = sort(vec![
            node("a", &["b"]),
            node("b", &["a"]),
            node("c", &["a"]),
        ]);
        assert!(outcome.ordered.is_empty());
        assert_eq!(outcome.failure_for(&key("a")), Some(SortFailure::Cyclic));
        assert_eq!(outcome.failure_for(&key("b")), Some(SortFailure::Cyclic));
        assert_eq!(
            outcome.failure_for(&key("c")),
            Some(SortFailure::Unresolved)
        );
    }
}
