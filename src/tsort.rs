//! Topological sorting over an (items, edges) graph.
//!
//! Kahn-style: maintain an incoming-edge count per item, repeatedly pop a
//! root and release its children. Root selection is deterministic (lowest
//! item first) so plans are reproducible run to run.

use crate::error::{Result, StorageError};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

/// A directed graph ready for sorting: the items, the `(parent, child)`
/// partial-order pairs, and the derived incoming-edge counts.
#[derive(Debug, Clone)]
pub struct Graph<T> {
    items: Vec<T>,
    edges: Vec<(T, T)>,
    incoming: HashMap<T, usize>,
}

/// Build a graph from items and `(parent, child)` edge pairs, meaning
/// "parent sorts before child".
pub fn create_graph<T>(items: Vec<T>, edges: Vec<(T, T)>) -> Graph<T>
where
    T: Copy + Eq + Hash,
{
    let mut incoming: HashMap<T, usize> = items.iter().map(|&item| (item, 0)).collect();
    for (_, child) in &edges {
        if let Some(count) = incoming.get_mut(child) {
            *count += 1;
        }
    }
    Graph { items, edges, incoming }
}

/// Sort the graph, returning the items in dependency order.
///
/// Fails with a cyclic-graph error when the graph has no roots, revisits a
/// node, or cannot place every item.
pub fn tsort<T>(graph: &Graph<T>) -> Result<Vec<T>>
where
    T: Copy + Ord + Hash,
{
    let mut order = Vec::with_capacity(graph.items.len());
    if graph.items.is_empty() {
        return Ok(order);
    }

    let mut incoming = graph.incoming.clone();
    let mut roots: BinaryHeap<Reverse<T>> = graph
        .items
        .iter()
        .filter(|item| incoming[item] == 0)
        .map(|&item| Reverse(item))
        .collect();
    if roots.is_empty() {
        return Err(StorageError::cyclic_graph("no root nodes"));
    }

    let mut visited: HashMap<T, ()> = HashMap::with_capacity(graph.items.len());
    while let Some(Reverse(root)) = roots.pop() {
        if visited.insert(root, ()).is_some() {
            return Err(StorageError::cyclic_graph("graph contains cycles"));
        }
        order.push(root);

        for &(parent, child) in &graph.edges {
            if parent != root {
                continue;
            }
            let count = incoming
                .get_mut(&child)
                .ok_or_else(|| StorageError::cyclic_graph("edge references unknown item"))?;
            *count = count.saturating_sub(1);
            if *count == 0 {
                roots.push(Reverse(child));
            }
        }
    }

    if order.len() != graph.items.len() {
        return Err(StorageError::cyclic_graph("graph contains cycles"));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_chain() {
        let graph = create_graph(vec![5, 2, 3, 4, 1], vec![(1, 2), (2, 4), (4, 5), (3, 2)]);
        let order = tsort(&graph).unwrap();
        assert_eq!(order.len(), 5);
        let pos = |n: i32| order.iter().position(|&x| x == n).unwrap();
        assert!(pos(1) < pos(2));
        assert!(pos(3) < pos(2));
        assert!(pos(2) < pos(4));
        assert!(pos(4) < pos(5));
    }

    #[test]
    fn test_deterministic_root_selection() {
        // no edges: lowest id pops first
        let graph = create_graph(vec![9, 3, 7, 1], vec![]);
        assert_eq!(tsort(&graph).unwrap(), vec![1, 3, 7, 9]);
    }

    #[test]
    fn test_two_node_cycle_fails() {
        let graph = create_graph(vec![1, 2], vec![(1, 2), (2, 1)]);
        let err = tsort(&graph).unwrap_err();
        assert!(matches!(err, StorageError::CyclicGraph(_)));
        assert!(err.to_string().contains("no root nodes"));
    }

    #[test]
    fn test_embedded_cycle_fails() {
        // 1 is a valid root but 2 and 3 cycle
        let graph = create_graph(vec![1, 2, 3], vec![(1, 2), (2, 3), (3, 2)]);
        let err = tsort(&graph).unwrap_err();
        assert!(matches!(err, StorageError::CyclicGraph(_)));
    }

    #[test]
    fn test_empty_graph() {
        let graph = create_graph(Vec::<u64>::new(), vec![]);
        assert_eq!(tsort(&graph).unwrap(), Vec::<u64>::new());
    }
}
