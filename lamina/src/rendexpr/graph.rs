// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Breadth-first indexing of a render expression graph.

use std::collections::{HashMap, HashSet, VecDeque};

use super::{NodeId, Rendexpr};

/// Breadth-first walk visiting every node reachable from a root exactly once.
///
/// A node shared by several parents is yielded when it is first popped; its children are queued at
/// that point, so their order follows the first parent that reached them.
pub struct BreadthFirst {
    queue: VecDeque<Rendexpr>,
    visited: HashSet<NodeId>,
}

impl BreadthFirst {
    pub fn new(root: Option<&Rendexpr>) -> Self {
        Self {
            queue: root.cloned().into_iter().collect(),
            visited: HashSet::new(),
        }
    }
}

impl Iterator for BreadthFirst {
    type Item = Rendexpr;

    fn next(&mut self) -> Option<Rendexpr> {
        while let Some(node) = self.queue.pop_front() {
            if !self.visited.insert(NodeId::of(&node)) {
                continue;
            }
            self.queue
                .extend(node.children().into_iter().filter_map(|(_, c)| c.cloned()));
            return Some(node);
        }
        None
    }
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    index: usize,
    depth: usize,
    child_count: usize,
}

/// An index over a render expression graph: BFS position, depth and child count per node.
///
/// The index keeps the graph alive, so node identities stay valid for as long as it exists.
#[derive(Default)]
pub struct RenderGraph {
    root: Option<Rendexpr>,
    nodes: Vec<Rendexpr>,
    entries: HashMap<NodeId, Entry>,
    max_depth: usize,
}

impl RenderGraph {
    pub fn new(root: Option<Rendexpr>) -> Self {
        let mut graph = Self::default();
        graph.reinitialize(root);
        graph
    }

    /// Rebuild the index for a new root.
    pub fn reinitialize(&mut self, root: Option<Rendexpr>) {
        self.clear();
        // Depths are assigned when a parent is processed, which always precedes the child.
        let mut depths: HashMap<NodeId, usize> = HashMap::new();
        if let Some(root) = &root {
            depths.insert(NodeId::of(root), 0);
        }
        for node in BreadthFirst::new(root.as_ref()) {
            let id = NodeId::of(&node);
            let depth = depths.get(&id).copied().unwrap_or_default();
            let mut child_count = 0;
            for (_, child) in node.children() {
                let Some(child) = child else { continue };
                child_count += 1;
                depths.entry(NodeId::of(child)).or_insert(depth + 1);
            }
            self.entries.insert(
                id,
                Entry {
                    index: self.nodes.len(),
                    depth,
                    child_count,
                },
            );
            self.max_depth = self.max_depth.max(depth);
            self.nodes.push(node);
        }
        self.root = root;
    }

    pub fn clear(&mut self) {
        self.root = None;
        self.nodes.clear();
        self.entries.clear();
        self.max_depth = 0;
    }

    pub fn root(&self) -> Option<&Rendexpr> {
        self.root.as_ref()
    }

    /// Every node in breadth-first order.
    pub fn nodes(&self) -> &[Rendexpr] {
        &self.nodes
    }

    pub fn nodes_count(&self) -> usize {
        self.nodes.len()
    }

    /// The deepest depth assigned to any node, 0 for an empty graph.
    pub fn max_node_depth(&self) -> usize {
        self.max_depth
    }

    /// The breadth-first position of `node`, or `None` if it is not part of the graph.
    pub fn node_index(&self, node: &Rendexpr) -> Option<usize> {
        self.entries.get(&NodeId::of(node)).map(|e| e.index)
    }

    /// The length of the first-discovered path from the root to `node`.
    pub fn node_depth(&self, node: &Rendexpr) -> Option<usize> {
        self.entries.get(&NodeId::of(node)).map(|e| e.depth)
    }

    /// Number of non-null child slots of `node`, 0 if it is not part of the graph.
    pub fn child_count(&self, node: &Rendexpr) -> usize {
        self.entries
            .get(&NodeId::of(node))
            .map_or(0, |e| e.child_count)
    }
}

impl std::fmt::Debug for RenderGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderGraph")
            .field("nodes_count", &self.nodes_count())
            .field("max_node_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::peniko::Mix;
    use crate::rendexpr::{self, Node};

    #[test]
    fn shared_nodes_are_indexed_once() {
        let shared = rendexpr::empty();
        let left = Arc::new(Node::MultiplyAlpha {
            image: shared.clone(),
            multiplier: 0.5,
        });
        let root = rendexpr::blend(Some(left.clone()), Some(shared.clone()), Mix::Normal).unwrap();
        let graph = RenderGraph::new(Some(root.clone()));
        assert_eq!(graph.nodes_count(), 3);
        assert_eq!(graph.node_index(&root), Some(0));
        assert_eq!(graph.node_index(&left), Some(1));
        assert_eq!(graph.node_index(&shared), Some(2));
        // Reached directly from the root first.
        assert_eq!(graph.node_depth(&shared), Some(1));
        assert_eq!(graph.child_count(&root), 2);
        assert_eq!(graph.child_count(&shared), 0);
        assert_eq!(graph.max_node_depth(), 1);
    }

    #[test]
    fn unknown_nodes() {
        let graph = RenderGraph::new(Some(rendexpr::empty()));
        let stranger = rendexpr::empty();
        assert_eq!(graph.node_index(&stranger), None);
        assert_eq!(graph.node_depth(&stranger), None);
        assert_eq!(graph.child_count(&stranger), 0);
    }

    #[test]
    fn null_slots_do_not_count() {
        let root = rendexpr::unset_background(Some(rendexpr::empty())).unwrap();
        let graph = RenderGraph::new(Some(root.clone()));
        assert_eq!(graph.child_count(&root), 1);
        assert_eq!(graph.nodes_count(), 2);
    }

    #[test]
    fn reinitialize_and_clear() {
        let mut graph = RenderGraph::new(None);
        assert_eq!(graph.nodes_count(), 0);
        assert!(graph.root().is_none());
        let root = rendexpr::identity(None);
        graph.reinitialize(Some(root.clone()));
        assert_eq!(graph.nodes_count(), 2);
        assert!(Arc::ptr_eq(graph.root().unwrap(), &root));
        graph.clear();
        assert_eq!(graph.nodes_count(), 0);
        assert_eq!(graph.node_index(&root), None);
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let mut node = rendexpr::empty();
        for _ in 0..2_000 {
            node = rendexpr::identity(Some(node));
        }
        let graph = RenderGraph::new(Some(node));
        assert_eq!(graph.nodes_count(), 2_001);
        assert_eq!(graph.max_node_depth(), 2_000);
    }
}
