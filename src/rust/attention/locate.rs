use std::collections::{HashSet, VecDeque};

use crate::model::{LayerGraph, NodeId};

/// Where a named layer sits: the node listing it and its position there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub parent: NodeId,
    pub index: usize,
}

/// Breadth-first walk over every node reachable from a root.
///
/// Each node is yielded once even when several parents (or a descendant)
/// refer to it. Child ids that are not in the graph are skipped.
pub struct Bfs<'g> {
    graph: &'g LayerGraph,
    queue: VecDeque<NodeId>,
    visited: HashSet<NodeId>,
}

impl<'g> Iterator for Bfs<'g> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let graph = self.graph;
        while let Some(id) = self.queue.pop_front() {
            if !self.visited.insert(id) {
                continue;
            }
            let Some(node) = graph.node(id) else {
                continue;
            };
            self.queue.extend(
                node.children()
                    .iter()
                    .copied()
                    .filter(|child| !self.visited.contains(child)),
            );
            return Some(id);
        }
        None
    }
}

pub fn bfs(graph: &LayerGraph, root: NodeId) -> Bfs<'_> {
    Bfs {
        graph,
        queue: VecDeque::from([root]),
        visited: HashSet::new(),
    }
}

/// Finds the shallowest node with a direct child named `target`.
///
/// Within one node the first matching child wins. When the name occurs at
/// several depths the breadth-first order decides, so the shallowest match is
/// returned. `None` means no reachable node has such a child.
pub fn locate(graph: &LayerGraph, root: NodeId, target: &str) -> Option<Location> {
    bfs(graph, root).find_map(|id| {
        let node = graph.node(id)?;
        node.children()
            .iter()
            .position(|&child| graph.node(child).is_some_and(|c| c.name() == target))
            .map(|index| Location { parent: id, index })
    })
}
