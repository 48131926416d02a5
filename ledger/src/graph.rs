//! In-memory DAG of vertices.
//!
//! Vertices live in a flat arena keyed by hash; edges are kept as two
//! adjacency indexes (parent to children and child to parents) so no vertex
//! owns another. A leaf has no children, a root has no parents.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use tangle_types::VertexHash;

use crate::vertex::Vertex;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("vertex {0} already present")]
    AlreadyExists(VertexHash),

    #[error("vertex {0} unknown")]
    Unknown(VertexHash),

    #[error("edge {parent} -> {child} already present")]
    EdgeExists { parent: VertexHash, child: VertexHash },

    #[error("edge {0} -> {0} would form a cycle")]
    SelfLoop(VertexHash),
}

/// Returned by a walk whose cancellation token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("walk cancelled")]
pub struct WalkCancelled;

#[derive(Default)]
pub struct Graph {
    vertices: HashMap<VertexHash, Vertex>,
    parents: HashMap<VertexHash, HashSet<VertexHash>>,
    children: HashMap<VertexHash, HashSet<VertexHash>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `vertex` under its own hash.
    pub fn add_vertex(&mut self, vertex: Vertex) -> Result<(), GraphError> {
        let hash = vertex.hash;
        if self.vertices.contains_key(&hash) {
            return Err(GraphError::AlreadyExists(hash));
        }
        self.vertices.insert(hash, vertex);
        self.parents.insert(hash, HashSet::new());
        self.children.insert(hash, HashSet::new());
        Ok(())
    }

    /// Connect `parent -> child`. Children only ever point at vertices that
    /// already exist, so cycle detection reduces to these existence checks.
    pub fn add_edge(&mut self, parent: VertexHash, child: VertexHash) -> Result<(), GraphError> {
        if parent == child {
            return Err(GraphError::SelfLoop(parent));
        }
        for hash in [parent, child] {
            if !self.vertices.contains_key(&hash) {
                return Err(GraphError::Unknown(hash));
            }
        }
        let inserted = self.children.entry(parent).or_default().insert(child);
        if !inserted {
            return Err(GraphError::EdgeExists { parent, child });
        }
        self.parents.entry(child).or_default().insert(parent);
        Ok(())
    }

    pub fn get(&self, hash: &VertexHash) -> Option<&Vertex> {
        self.vertices.get(hash)
    }

    pub fn contains(&self, hash: &VertexHash) -> bool {
        self.vertices.contains_key(hash)
    }

    /// Remove a vertex together with every edge touching it.
    pub fn delete(&mut self, hash: &VertexHash) -> Option<Vertex> {
        let vertex = self.vertices.remove(hash)?;
        for parent in self.parents.remove(hash).unwrap_or_default() {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.remove(hash);
            }
        }
        for child in self.children.remove(hash).unwrap_or_default() {
            if let Some(co_parents) = self.parents.get_mut(&child) {
                co_parents.remove(hash);
            }
        }
        Some(vertex)
    }

    pub fn is_root(&self, hash: &VertexHash) -> Result<bool, GraphError> {
        self.parents
            .get(hash)
            .map(HashSet::is_empty)
            .ok_or(GraphError::Unknown(*hash))
    }

    pub fn is_leaf(&self, hash: &VertexHash) -> Result<bool, GraphError> {
        self.children
            .get(hash)
            .map(HashSet::is_empty)
            .ok_or(GraphError::Unknown(*hash))
    }

    /// All vertices without children, heaviest first; ties broken by hash so
    /// the order is stable across instances holding the same graph.
    pub fn leaves(&self) -> Vec<&Vertex> {
        let mut leaves: Vec<&Vertex> = self
            .children
            .iter()
            .filter(|(_, c)| c.is_empty())
            .filter_map(|(h, _)| self.vertices.get(h))
            .collect();
        leaves.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.hash.cmp(&b.hash)));
        leaves
    }

    pub fn leaf_count(&self) -> usize {
        self.children.values().filter(|c| c.is_empty()).count()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Lazily walk every ancestor of `hash` (not `hash` itself), breadth
    /// first toward the roots, each at most once.
    pub fn ancestors_walk(
        &self,
        hash: &VertexHash,
        cancel: &CancellationToken,
    ) -> Result<AncestorsWalk<'_>, GraphError> {
        let parents = self.parents.get(hash).ok_or(GraphError::Unknown(*hash))?;
        let mut visited = HashSet::new();
        visited.insert(*hash);
        Ok(AncestorsWalk::new(self, parents.iter().copied(), visited, cancel))
    }

    /// Walk `seeds` themselves and all of their ancestors, each at most once.
    /// Seeds absent from the graph are skipped.
    pub fn lineage_walk(
        &self,
        seeds: impl IntoIterator<Item = VertexHash>,
        cancel: &CancellationToken,
    ) -> AncestorsWalk<'_> {
        AncestorsWalk::new(self, seeds, HashSet::new(), cancel)
    }
}

/// Cancellable breadth-first walk over parent edges.
///
/// Yields `Err(WalkCancelled)` once when the token fires and nothing after.
/// The walk borrows the graph, so the caller's lock guard keeps it stable.
pub struct AncestorsWalk<'g> {
    graph: &'g Graph,
    queue: VecDeque<VertexHash>,
    visited: HashSet<VertexHash>,
    cancel: CancellationToken,
    finished: bool,
}

impl<'g> AncestorsWalk<'g> {
    fn new(
        graph: &'g Graph,
        seeds: impl IntoIterator<Item = VertexHash>,
        mut visited: HashSet<VertexHash>,
        cancel: &CancellationToken,
    ) -> Self {
        let mut queue = VecDeque::new();
        for seed in seeds {
            if visited.insert(seed) {
                queue.push_back(seed);
            }
        }
        Self {
            graph,
            queue,
            visited,
            cancel: cancel.clone(),
            finished: false,
        }
    }
}

impl<'g> Iterator for AncestorsWalk<'g> {
    type Item = Result<&'g Vertex, WalkCancelled>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.finished = true;
            self.queue.clear();
            return Some(Err(WalkCancelled));
        }
        while let Some(hash) = self.queue.pop_front() {
            let Some(vertex) = self.graph.vertices.get(&hash) else {
                continue;
            };
            if let Some(parents) = self.graph.parents.get(&hash) {
                for parent in parents {
                    if self.visited.insert(*parent) {
                        self.queue.push_back(*parent);
                    }
                }
            }
            return Some(Ok(vertex));
        }
        self.finished = true;
        None
    }
}
