//! Graph collaborator contract and an in-memory store
//!
//! The layout engine never owns node positions. It borrows them through a
//! [`GraphView`] for the duration of a tick and writes them in place. Whoever
//! holds the view is the single writer; an external actor that wants to move
//! a node while a layout runs must pin it first.

use std::path::Path;

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::error::LayoutResult;

/// A node with size <= 0 is logically deleted and excluded from physics
#[inline]
pub fn is_active(size: f32) -> bool {
    size > 0.0
}

/// An edge between two node ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: u32,
    pub target: u32,
    pub active: bool,
}

impl Edge {
    pub fn new(source: u32, target: u32) -> Self {
        Self {
            source,
            target,
            active: true,
        }
    }
}

/// Borrowed view of the graph's flat buffers, indexed by node id
pub struct GraphView<'a> {
    /// Node positions, mutated in place by the layout
    pub positions: &'a mut [[f32; 2]],
    /// Node sizes, parallel to `positions`
    pub sizes: &'a [f32],
    /// Edge list
    pub edges: &'a [Edge],
    /// Incarnation of each slot, bumped whenever a freed id is handed out
    /// again. May be empty when the graph never reuses ids.
    pub generations: &'a [u32],
}

impl GraphView<'_> {
    /// Number of node slots (active or not)
    pub fn capacity(&self) -> usize {
        self.positions.len().min(self.sizes.len())
    }

    pub fn generation(&self, id: usize) -> u32 {
        self.generations.get(id).copied().unwrap_or(0)
    }

    pub fn is_node_active(&self, id: usize) -> bool {
        self.sizes.get(id).is_some_and(|&s| is_active(s))
    }

    /// An edge contributes force only if it and both endpoints are active
    pub fn is_edge_live(&self, edge: &Edge) -> bool {
        edge.active
            && self.is_node_active(edge.source as usize)
            && self.is_node_active(edge.target as usize)
    }

    /// Ids of every active node
    pub fn active_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.capacity()).filter(|&i| is_active(self.sizes[i]))
    }
}

/// The graph collaborator consumed by both layout backends
pub trait LayoutGraph {
    /// Borrow the position, size and edge buffers
    fn view(&mut self) -> GraphView<'_>;

    /// Signal the renderer that positions changed and must be re-uploaded
    fn mark_positions_dirty(&mut self);

    /// Number of node slots currently addressable
    fn node_capacity(&self) -> usize;
}

/// Simple in-memory graph used by the CLI and tests
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    positions: Vec<[f32; 2]>,
    sizes: Vec<f32>,
    edges: Vec<Edge>,
    generations: Vec<u32>,
    free: Vec<u32>,
    dirty: bool,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, reusing the most recently freed id if one exists
    pub fn add_node(&mut self, x: f32, y: f32, size: f32) -> u32 {
        if let Some(id) = self.free.pop() {
            let i = id as usize;
            self.positions[i] = [x, y];
            self.sizes[i] = size;
            self.generations[i] = self.generations[i].wrapping_add(1);
            self.dirty = true;
            return id;
        }
        let id = self.positions.len() as u32;
        self.positions.push([x, y]);
        self.sizes.push(size);
        self.generations.push(0);
        self.dirty = true;
        id
    }

    /// Logically delete a node and deactivate its edges
    pub fn remove_node(&mut self, id: u32) -> bool {
        let i = id as usize;
        if !self.sizes.get(i).is_some_and(|&s| is_active(s)) {
            return false;
        }
        self.sizes[i] = 0.0;
        for edge in &mut self.edges {
            if edge.source == id || edge.target == id {
                edge.active = false;
            }
        }
        self.free.push(id);
        self.dirty = true;
        true
    }

    pub fn add_edge(&mut self, source: u32, target: u32) -> usize {
        self.edges.push(Edge::new(source, target));
        self.edges.len() - 1
    }

    pub fn remove_edge(&mut self, index: usize) -> bool {
        match self.edges.get_mut(index) {
            Some(edge) if edge.active => {
                edge.active = false;
                true
            }
            _ => false,
        }
    }

    pub fn position(&self, id: u32) -> Option<[f32; 2]> {
        self.positions.get(id as usize).copied()
    }

    /// Move a node. Pin it first if a layout is running.
    pub fn set_position(&mut self, id: u32, x: f32, y: f32) {
        if let Some(p) = self.positions.get_mut(id as usize) {
            *p = [x, y];
            self.dirty = true;
        }
    }

    pub fn positions(&self) -> &[[f32; 2]] {
        &self.positions
    }

    pub fn sizes(&self) -> &[f32] {
        &self.sizes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn generations(&self) -> &[u32] {
        &self.generations
    }

    pub fn active_node_count(&self) -> usize {
        self.sizes.iter().filter(|&&s| is_active(s)).count()
    }

    /// Return and clear the dirty flag
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Generate a graph with uniformly random positions in [-1, 1]
    pub fn random(nodes: usize, edges: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut graph = Self::new();
        for _ in 0..nodes {
            let x = rng.random_range(-1.0..1.0);
            let y = rng.random_range(-1.0..1.0);
            graph.add_node(x, y, 1.0);
        }
        if nodes > 1 {
            for _ in 0..edges {
                let source = rng.random_range(0..nodes as u32);
                let mut target = rng.random_range(0..nodes as u32);
                if target == source {
                    target = (target + 1) % nodes as u32;
                }
                graph.add_edge(source, target);
            }
        }
        graph
    }

    pub fn from_file(file: &GraphFile) -> Self {
        let mut graph = Self::new();
        for node in &file.nodes {
            graph.add_node(node.x, node.y, node.size);
        }
        for &[source, target] in &file.edges {
            graph.add_edge(source, target);
        }
        graph
    }

    pub fn to_file(&self) -> GraphFile {
        GraphFile {
            nodes: self
                .positions
                .iter()
                .zip(&self.sizes)
                .map(|(p, &size)| NodeRecord {
                    x: p[0],
                    y: p[1],
                    size,
                })
                .collect(),
            edges: self
                .edges
                .iter()
                .filter(|e| e.active)
                .map(|e| [e.source, e.target])
                .collect(),
        }
    }
}

impl LayoutGraph for GraphStore {
    fn view(&mut self) -> GraphView<'_> {
        GraphView {
            positions: &mut self.positions,
            sizes: &self.sizes,
            edges: &self.edges,
            generations: &self.generations,
        }
    }

    fn mark_positions_dirty(&mut self) {
        self.dirty = true;
    }

    fn node_capacity(&self) -> usize {
        self.positions.len()
    }
}

/// A node entry in a graph file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_size")]
    pub size: f32,
}

fn default_size() -> f32 {
    1.0
}

/// JSON graph file: node positions plus `[source, target]` edge pairs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphFile {
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<[u32; 2]>,
}

impl GraphFile {
    pub fn read(path: &Path) -> LayoutResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&source)?)
    }

    pub fn write(&self, path: &Path) -> LayoutResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
