//! Barnes-Hut quadtree over active node positions
//!
//! The tree lives in a flat arena of fixed-size [`QuadCell`] records addressed
//! by index, with [`ABSENT`] marking a missing child. It is rebuilt from
//! scratch every tick; the arena and the traversal stack keep their
//! allocations between builds, so a steady-state tick allocates nothing.
//!
//! Insertion and force queries are both iterative. Near-coincident points
//! would otherwise subdivide forever, so at [`MAX_DEPTH`] extra bodies share
//! the deepest leaf. The leaf keeps their aggregate mass for approximation
//! and a list of occupants, so each of them is still repelled pairwise.

use crate::forces::{add, inverse_square, pair_repulsion, separation};
use crate::graph::is_active;

/// Sentinel for an absent child or an internal cell's body
pub const ABSENT: i32 = -1;

/// Maximum subdivision depth
pub const MAX_DEPTH: u32 = 40;

/// Fractional padding applied to the bounding square
const PADDING: f32 = 0.1;

/// Smallest half-size of the root cell (single node or all coincident)
const MIN_HALF_SIZE: f32 = 1e-3;

/// One arena record: an axis-aligned square cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadCell {
    /// Child indices by quadrant (bit 0: x >= center, bit 1: y >= center)
    pub children: [i32; 4],
    /// Sole occupant of a leaf, [`ABSENT`] for internal, empty or shared cells
    pub body: i32,
    /// Head of the occupant list of a depth-capped leaf holding several
    /// bodies, [`ABSENT`] otherwise
    pub overflow: i32,
    /// Number of bodies beneath this cell
    pub mass: f32,
    /// Mass-weighted center of the bodies beneath this cell
    pub com: [f32; 2],
    /// Geometric center of the cell
    pub center: [f32; 2],
    /// Half the side length
    pub half_size: f32,
}

impl QuadCell {
    fn new(center: [f32; 2], half_size: f32) -> Self {
        Self {
            children: [ABSENT; 4],
            body: ABSENT,
            overflow: ABSENT,
            mass: 0.0,
            com: [0.0, 0.0],
            center,
            half_size,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(|&c| c == ABSENT)
    }

    /// Whether `p` lies inside the cell's square, edges included
    pub fn contains(&self, p: [f32; 2]) -> bool {
        (p[0] - self.center[0]).abs() <= self.half_size
            && (p[1] - self.center[1]).abs() <= self.half_size
    }

    fn quadrant(&self, p: [f32; 2]) -> usize {
        (p[0] >= self.center[0]) as usize | (((p[1] >= self.center[1]) as usize) << 1)
    }

    fn child_center(&self, quadrant: usize) -> [f32; 2] {
        let h = self.half_size * 0.5;
        let dx = if quadrant & 1 != 0 { h } else { -h };
        let dy = if quadrant & 2 != 0 { h } else { -h };
        [self.center[0] + dx, self.center[1] + dy]
    }
}

/// One body in a shared leaf's occupant list
#[derive(Debug, Clone, Copy, PartialEq)]
struct Occupant {
    body: i32,
    position: [f32; 2],
    next: i32,
}

/// Arena-backed Barnes-Hut quadtree
#[derive(Debug, Default)]
pub struct QuadTree {
    cells: Vec<QuadCell>,
    occupants: Vec<Occupant>,
    stack: Vec<u32>,
}

impl QuadTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            cells: Vec::with_capacity(nodes * 2),
            occupants: Vec::new(),
            stack: Vec::with_capacity(64),
        }
    }

    /// Rebuild the tree over the first `count` node slots
    pub fn build(&mut self, positions: &[[f32; 2]], sizes: &[f32], count: usize) {
        self.cells.clear();
        self.occupants.clear();
        let count = count.min(positions.len()).min(sizes.len());

        let mut min = [f32::INFINITY; 2];
        let mut max = [f32::NEG_INFINITY; 2];
        let mut any = false;
        for i in 0..count {
            if !is_active(sizes[i]) {
                continue;
            }
            let p = positions[i];
            min = [min[0].min(p[0]), min[1].min(p[1])];
            max = [max[0].max(p[0]), max[1].max(p[1])];
            any = true;
        }
        if !any {
            return;
        }

        let span = (max[0] - min[0]).max(max[1] - min[1]);
        let half_size = (span * 0.5 * (1.0 + PADDING)).max(MIN_HALF_SIZE);
        let center = [(min[0] + max[0]) * 0.5, (min[1] + max[1]) * 0.5];
        self.cells.push(QuadCell::new(center, half_size));

        for i in 0..count {
            if is_active(sizes[i]) {
                self.insert(i as i32, positions[i]);
            }
        }
        self.compute_mass();
    }

    fn insert(&mut self, body: i32, p: [f32; 2]) {
        let mut idx = 0usize;
        let mut depth = 0u32;
        loop {
            let cell = self.cells[idx];
            if cell.is_leaf() {
                if cell.mass == 0.0 {
                    let leaf = &mut self.cells[idx];
                    leaf.body = body;
                    leaf.mass = 1.0;
                    leaf.com = p;
                    return;
                }
                if depth >= MAX_DEPTH {
                    self.share_leaf(idx, body, p);
                    return;
                }
                // Split: push the prior occupant down one level, then keep
                // descending with the new body from this (now internal) cell.
                let q = cell.quadrant(cell.com);
                let child = self.push_leaf(&cell, q, cell.body, cell.com);
                let parent = &mut self.cells[idx];
                parent.children[q] = child;
                parent.body = ABSENT;
                continue;
            }

            let q = cell.quadrant(p);
            let child = cell.children[q];
            if child == ABSENT {
                let child = self.push_leaf(&cell, q, body, p);
                self.cells[idx].children[q] = child;
                return;
            }
            idx = child as usize;
            depth += 1;
        }
    }

    /// Add `body` to a depth-capped leaf's occupant list
    fn share_leaf(&mut self, idx: usize, body: i32, p: [f32; 2]) {
        let leaf = self.cells[idx];
        let mut head = leaf.overflow;
        if head == ABSENT {
            head = self.push_occupant(leaf.body, leaf.com, ABSENT);
        }
        let head = self.push_occupant(body, p, head);

        let mass = leaf.mass + 1.0;
        let cell = &mut self.cells[idx];
        cell.body = ABSENT;
        cell.overflow = head;
        cell.com = [
            (leaf.com[0] * leaf.mass + p[0]) / mass,
            (leaf.com[1] * leaf.mass + p[1]) / mass,
        ];
        cell.mass = mass;
    }

    fn push_occupant(&mut self, body: i32, position: [f32; 2], next: i32) -> i32 {
        self.occupants.push(Occupant {
            body,
            position,
            next,
        });
        (self.occupants.len() - 1) as i32
    }

    fn push_leaf(&mut self, parent: &QuadCell, quadrant: usize, body: i32, p: [f32; 2]) -> i32 {
        let mut leaf = QuadCell::new(parent.child_center(quadrant), parent.half_size * 0.5);
        leaf.body = body;
        leaf.mass = 1.0;
        leaf.com = p;
        self.cells.push(leaf);
        (self.cells.len() - 1) as i32
    }

    /// Children always sit after their parent in the arena, so one reverse
    /// sweep visits every cell after all of its descendants.
    fn compute_mass(&mut self) {
        for idx in (0..self.cells.len()).rev() {
            let cell = self.cells[idx];
            if cell.is_leaf() {
                continue;
            }
            let mut mass = 0.0;
            let mut weighted = [0.0f32; 2];
            for &c in cell.children.iter().filter(|&&c| c != ABSENT) {
                let child = &self.cells[c as usize];
                mass += child.mass;
                weighted[0] += child.com[0] * child.mass;
                weighted[1] += child.com[1] * child.mass;
            }
            let parent = &mut self.cells[idx];
            parent.mass = mass;
            parent.com = [weighted[0] / mass, weighted[1] / mass];
        }
    }

    /// Approximate force on `node` at `p` from every other body in the tree
    ///
    /// A cell that does not contain `p`, and whose side length over the
    /// distance to its center of mass is below `theta`, is treated as one
    /// point mass. `theta = 0` visits every leaf and matches brute force up
    /// to summation order.
    pub fn compute_force(&mut self, node: u32, p: [f32; 2], g: f32, theta: f32) -> [f32; 2] {
        let mut force = [0.0f32; 2];
        if self.cells.is_empty() {
            return force;
        }
        let Self {
            cells,
            occupants,
            stack,
        } = self;
        stack.clear();
        stack.push(0);

        while let Some(idx) = stack.pop() {
            let cell = &cells[idx as usize];
            if cell.mass == 0.0 {
                continue;
            }
            if cell.is_leaf() {
                if cell.overflow == ABSENT {
                    if cell.body != node as i32 {
                        let delta = separation(node, p, cell.body as u32, cell.com);
                        add(&mut force, inverse_square(delta, g * cell.mass));
                    }
                    continue;
                }
                let mut next = cell.overflow;
                while next != ABSENT {
                    let occupant = &occupants[next as usize];
                    if occupant.body != node as i32 {
                        let (body, q) = (occupant.body as u32, occupant.position);
                        add(&mut force, pair_repulsion(node, p, body, q, g));
                    }
                    next = occupant.next;
                }
                continue;
            }

            let delta = [cell.com[0] - p[0], cell.com[1] - p[1]];
            let dist = (delta[0] * delta[0] + delta[1] * delta[1]).sqrt();
            if !cell.contains(p) && dist > 0.0 && (cell.half_size * 2.0) / dist < theta {
                add(&mut force, inverse_square(delta, g * cell.mass));
                continue;
            }
            stack.extend(
                cell.children
                    .iter()
                    .filter(|&&c| c != ABSENT)
                    .map(|&c| c as u32),
            );
        }
        force
    }

    /// Add the approximate repulsion on every active node into `forces`
    pub fn accumulate(
        &mut self,
        positions: &[[f32; 2]],
        sizes: &[f32],
        forces: &mut [[f32; 2]],
        g: f32,
        theta: f32,
    ) {
        let n = positions.len().min(sizes.len());
        for i in 0..n {
            if is_active(sizes[i]) {
                let f = self.compute_force(i as u32, positions[i], g, theta);
                add(&mut forces[i], f);
            }
        }
    }

    pub fn root(&self) -> Option<&QuadCell> {
        self.cells.first()
    }

    pub fn cells(&self) -> &[QuadCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forces::accumulate_brute_force;

    #[test]
    fn empty_input_builds_empty_tree() {
        let mut tree = QuadTree::new();
        tree.build(&[[0.5, 0.5]], &[0.0], 1);
        assert!(tree.is_empty());
        assert_eq!(tree.compute_force(0, [0.5, 0.5], -1.0, 0.5), [0.0, 0.0]);
    }

    #[test]
    fn single_node_is_the_root() {
        let mut tree = QuadTree::new();
        tree.build(&[[0.3, -0.7]], &[1.0], 1);

        let root = tree.root().unwrap();
        assert_eq!(root.mass, 1.0);
        assert_eq!(root.com, [0.3, -0.7]);
        assert_eq!(root.body, 0);
        assert_eq!(tree.compute_force(0, [0.3, -0.7], -1.0, 0.5), [0.0, 0.0]);
    }

    #[test]
    fn root_aggregates_all_active_bodies() {
        let positions = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0], [9.0, 9.0]];
        let sizes = [1.0, 1.0, 1.0, 1.0, 0.0];
        let mut tree = QuadTree::new();
        tree.build(&positions, &sizes, 5);

        let root = tree.root().unwrap();
        assert_eq!(root.mass, 4.0);
        assert!(root.com[0].abs() < 1e-6 && root.com[1].abs() < 1e-6);
        assert_eq!(root.body, ABSENT);
        // Root is square and padded around the active bounding box
        assert!(root.half_size > 1.0);
    }

    #[test]
    fn count_limits_the_indexed_slots() {
        let positions = [[0.0, 0.0], [0.5, 0.5], [0.9, 0.9]];
        let mut tree = QuadTree::new();
        tree.build(&positions, &[1.0; 3], 2);
        assert_eq!(tree.root().unwrap().mass, 2.0);
    }

    #[test]
    fn coincident_points_terminate_at_max_depth() {
        let positions = vec![[0.25, 0.25]; 100];
        let sizes = vec![1.0; 100];
        let mut tree = QuadTree::new();
        tree.build(&positions, &sizes, 100);

        assert_eq!(tree.root().unwrap().mass, 100.0);
        // one chain of cells down to the depth cap
        assert!(tree.len() <= MAX_DEPTH as usize + 2);
        let f = tree.compute_force(0, [0.25, 0.25], -1.0, 0.5);
        assert!(f[0].is_finite() && f[1].is_finite());
    }

    #[test]
    fn stacked_bodies_repel_each_other_pairwise() {
        let positions = [[0.1, 0.1], [0.1, 0.1], [0.1, 0.1], [0.5, 0.5]];
        let sizes = [1.0; 4];
        let g = -0.001;

        let mut exact = vec![[0.0; 2]; 4];
        accumulate_brute_force(&positions, &sizes, &mut exact, g);

        let mut tree = QuadTree::new();
        tree.build(&positions, &sizes, 4);
        let shared = tree.cells().iter().find(|c| c.overflow != ABSENT).unwrap();
        assert_eq!(shared.mass, 3.0);
        assert_eq!(shared.body, ABSENT);

        for theta in [0.0, 0.5] {
            let mut approx = vec![[0.0; 2]; 4];
            tree.accumulate(&positions, &sizes, &mut approx, g, theta);
            for (i, (e, a)) in exact.iter().zip(&approx).enumerate() {
                let tolerance = 1e-4 * e[0].hypot(e[1]);
                assert!((e[0] - a[0]).abs() <= tolerance, "node {i}: {e:?} vs {a:?}");
                assert!((e[1] - a[1]).abs() <= tolerance, "node {i}: {e:?} vs {a:?}");
            }
        }
    }

    #[test]
    fn zero_theta_matches_brute_force() {
        let positions: Vec<[f32; 2]> = (0..40)
            .map(|i| {
                let t = i as f32 * 0.37;
                [t.cos() * (0.2 + 0.02 * i as f32), t.sin() * 0.8]
            })
            .collect();
        let sizes = vec![1.0; positions.len()];

        let mut exact = vec![[0.0; 2]; positions.len()];
        accumulate_brute_force(&positions, &sizes, &mut exact, -0.001);

        let mut tree = QuadTree::new();
        tree.build(&positions, &sizes, positions.len());
        let mut approx = vec![[0.0; 2]; positions.len()];
        tree.accumulate(&positions, &sizes, &mut approx, -0.001, 0.0);

        for (e, a) in exact.iter().zip(&approx) {
            let tolerance = 1e-3 * e[0].hypot(e[1]).max(0.01);
            assert!((e[0] - a[0]).abs() < tolerance, "{e:?} vs {a:?}");
            assert!((e[1] - a[1]).abs() < tolerance, "{e:?} vs {a:?}");
        }
    }

    #[test]
    fn rebuild_reuses_the_arena() {
        let positions = [[0.0, 0.0], [0.5, 0.1], [-0.4, 0.3]];
        let mut tree = QuadTree::new();
        tree.build(&positions, &[1.0; 3], 3);
        let first = tree.cells().to_vec();
        tree.build(&positions, &[1.0; 3], 3);
        assert_eq!(tree.cells(), first.as_slice());
    }

    #[test]
    fn far_cluster_is_approximated_as_a_point_mass() {
        // A tight cluster far away acts like its total mass at its center
        let mut positions = vec![[0.0, 0.0]];
        positions.extend([[10.0, 10.0], [10.01, 10.0], [10.0, 10.01], [10.01, 10.01]]);
        let sizes = vec![1.0; positions.len()];
        let mut tree = QuadTree::new();
        tree.build(&positions, &sizes, positions.len());

        let f = tree.compute_force(0, [0.0, 0.0], 1.0, 0.5);
        let point = inverse_square([10.005, 10.005], 4.0);
        assert!((f[0] - point[0]).abs() < 1e-4);
        assert!((f[1] - point[1]).abs() < 1e-4);
    }
}
