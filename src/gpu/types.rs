//! GPU buffer types for the compute passes
//!
//! These types are uploaded directly to GPU buffers. All are repr(C) and
//! match the WGSL structs in `shaders` field for field.

use bytemuck::{Pod, Zeroable};

use crate::config::{LayoutConfig, SpringAccumulation};
use crate::graph::Edge;

/// An edge as seen by the spring pass
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuEdge {
    /// Index of source node
    pub source: u32,
    /// Index of target node
    pub target: u32,
    /// 1 if the edge contributes force, 0 otherwise
    pub active: u32,
    /// Padding for 16-byte alignment
    pub _padding: u32,
}

impl From<&Edge> for GpuEdge {
    fn from(edge: &Edge) -> Self {
        Self {
            source: edge.source,
            target: edge.target,
            active: edge.active as u32,
            _padding: 0,
        }
    }
}

/// Simulation parameters passed to every pass as uniforms
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuParams {
    pub gravitational_constant: f32,
    pub spring_length: f32,
    pub spring_constant: f32,
    pub central_gravity: f32,
    pub damping: f32,
    pub timestep: f32,
    pub max_velocity: f32,
    /// Number of node slots uploaded
    pub node_count: u32,
    /// Number of edges uploaded
    pub edge_count: u32,
    /// 1 when springs accumulate through fixed-point atomics
    pub atomic_springs: u32,
    /// Padding for 16-byte alignment
    pub _padding: [u32; 2],
}

impl GpuParams {
    pub fn new(
        config: &LayoutConfig,
        policy: SpringAccumulation,
        node_count: u32,
        edge_count: u32,
    ) -> Self {
        Self {
            gravitational_constant: config.gravitational_constant,
            spring_length: config.spring_length,
            spring_constant: config.spring_constant,
            central_gravity: config.central_gravity,
            damping: config.damping,
            timestep: config.timestep,
            max_velocity: config.max_velocity,
            node_count,
            edge_count,
            atomic_springs: (policy == SpringAccumulation::Atomic) as u32,
            _padding: [0; 2],
        }
    }
}
