//! graphforce - force-directed graph layout with a Barnes-Hut CPU backend and
//! an optional wgpu compute backend.
//!
//! Both backends share one physical model (inverse-square repulsion, Hooke
//! springs, central gravity, damped Euler integration) and operate in place on
//! position buffers borrowed from a [`LayoutGraph`].

pub mod config;
pub mod engine;
pub mod error;
pub mod forces;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod graph;
pub mod integrator;
pub mod layout;
pub mod quadtree;
pub mod scheduler;

pub use config::{GpuOptions, LayoutConfig, SpringAccumulation};
pub use engine::LayoutEngine;
pub use error::{LayoutError, LayoutResult};
pub use graph::{Edge, GraphFile, GraphStore, GraphView, LayoutGraph};
pub use layout::ForceLayout;
pub use quadtree::QuadTree;
pub use scheduler::{FrameQueue, HostScheduler};
