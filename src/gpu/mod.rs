//! GPU-accelerated force-directed layout
//!
//! Runs the same force model as the CPU controller as five ordered compute
//! passes per tick:
//!
//! - **Reset**: zero the force buffer (per node)
//! - **Repulsion**: brute-force inverse-square between all active nodes (per node)
//! - **Springs**: Hooke attraction along live edges (per edge)
//! - **Central gravity**: pull toward the origin (per node)
//! - **Integrate**: damped Euler with velocity clamp (per node)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use graphforce::gpu::{GpuLayout, request_compute_device};
//! use graphforce::{GpuOptions, GraphStore, LayoutConfig};
//!
//! let (device, queue) = request_compute_device().expect("no adapter");
//! let mut layout = GpuLayout::new(
//!     Arc::new(device),
//!     Arc::new(queue),
//!     LayoutConfig::default(),
//!     GpuOptions::default(),
//! )?;
//! let mut graph = GraphStore::random(1000, 2000, 42);
//! layout.step(&mut graph, 100)?;
//! ```
//!
//! Edges sharing an endpoint race in the spring pass unless
//! [`SpringAccumulation::Atomic`](crate::config::SpringAccumulation) is selected.

mod shaders;
mod simulation;
mod types;

pub use shaders::{FIXED_SCALE, LayoutShaders, combined_layout_shader};
pub use simulation::{GpuLayout, request_compute_device};
pub use types::{GpuEdge, GpuParams};
