//! Backend selection
//!
//! [`LayoutEngine`] wraps either layout backend behind one interface. A
//! missing compute device is not an error: the engine quietly runs on the CPU.

#[cfg(feature = "gpu")]
use std::sync::Arc;

#[cfg(feature = "gpu")]
use tracing::warn;

#[cfg(feature = "gpu")]
use crate::config::GpuOptions;
use crate::config::LayoutConfig;
use crate::error::LayoutResult;
#[cfg(feature = "gpu")]
use crate::gpu::{GpuLayout, request_compute_device};
use crate::graph::LayoutGraph;
use crate::layout::ForceLayout;
use crate::scheduler::HostScheduler;

/// A layout running on whichever backend is available
pub enum LayoutEngine {
    Cpu(ForceLayout),
    #[cfg(feature = "gpu")]
    Gpu(GpuLayout),
}

impl LayoutEngine {
    /// CPU engine
    pub fn new(config: LayoutConfig) -> LayoutResult<Self> {
        Ok(Self::Cpu(ForceLayout::new(config)?))
    }

    /// GPU engine on the supplied device, CPU when there is none
    #[cfg(feature = "gpu")]
    pub fn with_device(
        device: Option<(Arc<wgpu::Device>, Arc<wgpu::Queue>)>,
        config: LayoutConfig,
        options: GpuOptions,
    ) -> LayoutResult<Self> {
        match device {
            Some((device, queue)) => Ok(Self::Gpu(GpuLayout::new(device, queue, config, options)?)),
            None => {
                warn!("no compute device available, using the CPU layout");
                Self::new(config)
            }
        }
    }

    /// Request a device from the system and build on it if one exists
    #[cfg(feature = "gpu")]
    pub fn auto(config: LayoutConfig, options: GpuOptions) -> LayoutResult<Self> {
        let device =
            request_compute_device().map(|(device, queue)| (Arc::new(device), Arc::new(queue)));
        Self::with_device(device, config, options)
    }

    pub fn with_scheduler(self, scheduler: impl HostScheduler + 'static) -> Self {
        match self {
            Self::Cpu(layout) => Self::Cpu(layout.with_scheduler(scheduler)),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => Self::Gpu(layout.with_scheduler(scheduler)),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Cpu(_) => "cpu",
            #[cfg(feature = "gpu")]
            Self::Gpu(_) => "gpu",
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        match self {
            Self::Cpu(layout) => layout.config(),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.config(),
        }
    }

    pub fn set_config(&mut self, config: LayoutConfig) -> LayoutResult<()> {
        match self {
            Self::Cpu(layout) => layout.set_config(config),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.set_config(config),
        }
    }

    pub fn on_tick(&mut self, callback: impl FnMut(u32, f32) + 'static) {
        match self {
            Self::Cpu(layout) => layout.on_tick(callback),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.on_tick(callback),
        }
    }

    pub fn on_stop(&mut self, callback: impl FnMut() + 'static) {
        match self {
            Self::Cpu(layout) => layout.on_stop(callback),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.on_stop(callback),
        }
    }

    pub fn start(&mut self) {
        match self {
            Self::Cpu(layout) => layout.start(),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.start(),
        }
    }

    pub fn stop(&mut self) {
        match self {
            Self::Cpu(layout) => layout.stop(),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.stop(),
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            Self::Cpu(layout) => layout.is_running(),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.is_running(),
        }
    }

    pub fn set_animated(&mut self, enabled: bool) {
        match self {
            Self::Cpu(layout) => layout.set_animated(enabled),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.set_animated(enabled),
        }
    }

    pub fn is_animated(&self) -> bool {
        match self {
            Self::Cpu(layout) => layout.is_animated(),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.is_animated(),
        }
    }

    pub fn iteration(&self) -> u32 {
        match self {
            Self::Cpu(layout) => layout.iteration(),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.iteration(),
        }
    }

    pub fn pin(&mut self, id: u32) {
        match self {
            Self::Cpu(layout) => layout.pin(id),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.pin(id),
        }
    }

    pub fn unpin(&mut self, id: u32) {
        match self {
            Self::Cpu(layout) => layout.unpin(id),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.unpin(id),
        }
    }

    pub fn is_pinned(&self, id: u32) -> bool {
        match self {
            Self::Cpu(layout) => layout.is_pinned(id),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.is_pinned(id),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::Cpu(layout) => layout.reset(),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.reset(),
        }
    }

    /// Force the next GPU frame to re-upload the whole graph. The CPU backend
    /// reads the graph every tick and has nothing to refresh.
    pub fn invalidate(&mut self) {
        match self {
            Self::Cpu(_) => {}
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.invalidate(),
        }
    }

    /// Run `n` ticks synchronously, returning the last max speed
    pub fn step<G: LayoutGraph + ?Sized>(&mut self, graph: &mut G, n: u32) -> LayoutResult<f32> {
        match self {
            Self::Cpu(layout) => Ok(layout.step(graph, n)),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.step(graph, n),
        }
    }

    /// Execute one scheduled frame; `Ok(false)` once the loop has ended
    pub fn run_frame<G: LayoutGraph + ?Sized>(&mut self, graph: &mut G) -> LayoutResult<bool> {
        match self {
            Self::Cpu(layout) => Ok(layout.run_frame(graph)),
            #[cfg(feature = "gpu")]
            Self::Gpu(layout) => layout.run_frame(graph),
        }
    }
}
