//! GPU layout using wgpu compute shaders
//!
//! Mirrors [`ForceLayout`](crate::layout::ForceLayout) on a compute device.
//! Graph buffers are uploaded on (re)start or when the graph outgrows the
//! device allocation. Between uploads, size and edge edits are synced each
//! frame and reused ids are respawned at rest. Several ticks then run
//! back-to-back with a single position readback per frame.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc;

use tracing::{debug, info, trace, warn};

use super::shaders::LayoutShaders;
use super::types::{GpuEdge, GpuParams};
use crate::config::{GpuOptions, LayoutConfig};
use crate::error::{LayoutError, LayoutResult};
use crate::graph::{Edge, GraphView, LayoutGraph, is_active};
use crate::layout::{StopCallback, TickCallback};
use crate::scheduler::{FrameQueue, HostScheduler};

const WORKGROUP_SIZE: u32 = 256;
const VEC2_BYTES: u64 = std::mem::size_of::<[f32; 2]>() as u64;

/// Request a compute-capable device, or `None` when the host has no adapter
pub fn request_compute_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        debug!(adapter = %adapter.get_info().name, "found compute adapter");

        match adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Layout Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None, // trace path
            )
            .await
        {
            Ok(pair) => Some(pair),
            Err(err) => {
                warn!(%err, "compute adapter refused a device");
                None
            }
        }
    })
}

/// Smallest power-of-two multiple of `current` (at least `floor`) holding `required`
fn grown_capacity(current: u32, required: u32, floor: u32) -> u32 {
    let mut capacity = current.max(floor).max(1);
    while capacity < required {
        capacity = capacity.saturating_mul(2);
    }
    capacity
}

struct LayoutPipelines {
    reset_forces: wgpu::ComputePipeline,
    repulsion: wgpu::ComputePipeline,
    springs: wgpu::ComputePipeline,
    gravity: wgpu::ComputePipeline,
    integrate: wgpu::ComputePipeline,
}

/// Device allocations sized for `node_capacity` nodes and `edge_capacity` edges
struct DeviceBuffers {
    node_capacity: u32,
    edge_capacity: u32,
    positions: wgpu::Buffer,
    sizes: wgpu::Buffer,
    edges: wgpu::Buffer,
    velocities: wgpu::Buffer,
    forces: wgpu::Buffer,
    pinned: wgpu::Buffer,
    spring_fixed: wgpu::Buffer,
    staging: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl DeviceBuffers {
    fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        params: &wgpu::Buffer,
        node_capacity: u32,
        edge_capacity: u32,
    ) -> Self {
        let nodes = node_capacity as u64;
        let storage = |label: &str, size: u64, extra: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | extra,
                mapped_at_creation: false,
            })
        };

        let positions =
            storage("Position Buffer", nodes * VEC2_BYTES, wgpu::BufferUsages::COPY_SRC);
        let sizes = storage("Size Buffer", nodes * 4, wgpu::BufferUsages::empty());
        let edges = storage(
            "Edge Buffer",
            edge_capacity as u64 * std::mem::size_of::<GpuEdge>() as u64,
            wgpu::BufferUsages::empty(),
        );
        let velocities =
            storage("Velocity Buffer", nodes * VEC2_BYTES, wgpu::BufferUsages::COPY_SRC);
        let forces = storage("Force Buffer", nodes * VEC2_BYTES, wgpu::BufferUsages::empty());
        let pinned = storage("Pinned Buffer", nodes * 4, wgpu::BufferUsages::empty());
        let spring_fixed = storage(
            "Spring Accumulator Buffer",
            nodes * 8,
            wgpu::BufferUsages::empty(),
        );

        // Positions followed by velocities
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size: nodes * VEC2_BYTES * 2,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Layout Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: positions.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: sizes.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: edges.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: velocities.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: forces.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: pinned.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: spring_fixed.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: params.as_entire_binding(),
                },
            ],
        });

        Self {
            node_capacity,
            edge_capacity,
            positions,
            sizes,
            edges,
            velocities,
            forces,
            pinned,
            spring_fixed,
            staging,
            bind_group,
        }
    }

    fn destroy(&self) {
        for buffer in [
            &self.positions,
            &self.sizes,
            &self.edges,
            &self.velocities,
            &self.forces,
            &self.pinned,
            &self.spring_fixed,
            &self.staging,
        ] {
            buffer.destroy();
        }
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn compute_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    label: &str,
    source: String,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        module: &module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Force-directed layout on a compute device
pub struct GpuLayout {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipelines: LayoutPipelines,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    buffers: DeviceBuffers,

    config: LayoutConfig,
    options: GpuOptions,
    node_count: u32,
    edge_count: u32,
    needs_upload: bool,
    pinned: HashSet<u32>,
    /// Host topology as of the last upload or sync
    uploaded_sizes: Vec<f32>,
    uploaded_generations: Vec<u32>,
    uploaded_edges: Vec<Edge>,

    scheduler: Box<dyn HostScheduler>,
    running: bool,
    animated: bool,
    iteration: u32,
    last_max_velocity: f32,
    on_tick: Option<TickCallback>,
    on_stop: Option<StopCallback>,
}

impl GpuLayout {
    /// Build the pipelines and the first device allocation
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        config: LayoutConfig,
        options: GpuOptions,
    ) -> LayoutResult<Self> {
        config.validate()?;
        let shaders = LayoutShaders::new();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Layout Bind Group Layout"),
            entries: &[
                storage_entry(0, false),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, false),
                storage_entry(5, true),
                storage_entry(6, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 7,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Layout Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipelines = LayoutPipelines {
            reset_forces: compute_pipeline(
                &device,
                &pipeline_layout,
                "Reset Forces Pipeline",
                shaders.reset_forces,
                "reset_forces",
            ),
            repulsion: compute_pipeline(
                &device,
                &pipeline_layout,
                "Repulsion Pipeline",
                shaders.repulsion,
                "repulsion",
            ),
            springs: compute_pipeline(
                &device,
                &pipeline_layout,
                "Spring Pipeline",
                shaders.springs,
                "springs",
            ),
            gravity: compute_pipeline(
                &device,
                &pipeline_layout,
                "Central Gravity Pipeline",
                shaders.gravity,
                "gravity",
            ),
            integrate: compute_pipeline(
                &device,
                &pipeline_layout,
                "Integrate Pipeline",
                shaders.integrate,
                "integrate",
            ),
        };

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Params Buffer"),
            size: std::mem::size_of::<GpuParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let capacity = options.initial_capacity.max(1);
        let buffers = DeviceBuffers::new(
            &device,
            &bind_group_layout,
            &params_buffer,
            capacity,
            capacity,
        );

        Ok(Self {
            device,
            queue,
            pipelines,
            bind_group_layout,
            params_buffer,
            buffers,
            config,
            options,
            node_count: 0,
            edge_count: 0,
            needs_upload: true,
            pinned: HashSet::new(),
            uploaded_sizes: Vec::new(),
            uploaded_generations: Vec::new(),
            uploaded_edges: Vec::new(),
            scheduler: Box::new(FrameQueue::new()),
            running: false,
            animated: false,
            iteration: 0,
            last_max_velocity: 0.0,
            on_tick: None,
            on_stop: None,
        })
    }

    pub fn with_scheduler(mut self, scheduler: impl HostScheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Replace the configuration; uniforms are rewritten before every dispatch
    pub fn set_config(&mut self, config: LayoutConfig) -> LayoutResult<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn options(&self) -> &GpuOptions {
        &self.options
    }

    pub fn on_tick(&mut self, callback: impl FnMut(u32, f32) + 'static) {
        self.on_tick = Some(Box::new(callback));
    }

    pub fn on_stop(&mut self, callback: impl FnMut() + 'static) {
        self.on_stop = Some(Box::new(callback));
    }

    /// Begin the scheduled run loop; the graph is re-uploaded on the first frame
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        debug!(animated = self.animated, "starting gpu layout");
        self.running = true;
        self.iteration = 0;
        self.needs_upload = true;
        self.scheduler.request_frame();
    }

    /// Stop scheduling further frames; submitted work still completes
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        debug!(iteration = self.iteration, "stopping gpu layout");
        self.running = false;
        if let Some(callback) = self.on_stop.as_mut() {
            callback();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_animated(&mut self, enabled: bool) {
        self.animated = enabled;
        if enabled {
            self.start();
        }
    }

    pub fn is_animated(&self) -> bool {
        self.animated
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn last_max_velocity(&self) -> f32 {
        self.last_max_velocity
    }

    /// Node capacity of the current device allocation
    pub fn node_capacity(&self) -> u32 {
        self.buffers.node_capacity
    }

    /// Force a full upload before the next dispatch. Size, edge and id reuse
    /// edits are picked up without it; host moves of unpinned nodes are not.
    pub fn invalidate(&mut self) {
        self.needs_upload = true;
    }

    /// Zero velocities and forces on the next upload and restart the count
    pub fn reset(&mut self) {
        debug!("resetting gpu layout state");
        self.needs_upload = true;
        self.iteration = 0;
        self.last_max_velocity = 0.0;
    }

    /// Exclude a node from integration and zero its device velocity
    pub fn pin(&mut self, id: u32) {
        self.pinned.insert(id);
        if id < self.node_count {
            self.write_pin_flag(id, 1);
            self.queue.write_buffer(
                &self.buffers.velocities,
                id as u64 * VEC2_BYTES,
                bytemuck::cast_slice(&[[0.0f32; 2]]),
            );
        }
    }

    pub fn unpin(&mut self, id: u32) {
        self.pinned.remove(&id);
        if id < self.node_count {
            self.write_pin_flag(id, 0);
        }
    }

    pub fn is_pinned(&self, id: u32) -> bool {
        self.pinned.contains(&id)
    }

    fn write_pin_flag(&self, id: u32, flag: u32) {
        self.queue.write_buffer(
            &self.buffers.pinned,
            id as u64 * 4,
            bytemuck::bytes_of(&flag),
        );
    }

    /// Copy positions, sizes, edges and pin flags to the device and zero
    /// velocities and forces, growing the allocation if needed
    pub fn upload<G: LayoutGraph + ?Sized>(&mut self, graph: &mut G) {
        let view = graph.view();
        let node_count = view.capacity() as u32;
        let edge_count = view.edges.len() as u32;
        self.ensure_capacity(node_count, edge_count);

        let n = node_count as usize;
        if n > 0 {
            self.queue.write_buffer(
                &self.buffers.positions,
                0,
                bytemuck::cast_slice(&view.positions[..n]),
            );
            self.queue
                .write_buffer(&self.buffers.sizes, 0, bytemuck::cast_slice(&view.sizes[..n]));
            let flags: Vec<u32> = (0..node_count)
                .map(|id| self.pinned.contains(&id) as u32)
                .collect();
            self.queue
                .write_buffer(&self.buffers.pinned, 0, bytemuck::cast_slice(&flags));
        }
        if edge_count > 0 {
            let edges: Vec<GpuEdge> = view.edges.iter().map(GpuEdge::from).collect();
            self.queue
                .write_buffer(&self.buffers.edges, 0, bytemuck::cast_slice(&edges));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Upload Encoder"),
            });
        encoder.clear_buffer(&self.buffers.velocities, 0, None);
        encoder.clear_buffer(&self.buffers.forces, 0, None);
        encoder.clear_buffer(&self.buffers.spring_fixed, 0, None);
        self.queue.submit(std::iter::once(encoder.finish()));

        debug!(nodes = node_count, edges = edge_count, "uploaded graph to device");
        self.node_count = node_count;
        self.edge_count = edge_count;
        self.needs_upload = false;
        self.uploaded_sizes = view.sizes[..n].to_vec();
        self.uploaded_generations = (0..n).map(|i| view.generation(i)).collect();
        self.uploaded_edges = view.edges.to_vec();
    }

    /// Reallocate with doubled capacity when the graph no longer fits
    fn ensure_capacity(&mut self, node_count: u32, edge_count: u32) {
        let current = &self.buffers;
        if node_count <= current.node_capacity && edge_count <= current.edge_capacity {
            return;
        }
        let floor = self.options.initial_capacity;
        let node_capacity = grown_capacity(current.node_capacity, node_count, floor);
        let edge_capacity = grown_capacity(current.edge_capacity, edge_count, floor);
        debug!(
            from_nodes = current.node_capacity,
            to_nodes = node_capacity,
            from_edges = current.edge_capacity,
            to_edges = edge_capacity,
            "growing device buffers"
        );

        current.destroy();
        self.buffers = DeviceBuffers::new(
            &self.device,
            &self.bind_group_layout,
            &self.params_buffer,
            node_capacity,
            edge_capacity,
        );
    }

    /// Upload if the graph changed shape, otherwise sync topology edits; then
    /// push host positions of pinned nodes
    fn prepare<G: LayoutGraph + ?Sized>(&mut self, graph: &mut G) {
        let edge_count = graph.view().edges.len() as u32;
        if self.needs_upload
            || graph.node_capacity() as u32 != self.node_count
            || edge_count != self.edge_count
        {
            self.upload(graph);
            return;
        }

        let view = graph.view();
        self.sync_topology(&view);
        for &id in &self.pinned {
            if let Some(position) = view.positions.get(id as usize) {
                self.queue.write_buffer(
                    &self.buffers.positions,
                    id as u64 * VEC2_BYTES,
                    bytemuck::cast_slice(std::slice::from_ref(position)),
                );
            }
        }
    }

    /// Rewrite sizes and edges the host changed since the last frame
    ///
    /// A slot that became active, or whose generation moved on, is a new node
    /// behind a reused id: its host position is pushed and its velocity zeroed.
    fn sync_topology(&mut self, view: &GraphView<'_>) {
        let n = (self.node_count as usize)
            .min(view.capacity())
            .min(self.uploaded_sizes.len());
        let sizes = &view.sizes[..n];

        let mut respawned = 0;
        for i in 0..n {
            let generation = view.generation(i);
            let reborn = !is_active(self.uploaded_sizes[i])
                || self.uploaded_generations[i] != generation;
            if is_active(sizes[i]) && reborn {
                let offset = i as u64 * VEC2_BYTES;
                self.queue.write_buffer(
                    &self.buffers.positions,
                    offset,
                    bytemuck::cast_slice(std::slice::from_ref(&view.positions[i])),
                );
                self.queue.write_buffer(
                    &self.buffers.velocities,
                    offset,
                    bytemuck::cast_slice(&[[0.0f32; 2]]),
                );
                respawned += 1;
            }
            self.uploaded_generations[i] = generation;
        }

        if sizes != &self.uploaded_sizes[..n] {
            self.queue
                .write_buffer(&self.buffers.sizes, 0, bytemuck::cast_slice(sizes));
            self.uploaded_sizes[..n].copy_from_slice(sizes);
        }
        if view.edges != self.uploaded_edges.as_slice() {
            let edges: Vec<GpuEdge> = view.edges.iter().map(GpuEdge::from).collect();
            self.queue
                .write_buffer(&self.buffers.edges, 0, bytemuck::cast_slice(&edges));
            self.uploaded_edges = view.edges.to_vec();
        }
        if respawned > 0 {
            debug!(respawned, "respawned reused node ids on device");
        }
    }

    /// Encode `ticks` rounds of the five passes and submit them
    fn dispatch(&self, ticks: u32) {
        if self.node_count == 0 || ticks == 0 {
            return;
        }

        let params = GpuParams::new(
            &self.config,
            self.options.spring_accumulation,
            self.node_count,
            self.edge_count,
        );
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let node_workgroups = self.node_count.div_ceil(WORKGROUP_SIZE);
        let edge_workgroups = self.edge_count.div_ceil(WORKGROUP_SIZE);
        let passes = [
            (&self.pipelines.reset_forces, node_workgroups, "Reset Forces Pass"),
            (&self.pipelines.repulsion, node_workgroups, "Repulsion Pass"),
            (&self.pipelines.springs, edge_workgroups, "Spring Pass"),
            (&self.pipelines.gravity, node_workgroups, "Central Gravity Pass"),
            (&self.pipelines.integrate, node_workgroups, "Integration Pass"),
        ];

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Layout Encoder"),
            });
        for _ in 0..ticks {
            for (pipeline, workgroups, label) in &passes {
                if *workgroups == 0 {
                    continue;
                }
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(*label),
                    timestamp_writes: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &self.buffers.bind_group, &[]);
                pass.dispatch_workgroups(*workgroups, 1, 1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Read device positions and velocities for every uploaded slot
    fn read_state(&self) -> LayoutResult<(Vec<[f32; 2]>, Vec<[f32; 2]>)> {
        let n = self.node_count as usize;
        if n == 0 {
            return Ok((Vec::new(), Vec::new()));
        }

        let bytes = n as u64 * VEC2_BYTES;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(&self.buffers.positions, 0, &self.buffers.staging, 0, bytes);
        encoder.copy_buffer_to_buffer(
            &self.buffers.velocities,
            0,
            &self.buffers.staging,
            bytes,
            bytes,
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = self.buffers.staging.slice(..bytes * 2);
        let (tx, rx) = mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|err| LayoutError::Gpu(err.to_string()))?
            .map_err(|err| LayoutError::Gpu(err.to_string()))?;

        let state = {
            let data = buffer_slice.get_mapped_range();
            let values: &[[f32; 2]] = bytemuck::cast_slice(&data);
            let (positions, velocities) = values.split_at(n);
            (positions.to_vec(), velocities.to_vec())
        };
        self.buffers.staging.unmap();
        Ok(state)
    }

    /// Device-side positions of every uploaded slot
    pub fn read_positions(&self) -> LayoutResult<Vec<[f32; 2]>> {
        Ok(self.read_state()?.0)
    }

    /// Device-side velocities of every uploaded slot
    pub fn read_velocities(&self) -> LayoutResult<Vec<[f32; 2]>> {
        Ok(self.read_state()?.1)
    }

    /// Copy device positions into the host view, skipping pinned and
    /// inactive nodes; returns the max speed
    fn read_back(&self, view: &mut GraphView<'_>) -> LayoutResult<f32> {
        let (positions, velocities) = self.read_state()?;
        let mut max_speed = 0.0f32;
        let count = positions.len().min(view.capacity());
        for i in 0..count {
            if !is_active(view.sizes[i]) || self.pinned.contains(&(i as u32)) {
                continue;
            }
            view.positions[i] = positions[i];
            let v = velocities[i];
            max_speed = max_speed.max(v[0].hypot(v[1]));
        }
        Ok(max_speed)
    }

    fn advance<G: LayoutGraph + ?Sized>(&mut self, graph: &mut G, ticks: u32) -> LayoutResult<f32> {
        self.prepare(graph);
        self.dispatch(ticks);
        let max_velocity = {
            let mut view = graph.view();
            self.read_back(&mut view)?
        };
        graph.mark_positions_dirty();

        self.iteration += ticks;
        self.last_max_velocity = max_velocity;
        if let Some(callback) = self.on_tick.as_mut() {
            callback(self.iteration, max_velocity);
        }
        Ok(max_velocity)
    }

    /// Run `n` ticks back-to-back and read positions back once
    ///
    /// There is no intermediate readback, so convergence is only checked by
    /// the caller against the returned max speed.
    pub fn step<G: LayoutGraph + ?Sized>(&mut self, graph: &mut G, n: u32) -> LayoutResult<f32> {
        if n == 0 {
            return Ok(self.last_max_velocity);
        }
        self.advance(graph, n)
    }

    /// Execute one scheduled frame of `steps_per_frame` ticks
    pub fn run_frame<G: LayoutGraph + ?Sized>(&mut self, graph: &mut G) -> LayoutResult<bool> {
        if !self.running {
            return Ok(false);
        }

        let ticks = self.options.steps_per_frame.max(1);
        let max_velocity = match self.advance(graph, ticks) {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, "gpu frame failed");
                self.stop();
                return Err(err);
            }
        };
        trace!(iteration = self.iteration, "gpu frame complete");

        if !self.animated {
            if max_velocity < self.config.min_velocity {
                info!(iteration = self.iteration, max_velocity, "layout converged");
                self.stop();
                return Ok(false);
            }
            if self.iteration >= self.config.max_iterations {
                info!(iteration = self.iteration, max_velocity, "layout hit iteration cap");
                self.stop();
                return Ok(false);
            }
        }
        self.scheduler.request_frame();
        Ok(true)
    }
}
