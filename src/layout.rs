//! CPU layout controller
//!
//! Orchestrates ticks over a borrowed [`GraphView`]: lazy buffer growth,
//! force accumulation (Barnes-Hut or brute force), integration, convergence
//! detection and the cooperative run loop driven by a [`HostScheduler`].
//!
//! The controller is single-threaded. Within one frame its ticks run
//! back-to-back; the only suspension point is returning to the host between
//! frames. `stop` clears the running flag checked at the start of the next
//! frame, it never preempts a batch in flight.

use std::collections::HashSet;

use tracing::{debug, info, trace};

use crate::config::LayoutConfig;
use crate::error::LayoutResult;
use crate::forces::{accumulate_brute_force, accumulate_gravity, accumulate_springs};
use crate::graph::{GraphView, LayoutGraph, is_active};
use crate::integrator::integrate;
use crate::quadtree::QuadTree;
use crate::scheduler::{FrameQueue, HostScheduler};

/// Ticks executed per scheduled frame
pub const TICKS_PER_FRAME: u32 = 3;

/// Smallest velocity/force buffer length once allocated
const MIN_BUFFER_LEN: usize = 64;

/// Called after every tick with the iteration number and max node speed
pub type TickCallback = Box<dyn FnMut(u32, f32)>;

/// Called once whenever a running layout stops
pub type StopCallback = Box<dyn FnMut()>;

/// Force-directed layout on the CPU
pub struct ForceLayout {
    config: LayoutConfig,
    velocities: Vec<[f32; 2]>,
    forces: Vec<[f32; 2]>,
    /// Activity and generation of each slot at the previous tick, to catch reused ids
    was_active: Vec<bool>,
    seen_generation: Vec<u32>,
    pinned: HashSet<u32>,
    tree: QuadTree,
    scheduler: Box<dyn HostScheduler>,
    running: bool,
    animated: bool,
    iteration: u32,
    last_max_velocity: f32,
    on_tick: Option<TickCallback>,
    on_stop: Option<StopCallback>,
}

impl ForceLayout {
    /// Create an idle layout. Frame requests go to an internal
    /// [`FrameQueue`] until [`with_scheduler`](Self::with_scheduler) replaces it.
    pub fn new(config: LayoutConfig) -> LayoutResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            velocities: Vec::new(),
            forces: Vec::new(),
            was_active: Vec::new(),
            seen_generation: Vec::new(),
            pinned: HashSet::new(),
            tree: QuadTree::new(),
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

    /// Replace the configuration; takes effect on the next tick
    pub fn set_config(&mut self, config: LayoutConfig) -> LayoutResult<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn on_tick(&mut self, callback: impl FnMut(u32, f32) + 'static) {
        self.on_tick = Some(Box::new(callback));
    }

    pub fn on_stop(&mut self, callback: impl FnMut() + 'static) {
        self.on_stop = Some(Box::new(callback));
    }

    /// Begin the scheduled run loop
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        debug!(animated = self.animated, "starting layout");
        self.running = true;
        self.iteration = 0;
        self.scheduler.request_frame();
    }

    /// Stop scheduling further frames
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        debug!(iteration = self.iteration, "stopping layout");
        self.running = false;
        if let Some(callback) = self.on_stop.as_mut() {
            callback();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Animated mode never stops on convergence; entering it starts the loop
    pub fn set_animated(&mut self, enabled: bool) {
        self.animated = enabled;
        if enabled {
            self.start();
        }
    }

    pub fn is_animated(&self) -> bool {
        self.animated
    }

    /// Ticks executed since the last start or reset
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Max node speed of the most recent tick
    pub fn last_max_velocity(&self) -> f32 {
        self.last_max_velocity
    }

    /// Exclude a node from integration and zero its velocity
    ///
    /// Ids beyond the current buffers are recorded but otherwise ignored;
    /// their velocity slot is created zeroed when the buffers grow.
    pub fn pin(&mut self, id: u32) {
        self.pinned.insert(id);
        if let Some(v) = self.velocities.get_mut(id as usize) {
            *v = [0.0, 0.0];
        }
    }

    pub fn unpin(&mut self, id: u32) {
        self.pinned.remove(&id);
    }

    pub fn is_pinned(&self, id: u32) -> bool {
        self.pinned.contains(&id)
    }

    /// Zero all velocities and forces and restart the iteration count
    pub fn reset(&mut self) {
        debug!("resetting layout state");
        self.velocities.fill([0.0, 0.0]);
        self.forces.fill([0.0, 0.0]);
        self.was_active.fill(false);
        self.iteration = 0;
        self.last_max_velocity = 0.0;
    }

    pub fn velocities(&self) -> &[[f32; 2]] {
        &self.velocities
    }

    pub fn forces(&self) -> &[[f32; 2]] {
        &self.forces
    }

    /// Run `n` ticks synchronously
    ///
    /// Outside animated mode this returns early once a tick's max speed drops
    /// below `min_velocity`. Returns the max speed of the last tick run.
    pub fn step<G: LayoutGraph + ?Sized>(&mut self, graph: &mut G, n: u32) -> f32 {
        if n == 0 {
            return self.last_max_velocity;
        }
        {
            let mut view = graph.view();
            for _ in 0..n {
                let max_velocity = self.advance(&mut view);
                if !self.animated && max_velocity < self.config.min_velocity {
                    break;
                }
            }
        }
        graph.mark_positions_dirty();
        self.last_max_velocity
    }

    /// Execute one scheduled frame; returns whether the loop continues
    pub fn run_frame<G: LayoutGraph + ?Sized>(&mut self, graph: &mut G) -> bool {
        if !self.running {
            return false;
        }

        let mut finished = false;
        {
            let mut view = graph.view();
            for _ in 0..TICKS_PER_FRAME {
                let max_velocity = self.advance(&mut view);
                if self.animated {
                    continue;
                }
                if max_velocity < self.config.min_velocity {
                    info!(iteration = self.iteration, max_velocity, "layout converged");
                    finished = true;
                    break;
                }
                if self.iteration >= self.config.max_iterations {
                    info!(iteration = self.iteration, max_velocity, "layout hit iteration cap");
                    finished = true;
                    break;
                }
            }
        }
        graph.mark_positions_dirty();
        trace!(iteration = self.iteration, "frame complete");

        if finished {
            self.stop();
            return false;
        }
        self.scheduler.request_frame();
        true
    }

    fn advance(&mut self, view: &mut GraphView<'_>) -> f32 {
        let max_velocity = self.tick(view);
        self.iteration += 1;
        self.last_max_velocity = max_velocity;
        if let Some(callback) = self.on_tick.as_mut() {
            callback(self.iteration, max_velocity);
        }
        max_velocity
    }

    /// One full force-accumulation-and-integration cycle
    fn tick(&mut self, view: &mut GraphView<'_>) -> f32 {
        let count = view.capacity();
        self.ensure_capacity(count);

        for i in 0..count {
            let active = is_active(view.sizes[i]);
            let generation = view.generation(i);
            if active && (!self.was_active[i] || self.seen_generation[i] != generation) {
                self.velocities[i] = [0.0, 0.0];
            }
            self.was_active[i] = active;
            self.seen_generation[i] = generation;
        }

        let positions = &view.positions[..count];
        let sizes = &view.sizes[..count];
        let forces = &mut self.forces[..count];
        forces.fill([0.0, 0.0]);

        let config = &self.config;
        if config.gravitational_constant != 0.0 {
            if config.barnes_hut_theta == 0.0 {
                accumulate_brute_force(positions, sizes, forces, config.gravitational_constant);
            } else {
                self.tree.build(positions, sizes, count);
                self.tree.accumulate(
                    positions,
                    sizes,
                    forces,
                    config.gravitational_constant,
                    config.barnes_hut_theta,
                );
            }
        }
        accumulate_springs(
            positions,
            sizes,
            view.edges,
            forces,
            config.spring_length,
            config.spring_constant,
        );
        accumulate_gravity(positions, sizes, forces, config.central_gravity);

        integrate(
            &mut view.positions[..count],
            sizes,
            &mut self.velocities[..count],
            &self.forces[..count],
            &self.pinned,
            &self.config,
        )
    }

    /// Grow velocity/force buffers geometrically to cover `capacity` slots
    fn ensure_capacity(&mut self, capacity: usize) {
        if capacity <= self.velocities.len() {
            return;
        }
        let len = capacity
            .max(self.velocities.len() * 2)
            .max(MIN_BUFFER_LEN);
        debug!(from = self.velocities.len(), to = len, "growing layout buffers");
        self.velocities.resize(len, [0.0, 0.0]);
        self.forces.resize(len, [0.0, 0.0]);
        self.was_active.resize(len, false);
        self.seen_generation.resize(len, 0);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::graph::GraphStore;

    fn pair() -> GraphStore {
        let mut graph = GraphStore::new();
        graph.add_node(-0.5, 0.0, 1.0);
        graph.add_node(0.5, 0.0, 1.0);
        graph.add_edge(0, 1);
        graph
    }

    fn restless() -> LayoutConfig {
        LayoutConfig::default().with_min_velocity(0.0)
    }

    #[test]
    fn step_marks_positions_dirty() {
        let mut graph = pair();
        graph.take_dirty();
        let mut layout = ForceLayout::new(LayoutConfig::default()).unwrap();

        layout.step(&mut graph, 1);

        assert!(graph.take_dirty());
        assert_eq!(layout.iteration(), 1);
    }

    #[test]
    fn bounded_step_stops_on_convergence() {
        let mut graph = GraphStore::new();
        graph.add_node(0.0, 0.0, 1.0);
        let mut layout = ForceLayout::new(LayoutConfig::default()).unwrap();

        let max_velocity = layout.step(&mut graph, 100);

        assert_eq!(max_velocity, 0.0);
        assert_eq!(layout.iteration(), 1);
    }

    #[test]
    fn animated_step_runs_every_tick() {
        let mut graph = GraphStore::new();
        graph.add_node(0.0, 0.0, 1.0);
        let mut layout = ForceLayout::new(LayoutConfig::default()).unwrap();
        layout.set_animated(true);

        layout.step(&mut graph, 10);

        assert_eq!(layout.iteration(), 10);
    }

    #[test]
    fn frames_run_a_batch_and_reschedule() {
        let queue = FrameQueue::new();
        let mut graph = pair();
        let mut layout = ForceLayout::new(restless())
            .unwrap()
            .with_scheduler(queue.clone());

        layout.start();
        assert!(layout.is_running());
        assert!(queue.take());

        assert!(layout.run_frame(&mut graph));
        assert_eq!(layout.iteration(), TICKS_PER_FRAME);
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn bounded_run_stops_at_iteration_cap() {
        let queue = FrameQueue::new();
        let mut graph = pair();
        let mut layout = ForceLayout::new(restless().with_max_iterations(4))
            .unwrap()
            .with_scheduler(queue.clone());
        let stops = Rc::new(Cell::new(0));
        let seen = stops.clone();
        layout.on_stop(move || seen.set(seen.get() + 1));

        layout.start();
        while queue.take() {
            layout.run_frame(&mut graph);
        }

        assert_eq!(layout.iteration(), 4);
        assert!(!layout.is_running());
        assert_eq!(stops.get(), 1);
    }

    #[test]
    fn animated_run_ignores_convergence() {
        let queue = FrameQueue::new();
        let mut graph = GraphStore::new();
        graph.add_node(0.0, 0.0, 1.0);
        let mut layout = ForceLayout::new(LayoutConfig::default().with_max_iterations(2))
            .unwrap()
            .with_scheduler(queue.clone());

        layout.set_animated(true);
        for _ in 0..5 {
            assert!(queue.take());
            assert!(layout.run_frame(&mut graph));
        }
        assert_eq!(layout.iteration(), 5 * TICKS_PER_FRAME);

        layout.set_animated(false);
        assert!(queue.take());
        assert!(!layout.run_frame(&mut graph));
        assert!(!layout.is_running());
    }

    #[test]
    fn stop_is_checked_before_the_next_frame() {
        let queue = FrameQueue::new();
        let mut graph = pair();
        let mut layout = ForceLayout::new(restless())
            .unwrap()
            .with_scheduler(queue.clone());
        let stops = Rc::new(Cell::new(0));
        let seen = stops.clone();
        layout.on_stop(move || seen.set(seen.get() + 1));

        layout.start();
        layout.stop();
        layout.stop();

        assert!(queue.take());
        assert!(!layout.run_frame(&mut graph));
        assert_eq!(layout.iteration(), 0);
        assert_eq!(stops.get(), 1);
    }

    #[test]
    fn tick_callback_sees_every_iteration() {
        let mut graph = pair();
        let mut layout = ForceLayout::new(restless()).unwrap();
        let ticks = Rc::new(Cell::new(0));
        let seen = ticks.clone();
        layout.on_tick(move |iteration, max_velocity| {
            assert!(max_velocity.is_finite());
            seen.set(iteration);
        });

        layout.step(&mut graph, 7);

        assert_eq!(ticks.get(), 7);
    }

    #[test]
    fn pinning_zeroes_velocity() {
        let mut graph = pair();
        let mut layout = ForceLayout::new(restless()).unwrap();
        layout.step(&mut graph, 3);
        assert_ne!(layout.velocities()[0], [0.0, 0.0]);

        layout.pin(0);
        assert!(layout.is_pinned(0));
        assert_eq!(layout.velocities()[0], [0.0, 0.0]);

        layout.unpin(0);
        assert!(!layout.is_pinned(0));
    }

    #[test]
    fn pinning_an_unknown_id_is_harmless() {
        let mut graph = pair();
        let mut layout = ForceLayout::new(restless()).unwrap();
        layout.pin(10_000);
        layout.step(&mut graph, 1);
        assert!(layout.is_pinned(10_000));
    }

    #[test]
    fn buffers_grow_and_keep_contents() {
        let mut graph = pair();
        let mut layout = ForceLayout::new(restless()).unwrap();
        layout.step(&mut graph, 2);
        let before = layout.velocities()[0];
        assert_eq!(layout.velocities().len(), MIN_BUFFER_LEN);

        for i in 0..100 {
            graph.add_node(i as f32 * 0.01, 0.5, 1.0);
        }
        layout.ensure_capacity(graph.node_capacity());

        assert!(layout.velocities().len() >= graph.node_capacity());
        assert_eq!(layout.velocities().len(), layout.forces().len());
        assert_eq!(layout.velocities()[0], before);
    }

    #[test]
    fn reused_ids_start_at_rest() {
        let mut graph = pair();
        let mut layout = ForceLayout::new(restless()).unwrap();
        layout.step(&mut graph, 5);

        graph.remove_node(1);
        layout.step(&mut graph, 1);
        let reused = graph.add_node(0.3, 0.4, 1.0);
        assert_eq!(reused, 1);
        assert_ne!(layout.velocities()[1], [0.0, 0.0]);

        let mut fresh_graph = graph.clone();
        let mut fresh = ForceLayout::new(restless()).unwrap();
        fresh.step(&mut fresh_graph, 1);
        layout.step(&mut graph, 1);

        assert_eq!(layout.velocities()[1], fresh.velocities()[1]);
    }

    #[test]
    fn id_reused_between_ticks_starts_at_rest() {
        let mut graph = pair();
        let mut layout = ForceLayout::new(restless()).unwrap();
        layout.step(&mut graph, 5);
        assert_ne!(layout.velocities()[1], [0.0, 0.0]);

        // No tick sees the slot inactive
        graph.remove_node(1);
        let reused = graph.add_node(0.3, 0.4, 1.0);
        assert_eq!(reused, 1);

        let mut fresh_graph = graph.clone();
        let mut fresh = ForceLayout::new(restless()).unwrap();
        fresh.step(&mut fresh_graph, 1);
        layout.step(&mut graph, 1);

        assert_eq!(layout.velocities()[1], fresh.velocities()[1]);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        assert!(ForceLayout::new(LayoutConfig::default().with_max_velocity(-0.5)).is_err());
        assert!(ForceLayout::new(LayoutConfig::default().with_timestep(0.0)).is_err());
    }

    #[test]
    fn set_config_validates() {
        let mut layout = ForceLayout::new(LayoutConfig::default()).unwrap();
        assert!(layout.set_config(LayoutConfig::default().with_timestep(-1.0)).is_err());
        assert!(layout.set_config(LayoutConfig::default().with_theta(0.0)).is_ok());
        assert_eq!(layout.config().barnes_hut_theta, 0.0);
    }
}
