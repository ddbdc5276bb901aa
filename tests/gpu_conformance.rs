//! CPU and GPU backends run the same model; small graphs must agree.
#![cfg(feature = "gpu")]

use std::sync::Arc;

use graphforce::gpu::{GpuLayout, request_compute_device};
use graphforce::{ForceLayout, GpuOptions, GraphStore, LayoutConfig, SpringAccumulation};

fn device() -> Option<(Arc<wgpu::Device>, Arc<wgpu::Queue>)> {
    let (device, queue) = request_compute_device()?;
    Some((Arc::new(device), Arc::new(queue)))
}

/// Brute force on the CPU, so both sides sum the same pairs
fn exact() -> LayoutConfig {
    LayoutConfig::default().with_theta(0.0).with_min_velocity(0.0)
}

/// Random nodes joined by a perfect matching, so no two edges share an endpoint
fn matched_graph(n: u32) -> GraphStore {
    let mut graph = GraphStore::random(n as usize, 0, 31);
    for i in (0..n - 1).step_by(2) {
        graph.add_edge(i, i + 1);
    }
    graph
}

fn assert_close(cpu: &[[f32; 2]], gpu: &[[f32; 2]], tolerance: f32) {
    assert_eq!(cpu.len(), gpu.len());
    for (i, (c, g)) in cpu.iter().zip(gpu).enumerate() {
        let err = (c[0] - g[0]).abs().max((c[1] - g[1]).abs());
        assert!(err <= tolerance, "node {i}: cpu {c:?} gpu {g:?}");
    }
}

#[test]
fn single_tick_matches_cpu() {
    let Some((device, queue)) = device() else {
        eprintln!("skipping: no compute adapter");
        return;
    };
    let mut cpu_graph = matched_graph(16);
    let mut gpu_graph = cpu_graph.clone();

    let mut cpu = ForceLayout::new(exact()).unwrap();
    let mut gpu = GpuLayout::new(device, queue, exact(), GpuOptions::default()).unwrap();
    cpu.step(&mut cpu_graph, 1);
    gpu.step(&mut gpu_graph, 1).unwrap();

    assert_close(cpu_graph.positions(), gpu_graph.positions(), 1e-5);
    assert_close(&cpu.velocities()[..16], &gpu.read_velocities().unwrap(), 1e-5);
}

#[test]
fn several_ticks_stay_close_to_cpu() {
    let Some((device, queue)) = device() else {
        eprintln!("skipping: no compute adapter");
        return;
    };
    let mut cpu_graph = matched_graph(24);
    let mut gpu_graph = cpu_graph.clone();

    let mut cpu = ForceLayout::new(exact()).unwrap();
    let mut gpu = GpuLayout::new(device, queue, exact(), GpuOptions::default()).unwrap();
    cpu.step(&mut cpu_graph, 10);
    gpu.step(&mut gpu_graph, 10).unwrap();

    assert_close(cpu_graph.positions(), gpu_graph.positions(), 1e-4);
}

#[test]
fn atomic_springs_match_cpu_on_shared_endpoints() {
    let Some((device, queue)) = device() else {
        eprintln!("skipping: no compute adapter");
        return;
    };
    // Star: every edge shares node 0
    let mut cpu_graph = GraphStore::random(12, 0, 3);
    for i in 1..12 {
        cpu_graph.add_edge(0, i);
    }
    let mut gpu_graph = cpu_graph.clone();

    let options = GpuOptions::default().with_spring_accumulation(SpringAccumulation::Atomic);
    let mut cpu = ForceLayout::new(exact()).unwrap();
    let mut gpu = GpuLayout::new(device, queue, exact(), options).unwrap();
    cpu.step(&mut cpu_graph, 3);
    gpu.step(&mut gpu_graph, 3).unwrap();

    assert_close(cpu_graph.positions(), gpu_graph.positions(), 1e-4);
}

#[test]
fn pinned_and_removed_nodes_agree() {
    let Some((device, queue)) = device() else {
        eprintln!("skipping: no compute adapter");
        return;
    };
    let mut cpu_graph = matched_graph(10);
    cpu_graph.remove_node(7);
    let mut gpu_graph = cpu_graph.clone();

    let mut cpu = ForceLayout::new(exact()).unwrap();
    let mut gpu = GpuLayout::new(device, queue, exact(), GpuOptions::default()).unwrap();
    cpu.pin(2);
    gpu.pin(2);
    cpu.step(&mut cpu_graph, 4);
    gpu.step(&mut gpu_graph, 4).unwrap();

    assert_eq!(gpu_graph.position(2), cpu_graph.position(2));
    assert_eq!(gpu_graph.position(7), cpu_graph.position(7));
    assert_close(cpu_graph.positions(), gpu_graph.positions(), 1e-4);
}

#[test]
fn edits_between_steps_agree() {
    let Some((device, queue)) = device() else {
        eprintln!("skipping: no compute adapter");
        return;
    };
    let mut cpu_graph = matched_graph(12);
    let mut gpu_graph = cpu_graph.clone();
    let mut cpu = ForceLayout::new(exact()).unwrap();
    let mut gpu = GpuLayout::new(device, queue, exact(), GpuOptions::default()).unwrap();
    cpu.step(&mut cpu_graph, 3);
    gpu.step(&mut gpu_graph, 3).unwrap();

    // Node and edge counts stay the same across both edits
    for graph in [&mut cpu_graph, &mut gpu_graph] {
        graph.remove_node(5);
        assert_eq!(graph.add_node(0.4, -0.6, 1.0), 5);
        graph.remove_node(8);
    }
    cpu.step(&mut cpu_graph, 2);
    gpu.step(&mut gpu_graph, 2).unwrap();

    assert_eq!(gpu_graph.position(8), cpu_graph.position(8));
    assert_close(cpu_graph.positions(), gpu_graph.positions(), 1e-4);
    let gpu_velocities = gpu.read_velocities().unwrap();
    assert_close(&cpu.velocities()[5..6], &gpu_velocities[5..6], 1e-4);
}
