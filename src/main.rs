use std::cell::Cell;
use std::rc::Rc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
#[cfg(not(feature = "gpu"))]
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use graphforce::{FrameQueue, GraphFile, GraphStore, LayoutConfig, LayoutEngine, LayoutResult};

mod cli;

use cli::{Args, Backend};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("graphforce=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

fn load_graph(args: &Args) -> anyhow::Result<GraphStore> {
    match &args.input {
        Some(path) => {
            let file = GraphFile::read(path)
                .with_context(|| format!("failed to read graph from {}", path.display()))?;
            Ok(GraphStore::from_file(&file))
        }
        None => Ok(GraphStore::random(
            args.random_nodes,
            args.random_edges,
            args.seed,
        )),
    }
}

#[cfg(feature = "gpu")]
fn build_engine(args: &Args, config: LayoutConfig) -> LayoutResult<LayoutEngine> {
    use graphforce::{GpuOptions, SpringAccumulation};

    let accumulation = if args.atomic_springs {
        SpringAccumulation::Atomic
    } else {
        SpringAccumulation::Racy
    };
    let options = GpuOptions::default()
        .with_steps_per_frame(args.steps_per_frame)
        .with_spring_accumulation(accumulation);

    match args.backend {
        Backend::Cpu => LayoutEngine::new(config),
        Backend::Auto | Backend::Gpu => LayoutEngine::auto(config, options),
    }
}

#[cfg(not(feature = "gpu"))]
fn build_engine(args: &Args, config: LayoutConfig) -> LayoutResult<LayoutEngine> {
    if args.backend == Backend::Gpu || args.atomic_springs {
        warn!(
            steps_per_frame = args.steps_per_frame,
            "built without the `gpu` feature, using the CPU layout"
        );
    }
    LayoutEngine::new(config)
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => LayoutConfig::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => LayoutConfig::default(),
    };
    let mut graph = load_graph(&args)?;

    let frames = FrameQueue::new();
    let mut engine = build_engine(&args, config)?.with_scheduler(frames.clone());
    info!(
        backend = engine.backend_name(),
        nodes = graph.active_node_count(),
        edges = graph.edges().len(),
        "laying out graph"
    );

    let max_velocity = Rc::new(Cell::new(0.0f32));
    let seen = max_velocity.clone();
    engine.on_tick(move |_, velocity| seen.set(velocity));

    if args.animated {
        engine.set_animated(true);
    } else {
        engine.start();
    }

    let mut ran = 0;
    while ran < args.frames && frames.take() {
        engine.run_frame(&mut graph)?;
        ran += 1;
    }
    engine.stop();

    println!(
        "Ran {} iterations in {} frames on {} (max velocity {:.6})",
        engine.iteration(),
        ran,
        engine.backend_name(),
        max_velocity.get()
    );

    if let Some(path) = &args.output {
        graph
            .to_file()
            .write(path)
            .with_context(|| format!("failed to write layout to {}", path.display()))?;
        println!("Wrote layout to {}", path.display());
    }

    Ok(())
}
