use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Which layout backend to run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// GPU when a compute device is available, CPU otherwise
    Auto,
    Cpu,
    Gpu,
}

#[derive(Parser, Debug)]
#[command(name = "graphforce")]
#[command(version, about = "Force-directed graph layout", long_about = None)]
pub struct Args {
    /// Input graph file (JSON with `nodes` and `edges`)
    #[arg(short, long, conflicts_with = "random_nodes")]
    pub input: Option<PathBuf>,

    /// Generate a random graph with this many nodes instead of reading one
    #[arg(long, default_value = "200")]
    pub random_nodes: usize,

    /// Number of edges in the random graph
    #[arg(long, default_value = "300")]
    pub random_edges: usize,

    /// Seed for the random graph
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Layout config file (.yaml, .yml or .json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Layout backend
    #[arg(short, long, value_enum, default_value = "auto")]
    pub backend: Backend,

    /// GPU ticks per frame
    #[arg(long, default_value = "3")]
    pub steps_per_frame: u32,

    /// Accumulate GPU spring forces with atomics instead of racy adds
    #[arg(long)]
    pub atomic_springs: bool,

    /// Keep running after convergence until the frame budget is spent
    #[arg(long)]
    pub animated: bool,

    /// Maximum number of frames to run
    #[arg(short, long, default_value = "1000")]
    pub frames: u32,

    /// Write the final graph (positions and edges) here
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
