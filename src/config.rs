//! Layout configuration
//!
//! Every tunable is independently overridable. Defaults are tuned for node
//! positions normalized into the [-1, 1] square. Config files use the
//! camelCase key names (`gravitationalConstant`, `barnesHutTheta`, ...) and
//! may name any subset of fields.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};

// =============================================================================
// Default Constants
// =============================================================================

/// Default pairwise force constant (negative = repulsion)
pub const DEFAULT_GRAVITATIONAL_CONSTANT: f32 = -0.001;

/// Default spring rest length
pub const DEFAULT_SPRING_LENGTH: f32 = 0.2;

/// Default spring constant
pub const DEFAULT_SPRING_CONSTANT: f32 = 0.06;

/// Default pull toward the origin
pub const DEFAULT_CENTRAL_GRAVITY: f32 = 0.01;

/// Default velocity damping coefficient
pub const DEFAULT_DAMPING: f32 = 0.18;

/// Default integration timestep
pub const DEFAULT_TIMESTEP: f32 = 0.35;

/// Default per-component velocity clamp
pub const DEFAULT_MAX_VELOCITY: f32 = 0.5;

/// Default convergence threshold on the per-tick max speed
pub const DEFAULT_MIN_VELOCITY: f32 = 0.0005;

/// Default Barnes-Hut theta (0 = exact brute force)
pub const DEFAULT_THETA: f32 = 0.5;

/// Default iteration cap for bounded runs
pub const DEFAULT_MAX_ITERATIONS: u32 = 1000;

/// Default number of GPU ticks per scheduled frame
pub const DEFAULT_STEPS_PER_FRAME: u32 = 3;

/// Default node capacity of freshly allocated device buffers
pub const DEFAULT_GPU_CAPACITY: u32 = 64;

/// Physical parameters shared by the CPU and GPU backends
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct LayoutConfig {
    /// Pairwise inverse-square constant; the sign encodes repulsion (negative)
    pub gravitational_constant: f32,
    /// Rest length of every edge spring
    pub spring_length: f32,
    /// Hooke constant of every edge spring
    pub spring_constant: f32,
    /// Strength of the pull toward the origin
    pub central_gravity: f32,
    /// Velocity damping coefficient
    pub damping: f32,
    /// Integration timestep
    pub timestep: f32,
    /// Per-component velocity clamp
    pub max_velocity: f32,
    /// A bounded run stops once the max speed of a tick falls below this
    pub min_velocity: f32,
    /// Cell-size / distance threshold for the quadtree approximation
    pub barnes_hut_theta: f32,
    /// Iteration cap for bounded runs
    pub max_iterations: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            gravitational_constant: DEFAULT_GRAVITATIONAL_CONSTANT,
            spring_length: DEFAULT_SPRING_LENGTH,
            spring_constant: DEFAULT_SPRING_CONSTANT,
            central_gravity: DEFAULT_CENTRAL_GRAVITY,
            damping: DEFAULT_DAMPING,
            timestep: DEFAULT_TIMESTEP,
            max_velocity: DEFAULT_MAX_VELOCITY,
            min_velocity: DEFAULT_MIN_VELOCITY,
            barnes_hut_theta: DEFAULT_THETA,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl LayoutConfig {
    pub fn with_gravitational_constant(mut self, value: f32) -> Self {
        self.gravitational_constant = value;
        self
    }

    pub fn with_spring_length(mut self, value: f32) -> Self {
        self.spring_length = value;
        self
    }

    pub fn with_spring_constant(mut self, value: f32) -> Self {
        self.spring_constant = value;
        self
    }

    pub fn with_central_gravity(mut self, value: f32) -> Self {
        self.central_gravity = value;
        self
    }

    pub fn with_damping(mut self, value: f32) -> Self {
        self.damping = value;
        self
    }

    pub fn with_timestep(mut self, value: f32) -> Self {
        self.timestep = value;
        self
    }

    pub fn with_max_velocity(mut self, value: f32) -> Self {
        self.max_velocity = value;
        self
    }

    pub fn with_min_velocity(mut self, value: f32) -> Self {
        self.min_velocity = value;
        self
    }

    pub fn with_theta(mut self, value: f32) -> Self {
        self.barnes_hut_theta = value;
        self
    }

    pub fn with_max_iterations(mut self, value: u32) -> Self {
        self.max_iterations = value;
        self
    }

    /// Parse a YAML document, filling unspecified fields with defaults
    pub fn from_yaml_str(source: &str) -> LayoutResult<Self> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document, filling unspecified fields with defaults
    pub fn from_json_str(source: &str) -> LayoutResult<Self> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, choosing the format from its extension
    pub fn from_path(path: &Path) -> LayoutResult<Self> {
        let source = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if ext.eq_ignore_ascii_case("json") {
            Self::from_json_str(&source)
        } else if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
            Self::from_yaml_str(&source)
        } else {
            Err(LayoutError::Parse(format!(
                "unsupported config format: {}",
                path.display()
            )))
        }
    }

    /// Check every field against its valid range
    pub fn validate(&self) -> LayoutResult<()> {
        let floats = [
            ("gravitationalConstant", self.gravitational_constant),
            ("springLength", self.spring_length),
            ("springConstant", self.spring_constant),
            ("centralGravity", self.central_gravity),
            ("damping", self.damping),
            ("timestep", self.timestep),
            ("maxVelocity", self.max_velocity),
            ("minVelocity", self.min_velocity),
            ("barnesHutTheta", self.barnes_hut_theta),
        ];
        for (field, value) in floats {
            if !value.is_finite() {
                return Err(LayoutError::invalid(field, "must be finite"));
            }
        }

        if self.spring_length <= 0.0 {
            return Err(LayoutError::invalid("springLength", "must be positive"));
        }
        if self.damping < 0.0 {
            return Err(LayoutError::invalid("damping", "must not be negative"));
        }
        if self.timestep <= 0.0 {
            return Err(LayoutError::invalid("timestep", "must be positive"));
        }
        if self.max_velocity <= 0.0 {
            return Err(LayoutError::invalid("maxVelocity", "must be positive"));
        }
        if self.min_velocity < 0.0 {
            return Err(LayoutError::invalid("minVelocity", "must not be negative"));
        }
        if self.barnes_hut_theta < 0.0 {
            return Err(LayoutError::invalid(
                "barnesHutTheta",
                "must not be negative",
            ));
        }
        if self.max_iterations == 0 {
            return Err(LayoutError::invalid("maxIterations", "must be at least 1"));
        }
        Ok(())
    }
}

/// How the GPU spring pass accumulates into shared endpoint slots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpringAccumulation {
    /// Plain read-modify-write; edges sharing an endpoint may race and drop
    /// a contribution for that tick
    #[default]
    Racy,
    /// Fixed-point atomic adds; no lost contributions, lower throughput
    Atomic,
}

/// Options that only apply to the GPU backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GpuOptions {
    /// Ticks executed back-to-back per scheduled frame
    pub steps_per_frame: u32,
    /// Spring accumulation policy
    pub spring_accumulation: SpringAccumulation,
    /// Node capacity of the first device allocation
    pub initial_capacity: u32,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            steps_per_frame: DEFAULT_STEPS_PER_FRAME,
            spring_accumulation: SpringAccumulation::default(),
            initial_capacity: DEFAULT_GPU_CAPACITY,
        }
    }
}

impl GpuOptions {
    pub fn with_steps_per_frame(mut self, steps: u32) -> Self {
        self.steps_per_frame = steps.max(1);
        self
    }

    pub fn with_spring_accumulation(mut self, policy: SpringAccumulation) -> Self {
        self.spring_accumulation = policy;
        self
    }
}
