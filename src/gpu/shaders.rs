//! WGSL compute shaders for the GPU layout
//!
//! Five passes run in strict order each tick: reset, repulsion (brute
//! force, one lane per node), springs (one lane per edge), central gravity and
//! integration. Constants are formatted in from `crate::forces` so both
//! backends evaluate the same model.

use crate::forces::{COINCIDENT_DIST_SQ, JITTER, SOFTENING};

/// Fixed-point scale for atomic spring accumulation
pub const FIXED_SCALE: f32 = 65536.0;

/// Common type definitions, bindings and helpers shared by all passes
pub fn types() -> String {
    format!(
        r#"
const SOFTENING: f32 = {SOFTENING:?};
const COINCIDENT_DIST_SQ: f32 = {COINCIDENT_DIST_SQ:?};
const JITTER: f32 = {JITTER:?};
const FIXED_SCALE: f32 = {FIXED_SCALE:?};
const FIXED_LIMIT: f32 = 2147483520.0;

struct Params {{
    gravitational_constant: f32,
    spring_length: f32,
    spring_constant: f32,
    central_gravity: f32,
    damping: f32,
    timestep: f32,
    max_velocity: f32,
    node_count: u32,
    edge_count: u32,
    atomic_springs: u32,
    _pad0: u32,
    _pad1: u32,
}}

struct Edge {{
    source: u32,
    target: u32,
    active: u32,
    _padding: u32,
}}

@group(0) @binding(0) var<storage, read_write> positions: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read> sizes: array<f32>;
@group(0) @binding(2) var<storage, read> edges: array<Edge>;
@group(0) @binding(3) var<storage, read_write> velocities: array<vec2<f32>>;
@group(0) @binding(4) var<storage, read_write> forces: array<vec2<f32>>;
@group(0) @binding(5) var<storage, read> pinned: array<u32>;
@group(0) @binding(6) var<storage, read_write> spring_fixed: array<atomic<i32>>;
@group(0) @binding(7) var<uniform> params: Params;

fn is_active(i: u32) -> bool {{
    return i < params.node_count && sizes[i] > 0.0;
}}

fn pair_hash(a: u32, b: u32) -> u32 {{
    let lo = min(a, b);
    let hi = max(a, b);
    var h = (lo * 0x9E3779B1u) ^ (hi * 0x85EBCA77u);
    h ^= h >> 16u;
    h *= 0x7FEB352Du;
    h ^= h >> 15u;
    h *= 0x846CA68Bu;
    h ^= h >> 16u;
    return h;
}}

fn jitter(i: u32, j: u32) -> vec2<f32> {{
    let h = pair_hash(i, j);
    let jx = (f32(h & 0xffffu) / 65535.0 - 0.5) * JITTER;
    let jy = (f32(h >> 16u) / 65535.0 - 0.5) * JITTER;
    if (i < j) {{
        return vec2<f32>(jx, jy);
    }}
    return vec2<f32>(-jx, -jy);
}}

fn separation(i: u32, pi: vec2<f32>, j: u32, pj: vec2<f32>) -> vec2<f32> {{
    let d = pj - pi;
    if (d.x * d.x + d.y * d.y < COINCIDENT_DIST_SQ) {{
        return jitter(i, j);
    }}
    return d;
}}

fn inverse_square(delta: vec2<f32>, gm: f32) -> vec2<f32> {{
    let d2 = delta.x * delta.x + delta.y * delta.y + SOFTENING;
    return delta * (gm / (d2 * sqrt(d2)));
}}

fn to_fixed(v: f32) -> i32 {{
    return i32(round(clamp(v * FIXED_SCALE, -FIXED_LIMIT, FIXED_LIMIT)));
}}
"#
    )
}

/// Pass 1: zero every force slot
pub const RESET_FORCES: &str = r#"
@compute @workgroup_size(256)
fn reset_forces(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.node_count) {
        return;
    }
    forces[i] = vec2<f32>(0.0, 0.0);
    atomicStore(&spring_fixed[2u * i], 0);
    atomicStore(&spring_fixed[2u * i + 1u], 0);
}
"#;

/// Pass 2: brute-force inverse-square repulsion, each lane owns one node
pub const REPULSION: &str = r#"
@compute @workgroup_size(256)
fn repulsion(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (!is_active(i) || params.gravitational_constant == 0.0) {
        return;
    }

    let p = positions[i];
    var force = vec2<f32>(0.0, 0.0);
    for (var j = 0u; j < params.node_count; j++) {
        if (j == i || !is_active(j)) {
            continue;
        }
        force += inverse_square(separation(i, p, j, positions[j]), params.gravitational_constant);
    }
    forces[i] += force;
}
"#;

/// Pass 3: Hooke springs, one lane per edge
///
/// In racy mode two edges sharing an endpoint may overwrite each other's
/// contribution for that tick.
pub const SPRINGS: &str = r#"
@compute @workgroup_size(256)
fn springs(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let k = global_id.x;
    if (k >= params.edge_count) {
        return;
    }

    let edge = edges[k];
    if (edge.active == 0u || edge.source == edge.target) {
        return;
    }
    if (!is_active(edge.source) || !is_active(edge.target)) {
        return;
    }

    let sep = separation(edge.source, positions[edge.source], edge.target, positions[edge.target]);
    let dist = sqrt(sep.x * sep.x + sep.y * sep.y);
    let f = sep * (params.spring_constant * (dist - params.spring_length) / dist);

    if (params.atomic_springs != 0u) {
        let fx = to_fixed(f.x);
        let fy = to_fixed(f.y);
        atomicAdd(&spring_fixed[2u * edge.source], fx);
        atomicAdd(&spring_fixed[2u * edge.source + 1u], fy);
        atomicAdd(&spring_fixed[2u * edge.target], -fx);
        atomicAdd(&spring_fixed[2u * edge.target + 1u], -fy);
    } else {
        forces[edge.source] += f;
        forces[edge.target] -= f;
    }
}
"#;

/// Pass 4: fold in atomic spring sums, then pull toward the origin
pub const GRAVITY: &str = r#"
@compute @workgroup_size(256)
fn gravity(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.node_count) {
        return;
    }

    var force = forces[i];
    if (params.atomic_springs != 0u) {
        let fx = f32(atomicLoad(&spring_fixed[2u * i]));
        let fy = f32(atomicLoad(&spring_fixed[2u * i + 1u]));
        force += vec2<f32>(fx, fy) / FIXED_SCALE;
    }
    if (is_active(i)) {
        let p = positions[i];
        let d2 = p.x * p.x + p.y * p.y + SOFTENING;
        force += -p * (params.central_gravity / d2);
    }
    forces[i] = force;
}
"#;

/// Pass 5: semi-implicit damped Euler with per-component velocity clamp
pub const INTEGRATE: &str = r#"
@compute @workgroup_size(256)
fn integrate(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (!is_active(i)) {
        return;
    }
    if (pinned[i] != 0u) {
        velocities[i] = vec2<f32>(0.0, 0.0);
        return;
    }

    let limit = vec2<f32>(params.max_velocity, params.max_velocity);
    let f = forces[i];
    var v = velocities[i];
    let a = f - params.damping * v;
    v = clamp(v + a * params.timestep, -limit, limit);
    velocities[i] = v;
    positions[i] += v * params.timestep;
}
"#;

/// Combined shader source for all passes (useful for debugging)
pub fn combined_layout_shader() -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        types(),
        RESET_FORCES,
        REPULSION,
        SPRINGS,
        GRAVITY,
        INTEGRATE
    )
}

/// Per-pass shader sources for pipeline creation
pub struct LayoutShaders {
    pub reset_forces: String,
    pub repulsion: String,
    pub springs: String,
    pub gravity: String,
    pub integrate: String,
}

impl LayoutShaders {
    pub fn new() -> Self {
        let types = types();
        Self {
            reset_forces: format!("{}\n{}", types, RESET_FORCES),
            repulsion: format!("{}\n{}", types, REPULSION),
            springs: format!("{}\n{}", types, SPRINGS),
            gravity: format!("{}\n{}", types, GRAVITY),
            integrate: format!("{}\n{}", types, INTEGRATE),
        }
    }
}

impl Default for LayoutShaders {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_constants_are_formatted_in() {
        let source = types();
        assert!(source.contains(&format!("const SOFTENING: f32 = {SOFTENING:?};")));
        assert!(source.contains(&format!("const JITTER: f32 = {JITTER:?};")));
        assert!(!source.contains("{{"));
    }

    #[test]
    fn every_pass_has_its_entry_point() {
        let shaders = LayoutShaders::new();
        assert!(shaders.reset_forces.contains("fn reset_forces("));
        assert!(shaders.repulsion.contains("fn repulsion("));
        assert!(shaders.springs.contains("fn springs("));
        assert!(shaders.gravity.contains("fn gravity("));
        assert!(shaders.integrate.contains("fn integrate("));
    }

    #[test]
    fn combined_shader_includes_all_passes() {
        let combined = combined_layout_shader();
        for entry in ["reset_forces", "repulsion", "springs", "gravity", "integrate"] {
            assert!(combined.contains(&format!("@compute @workgroup_size(256)\nfn {entry}(")));
        }
    }
}
