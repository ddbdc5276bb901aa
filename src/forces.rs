//! The physical model shared by both backends
//!
//! Every formula and constant here is mirrored verbatim by the WGSL passes in
//! `gpu::shaders`, which format these constants into their source. All forces
//! assume unit mass per node.
//!
//! Near-zero distances are handled one way everywhere: an additive
//! [`SOFTENING`] term on the squared distance, and for exactly coincident
//! points a deterministic jitter derived from the id pair. The jitter is
//! antisymmetric in the pair, so Newton's third law holds bit-for-bit.

use crate::graph::{Edge, is_active};

/// Additive term on squared distances; keeps inverse-square forces finite
pub const SOFTENING: f32 = 1e-6;

/// Squared separation below which two points count as coincident
pub const COINCIDENT_DIST_SQ: f32 = 1e-12;

/// Magnitude of the synthetic offset given to coincident pairs
pub const JITTER: f32 = 1e-3;

/// Integer hash of an unordered id pair
#[inline]
pub fn pair_hash(a: u32, b: u32) -> u32 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    let mut h = lo.wrapping_mul(0x9E37_79B1) ^ hi.wrapping_mul(0x85EB_CA77);
    h ^= h >> 16;
    h = h.wrapping_mul(0x7FEB_352D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846C_A68B);
    h ^= h >> 16;
    h
}

/// Synthetic separation from `i` to `j`; `jitter(j, i) == -jitter(i, j)`
#[inline]
pub fn jitter(i: u32, j: u32) -> [f32; 2] {
    let h = pair_hash(i, j);
    let jx = ((h & 0xffff) as f32 / 65535.0 - 0.5) * JITTER;
    let jy = ((h >> 16) as f32 / 65535.0 - 0.5) * JITTER;
    if i < j { [jx, jy] } else { [-jx, -jy] }
}

/// Vector from node `i` to node `j`, jittered if the two coincide
#[inline]
pub fn separation(i: u32, pi: [f32; 2], j: u32, pj: [f32; 2]) -> [f32; 2] {
    let d = [pj[0] - pi[0], pj[1] - pi[1]];
    if d[0] * d[0] + d[1] * d[1] < COINCIDENT_DIST_SQ {
        jitter(i, j)
    } else {
        d
    }
}

/// Inverse-square force on a unit mass at the origin of `delta` from a
/// mass `gm` (constant times mass) at `delta`
#[inline]
pub fn inverse_square(delta: [f32; 2], gm: f32) -> [f32; 2] {
    let d2 = delta[0] * delta[0] + delta[1] * delta[1] + SOFTENING;
    let s = gm / (d2 * d2.sqrt());
    [delta[0] * s, delta[1] * s]
}

/// Force on node `i` from node `j`; magnitude `g / dist²`, along `j - i`
#[inline]
pub fn pair_repulsion(i: u32, pi: [f32; 2], j: u32, pj: [f32; 2], g: f32) -> [f32; 2] {
    inverse_square(separation(i, pi, j, pj), g)
}

/// Spring force on `source`; the target receives the negation
#[inline]
pub fn spring_force(
    source: u32,
    ps: [f32; 2],
    target: u32,
    pt: [f32; 2],
    spring_length: f32,
    spring_constant: f32,
) -> [f32; 2] {
    let sep = separation(source, ps, target, pt);
    let dist = (sep[0] * sep[0] + sep[1] * sep[1]).sqrt();
    let coef = spring_constant * (dist - spring_length) / dist;
    [sep[0] * coef, sep[1] * coef]
}

/// Pull toward the origin with magnitude `central_gravity / dist`
#[inline]
pub fn central_gravity(p: [f32; 2], central_gravity: f32) -> [f32; 2] {
    let d2 = p[0] * p[0] + p[1] * p[1] + SOFTENING;
    let s = central_gravity / d2;
    [-p[0] * s, -p[1] * s]
}

#[inline]
pub(crate) fn add(acc: &mut [f32; 2], f: [f32; 2]) {
    acc[0] += f[0];
    acc[1] += f[1];
}

#[inline]
pub(crate) fn sub(acc: &mut [f32; 2], f: [f32; 2]) {
    acc[0] -= f[0];
    acc[1] -= f[1];
}

/// Exact O(n²) repulsion between every pair of active nodes
pub fn accumulate_brute_force(
    positions: &[[f32; 2]],
    sizes: &[f32],
    forces: &mut [[f32; 2]],
    g: f32,
) {
    let n = positions.len().min(sizes.len());
    for i in 0..n {
        if !is_active(sizes[i]) {
            continue;
        }
        for j in (i + 1)..n {
            if !is_active(sizes[j]) {
                continue;
            }
            let f = pair_repulsion(i as u32, positions[i], j as u32, positions[j], g);
            add(&mut forces[i], f);
            sub(&mut forces[j], f);
        }
    }
}

/// Hooke springs along every live edge
pub fn accumulate_springs(
    positions: &[[f32; 2]],
    sizes: &[f32],
    edges: &[Edge],
    forces: &mut [[f32; 2]],
    spring_length: f32,
    spring_constant: f32,
) {
    let live = |id: u32| sizes.get(id as usize).is_some_and(|&s| is_active(s));
    for edge in edges {
        if !edge.active || !live(edge.source) || !live(edge.target) {
            continue;
        }
        let (s, t) = (edge.source as usize, edge.target as usize);
        if s == t {
            continue;
        }
        let f = spring_force(
            edge.source,
            positions[s],
            edge.target,
            positions[t],
            spring_length,
            spring_constant,
        );
        add(&mut forces[s], f);
        sub(&mut forces[t], f);
    }
}

/// Central gravity on every active node
pub fn accumulate_gravity(
    positions: &[[f32; 2]],
    sizes: &[f32],
    forces: &mut [[f32; 2]],
    strength: f32,
) {
    for (i, (p, &size)) in positions.iter().zip(sizes).enumerate() {
        if is_active(size) {
            add(&mut forces[i], central_gravity(*p, strength));
        }
    }
}
