//! Semi-implicit damped Euler integration with unit mass

use std::collections::HashSet;

use crate::config::LayoutConfig;
use crate::graph::is_active;

/// Advance every active, unpinned node by one timestep
///
/// `acceleration = force - damping * velocity`, velocity components are
/// clamped to `±max_velocity`, then `position += velocity * timestep`. Pinned
/// nodes get zero velocity and their position is never written.
///
/// Returns the largest node speed seen this tick.
pub fn integrate(
    positions: &mut [[f32; 2]],
    sizes: &[f32],
    velocities: &mut [[f32; 2]],
    forces: &[[f32; 2]],
    pinned: &HashSet<u32>,
    config: &LayoutConfig,
) -> f32 {
    let dt = config.timestep;
    let limit = config.max_velocity;
    let mut max_speed = 0.0f32;

    for (i, (p, &size)) in positions.iter_mut().zip(sizes).enumerate() {
        if !is_active(size) {
            continue;
        }
        let v = &mut velocities[i];
        if pinned.contains(&(i as u32)) {
            *v = [0.0, 0.0];
            continue;
        }
        let f = forces[i];
        for axis in 0..2 {
            let a = f[axis] - config.damping * v[axis];
            v[axis] = (v[axis] + a * dt).clamp(-limit, limit);
            p[axis] += v[axis] * dt;
        }
        max_speed = max_speed.max(v[0].hypot(v[1]));
    }
    max_speed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LayoutConfig {
        LayoutConfig::default()
            .with_damping(0.5)
            .with_timestep(0.1)
            .with_max_velocity(1.0)
    }

    #[test]
    fn applies_semi_implicit_euler() {
        let mut positions = [[0.0, 0.0]];
        let mut velocities = [[0.2, 0.0]];
        let forces = [[1.0, -0.5]];
        let speed = integrate(
            &mut positions,
            &[1.0],
            &mut velocities,
            &forces,
            &HashSet::new(),
            &config(),
        );

        // v = 0.2 + (1.0 - 0.5 * 0.2) * 0.1 = 0.29; p = 0.029
        assert!((velocities[0][0] - 0.29).abs() < 1e-6);
        assert!((velocities[0][1] + 0.05).abs() < 1e-6);
        assert!((positions[0][0] - 0.029).abs() < 1e-6);
        assert!((speed - 0.29f32.hypot(0.05)).abs() < 1e-6);
    }

    #[test]
    fn clamps_each_velocity_component() {
        let mut positions = [[0.0, 0.0]];
        let mut velocities = [[0.0, 0.0]];
        let forces = [[1e6, -1e6]];
        integrate(
            &mut positions,
            &[1.0],
            &mut velocities,
            &forces,
            &HashSet::new(),
            &config(),
        );
        assert_eq!(velocities[0], [1.0, -1.0]);
        assert!((positions[0][0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn pinned_nodes_keep_their_position() {
        let mut positions = [[0.4, 0.4], [0.0, 0.0]];
        let mut velocities = [[0.3, 0.3], [0.0, 0.0]];
        let forces = [[1.0, 1.0], [1.0, 1.0]];
        let pinned = HashSet::from([0]);
        integrate(
            &mut positions,
            &[1.0, 1.0],
            &mut velocities,
            &forces,
            &pinned,
            &config(),
        );
        assert_eq!(positions[0], [0.4, 0.4]);
        assert_eq!(velocities[0], [0.0, 0.0]);
        assert!(positions[1][0] > 0.0);
    }

    #[test]
    fn inactive_nodes_are_skipped() {
        let mut positions = [[0.4, 0.4]];
        let mut velocities = [[0.3, 0.3]];
        let speed = integrate(
            &mut positions,
            &[0.0],
            &mut velocities,
            &[[1.0, 1.0]],
            &HashSet::new(),
            &config(),
        );
        assert_eq!(positions[0], [0.4, 0.4]);
        assert_eq!(speed, 0.0);
    }
}
