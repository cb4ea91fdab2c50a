use glam::{EulerRot, Mat4, Quat, Vec3};

/// Continuous yaw drift, radians per second. Matches the reference look of
/// 0.002 rad per frame at 60 fps but stays display-rate independent.
pub const SPIN_RATE: f32 = 0.12;

const FLOAT_AMPLITUDE_X: f32 = 0.03;
const FLOAT_AMPLITUDE_Y: f32 = 0.05;

/// One animated vehicle in the backdrop. Either idle-floating around its
/// target position or pinned to the pointer while dragged.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: u32,
    pub position: Vec3,
    /// Anchor the idle float oscillates around; snapped to the drag plane
    /// while the node is dragged.
    pub target_position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub scale: f32,
    pub base_scale: f32,
    /// Body panel color, linear RGBA.
    pub tint: [f32; 4],
    pub is_dragging: bool,
}

impl Node {
    /// Idle-float step: offset the position from the target by small
    /// sinusoids of wall-clock time, phase-shifted per node, and keep the
    /// yaw drifting. Dragged nodes are left where the pointer put them.
    pub fn float_step(&mut self, index: usize, t: f32, dt: f32) {
        if self.is_dragging {
            return;
        }
        let phase = index as f32;
        let float_x = (t * 0.5 + phase).cos() * FLOAT_AMPLITUDE_X;
        let float_y = (t + phase).sin() * FLOAT_AMPLITUDE_Y;
        self.position = self.target_position + Vec3::new(float_x, float_y, 0.0);
        self.yaw += SPIN_RATE * dt;
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, self.roll),
            self.position,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node() -> Node {
        Node {
            id: 0,
            position: Vec3::new(1.0, 2.0, 3.0),
            target_position: Vec3::new(1.0, 2.0, 3.0),
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            scale: 1.0,
            base_scale: 1.0,
            tint: [1.0, 0.5, 0.2, 1.0],
            is_dragging: false,
        }
    }

    #[test]
    fn float_step_stays_within_amplitude_of_target() {
        let mut node = test_node();
        for step in 0..200 {
            node.float_step(3, step as f32 * 0.016, 0.016);
            let offset = node.position - node.target_position;
            assert!(offset.x.abs() <= FLOAT_AMPLITUDE_X + 1e-6);
            assert!(offset.y.abs() <= FLOAT_AMPLITUDE_Y + 1e-6);
            assert_eq!(offset.z, 0.0);
        }
    }

    #[test]
    fn dragged_node_ignores_the_float() {
        let mut node = test_node();
        node.is_dragging = true;
        node.position = Vec3::new(-4.0, 0.5, 0.0);
        node.float_step(0, 12.5, 0.016);
        assert_eq!(node.position, Vec3::new(-4.0, 0.5, 0.0));
        assert_eq!(node.yaw, 0.0);
    }

    #[test]
    fn yaw_advances_with_elapsed_time() {
        let mut node = test_node();
        node.float_step(0, 0.0, 0.5);
        assert!((node.yaw - SPIN_RATE * 0.5).abs() < 1e-6);
    }
}
