pub mod connection;
pub mod layout;
pub mod node;
pub mod vehicle;

use glam::Vec3;

use crate::camera::Ray;
use connection::Connection;
use layout::{ClusterSpec, Lcg, LAYOUT_SEED};
use node::Node;

/// Scale multiplier applied to a node while it is picked up.
const PICKED_SCALE: f32 = 1.2;

/// The in-memory scene: every node and connection, plus the drag state.
/// Owned by the render state and rebuilt from scratch on every mount.
#[derive(Debug)]
pub struct Scene {
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
    /// World-space pick radius of the shared mesh at scale 1.0.
    pick_radius: f32,
    dragged: Option<usize>,
}

impl Scene {
    pub fn new(clusters: &[ClusterSpec], pick_radius: f32) -> Self {
        let mut rng = Lcg::new(LAYOUT_SEED);
        let nodes = layout::spawn_nodes(clusters, &mut rng);
        let connections = layout::connect_nodes(&nodes, &mut rng);
        log::info!(
            "Scene built: {} nodes in {} clusters, {} connections.",
            nodes.len(),
            clusters.len(),
            connections.len()
        );
        Self { nodes, connections, pick_radius, dragged: None }
    }

    /// Replaces the layout wholesale (host-page override). Any in-flight
    /// drag is dropped with the old nodes.
    pub fn rebuild(&mut self, clusters: &[ClusterSpec]) {
        *self = Scene::new(clusters, self.pick_radius);
    }

    /// Per-frame animation step for every idle node.
    pub fn advance(&mut self, t: f32, dt: f32) {
        for (index, node) in self.nodes.iter_mut().enumerate() {
            node.float_step(index, t, dt);
        }
    }

    pub fn dragging(&self) -> Option<usize> {
        self.dragged
    }

    /// Nearest node whose bounding sphere the ray hits.
    pub fn pick(&self, ray: &Ray) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (index, node) in self.nodes.iter().enumerate() {
            let radius = self.pick_radius * node.scale;
            if let Some(t) = ray.intersect_sphere(node.position, radius) {
                if best.map_or(true, |(_, best_t)| t < best_t) {
                    best = Some((index, t));
                }
            }
        }
        best.map(|(index, _)| index)
    }

    /// Pointer-down on a node: flag it and scale it up as the pick-up
    /// affordance.
    pub fn begin_drag(&mut self, index: usize) {
        if index >= self.nodes.len() {
            return;
        }
        self.end_drag();
        let node = &mut self.nodes[index];
        node.is_dragging = true;
        node.scale = node.base_scale * PICKED_SCALE;
        self.dragged = Some(index);
    }

    /// Pointer-move while dragging: snap the node (and its float anchor) to
    /// the projected point; incident connections follow on the next frame's
    /// endpoint rebuild.
    pub fn drag_to(&mut self, point: Vec3) {
        if let Some(index) = self.dragged {
            let node = &mut self.nodes[index];
            node.position = point;
            node.target_position = point;
        }
    }

    /// Pointer-up: restore the original scale and return to idle floating.
    pub fn end_drag(&mut self) {
        if let Some(index) = self.dragged.take() {
            let node = &mut self.nodes[index];
            node.is_dragging = false;
            node.scale = node.base_scale;
        }
    }

    /// Current endpoints of a connection, derived from live node positions.
    pub fn connection_endpoints(&self, connection: &Connection) -> (Vec3, Vec3) {
        (
            self.nodes[connection.from].position,
            self.nodes[connection.to].position,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use glam::Vec2;
    use layout::DEFAULT_CLUSTERS;

    fn test_scene() -> Scene {
        Scene::new(DEFAULT_CLUSTERS, 1.2)
    }

    #[test]
    fn scene_is_never_empty() {
        let scene = test_scene();
        assert!(!scene.nodes.is_empty());
        assert!(!scene.connections.is_empty());
    }

    #[test]
    fn drag_moves_every_incident_connection_endpoint() {
        let mut scene = test_scene();
        scene.begin_drag(0);
        let destination = Vec3::new(5.0, -3.0, 0.0);
        scene.drag_to(destination);

        let incident: Vec<_> = scene
            .connections
            .iter()
            .filter(|c| c.from == 0 || c.to == 0)
            .collect();
        assert!(!incident.is_empty());
        for connection in incident {
            let (from, to) = scene.connection_endpoints(connection);
            let moved_end = if connection.from == 0 { from } else { to };
            assert_eq!(moved_end, destination);
        }
    }

    #[test]
    fn drag_pins_the_node_through_animation_frames() {
        let mut scene = test_scene();
        scene.begin_drag(2);
        let destination = Vec3::new(-1.0, 4.0, 0.0);
        scene.drag_to(destination);
        scene.advance(10.0, 0.016);
        assert_eq!(scene.nodes[2].position, destination);
        // Idle nodes keep floating meanwhile
        assert_ne!(scene.nodes[0].position, scene.nodes[0].target_position);
    }

    #[test]
    fn release_restores_the_original_scale() {
        let mut scene = test_scene();
        let original = scene.nodes[1].scale;
        scene.begin_drag(1);
        assert!(scene.nodes[1].scale > original);
        assert!(scene.nodes[1].is_dragging);
        scene.end_drag();
        assert_eq!(scene.nodes[1].scale, original);
        assert!(!scene.nodes[1].is_dragging);
        assert!(scene.dragging().is_none());
    }

    #[test]
    fn starting_a_new_drag_releases_the_previous_one() {
        let mut scene = test_scene();
        scene.begin_drag(0);
        scene.begin_drag(1);
        assert!(!scene.nodes[0].is_dragging);
        assert_eq!(scene.nodes[0].scale, scene.nodes[0].base_scale);
        assert_eq!(scene.dragging(), Some(1));
    }

    #[test]
    fn pick_through_a_node_center_finds_it() {
        let mut scene = test_scene();
        // Park a node on the view axis so the center ray must hit it
        scene.nodes[4].position = Vec3::ZERO;
        scene.nodes[4].target_position = Vec3::ZERO;
        let camera = Camera::new(800, 600);
        let ray = camera.screen_to_ray(Vec2::new(400.0, 300.0));
        assert_eq!(scene.pick(&ray), Some(4));
    }

    #[test]
    fn pick_misses_empty_space() {
        let scene = test_scene();
        let camera = Camera::new(800, 600);
        // Clusters sit on the left; the far right edge is empty
        let ray = camera.screen_to_ray(Vec2::new(799.0, 1.0));
        assert_eq!(scene.pick(&ray), None);
    }

    #[test]
    fn rebuild_swaps_the_layout_and_cancels_drags() {
        let mut scene = test_scene();
        scene.begin_drag(0);
        let clusters = vec![ClusterSpec { center: [0.0, 0.0, 0.0], count: 3 }];
        scene.rebuild(&clusters);
        assert_eq!(scene.nodes.len(), 3);
        assert!(scene.dragging().is_none());
    }
}
