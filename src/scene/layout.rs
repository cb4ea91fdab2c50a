// Procedural placement: nodes scattered on jittered rings around a fixed
// set of cluster centers, then linked by proximity with occasional
// long-range noise links.
use bevy_color::{ColorToComponents, Hsla, LinearRgba};
use glam::Vec3;
use serde::Deserialize;

use super::connection::Connection;
use super::node::Node;

/// Fixed seed so every page view produces the same layout.
pub const LAYOUT_SEED: u32 = 123456789;

/// Connect any pair closer than this.
pub const LINK_DISTANCE: f32 = 3.0;
/// Chance of a long-range noise link for pairs beyond `LINK_DISTANCE`:
/// a draw above the cutoff adds the link anyway.
pub const LONG_LINK_CUTOFF: f32 = 0.86;

pub const RING_RADIUS_BASE: f32 = 0.8;
pub const RING_RADIUS_JITTER: f32 = 1.2;
/// Extra planar scatter on top of the ring radius (total span, centered).
pub const PLANAR_JITTER: f32 = 0.4;
/// Depth scatter around the cluster plane (total span, centered).
pub const DEPTH_JITTER: f32 = 1.2;

/// Upper bound on a node's x/y offset from its cluster center.
pub const MAX_PLANAR_OFFSET: f32 = RING_RADIUS_BASE + RING_RADIUS_JITTER + PLANAR_JITTER / 2.0;

/// One spatial cluster: a center and how many nodes to scatter around it.
/// Deserializable so the host page can override the built-in table.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSpec {
    pub center: [f32; 3],
    pub count: u32,
}

/// City-like density on the left of the viewport, clear of the hero copy.
pub const DEFAULT_CLUSTERS: &[ClusterSpec] = &[
    ClusterSpec { center: [-12.0, 2.0, 0.0], count: 8 },
    ClusterSpec { center: [-8.0, -1.0, 1.0], count: 6 },
    ClusterSpec { center: [-10.0, 4.0, -2.0], count: 5 },
    ClusterSpec { center: [-14.0, -2.0, 1.0], count: 7 },
    ClusterSpec { center: [-6.0, 1.0, 2.0], count: 4 },
];

/// Linear congruential generator (Numerical Recipes constants). Small state,
/// deterministic, and all we need for decorative scatter.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Next sample in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        self.state = self.state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.state as f32 / 4_294_967_296.0
    }
}

/// Places nodes on a jittered ring inside each cluster and bakes their
/// per-node render attributes (tint, heading, scale) from the same stream.
pub fn spawn_nodes(clusters: &[ClusterSpec], rng: &mut Lcg) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut node_id: u32 = 0;

    for cluster in clusters {
        let center = Vec3::from_array(cluster.center);
        let count = cluster.count.max(1);
        for i in 0..count {
            let angle = (i as f32 / count as f32) * std::f32::consts::TAU;
            let radius = RING_RADIUS_BASE + rng.next_f32() * RING_RADIUS_JITTER;
            let x = center.x + angle.cos() * radius + (rng.next_f32() - 0.5) * PLANAR_JITTER;
            let y = center.y + angle.sin() * radius + (rng.next_f32() - 0.5) * PLANAR_JITTER;
            let z = center.z + (rng.next_f32() - 0.5) * DEPTH_JITTER;

            // Warm brand-adjacent tint with slight per-vehicle variation
            let hue = (0.03 + rng.next_f32() * 0.02) * 360.0;
            let saturation = 0.8 + rng.next_f32() * 0.2;
            let lightness = 0.4 + rng.next_f32() * 0.2;
            let tint = LinearRgba::from(Hsla::new(hue, saturation, lightness, 1.0)).to_f32_array();

            let pitch = (rng.next_f32() - 0.5) * 0.1;
            let yaw = rng.next_f32() * std::f32::consts::TAU;
            let roll = (rng.next_f32() - 0.5) * 0.05;
            let scale = 0.8 + rng.next_f32() * 0.4;

            let position = Vec3::new(x, y, z);
            nodes.push(Node {
                id: node_id,
                position,
                target_position: position,
                yaw,
                pitch,
                roll,
                scale,
                base_scale: scale,
                tint,
                is_dragging: false,
            });
            node_id += 1;
        }
    }

    nodes
}

/// Pairwise scan over all unordered node pairs. O(n²), fine at a few dozen
/// nodes. Close pairs always connect; distant pairs connect with a small
/// independent chance so a few long links cross the scene.
pub fn connect_nodes(nodes: &[Node], rng: &mut Lcg) -> Vec<Connection> {
    let mut connections = Vec::new();
    for i in 0..nodes.len() {
        for j in (i + 1)..nodes.len() {
            let distance = nodes[i].position.distance(nodes[j].position);
            if distance < LINK_DISTANCE || rng.next_f32() > LONG_LINK_CUTOFF {
                connections.push(Connection { from: i, to: j });
            }
        }
    }
    connections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lcg_is_deterministic_and_in_range() {
        let mut a = Lcg::new(LAYOUT_SEED);
        let mut b = Lcg::new(LAYOUT_SEED);
        for _ in 0..1000 {
            let sample = a.next_f32();
            assert_eq!(sample, b.next_f32());
            assert!((0.0..1.0).contains(&sample));
        }
    }

    #[test]
    fn spawn_produces_the_full_node_count() {
        let mut rng = Lcg::new(LAYOUT_SEED);
        let nodes = spawn_nodes(DEFAULT_CLUSTERS, &mut rng);
        let expected: u32 = DEFAULT_CLUSTERS.iter().map(|c| c.count).sum();
        assert_eq!(nodes.len() as u32, expected);
        // Ids are dense and orderd
        for (i, node) in nodes.iter().enumerate() {
            assert_eq!(node.id as usize, i);
        }
    }

    #[test]
    fn nodes_stay_within_cluster_jitter_bounds() {
        let mut rng = Lcg::new(LAYOUT_SEED);
        let mut offset = 0usize;
        let nodes = spawn_nodes(DEFAULT_CLUSTERS, &mut rng);
        for cluster in DEFAULT_CLUSTERS {
            let center = Vec3::from_array(cluster.center);
            for node in &nodes[offset..offset + cluster.count as usize] {
                let delta = node.position - center;
                assert!(delta.x.abs() <= MAX_PLANAR_OFFSET + 1e-4);
                assert!(delta.y.abs() <= MAX_PLANAR_OFFSET + 1e-4);
                assert!(delta.z.abs() <= DEPTH_JITTER / 2.0 + 1e-4);
            }
            offset += cluster.count as usize;
        }
    }

    #[test]
    fn every_close_pair_is_connected() {
        let mut rng = Lcg::new(LAYOUT_SEED);
        let nodes = spawn_nodes(DEFAULT_CLUSTERS, &mut rng);
        let connections = connect_nodes(&nodes, &mut rng);
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                if nodes[i].position.distance(nodes[j].position) < LINK_DISTANCE {
                    assert!(
                        connections.iter().any(|c| c.from == i && c.to == j),
                        "pair ({i}, {j}) under the threshold has no connection"
                    );
                }
            }
        }
    }

    #[test]
    fn connections_reference_valid_node_indices() {
        let mut rng = Lcg::new(LAYOUT_SEED);
        let nodes = spawn_nodes(DEFAULT_CLUSTERS, &mut rng);
        let connections = connect_nodes(&nodes, &mut rng);
        assert!(!connections.is_empty());
        for connection in &connections {
            assert!(connection.from < connection.to);
            assert!(connection.to < nodes.len());
        }
    }

    #[test]
    fn cluster_spec_deserializes_from_host_json() {
        let json = r#"[{"center": [-4.0, 1.5, 0.0], "count": 3}]"#;
        let clusters: Vec<ClusterSpec> = serde_json::from_str(json).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].count, 3);
        let mut rng = Lcg::new(LAYOUT_SEED);
        assert_eq!(spawn_nodes(&clusters, &mut rng).len(), 3);
    }
}
