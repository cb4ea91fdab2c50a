// The shuttle model as data: a table of shape primitives with placement and
// material, fed through one generic assembler. The table is the single
// source of truth for the procedural fallback mesh.
use bevy_color::{ColorToComponents, LinearRgba, Srgba};
use glam::{Quat, Vec3};

use crate::models::MeshVertex;

#[derive(Debug, Clone, Copy)]
pub enum PartShape {
    Box { half_extents: Vec3 },
    Cylinder { radius: f32, half_height: f32, segments: u32 },
    Sphere { radius: f32, segments: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct PartDef {
    pub shape: PartShape,
    pub offset: Vec3,
    /// Rotation around the part's local z axis, radians.
    pub rotation_z: f32,
    /// sRGB base color.
    pub color: [u8; 3],
    pub alpha: f32,
    /// 1.0 where the per-node body tint replaces the base color.
    pub tint_weight: f32,
}

const WHEEL: PartShape = PartShape::Cylinder { radius: 0.15, half_height: 0.05, segments: 8 };
const HEADLIGHT: PartShape = PartShape::Sphere { radius: 0.08, segments: 8 };
const FRAC_PI_2: f32 = std::f32::consts::FRAC_PI_2;

/// Body, glazing, wheels, lights, handles, roof rack.
pub const VEHICLE_PARTS: &[PartDef] = &[
    // Elongated main body, recolored per node
    PartDef {
        shape: PartShape::Box { half_extents: Vec3::new(1.0, 0.3, 0.4) },
        offset: Vec3::new(0.0, 0.3, 0.0),
        rotation_z: 0.0,
        color: [0xff, 0x6b, 0x35],
        alpha: 1.0,
        tint_weight: 1.0,
    },
    // Windshield
    PartDef {
        shape: PartShape::Box { half_extents: Vec3::new(0.9, 0.2, 0.01) },
        offset: Vec3::new(0.0, 0.5, 0.41),
        rotation_z: 0.0,
        color: [0x87, 0xce, 0xeb],
        alpha: 0.7,
        tint_weight: 0.0,
    },
    // Side windows
    PartDef {
        shape: PartShape::Box { half_extents: Vec3::new(0.01, 0.15, 0.3) },
        offset: Vec3::new(1.01, 0.45, 0.0),
        rotation_z: 0.0,
        color: [0x87, 0xce, 0xeb],
        alpha: 0.7,
        tint_weight: 0.0,
    },
    PartDef {
        shape: PartShape::Box { half_extents: Vec3::new(0.01, 0.15, 0.3) },
        offset: Vec3::new(-1.01, 0.45, 0.0),
        rotation_z: 0.0,
        color: [0x87, 0xce, 0xeb],
        alpha: 0.7,
        tint_weight: 0.0,
    },
    // Wheels, cylinder axis tipped onto x
    PartDef {
        shape: WHEEL,
        offset: Vec3::new(0.6, 0.15, -0.5),
        rotation_z: FRAC_PI_2,
        color: [0x2a, 0x2a, 0x2a],
        alpha: 1.0,
        tint_weight: 0.0,
    },
    PartDef {
        shape: WHEEL,
        offset: Vec3::new(0.6, 0.15, 0.5),
        rotation_z: FRAC_PI_2,
        color: [0x2a, 0x2a, 0x2a],
        alpha: 1.0,
        tint_weight: 0.0,
    },
    PartDef {
        shape: WHEEL,
        offset: Vec3::new(-0.6, 0.15, -0.5),
        rotation_z: FRAC_PI_2,
        color: [0x2a, 0x2a, 0x2a],
        alpha: 1.0,
        tint_weight: 0.0,
    },
    PartDef {
        shape: WHEEL,
        offset: Vec3::new(-0.6, 0.15, 0.5),
        rotation_z: FRAC_PI_2,
        color: [0x2a, 0x2a, 0x2a],
        alpha: 1.0,
        tint_weight: 0.0,
    },
    // Headlights
    PartDef {
        shape: HEADLIGHT,
        offset: Vec3::new(1.0, 0.35, -0.25),
        rotation_z: 0.0,
        color: [0xff, 0xff, 0xff],
        alpha: 1.0,
        tint_weight: 0.0,
    },
    PartDef {
        shape: HEADLIGHT,
        offset: Vec3::new(1.0, 0.35, 0.25),
        rotation_z: 0.0,
        color: [0xff, 0xff, 0xff],
        alpha: 1.0,
        tint_weight: 0.0,
    },
    // Door handles
    PartDef {
        shape: PartShape::Box { half_extents: Vec3::new(0.025, 0.01, 0.075) },
        offset: Vec3::new(0.51, 0.4, -0.45),
        rotation_z: 0.0,
        color: [0x44, 0x44, 0x44],
        alpha: 1.0,
        tint_weight: 0.0,
    },
    PartDef {
        shape: PartShape::Box { half_extents: Vec3::new(0.025, 0.01, 0.075) },
        offset: Vec3::new(0.51, 0.4, 0.45),
        rotation_z: 0.0,
        color: [0x44, 0x44, 0x44],
        alpha: 1.0,
        tint_weight: 0.0,
    },
    // Roof rack
    PartDef {
        shape: PartShape::Box { half_extents: Vec3::new(0.9, 0.025, 0.3) },
        offset: Vec3::new(0.0, 0.625, 0.0),
        rotation_z: 0.0,
        color: [0x33, 0x33, 0x33],
        alpha: 1.0,
        tint_weight: 0.0,
    },
];

/// CPU-side indexed triangle mesh, ready for upload.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Radius of the bounding sphere around the local origin; scaled by the
    /// node's instance scale it is the pick target.
    pub fn bounding_radius(&self) -> f32 {
        self.vertices
            .iter()
            .map(|v| Vec3::from_array(v.position).length())
            .fold(0.0, f32::max)
    }
}

/// Tessellates every part and bakes placement and material into one shared
/// vertex/index buffer pair.
pub fn assemble(parts: &[PartDef]) -> MeshData {
    let mut mesh = MeshData::default();

    for part in parts {
        let (positions, indices) = match part.shape {
            PartShape::Box { half_extents } => box_geometry(half_extents),
            PartShape::Cylinder { radius, half_height, segments } => {
                cylinder_geometry(radius, half_height, segments.max(3))
            }
            PartShape::Sphere { radius, segments } => sphere_geometry(radius, segments.max(3)),
        };

        let rotation = Quat::from_rotation_z(part.rotation_z);
        let srgb = Srgba::rgb_u8(part.color[0], part.color[1], part.color[2]);
        let mut color = LinearRgba::from(srgb).to_f32_array();
        color[3] = part.alpha;

        let base = mesh.vertices.len() as u32;
        for (position, normal) in positions {
            mesh.vertices.push(MeshVertex {
                position: (rotation * position + part.offset).to_array(),
                normal: (rotation * normal).to_array(),
                color,
                tint_weight: part.tint_weight,
            });
        }
        mesh.indices.extend(indices.iter().map(|i| base + i));
    }

    mesh
}

fn box_geometry(half: Vec3) -> (Vec<(Vec3, Vec3)>, Vec<u32>) {
    // (normal, tangent u, tangent v) per face
    let faces = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let origin = normal * (normal.abs().dot(half));
        let eu = u * u.abs().dot(half);
        let ev = v * v.abs().dot(half);
        let base = vertices.len() as u32;
        vertices.push((origin - eu - ev, normal));
        vertices.push((origin + eu - ev, normal));
        vertices.push((origin + eu + ev, normal));
        vertices.push((origin - eu + ev, normal));
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

fn cylinder_geometry(radius: f32, half_height: f32, segments: u32) -> (Vec<(Vec3, Vec3)>, Vec<u32>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    // Side wall
    for s in 0..segments {
        let angle = s as f32 / segments as f32 * std::f32::consts::TAU;
        let normal = Vec3::new(angle.cos(), 0.0, angle.sin());
        let radial = normal * radius;
        vertices.push((radial + Vec3::Y * half_height, normal));
        vertices.push((radial - Vec3::Y * half_height, normal));
    }
    for s in 0..segments {
        let next = (s + 1) % segments;
        let (top, bottom) = (2 * s, 2 * s + 1);
        let (next_top, next_bottom) = (2 * next, 2 * next + 1);
        indices.extend_from_slice(&[top, next_top, bottom, bottom, next_top, next_bottom]);
    }

    // Caps, duplicated rims for flat normals
    for &(y, normal) in &[(half_height, Vec3::Y), (-half_height, Vec3::NEG_Y)] {
        let center = vertices.len() as u32;
        vertices.push((Vec3::Y * y, normal));
        for s in 0..segments {
            let angle = s as f32 / segments as f32 * std::f32::consts::TAU;
            vertices.push((Vec3::new(angle.cos() * radius, y, angle.sin() * radius), normal));
        }
        for s in 0..segments {
            let next = (s + 1) % segments;
            if normal.y > 0.0 {
                indices.extend_from_slice(&[center, center + 1 + next, center + 1 + s]);
            } else {
                indices.extend_from_slice(&[center, center + 1 + s, center + 1 + next]);
            }
        }
    }

    (vertices, indices)
}

fn sphere_geometry(radius: f32, segments: u32) -> (Vec<(Vec3, Vec3)>, Vec<u32>) {
    let stacks = segments;
    let slices = segments;
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for stack in 0..=stacks {
        let theta = stack as f32 / stacks as f32 * std::f32::consts::PI;
        for slice in 0..=slices {
            let phi = slice as f32 / slices as f32 * std::f32::consts::TAU;
            let normal = Vec3::new(
                theta.sin() * phi.cos(),
                theta.cos(),
                theta.sin() * phi.sin(),
            );
            vertices.push((normal * radius, normal));
        }
    }

    let ring = slices + 1;
    for stack in 0..stacks {
        for slice in 0..slices {
            let a = stack * ring + slice;
            let b = a + ring;
            indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembled_vehicle_is_a_valid_indexed_mesh() {
        let mesh = assemble(VEHICLE_PARTS);
        assert!(!mesh.vertices.is_empty());
        assert!(!mesh.indices.is_empty());
        assert_eq!(mesh.indices.len() % 3, 0);
        let max = mesh.vertices.len() as u32;
        assert!(mesh.indices.iter().all(|&i| i < max));
    }

    #[test]
    fn vehicle_normals_are_unit_length() {
        let mesh = assemble(VEHICLE_PARTS);
        for vertex in &mesh.vertices {
            let length = Vec3::from_array(vertex.normal).length();
            assert!((length - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn bounding_radius_covers_the_body() {
        let mesh = assemble(VEHICLE_PARTS);
        let radius = mesh.bounding_radius();
        assert!(radius > 1.0 && radius < 1.5, "unexpected radius {radius}");
    }

    #[test]
    fn only_the_body_is_recolorable() {
        let mesh = assemble(VEHICLE_PARTS);
        assert!(mesh.vertices.iter().any(|v| v.tint_weight == 1.0));
        assert!(mesh.vertices.iter().any(|v| v.tint_weight == 0.0));
    }

    #[test]
    fn degenerate_segment_counts_are_clamped() {
        let parts = [PartDef {
            shape: PartShape::Cylinder { radius: 1.0, half_height: 1.0, segments: 1 },
            offset: Vec3::ZERO,
            rotation_z: 0.0,
            color: [10, 10, 10],
            alpha: 1.0,
            tint_weight: 0.0,
        }];
        let mesh = assemble(&parts);
        assert!(!mesh.indices.is_empty());
    }
}
