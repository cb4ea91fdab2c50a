// Best-effort asset loading. Every failure path here degrades to a
// procedural substitute so the backdrop never renders empty.
use anyhow::{bail, Context, Result};
use bevy_color::{ColorToComponents, LinearRgba, Srgba};
use glam::Vec3;

use crate::models::MeshVertex;
use crate::scene::vehicle::{self, MeshData};

/// Fixed asset paths, relative to the deployment root.
pub const BACKDROP_IMAGE_PATH: &str = "assets/images/network-map.png";
pub const VEHICLE_MODEL_PATH: &str = "assets/models/shuttle.obj";

/// Decoded RGBA8 pixels ready for texture upload.
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureData {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Loads the map backdrop image from disk. On wasm there is no filesystem
/// and the caller falls straight through to the procedural placeholder.
pub fn load_backdrop_image(path: &str) -> Result<TextureData> {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            let _ = path;
            bail!("no filesystem asset access on wasm32");
        } else {
            let image = image::open(path)
                .with_context(|| format!("failed to open backdrop image {path}"))?
                .to_rgba8();
            let (width, height) = image.dimensions();
            Ok(TextureData { width, height, rgba: image.into_raw() })
        }
    }
}

/// Procedural placeholder: a soft radial glow in the page's warm palette.
pub fn fallback_backdrop() -> TextureData {
    const SIZE: u32 = 256;
    let center = Srgba::rgb_u8(0xff, 0x6b, 0x35);
    let edge = Srgba::rgb_u8(0xff, 0xf1, 0xec);

    let mut rgba = Vec::with_capacity((SIZE * SIZE * 4) as usize);
    for y in 0..SIZE {
        for x in 0..SIZE {
            let dx = x as f32 / SIZE as f32 - 0.5;
            let dy = y as f32 / SIZE as f32 - 0.5;
            let falloff = (dx * dx + dy * dy).sqrt() * 2.0;
            let t = falloff.clamp(0.0, 1.0);
            let mix = |a: f32, b: f32| a + (b - a) * t;
            rgba.push((mix(center.red, edge.red) * 255.0) as u8);
            rgba.push((mix(center.green, edge.green) * 255.0) as u8);
            rgba.push((mix(center.blue, edge.blue) * 255.0) as u8);
            rgba.push(((1.0 - t) * 255.0) as u8);
        }
    }
    TextureData { width: SIZE, height: SIZE, rgba }
}

/// Loads and parses a Wavefront OBJ vehicle model. Triangulates polygonal
/// faces; missing normals are replaced with flat face normals.
pub fn load_vehicle_obj(path: &str) -> Result<MeshData> {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            let _ = path;
            bail!("no filesystem asset access on wasm32");
        } else {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read vehicle model {path}"))?;
            parse_obj(&source)
        }
    }
}

/// The always-available substitute: the built-in part-table shuttle.
pub fn fallback_vehicle() -> MeshData {
    vehicle::assemble(vehicle::VEHICLE_PARTS)
}

/// Minimal OBJ subset: `v`, `vn` and triangulated `f` records. Loaded models
/// take the node tint across the whole surface.
pub fn parse_obj(source: &str) -> Result<MeshData> {
    let mut positions: Vec<Vec3> = Vec::new();
    let mut normals: Vec<Vec3> = Vec::new();
    let mut mesh = MeshData::default();
    let color = LinearRgba::from(Srgba::rgb_u8(0xff, 0x6b, 0x35)).to_f32_array();

    let parse_vec3 = |parts: &[&str], line: usize| -> Result<Vec3> {
        if parts.len() < 3 {
            bail!("line {line}: expected three components");
        }
        let x: f32 = parts[0].parse().with_context(|| format!("line {line}"))?;
        let y: f32 = parts[1].parse().with_context(|| format!("line {line}"))?;
        let z: f32 = parts[2].parse().with_context(|| format!("line {line}"))?;
        Ok(Vec3::new(x, y, z))
    };

    for (line_no, line) in source.lines().enumerate() {
        let line_no = line_no + 1;
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("v") => positions.push(parse_vec3(&parts.collect::<Vec<_>>(), line_no)?),
            Some("vn") => normals.push(parse_vec3(&parts.collect::<Vec<_>>(), line_no)?),
            Some("f") => {
                let corners: Vec<&str> = parts.collect();
                if corners.len() < 3 {
                    bail!("line {line_no}: face needs at least three vertices");
                }
                let mut resolved = Vec::with_capacity(corners.len());
                for corner in &corners {
                    let mut refs = corner.split('/');
                    let pos_index: usize = refs
                        .next()
                        .unwrap_or_default()
                        .parse()
                        .with_context(|| format!("line {line_no}: bad vertex reference"))?;
                    let position = *positions
                        .get(pos_index.wrapping_sub(1))
                        .with_context(|| format!("line {line_no}: vertex {pos_index} out of range"))?;
                    // texcoord slot is skipped, normal ref is optional
                    let normal = refs
                        .nth(1)
                        .filter(|s| !s.is_empty())
                        .and_then(|s| s.parse::<usize>().ok())
                        .and_then(|n| normals.get(n.wrapping_sub(1)).copied());
                    resolved.push((position, normal));
                }

                // Fan triangulation from the first corner
                for window in 1..resolved.len() - 1 {
                    let triangle = [resolved[0], resolved[window], resolved[window + 1]];
                    let flat_normal = (triangle[1].0 - triangle[0].0)
                        .cross(triangle[2].0 - triangle[0].0)
                        .normalize_or_zero();
                    for (position, normal) in triangle {
                        mesh.vertices.push(MeshVertex {
                            position: position.to_array(),
                            normal: normal.unwrap_or(flat_normal).to_array(),
                            color,
                            tint_weight: 1.0,
                        });
                        mesh.indices.push(mesh.vertices.len() as u32 - 1);
                    }
                }
            }
            _ => {}
        }
    }

    if mesh.vertices.is_empty() {
        bail!("model contains no faces");
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE_OBJ: &str = "\
# comment
v 0 0 0
v 1 0 0
v 0 1 0
vn 0 0 1
f 1//1 2//1 3//1
";

    #[test]
    fn parses_a_minimal_obj() {
        let mesh = parse_obj(TRIANGLE_OBJ).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices.len(), 3);
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn quad_faces_are_triangulated() {
        let obj = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3 4
";
        let mesh = parse_obj(obj).unwrap();
        assert_eq!(mesh.indices.len(), 6);
        // No explicit normals: flat face normal is derived
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn empty_or_garbage_models_are_rejected() {
        assert!(parse_obj("").is_err());
        assert!(parse_obj("f 1 2 9").is_err());
    }

    #[test]
    fn missing_model_falls_back_to_a_nonempty_mesh() {
        let mesh = load_vehicle_obj("no/such/model.obj")
            .unwrap_or_else(|_| fallback_vehicle());
        assert!(!mesh.vertices.is_empty());
    }

    #[test]
    fn missing_image_falls_back_to_a_nonempty_texture() {
        let texture = load_backdrop_image("no/such/image.png")
            .unwrap_or_else(|_| fallback_backdrop());
        assert!(texture.width > 0 && texture.height > 0);
        assert_eq!(texture.rgba.len(), (texture.width * texture.height * 4) as usize);
    }
}
