// src/camera.rs
// Fixed perspective camera for the backdrop scene, plus the pointer-ray math
// used for picking and dragging.
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

/// Uniform block shared by every pipeline: view-projection plus the scene's
/// fixed lighting and fog parameters.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct SceneUniform {
    pub view_proj: [[f32; 4]; 4],
    /// xyz: camera world position; w: 1.0 when the shader must convert its
    /// linear output to sRGB (non-sRGB surface format), else 0.0.
    pub camera_pos: [f32; 4],
    /// rgb pre-multiplied by the ambient intensity.
    pub ambient: [f32; 4],
    /// xyz: unit vector toward the key light; w: intensity.
    pub sun_dir: [f32; 4],
    /// xyz: fill light position; w: intensity.
    pub fill_pos: [f32; 4],
    /// rgb: fill light color; w: falloff range.
    pub fill_color: [f32; 4],
    pub fog_color: [f32; 4],
    /// x: fog start distance; y: fog end distance.
    pub fog_range: [f32; 4],
}

/// A world-space ray cast from the camera through a screen position.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    /// Intersection with the plane z = `plane_z`, if the ray is not parallel
    /// to it and the hit lies in front of the origin.
    pub fn intersect_z_plane(&self, plane_z: f32) -> Option<Vec3> {
        if self.dir.z.abs() < 1e-6 {
            return None;
        }
        let t = (plane_z - self.origin.z) / self.dir.z;
        (t > 0.0).then(|| self.origin + self.dir * t)
    }

    /// Nearest positive hit distance against a sphere, if any.
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let oc = self.origin - center;
        let b = oc.dot(self.dir);
        let c = oc.length_squared() - radius * radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let sqrt_d = discriminant.sqrt();
        let t = -b - sqrt_d;
        if t > 0.0 {
            return Some(t);
        }
        let t = -b + sqrt_d;
        (t > 0.0).then_some(t)
    }
}

#[derive(Debug)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub fovy: f32, // radians
    pub aspect_ratio: f32,
    pub znear: f32,
    pub zfar: f32,
    pub viewport_size: Vec2,
}

impl Camera {
    pub fn new(viewport_width: u32, viewport_height: u32) -> Self {
        let aspect_ratio = viewport_width as f32 / viewport_height as f32;
        Self {
            position: Vec3::new(0.0, 0.0, 15.0),
            target: Vec3::ZERO,
            fovy: 75.0_f32.to_radians(),
            aspect_ratio: if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
                aspect_ratio
            } else {
                1.0
            },
            znear: 0.1,
            zfar: 1000.0,
            viewport_size: Vec2::new(viewport_width as f32, viewport_height as f32),
        }
    }

    /// Called on window resize so the projection keeps the viewport's aspect.
    pub fn update_aspect_ratio(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect_ratio = width as f32 / height as f32;
            self.viewport_size = Vec2::new(width as f32, height as f32);
        }
    }

    pub fn build_view_projection_matrix(&self) -> Mat4 {
        let proj_matrix = Mat4::perspective_rh(self.fovy, self.aspect_ratio, self.znear, self.zfar);
        let view_matrix = Mat4::look_at_rh(self.position, self.target, Vec3::Y);
        proj_matrix * view_matrix
    }

    /// Unprojects a screen position (pixels, origin top-left) into a world ray
    /// by pushing the point through the inverse view-projection at the near
    /// and far depth planes.
    pub fn screen_to_ray(&self, screen_coords: Vec2) -> Ray {
        if self.viewport_size.x == 0.0 || self.viewport_size.y == 0.0 {
            return Ray {
                origin: self.position,
                dir: (self.target - self.position).normalize_or_zero(),
            };
        }

        // Screen y grows downward, NDC y grows upward
        let ndc_x = (screen_coords.x / self.viewport_size.x) * 2.0 - 1.0;
        let ndc_y = 1.0 - (screen_coords.y / self.viewport_size.y) * 2.0;

        let view_proj_inv = self.build_view_projection_matrix().inverse();
        // wgpu clip space puts the near plane at NDC z = 0 and far at z = 1
        let near_point = view_proj_inv.project_point3(Vec3::new(ndc_x, ndc_y, 0.0));
        let far_point = view_proj_inv.project_point3(Vec3::new(ndc_x, ndc_y, 1.0));

        Ray {
            origin: near_point,
            dir: (far_point - near_point).normalize_or_zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_updates_aspect_ratio() {
        let mut camera = Camera::new(800, 600);
        camera.update_aspect_ratio(1920, 1080);
        assert!((camera.aspect_ratio - 1920.0 / 1080.0).abs() < 1e-6);
        assert_eq!(camera.viewport_size, Vec2::new(1920.0, 1080.0));
    }

    #[test]
    fn resize_ignores_degenerate_dimensions() {
        let mut camera = Camera::new(800, 600);
        let before = camera.aspect_ratio;
        camera.update_aspect_ratio(0, 1080);
        assert_eq!(camera.aspect_ratio, before);
    }

    #[test]
    fn center_ray_points_down_the_view_axis() {
        let camera = Camera::new(800, 600);
        let ray = camera.screen_to_ray(Vec2::new(400.0, 300.0));
        // Camera sits at +z looking at the origin, so the ray heads toward -z
        assert!(ray.dir.z < -0.99);
        assert!(ray.dir.x.abs() < 1e-3);
        assert!(ray.dir.y.abs() < 1e-3);
    }

    #[test]
    fn center_ray_hits_the_drag_plane_near_origin() {
        let camera = Camera::new(800, 600);
        let ray = camera.screen_to_ray(Vec2::new(400.0, 300.0));
        let hit = ray.intersect_z_plane(0.0).expect("ray must cross z = 0");
        assert!(hit.x.abs() < 1e-2);
        assert!(hit.y.abs() < 1e-2);
        assert!(hit.z.abs() < 1e-4);
    }

    #[test]
    fn parallel_ray_misses_the_plane() {
        let ray = Ray {
            origin: Vec3::new(0.0, 0.0, 5.0),
            dir: Vec3::X,
        };
        assert!(ray.intersect_z_plane(0.0).is_none());
    }

    #[test]
    fn sphere_intersection_hits_and_misses() {
        let ray = Ray {
            origin: Vec3::new(0.0, 0.0, 10.0),
            dir: Vec3::new(0.0, 0.0, -1.0),
        };
        let t = ray
            .intersect_sphere(Vec3::ZERO, 1.0)
            .expect("centered sphere must be hit");
        assert!((t - 9.0).abs() < 1e-4);
        assert!(ray.intersect_sphere(Vec3::new(5.0, 0.0, 0.0), 1.0).is_none());
        // Sphere entirely behind the origin
        assert!(
            ray.intersect_sphere(Vec3::new(0.0, 0.0, 20.0), 1.0).is_none()
        );
    }
}
