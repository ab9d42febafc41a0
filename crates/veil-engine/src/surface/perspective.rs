use glam::{Quat, Vec2, Vec3, Vec4};

/// Default pixels per world unit.
pub const DEFAULT_SCALE: f32 = 100.0;

/// Observer state of one render surface.
///
/// World space is viewed along the observer's orientation around `center`,
/// `scale` pixels per world unit. Together with the surface dimensions this
/// defines the pixel-to-world mapping.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Perspective {
    pub orientation: Quat,
    pub center: Vec3,
    pub scale: f32,
    width: u32,
    height: u32,
}

/// GPU layout of the perspective block (group 0, binding 0).
///
/// ```wgsl
/// struct Perspective {
///     orientation: vec4<f32>, // unit quaternion, xyzw
///     center: vec4<f32>,      // xyz
///     scaling: vec4<f32>,     // scale / width, scale / height, scale, 0
/// }
/// ```
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PerspectiveUniform {
    pub orientation: [f32; 4],
    pub center: [f32; 4],
    pub scaling: [f32; 4],
}

impl Perspective {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            orientation: Quat::IDENTITY,
            center: Vec3::ZERO,
            scale: DEFAULT_SCALE,
            width,
            height,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(crate) fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Maps a pixel position (origin top-left, y down) to world space.
    pub fn pixel_to_world(&self, pixel: Vec2) -> Vec3 {
        let half = Vec2::new(self.width as f32, self.height as f32) * 0.5;
        let view = Vec3::new(
            (pixel.x - half.x) / self.scale,
            (half.y - pixel.y) / self.scale,
            0.0,
        );
        self.center + self.orientation.conjugate() * view
    }

    pub fn uniform(&self) -> PerspectiveUniform {
        let w = self.width.max(1) as f32;
        let h = self.height.max(1) as f32;
        PerspectiveUniform {
            orientation: Vec4::from(self.orientation).to_array(),
            center: self.center.extend(1.0).to_array(),
            scaling: [self.scale / w, self.scale / h, self.scale, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn surface_center_maps_to_world_center() {
        let mut p = Perspective::new(800, 600);
        p.center = Vec3::new(1.0, 2.0, 3.0);
        assert!(close(p.pixel_to_world(Vec2::new(400.0, 300.0)), p.center));
    }

    #[test]
    fn pixels_scale_to_world_units() {
        let p = Perspective::new(800, 600);
        // 100 px right and 100 px up of center.
        let w = p.pixel_to_world(Vec2::new(500.0, 200.0));
        assert!(close(w, Vec3::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn rotated_observer_rotates_the_mapping() {
        let mut p = Perspective::new(200, 200);
        p.orientation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let w = p.pixel_to_world(Vec2::new(200.0, 100.0));
        // View +x seen from an observer turned 90° about y lands on world +z.
        assert!(close(w, Vec3::new(0.0, 0.0, 1.0)));
    }

    #[test]
    fn uniform_tracks_scale_and_size() {
        let mut p = Perspective::new(400, 200);
        p.scale = 50.0;
        let u = p.uniform();
        assert_eq!(u.scaling, [0.125, 0.25, 50.0, 0.0]);
        assert_eq!(u.orientation, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(std::mem::size_of::<PerspectiveUniform>(), 48);
    }

    #[test]
    fn zero_size_does_not_divide_by_zero() {
        let u = Perspective::new(0, 0).uniform();
        assert!(u.scaling.iter().all(|v| v.is_finite()));
    }
}
