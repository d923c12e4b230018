//! Math utilities and types
//!
//! Provides the vector/matrix aliases used across the renderer plus the camera
//! helpers the passes need: view and projection matrices, frustum extraction,
//! axis-aligned bounds and a handful of vector utilities.
//!
//! World space follows the classic Z-up convention: an orientation is a basis of
//! `forward`, `left` and `up` vectors. [`view_matrix`] converts into a right-handed
//! Y-up camera space looking down -Z.

pub use nalgebra::{Matrix3, Matrix4, Rotation3, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Orientation basis in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axes {
    /// Viewing direction
    pub forward: Vec3,
    /// Left of the viewing direction
    pub left: Vec3,
    /// Up vector
    pub up: Vec3,
}

impl Default for Axes {
    fn default() -> Self {
        Self::identity()
    }
}

impl Axes {
    /// Create a basis from its three vectors
    pub const fn new(forward: Vec3, left: Vec3, up: Vec3) -> Self {
        Self { forward, left, up }
    }

    /// World-aligned basis looking down +X
    pub fn identity() -> Self {
        Self::new(Vec3::x(), Vec3::y(), Vec3::z())
    }

    /// The basis vectors in forward, left, up order
    pub const fn to_array(&self) -> [Vec3; 3] {
        [self.forward, self.left, self.up]
    }
}

/// Integer viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width, zero meaning "full backbuffer width"
    pub w: i32,
    /// Height, zero meaning "full backbuffer height"
    pub h: i32,
}

impl Rect {
    /// Create a rectangle
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Clamp the origin to the screen; the extent is kept as submitted
    pub fn with_clamped_origin(self) -> Self {
        Self {
            x: self.x.max(0),
            y: self.y.max(0),
            ..self
        }
    }

    /// Replace a zero width or height with the given full size
    pub const fn or_full_size(self, width: i32, height: i32) -> Self {
        Self {
            x: self.x,
            y: self.y,
            w: if self.w == 0 { width } else { self.w },
            h: if self.h == 0 { height } else { self.h },
        }
    }
}

/// Plane in normal/distance form: points with `normal · p - distance >= 0` are in front
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal
    pub normal: Vec3,
    /// Distance from the origin along the normal
    pub distance: f32,
}

impl Default for Plane {
    fn default() -> Self {
        Self::new(Vec3::zeros(), 0.0)
    }
}

impl Plane {
    /// Create a plane
    pub const fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Signed distance from the plane to `point`
    pub fn distance_to(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }

    /// Packed as `(normal, distance)` for shader upload
    pub fn to_vec4(&self) -> Vec4 {
        Vec4::new(self.normal.x, self.normal.y, self.normal.z, self.distance)
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}

impl Bounds {
    /// Create bounds from two corners
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Inverted bounds, ready for [`Bounds::add_point`]
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::INFINITY),
            max: Vec3::repeat(f32::NEG_INFINITY),
        }
    }

    /// Smallest bounds containing every point
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut bounds = Self::empty();

        for point in points {
            bounds.add_point(point);
        }

        bounds
    }

    /// Grow to contain `point`
    pub fn add_point(&mut self, point: &Vec3) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// True until a point has been added
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Center of the box
    pub fn midpoint(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// The eight corners, top face first
    ///
    /// Edges of the box are (0,1) (1,2) (2,3) (3,0) on top, (4,5) (5,6) (6,7)
    /// (7,4) on the bottom and (0,4) (1,7) (2,6) (3,5) between them.
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
        ]
    }

    /// Distance from `position` to the farthest corner
    pub fn farthest_corner_distance(&self, position: &Vec3) -> f32 {
        self.corners()
            .iter()
            .map(|corner| (corner - position).norm())
            .fold(0.0, f32::max)
    }
}

/// Result of testing a volume against a frustum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipResult {
    /// Entirely inside every plane
    Inside,
    /// Entirely behind at least one plane
    Outside,
    /// Straddles one or more planes
    Intersect,
}

/// View frustum as six inward-facing planes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    /// Extract the planes of a combined view-projection matrix
    pub fn from_view_projection(matrix: &Mat4) -> Self {
        let row = |i: usize| Vec4::new(matrix[(i, 0)], matrix[(i, 1)], matrix[(i, 2)], matrix[(i, 3)]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let raw = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r3 + r2, r3 - r2];

        let planes = raw.map(|p| {
            let normal = Vec3::new(p.x, p.y, p.z);
            let length = normal.norm();

            if length > 0.0 {
                Plane::new(normal / length, -p.w / length)
            } else {
                Plane::new(normal, -p.w)
            }
        });

        Self { planes }
    }

    /// Classify a sphere against the frustum
    pub fn clip_sphere(&self, center: &Vec3, radius: f32) -> ClipResult {
        let mut result = ClipResult::Inside;

        for plane in &self.planes {
            let distance = plane.distance_to(center);

            if distance < -radius {
                return ClipResult::Outside;
            }

            if distance < radius {
                result = ClipResult::Intersect;
            }
        }

        result
    }

    /// The six planes: left, right, bottom, top, near, far
    pub const fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }
}

/// World-to-camera matrix for a position and orientation
pub fn view_matrix(position: &Vec3, axes: &Axes) -> Mat4 {
    let right = -axes.left;
    let up = axes.up;
    let back = -axes.forward;

    #[rustfmt::skip]
    let view = Mat4::new(
        right.x, right.y, right.z, -right.dot(position),
        up.x,    up.y,    up.z,    -up.dot(position),
        back.x,  back.y,  back.z,  -back.dot(position),
        0.0,     0.0,     0.0,     1.0,
    );
    view
}

/// Perspective projection from horizontal and vertical field of view in degrees
pub fn perspective_projection(fov_x: f32, fov_y: f32, z_near: f32, z_far: f32) -> Mat4 {
    let x = 1.0 / (fov_x.to_radians() * 0.5).tan();
    let y = 1.0 / (fov_y.to_radians() * 0.5).tan();
    let depth = z_far - z_near;

    #[rustfmt::skip]
    let projection = Mat4::new(
        x,   0.0, 0.0,                         0.0,
        0.0, y,   0.0,                         0.0,
        0.0, 0.0, -(z_far + z_near) / depth,   -2.0 * z_far * z_near / depth,
        0.0, 0.0, -1.0,                        0.0,
    );
    projection
}

/// Orthographic projection
pub fn orthographic_projection(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    #[rustfmt::skip]
    let projection = Mat4::new(
        2.0 / (right - left), 0.0,                  0.0,                -(right + left) / (right - left),
        0.0,                  2.0 / (top - bottom), 0.0,                -(top + bottom) / (top - bottom),
        0.0,                  0.0,                  -2.0 / (far - near), -(far + near) / (far - near),
        0.0,                  0.0,                  0.0,                1.0,
    );
    projection
}

/// Rotate `v` around `direction` by `degrees`
pub fn rotate_around_direction(v: &Vec3, direction: &Vec3, degrees: f32) -> Vec3 {
    Unit::try_new(*direction, f32::EPSILON).map_or(*v, |axis| {
        Rotation3::from_axis_angle(&axis, degrees.to_radians()) * v
    })
}

/// Two unit vectors perpendicular to `forward` and to each other
pub fn perpendicular_vectors(forward: &Vec3) -> (Vec3, Vec3) {
    // Rotate the components so the seed is never parallel to forward.
    let seed = Vec3::new(forward.z, -forward.x, forward.y);
    let right = (seed - forward * seed.dot(forward)).normalize();
    let up = right.cross(forward);
    (right, up)
}

/// Convert a gamma-space color to linear, leaving alpha untouched
pub fn to_linear(color: &Vec4) -> Vec4 {
    Vec4::new(color.x.powf(2.2), color.y.powf(2.2), color.z.powf(2.2), color.w)
}

/// Unpack an RGBA8 color
pub fn color_from_bytes(bytes: [u8; 4]) -> Vec4 {
    Vec4::new(
        f32::from(bytes[0]),
        f32::from(bytes[1]),
        f32::from(bytes[2]),
        f32::from(bytes[3]),
    ) / 255.0
}

/// Whether `value` is a positive power of two
pub const fn is_power_of_two(value: i32) -> bool {
    value > 0 && (value & (value - 1)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounds_corners_follow_box_layout() {
        let bounds = Bounds::new(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(1.0, 2.0, 3.0));
        let corners = bounds.corners();

        assert_eq!(corners[0], Vec3::new(-1.0, -2.0, 3.0));
        assert_eq!(corners[2], Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(corners[5], Vec3::new(-1.0, 2.0, -3.0));
        assert_eq!(corners[7], Vec3::new(1.0, -2.0, -3.0));
    }

    #[test]
    fn test_farthest_corner_distance() {
        let bounds = Bounds::new(Vec3::zeros(), Vec3::new(3.0, 4.0, 0.0));
        assert_relative_eq!(bounds.farthest_corner_distance(&Vec3::zeros()), 5.0);
    }

    #[test]
    fn test_empty_bounds_grow_with_points() {
        let mut bounds = Bounds::empty();
        assert!(bounds.is_empty());

        bounds.add_point(&Vec3::new(1.0, 5.0, -2.0));
        bounds.add_point(&Vec3::new(-1.0, 2.0, 4.0));

        assert!(!bounds.is_empty());
        assert_eq!(bounds.min, Vec3::new(-1.0, 2.0, -2.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 5.0, 4.0));
    }

    #[test]
    fn test_view_matrix_looks_down_negative_z() {
        let view = view_matrix(&Vec3::new(10.0, 0.0, 0.0), &Axes::identity());
        let ahead = view * Vec4::new(110.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(ahead.z, -100.0);

        let to_the_left = view * Vec4::new(10.0, 5.0, 0.0, 1.0);
        assert_relative_eq!(to_the_left.x, -5.0);
    }

    #[test]
    fn test_frustum_clips_spheres() {
        let view = view_matrix(&Vec3::zeros(), &Axes::identity());
        let projection = perspective_projection(90.0, 73.74, 4.0, 2048.0);
        let frustum = Frustum::from_view_projection(&(projection * view));

        assert_eq!(frustum.clip_sphere(&Vec3::new(100.0, 0.0, 0.0), 1.0), ClipResult::Inside);
        assert_eq!(frustum.clip_sphere(&Vec3::new(-100.0, 0.0, 0.0), 1.0), ClipResult::Outside);
        assert_eq!(frustum.clip_sphere(&Vec3::new(2048.0, 0.0, 0.0), 8.0), ClipResult::Intersect);
    }

    #[test]
    fn test_perpendicular_vectors_are_orthonormal() {
        let forward = Vec3::new(0.3, -0.5, 0.8).normalize();
        let (right, up) = perpendicular_vectors(&forward);

        assert_relative_eq!(right.norm(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(up.norm(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(right.dot(&forward), 0.0, epsilon = 1e-5);
        assert_relative_eq!(up.dot(&forward), 0.0, epsilon = 1e-5);
        assert_relative_eq!(up.dot(&right), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_rotate_around_direction() {
        let rotated = rotate_around_direction(&Vec3::y(), &Vec3::x(), 90.0);
        assert_relative_eq!(rotated, Vec3::z(), epsilon = 1e-6);

        // Degenerate axis leaves the vector alone.
        assert_eq!(rotate_around_direction(&Vec3::y(), &Vec3::zeros(), 45.0), Vec3::y());
    }

    #[test]
    fn test_power_of_two() {
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(256));
        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(-4));
        assert!(!is_power_of_two(320));
    }

    #[test]
    fn test_rect_clamps_origin_only() {
        let rect = Rect::new(-10, 20, 640, 480).with_clamped_origin();
        assert_eq!(rect, Rect::new(0, 20, 640, 480));
        assert_eq!(Rect::default().or_full_size(800, 600), Rect::new(0, 0, 800, 600));
    }
}
