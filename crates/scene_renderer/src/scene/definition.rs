//! Scene descriptors passed to `render_scene`

use bitflags::bitflags;

use crate::foundation::math::{Axes, Rect, Vec2, Vec3};

bitflags! {
    /// How a scene is rendered
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SceneFlags: u8 {
        /// Render the loaded world
        const WORLD = 1 << 0;
        /// Skip rendering and flash a time-derived clear color
        const HYPERSPACE = 1 << 1;
        /// Defer the scene as the skybox portal of the next scene
        const SKYBOX_PORTAL = 1 << 2;
        /// The scene sees a skybox portal; its own sky is suppressed
        const CONTAINS_SKYBOX_PORTAL = 1 << 3;
    }
}

/// Bitset over world areas; a set bit hides the area
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AreaMask {
    bits: Vec<u8>,
}

impl AreaMask {
    /// Wrap raw mask bytes
    pub const fn from_bytes(bits: Vec<u8>) -> Self {
        Self { bits }
    }

    /// Whether an area is visible; areas past the end of the mask are
    pub fn is_visible(&self, area: usize) -> bool {
        self.bits
            .get(area / 8)
            .map_or(true, |byte| byte & (1 << (area % 8)) == 0)
    }

    /// Hide an area
    pub fn hide(&mut self, area: usize) {
        let byte = area / 8;

        if self.bits.len() <= byte {
            self.bits.resize(byte + 1, 0);
        }

        self.bits[byte] |= 1 << (area % 8);
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }
}

/// Camera and timing for one `render_scene` call
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDefinition {
    /// Host time in milliseconds
    pub time: u32,
    /// Viewport; zero extent means full screen
    pub rect: Rect,
    /// Camera position
    pub position: Vec3,
    /// Camera orientation
    pub rotation: Axes,
    /// Horizontal and vertical field of view in degrees
    pub fov: Vec2,
    /// Visible world areas
    pub area_mask: AreaMask,
    /// Scene flags
    pub flags: SceneFlags,
}

impl Default for SceneDefinition {
    fn default() -> Self {
        Self {
            time: 0,
            rect: Rect::default(),
            position: Vec3::zeros(),
            rotation: Axes::identity(),
            fov: Vec2::new(90.0, 73.74),
            area_mask: AreaMask::default(),
            flags: SceneFlags::empty(),
        }
    }
}

impl SceneDefinition {
    /// Set the flags
    #[must_use]
    pub fn with_flags(mut self, flags: SceneFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the camera
    #[must_use]
    pub const fn with_camera(mut self, position: Vec3, rotation: Axes) -> Self {
        self.position = position;
        self.rotation = rotation;
        self
    }

    /// Set the viewport
    #[must_use]
    pub const fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    /// Set the host time
    #[must_use]
    pub const fn with_time(mut self, time: u32) -> Self {
        self.time = time;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_mask_hides_set_bits() {
        let mut mask = AreaMask::default();
        assert!(mask.is_visible(12));

        mask.hide(12);
        assert!(!mask.is_visible(12));
        assert!(mask.is_visible(11));
        assert_eq!(mask.as_bytes().len(), 2);
    }
}
