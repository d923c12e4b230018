//! Per-frame entities and dynamic lights

use bitflags::bitflags;

use crate::foundation::collections::{EntityKey, Key, MaterialHandle, SlotMap};
use crate::foundation::math::{Axes, Vec3, Vec4};
use crate::render::api::ModelHandle;

/// What an entity renders as
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityKind {
    /// Model from the model cache; `None` draws a debug axis instead
    Model(Option<ModelHandle>),
    /// Camera-facing quad
    Sprite,
    /// Beam; draws nothing
    Beam,
    /// Four crossed rail cores
    Lightning,
    /// Rail trail core
    RailCore,
    /// Rail trail rings
    RailRings,
}

bitflags! {
    /// Entity visibility and lighting flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntityFlags: u8 {
        /// Only visible to the main camera (view weapon)
        const FIRST_PERSON = 1 << 0;
        /// Hidden from the main camera (player body)
        const THIRD_PERSON = 1 << 1;
        /// Light from `lighting_position` instead of `position`
        const LIGHTING_POSITION = 1 << 2;
    }
}

/// Lighting computed for an entity before its model renders
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntityLighting {
    /// Ambient color, 0-255 range
    pub ambient: Vec3,
    /// Directed color, 0-255 range
    pub directed: Vec3,
    /// Unit direction towards the light
    pub direction: Vec3,
}

/// One entity submitted for the current frame
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Render variant
    pub kind: EntityKind,
    /// Position
    pub position: Vec3,
    /// Previous position; the start point of rails and the end of lightning
    pub old_position: Vec3,
    /// Orientation
    pub rotation: Axes,
    /// The rotation axes carry a scale
    pub non_normalized_axes: bool,
    /// Bounding radius, also the sprite half-size
    pub radius: f32,
    /// Sprite roll in degrees
    pub angle: f32,
    /// Material for procedural variants
    pub custom_material: MaterialHandle,
    /// Gamma-space color for procedural variants
    pub material_color: Vec4,
    /// Visibility and lighting flags
    pub flags: EntityFlags,
    /// Lighting sample point when [`EntityFlags::LIGHTING_POSITION`] is set
    pub lighting_position: Vec3,
    /// Computed lighting
    pub lighting: EntityLighting,
    /// Camera position in the entity's space, computed per camera
    pub local_view_position: Vec3,
}

impl Entity {
    /// An entity of `kind` at `position`
    pub fn new(kind: EntityKind, position: Vec3) -> Self {
        Self {
            kind,
            position,
            old_position: position,
            rotation: Axes::identity(),
            non_normalized_axes: false,
            radius: 0.0,
            angle: 0.0,
            custom_material: MaterialHandle::null(),
            material_color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            flags: EntityFlags::empty(),
            lighting_position: position,
            lighting: EntityLighting::default(),
            local_view_position: Vec3::zeros(),
        }
    }

    /// Set the previous position
    #[must_use]
    pub const fn with_old_position(mut self, old_position: Vec3) -> Self {
        self.old_position = old_position;
        self
    }

    /// Set the radius
    #[must_use]
    pub const fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    /// Set the material and color of a procedural variant
    #[must_use]
    pub const fn with_material(mut self, material: MaterialHandle, color: Vec4) -> Self {
        self.custom_material = material;
        self.material_color = color;
        self
    }

    /// Set the flags
    #[must_use]
    pub const fn with_flags(mut self, flags: EntityFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Whether a camera of the given kind skips this entity
    pub const fn hidden_from(&self, is_main_camera: bool) -> bool {
        if is_main_camera {
            self.flags.contains(EntityFlags::THIRD_PERSON)
        } else {
            self.flags.contains(EntityFlags::FIRST_PERSON)
        }
    }

    /// Point lighting is sampled at
    pub const fn light_position(&self) -> Vec3 {
        if self.flags.contains(EntityFlags::LIGHTING_POSITION) {
            self.lighting_position
        } else {
            self.position
        }
    }

    /// Camera position expressed in the entity's axes
    pub fn compute_local_view_position(&self, view_position: &Vec3) -> Vec3 {
        let delta = view_position - self.position;
        let axis_length = if self.non_normalized_axes {
            1.0 / self.rotation.forward.norm()
        } else {
            1.0
        };

        Vec3::new(
            delta.dot(&self.rotation.forward) * axis_length,
            delta.dot(&self.rotation.left) * axis_length,
            delta.dot(&self.rotation.up) * axis_length,
        )
    }
}

/// Per-frame entity storage; keys go stale when the scene is cleared
pub type EntityArena = SlotMap<EntityKey, Entity>;

/// Point light submitted for the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicLight {
    /// Position
    pub position: Vec3,
    /// Linear color
    pub color: Vec3,
    /// Radius of influence
    pub radius: f32,
    /// Intensity scale
    pub intensity: f32,
}

impl DynamicLight {
    /// A light at `position`
    pub const fn new(position: Vec3, color: Vec3, radius: f32) -> Self {
        Self { position, color, radius, intensity: 1.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_and_third_person_filtering() {
        let body = Entity::new(EntityKind::Sprite, Vec3::zeros()).with_flags(EntityFlags::THIRD_PERSON);
        let weapon = Entity::new(EntityKind::Sprite, Vec3::zeros()).with_flags(EntityFlags::FIRST_PERSON);

        assert!(body.hidden_from(true));
        assert!(!body.hidden_from(false));
        assert!(!weapon.hidden_from(true));
        assert!(weapon.hidden_from(false));
    }

    #[test]
    fn test_local_view_position_compensates_scale() {
        let mut entity = Entity::new(EntityKind::Model(None), Vec3::new(10.0, 0.0, 0.0));
        entity.rotation = Axes::new(Vec3::x() * 2.0, Vec3::y() * 2.0, Vec3::z() * 2.0);
        entity.non_normalized_axes = true;

        let local = entity.compute_local_view_position(&Vec3::new(14.0, 2.0, 0.0));
        assert_relative_eq!(local, Vec3::new(4.0, 2.0, 0.0));
    }

    #[test]
    fn test_lighting_position_flag() {
        let mut entity = Entity::new(EntityKind::Model(None), Vec3::new(1.0, 2.0, 3.0));
        entity.lighting_position = Vec3::new(0.0, 0.0, 64.0);
        assert_eq!(entity.light_position(), Vec3::new(1.0, 2.0, 3.0));

        entity.flags |= EntityFlags::LIGHTING_POSITION;
        assert_eq!(entity.light_position(), Vec3::new(0.0, 0.0, 64.0));
    }
}
