//! # Draw Calls
//!
//! A draw call bundles a geometry reference, a material handle, a transform and
//! the per-object flags the passes need. Draw calls are rebuilt for every
//! camera invocation and dropped when it finishes.
//!
//! ## Ordering
//!
//! Draw calls are totally ordered by material sort bucket, then the explicit
//! sort key, then material index. The bucket keeps opaque geometry ahead of
//! blended geometry; the material index keeps equal-key calls grouped by
//! material for batching. The bucket and index are copied from the material
//! when the draw call is built, so sorting needs no cache lookups.

use std::cmp::Ordering;

use bitflags::bitflags;

use crate::foundation::collections::{EntityKey, MaterialHandle};
use crate::foundation::math::Mat4;
use crate::render::primitives::geometry::GeometryRef;
use crate::render::primitives::state::StateFlags;
use crate::render::resources::materials::{Material, MaterialSort};

bitflags! {
    /// Per-draw-call flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DrawCallFlags: u8 {
        /// Sky surface geometry
        const SKY = 1 << 0;
        /// One face of a skybox cube
        const SKYBOX = 1 << 1;
    }
}

/// One GPU submission's worth of geometry, material and transform
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    /// Geometry to bind
    pub geometry: GeometryRef,
    /// Material to render with, before remapping
    pub material: MaterialHandle,
    material_sort: MaterialSort,
    material_index: u32,
    /// Model transform
    pub model_matrix: Mat4,
    /// Owning entity, valid for the current frame only
    pub entity: Option<EntityKey>,
    /// Fog volume the geometry sits in
    pub fog_index: Option<usize>,
    /// Explicit sort key within a material bucket
    pub sort: f32,
    /// Depth range offset
    pub z_offset: f32,
    /// Depth range scale
    pub z_scale: f32,
    /// Sky / skybox flags
    pub flags: DrawCallFlags,
    /// Skybox face for [`DrawCallFlags::SKYBOX`] draw calls
    pub skybox_side: usize,
    /// Fade distance for soft sprites, zero disables
    pub soft_sprite_depth: f32,
    /// Whether clustered dynamic lights apply
    pub dynamic_lighting: bool,
    /// Base state, combined with each stage's state
    pub state: StateFlags,
}

impl DrawCall {
    /// Base state when nothing else is requested
    pub const DEFAULT_STATE: StateFlags = StateFlags::RGB_WRITE
        .union(StateFlags::ALPHA_WRITE)
        .union(StateFlags::MSAA);

    /// Build a draw call for `material`
    pub fn new(geometry: GeometryRef, material: &Material) -> Self {
        Self {
            geometry,
            material: material.handle,
            material_sort: material.sort,
            material_index: material.index,
            model_matrix: Mat4::identity(),
            entity: None,
            fog_index: None,
            sort: 0.0,
            z_offset: 0.0,
            z_scale: 0.0,
            flags: DrawCallFlags::empty(),
            skybox_side: 0,
            soft_sprite_depth: 0.0,
            dynamic_lighting: true,
            state: Self::DEFAULT_STATE,
        }
    }

    /// Attach the owning entity
    #[must_use]
    pub const fn with_entity(mut self, entity: EntityKey) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Set the fog volume
    #[must_use]
    pub const fn with_fog_index(mut self, fog_index: Option<usize>) -> Self {
        self.fog_index = fog_index;
        self
    }

    /// Set the explicit sort key
    #[must_use]
    pub const fn with_sort(mut self, sort: f32) -> Self {
        self.sort = sort;
        self
    }

    /// Set the model transform
    #[must_use]
    pub const fn with_model_matrix(mut self, model_matrix: Mat4) -> Self {
        self.model_matrix = model_matrix;
        self
    }

    /// Enable or disable dynamic lighting
    #[must_use]
    pub const fn with_dynamic_lighting(mut self, enabled: bool) -> Self {
        self.dynamic_lighting = enabled;
        self
    }

    /// Set the depth range
    #[must_use]
    pub const fn with_depth_range(mut self, z_offset: f32, z_scale: f32) -> Self {
        self.z_offset = z_offset;
        self.z_scale = z_scale;
        self
    }

    /// Mark as sky surface geometry
    #[must_use]
    pub fn as_sky(mut self) -> Self {
        self.flags |= DrawCallFlags::SKY;
        self
    }

    /// Mark as one face of a skybox
    #[must_use]
    pub fn as_skybox_face(mut self, side: usize) -> Self {
        self.flags |= DrawCallFlags::SKYBOX;
        self.skybox_side = side;
        self
    }

    /// Set the soft sprite fade distance
    #[must_use]
    pub const fn with_soft_sprite_depth(mut self, depth: f32) -> Self {
        self.soft_sprite_depth = depth;
        self
    }

    /// Whether a nonzero depth range was requested
    pub fn has_depth_range(&self) -> bool {
        self.z_offset > 0.0 || self.z_scale > 0.0
    }

    /// Sort bucket of the draw call's material
    pub const fn material_sort(&self) -> MaterialSort {
        self.material_sort
    }

    /// Index of the draw call's material
    pub const fn material_index(&self) -> u32 {
        self.material_index
    }

    /// Compare by (bucket, sort key, material index)
    pub fn cmp_order(&self, other: &Self) -> Ordering {
        self.material_sort
            .cmp(&other.material_sort)
            .then_with(|| self.sort.total_cmp(&other.sort))
            .then_with(|| self.material_index.cmp(&other.material_index))
    }
}

/// Sort draw calls for submission
///
/// The sort is stable: calls that compare equal keep their collection order.
pub fn sort_draw_calls(draw_calls: &mut [DrawCall]) {
    draw_calls.sort_by(DrawCall::cmp_order);
}
