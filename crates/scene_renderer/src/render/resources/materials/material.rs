//! Material definitions
//!
//! Materials are immutable during a frame except for their time offset. They
//! live in the [`MaterialCache`](super::MaterialCache) arena and are referenced
//! everywhere else by [`MaterialHandle`].

use crate::foundation::collections::{Key, MaterialHandle};
use crate::foundation::math::Vec4;
use crate::render::api::{GpuCommandQueue, TextureHandle, Uniform};
use crate::render::primitives::state::StateFlags;

use super::stage::MaterialStage;

/// Sort bucket; lower buckets render first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum MaterialSort {
    /// Unset or broken material
    Bad = 0,
    /// Mirrors and portals
    Portal = 1,
    /// Sky
    Environment = 2,
    /// Solid geometry
    #[default]
    Opaque = 3,
    /// Scorch marks and other decals
    Decal = 4,
    /// Alpha-tested surfaces
    SeeThrough = 5,
    /// Banners and flags
    Banner = 6,
    /// Fog volumes
    Fog = 10,
    /// Surfaces under water
    Underwater = 11,
    /// First blended layer
    Blend0 = 12,
    /// Second blended layer
    Blend1 = 13,
    /// Third blended layer
    Blend2 = 14,
    /// Fourth blended layer
    Blend3 = 15,
    /// Late blended layer
    Blend6 = 16,
    /// Stencil shadow volumes
    StencilShadow = 17,
    /// Weapon effects
    AlmostNearest = 18,
    /// Weapon models and view-space effects
    Nearest = 19,
}

/// Depth test used by a material's fog pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FogPass {
    /// No fog pass
    #[default]
    None,
    /// Fog only exact depth matches
    Equal,
    /// Fog anything at or in front of the stored depth
    LessOrEqual,
}

/// Six outer-box textures of a sky material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkyBox {
    /// Faces in the order the world emits them
    pub outer_box: [TextureHandle; 6],
}

/// A named rendering recipe made of ordered stages
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Handle in the cache, assigned on insert
    pub handle: MaterialHandle,
    /// Stable registration index, assigned on insert
    pub index: u32,
    /// Name
    pub name: String,
    /// Sort bucket
    pub sort: MaterialSort,
    /// Stages in render order
    pub stages: Vec<MaterialStage>,
    /// Material rendered instead of this one
    pub remapped: Option<MaterialHandle>,
    /// Mirror surface
    pub reflective: bool,
    /// Ignore fog volumes
    pub no_fog: bool,
    /// Pull the surface towards the camera in depth
    pub polygon_offset: bool,
    /// Number of stages drawn without fog; zero means the material only fogs
    pub unfogged_passes: usize,
    /// Fog pass mode
    pub fog_pass: FogPass,
    /// Skybox textures
    pub sky: Option<SkyBox>,
    /// Subtracted from the host time to get material time
    pub time_offset: f32,
    /// Vertex deform parameters, one vector per deform
    pub deforms: Vec<Vec4>,
    /// Created by the cache as the fallback material
    pub is_default: bool,
}

impl Material {
    /// Create an empty material in `sort`
    pub fn new(name: impl Into<String>, sort: MaterialSort) -> Self {
        Self {
            handle: MaterialHandle::null(),
            index: 0,
            name: name.into(),
            sort,
            stages: Vec::new(),
            remapped: None,
            reflective: false,
            no_fog: false,
            polygon_offset: false,
            unfogged_passes: 0,
            fog_pass: FogPass::None,
            sky: None,
            time_offset: 0.0,
            deforms: Vec::new(),
            is_default: false,
        }
    }

    /// Append a stage; every stage counts as an unfogged pass
    #[must_use]
    pub fn with_stage(mut self, stage: MaterialStage) -> Self {
        self.stages.push(stage);
        self.unfogged_passes = self.stages.len();
        self
    }

    /// Mark as a mirror surface
    #[must_use]
    pub const fn reflective(mut self) -> Self {
        self.reflective = true;
        self
    }

    /// Ignore fog volumes
    #[must_use]
    pub const fn without_fog(mut self) -> Self {
        self.no_fog = true;
        self
    }

    /// Request polygon offset
    #[must_use]
    pub const fn with_polygon_offset(mut self) -> Self {
        self.polygon_offset = true;
        self
    }

    /// Set the fog pass mode
    #[must_use]
    pub const fn with_fog_pass(mut self, fog_pass: FogPass) -> Self {
        self.fog_pass = fog_pass;
        self
    }

    /// Attach skybox faces
    #[must_use]
    pub const fn with_sky(mut self, outer_box: [TextureHandle; 6]) -> Self {
        self.sky = Some(SkyBox { outer_box });
        self
    }

    /// Redirect rendering to another material
    #[must_use]
    pub const fn remapped_to(mut self, target: MaterialHandle) -> Self {
        self.remapped = Some(target);
        self
    }

    /// Material time at host time `seconds`
    pub fn time_at(&self, seconds: f32) -> f32 {
        seconds - self.time_offset
    }

    /// Cull bits shared by every stage
    pub fn cull_state(&self) -> StateFlags {
        self.stages.first().map_or(StateFlags::empty(), |stage| stage.state.cull())
    }

    /// First active stage with an alpha test
    pub fn first_alpha_test_stage(&self) -> Option<&MaterialStage> {
        self.stages
            .iter()
            .find(|stage| stage.active && stage.alpha_test != super::AlphaTest::None)
    }

    /// Whether any stage is active
    pub fn has_active_stage(&self) -> bool {
        self.stages.iter().any(|stage| stage.active)
    }

    /// Write the deform count and parameters
    pub fn write_deform_uniforms(&self, queue: &mut dyn GpuCommandQueue) {
        #[allow(clippy::cast_precision_loss)]
        let count = self.deforms.len() as f32;
        queue.set_uniform(Uniform::DeformCount, Vec4::new(count, 0.0, 0.0, 0.0));

        if !self.deforms.is_empty() {
            queue.set_uniform_array(Uniform::DeformParameters, &self.deforms);
        }
    }
}
