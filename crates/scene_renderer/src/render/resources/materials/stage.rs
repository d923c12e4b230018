//! Material stages
//!
//! A stage is one texture + blend + shader layer of a material. Stages carry
//! their own GPU state bits; the cull bits are shared by every stage of a
//! material.

use bitflags::bitflags;

use crate::foundation::math::Vec4;
use crate::render::api::{GpuCommandQueue, Sampler, TextureHandle, TextureSource, Uniform};
use crate::render::primitives::state::StateFlags;

/// Alpha-test mode of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaTest {
    /// No alpha test
    #[default]
    None,
    /// Discard alpha == 0
    Gt0,
    /// Discard alpha >= 0.5
    Lt128,
    /// Discard alpha < 0.5
    Ge128,
}

impl AlphaTest {
    /// Value written to the alpha-test uniform
    pub const fn uniform_value(self) -> f32 {
        match self {
            Self::None => 0.0,
            Self::Gt0 => 1.0,
            Self::Lt128 => 2.0,
            Self::Ge128 => 3.0,
        }
    }
}

/// Which color channels fog modulates for a blended stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FogAdjust {
    /// Stage is unaffected by fog
    #[default]
    None,
    /// Fade color towards black
    ModulateRgb,
    /// Fade alpha towards zero
    ModulateAlpha,
    /// Fade color and alpha
    ModulateRgba,
}

/// How the stage is lit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LightType {
    /// Unlit
    #[default]
    None,
    /// Lightmap sampled from the light bundle
    Map,
    /// Per-vertex lighting
    Vertex,
    /// Entity light vector
    Vector,
}

impl LightType {
    const fn uniform_value(self) -> f32 {
        match self {
            Self::None => 0.0,
            Self::Map => 1.0,
            Self::Vertex => 2.0,
            Self::Vector => 3.0,
        }
    }
}

bitflags! {
    /// Procedural inputs the generic shader computes per vertex
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StageGenerators: u8 {
        /// Environment-mapped texture coordinates
        const TEX_GEN_ENVIRONMENT = 1 << 0;
        /// Fog-space texture coordinates
        const TEX_GEN_FOG = 1 << 1;
        /// Lighting-diffuse vertex colors
        const LIGHTING_DIFFUSE = 1 << 2;
        /// Portal alpha fade
        const ALPHA_PORTAL = 1 << 3;
    }
}

/// Uniform subsets a stage can write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageUniformSet {
    /// Everything
    All,
    /// Texture coordinate generation and alpha test only
    TexGen,
}

/// One or more textures cycled by time
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextureBundle {
    /// Animation frames
    pub textures: Vec<TextureHandle>,
    /// Frames per second, zero for a still image
    pub animation_speed: f32,
}

impl TextureBundle {
    /// A single still texture
    pub fn still(texture: TextureHandle) -> Self {
        Self { textures: vec![texture], animation_speed: 0.0 }
    }

    /// Frame shown at material time `time`
    pub fn frame(&self, time: f32) -> Option<TextureHandle> {
        if self.textures.len() <= 1 || self.animation_speed <= 0.0 {
            return self.textures.first().copied();
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let frame = (time * self.animation_speed).max(0.0) as usize;
        self.textures.get(frame % self.textures.len()).copied()
    }
}

/// One rendering layer of a material
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialStage {
    /// Inactive stages are skipped
    pub active: bool,
    /// Diffuse bundle, then lightmap bundle
    pub bundles: Vec<TextureBundle>,
    /// Blend, cull and depth bits
    pub state: StateFlags,
    /// Alpha-test mode
    pub alpha_test: AlphaTest,
    /// Fog channel modulation
    pub adjust_colors_for_fog: FogAdjust,
    /// Whether HDR output feeds the bloom mask
    pub bloom: bool,
    /// Constant color
    pub base_color: Vec4,
    /// Vertex color scale
    pub vertex_color: Vec4,
    /// Procedural inputs
    pub generators: StageGenerators,
    /// Lighting model
    pub light_type: LightType,
    /// Texture coordinate generation parameters
    pub tex_gen: Vec4,
}

impl Default for MaterialStage {
    fn default() -> Self {
        Self {
            active: true,
            bundles: Vec::new(),
            state: StateFlags::DEPTH_TEST_LEQUAL | StateFlags::DEPTH_WRITE | StateFlags::CULL_CCW,
            alpha_test: AlphaTest::None,
            adjust_colors_for_fog: FogAdjust::None,
            bloom: false,
            base_color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            vertex_color: Vec4::zeros(),
            generators: StageGenerators::empty(),
            light_type: LightType::None,
            tex_gen: Vec4::zeros(),
        }
    }
}

impl MaterialStage {
    /// An opaque stage sampling one texture
    pub fn textured(texture: TextureHandle) -> Self {
        Self {
            bundles: vec![TextureBundle::still(texture)],
            ..Self::default()
        }
    }

    /// Replace the state bits
    #[must_use]
    pub const fn with_state(mut self, state: StateFlags) -> Self {
        self.state = state;
        self
    }

    /// Set the alpha-test mode
    #[must_use]
    pub const fn with_alpha_test(mut self, alpha_test: AlphaTest) -> Self {
        self.alpha_test = alpha_test;
        self
    }

    /// Set fog channel modulation
    #[must_use]
    pub const fn with_fog_adjust(mut self, adjust: FogAdjust) -> Self {
        self.adjust_colors_for_fog = adjust;
        self
    }

    /// Enable bloom output
    #[must_use]
    pub const fn with_bloom(mut self, bloom: bool) -> Self {
        self.bloom = bloom;
        self
    }

    /// Add a lightmap bundle
    #[must_use]
    pub fn with_lightmap(mut self, lightmap: TextureHandle) -> Self {
        if self.bundles.is_empty() {
            self.bundles.push(TextureBundle::default());
        }

        self.bundles.push(TextureBundle::still(lightmap));
        self.light_type = LightType::Map;
        self
    }

    /// First texture of the first bundle
    pub fn primary_texture(&self) -> Option<TextureHandle> {
        self.bundles.first().and_then(|bundle| bundle.textures.first().copied())
    }

    /// Channels fog modulates, as a shader mask
    pub fn fog_color_mask(&self) -> Vec4 {
        match self.adjust_colors_for_fog {
            FogAdjust::None => Vec4::zeros(),
            FogAdjust::ModulateRgb => Vec4::new(1.0, 1.0, 1.0, 0.0),
            FogAdjust::ModulateAlpha => Vec4::new(0.0, 0.0, 0.0, 1.0),
            FogAdjust::ModulateRgba => Vec4::new(1.0, 1.0, 1.0, 1.0),
        }
    }

    /// Write the stage's uniforms
    pub fn write_uniforms(&self, queue: &mut dyn GpuCommandQueue, set: StageUniformSet) {
        queue.set_uniform(Uniform::AlphaTest, Vec4::new(self.alpha_test.uniform_value(), 0.0, 0.0, 0.0));
        queue.set_uniform(Uniform::Generators, Vec4::new(f32::from(self.generators.bits()), 0.0, 0.0, 0.0));
        queue.set_uniform(Uniform::TexGen, self.tex_gen);

        if set == StageUniformSet::TexGen {
            return;
        }

        queue.set_uniform(Uniform::BaseColor, self.base_color);
        queue.set_uniform(Uniform::VertexColor, self.vertex_color);
        queue.set_uniform(Uniform::LightType, Vec4::new(self.light_type.uniform_value(), 0.0, 0.0, 0.0));
    }

    /// Bind the stage's textures at material time `time`
    ///
    /// Missing bundles fall back to `white`.
    pub fn bind_textures(&self, queue: &mut dyn GpuCommandQueue, time: f32, white: TextureHandle) {
        let frame = |index: usize| {
            self.bundles
                .get(index)
                .and_then(|bundle| bundle.frame(time))
                .unwrap_or(white)
        };

        queue.set_texture(Sampler::Diffuse, TextureSource::Texture(frame(0)));

        if self.light_type == LightType::Map {
            queue.set_texture(Sampler::Light, TextureSource::Texture(frame(1)));
        } else {
            queue.set_texture(Sampler::Diffuse2, TextureSource::Texture(frame(1)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_animation_wraps() {
        let bundle = TextureBundle {
            textures: vec![TextureHandle(1), TextureHandle(2), TextureHandle(3)],
            animation_speed: 2.0,
        };

        assert_eq!(bundle.frame(0.0), Some(TextureHandle(1)));
        assert_eq!(bundle.frame(0.5), Some(TextureHandle(2)));
        assert_eq!(bundle.frame(1.5), Some(TextureHandle(1)));
    }

    #[test]
    fn test_fog_color_mask() {
        let stage = MaterialStage::default().with_fog_adjust(FogAdjust::ModulateAlpha);
        assert_eq!(stage.fog_color_mask(), Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(MaterialStage::default().fog_color_mask(), Vec4::zeros());
    }

    #[test]
    fn test_lightmap_keeps_diffuse_slot() {
        let stage = MaterialStage::default().with_lightmap(TextureHandle(9));
        assert_eq!(stage.bundles.len(), 2);
        assert_eq!(stage.primary_texture(), None);
        assert_eq!(stage.light_type, LightType::Map);
    }
}
