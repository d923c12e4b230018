//! # Material Stage Evaluation
//!
//! Resolves the GPU state word and shader variant for one material stage of
//! one draw call. Resolution is a pure function of the stage, the material,
//! the draw call and a handful of global toggles; [`StageResolution::apply`]
//! then writes the resolved uniforms and textures to the queue.
//!
//! ## Variant Bits
//!
//! | Bit            | Condition                                                   |
//! |----------------|-------------------------------------------------------------|
//! | ALPHA_TEST     | stage has an alpha-test mode                                |
//! | SOFT_SPRITE    | no alpha test, world scene, soft sprites on, sprite depth>0 |
//! | DYNAMIC_LIGHTS | world scene, draw call dynamically lit, not sky             |
//! | DEPTH_RANGE    | material polygon offset, or draw call z offset/scale        |
//! | HDR            | HDR enabled                                                 |
//!
//! Soft sprites with an additive (one, one) blend are rewritten to
//! (source alpha, one) with `use_alpha = 0`, so the shader can fade them
//! while keeping the additive look.

use crate::foundation::math::Vec4;
use crate::render::api::{DynamicLightTextures, GpuCommandQueue, Sampler, TextureHandle, TextureSource, Uniform};
use crate::render::primitives::draw_call::{DrawCall, DrawCallFlags};
use crate::render::primitives::shader::{DepthVariant, FogVariant, GenericVariant};
use crate::render::primitives::state::{BlendFactor, StateFlags};
use crate::render::resources::materials::{AlphaTest, FogAdjust, Material, MaterialStage, StageUniformSet};

/// Global toggles that affect stage resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageContext {
    /// Rendering the loaded world
    pub world_scene: bool,
    /// HDR output enabled
    pub hdr: bool,
    /// Soft sprites enabled
    pub soft_sprites: bool,
    /// The draw call is inside a fog volume its material accepts
    pub fogged: bool,
}

/// Soft sprite parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftSprite {
    /// Fade depth
    pub depth: f32,
    /// Whether the shader honors texture alpha
    pub use_alpha: bool,
}

/// Resolved state and variant for one stage submission
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageResolution {
    /// Draw call state OR stage state, possibly with a rewritten blend
    pub state: StateFlags,
    /// Generic program variant
    pub variant: GenericVariant,
    /// Set when the soft sprite variant is selected
    pub soft_sprite: Option<SoftSprite>,
    /// Bloom flag, set when HDR is enabled
    pub bloom: Option<bool>,
    /// Fog channel mask, set when fog adjusts this stage
    pub fog_color_mask: Option<Vec4>,
}

/// Textures a stage submission may sample besides its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageInputs {
    /// Fallback for missing bundles
    pub white: TextureHandle,
    /// Scene linear depth, for soft sprites
    pub linear_depth: Option<TextureSource>,
    /// Clustered light textures
    pub dynamic_lights: Option<DynamicLightTextures>,
}

/// Resolve one stage of a draw call
pub fn evaluate_stage(
    stage: &MaterialStage,
    material: &Material,
    draw_call: &DrawCall,
    context: &StageContext,
) -> StageResolution {
    let mut state = draw_call.state | stage.state;
    let mut variant = GenericVariant::empty();
    let mut soft_sprite = None;

    if stage.alpha_test != AlphaTest::None {
        variant |= GenericVariant::ALPHA_TEST;
    } else if context.world_scene && context.soft_sprites && draw_call.soft_sprite_depth > 0.0 {
        variant |= GenericVariant::SOFT_SPRITE;
        let mut use_alpha = true;

        if state.blend() == StateFlags::BLEND_ADD {
            use_alpha = false;
            state = state.with_blend(StateFlags::blend_func(BlendFactor::SrcAlpha, BlendFactor::One));
        }

        soft_sprite = Some(SoftSprite { depth: draw_call.soft_sprite_depth, use_alpha });
    }

    if context.world_scene && draw_call.dynamic_lighting && !draw_call.flags.contains(DrawCallFlags::SKY) {
        variant |= GenericVariant::DYNAMIC_LIGHTS;
    }

    if material.polygon_offset || draw_call.has_depth_range() {
        variant |= GenericVariant::DEPTH_RANGE;
    }

    let bloom = if context.hdr {
        variant |= GenericVariant::HDR;
        Some(stage.bloom)
    } else {
        None
    };

    let fog_color_mask =
        (context.fogged && stage.adjust_colors_for_fog != FogAdjust::None).then(|| stage.fog_color_mask());

    StageResolution { state, variant, soft_sprite, bloom, fog_color_mask }
}

impl StageResolution {
    /// Write the stage's uniforms, textures and state
    ///
    /// Geometry, transform and stencil are left to the caller, which must
    /// submit before resolving another stage.
    pub fn apply(
        &self,
        stage: &MaterialStage,
        material_time: f32,
        inputs: &StageInputs,
        queue: &mut dyn GpuCommandQueue,
    ) {
        if let Some(mask) = self.fog_color_mask {
            queue.set_uniform(Uniform::FogEnabled, Vec4::new(1.0, 0.0, 0.0, 0.0));
            queue.set_uniform(Uniform::FogColorMask, mask);
        } else {
            queue.set_uniform(Uniform::FogEnabled, Vec4::zeros());
        }

        stage.write_uniforms(queue, StageUniformSet::All);
        stage.bind_textures(queue, material_time, inputs.white);

        if let Some(soft_sprite) = self.soft_sprite {
            if let Some(depth) = inputs.linear_depth {
                queue.set_texture(Sampler::Depth, depth);
            }

            let use_alpha = if soft_sprite.use_alpha { 1.0 } else { 0.0 };
            queue.set_uniform(Uniform::SoftSpriteDepthUseAlpha, Vec4::new(soft_sprite.depth, use_alpha, 0.0, 0.0));
        }

        if self.variant.contains(GenericVariant::DYNAMIC_LIGHTS) {
            if let Some(textures) = inputs.dynamic_lights {
                queue.set_texture(Sampler::DynamicLightCells, TextureSource::Texture(textures.cells));
                queue.set_texture(Sampler::DynamicLightIndices, TextureSource::Texture(textures.indices));
                queue.set_texture(Sampler::DynamicLights, TextureSource::Texture(textures.lights));
            }
        }

        if let Some(bloom) = self.bloom {
            let enabled = if bloom { 1.0 } else { 0.0 };
            queue.set_uniform(Uniform::BloomEnabled, Vec4::new(enabled, 0.0, 0.0, 0.0));
        }

        queue.set_state(self.state);
    }
}

/// Depth pre-pass resolution for a material
#[derive(Debug, Clone, Copy)]
pub struct DepthResolution<'a> {
    /// Depth-only state with the material's cull bits
    pub state: StateFlags,
    /// Depth program variant
    pub variant: DepthVariant,
    /// Stage whose first texture drives the alpha test
    pub alpha_test_stage: Option<&'a MaterialStage>,
}

/// Resolve the depth pre-pass submission of a draw call
pub fn evaluate_depth<'a>(material: &'a Material, draw_call: &DrawCall) -> DepthResolution<'a> {
    let state = StateFlags::DEPTH_TEST_LESS | StateFlags::DEPTH_WRITE | StateFlags::MSAA | material.cull_state();
    let alpha_test_stage = material.first_alpha_test_stage();
    let mut variant = DepthVariant::empty();

    if alpha_test_stage.is_some() {
        variant |= DepthVariant::ALPHA_TEST;
    }

    if draw_call.has_depth_range() {
        variant |= DepthVariant::DEPTH_RANGE;
    }

    DepthResolution { state, variant, alpha_test_stage }
}

/// Fog pass variant
pub fn fog_variant(draw_call: &DrawCall, hdr: bool) -> FogVariant {
    let mut variant = FogVariant::empty();

    if draw_call.has_depth_range() {
        variant |= FogVariant::DEPTH_RANGE;
    }

    if hdr {
        variant |= FogVariant::HDR;
    }

    variant
}

/// State of a 2D stage submission: depth test and write are always off
pub fn resolve_2d_state(stage: &MaterialStage) -> StateFlags {
    (StateFlags::RGB_WRITE | StateFlags::ALPHA_WRITE | stage.state).without_depth()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::primitives::geometry::{BufferHandle, BufferLifetime, GeometryRef};
    use crate::render::resources::materials::{MaterialCache, MaterialSort};

    fn draw_call(material: &Material) -> DrawCall {
        let buffer = BufferHandle::new(BufferLifetime::Transient, 1);
        DrawCall::new(GeometryRef::indexed(buffer, 0, 4, buffer, 0, 6), material)
    }

    fn world() -> StageContext {
        StageContext { world_scene: true, hdr: false, soft_sprites: true, fogged: false }
    }

    #[test]
    fn test_soft_sprite_rewrites_additive_blend() {
        let stage = MaterialStage::default().with_state(StateFlags::BLEND_ADD);
        let material = Material::new("flare", MaterialSort::Blend0).with_stage(stage.clone());
        let dc = draw_call(&material).with_soft_sprite_depth(8.0).with_dynamic_lighting(false);

        let resolved = evaluate_stage(&stage, &material, &dc, &world());

        assert_eq!(resolved.variant, GenericVariant::SOFT_SPRITE);
        assert_eq!(resolved.state.blend(), StateFlags::blend_func(BlendFactor::SrcAlpha, BlendFactor::One));
        assert_eq!(resolved.soft_sprite, Some(SoftSprite { depth: 8.0, use_alpha: false }));
    }

    #[test]
    fn test_soft_sprite_keeps_alpha_blend() {
        let stage = MaterialStage::default().with_state(StateFlags::BLEND_ALPHA);
        let material = Material::new("smoke", MaterialSort::Blend0).with_stage(stage.clone());
        let dc = draw_call(&material).with_soft_sprite_depth(4.0);

        let resolved = evaluate_stage(&stage, &material, &dc, &world());

        assert_eq!(resolved.state.blend(), StateFlags::BLEND_ALPHA);
        assert_eq!(resolved.soft_sprite.map(|s| s.use_alpha), Some(true));
    }

    #[test]
    fn test_alpha_test_wins_over_soft_sprite() {
        let stage = MaterialStage::default().with_alpha_test(AlphaTest::Ge128);
        let material = Material::new("leaves", MaterialSort::SeeThrough).with_stage(stage.clone());
        let dc = draw_call(&material).with_soft_sprite_depth(4.0).with_dynamic_lighting(false);

        let resolved = evaluate_stage(&stage, &material, &dc, &world());

        assert_eq!(resolved.variant, GenericVariant::ALPHA_TEST);
        assert!(resolved.soft_sprite.is_none());
    }

    #[test]
    fn test_dynamic_lights_skip_sky_and_non_world() {
        let stage = MaterialStage::default();
        let material = Material::new("sky", MaterialSort::Environment).with_stage(stage.clone());

        let lit = evaluate_stage(&stage, &material, &draw_call(&material), &world());
        assert!(lit.variant.contains(GenericVariant::DYNAMIC_LIGHTS));

        let sky = evaluate_stage(&stage, &material, &draw_call(&material).as_sky(), &world());
        assert!(!sky.variant.contains(GenericVariant::DYNAMIC_LIGHTS));

        let menu = evaluate_stage(&stage, &material, &draw_call(&material), &StageContext::default());
        assert_eq!(menu.variant, GenericVariant::empty());
    }

    #[test]
    fn test_depth_range_and_hdr_bits() {
        let stage = MaterialStage::default().with_bloom(true);
        let material = Material::new("decal", MaterialSort::Decal)
            .with_polygon_offset()
            .with_stage(stage.clone());
        let context = StageContext { hdr: true, ..StageContext::default() };

        let resolved = evaluate_stage(&stage, &material, &draw_call(&material), &context);

        assert_eq!(resolved.variant, GenericVariant::DEPTH_RANGE | GenericVariant::HDR);
        assert_eq!(resolved.bloom, Some(true));
    }

    #[test]
    fn test_resolution_is_pure() {
        let stage = MaterialStage::default()
            .with_state(StateFlags::BLEND_ADD)
            .with_fog_adjust(FogAdjust::ModulateRgb);
        let mut cache = MaterialCache::new();
        let handle = cache.insert(Material::new("glow", MaterialSort::Blend1).with_stage(stage.clone()));
        let material = cache.get(handle);
        let dc = draw_call(material).with_soft_sprite_depth(2.0).with_depth_range(0.0, 0.3);
        let context = StageContext { fogged: true, hdr: true, ..world() };

        let first = evaluate_stage(&stage, material, &dc, &context);
        let second = evaluate_stage(&stage, material, &dc, &context);

        assert_eq!(first, second);
        assert_eq!(first.fog_color_mask, Some(Vec4::new(1.0, 1.0, 1.0, 0.0)));
    }

    #[test]
    fn test_2d_state_strips_depth() {
        let stage = MaterialStage::default().with_state(StateFlags::DEPTH_TEST_LEQUAL | StateFlags::DEPTH_WRITE | StateFlags::BLEND_ALPHA);
        let state = resolve_2d_state(&stage);

        assert_eq!(state.depth_test(), StateFlags::empty());
        assert!(!state.contains(StateFlags::DEPTH_WRITE));
        assert!(state.contains(StateFlags::RGB_WRITE | StateFlags::ALPHA_WRITE));
        assert_eq!(state.blend(), StateFlags::BLEND_ALPHA);
    }

    #[test]
    fn test_depth_pass_variant() {
        let material = Material::new("grate", MaterialSort::Opaque)
            .with_stage(MaterialStage::default().with_state(StateFlags::CULL_CW).with_alpha_test(AlphaTest::Gt0));
        let resolution = evaluate_depth(&material, &draw_call(&material).with_depth_range(0.1, 0.0));

        assert_eq!(resolution.variant, DepthVariant::ALPHA_TEST | DepthVariant::DEPTH_RANGE);
        assert_eq!(resolution.state.cull(), StateFlags::CULL_CW);
        assert!(resolution.alpha_test_stage.is_some());
    }
}
