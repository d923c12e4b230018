//! # Renderer Configuration
//!
//! All tunables of the scene renderer in one serializable structure. Values that
//! feed shaders directly (tonemap brightness, contrast, gamma, saturation) are
//! stored as authored and clamped to sane ranges when they are applied.
//!
//! ## Design Goals
//!
//! - **Serializable**: Loadable from TOML or RON through [`Config`]
//! - **Defaulted**: Every field has a default, so partial files are valid
//! - **Validated**: [`RendererConfig::validate`] rejects values the passes cannot use
//!
//! ## Configuration Categories
//!
//! - **Post-Process**: HDR, anti-aliasing mode, tonemap and gamma controls
//! - **Effects**: Soft sprites, water reflections, wireframe, rail geometry, lighting
//! - **Debug**: Debug overlay selection, debug text and statistics

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Vec3, Vec4};

// Re-export from the config module so users only need one import
pub use crate::config::{Config, ConfigError};

/// Anti-aliasing technique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AntiAliasing {
    /// No anti-aliasing
    #[default]
    None,
    /// 2x multisampling
    Msaa2x,
    /// 4x multisampling
    Msaa4x,
    /// 8x multisampling
    Msaa8x,
    /// 16x multisampling
    Msaa16x,
    /// Subpixel morphological anti-aliasing (post-process)
    Smaa,
}

impl AntiAliasing {
    /// Multisample count for the MSAA modes
    pub const fn msaa_samples(self) -> Option<u8> {
        match self {
            Self::Msaa2x => Some(2),
            Self::Msaa4x => Some(4),
            Self::Msaa8x => Some(8),
            Self::Msaa16x => Some(16),
            Self::None | Self::Smaa => None,
        }
    }

    /// Whether the SMAA post-process chain runs
    pub const fn is_smaa(self) -> bool {
        matches!(self, Self::Smaa)
    }
}

/// Shader inputs of the tonemap pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneMapUniforms {
    /// Brightness offset, contrast, gamma, saturation
    pub brightness_contrast_gamma_saturation: Vec4,
    /// Bloom scale, exposure
    pub bloom_scale_exposure: Vec4,
}

/// # Post-Processing Configuration
///
/// HDR and anti-aliasing switches plus the tonemap and display gamma controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    /// Render into floating-point targets and run bloom + tonemap
    pub hdr: bool,
    /// Anti-aliasing mode, fixed when the world is loaded
    pub anti_aliasing: AntiAliasing,
    /// Brightness, 1.0 is neutral
    pub brightness: f32,
    /// Contrast, 1.0 is neutral
    pub contrast: f32,
    /// Tonemap gamma
    pub hdr_gamma: f32,
    /// Color saturation, 1.0 is neutral
    pub saturation: f32,
    /// Bloom contribution
    pub hdr_bloom_scale: f32,
    /// Exposure
    pub hdr_exposure: f32,
    /// Display gamma used for the hardware gamma ramp
    pub gamma: f32,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            hdr: false,
            anti_aliasing: AntiAliasing::None,
            brightness: 1.0,
            contrast: 1.0,
            hdr_gamma: 2.2,
            saturation: 1.0,
            hdr_bloom_scale: 1.0,
            hdr_exposure: 1.0,
            gamma: 1.0,
        }
    }
}

impl PostProcessConfig {
    /// Tonemap uniforms with every control clamped to its usable range
    pub fn tonemap_uniforms(&self) -> ToneMapUniforms {
        ToneMapUniforms {
            brightness_contrast_gamma_saturation: Vec4::new(
                (self.brightness - 1.0).clamp(-0.8, 0.8),
                self.contrast.clamp(0.5, 3.0),
                self.hdr_gamma.clamp(0.5, 3.0),
                self.saturation.clamp(0.0, 3.0),
            ),
            bloom_scale_exposure: Vec4::new(self.hdr_bloom_scale, self.hdr_exposure, 0.0, 0.0),
        }
    }
}

/// # Effects Configuration
///
/// Scene effect toggles and the constants of procedural entity geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// Fade sprites against the linear depth of the scene
    pub soft_sprites: bool,
    /// Render a reflection camera for reflective surfaces
    pub water_reflections: bool,
    /// Overlay every draw call as white lines
    pub wireframe: bool,
    /// Rail ring width
    pub rail_width: f32,
    /// Rail core and lightning half-width
    pub rail_core_width: f32,
    /// Distance between rail rings
    pub rail_segment_length: f32,
    /// Overbright shift applied to lighting
    pub overbright_bits: u8,
    /// Direction towards the sun, used when no light grid is available
    pub sun_direction: [f32; 3],
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            soft_sprites: true,
            water_reflections: true,
            wireframe: false,
            rail_width: 16.0,
            rail_core_width: 6.0,
            rail_segment_length: 32.0,
            overbright_bits: 1,
            sun_direction: [0.45, 0.3, 0.9],
        }
    }
}

impl EffectsConfig {
    /// Light scale that maps 255 to full intensity after overbrighting
    pub fn identity_light(&self) -> f32 {
        1.0 / f32::from(1u16 << self.overbright_bits.min(8))
    }

    /// Normalized sun direction
    pub fn sun_direction(&self) -> Vec3 {
        let [x, y, z] = self.sun_direction;
        Vec3::new(x, y, z).try_normalize(f32::EPSILON).unwrap_or_else(Vec3::z)
    }
}

/// # Debug Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Debug overlay name: bloom, depth, dlight, lightmap, reflection or smaa
    pub debug_draw: String,
    /// Edge length of a debug overlay tile in pixels
    pub debug_draw_size: u32,
    /// Show the debug text overlay
    pub debug_text: bool,
    /// Show backend statistics
    pub show_stats: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            debug_draw: String::new(),
            debug_draw_size: 256,
            debug_text: false,
            show_stats: false,
        }
    }
}

/// # Renderer Configuration
///
/// Top-level settings consumed by the frame orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// View slots available per frame
    pub max_views: u16,
    /// Post-processing settings
    pub postprocess: PostProcessConfig,
    /// Effect settings
    pub effects: EffectsConfig,
    /// Debug settings
    pub debug: DebugConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_views: Self::DEFAULT_MAX_VIEWS,
            postprocess: PostProcessConfig::default(),
            effects: EffectsConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Default number of view slots per frame
    pub const DEFAULT_MAX_VIEWS: u16 = 256;

    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable HDR rendering
    pub fn with_hdr(mut self, enabled: bool) -> Self {
        self.postprocess.hdr = enabled;
        self
    }

    /// Set the anti-aliasing mode
    pub fn with_anti_aliasing(mut self, mode: AntiAliasing) -> Self {
        self.postprocess.anti_aliasing = mode;
        self
    }

    /// Enable or disable soft sprites
    pub fn with_soft_sprites(mut self, enabled: bool) -> Self {
        self.effects.soft_sprites = enabled;
        self
    }

    /// Enable or disable the reflection camera
    pub fn with_water_reflections(mut self, enabled: bool) -> Self {
        self.effects.water_reflections = enabled;
        self
    }

    /// Enable or disable the wireframe overlay
    pub fn with_wireframe(mut self, enabled: bool) -> Self {
        self.effects.wireframe = enabled;
        self
    }

    /// Select a debug overlay by name
    pub fn with_debug_draw(mut self, name: impl Into<String>) -> Self {
        self.debug.debug_draw = name.into();
        self
    }

    /// Set the number of view slots per frame
    pub fn with_max_views(mut self, max_views: u16) -> Self {
        self.max_views = max_views;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_views == 0 {
            return Err("At least one view slot is required".to_string());
        }

        if self.effects.rail_segment_length <= 0.0 {
            return Err(format!(
                "Rail segment length must be positive, got {}",
                self.effects.rail_segment_length
            ));
        }

        if self.effects.overbright_bits > 8 {
            return Err("Overbright bits should not exceed 8".to_string());
        }

        if self.debug.debug_draw_size == 0 {
            return Err("Debug draw size must be at least 1 pixel".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config_is_valid() {
        let config = RendererConfig::new();
        assert_eq!(config.max_views, RendererConfig::DEFAULT_MAX_VIEWS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_views() {
        let config = RendererConfig::new().with_max_views(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tonemap_uniforms_are_clamped() {
        let config = PostProcessConfig {
            brightness: 5.0,
            contrast: 0.1,
            hdr_gamma: 9.0,
            saturation: -1.0,
            hdr_bloom_scale: 0.5,
            hdr_exposure: 2.0,
            ..Default::default()
        };

        let uniforms = config.tonemap_uniforms();
        assert_relative_eq!(uniforms.brightness_contrast_gamma_saturation, Vec4::new(0.8, 0.5, 3.0, 0.0));
        assert_relative_eq!(uniforms.bloom_scale_exposure, Vec4::new(0.5, 2.0, 0.0, 0.0));
    }

    #[test]
    fn test_identity_light() {
        let mut effects = EffectsConfig::default();
        effects.overbright_bits = 0;
        assert_relative_eq!(effects.identity_light(), 1.0);
        effects.overbright_bits = 2;
        assert_relative_eq!(effects.identity_light(), 0.25);
    }

    #[test]
    fn test_toml_round_trip_keeps_overrides() {
        let config = RendererConfig::new()
            .with_hdr(true)
            .with_anti_aliasing(AntiAliasing::Smaa)
            .with_debug_draw("bloom");

        let text = config.to_string_with_format(crate::config::ConfigFormat::Toml).unwrap();
        let parsed = RendererConfig::from_str_with_format(&text, crate::config::ConfigFormat::Toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let parsed = RendererConfig::from_str_with_format(
            "(postprocess: (hdr: true), max_views: 64)",
            crate::config::ConfigFormat::Ron,
        )
        .unwrap();

        assert!(parsed.postprocess.hdr);
        assert_eq!(parsed.max_views, 64);
        assert!(parsed.effects.soft_sprites);
    }
}
