//! Debug overlays and the display gamma ramp

use crate::foundation::logging::WarnOnce;
use crate::foundation::math::{Rect, Vec4};
use crate::render::api::{
    DynamicLightTextures, GpuCommandQueue, RenderTarget, Sampler, TextureHandle, TextureSource, Uniform,
};
use crate::render::frame::targets::RenderTargets;
use crate::render::frame::views::{ScreenQuad, ViewAllocator};
use crate::render::primitives::shader::Program;
use crate::render::RenderResult;

/// `TextureDebug` mode showing the red channel as grayscale
pub const TEXTURE_DEBUG_SINGLE_CHANNEL: f32 = 0.0;
/// `TextureDebug` mode decoding RGBM lightmaps
pub const TEXTURE_DEBUG_RGBM: f32 = 1.0;

/// Display gamma range accepted by [`GammaTable::build`]
pub const GAMMA_RANGE: (f32, f32) = (0.5, 3.0);

/// Intermediate target shown in the corner of the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugOverlay {
    /// Nothing
    #[default]
    None,
    /// Scene bloom attachment and both blur targets
    Bloom,
    /// Linear depth
    Depth,
    /// Dynamic light data texture
    DynamicLight,
    /// Every world lightmap
    Lightmap,
    /// Reflection target
    Reflection,
    /// SMAA edges and blend weights
    Smaa,
}

impl DebugOverlay {
    /// Parse an overlay name, case-insensitively; unknown names are [`Self::None`]
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "bloom" => Self::Bloom,
            "depth" => Self::Depth,
            "dlight" => Self::DynamicLight,
            "lightmap" => Self::Lightmap,
            "reflection" => Self::Reflection,
            "smaa" => Self::Smaa,
            _ => Self::None,
        }
    }
}

/// One overlay tile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayTile {
    /// Texture shown
    pub source: TextureSource,
    /// Column, in tiles
    pub x: i32,
    /// Row, in tiles
    pub y: i32,
    /// `TextureDebug` mode, for single-channel and RGBM inputs
    pub debug_mode: Option<f32>,
}

impl OverlayTile {
    const fn plain(source: TextureSource, x: i32) -> Self {
        Self { source, x, y: 0, debug_mode: None }
    }

    const fn decoded(source: TextureSource, x: i32, mode: f32) -> Self {
        Self { source, x, y: 0, debug_mode: Some(mode) }
    }
}

/// What the overlays can show this frame
#[derive(Debug, Clone, Copy)]
pub struct OverlaySources<'a> {
    /// Offscreen targets, once a world is loaded
    pub targets: Option<&'a RenderTargets>,
    /// Dynamic light textures
    pub dynamic_lights: DynamicLightTextures,
    /// World lightmaps
    pub lightmaps: &'a [TextureHandle],
}

impl DebugOverlay {
    /// Tiles to draw, left to right
    ///
    /// Overlays whose inputs do not exist yet produce nothing.
    pub fn tiles(self, sources: &OverlaySources<'_>) -> Vec<OverlayTile> {
        let targets = sources.targets;

        match self {
            Self::None => Vec::new(),
            Self::Bloom => targets
                .and_then(|t| t.bloom.zip(t.scene_bloom_attachment).map(|(bloom, attachment)| (t.scene, bloom, attachment)))
                .map(|(scene, bloom, attachment)| {
                    vec![
                        OverlayTile::plain(TextureSource::Attachment { frame_buffer: scene, attachment }, 0),
                        OverlayTile::plain(TextureSource::frame_buffer(bloom[0]), 1),
                        OverlayTile::plain(TextureSource::frame_buffer(bloom[1]), 2),
                    ]
                })
                .unwrap_or_default(),
            Self::Depth => targets
                .map(|t| vec![OverlayTile::plain(TextureSource::frame_buffer(t.linear_depth), 0)])
                .unwrap_or_default(),
            Self::DynamicLight => vec![OverlayTile::decoded(
                TextureSource::Texture(sources.dynamic_lights.lights),
                0,
                TEXTURE_DEBUG_SINGLE_CHANNEL,
            )],
            Self::Lightmap => (0..)
                .zip(sources.lightmaps)
                .map(|(x, lightmap)| OverlayTile::decoded(TextureSource::Texture(*lightmap), x, TEXTURE_DEBUG_RGBM))
                .collect(),
            Self::Reflection => targets
                .and_then(|t| t.reflection)
                .map(|reflection| vec![OverlayTile::plain(TextureSource::frame_buffer(reflection), 0)])
                .unwrap_or_default(),
            Self::Smaa => targets
                .and_then(|t| t.smaa)
                .map(|smaa| {
                    vec![
                        OverlayTile::decoded(TextureSource::frame_buffer(smaa.edges), 0, TEXTURE_DEBUG_SINGLE_CHANNEL),
                        OverlayTile::decoded(TextureSource::frame_buffer(smaa.blend), 1, TEXTURE_DEBUG_SINGLE_CHANNEL),
                    ]
                })
                .unwrap_or_default(),
        }
    }

    /// Draw the overlay tiles into the backbuffer, `size` pixels square each
    pub fn render(
        self,
        queue: &mut dyn GpuCommandQueue,
        views: &mut ViewAllocator,
        warn_once: &mut WarnOnce,
        sources: &OverlaySources<'_>,
        size: u32,
    ) -> RenderResult<()> {
        let size = i32::try_from(size).unwrap_or(i32::MAX);

        for tile in self.tiles(sources) {
            let program = match tile.debug_mode {
                Some(mode) => {
                    queue.set_uniform(Uniform::TextureDebug, Vec4::new(mode, 0.0, 0.0, 0.0));
                    Program::TextureDebug
                }
                None => Program::Texture,
            };

            queue.set_texture(Sampler::Texture, tile.source);
            let quad = ScreenQuad::new(RenderTarget::Backbuffer, program)
                .with_rect(Rect::new(size * tile.x, size * tile.y, size, size));
            views.render_screen_quad(queue, warn_once, &quad)?;
        }

        Ok(())
    }
}

/// 256-entry display gamma ramp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GammaTable([u8; 256]);

impl GammaTable {
    /// Build the ramp for `gamma`, clamped to [`GAMMA_RANGE`]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn build(gamma: f32) -> Self {
        let gamma = gamma.clamp(GAMMA_RANGE.0, GAMMA_RANGE.1);
        let mut table = [0u8; 256];

        for (i, entry) in (0u8..=255).zip(table.iter_mut()) {
            *entry = if (gamma - 1.0).abs() < f32::EPSILON {
                i
            } else {
                let value = 255.0 * (f32::from(i) / 255.0).powf(1.0 / gamma);
                value.round().clamp(0.0, 255.0) as u8
            };
        }

        Self(table)
    }

    /// Ramp entries
    pub const fn entries(&self) -> &[u8; 256] {
        &self.0
    }

    /// Whether the ramp maps every value to itself
    pub fn is_identity(&self) -> bool {
        (0u8..=255).zip(self.0.iter()).all(|(i, entry)| i == *entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{AntiAliasing, PostProcessConfig};
    use crate::render::api::RecordingQueue;
    use crate::render::frame::targets::SmaaLookup;

    fn lights() -> DynamicLightTextures {
        DynamicLightTextures { cells: TextureHandle(90), indices: TextureHandle(91), lights: TextureHandle(92) }
    }

    #[test]
    fn test_overlay_names() {
        assert_eq!(DebugOverlay::from_name("bloom"), DebugOverlay::Bloom);
        assert_eq!(DebugOverlay::from_name("DLight"), DebugOverlay::DynamicLight);
        assert_eq!(DebugOverlay::from_name("SMAA"), DebugOverlay::Smaa);
        assert_eq!(DebugOverlay::from_name("lightmap"), DebugOverlay::Lightmap);
        assert_eq!(DebugOverlay::from_name("shadows"), DebugOverlay::None);
        assert_eq!(DebugOverlay::from_name(""), DebugOverlay::None);
    }

    #[test]
    fn test_gamma_table() {
        let table = GammaTable::build(2.0);
        let expected = (255.0 * (128.0f32 / 255.0).powf(0.5)).round() as u8;

        assert_eq!(table.entries()[128], expected);
        assert_eq!(table.entries()[0], 0);
        assert_eq!(table.entries()[255], 255);
        assert!(GammaTable::build(1.0).is_identity());
    }

    #[test]
    fn test_gamma_is_clamped() {
        assert_eq!(GammaTable::build(10.0), GammaTable::build(3.0));
        assert_eq!(GammaTable::build(0.0), GammaTable::build(0.5));
    }

    #[test]
    fn test_lightmaps_tile_along_x() {
        let lightmaps = [TextureHandle(5), TextureHandle(6), TextureHandle(7)];
        let sources = OverlaySources { targets: None, dynamic_lights: lights(), lightmaps: &lightmaps };
        let tiles = DebugOverlay::Lightmap.tiles(&sources);

        assert_eq!(tiles.len(), 3);
        assert_eq!(tiles[2].x, 2);
        assert_eq!(tiles[2].source, TextureSource::Texture(TextureHandle(7)));
        assert_eq!(tiles[0].debug_mode, Some(TEXTURE_DEBUG_RGBM));
    }

    #[test]
    fn test_overlays_without_targets_draw_nothing() {
        let sources = OverlaySources { targets: None, dynamic_lights: lights(), lightmaps: &[] };

        assert!(DebugOverlay::Bloom.tiles(&sources).is_empty());
        assert!(DebugOverlay::Smaa.tiles(&sources).is_empty());
        assert_eq!(DebugOverlay::DynamicLight.tiles(&sources).len(), 1);
    }

    #[test]
    fn test_bloom_overlay_placement() {
        let mut queue = RecordingQueue::new(1024, 768);
        let config = PostProcessConfig { hdr: true, anti_aliasing: AntiAliasing::None, ..PostProcessConfig::default() };
        let targets = RenderTargets::create(&mut queue, &config, false, Some(&SmaaLookup::zeroed())).expect("targets");
        let sources = OverlaySources { targets: Some(&targets), dynamic_lights: lights(), lightmaps: &[] };
        let mut views = ViewAllocator::new(8);
        let mut warn_once = WarnOnce::new();

        DebugOverlay::Bloom
            .render(&mut queue, &mut views, &mut warn_once, &sources, 128)
            .expect("overlay");

        let rects: Vec<Rect> = queue.views().iter().map(|(_, _, d)| d.rect).collect();
        assert_eq!(rects, vec![Rect::new(0, 0, 128, 128), Rect::new(128, 0, 128, 128), Rect::new(256, 0, 128, 128)]);
        assert_eq!(
            queue.submissions()[0].textures[&Sampler::Texture],
            TextureSource::Attachment { frame_buffer: targets.scene, attachment: 1 }
        );
    }
}
