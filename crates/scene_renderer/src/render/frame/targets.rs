//! Offscreen render targets of a world scene
//!
//! Created once when a world is loaded. Which targets exist depends on the
//! HDR, anti-aliasing and reflection settings at that moment:
//!
//! | Target        | LDR                    | HDR                                  |
//! |---------------|------------------------|--------------------------------------|
//! | scene         | BGRA8 + D24S8 (MSAA)   | RGBA16F + BGRA8 bloom + D24S8        |
//! | linear depth  | R16F                   | R16F                                 |
//! | reflection    | BGRA8 (MSAA)           | RGBA16F                              |
//! | scene temp    | -                      | BGRA8, SMAA only                     |
//! | bloom ping/pong | -                    | 2 x quarter-size BGRA8               |
//! | SMAA          | edges RG8, blend BGRA8, area/search lookups                  |

use crate::core::config::PostProcessConfig;
use crate::foundation::logging::warn;
use crate::render::api::{FrameBufferHandle, GpuCommandQueue, TextureDesc, TextureFormat, TextureHandle, TextureSize};
use crate::render::RenderResult;

/// Width of the SMAA area lookup texture
pub const SMAA_AREA_WIDTH: u32 = 160;
/// Height of the SMAA area lookup texture
pub const SMAA_AREA_HEIGHT: u32 = 560;
/// Width of the SMAA search lookup texture
pub const SMAA_SEARCH_WIDTH: u32 = 64;
/// Height of the SMAA search lookup texture
pub const SMAA_SEARCH_HEIGHT: u32 = 16;

/// Precomputed SMAA lookup textures supplied by the host
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SmaaLookup {
    /// RG8 area texture bytes
    pub area: Vec<u8>,
    /// R8 search texture bytes
    pub search: Vec<u8>,
}

impl SmaaLookup {
    /// Bytes of the area texture
    pub const AREA_SIZE: usize = (SMAA_AREA_WIDTH * SMAA_AREA_HEIGHT * 2) as usize;
    /// Bytes of the search texture
    pub const SEARCH_SIZE: usize = (SMAA_SEARCH_WIDTH * SMAA_SEARCH_HEIGHT) as usize;

    /// Zero-filled lookups
    pub fn zeroed() -> Self {
        Self { area: vec![0; Self::AREA_SIZE], search: vec![0; Self::SEARCH_SIZE] }
    }

    fn is_complete(&self) -> bool {
        self.area.len() >= Self::AREA_SIZE && self.search.len() >= Self::SEARCH_SIZE
    }
}

/// SMAA intermediate targets and lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmaaTargets {
    /// Edge detection output
    pub edges: FrameBufferHandle,
    /// Blend weight output
    pub blend: FrameBufferHandle,
    /// Area lookup
    pub area: TextureHandle,
    /// Search lookup
    pub search: TextureHandle,
}

/// Every offscreen target of a loaded world
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargets {
    /// Main scene color, bloom (HDR) and depth-stencil
    pub scene: FrameBufferHandle,
    /// Attachment holding bloom color, HDR only
    pub scene_bloom_attachment: Option<u8>,
    /// Attachment holding depth-stencil
    pub scene_depth_attachment: u8,
    /// Linear depth written after the depth pre-pass
    pub linear_depth: FrameBufferHandle,
    /// Tonemap output feeding SMAA
    pub scene_temp: Option<FrameBufferHandle>,
    /// Quarter-size bloom ping-pong buffers
    pub bloom: Option<[FrameBufferHandle; 2]>,
    /// Reflection camera output
    pub reflection: Option<FrameBufferHandle>,
    /// Reflection color texture, sampled by materials
    pub reflection_texture: Option<TextureHandle>,
    /// SMAA resources
    pub smaa: Option<SmaaTargets>,
    hdr: bool,
    owned: Allocations,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Allocations {
    textures: Vec<TextureHandle>,
    frame_buffers: Vec<FrameBufferHandle>,
}

impl Allocations {
    fn texture(&mut self, queue: &mut dyn GpuCommandQueue, desc: &TextureDesc, data: Option<&[u8]>) -> RenderResult<TextureHandle> {
        let texture = queue.create_texture(desc, data)?;
        self.textures.push(texture);
        Ok(texture)
    }

    fn frame_buffer(&mut self, queue: &mut dyn GpuCommandQueue, attachments: &[TextureHandle]) -> RenderResult<FrameBufferHandle> {
        let frame_buffer = queue.create_frame_buffer(attachments)?;
        self.frame_buffers.push(frame_buffer);
        Ok(frame_buffer)
    }

    /// Single-attachment frame buffer over a fresh texture
    fn color_target(&mut self, queue: &mut dyn GpuCommandQueue, desc: &TextureDesc) -> RenderResult<FrameBufferHandle> {
        let texture = self.texture(queue, desc, None)?;
        self.frame_buffer(queue, &[texture])
    }

    fn release(&mut self, queue: &mut dyn GpuCommandQueue) {
        for frame_buffer in self.frame_buffers.drain(..) {
            queue.destroy_frame_buffer(frame_buffer);
        }

        for texture in self.textures.drain(..) {
            queue.destroy_texture(texture);
        }
    }
}

impl RenderTargets {
    /// Create the targets for the current settings
    ///
    /// Anything created before a failure is destroyed again.
    pub fn create(
        queue: &mut dyn GpuCommandQueue,
        postprocess: &PostProcessConfig,
        reflections: bool,
        smaa_lookup: Option<&SmaaLookup>,
    ) -> RenderResult<Self> {
        let mut owned = Allocations::default();

        match Self::build(queue, &mut owned, postprocess, reflections, smaa_lookup) {
            Ok(mut targets) => {
                targets.owned = owned;
                Ok(targets)
            }
            Err(e) => {
                owned.release(queue);
                Err(e)
            }
        }
    }

    fn build(
        queue: &mut dyn GpuCommandQueue,
        owned: &mut Allocations,
        postprocess: &PostProcessConfig,
        reflections: bool,
        smaa_lookup: Option<&SmaaLookup>,
    ) -> RenderResult<Self> {
        let full = TextureSize::Backbuffer;
        let smaa_enabled = postprocess.anti_aliasing.is_smaa();
        let linear_depth = owned.color_target(queue, &TextureDesc::render_target(TextureFormat::R16F, full))?;

        let mut targets = Self {
            scene: linear_depth,
            scene_bloom_attachment: None,
            scene_depth_attachment: 1,
            linear_depth,
            scene_temp: None,
            bloom: None,
            reflection: None,
            reflection_texture: None,
            smaa: None,
            hdr: postprocess.hdr,
            owned: Allocations::default(),
        };

        if postprocess.hdr {
            if reflections {
                let desc = TextureDesc::render_target(TextureFormat::RGBA16F, full);
                targets.reflection_texture = Some(owned.texture(queue, &desc, None)?);
            }

            if smaa_enabled {
                targets.scene_temp = Some(owned.color_target(queue, &TextureDesc::render_target(TextureFormat::BGRA8, full))?);
            }

            let color = owned.texture(queue, &TextureDesc::render_target(TextureFormat::RGBA16F, full), None)?;
            let bloom = owned.texture(queue, &TextureDesc::render_target(TextureFormat::BGRA8, full), None)?;
            let depth = owned.texture(queue, &depth_desc(1), None)?;
            targets.scene = owned.frame_buffer(queue, &[color, bloom, depth])?;
            targets.scene_bloom_attachment = Some(1);
            targets.scene_depth_attachment = 2;

            let quarter = TextureDesc::render_target(TextureFormat::BGRA8, TextureSize::QuarterBackbuffer);
            targets.bloom = Some([owned.color_target(queue, &quarter)?, owned.color_target(queue, &quarter)?]);
        } else {
            let samples = postprocess.anti_aliasing.msaa_samples().unwrap_or(1);

            if reflections {
                let desc = TextureDesc::render_target(TextureFormat::BGRA8, full).with_msaa(samples);
                targets.reflection_texture = Some(owned.texture(queue, &desc, None)?);
            }

            let color_desc = TextureDesc::render_target(TextureFormat::BGRA8, full).with_msaa(samples);
            let color = owned.texture(queue, &color_desc, None)?;
            let depth = owned.texture(queue, &depth_desc(samples), None)?;
            targets.scene = owned.frame_buffer(queue, &[color, depth])?;
            targets.scene_depth_attachment = 1;
        }

        if let Some(texture) = targets.reflection_texture {
            targets.reflection = Some(owned.frame_buffer(queue, &[texture])?);
        }

        if smaa_enabled {
            targets.smaa = Some(Self::create_smaa(queue, owned, smaa_lookup)?);
        }

        Ok(targets)
    }

    fn create_smaa(
        queue: &mut dyn GpuCommandQueue,
        owned: &mut Allocations,
        lookup: Option<&SmaaLookup>,
    ) -> RenderResult<SmaaTargets> {
        let full = TextureSize::Backbuffer;
        let blend = owned.color_target(queue, &TextureDesc::render_target(TextureFormat::BGRA8, full))?;
        let edges = owned.color_target(queue, &TextureDesc::render_target(TextureFormat::RG8, full))?;

        let zeroed;
        let lookup = match lookup {
            Some(lookup) if lookup.is_complete() => lookup,
            _ => {
                warn!("SMAA lookup textures missing or truncated, using zero-filled lookups");
                zeroed = SmaaLookup::zeroed();
                &zeroed
            }
        };

        let area_desc = TextureDesc::lookup(TextureFormat::RG8, SMAA_AREA_WIDTH, SMAA_AREA_HEIGHT);
        let area = owned.texture(queue, &area_desc, Some(&lookup.area[..SmaaLookup::AREA_SIZE]))?;
        let search_desc = TextureDesc::lookup(TextureFormat::R8, SMAA_SEARCH_WIDTH, SMAA_SEARCH_HEIGHT);
        let search = owned.texture(queue, &search_desc, Some(&lookup.search[..SmaaLookup::SEARCH_SIZE]))?;

        Ok(SmaaTargets { edges, blend, area, search })
    }

    /// Whether the scene was created with floating-point color
    pub const fn is_hdr(&self) -> bool {
        self.hdr
    }

    /// Destroy every frame buffer and texture
    pub fn destroy(&mut self, queue: &mut dyn GpuCommandQueue) {
        self.owned.release(queue);
    }
}

fn depth_desc(samples: u8) -> TextureDesc {
    TextureDesc {
        clamp: false,
        ..TextureDesc::render_target(TextureFormat::D24S8, TextureSize::Backbuffer).with_msaa(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AntiAliasing;
    use crate::render::api::{Command, RecordingQueue};

    fn created_formats(queue: &RecordingQueue) -> Vec<TextureFormat> {
        queue
            .commands()
            .iter()
            .filter_map(|command| match command {
                Command::CreateTexture { desc, .. } => Some(desc.format),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_ldr_targets() {
        let mut queue = RecordingQueue::default();
        let config = PostProcessConfig { anti_aliasing: AntiAliasing::Msaa4x, ..PostProcessConfig::default() };

        let targets = RenderTargets::create(&mut queue, &config, true, None).ok();
        let targets = targets.as_ref();

        assert_eq!(targets.map(|t| t.scene_depth_attachment), Some(1));
        assert!(targets.is_some_and(|t| t.bloom.is_none() && t.scene_temp.is_none() && t.smaa.is_none()));
        assert!(targets.is_some_and(|t| t.reflection.is_some()));
        assert_eq!(
            created_formats(&queue),
            vec![TextureFormat::R16F, TextureFormat::BGRA8, TextureFormat::BGRA8, TextureFormat::D24S8]
        );
    }

    #[test]
    fn test_hdr_smaa_targets() {
        let mut queue = RecordingQueue::default();
        let config = PostProcessConfig { hdr: true, anti_aliasing: AntiAliasing::Smaa, ..PostProcessConfig::default() };

        let targets = RenderTargets::create(&mut queue, &config, false, Some(&SmaaLookup::zeroed())).ok();
        let targets = targets.as_ref();

        assert_eq!(targets.map(|t| t.scene_depth_attachment), Some(2));
        assert_eq!(targets.and_then(|t| t.scene_bloom_attachment), Some(1));
        assert!(targets.is_some_and(|t| t.scene_temp.is_some() && t.bloom.is_some() && t.smaa.is_some()));
        assert!(targets.is_some_and(|t| t.reflection.is_none()));
    }

    #[test]
    fn test_hdr_without_smaa_has_no_temp() {
        let mut queue = RecordingQueue::default();
        let config = PostProcessConfig { hdr: true, anti_aliasing: AntiAliasing::Msaa2x, ..PostProcessConfig::default() };

        let targets = RenderTargets::create(&mut queue, &config, false, None).ok();
        assert!(targets.is_some_and(|t| t.scene_temp.is_none()));
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut queue = RecordingQueue::default();
        let config = PostProcessConfig { hdr: true, ..PostProcessConfig::default() };

        let Ok(mut targets) = RenderTargets::create(&mut queue, &config, true, None) else {
            panic!("targets should be created");
        };
        let created = created_formats(&queue).len();
        targets.destroy(&mut queue);

        let destroyed = queue
            .commands()
            .iter()
            .filter(|command| matches!(command, Command::DestroyTexture(_)))
            .count();
        assert_eq!(destroyed, created);
    }

    #[test]
    fn test_creation_failure_is_reported() {
        let mut queue = RecordingQueue::default().failing_resource_creation();
        let result = RenderTargets::create(&mut queue, &PostProcessConfig::default(), true, None);

        assert!(result.is_err());
    }
}
