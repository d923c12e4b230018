//! Frame post-processing
//!
//! Runs after the main camera of a world scene. Every pass binds its inputs,
//! then draws one full-screen triangle into its own view.
//!
//! ```text
//! HDR:   scene bloom -> bloom[0] -> blur x -> bloom[1] -> blur y -> bloom[0]
//!        scene + bloom[0] -> tonemap -> scene temp (SMAA) | backbuffer
//! SMAA:  color -> edges -> blend weights -> neighborhood blend -> backbuffer
//! else:  scene -> backbuffer
//! ```

use crate::core::config::PostProcessConfig;
use crate::foundation::logging::WarnOnce;
use crate::foundation::math::{Rect, Vec4};
use crate::render::api::{FrameBufferHandle, GpuCommandQueue, RenderTarget, Sampler, TextureSource, Uniform};
use crate::render::frame::targets::{RenderTargets, SmaaTargets};
use crate::render::frame::views::{ScreenQuad, ViewAllocator};
use crate::render::primitives::shader::Program;
use crate::render::primitives::state::{ClearFlags, StateFlags};
use crate::render::RenderResult;

/// Screen-space passes applied to the scene target
pub struct FramePostProcessor<'a> {
    /// Command queue
    pub queue: &'a mut dyn GpuCommandQueue,
    /// View ids of the frame
    pub views: &'a mut ViewAllocator,
    /// Allocation failure reporting
    pub warn_once: &'a mut WarnOnce,
    /// Offscreen targets of the world
    pub targets: &'a RenderTargets,
    /// Tonemap settings
    pub config: &'a PostProcessConfig,
}

impl FramePostProcessor<'_> {
    /// Resolve the scene target into the backbuffer
    ///
    /// `rect` is the scene viewport; SMAA derives its texel metrics from it.
    pub fn run(&mut self, rect: Rect) -> RenderResult<()> {
        let hdr = self.targets.bloom.filter(|_| self.targets.is_hdr());

        if let Some(bloom) = hdr {
            self.bloom(bloom)?;
            self.tonemap(bloom[0])?;
        }

        match self.targets.smaa {
            Some(smaa) => self.smaa(&smaa, rect, hdr.is_some()),
            None if hdr.is_none() => self.blit(),
            None => Ok(()),
        }
    }

    fn quad(&mut self, quad: &ScreenQuad) -> RenderResult<()> {
        self.views.render_screen_quad(self.queue, self.warn_once, quad)
    }

    fn bloom(&mut self, bloom: [FrameBufferHandle; 2]) -> RenderResult<()> {
        let (width, height) = self.queue.backbuffer_size();
        let bloom_rect = Rect::new(0, 0, quarter(width), quarter(height));

        let attachment = self.targets.scene_bloom_attachment.unwrap_or(0);
        self.queue.set_texture(
            Sampler::Texture,
            TextureSource::Attachment { frame_buffer: self.targets.scene, attachment },
        );
        self.quad(&ScreenQuad::new(RenderTarget::FrameBuffer(bloom[0]), Program::Texture).with_rect(bloom_rect))?;

        // Horizontal into bloom[1], then vertical back into bloom[0].
        for i in 0..2 {
            let direction = if i == 0 { Vec4::new(1.0, 0.0, 0.0, 0.0) } else { Vec4::new(0.0, 1.0, 0.0, 0.0) };
            self.queue.set_uniform(Uniform::GaussianBlurDirection, direction);
            self.queue.set_texture(Sampler::Texture, TextureSource::frame_buffer(bloom[i]));
            let blur = ScreenQuad::new(RenderTarget::FrameBuffer(bloom[1 - i]), Program::GaussianBlur).with_rect(bloom_rect);
            self.quad(&blur)?;
        }

        Ok(())
    }

    fn tonemap(&mut self, bloom: FrameBufferHandle) -> RenderResult<()> {
        let uniforms = self.config.tonemap_uniforms();
        self.queue.set_uniform(
            Uniform::BrightnessContrastGammaSaturation,
            uniforms.brightness_contrast_gamma_saturation,
        );
        self.queue.set_uniform(Uniform::BloomScaleExposure, uniforms.bloom_scale_exposure);
        self.queue.set_texture(Sampler::Texture, TextureSource::frame_buffer(self.targets.scene));
        self.queue.set_texture(Sampler::Bloom, TextureSource::frame_buffer(bloom));

        let target = match self.targets.scene_temp.filter(|_| self.targets.smaa.is_some()) {
            Some(temp) => RenderTarget::FrameBuffer(temp),
            None => RenderTarget::Backbuffer,
        };

        self.quad(&ScreenQuad::new(target, Program::ToneMap))
    }

    #[allow(clippy::cast_precision_loss)]
    fn smaa(&mut self, smaa: &SmaaTargets, rect: Rect, hdr: bool) -> RenderResult<()> {
        let (width, height) = (rect.w.max(1) as f32, rect.h.max(1) as f32);
        self.queue.set_uniform(Uniform::SmaaMetrics, Vec4::new(1.0 / width, 1.0 / height, width, height));

        let color = match self.targets.scene_temp.filter(|_| hdr) {
            Some(temp) => TextureSource::frame_buffer(temp),
            None => TextureSource::frame_buffer(self.targets.scene),
        };

        self.queue.set_texture(Sampler::SmaaColor, color);
        let edges = ScreenQuad::new(RenderTarget::FrameBuffer(smaa.edges), Program::SmaaEdgeDetection)
            .with_clear(ClearFlags::COLOR);
        self.quad(&edges)?;

        self.queue.set_texture(Sampler::SmaaEdges, TextureSource::frame_buffer(smaa.edges));
        self.queue.set_texture(Sampler::SmaaArea, TextureSource::Texture(smaa.area));
        self.queue.set_texture(Sampler::SmaaSearch, TextureSource::Texture(smaa.search));
        let weights = ScreenQuad::new(RenderTarget::FrameBuffer(smaa.blend), Program::SmaaBlendingWeightCalculation)
            .with_state(StateFlags::RGB_WRITE | StateFlags::ALPHA_WRITE)
            .with_clear(ClearFlags::COLOR);
        self.quad(&weights)?;

        self.queue.set_texture(Sampler::SmaaColor, color);
        self.queue.set_texture(Sampler::SmaaBlend, TextureSource::frame_buffer(smaa.blend));
        self.quad(&ScreenQuad::new(RenderTarget::Backbuffer, Program::SmaaNeighborhoodBlending))
    }

    fn blit(&mut self) -> RenderResult<()> {
        self.queue.set_texture(Sampler::Texture, TextureSource::frame_buffer(self.targets.scene));
        self.quad(&ScreenQuad::new(RenderTarget::Backbuffer, Program::Texture))
    }
}

fn quarter(value: u32) -> i32 {
    i32::try_from(value / 4).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AntiAliasing;
    use crate::render::api::{RecordingQueue, SubmissionRecord};
    use crate::render::frame::targets::SmaaLookup;
    use approx::assert_relative_eq;

    fn run(queue: &mut RecordingQueue, config: &PostProcessConfig, rect: Rect) -> RenderTargets {
        let lookup = SmaaLookup::zeroed();
        let targets = RenderTargets::create(queue, config, false, Some(&lookup)).expect("targets");
        let mut views = ViewAllocator::new(64);
        let mut warn_once = WarnOnce::new();

        FramePostProcessor { queue, views: &mut views, warn_once: &mut warn_once, targets: &targets, config }
            .run(rect)
            .expect("post");
        targets
    }

    fn programs(queue: &RecordingQueue) -> Vec<Program> {
        queue.submissions().iter().map(|record| record.program).collect()
    }

    fn config(hdr: bool, anti_aliasing: AntiAliasing) -> PostProcessConfig {
        PostProcessConfig { hdr, anti_aliasing, ..PostProcessConfig::default() }
    }

    #[test]
    fn test_ldr_without_smaa_blits_scene() {
        let mut queue = RecordingQueue::new(640, 480);
        let targets = run(&mut queue, &config(false, AntiAliasing::None), Rect::new(0, 0, 640, 480));

        assert_eq!(programs(&queue), vec![Program::Texture]);
        let blit = &queue.submissions()[0];
        assert_eq!(blit.textures[&Sampler::Texture], TextureSource::frame_buffer(targets.scene));
        assert_eq!(queue.views()[0].2.target, RenderTarget::Backbuffer);
    }

    #[test]
    fn test_hdr_chain_order_and_targets() {
        let mut queue = RecordingQueue::new(640, 480);
        let targets = run(&mut queue, &config(true, AntiAliasing::None), Rect::new(0, 0, 640, 480));
        let bloom = targets.bloom.expect("bloom targets");

        assert_eq!(
            programs(&queue),
            vec![Program::Texture, Program::GaussianBlur, Program::GaussianBlur, Program::ToneMap]
        );

        let destinations: Vec<RenderTarget> = queue.views().iter().map(|(_, _, d)| d.target).collect();
        assert_eq!(
            destinations,
            vec![
                RenderTarget::FrameBuffer(bloom[0]),
                RenderTarget::FrameBuffer(bloom[1]),
                RenderTarget::FrameBuffer(bloom[0]),
                RenderTarget::Backbuffer,
            ]
        );
        assert_eq!(queue.views()[0].2.rect, Rect::new(0, 0, 160, 120));

        let blur_y = &queue.submissions()[2];
        assert_eq!(blur_y.uniform(Uniform::GaussianBlurDirection), Some(Vec4::new(0.0, 1.0, 0.0, 0.0)));
        assert_eq!(blur_y.textures[&Sampler::Texture], TextureSource::frame_buffer(bloom[1]));

        let tonemap = &queue.submissions()[3];
        assert_eq!(tonemap.textures[&Sampler::Bloom], TextureSource::frame_buffer(bloom[0]));
    }

    #[test]
    fn test_hdr_smaa_reads_tonemapped_temp() {
        let mut queue = RecordingQueue::new(800, 600);
        let targets = run(&mut queue, &config(true, AntiAliasing::Smaa), Rect::new(0, 0, 800, 600));
        let temp = targets.scene_temp.expect("temp target");
        let smaa = targets.smaa.expect("smaa targets");
        let submissions: Vec<&SubmissionRecord> = queue.submissions().iter().collect();

        assert_eq!(submissions.len(), 7);
        assert_eq!(queue.views()[3].2.target, RenderTarget::FrameBuffer(temp));
        assert_eq!(submissions[4].textures[&Sampler::SmaaColor], TextureSource::frame_buffer(temp));
        assert_eq!(queue.views()[4].2.clear, ClearFlags::COLOR);
        assert_eq!(submissions[5].state, StateFlags::RGB_WRITE | StateFlags::ALPHA_WRITE);
        assert_eq!(submissions[5].textures[&Sampler::SmaaArea], TextureSource::Texture(smaa.area));
        assert_eq!(submissions[6].program, Program::SmaaNeighborhoodBlending);
        assert_eq!(submissions[6].textures[&Sampler::SmaaBlend], TextureSource::frame_buffer(smaa.blend));

        let metrics = submissions[4].uniform(Uniform::SmaaMetrics).expect("metrics");
        assert_relative_eq!(metrics.x, 1.0 / 800.0);
        assert_relative_eq!(metrics.w, 600.0);
    }

    #[test]
    fn test_ldr_smaa_reads_scene() {
        let mut queue = RecordingQueue::new(640, 480);
        let targets = run(&mut queue, &config(false, AntiAliasing::Smaa), Rect::new(0, 0, 640, 480));

        assert_eq!(
            programs(&queue),
            vec![
                Program::SmaaEdgeDetection,
                Program::SmaaBlendingWeightCalculation,
                Program::SmaaNeighborhoodBlending
            ]
        );
        assert_eq!(
            queue.submissions()[0].textures[&Sampler::SmaaColor],
            TextureSource::frame_buffer(targets.scene)
        );
    }

    #[test]
    fn test_running_twice_submits_identical_state() {
        let config = config(true, AntiAliasing::Smaa);
        let lookup = SmaaLookup::zeroed();
        let mut queue = RecordingQueue::new(640, 480);
        let targets = RenderTargets::create(&mut queue, &config, false, Some(&lookup)).expect("targets");
        let mut warn_once = WarnOnce::new();

        let mut passes = Vec::new();

        for _ in 0..2 {
            queue.clear_log();
            let mut views = ViewAllocator::new(64);
            FramePostProcessor {
                queue: &mut queue,
                views: &mut views,
                warn_once: &mut warn_once,
                targets: &targets,
                config: &config,
            }
            .run(Rect::new(0, 0, 640, 480))
            .expect("post");
            let bindings: Vec<_> = queue
                .submissions()
                .iter()
                .map(|record| (record.program, record.state, record.textures.clone(), record.uniforms.clone()))
                .collect();
            passes.push((bindings, queue.views().to_vec()));
        }

        assert_eq!(passes[0], passes[1]);
    }
}
