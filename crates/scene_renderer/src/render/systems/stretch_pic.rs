//! # 2D Quad Batching
//!
//! Immediate-mode screen quads ("stretch pics") accumulate into one batch per
//! material. The batch is flushed when the material changes, before a scene
//! renders and at frame end. All batches between two scenes share a single
//! sequential orthographic view, so they draw in submission order.
//!
//! Cinematic frames bypass the batch: they upload into a per-client scratch
//! texture and draw immediately in their own view.

use std::collections::HashMap;

use crate::foundation::collections::MaterialHandle;
use crate::foundation::logging::{debug, error, WarnOnce, WarnOnceId};
use crate::foundation::math::{is_power_of_two, orthographic_projection, to_linear, Mat4, Rect, Vec2, Vec3, Vec4};
use crate::render::api::{
    GpuCommandQueue, RenderTarget, Sampler, TextureDesc, TextureFormat, TextureHandle, TextureSource, Uniform,
    ViewDescriptor, ViewId,
};
use crate::render::frame::views::ViewAllocator;
use crate::render::primitives::geometry::Vertex;
use crate::render::primitives::shader::{GenericVariant, Program};
use crate::render::primitives::state::StateFlags;
use crate::render::resources::materials::{MaterialCache, StageUniformSet};
use crate::render::systems::stage_eval::resolve_2d_state;
use crate::render::{RenderError, RenderResult};

fn white() -> Vec4 {
    Vec4::new(1.0, 1.0, 1.0, 1.0)
}

/// One textured screen rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchPic {
    /// Left edge in pixels
    pub x: f32,
    /// Top edge in pixels
    pub y: f32,
    /// Width in pixels
    pub w: f32,
    /// Height in pixels
    pub h: f32,
    /// Texture coordinates of the top-left corner
    pub st1: Vec2,
    /// Texture coordinates of the bottom-right corner
    pub st2: Vec2,
    /// Material
    pub material: MaterialHandle,
}

/// One frame of a cinematic
#[derive(Debug, Clone, Copy)]
pub struct CinematicFrame<'a> {
    /// Screen rectangle
    pub rect: Rect,
    /// Frame width in texels
    pub cols: i32,
    /// Frame height in texels
    pub rows: i32,
    /// BGRA texels, `cols * rows * 4` bytes
    pub data: &'a [u8],
    /// Which scratch texture to stream into
    pub client: usize,
    /// The frame differs from the last upload
    pub dirty: bool,
}

/// Everything a flush draws with
pub struct Canvas<'a> {
    /// Command queue
    pub queue: &'a mut dyn GpuCommandQueue,
    /// View ids of the frame
    pub views: &'a mut ViewAllocator,
    /// Allocation failure reporting
    pub warn_once: &'a mut WarnOnce,
    /// Materials
    pub materials: &'a MaterialCache,
    /// Texture bound where a stage has none
    pub white: TextureHandle,
    /// Host time in seconds
    pub time: f32,
}

#[derive(Debug, Clone, Copy)]
struct ScratchTexture {
    texture: TextureHandle,
    width: i32,
    height: i32,
}

/// Pending 2D quads and the view they draw into
#[derive(Debug, Clone)]
pub struct StretchPicBatcher {
    material: Option<MaterialHandle>,
    vertices: Vec<Vertex>,
    indices: Vec<u16>,
    view: Option<ViewId>,
    color: Vec4,
    scratch: HashMap<usize, ScratchTexture>,
}

impl Default for StretchPicBatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StretchPicBatcher {
    /// Empty batch, white draw color
    pub fn new() -> Self {
        Self {
            material: None,
            vertices: Vec::new(),
            indices: Vec::new(),
            view: None,
            color: white(),
            scratch: HashMap::new(),
        }
    }

    /// Set the draw color; `None` restores white
    pub fn set_color(&mut self, color: Option<Vec4>) {
        self.color = color.unwrap_or(white());
    }

    /// Current draw color
    pub const fn color(&self) -> Vec4 {
        self.color
    }

    /// Quads waiting for a flush
    pub fn pending_quads(&self) -> usize {
        self.indices.len() / 6
    }

    /// Start a new 2D view on the next flush
    pub fn reset_view(&mut self) {
        self.view = None;
    }

    /// Queue a quad; the top edge uses the draw color, the bottom edge `gradient`
    pub fn draw(&mut self, canvas: &mut Canvas<'_>, pic: &StretchPic, gradient: Vec4) -> RenderResult<()> {
        if self.material != Some(pic.material) || self.vertices.len() + 4 > usize::from(u16::MAX) {
            self.flush(canvas)?;
            self.material = Some(pic.material);
        }

        #[allow(clippy::cast_possible_truncation)]
        let first = self.vertices.len() as u16;
        let top = to_linear(&self.color);
        let bottom = to_linear(&gradient);
        let (s1, t1, s2, t2) = (pic.st1.x, pic.st1.y, pic.st2.x, pic.st2.y);

        self.vertices.extend_from_slice(&[
            Vertex::new(Vec3::new(pic.x, pic.y, 0.0)).with_tex_coord(Vec2::new(s1, t1)).with_color(top),
            Vertex::new(Vec3::new(pic.x + pic.w, pic.y, 0.0)).with_tex_coord(Vec2::new(s2, t1)).with_color(top),
            Vertex::new(Vec3::new(pic.x + pic.w, pic.y + pic.h, 0.0))
                .with_tex_coord(Vec2::new(s2, t2))
                .with_color(bottom),
            Vertex::new(Vec3::new(pic.x, pic.y + pic.h, 0.0)).with_tex_coord(Vec2::new(s1, t2)).with_color(bottom),
        ]);
        self.indices.extend_from_slice(&[first + 3, first, first + 2, first + 2, first, first + 1]);
        Ok(())
    }

    /// Submit the pending quads, one draw per active stage of the material
    ///
    /// The batch is emptied even when scratch memory is exhausted.
    pub fn flush(&mut self, canvas: &mut Canvas<'_>) -> RenderResult<()> {
        let result = self.submit(canvas);
        self.vertices.clear();
        self.indices.clear();
        result
    }

    fn submit(&mut self, canvas: &mut Canvas<'_>) -> RenderResult<()> {
        let Some(handle) = self.material.filter(|_| !self.indices.is_empty()) else {
            return Ok(());
        };

        let Some(buffers) = canvas.queue.alloc_transient(&self.vertices, &self.indices) else {
            canvas.warn_once.transient_alloc_failed(WarnOnceId::StretchPics);
            return Ok(());
        };

        let material = canvas.materials.get(handle);
        let material_time = material.time_at(canvas.time);
        canvas.queue.set_uniform(Uniform::DynamicLightNumIntensity, Vec4::zeros());
        canvas.queue.set_uniform(Uniform::DeformCount, Vec4::zeros());
        canvas.queue.set_uniform(Uniform::Time, Vec4::new(material_time, 0.0, 0.0, 0.0));

        let view = match self.view {
            Some(view) => view,
            None => {
                let (width, height) = canvas.queue.backbuffer_size();
                let rect = Rect::new(0, 0, clamp_dimension(width), clamp_dimension(height));
                #[allow(clippy::cast_precision_loss)]
                let projection = orthographic_projection(0.0, width as f32, height as f32, 0.0, -1.0, 1.0);
                let descriptor = ViewDescriptor::new(RenderTarget::Backbuffer, rect)
                    .with_transform(Mat4::identity(), projection)
                    .sequential();
                let view = canvas.views.push_view(canvas.queue, &descriptor)?;
                self.view = Some(view);
                view
            }
        };

        for stage in material.stages.iter().filter(|stage| stage.active) {
            stage.write_uniforms(canvas.queue, StageUniformSet::All);
            stage.bind_textures(canvas.queue, material_time, canvas.white);
            canvas.queue.set_state(resolve_2d_state(stage));
            canvas.queue.set_geometry(&buffers.whole());
            canvas.queue.submit(view, Program::Generic(GenericVariant::empty()));
        }

        Ok(())
    }

    /// Draw one cinematic frame immediately
    ///
    /// Frame sizes must be powers of two. Pending quads are flushed first and
    /// later quads start a new 2D view, keeping the frame between them.
    pub fn draw_raw(&mut self, canvas: &mut Canvas<'_>, frame: &CinematicFrame<'_>) -> RenderResult<()> {
        if !is_power_of_two(frame.cols) || !is_power_of_two(frame.rows) {
            error!("Cinematic frame size not a power of 2: {} by {}", frame.cols, frame.rows);
            return Err(RenderError::InvalidCinematicSize { cols: frame.cols, rows: frame.rows });
        }

        if !canvas.queue.has_transient_space(4, 6) {
            canvas.warn_once.transient_alloc_failed(WarnOnceId::Cinematic);
            return Ok(());
        }

        self.flush(canvas)?;
        self.view = None;
        let texture = self.upload_cinematic(canvas.queue, frame)?;

        let vertices = [
            Vertex::new(Vec3::new(0.0, 0.0, 0.0)).with_tex_coord(Vec2::new(0.0, 0.0)),
            Vertex::new(Vec3::new(1.0, 0.0, 0.0)).with_tex_coord(Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::new(1.0, 1.0, 0.0)).with_tex_coord(Vec2::new(1.0, 1.0)),
            Vertex::new(Vec3::new(0.0, 1.0, 0.0)).with_tex_coord(Vec2::new(0.0, 1.0)),
        ];

        let Some(buffers) = canvas.queue.alloc_transient(&vertices, &[0, 1, 2, 2, 3, 0]) else {
            canvas.warn_once.transient_alloc_failed(WarnOnceId::Cinematic);
            return Ok(());
        };

        canvas.queue.set_geometry(&buffers.whole());
        canvas.queue.set_texture(Sampler::Texture, TextureSource::Texture(texture));
        canvas.queue.set_uniform(Uniform::Color, white());
        canvas.queue.set_state(StateFlags::RGB_WRITE);

        let descriptor = ViewDescriptor::new(RenderTarget::Backbuffer, frame.rect)
            .with_transform(Mat4::identity(), orthographic_projection(0.0, 1.0, 1.0, 0.0, -1.0, 1.0))
            .sequential();
        let view = canvas.views.push_view(canvas.queue, &descriptor)?;
        canvas.queue.submit(view, Program::TextureColor);
        Ok(())
    }

    /// Stream a frame into the client's scratch texture, recreating it on resize
    fn upload_cinematic(&mut self, queue: &mut dyn GpuCommandQueue, frame: &CinematicFrame<'_>) -> RenderResult<TextureHandle> {
        let existing = self.scratch.get(&frame.client).copied();
        let resized = existing.map_or(true, |scratch| scratch.width != frame.cols || scratch.height != frame.rows);

        if !resized && !frame.dirty {
            if let Some(scratch) = existing {
                return Ok(scratch.texture);
            }
        }

        #[allow(clippy::cast_sign_loss)]
        let (width, height) = (frame.cols as u32, frame.rows as u32);
        let expected = width as usize * height as usize * TextureFormat::BGRA8.bytes_per_texel();

        if frame.data.len() < expected {
            return Err(RenderError::CinematicDataTooShort { expected, actual: frame.data.len() });
        }

        let data = &frame.data[..expected];

        match existing {
            Some(scratch) if !resized => {
                queue.update_texture(scratch.texture, width, height, data);
                Ok(scratch.texture)
            }
            _ => {
                if let Some(scratch) = existing {
                    queue.destroy_texture(scratch.texture);
                }

                debug!("Scratch texture {} resized to {}x{}", frame.client, frame.cols, frame.rows);
                let desc = TextureDesc::lookup(TextureFormat::BGRA8, width, height);
                let texture = queue.create_texture(&desc, Some(data))?;
                self.scratch.insert(
                    frame.client,
                    ScratchTexture { texture, width: frame.cols, height: frame.rows },
                );
                Ok(texture)
            }
        }
    }

    /// Destroy every scratch texture
    pub fn destroy(&mut self, queue: &mut dyn GpuCommandQueue) {
        for (_, scratch) in self.scratch.drain() {
            queue.destroy_texture(scratch.texture);
        }
    }
}

fn clamp_dimension(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
