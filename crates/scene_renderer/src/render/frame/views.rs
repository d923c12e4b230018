//! View allocation and full-screen passes
//!
//! Views are numbered in push order and the command queue executes them in
//! that order, so the id sequence of a frame is its pass schedule.

use crate::foundation::logging::{WarnOnce, WarnOnceId};
use crate::foundation::math::{orthographic_projection, Mat4, Rect, Vec2, Vec3};
use crate::render::api::{GpuCommandQueue, RenderTarget, ViewDescriptor, ViewId};
use crate::render::primitives::geometry::Vertex;
use crate::render::primitives::shader::Program;
use crate::render::primitives::state::{ClearFlags, StateFlags};
use crate::render::{RenderError, RenderResult};

/// Hands out increasing view ids for one frame
#[derive(Debug, Clone)]
pub struct ViewAllocator {
    next: u16,
    limit: u16,
}

impl ViewAllocator {
    /// Create an allocator with `limit` views per frame
    pub const fn new(limit: u16) -> Self {
        Self { next: 0, limit }
    }

    /// Configure the next view and return its id
    pub fn push_view(&mut self, queue: &mut dyn GpuCommandQueue, descriptor: &ViewDescriptor) -> RenderResult<ViewId> {
        if self.next >= self.limit {
            return Err(RenderError::ViewLimitExceeded { limit: usize::from(self.limit) });
        }

        let id = ViewId(self.next);
        self.next += 1;
        queue.set_view(id, descriptor);
        Ok(id)
    }

    /// Views pushed this frame
    pub const fn count(&self) -> u16 {
        self.next
    }

    /// Whether no view has been pushed this frame
    pub const fn is_empty(&self) -> bool {
        self.next == 0
    }

    /// Start numbering from zero again
    pub fn reset(&mut self) {
        self.next = 0;
    }

    /// Draw a full-screen triangle into `quad.target`
    ///
    /// Uniforms and textures must already be set. When scratch memory is
    /// exhausted the pass is skipped and no view is pushed.
    pub fn render_screen_quad(
        &mut self,
        queue: &mut dyn GpuCommandQueue,
        warn_once: &mut WarnOnce,
        quad: &ScreenQuad,
    ) -> RenderResult<()> {
        if !queue.has_transient_space(3, 0) {
            warn_once.transient_alloc_failed(WarnOnceId::ScreenSpaceQuad);
            return Ok(());
        }

        let (width, height) = queue.backbuffer_size();
        let rect = quad.rect.or_full_size(clamp_dimension(width), clamp_dimension(height));
        let capabilities = queue.capabilities();
        let vertices = screen_triangle(rect, capabilities.half_texel_offset, capabilities.texture_origin_bottom_left);

        let Some(buffers) = queue.alloc_transient(&vertices, &[]) else {
            warn_once.transient_alloc_failed(WarnOnceId::ScreenSpaceQuad);
            return Ok(());
        };

        queue.set_geometry(&buffers.whole());
        queue.set_state(quad.state);

        let descriptor = ViewDescriptor::new(quad.target, rect)
            .with_clear(quad.clear)
            .with_transform(Mat4::identity(), orthographic_projection(0.0, 1.0, 0.0, 1.0, -1.0, 1.0));
        let view = self.push_view(queue, &descriptor)?;
        queue.submit(view, quad.program);
        Ok(())
    }
}

/// A full-screen pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenQuad {
    /// Destination
    pub target: RenderTarget,
    /// Program to run
    pub program: Program,
    /// State word
    pub state: StateFlags,
    /// Clears applied when the view starts
    pub clear: ClearFlags,
    /// Viewport, zero extent for the full backbuffer
    pub rect: Rect,
}

impl ScreenQuad {
    /// Color-only pass over the whole target
    pub fn new(target: RenderTarget, program: Program) -> Self {
        Self {
            target,
            program,
            state: StateFlags::RGB_WRITE,
            clear: ClearFlags::empty(),
            rect: Rect::default(),
        }
    }

    /// Replace the state word
    #[must_use]
    pub const fn with_state(mut self, state: StateFlags) -> Self {
        self.state = state;
        self
    }

    /// Clear the target first
    #[must_use]
    pub const fn with_clear(mut self, clear: ClearFlags) -> Self {
        self.clear = clear;
        self
    }

    /// Restrict to a viewport
    #[must_use]
    pub const fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }
}

fn clamp_dimension(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Oversized triangle covering the unit square, with texture coordinates
/// that map the viewport one to one
#[allow(clippy::cast_precision_loss)]
fn screen_triangle(rect: Rect, half_texel_offset: f32, origin_bottom_left: bool) -> [Vertex; 3] {
    let half_w = half_texel_offset / rect.w.max(1) as f32;
    let half_h = half_texel_offset / rect.h.max(1) as f32;
    let min_u = -1.0 + half_w;
    let max_u = 1.0 + half_w;
    let mut min_v = half_h;
    let mut max_v = 2.0 + half_h;

    if origin_bottom_left {
        std::mem::swap(&mut min_v, &mut max_v);
        min_v -= 1.0;
        max_v -= 1.0;
    }

    [
        Vertex::new(Vec3::new(-1.0, 0.0, 0.0)).with_tex_coord(Vec2::new(min_u, min_v)),
        Vertex::new(Vec3::new(1.0, 0.0, 0.0)).with_tex_coord(Vec2::new(max_u, min_v)),
        Vertex::new(Vec3::new(1.0, 2.0, 0.0)).with_tex_coord(Vec2::new(max_u, max_v)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::RecordingQueue;
    use approx::assert_relative_eq;

    #[test]
    fn test_view_ids_increase_until_limit() {
        let mut queue = RecordingQueue::new(640, 480);
        let mut views = ViewAllocator::new(2);
        let descriptor = ViewDescriptor::new(RenderTarget::Backbuffer, Rect::default());

        assert_eq!(views.push_view(&mut queue, &descriptor).ok(), Some(ViewId(0)));
        assert_eq!(views.push_view(&mut queue, &descriptor).ok(), Some(ViewId(1)));
        assert!(matches!(
            views.push_view(&mut queue, &descriptor),
            Err(RenderError::ViewLimitExceeded { limit: 2 })
        ));

        views.reset();
        assert!(views.is_empty());
    }

    #[test]
    fn test_screen_triangle_flips_for_bottom_left_origin() {
        let top_left = screen_triangle(Rect::new(0, 0, 100, 50), 0.0, false);
        let bottom_left = screen_triangle(Rect::new(0, 0, 100, 50), 0.0, true);

        assert_relative_eq!(top_left[0].tex_coord[1], 0.0);
        assert_relative_eq!(top_left[2].tex_coord[1], 2.0);
        assert_relative_eq!(bottom_left[0].tex_coord[1], 1.0);
        assert_relative_eq!(bottom_left[2].tex_coord[1], -1.0);
        assert_relative_eq!(bottom_left[1].tex_coord[0], 1.0);
    }

    #[test]
    fn test_half_texel_offset_scales_with_viewport() {
        let vertices = screen_triangle(Rect::new(0, 0, 200, 100), 0.5, false);

        assert_relative_eq!(vertices[0].tex_coord[0], -1.0 + 0.5 / 200.0);
        assert_relative_eq!(vertices[0].tex_coord[1], 0.5 / 100.0);
    }

    #[test]
    fn test_screen_quad_skipped_without_scratch_memory() {
        let mut queue = RecordingQueue::new(640, 480).with_transient_budget(0);
        let mut views = ViewAllocator::new(8);
        let mut warn_once = WarnOnce::new();
        let quad = ScreenQuad::new(RenderTarget::Backbuffer, Program::Texture);

        assert!(views.render_screen_quad(&mut queue, &mut warn_once, &quad).is_ok());
        assert!(views.is_empty());
        assert!(warn_once.has_warned(WarnOnceId::ScreenSpaceQuad));
        assert!(queue.submissions().is_empty());
    }

    #[test]
    fn test_screen_quad_fills_zero_rect() {
        let mut queue = RecordingQueue::new(640, 480);
        let mut views = ViewAllocator::new(8);
        let mut warn_once = WarnOnce::new();
        let quad = ScreenQuad::new(RenderTarget::Backbuffer, Program::Texture);

        views.render_screen_quad(&mut queue, &mut warn_once, &quad).ok();

        let (_, _, descriptor) = &queue.views()[0];
        assert_eq!(descriptor.rect, Rect::new(0, 0, 640, 480));
        assert_eq!(queue.submissions()[0].program, Program::Texture);
    }
}
