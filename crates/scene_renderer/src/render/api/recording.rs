//! # Recording Command Queue
//!
//! A [`GpuCommandQueue`] that executes nothing and records everything. Hosts
//! use it for headless runs and frame captures; the renderer's own tests use
//! it to assert on submission order and state.
//!
//! Besides the raw command log, the queue keeps a per-submission snapshot of
//! all state that was bound when `submit` was called, so tests can compare
//! submissions without replaying the log.
//!
//! ## Scratch Memory
//!
//! An optional byte budget bounds the transient geometry allocated per frame.
//! Allocations beyond the budget fail exactly like an exhausted backend would;
//! the budget resets when the frame executes.

use std::any::Any;
use std::collections::BTreeMap;

use crate::foundation::math::{Mat4, Vec4};
use crate::render::primitives::geometry::{BufferHandle, BufferLifetime, GeometryBuffers, GeometryRef, Vertex};
use crate::render::primitives::shader::Program;
use crate::render::primitives::state::{StateFlags, StencilState};
use crate::render::{RenderError, RenderResult};

use super::command_queue::{
    DebugFlags, FrameBufferHandle, GpuCommandQueue, QueueCapabilities, Sampler, TextureDesc, TextureHandle,
    TextureSource, Uniform, ViewDescriptor, ViewId,
};

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Texture created
    CreateTexture {
        /// Assigned handle
        texture: TextureHandle,
        /// Creation parameters
        desc: TextureDesc,
        /// Bytes of initial data
        data_len: usize,
    },
    /// Texture contents replaced
    UpdateTexture {
        /// Texture
        texture: TextureHandle,
        /// Width
        width: u32,
        /// Height
        height: u32,
        /// Bytes uploaded
        data_len: usize,
    },
    /// Texture destroyed
    DestroyTexture(TextureHandle),
    /// Frame buffer created
    CreateFrameBuffer {
        /// Assigned handle
        frame_buffer: FrameBufferHandle,
        /// Attachments
        attachments: Vec<TextureHandle>,
    },
    /// Frame buffer destroyed
    DestroyFrameBuffer(FrameBufferHandle),
    /// Persistent geometry created
    CreateGeometry(GeometryBuffers),
    /// Dynamic geometry overwritten
    UpdateGeometry(GeometryBuffers),
    /// Persistent geometry destroyed
    DestroyGeometry(GeometryBuffers),
    /// Scratch geometry allocated
    AllocTransient(GeometryBuffers),
    /// View configured
    SetView(ViewId, ViewDescriptor),
    /// View touched
    Touch(ViewId),
    /// Uniform set
    SetUniform(Uniform, Vec4),
    /// Array uniform set
    SetUniformArray(Uniform, Vec<Vec4>),
    /// Texture bound
    SetTexture(Sampler, TextureSource),
    /// Geometry bound
    SetGeometry(GeometryRef),
    /// Transform set
    SetTransform(Mat4),
    /// State word set
    SetState(StateFlags),
    /// Stencil set
    SetStencil(StencilState),
    /// Draw recorded
    Submit(ViewId, Program),
    /// Debug displays set
    SetDebug(DebugFlags),
    /// Debug text cleared
    DebugTextClear,
    /// Debug text printed
    DebugText {
        /// Column
        column: u16,
        /// Row
        row: u16,
        /// Text
        text: String,
    },
    /// Frame executed
    Frame,
    /// Gamma ramp installed
    SetGammaRamp(Box<[u8; 256]>),
}

/// Everything bound when a draw was submitted
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    /// Frame the draw belongs to
    pub frame: u32,
    /// Target view
    pub view: ViewId,
    /// Program
    pub program: Program,
    /// State word
    pub state: StateFlags,
    /// Stencil, if set
    pub stencil: Option<StencilState>,
    /// Bound textures
    pub textures: BTreeMap<Sampler, TextureSource>,
    /// Bound geometry
    pub geometry: Option<GeometryRef>,
    /// Model transform, if set
    pub transform: Option<Mat4>,
    /// Every uniform value at submit time
    pub uniforms: BTreeMap<Uniform, Vec<Vec4>>,
}

impl SubmissionRecord {
    /// Value of a vector uniform at submit time
    pub fn uniform(&self, uniform: Uniform) -> Option<Vec4> {
        self.uniforms.get(&uniform).and_then(|values| values.first().copied())
    }
}

#[derive(Debug, Default, Clone)]
struct PendingDraw {
    state: StateFlags,
    stencil: Option<StencilState>,
    textures: BTreeMap<Sampler, TextureSource>,
    geometry: Option<GeometryRef>,
    transform: Option<Mat4>,
}

/// Contents of one scratch allocation
#[derive(Debug, Clone, PartialEq)]
pub struct TransientRecord {
    /// Handles returned to the caller
    pub buffers: GeometryBuffers,
    /// Uploaded vertices
    pub vertices: Vec<Vertex>,
    /// Uploaded indices
    pub indices: Vec<u16>,
}

/// Command queue that records instead of executing
#[derive(Debug, Clone)]
pub struct RecordingQueue {
    capabilities: QueueCapabilities,
    backbuffer: (u32, u32),
    transient_budget: Option<usize>,
    transient_used: usize,
    next_texture: u32,
    next_frame_buffer: u32,
    next_buffer: u32,
    frame: u32,
    commands: Vec<Command>,
    submissions: Vec<SubmissionRecord>,
    transients: Vec<TransientRecord>,
    views: Vec<(u32, ViewId, ViewDescriptor)>,
    uniforms: BTreeMap<Uniform, Vec<Vec4>>,
    pending: PendingDraw,
    fail_resource_creation: bool,
}

impl Default for RecordingQueue {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl RecordingQueue {
    /// Create a queue with an unlimited scratch budget
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            capabilities: QueueCapabilities::default(),
            backbuffer: (width, height),
            transient_budget: None,
            transient_used: 0,
            next_texture: 1,
            next_frame_buffer: 1,
            next_buffer: 1,
            frame: 0,
            commands: Vec::new(),
            submissions: Vec::new(),
            transients: Vec::new(),
            views: Vec::new(),
            uniforms: BTreeMap::new(),
            pending: PendingDraw::default(),
            fail_resource_creation: false,
        }
    }

    /// Limit scratch geometry to `bytes` per frame
    #[must_use]
    pub const fn with_transient_budget(mut self, bytes: usize) -> Self {
        self.transient_budget = Some(bytes);
        self
    }

    /// Report different backend conventions
    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: QueueCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Make every texture and frame buffer creation fail
    #[must_use]
    pub const fn failing_resource_creation(mut self) -> Self {
        self.fail_resource_creation = true;
        self
    }

    /// Change the scratch budget
    pub fn set_transient_budget(&mut self, bytes: Option<usize>) {
        self.transient_budget = bytes;
    }

    /// Every recorded command in call order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Every submitted draw
    pub fn submissions(&self) -> &[SubmissionRecord] {
        &self.submissions
    }

    /// Every scratch allocation with its contents
    pub fn transients(&self) -> &[TransientRecord] {
        &self.transients
    }

    /// Submissions of one frame
    pub fn submissions_in_frame(&self, frame: u32) -> impl Iterator<Item = &SubmissionRecord> {
        self.submissions.iter().filter(move |record| record.frame == frame)
    }

    /// Configured views as (frame, id, descriptor), in call order
    pub fn views(&self) -> &[(u32, ViewId, ViewDescriptor)] {
        &self.views
    }

    /// View ids configured in one frame, in call order
    pub fn view_ids_in_frame(&self, frame: u32) -> Vec<ViewId> {
        self.views
            .iter()
            .filter(|(f, _, _)| *f == frame)
            .map(|(_, id, _)| *id)
            .collect()
    }

    /// Frames executed so far
    pub const fn frames_executed(&self) -> u32 {
        self.frame
    }

    /// Scratch bytes used in the current frame
    pub const fn transient_used(&self) -> usize {
        self.transient_used
    }

    /// Drop the command log, submission and allocation snapshots, and bound uniforms
    pub fn clear_log(&mut self) {
        self.commands.clear();
        self.submissions.clear();
        self.transients.clear();
        self.views.clear();
        self.uniforms.clear();
    }

    fn transient_bytes(vertex_count: usize, index_count: usize) -> usize {
        vertex_count * std::mem::size_of::<Vertex>() + index_count * std::mem::size_of::<u16>()
    }

    fn fits(&self, bytes: usize) -> bool {
        self.transient_budget
            .map_or(true, |budget| self.transient_used + bytes <= budget)
    }

    fn next_buffer(&mut self, lifetime: BufferLifetime) -> BufferHandle {
        let handle = BufferHandle::new(lifetime, self.next_buffer);
        self.next_buffer += 1;
        handle
    }

    fn buffers(&mut self, lifetime: BufferLifetime, vertices: &[Vertex], indices: &[u16]) -> GeometryBuffers {
        let vertex_buffer = self.next_buffer(lifetime);
        let index_buffer = (!indices.is_empty()).then(|| self.next_buffer(lifetime));

        #[allow(clippy::cast_possible_truncation)]
        GeometryBuffers {
            vertices: vertex_buffer,
            indices: index_buffer,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
        }
    }
}

impl GpuCommandQueue for RecordingQueue {
    fn capabilities(&self) -> QueueCapabilities {
        self.capabilities
    }

    fn backbuffer_size(&self) -> (u32, u32) {
        self.backbuffer
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> RenderResult<TextureHandle> {
        if self.fail_resource_creation {
            return Err(RenderError::ResourceCreationFailed(format!("texture {:?}", desc.format)));
        }

        let texture = TextureHandle(self.next_texture);
        self.next_texture += 1;
        self.commands.push(Command::CreateTexture {
            texture,
            desc: *desc,
            data_len: data.map_or(0, <[u8]>::len),
        });
        Ok(texture)
    }

    fn update_texture(&mut self, texture: TextureHandle, width: u32, height: u32, data: &[u8]) {
        self.commands.push(Command::UpdateTexture { texture, width, height, data_len: data.len() });
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.commands.push(Command::DestroyTexture(texture));
    }

    fn create_frame_buffer(&mut self, attachments: &[TextureHandle]) -> RenderResult<FrameBufferHandle> {
        if self.fail_resource_creation {
            return Err(RenderError::ResourceCreationFailed("frame buffer".to_string()));
        }

        let frame_buffer = FrameBufferHandle(self.next_frame_buffer);
        self.next_frame_buffer += 1;
        self.commands.push(Command::CreateFrameBuffer { frame_buffer, attachments: attachments.to_vec() });
        Ok(frame_buffer)
    }

    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle) {
        self.commands.push(Command::DestroyFrameBuffer(frame_buffer));
    }

    fn create_geometry(
        &mut self,
        lifetime: BufferLifetime,
        vertices: &[Vertex],
        indices: &[u16],
    ) -> RenderResult<GeometryBuffers> {
        if lifetime == BufferLifetime::Transient {
            return Err(RenderError::ResourceCreationFailed(
                "transient geometry must come from alloc_transient".to_string(),
            ));
        }

        let buffers = self.buffers(lifetime, vertices, indices);
        self.commands.push(Command::CreateGeometry(buffers));
        Ok(buffers)
    }

    fn update_geometry(&mut self, buffers: &GeometryBuffers, _vertices: &[Vertex], _indices: &[u16]) {
        self.commands.push(Command::UpdateGeometry(*buffers));
    }

    fn destroy_geometry(&mut self, buffers: &GeometryBuffers) {
        self.commands.push(Command::DestroyGeometry(*buffers));
    }

    fn alloc_transient(&mut self, vertices: &[Vertex], indices: &[u16]) -> Option<GeometryBuffers> {
        let bytes = bytemuck::cast_slice::<Vertex, u8>(vertices).len() + bytemuck::cast_slice::<u16, u8>(indices).len();

        if !self.fits(bytes) {
            return None;
        }

        self.transient_used += bytes;
        let buffers = self.buffers(BufferLifetime::Transient, vertices, indices);
        self.commands.push(Command::AllocTransient(buffers));
        self.transients.push(TransientRecord { buffers, vertices: vertices.to_vec(), indices: indices.to_vec() });
        Some(buffers)
    }

    fn has_transient_space(&self, vertex_count: u32, index_count: u32) -> bool {
        self.fits(Self::transient_bytes(vertex_count as usize, index_count as usize))
    }

    fn set_view(&mut self, view: ViewId, desc: &ViewDescriptor) {
        self.views.push((self.frame, view, *desc));
        self.commands.push(Command::SetView(view, *desc));
    }

    fn touch(&mut self, view: ViewId) {
        self.commands.push(Command::Touch(view));
    }

    fn set_uniform(&mut self, uniform: Uniform, value: Vec4) {
        self.uniforms.insert(uniform, vec![value]);
        self.commands.push(Command::SetUniform(uniform, value));
    }

    fn set_uniform_array(&mut self, uniform: Uniform, values: &[Vec4]) {
        self.uniforms.insert(uniform, values.to_vec());
        self.commands.push(Command::SetUniformArray(uniform, values.to_vec()));
    }

    fn set_texture(&mut self, sampler: Sampler, source: TextureSource) {
        self.pending.textures.insert(sampler, source);
        self.commands.push(Command::SetTexture(sampler, source));
    }

    fn set_geometry(&mut self, geometry: &GeometryRef) {
        self.pending.geometry = Some(*geometry);
        self.commands.push(Command::SetGeometry(*geometry));
    }

    fn set_transform(&mut self, transform: &Mat4) {
        self.pending.transform = Some(*transform);
        self.commands.push(Command::SetTransform(*transform));
    }

    fn set_state(&mut self, state: StateFlags) {
        self.pending.state = state;
        self.commands.push(Command::SetState(state));
    }

    fn set_stencil(&mut self, stencil: StencilState) {
        self.pending.stencil = Some(stencil);
        self.commands.push(Command::SetStencil(stencil));
    }

    fn submit(&mut self, view: ViewId, program: Program) {
        let pending = std::mem::take(&mut self.pending);

        self.submissions.push(SubmissionRecord {
            frame: self.frame,
            view,
            program,
            state: pending.state,
            stencil: pending.stencil,
            textures: pending.textures,
            geometry: pending.geometry,
            transform: pending.transform,
            uniforms: self.uniforms.clone(),
        });
        self.commands.push(Command::Submit(view, program));
    }

    fn set_debug(&mut self, flags: DebugFlags) {
        self.commands.push(Command::SetDebug(flags));
    }

    fn debug_text_clear(&mut self) {
        self.commands.push(Command::DebugTextClear);
    }

    fn debug_text(&mut self, column: u16, row: u16, text: &str) {
        self.commands.push(Command::DebugText { column, row, text: text.to_string() });
    }

    fn frame(&mut self) {
        log::trace!("Frame {} executed with {} bytes of scratch geometry", self.frame, self.transient_used);
        self.commands.push(Command::Frame);
        self.transient_used = 0;
        self.pending = PendingDraw::default();
        self.uniforms.clear();
        self.frame += 1;
    }

    fn set_gamma_ramp(&mut self, table: &[u8; 256]) {
        self.commands.push(Command::SetGammaRamp(Box::new(*table)));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Rect, Vec3};
    use crate::render::api::RenderTarget;

    fn quad() -> (Vec<Vertex>, Vec<u16>) {
        let vertices = vec![Vertex::new(Vec3::zeros()); 4];
        (vertices, vec![0, 1, 2, 2, 1, 3])
    }

    #[test]
    fn test_transient_budget_resets_each_frame() {
        let (vertices, indices) = quad();
        let quad_bytes = 4 * 56 + 6 * 2;
        let mut queue = RecordingQueue::default().with_transient_budget(quad_bytes);

        assert!(queue.alloc_transient(&vertices, &indices).is_some());
        assert!(queue.alloc_transient(&vertices, &indices).is_none());
        assert!(!queue.has_transient_space(4, 6));

        queue.frame();
        assert_eq!(queue.transient_used(), 0);
        assert!(queue.alloc_transient(&vertices, &indices).is_some());
    }

    #[test]
    fn test_per_draw_state_resets_after_submit() {
        let mut queue = RecordingQueue::default();
        queue.set_uniform(Uniform::Color, Vec4::new(1.0, 0.0, 0.0, 1.0));
        queue.set_state(StateFlags::RGB_WRITE);
        queue.set_texture(Sampler::Texture, TextureSource::Texture(TextureHandle(3)));
        queue.submit(ViewId(0), Program::Texture);
        queue.submit(ViewId(0), Program::Texture);

        let [first, second] = queue.submissions() else {
            panic!("expected two submissions");
        };

        assert_eq!(first.state, StateFlags::RGB_WRITE);
        assert_eq!(first.textures.len(), 1);
        assert_eq!(second.state, StateFlags::empty());
        assert!(second.textures.is_empty());
        assert_eq!(second.uniform(Uniform::Color), Some(Vec4::new(1.0, 0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_uniforms_do_not_leak_into_next_frame() {
        let mut queue = RecordingQueue::default();
        queue.set_uniform(Uniform::Color, Vec4::new(0.0, 1.0, 0.0, 1.0));
        queue.submit(ViewId(0), Program::Texture);
        queue.frame();
        queue.submit(ViewId(0), Program::Texture);

        let next = queue.submissions_in_frame(1).next().expect("submission in frame 1");
        assert!(next.uniforms.is_empty());
    }

    #[test]
    fn test_clear_log_drops_bound_uniforms() {
        let mut queue = RecordingQueue::default();
        queue.set_uniform(Uniform::Color, Vec4::new(0.0, 0.0, 1.0, 1.0));
        queue.clear_log();
        queue.submit(ViewId(0), Program::Texture);

        assert!(queue.submissions()[0].uniforms.is_empty());
    }

    #[test]
    fn test_views_are_tagged_with_frame() {
        let mut queue = RecordingQueue::default();
        let desc = ViewDescriptor::new(RenderTarget::Backbuffer, Rect::new(0, 0, 8, 8));

        queue.set_view(ViewId(0), &desc);
        queue.frame();
        queue.set_view(ViewId(0), &desc);
        queue.set_view(ViewId(1), &desc);

        assert_eq!(queue.view_ids_in_frame(0), vec![ViewId(0)]);
        assert_eq!(queue.view_ids_in_frame(1), vec![ViewId(0), ViewId(1)]);
    }

    #[test]
    fn test_transient_create_geometry_is_rejected() {
        let (vertices, indices) = quad();
        let mut queue = RecordingQueue::default();
        assert!(queue.create_geometry(BufferLifetime::Transient, &vertices, &indices).is_err());
        assert!(queue.create_geometry(BufferLifetime::Static, &vertices, &indices).is_ok());
    }
}
