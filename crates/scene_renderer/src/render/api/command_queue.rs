//! # GPU Command Queue
//!
//! The renderer never talks to a graphics API directly. Every resource
//! creation, state change and submission goes through [`GpuCommandQueue`],
//! implemented by the host's backend.
//!
//! ## Submission Model
//!
//! State is positional: uniforms, textures, geometry, transform, state word and
//! stencil are set first, then [`GpuCommandQueue::submit`] records one draw
//! against a numbered view. Per-draw state (textures, geometry, transform,
//! state word, stencil) is consumed by the submit; uniform values persist until
//! overwritten. Callers must therefore submit immediately after setting the
//! state a draw depends on.

use std::any::Any;

use crate::foundation::math::{Mat4, Rect, Vec4};
use crate::render::primitives::geometry::{BufferLifetime, GeometryBuffers, GeometryRef, Vertex};
use crate::render::primitives::shader::Program;
use crate::render::primitives::state::{ClearFlags, StateFlags, StencilState};
use crate::render::RenderResult;

use bitflags::bitflags;

/// Numbered view slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub u16);

/// Texture owned by the command queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Frame buffer owned by the command queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameBufferHandle(pub u32);

/// Texel formats used by render targets and lookup textures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit single channel
    R8,
    /// 16-bit float single channel
    R16F,
    /// 8-bit two channel
    RG8,
    /// 8-bit BGRA
    BGRA8,
    /// 16-bit float RGBA
    RGBA16F,
    /// 24-bit depth, 8-bit stencil
    D24S8,
}

impl TextureFormat {
    /// Bytes per texel
    pub const fn bytes_per_texel(self) -> usize {
        match self {
            Self::R8 => 1,
            Self::R16F | Self::RG8 => 2,
            Self::BGRA8 | Self::D24S8 => 4,
            Self::RGBA16F => 8,
        }
    }
}

/// Size of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSize {
    /// Same size as the backbuffer, following resizes
    Backbuffer,
    /// A quarter of the backbuffer in each dimension
    QuarterBackbuffer,
    /// Fixed size in texels
    Fixed {
        /// Width
        width: u32,
        /// Height
        height: u32,
    },
}

/// Texture creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    /// Texel format
    pub format: TextureFormat,
    /// Size
    pub size: TextureSize,
    /// Usable as a frame buffer attachment
    pub render_target: bool,
    /// Clamp texture coordinates instead of wrapping
    pub clamp: bool,
    /// Multisample count, 1 for none
    pub msaa_samples: u8,
}

impl TextureDesc {
    /// Clamped render target texture
    pub const fn render_target(format: TextureFormat, size: TextureSize) -> Self {
        Self { format, size, render_target: true, clamp: true, msaa_samples: 1 }
    }

    /// Clamped sampled texture
    pub const fn lookup(format: TextureFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            size: TextureSize::Fixed { width, height },
            render_target: false,
            clamp: true,
            msaa_samples: 1,
        }
    }

    /// Set the multisample count
    #[must_use]
    pub const fn with_msaa(mut self, samples: u8) -> Self {
        self.msaa_samples = samples;
        self
    }
}

/// Destination of a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// The window's backbuffer
    Backbuffer,
    /// An offscreen frame buffer
    FrameBuffer(FrameBufferHandle),
}

/// Something a sampler can read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSource {
    /// A plain texture
    Texture(TextureHandle),
    /// One attachment of a frame buffer
    Attachment {
        /// Frame buffer
        frame_buffer: FrameBufferHandle,
        /// Attachment index
        attachment: u8,
    },
}

impl TextureSource {
    /// First attachment of a frame buffer
    pub const fn frame_buffer(frame_buffer: FrameBufferHandle) -> Self {
        Self::Attachment { frame_buffer, attachment: 0 }
    }
}

/// Sampler slots exposed by the shader programs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sampler {
    /// Generic texture input of screen-space programs
    Texture,
    /// Bloom input of the tonemap program
    Bloom,
    /// Material diffuse map
    Diffuse,
    /// Material second diffuse map
    Diffuse2,
    /// Material lightmap
    Light,
    /// Scene linear depth for soft sprites
    Depth,
    /// Clustered light cells
    DynamicLightCells,
    /// Clustered light indices
    DynamicLightIndices,
    /// Clustered light data
    DynamicLights,
    /// SMAA color input
    SmaaColor,
    /// SMAA edges
    SmaaEdges,
    /// SMAA area lookup
    SmaaArea,
    /// SMAA search lookup
    SmaaSearch,
    /// SMAA blend weights
    SmaaBlend,
}

impl Sampler {
    /// Texture unit the sampler is bound to
    pub const fn unit(self) -> u8 {
        match self {
            Self::Texture | Self::Diffuse | Self::SmaaColor | Self::SmaaEdges => 0,
            Self::Bloom | Self::Diffuse2 | Self::SmaaArea | Self::SmaaBlend => 1,
            Self::Light | Self::SmaaSearch => 2,
            Self::Depth => 3,
            Self::DynamicLightCells => 4,
            Self::DynamicLightIndices => 5,
            Self::DynamicLights => 6,
        }
    }
}

/// Shader uniforms, each a `vec4` unless noted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Uniform {
    /// x: clip plane enabled
    PortalClip,
    /// Clip plane
    PortalPlane,
    /// z offset, z scale, z near, z far
    DepthRange,
    /// Camera position
    ViewOrigin,
    /// Camera up vector
    ViewUp,
    /// Camera position in model space
    LocalViewOrigin,
    /// x: dynamic light count, y: intensity
    DynamicLightNumIntensity,
    /// x: fog enabled
    FogEnabled,
    /// Which channels fog adjusts
    FogColorMask,
    /// Fog distance vector
    FogDistance,
    /// Fog depth vector
    FogDepth,
    /// x: eye-to-fog-plane parameter
    FogEyeT,
    /// x: fade depth, y: use alpha
    SoftSpriteDepthUseAlpha,
    /// x: stage writes bloom
    BloomEnabled,
    /// Entity ambient light
    AmbientLight,
    /// Entity directed light
    DirectedLight,
    /// Entity light direction
    LightDirection,
    /// x: material time
    Time,
    /// x: number of vertex deforms
    DeformCount,
    /// Deform parameters (array)
    DeformParameters,
    /// x: alpha-test mode
    AlphaTest,
    /// Stage base color
    BaseColor,
    /// Stage vertex color scale
    VertexColor,
    /// Stage generator flags
    Generators,
    /// x: stage light type
    LightType,
    /// Texture coordinate generation parameters
    TexGen,
    /// Flat color
    Color,
    /// Blur direction
    GaussianBlurDirection,
    /// Brightness, contrast, gamma, saturation
    BrightnessContrastGammaSaturation,
    /// Bloom scale, exposure
    BloomScaleExposure,
    /// 1/w, 1/h, w, h
    SmaaMetrics,
    /// x: texture debug mode
    TextureDebug,
}

bitflags! {
    /// Backend debug displays
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DebugFlags: u8 {
        /// Backend statistics
        const STATS = 1 << 0;
        /// Debug text overlay
        const TEXT = 1 << 1;
    }
}

/// Everything a view needs: target, clear policy, rect and matrices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewDescriptor {
    /// Render target
    pub target: RenderTarget,
    /// Buffers cleared when the view starts
    pub clear: ClearFlags,
    /// Packed RGBA clear color
    pub clear_color: u32,
    /// Viewport
    pub rect: Rect,
    /// View matrix
    pub view: Mat4,
    /// Projection matrix
    pub projection: Mat4,
    /// Preserve submission order instead of letting the backend sort
    pub sequential: bool,
}

impl ViewDescriptor {
    /// View with identity matrices and no clearing
    pub fn new(target: RenderTarget, rect: Rect) -> Self {
        Self {
            target,
            clear: ClearFlags::empty(),
            clear_color: 0,
            rect,
            view: Mat4::identity(),
            projection: Mat4::identity(),
            sequential: false,
        }
    }

    /// Set the cleared buffers
    #[must_use]
    pub const fn with_clear(mut self, clear: ClearFlags) -> Self {
        self.clear = clear;
        self
    }

    /// Set the clear color
    #[must_use]
    pub const fn with_clear_color(mut self, rgba: u32) -> Self {
        self.clear_color = rgba;
        self
    }

    /// Set the matrices
    #[must_use]
    pub const fn with_transform(mut self, view: Mat4, projection: Mat4) -> Self {
        self.view = view;
        self.projection = projection;
        self
    }

    /// Preserve submission order
    #[must_use]
    pub const fn sequential(mut self) -> Self {
        self.sequential = true;
        self
    }
}

/// Backend conventions the renderer adapts to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueCapabilities {
    /// Texture coordinate origin is the bottom-left corner
    pub texture_origin_bottom_left: bool,
    /// Half-texel offset for screen-space sampling (0.5 on D3D9-style APIs)
    pub half_texel_offset: f32,
    /// The window supports a hardware gamma ramp
    pub hardware_gamma: bool,
}

impl Default for QueueCapabilities {
    fn default() -> Self {
        Self {
            texture_origin_bottom_left: true,
            half_texel_offset: 0.0,
            hardware_gamma: false,
        }
    }
}

/// Host-provided GPU command queue
pub trait GpuCommandQueue {
    /// Backend conventions
    fn capabilities(&self) -> QueueCapabilities;

    /// Backbuffer size in pixels
    fn backbuffer_size(&self) -> (u32, u32);

    /// Create a texture, optionally with initial contents
    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> RenderResult<TextureHandle>;

    /// Replace a region of a texture starting at the origin
    fn update_texture(&mut self, texture: TextureHandle, width: u32, height: u32, data: &[u8]);

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Create a frame buffer from attachments
    fn create_frame_buffer(&mut self, attachments: &[TextureHandle]) -> RenderResult<FrameBufferHandle>;

    /// Destroy a frame buffer
    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle);

    /// Create persistent geometry; `lifetime` must not be transient
    fn create_geometry(
        &mut self,
        lifetime: BufferLifetime,
        vertices: &[Vertex],
        indices: &[u16],
    ) -> RenderResult<GeometryBuffers>;

    /// Overwrite dynamic geometry
    fn update_geometry(&mut self, buffers: &GeometryBuffers, vertices: &[Vertex], indices: &[u16]);

    /// Destroy persistent geometry
    fn destroy_geometry(&mut self, buffers: &GeometryBuffers);

    /// Copy geometry into per-frame scratch memory
    ///
    /// Returns `None` when scratch memory is exhausted for this frame.
    fn alloc_transient(&mut self, vertices: &[Vertex], indices: &[u16]) -> Option<GeometryBuffers>;

    /// Whether scratch memory could hold the given amounts right now
    fn has_transient_space(&self, vertex_count: u32, index_count: u32) -> bool;

    /// Configure a view slot
    fn set_view(&mut self, view: ViewId, desc: &ViewDescriptor);

    /// Make sure a view is processed even with nothing submitted to it
    fn touch(&mut self, view: ViewId);

    /// Set a uniform
    fn set_uniform(&mut self, uniform: Uniform, value: Vec4);

    /// Set an array uniform
    fn set_uniform_array(&mut self, uniform: Uniform, values: &[Vec4]);

    /// Bind a texture for the next submission
    fn set_texture(&mut self, sampler: Sampler, source: TextureSource);

    /// Bind geometry for the next submission
    fn set_geometry(&mut self, geometry: &GeometryRef);

    /// Set the model transform for the next submission
    fn set_transform(&mut self, transform: &Mat4);

    /// Set the state word for the next submission
    fn set_state(&mut self, state: StateFlags);

    /// Set the stencil state for the next submission
    fn set_stencil(&mut self, stencil: StencilState);

    /// Record a draw with the pending state
    fn submit(&mut self, view: ViewId, program: Program);

    /// Enable backend debug displays
    fn set_debug(&mut self, flags: DebugFlags);

    /// Clear the debug text overlay
    fn debug_text_clear(&mut self);

    /// Print to the debug text overlay
    fn debug_text(&mut self, column: u16, row: u16, text: &str);

    /// Execute everything queued for this frame
    fn frame(&mut self);

    /// Install a gamma ramp; ignored by backends without hardware gamma
    fn set_gamma_ramp(&mut self, _table: &[u8; 256]) {}

    /// Downcast support
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
