//! Renderer-facing contracts
//!
//! The GPU command queue and the host services the renderer consumes, plus
//! the recording queue backend.

pub mod collaborators;
pub mod command_queue;
pub mod recording;

pub use collaborators::{
    CameraTransform, DynamicLightManager, DynamicLightTextures, FogParameters, FogQuery, LightSample, ModelCache,
    ModelHandle, PortalCamera, ReflectionCamera, VisibilityId, WorldService,
};
pub use command_queue::{
    DebugFlags, FrameBufferHandle, GpuCommandQueue, QueueCapabilities, RenderTarget, Sampler, TextureDesc,
    TextureFormat, TextureHandle, TextureSize, TextureSource, Uniform, ViewDescriptor, ViewId,
};
pub use recording::{Command, RecordingQueue, SubmissionRecord, TransientRecord};
