//! # Rendering System
//!
//! Turns a per-frame scene description into an ordered stream of GPU
//! submissions against numbered views.
//!
//! ## Architecture
//!
//! - **api**: contracts for the GPU command queue and the world, model and
//!   dynamic-light services, plus the [`api::RecordingQueue`] backend
//! - **primitives**: state words, geometry references, draw calls, programs
//! - **resources**: the material cache
//! - **systems**: stage evaluation, the recursive camera renderer, screen-space
//!   post-processing and 2D quad batching
//! - **frame**: the [`frame::FrameOrchestrator`] that owns per-frame state and
//!   sequences everything above
//!
//! ## Frame Flow
//!
//! ```text
//! begin_frame -> add_* -> render_scene -> (render_scene ...) -> end_frame
//!                           |
//!                           +-> camera renderer (recursive) -> post-processor
//! ```
//!
//! Nothing here retains references across a frame boundary: draw calls,
//! entities and scratch geometry all die at `end_frame`.

use thiserror::Error;

pub mod api;
pub mod frame;
pub mod primitives;
pub mod resources;
pub mod systems;

#[cfg(test)]
pub(crate) mod tests;

/// Errors reported by rendering operations
///
/// Resource exhaustion inside a frame is never reported here; it is logged
/// once per call site and the affected batch is skipped.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A world is already loaded
    ///
    /// Worlds are loaded once per renderer session.
    #[error("Attempted to redundantly load world map")]
    WorldAlreadyLoaded,

    /// A cinematic frame was not a power of two in each dimension
    #[error("Cinematic frame size not a power of 2: {cols} by {rows}")]
    InvalidCinematicSize {
        /// Frame width in texels
        cols: i32,
        /// Frame height in texels
        rows: i32,
    },

    /// A cinematic frame carried fewer bytes than its size requires
    #[error("Cinematic frame needs {expected} bytes, got {actual}")]
    CinematicDataTooShort {
        /// Bytes required
        expected: usize,
        /// Bytes supplied
        actual: usize,
    },

    /// More views were pushed in one frame than the backend supports
    #[error("View limit of {limit} exceeded")]
    ViewLimitExceeded {
        /// Configured limit
        limit: usize,
    },

    /// Polygon submission with inconsistent counts
    #[error("Invalid polygon submission: {0}")]
    InvalidPolygons(String),

    /// Renderer configuration failed validation
    #[error("Invalid renderer configuration: {0}")]
    InvalidConfiguration(String),

    /// Resource creation or management failed
    ///
    /// Occurs when render targets or lookup textures cannot be created.
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// A rendering operation failed during execution
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// Backend-specific error occurred
    ///
    /// Wraps errors raised by the host's command queue or world service.
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
