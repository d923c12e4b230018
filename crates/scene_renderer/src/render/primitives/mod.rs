//! Core rendering primitives
//!
//! Value types shared by every pass: state words, geometry references, draw
//! calls and shader program identifiers.

pub mod draw_call;
pub mod geometry;
pub mod shader;
pub mod state;

pub use draw_call::{sort_draw_calls, DrawCall, DrawCallFlags};
pub use geometry::{BufferHandle, BufferLifetime, BufferRange, GeometryBuffers, GeometryRef, Vertex};
pub use shader::{DepthVariant, FogVariant, GenericVariant, Program};
pub use state::{BlendFactor, ClearFlags, StateFlags, StencilOp, StencilState, StencilTest};
