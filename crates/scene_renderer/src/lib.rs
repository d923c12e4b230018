//! # Scene Renderer
//!
//! The scene-rendering core of a real-time 3D renderer. It turns a per-frame
//! scene description (camera, entities, dynamic lights, ad-hoc polygons) into an
//! ordered stream of commands for an external GPU command queue.
//!
//! ## Features
//!
//! - **Draw-Call Sorting**: Stable total order by material bucket, sort key and material identity
//! - **Material Stages**: Per-stage state resolution and shader-variant selection
//! - **Recursive Cameras**: Main, reflection, portal and skybox-portal cameras with stencil masking
//! - **Post-Processing**: Bloom, tonemapping and three-pass SMAA
//! - **2D Batching**: Immediate-mode quads batched by material
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_renderer::prelude::*;
//!
//! fn run(
//!     queue: Box<dyn GpuCommandQueue>,
//!     world: Box<dyn WorldService>,
//!     models: Box<dyn ModelCache>,
//!     lights: Box<dyn DynamicLightManager>,
//! ) -> Result<(), RenderError> {
//!     let mut renderer = FrameOrchestrator::new(RendererConfig::default(), queue, world, models, lights)?;
//!     renderer.load_world("maps/q3dm1")?;
//!
//!     renderer.begin_frame(0);
//!     renderer.render_scene(&SceneDefinition::default().with_flags(SceneFlags::WORLD))?;
//!     renderer.end_frame()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        core::config::{AntiAliasing, RendererConfig},
        foundation::{
            collections::{EntityKey, MaterialHandle},
            math::{Axes, Bounds, Mat4, Rect, Vec2, Vec3, Vec4},
        },
        render::{
            api::{
                DynamicLightManager, GpuCommandQueue, ModelCache, ModelHandle, RecordingQueue,
                VisibilityId, WorldService,
            },
            frame::FrameOrchestrator,
            resources::materials::{Material, MaterialCache, MaterialSort, MaterialStage},
            RenderError, RenderResult,
        },
        scene::{DynamicLight, Entity, EntityKind, PolygonVertex, SceneDefinition, SceneFlags},
    };
}
