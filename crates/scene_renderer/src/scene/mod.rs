//! Scene submission
//!
//! Entities, lights, polygons and the scene descriptor the host hands to the
//! frame orchestrator each frame.

pub mod aggregator;
pub mod definition;
pub mod entity;

pub use aggregator::{PolygonBatch, PolygonVertex, SceneAggregator};
pub use definition::{AreaMask, SceneDefinition, SceneFlags};
pub use entity::{DynamicLight, Entity, EntityArena, EntityFlags, EntityKind, EntityLighting};
