//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the renderer:
//! - Math types, camera matrices and frustum culling
//! - Arena handles for materials and per-frame entities
//! - Logging utilities and warn-once deduplication

pub mod math;
pub mod collections;
pub mod logging;
