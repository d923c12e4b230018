//! # Core Renderer Module
//!
//! Shared configuration used by every renderer subsystem.
//!
//! ## Organization
//!
//! - **Config**: Renderer settings (post-processing, effects, debug) with file I/O

pub mod config;

// Re-export foundation modules for convenience
pub use crate::foundation;

// Re-export commonly used config types
pub use config::{
    AntiAliasing,
    Config,
    ConfigError,
    DebugConfig,
    EffectsConfig,
    PostProcessConfig,
    RendererConfig,
};
