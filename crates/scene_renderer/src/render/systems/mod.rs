//! Rendering systems
//!
//! Stateless or per-frame passes sequenced by the frame orchestrator.

pub mod camera;
pub mod post_process;
pub mod stage_eval;
pub mod stretch_pic;
