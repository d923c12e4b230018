//! Material system
//!
//! Materials, their stages and the cache that owns them.

pub mod material;
pub mod material_cache;
pub mod stage;

pub use material::{FogPass, Material, MaterialSort, SkyBox};
pub use material_cache::{MaterialCache, DEFAULT_MATERIAL_NAME};
pub use stage::{
    AlphaTest, FogAdjust, LightType, MaterialStage, StageGenerators, StageUniformSet, TextureBundle,
};
