//! Shader programs and their statically compiled variants
//!
//! Programs with permutations carry a variant bit set; the backend maps each
//! (program, variant) pair to a precompiled shader.

use bitflags::bitflags;

bitflags! {
    /// Permutations of the generic material program
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct GenericVariant: u8 {
        /// Discard fragments by the stage's alpha-test mode
        const ALPHA_TEST = 1 << 0;
        /// Remap depth into a custom range (weapons, decals)
        const DEPTH_RANGE = 1 << 1;
        /// Accumulate clustered dynamic lights
        const DYNAMIC_LIGHTS = 1 << 2;
        /// Write HDR color and a bloom mask
        const HDR = 1 << 3;
        /// Fade against scene linear depth
        const SOFT_SPRITE = 1 << 4;
    }
}

bitflags! {
    /// Permutations of the depth-only program
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct DepthVariant: u8 {
        /// Alpha-tested depth
        const ALPHA_TEST = 1 << 0;
        /// Remap depth into a custom range
        const DEPTH_RANGE = 1 << 1;
    }
}

bitflags! {
    /// Permutations of the fog program
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct FogVariant: u8 {
        /// Remap depth into a custom range
        const DEPTH_RANGE = 1 << 0;
        /// HDR output
        const HDR = 1 << 1;
    }
}

/// A shader program selected for one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    /// Flat vertex color
    Color,
    /// Depth only
    Depth(DepthVariant),
    /// Fog blend pass
    Fog(FogVariant),
    /// Material stage
    Generic(GenericVariant),
    /// Separable gaussian blur
    GaussianBlur,
    /// Hardware depth to linear depth
    LinearDepth,
    /// SMAA pass 1
    SmaaEdgeDetection,
    /// SMAA pass 2
    SmaaBlendingWeightCalculation,
    /// SMAA pass 3
    SmaaNeighborhoodBlending,
    /// Textured copy
    Texture,
    /// Texture modulated by a uniform color
    TextureColor,
    /// Texture visualization for debug overlays
    TextureDebug,
    /// HDR tonemap
    ToneMap,
}
