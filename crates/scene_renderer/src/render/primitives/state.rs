//! # GPU State Words
//!
//! Fixed-function state is carried as a packed 64-bit word so that a draw
//! call's base state and a material stage's state can be combined with a
//! bitwise OR. Depth test, cull mode and blend function are multi-bit fields;
//! use the `*_MASK` constants to clear or compare a field.
//!
//! ## Layout
//!
//! | Bits  | Field                                   |
//! |-------|-----------------------------------------|
//! | 0-2   | RGB / alpha / depth write               |
//! | 4-7   | depth test function                     |
//! | 8-9   | cull mode                               |
//! | 12-19 | blend source (12-15) / dest (16-19)     |
//! | 24    | line primitives                         |
//! | 28    | multisampling                           |

use bitflags::bitflags;

/// Blend factor encoded into the blend field of [`StateFlags`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlendFactor {
    /// 0
    Zero = 1,
    /// 1
    One = 2,
    /// Source color
    SrcColor = 3,
    /// 1 - source color
    InvSrcColor = 4,
    /// Source alpha
    SrcAlpha = 5,
    /// 1 - source alpha
    InvSrcAlpha = 6,
    /// Destination alpha
    DstAlpha = 7,
    /// 1 - destination alpha
    InvDstAlpha = 8,
    /// Destination color
    DstColor = 9,
    /// 1 - destination color
    InvDstColor = 10,
    /// Saturated source alpha
    SrcAlphaSat = 11,
}

const BLEND_SRC_SHIFT: u64 = 12;
const BLEND_DST_SHIFT: u64 = 16;

bitflags! {
    /// Packed GPU state word
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StateFlags: u64 {
        /// Write color channels
        const RGB_WRITE = 1 << 0;
        /// Write alpha channel
        const ALPHA_WRITE = 1 << 1;
        /// Write depth
        const DEPTH_WRITE = 1 << 2;

        /// Depth test: less
        const DEPTH_TEST_LESS = 1 << 4;
        /// Depth test: less or equal
        const DEPTH_TEST_LEQUAL = 2 << 4;
        /// Depth test: equal
        const DEPTH_TEST_EQUAL = 3 << 4;
        /// Depth test: greater or equal
        const DEPTH_TEST_GEQUAL = 4 << 4;
        /// Depth test: greater
        const DEPTH_TEST_GREATER = 5 << 4;
        /// Depth test: not equal
        const DEPTH_TEST_NOTEQUAL = 6 << 4;
        /// Depth test: never
        const DEPTH_TEST_NEVER = 7 << 4;
        /// Depth test: always
        const DEPTH_TEST_ALWAYS = 8 << 4;
        /// Depth test field
        const DEPTH_TEST_MASK = 0xf << 4;

        /// Cull clockwise faces
        const CULL_CW = 1 << 8;
        /// Cull counter-clockwise faces
        const CULL_CCW = 2 << 8;
        /// Cull field
        const CULL_MASK = 0x3 << 8;

        /// Additive blend (one, one)
        const BLEND_ADD = ((BlendFactor::One as u64) << BLEND_SRC_SHIFT) | ((BlendFactor::One as u64) << BLEND_DST_SHIFT);
        /// Alpha blend (source alpha, inverse source alpha)
        const BLEND_ALPHA = ((BlendFactor::SrcAlpha as u64) << BLEND_SRC_SHIFT) | ((BlendFactor::InvSrcAlpha as u64) << BLEND_DST_SHIFT);
        /// Blend field
        const BLEND_MASK = 0xff << BLEND_SRC_SHIFT;

        /// Draw line lists instead of triangles
        const PT_LINES = 1 << 24;
        /// Enable multisampling
        const MSAA = 1 << 28;
    }
}

impl StateFlags {
    /// Encode a blend function
    pub const fn blend_func(src: BlendFactor, dst: BlendFactor) -> Self {
        Self::from_bits_retain(((src as u64) << BLEND_SRC_SHIFT) | ((dst as u64) << BLEND_DST_SHIFT))
    }

    /// The blend field alone
    pub fn blend(self) -> Self {
        self & Self::BLEND_MASK
    }

    /// The depth test field alone
    pub fn depth_test(self) -> Self {
        self & Self::DEPTH_TEST_MASK
    }

    /// The cull field alone
    pub fn cull(self) -> Self {
        self & Self::CULL_MASK
    }

    /// Replace the blend field
    #[must_use]
    pub fn with_blend(self, blend: Self) -> Self {
        self.difference(Self::BLEND_MASK) | blend.blend()
    }

    /// Clear depth testing and depth writes
    #[must_use]
    pub fn without_depth(self) -> Self {
        self.difference(Self::DEPTH_TEST_MASK | Self::DEPTH_WRITE)
    }
}

bitflags! {
    /// Targets cleared when a view starts
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u16 {
        /// Clear color
        const COLOR = 1 << 0;
        /// Clear depth
        const DEPTH = 1 << 1;
        /// Clear stencil
        const STENCIL = 1 << 2;
    }
}

/// Stencil comparison function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilTest {
    /// Pass when `ref & mask == stencil & mask`
    Equal,
    /// Always pass
    Always,
}

/// Stencil buffer update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    /// Keep the current value
    Keep,
    /// Write the reference value
    Replace,
}

/// Complete stencil configuration for one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    /// Comparison function
    pub test: StencilTest,
    /// Reference value
    pub reference: u8,
    /// Mask applied to both sides of the comparison
    pub read_mask: u8,
    /// Operation when the stencil test fails
    pub fail_stencil: StencilOp,
    /// Operation when the depth test fails
    pub fail_depth: StencilOp,
    /// Operation when both tests pass
    pub pass: StencilOp,
}

impl StencilState {
    /// Write 1 wherever the geometry passes the depth test
    pub const MASK_WRITE: Self = Self {
        test: StencilTest::Always,
        reference: 1,
        read_mask: 0xff,
        fail_stencil: StencilOp::Replace,
        fail_depth: StencilOp::Replace,
        pass: StencilOp::Replace,
    };

    /// Only draw where a mask of 1 has been written
    pub const MASK_TEST: Self = Self {
        test: StencilTest::Equal,
        reference: 1,
        read_mask: 1,
        fail_stencil: StencilOp::Keep,
        fail_depth: StencilOp::Keep,
        pass: StencilOp::Keep,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_fields_compare_by_mask() {
        let state = StateFlags::RGB_WRITE | StateFlags::BLEND_ADD | StateFlags::DEPTH_TEST_LEQUAL;
        assert_eq!(state.blend(), StateFlags::BLEND_ADD);
        assert_eq!(state.depth_test(), StateFlags::DEPTH_TEST_LEQUAL);

        let rewritten = state.with_blend(StateFlags::blend_func(BlendFactor::SrcAlpha, BlendFactor::One));
        assert_ne!(rewritten.blend(), StateFlags::BLEND_ADD);
        assert!(rewritten.contains(StateFlags::RGB_WRITE));
        assert_eq!(rewritten.depth_test(), StateFlags::DEPTH_TEST_LEQUAL);
    }

    #[test]
    fn test_without_depth_clears_test_and_write() {
        let state = StateFlags::RGB_WRITE | StateFlags::DEPTH_WRITE | StateFlags::DEPTH_TEST_EQUAL | StateFlags::CULL_CW;
        let flat = state.without_depth();

        assert_eq!(flat.depth_test(), StateFlags::empty());
        assert!(!flat.contains(StateFlags::DEPTH_WRITE));
        assert_eq!(flat.cull(), StateFlags::CULL_CW);
    }

    #[test]
    fn test_alpha_blend_constant_matches_encoder() {
        assert_eq!(
            StateFlags::BLEND_ALPHA,
            StateFlags::blend_func(BlendFactor::SrcAlpha, BlendFactor::InvSrcAlpha)
        );
    }
}
