//! Logging utilities and warn-once deduplication

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system
pub fn init() {
    env_logger::init();
}

/// Initialize logging for unit tests, tolerating repeated calls
#[cfg(test)]
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Call sites that allocate scratch geometry and may run out of it
///
/// Each site warns at most once per renderer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarnOnceId {
    /// Merged ad-hoc polygon batch
    PolygonBatch,
    /// Camera-facing sprite quad
    Sprite,
    /// Rail core / lightning quad
    RailCore,
    /// Rail ring segments
    RailRings,
    /// Pending 2D quads
    StretchPics,
    /// Cinematic frame quad
    Cinematic,
    /// Full-screen post-processing triangle
    ScreenSpaceQuad,
    /// Debug axis lines
    DebugAxis,
    /// Debug bounding boxes
    DebugBounds,
}

impl WarnOnceId {
    const COUNT: usize = 9;

    const fn index(self) -> usize {
        self as usize
    }

    const fn site(self) -> &'static str {
        match self {
            Self::PolygonBatch => "polygon batch",
            Self::Sprite => "sprite",
            Self::RailCore => "rail core",
            Self::RailRings => "rail rings",
            Self::StretchPics => "stretch pics",
            Self::Cinematic => "cinematic",
            Self::ScreenSpaceQuad => "screen-space quad",
            Self::DebugAxis => "debug axis",
            Self::DebugBounds => "debug bounds",
        }
    }
}

/// Tracks which allocation failures have already been reported
#[derive(Debug, Default, Clone)]
pub struct WarnOnce {
    warned: [bool; WarnOnceId::COUNT],
}

impl WarnOnce {
    /// Create a tracker with nothing reported yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a transient buffer allocation failure at `id`
    ///
    /// Returns `true` if this call emitted the warning.
    pub fn transient_alloc_failed(&mut self, id: WarnOnceId) -> bool {
        let slot = &mut self.warned[id.index()];

        if *slot {
            return false;
        }

        *slot = true;
        warn!("Transient buffer alloc failed ({})", id.site());
        true
    }

    /// Whether `id` has already reported a failure
    pub fn has_warned(&self, id: WarnOnceId) -> bool {
        self.warned[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warns_once_per_site() {
        init_for_tests();
        let mut warn_once = WarnOnce::new();

        assert!(warn_once.transient_alloc_failed(WarnOnceId::Sprite));
        assert!(!warn_once.transient_alloc_failed(WarnOnceId::Sprite));
        assert!(warn_once.has_warned(WarnOnceId::Sprite));

        // Other sites are independent.
        assert!(!warn_once.has_warned(WarnOnceId::PolygonBatch));
        assert!(warn_once.transient_alloc_failed(WarnOnceId::PolygonBatch));
    }
}
