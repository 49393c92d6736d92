//! Predicted water-level window for the next tick.
//!
//! After choosing pump commands the controller predicts where the level
//! reading should land one tick later. The window is the backbone of
//! fault detection: a reading outside it means some component did not do
//! what we told it to.

/// Float slack added to both window edges. Absorbs accumulated rounding
/// in the level integration without masking real faults.
pub const SLACK: f64 = 0.3;

/// Predicted `[lo, hi]` range for the next level reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expectation {
    /// No prediction available (before the first planning pass).
    Unknown,
    Window { lo: f64, hi: f64 },
}

impl Expectation {
    /// Build a window from raw bounds, applying [`SLACK`] to both edges.
    pub fn window(lo: f64, hi: f64) -> Self {
        Self::Window {
            lo: lo - SLACK,
            hi: hi + SLACK,
        }
    }

    /// Whether a reading is consistent with the prediction. An unknown
    /// window accepts everything: with nothing predicted there is
    /// nothing to contradict.
    pub fn contains(&self, level: f64) -> bool {
        match *self {
            Self::Unknown => true,
            Self::Window { lo, hi } => level >= lo && level <= hi,
        }
    }

    /// Extend the window downward. Used when a reduced-capacity pump is
    /// commanded open and the shortfall direction is known.
    pub fn widen_lo(&mut self, by: f64) {
        if let Self::Window { lo, .. } = self {
            *lo -= by;
        }
    }

    /// Lower edge, if known.
    pub fn lo(&self) -> Option<f64> {
        match *self {
            Self::Unknown => None,
            Self::Window { lo, .. } => Some(lo),
        }
    }

    /// Upper edge, if known.
    pub fn hi(&self) -> Option<f64> {
        match *self {
            Self::Unknown => None,
            Self::Window { hi, .. } => Some(hi),
        }
    }
}
