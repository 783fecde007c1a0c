//! Turning gait calculations
//!
//! Turning reuses the walking waveforms with asymmetric stride: the inner
//! leg's swing is scaled down and the outer leg's scaled up, which rotates
//! the body towards the inner side.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::{GaitCtrl, LocomotionMode};

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GaitCtrl {

    /// Per-leg swing scales (left, right) for the current mode.
    pub(crate) fn swing_scales(&self) -> (f64, f64) {
        let inner = self.params.turn_inner_scale;
        let outer = self.params.turn_outer_scale;

        match self.mode {
            LocomotionMode::TurnLeft => (inner, outer),
            LocomotionMode::TurnRight => (outer, inner),
            _ => (1.0, 1.0),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::super::{GaitParameters, Params};
    use super::*;

    #[test]
    fn test_swing_scales_mirror() {
        let mut gc = GaitCtrl::default();
        gc.params = Params::default();
        gc.gait = GaitParameters::from_params(&gc.params);

        gc.mode = LocomotionMode::TurnLeft;
        let (l, r) = gc.swing_scales();
        assert!(r > l);

        gc.mode = LocomotionMode::TurnRight;
        let (l2, r2) = gc.swing_scales();
        assert_eq!((l2, r2), (r, l));

        gc.mode = LocomotionMode::WalkForward;
        assert_eq!(gc.swing_scales(), (1.0, 1.0));
    }
}
