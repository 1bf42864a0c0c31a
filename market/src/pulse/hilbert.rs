//! Discrete Hilbert transform stage.
//!
//! Derives in-phase and quadrature components from lagged de-trended
//! prices using fixed-coefficient feedback recursions:
//!
//! ```text
//! i_new = 1.25 * (d[4] - 0.635 * d[2] + 0.635 * i[3])
//! q_new = d[2] - 0.338 * d[0] + 0.338 * q[2]
//! ```
//!
//! where `x[k]` is the sample `k` steps back from the most recent one.
//! Both component windows start full of zeros so the feedback lags are
//! always readable.

use crate::rolling_window::RollingWindow;

pub const IN_PHASE_MULTIPLIER: f64 = 0.635;
pub const QUADRATURE_MULTIPLIER: f64 = 0.338;
const IN_PHASE_GAIN: f64 = 1.25;

/// De-trended samples required before [`HilbertTransform::step`] may run.
pub const MIN_DETRENDED_SAMPLES: usize = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct HilbertTransform {
    in_phase: RollingWindow,
    quadrature: RollingWindow,
}

impl HilbertTransform {
    pub fn new(period: usize) -> Self {
        Self {
            in_phase: RollingWindow::zeroed(period),
            quadrature: RollingWindow::zeroed(period),
        }
    }

    /// Push one in-phase and one quadrature sample.
    ///
    /// `detrended` must hold at least [`MIN_DETRENDED_SAMPLES`] samples.
    /// Returns the new `(in_phase, quadrature)` pair.
    pub fn step(&mut self, detrended: &RollingWindow) -> (f64, f64) {
        debug_assert!(detrended.len() >= MIN_DETRENDED_SAMPLES);

        let feedback1 = detrended.at(0);
        let feedback2 = detrended.at(2);
        let feedback4 = detrended.at(4);
        let in_phase_lag = self.in_phase.at(3);
        let quadrature_lag = self.quadrature.at(2);

        let in_phase = IN_PHASE_GAIN
            * (feedback4 - IN_PHASE_MULTIPLIER * feedback2 + IN_PHASE_MULTIPLIER * in_phase_lag);
        let quadrature =
            feedback2 - QUADRATURE_MULTIPLIER * feedback1 + QUADRATURE_MULTIPLIER * quadrature_lag;

        self.in_phase.push(in_phase);
        self.quadrature.push(quadrature);

        (in_phase, quadrature)
    }

    pub fn in_phase(&self) -> &RollingWindow {
        &self.in_phase
    }

    pub fn quadrature(&self) -> &RollingWindow {
        &self.quadrature
    }

    pub fn reset(&mut self) {
        self.in_phase.clear_zeroed();
        self.quadrature.clear_zeroed();
    }
}
