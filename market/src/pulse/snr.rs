//! Signal-to-Noise Ratio Pulse
//!
//! Streaming estimate of how strong the cyclic component of price is
//! relative to the bar range, in decibels.
//!
//! ## Pipeline (per bar)
//! 1. midpoint `(high + low) / 2` enters the midpoint window
//! 2. de-trended price = newest midpoint - oldest midpoint in the window
//! 3. in-phase / quadrature components from the Hilbert stage
//! 4. smoothed range and smoothed amplitude, each clamped at its floor
//! 5. `snr = 10 * log10(amplitude / range^2) + 1.9`
//! 6. published value = smoothed `snr`
//!
//! ## Warm-up guard
//! Nothing is computed until the midpoint window holds `period` samples,
//! and nothing is published until five de-trended samples exist. Until then
//! `value()` is `0.0` and the pulse result is `Invalid`.
//!
//! ## Degenerate bars
//! A bar with `high == low` still feeds the midpoint and de-trended windows
//! but leaves range, amplitude and value untouched.
//!
//! ## Determinism
//! Pure computation over owned state. Bars must arrive in timestamp order;
//! reordering is neither detected nor corrected here.

use serde::Serialize;

use super::hilbert::{HilbertTransform, MIN_DETRENDED_SAMPLES};
use super::input::BarInput;
use super::warmup::WarmupState;
use super::{Pulse, PulseResult, PulseValidity};
use crate::config::SnrConfig;
use crate::error::SnrError;
use crate::rolling_window::RollingWindow;

/// `(new sample, previous)` weights of the range recursion.
const RANGE_WEIGHTS: (f64, f64) = (0.2, 0.8);
/// `(new sample, previous)` weights of the amplitude recursion.
const AMPLITUDE_WEIGHTS: (f64, f64) = (0.2, 0.8);
/// `(new sample, previous)` weights of the published value.
const VALUE_WEIGHTS: (f64, f64) = (0.25, 0.75);

/// Additive calibration of the decibel ratio.
const SNR_OFFSET_DB: f64 = 1.9;

/// Snapshot of the pulse after one bar.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SnrPulseResult {
    /// Timestamp of the bar that produced this result.
    pub ts_ms: u64,

    /// Smoothed SNR in decibels. `0.0` until the first output.
    pub value: f64,

    /// Midpoint window has filled at least once.
    pub initialized: bool,

    /// `Valid` once a value has been published.
    pub validity: PulseValidity,
}

impl Default for SnrPulseResult {
    fn default() -> Self {
        Self {
            ts_ms: 0,
            value: 0.0,
            initialized: false,
            validity: PulseValidity::Invalid,
        }
    }
}

impl PulseResult for SnrPulseResult {
    fn validity(&self) -> PulseValidity {
        self.validity
    }
}

/// SNR pulse state.
///
/// One instance per instrument feed. Not meant for concurrent updates; wrap
/// it in a lock if several tasks share it.
#[derive(Clone, Debug, PartialEq)]
pub struct SnrPulse {
    config: SnrConfig,

    midpoints: RollingWindow,
    detrended: RollingWindow,
    hilbert: HilbertTransform,

    warmup: WarmupState,
    observation_count: u64,

    previous_range: f64,
    previous_amplitude: f64,
    previous_value: f64,
    current_range: f64,
    current_amplitude: f64,
    value: f64,
}

impl SnrPulse {
    pub fn new(config: SnrConfig) -> Result<Self, SnrError> {
        config.validate()?;

        Ok(Self {
            config,
            midpoints: RollingWindow::with_capacity(config.period),
            detrended: RollingWindow::with_capacity(config.period),
            hilbert: HilbertTransform::new(config.period),
            warmup: WarmupState::default(),
            observation_count: 0,
            previous_range: 0.0,
            previous_amplitude: 0.0,
            previous_value: 0.0,
            current_range: 0.0,
            current_amplitude: 0.0,
            value: 0.0,
        })
    }

    /// Feed one bar.
    ///
    /// With `validate_inputs` set, a bar violating `high > 0`, `low > 0`,
    /// `high >= low` is rejected before any state changes.
    pub fn update(&mut self, high: f64, low: f64) -> Result<(), SnrError> {
        if self.config.validate_inputs && !(high > 0.0 && low > 0.0 && high >= low) {
            return Err(SnrError::InvalidInput { high, low });
        }

        self.observation_count += 1;
        self.midpoints.push((high + low) / 2.0);

        if !self.warmup.is_initialized() {
            if !self.midpoints.is_full() {
                return Ok(());
            }
            self.warmup.mark_initialized();
        }

        let newest = self.midpoints.at(0);
        let oldest = self.midpoints.at(self.midpoints.len() - 1);
        self.detrended.push(newest - oldest);

        let last_range = high - low;
        if last_range == 0.0 {
            return Ok(());
        }

        if self.previous_range == 0.0 {
            self.previous_range = last_range;
        }
        self.current_range =
            smooth(RANGE_WEIGHTS, last_range, self.previous_range).max(self.config.range_floor);
        self.previous_range = self.current_range;

        if self.detrended.len() < MIN_DETRENDED_SAMPLES {
            return Ok(());
        }

        self.hilbert.step(&self.detrended);
        let in_phase = self.hilbert.in_phase().at(0);
        let quadrature = self.hilbert.quadrature().at(0);
        let inst_amplitude = in_phase * in_phase + quadrature * quadrature;

        if self.previous_amplitude == 0.0 {
            self.previous_amplitude = inst_amplitude;
        }
        self.current_amplitude = smooth(AMPLITUDE_WEIGHTS, inst_amplitude, self.previous_amplitude)
            .max(self.config.amplitude_floor);
        self.previous_amplitude = self.current_amplitude;

        // only reachable with range_floor == 0
        if self.current_range == 0.0 {
            return Ok(());
        }

        // amplitude_floor == 0 with zero amplitude gives -inf here; see SnrConfig
        let snr = 10.0 * (self.current_amplitude / (self.current_range * self.current_range)).log10()
            + SNR_OFFSET_DB;

        if self.warmup.mark_output() {
            self.value = snr;
        } else {
            self.value = smooth(VALUE_WEIGHTS, snr, self.previous_value);
        }
        self.previous_value = self.value;

        Ok(())
    }

    /// Return to the freshly constructed shape. Configuration is kept.
    pub fn reset(&mut self) {
        self.midpoints.clear();
        self.detrended.clear();
        self.hilbert.reset();
        self.warmup.reset();
        self.observation_count = 0;
        self.previous_range = 0.0;
        self.previous_amplitude = 0.0;
        self.previous_value = 0.0;
        self.current_range = 0.0;
        self.current_amplitude = 0.0;
        self.value = 0.0;
    }

    /// Last published SNR in decibels, `0.0` before the first output.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_initialized(&self) -> bool {
        self.warmup.is_initialized()
    }

    pub fn has_output(&self) -> bool {
        self.warmup.has_output()
    }

    pub fn warmup_state(&self) -> WarmupState {
        self.warmup
    }

    pub fn current_range(&self) -> f64 {
        self.current_range
    }

    pub fn current_amplitude(&self) -> f64 {
        self.current_amplitude
    }

    /// Accepted updates since construction or the last reset.
    pub fn observation_count(&self) -> u64 {
        self.observation_count
    }

    pub fn config(&self) -> &SnrConfig {
        &self.config
    }

    pub fn result(&self, ts_ms: u64) -> SnrPulseResult {
        SnrPulseResult {
            ts_ms,
            value: self.value,
            initialized: self.is_initialized(),
            validity: if self.has_output() {
                PulseValidity::Valid
            } else {
                PulseValidity::Invalid
            },
        }
    }
}

impl Pulse for SnrPulse {
    type Input = BarInput;
    type Output = SnrPulseResult;
    type Error = SnrError;

    fn evaluate(&mut self, input: Self::Input) -> Result<Self::Output, Self::Error> {
        self.update(input.high, input.low)?;
        Ok(self.result(input.ts_ms))
    }
}

fn smooth((sample_weight, previous_weight): (f64, f64), sample: f64, previous: f64) -> f64 {
    sample_weight * sample + previous_weight * previous
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_config() -> SnrConfig {
        SnrConfig::new(7, 1e-5, 1e-3, false)
    }

    /// Deterministic cyclic bars with an occasional flat bar.
    fn wavy_bars(n: usize) -> Vec<(f64, f64)> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                let mid = 100.0 + 5.0 * (t * 0.3).sin() + 0.05 * t;
                let half = if i % 17 == 0 {
                    0.0
                } else {
                    0.5 + 0.25 * (t * 0.7).cos().abs()
                };
                (mid + half, mid - half)
            })
            .collect()
    }

    /// Straight-line rendition of the filter over plain vectors.
    fn reference_values(cfg: SnrConfig, bars: &[(f64, f64)]) -> Vec<(bool, f64)> {
        fn push(v: &mut Vec<f64>, x: f64, cap: usize) {
            v.push(x);
            if v.len() > cap {
                v.remove(0);
            }
        }
        fn back(v: &[f64], k: usize) -> f64 {
            v[v.len() - 1 - k]
        }

        let p = cfg.period;
        let mut mids = Vec::new();
        let mut detr = Vec::new();
        let mut ip = vec![0.0; p];
        let mut qd = vec![0.0; p];
        let (mut initialized, mut has_output) = (false, false);
        let (mut prev_range, mut prev_amp, mut prev_value, mut value) = (0.0, 0.0, 0.0, 0.0);
        let mut out = Vec::new();

        for &(high, low) in bars {
            'bar: {
                push(&mut mids, (high + low) / 2.0, p);
                if !initialized {
                    if mids.len() < p {
                        break 'bar;
                    }
                    initialized = true;
                }
                push(&mut detr, back(&mids, 0) - mids[0], p);

                let range = high - low;
                if range == 0.0 {
                    break 'bar;
                }
                if prev_range == 0.0 {
                    prev_range = range;
                }
                let cur_range = f64::max(0.2 * range + 0.8 * prev_range, cfg.range_floor);
                prev_range = cur_range;

                if detr.len() < 5 {
                    break 'bar;
                }
                let i = 1.25 * (back(&detr, 4) - 0.635 * back(&detr, 2) + 0.635 * back(&ip, 3));
                let q = back(&detr, 2) - 0.338 * back(&detr, 0) + 0.338 * back(&qd, 2);
                push(&mut ip, i, p);
                push(&mut qd, q, p);

                let amp = i * i + q * q;
                if prev_amp == 0.0 {
                    prev_amp = amp;
                }
                let cur_amp = f64::max(0.2 * amp + 0.8 * prev_amp, cfg.amplitude_floor);
                prev_amp = cur_amp;

                if cur_range == 0.0 {
                    break 'bar;
                }
                let snr = 10.0 * (cur_amp / (cur_range * cur_range)).log10() + 1.9;
                if !has_output {
                    value = snr;
                    has_output = true;
                } else {
                    value = 0.25 * snr + 0.75 * prev_value;
                }
                prev_value = value;
            }
            out.push((has_output, value));
        }
        out
    }

    #[test]
    fn rejects_invalid_config() {
        for cfg in [
            SnrConfig::new(0, 1e-5, 1e-3, false),
            SnrConfig::new(7, -1.0, 1e-3, false),
            SnrConfig::new(7, 1e-5, -1.0, false),
        ] {
            assert!(matches!(SnrPulse::new(cfg), Err(SnrError::InvalidConfig(_))));
        }
    }

    #[test]
    fn stays_uninitialized_until_window_fills() {
        let mut f = SnrPulse::new(scenario_config()).unwrap();

        for _ in 0..6 {
            f.update(101.0, 100.0).unwrap();
            assert!(!f.is_initialized());
            assert_eq!(f.value(), 0.0);
        }

        f.update(101.0, 100.0).unwrap();
        assert!(f.is_initialized());
        assert!(!f.has_output());
        assert_eq!(f.warmup_state(), WarmupState::Initialized);
    }

    #[test]
    fn constant_unit_range_converges_to_amplitude_floor() {
        let mut f = SnrPulse::new(scenario_config()).unwrap();

        // window fills on bar 7, de-trended history reaches 5 on bar 11
        for _ in 0..10 {
            f.update(101.0, 100.0).unwrap();
        }
        assert!(!f.has_output());
        assert_eq!(f.value(), 0.0);

        f.update(101.0, 100.0).unwrap();
        assert!(f.has_output());

        for _ in 0..200 {
            f.update(101.0, 100.0).unwrap();
        }

        assert!((f.current_range() - 1.0).abs() < 1e-12);
        assert!((f.current_amplitude() - 0.001).abs() < 1e-12);
        assert!((f.value() - (-28.1)).abs() < 1e-9, "value = {}", f.value());
    }

    #[test]
    fn validation_rejects_inverted_bar_without_side_effects() {
        let cfg = SnrConfig {
            validate_inputs: true,
            ..scenario_config()
        };
        let mut f = SnrPulse::new(cfg).unwrap();
        for (h, l) in wavy_bars(20) {
            f.update(h, l).unwrap();
        }
        let before = f.clone();

        let err = f.update(5.0, 10.0).unwrap_err();

        assert_eq!(err, SnrError::InvalidInput { high: 5.0, low: 10.0 });
        assert_eq!(f, before);
    }

    #[test]
    fn validation_rejects_non_positive_prices() {
        let cfg = SnrConfig {
            validate_inputs: true,
            ..scenario_config()
        };
        let mut f = SnrPulse::new(cfg).unwrap();

        assert!(f.update(0.0, 0.0).is_err());
        assert!(f.update(1.0, -1.0).is_err());
        assert!(f.update(f64::NAN, 1.0).is_err());
        assert_eq!(f.observation_count(), 0);

        assert!(f.update(1.0, 1.0).is_ok());
        assert_eq!(f.observation_count(), 1);
    }

    #[test]
    fn unvalidated_filter_accepts_inverted_bar() {
        let mut f = SnrPulse::new(scenario_config()).unwrap();

        assert!(f.update(5.0, 10.0).is_ok());
        assert_eq!(f.observation_count(), 1);
    }

    #[test]
    fn flat_bar_leaves_smoothing_state_untouched() {
        let mut f = SnrPulse::new(scenario_config()).unwrap();
        for (h, l) in wavy_bars(40) {
            f.update(h, l).unwrap();
        }
        assert!(f.has_output());

        let (value, range, amplitude) = (f.value(), f.current_range(), f.current_amplitude());
        f.update(103.0, 103.0).unwrap();

        assert_eq!(f.value(), value);
        assert_eq!(f.current_range(), range);
        assert_eq!(f.current_amplitude(), amplitude);
    }

    #[test]
    fn reset_matches_fresh_instance() {
        let cfg = scenario_config();
        let mut f = SnrPulse::new(cfg).unwrap();
        for (h, l) in wavy_bars(50) {
            f.update(h, l).unwrap();
        }

        f.reset();

        assert_eq!(f, SnrPulse::new(cfg).unwrap());
        assert_eq!(f.config(), &cfg);
        assert!(!f.is_initialized());
        assert_eq!(f.value(), 0.0);
    }

    #[test]
    fn tracks_reference_recursion() {
        let cfg = SnrConfig::new(10, 1e-5, 1e-3, false);
        let bars = wavy_bars(120);
        let expected = reference_values(cfg, &bars);

        let mut f = SnrPulse::new(cfg).unwrap();
        for (i, &(h, l)) in bars.iter().enumerate() {
            f.update(h, l).unwrap();
            let (has_output, value) = expected[i];

            assert_eq!(f.has_output(), has_output, "bar {i}");
            assert!(
                (f.value() - value).abs() <= 1e-12 * value.abs().max(1.0),
                "bar {i}: {} vs {}",
                f.value(),
                value
            );
        }
        assert!(f.has_output());
    }

    /// Unit-range bars, then an inverted bar whose range smooths to exactly
    /// zero: 0.2 * -4 + 0.8 * 1.
    fn zero_range_bars(unit: usize) -> Vec<(f64, f64)> {
        let mut bars = vec![(101.0, 100.0); unit];
        bars.push((98.0, 102.0));
        bars
    }

    fn unfloored_config() -> SnrConfig {
        SnrConfig::new(5, 0.0, 1e-3, false)
    }

    #[test]
    fn zero_range_before_first_output_publishes_nothing() {
        let cfg = unfloored_config();
        let bars = zero_range_bars(8);
        let mut f = SnrPulse::new(cfg).unwrap();

        for &(h, l) in &bars {
            f.update(h, l).unwrap();
        }

        // the ninth bar would have been the first output
        assert_eq!(f.current_range(), 0.0);
        assert!(!f.has_output());
        assert_eq!(f.value(), 0.0);
        assert_eq!(reference_values(cfg, &bars).last(), Some(&(false, 0.0)));
    }

    #[test]
    fn zero_range_after_output_keeps_published_value() {
        let cfg = unfloored_config();
        let bars = zero_range_bars(20);
        let mut f = SnrPulse::new(cfg).unwrap();
        for &(h, l) in &bars[..20] {
            f.update(h, l).unwrap();
        }
        assert!(f.has_output());
        let value = f.value();

        f.update(98.0, 102.0).unwrap();

        assert_eq!(f.current_range(), 0.0);
        assert_eq!(f.value(), value);

        let (has_output, expected) = reference_values(cfg, &bars)[20];
        assert!(has_output);
        assert!((expected - value).abs() < 1e-12, "{expected} vs {value}");
    }

    #[test]
    fn tracks_reference_through_zero_range() {
        let cfg = unfloored_config();
        let mut bars = wavy_bars(30);
        // negative smoothed range, clamped to zero by the 0.0 floor
        bars.push((90.0, 110.0));
        bars.extend(wavy_bars(30));
        let expected = reference_values(cfg, &bars);

        let mut f = SnrPulse::new(cfg).unwrap();
        for (i, &(h, l)) in bars.iter().enumerate() {
            f.update(h, l).unwrap();
            if i == 30 {
                assert_eq!(f.current_range(), 0.0);
            }
            let (has_output, value) = expected[i];

            assert_eq!(f.has_output(), has_output, "bar {i}");
            assert!(
                (f.value() - value).abs() <= 1e-12 * value.abs().max(1.0),
                "bar {i}: {} vs {}",
                f.value(),
                value
            );
        }
    }

    #[test]
    fn zero_amplitude_floor_publishes_negative_infinity() {
        let mut f = SnrPulse::new(SnrConfig::new(5, 1e-5, 0.0, false)).unwrap();

        // flat midpoints leave every de-trended sample, and so the amplitude, at zero
        for _ in 0..9 {
            f.update(101.0, 100.0).unwrap();
        }

        assert!(f.has_output());
        assert_eq!(f.current_amplitude(), 0.0);
        assert_eq!(f.value(), f64::NEG_INFINITY);

        f.update(101.0, 100.0).unwrap();
        assert_eq!(f.value(), f64::NEG_INFINITY);
    }

    #[test]
    fn short_period_never_publishes() {
        let mut f = SnrPulse::new(SnrConfig::new(4, 1e-5, 1e-3, false)).unwrap();
        for (h, l) in wavy_bars(60) {
            f.update(h, l).unwrap();
        }

        assert!(f.is_initialized());
        assert!(!f.has_output());
        assert_eq!(f.value(), 0.0);
    }

    #[test]
    fn evaluate_reports_validity_and_timestamp() {
        let mut f = SnrPulse::new(scenario_config()).unwrap();

        let results: Vec<SnrPulseResult> = (0..11u64)
            .map(|ts| {
                f.evaluate(BarInput {
                    ts_ms: ts * 60_000,
                    high: 101.0,
                    low: 100.0,
                })
                .unwrap()
            })
            .collect();

        assert!(results[..10].iter().all(|r| r.validity == PulseValidity::Invalid));
        let last = results[10];
        assert_eq!(last.ts_ms, 600_000);
        assert!(last.initialized);
        assert_eq!(last.validity(), PulseValidity::Valid);
        assert_eq!(last.value, f.value());
    }

    #[test]
    fn evaluate_propagates_rejection() {
        let cfg = SnrConfig {
            validate_inputs: true,
            ..scenario_config()
        };
        let mut f = SnrPulse::new(cfg).unwrap();

        let res = f.evaluate(BarInput {
            ts_ms: 1,
            high: 5.0,
            low: 10.0,
        });

        assert!(matches!(res, Err(SnrError::InvalidInput { .. })));
    }
}
