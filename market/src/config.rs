use serde::{Deserialize, Serialize};

use crate::error::SnrError;

pub const DEFAULT_PERIOD: usize = 7;
pub const DEFAULT_RANGE_FLOOR: f64 = 1e-5;
pub const DEFAULT_AMPLITUDE_FLOOR: f64 = 1e-3;

/// Parameters of one SNR filter. Immutable once the filter is built.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnrConfig {
    /// Capacity of every history window, and the warm-up length in bars.
    ///
    /// The filter needs five de-trended samples before the Hilbert stage can
    /// run, so a period below 5 never produces a value.
    pub period: usize,

    /// Lower bound on the smoothed bar range.
    ///
    /// Keeps the SNR denominator away from zero on quiet markets.
    pub range_floor: f64,

    /// Lower bound on the smoothed amplitude.
    ///
    /// IMPORTANT:
    /// - `0.0` is accepted, but a run of exactly-zero amplitude then takes
    ///   `log10(0)` and the published value becomes `-inf`
    /// - the caller owns that risk; the default keeps it unreachable
    pub amplitude_floor: f64,

    /// Check `high > 0`, `low > 0`, `high >= low` on every update.
    pub validate_inputs: bool,
}

impl Default for SnrConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            range_floor: DEFAULT_RANGE_FLOOR,
            amplitude_floor: DEFAULT_AMPLITUDE_FLOOR,
            validate_inputs: false,
        }
    }
}

impl SnrConfig {
    pub fn new(period: usize, range_floor: f64, amplitude_floor: f64, validate_inputs: bool) -> Self {
        Self {
            period,
            range_floor,
            amplitude_floor,
            validate_inputs,
        }
    }

    /// Construction-time checks. Floors that are NaN fail the `>= 0` test.
    pub fn validate(&self) -> Result<(), SnrError> {
        if self.period == 0 {
            return Err(SnrError::InvalidConfig("period must be > 0".into()));
        }
        if !(self.range_floor >= 0.0) {
            return Err(SnrError::InvalidConfig(format!(
                "range_floor must be >= 0, got {}",
                self.range_floor
            )));
        }
        if !(self.amplitude_floor >= 0.0) {
            return Err(SnrError::InvalidConfig(format!(
                "amplitude_floor must be >= 0, got {}",
                self.amplitude_floor
            )));
        }
        Ok(())
    }

    /// Read `SNR_PERIOD`, `SNR_RANGE_FLOOR`, `SNR_AMPLITUDE_FLOOR` and
    /// `SNR_VALIDATE_INPUTS`, falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self, SnrError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, SnrError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let cfg = Self {
            period: parse_or("SNR_PERIOD", &lookup, defaults.period)?,
            range_floor: parse_or("SNR_RANGE_FLOOR", &lookup, defaults.range_floor)?,
            amplitude_floor: parse_or("SNR_AMPLITUDE_FLOOR", &lookup, defaults.amplitude_floor)?,
            validate_inputs: parse_or("SNR_VALIDATE_INPUTS", &lookup, defaults.validate_inputs)?,
        };

        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T, SnrError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| SnrError::InvalidConfig(format!("{key}={raw:?}: {e}"))),
    }
}
