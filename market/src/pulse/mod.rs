pub mod hilbert;
pub mod input;
pub mod snr;
pub mod warmup;

pub use input::BarInput;
pub use snr::{SnrPulse, SnrPulseResult};
pub use warmup::WarmupState;

/// Validity marker for pulse output.
///
/// Invalid results are warm-up placeholders and must not be acted upon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PulseValidity {
    #[default]
    Invalid,

    Valid,
}

/// Trait implemented by all pulse result types.
pub trait PulseResult {
    fn validity(&self) -> PulseValidity;
}

/// Core Pulse trait.
///
/// A pulse:
/// - owns internal state
/// - consumes exactly one input tick, in order
/// - produces a result, or rejects the tick without touching its state
pub trait Pulse {
    /// Input type consumed per tick
    type Input;

    /// Output type produced per tick
    type Output: PulseResult;

    /// Rejection reason for a tick
    type Error;

    fn evaluate(&mut self, input: Self::Input) -> Result<Self::Output, Self::Error>;
}
