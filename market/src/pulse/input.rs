use crate::types::Bar;

/// Price-range pulse input (one bar).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BarInput {
    pub ts_ms: u64,
    pub high: f64,
    pub low: f64,
}

impl From<Bar> for BarInput {
    fn from(bar: Bar) -> Self {
        Self {
            ts_ms: bar.ts_ms,
            high: bar.high,
            low: bar.low,
        }
    }
}
