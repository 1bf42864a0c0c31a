use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnrError {
    /// Construction-time parameter violation. No filter is produced.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Rejected bar. Raised before any state mutation.
    #[error("invalid input: high={high}, low={low} (need high > 0, low > 0, high >= low)")]
    InvalidInput { high: f64, low: f64 },
}
