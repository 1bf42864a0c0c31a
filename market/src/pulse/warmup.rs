/// Warm-up progress of a streaming filter.
///
/// States only move forward (`Filling -> Initialized -> HasOutput`); the only
/// way back is [`WarmupState::reset`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WarmupState {
    /// History window not yet full. Updates only record the sample.
    #[default]
    Filling,

    /// Window full; the transform runs but no value has been published.
    Initialized,

    /// At least one value has been published.
    HasOutput,
}

impl WarmupState {
    pub fn is_initialized(self) -> bool {
        !matches!(self, Self::Filling)
    }

    pub fn has_output(self) -> bool {
        matches!(self, Self::HasOutput)
    }

    /// `Filling -> Initialized`. No-op in any later state.
    pub fn mark_initialized(&mut self) {
        if *self == Self::Filling {
            *self = Self::Initialized;
        }
    }

    /// `Initialized -> HasOutput`.
    ///
    /// Returns `true` only on the call that performs the transition.
    pub fn mark_output(&mut self) -> bool {
        debug_assert!(self.is_initialized(), "output published while filling");
        if *self == Self::Initialized {
            *self = Self::HasOutput;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        *self = Self::Filling;
    }
}
