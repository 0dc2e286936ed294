use std::sync::atomic::{AtomicU8, Ordering};

/// Relay lifecycle. `Listening` is terminal; shutdown is external.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Unstarted,
    Subscribing,
    Listening,
}

impl RelayState {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayState::Unstarted => "unstarted",
            RelayState::Subscribing => "subscribing",
            RelayState::Listening => "listening",
        }
    }
}

/// Lock-free cell holding the current `RelayState`.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl Default for StateCell {
    fn default() -> Self {
        Self(AtomicU8::new(0))
    }
}

impl StateCell {
    pub fn get(&self) -> RelayState {
        match self.0.load(Ordering::Acquire) {
            0 => RelayState::Unstarted,
            1 => RelayState::Subscribing,
            _ => RelayState::Listening,
        }
    }

    pub(crate) fn set(&self, s: RelayState) {
        let v = match s {
            RelayState::Unstarted => 0,
            RelayState::Subscribing => 1,
            RelayState::Listening => 2,
        };
        self.0.store(v, Ordering::Release);
    }
}
