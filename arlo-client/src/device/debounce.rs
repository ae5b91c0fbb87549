use std::time::{Duration, SystemTime};

// This type defines a mini state machine that stretches momentary
// detection pulses into a held state. The service reports motion and
// doorbell presses as single events with no matching "stopped"
// event, so the client holds the triggered state for a configured
// window and re-arms the window on every repeat trigger. Release is
// reported exactly once, when the window lapses.

pub enum Debounce {
    Idle,
    Held { until: SystemTime },
}

impl Debounce {
    pub fn new() -> Self {
        Debounce::Idle
    }

    // Records a trigger at `now`. Returns `true` when this trigger
    // moved the state from idle to held; repeats while held only
    // push the release point out.

    pub fn trigger(&mut self, window: Duration, now: SystemTime) -> bool {
        let until = now + window;

        match self {
            Self::Idle => {
                *self = Self::Held { until };
                true
            }
            Self::Held { until: held } => {
                *held = until;
                false
            }
        }
    }

    // Checks whether the hold window has lapsed. Returns `true`
    // exactly once per hold, at which point the state is idle again.

    pub fn expire(&mut self, now: SystemTime) -> bool {
        match self {
            Self::Idle => false,
            Self::Held { until } => {
                if now >= *until {
                    *self = Self::Idle;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn is_held(&self) -> bool {
        matches!(self, Self::Held { .. })
    }
}

impl Default for Debounce {
    fn default() -> Self {
        Self::new()
    }
}
