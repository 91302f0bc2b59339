use crate::store::FrameKey;

/// Debounce countdown. `Closed` means no episode is in flight; `Open` holds
/// the number of quiet polls left before the episode is considered settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Closed,
    Open { remaining: u32 },
}

/// What a quiet poll did to the open episode, if any.
#[derive(Debug, PartialEq, Eq)]
pub enum QuietOutcome {
    /// No episode in flight.
    Idle,
    /// The episode stays open with this many quiet polls left.
    Held { remaining: u32 },
    /// The episode settled. Carries the captured frames in order; the
    /// tracker is reset to closed/empty.
    Settled { frames: Vec<FrameKey> },
}

/// The one mutable piece of loop state: the countdown plus the frames
/// captured since the episode opened. A burst of motion resets the countdown
/// on every trigger, so the whole burst settles into a single episode.
pub struct EpisodeTracker {
    state: DebounceState,
    retention_ticks: u32,
    frames: Vec<FrameKey>,
}

impl EpisodeTracker {
    pub fn new(retention_ticks: u32) -> Self {
        Self {
            state: DebounceState::Closed,
            retention_ticks,
            frames: Vec::new(),
        }
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// A change was detected: open (or re-arm) the episode and append the
    /// saved frame. The countdown resets rather than accumulates: retention
    /// counts from the last trigger.
    pub fn record_change(&mut self, key: FrameKey) {
        self.state = DebounceState::Open {
            remaining: self.retention_ticks,
        };
        self.frames.push(key);
    }

    /// A quiet poll: tick the countdown if an episode is open.
    pub fn record_quiet(&mut self) -> QuietOutcome {
        match self.state {
            DebounceState::Closed => QuietOutcome::Idle,
            DebounceState::Open { remaining } => {
                let remaining = remaining - 1;
                if remaining == 0 {
                    self.state = DebounceState::Closed;
                    QuietOutcome::Settled {
                        frames: std::mem::take(&mut self.frames),
                    }
                } else {
                    self.state = DebounceState::Open { remaining };
                    QuietOutcome::Held { remaining }
                }
            }
        }
    }
}
