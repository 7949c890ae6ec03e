//! Playback time tracking shared between the device callback and callers.
//!
//! The callback is the only writer. It takes the lock unconditionally exactly
//! once, on the first block of a session, and otherwise only ever tries it.
//! Callers query with a bounded wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// Start-time sentinel: no block has been played yet.
const UNSET: f64 = -1.0;

/// Position in the current session as seen by [`PlaybackClock::time_in_playback`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackTime {
    /// No session, or the first block hasn't reached the device yet.
    NotStarted,
    /// The time record was busy; try again.
    Contended,
    /// Seconds since the first block was played.
    Elapsed(f64),
}

impl PlaybackTime {
    /// Sentinel for [`PlaybackTime::NotStarted`].
    pub const NOT_STARTED_SECS: f64 = -2.0;
    /// Sentinel for [`PlaybackTime::Contended`].
    pub const CONTENDED_SECS: f64 = -3.0;

    /// Seconds, with the negative sentinels for the other states.
    pub const fn as_secs(self) -> f64 {
        match self {
            Self::NotStarted => Self::NOT_STARTED_SECS,
            Self::Contended => Self::CONTENDED_SECS,
            Self::Elapsed(secs) => secs,
        }
    }

    pub const fn elapsed(self) -> Option<f64> {
        match self {
            Self::Elapsed(secs) => Some(secs),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct TimeState {
    is_playing: bool,
    start_time: f64,
    current_time: f64,
}

/// Play state and position of one session.
#[derive(Debug)]
pub struct PlaybackClock {
    state: Mutex<TimeState>,
    /// Set without the lock when the callback ends playback, so a contended
    /// lock can't leave `is_playing` stale.
    halted: AtomicBool,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TimeState {
                is_playing: false,
                start_time: UNSET,
                current_time: UNSET,
            }),
            halted: AtomicBool::new(false),
        }
    }

    /// Mark the first block as played. Blocks for the lock.
    pub fn start(&self) {
        let mut state = self.state.lock();
        state.start_time = 0.0;
        state.current_time = 0.0;
        state.is_playing = true;
        self.halted.store(false, Ordering::Release);
    }

    /// Publish the position of the block being played, unless the lock is busy.
    pub fn try_advance(&self, current_time: f64) -> bool {
        let Some(mut state) = self.state.try_lock() else {
            return false;
        };
        state.current_time = current_time;
        state.is_playing = true;
        true
    }

    /// Playback ended (end of file, underrun, or a bad buffer size). Never blocks.
    pub fn mark_not_playing(&self) {
        self.halted.store(true, Ordering::Release);
        if let Some(mut state) = self.state.try_lock() {
            state.is_playing = false;
        }
    }

    /// Whether the callback has ended playback, without touching the lock.
    pub fn has_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Whether a block is currently being played. `false` if the lock
    /// can't be taken within `wait`.
    pub fn is_playing(&self, wait: Duration) -> bool {
        self.state
            .try_lock_for(wait)
            .is_some_and(|state| state.is_playing && !self.halted.load(Ordering::Acquire))
    }

    /// Seconds played so far, or why there's no answer.
    pub fn time_in_playback(&self, wait: Duration) -> PlaybackTime {
        let Some(state) = self.state.try_lock_for(wait) else {
            return PlaybackTime::Contended;
        };
        if state.start_time < 0.0 {
            return PlaybackTime::NotStarted;
        }
        PlaybackTime::Elapsed(state.current_time - state.start_time)
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}
