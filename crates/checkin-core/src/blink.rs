//! Debounced blink counting from a stream of eye aspect ratio samples.
//!
//! Eyes count as closed while the mean EAR is below [`BLINK_EAR_THRESHOLD`].
//! A blink is registered on the closed → open edge, provided at least
//! [`BLINK_REFRACTORY_MS`] have passed since the previous counted blink.
//! The count saturates at the profile's required number of blinks.

use serde::Serialize;

/// EAR below which the eyes are treated as closed.
pub const BLINK_EAR_THRESHOLD: f32 = 0.27;

/// Minimum spacing between two counted blinks.
pub const BLINK_REFRACTORY_MS: u64 = 600;

/// Hysteresis state of the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlinkState {
    pub is_closed: bool,
    pub blink_count: u32,
    pub last_blink_at: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct BlinkDebouncer {
    state: BlinkState,
    required: u32,
}

impl BlinkDebouncer {
    pub fn new(required: u32) -> Self {
        Self {
            state: BlinkState {
                is_closed: false,
                blink_count: 0,
                last_blink_at: None,
            },
            required,
        }
    }

    /// Feed one EAR sample taken at `now_ms`. Returns true if a blink was counted.
    pub fn update(&mut self, avg_ear: f32, now_ms: u64) -> bool {
        let eyes_closed = avg_ear < BLINK_EAR_THRESHOLD;

        if !self.state.is_closed && eyes_closed {
            self.state.is_closed = true;
            return false;
        }

        if self.state.is_closed && !eyes_closed {
            self.state.is_closed = false;
            let outside_refractory = match self.state.last_blink_at {
                Some(last) => now_ms.saturating_sub(last) > BLINK_REFRACTORY_MS,
                None => true,
            };
            if outside_refractory && self.state.blink_count < self.required {
                self.state.blink_count += 1;
                self.state.last_blink_at = Some(now_ms);
                tracing::debug!(
                    count = self.state.blink_count,
                    required = self.required,
                    "blink counted"
                );
                return true;
            }
        }
        false
    }

    /// Drop all partial progress.
    ///
    /// The refractory timestamp survives so a reset cannot be used to
    /// count two blinks closer than the refractory window.
    pub fn reset(&mut self) {
        self.state.is_closed = false;
        self.state.blink_count = 0;
    }

    pub fn count(&self) -> u32 {
        self.state.blink_count
    }

    pub fn required(&self) -> u32 {
        self.required
    }

    pub fn has_blinked(&self) -> bool {
        self.state.blink_count >= self.required
    }

    pub fn remaining(&self) -> u32 {
        self.required.saturating_sub(self.state.blink_count)
    }

    pub fn state(&self) -> BlinkState {
        self.state
    }
}
