//! Fixed-capacity circular bit buffer used to detect sustained cache-backend
//! failure without flapping on transient blips (C1).

use parking_lot::RwLock;

/// Internal state guarded by a single `RwLock`: readers (`is_condition_met`)
/// take a read lock, the sole writer (`add`) takes a write lock.
struct State {
    bits: Vec<bool>,
    cursor: usize,
    filled: usize,
    event_count: usize,
}

/// A circular bit buffer of size `window_size`. Each `add(bit)` overwrites
/// the oldest slot and advances the cursor. `is_condition_met` fires on
/// either a run of consecutive failures or a sustained failure rate.
pub struct BitRing {
    window_size: usize,
    consecutive_threshold: usize,
    rate_threshold: f64,
    state: RwLock<State>,
}

impl BitRing {
    /// Parameters are clamped per §4.1: `window_size >= 1`,
    /// `1 <= consecutive_threshold <= window_size`, `rate_threshold` in
    /// `[0, 1]`.
    pub fn new(window_size: usize, consecutive_threshold: usize, rate_threshold: f64) -> Self {
        let window_size = window_size.max(1);
        let consecutive_threshold = consecutive_threshold.clamp(1, window_size);
        let rate_threshold = rate_threshold.clamp(0.0, 1.0);

        Self {
            window_size,
            consecutive_threshold,
            rate_threshold,
            state: RwLock::new(State {
                bits: vec![false; window_size],
                cursor: 0,
                filled: 0,
                event_count: 0,
            }),
        }
    }

    pub fn add(&self, bit: bool) {
        let mut state = self.state.write();
        let cursor = state.cursor;
        let previous = state.bits[cursor];

        if previous != bit {
            if previous {
                state.event_count -= 1;
            } else {
                state.event_count += 1;
            }
        }

        state.bits[cursor] = bit;
        state.cursor = (cursor + 1) % self.window_size;
        state.filled = (state.filled + 1).min(self.window_size);
    }

    pub fn is_condition_met(&self) -> bool {
        let state = self.state.read();

        if self.consecutive_run_met(&state) {
            return true;
        }

        let min_fill = self.consecutive_threshold.max(self.window_size / 2);
        if state.filled >= min_fill {
            let rate = state.event_count as f64 / self.window_size as f64;
            if rate > self.rate_threshold {
                return true;
            }
        }

        false
    }

    fn consecutive_run_met(&self, state: &State) -> bool {
        if state.filled < self.consecutive_threshold {
            return false;
        }

        for i in 0..self.consecutive_threshold {
            let idx = (state.cursor + self.window_size - 1 - i) % self.window_size;
            if !state.bits[idx] {
                return false;
            }
        }
        true
    }

    pub fn reset(&self) {
        let mut state = self.state.write();
        state.bits.iter_mut().for_each(|b| *b = false);
        state.cursor = 0;
        state.filled = 0;
        state.event_count = 0;
    }

    pub fn event_count(&self) -> usize {
        self.state.read().event_count
    }
}
