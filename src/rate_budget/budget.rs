//! Multi-window rate budget.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Mutex as TokioMutex;
use tokio::time::Instant;

use super::headers::ServerThrottleState;
use super::window::{RateWindow, WindowState};

/// Shortest sleep between budget checks, so a zero-length deficit can't spin.
const MIN_POLL: Duration = Duration::from_millis(1);

struct BudgetState {
    windows: Vec<WindowState>,
    hold_until: Option<Instant>,
}

/// Tracks consumption against a set of [`RateWindow`]s.
///
/// A unit is granted only when every window admits it, and then one token is
/// taken from each window at once.
///
/// # Concurrency
///
/// Token state sits behind a synchronous mutex that is held only for the
/// refill/decide/decrement step. Blocking callers queue on a separate async
/// turnstile, which is FIFO, so waiters are served in arrival order and the
/// sleeping waiter never holds the token lock.
pub struct RateBudget {
    windows: Vec<RateWindow>,
    state: Mutex<BudgetState>,
    turnstile: TokioMutex<()>,
}

impl RateBudget {
    /// Creates a budget with every window full.
    pub fn new(windows: Vec<RateWindow>) -> Self {
        let now = Instant::now();
        let states = windows.iter().map(|w| WindowState::full(w, now)).collect();
        RateBudget {
            windows,
            state: Mutex::new(BudgetState {
                windows: states,
                hold_until: None,
            }),
            turnstile: TokioMutex::new(()),
        }
    }

    pub fn windows(&self) -> &[RateWindow] {
        &self.windows
    }

    /// Takes a unit if one is available right now.
    ///
    /// Returns `false` without waiting when any window is exhausted or a
    /// blocking caller is already queued.
    pub fn try_acquire(&self) -> bool {
        let Ok(_turn) = self.turnstile.try_lock() else {
            return false;
        };
        self.try_acquire_at(Instant::now()).is_ok()
    }

    /// Waits until every window admits a unit, then takes it.
    ///
    /// Returns how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        let _turn = self.turnstile.lock().await;
        loop {
            match self.try_acquire_at(Instant::now()) {
                Ok(()) => return started.elapsed(),
                Err(wait) => {
                    log::trace!("Rate budget exhausted, sleeping {:?}", wait);
                    tokio::time::sleep(wait.max(MIN_POLL)).await;
                }
            }
        }
    }

    /// Grants a unit at `now`, or returns how long until one could be granted.
    ///
    /// The wait is the largest deficit across windows, since all of them have
    /// to admit the unit.
    pub(crate) fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        let mut state = self.lock_state();

        if let Some(until) = state.hold_until {
            if until > now {
                return Err(until - now);
            }
            state.hold_until = None;
        }

        let wait = self
            .windows
            .iter()
            .zip(state.windows.iter_mut())
            .map(|(window, tokens)| tokens.wait_at(window, now))
            .max()
            .unwrap_or(Duration::ZERO);
        if !wait.is_zero() {
            return Err(wait);
        }

        for tokens in state.windows.iter_mut() {
            tokens.consume(now);
        }
        Ok(())
    }

    /// Available whole tokens per window, in configuration order.
    pub fn available(&self) -> Vec<u32> {
        let now = Instant::now();
        let mut state = self.lock_state();
        self.windows
            .iter()
            .zip(state.windows.iter_mut())
            .map(|(window, tokens)| {
                tokens.refill(window, now);
                tokens.available()
            })
            .collect()
    }

    /// Blocks every grant for `duration` from now.
    ///
    /// An existing longer hold is kept.
    pub fn hold_for(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut state = self.lock_state();
        state.hold_until = Some(match state.hold_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    /// Remaining time on a budget-wide hold, if any.
    pub fn hold_remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        self.lock_state()
            .hold_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Lowers local tokens to what the server says is left.
    ///
    /// Only windows whose whole-second duration matches a reported window are
    /// touched, and tokens are never raised.
    pub fn reconcile(&self, server: &ServerThrottleState) {
        let now = Instant::now();
        let mut state = self.lock_state();
        for (window, tokens) in self.windows.iter().zip(state.windows.iter_mut()) {
            if window.duration().subsec_nanos() != 0 {
                continue;
            }
            if let Some(observed) = server.get(window.duration().as_secs()) {
                tokens.refill(window, now);
                let before = tokens.available();
                tokens.cap_available(observed.remaining());
                if tokens.available() < before {
                    log::debug!(
                        "Server reports {}/{} used for {}s window; local tokens {} -> {}",
                        observed.used,
                        observed.limit,
                        window.duration().as_secs(),
                        before,
                        tokens.available()
                    );
                }
            }
        }
    }

    /// Minimum wall-clock time to grant `units` starting from a full budget.
    pub fn min_duration_for(&self, units: u64) -> Duration {
        if units == 0 {
            return Duration::ZERO;
        }
        self.windows
            .iter()
            .map(|window| {
                let full_windows = units.div_ceil(u64::from(window.capacity())) - 1;
                window
                    .duration()
                    .saturating_mul(u32::try_from(full_windows).unwrap_or(u32::MAX))
            })
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BudgetState> {
        // A poisoned lock still holds whole-token state
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
