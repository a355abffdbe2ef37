use crate::config::CircuitBreakerConfig;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;

/// Breaker position. `Open` blocks all traffic; `HalfOpen` lets one probe
/// through and closes on its success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BreakerState::Closed => "CLOSED",
            BreakerState::Open => "OPEN",
            BreakerState::HalfOpen => "HALF_OPEN",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug)]
struct State {
    state: BreakerState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

/// Process-wide circuit breaker.
///
/// Owned by the rate limiter; admission checks and the success/failure
/// recording hooks are the only mutation paths. Recovery is evaluated
/// lazily: an `Open` breaker becomes `HalfOpen` on the first gate check
/// after `recovery_time` has elapsed.
pub struct CircuitBreaker {
    cfg: Mutex<CircuitBreakerConfig>,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg: Mutex::new(cfg),
            state: Mutex::new(State {
                state: BreakerState::Closed,
                failure_count: 0,
                opened_at: None,
            }),
        }
    }

    /// Gate an admission check. `Err(retry_after_secs)` means the breaker is
    /// open and the caller must not consult rule windows or record anything.
    pub fn gate(&self) -> Result<(), u64> {
        let cfg = self.cfg.lock().unwrap().clone();
        if !cfg.enabled {
            return Ok(());
        }
        let mut st = self.state.lock().unwrap();
        if st.state != BreakerState::Open {
            return Ok(());
        }
        let elapsed = st.opened_at.map(|at| at.elapsed()).unwrap_or_default();
        if elapsed >= cfg.recovery_time {
            st.state = BreakerState::HalfOpen;
            st.failure_count = 0;
            st.opened_at = None;
            tracing::info!("circuit breaker HALF_OPEN, probing recovery");
            return Ok(());
        }
        Err(cfg.recovery_time.as_secs())
    }

    /// Called when an admission check passes all rules. An admitted request
    /// under `HalfOpen` closes the breaker.
    pub fn on_admitted(&self) {
        let mut st = self.state.lock().unwrap();
        if st.state == BreakerState::HalfOpen {
            st.state = BreakerState::Closed;
            st.failure_count = 0;
            st.opened_at = None;
            tracing::info!("circuit breaker CLOSED");
        }
    }

    /// Called when the burst rule trips. Enough trips open the breaker.
    pub fn on_burst_trip(&self) {
        let cfg = self.cfg.lock().unwrap().clone();
        if !cfg.enabled {
            return;
        }
        let mut st = self.state.lock().unwrap();
        st.failure_count = st.failure_count.saturating_add(1);
        if st.state != BreakerState::Open && st.failure_count >= cfg.failure_threshold {
            Self::open(&mut st);
        }
    }

    /// External success report. Closes a half-open breaker; otherwise decays
    /// the failure count toward zero.
    pub fn record_success(&self) {
        let mut st = self.state.lock().unwrap();
        if st.state == BreakerState::HalfOpen {
            st.state = BreakerState::Closed;
            st.failure_count = 0;
            st.opened_at = None;
            tracing::info!("circuit breaker CLOSED");
        } else {
            st.failure_count = st.failure_count.saturating_sub(1);
        }
    }

    /// External failure report. Re-opens a half-open breaker immediately;
    /// under `Closed`, opens once the threshold is reached.
    pub fn record_failure(&self) {
        let cfg = self.cfg.lock().unwrap().clone();
        if !cfg.enabled {
            return;
        }
        let mut st = self.state.lock().unwrap();
        st.failure_count = st.failure_count.saturating_add(1);
        match st.state {
            BreakerState::HalfOpen => Self::open(&mut st),
            BreakerState::Closed if st.failure_count >= cfg.failure_threshold => {
                Self::open(&mut st)
            }
            _ => {}
        }
    }

    pub fn reset(&self) {
        let mut st = self.state.lock().unwrap();
        st.state = BreakerState::Closed;
        st.failure_count = 0;
        st.opened_at = None;
    }

    pub fn set_config(&self, cfg: CircuitBreakerConfig) {
        *self.cfg.lock().unwrap() = cfg;
    }

    /// Read-only view. Reports the effective state: an `Open` breaker whose
    /// cool-down has elapsed is shown as `HalfOpen` even before the next
    /// gate check commits the transition.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let cfg = self.cfg.lock().unwrap().clone();
        let st = self.state.lock().unwrap();
        let elapsed = st.opened_at.map(|at| at.elapsed());
        let (state, open_remaining_ms) = match (st.state, elapsed) {
            (BreakerState::Open, Some(e)) if e >= cfg.recovery_time => {
                (BreakerState::HalfOpen, None)
            }
            (BreakerState::Open, Some(e)) => (
                BreakerState::Open,
                Some((cfg.recovery_time - e).as_millis() as u64),
            ),
            (s, _) => (s, None),
        };
        BreakerSnapshot {
            state,
            failure_count: st.failure_count,
            open_remaining_ms,
        }
    }

    fn open(st: &mut State) {
        st.state = BreakerState::Open;
        st.opened_at = Some(Instant::now());
        tracing::warn!("circuit breaker OPEN, blocking requests");
    }
}
