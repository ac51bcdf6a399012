//! Status indication.
//!
//! Consumes application state transitions and renders them as the board
//! LED would: slow blink while scanning, solid while connecting and
//! connected, fast blink on error.

use crate::domain::models::AppState;
use std::time::{Duration, Instant};
use tracing::{info, trace};

const SCAN_BLINK: Duration = Duration::from_millis(500);
const ERROR_BLINK: Duration = Duration::from_millis(100);

pub trait StatusIndicator: Send {
    /// Called with the current application state on every loop iteration.
    fn update(&mut self, state: AppState);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    Off,
    Solid,
    Blink(Duration),
}

fn pattern_for(state: AppState) -> Pattern {
    match state {
        AppState::Init => Pattern::Off,
        AppState::Scanning => Pattern::Blink(SCAN_BLINK),
        AppState::Connecting | AppState::Connected | AppState::Active => Pattern::Solid,
        AppState::Error => Pattern::Blink(ERROR_BLINK),
    }
}

/// Software rendition of the built-in LED. `refresh` coalesces pattern
/// re-evaluation so the per-iteration update stays cheap.
pub struct LedIndicator {
    refresh: Duration,
    last_state: Option<AppState>,
    last_eval: Option<Instant>,
    last_toggle: Instant,
    lit: bool,
}

impl LedIndicator {
    pub fn new(refresh: Duration) -> Self {
        Self {
            refresh,
            last_state: None,
            last_eval: None,
            last_toggle: Instant::now(),
            lit: false,
        }
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    fn set_lit(&mut self, lit: bool) {
        if self.lit != lit {
            self.lit = lit;
            trace!(lit, "indicator led");
        }
    }
}

impl StatusIndicator for LedIndicator {
    fn update(&mut self, state: AppState) {
        let state_changed = self.last_state != Some(state);
        if state_changed {
            info!(%state, "indicator");
            self.last_state = Some(state);
            self.last_toggle = Instant::now();
        } else if let Some(last) = self.last_eval {
            if last.elapsed() < self.refresh {
                return;
            }
        }
        self.last_eval = Some(Instant::now());

        match pattern_for(state) {
            Pattern::Off => self.set_lit(false),
            Pattern::Solid => self.set_lit(true),
            Pattern::Blink(period) => {
                if state_changed {
                    self.set_lit(true);
                } else if self.last_toggle.elapsed() >= period {
                    let lit = self.lit;
                    self.set_lit(!lit);
                    self.last_toggle = Instant::now();
                }
            }
        }
    }
}
