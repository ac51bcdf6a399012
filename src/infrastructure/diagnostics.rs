//! Periodic status reporting: application state, uptime, and a per-role
//! snapshot, emitted on its own wall-clock period.

use crate::domain::models::{AppState, Role};
use crate::infrastructure::ble::ConnectionSupervisor;
use std::time::{Duration, Instant};
use tracing::info;

pub struct StatusReporter {
    period: Duration,
    started: Instant,
    last_report: Option<Instant>,
}

impl StatusReporter {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            started: Instant::now(),
            last_report: None,
        }
    }

    /// Emit a report if the period has elapsed; otherwise do nothing.
    pub fn maybe_report(&mut self, state: AppState, supervisor: &ConnectionSupervisor) {
        let now = Instant::now();
        if let Some(last) = self.last_report {
            if now.duration_since(last) < self.period {
                return;
            }
        }
        self.last_report = Some(now);

        info!(
            target: "status",
            %state,
            uptime_secs = self.started.elapsed().as_secs(),
            "bridge status"
        );
        for role in Role::ALL {
            let snapshot = supervisor.snapshot(role);
            info!(
                target: "status",
                %role,
                found = snapshot.found,
                connected = snapshot.connected,
                name = %snapshot.record.name,
                address = %snapshot.record.address,
                rssi = snapshot.record.rssi,
                "link status"
            );
        }
    }
}
