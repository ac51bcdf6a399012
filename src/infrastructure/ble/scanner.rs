//! Device discovery.
//!
//! Runs a time-bounded scan, classifies every advertisement against the
//! two role matching rules, and records at most one device per role per
//! scan cycle. Advertisement callbacks arrive on the transport's
//! execution context, so the scan state lives behind a mutex.

use crate::domain::models::{DeviceRecord, Role};
use crate::infrastructure::ble::transport::{
    ScanEvent, ScanHandler, ScanParams, Transport, TransportError,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// How advertisements are matched to roles: the controller matches by
/// case-sensitive name prefix, the hub by case-sensitive substring.
#[derive(Debug, Clone)]
pub struct MatchRules {
    pub controller_prefix: String,
    pub hub_fragment: String,
}

#[derive(Debug, Default)]
struct ScanShared {
    controller: DeviceRecord,
    hub: DeviceRecord,
    scanning: bool,
}

impl ScanShared {
    fn record(&self, role: Role) -> &DeviceRecord {
        match role {
            Role::Controller => &self.controller,
            Role::Hub => &self.hub,
        }
    }
}

/// Scans for the two target peripherals and holds their device records.
pub struct DiscoveryScanner {
    transport: Arc<dyn Transport>,
    rules: MatchRules,
    params: ScanParams,
    shared: Arc<Mutex<ScanShared>>,
}

impl DiscoveryScanner {
    pub fn new(transport: Arc<dyn Transport>, rules: MatchRules, params: ScanParams) -> Self {
        Self {
            transport,
            rules,
            params,
            shared: Arc::new(Mutex::new(ScanShared::default())),
        }
    }

    /// Start a scan cycle. Both device records are forgotten first; any
    /// previously discovered role must be rediscovered. Fails (reported,
    /// not fatal) when the transport is not initialized.
    pub fn start(&mut self) -> Result<(), TransportError> {
        {
            let mut shared = lock(&self.shared);
            shared.controller.reset();
            shared.hub.reset();
            shared.scanning = true;
        }

        info!(
            controller_prefix = %self.rules.controller_prefix,
            hub_fragment = %self.rules.hub_fragment,
            duration_ms = self.params.duration.as_millis() as u64,
            "starting discovery scan"
        );

        match self.transport.start_scan(self.params, self.event_handler()) {
            Ok(()) => Ok(()),
            Err(err) => {
                lock(&self.shared).scanning = false;
                warn!("scan did not start: {err}");
                Err(err)
            }
        }
    }

    /// Force early termination. Safe to call when no scan is running.
    pub fn stop(&mut self) {
        let was_scanning = {
            let mut shared = lock(&self.shared);
            std::mem::replace(&mut shared.scanning, false)
        };
        if was_scanning {
            info!("stopping scan");
            self.transport.stop_scan();
        }
    }

    /// Whether a scan cycle is in progress. Tracks only the scan's own
    /// lifecycle, independent of what was found.
    pub fn is_scanning(&self) -> bool {
        lock(&self.shared).scanning
    }

    pub fn found(&self, role: Role) -> bool {
        lock(&self.shared).record(role).found
    }

    pub fn found_both(&self) -> bool {
        let shared = lock(&self.shared);
        shared.controller.found && shared.hub.found
    }

    /// Value-copy of a role's device record.
    pub fn device_info(&self, role: Role) -> DeviceRecord {
        lock(&self.shared).record(role).clone()
    }

    /// Build the event closure handed to the transport. Invoked on the
    /// transport's execution context; must not block.
    pub(crate) fn event_handler(&self) -> ScanHandler {
        let shared = Arc::clone(&self.shared);
        let transport = Arc::clone(&self.transport);
        let rules = self.rules.clone();

        Arc::new(move |event| match event {
            ScanEvent::Advertisement(adv) => {
                let completed_pair = {
                    let mut guard = lock(&shared);
                    let had_both = guard.controller.found && guard.hub.found;

                    if !guard.controller.found && adv.name.starts_with(&rules.controller_prefix) {
                        info!(name = %adv.name, address = %adv.address, rssi = adv.rssi,
                            "found controller");
                        guard.controller = found_record(&adv);
                    }
                    if !guard.hub.found && adv.name.contains(&rules.hub_fragment) {
                        info!(name = %adv.name, address = %adv.address, rssi = adv.rssi,
                            "found hub");
                        guard.hub = found_record(&adv);
                    }

                    !had_both && guard.controller.found && guard.hub.found
                };

                if completed_pair {
                    info!("both devices found, ending scan early");
                    transport.stop_scan();
                }
            }
            ScanEvent::Complete => {
                let mut guard = lock(&shared);
                if guard.scanning {
                    guard.scanning = false;
                    info!(
                        controller_found = guard.controller.found,
                        hub_found = guard.hub.found,
                        "scan complete"
                    );
                }
            }
        })
    }
}

fn found_record(adv: &crate::infrastructure::ble::transport::Advertisement) -> DeviceRecord {
    DeviceRecord {
        name: adv.name.clone(),
        address: adv.address,
        rssi: adv.rssi,
        found: true,
    }
}

fn lock(shared: &Mutex<ScanShared>) -> MutexGuard<'_, ScanShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DeviceAddress;
    use crate::infrastructure::ble::sim::SimTransport;
    use crate::infrastructure::ble::transport::Advertisement;
    use std::time::Duration;

    fn scanner(transport: Arc<SimTransport>) -> DiscoveryScanner {
        DiscoveryScanner::new(
            transport,
            MatchRules {
                controller_prefix: "Xbox".to_string(),
                hub_fragment: "Technic Move".to_string(),
            },
            ScanParams {
                duration: Duration::from_secs(10),
                interval: 0x80,
                window: 0x30,
            },
        )
    }

    fn adv(name: &str, octet: u8, rssi: i16) -> ScanEvent {
        ScanEvent::Advertisement(Advertisement {
            name: name.to_string(),
            address: DeviceAddress::new([octet, 0, 0, 0, 0, 1]),
            rssi,
        })
    }

    #[test]
    fn first_match_wins_per_role() {
        let scanner = scanner(Arc::new(SimTransport::new()));
        let handler = scanner.event_handler();

        handler(adv("Xbox Wireless Controller", 1, -50));
        handler(adv("Xbox Elite Controller", 2, -40));

        let record = scanner.device_info(Role::Controller);
        assert_eq!(record.name, "Xbox Wireless Controller");
        assert_eq!(record.rssi, -50);
        assert_eq!(record.address, DeviceAddress::new([1, 0, 0, 0, 0, 1]));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let scanner = scanner(Arc::new(SimTransport::new()));
        let handler = scanner.event_handler();

        handler(adv("xbox wireless controller", 1, -50));
        handler(adv("TECHNIC MOVE Hub", 2, -60));

        assert!(!scanner.found(Role::Controller));
        assert!(!scanner.found(Role::Hub));
    }

    #[test]
    fn hub_matches_by_substring() {
        let scanner = scanner(Arc::new(SimTransport::new()));
        let handler = scanner.event_handler();

        handler(adv("LEGO Technic Move Hub", 3, -62));

        assert!(scanner.found(Role::Hub));
        assert!(!scanner.found(Role::Controller));
    }

    #[test]
    fn early_stop_requested_once_when_pair_completes() {
        let transport = Arc::new(SimTransport::new());
        let scanner = scanner(Arc::clone(&transport));
        let handler = scanner.event_handler();

        handler(adv("Xbox Wireless Controller", 1, -50));
        assert_eq!(transport.stop_calls(), 0);
        handler(adv("Technic Move Hub", 2, -60));
        assert_eq!(transport.stop_calls(), 1);
        // Further advertisements for already-found roles change nothing.
        handler(adv("Xbox Wireless Controller", 9, -30));
        assert_eq!(transport.stop_calls(), 1);
        assert!(scanner.found_both());
    }

    #[test]
    fn completion_with_nothing_found_is_not_an_error() {
        let scanner = scanner(Arc::new(SimTransport::new()));
        let handler = scanner.event_handler();

        handler(adv("Some Other Gadget", 7, -80));
        handler(ScanEvent::Complete);

        assert!(!scanner.is_scanning());
        assert!(!scanner.found(Role::Controller));
        assert!(!scanner.found(Role::Hub));
    }

    #[test]
    fn start_fails_cleanly_when_transport_uninitialized() {
        let transport = Arc::new(SimTransport::new());
        let mut scanner = scanner(transport);
        let err = scanner.start().unwrap_err();
        assert_eq!(err, TransportError::NotInitialized);
        assert!(!scanner.is_scanning());
    }
}
