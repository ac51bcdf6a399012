//! Connection supervision for the two peripheral links.
//!
//! Owns the discovery scanner, both transport client handles, and both
//! per-role connection state machines. Connections are fully independent:
//! a failure on one role never touches the other. Disconnect notifications
//! arrive asynchronously from the transport and only mark state; the
//! reconnection policy lives in the application supervisor.

use crate::domain::models::{AtomicLinkState, DeviceRecord, LinkState, Role};
use crate::domain::settings::Settings;
use crate::error::BridgeError;
use crate::infrastructure::ble::scanner::{DiscoveryScanner, MatchRules};
use crate::infrastructure::ble::transport::{
    ScanParams, Transport, TransportClient, TransportError,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

struct RoleLink {
    client: Option<Box<dyn TransportClient>>,
    state: Arc<AtomicLinkState>,
}

impl RoleLink {
    fn new() -> Self {
        Self {
            client: None,
            state: Arc::new(AtomicLinkState::new(LinkState::Idle)),
        }
    }
}

/// Point-in-time view of one role, for diagnostics.
#[derive(Debug, Clone)]
pub struct RoleSnapshot {
    pub found: bool,
    pub connected: bool,
    pub record: DeviceRecord,
}

pub struct ConnectionSupervisor {
    transport: Arc<dyn Transport>,
    scanner: DiscoveryScanner,
    controller: RoleLink,
    hub: RoleLink,
}

impl ConnectionSupervisor {
    pub fn new(transport: Arc<dyn Transport>, settings: &Settings) -> Self {
        let rules = MatchRules {
            controller_prefix: settings.controller_name_prefix.clone(),
            hub_fragment: settings.hub_name_fragment.clone(),
        };
        let params = ScanParams {
            duration: Duration::from_millis(settings.scan_duration_ms),
            interval: settings.scan_interval,
            window: settings.scan_window,
        };
        Self {
            scanner: DiscoveryScanner::new(Arc::clone(&transport), rules, params),
            transport,
            controller: RoleLink::new(),
            hub: RoleLink::new(),
        }
    }

    fn link(&self, role: Role) -> &RoleLink {
        match role {
            Role::Controller => &self.controller,
            Role::Hub => &self.hub,
        }
    }

    fn link_mut(&mut self, role: Role) -> &mut RoleLink {
        match role {
            Role::Controller => &mut self.controller,
            Role::Hub => &mut self.hub,
        }
    }

    /// Bring up the transport and create both client handles. On failure
    /// both roles are marked errored and the bridge cannot proceed.
    pub fn init(&mut self) -> Result<(), BridgeError> {
        info!("initializing transport");
        if let Err(source) = self.transport.init() {
            error!("transport init failed: {source}");
            self.mark_links_errored();
            return Err(BridgeError::Init { source });
        }

        for role in Role::ALL {
            let mut client = match self.transport.create_client() {
                Ok(client) => client,
                Err(source) => {
                    error!(%role, "failed to create transport client: {source}");
                    self.mark_links_errored();
                    return Err(BridgeError::Init { source });
                }
            };
            let state = Arc::clone(&self.link(role).state);
            client.set_disconnect_handler(Arc::new(move || {
                warn!(%role, "link dropped");
                state.store(LinkState::Disconnected);
            }));
            self.link_mut(role).client = Some(client);
        }

        info!("transport initialized");
        Ok(())
    }

    fn mark_links_errored(&self) {
        self.controller.state.store(LinkState::Error);
        self.hub.state.store(LinkState::Error);
    }

    /// Start a fresh scan cycle; both roles move to `Scanning`.
    pub fn start_scan(&mut self) -> Result<(), TransportError> {
        self.controller.state.store(LinkState::Scanning);
        self.hub.state.store(LinkState::Scanning);
        match self.scanner.start() {
            Ok(()) => Ok(()),
            Err(err) => {
                self.controller.state.store(LinkState::Idle);
                self.hub.state.store(LinkState::Idle);
                Err(err)
            }
        }
    }

    /// Force early scan termination. Roles that were not found fall back
    /// to `Idle` instead of sticking in `Scanning`.
    pub fn stop_scan(&mut self) {
        self.scanner.stop();
        for role in Role::ALL {
            let link = self.link(role);
            if !self.scanner.found(role) && link.state.load() == LinkState::Scanning {
                link.state.store(LinkState::Idle);
            }
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    pub fn found(&self, role: Role) -> bool {
        self.scanner.found(role)
    }

    pub fn found_both(&self) -> bool {
        self.scanner.found_both()
    }

    pub fn device_info(&self, role: Role) -> DeviceRecord {
        self.scanner.device_info(role)
    }

    /// Connect one role to its recorded address. Requires the role to have
    /// been discovered; fails without side effects otherwise. Blocks until
    /// the transport settles the attempt.
    pub fn connect(&mut self, role: Role) -> Result<(), BridgeError> {
        let record = self.scanner.device_info(role);
        if !record.found {
            warn!(%role, "cannot connect: device was not discovered");
            return Err(BridgeError::DeviceNotFound { role });
        }

        let state = Arc::clone(&self.link(role).state);
        let link = self.link_mut(role);
        let client = match link.client.as_mut() {
            Some(client) => client,
            None => {
                return Err(BridgeError::ConnectFailed {
                    role,
                    source: TransportError::NotInitialized,
                })
            }
        };

        info!(%role, name = %record.name, address = %record.address, "connecting");
        state.store(LinkState::Connecting);

        match client.connect(&record.address) {
            Ok(()) => {
                info!(%role, "connected");
                state.store(LinkState::Connected);
                Ok(())
            }
            Err(source) => {
                error!(%role, "connect failed: {source}");
                state.store(LinkState::Error);
                Err(BridgeError::ConnectFailed { role, source })
            }
        }
    }

    pub fn disconnect(&mut self, role: Role) {
        let state = Arc::clone(&self.link(role).state);
        if let Some(client) = self.link_mut(role).client.as_mut() {
            if client.is_connected() {
                info!(%role, "disconnecting");
                client.disconnect();
                state.store(LinkState::Disconnected);
            }
        }
    }

    /// Tear down both roles unconditionally. Safe from any state; used
    /// when resetting for a fresh discovery cycle.
    pub fn disconnect_all(&mut self) {
        self.disconnect(Role::Controller);
        self.disconnect(Role::Hub);
    }

    /// A role counts as connected only when the transport reports a live
    /// link AND our own bookkeeping agrees. The double check keeps an
    /// async disconnect notification authoritative even before the
    /// transport is polled again.
    pub fn is_connected(&self, role: Role) -> bool {
        let link = self.link(role);
        let transport_live = link
            .client
            .as_ref()
            .map(|client| client.is_connected())
            .unwrap_or(false);
        transport_live && link.state.load() == LinkState::Connected
    }

    pub fn both_connected(&self) -> bool {
        self.is_connected(Role::Controller) && self.is_connected(Role::Hub)
    }

    pub fn state(&self, role: Role) -> LinkState {
        self.link(role).state.load()
    }

    pub fn snapshot(&self, role: Role) -> RoleSnapshot {
        RoleSnapshot {
            found: self.found(role),
            connected: self.is_connected(role),
            record: self.device_info(role),
        }
    }

    #[cfg(test)]
    pub(crate) fn scan_event_handler(&self) -> crate::infrastructure::ble::transport::ScanHandler {
        self.scanner.event_handler()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DeviceAddress;
    use crate::infrastructure::ble::sim::SimTransport;
    use crate::infrastructure::ble::transport::{Advertisement, ScanEvent};

    const CONTROLLER_ADDR: DeviceAddress = DeviceAddress::new([0x10, 0, 0, 0, 0, 1]);
    const HUB_ADDR: DeviceAddress = DeviceAddress::new([0x20, 0, 0, 0, 0, 2]);

    fn supervisor_with_sim() -> (ConnectionSupervisor, Arc<SimTransport>) {
        let transport = Arc::new(SimTransport::new());
        transport.add_peripheral("Xbox Wireless Controller", CONTROLLER_ADDR, -55);
        transport.add_peripheral("Technic Move Hub", HUB_ADDR, -62);
        let supervisor = ConnectionSupervisor::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            &Settings::default(),
        );
        (supervisor, transport)
    }

    fn discover(supervisor: &ConnectionSupervisor, name: &str, address: DeviceAddress) {
        let handler = supervisor.scan_event_handler();
        handler(ScanEvent::Advertisement(Advertisement {
            name: name.to_string(),
            address,
            rssi: -50,
        }));
    }

    #[test]
    fn init_failure_marks_both_links_errored() {
        let (mut supervisor, transport) = supervisor_with_sim();
        transport.fail_init("radio unavailable");

        let err = supervisor.init().unwrap_err();
        assert!(matches!(err, BridgeError::Init { .. }));
        assert_eq!(supervisor.state(Role::Controller), LinkState::Error);
        assert_eq!(supervisor.state(Role::Hub), LinkState::Error);
    }

    #[test]
    fn connect_without_discovery_fails_without_side_effects() {
        let (mut supervisor, _transport) = supervisor_with_sim();
        supervisor.init().unwrap();

        let err = supervisor.connect(Role::Controller).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::DeviceNotFound {
                role: Role::Controller
            }
        ));
        assert_eq!(supervisor.state(Role::Controller), LinkState::Idle);
        assert!(!supervisor.is_connected(Role::Controller));
    }

    #[test]
    fn successful_connect_reaches_connected_state() {
        let (mut supervisor, _transport) = supervisor_with_sim();
        supervisor.init().unwrap();
        discover(&supervisor, "Xbox Wireless Controller", CONTROLLER_ADDR);

        supervisor.connect(Role::Controller).unwrap();
        assert_eq!(supervisor.state(Role::Controller), LinkState::Connected);
        assert!(supervisor.is_connected(Role::Controller));
        // The other role is untouched.
        assert_eq!(supervisor.state(Role::Hub), LinkState::Idle);
    }

    #[test]
    fn connect_failure_marks_only_that_role() {
        let (mut supervisor, transport) = supervisor_with_sim();
        supervisor.init().unwrap();
        discover(&supervisor, "Xbox Wireless Controller", CONTROLLER_ADDR);
        transport.fail_connects(CONTROLLER_ADDR, 1);

        let err = supervisor.connect(Role::Controller).unwrap_err();
        assert!(matches!(err, BridgeError::ConnectFailed { .. }));
        assert_eq!(supervisor.state(Role::Controller), LinkState::Error);
        assert_eq!(supervisor.state(Role::Hub), LinkState::Idle);
    }

    #[test]
    fn disconnect_notification_is_visible_immediately() {
        let (mut supervisor, transport) = supervisor_with_sim();
        supervisor.init().unwrap();
        discover(&supervisor, "Technic Move Hub", HUB_ADDR);

        supervisor.connect(Role::Hub).unwrap();
        assert!(supervisor.is_connected(Role::Hub));

        transport.inject_disconnect(HUB_ADDR);
        assert_eq!(supervisor.state(Role::Hub), LinkState::Disconnected);
        assert!(!supervisor.is_connected(Role::Hub));
    }

    #[test]
    fn disconnect_all_is_safe_from_idle() {
        let (mut supervisor, _transport) = supervisor_with_sim();
        supervisor.init().unwrap();
        supervisor.disconnect_all();
        assert_eq!(supervisor.state(Role::Controller), LinkState::Idle);
        assert_eq!(supervisor.state(Role::Hub), LinkState::Idle);
    }

    #[test]
    fn stop_scan_parks_unfound_roles_at_idle() {
        let (mut supervisor, transport) = supervisor_with_sim();
        transport.init().unwrap();
        supervisor.init().unwrap();

        // Mark both roles as scanning without a live transport scan, then
        // discover only the hub before stopping.
        supervisor.controller.state.store(LinkState::Scanning);
        supervisor.hub.state.store(LinkState::Scanning);
        discover(&supervisor, "Technic Move Hub", HUB_ADDR);

        supervisor.stop_scan();
        assert_eq!(supervisor.state(Role::Controller), LinkState::Idle);
        assert_eq!(supervisor.state(Role::Hub), LinkState::Scanning);
    }
}
