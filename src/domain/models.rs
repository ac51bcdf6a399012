//! Core data model for the bridge: peripheral roles, device records, and
//! the per-link / application state enums.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// One of the two fixed peripheral slots the bridge manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The game-style input controller.
    Controller,
    /// The motorized vehicle hub.
    Hub,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Controller, Role::Hub];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Controller => write!(f, "controller"),
            Role::Hub => write!(f, "hub"),
        }
    }
}

/// Opaque link-layer identifier for a peripheral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DeviceAddress([u8; 6]);

impl DeviceAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// Record of one discovered peripheral. One instance exists per [`Role`];
/// it is reset at the start of every scan cycle and populated at most once
/// per cycle (first matching advertisement wins).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceRecord {
    pub name: String,
    pub address: DeviceAddress,
    pub rssi: i16,
    pub found: bool,
}

impl DeviceRecord {
    pub fn reset(&mut self) {
        *self = DeviceRecord::default();
    }
}

/// Per-role connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Idle = 0,
    Scanning = 1,
    Connecting = 2,
    Connected = 3,
    Disconnected = 4,
    Error = 5,
}

impl LinkState {
    fn from_u8(value: u8) -> LinkState {
        match value {
            0 => LinkState::Idle,
            1 => LinkState::Scanning,
            2 => LinkState::Connecting,
            3 => LinkState::Connected,
            4 => LinkState::Disconnected,
            _ => LinkState::Error,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Idle => "idle",
            LinkState::Scanning => "scanning",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Disconnected => "disconnected",
            LinkState::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Lock-free cell for a [`LinkState`]. Disconnect notifications arrive on
/// the transport's execution context while the poll loop reads the state,
/// so the value must be safe to touch from both sides.
#[derive(Debug)]
pub struct AtomicLinkState(AtomicU8);

impl AtomicLinkState {
    pub fn new(state: LinkState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn store(&self, state: LinkState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Top-level application state. Exactly one instance exists, owned by the
/// application supervisor; `Active` is reachable only after both links
/// have connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Init,
    Scanning,
    Connecting,
    Connected,
    Active,
    Error,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppState::Init => "init",
            AppState::Scanning => "scanning",
            AppState::Connecting => "connecting",
            AppState::Connected => "connected",
            AppState::Active => "active",
            AppState::Error => "error",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_record_reset_clears_everything() {
        let mut record = DeviceRecord {
            name: "Xbox Wireless Controller".to_string(),
            address: DeviceAddress::new([1, 2, 3, 4, 5, 6]),
            rssi: -60,
            found: true,
        };
        record.reset();
        assert_eq!(record, DeviceRecord::default());
        assert!(!record.found);
    }

    #[test]
    fn atomic_link_state_round_trips_all_variants() {
        let cell = AtomicLinkState::new(LinkState::Idle);
        for state in [
            LinkState::Idle,
            LinkState::Scanning,
            LinkState::Connecting,
            LinkState::Connected,
            LinkState::Disconnected,
            LinkState::Error,
        ] {
            cell.store(state);
            assert_eq!(cell.load(), state);
        }
    }

    #[test]
    fn address_formats_as_hex_pairs() {
        let addr = DeviceAddress::new([0xA0, 0x0B, 0xC1, 0x00, 0xFF, 0x12]);
        assert_eq!(addr.to_string(), "A0:0B:C1:00:FF:12");
    }
}
