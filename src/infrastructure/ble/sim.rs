//! In-memory transport backend.
//!
//! Replays a configurable set of advertisements during scans, honors
//! scripted per-address connect outcomes, and lets tests and the demo
//! binary inject disconnects. Scan events are delivered from a spawned
//! task, so handlers see the same cross-context conditions a real stack
//! produces.

use crate::domain::models::DeviceAddress;
use crate::infrastructure::ble::transport::{
    Advertisement, DisconnectHandler, ScanEvent, ScanHandler, ScanParams, Transport,
    TransportClient, TransportError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::debug;

/// Gap between advertisement replay rounds during a simulated scan.
const ADV_ROUND_GAP: Duration = Duration::from_millis(20);

#[derive(Default)]
struct SimState {
    initialized: bool,
    init_failure: Option<String>,
    adverts: Vec<Advertisement>,
    scan_stop: Option<Arc<AtomicBool>>,
    connect_failures: HashMap<DeviceAddress, u32>,
    connect_attempts: HashMap<DeviceAddress, u32>,
    clients: Vec<Arc<SimClientShared>>,
}

#[derive(Default)]
struct SimClientShared {
    connected_to: Mutex<Option<DeviceAddress>>,
    disconnect_handler: Mutex<Option<DisconnectHandler>>,
}

pub struct SimTransport {
    state: Arc<Mutex<SimState>>,
    stop_calls: AtomicU32,
}

fn lock<T>(value: &Mutex<T>) -> MutexGuard<'_, T> {
    value.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
            stop_calls: AtomicU32::new(0),
        }
    }

    /// Add a peripheral that will advertise during scans.
    pub fn add_peripheral(&self, name: &str, address: DeviceAddress, rssi: i16) {
        lock(&self.state).adverts.push(Advertisement {
            name: name.to_string(),
            address,
            rssi,
        });
    }

    /// Make [`Transport::init`] fail with the given reason.
    pub fn fail_init(&self, reason: &str) {
        lock(&self.state).init_failure = Some(reason.to_string());
    }

    /// Make the next `count` connect attempts to `address` fail.
    pub fn fail_connects(&self, address: DeviceAddress, count: u32) {
        lock(&self.state)
            .connect_failures
            .insert(address, count);
    }

    /// Total connect attempts observed for `address`.
    pub fn connect_attempts(&self, address: DeviceAddress) -> u32 {
        lock(&self.state)
            .connect_attempts
            .get(&address)
            .copied()
            .unwrap_or(0)
    }

    /// Number of times a scan was stopped early.
    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Drop the link of whichever client is connected to `address` and
    /// fire its disconnect handler, as a real stack would from its own
    /// context.
    pub fn inject_disconnect(&self, address: DeviceAddress) {
        let mut handlers = Vec::new();
        {
            let state = lock(&self.state);
            for client in &state.clients {
                let mut connected = lock(&client.connected_to);
                if *connected == Some(address) {
                    *connected = None;
                    if let Some(handler) = lock(&client.disconnect_handler).clone() {
                        handlers.push(handler);
                    }
                }
            }
        }
        for handler in handlers {
            handler();
        }
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimTransport {
    fn init(&self) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if let Some(reason) = &state.init_failure {
            return Err(TransportError::InitFailed(reason.clone()));
        }
        state.initialized = true;
        Ok(())
    }

    fn start_scan(&self, params: ScanParams, on_event: ScanHandler) -> Result<(), TransportError> {
        let (adverts, stop) = {
            let mut state = lock(&self.state);
            if !state.initialized {
                return Err(TransportError::NotInitialized);
            }
            // Supersede any scan still running.
            if let Some(previous) = state.scan_stop.take() {
                previous.store(true, Ordering::SeqCst);
            }
            let stop = Arc::new(AtomicBool::new(false));
            state.scan_stop = Some(Arc::clone(&stop));
            (state.adverts.clone(), stop)
        };

        debug!(
            peripherals = adverts.len(),
            duration_ms = params.duration.as_millis() as u64,
            "simulated scan started"
        );

        tokio::spawn(async move {
            let deadline = Instant::now() + params.duration;
            'scan: loop {
                for adv in &adverts {
                    if stop.load(Ordering::SeqCst) {
                        break 'scan;
                    }
                    on_event(ScanEvent::Advertisement(adv.clone()));
                }
                if stop.load(Ordering::SeqCst) || Instant::now() >= deadline {
                    break;
                }
                sleep(ADV_ROUND_GAP).await;
            }
            on_event(ScanEvent::Complete);
        });

        Ok(())
    }

    fn stop_scan(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(stop) = lock(&self.state).scan_stop.take() {
            stop.store(true, Ordering::SeqCst);
        }
    }

    fn create_client(&self) -> Result<Box<dyn TransportClient>, TransportError> {
        let mut state = lock(&self.state);
        if !state.initialized {
            return Err(TransportError::NotInitialized);
        }
        let shared = Arc::new(SimClientShared::default());
        state.clients.push(Arc::clone(&shared));
        drop(state);
        Ok(Box::new(SimClient {
            state: Arc::clone(&self.state),
            shared,
        }))
    }
}

struct SimClient {
    state: Arc<Mutex<SimState>>,
    shared: Arc<SimClientShared>,
}

impl TransportClient for SimClient {
    fn connect(&mut self, address: &DeviceAddress) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        *state.connect_attempts.entry(*address).or_insert(0) += 1;

        let known = state.adverts.iter().any(|adv| adv.address == *address);
        if !known {
            return Err(TransportError::ConnectFailed(*address));
        }
        if let Some(remaining) = state.connect_failures.get_mut(address) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::ConnectFailed(*address));
            }
        }
        drop(state);

        *lock(&self.shared.connected_to) = Some(*address);
        Ok(())
    }

    fn disconnect(&mut self) {
        *lock(&self.shared.connected_to) = None;
    }

    fn is_connected(&self) -> bool {
        lock(&self.shared.connected_to).is_some()
    }

    fn set_disconnect_handler(&mut self, handler: DisconnectHandler) {
        *lock(&self.shared.disconnect_handler) = Some(handler);
    }
}
