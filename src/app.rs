//! Top-level bridge supervisor.
//!
//! Drives the whole lifecycle as a polled state machine:
//!
//! ```text
//! Init -> Scanning -> Connecting -> Connected -> Active
//!            ^                                     |
//!            +----------- recovery cycle ----------+
//! ```
//!
//! Scanning retries with a cooldown until both peripherals are found (or a
//! configured attempt ceiling is hit). Connecting runs the ordered connect
//! sequence, controller first, and a failed pass stays in `Connecting` to
//! be retried after its own cooldown. A link drop while `Active` routes
//! through the recovery cycle back to `Scanning`; everything else is
//! terminal and makes [`BridgeApp::run`] return the error.

use crate::domain::models::{AppState, Role};
use crate::domain::settings::Settings;
use crate::error::BridgeError;
use crate::infrastructure::ble::ConnectionSupervisor;
use crate::infrastructure::diagnostics::StatusReporter;
use crate::infrastructure::indicator::StatusIndicator;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Cooldown-plus-ceiling retry policy. `max_attempts: None` retries
/// forever.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub cooldown: Duration,
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(false, |max| attempts >= max)
    }
}

/// Timing knobs for the supervisor loop, derived from [`Settings`].
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    pub scan_retry: RetryPolicy,
    pub connect_stabilize: Duration,
    pub connect_max_retries: u32,
    pub connect_retry_cooldown: Duration,
    pub recovery_cooldown: Duration,
    pub control_period: Duration,
    pub status_period: Duration,
}

impl BridgeConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            scan_retry: RetryPolicy {
                cooldown: Duration::from_millis(settings.scan_cooldown_ms),
                max_attempts: settings.scan_max_attempts,
            },
            connect_stabilize: Duration::from_millis(settings.connect_stabilize_ms),
            connect_max_retries: settings.connect_max_retries,
            connect_retry_cooldown: Duration::from_millis(settings.connect_retry_cooldown_ms),
            recovery_cooldown: Duration::from_millis(settings.recovery_cooldown_ms),
            control_period: Duration::from_millis(settings.control_period_ms),
            status_period: Duration::from_millis(settings.status_period_ms),
        }
    }
}

/// One iteration of the forwarding path, invoked on the control period
/// while the bridge is `Active`. Closures work directly.
pub trait ControlPipeline: Send {
    fn tick(&mut self) -> anyhow::Result<()>;
}

impl<F> ControlPipeline for F
where
    F: FnMut() -> anyhow::Result<()> + Send,
{
    fn tick(&mut self) -> anyhow::Result<()> {
        (self)()
    }
}

pub struct BridgeApp<I: StatusIndicator, P: ControlPipeline> {
    supervisor: ConnectionSupervisor,
    config: BridgeConfig,
    indicator: I,
    pipeline: P,
    reporter: StatusReporter,
    state: AppState,
    scan_attempts: u32,
    connect_retry_at: Option<Instant>,
    last_control_tick: Option<Instant>,
}

impl<I: StatusIndicator, P: ControlPipeline> BridgeApp<I, P> {
    pub fn new(
        supervisor: ConnectionSupervisor,
        config: BridgeConfig,
        indicator: I,
        pipeline: P,
    ) -> Self {
        Self {
            supervisor,
            reporter: StatusReporter::new(config.status_period),
            config,
            indicator,
            pipeline,
            state: AppState::Init,
            scan_attempts: 0,
            connect_retry_at: None,
            last_control_tick: None,
        }
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    /// Bring up the transport. Must succeed before [`run`](Self::run) can
    /// make progress.
    pub fn init(&mut self) -> Result<(), BridgeError> {
        self.supervisor.init()
    }

    /// Main loop. Only returns on an unrecoverable error; restarting the
    /// process is the recovery path from there.
    pub async fn run(&mut self) -> Result<(), BridgeError> {
        self.init()?;
        loop {
            self.indicator.update(self.state);
            self.reporter.maybe_report(self.state, &self.supervisor);
            self.poll().await?;
            sleep(Duration::from_millis(1)).await;
        }
    }

    /// Advance the state machine by one step. Exposed separately from
    /// [`run`](Self::run) so callers can interleave their own work.
    pub async fn poll(&mut self) -> Result<(), BridgeError> {
        match self.state {
            AppState::Init => self.begin_scanning(),
            AppState::Scanning => self.poll_scanning().await,
            AppState::Connecting => self.poll_connecting().await,
            AppState::Connected => {
                // Nothing to wait for between the links coming up and the
                // forwarding path starting.
                self.set_state(AppState::Active);
                Ok(())
            }
            AppState::Active => self.poll_active().await,
            AppState::Error => Ok(()),
        }
    }

    fn begin_scanning(&mut self) -> Result<(), BridgeError> {
        match self.supervisor.start_scan() {
            Ok(()) => {
                self.set_state(AppState::Scanning);
                Ok(())
            }
            Err(source) => {
                error!("initial scan failed to start: {source}");
                self.set_state(AppState::Error);
                Err(BridgeError::Init { source })
            }
        }
    }

    async fn poll_scanning(&mut self) -> Result<(), BridgeError> {
        if self.supervisor.is_scanning() {
            return Ok(());
        }

        if self.supervisor.found_both() {
            self.scan_attempts = 0;
            self.set_state(AppState::Connecting);
            return Ok(());
        }

        for role in Role::ALL {
            if !self.supervisor.found(role) {
                warn!(%role, "not found in scan window");
            }
        }

        self.scan_attempts += 1;
        if self.config.scan_retry.exhausted(self.scan_attempts) {
            let role = Role::ALL
                .into_iter()
                .find(|role| !self.supervisor.found(*role))
                .unwrap_or(Role::Controller);
            return self.handle_error(BridgeError::DeviceNotFound { role }).await;
        }

        info!(attempt = self.scan_attempts, "restarting scan after cooldown");
        sleep(self.config.scan_retry.cooldown).await;
        if let Err(err) = self.supervisor.start_scan() {
            warn!("failed to restart scan: {err}");
        }
        Ok(())
    }

    async fn poll_connecting(&mut self) -> Result<(), BridgeError> {
        if let Some(at) = self.connect_retry_at {
            if Instant::now() < at {
                return Ok(());
            }
            self.connect_retry_at = None;
        }

        match self.run_connect_sequence().await {
            Ok(()) => {
                self.set_state(AppState::Connected);
                Ok(())
            }
            Err(err @ BridgeError::DeviceNotFound { .. }) => self.handle_error(err).await,
            Err(err) => {
                warn!("connect pass failed, retrying after cooldown: {err}");
                self.connect_retry_at = Some(Instant::now() + self.config.connect_retry_cooldown);
                Ok(())
            }
        }
    }

    /// Ordered connect pass: controller first, then a stabilization pause,
    /// then the hub. Roles already connected from an earlier pass are
    /// skipped.
    async fn run_connect_sequence(&mut self) -> Result<(), BridgeError> {
        self.connect_role(Role::Controller)?;
        sleep(self.config.connect_stabilize).await;
        self.connect_role(Role::Hub)?;
        Ok(())
    }

    fn connect_role(&mut self, role: Role) -> Result<(), BridgeError> {
        if self.supervisor.is_connected(role) {
            return Ok(());
        }
        let max = self.config.connect_max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.supervisor.connect(role) {
                Ok(()) => return Ok(()),
                Err(err @ BridgeError::DeviceNotFound { .. }) => return Err(err),
                Err(err) => {
                    warn!(%role, attempt, max, "connect attempt failed: {err}");
                    if attempt >= max {
                        return Err(err);
                    }
                }
            }
        }
    }

    async fn poll_active(&mut self) -> Result<(), BridgeError> {
        for role in Role::ALL {
            if !self.supervisor.is_connected(role) {
                return self.handle_error(BridgeError::Disconnected { role }).await;
            }
        }

        let due = self
            .last_control_tick
            .map_or(true, |last| last.elapsed() >= self.config.control_period);
        if due {
            self.last_control_tick = Some(Instant::now());
            if let Err(err) = self.pipeline.tick() {
                warn!("control tick failed: {err:#}");
            }
        }
        Ok(())
    }

    async fn handle_error(&mut self, err: BridgeError) -> Result<(), BridgeError> {
        if err.is_recoverable() {
            warn!("recoverable fault: {err}");
            self.recover().await;
            Ok(())
        } else {
            error!("unrecoverable fault: {err}");
            self.set_state(AppState::Error);
            Err(err)
        }
    }

    /// Drop everything and re-enter discovery after a cooldown.
    async fn recover(&mut self) {
        self.supervisor.disconnect_all();
        sleep(self.config.recovery_cooldown).await;
        self.scan_attempts = 0;
        self.connect_retry_at = None;
        self.last_control_tick = None;
        if let Err(err) = self.supervisor.start_scan() {
            warn!("failed to restart scan: {err}");
        }
        self.set_state(AppState::Scanning);
    }

    fn set_state(&mut self, next: AppState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "state transition");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DeviceAddress;
    use crate::infrastructure::ble::sim::SimTransport;
    use crate::infrastructure::indicator::LedIndicator;
    use std::sync::Arc;

    const CONTROLLER_ADDR: DeviceAddress = DeviceAddress::new([0xAA, 0, 0, 0, 0, 1]);
    const HUB_ADDR: DeviceAddress = DeviceAddress::new([0xBB, 0, 0, 0, 0, 2]);

    fn fast_settings() -> Settings {
        let mut settings = Settings::default();
        settings.scan_duration_ms = 200;
        settings.scan_cooldown_ms = 10;
        settings.connect_stabilize_ms = 10;
        settings.connect_retry_cooldown_ms = 30;
        settings.recovery_cooldown_ms = 10;
        settings.control_period_ms = 5;
        settings
    }

    fn make_app(
        transport: Arc<SimTransport>,
        settings: &Settings,
    ) -> BridgeApp<LedIndicator, impl ControlPipeline> {
        let supervisor = ConnectionSupervisor::new(transport, settings);
        BridgeApp::new(
            supervisor,
            BridgeConfig::from_settings(settings),
            LedIndicator::new(Duration::ZERO),
            || anyhow::Ok(()),
        )
    }

    async fn drive_until<I: StatusIndicator, P: ControlPipeline>(
        app: &mut BridgeApp<I, P>,
        target: AppState,
    ) {
        for _ in 0..400 {
            app.poll().await.unwrap();
            if app.state() == target {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("never reached {target}, stuck in {}", app.state());
    }

    fn transport_with_both() -> Arc<SimTransport> {
        let transport = Arc::new(SimTransport::new());
        transport.add_peripheral("Xbox Wireless Controller", CONTROLLER_ADDR, -50);
        transport.add_peripheral("Technic Move Hub", HUB_ADDR, -60);
        transport
    }

    #[tokio::test]
    async fn happy_path_reaches_active() {
        let transport = transport_with_both();
        let mut app = make_app(Arc::clone(&transport), &fast_settings());
        app.init().unwrap();

        drive_until(&mut app, AppState::Active).await;
        assert!(app.supervisor().both_connected());
    }

    #[tokio::test]
    async fn failed_connect_pass_stays_in_connecting() {
        let transport = transport_with_both();
        let mut app = make_app(Arc::clone(&transport), &fast_settings());
        app.init().unwrap();
        transport.fail_connects(CONTROLLER_ADDR, 100);

        drive_until(&mut app, AppState::Connecting).await;
        app.poll().await.unwrap();

        assert_eq!(app.state(), AppState::Connecting);
        // One pass exhausts the per-role retry budget on the controller
        // without ever touching the hub.
        assert_eq!(transport.connect_attempts(CONTROLLER_ADDR), 3);
        assert_eq!(transport.connect_attempts(HUB_ADDR), 0);
    }

    #[tokio::test]
    async fn missing_controller_keeps_scanning() {
        let transport = Arc::new(SimTransport::new());
        transport.add_peripheral("Technic Move Hub", HUB_ADDR, -60);
        let settings = fast_settings();
        let mut app = make_app(Arc::clone(&transport), &settings);
        app.init().unwrap();

        app.poll().await.unwrap();
        assert_eq!(app.state(), AppState::Scanning);

        // Wait out the first scan window plus cooldown; the app must retry
        // rather than give up.
        sleep(Duration::from_millis(300)).await;
        app.poll().await.unwrap();
        assert_eq!(app.state(), AppState::Scanning);
        assert!(!app.supervisor().found(Role::Controller));
        assert!(app.scan_attempts >= 1);
    }

    #[tokio::test]
    async fn scan_attempt_ceiling_is_terminal() {
        let transport = Arc::new(SimTransport::new());
        transport.add_peripheral("Technic Move Hub", HUB_ADDR, -60);
        let mut settings = fast_settings();
        settings.scan_max_attempts = Some(1);
        let mut app = make_app(Arc::clone(&transport), &settings);
        app.init().unwrap();

        app.poll().await.unwrap();
        sleep(Duration::from_millis(300)).await;

        let err = app.poll().await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::DeviceNotFound {
                role: Role::Controller
            }
        ));
        assert_eq!(app.state(), AppState::Error);
    }

    #[tokio::test]
    async fn link_drop_while_active_recovers_to_scanning() {
        let transport = transport_with_both();
        let mut app = make_app(Arc::clone(&transport), &fast_settings());
        app.init().unwrap();

        drive_until(&mut app, AppState::Active).await;
        transport.inject_disconnect(HUB_ADDR);

        app.poll().await.unwrap();
        assert_eq!(app.state(), AppState::Scanning);
        assert!(!app.supervisor().is_connected(Role::Hub));
        assert!(!app.supervisor().is_connected(Role::Controller));

        // And the bridge comes all the way back.
        drive_until(&mut app, AppState::Active).await;
    }
}
