use rc_bridge::domain::control::{map_drive, ControllerInput};
use rc_bridge::domain::models::DeviceAddress;
use rc_bridge::domain::settings::SettingsService;
use rc_bridge::infrastructure::ble::sim::SimTransport;
use rc_bridge::infrastructure::ble::transport::Transport;
use rc_bridge::infrastructure::ble::ConnectionSupervisor;
use rc_bridge::infrastructure::indicator::LedIndicator;
use rc_bridge::infrastructure::logging;
use rc_bridge::{BridgeApp, BridgeConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, trace};

const DEMO_CONTROLLER: DeviceAddress = DeviceAddress::new([0xC4, 0x3D, 0x1A, 0x00, 0x00, 0x01]);
const DEMO_HUB: DeviceAddress = DeviceAddress::new([0x90, 0x84, 0x2B, 0x00, 0x00, 0x02]);

fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;
    // Materialize the merged defaults so the file is editable in place.
    settings_service.save()?;
    let settings = settings_service.get().clone();
    let _logging_guard = logging::init_logger(&settings.log)?;

    info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    // Simulated peripherals; swap in a real backend here to drive
    // hardware.
    let transport = Arc::new(SimTransport::new());
    transport.add_peripheral("Xbox Wireless Controller", DEMO_CONTROLLER, -58);
    transport.add_peripheral("Technic Move Hub", DEMO_HUB, -66);

    let supervisor =
        ConnectionSupervisor::new(Arc::clone(&transport) as Arc<dyn Transport>, &settings);
    let config = BridgeConfig::from_settings(&settings);
    let indicator = LedIndicator::new(Duration::from_millis(settings.display_period_ms));

    let control = settings.control.clone();
    let pipeline = move || {
        // A real backend would poll the controller's input report here.
        let input = ControllerInput::default();
        let command = map_drive(&input, &control);
        trace!(speed = command.speed, steering = command.steering, "drive");
        anyhow::Ok(())
    };

    let mut app = BridgeApp::new(supervisor, config, indicator, pipeline);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // Exercise the recovery path once the demo bridge is up.
        let chaos = Arc::clone(&transport);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            info!("demo: dropping hub link");
            chaos.inject_disconnect(DEMO_HUB);
        });

        app.run().await
    })?;

    Ok(())
}
