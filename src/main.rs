//! BLE controller simulator
//!
//! Loads a controller configuration, builds the controller over the
//! simulated stack and plays one peer session against it.

use ble_controller::domain::settings::{ControllerSettings, SettingsService};
use ble_controller::infrastructure::logging::init_logger;
use ble_controller::{BleController, PairingResponse, PeerId, SimulatedStack};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ble-controller")]
#[command(about = "Simulate a BLE peripheral controller session")]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pass key reported by the simulated stack (random if omitted)
    #[arg(short, long)]
    pass_key: Option<u32>,

    /// Simulate the peer rejecting the pass key
    #[arg(long)]
    reject: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let service = match &cli.config {
        Some(path) => SettingsService::load(path.clone())?,
        None => SettingsService::new()?,
    };
    let settings = service.get().clone();
    let _guard = init_logger(&settings.log_settings)?;
    info!("Starting BLE controller simulator ({})", service.path().display());

    let (sender, mut receiver) = mpsc::unbounded_channel();
    let events = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            info!("Controller event: {:?}", event);
        }
    });

    let components = settings.build_components()?;
    let mut controller =
        BleController::from_settings(&settings, components, SimulatedStack::new())?
            .with_event_sender(sender);

    // Without configured actions, print the pairing events to the console.
    let security = settings.security_mode.authentication_enabled();
    if security && settings.on_show_pass_key.is_empty() {
        controller.on_show_pass_key(|pass_key| {
            info!("Enter pass key {} on the central", pass_key);
            Ok(())
        })?;
    }
    if security && settings.on_authentication_complete.is_empty() {
        controller.on_authentication_complete(|success| {
            info!(
                "Authentication {}",
                if success { "succeeded" } else { "failed" }
            );
            Ok(())
        })?;
    }

    run_session(&mut controller, &settings, &cli)?;

    // Dropping the controller closes the event channel.
    drop(controller);
    events.await?;
    Ok(())
}

fn run_session(
    controller: &mut BleController<SimulatedStack>,
    settings: &ControllerSettings,
    cli: &Cli,
) -> anyhow::Result<()> {
    controller.start()?;

    let peer = PeerId(1);
    controller.on_connect(peer);
    if let PairingResponse::DisplayPasskey(_) = controller.on_pairing_request(peer, cli.pass_key) {
        controller.on_authentication_result(peer, !cli.reject);
    }

    let services = controller.services().to_vec();
    for service in &services {
        for characteristic in &service.characteristics {
            match controller.on_read(peer, &service.uuid, &characteristic.uuid) {
                Ok(value) => info!(
                    "{}/{} = {:?}",
                    service.uuid,
                    characteristic.uuid,
                    String::from_utf8_lossy(&value)
                ),
                Err(e) => warn!("Read {}/{} failed: {}", service.uuid, characteristic.uuid, e),
            }
            if characteristic.notify_enabled {
                controller.on_subscribe(peer, &service.uuid, &characteristic.uuid, true)?;
            }
        }
    }

    for component in &settings.components {
        let sent = controller.notify_component_changed(&component.id)?;
        info!("{} notification(s) for {}", sent, component.id);
    }

    controller.on_disconnect(peer);
    controller.stop()?;
    Ok(())
}
