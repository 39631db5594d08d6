use accessim_core::config::Config;
use accessim_core::params;
use accessim_core::types::Id;
use accessim_devices::bootstrap::{register_builtin_devices, registry_from_config};
use accessim_devices::{RegistryEvent, SharedDeviceRegistry};

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the logger
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::default();
    let registry = SharedDeviceRegistry::from(registry_from_config(&config));

    // Subscribe before registering so the added events are seen too
    let mut event_rx = registry.registry().subscribe();
    let listener = tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            match event {
                RegistryEvent::DeviceAdded(snapshot) => {
                    info!("Device added: {} ({})", snapshot.name, snapshot.id);
                }
                RegistryEvent::DeviceConnected { id, version } => {
                    info!("Device {} connected using {}", id, version);
                }
                RegistryEvent::DeviceDisconnected(id) => {
                    info!("Device {} disconnected", id);
                }
                RegistryEvent::DeviceRemoved(id) => {
                    info!("Device {} removed", id);
                }
            }
        }
    });

    let ids = register_builtin_devices(registry.registry(), &config)?;
    for id in &ids {
        registry.registry().connect(id).await?;
    }

    for snapshot in registry.registry().list().await? {
        info!("{:?}", snapshot);
    }

    let led = Id::from("led_controller_001");
    let envelope = registry
        .registry()
        .send_command(&led, "set_brightness", &params! { "value" => 150 })
        .await;
    info!("set_brightness: {}", serde_json::to_string(&envelope)?);

    let gamepad = Id::from("game_controller_001");
    let envelope = registry
        .registry()
        .send_command(&gamepad, "read_input", &params!())
        .await;
    info!("read_input: {}", serde_json::to_string(&envelope)?);

    registry.registry().shutdown().await?;

    // Dropping the registry closes the channel and ends the listener
    drop(registry);
    listener.await?;

    info!("Example completed!");
    Ok(())
}
