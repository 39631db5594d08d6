/*!
 * Scripted sessions, one per built-in accessory.
 */
use anyhow::{bail, Context, Result};

use accessim_core::config::Config;
use accessim_core::params;
use accessim_core::types::{Id, Params, Value};
use accessim_devices::bootstrap::{environmental_sensor, input_controller, registry_from_config};
use accessim_devices::devices::LightingController;
use accessim_devices::{Device, DeviceRegistry, DeviceSnapshot, Envelope};

/// Readings taken while the sensor demo is logging
const SENSOR_READINGS: usize = 5;

/// Writes demo output as text or JSON
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn banner(&self, title: &str) {
        println!("\n{}\n{}\n{}", "=".repeat(80), title, "=".repeat(80));
    }

    fn step(&self, text: &str) {
        println!("\n{}", text);
    }

    fn info(&self, snapshot: &DeviceSnapshot) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(snapshot)?);
            return Ok(());
        }
        println!("\nDevice info:");
        println!("  Name: {}", snapshot.name);
        println!("  Manufacturer: {}", snapshot.manufacturer);
        println!("  Description: {}", snapshot.description);
        println!("  Connection: {}", snapshot.connection_type);
        println!("  Protocol: {}", snapshot.protocol_version);
        println!("  Features: {}", snapshot.features.join(", "));
        Ok(())
    }

    fn envelope(&self, envelope: &Envelope) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(envelope)?);
        } else if envelope.is_success() {
            let data = match &envelope.data {
                Some(data) => serde_json::to_string(data)?,
                None => String::new(),
            };
            println!("  success: {}", data);
        } else {
            println!(
                "  error: {}",
                envelope.message.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(())
    }
}

/// Register one device in a fresh registry, print it and connect
async fn open<D: Device + 'static>(
    config: &Config,
    printer: &Printer,
    device: D,
) -> Result<(DeviceRegistry, Id)> {
    let id = device.id().clone();
    let registry = registry_from_config(config);
    registry.register(device)?;
    printer.info(&registry.get(&id).await?)?;

    printer.step("Connecting...");
    let version = registry.connect(&id).await?;
    println!("  connected using {}", version);
    Ok((registry, id))
}

/// Print the final state, then disconnect
async fn close(registry: &DeviceRegistry, printer: &Printer, id: &Id) -> Result<()> {
    let state = registry.state(id).await?;
    printer.step("Current state:");
    if printer.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        let mut fields: Vec<_> = state.properties.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in fields {
            println!("  {}: {}", key, serde_json::to_string(value)?);
        }
    }

    printer.step("Disconnecting...");
    registry.disconnect(id).await?;
    registry.shutdown().await?;
    Ok(())
}

async fn send(
    registry: &DeviceRegistry,
    printer: &Printer,
    id: &Id,
    command: &str,
    params: Params,
) -> Result<Envelope> {
    let envelope = registry.send_command(id, command, &params).await;
    printer.envelope(&envelope)?;
    if !envelope.is_success() {
        bail!(
            "{} failed: {}",
            command,
            envelope.message.unwrap_or_default()
        );
    }
    Ok(envelope)
}

/// Brightness, color, pattern and power on the LED controller
pub async fn lighting(config: &Config, printer: &Printer) -> Result<()> {
    printer.banner("LED controller demo");
    let (registry, id) = open(config, printer, LightingController::new()).await?;

    printer.step("Setting brightness to 75%...");
    send(&registry, printer, &id, "set_brightness", params! { "value" => 75 }).await?;

    printer.step("Setting color to red (#FF0000)...");
    send(&registry, printer, &id, "set_color", params! { "value" => "#FF0000" }).await?;

    printer.step("Setting pattern to pulse...");
    send(&registry, printer, &id, "set_pattern", params! { "value" => "pulse" }).await?;

    printer.step("Turning power on...");
    send(&registry, printer, &id, "power", params! { "value" => true }).await?;

    close(&registry, printer, &id).await?;
    printer.step("LED controller demo completed");
    Ok(())
}

/// Readings and data logging on the environmental sensor
pub async fn sensor(config: &Config, printer: &Printer) -> Result<()> {
    printer.banner("Temperature sensor demo");
    let (registry, id) = open(config, printer, environmental_sensor(config)).await?;

    printer.step("Reading temperature...");
    send(&registry, printer, &id, "read_temperature", params!()).await?;

    printer.step("Reading humidity...");
    send(&registry, printer, &id, "read_humidity", params!()).await?;

    printer.step("Starting data logging...");
    send(&registry, printer, &id, "start_logging", params! { "interval" => 5 }).await?;

    printer.step("Collecting data...");
    for i in 0..SENSOR_READINGS {
        println!("  measurement {}/{}", i + 1, SENSOR_READINGS);
        registry.send_command(&id, "read_temperature", &params!()).await;
    }

    printer.step("Stopping data logging...");
    send(&registry, printer, &id, "stop_logging", params!()).await?;

    printer.step("Log data:");
    let envelope = send(&registry, printer, &id, "read_log", params!()).await?;
    if !printer.json {
        let entries = envelope
            .field("entries")
            .and_then(Value::as_array)
            .context("read_log returned no entries")?;
        for entry in entries {
            let time = entry
                .get("timestamp")
                .and_then(Value::as_timestamp)
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_default();
            let temperature = entry.get("temperature").and_then(Value::as_float);
            let humidity = entry.get("humidity").and_then(Value::as_float);
            println!(
                "  {} - temperature: {:?}°C, humidity: {:?}%",
                time, temperature, humidity
            );
        }
    }

    close(&registry, printer, &id).await?;
    printer.step("Temperature sensor demo completed");
    Ok(())
}

/// Input and vibration on the game controller
pub async fn controller(config: &Config, printer: &Printer) -> Result<()> {
    printer.banner("Game controller demo");
    let (registry, id) = open(config, printer, input_controller(config)).await?;

    printer.step("Reading input...");
    send(&registry, printer, &id, "read_input", params!()).await?;

    printer.step("Setting vibration...");
    let envelope = send(
        &registry,
        printer,
        &id,
        "set_vibration",
        params! { "left" => 80, "right" => 50 },
    )
    .await?;
    if let Some(vibration) = envelope.field("vibration") {
        println!(
            "  vibration: left={:?}, right={:?}",
            vibration.get("left").and_then(Value::as_integer),
            vibration.get("right").and_then(Value::as_integer)
        );
    }

    close(&registry, printer, &id).await?;
    printer.step("Game controller demo completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_demos_run_to_completion() {
        let config = Config::default();
        let printer = Printer::new(false);
        lighting(&config, &printer).await.unwrap();
        sensor(&config, &printer).await.unwrap();
        controller(&config, &printer).await.unwrap();
    }

    #[tokio::test]
    async fn test_json_output() {
        let config = Config::default();
        tokio_test::assert_ok!(lighting(&config, &Printer::new(true)).await);
    }

    #[tokio::test]
    async fn test_failed_command_aborts_demo() {
        let config = Config::default();
        let printer = Printer::new(false);
        let registry = registry_from_config(&config);
        let id = Id::from("ghost");
        let err = send(&registry, &printer, &id, "power", params! { "value" => true })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("power failed"));
    }
}
