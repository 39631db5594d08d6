/*!
 * Registry setup from configuration.
 */
use std::time::Duration;

use tracing::info;

use accessim_core::config::Config;
use accessim_core::types::Id;

use crate::device::{Device, Result};
use crate::devices::{EnvironmentalSensor, InputController, LightingController};
use crate::registry::DeviceRegistry;
use crate::sources::{SimulatedDrift, SimulatedInput};

/// An empty registry that requests the configured protocol version
pub fn registry_from_config(config: &Config) -> DeviceRegistry {
    DeviceRegistry::new().with_requested_version(config.negotiation.requested_version)
}

/// The environmental sensor with a drift source seeded from the configuration
pub fn environmental_sensor(config: &Config) -> EnvironmentalSensor {
    let drift = SimulatedDrift::new(
        config.sensor.seed,
        Duration::from_millis(config.sensor.drift_interval_ms),
    );
    EnvironmentalSensor::new()
        .with_source(drift)
        .with_log_capacity(config.sensor.log_capacity)
}

/// The input controller with simulated input seeded from the configuration
pub fn input_controller(config: &Config) -> InputController {
    InputController::new().with_source(SimulatedInput::new(config.input.seed))
}

/// The three built-in accessories
pub fn builtin_devices(config: &Config) -> Vec<Box<dyn Device>> {
    vec![
        Box::new(LightingController::new()),
        Box::new(environmental_sensor(config)),
        Box::new(input_controller(config)),
    ]
}

/// Register the built-in accessories, returning their IDs
pub fn register_builtin_devices(registry: &DeviceRegistry, config: &Config) -> Result<Vec<Id>> {
    let mut ids = Vec::new();
    for device in builtin_devices(config) {
        ids.push(device.id().clone());
        registry.register_boxed(device)?;
    }
    info!("Registered {} built-in devices", ids.len());
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use accessim_core::params;
    use accessim_core::types::{ProtocolVersion, Value};
    use tokio_test::{assert_err, assert_ok};

    use crate::device::DeviceError;

    #[tokio::test]
    async fn test_builtin_registration() {
        let config = Config::default();
        let registry = registry_from_config(&config);
        let ids = assert_ok!(register_builtin_devices(&registry, &config));

        assert_eq!(ids.len(), 3);
        assert_eq!(registry.len().unwrap(), 3);
        for id in &ids {
            assert!(registry.contains(id).unwrap());
        }

        let sensor = registry.get(&Id::from("temp_sensor_001")).await.unwrap();
        assert_eq!(sensor.protocol_version, ProtocolVersion::V1);
        assert_eq!(
            registry.connect(&Id::from("temp_sensor_001")).await,
            Ok(ProtocolVersion::V1)
        );
    }

    #[tokio::test]
    async fn test_sensor_uses_configured_capacity() {
        let mut config = Config::default();
        config.sensor.log_capacity = 3;
        let mut sensor = environmental_sensor(&config);
        sensor.connect(None).await.unwrap();
        sensor.execute_command("start_logging", &params!()).await.unwrap();
        for _ in 0..5 {
            sensor.execute_command("read_temperature", &params!()).await.unwrap();
        }
        assert_eq!(sensor.state().properties.get("log_entries"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_second_bootstrap_is_rejected() {
        let config = Config::default();
        let registry = registry_from_config(&config);
        assert_ok!(register_builtin_devices(&registry, &config));

        let err = assert_err!(register_builtin_devices(&registry, &config));
        assert!(matches!(err, DeviceError::DuplicateId(_)));
        assert_eq!(registry.len().unwrap(), 3);
    }
}
