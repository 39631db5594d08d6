/*!
 * Device registry for accessim.
 *
 * The registry owns every registered device and is the only way to reach
 * one after registration. Each device sits behind its own async mutex, so
 * calls on one ID are serialized while different IDs proceed in parallel.
 * The ID map lock is never held across an await point.
 */
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::join_all;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn, Instrument};

use accessim_core::logging::{component_span, operation_span};
use accessim_core::types::{Id, Params, ProtocolVersion};

use crate::device::{Device, DeviceError, DeviceSnapshot, DeviceState, Result};
use crate::envelope::Envelope;
use crate::schema::CommandTable;

/// A registered device, locked for exclusive use per call
pub type SharedDevice = Arc<Mutex<Box<dyn Device>>>;

/// Live devices plus every ID that has been removed
#[derive(Debug, Default)]
struct Slots {
    devices: HashMap<Id, SharedDevice>,
    /// IDs are never handed out again once removed
    retired: HashSet<Id>,
}

/// Event types for the device registry
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// A device was added to the registry
    DeviceAdded(DeviceSnapshot),
    /// A device was removed from the registry
    DeviceRemoved(Id),
    /// A device completed its handshake
    DeviceConnected {
        /// The device ID
        id: Id,
        /// The negotiated protocol version
        version: ProtocolVersion,
    },
    /// A connected device was disconnected
    DeviceDisconnected(Id),
}

/// Device registry
#[derive(Debug)]
pub struct DeviceRegistry {
    /// The registered devices and retired IDs
    slots: RwLock<Slots>,
    /// Event sender for registry events
    event_sender: broadcast::Sender<RegistryEvent>,
    /// Version the host asks for when connecting
    requested_version: Option<ProtocolVersion>,
}

impl DeviceRegistry {
    /// Create a new, empty device registry
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self {
            slots: RwLock::new(Slots::default()),
            event_sender,
            requested_version: None,
        }
    }

    /// Ask for `version` whenever a device is connected without an explicit request
    pub fn with_requested_version(mut self, version: ProtocolVersion) -> Self {
        self.requested_version = Some(version);
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Slots>> {
        self.slots
            .read()
            .map_err(|_| DeviceError::internal("Failed to acquire read lock on device registry"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Slots>> {
        self.slots
            .write()
            .map_err(|_| DeviceError::internal("Failed to acquire write lock on device registry"))
    }

    fn lookup(&self, id: &Id) -> Result<SharedDevice> {
        self.read()?
            .devices
            .get(id)
            .cloned()
            .ok_or_else(|| DeviceError::NotFound(id.clone()))
    }

    /// Lock a device, failing if it was unregistered while we waited
    async fn acquire(&self, id: &Id) -> Result<OwnedMutexGuard<Box<dyn Device>>> {
        let device = self.lookup(id)?.lock_owned().await;
        if !self.contains(id)? {
            debug!("Device {} was removed while waiting for its lock", id);
            return Err(DeviceError::NotFound(id.clone()));
        }
        Ok(device)
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is not an error.
        let _ = self.event_sender.send(event);
    }

    /// Register a device, taking ownership of it
    pub fn register<D: Device + 'static>(&self, device: D) -> Result<()> {
        self.register_boxed(Box::new(device))
    }

    /// Register an already boxed device
    pub fn register_boxed(&self, device: Box<dyn Device>) -> Result<()> {
        let id = device.id().clone();
        let snapshot = device.snapshot();

        {
            let mut slots = self.write()?;
            if slots.devices.contains_key(&id) {
                warn!("Device ID {} is already registered", id);
                return Err(DeviceError::DuplicateId(id));
            }
            if slots.retired.contains(&id) {
                warn!("Device ID {} was removed and cannot be reused", id);
                return Err(DeviceError::DuplicateId(id));
            }
            slots.devices.insert(id.clone(), Arc::new(Mutex::new(device)));
        }

        info!("Registered device {} ({})", snapshot.name, id);
        self.emit(RegistryEvent::DeviceAdded(snapshot));
        Ok(())
    }

    /// Remove a device, disconnecting it first if needed
    pub async fn unregister(&self, id: &Id) -> Result<()> {
        async {
            let device = {
                let mut slots = self.write()?;
                let device = slots
                    .devices
                    .remove(id)
                    .ok_or_else(|| DeviceError::NotFound(id.clone()))?;
                slots.retired.insert(id.clone());
                device
            };

            let mut device = device.lock().await;
            if device.is_connected() {
                device.disconnect().await?;
                self.emit(RegistryEvent::DeviceDisconnected(id.clone()));
            }

            info!("Unregistered device {} ({})", device.name(), id);
            self.emit(RegistryEvent::DeviceRemoved(id.clone()));
            Ok::<_, DeviceError>(())
        }
        .instrument(component_span("registry", Some(id.as_str())))
        .await
    }

    /// Get a snapshot of one device
    pub async fn get(&self, id: &Id) -> Result<DeviceSnapshot> {
        Ok(self.acquire(id).await?.snapshot())
    }

    /// Snapshots of every registered device, in no particular order
    pub async fn list(&self) -> Result<Vec<DeviceSnapshot>> {
        let devices: Vec<SharedDevice> = self.read()?.devices.values().cloned().collect();
        let snapshots = join_all(
            devices
                .iter()
                .map(|device| async move { device.lock().await.snapshot() }),
        )
        .await;
        Ok(snapshots)
    }

    /// Connect a device using the registry's requested version
    pub async fn connect(&self, id: &Id) -> Result<ProtocolVersion> {
        self.connect_with(id, self.requested_version).await
    }

    /// Connect a device, asking for a specific protocol version
    pub async fn connect_with(
        &self,
        id: &Id,
        requested: Option<ProtocolVersion>,
    ) -> Result<ProtocolVersion> {
        async {
            let version = self.acquire(id).await?.connect(requested).await?;
            self.emit(RegistryEvent::DeviceConnected {
                id: id.clone(),
                version,
            });
            Ok::<_, DeviceError>(version)
        }
        .instrument(operation_span("connect", id.as_str()))
        .await
    }

    /// Disconnect a device; succeeds when it is already disconnected
    pub async fn disconnect(&self, id: &Id) -> Result<()> {
        async {
            let mut device = self.acquire(id).await?;
            let was_connected = device.is_connected();
            device.disconnect().await?;
            if was_connected {
                self.emit(RegistryEvent::DeviceDisconnected(id.clone()));
            }
            Ok::<_, DeviceError>(())
        }
        .instrument(operation_span("disconnect", id.as_str()))
        .await
    }

    /// Route a command to a device and return its envelope
    pub async fn send_command(&self, id: &Id, command: &str, params: &Params) -> Envelope {
        async {
            let mut device = match self.acquire(id).await {
                Ok(device) => device,
                Err(err) => {
                    warn!("Command {} for unknown device {}", command, id);
                    return Envelope::failure(id.clone(), &err);
                }
            };
            debug!("Routing {} to {}", command, id);
            device.send_command(command, params).await
        }
        .instrument(operation_span(command, id.as_str()))
        .await
    }

    /// Connection flag and variant fields of a device
    pub async fn state(&self, id: &Id) -> Result<DeviceState> {
        Ok(self.acquire(id).await?.state())
    }

    /// The command table of a device
    pub async fn commands(&self, id: &Id) -> Result<&'static CommandTable> {
        Ok(self.acquire(id).await?.commands())
    }

    /// Check if a device is registered
    pub fn contains(&self, id: &Id) -> Result<bool> {
        Ok(self.read()?.devices.contains_key(id))
    }

    /// Count registered devices
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.devices.len())
    }

    /// Whether no devices are registered
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.devices.is_empty())
    }

    /// Subscribe to registry events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Disconnect and remove every device
    pub async fn shutdown(&self) -> Result<()> {
        let devices: Vec<(Id, SharedDevice)> = {
            let mut slots = self.write()?;
            let devices: Vec<(Id, SharedDevice)> = slots.devices.drain().collect();
            slots.retired.extend(devices.iter().map(|(id, _)| id.clone()));
            devices
        };
        let count = devices.len();

        async {
            for (id, device) in devices {
                let mut device = device.lock().await;
                if device.is_connected() {
                    if let Err(e) = device.disconnect().await {
                        // Continue with other devices even if one fails
                        warn!("Failed to disconnect device {}: {}", id, e);
                    } else {
                        self.emit(RegistryEvent::DeviceDisconnected(id.clone()));
                    }
                }
                self.emit(RegistryEvent::DeviceRemoved(id));
            }
            info!("Shut down {} devices", count);
        }
        .instrument(component_span("registry", None))
        .await;
        Ok(())
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A shared device registry that can be cloned
#[derive(Debug, Clone)]
pub struct SharedDeviceRegistry(Arc<DeviceRegistry>);

impl SharedDeviceRegistry {
    /// Create a new shared device registry
    pub fn new() -> Self {
        Self(Arc::new(DeviceRegistry::new()))
    }

    /// Get a reference to the device registry
    pub fn registry(&self) -> &DeviceRegistry {
        &self.0
    }
}

impl Default for SharedDeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DeviceRegistry> for SharedDeviceRegistry {
    fn from(registry: DeviceRegistry) -> Self {
        Self(Arc::new(registry))
    }
}

impl AsRef<DeviceRegistry> for SharedDeviceRegistry {
    fn as_ref(&self) -> &DeviceRegistry {
        self.registry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use accessim_core::params;
    use accessim_core::types::Value;

    use crate::device::ErrorKind;
    use crate::devices::{EnvironmentalSensor, InputController, LightingController};
    use crate::sources::ScriptedSamples;

    fn led() -> Id {
        Id::from("led_controller_001")
    }

    fn gamepad() -> Id {
        Id::from("game_controller_001")
    }

    async fn connect_and_brighten(registry: &DeviceRegistry, id: &Id, value: i64) {
        registry.connect(id).await.unwrap();
        let envelope = registry
            .send_command(id, "set_brightness", &params! { "value" => value })
            .await;
        assert!(envelope.is_success());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let registry = DeviceRegistry::new();
        registry.register(LightingController::new()).unwrap();
        connect_and_brighten(&registry, &led(), 80).await;

        let err = registry.register(LightingController::new()).unwrap_err();
        assert_eq!(err, DeviceError::DuplicateId(led()));

        // The first registration is untouched.
        assert_eq!(registry.len().unwrap(), 1);
        let state = registry.state(&led()).await.unwrap();
        assert!(state.connected);
        assert_eq!(state.properties.get("brightness"), Some(&Value::Integer(80)));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let registry = DeviceRegistry::new();
        let ghost = Id::from("ghost");

        assert_eq!(registry.get(&ghost).await, Err(DeviceError::NotFound(ghost.clone())));
        assert_eq!(
            registry.connect(&ghost).await,
            Err(DeviceError::NotFound(ghost.clone()))
        );
        assert!(registry.disconnect(&ghost).await.is_err());
        assert!(registry.unregister(&ghost).await.is_err());
        assert!(registry.state(&ghost).await.is_err());

        let envelope = registry.send_command(&ghost, "power", &params! { "value" => true }).await;
        assert!(!envelope.is_success());
        assert_eq!(envelope.error, Some(ErrorKind::NotFound));
        assert_eq!(envelope.device_id, ghost);
    }

    #[tokio::test]
    async fn test_connect_round_trip() {
        let registry = DeviceRegistry::new().with_requested_version(ProtocolVersion::V2);
        registry.register(LightingController::new()).unwrap();

        assert_eq!(registry.connect(&led()).await, Ok(ProtocolVersion::V2));
        assert_eq!(
            registry.connect(&led()).await,
            Err(DeviceError::AlreadyConnected(led()))
        );

        let snapshot = registry.get(&led()).await.unwrap();
        assert!(snapshot.connected);
        assert_eq!(snapshot.negotiated_version, Some(ProtocolVersion::V2));

        registry.disconnect(&led()).await.unwrap();
        registry.disconnect(&led()).await.unwrap();
        assert!(!registry.get(&led()).await.unwrap().connected);
    }

    #[tokio::test]
    async fn test_command_routing() {
        let registry = DeviceRegistry::new();
        registry.register(InputController::new()).unwrap();

        let envelope = registry
            .send_command(&gamepad(), "read_input", &params!())
            .await;
        assert_eq!(envelope.error, Some(ErrorKind::NotConnected));

        registry.connect(&gamepad()).await.unwrap();
        let envelope = registry
            .send_command(
                &gamepad(),
                "set_vibration",
                &params! { "left" => 30, "right" => 200 },
            )
            .await;
        assert!(envelope.is_success());
        let vibration = envelope.field("vibration").unwrap();
        assert_eq!(vibration.get("left"), Some(&Value::Integer(30)));
        assert_eq!(vibration.get("right"), Some(&Value::Integer(100)));

        let commands = registry.commands(&gamepad()).await.unwrap();
        assert_eq!(commands.names(), vec!["read_input", "set_vibration"]);
    }

    #[tokio::test]
    async fn test_sensor_logging_through_registry() {
        let registry = DeviceRegistry::new();
        let sensor = EnvironmentalSensor::new()
            .with_source(ScriptedSamples::from_pairs([(20.0, 40.0), (21.0, 41.0), (22.0, 42.0)]));
        let id = sensor.id().clone();
        registry.register(sensor).unwrap();
        registry.connect(&id).await.unwrap();

        assert!(registry.send_command(&id, "start_logging", &params!()).await.is_success());
        for _ in 0..3 {
            registry.send_command(&id, "read_temperature", &params!()).await;
        }
        registry.send_command(&id, "stop_logging", &params!()).await;
        registry.send_command(&id, "read_humidity", &params!()).await;

        let envelope = registry.send_command(&id, "read_log", &params!()).await;
        assert_eq!(envelope.field("count"), Some(&Value::Integer(3)));
    }

    #[tokio::test]
    async fn test_unregister_disconnects_first() {
        let registry = DeviceRegistry::new();
        let mut events = registry.subscribe();

        registry.register(LightingController::new()).unwrap();
        registry.connect(&led()).await.unwrap();
        registry.unregister(&led()).await.unwrap();

        assert!(matches!(events.recv().await, Ok(RegistryEvent::DeviceAdded(_))));
        assert!(matches!(
            events.recv().await,
            Ok(RegistryEvent::DeviceConnected { .. })
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::DeviceDisconnected(led())
        );
        assert_eq!(events.recv().await.unwrap(), RegistryEvent::DeviceRemoved(led()));

        assert!(!registry.contains(&led()).unwrap());
        assert_eq!(registry.get(&led()).await, Err(DeviceError::NotFound(led())));
    }

    #[tokio::test]
    async fn test_removed_ids_are_not_reused() {
        let registry = DeviceRegistry::new();
        registry.register(LightingController::new()).unwrap();
        registry.connect(&led()).await.unwrap();
        registry.unregister(&led()).await.unwrap();

        let err = registry.register(LightingController::new()).unwrap_err();
        assert_eq!(err, DeviceError::DuplicateId(led()));
        assert_eq!(registry.get(&led()).await, Err(DeviceError::NotFound(led())));
        assert!(registry.is_empty().unwrap());

        registry.register(InputController::new()).unwrap();
        registry.shutdown().await.unwrap();
        let err = registry.register(InputController::new()).unwrap_err();
        assert_eq!(err, DeviceError::DuplicateId(gamepad()));
    }

    #[tokio::test]
    async fn test_double_disconnect_keeps_state() {
        let registry = DeviceRegistry::new();
        registry.register(LightingController::new()).unwrap();
        connect_and_brighten(&registry, &led(), 42).await;
        let envelope = registry
            .send_command(&led(), "set_pattern", &params! { "value" => "pulse" })
            .await;
        assert!(envelope.is_success());
        let before = registry.state(&led()).await.unwrap().properties;

        registry.disconnect(&led()).await.unwrap();
        registry.disconnect(&led()).await.unwrap();

        let after = registry.state(&led()).await.unwrap();
        assert!(!after.connected);
        assert_eq!(after.properties, before);
        assert_eq!(after.properties.get("brightness"), Some(&Value::Integer(42)));
    }

    #[tokio::test]
    async fn test_command_waiting_on_removed_device_is_not_found() {
        let shared = SharedDeviceRegistry::new();
        shared.registry().register(LightingController::new()).unwrap();
        shared.registry().connect(&led()).await.unwrap();

        // Hold the device so the command and the removal both queue behind us
        let held = shared.registry().lookup(&led()).unwrap().lock_owned().await;
        let pending = {
            let shared = shared.clone();
            tokio::spawn(async move {
                shared
                    .registry()
                    .send_command(&led(), "power", &params! { "value" => true })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let removal = {
            let shared = shared.clone();
            tokio::spawn(async move { shared.registry().unregister(&led()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!shared.registry().contains(&led()).unwrap());
        drop(held);

        let envelope = pending.await.unwrap();
        assert_eq!(envelope.error, Some(ErrorKind::NotFound));
        removal.await.unwrap().unwrap();
        assert_eq!(
            shared.registry().state(&led()).await,
            Err(DeviceError::NotFound(led()))
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_shutdown_empties_registry() {
        let registry = DeviceRegistry::new();
        registry.register(LightingController::new()).unwrap();
        registry.register(EnvironmentalSensor::new()).unwrap();
        registry.register(InputController::new()).unwrap();
        registry.connect(&led()).await.unwrap();

        let mut listed: Vec<String> = registry
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        listed.sort();
        assert_eq!(
            listed,
            vec!["game_controller_001", "led_controller_001", "temp_sensor_001"]
        );

        registry.shutdown().await.unwrap();
        assert!(registry.is_empty().unwrap());
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_commands() {
        let shared = SharedDeviceRegistry::new();
        shared.registry().register(LightingController::new()).unwrap();
        shared.registry().register(InputController::new()).unwrap();
        shared.registry().connect(&led()).await.unwrap();
        shared.registry().connect(&gamepad()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let shared = shared.clone();
            handles.push(tokio::spawn(async move {
                let registry = shared.as_ref();
                let (id, command, params) = if i % 2 == 0 {
                    (led(), "set_brightness", params! { "value" => i })
                } else {
                    (gamepad(), "set_vibration", params! { "left" => i, "right" => i })
                };
                registry.send_command(&id, command, &params).await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_success());
        }

        let state = shared.registry().state(&led()).await.unwrap();
        let brightness = state.properties.get("brightness").and_then(Value::as_integer);
        assert!(matches!(brightness, Some(b) if b % 2 == 0 && b <= 18));
    }
}
