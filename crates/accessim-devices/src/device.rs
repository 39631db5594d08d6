/*!
 * Device trait and core device abstractions.
 *
 * Every simulated accessory embeds a [`BaseDevice`] that owns its identity
 * and handshake state, and implements [`Device`] by supplying a static
 * command table plus the code that applies an already-validated command to
 * its private state. Connection checks, command lookup, protocol gating and
 * parameter validation all happen in the trait's provided methods, before
 * a variant ever sees the call.
 */
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use accessim_core::types::{ConnectionType, Id, Metadata, Params, ProtocolVersion, Value};

use crate::envelope::Envelope;
use crate::negotiator::{Identification, NegotiationError, NegotiationState, Negotiator};
use crate::schema::{CommandSpec, CommandTable, ValidatedParams};

/// Error type for device and registry operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// No device is registered under the ID
    #[error("Device {0} not found")]
    NotFound(Id),

    /// A device with the same ID is already registered
    #[error("Device with ID {0} already registered")]
    DuplicateId(Id),

    /// The device must be connected for this operation
    #[error("Device {0} is not connected")]
    NotConnected(Id),

    /// The device has already completed a handshake
    #[error("Device {0} is already connected")]
    AlreadyConnected(Id),

    /// The command is not in the device's command table
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// A required parameter is absent
    #[error("Missing parameter {parameter} for command {command}")]
    MissingParameter {
        /// The command being executed
        command: String,
        /// The absent key
        parameter: String,
    },

    /// A parameter has the wrong type or an unacceptable value
    #[error("Invalid parameter {parameter}: {reason}")]
    InvalidParameter {
        /// The offending key
        parameter: String,
        /// What was wrong with it
        reason: String,
    },

    /// The negotiated protocol version does not carry the command
    #[error("Command {command} requires {required}, connection negotiated {negotiated}")]
    UnsupportedByProtocol {
        /// The command being executed
        command: String,
        /// Lowest version that carries it
        required: ProtocolVersion,
        /// Version of the current connection
        negotiated: ProtocolVersion,
    },

    /// The handshake could not be completed
    #[error("Negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Internal failure, such as a poisoned lock
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Machine-readable category of a [`DeviceError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`DeviceError::NotFound`]
    NotFound,
    /// See [`DeviceError::DuplicateId`]
    DuplicateId,
    /// See [`DeviceError::NotConnected`]
    NotConnected,
    /// See [`DeviceError::AlreadyConnected`]
    AlreadyConnected,
    /// See [`DeviceError::UnknownCommand`]
    UnknownCommand,
    /// See [`DeviceError::MissingParameter`]
    MissingParameter,
    /// See [`DeviceError::InvalidParameter`]
    InvalidParameter,
    /// See [`DeviceError::UnsupportedByProtocol`]
    UnsupportedByProtocol,
    /// See [`DeviceError::Negotiation`]
    Negotiation,
    /// See [`DeviceError::Internal`]
    Internal,
}

impl DeviceError {
    /// The error's category
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::NotFound(_) => ErrorKind::NotFound,
            DeviceError::DuplicateId(_) => ErrorKind::DuplicateId,
            DeviceError::NotConnected(_) => ErrorKind::NotConnected,
            DeviceError::AlreadyConnected(_) => ErrorKind::AlreadyConnected,
            DeviceError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            DeviceError::MissingParameter { .. } => ErrorKind::MissingParameter,
            DeviceError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            DeviceError::UnsupportedByProtocol { .. } => ErrorKind::UnsupportedByProtocol,
            DeviceError::Negotiation(_) => ErrorKind::Negotiation,
            DeviceError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Create a new internal error
    pub fn internal<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Internal(msg.as_ref().to_string())
    }
}

/// Static device identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// The device ID
    pub id: Id,
    /// The device name
    pub name: String,
    /// The device type (lighting, sensor, input, ...)
    pub device_type: String,
    /// The device manufacturer
    pub manufacturer: String,
    /// The model name sent during identification
    pub model: String,
    /// The device description
    pub description: String,
    /// The accessory version string
    pub version: String,
    /// Informational URI
    pub uri: String,
    /// The device serial number
    pub serial_number: String,
    /// The physical link
    pub connection_type: ConnectionType,
    /// The highest protocol version the device speaks
    pub protocol_version: ProtocolVersion,
    /// Capability tags
    pub features: Vec<String>,
}

impl DeviceInfo {
    /// The strings presented during identification
    pub fn identification(&self) -> Identification {
        Identification {
            manufacturer: self.manufacturer.clone(),
            model: self.model.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            uri: self.uri.clone(),
            serial: self.serial_number.clone(),
        }
    }

    /// Check if the device exposes a capability tag
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

/// Read-only projection of a device for listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    /// The device ID
    pub id: Id,
    /// The device name
    pub name: String,
    /// The device type
    pub device_type: String,
    /// The device manufacturer
    pub manufacturer: String,
    /// The device description
    pub description: String,
    /// The physical link
    pub connection_type: ConnectionType,
    /// The highest protocol version the device speaks
    pub protocol_version: ProtocolVersion,
    /// Capability tags
    pub features: Vec<String>,
    /// Whether a handshake has completed
    pub connected: bool,
    /// Version of the current connection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negotiated_version: Option<ProtocolVersion>,
}

/// Connection flag plus variant-specific fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    /// The device ID
    pub id: Id,
    /// Whether a handshake has completed
    pub connected: bool,
    /// Version of the current connection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negotiated_version: Option<ProtocolVersion>,
    /// Variant-specific fields
    #[serde(flatten)]
    pub properties: Metadata,
}

/// Identity and connection state shared by every device variant
#[derive(Debug, Clone)]
pub struct BaseDevice {
    info: DeviceInfo,
    negotiator: Negotiator,
}

impl BaseDevice {
    /// Create a new, disconnected base device
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            negotiator: Negotiator::new(),
        }
    }

    /// The device information
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Mutable access to identity while the device is still being built
    pub(crate) fn info_mut(&mut self) -> &mut DeviceInfo {
        &mut self.info
    }

    /// The handshake state machine
    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    /// Whether a handshake has completed
    pub fn is_connected(&self) -> bool {
        self.negotiator.is_active()
    }

    /// Version of the current connection
    pub fn negotiated_version(&self) -> Option<ProtocolVersion> {
        if self.is_connected() {
            self.negotiator.selected_version()
        } else {
            None
        }
    }

    /// Run the handshake
    pub fn connect(&mut self, requested: Option<ProtocolVersion>) -> Result<ProtocolVersion> {
        if self.is_connected() {
            warn!("Device {} is already connected", self.info.name);
            return Err(DeviceError::AlreadyConnected(self.info.id.clone()));
        }

        info!("Connecting device {} ({})", self.info.name, self.info.id);
        let identification = self.info.identification();
        let version = self
            .negotiator
            .run(&identification, self.info.protocol_version, requested)?;
        info!(
            "Device {} connected over {} using {}",
            self.info.name, self.info.connection_type, version
        );
        Ok(version)
    }

    /// Drop the connection; returns whether one existed
    pub fn disconnect(&mut self) -> bool {
        let was_connected = self.is_connected();
        if self.negotiator.state() != NegotiationState::Idle {
            self.negotiator.reset();
        }
        if was_connected {
            info!("Device {} disconnected", self.info.name);
        } else {
            debug!("Device {} was not connected", self.info.name);
        }
        was_connected
    }

    /// Resolve a command and check it may run on the current connection
    pub fn authorize(&self, table: &CommandTable, command: &str) -> Result<&'static CommandSpec> {
        let negotiated = self
            .negotiated_version()
            .ok_or_else(|| DeviceError::NotConnected(self.info.id.clone()))?;

        let spec = table
            .lookup(command)
            .ok_or_else(|| DeviceError::UnknownCommand(command.to_string()))?;

        if negotiated < spec.min_version {
            return Err(DeviceError::UnsupportedByProtocol {
                command: command.to_string(),
                required: spec.min_version,
                negotiated,
            });
        }

        Ok(spec)
    }
}

/// The core device trait
///
/// Implementors provide identity through [`Device::base`], their command
/// table, and [`Device::apply`]. Callers go through the provided async
/// methods, which enforce the connection and schema rules.
#[async_trait]
pub trait Device: Send + Sync + Debug {
    /// The embedded identity and connection state
    fn base(&self) -> &BaseDevice;

    /// Mutable access to the embedded identity and connection state
    fn base_mut(&mut self) -> &mut BaseDevice;

    /// The commands this device accepts
    fn commands(&self) -> &'static CommandTable;

    /// Apply a command whose parameters already passed validation.
    ///
    /// Only called by [`Device::execute_command`], on a connected device.
    /// Implementations must finish every fallible step before writing state.
    fn apply(&mut self, command: &'static CommandSpec, params: &ValidatedParams) -> Result<Value>;

    /// Variant-specific state fields
    fn properties(&self) -> Metadata;

    /// Get the device information
    fn info(&self) -> &DeviceInfo {
        self.base().info()
    }

    /// Get the device ID
    fn id(&self) -> &Id {
        &self.info().id
    }

    /// Get the device name
    fn name(&self) -> &str {
        &self.info().name
    }

    /// Whether a handshake has completed
    fn is_connected(&self) -> bool {
        self.base().is_connected()
    }

    /// Version of the current connection
    fn negotiated_version(&self) -> Option<ProtocolVersion> {
        self.base().negotiated_version()
    }

    /// Read-only projection for listings
    fn snapshot(&self) -> DeviceSnapshot {
        let info = self.info();
        DeviceSnapshot {
            id: info.id.clone(),
            name: info.name.clone(),
            device_type: info.device_type.clone(),
            manufacturer: info.manufacturer.clone(),
            description: info.description.clone(),
            connection_type: info.connection_type,
            protocol_version: info.protocol_version,
            features: info.features.clone(),
            connected: self.is_connected(),
            negotiated_version: self.negotiated_version(),
        }
    }

    /// Connection flag plus variant fields
    fn state(&self) -> DeviceState {
        DeviceState {
            id: self.id().clone(),
            connected: self.is_connected(),
            negotiated_version: self.negotiated_version(),
            properties: self.properties(),
        }
    }

    /// Connect to the device, negotiating a protocol version
    async fn connect(&mut self, requested: Option<ProtocolVersion>) -> Result<ProtocolVersion> {
        self.base_mut().connect(requested)
    }

    /// Disconnect from the device; succeeds when already disconnected
    async fn disconnect(&mut self) -> Result<()> {
        self.base_mut().disconnect();
        Ok(())
    }

    /// Execute a command on the device
    async fn execute_command(&mut self, command: &str, params: &Params) -> Result<Value> {
        let spec = self.base().authorize(self.commands(), command)?;
        let validated = spec.validate(params)?;
        debug!("Executing {} on {}", command, self.id());
        self.apply(spec, &validated)
    }

    /// Execute a command and wrap the outcome in an [`Envelope`]
    async fn send_command(&mut self, command: &str, params: &Params) -> Envelope {
        let id = self.id().clone();
        match self.execute_command(command, params).await {
            Ok(data) => Envelope::success(id, data),
            Err(err) => {
                warn!("Command {} on {} rejected: {}", command, id, err);
                Envelope::failure(id, &err)
            }
        }
    }
}
