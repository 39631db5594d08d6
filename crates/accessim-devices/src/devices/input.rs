/*!
 * Game controller.
 *
 * A USB accessory reporting buttons, two analog sticks and an accelerometer,
 * with two vibration motors. Both of its commands are HID style and need a
 * connection negotiated at the second protocol version.
 */
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use accessim_core::types::{ConnectionType, Id, Metadata, ProtocolVersion, Value};

use crate::device::{BaseDevice, Device, DeviceError, DeviceInfo, Result};
use crate::schema::{CommandSpec, CommandTable, ParamKind, ParamSpec, ValidatedParams};
use crate::sources::{InputSnapshot, InputSource, SimulatedInput};

/// Default ID of the built-in input controller
pub const DEFAULT_ID: &str = "game_controller_001";

const DEFAULT_SEED: u64 = 0x1a9c;

const MOTOR: ParamKind = ParamKind::Integer { min: 0, max: 100 };

const SET_VIBRATION_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("left", MOTOR),
    ParamSpec::required("right", MOTOR),
];

const COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("read_input", "Read buttons, joysticks and accelerometer")
        .requires(ProtocolVersion::V2),
    CommandSpec::new("set_vibration", "Set vibration motor intensities (0-100)")
        .with_params(SET_VIBRATION_PARAMS)
        .requires(ProtocolVersion::V2),
];

static INPUT_COMMANDS: CommandTable = CommandTable::new(COMMANDS);

/// Vibration motor intensities, 0 to 100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vibration {
    /// Left motor
    pub left: u8,
    /// Right motor
    pub right: u8,
}

impl From<Vibration> for Value {
    fn from(vibration: Vibration) -> Self {
        Value::object([("left", vibration.left), ("right", vibration.right)])
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map(Value::from)
        .map_err(|e| DeviceError::internal(format!("Failed to encode input: {}", e)))
}

fn motor(params: &ValidatedParams, key: &str) -> Result<u8> {
    let level = params.require_integer(key)?;
    u8::try_from(level)
        .map_err(|_| DeviceError::internal(format!("{} {} out of range", key, level)))
}

/// Game controller
#[derive(Debug)]
pub struct InputController {
    base: BaseDevice,
    source: Box<dyn InputSource>,
    last_input: InputSnapshot,
    vibration: Vibration,
}

impl Default for InputController {
    fn default() -> Self {
        Self::new()
    }
}

impl InputController {
    /// Create the controller with its stock identity and simulated input
    pub fn new() -> Self {
        let info = DeviceInfo {
            id: Id::from(DEFAULT_ID),
            name: "Game Controller".to_string(),
            device_type: "input".to_string(),
            manufacturer: "ADK Tutorial".to_string(),
            model: "Game Controller".to_string(),
            description: "Game controller with buttons, joysticks and motion sensing".to_string(),
            version: "1.0".to_string(),
            uri: "https://example.com/adk/gamepad".to_string(),
            serial_number: "GAME00123456789".to_string(),
            connection_type: ConnectionType::Usb,
            protocol_version: ProtocolVersion::V2,
            features: vec![
                "buttons".to_string(),
                "joystick".to_string(),
                "accelerometer".to_string(),
                "vibration".to_string(),
            ],
        };

        Self {
            base: BaseDevice::new(info),
            source: Box::new(SimulatedInput::new(DEFAULT_SEED)),
            last_input: InputSnapshot::default(),
            vibration: Vibration::default(),
        }
    }

    /// Use a different device ID
    pub fn with_id<I: Into<Id>>(mut self, id: I) -> Self {
        self.base.info_mut().id = id.into();
        self
    }

    /// Advertise a different protocol version
    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.base.info_mut().protocol_version = version;
        self
    }

    /// Read input from another source
    pub fn with_source<S: InputSource + 'static>(mut self, source: S) -> Self {
        self.source = Box::new(source);
        self
    }

    /// The snapshot returned by the last `read_input`
    pub fn last_input(&self) -> &InputSnapshot {
        &self.last_input
    }

    /// Current motor intensities
    pub fn vibration(&self) -> Vibration {
        self.vibration
    }
}

#[async_trait]
impl Device for InputController {
    fn base(&self) -> &BaseDevice {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseDevice {
        &mut self.base
    }

    fn commands(&self) -> &'static CommandTable {
        &INPUT_COMMANDS
    }

    fn apply(&mut self, command: &'static CommandSpec, params: &ValidatedParams) -> Result<Value> {
        match command.name {
            "read_input" => {
                let snapshot = self.source.poll();
                let data = to_value(&snapshot)?;
                self.last_input = snapshot;
                debug!("Read input state");
                Ok(data)
            }
            "set_vibration" => {
                let vibration = Vibration {
                    left: motor(params, "left")?,
                    right: motor(params, "right")?,
                };
                self.vibration = vibration;
                info!(
                    "Vibration set: left={}, right={}",
                    vibration.left, vibration.right
                );
                Ok(Value::object([("vibration", vibration)]))
            }
            other => Err(DeviceError::UnknownCommand(other.to_string())),
        }
    }

    fn properties(&self) -> Metadata {
        let mut properties = Metadata::new();
        properties.insert("vibration".to_string(), self.vibration.into());
        if let Ok(input) = to_value(&self.last_input) {
            properties.insert("input".to_string(), input);
        }
        properties
    }
}
