/*!
 * RGB lighting controller.
 *
 * A USB accessory with a brightness level, a color, a blink pattern and a
 * power switch. All of its commands are available from the first protocol
 * version.
 */
use async_trait::async_trait;
use tracing::info;

use accessim_core::types::{ConnectionType, Id, Metadata, ProtocolVersion, Value};

use crate::device::{BaseDevice, Device, DeviceError, DeviceInfo, Result};
use crate::schema::{CommandSpec, CommandTable, ParamKind, ParamSpec, ValidatedParams};

/// Default ID of the built-in lighting controller
pub const DEFAULT_ID: &str = "led_controller_001";

/// Lighting patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Steady light
    Solid,
    /// On and off
    Blink,
    /// Fading in and out
    Pulse,
    /// Cycling through colors
    Rainbow,
}

impl Pattern {
    /// Every pattern name, as accepted by `set_pattern`
    pub const NAMES: &'static [&'static str] = &["solid", "blink", "pulse", "rainbow"];

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Pattern::Solid => "solid",
            Pattern::Blink => "blink",
            Pattern::Pulse => "pulse",
            Pattern::Rainbow => "rainbow",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "solid" => Some(Pattern::Solid),
            "blink" => Some(Pattern::Blink),
            "pulse" => Some(Pattern::Pulse),
            "rainbow" => Some(Pattern::Rainbow),
            _ => None,
        }
    }
}

impl From<Pattern> for Value {
    fn from(pattern: Pattern) -> Self {
        Value::String(pattern.as_str().to_string())
    }
}

const PERCENT: ParamKind = ParamKind::Integer { min: 0, max: 100 };

const SET_BRIGHTNESS_PARAMS: &[ParamSpec] = &[ParamSpec::required("value", PERCENT)];
const SET_COLOR_PARAMS: &[ParamSpec] = &[ParamSpec::required("value", ParamKind::HexColor)];
const SET_PATTERN_PARAMS: &[ParamSpec] = &[ParamSpec::required(
    "value",
    ParamKind::OneOf {
        values: Pattern::NAMES,
    },
)];
const POWER_PARAMS: &[ParamSpec] = &[ParamSpec::required("value", ParamKind::Boolean)];

const COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("set_brightness", "Set LED brightness (0-100)")
        .with_params(SET_BRIGHTNESS_PARAMS),
    CommandSpec::new("set_color", "Set LED color (#RRGGBB)").with_params(SET_COLOR_PARAMS),
    CommandSpec::new("set_pattern", "Set LED pattern").with_params(SET_PATTERN_PARAMS),
    CommandSpec::new("power", "Turn the LEDs on or off").with_params(POWER_PARAMS),
];

static LIGHTING_COMMANDS: CommandTable = CommandTable::new(COMMANDS);

/// RGB LED controller
#[derive(Debug, Clone)]
pub struct LightingController {
    base: BaseDevice,
    brightness: u8,
    color: String,
    pattern: Pattern,
    power: bool,
}

impl Default for LightingController {
    fn default() -> Self {
        Self::new()
    }
}

impl LightingController {
    /// Create the controller with its stock identity
    pub fn new() -> Self {
        let info = DeviceInfo {
            id: Id::from(DEFAULT_ID),
            name: "RGB LED Controller".to_string(),
            device_type: "lighting".to_string(),
            manufacturer: "ADK Tutorial".to_string(),
            model: "RGB LED Controller".to_string(),
            description: "Controls RGB LED strips with various patterns".to_string(),
            version: "1.0".to_string(),
            uri: "https://example.com/adk/led".to_string(),
            serial_number: "LED00123456789".to_string(),
            connection_type: ConnectionType::Usb,
            protocol_version: ProtocolVersion::V2,
            features: vec![
                "color_control".to_string(),
                "brightness_control".to_string(),
                "pattern_selection".to_string(),
            ],
        };

        Self {
            base: BaseDevice::new(info),
            brightness: 50,
            color: "#FFFFFF".to_string(),
            pattern: Pattern::Solid,
            power: false,
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

    /// Brightness level, 0 to 100
    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Color as `#RRGGBB`
    pub fn color(&self) -> &str {
        &self.color
    }

    /// Active pattern
    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    /// Whether the LEDs are on
    pub fn power(&self) -> bool {
        self.power
    }
}

#[async_trait]
impl Device for LightingController {
    fn base(&self) -> &BaseDevice {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseDevice {
        &mut self.base
    }

    fn commands(&self) -> &'static CommandTable {
        &LIGHTING_COMMANDS
    }

    fn apply(&mut self, command: &'static CommandSpec, params: &ValidatedParams) -> Result<Value> {
        match command.name {
            "set_brightness" => {
                let value = params.require_integer("value")?;
                let brightness = u8::try_from(value).map_err(|_| {
                    DeviceError::internal(format!("brightness {} out of range", value))
                })?;
                self.brightness = brightness;
                info!("Brightness set to {}", brightness);
                Ok(Value::object([("brightness", brightness)]))
            }
            "set_color" => {
                let color = params.require_str("value")?.to_string();
                info!("Color set to {}", color);
                self.color = color.clone();
                Ok(Value::object([("color", color)]))
            }
            "set_pattern" => {
                let name = params.require_str("value")?;
                let pattern = Pattern::from_str(name)
                    .ok_or_else(|| DeviceError::internal(format!("unmapped pattern {}", name)))?;
                self.pattern = pattern;
                info!("Pattern set to {}", pattern.as_str());
                Ok(Value::object([("pattern", pattern)]))
            }
            "power" => {
                let power = params.require_bool("value")?;
                self.power = power;
                info!("LEDs turned {}", if power { "on" } else { "off" });
                Ok(Value::object([("power", power)]))
            }
            other => Err(DeviceError::UnknownCommand(other.to_string())),
        }
    }

    fn properties(&self) -> Metadata {
        let mut properties = Metadata::new();
        properties.insert("brightness".to_string(), self.brightness.into());
        properties.insert("color".to_string(), self.color.clone().into());
        properties.insert("pattern".to_string(), self.pattern.into());
        properties.insert("power".to_string(), self.power.into());
        properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accessim_core::params;

    use crate::device::ErrorKind;

    async fn connected() -> LightingController {
        let mut led = LightingController::new();
        led.connect(None).await.unwrap();
        led
    }

    #[test]
    fn test_stock_identity() {
        let led = LightingController::new();
        assert_eq!(led.id().as_str(), DEFAULT_ID);
        assert_eq!(led.info().connection_type, ConnectionType::Usb);
        assert_eq!(led.info().protocol_version, ProtocolVersion::V2);
        assert!(led.info().has_feature("pattern_selection"));
        assert_eq!(led.brightness(), 50);
        assert_eq!(led.color(), "#FFFFFF");
        assert_eq!(led.pattern(), Pattern::Solid);
        assert!(!led.power());
    }

    #[tokio::test]
    async fn test_brightness_is_clamped() {
        let mut led = connected().await;

        for (input, expected) in [(0, 0), (100, 100), (150, 100), (-20, 0), (75, 75)] {
            let data = led
                .execute_command("set_brightness", &params! { "value" => input })
                .await
                .unwrap();
            assert_eq!(data.get("brightness"), Some(&Value::Integer(expected)));
            assert_eq!(i64::from(led.brightness()), expected);
        }
    }

    #[tokio::test]
    async fn test_color_pattern_and_power() {
        let mut led = connected().await;

        led.execute_command("set_color", &params! { "value" => "#ff0000" })
            .await
            .unwrap();
        assert_eq!(led.color(), "#FF0000");

        let data = led
            .execute_command("set_pattern", &params! { "value" => "pulse" })
            .await
            .unwrap();
        assert_eq!(data.get("pattern"), Some(&Value::from("pulse")));
        assert_eq!(led.pattern(), Pattern::Pulse);

        led.execute_command("power", &params! { "value" => true })
            .await
            .unwrap();
        assert!(led.power());
    }

    #[tokio::test]
    async fn test_failures_leave_state_untouched() {
        let mut led = LightingController::new();
        let before = led.state();
        let err = led
            .execute_command("set_brightness", &params! { "value" => 10 })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
        assert_eq!(led.state(), before);

        led.connect(None).await.unwrap();
        let before = led.state();

        let cases = [
            ("set_color", params! { "value" => "red" }, ErrorKind::InvalidParameter),
            ("set_color", params! { "value" => "#12345" }, ErrorKind::InvalidParameter),
            ("set_pattern", params! { "value" => "strobe" }, ErrorKind::InvalidParameter),
            ("set_brightness", params! { "value" => "bright" }, ErrorKind::InvalidParameter),
            ("power", params! { "value" => "on" }, ErrorKind::InvalidParameter),
            ("set_brightness", params!(), ErrorKind::MissingParameter),
            ("dim", params! { "value" => 1 }, ErrorKind::UnknownCommand),
        ];
        for (command, params, kind) in cases {
            let err = led.execute_command(command, &params).await.unwrap_err();
            assert_eq!(err.kind(), kind, "{}", command);
            assert_eq!(led.state(), before, "{}", command);
        }
    }

    #[tokio::test]
    async fn test_state_survives_reconnect() {
        let mut led = connected().await;
        led.execute_command("set_brightness", &params! { "value" => 80 })
            .await
            .unwrap();
        led.disconnect().await.unwrap();
        assert_eq!(led.brightness(), 80);

        let state = led.state();
        assert!(!state.connected);
        assert_eq!(state.properties.get("brightness"), Some(&Value::Integer(80)));
        assert_eq!(state.properties.get("pattern"), Some(&Value::from("solid")));
    }

    #[test]
    fn test_pattern_names() {
        for name in Pattern::NAMES {
            assert_eq!(Pattern::from_str(name).map(|p| p.as_str()), Some(*name));
        }
        assert_eq!(Pattern::from_str("RAINBOW"), Some(Pattern::Rainbow));
        assert_eq!(Pattern::from_str("strobe"), None);
    }
}
