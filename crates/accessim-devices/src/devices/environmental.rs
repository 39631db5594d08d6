/*!
 * Temperature and humidity sensor.
 *
 * A Bluetooth accessory that reports readings from a [`SampleSource`] and can
 * keep a bounded, timestamped log of the readings taken while logging is on.
 */
use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use accessim_core::types::{ConnectionType, Id, Metadata, ProtocolVersion, Value};

use crate::device::{BaseDevice, Device, DeviceError, DeviceInfo, Result};
use crate::schema::{CommandSpec, CommandTable, ParamKind, ParamSpec, ValidatedParams};
use crate::sources::{Sample, SampleSource, SimulatedDrift};

/// Default ID of the built-in environmental sensor
pub const DEFAULT_ID: &str = "temp_sensor_001";

/// Log entries kept when no capacity is configured
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Logging interval used when `start_logging` gives none, in seconds
pub const DEFAULT_LOG_INTERVAL: u32 = 60;

/// Entries returned by `read_log` when no limit is given
pub const DEFAULT_READ_LIMIT: usize = 10;

const DEFAULT_SEED: u64 = 0x5e45;
const DEFAULT_DRIFT_INTERVAL: Duration = Duration::from_secs(5);

const START_LOGGING_PARAMS: &[ParamSpec] = &[ParamSpec::optional(
    "interval",
    ParamKind::Integer { min: 1, max: 3600 },
)];
// Upper bound is re-clamped to the configured capacity when applied.
const READ_LOG_PARAMS: &[ParamSpec] = &[ParamSpec::optional(
    "limit",
    ParamKind::Integer {
        min: 1,
        max: i64::MAX,
    },
)];

const COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("read_temperature", "Read the current temperature"),
    CommandSpec::new("read_humidity", "Read the current humidity"),
    CommandSpec::new("start_logging", "Start logging readings").with_params(START_LOGGING_PARAMS),
    CommandSpec::new("stop_logging", "Stop logging readings"),
    CommandSpec::new("read_log", "Read the most recent log entries").with_params(READ_LOG_PARAMS),
];

static ENVIRONMENTAL_COMMANDS: CommandTable = CommandTable::new(COMMANDS);

/// A logged reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LogEntry {
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity, percent
    pub humidity: f64,
}

impl From<&LogEntry> for Value {
    fn from(entry: &LogEntry) -> Self {
        Value::object([
            ("timestamp", Value::from(entry.timestamp)),
            ("temperature", Value::from(entry.temperature)),
            ("humidity", Value::from(entry.humidity)),
        ])
    }
}

/// Temperature and humidity sensor
#[derive(Debug)]
pub struct EnvironmentalSensor {
    base: BaseDevice,
    source: Box<dyn SampleSource>,
    latest: Sample,
    logging: bool,
    log_interval: u32,
    log: VecDeque<LogEntry>,
    log_capacity: usize,
}

impl Default for EnvironmentalSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentalSensor {
    /// Create the sensor with its stock identity and a drifting source
    pub fn new() -> Self {
        let info = DeviceInfo {
            id: Id::from(DEFAULT_ID),
            name: "Temperature & Humidity Sensor".to_string(),
            device_type: "sensor".to_string(),
            manufacturer: "ADK Tutorial".to_string(),
            model: "Temperature & Humidity Sensor".to_string(),
            description: "Measures temperature and humidity".to_string(),
            version: "1.0".to_string(),
            uri: "https://example.com/adk/temp".to_string(),
            serial_number: "TEMP00123456789".to_string(),
            connection_type: ConnectionType::Bluetooth,
            protocol_version: ProtocolVersion::V1,
            features: vec![
                "temperature_reading".to_string(),
                "humidity_reading".to_string(),
                "data_logging".to_string(),
            ],
        };

        Self {
            base: BaseDevice::new(info),
            source: Box::new(SimulatedDrift::new(DEFAULT_SEED, DEFAULT_DRIFT_INTERVAL)),
            latest: Sample::default(),
            logging: false,
            log_interval: DEFAULT_LOG_INTERVAL,
            log: VecDeque::new(),
            log_capacity: DEFAULT_LOG_CAPACITY,
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

    /// Read samples from another source
    pub fn with_source<S: SampleSource + 'static>(mut self, source: S) -> Self {
        self.source = Box::new(source);
        self
    }

    /// Bound the log to `capacity` entries (at least one)
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        self
    }

    /// The most recent reading
    pub fn latest(&self) -> Sample {
        self.latest
    }

    /// Whether readings are being logged
    pub fn is_logging(&self) -> bool {
        self.logging
    }

    /// Configured logging interval in seconds
    pub fn log_interval(&self) -> u32 {
        self.log_interval
    }

    /// All logged readings, oldest first
    pub fn log(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter()
    }

    /// Number of logged readings
    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// The most recent `limit` entries, oldest first
    pub fn recent_log(&self, limit: usize) -> Vec<LogEntry> {
        let skip = self.log.len().saturating_sub(limit);
        self.log.iter().skip(skip).copied().collect()
    }

    fn sample(&mut self) -> Sample {
        self.latest = self.source.next_sample();
        if self.logging {
            self.record(self.latest);
        }
        self.latest
    }

    fn record(&mut self, sample: Sample) {
        let now = Utc::now();
        let timestamp = match self.log.back() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        if self.log.len() >= self.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(LogEntry {
            timestamp,
            temperature: sample.temperature,
            humidity: sample.humidity,
        });
        debug!("Logged reading {} of {}", self.log.len(), self.log_capacity);
    }
}

#[async_trait]
impl Device for EnvironmentalSensor {
    fn base(&self) -> &BaseDevice {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseDevice {
        &mut self.base
    }

    fn commands(&self) -> &'static CommandTable {
        &ENVIRONMENTAL_COMMANDS
    }

    fn apply(&mut self, command: &'static CommandSpec, params: &ValidatedParams) -> Result<Value> {
        match command.name {
            "read_temperature" => {
                let sample = self.sample();
                info!("Current temperature: {}°C", sample.temperature);
                Ok(Value::object([("temperature", sample.temperature)]))
            }
            "read_humidity" => {
                let sample = self.sample();
                info!("Current humidity: {}%", sample.humidity);
                Ok(Value::object([("humidity", sample.humidity)]))
            }
            "start_logging" => {
                let interval = match params.integer("interval") {
                    Some(seconds) => u32::try_from(seconds).map_err(|_| {
                        DeviceError::internal(format!("interval {} out of range", seconds))
                    })?,
                    None => DEFAULT_LOG_INTERVAL,
                };
                self.logging = true;
                self.log_interval = interval;
                info!("Logging started (interval: {}s)", interval);
                Ok(Value::object([
                    ("logging", Value::from(true)),
                    ("interval", Value::from(i64::from(interval))),
                ]))
            }
            "stop_logging" => {
                self.logging = false;
                info!("Logging stopped with {} entries", self.log.len());
                Ok(Value::object([
                    ("logging", Value::from(false)),
                    ("entries", Value::from(self.log.len())),
                ]))
            }
            "read_log" => {
                let limit = params
                    .integer("limit")
                    .map_or(DEFAULT_READ_LIMIT, |l| {
                        usize::try_from(l).unwrap_or(usize::MAX)
                    })
                    .clamp(1, self.log_capacity);
                let entries: Vec<Value> = self.recent_log(limit).iter().map(Value::from).collect();
                Ok(Value::object([
                    ("count", Value::from(entries.len())),
                    ("entries", Value::from(entries)),
                ]))
            }
            other => Err(DeviceError::UnknownCommand(other.to_string())),
        }
    }

    fn properties(&self) -> Metadata {
        let mut properties = Metadata::new();
        properties.insert("temperature".to_string(), self.latest.temperature.into());
        properties.insert("humidity".to_string(), self.latest.humidity.into());
        properties.insert("logging".to_string(), self.logging.into());
        properties.insert("log_interval".to_string(), i64::from(self.log_interval).into());
        properties.insert("log_entries".to_string(), self.log.len().into());
        properties
    }
}
