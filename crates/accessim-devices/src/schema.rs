/*!
 * Static command schemas.
 *
 * Every device variant declares its commands up front: the parameter keys
 * each command takes, their types and ranges, and the protocol version the
 * command needs. Incoming parameter maps are checked against the schema once,
 * at the device boundary, before any state is touched.
 */
use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use accessim_core::types::{Params, ProtocolVersion, Value};

use crate::device::{DeviceError, Result};

/// Expected type (and range) of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    /// A whole number, clamped into `[min, max]`
    Integer {
        /// Lower bound
        min: i64,
        /// Upper bound
        max: i64,
    },
    /// `true` or `false`
    Boolean,
    /// A `#RRGGBB` color, stored upper-case
    HexColor,
    /// One of a fixed set of lower-case names
    OneOf {
        /// Accepted names
        values: &'static [&'static str],
    },
}

/// One parameter of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    /// Parameter key
    pub key: &'static str,
    /// Expected type
    pub kind: ParamKind,
    /// Whether the key must be present
    pub required: bool,
}

impl ParamSpec {
    /// A parameter that must be present
    pub const fn required(key: &'static str, kind: ParamKind) -> Self {
        Self {
            key,
            kind,
            required: true,
        }
    }

    /// A parameter that may be omitted
    pub const fn optional(key: &'static str, kind: ParamKind) -> Self {
        Self {
            key,
            kind,
            required: false,
        }
    }

    fn check(&self, value: &Value) -> Result<Value> {
        let invalid = |reason: String| DeviceError::InvalidParameter {
            parameter: self.key.to_string(),
            reason,
        };

        match self.kind {
            ParamKind::Integer { min, max } => {
                let number = value
                    .as_float()
                    .filter(|f| f.is_finite())
                    .ok_or_else(|| {
                        invalid(format!("expected a number, got {}", value.type_name()))
                    })?;
                let rounded = number.round();
                let clamped = rounded.clamp(min as f64, max as f64) as i64;
                if clamped as f64 != rounded {
                    debug!("Clamped {} from {} to {}", self.key, number, clamped);
                }
                Ok(Value::Integer(clamped))
            }
            ParamKind::Boolean => value
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| invalid(format!("expected a boolean, got {}", value.type_name()))),
            ParamKind::HexColor => {
                let color = value
                    .as_str()
                    .ok_or_else(|| {
                        invalid(format!("expected a string, got {}", value.type_name()))
                    })?;
                let digits = color
                    .strip_prefix('#')
                    .filter(|d| d.len() == 6 && d.chars().all(|c| c.is_ascii_hexdigit()))
                    .ok_or_else(|| invalid(format!("'{}' is not a #RRGGBB color", color)))?;
                Ok(Value::String(format!("#{}", digits.to_ascii_uppercase())))
            }
            ParamKind::OneOf { values } => {
                let name = value
                    .as_str()
                    .ok_or_else(|| {
                        invalid(format!("expected a string, got {}", value.type_name()))
                    })?;
                let lower = name.to_ascii_lowercase();
                values
                    .iter()
                    .find(|v| **v == lower)
                    .map(|v| Value::String((*v).to_string()))
                    .ok_or_else(|| {
                        invalid(format!("'{}' is not one of {}", name, values.join(", ")))
                    })
            }
        }
    }
}

/// A command a device accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    /// Command name
    pub name: &'static str,
    /// Short description for presentation layers
    pub description: &'static str,
    /// Accepted parameters
    pub params: &'static [ParamSpec],
    /// Lowest protocol version that carries this command
    pub min_version: ProtocolVersion,
}

impl CommandSpec {
    /// A parameterless command available from `V1`
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            params: &[],
            min_version: ProtocolVersion::V1,
        }
    }

    /// Set the accepted parameters
    pub const fn with_params(self, params: &'static [ParamSpec]) -> Self {
        Self { params, ..self }
    }

    /// Require a minimum protocol version
    pub const fn requires(self, min_version: ProtocolVersion) -> Self {
        Self { min_version, ..self }
    }

    /// Check a parameter map against this command's schema.
    ///
    /// Missing keys are reported before malformed values. Keys the schema
    /// does not mention are ignored.
    pub fn validate(&self, params: &Params) -> Result<ValidatedParams> {
        if let Some(missing) = self
            .params
            .iter()
            .find(|p| p.required && params.get(p.key).map_or(true, Value::is_null))
        {
            return Err(DeviceError::MissingParameter {
                command: self.name.to_string(),
                parameter: missing.key.to_string(),
            });
        }

        let mut values = HashMap::with_capacity(self.params.len());
        for spec in self.params {
            match params.get(spec.key) {
                Some(value) if !value.is_null() => {
                    values.insert(spec.key, spec.check(value)?);
                }
                _ => {}
            }
        }

        Ok(ValidatedParams {
            command: self.name,
            values,
        })
    }
}

/// Parameters that passed schema validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedParams {
    command: &'static str,
    values: HashMap<&'static str, Value>,
}

impl ValidatedParams {
    fn missing(&self, key: &str) -> DeviceError {
        DeviceError::MissingParameter {
            command: self.command.to_string(),
            parameter: key.to_string(),
        }
    }

    /// Get a normalized value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get an optional integer
    pub fn integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_integer)
    }

    /// Get a required integer
    pub fn require_integer(&self, key: &str) -> Result<i64> {
        self.integer(key).ok_or_else(|| self.missing(key))
    }

    /// Get a required boolean
    pub fn require_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| self.missing(key))
    }

    /// Get a required string
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing(key))
    }
}

/// The full command set of a device variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CommandTable {
    commands: &'static [CommandSpec],
}

impl CommandTable {
    /// Create a table from a static list of commands
    pub const fn new(commands: &'static [CommandSpec]) -> Self {
        Self { commands }
    }

    /// Find a command by name
    pub fn lookup(&self, name: &str) -> Option<&'static CommandSpec> {
        self.commands.iter().find(|c| c.name == name)
    }

    /// All commands
    pub fn iter(&self) -> impl Iterator<Item = &'static CommandSpec> {
        self.commands.iter()
    }

    /// All command names
    pub fn names(&self) -> Vec<&'static str> {
        self.commands.iter().map(|c| c.name).collect()
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
