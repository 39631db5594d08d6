/*!
 * Uniform command responses.
 */
use serde::{Deserialize, Serialize};

use accessim_core::types::{Id, Value};

use crate::device::{DeviceError, ErrorKind};

/// Outcome of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The command ran
    Success,
    /// The command was rejected
    Error,
}

/// The response to every command sent through a device or the registry.
///
/// Successful envelopes carry `data`; failed ones carry `message` and the
/// machine-readable `error` kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// The device the command targeted
    pub device_id: Id,
    /// Outcome
    pub status: Status,
    /// Command result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Human readable explanation of a failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl Envelope {
    /// A successful response
    pub fn success(device_id: Id, data: Value) -> Self {
        Self {
            device_id,
            status: Status::Success,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    /// A failed response
    pub fn failure(device_id: Id, error: &DeviceError) -> Self {
        Self {
            device_id,
            status: Status::Error,
            data: None,
            message: Some(error.to_string()),
            error: Some(error.kind()),
        }
    }

    /// Whether the command ran
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Failure category, if the command was rejected
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error
    }

    /// Look up a field of the result data
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }
}
