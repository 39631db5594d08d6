/*!
 * accessim Devices
 *
 * This crate provides the accessory contract, connection negotiation,
 * command schemas, the device registry and the built-in simulated
 * accessories.
 */

#![warn(missing_docs)]

// Re-export core types
pub use accessim_core::prelude;

pub mod bootstrap;
pub mod device;
pub mod devices;
pub mod envelope;
pub mod negotiator;
pub mod registry;
pub mod schema;
pub mod sources;

// Re-export the device contract and registry
pub use device::{
    BaseDevice, Device, DeviceError, DeviceInfo, DeviceSnapshot, DeviceState, ErrorKind,
};
pub use envelope::{Envelope, Status};
pub use negotiator::{NegotiationState, Negotiator};
pub use registry::{DeviceRegistry, RegistryEvent, SharedDeviceRegistry};

/// accessim devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
