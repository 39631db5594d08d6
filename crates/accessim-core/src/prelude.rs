/*!
 * Prelude module for accessim core.
 *
 * Re-exports the types most code needs when working with simulated devices.
 */

pub use crate::error::{Error, Result};

pub use crate::types::{ConnectionType, Id, Metadata, Params, ProtocolVersion, Value};

pub use crate::config::{Config, ConfigBuilder, SharedConfig};

pub use crate::logging::{component_span, operation_span};

pub use crate::params;

pub use tracing::{debug, error, info, trace, warn};
