/*!
 * Built-in accessory variants.
 */

pub mod environmental;
pub mod input;
pub mod lighting;

pub use environmental::{EnvironmentalSensor, LogEntry};
pub use input::{InputController, Vibration};
pub use lighting::{LightingController, Pattern};
