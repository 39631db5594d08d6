/*!
 * Connection negotiation for accessories.
 *
 * Before an accessory accepts commands the host walks it through a fixed
 * handshake: the accessory identifies itself, both sides settle on a
 * protocol version, and the link becomes active. The simulation has no
 * misbehaving peer, so the `Failed` state can only be entered explicitly.
 */
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use accessim_core::types::ProtocolVersion;

/// Negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    /// No connection attempt in progress
    Idle,
    /// Identification strings are being exchanged
    Identifying,
    /// Both sides are agreeing on a protocol version
    NegotiatingVersion,
    /// The connection is established
    Active,
    /// The handshake was aborted; only a reset leaves this state
    Failed,
}

impl NegotiationState {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationState::Idle => "idle",
            NegotiationState::Identifying => "identifying",
            NegotiationState::NegotiatingVersion => "negotiating_version",
            NegotiationState::Active => "active",
            NegotiationState::Failed => "failed",
        }
    }

    /// States from which the handshake can still fail
    fn in_progress(&self) -> bool {
        matches!(
            self,
            NegotiationState::Identifying | NegotiationState::NegotiatingVersion
        )
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for negotiation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// The requested transition is not part of the handshake
    #[error("Invalid negotiation transition from {from} to {to}")]
    InvalidTransition {
        /// The current state
        from: NegotiationState,
        /// The rejected target state
        to: NegotiationState,
    },

    /// The handshake was aborted
    #[error("Negotiation failed: {0}")]
    Failed(String),
}

/// Identification string slots, in the order the accessory sends them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentString {
    /// Manufacturer name
    Manufacturer = 0,
    /// Model name
    Model = 1,
    /// Human readable description
    Description = 2,
    /// Accessory version
    Version = 3,
    /// Informational URI
    Uri = 4,
    /// Serial number
    Serial = 5,
}

/// The strings an accessory presents while identifying
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    /// Manufacturer name
    pub manufacturer: String,
    /// Model name
    pub model: String,
    /// Human readable description
    pub description: String,
    /// Accessory version
    pub version: String,
    /// Informational URI
    pub uri: String,
    /// Serial number
    pub serial: String,
}

impl Identification {
    /// The identification exchange, one entry per string slot
    pub fn strings(&self) -> [(IdentString, &str); 6] {
        [
            (IdentString::Manufacturer, self.manufacturer.as_str()),
            (IdentString::Model, self.model.as_str()),
            (IdentString::Description, self.description.as_str()),
            (IdentString::Version, self.version.as_str()),
            (IdentString::Uri, self.uri.as_str()),
            (IdentString::Serial, self.serial.as_str()),
        ]
    }
}

/// Pick the protocol version for a connection.
///
/// When the device supports the version the host asked for, the higher of
/// the two wins; otherwise the device's own version is used.
pub fn select_version(
    device: ProtocolVersion,
    requested: Option<ProtocolVersion>,
) -> ProtocolVersion {
    match requested {
        Some(requested) if device.supports(requested) => device.max(requested),
        _ => device,
    }
}

/// Handshake state machine for one accessory
#[derive(Debug, Clone)]
pub struct Negotiator {
    state: NegotiationState,
    selected: Option<ProtocolVersion>,
    failure: Option<String>,
    history: Vec<(NegotiationState, NegotiationState)>,
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new()
    }
}

impl Negotiator {
    /// Create a negotiator in the `Idle` state
    pub fn new() -> Self {
        Self {
            state: NegotiationState::Idle,
            selected: None,
            failure: None,
            history: Vec::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Version chosen during the current handshake, if any
    pub fn selected_version(&self) -> Option<ProtocolVersion> {
        self.selected
    }

    /// Reason recorded when the handshake failed
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Transitions taken since the last reset
    pub fn history(&self) -> &[(NegotiationState, NegotiationState)] {
        &self.history
    }

    /// Whether the handshake completed
    pub fn is_active(&self) -> bool {
        self.state == NegotiationState::Active
    }

    fn transition(
        &mut self,
        expected: NegotiationState,
        to: NegotiationState,
    ) -> Result<(), NegotiationError> {
        if self.state != expected {
            return Err(NegotiationError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.history.push((self.state, to));
        debug!("Negotiation {} -> {}", self.state, to);
        self.state = to;
        Ok(())
    }

    /// Idle -> Identifying: send the identification strings
    pub fn identify(&mut self, identification: &Identification) -> Result<(), NegotiationError> {
        self.transition(NegotiationState::Idle, NegotiationState::Identifying)?;
        for (slot, value) in identification.strings() {
            debug!(index = slot as u8, ?slot, value, "Sending identification string");
        }
        Ok(())
    }

    /// Identifying -> NegotiatingVersion: settle on a protocol version
    pub fn negotiate(
        &mut self,
        device: ProtocolVersion,
        requested: Option<ProtocolVersion>,
    ) -> Result<ProtocolVersion, NegotiationError> {
        self.transition(NegotiationState::Identifying, NegotiationState::NegotiatingVersion)?;
        let version = select_version(device, requested);
        debug!(%device, ?requested, selected = %version, "Protocol version selected");
        self.selected = Some(version);
        Ok(version)
    }

    /// NegotiatingVersion -> Active
    pub fn activate(&mut self) -> Result<ProtocolVersion, NegotiationError> {
        let version = self.selected.ok_or(NegotiationError::InvalidTransition {
            from: self.state,
            to: NegotiationState::Active,
        })?;
        self.transition(NegotiationState::NegotiatingVersion, NegotiationState::Active)?;
        Ok(version)
    }

    /// Run the whole handshake from `Idle` to `Active`
    pub fn run(
        &mut self,
        identification: &Identification,
        device: ProtocolVersion,
        requested: Option<ProtocolVersion>,
    ) -> Result<ProtocolVersion, NegotiationError> {
        self.identify(identification)?;
        self.negotiate(device, requested)?;
        let version = self.activate()?;
        info!(
            "Negotiated {} with {} {}",
            version, identification.manufacturer, identification.model
        );
        Ok(version)
    }

    /// Abort an in-progress handshake.
    ///
    /// No simulated peer can trigger this; it exists for transports that
    /// talk to real hardware.
    pub fn fail<S: Into<String>>(&mut self, reason: S) -> NegotiationError {
        if !self.state.in_progress() {
            return NegotiationError::InvalidTransition {
                from: self.state,
                to: NegotiationState::Failed,
            };
        }
        let reason = reason.into();
        warn!("Negotiation failed in state {}: {}", self.state, reason);
        self.history.push((self.state, NegotiationState::Failed));
        self.state = NegotiationState::Failed;
        self.selected = None;
        self.failure = Some(reason.clone());
        NegotiationError::Failed(reason)
    }

    /// Return to `Idle` for the next connection attempt
    pub fn reset(&mut self) {
        self.state = NegotiationState::Idle;
        self.selected = None;
        self.failure = None;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identification() -> Identification {
        Identification {
            manufacturer: "ADK Tutorial".to_string(),
            model: "RGB LED Controller".to_string(),
            description: "RGB LED controller".to_string(),
            version: "1.0".to_string(),
            uri: "https://example.com/adk/led".to_string(),
            serial: "LED00123456789".to_string(),
        }
    }

    #[test]
    fn test_select_version() {
        use ProtocolVersion::{V1, V2};
        assert_eq!(select_version(V2, None), V2);
        assert_eq!(select_version(V2, Some(V1)), V2);
        assert_eq!(select_version(V2, Some(V2)), V2);
        assert_eq!(select_version(V1, Some(V2)), V1);
        assert_eq!(select_version(V1, None), V1);
    }

    #[test]
    fn test_full_handshake() {
        let mut negotiator = Negotiator::new();
        assert_eq!(negotiator.state(), NegotiationState::Idle);

        let version = negotiator
            .run(&identification(), ProtocolVersion::V2, Some(ProtocolVersion::V2))
            .unwrap();

        assert_eq!(version, ProtocolVersion::V2);
        assert!(negotiator.is_active());
        assert_eq!(negotiator.selected_version(), Some(ProtocolVersion::V2));
        assert_eq!(
            negotiator.history(),
            &[
                (NegotiationState::Idle, NegotiationState::Identifying),
                (NegotiationState::Identifying, NegotiationState::NegotiatingVersion),
                (NegotiationState::NegotiatingVersion, NegotiationState::Active),
            ]
        );
    }

    #[test]
    fn test_active_is_terminal_until_reset() {
        let mut negotiator = Negotiator::new();
        negotiator.run(&identification(), ProtocolVersion::V1, None).unwrap();

        let err = negotiator.identify(&identification()).unwrap_err();
        assert_eq!(
            err,
            NegotiationError::InvalidTransition {
                from: NegotiationState::Active,
                to: NegotiationState::Identifying,
            }
        );
        assert!(negotiator.is_active());

        negotiator.reset();
        assert_eq!(negotiator.state(), NegotiationState::Idle);
        assert!(negotiator.history().is_empty());
        assert_eq!(negotiator.selected_version(), None);
    }

    #[test]
    fn test_out_of_order_steps_are_rejected() {
        let mut negotiator = Negotiator::new();
        assert!(negotiator.negotiate(ProtocolVersion::V2, None).is_err());
        assert!(negotiator.activate().is_err());
        assert_eq!(negotiator.state(), NegotiationState::Idle);
    }

    #[test]
    fn test_fail_only_while_in_progress() {
        let mut negotiator = Negotiator::new();
        assert!(matches!(
            negotiator.fail("no peer"),
            NegotiationError::InvalidTransition { .. }
        ));

        negotiator.identify(&identification()).unwrap();
        let err = negotiator.fail("peer hung up");
        assert_eq!(err, NegotiationError::Failed("peer hung up".to_string()));
        assert_eq!(negotiator.state(), NegotiationState::Failed);
        assert_eq!(negotiator.failure(), Some("peer hung up"));

        // Failed is terminal: nothing but a reset moves it.
        assert!(negotiator.identify(&identification()).is_err());
        negotiator.reset();
        assert!(negotiator.identify(&identification()).is_ok());
    }

    #[test]
    fn test_identification_order() {
        let ident = identification();
        let slots: Vec<u8> = ident.strings().iter().map(|(slot, _)| *slot as u8).collect();
        assert_eq!(slots, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(ident.strings()[5].1, "LED00123456789");
    }
}
