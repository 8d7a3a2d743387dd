//! Inbound control message shapes accepted on the interactive-connection
//! endpoint.

use serde::Deserialize;

/// First inbound frame after the handshake, identifying the client.
#[derive(Debug, Deserialize)]
pub struct Identify {
    /// Client identity to register under. Missing or malformed is treated
    /// permissively by the caller, which substitutes the default.
    #[serde(default)]
    pub client_id: Option<String>,
}

/// A `{"type":"save","save":<bool>}` control record.
#[derive(Debug, Deserialize)]
pub struct SaveToggle {
    /// New value of the save flag.
    pub save: bool,
}
