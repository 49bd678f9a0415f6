//! Payload encode/decode for point-to-point messages.
//!
//! Payloads are serialized with bincode's standard config. The fabric moves
//! opaque byte vectors; typing happens only at the two endpoints.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FabricError, Result};

/// Encode a payload for [`InterCommunicator::send`](crate::InterCommunicator::send).
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(payload, bincode::config::standard())
        .map_err(|e| FabricError::Serialization(e.to_string()))
}

/// Decode a payload received by [`InterCommunicator::recv`](crate::InterCommunicator::recv).
pub fn decode_payload<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    let (payload, _) = bincode::serde::decode_from_slice(data, bincode::config::standard())
        .map_err(|e| FabricError::Serialization(e.to_string()))?;
    Ok(payload)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
