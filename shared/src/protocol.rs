//! Payloads exchanged in steady state: one player's state upstream, the list
//! of every other player downstream.

use crate::PlayerState;
use bincode::{deserialize, serialize};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("player name must not be empty")]
    EmptyName,

    #[error("malformed payload: {0}")]
    Malformed(#[from] bincode::Error),
}

pub fn encode_player_state(player: &PlayerState) -> Result<Vec<u8>, ProtocolError> {
    if player.name.is_empty() {
        return Err(ProtocolError::EmptyName);
    }
    Ok(serialize(player)?)
}

pub fn decode_player_state(bytes: &[u8]) -> Result<PlayerState, ProtocolError> {
    let player: PlayerState = deserialize(bytes)?;
    if player.name.is_empty() {
        return Err(ProtocolError::EmptyName);
    }
    Ok(player)
}

pub fn encode_peers(peers: &[PlayerState]) -> Result<Vec<u8>, ProtocolError> {
    Ok(serialize(peers)?)
}

pub fn decode_peers(bytes: &[u8]) -> Result<Vec<PlayerState>, ProtocolError> {
    Ok(deserialize(bytes)?)
}
