use std::fmt;

use serde::{Deserialize, Serialize};

use super::MeshError;

/// Largest identity a node can derive from its hardware address (24 bits).
pub const TOKEN_MAX: u32 = 0x00FF_FFFF;

/// A node's fixed identity. Higher tokens win elections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Token(u32);

impl Token {
    /// Local identities are confined to 24 bits.
    pub fn new(value: u32) -> Self {
        Token(value & TOKEN_MAX)
    }

    /// Tokens read off the wire are kept as sent, so a malformed peer
    /// claiming a wider value still compares correctly.
    pub fn from_wire(value: u32) -> Self {
        Token(value)
    }

    /// Derive a token from the last three bytes of a hardware (MAC) address.
    pub fn from_hardware_id(hw: &[u8]) -> Result<Self, MeshError> {
        if hw.len() < 3 {
            return Err(MeshError::InvalidHardwareId(format!(
                "need at least 3 bytes, got {}",
                hw.len()
            )));
        }
        let tail = &hw[hw.len() - 3..];
        let value = (u32::from(tail[0]) << 16) | (u32::from(tail[1]) << 8) | u32::from(tail[2]);
        Ok(Token(value))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token::new(value)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06X}", self.0)
    }
}

/// Parse a colon or dash separated hex hardware address such as `24:0a:c4:12:34:56`.
pub fn parse_hardware_id(text: &str) -> Result<Vec<u8>, MeshError> {
    let bytes = text
        .split(|c| c == ':' || c == '-')
        .map(|part| {
            u8::from_str_radix(part, 16)
                .map_err(|e| MeshError::InvalidHardwareId(format!("'{text}': {e}")))
        })
        .collect::<Result<Vec<u8>, MeshError>>()?;
    if bytes.len() != 6 {
        return Err(MeshError::InvalidHardwareId(format!(
            "'{text}': expected 6 octets, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Follower,
    Electing,
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Follower => "FOLLOWER",
            Role::Electing => "ELECTING",
            Role::Leader => "LEADER",
        };
        f.write_str(name)
    }
}

/// Diagnostic counters. None of these influence protocol decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    pub malformed_datagrams: u64,
    pub out_of_range_chunks: u64,
    pub self_echoes: u64,
    pub chunks_received: u64,
    pub frames_completed: u64,
    pub chunks_sent: u64,
    pub heartbeats_sent: u64,
    pub elections_started: u64,
    pub elections_won: u64,
    pub step_downs: u64,
    pub mailbox_overflows: u64,
}

/// Snapshot of a node handed to UI and logging collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub token: Token,
    pub role: Role,
    pub participating: bool,
    pub highest_token_seen: Token,
    pub sequence: u32,
    pub stats: NodeStats,
}
