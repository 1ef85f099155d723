use serde::{Deserialize, Serialize};

use super::codec::{BYTES_PER_PIXEL, CHUNK_HEADER_LEN, MAX_DATAGRAM};
use super::layout::{ChunkLayout, MASK_WIDTH};
use super::MeshError;

/// Protocol constants. Fixed at boot, never negotiated between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub total_pixels: usize,
    pub chunk_capacity: usize,         // pixels per chunk
    pub leader_timeout_ms: u64,
    pub missed_interval_threshold: u32,
    pub election_window_ms: u64,
    pub election_base_delay_ms: u64,
    pub election_jitter_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub tick_interval_ms: u64,
    pub brightness: u8,
    pub mailbox_capacity: usize,
}

impl MeshConfig {
    pub fn new(total_pixels: usize, chunk_capacity: usize) -> Self {
        Self {
            total_pixels,
            chunk_capacity,
            ..Self::default()
        }
    }

    /// Check every constant and build the chunk layout they imply.
    pub fn validate(&self) -> Result<ChunkLayout, MeshError> {
        if self.tick_interval_ms == 0 {
            return Err(MeshError::InvalidConfig(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.missed_interval_threshold == 0 {
            return Err(MeshError::InvalidConfig(
                "missed_interval_threshold must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(MeshError::InvalidConfig(
                "heartbeat_interval_ms must be positive".to_string(),
            ));
        }
        if self.election_window_ms < self.election_base_delay_ms + self.election_jitter_ms {
            return Err(MeshError::InvalidConfig(format!(
                "election_window_ms ({}) shorter than base delay + jitter ({})",
                self.election_window_ms,
                self.election_base_delay_ms + self.election_jitter_ms
            )));
        }
        if self.mailbox_capacity == 0 {
            return Err(MeshError::InvalidConfig(
                "mailbox_capacity must be positive".to_string(),
            ));
        }
        let chunk_len = self
            .chunk_capacity
            .saturating_mul(BYTES_PER_PIXEL)
            .saturating_add(CHUNK_HEADER_LEN);
        if chunk_len > MAX_DATAGRAM {
            return Err(MeshError::InvalidConfig(format!(
                "chunk_capacity {} needs {chunk_len}-byte datagrams, limit is {MAX_DATAGRAM}",
                self.chunk_capacity
            )));
        }
        ChunkLayout::new(self.total_pixels, self.chunk_capacity)
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        let base = 200;
        let jitter = 50;
        Self {
            total_pixels: 300,
            chunk_capacity: 75,
            leader_timeout_ms: 1500,
            missed_interval_threshold: 3,
            election_window_ms: base + jitter + 50,
            election_base_delay_ms: base,
            election_jitter_ms: jitter,
            heartbeat_interval_ms: 100,
            tick_interval_ms: 20,
            brightness: 255,
            mailbox_capacity: 4 * MASK_WIDTH,
        }
    }
}
