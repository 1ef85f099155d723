use std::ops::Range;

use super::MeshError;

/// Completion mask storage. One bit per chunk of a frame.
pub type ChunkMask = u32;

/// Hard upper bound on chunks per frame.
pub const MASK_WIDTH: usize = ChunkMask::BITS as usize;

/// How a frame of `total_pixels` is cut into chunks of `chunk_capacity` pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    total_pixels: usize,
    chunk_capacity: usize,
    chunk_count: usize,
}

impl ChunkLayout {
    pub fn new(total_pixels: usize, chunk_capacity: usize) -> Result<Self, MeshError> {
        if total_pixels == 0 {
            return Err(MeshError::InvalidConfig(
                "total_pixels must be positive".to_string(),
            ));
        }
        if chunk_capacity == 0 {
            return Err(MeshError::InvalidConfig(
                "chunk_capacity must be positive".to_string(),
            ));
        }

        let chunk_count = total_pixels.div_ceil(chunk_capacity);
        // Also keeps every index representable in the one-byte wire field.
        if chunk_count > MASK_WIDTH {
            return Err(MeshError::TooManyChunks {
                chunk_count,
                width: MASK_WIDTH,
            });
        }

        Ok(Self {
            total_pixels,
            chunk_capacity,
            chunk_count,
        })
    }

    pub fn total_pixels(&self) -> usize {
        self.total_pixels
    }

    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Pixel range covered by chunk `index`, or `None` when out of range.
    /// The last chunk may be shorter than the others.
    pub fn chunk_range(&self, index: usize) -> Option<Range<usize>> {
        if index >= self.chunk_count {
            return None;
        }
        let start = index * self.chunk_capacity;
        let end = (start + self.chunk_capacity).min(self.total_pixels);
        Some(start..end)
    }

    /// Mask value with one bit set per chunk.
    pub fn full_mask(&self) -> ChunkMask {
        if self.chunk_count == MASK_WIDTH {
            ChunkMask::MAX
        } else {
            (1 << self.chunk_count) - 1
        }
    }
}
