use serde::{Deserialize, Serialize};

use super::codec::BYTES_PER_PIXEL;
use super::layout::{ChunkLayout, ChunkMask};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Scale `value` by `scale / 256`, with 255 mapping to the identity.
pub fn scale8(value: u8, scale: u8) -> u8 {
    ((u16::from(value) * (u16::from(scale) + 1)) >> 8) as u8
}

/// Follower-side accumulation of the frame currently being received.
///
/// There is no frame-boundary marker on the wire: once a completed frame is
/// consumed the mask is empty again and the next chunk, whatever frame it
/// came from, starts the next accumulation.
#[derive(Debug, Clone)]
pub struct FrameReassembler {
    layout: ChunkLayout,
    mask: ChunkMask,
    pixels: Vec<Rgb>,
}

impl FrameReassembler {
    pub fn new(layout: ChunkLayout) -> Self {
        Self {
            layout,
            mask: 0,
            pixels: vec![Rgb::BLACK; layout.total_pixels()],
        }
    }

    /// Copy a chunk's packed RGB payload into the frame and mark it received.
    /// Returns `false`, leaving all state untouched, for an out-of-range index.
    pub fn apply_chunk(&mut self, index: usize, payload: &[u8]) -> bool {
        let Some(range) = self.layout.chunk_range(index) else {
            return false;
        };

        let slot = &mut self.pixels[range];
        for (px, rgb) in slot.iter_mut().zip(payload.chunks_exact(BYTES_PER_PIXEL)) {
            *px = Rgb::new(rgb[0], rgb[1], rgb[2]);
        }
        self.mask |= 1 << index;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.mask == self.layout.full_mask()
    }

    /// Call once after a complete frame has been handed off.
    pub fn mark_consumed(&mut self) {
        self.mask = 0;
    }

    /// Drop any partial frame. Pixel contents are kept so a display keeps
    /// showing the last frame.
    pub fn reset(&mut self) {
        self.mask = 0;
    }

    pub fn mask(&self) -> ChunkMask {
        self.mask
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn payload(pixels: usize, value: u8) -> Vec<u8> {
        vec![value; pixels * BYTES_PER_PIXEL]
    }

    #[test]
    fn four_chunks_complete_only_when_all_arrive() {
        let layout = ChunkLayout::new(300, 75).unwrap();
        let mut frame = FrameReassembler::new(layout);

        for index in [2, 0, 1] {
            assert!(frame.apply_chunk(index, &payload(75, index as u8)));
            assert!(!frame.is_complete());
        }
        assert!(frame.apply_chunk(3, &payload(75, 3)));
        assert!(frame.is_complete());
        assert_eq!(frame.mask(), 0b1111);

        assert_eq!(frame.pixels()[0], Rgb::new(0, 0, 0));
        assert_eq!(frame.pixels()[80], Rgb::new(1, 1, 1));
        assert_eq!(frame.pixels()[299], Rgb::new(3, 3, 3));
    }

    #[test]
    fn out_of_range_chunk_changes_nothing() {
        let layout = ChunkLayout::new(300, 75).unwrap();
        let mut frame = FrameReassembler::new(layout);
        frame.apply_chunk(1, &payload(75, 9));
        let before = frame.pixels().to_vec();

        assert!(!frame.apply_chunk(4, &payload(75, 200)));
        assert!(!frame.apply_chunk(255, &payload(75, 200)));
        assert_eq!(frame.mask(), 0b0010);
        assert_eq!(frame.pixels(), before.as_slice());
    }

    #[test]
    fn consumed_frame_needs_every_chunk_again() {
        let layout = ChunkLayout::new(300, 75).unwrap();
        let mut frame = FrameReassembler::new(layout);
        for index in 0..4 {
            frame.apply_chunk(index, &payload(75, 1));
        }
        assert!(frame.is_complete());

        frame.mark_consumed();
        assert!(!frame.is_complete());
        for index in 0..3 {
            frame.apply_chunk(index, &payload(75, 2));
            assert!(!frame.is_complete());
        }
        frame.apply_chunk(3, &payload(75, 2));
        assert!(frame.is_complete());
    }

    #[test]
    fn oversized_payload_is_clipped_to_its_slot() {
        let layout = ChunkLayout::new(4, 2).unwrap();
        let mut frame = FrameReassembler::new(layout);
        frame.apply_chunk(0, &payload(3, 7));
        assert_eq!(frame.pixels()[1], Rgb::new(7, 7, 7));
        assert_eq!(frame.pixels()[2], Rgb::BLACK);
    }

    #[test]
    fn scale8_full_brightness_is_identity() {
        for v in [0u8, 1, 127, 128, 254, 255] {
            assert_eq!(scale8(v, 255), v);
        }
        assert_eq!(scale8(200, 0), 0);
    }

    proptest! {
        #[test]
        fn completion_is_order_independent(
            order in (1usize..=32)
                .prop_flat_map(|n| Just((0..n).collect::<Vec<usize>>()).prop_shuffle()),
            skip in any::<prop::sample::Index>(),
        ) {
            let chunk_count = order.len();
            let layout = ChunkLayout::new(chunk_count * 3, 3).unwrap();

            let missing = skip.index(chunk_count);
            let mut partial = FrameReassembler::new(layout);
            for &index in order.iter().filter(|&&i| i != missing) {
                partial.apply_chunk(index, &payload(3, 1));
            }
            prop_assert!(!partial.is_complete());

            let mut full = FrameReassembler::new(layout);
            for &index in &order {
                full.apply_chunk(index, &payload(3, 1));
            }
            prop_assert!(full.is_complete());
            prop_assert_eq!(full.mask().count_ones() as usize, chunk_count);
        }
    }
}
