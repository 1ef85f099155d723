//! Fixed-layout encoding of the two broadcast datagram kinds.
//!
//! | byte  | Heartbeat | Pixel-Chunk           |
//! |-------|-----------|-----------------------|
//! | 0     | `0x01`    | `0x00`                |
//! | 1-4   | token     | sequence counter      |
//! | 5-8   |           | sender token          |
//! | 9     |           | chunk index           |
//! | 10..  |           | packed RGB, 3 B/pixel |
//!
//! Integers are little-endian.

use super::frame::{scale8, Rgb};
use super::layout::ChunkLayout;
use super::{CodecError, Token};

pub const KIND_PIXEL_CHUNK: u8 = 0x00;
pub const KIND_HEARTBEAT: u8 = 0x01;

pub const HEARTBEAT_LEN: usize = 5;
pub const CHUNK_HEADER_LEN: usize = 10;
pub const BYTES_PER_PIXEL: usize = 3;

/// Largest datagram a receiver accepts. Longer ones are truncated by the socket.
pub const MAX_DATAGRAM: usize = 1500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelChunk {
    pub sequence: u32,
    pub sender: Token,
    pub index: u8,
    /// Packed RGB triplets.
    pub payload: Vec<u8>,
}

impl PixelChunk {
    /// Payload decoded into pixels. A trailing partial triplet is ignored.
    pub fn pixels(&self) -> impl Iterator<Item = Rgb> + '_ {
        self.payload
            .chunks_exact(BYTES_PER_PIXEL)
            .map(|p| Rgb::new(p[0], p[1], p[2]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    /// Election ballot and leader liveness signal.
    Heartbeat { token: Token },
    PixelChunk(PixelChunk),
}

impl Datagram {
    /// The identity this datagram claims for its sender.
    pub fn token(&self) -> Token {
        match self {
            Datagram::Heartbeat { token } => *token,
            Datagram::PixelChunk(chunk) => chunk.sender,
        }
    }
}

pub fn encode(datagram: &Datagram) -> Vec<u8> {
    match datagram {
        Datagram::Heartbeat { token } => {
            let mut buf = Vec::with_capacity(HEARTBEAT_LEN);
            buf.push(KIND_HEARTBEAT);
            buf.extend_from_slice(&token.as_u32().to_le_bytes());
            buf
        }
        Datagram::PixelChunk(chunk) => {
            let mut buf = Vec::with_capacity(CHUNK_HEADER_LEN + chunk.payload.len());
            buf.push(KIND_PIXEL_CHUNK);
            buf.extend_from_slice(&chunk.sequence.to_le_bytes());
            buf.extend_from_slice(&chunk.sender.as_u32().to_le_bytes());
            buf.push(chunk.index);
            buf.extend_from_slice(&chunk.payload);
            buf
        }
    }
}

pub fn decode(bytes: &[u8]) -> Result<Datagram, CodecError> {
    let kind = *bytes.first().ok_or(CodecError::Empty)?;
    match kind {
        KIND_HEARTBEAT => {
            check_len(kind, bytes, HEARTBEAT_LEN)?;
            Ok(Datagram::Heartbeat {
                token: Token::from_wire(read_u32(&bytes[1..5])),
            })
        }
        KIND_PIXEL_CHUNK => {
            check_len(kind, bytes, CHUNK_HEADER_LEN)?;
            Ok(Datagram::PixelChunk(PixelChunk {
                sequence: read_u32(&bytes[1..5]),
                sender: Token::from_wire(read_u32(&bytes[5..9])),
                index: bytes[9],
                payload: bytes[CHUNK_HEADER_LEN..].to_vec(),
            }))
        }
        other => Err(CodecError::UnknownKind(other)),
    }
}

/// Cut a frame into Pixel-Chunk datagrams in index order, one sequence
/// number per chunk starting at `first_sequence`. Channels are scaled by
/// `brightness` while packing.
pub fn encode_frame(
    layout: &ChunkLayout,
    first_sequence: u32,
    sender: Token,
    pixels: &[Rgb],
    brightness: u8,
) -> Vec<Vec<u8>> {
    let mut datagrams = Vec::with_capacity(layout.chunk_count());
    let mut sequence = first_sequence;

    for index in 0..layout.chunk_count() {
        let Some(range) = layout.chunk_range(index) else {
            break;
        };
        let mut payload = Vec::with_capacity(range.len() * BYTES_PER_PIXEL);
        for px in pixels.get(range).unwrap_or_default() {
            payload.push(scale8(px.r, brightness));
            payload.push(scale8(px.g, brightness));
            payload.push(scale8(px.b, brightness));
        }

        datagrams.push(encode(&Datagram::PixelChunk(PixelChunk {
            sequence,
            sender,
            index: index as u8,
            payload,
        })));
        sequence = sequence.wrapping_add(1);
    }

    datagrams
}

fn check_len(kind: u8, bytes: &[u8], needed: usize) -> Result<(), CodecError> {
    if bytes.len() < needed {
        return Err(CodecError::Truncated {
            kind,
            len: bytes.len(),
            needed,
        });
    }
    Ok(())
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn heartbeat_layout_is_five_bytes_little_endian() {
        let bytes = encode(&Datagram::Heartbeat {
            token: Token::new(0x12_3456),
        });
        assert_eq!(bytes, vec![0x01, 0x56, 0x34, 0x12, 0x00]);
    }

    #[test]
    fn chunk_layout_matches_wire_table() {
        let bytes = encode(&Datagram::PixelChunk(PixelChunk {
            sequence: 0x0102_0304,
            sender: Token::new(0x0A_0B0C),
            index: 3,
            payload: vec![1, 2, 3],
        }));
        assert_eq!(
            bytes,
            vec![0x00, 0x04, 0x03, 0x02, 0x01, 0x0C, 0x0B, 0x0A, 0x00, 3, 1, 2, 3]
        );
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert_eq!(decode(&[]), Err(CodecError::Empty));
        assert_eq!(
            decode(&[KIND_HEARTBEAT, 1, 2, 3]),
            Err(CodecError::Truncated {
                kind: KIND_HEARTBEAT,
                len: 4,
                needed: 5
            })
        );
        // A heartbeat-sized buffer is still too short for a chunk.
        assert!(matches!(
            decode(&[KIND_PIXEL_CHUNK, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(CodecError::Truncated { needed: 10, .. })
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert_eq!(decode(&[0x02, 0, 0, 0, 0]), Err(CodecError::UnknownKind(0x02)));
    }

    #[test]
    fn zero_length_payload_and_max_index_round_trip() {
        let chunk = Datagram::PixelChunk(PixelChunk {
            sequence: u32::MAX,
            sender: Token::from_wire(u32::MAX),
            index: u8::MAX,
            payload: Vec::new(),
        });
        let bytes = encode(&chunk);
        assert_eq!(bytes.len(), CHUNK_HEADER_LEN);
        assert_eq!(decode(&bytes).unwrap(), chunk);
    }

    #[test]
    fn encode_frame_emits_one_datagram_per_chunk_with_short_tail() {
        let layout = ChunkLayout::new(10, 4).unwrap();
        let pixels: Vec<Rgb> = (0..10u8).map(|i| Rgb::new(i, i, i)).collect();
        let datagrams = encode_frame(&layout, 7, Token::new(9), &pixels, 255);

        assert_eq!(datagrams.len(), 3);
        let lens: Vec<usize> = datagrams.iter().map(|d| d.len()).collect();
        assert_eq!(lens, vec![10 + 12, 10 + 12, 10 + 6]);

        for (i, raw) in datagrams.iter().enumerate() {
            match decode(raw).unwrap() {
                Datagram::PixelChunk(chunk) => {
                    assert_eq!(chunk.index as usize, i);
                    assert_eq!(chunk.sequence, 7 + i as u32);
                    assert_eq!(chunk.sender, Token::new(9));
                }
                other => panic!("unexpected datagram: {other:?}"),
            }
        }
    }

    #[test]
    fn encode_frame_applies_brightness() {
        let layout = ChunkLayout::new(1, 1).unwrap();
        let datagrams = encode_frame(&layout, 0, Token::new(1), &[Rgb::new(255, 128, 0)], 127);
        assert_eq!(&datagrams[0][CHUNK_HEADER_LEN..], &[127, 64, 0]);
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            sequence in any::<u32>(),
            sender in any::<u32>(),
            index in any::<u8>(),
            pixel_count in 0usize..=75,
        ) {
            let payload: Vec<u8> = (0..pixel_count * BYTES_PER_PIXEL).map(|i| i as u8).collect();
            let chunk = Datagram::PixelChunk(PixelChunk {
                sequence,
                sender: Token::from_wire(sender),
                index,
                payload,
            });
            prop_assert_eq!(decode(&encode(&chunk)).unwrap(), chunk);

            let hb = Datagram::Heartbeat { token: Token::from_wire(sender) };
            prop_assert_eq!(decode(&encode(&hb)).unwrap(), hb);
        }
    }
}
