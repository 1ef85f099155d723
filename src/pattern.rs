//! Pattern collaborators: what a leader broadcasts and where a follower's
//! reassembled frames go.

use log::trace;

use crate::mesh::Rgb;

pub trait Pattern: Send {
    /// Leader side: fill `frame` with the pixels to broadcast this cycle.
    fn render(&mut self, now_ms: u64, frame: &mut [Rgb]);

    /// Follower side: a complete frame has been reassembled.
    fn show(&mut self, frame: &[Rgb]);
}

/// Colour wheel position 0..=255 to a fully saturated colour.
pub fn wheel(pos: u8) -> Rgb {
    let pos = 255 - pos;
    match pos {
        0..=84 => Rgb::new(255 - pos * 3, 0, pos * 3),
        85..=169 => {
            let p = pos - 85;
            Rgb::new(0, p * 3, 255 - p * 3)
        }
        _ => {
            let p = pos - 170;
            Rgb::new(p * 3, 255 - p * 3, 0)
        }
    }
}

/// Rotating rainbow. Stands in for the audio-driven renderer on hosts
/// without LEDs and keeps the last frame it was asked to show.
#[derive(Debug, Clone)]
pub struct RainbowPattern {
    step_ms: u64,
    frames_shown: u64,
    last_frame: Vec<Rgb>,
}

impl RainbowPattern {
    pub fn new(step_ms: u64) -> Self {
        Self {
            step_ms: step_ms.max(1),
            frames_shown: 0,
            last_frame: Vec::new(),
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    pub fn last_frame(&self) -> &[Rgb] {
        &self.last_frame
    }
}

impl Default for RainbowPattern {
    fn default() -> Self {
        Self::new(10)
    }
}

impl Pattern for RainbowPattern {
    fn render(&mut self, now_ms: u64, frame: &mut [Rgb]) {
        let len = frame.len().max(1);
        let offset = (now_ms / self.step_ms) as usize;
        for (i, px) in frame.iter_mut().enumerate() {
            *px = wheel(((i * 256 / len + offset) & 0xFF) as u8);
        }
    }

    fn show(&mut self, frame: &[Rgb]) {
        self.frames_shown += 1;
        self.last_frame.clear();
        self.last_frame.extend_from_slice(frame);
        trace!("showing frame {} ({} pixels)", self.frames_shown, frame.len());
    }
}
