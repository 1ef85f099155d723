use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{MeshConfig, Token, TOKEN_MAX};

/// Source of the random part of a node's ballot delay.
pub trait JitterSource: Send {
    /// A value in `[0, span_ms)`, or zero when `span_ms` is zero.
    fn next_jitter(&mut self, span_ms: u64) -> u64;
}

pub struct RngJitter<R> {
    rng: R,
}

impl RngJitter<StdRng> {
    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng + Send> JitterSource for RngJitter<R> {
    fn next_jitter(&mut self, span_ms: u64) -> u64 {
        if span_ms == 0 {
            return 0;
        }
        self.rng.random_range(0..span_ms)
    }
}

/// Replays a fixed sequence, cycling when exhausted. Values are clamped
/// into the requested span.
#[derive(Debug, Clone, Default)]
pub struct FixedJitter {
    values: Vec<u64>,
    next: usize,
}

impl FixedJitter {
    pub fn new(values: Vec<u64>) -> Self {
        Self { values, next: 0 }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

impl JitterSource for FixedJitter {
    fn next_jitter(&mut self, span_ms: u64) -> u64 {
        if self.values.is_empty() || span_ms == 0 {
            return 0;
        }
        let value = self.values[self.next % self.values.len()];
        self.next = self.next.wrapping_add(1);
        value.min(span_ms - 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionRound {
    pub start_ms: u64,
    pub end_ms: u64,
    pub delay_ms: u64,
    pub ballot_cast: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    Won,
    Lost { highest: Token },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElectionTick {
    /// Broadcast our token now.
    pub cast_ballot: bool,
    /// Set on the tick the round concludes.
    pub outcome: Option<ElectionOutcome>,
}

pub struct ElectionEngine {
    token: Token,
    highest_seen: Token,
    base_delay_ms: u64,
    jitter_span_ms: u64,
    window_ms: u64,
    jitter: Box<dyn JitterSource>,
    round: Option<ElectionRound>,
}

impl ElectionEngine {
    pub fn new(token: Token, config: &MeshConfig, jitter: Box<dyn JitterSource>) -> Self {
        Self {
            token,
            highest_seen: token,
            base_delay_ms: config.election_base_delay_ms,
            jitter_span_ms: config.election_jitter_ms,
            window_ms: config.election_window_ms,
            jitter,
            round: None,
        }
    }

    /// Deterministic part of the ballot delay: inversely proportional to the
    /// token, so higher tokens are scheduled no later than lower ones.
    pub fn delay_for(token: Token, base_delay_ms: u64) -> u64 {
        let max = u64::from(TOKEN_MAX);
        let t = u64::from(token.as_u32()).min(max);
        base_delay_ms * (max - t) / max
    }

    pub fn start_round(&mut self, now_ms: u64) -> ElectionRound {
        self.highest_seen = self.token;
        let delay_ms = Self::delay_for(self.token, self.base_delay_ms)
            + self.jitter.next_jitter(self.jitter_span_ms);
        let round = ElectionRound {
            start_ms: now_ms,
            end_ms: now_ms + self.window_ms,
            delay_ms,
            ballot_cast: false,
        };
        self.round = Some(round);
        round
    }

    /// Ratchet the highest token seen. Returns true when it rose.
    pub fn observe_token(&mut self, token: Token) -> bool {
        if token > self.highest_seen {
            self.highest_seen = token;
            return true;
        }
        false
    }

    pub fn tick(&mut self, now_ms: u64) -> ElectionTick {
        let Some(round) = self.round.as_mut() else {
            return ElectionTick::default();
        };

        let mut step = ElectionTick::default();
        if !round.ballot_cast && now_ms >= round.start_ms + round.delay_ms {
            round.ballot_cast = true;
            step.cast_ballot = true;
        }

        if now_ms >= round.end_ms {
            self.round = None;
            step.outcome = Some(if self.highest_seen > self.token {
                ElectionOutcome::Lost {
                    highest: self.highest_seen,
                }
            } else {
                ElectionOutcome::Won
            });
        }

        step
    }

    pub fn abandon(&mut self) {
        self.round = None;
    }

    pub fn round(&self) -> Option<&ElectionRound> {
        self.round.as_ref()
    }

    pub fn highest_token_seen(&self) -> Token {
        self.highest_seen
    }

    /// Someone with a higher token has been heard from.
    pub fn outranked(&self) -> bool {
        self.highest_seen > self.token
    }
}
