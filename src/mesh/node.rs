use log::{debug, info, trace};

use super::codec::{self, Datagram, PixelChunk};
use super::election::{ElectionEngine, ElectionOutcome, JitterSource};
use super::frame::{FrameReassembler, Rgb};
use super::layout::ChunkLayout;
use super::mailbox::{Inbound, Origin};
use super::{CodecError, MeshConfig, MeshError, NodeStats, NodeStatus, Role, Token};
use crate::pattern::Pattern;

/// Something the UI or logging collaborators may want to surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    RoleChanged { from: Role, to: Role },
    FrameCompleted,
    DatagramRejected { origin: Origin, error: CodecError },
}

/// Everything one tick produced: datagrams to broadcast, in order, and events.
#[derive(Debug, Default)]
pub struct TickOutput {
    pub outbound: Vec<Vec<u8>>,
    pub events: Vec<NodeEvent>,
}

/// Inputs that can move a node between roles.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    LeaderSilent { silent_ms: u64 },
    RoundWon,
    RoundLost { highest: Token },
    Outranked { by: Token },
    Reset,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Follower { last_inbound_ms: u64, missed: u32 },
    Electing,
    Leader { last_heartbeat_ms: Option<u64> },
}

pub struct MeshNode {
    token: Token,
    config: MeshConfig,
    layout: ChunkLayout,
    phase: Phase,
    election: ElectionEngine,
    reassembler: FrameReassembler,
    render_buffer: Vec<Rgb>,
    sequence: u32,
    participating: bool,
    stats: NodeStats,
}

impl MeshNode {
    pub fn new(
        token: Token,
        config: MeshConfig,
        jitter: Box<dyn JitterSource>,
        now_ms: u64,
    ) -> Result<Self, MeshError> {
        let layout = config.validate()?;
        let election = ElectionEngine::new(token, &config, jitter);

        Ok(Self {
            token,
            layout,
            phase: Phase::Follower {
                last_inbound_ms: now_ms,
                missed: 0,
            },
            election,
            reassembler: FrameReassembler::new(layout),
            render_buffer: vec![Rgb::BLACK; layout.total_pixels()],
            sequence: 0,
            participating: true,
            stats: NodeStats::default(),
            config,
        })
    }

    /// Start outside the mesh when `participating` is false, without the
    /// reset a later mode change performs.
    pub fn with_participating(mut self, participating: bool) -> Self {
        self.participating = participating;
        self
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn role(&self) -> Role {
        match self.phase {
            Phase::Follower { .. } => Role::Follower,
            Phase::Electing => Role::Electing,
            Phase::Leader { .. } => Role::Leader,
        }
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn is_participating(&self) -> bool {
        self.participating
    }

    pub fn highest_token_seen(&self) -> Token {
        self.election.highest_token_seen()
    }

    pub fn election(&self) -> &ElectionEngine {
        &self.election
    }

    pub fn reassembler(&self) -> &FrameReassembler {
        &self.reassembler
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    /// Mailbox drops are counted by the mailbox itself; the service copies
    /// the running total here so it shows up in status snapshots.
    pub fn record_mailbox_overflows(&mut self, total: u64) {
        self.stats.mailbox_overflows = total;
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            token: self.token,
            role: self.role(),
            participating: self.participating,
            highest_token_seen: self.election.highest_token_seen(),
            sequence: self.sequence,
            stats: self.stats.clone(),
        }
    }

    /// Enter or leave the participating mode. Either way the node restarts as
    /// a fresh follower: any election is abandoned and reassembly and
    /// liveness state are cleared.
    pub fn set_participating(&mut self, participating: bool, now_ms: u64) -> Vec<NodeEvent> {
        if participating == self.participating {
            return Vec::new();
        }
        info!(
            "Node {} {} the mesh",
            self.token,
            if participating { "joining" } else { "leaving" }
        );
        self.participating = participating;

        let mut out = TickOutput::default();
        self.apply(now_ms, Trigger::Reset, &mut out);
        out.events
    }

    /// One control-loop step: consume the inbound datagrams drained from the
    /// mailbox, then run the timers of the current role.
    pub fn tick(
        &mut self,
        now_ms: u64,
        inbound: Vec<Inbound>,
        pattern: &mut dyn Pattern,
    ) -> TickOutput {
        let mut out = TickOutput::default();
        if !self.participating {
            if !inbound.is_empty() {
                trace!("Discarding {} datagrams while not participating", inbound.len());
            }
            return out;
        }

        for datagram in inbound {
            self.handle_datagram(now_ms, &datagram.bytes, datagram.origin, pattern, &mut out);
        }

        match self.phase {
            Phase::Follower { .. } => self.follower_tick(now_ms, &mut out),
            Phase::Electing => self.electing_tick(now_ms, &mut out),
            Phase::Leader { .. } => self.leader_tick(now_ms, pattern, &mut out),
        }

        out
    }

    /// Decode and apply a single inbound datagram. Malformed input is counted
    /// and dropped without touching protocol state.
    pub fn handle_datagram(
        &mut self,
        now_ms: u64,
        bytes: &[u8],
        origin: Origin,
        pattern: &mut dyn Pattern,
        out: &mut TickOutput,
    ) {
        let datagram = match codec::decode(bytes) {
            Ok(datagram) => datagram,
            Err(error) => {
                self.stats.malformed_datagrams += 1;
                debug!("Dropping datagram from {origin:?}: {error}");
                out.events.push(NodeEvent::DatagramRejected { origin, error });
                return;
            }
        };

        let sender = datagram.token();
        if sender == self.token {
            self.stats.self_echoes += 1;
            return;
        }
        self.election.observe_token(sender);

        match datagram {
            Datagram::Heartbeat { token } => {
                if let Phase::Follower {
                    last_inbound_ms,
                    missed,
                } = &mut self.phase
                {
                    *last_inbound_ms = now_ms;
                    *missed = 0;
                    trace!("Heartbeat from {token} (leader alive)");
                }
            }
            Datagram::PixelChunk(chunk) => {
                if let Phase::Follower {
                    last_inbound_ms,
                    missed,
                } = &mut self.phase
                {
                    *last_inbound_ms = now_ms;
                    *missed = 0;
                    self.accept_chunk(&chunk, pattern, out);
                }
            }
        }

        if let Phase::Leader { .. } = self.phase {
            if self.election.outranked() {
                self.apply(now_ms, Trigger::Outranked { by: sender }, out);
            }
        }
    }

    fn accept_chunk(&mut self, chunk: &PixelChunk, pattern: &mut dyn Pattern, out: &mut TickOutput) {
        self.stats.chunks_received += 1;
        trace!(
            "Chunk {} seq={} from {} ({} bytes)",
            chunk.index,
            chunk.sequence,
            chunk.sender,
            chunk.payload.len()
        );

        if !self
            .reassembler
            .apply_chunk(usize::from(chunk.index), &chunk.payload)
        {
            self.stats.out_of_range_chunks += 1;
            debug!(
                "Dropping chunk index {} (frame has {} chunks)",
                chunk.index,
                self.layout.chunk_count()
            );
            return;
        }

        if self.reassembler.is_complete() {
            pattern.show(self.reassembler.pixels());
            self.reassembler.mark_consumed();
            self.stats.frames_completed += 1;
            out.events.push(NodeEvent::FrameCompleted);
        }
    }

    fn follower_tick(&mut self, now_ms: u64, out: &mut TickOutput) {
        let Phase::Follower {
            last_inbound_ms,
            missed,
        } = &mut self.phase
        else {
            return;
        };

        let timeout = self.config.leader_timeout_ms;
        let silent_ms = now_ms.saturating_sub(*last_inbound_ms);
        if silent_ms > timeout {
            *missed += 1;
            if *missed >= self.config.missed_interval_threshold {
                self.apply(now_ms, Trigger::LeaderSilent { silent_ms }, out);
            } else {
                info!(
                    "Leader silent for {silent_ms}ms, missed {}/{}",
                    missed, self.config.missed_interval_threshold
                );
            }
        } else if silent_ms < timeout / 2 {
            *missed = 0;
        }
    }

    fn electing_tick(&mut self, now_ms: u64, out: &mut TickOutput) {
        let step = self.election.tick(now_ms);
        if step.cast_ballot {
            debug!("Casting ballot {}", self.token);
            self.push_heartbeat(out);
        }

        match step.outcome {
            Some(ElectionOutcome::Won) => self.apply(now_ms, Trigger::RoundWon, out),
            Some(ElectionOutcome::Lost { highest }) => {
                self.apply(now_ms, Trigger::RoundLost { highest }, out)
            }
            None => {}
        }
    }

    fn leader_tick(&mut self, now_ms: u64, pattern: &mut dyn Pattern, out: &mut TickOutput) {
        if self.election.outranked() {
            let by = self.election.highest_token_seen();
            self.apply(now_ms, Trigger::Outranked { by }, out);
            return;
        }

        if let Phase::Leader { last_heartbeat_ms } = &mut self.phase {
            let due = match *last_heartbeat_ms {
                None => true,
                Some(last) => now_ms.saturating_sub(last) >= self.config.heartbeat_interval_ms,
            };
            if due {
                *last_heartbeat_ms = Some(now_ms);
                self.push_heartbeat(out);
            }
        }

        pattern.render(now_ms, &mut self.render_buffer);
        let chunks = codec::encode_frame(
            &self.layout,
            self.sequence,
            self.token,
            &self.render_buffer,
            self.config.brightness,
        );
        self.sequence = self.sequence.wrapping_add(chunks.len() as u32);
        self.stats.chunks_sent += chunks.len() as u64;
        out.outbound.extend(chunks);
    }

    fn push_heartbeat(&mut self, out: &mut TickOutput) {
        self.stats.heartbeats_sent += 1;
        out.outbound
            .push(codec::encode(&Datagram::Heartbeat { token: self.token }));
    }

    /// The only place the role changes.
    fn apply(&mut self, now_ms: u64, trigger: Trigger, out: &mut TickOutput) {
        let from = self.role();
        let to = match (from, trigger) {
            (_, Trigger::Reset) => Role::Follower,
            (Role::Follower, Trigger::LeaderSilent { .. }) => Role::Electing,
            (Role::Electing, Trigger::RoundWon) => Role::Leader,
            (Role::Electing, Trigger::RoundLost { .. }) => Role::Follower,
            (Role::Leader, Trigger::Outranked { .. }) => Role::Follower,
            (role, trigger) => {
                debug!("Ignoring {trigger:?} while {role}");
                return;
            }
        };

        self.phase = match to {
            Role::Follower => {
                self.election.abandon();
                self.reassembler.reset();
                Phase::Follower {
                    last_inbound_ms: now_ms,
                    missed: 0,
                }
            }
            Role::Electing => {
                let round = self.election.start_round(now_ms);
                self.stats.elections_started += 1;
                debug!(
                    "Election round {}..{}ms, ballot delay {}ms",
                    round.start_ms, round.end_ms, round.delay_ms
                );
                Phase::Electing
            }
            Role::Leader => {
                self.stats.elections_won += 1;
                Phase::Leader {
                    last_heartbeat_ms: None,
                }
            }
        };

        match trigger {
            Trigger::LeaderSilent { silent_ms } => {
                info!("FSM: {from}→{to} (silent {silent_ms}ms) token={}", self.token)
            }
            Trigger::RoundWon => info!(
                "FSM: {from}→{to} won (high={})",
                self.election.highest_token_seen()
            ),
            Trigger::RoundLost { highest } => info!("FSM: {from}→{to} lost (high={highest})"),
            Trigger::Outranked { by } => {
                self.stats.step_downs += 1;
                info!("FSM: {from}→{to} saw higher token {by}")
            }
            Trigger::Reset if from == to => debug!("FSM: {to} reset"),
            Trigger::Reset => info!("FSM: {from}→{to} reset"),
        }

        if from != to {
            out.events.push(NodeEvent::RoleChanged { from, to });
        }
    }
}
