//! Deterministic, single-threaded mesh simulation over a lossy in-memory
//! medium. Nodes tick one after another on a shared virtual clock.

use log::debug;

use crate::mesh::{
    JitterSource, Mailbox, MeshConfig, MeshError, MeshNode, NodeEvent, RngJitter, Role, Token,
};
use crate::network::{MemoryHub, MemoryTransport, Transport};
use crate::pattern::RainbowPattern;

struct SimNode {
    node: MeshNode,
    mailbox: Mailbox,
    transport: MemoryTransport,
    pattern: RainbowPattern,
}

pub struct Simulation {
    nodes: Vec<SimNode>,
    hub: MemoryHub,
    now_ms: u64,
    tick_ms: u64,
}

impl Simulation {
    /// One node per token, each with seeded random election jitter.
    pub fn new(
        tokens: &[Token],
        config: MeshConfig,
        loss: f64,
        seed: u64,
    ) -> Result<Self, MeshError> {
        Self::with_jitter(tokens, config, loss, seed, |i| {
            Box::new(RngJitter::seeded(seed.wrapping_add(i as u64 + 1)))
        })
    }

    /// Like [`Simulation::new`] but with caller-chosen jitter per node index.
    pub fn with_jitter<F>(
        tokens: &[Token],
        config: MeshConfig,
        loss: f64,
        seed: u64,
        mut jitter: F,
    ) -> Result<Self, MeshError>
    where
        F: FnMut(usize) -> Box<dyn JitterSource>,
    {
        config.validate()?;
        let hub = MemoryHub::new(loss, seed);
        let mut nodes = Vec::with_capacity(tokens.len());
        for (i, &token) in tokens.iter().enumerate() {
            let (tx, mailbox) = Mailbox::channel(config.mailbox_capacity);
            let transport = hub.attach(tx);
            let node = MeshNode::new(token, config.clone(), jitter(i), 0)?;
            nodes.push(SimNode {
                node,
                mailbox,
                transport,
                pattern: RainbowPattern::default(),
            });
        }
        Ok(Self {
            nodes,
            hub,
            now_ms: 0,
            tick_ms: config.tick_interval_ms,
        })
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn hub(&self) -> &MemoryHub {
        &self.hub
    }

    /// Panics if `i` is out of range.
    pub fn node(&self, i: usize) -> &MeshNode {
        &self.nodes[i].node
    }

    /// Panics if `i` is out of range.
    pub fn pattern(&self, i: usize) -> &RainbowPattern {
        &self.nodes[i].pattern
    }

    pub fn roles(&self) -> Vec<Role> {
        self.nodes.iter().map(|n| n.node.role()).collect()
    }

    /// Indices of the nodes currently in the leader role.
    pub fn leaders(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.node.role() == Role::Leader)
            .map(|(i, _)| i)
            .collect()
    }

    /// Cut a node off the medium (a crash, from everyone else's view) or
    /// reconnect it.
    pub fn isolate(&self, i: usize, isolated: bool) -> Result<(), MeshError> {
        self.hub.isolate(i, isolated)?;
        Ok(())
    }

    pub fn set_participating(&mut self, i: usize, participating: bool) -> Vec<NodeEvent> {
        let now = self.now_ms;
        match self.nodes.get_mut(i) {
            Some(sim) => sim.node.set_participating(participating, now),
            None => Vec::new(),
        }
    }

    /// Advance the clock by one tick interval and tick every node in index
    /// order. Returns the events raised, tagged with the node index.
    pub fn step(&mut self) -> Vec<(usize, NodeEvent)> {
        self.now_ms += self.tick_ms;
        let now = self.now_ms;
        let mut events = Vec::new();

        for (i, sim) in self.nodes.iter_mut().enumerate() {
            let inbound = sim.mailbox.drain();
            sim.node.record_mailbox_overflows(sim.mailbox.overflows());
            let out = sim.node.tick(now, inbound, &mut sim.pattern);
            for datagram in &out.outbound {
                if let Err(e) = sim.transport.broadcast(datagram) {
                    debug!("Node {i} broadcast failed: {e}");
                }
            }
            events.extend(out.events.into_iter().map(|e| (i, e)));
        }
        events
    }

    /// Step until at least `duration_ms` of virtual time has passed.
    pub fn run_for(&mut self, duration_ms: u64) -> Vec<(usize, NodeEvent)> {
        let until = self.now_ms + duration_ms;
        let mut events = Vec::new();
        while self.now_ms < until {
            events.extend(self.step());
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &[u32]) -> Vec<Token> {
        raw.iter().map(|&t| Token::new(t)).collect()
    }

    #[test]
    fn single_node_elects_itself() {
        let mut sim = Simulation::new(&tokens(&[0x42]), MeshConfig::default(), 0.0, 1).unwrap();
        sim.run_for(3_000);
        assert_eq!(sim.leaders(), vec![0]);
    }

    #[test]
    fn run_for_advances_in_whole_ticks() {
        let mut sim = Simulation::new(&tokens(&[1, 2]), MeshConfig::default(), 0.0, 1).unwrap();
        sim.run_for(50);
        assert_eq!(sim.now_ms(), 60);
        assert_eq!(sim.len(), 2);
    }

    #[test]
    fn isolate_unknown_node_is_an_error() {
        let sim = Simulation::new(&tokens(&[1]), MeshConfig::default(), 0.0, 1).unwrap();
        assert!(sim.isolate(5, true).is_err());
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = MeshConfig::new(300, 1);
        assert!(matches!(
            Simulation::new(&tokens(&[1]), config, 0.0, 1),
            Err(MeshError::TooManyChunks { .. })
        ));
    }
}
