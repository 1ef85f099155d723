pub mod codec;
mod config;
pub mod election;
mod error;
pub mod frame;
pub mod layout;
pub mod mailbox;
mod node;
mod state;

pub use self::codec::{Datagram, PixelChunk};
pub use self::config::MeshConfig;
pub use self::election::{ElectionEngine, FixedJitter, JitterSource, RngJitter};
pub use self::error::{CodecError, MeshError};
pub use self::frame::{FrameReassembler, Rgb};
pub use self::layout::{ChunkLayout, MASK_WIDTH};
pub use self::mailbox::{Inbound, Mailbox, MailboxSender, Origin};
pub use self::node::{MeshNode, NodeEvent, TickOutput};
pub use self::state::{parse_hardware_id, NodeStats, NodeStatus, Role, Token, TOKEN_MAX};

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::common::Clock;
use crate::network::Transport;
use crate::pattern::Pattern;

/// Control loop for one node: drains the mailbox, ticks the state machine,
/// sends what it produced and publishes a status snapshot.
pub struct MeshService<T: Transport, P: Pattern> {
    node: MeshNode,
    mailbox: Mailbox,
    transport: T,
    pattern: P,
    clock: Arc<dyn Clock>,
    mode: watch::Receiver<bool>,
    status: watch::Sender<NodeStatus>,
}

impl<T: Transport, P: Pattern> MeshService<T, P> {
    /// `mode` gates participation: the protocol only runs while it reads true.
    pub fn new(
        node: MeshNode,
        mailbox: Mailbox,
        transport: T,
        pattern: P,
        clock: Arc<dyn Clock>,
        mode: watch::Receiver<bool>,
    ) -> Self {
        let (status, _) = watch::channel(node.status());
        Self {
            node,
            mailbox,
            transport,
            pattern,
            clock,
            mode,
            status,
        }
    }

    pub fn node(&self) -> &MeshNode {
        &self.node
    }

    pub fn pattern(&self) -> &P {
        &self.pattern
    }

    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.status.subscribe()
    }

    /// Run a single tick at the clock's current time.
    pub fn step(&mut self) -> Vec<NodeEvent> {
        let now = self.clock.now_ms();
        let mut events = Vec::new();

        let wanted = *self.mode.borrow_and_update();
        if wanted != self.node.is_participating() {
            events.extend(self.node.set_participating(wanted, now));
        }

        let inbound = self.mailbox.drain();
        self.node.record_mailbox_overflows(self.mailbox.overflows());

        let out = self.node.tick(now, inbound, &mut self.pattern);
        for datagram in &out.outbound {
            if let Err(e) = self.transport.broadcast(datagram) {
                debug!("Broadcast of {} bytes failed: {e}", datagram.len());
            }
        }
        trace!("Tick at {now}ms sent {} datagrams", out.outbound.len());
        events.extend(out.events);

        self.status.send_replace(self.node.status());
        events
    }

    /// Tick forever at the configured cadence. Stop by dropping the future.
    pub async fn run(mut self) {
        let mut ticker = interval(Duration::from_millis(self.node.config().tick_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.step();
        }
    }
}
