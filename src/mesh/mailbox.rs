//! Inbound datagram handoff from the transport's receive context to the
//! control loop. The receive side only enqueues; protocol state is touched
//! exclusively by whoever drains the mailbox.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// Where an inbound datagram came from. Used for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Udp(SocketAddr),
    Memory(usize),
}

#[derive(Debug, Clone)]
pub struct Inbound {
    pub bytes: Vec<u8>,
    pub origin: Origin,
}

#[derive(Clone)]
pub struct MailboxSender {
    tx: mpsc::Sender<Inbound>,
    overflows: Arc<AtomicU64>,
}

impl MailboxSender {
    /// Never blocks. A full mailbox drops the datagram, which the protocol
    /// tolerates like any other loss. Returns false once the mailbox is gone.
    pub fn offer(&self, bytes: Vec<u8>, origin: Origin) -> bool {
        match self.tx.try_send(Inbound { bytes, origin }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.overflows.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct Mailbox {
    rx: mpsc::Receiver<Inbound>,
    capacity: usize,
    overflows: Arc<AtomicU64>,
}

impl Mailbox {
    pub fn channel(capacity: usize) -> (MailboxSender, Mailbox) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let overflows = Arc::new(AtomicU64::new(0));
        (
            MailboxSender {
                tx,
                overflows: Arc::clone(&overflows),
            },
            Mailbox {
                rx,
                capacity,
                overflows,
            },
        )
    }

    /// Take what is queued right now, at most `capacity` entries, so a
    /// flooding peer cannot stall the tick.
    pub fn drain(&mut self) -> Vec<Inbound> {
        let mut drained = Vec::new();
        for _ in 0..self.capacity {
            match self.rx.try_recv() {
                Ok(inbound) => drained.push(inbound),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        drained
    }

    /// Datagrams dropped because the mailbox was full.
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_in_arrival_order() {
        let (tx, mut mailbox) = Mailbox::channel(8);
        tx.offer(vec![1], Origin::Memory(0));
        tx.offer(vec![2], Origin::Memory(1));

        let drained = mailbox.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].bytes, vec![1]);
        assert_eq!(drained[1].origin, Origin::Memory(1));
        assert!(mailbox.drain().is_empty());
    }

    #[test]
    fn full_mailbox_drops_and_counts() {
        let (tx, mut mailbox) = Mailbox::channel(2);
        for i in 0..5u8 {
            assert!(tx.offer(vec![i], Origin::Memory(0)));
        }
        assert_eq!(mailbox.overflows(), 3);
        assert_eq!(mailbox.drain().len(), 2);
    }

    #[test]
    fn offer_reports_closed_mailbox() {
        let (tx, mailbox) = Mailbox::channel(2);
        drop(mailbox);
        assert!(tx.is_closed());
        assert!(!tx.offer(vec![0], Origin::Memory(0)));
    }
}
