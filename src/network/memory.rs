//! In-process broadcast medium with configurable loss, used by the
//! simulator and tests in place of a radio.

use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{NetworkError, Transport};
use crate::mesh::{MailboxSender, Origin};

struct Endpoint {
    mailbox: MailboxSender,
    isolated: bool,
}

struct HubInner {
    endpoints: Vec<Endpoint>,
    loss: f64,
    rng: StdRng,
    delivered: u64,
    dropped: u64,
}

#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    /// `loss` is the per-delivery drop probability, clamped to `[0, 1]`.
    pub fn new(loss: f64, seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                endpoints: Vec::new(),
                loss: loss.clamp(0.0, 1.0),
                rng: StdRng::seed_from_u64(seed),
                delivered: 0,
                dropped: 0,
            })),
        }
    }

    pub fn attach(&self, mailbox: MailboxSender) -> MemoryTransport {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.endpoints.push(Endpoint {
            mailbox,
            isolated: false,
        });
        MemoryTransport {
            hub: self.clone(),
            id: inner.endpoints.len() - 1,
        }
    }

    /// Cut an endpoint off the medium in both directions, or reconnect it.
    pub fn isolate(&self, id: usize, isolated: bool) -> Result<(), NetworkError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let endpoint = inner
            .endpoints
            .get_mut(id)
            .ok_or(NetworkError::UnknownEndpoint(id))?;
        endpoint.isolated = isolated;
        Ok(())
    }

    pub fn set_loss(&self, loss: f64) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.loss = loss.clamp(0.0, 1.0);
    }

    /// (delivered, dropped) per-receiver counts so far.
    pub fn counters(&self) -> (u64, u64) {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        (inner.delivered, inner.dropped)
    }

    fn deliver(&self, from: usize, bytes: &[u8]) -> Result<(), NetworkError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = inner
            .endpoints
            .get(from)
            .ok_or(NetworkError::UnknownEndpoint(from))?;
        if sender.isolated {
            return Ok(());
        }

        let HubInner {
            endpoints,
            loss,
            rng,
            delivered,
            dropped,
        } = &mut *inner;
        for (id, endpoint) in endpoints.iter().enumerate() {
            if id == from || endpoint.isolated {
                continue;
            }
            if *loss > 0.0 && rng.random_bool(*loss) {
                *dropped += 1;
                continue;
            }
            endpoint.mailbox.offer(bytes.to_vec(), Origin::Memory(from));
            *delivered += 1;
        }
        Ok(())
    }
}

pub struct MemoryTransport {
    hub: MemoryHub,
    id: usize,
}

impl MemoryTransport {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Transport for MemoryTransport {
    fn broadcast(&self, bytes: &[u8]) -> Result<(), NetworkError> {
        self.hub.deliver(self.id, bytes)
    }
}
