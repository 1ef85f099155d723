mod error;
pub mod memory;
pub mod transport;

pub use error::NetworkError;
pub use memory::{MemoryHub, MemoryTransport};
pub use transport::{Transport, UdpTransport};
pub use crate::mesh::codec::MAX_DATAGRAM;
