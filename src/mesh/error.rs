use thiserror::Error;

/// Reasons a datagram is rejected by the wire codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Empty datagram")]
    Empty,

    #[error("Unknown datagram kind: {0:#04x}")]
    UnknownKind(u8),

    #[error("Truncated datagram of kind {kind:#04x}: {len} bytes, need at least {needed}")]
    Truncated { kind: u8, len: usize, needed: usize },
}

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Chunk count {chunk_count} exceeds completion mask width {width}")]
    TooManyChunks { chunk_count: usize, width: usize },

    #[error("Invalid hardware id: {0}")]
    InvalidHardwareId(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Network error: {0}")]
    NetworkError(String),
}
