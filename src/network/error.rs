use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Send would block")]
    WouldBlock,

    #[error("Endpoint {0} is not attached")]
    UnknownEndpoint(usize),
}

impl From<NetworkError> for crate::mesh::MeshError {
    fn from(err: NetworkError) -> Self {
        crate::mesh::MeshError::NetworkError(err.to_string())
    }
}
