// Protocol core
pub mod mesh;
pub mod pattern;
pub mod config;

// Runtime plumbing
pub mod network;
pub mod common;
pub mod sim;

// Public exports
pub use config::{Config, NetworkConfig};
pub use mesh::{MeshConfig, MeshError, MeshNode, MeshService, NodeEvent, Role, Token};
pub use sim::Simulation;
