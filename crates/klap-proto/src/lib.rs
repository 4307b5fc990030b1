//! Shared data model for the KLAP/XOR transports: device configuration, the
//! transport error taxonomy, and the `Transport` trait both implementations
//! satisfy. Contains no I/O of its own.

pub mod config;
pub mod error;
pub mod transport;

pub use config::{ConfigCredentials, DeviceConfig};
pub use error::TransportError;
pub use transport::Transport;
