//! The abstract contract both transports implement, so higher layers never
//! need to know whether they're talking KLAP or the legacy XOR protocol.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

#[async_trait]
pub trait Transport: Send + Sync {
    /// True iff a handshake must run before `send` will succeed.
    fn needs_handshake(&self) -> bool;

    /// True iff this transport requires a separate `login` step. Both
    /// shipped transports return `false`; `login` then always fails with
    /// `TransportError::ProgrammingError`.
    fn needs_login(&self) -> bool;

    /// Establish (or re-establish) a session. Idempotent: calling it again
    /// replaces any prior session rather than erroring.
    async fn handshake(&self) -> Result<(), TransportError>;

    /// Only meaningful when `needs_login()` is true.
    async fn login(&self) -> Result<(), TransportError> {
        Err(TransportError::programming(
            "this transport has no separate login step",
        ))
    }

    /// Send a JSON request string and return the parsed JSON response.
    /// Illegal while `needs_handshake()` is true.
    async fn send(&self, request: &str) -> Result<Value, TransportError>;

    /// Release any held connection/session resources. Safe to call more
    /// than once.
    async fn close(&self) -> Result<(), TransportError>;
}
