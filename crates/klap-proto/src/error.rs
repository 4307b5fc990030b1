use thiserror::Error;

/// The three error kinds a transport can raise, per the protocol's error
/// taxonomy. Network, serialisation, and decryption failures are not
/// distinct variants — they fold into [`TransportError::ProtocolError`] via
/// the `From` impls below, since callers only ever need to distinguish
/// "credentials/session are bad", "the wire or caller misbehaved", and
/// "this operation isn't supported".
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("authentication failed: {0}")]
    AuthenticationError(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("programming error: {0}")]
    ProgrammingError(String),
}

impl TransportError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::AuthenticationError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolError(msg.into())
    }

    pub fn programming(msg: impl Into<String>) -> Self {
        Self::ProgrammingError(msg.into())
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::ProtocolError(format!("I/O error: {e}"))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::ProtocolError(format!("HTTP error: {e}"))
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::ProtocolError(format!("malformed JSON: {e}"))
    }
}

impl From<std::string::FromUtf8Error> for TransportError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Self::ProtocolError(format!("response was not valid UTF-8: {e}"))
    }
}

impl From<klap_crypto::CryptoError> for TransportError {
    fn from(e: klap_crypto::CryptoError) -> Self {
        Self::ProtocolError(format!("crypto error: {e}"))
    }
}
