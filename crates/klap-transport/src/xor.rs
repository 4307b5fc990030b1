//! Legacy XOR transport: a length-prefixed TCP stream carrying auto-keyed
//! XOR-encoded JSON. Used as a fallback by devices whose firmware predates
//! KLAP.

use std::time::Duration;

use async_trait::async_trait;
use klap_crypto::xor::{xor_decrypt, xor_encrypt};
use klap_proto::{DeviceConfig, Transport, TransportError};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const DEFAULT_RETRY_COUNT: u32 = 3;

struct Connection {
    stream: TcpStream,
}

/// Whether a connection failure should abort immediately or be retried.
enum SendFailure {
    NonRetryable(std::io::Error),
    Retryable(std::io::Error),
}

pub struct XorTransport {
    addr: String,
    timeout: Duration,
    retry_count: u32,
    query_lock: Mutex<Option<Connection>>,
}

impl XorTransport {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            addr: format!("{}:{}", config.host, config.xor_port()),
            timeout: config.timeout(),
            retry_count: DEFAULT_RETRY_COUNT,
            query_lock: Mutex::new(None),
        }
    }

    /// `ErrorKind` has no variant for `EHOSTDOWN`, so it's checked via the
    /// raw errno alongside the `ErrorKind`-classifiable cases. Mirrors
    /// `_NO_RETRY_ERRORS = {EHOSTDOWN, EHOSTUNREACH, ECONNREFUSED}`.
    fn classify(err: std::io::Error) -> SendFailure {
        let non_retryable = matches!(
            err.kind(),
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::HostUnreachable
        ) || Self::is_host_down(&err);

        if non_retryable {
            SendFailure::NonRetryable(err)
        } else {
            SendFailure::Retryable(err)
        }
    }

    #[cfg(unix)]
    fn is_host_down(err: &std::io::Error) -> bool {
        err.raw_os_error() == Some(libc::EHOSTDOWN)
    }

    #[cfg(not(unix))]
    fn is_host_down(_err: &std::io::Error) -> bool {
        false
    }

    async fn connect(&self) -> Result<Connection, SendFailure> {
        debug!(addr = %self.addr, "xor transport connecting");
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                SendFailure::Retryable(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))
            })?
            .map_err(Self::classify)?;
        stream.set_nodelay(true).map_err(Self::classify)?;
        Ok(Connection { stream })
    }

    async fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> Result<(), std::io::Error> {
        let len = (payload.len() as u32).to_be_bytes();
        stream.write_all(&len).await?;
        stream.write_all(payload).await?;
        stream.flush().await
    }

    async fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>, std::io::Error> {
        let mut len_bytes = [0u8; 4];
        stream.read_exact(&mut len_bytes).await?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await?;
        Ok(buf)
    }

    async fn send_once(&self, request: &str, slot: &mut Option<Connection>) -> Result<Value, SendFailure> {
        if slot.is_none() {
            *slot = Some(self.connect().await?);
        }
        let conn = slot.as_mut().expect("just populated");

        let frame = xor_encrypt(request.as_bytes());
        let result: Result<Vec<u8>, std::io::Error> = async {
            Self::write_frame(&mut conn.stream, &frame).await?;
            tokio::time::timeout(self.timeout, Self::read_frame(&mut conn.stream))
                .await
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out"))?
        }
        .await;

        match result {
            Ok(response_bytes) => {
                let plaintext = xor_decrypt(&response_bytes);
                let text = String::from_utf8(plaintext).map_err(|e| {
                    SendFailure::Retryable(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                })?;
                serde_json::from_str(&text).map_err(|e| {
                    SendFailure::Retryable(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                })
            }
            Err(e) => Err(Self::classify(e)),
        }
    }
}

#[async_trait]
impl Transport for XorTransport {
    fn needs_handshake(&self) -> bool {
        false
    }

    fn needs_login(&self) -> bool {
        false
    }

    async fn handshake(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&self, request: &str) -> Result<Value, TransportError> {
        let mut slot = self.query_lock.lock().await;

        let mut last_err = None;
        for attempt in 0..=self.retry_count {
            match self.send_once(request, &mut slot).await {
                Ok(value) => return Ok(value),
                Err(SendFailure::NonRetryable(e)) => {
                    *slot = None;
                    return Err(TransportError::protocol(format!(
                        "non-retryable connection failure to {}: {e}",
                        self.addr
                    )));
                }
                Err(SendFailure::Retryable(e)) => {
                    *slot = None;
                    warn!(addr = %self.addr, attempt, "xor transport send failed, will retry");
                    last_err = Some(e);
                }
            }
        }
        Err(TransportError::protocol(format!(
            "xor transport to {} exhausted {} retries: {}",
            self.addr,
            self.retry_count,
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut slot = self.query_lock.lock().await;
        *slot = None;
        Ok(())
    }
}
