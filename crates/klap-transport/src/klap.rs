//! KLAP transport: two-stage handshake, session lifecycle, and the signed
//! request/response channel.
//!
//! The HTTP client never uses `reqwest`'s cookie store — the device
//! misbehaves if cookies it didn't set (or a stale `TIMEOUT` cookie it did)
//! are echoed back, so every request attaches exactly one `Cookie:
//! TP_SESSIONID=...` header built by hand.

use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use klap_crypto::hash::{auth_hash_v1, auth_hash_v2, sha256, Credentials};
use klap_crypto::session::KlapSession;
use klap_proto::{DeviceConfig, Transport, TransportError};
use rand::RngCore;
use reqwest::header::{COOKIE, SET_COOKIE};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

const SESSION_COOKIE_NAME: &str = "TP_SESSIONID";
const SESSION_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// The two hash constructions KLAP devices speak. They differ only in how
/// the handshake digests mix `local_seed`/`remote_seed`/`auth_hash` — the
/// session derivation and request cipher are identical either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlapVariant {
    V1,
    V2,
}

impl KlapVariant {
    fn auth_hash(self, creds: &Credentials) -> Vec<u8> {
        match self {
            KlapVariant::V1 => auth_hash_v1(creds),
            KlapVariant::V2 => auth_hash_v2(creds),
        }
    }

    fn h1(self, local_seed: &[u8], remote_seed: &[u8], auth_hash: &[u8]) -> [u8; 32] {
        match self {
            KlapVariant::V1 => {
                let mut buf = Vec::with_capacity(local_seed.len() + auth_hash.len());
                buf.extend_from_slice(local_seed);
                buf.extend_from_slice(auth_hash);
                sha256(&buf)
            }
            KlapVariant::V2 => {
                let mut buf = Vec::with_capacity(local_seed.len() + remote_seed.len() + auth_hash.len());
                buf.extend_from_slice(local_seed);
                buf.extend_from_slice(remote_seed);
                buf.extend_from_slice(auth_hash);
                sha256(&buf)
            }
        }
    }

    fn h2(self, local_seed: &[u8], remote_seed: &[u8], auth_hash: &[u8]) -> [u8; 32] {
        match self {
            KlapVariant::V1 => {
                let mut buf = Vec::with_capacity(remote_seed.len() + auth_hash.len());
                buf.extend_from_slice(remote_seed);
                buf.extend_from_slice(auth_hash);
                sha256(&buf)
            }
            KlapVariant::V2 => {
                let mut buf = Vec::with_capacity(remote_seed.len() + local_seed.len() + auth_hash.len());
                buf.extend_from_slice(remote_seed);
                buf.extend_from_slice(local_seed);
                buf.extend_from_slice(auth_hash);
                sha256(&buf)
            }
        }
    }
}

struct SessionState {
    handshake_done: bool,
    session_expires_at: Option<Instant>,
    session_cookie: Option<String>,
    klap_session: Option<KlapSession>,
}

impl SessionState {
    fn empty() -> Self {
        Self {
            handshake_done: false,
            session_expires_at: None,
            session_cookie: None,
            klap_session: None,
        }
    }

    fn is_expired(&self) -> bool {
        match self.session_expires_at {
            Some(t) => Instant::now() >= t,
            None => true,
        }
    }
}

pub struct KlapTransport {
    host: String,
    client: reqwest::Client,
    credentials: Credentials,
    variant: KlapVariant,
    verify_response_signature: bool,
    handshake_lock: AsyncMutex<()>,
    query_lock: AsyncMutex<()>,
    state: StdMutex<SessionState>,
}

impl KlapTransport {
    pub fn new(config: &DeviceConfig, variant: KlapVariant) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .cookie_store(false)
            .build()?;

        Ok(Self {
            host: config.host.clone(),
            client,
            credentials: config.credentials(),
            variant,
            verify_response_signature: config.verify_response_signature,
            handshake_lock: AsyncMutex::new(()),
            query_lock: AsyncMutex::new(()),
            state: StdMutex::new(SessionState::empty()),
        })
    }

    fn handshake1_url(&self) -> String {
        format!("http://{}/app/handshake1", self.host)
    }

    fn handshake2_url(&self) -> String {
        format!("http://{}/app/handshake2", self.host)
    }

    fn request_url(&self, seq: i32) -> String {
        format!("http://{}/app/request?seq={}", self.host, seq)
    }

    fn cookie_header(&self) -> Option<String> {
        let cookie = self.state.lock().expect("session state poisoned").session_cookie.clone();
        cookie.map(|v| format!("{SESSION_COOKIE_NAME}={v}"))
    }

    fn store_cookie_from(&self, response: &reqwest::Response) {
        for value in response.headers().get_all(SET_COOKIE) {
            if let Ok(text) = value.to_str() {
                if let Some(rest) = text.strip_prefix(&format!("{SESSION_COOKIE_NAME}=")) {
                    let cookie_value = rest.split(';').next().unwrap_or(rest).to_string();
                    let mut state = self.state.lock().expect("session state poisoned");
                    state.session_cookie = Some(cookie_value);
                }
            }
        }
    }

    /// Credential trial ladder (§4.3.1): configured creds, then kasa-setup
    /// well-knowns, then blank — skipping blank if the configured
    /// credentials already are blank.
    async fn handshake1(&self) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>), TransportError> {
        let mut local_seed = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut local_seed);

        debug!(host = %self.host, "klap handshake1 starting");
        let response = self
            .client
            .post(self.handshake1_url())
            .body(local_seed.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::auth(format!(
                "device {} responded with {} to handshake1",
                self.host,
                response.status()
            )));
        }

        self.store_cookie_from(&response);
        let body = response.bytes().await?;
        if body.len() != 48 {
            return Err(TransportError::protocol(format!(
                "handshake1 response was {} bytes, expected 48",
                body.len()
            )));
        }
        let remote_seed = body[0..16].to_vec();
        let server_hash = body[16..48].to_vec();

        let mut candidates = vec![self.credentials.clone()];
        candidates.push(Credentials::kasa_setup());
        if self.credentials != Credentials::blank() {
            candidates.push(Credentials::blank());
        }

        for creds in &candidates {
            let auth_hash = self.variant.auth_hash(creds);
            let expected = self.variant.h1(&local_seed, &remote_seed, &auth_hash);
            if expected.as_slice() == server_hash.as_slice() {
                debug!(host = %self.host, "klap handshake1 credential match found");
                return Ok((local_seed.to_vec(), remote_seed, auth_hash));
            }
        }

        Err(TransportError::auth(format!(
            "no credential candidate matched device {}'s handshake1 hash",
            self.host
        )))
    }

    async fn handshake2(&self, local_seed: &[u8], remote_seed: &[u8], auth_hash: &[u8]) -> Result<(), TransportError> {
        let payload = self.variant.h2(local_seed, remote_seed, auth_hash).to_vec();

        let mut request = self.client.post(self.handshake2_url()).body(payload);
        if let Some(cookie) = self.cookie_header() {
            request = request.header(COOKIE, cookie);
        }

        debug!(host = %self.host, "klap handshake2 starting");
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(TransportError::auth(format!(
                "device {} responded with {} to handshake2",
                self.host,
                response.status()
            )));
        }

        let local_seed_fixed: [u8; 16] = local_seed.try_into().map_err(|_| {
            TransportError::protocol("local_seed was not 16 bytes")
        })?;
        let remote_seed_fixed: [u8; 16] = remote_seed.try_into().map_err(|_| {
            TransportError::protocol("remote_seed was not 16 bytes")
        })?;

        let session = KlapSession::new(&local_seed_fixed, &remote_seed_fixed, auth_hash);
        let mut state = self.state.lock().expect("session state poisoned");
        state.klap_session = Some(session);
        state.handshake_done = true;
        state.session_expires_at = Some(Instant::now() + SESSION_LIFETIME);
        debug!(host = %self.host, "klap session established");
        Ok(())
    }
}

#[async_trait]
impl Transport for KlapTransport {
    fn needs_handshake(&self) -> bool {
        let state = self.state.lock().expect("session state poisoned");
        !state.handshake_done || state.is_expired()
    }

    fn needs_login(&self) -> bool {
        false
    }

    async fn handshake(&self) -> Result<(), TransportError> {
        let _guard = self.handshake_lock.lock().await;
        let (local_seed, remote_seed, auth_hash) = self.handshake1().await?;
        self.handshake2(&local_seed, &remote_seed, &auth_hash).await
    }

    async fn send(&self, request: &str) -> Result<Value, TransportError> {
        let _query_guard = self.query_lock.lock().await;

        if self.needs_handshake() {
            return Err(TransportError::protocol(
                "send called before a completed handshake",
            ));
        }

        let (blob, seq) = {
            let mut state = self.state.lock().expect("session state poisoned");
            let session = state
                .klap_session
                .as_mut()
                .expect("handshake_done implies klap_session is set");
            session.encrypt(request.as_bytes())?
        };

        let mut http_request = self.client.post(self.request_url(seq)).body(blob);
        if let Some(cookie) = self.cookie_header() {
            http_request = http_request.header(COOKIE, cookie);
        }

        debug!(host = %self.host, seq, "klap request sent");
        let response = http_request.send().await?;
        let status = response.status();

        if status.as_u16() == 403 {
            warn!(host = %self.host, "klap request rejected with 403, clearing session");
            let mut state = self.state.lock().expect("session state poisoned");
            state.handshake_done = false;
            state.klap_session = None;
            return Err(TransportError::auth("device rejected request with 403"));
        }

        if !status.is_success() {
            return Err(TransportError::protocol(format!(
                "device {} responded with {} to request",
                self.host, status
            )));
        }

        let body = response.bytes().await?;
        let plaintext = {
            let state = self.state.lock().expect("session state poisoned");
            let session = state
                .klap_session
                .as_ref()
                .expect("handshake_done implies klap_session is set");
            if self.verify_response_signature {
                session.decrypt_verified(&body)?
            } else {
                session.decrypt(&body)?
            }
        };

        let text = String::from_utf8(plaintext)?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().expect("session state poisoned");
        state.handshake_done = false;
        state.klap_session = None;
        state.session_cookie = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_h1_excludes_remote_seed() {
        let local = [1u8; 16];
        let remote_a = [2u8; 16];
        let remote_b = [9u8; 16];
        let auth = [3u8; 16];
        assert_eq!(
            KlapVariant::V1.h1(&local, &remote_a, &auth),
            KlapVariant::V1.h1(&local, &remote_b, &auth)
        );
    }

    #[test]
    fn v2_h1_includes_remote_seed() {
        let local = [1u8; 16];
        let remote_a = [2u8; 16];
        let remote_b = [9u8; 16];
        let auth = [3u8; 16];
        assert_ne!(
            KlapVariant::V2.h1(&local, &remote_a, &auth),
            KlapVariant::V2.h1(&local, &remote_b, &auth)
        );
    }

    #[test]
    fn blank_candidate_skipped_when_configured_creds_are_blank() {
        let config = DeviceConfig::new("10.0.0.5");
        let transport = KlapTransport::new(&config, KlapVariant::V2).unwrap();
        assert_eq!(transport.credentials, Credentials::blank());
    }

    #[test]
    fn fresh_transport_needs_handshake() {
        let config = DeviceConfig::new("10.0.0.5");
        let transport = KlapTransport::new(&config, KlapVariant::V2).unwrap();
        assert!(transport.needs_handshake());
        assert!(!transport.needs_login());
    }
}
