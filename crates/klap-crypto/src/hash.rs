//! Hash primitives and credential-derived auth hashes.
//!
//! - `md5` / `sha1` / `sha256` — thin wrappers returning raw digest bytes.
//! - `auth_hash_v1` / `auth_hash_v2` — credential-derived secrets mixed into
//!   the handshake and session derivation.
//! - `owner_hash` — diagnostic identifier only, never used in crypto.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

pub fn md5(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

pub fn sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Username/password pair used to authenticate a handshake.
///
/// A missing username or password is coerced to an empty string before
/// hashing, matching the device firmware's behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn blank() -> Self {
        Self::default()
    }

    /// The hardcoded fallback credentials devices use after a cloud reset.
    pub fn kasa_setup() -> Self {
        Self::new("kasa@tp-link.net", "kasaSetup")
    }
}

/// v1 auth hash: `md5(md5(username) || md5(password))`, 16 bytes.
pub fn auth_hash_v1(creds: &Credentials) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    buf.extend_from_slice(&md5(creds.username.as_bytes()));
    buf.extend_from_slice(&md5(creds.password.as_bytes()));
    md5(&buf).to_vec()
}

/// v2 auth hash: `sha256(sha1(username) || sha1(password))`, 32 bytes.
pub fn auth_hash_v2(creds: &Credentials) -> Vec<u8> {
    let mut buf = Vec::with_capacity(40);
    buf.extend_from_slice(&sha1(creds.username.as_bytes()));
    buf.extend_from_slice(&sha1(creds.password.as_bytes()));
    sha256(&buf).to_vec()
}

/// Diagnostic identifier for a credential set — not used in any crypto path.
pub fn owner_hash(creds: &Credentials) -> [u8; 16] {
    md5(creds.username.as_bytes())
}
