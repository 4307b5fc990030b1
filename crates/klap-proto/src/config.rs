//! Device configuration: the one value every transport constructor needs.
//! No on-disk default path is baked in — callers supply a [`DeviceConfig`]
//! built from TOML, JSON, or plain code.

use klap_crypto::Credentials;
use serde::{Deserialize, Serialize};

const DEFAULT_KLAP_PORT: u16 = 80;
const DEFAULT_XOR_PORT: u16 = 9999;
const DEFAULT_TIMEOUT_SECONDS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub credentials: Option<ConfigCredentials>,
    #[serde(default)]
    pub timeout_seconds: Option<u32>,
    /// Opt into checking the device's response signature on every decrypt.
    /// Defaults to `false` — see the protocol design notes on unverified
    /// response signatures.
    #[serde(default)]
    pub verify_response_signature: bool,
}

/// Serde-friendly mirror of [`klap_crypto::Credentials`] (which intentionally
/// carries no serde impls of its own — it is crypto-adjacent state, not
/// wire/config data).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigCredentials {
    pub username: String,
    pub password: String,
}

impl From<ConfigCredentials> for Credentials {
    fn from(c: ConfigCredentials) -> Self {
        Credentials::new(c.username, c.password)
    }
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            credentials: None,
            timeout_seconds: None,
            verify_response_signature: false,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(ConfigCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
            .clone()
            .map(Credentials::from)
            .unwrap_or_default()
    }

    pub fn klap_port(&self) -> u16 {
        DEFAULT_KLAP_PORT
    }

    pub fn xor_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_XOR_PORT)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS) as u64)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = DeviceConfig::new("10.0.0.5");
        assert_eq!(cfg.klap_port(), 80);
        assert_eq!(cfg.xor_port(), 9999);
        assert_eq!(cfg.timeout(), std::time::Duration::from_secs(5));
        assert!(!cfg.verify_response_signature);
        assert_eq!(cfg.credentials(), Credentials::blank());
    }

    #[test]
    fn toml_roundtrip() {
        let text = r#"
            host = "10.0.0.5"
            port = 9999
            timeout_seconds = 10
            verify_response_signature = true

            [credentials]
            username = "alice"
            password = "hunter2"
        "#;
        let cfg = DeviceConfig::from_toml(text).unwrap();
        assert_eq!(cfg.host, "10.0.0.5");
        assert_eq!(cfg.xor_port(), 9999);
        assert_eq!(cfg.timeout(), std::time::Duration::from_secs(10));
        assert!(cfg.verify_response_signature);
        assert_eq!(cfg.credentials().username, "alice");
    }
}
