use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AES-CBC decryption failed: {0}")]
    CipherDecrypt(String),

    #[error("response signature mismatch (possible tampering or wrong seq)")]
    SignatureMismatch,
}
