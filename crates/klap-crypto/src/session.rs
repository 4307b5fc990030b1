//! KLAP session: derivation of the AES key, IV prefix, signing prefix, and
//! sequence counter from a pair of seeds and a credential-derived auth hash,
//! followed by the stateful `encrypt`/`decrypt` request cipher.
//!
//! # Derivation
//!   key       = sha256("lsk" || local_seed || remote_seed || auth_hash)[..16]
//!   iv_prefix = sha256("iv"  || local_seed || remote_seed || auth_hash)[..12]
//!   sig_prefix= sha256("ldk" || local_seed || remote_seed || auth_hash)[..28]
//!   seq       = i32::from_be_bytes(last 4 bytes of the "iv" digest above)
//!
//! `seq` is the only mutable field; it advances by exactly one per
//! `encrypt` call and is reused verbatim by the matching `decrypt` call,
//! mirroring how the device replies to the request that carried that
//! sequence number.

use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;
use crate::hash::sha256;
use crate::{cipher, xor};

/// Immutable-after-construction session key material, plus the one mutable
/// sequence counter. Not thread-safe — callers must serialise access
/// themselves (see the transport's query lock).
#[derive(ZeroizeOnDrop)]
pub struct KlapSession {
    key: [u8; 16],
    iv_prefix: [u8; 12],
    #[zeroize(skip)]
    sig_prefix: [u8; 28],
    seq: i32,
}

fn derive(local_seed: &[u8; 16], remote_seed: &[u8; 16], auth_hash: &[u8], domain: &[u8]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(domain.len() + 32 + auth_hash.len());
    buf.extend_from_slice(domain);
    buf.extend_from_slice(local_seed);
    buf.extend_from_slice(remote_seed);
    buf.extend_from_slice(auth_hash);
    sha256(&buf)
}

impl KlapSession {
    pub fn new(local_seed: &[u8; 16], remote_seed: &[u8; 16], auth_hash: &[u8]) -> Self {
        let key_digest = derive(local_seed, remote_seed, auth_hash, b"lsk");
        let iv_digest = derive(local_seed, remote_seed, auth_hash, b"iv");
        let sig_digest = derive(local_seed, remote_seed, auth_hash, b"ldk");

        let mut key = [0u8; 16];
        key.copy_from_slice(&key_digest[..16]);

        let mut iv_prefix = [0u8; 12];
        iv_prefix.copy_from_slice(&iv_digest[..12]);

        let mut sig_prefix = [0u8; 28];
        sig_prefix.copy_from_slice(&sig_digest[..28]);

        let seq = i32::from_be_bytes(iv_digest[28..32].try_into().expect("4 bytes"));

        Self {
            key,
            iv_prefix,
            sig_prefix,
            seq,
        }
    }

    /// The sequence value that the *next* `encrypt` call will produce.
    pub fn next_seq(&self) -> i32 {
        self.seq.wrapping_add(1)
    }

    /// The sequence value used by the most recent `encrypt`/`decrypt`.
    pub fn current_seq(&self) -> i32 {
        self.seq
    }

    fn iv_for(&self, seq: i32) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv[..12].copy_from_slice(&self.iv_prefix);
        iv[12..].copy_from_slice(&seq.to_be_bytes());
        iv
    }

    fn signature(&self, seq: i32, ciphertext: &[u8]) -> [u8; 32] {
        let mut buf = Vec::with_capacity(28 + 4 + ciphertext.len());
        buf.extend_from_slice(&self.sig_prefix);
        buf.extend_from_slice(&seq.to_be_bytes());
        buf.extend_from_slice(ciphertext);
        sha256(&buf)
    }

    /// Advance `seq` by one, encrypt `message` under the derived key/IV, and
    /// return `(signature || ciphertext, seq)`.
    pub fn encrypt(&mut self, message: &[u8]) -> Result<(Vec<u8>, i32), CryptoError> {
        self.seq = self.seq.wrapping_add(1);
        let iv = self.iv_for(self.seq);
        let ciphertext = cipher::encrypt(&self.key, &iv, message)?;
        let signature = self.signature(self.seq, &ciphertext);

        let mut blob = Vec::with_capacity(32 + ciphertext.len());
        blob.extend_from_slice(&signature);
        blob.extend_from_slice(&ciphertext);
        Ok((blob, self.seq))
    }

    /// Decrypt a response blob using the *current* `seq` (the value set by
    /// the matching `encrypt` call). The device's signature is not verified
    /// unless `verify_signature` is set — see [`KlapSession::decrypt`].
    fn decrypt_inner(&self, blob: &[u8], verify_signature: bool) -> Result<Vec<u8>, CryptoError> {
        if blob.len() < 32 {
            return Err(CryptoError::CipherDecrypt(
                "response shorter than the 32-byte signature".into(),
            ));
        }
        let (signature, ciphertext) = blob.split_at(32);

        if verify_signature {
            let expected = self.signature(self.seq, ciphertext);
            if expected != signature {
                return Err(CryptoError::SignatureMismatch);
            }
        }

        let iv = self.iv_for(self.seq);
        cipher::decrypt(&self.key, &iv, ciphertext)
    }

    /// Decrypt without checking the device's response signature (the
    /// default behaviour of this implementation — see the protocol design
    /// notes on unverified response signatures).
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.decrypt_inner(blob, false)
    }

    /// Decrypt and verify that the device's signature matches the one this
    /// session would have produced for the current `seq`.
    pub fn decrypt_verified(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.decrypt_inner(blob, true)
    }
}

/// Streaming auto-keyed XOR cipher used by the legacy (pre-KLAP) transport.
/// Kept alongside [`KlapSession`] because both are "the session's cipher" as
/// far as a transport is concerned, even though XOR carries no derived key
/// material of its own.
pub use xor::{xor_decrypt, xor_encrypt};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{auth_hash_v1, Credentials};

    fn seeds() -> ([u8; 16], [u8; 16]) {
        ([0x01u8; 16], [0x02u8; 16])
    }

    #[test]
    fn roundtrip_with_blank_credentials() {
        let (ls, rs) = seeds();
        let auth = auth_hash_v1(&Credentials::blank());
        let mut session = KlapSession::new(&ls, &rs, &auth);

        let msg = b"{\"system\":{\"get_sysinfo\":null}}";
        let (blob, seq) = session.encrypt(msg).unwrap();
        assert_eq!(seq, session.current_seq());
        let pt = session.decrypt(&blob).unwrap();
        assert_eq!(pt, msg);
    }

    #[test]
    fn determinism_across_fresh_sessions() {
        let (ls, rs) = seeds();
        let auth = auth_hash_v1(&Credentials::new("alice", "hunter2"));

        let mut a = KlapSession::new(&ls, &rs, &auth);
        let mut b = KlapSession::new(&ls, &rs, &auth);

        let msg = b"ping";
        assert_eq!(a.encrypt(msg).unwrap(), b.encrypt(msg).unwrap());
    }

    #[test]
    fn seq_increments_by_one_per_encrypt() {
        let (ls, rs) = seeds();
        let auth = auth_hash_v1(&Credentials::blank());
        let mut session = KlapSession::new(&ls, &rs, &auth);
        let initial = session.current_seq();

        for n in 1..=5 {
            let (_, seq) = session.encrypt(b"x").unwrap();
            assert_eq!(seq, initial.wrapping_add(n));
        }
    }

    #[test]
    fn encrypt_golden_signature() {
        let ls = [0x01u8; 16];
        let rs = [0x02u8; 16];
        let auth = [0x03u8; 16];
        let mut session = KlapSession::new(&ls, &rs, &auth);
        let initial_seq = session.current_seq();

        let (blob, seq) = session.encrypt(b"{\"x\":1}").unwrap();
        assert_eq!(seq, initial_seq.wrapping_add(1));

        let (signature, ciphertext) = blob.split_at(32);
        let expected = session.signature(seq, ciphertext);
        assert_eq!(signature, expected);
    }

    #[test]
    fn tampered_signature_rejected_when_verification_enabled() {
        let (ls, rs) = seeds();
        let auth = auth_hash_v1(&Credentials::blank());
        let mut session = KlapSession::new(&ls, &rs, &auth);

        let (mut blob, _) = session.encrypt(b"hello").unwrap();
        blob[0] ^= 0xFF;
        assert!(session.decrypt_verified(&blob).is_err());
        // Unverified decrypt still succeeds — signature is not checked by default.
        assert!(session.decrypt(&blob).is_ok());
    }
}
