//! AES-128-CBC encrypt/decrypt helpers, PKCS#7 padded.
//!
//! Unlike an AEAD cipher this construction carries no built-in integrity
//! check — [`super::session::KlapSession`] layers a separate SHA-256
//! signature around the ciphertext (see §4.2 of the protocol design).

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::CryptoError;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// PKCS#7-pad `plaintext` to a 16-byte boundary and AES-128-CBC-encrypt it
/// under `key`/`iv`.
pub fn encrypt(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Ok(Aes128CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// AES-128-CBC-decrypt `ciphertext` under `key`/`iv` and strip PKCS#7 padding.
pub fn decrypt(key: &[u8; 16], iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| CryptoError::CipherDecrypt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = [0x11u8; 16];
        let iv = [0x22u8; 16];
        let msg = b"{\"method\":\"get_sysinfo\"}";
        let ct = encrypt(&key, &iv, msg).unwrap();
        assert_eq!(ct.len() % 16, 0);
        let pt = decrypt(&key, &iv, &ct).unwrap();
        assert_eq!(pt, msg);
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let key = [0x33u8; 16];
        let iv = [0x44u8; 16];
        let ct = encrypt(&key, &iv, b"").unwrap();
        assert_eq!(decrypt(&key, &iv, &ct).unwrap(), b"");
    }
}
