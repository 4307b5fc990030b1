//! Legacy auto-keyed XOR stream cipher.
//!
//! The key byte used on plaintext byte `i` is the previous *ciphertext*
//! byte (`key_{i+1} = ciphertext_i`), seeded with `0xAB`. Decryption mirrors
//! this using the previous ciphertext byte read from the wire rather than
//! one produced locally. This is not a cryptographically meaningful cipher
//! — it exists only to interoperate with devices that predate KLAP.

const SEED: u8 = 0xAB;

/// Encrypt `plaintext` in place, returning a new ciphertext buffer.
pub fn xor_encrypt(plaintext: &[u8]) -> Vec<u8> {
    let mut key = SEED;
    let mut out = Vec::with_capacity(plaintext.len());
    for &b in plaintext {
        let c = b ^ key;
        out.push(c);
        key = c;
    }
    out
}

/// Decrypt `ciphertext`, returning the recovered plaintext.
pub fn xor_decrypt(ciphertext: &[u8]) -> Vec<u8> {
    let mut key = SEED;
    let mut out = Vec::with_capacity(ciphertext.len());
    for &c in ciphertext {
        out.push(c ^ key);
        key = c;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let msg = b"{\"system\":{\"get_sysinfo\":null}}";
        let ct = xor_encrypt(msg);
        assert_eq!(xor_decrypt(&ct), msg);
    }

    #[test]
    fn first_byte_keyed_by_seed() {
        let ct = xor_encrypt(&[0x00]);
        assert_eq!(ct[0], SEED);
    }

    #[test]
    fn empty_input_roundtrips() {
        assert_eq!(xor_encrypt(&[]), Vec::<u8>::new());
        assert_eq!(xor_decrypt(&[]), Vec::<u8>::new());
    }

    #[test]
    fn differs_from_plain_xor_with_fixed_key() {
        // A naive fixed-key XOR would repeat SEED for every byte; the
        // auto-keying must make byte 1's key depend on byte 0's ciphertext.
        let msg = [0x41u8, 0x41];
        let ct = xor_encrypt(&msg);
        assert_ne!(ct[0], ct[1]);
    }
}
