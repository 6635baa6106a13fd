//! The `Crypto` platform contract (§6): SHA-512, HKDF-SHA-512, Ed25519, X25519,
//! ChaCha20-Poly1305, and an SRP-6a/3072/SHA-512 verifier session.
//!
//! Modeled as a pluggable provider trait, the same pattern the BLE link layer in this crate's
//! ancestor used for its elliptic-curve backend: the pairing and session code is written against
//! the trait, and a concrete implementation (backed by real crates) is supplied by the host crate.

use crate::Error;

pub const ED25519_PUBLIC_KEY_LEN: usize = 32;
pub const ED25519_SECRET_KEY_LEN: usize = 64;
pub const ED25519_SIGNATURE_LEN: usize = 64;
pub const X25519_PUBLIC_KEY_LEN: usize = 32;
pub const X25519_SECRET_KEY_LEN: usize = 32;
pub const AEAD_TAG_LEN: usize = 16;
pub const SESSION_KEY_LEN: usize = 32;

/// An SRP-6a session, opaque to callers beyond what Pair Setup needs from it.
///
/// HAP requires the `SkipZeroes_M1_M2` variant: M1/M2 are computed from `A`/`B` without zero
/// padding. Any concrete SRP implementation plugged in here must honor that, or Pair Setup will
/// fail authentication against real controllers (§9, open question).
pub trait SrpSession: Send {
    /// The salt generated for this session (16 random bytes).
    fn salt(&self) -> &[u8; 16];

    /// The accessory's public ephemeral value `B`.
    fn public_key(&self) -> &[u8];

    /// Accepts the controller's public ephemeral value `A`.
    fn set_client_public_key(&mut self, client_public_key: &[u8]) -> Result<(), Error>;

    /// Verifies the controller's proof `M1`. On success, the session has a valid shared key `K`.
    fn verify_client_proof(&mut self, client_proof: &[u8]) -> Result<(), Error>;

    /// The accessory's proof `M2`, computed from `A`, `M1`, and `K`. Only valid after a
    /// successful [`Self::verify_client_proof`].
    fn server_proof(&self) -> &[u8];

    /// The negotiated session key `K` (64 bytes for SHA-512-based SRP-6a).
    fn session_key(&self) -> &[u8];
}

pub trait Crypto: Send + Sync {
    fn sha512(&self, data: &[u8]) -> [u8; 64];

    /// HKDF-SHA-512 with the given salt, info, and desired output length.
    fn hkdf_sha512(&self, ikm: &[u8], salt: &[u8], info: &[u8], out_len: usize) -> Vec<u8>;

    /// Starts a new SRP-6a/3072/SHA-512 verifier session for `username`/`password` (the setup
    /// code), generating a random salt and the accessory's ephemeral keypair.
    fn srp_new_verifier(&self, username: &str, password: &str) -> Box<dyn SrpSession>;

    fn ed25519_generate_keypair(&self) -> ([u8; ED25519_PUBLIC_KEY_LEN], [u8; ED25519_SECRET_KEY_LEN]);
    fn ed25519_sign(&self, secret_key: &[u8; ED25519_SECRET_KEY_LEN], message: &[u8]) -> [u8; ED25519_SIGNATURE_LEN];
    fn ed25519_verify(
        &self,
        public_key: &[u8; ED25519_PUBLIC_KEY_LEN],
        message: &[u8],
        signature: &[u8; ED25519_SIGNATURE_LEN],
    ) -> bool;

    fn x25519_generate_keypair(&self) -> ([u8; X25519_PUBLIC_KEY_LEN], [u8; X25519_SECRET_KEY_LEN]);
    fn x25519_shared_secret(
        &self,
        our_secret: &[u8; X25519_SECRET_KEY_LEN],
        their_public: &[u8; X25519_PUBLIC_KEY_LEN],
    ) -> [u8; 32];

    /// Encrypts `plaintext` in place, appending the 16-byte tag, using the given 96-bit nonce.
    fn chacha20_poly1305_encrypt(&self, key: &[u8; 32], nonce: &[u8; 12], aad: &[u8], plaintext: &[u8]) -> Vec<u8>;

    /// Decrypts and verifies `ciphertext` (which includes the trailing 16-byte tag). Returns
    /// `Err(Error::CryptoVerificationFailed)` on tag mismatch.
    fn chacha20_poly1305_decrypt(
        &self,
        key: &[u8; 32],
        nonce: &[u8; 12],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, Error>;

    fn random_bytes(&self, out: &mut [u8]);
}

/// Builds the 96-bit nonce `[0,0,0,0] ‖ counter_le_u64` shared by every AEAD use in this stack
/// (§4.5, §9).
pub fn counter_nonce(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Builds the fixed 12-byte ASCII nonces used by the Pair Setup / Pair Verify sub-TLV encryption
/// steps (§4.3, §4.4, §8 scenario 5): `\0\0\0\0` followed by the 8-character message tag.
pub fn fixed_nonce(tag: &[u8; 8]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(tag);
    nonce
}

pub const NONCE_PS_MSG05: [u8; 8] = *b"PS-Msg05";
pub const NONCE_PS_MSG06: [u8; 8] = *b"PS-Msg06";
pub const NONCE_PV_MSG02: [u8; 8] = *b"PV-Msg02";
pub const NONCE_PV_MSG03: [u8; 8] = *b"PV-Msg03";

/// HKDF salt/info strings used throughout pairing and session key derivation. Lengths are fixed
/// by the source implementation and are load-bearing (§9): any reimplementation must match them
/// exactly, or interop with real controllers breaks.
pub mod hkdf_strings {
    pub const PAIR_SETUP_ENCRYPT_SALT: &[u8] = b"Pair-Setup-Encrypt-Salt";
    pub const PAIR_SETUP_ENCRYPT_INFO: &[u8] = b"Pair-Setup-Encrypt-Info";

    pub const PAIR_SETUP_CONTROLLER_SIGN_SALT: &[u8] = b"Pair-Setup-Controller-Sign-Salt";
    pub const PAIR_SETUP_CONTROLLER_SIGN_INFO: &[u8] = b"Pair-Setup-Controller-Sign-Info";

    pub const PAIR_SETUP_ACCESSORY_SIGN_SALT: &[u8] = b"Pair-Setup-Accessory-Sign-Salt";
    pub const PAIR_SETUP_ACCESSORY_SIGN_INFO: &[u8] = b"Pair-Setup-Accessory-Sign-Info";

    pub const PAIR_VERIFY_ENCRYPT_SALT: &[u8] = b"Pair-Verify-Encrypt-Salt";
    pub const PAIR_VERIFY_ENCRYPT_INFO: &[u8] = b"Pair-Verify-Encrypt-Info";

    pub const CONTROL_SALT: &[u8] = b"Control-Salt";
    pub const CONTROL_READ_ENCRYPTION_KEY: &[u8] = b"Control-Read-Encryption-Key";
    pub const CONTROL_WRITE_ENCRYPTION_KEY: &[u8] = b"Control-Write-Encryption-Key";

    pub const BROADCAST_ENCRYPTION_KEY: &[u8] = b"Broadcast-Encryption-Key";
}

/// A `Crypto` stub for tests that only exercise framing/counters, not real cryptography: AEAD
/// "encryption" is XOR with the key's first byte and a fixed-size tag of zeroes, which is enough
/// to prove round-tripping and tamper detection without pulling in a real cipher crate for tests.
#[cfg(test)]
pub mod tests_support {
    use super::*;

    pub struct NullCrypto;

    impl Crypto for NullCrypto {
        fn sha512(&self, data: &[u8]) -> [u8; 64] {
            let mut out = [0u8; 64];
            for (i, b) in data.iter().enumerate() {
                out[i % 64] ^= *b;
            }
            out
        }

        fn hkdf_sha512(&self, ikm: &[u8], salt: &[u8], info: &[u8], out_len: usize) -> Vec<u8> {
            let mut out = vec![0u8; out_len];
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = ikm.get(i % ikm.len().max(1)).copied().unwrap_or(0)
                    ^ salt.get(i % salt.len().max(1)).copied().unwrap_or(0)
                    ^ info.get(i % info.len().max(1)).copied().unwrap_or(0);
            }
            out
        }

        fn srp_new_verifier(&self, _username: &str, _password: &str) -> Box<dyn SrpSession> {
            unimplemented!("not exercised by framing tests")
        }

        fn ed25519_generate_keypair(&self) -> ([u8; ED25519_PUBLIC_KEY_LEN], [u8; ED25519_SECRET_KEY_LEN]) {
            ([0; 32], [0; 64])
        }

        fn ed25519_sign(&self, _secret_key: &[u8; ED25519_SECRET_KEY_LEN], _message: &[u8]) -> [u8; ED25519_SIGNATURE_LEN] {
            [0; 64]
        }

        fn ed25519_verify(
            &self,
            _public_key: &[u8; ED25519_PUBLIC_KEY_LEN],
            _message: &[u8],
            _signature: &[u8; ED25519_SIGNATURE_LEN],
        ) -> bool {
            true
        }

        fn x25519_generate_keypair(&self) -> ([u8; X25519_PUBLIC_KEY_LEN], [u8; X25519_SECRET_KEY_LEN]) {
            ([0; 32], [0; 32])
        }

        fn x25519_shared_secret(
            &self,
            _our_secret: &[u8; X25519_SECRET_KEY_LEN],
            _their_public: &[u8; X25519_PUBLIC_KEY_LEN],
        ) -> [u8; 32] {
            [0; 32]
        }

        fn chacha20_poly1305_encrypt(&self, key: &[u8; 32], _nonce: &[u8; 12], _aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
            let mut out: Vec<u8> = plaintext.iter().map(|b| b ^ key[0]).collect();
            out.extend_from_slice(&[0u8; AEAD_TAG_LEN]);
            out
        }

        fn chacha20_poly1305_decrypt(
            &self,
            key: &[u8; 32],
            _nonce: &[u8; 12],
            _aad: &[u8],
            ciphertext: &[u8],
        ) -> Result<Vec<u8>, Error> {
            if ciphertext.len() < AEAD_TAG_LEN {
                return Err(Error::Eof);
            }
            let (body, tag) = ciphertext.split_at(ciphertext.len() - AEAD_TAG_LEN);
            if tag != [0u8; AEAD_TAG_LEN] {
                return Err(Error::CryptoVerificationFailed);
            }
            Ok(body.iter().map(|b| b ^ key[0]).collect())
        }

        fn random_bytes(&self, out: &mut [u8]) {
            out.fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_nonces_match_scenario_5() {
        assert_eq!(
            fixed_nonce(&NONCE_PS_MSG05),
            [0, 0, 0, 0, b'P', b'S', b'-', b'M', b's', b'g', b'0', b'5']
        );
        assert_eq!(
            fixed_nonce(&NONCE_PS_MSG06),
            [0, 0, 0, 0, b'P', b'S', b'-', b'M', b's', b'g', b'0', b'6']
        );
        assert_eq!(
            fixed_nonce(&NONCE_PV_MSG02),
            [0, 0, 0, 0, b'P', b'V', b'-', b'M', b's', b'g', b'0', b'2']
        );
    }

    #[test]
    fn counter_nonce_is_le_in_last_8_bytes() {
        assert_eq!(counter_nonce(1)[4..], 1u64.to_le_bytes());
        assert_eq!(counter_nonce(0), [0u8; 12]);
    }

    #[test]
    fn hkdf_string_lengths_match_source_of_truth() {
        use hkdf_strings::*;
        assert_eq!(CONTROL_SALT.len(), 12);
        assert_eq!(CONTROL_READ_ENCRYPTION_KEY.len(), 27);
        assert_eq!(CONTROL_WRITE_ENCRYPTION_KEY.len(), 28);
        assert_eq!(PAIR_SETUP_CONTROLLER_SIGN_SALT.len(), 31);
        assert_eq!(PAIR_SETUP_CONTROLLER_SIGN_INFO.len(), 31);
        assert_eq!(PAIR_SETUP_ACCESSORY_SIGN_SALT.len(), 30);
        assert_eq!(PAIR_SETUP_ACCESSORY_SIGN_INFO.len(), 30);
    }
}
