//! AEAD framing for an established secure session: IP length-prefixed frames and BLE PDU framing
//! share ChaCha20-Poly1305 with per-direction 64-bit nonce counters (§4.5).

use crate::pairing::crypto::{counter_nonce, hkdf_strings, Crypto};
use crate::Error;

const MAX_IP_FRAGMENT: usize = 1024;

pub struct SecureSession<'a> {
    crypto: &'a dyn Crypto,
    a2c_key: [u8; 32],
    c2a_key: [u8; 32],
    write_counter: u64,
    read_counter: u64,
    /// Carried from Pair Verify purely so a later BLE `ProtocolConfiguration` request on this same
    /// connection can derive the broadcast encryption key without re-running the handshake (§4.7).
    shared_secret: [u8; 32],
    controller_ltpk: [u8; 32],
}

impl<'a> SecureSession<'a> {
    pub fn new(crypto: &'a dyn Crypto, a2c_key: [u8; 32], c2a_key: [u8; 32]) -> Self {
        SecureSession {
            crypto,
            a2c_key,
            c2a_key,
            write_counter: 0,
            read_counter: 0,
            shared_secret: [0; 32],
            controller_ltpk: [0; 32],
        }
    }

    /// Attaches the Pair Verify shared secret and controller LTPK this session was established
    /// with, enabling [`Self::derive_broadcast_key`].
    pub fn with_broadcast_material(mut self, shared_secret: [u8; 32], controller_ltpk: [u8; 32]) -> Self {
        self.shared_secret = shared_secret;
        self.controller_ltpk = controller_ltpk;
        self
    }

    /// Derives `BroadcastEncryptionKey = HKDF-SHA-512(shared-secret, salt=controller-LTPK,
    /// info="Broadcast-Encryption-Key", 32)` for a `ProtocolConfiguration` `GenerateKey` request
    /// (§4.7).
    pub fn derive_broadcast_key(&self) -> [u8; 32] {
        let key_vec = self.crypto.hkdf_sha512(
            &self.shared_secret,
            &self.controller_ltpk,
            hkdf_strings::BROADCAST_ENCRYPTION_KEY,
            32,
        );
        let mut key = [0u8; 32];
        key.copy_from_slice(&key_vec);
        key
    }

    pub fn reset(&mut self) {
        self.write_counter = 0;
        self.read_counter = 0;
    }

    /// Encrypts `plaintext` (an arbitrary-length response body) into one or more IP frames, each
    /// `u16_le(len) ‖ ciphertext ‖ tag16`, using the 2-byte length as AEAD AAD so it can't be
    /// silently mangled.
    pub fn encrypt_ip_frames(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in plaintext.chunks(MAX_IP_FRAGMENT).chain(std::iter::empty()) {
            let len = chunk.len() as u16;
            let aad = len.to_le_bytes();
            let nonce = counter_nonce(self.write_counter);
            self.write_counter += 1;
            let sealed = self.crypto.chacha20_poly1305_encrypt(&self.a2c_key, &nonce, &aad, chunk);
            out.extend_from_slice(&aad);
            out.extend_from_slice(&sealed);
        }
        if plaintext.is_empty() {
            let aad = 0u16.to_le_bytes();
            let nonce = counter_nonce(self.write_counter);
            self.write_counter += 1;
            let sealed = self.crypto.chacha20_poly1305_encrypt(&self.a2c_key, &nonce, &aad, &[]);
            out.extend_from_slice(&aad);
            out.extend_from_slice(&sealed);
        }
        out
    }

    /// Decrypts exactly one IP frame's ciphertext+tag (the caller's receive buffer already peeled
    /// off the 2-byte length and waited for `2+len+16` bytes, per §4.5). On auth failure the
    /// caller must tear down the connection; this does not reset the counter.
    pub fn decrypt_ip_frame(&mut self, len: u16, ciphertext_and_tag: &[u8]) -> Result<Vec<u8>, Error> {
        let aad = len.to_le_bytes();
        let nonce = counter_nonce(self.read_counter);
        self.read_counter += 1;
        self.crypto
            .chacha20_poly1305_decrypt(&self.c2a_key, &nonce, &aad, ciphertext_and_tag)
    }

    /// Encrypts a full BLE PDU (starting at the control byte). No length prefix, no AAD.
    pub fn encrypt_ble_pdu(&mut self, pdu: &[u8]) -> Vec<u8> {
        let nonce = counter_nonce(self.write_counter);
        self.write_counter += 1;
        self.crypto.chacha20_poly1305_encrypt(&self.a2c_key, &nonce, &[], pdu)
    }

    pub fn decrypt_ble_pdu(&mut self, ciphertext_and_tag: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = counter_nonce(self.read_counter);
        self.read_counter += 1;
        self.crypto
            .chacha20_poly1305_decrypt(&self.c2a_key, &nonce, &[], ciphertext_and_tag)
    }

    pub fn write_counter(&self) -> u64 {
        self.write_counter
    }

    pub fn read_counter(&self) -> u64 {
        self.read_counter
    }
}

/// Incrementally buffers inbound IP bytes and yields complete `(len, ciphertext_and_tag)` frames
/// as they become available, per the "peek length, wait for `2+len+16`" rule in §4.5.
#[derive(Default)]
pub struct IpFrameReassembler {
    buf: Vec<u8>,
}

impl IpFrameReassembler {
    pub fn new() -> Self {
        IpFrameReassembler::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next complete frame, if the buffer holds enough bytes.
    pub fn pop_frame(&mut self) -> Option<(u16, Vec<u8>)> {
        if self.buf.len() < 2 {
            return None;
        }
        let len = u16::from_le_bytes([self.buf[0], self.buf[1]]);
        let total = 2 + len as usize + 16;
        if self.buf.len() < total {
            return None;
        }
        let frame = self.buf[2..total].to_vec();
        self.buf.drain(..total);
        Some((len, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::crypto::tests_support::NullCrypto;

    #[test]
    fn nonce_counters_start_at_zero_and_increment_monotonically() {
        let crypto = NullCrypto;
        let mut session = SecureSession::new(&crypto, [0; 32], [0; 32]);
        assert_eq!(session.write_counter(), 0);
        session.encrypt_ip_frames(b"a");
        assert_eq!(session.write_counter(), 1);
        session.encrypt_ip_frames(b"b");
        assert_eq!(session.write_counter(), 2);
    }

    #[test]
    fn ip_reassembler_waits_for_full_frame() {
        let mut reassembler = IpFrameReassembler::new();
        reassembler.feed(&[3, 0]);
        assert!(reassembler.pop_frame().is_none());
        reassembler.feed(&[1, 2, 3]);
        reassembler.feed(&[0u8; 16]);
        let (len, frame) = reassembler.pop_frame().unwrap();
        assert_eq!(len, 3);
        assert_eq!(frame.len(), 3 + 16);
    }
}
