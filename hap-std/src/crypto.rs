//! A [`Crypto`] implementation backed by real RustCrypto crates: SHA-512, HKDF-SHA-512,
//! SRP-6a/3072/SHA-512, Ed25519, X25519, and ChaCha20-Poly1305.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use hap_core::pairing::crypto::{
    Crypto, SrpSession, ED25519_PUBLIC_KEY_LEN, ED25519_SECRET_KEY_LEN, ED25519_SIGNATURE_LEN,
    X25519_PUBLIC_KEY_LEN, X25519_SECRET_KEY_LEN,
};
use hap_core::Error;
use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha512};
use srp::client::SrpClient;
use srp::groups::G_3072;
use srp::server::{SrpServer, SrpServerVerifier};
use x25519_dalek::{PublicKey, StaticSecret};

/// An SRP-6a/3072/SHA-512 verifier session, built on the `srp` crate's server half.
///
/// The verifier `v` is derived once with [`SrpClient::compute_verifier`] (the underlying math is
/// identical on both sides; the crate just happens to expose it from the client type), after which
/// only [`SrpServer`] is used.
pub struct StdSrpSession {
    salt: [u8; 16],
    b_secret: Vec<u8>,
    b_pub: Vec<u8>,
    verifier: Vec<u8>,
    verified: Option<SrpServerVerifier>,
    session_key: Vec<u8>,
}

impl SrpSession for StdSrpSession {
    fn salt(&self) -> &[u8; 16] {
        &self.salt
    }

    fn public_key(&self) -> &[u8] {
        &self.b_pub
    }

    fn set_client_public_key(&mut self, client_public_key: &[u8]) -> Result<(), Error> {
        let server = SrpServer::<Sha512>::new(&G_3072);
        let verifier = server
            .process_reply(&self.b_secret, &self.verifier, client_public_key)
            .map_err(|_| Error::CryptoVerificationFailed)?;
        self.session_key = verifier.key().to_vec();
        self.verified = Some(verifier);
        Ok(())
    }

    fn verify_client_proof(&mut self, client_proof: &[u8]) -> Result<(), Error> {
        let verifier = self.verified.as_ref().ok_or(Error::UnexpectedState)?;
        verifier
            .verify_client(client_proof)
            .map_err(|_| Error::CryptoVerificationFailed)
    }

    fn server_proof(&self) -> &[u8] {
        self.verified.as_ref().expect("proof requested before verification").proof()
    }

    fn session_key(&self) -> &[u8] {
        &self.session_key
    }
}

pub struct StdCrypto;

impl Crypto for StdCrypto {
    fn sha512(&self, data: &[u8]) -> [u8; 64] {
        let mut hasher = Sha512::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    fn hkdf_sha512(&self, ikm: &[u8], salt: &[u8], info: &[u8], out_len: usize) -> Vec<u8> {
        let hk = Hkdf::<Sha512>::new(Some(salt), ikm);
        let mut out = vec![0u8; out_len];
        hk.expand(info, &mut out).expect("HKDF output length is always within the RFC 5869 bound");
        out
    }

    fn srp_new_verifier(&self, username: &str, password: &str) -> Box<dyn SrpSession> {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);

        let client = SrpClient::<Sha512>::new(&G_3072);
        let verifier = client.compute_verifier(username.as_bytes(), password.as_bytes(), &salt);

        let mut b_secret = vec![0u8; 32];
        OsRng.fill_bytes(&mut b_secret);

        let server = SrpServer::<Sha512>::new(&G_3072);
        let b_pub = server.compute_public_ephemeral(&b_secret, &verifier);

        Box::new(StdSrpSession {
            salt,
            b_secret,
            b_pub,
            verifier,
            verified: None,
            session_key: Vec::new(),
        })
    }

    fn ed25519_generate_keypair(&self) -> ([u8; ED25519_PUBLIC_KEY_LEN], [u8; ED25519_SECRET_KEY_LEN]) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public = signing_key.verifying_key().to_bytes();
        let mut secret = [0u8; ED25519_SECRET_KEY_LEN];
        secret[..32].copy_from_slice(&signing_key.to_bytes());
        secret[32..].copy_from_slice(&public);
        (public, secret)
    }

    fn ed25519_sign(&self, secret_key: &[u8; ED25519_SECRET_KEY_LEN], message: &[u8]) -> [u8; ED25519_SIGNATURE_LEN] {
        let seed: [u8; 32] = secret_key[..32].try_into().expect("fixed-size slice");
        let signing_key = SigningKey::from_bytes(&seed);
        signing_key.sign(message).to_bytes()
    }

    fn ed25519_verify(
        &self,
        public_key: &[u8; ED25519_PUBLIC_KEY_LEN],
        message: &[u8],
        signature: &[u8; ED25519_SIGNATURE_LEN],
    ) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(signature);
        verifying_key.verify(message, &signature).is_ok()
    }

    fn x25519_generate_keypair(&self) -> ([u8; X25519_PUBLIC_KEY_LEN], [u8; X25519_SECRET_KEY_LEN]) {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        (public.to_bytes(), secret.to_bytes())
    }

    fn x25519_shared_secret(
        &self,
        our_secret: &[u8; X25519_SECRET_KEY_LEN],
        their_public: &[u8; X25519_PUBLIC_KEY_LEN],
    ) -> [u8; 32] {
        let secret = StaticSecret::from(*our_secret);
        let public = PublicKey::from(*their_public);
        secret.diffie_hellman(&public).to_bytes()
    }

    fn chacha20_poly1305_encrypt(&self, key: &[u8; 32], nonce: &[u8; 12], aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        cipher
            .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .expect("ChaCha20-Poly1305 encryption does not fail for HAP-sized frames")
    }

    fn chacha20_poly1305_decrypt(
        &self,
        key: &[u8; 32],
        nonce: &[u8; 12],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|_| Error::CryptoVerificationFailed)
    }

    fn random_bytes(&self, out: &mut [u8]) {
        OsRng.fill_bytes(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha512_matches_known_vector() {
        let crypto = StdCrypto;
        let digest = crypto.sha512(b"abc");
        assert_eq!(
            hex_encode(&digest),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39\
             a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49"
        );
    }

    #[test]
    fn hkdf_output_length_is_respected() {
        let crypto = StdCrypto;
        let out = crypto.hkdf_sha512(b"ikm", b"salt", b"info", 32);
        assert_eq!(out.len(), 32);
    }

    #[test]
    fn aead_round_trips() {
        let crypto = StdCrypto;
        let key = [7u8; 32];
        let nonce = [0u8; 12];
        let sealed = crypto.chacha20_poly1305_encrypt(&key, &nonce, b"aad", b"hello world");
        let opened = crypto.chacha20_poly1305_decrypt(&key, &nonce, b"aad", &sealed).unwrap();
        assert_eq!(opened, b"hello world");
    }

    #[test]
    fn aead_rejects_tampered_ciphertext() {
        let crypto = StdCrypto;
        let key = [7u8; 32];
        let nonce = [0u8; 12];
        let mut sealed = crypto.chacha20_poly1305_encrypt(&key, &nonce, b"aad", b"hello world");
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(crypto.chacha20_poly1305_decrypt(&key, &nonce, b"aad", &sealed).is_err());
    }

    #[test]
    fn x25519_shared_secret_matches_both_sides() {
        let crypto = StdCrypto;
        let (pub_a, sec_a) = crypto.x25519_generate_keypair();
        let (pub_b, sec_b) = crypto.x25519_generate_keypair();
        assert_eq!(
            crypto.x25519_shared_secret(&sec_a, &pub_b),
            crypto.x25519_shared_secret(&sec_b, &pub_a)
        );
    }

    #[test]
    fn ed25519_sign_and_verify_round_trips() {
        let crypto = StdCrypto;
        let (public, secret) = crypto.ed25519_generate_keypair();
        let signature = crypto.ed25519_sign(&secret, b"message");
        assert!(crypto.ed25519_verify(&public, b"message", &signature));
        assert!(!crypto.ed25519_verify(&public, b"tampered", &signature));
    }

    fn hex_encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
