//! Pair Setup: the 6-message SRP-6a/3072/SHA-512 enrollment handshake (§4.3).

use crate::pairing::crypto::{
    fixed_nonce, hkdf_strings, Crypto, SrpSession, ED25519_PUBLIC_KEY_LEN, ED25519_SECRET_KEY_LEN,
    NONCE_PS_MSG05, NONCE_PS_MSG06,
};
use crate::pairing::store::{Pairing, PairingStore};
use crate::pairing::tlv_types::{error_response, PairingState, TlvError, TlvType};
use crate::storage::Storage;
use crate::tlv::{Tlv, TlvList};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingM1,
    AwaitingM3,
    AwaitingM5,
    Completed,
}

/// A single Pair Setup attempt. One instance is created per connection on receipt of M1 and
/// discarded once the procedure finishes (successfully or not); it holds no long-term keys beyond
/// what it fetches from `Storage` lazily.
pub struct PairSetup<'a> {
    crypto: &'a dyn Crypto,
    storage: &'a dyn Storage,
    setup_code: String,
    on_pairings_changed: Option<Box<dyn Fn() + 'a>>,
    state: State,
    srp: Option<Box<dyn SrpSession>>,
    session_key: Vec<u8>,
}

const SRP_USERNAME: &str = "Pair-Setup";

impl<'a> PairSetup<'a> {
    pub fn new(crypto: &'a dyn Crypto, storage: &'a dyn Storage, setup_code: impl Into<String>) -> Self {
        PairSetup {
            crypto,
            storage,
            setup_code: setup_code.into(),
            on_pairings_changed: None,
            state: State::AwaitingM1,
            srp: None,
            session_key: Vec::new(),
        }
    }

    pub fn on_pairings_changed(mut self, f: impl Fn() + 'a) -> Self {
        self.on_pairings_changed = Some(Box::new(f));
        self
    }

    pub fn reset(&mut self) {
        self.state = State::AwaitingM1;
        self.srp = None;
        self.session_key.clear();
    }

    /// Feeds one request TLV body through the state machine, returning the response body to send
    /// back (always `Some`; Pair Setup never silently drops a well-formed request).
    pub fn handle_request(&mut self, body: &[u8]) -> Vec<u8> {
        let request = TlvList::parse(body);
        let state = request.find_u8(TlvType::State as u8);

        // Dispatch on the client's requested State TLV, not on our own current state: each handler
        // below independently checks that its expected internal state holds and replies with its
        // own fixed response state on mismatch. A missing or unrecognized State TLV always gets
        // M2, regardless of internal state.
        let result = match state {
            Some(1) => self.handle_m1(),
            Some(3) => self.handle_m3(&request),
            Some(5) => self.handle_m5(&request),
            _ => Err((PairingState::M2, TlvError::Unknown)),
        };

        match result {
            Ok(list) => list.encode(),
            Err((state, error)) => {
                self.reset();
                error_response(state, error).encode()
            }
        }
    }

    fn handle_m1(&mut self) -> Result<TlvList, (PairingState, TlvError)> {
        if self.state != State::AwaitingM1 {
            return Err((PairingState::M2, TlvError::Unknown));
        }

        let srp = self.crypto.srp_new_verifier(SRP_USERNAME, &self.setup_code);
        let salt = *srp.salt();
        let public_key = srp.public_key().to_vec();
        self.srp = Some(srp);
        self.state = State::AwaitingM3;

        Ok(TlvList(vec![
            Tlv::u8(TlvType::State as u8, PairingState::M2 as u8),
            Tlv::new(TlvType::Salt as u8, salt.to_vec()),
            Tlv::new(TlvType::PublicKey as u8, public_key),
        ]))
    }

    fn handle_m3(&mut self, request: &TlvList) -> Result<TlvList, (PairingState, TlvError)> {
        if self.state != State::AwaitingM3 {
            return Err((PairingState::M4, TlvError::Unknown));
        }

        let client_public_key = request
            .find_bytes(TlvType::PublicKey as u8)
            .ok_or((PairingState::M4, TlvError::Unknown))?;
        let client_proof = request
            .find_bytes(TlvType::Proof as u8)
            .ok_or((PairingState::M4, TlvError::Unknown))?;

        let srp = self.srp.as_mut().ok_or((PairingState::M4, TlvError::Unknown))?;
        srp.set_client_public_key(client_public_key)
            .map_err(|_| (PairingState::M4, TlvError::Authentication))?;
        srp.verify_client_proof(client_proof)
            .map_err(|_| (PairingState::M4, TlvError::Authentication))?;

        self.session_key = srp.session_key().to_vec();
        let server_proof = srp.server_proof().to_vec();
        self.state = State::AwaitingM5;

        Ok(TlvList(vec![
            Tlv::u8(TlvType::State as u8, PairingState::M4 as u8),
            Tlv::new(TlvType::Proof as u8, server_proof),
        ]))
    }

    fn handle_m5(&mut self, request: &TlvList) -> Result<TlvList, (PairingState, TlvError)> {
        if self.state != State::AwaitingM5 {
            return Err((PairingState::M6, TlvError::Unknown));
        }

        let encrypted = request
            .find_bytes(TlvType::EncryptedData as u8)
            .ok_or((PairingState::M6, TlvError::Unknown))?;

        let encrypt_key_bytes = self.crypto.hkdf_sha512(
            &self.session_key,
            hkdf_strings::PAIR_SETUP_ENCRYPT_SALT,
            hkdf_strings::PAIR_SETUP_ENCRYPT_INFO,
            32,
        );
        let mut encrypt_key = [0u8; 32];
        encrypt_key.copy_from_slice(&encrypt_key_bytes);

        let plaintext = self
            .crypto
            .chacha20_poly1305_decrypt(&encrypt_key, &fixed_nonce(&NONCE_PS_MSG05), &[], encrypted)
            .map_err(|_| (PairingState::M6, TlvError::Authentication))?;

        let sub_tlv = TlvList::parse(&plaintext);
        let controller_id = sub_tlv
            .find_string(TlvType::Identifier as u8)
            .ok_or((PairingState::M6, TlvError::Unknown))?
            .to_string();
        let controller_ltpk_slice = sub_tlv
            .find_bytes(TlvType::PublicKey as u8)
            .ok_or((PairingState::M6, TlvError::Unknown))?;
        let controller_signature_slice = sub_tlv
            .find_bytes(TlvType::Signature as u8)
            .ok_or((PairingState::M6, TlvError::Unknown))?;

        let controller_ltpk: [u8; ED25519_PUBLIC_KEY_LEN] = controller_ltpk_slice
            .try_into()
            .map_err(|_| (PairingState::M6, TlvError::Unknown))?;
        let controller_signature: [u8; 64] = controller_signature_slice
            .try_into()
            .map_err(|_| (PairingState::M6, TlvError::Unknown))?;

        let controller_sign_salt = self.crypto.hkdf_sha512(
            &self.session_key,
            hkdf_strings::PAIR_SETUP_CONTROLLER_SIGN_SALT,
            hkdf_strings::PAIR_SETUP_CONTROLLER_SIGN_INFO,
            32,
        );
        let mut device_info = controller_sign_salt;
        device_info.extend_from_slice(controller_id.as_bytes());
        device_info.extend_from_slice(&controller_ltpk);

        if !self
            .crypto
            .ed25519_verify(&controller_ltpk, &device_info, &controller_signature)
        {
            return Err((PairingState::M6, TlvError::Authentication));
        }

        PairingStore::add_pairing(
            self.storage,
            &Pairing {
                controller_id,
                ltpk: controller_ltpk,
                admin: true,
            },
        )
        .map_err(|_| (PairingState::M6, TlvError::Unknown))?;
        if let Some(cb) = &self.on_pairings_changed {
            cb();
        }

        let (accessory_ltpk, accessory_ltsk) =
            PairingStore::ensure_long_term_keys(self.storage, self.crypto)
                .map_err(|_| (PairingState::M6, TlvError::Unknown))?;
        let accessory_id = accessory_identifier(self.storage).map_err(|_| (PairingState::M6, TlvError::Unknown))?;

        let accessory_sign_salt = self.crypto.hkdf_sha512(
            &self.session_key,
            hkdf_strings::PAIR_SETUP_ACCESSORY_SIGN_SALT,
            hkdf_strings::PAIR_SETUP_ACCESSORY_SIGN_INFO,
            32,
        );
        let mut accessory_info = accessory_sign_salt;
        accessory_info.extend_from_slice(accessory_id.as_bytes());
        accessory_info.extend_from_slice(&accessory_ltpk);

        let accessory_secret: [u8; ED25519_SECRET_KEY_LEN] = accessory_ltsk;
        let signature = self.crypto.ed25519_sign(&accessory_secret, &accessory_info);

        let mut response_sub_tlv = TlvList::new();
        response_sub_tlv.push(Tlv::new(TlvType::Identifier as u8, accessory_id.into_bytes()));
        response_sub_tlv.push(Tlv::new(TlvType::PublicKey as u8, accessory_ltpk.to_vec()));
        response_sub_tlv.push(Tlv::new(TlvType::Signature as u8, signature.to_vec()));

        let encrypted_response = self.crypto.chacha20_poly1305_encrypt(
            &encrypt_key,
            &fixed_nonce(&NONCE_PS_MSG06),
            &[],
            &response_sub_tlv.encode(),
        );

        self.state = State::Completed;

        Ok(TlvList(vec![
            Tlv::u8(TlvType::State as u8, PairingState::M6 as u8),
            Tlv::new(TlvType::EncryptedData as u8, encrypted_response),
        ]))
    }
}

/// The accessory's pairing identifier, persisted as its own storage key so it's stable across
/// restarts (the stack's `accessory-id` configuration value, see §6).
pub fn accessory_identifier(storage: &dyn Storage) -> Result<String, Error> {
    match storage.get("accessory_id")? {
        Some(bytes) => String::from_utf8(bytes).map_err(|_| Error::Storage("accessory_id not utf8".into())),
        None => Err(Error::Storage("accessory_id not configured".into())),
    }
}
