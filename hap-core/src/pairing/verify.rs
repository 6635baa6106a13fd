//! Pair Verify: the 4-message Station-to-Station handshake over X25519 that derives per-session
//! transport keys (§4.4).

use crate::pairing::crypto::{
    fixed_nonce, hkdf_strings, Crypto, X25519_PUBLIC_KEY_LEN, X25519_SECRET_KEY_LEN, NONCE_PV_MSG02,
    NONCE_PV_MSG03,
};
use crate::pairing::setup::accessory_identifier;
use crate::pairing::store::PairingStore;
use crate::pairing::tlv_types::{error_response, PairingState, TlvError, TlvType};
use crate::storage::Storage;
use crate::tlv::{Tlv, TlvList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingM1,
    AwaitingM3,
    Verified,
}

pub struct SessionKeys {
    /// Accessory → controller.
    pub a2c: [u8; 32],
    /// Controller → accessory.
    pub c2a: [u8; 32],
    /// The raw X25519 shared secret, carried into the established session so a later
    /// `ProtocolConfiguration` BLE request can derive the broadcast encryption key from it (§4.7).
    pub shared_secret: [u8; 32],
    /// The controller's long-term Ed25519 public key, used as the HKDF salt for that same
    /// derivation.
    pub controller_ltpk: [u8; 32],
}

pub struct PairVerify<'a> {
    crypto: &'a dyn Crypto,
    storage: &'a dyn Storage,
    state: State,
    accessory_curve_public: [u8; X25519_PUBLIC_KEY_LEN],
    accessory_curve_secret: [u8; X25519_SECRET_KEY_LEN],
    client_curve_public: [u8; X25519_PUBLIC_KEY_LEN],
    shared_secret: [u8; 32],
    controller_id: String,
    controller_ltpk: [u8; 32],
}

impl<'a> PairVerify<'a> {
    pub fn new(crypto: &'a dyn Crypto, storage: &'a dyn Storage) -> Self {
        PairVerify {
            crypto,
            storage,
            state: State::AwaitingM1,
            accessory_curve_public: [0; 32],
            accessory_curve_secret: [0; 32],
            client_curve_public: [0; 32],
            shared_secret: [0; 32],
            controller_id: String::new(),
            controller_ltpk: [0; 32],
        }
    }

    pub fn reset(&mut self) {
        self.state = State::AwaitingM1;
    }

    pub fn is_verified(&self) -> bool {
        self.state == State::Verified
    }

    pub fn controller_id(&self) -> &str {
        &self.controller_id
    }

    /// Only meaningful once [`Self::is_verified`] returns true.
    pub fn session_keys(&self) -> SessionKeys {
        let a2c_vec = self.crypto.hkdf_sha512(
            &self.shared_secret,
            hkdf_strings::CONTROL_SALT,
            hkdf_strings::CONTROL_READ_ENCRYPTION_KEY,
            32,
        );
        let c2a_vec = self.crypto.hkdf_sha512(
            &self.shared_secret,
            hkdf_strings::CONTROL_SALT,
            hkdf_strings::CONTROL_WRITE_ENCRYPTION_KEY,
            32,
        );
        let mut a2c = [0u8; 32];
        let mut c2a = [0u8; 32];
        a2c.copy_from_slice(&a2c_vec);
        c2a.copy_from_slice(&c2a_vec);
        SessionKeys {
            a2c,
            c2a,
            shared_secret: self.shared_secret,
            controller_ltpk: self.controller_ltpk,
        }
    }

    pub fn handle_request(&mut self, body: &[u8]) -> Vec<u8> {
        let request = TlvList::parse(body);
        let state = request.find_u8(TlvType::State as u8);

        // Dispatch on the client's requested State TLV, not on our own current state: each handler
        // below independently checks that its expected internal state holds and replies with its
        // own fixed response state on mismatch.
        let result = match state {
            Some(1) => self.handle_m1(&request),
            Some(3) => self.handle_m3(&request),
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

    fn handle_m1(&mut self, request: &TlvList) -> Result<TlvList, (PairingState, TlvError)> {
        if self.state != State::AwaitingM1 {
            return Err((PairingState::M2, TlvError::Unknown));
        }

        let client_public = request
            .find_bytes(TlvType::PublicKey as u8)
            .ok_or((PairingState::M2, TlvError::Unknown))?;
        self.client_curve_public = client_public
            .try_into()
            .map_err(|_| (PairingState::M2, TlvError::Unknown))?;

        let (pk, sk) = self.crypto.x25519_generate_keypair();
        self.accessory_curve_public = pk;
        self.accessory_curve_secret = sk;
        self.shared_secret = self
            .crypto
            .x25519_shared_secret(&self.accessory_curve_secret, &self.client_curve_public);

        let p_session_key_vec = self.crypto.hkdf_sha512(
            &self.shared_secret,
            hkdf_strings::PAIR_VERIFY_ENCRYPT_SALT,
            hkdf_strings::PAIR_VERIFY_ENCRYPT_INFO,
            32,
        );
        let mut p_session_key = [0u8; 32];
        p_session_key.copy_from_slice(&p_session_key_vec);

        let accessory_id =
            accessory_identifier(self.storage).map_err(|_| (PairingState::M2, TlvError::Unknown))?;
        let (_, accessory_ltsk) = crate::pairing::store::PairingStore::ensure_long_term_keys(self.storage, self.crypto)
            .map_err(|_| (PairingState::M2, TlvError::Unknown))?;

        let mut info = Vec::new();
        info.extend_from_slice(&self.accessory_curve_public);
        info.extend_from_slice(accessory_id.as_bytes());
        info.extend_from_slice(&self.client_curve_public);
        let signature = self.crypto.ed25519_sign(&accessory_ltsk, &info);

        let mut sub_tlv = TlvList::new();
        sub_tlv.push(Tlv::new(TlvType::Identifier as u8, accessory_id.into_bytes()));
        sub_tlv.push(Tlv::new(TlvType::Signature as u8, signature.to_vec()));

        let encrypted =
            self.crypto
                .chacha20_poly1305_encrypt(&p_session_key, &fixed_nonce(&NONCE_PV_MSG02), &[], &sub_tlv.encode());

        self.state = State::AwaitingM3;

        Ok(TlvList(vec![
            Tlv::u8(TlvType::State as u8, PairingState::M2 as u8),
            Tlv::new(TlvType::PublicKey as u8, self.accessory_curve_public.to_vec()),
            Tlv::new(TlvType::EncryptedData as u8, encrypted),
        ]))
    }

    fn handle_m3(&mut self, request: &TlvList) -> Result<TlvList, (PairingState, TlvError)> {
        if self.state != State::AwaitingM3 {
            return Err((PairingState::M4, TlvError::Unknown));
        }

        let encrypted = request
            .find_bytes(TlvType::EncryptedData as u8)
            .ok_or((PairingState::M4, TlvError::Unknown))?;

        let p_session_key_vec = self.crypto.hkdf_sha512(
            &self.shared_secret,
            hkdf_strings::PAIR_VERIFY_ENCRYPT_SALT,
            hkdf_strings::PAIR_VERIFY_ENCRYPT_INFO,
            32,
        );
        let mut p_session_key = [0u8; 32];
        p_session_key.copy_from_slice(&p_session_key_vec);

        let plaintext = self
            .crypto
            .chacha20_poly1305_decrypt(&p_session_key, &fixed_nonce(&NONCE_PV_MSG03), &[], encrypted)
            .map_err(|_| (PairingState::M4, TlvError::Authentication))?;

        let sub_tlv = TlvList::parse(&plaintext);
        let controller_id = sub_tlv
            .find_string(TlvType::Identifier as u8)
            .ok_or((PairingState::M4, TlvError::Unknown))?
            .to_string();
        let signature_slice = sub_tlv
            .find_bytes(TlvType::Signature as u8)
            .ok_or((PairingState::M4, TlvError::Unknown))?;
        let signature: [u8; 64] = signature_slice
            .try_into()
            .map_err(|_| (PairingState::M4, TlvError::Unknown))?;

        let pairing = PairingStore::find_pairing(self.storage, &controller_id)
            .map_err(|_| (PairingState::M4, TlvError::Unknown))?
            .ok_or((PairingState::M4, TlvError::Authentication))?;

        let mut info = Vec::new();
        info.extend_from_slice(&self.client_curve_public);
        info.extend_from_slice(controller_id.as_bytes());
        info.extend_from_slice(&self.accessory_curve_public);

        if !self.crypto.ed25519_verify(&pairing.ltpk, &info, &signature) {
            return Err((PairingState::M4, TlvError::Authentication));
        }

        self.controller_id = controller_id;
        self.controller_ltpk = pairing.ltpk;
        self.state = State::Verified;

        Ok(TlvList(vec![Tlv::u8(TlvType::State as u8, PairingState::M4 as u8)]))
    }
}
