//! TLV type/error/method/state constants for the pairing TLV bodies (§6, §4.3, §4.4).

/// TLV item types carried in `application/pairing+tlv8` bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TlvType {
    Method = 0,
    Identifier = 1,
    Salt = 2,
    PublicKey = 3,
    Proof = 4,
    EncryptedData = 5,
    State = 6,
    Error = 7,
    RetryDelay = 8,
    Certificate = 9,
    Signature = 10,
    Permissions = 11,
    FragmentData = 12,
    FragmentLast = 13,
    Separator = 255,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TlvError {
    Unknown = 1,
    Authentication = 2,
    Backoff = 3,
    MaxPeers = 4,
    MaxTries = 5,
    Unavailable = 6,
    Busy = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PairingMethod {
    PairSetup = 0,
    PairSetupWithAuth = 1,
    PairVerify = 2,
    AddPairing = 3,
    RemovePairing = 4,
    ListPairings = 5,
}

impl TryFrom<u8> for PairingMethod {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        Ok(match value {
            0 => PairingMethod::PairSetup,
            1 => PairingMethod::PairSetupWithAuth,
            2 => PairingMethod::PairVerify,
            3 => PairingMethod::AddPairing,
            4 => PairingMethod::RemovePairing,
            5 => PairingMethod::ListPairings,
            _ => return Err(()),
        })
    }
}

/// The `State` TLV value, `M1`..`M6`, shared by both Pair Setup and Pair Verify (Verify only uses
/// M1..M4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PairingState {
    M1 = 1,
    M2 = 2,
    M3 = 3,
    M4 = 4,
    M5 = 5,
    M6 = 6,
}

/// Builds `{State=state, Error=error}`, the canonical failure response for the pairing state
/// machines.
pub fn error_response(state: PairingState, error: TlvError) -> crate::tlv::TlvList {
    crate::tlv::TlvList(vec![
        crate::tlv::Tlv::u8(TlvType::State as u8, state as u8),
        crate::tlv::Tlv::u8(TlvType::Error as u8, error as u8),
    ])
}
