//! Pair Setup, Pair Verify, and the persisted pairing store (§4.3, §4.4, §3).

pub mod crypto;
pub mod setup;
pub mod store;
pub mod tlv_types;
pub mod verify;

pub use setup::PairSetup;
pub use store::{Pairing, PairingStore};
pub use verify::{PairVerify, SessionKeys};
