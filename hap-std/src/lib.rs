//! Concrete platform bindings for `hap-core`: file-backed storage, real cryptography, a wall clock,
//! and a TCP + mDNS network collaborator. Wire these into `hap_core::server::Server` to run an
//! accessory on a normal host.

pub mod ble;
pub mod crypto;
pub mod network;
pub mod storage;
pub mod system;

pub use ble::NoopBle;
pub use crypto::StdCrypto;
pub use network::TcpNetwork;
pub use storage::FileStorage;
pub use system::StdSystem;
