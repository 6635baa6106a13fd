//! The `System`, `Network`, and `Ble` platform contracts (§6). `Storage` and `Crypto` live in
//! their own modules ([`crate::storage`], [`crate::pairing::crypto`]) since they're large enough
//! to want their own grounding.

use crate::time::{Clock, Instant};

/// Monotonic clock and a cryptographically strong RNG. Logging is not modeled as a trait object
/// here — like the teacher crate, callers reach for the `log` crate's macros directly, gated by
/// the `log` feature.
pub trait System: Clock + Send + Sync {
    fn random_bytes(&self, out: &mut [u8]);

    fn now_ms(&self) -> Instant {
        self.now()
    }
}

/// A TCP-listener-and-mDNS-responder collaborator for the IP transport.
///
/// Registration is push-style: the host calls back into the core's router via the closures it's
/// given, rather than the core polling a socket itself, mirroring the `receive_cb`/`disconnect_cb`
/// pattern in the reference implementation's `tcp_listen`.
pub trait Network: Send + Sync {
    fn tcp_listen(
        &self,
        port: u16,
        on_connect: Box<dyn Fn(u64) + Send + Sync>,
        on_receive: Box<dyn Fn(u64, &[u8]) + Send + Sync>,
        on_disconnect: Box<dyn Fn(u64) + Send + Sync>,
    ) -> std::io::Result<()>;

    fn send(&self, connection_id: u64, bytes: &[u8]) -> std::io::Result<()>;
    fn disconnect(&self, connection_id: u64);

    fn mdns_register(&self, service_type: &str, port: u16, txt: &[(String, String)]);
    fn mdns_update_txt(&self, txt: &[(String, String)]);
}

/// A BLE GATT server and advertiser collaborator.
pub trait Ble: Send + Sync {
    fn register_service(&self, uuid: crate::uuid::Uuid128, characteristic_uuids: &[crate::uuid::Uuid128]);

    fn notify(&self, connection_id: u64, characteristic_uuid: crate::uuid::Uuid128, value: &[u8]);
    fn disconnect(&self, connection_id: u64);

    fn start_advertising(&self, manufacturer_data: &[u8]);
    fn stop_advertising(&self);
}
