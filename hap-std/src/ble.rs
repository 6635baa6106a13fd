//! A no-op [`Ble`] collaborator.
//!
//! Wiring a real BlueZ GATT server and advertiser is a host-specific integration (BlueZ's D-Bus
//! API, or a raw HCI socket) well outside what a single demo binary should carry; this stub lets
//! `hap-std`-based accessories run the IP transport today while keeping the trait seam in place for
//! a real implementation later.
use hap_core::platform::Ble;
use hap_core::uuid::Uuid128;

#[derive(Default)]
pub struct NoopBle;

impl Ble for NoopBle {
    fn register_service(&self, _uuid: Uuid128, _characteristic_uuids: &[Uuid128]) {}

    fn notify(&self, _connection_id: u64, _characteristic_uuid: Uuid128, _value: &[u8]) {}

    fn disconnect(&self, _connection_id: u64) {}

    fn start_advertising(&self, _manufacturer_data: &[u8]) {}

    fn stop_advertising(&self) {}
}
