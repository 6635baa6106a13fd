//! The configuration surface a host must supply to stand up an accessory (§6).

/// Accessory category, carried in the mDNS `ci` field and the BLE advertisement's ACID (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category(pub u16);

impl Category {
    pub const OTHER: Category = Category(1);
    pub const BRIDGE: Category = Category(2);
    pub const LIGHTBULB: Category = Category(5);
    pub const SWITCH: Category = Category(8);
    pub const SENSOR: Category = Category(10);
    pub const LOCK: Category = Category(6);
    pub const THERMOSTAT: Category = Category(9);
}

/// BLE-specific advertising/connection parameters.
#[derive(Debug, Clone, Copy)]
pub struct BleParams {
    pub fast_advertising_interval_ms: u16,
    pub slow_advertising_interval_ms: u16,
    pub fast_advertising_duration_ms: u32,
}

impl Default for BleParams {
    fn default() -> Self {
        BleParams {
            fast_advertising_interval_ms: 20,
            slow_advertising_interval_ms: 1000,
            fast_advertising_duration_ms: 3000,
        }
    }
}

/// The transport this accessory exposes; the core supports configuring either or both.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    Ip { port: u16 },
    Ble(BleParams),
    Both { port: u16, ble: BleParams },
}

/// An application callback fired on `/identify` or the BLE identify routine, before pairing.
pub type IdentifyCallback = Box<dyn Fn() + Send + Sync>;

/// Everything needed to bring up an accessory: identity, setup code, and transport parameters.
pub struct AccessoryConfig {
    /// 6-byte accessory identifier, rendered as `XX:XX:XX:XX:XX:XX` in mDNS and the BLE
    /// advertisement's `DeviceID` field (§4.9, §4.7).
    pub accessory_id: [u8; 6],
    /// Setup code in `NNN-NN-NNN` form, used as the SRP password during Pair Setup.
    pub setup_code: String,
    /// 4-character setup ID used in the `SetupHash` advertisement field (§4.7).
    pub setup_id: [u8; 4],
    pub device_name: String,
    pub model: String,
    pub category: Category,
    pub transport: TransportConfig,
    pub identify: Option<IdentifyCallback>,
}

impl AccessoryConfig {
    pub fn accessory_id_string(&self) -> String {
        self.accessory_id
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl std::fmt::Debug for AccessoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessoryConfig")
            .field("accessory_id", &self.accessory_id_string())
            .field("device_name", &self.device_name)
            .field("model", &self.model)
            .field("category", &self.category)
            .field("transport", &self.transport)
            .field("identify", &self.identify.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_accessory_id_as_mac() {
        let config = AccessoryConfig {
            accessory_id: [0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
            setup_code: "123-45-678".into(),
            setup_id: *b"ABCD",
            device_name: "Lamp".into(),
            model: "Lamp1,1".into(),
            category: Category::LIGHTBULB,
            transport: TransportConfig::Ip { port: 51826 },
            identify: None,
        };
        assert_eq!(config.accessory_id_string(), "11:22:33:44:55:66");
    }
}
