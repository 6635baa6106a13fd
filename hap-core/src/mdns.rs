//! mDNS TXT record assembly for the `_hap._tcp` service (§4.9).

use crate::config::AccessoryConfig;

pub const SERVICE_TYPE: &str = "_hap._tcp";

/// Builds the TXT record key/value pairs for the current accessory and pairing state.
///
/// `config_number` and `state_number` are ASCII decimal per §6's persisted-format note; `paired`
/// drives the `sf` status-flags bit.
pub fn txt_records(config: &AccessoryConfig, config_number: u32, state_number: u16, paired: bool) -> Vec<(String, String)> {
    vec![
        ("c#".into(), config_number.to_string()),
        ("id".into(), config.accessory_id_string()),
        ("md".into(), config.model.clone()),
        ("pv".into(), "1.1".into()),
        ("s#".into(), state_number.to_string()),
        ("sf".into(), if paired { "0" } else { "1" }.into()),
        ("ci".into(), config.category.0.to_string()),
        ("ff".into(), "0".into()),
    ]
}

/// Tracks whether the record has been published yet, so a host only ever registers once and
/// updates TXT fields in place afterwards (§4.9 "On first publication, register...").
#[derive(Default)]
pub struct MdnsPublisher {
    registered: bool,
}

impl MdnsPublisher {
    pub fn new() -> Self {
        MdnsPublisher::default()
    }

    /// Publishes or refreshes the TXT record via `network`, per the register-once/update-after
    /// rule.
    pub fn publish(
        &mut self,
        network: &dyn crate::platform::Network,
        config: &AccessoryConfig,
        port: u16,
        config_number: u32,
        state_number: u16,
        paired: bool,
    ) {
        let txt = txt_records(config, config_number, state_number, paired);
        if self.registered {
            network.mdns_update_txt(&txt);
        } else {
            network.mdns_register(SERVICE_TYPE, port, &txt);
            self.registered = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Category, TransportConfig};

    fn sample_config() -> AccessoryConfig {
        AccessoryConfig {
            accessory_id: [0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
            setup_code: "123-45-678".into(),
            setup_id: *b"ABCD",
            device_name: "Lamp".into(),
            model: "Lamp1,1".into(),
            category: Category::LIGHTBULB,
            transport: TransportConfig::Ip { port: 51826 },
            identify: None,
        }
    }

    #[test]
    fn builds_expected_keys() {
        let txt = txt_records(&sample_config(), 3, 1, false);
        let get = |key: &str| txt.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
        assert_eq!(get("c#"), Some("3".to_string()));
        assert_eq!(get("id"), Some("11:22:33:44:55:66".to_string()));
        assert_eq!(get("pv"), Some("1.1".to_string()));
        assert_eq!(get("sf"), Some("1".to_string()));
        assert_eq!(get("ci"), Some("5".to_string()));
    }

    #[test]
    fn paired_clears_status_flag() {
        let txt = txt_records(&sample_config(), 3, 1, true);
        assert_eq!(txt.iter().find(|(k, _)| k == "sf").unwrap().1, "0");
    }
}
