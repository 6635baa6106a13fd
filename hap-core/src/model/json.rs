//! JSON serialization for `GET /accessories` and `GET/PUT /characteristics` (§4.6).

use crate::model::characteristic::Characteristic;
use crate::model::db::Database;
use crate::model::service::Service;
use serde_json::{json, Map, Value as Json};

/// Builds the full `{accessories:[...]}` tree.
pub fn accessories_tree(db: &Database) -> Json {
    let accessories: Vec<Json> = db
        .accessories
        .iter()
        .map(|accessory| {
            json!({
                "aid": accessory.aid,
                "services": accessory.services.iter().map(service_json).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({ "accessories": accessories })
}

fn service_json(service: &Service) -> Json {
    let mut obj = Map::new();
    obj.insert("type".into(), json!(service.uuid.to_hap_string()));
    obj.insert("iid".into(), json!(service.iid));
    if service.primary {
        obj.insert("primary".into(), json!(true));
    }
    if service.hidden {
        obj.insert("hidden".into(), json!(true));
    }
    if !service.linked_services.is_empty() {
        obj.insert("linked".into(), json!(service.linked_services));
    }
    obj.insert(
        "characteristics".into(),
        json!(service
            .characteristics
            .iter()
            .map(characteristic_json)
            .collect::<Vec<_>>()),
    );
    Json::Object(obj)
}

/// Builds one characteristic entry. `value` is included only for PairedRead characteristics,
/// matching the HTTP transport's rule.
pub fn characteristic_json(characteristic: &Characteristic) -> Json {
    let mut obj = Map::new();
    obj.insert("type".into(), json!(characteristic.uuid.to_hap_string()));
    obj.insert("iid".into(), json!(characteristic.iid));
    obj.insert("perms".into(), json!(characteristic.permissions.to_json_strings()));
    obj.insert(
        "format".into(),
        json!(format_name(characteristic.format())),
    );
    if characteristic
        .permissions
        .contains(crate::model::characteristic::Permissions::PAIRED_READ)
    {
        obj.insert("value".into(), characteristic.value.to_json());
    }

    let m = &characteristic.metadata;
    if let Some(unit) = &m.unit {
        obj.insert("unit".into(), json!(unit));
    }
    if let Some(v) = m.min_value {
        obj.insert("minValue".into(), json!(v));
    }
    if let Some(v) = m.max_value {
        obj.insert("maxValue".into(), json!(v));
    }
    if let Some(v) = m.min_step {
        obj.insert("minStep".into(), json!(v));
    }
    if let Some(v) = m.max_len {
        obj.insert("maxLen".into(), json!(v));
    }
    if let Some(v) = m.max_data_len {
        obj.insert("maxDataLen".into(), json!(v));
    }
    if let Some(desc) = &m.description {
        obj.insert("description".into(), json!(desc));
    }
    if let Some(values) = &m.valid_values {
        obj.insert("valid-values".into(), json!(values));
    }
    if let Some((lo, hi)) = m.valid_values_range {
        obj.insert("valid-values-range".into(), json!([lo, hi]));
    }

    Json::Object(obj)
}

fn format_name(format: crate::model::characteristic::Format) -> &'static str {
    use crate::model::characteristic::Format::*;
    match format {
        Bool => "bool",
        Uint8 => "uint8",
        Uint16 => "uint16",
        Uint32 => "uint32",
        Uint64 => "uint64",
        Int32 => "int",
        Float => "float",
        String => "string",
        Data => "data",
        Tlv8 => "tlv8",
    }
}
