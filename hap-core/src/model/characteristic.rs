//! A single HAP characteristic: UUID, stable IID, format, permissions and value.

use crate::transport::ble::BroadcastInterval;
use crate::uuid::Uuid128;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Permission set drawn from the HAP characteristic property table (§3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u16 {
        const PAIRED_READ     = 0x0001;
        const PAIRED_WRITE    = 0x0002;
        const NOTIFY          = 0x0004;
        const ADDITIONAL_AUTH = 0x0008;
        const TIMED_WRITE     = 0x0010;
        const HIDDEN          = 0x0020;
        const WRITE_RESPONSE  = 0x0040;
        const BROADCAST       = 0x0080;
    }
}

impl Permissions {
    /// Short-name strings as emitted in the `/accessories` JSON `perms` array.
    pub fn to_json_strings(self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.contains(Permissions::PAIRED_READ) {
            out.push("pr");
        }
        if self.contains(Permissions::PAIRED_WRITE) {
            out.push("pw");
        }
        if self.contains(Permissions::NOTIFY) {
            out.push("ev");
        }
        if self.contains(Permissions::ADDITIONAL_AUTH) {
            out.push("aa");
        }
        if self.contains(Permissions::TIMED_WRITE) {
            out.push("tw");
        }
        if self.contains(Permissions::HIDDEN) {
            out.push("hd");
        }
        if self.contains(Permissions::WRITE_RESPONSE) {
            out.push("wr");
        }
        out
    }

    /// The BLE `HAP-Characteristic-Properties` bit layout (§4.7).
    pub fn to_ble_bits(self) -> u16 {
        let mut bits = 0u16;
        if self.contains(Permissions::PAIRED_READ) {
            bits |= 0x0010;
        }
        if self.contains(Permissions::PAIRED_WRITE) {
            bits |= 0x0020;
        }
        if self.contains(Permissions::NOTIFY) {
            bits |= 0x0080 | 0x0100;
        }
        if self.contains(Permissions::TIMED_WRITE) {
            bits |= 0x0008;
        }
        if self.contains(Permissions::HIDDEN) {
            bits |= 0x0040;
        }
        if self.contains(Permissions::ADDITIONAL_AUTH) {
            bits |= 0x0004;
        }
        if self.contains(Permissions::BROADCAST) {
            bits |= 0x0200;
        }
        bits
    }
}

/// A characteristic's format, which doubles as the discriminant for [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int32,
    Float,
    String,
    Data,
    Tlv8,
}

impl Format {
    /// The one-byte GATT presentation-format code (§4.8).
    pub fn gatt_format_byte(self) -> u8 {
        match self {
            Format::Bool => 0x01,
            Format::Uint8 => 0x04,
            Format::Uint16 => 0x06,
            Format::Uint32 => 0x08,
            Format::Uint64 => 0x0A,
            Format::Int32 => 0x10,
            Format::Float => 0x14,
            Format::String => 0x19,
            Format::Data | Format::Tlv8 => 0x1B,
        }
    }
}

/// A characteristic's value, tagged by [`Format`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Int32(i32),
    Float(f32),
    String(String),
    Data(Vec<u8>),
}

impl Value {
    pub fn format(&self) -> Format {
        match self {
            Value::Bool(_) => Format::Bool,
            Value::Uint8(_) => Format::Uint8,
            Value::Uint16(_) => Format::Uint16,
            Value::Uint32(_) => Format::Uint32,
            Value::Uint64(_) => Format::Uint64,
            Value::Int32(_) => Format::Int32,
            Value::Float(_) => Format::Float,
            Value::String(_) => Format::String,
            Value::Data(_) => Format::Data,
        }
    }

    /// Encodes to the little-endian binary representation used by BLE reads/writes (§4.8).
    pub fn encode_binary(&self) -> Vec<u8> {
        match self {
            Value::Bool(b) => vec![*b as u8],
            Value::Uint8(v) => vec![*v],
            Value::Uint16(v) => v.to_le_bytes().to_vec(),
            Value::Uint32(v) => v.to_le_bytes().to_vec(),
            Value::Uint64(v) => v.to_le_bytes().to_vec(),
            Value::Int32(v) => v.to_le_bytes().to_vec(),
            Value::Float(v) => v.to_le_bytes().to_vec(),
            Value::String(s) => s.as_bytes().to_vec(),
            Value::Data(bytes) => bytes.clone(),
        }
    }

    /// Decodes from the little-endian binary representation, given an expected format.
    ///
    /// Returns `None` if `bytes` is shorter than the format's fixed width (for fixed-width
    /// formats); string and data formats accept any length, including zero.
    pub fn decode_binary(format: Format, bytes: &[u8]) -> Option<Value> {
        use std::convert::TryInto;
        Some(match format {
            Format::Bool => Value::Bool(*bytes.first()? != 0),
            Format::Uint8 => Value::Uint8(*bytes.first()?),
            Format::Uint16 => Value::Uint16(u16::from_le_bytes(bytes.get(0..2)?.try_into().ok()?)),
            Format::Uint32 => Value::Uint32(u32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?)),
            Format::Uint64 => Value::Uint64(u64::from_le_bytes(bytes.get(0..8)?.try_into().ok()?)),
            Format::Int32 => Value::Int32(i32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?)),
            Format::Float => Value::Float(f32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?)),
            Format::String => Value::String(String::from_utf8(bytes.to_vec()).ok()?),
            Format::Data | Format::Tlv8 => Value::Data(bytes.to_vec()),
        })
    }

    /// Coerces a JSON value to the target format, per the `PUT /characteristics` coercion rule
    /// (JSON booleans may coerce to integer formats, and vice versa).
    pub fn from_json(format: Format, json: &serde_json::Value) -> Option<Value> {
        Some(match format {
            Format::Bool => Value::Bool(match json {
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::Number(n) => n.as_i64()? != 0,
                _ => return None,
            }),
            Format::Uint8 => Value::Uint8(coerce_u64(json)? as u8),
            Format::Uint16 => Value::Uint16(coerce_u64(json)? as u16),
            Format::Uint32 => Value::Uint32(coerce_u64(json)? as u32),
            Format::Uint64 => Value::Uint64(coerce_u64(json)?),
            Format::Int32 => Value::Int32(coerce_i64(json)? as i32),
            Format::Float => Value::Float(json.as_f64()? as f32),
            Format::String => Value::String(json.as_str()?.to_string()),
            Format::Data | Format::Tlv8 => {
                use base64::Engine;
                Value::Data(base64::engine::general_purpose::STANDARD.decode(json.as_str()?).ok()?)
            }
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Uint8(v) => serde_json::json!(v),
            Value::Uint16(v) => serde_json::json!(v),
            Value::Uint32(v) => serde_json::json!(v),
            Value::Uint64(v) => serde_json::json!(v),
            Value::Int32(v) => serde_json::json!(v),
            Value::Float(v) => serde_json::json!(v),
            Value::String(s) => serde_json::json!(s),
            Value::Data(bytes) => {
                use base64::Engine;
                serde_json::json!(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        }
    }
}

fn coerce_u64(json: &serde_json::Value) -> Option<u64> {
    match json {
        serde_json::Value::Bool(b) => Some(*b as u64),
        serde_json::Value::Number(n) => n.as_u64().or_else(|| n.as_i64().map(|i| i as u64)),
        _ => None,
    }
}

fn coerce_i64(json: &serde_json::Value) -> Option<i64> {
    match json {
        serde_json::Value::Bool(b) => Some(*b as i64),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Optional semantic metadata; all absent unless explicitly set.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub unit: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_step: Option<f64>,
    pub max_len: Option<u32>,
    pub max_data_len: Option<u32>,
    pub description: Option<String>,
    pub valid_values: Option<Vec<i64>>,
    pub valid_values_range: Option<(i64, i64)>,
}

pub struct Characteristic {
    pub uuid: Uuid128,
    pub iid: u16,
    pub permissions: Permissions,
    pub value: Value,
    pub metadata: Metadata,
    /// Application callback invoked on a PairedWrite; returning `Err` surfaces HAP status
    /// `-70402` (service communication failure) for that entry.
    pub on_write: Option<Box<dyn Fn(&Value) -> Result<(), ()> + Send + Sync>>,
    /// Set by a BLE `CharacteristicConfiguration` request (§4.7); only meaningful when
    /// `permissions` includes `BROADCAST`.
    pub broadcast_enabled: bool,
    pub broadcast_interval: BroadcastInterval,
}

impl Characteristic {
    pub fn new(uuid: Uuid128, permissions: Permissions, value: Value) -> Self {
        Characteristic {
            uuid,
            iid: 0,
            permissions,
            value,
            metadata: Metadata::default(),
            on_write: None,
            broadcast_enabled: false,
            broadcast_interval: BroadcastInterval::Ms20,
        }
    }

    pub fn format(&self) -> Format {
        self.value.format()
    }
}

impl std::fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Characteristic")
            .field("uuid", &self.uuid)
            .field("iid", &self.iid)
            .field("permissions", &self.permissions)
            .field("value", &self.value)
            .finish()
    }
}
