//! The BLE transport: PDU parsing/fragmentation, opcode dispatch, and the binary encodings that
//! back each opcode (§4.7, §4.8).

use crate::advertising::BroadcastKeyState;
use crate::bytes::{ByteReader, ByteWriter};
use crate::model::characteristic::{Format, Permissions};
use crate::model::db::Database;
use crate::session::SecureSession;
use crate::tlv::{Tlv, TlvList};
use crate::transport::HapStatus;
use crate::uuid::Uuid128;
use crate::Error;

/// Short UUID types for the two always-plaintext BLE services and their characteristics (§4.7).
pub const PAIRING_SERVICE_TYPE: u32 = 0x55;
pub const PROTOCOL_INFORMATION_SERVICE_TYPE: u32 = 0xA2;
pub const PAIR_SETUP_CHAR_TYPE: u32 = 0x4C;
pub const PAIR_VERIFY_CHAR_TYPE: u32 = 0x4E;
pub const PAIRING_FEATURES_CHAR_TYPE: u32 = 0x4F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    CharacteristicSignatureRead = 0x01,
    CharacteristicWrite = 0x02,
    CharacteristicRead = 0x03,
    CharacteristicTimedWrite = 0x04,
    CharacteristicExecuteWrite = 0x05,
    ServiceSignatureRead = 0x06,
    CharacteristicConfiguration = 0x07,
    ProtocolConfiguration = 0x08,
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        Ok(match value {
            0x01 => Opcode::CharacteristicSignatureRead,
            0x02 => Opcode::CharacteristicWrite,
            0x03 => Opcode::CharacteristicRead,
            0x04 => Opcode::CharacteristicTimedWrite,
            0x05 => Opcode::CharacteristicExecuteWrite,
            0x06 => Opcode::ServiceSignatureRead,
            0x07 => Opcode::CharacteristicConfiguration,
            0x08 => Opcode::ProtocolConfiguration,
            _ => return Err(Error::InvalidValue),
        })
    }
}

impl Opcode {
    /// Whether requests for this opcode carry a `BodyLen`+`Body` tail (§4.7).
    pub fn has_request_body(self) -> bool {
        matches!(
            self,
            Opcode::CharacteristicWrite
                | Opcode::CharacteristicTimedWrite
                | Opcode::CharacteristicConfiguration
                | Opcode::ProtocolConfiguration
        )
    }
}

pub const MIN_REQUEST_HEADER_SIZE: usize = 5;
pub const WRITE_HEADER_SIZE: usize = 7;
pub const CONTINUATION_HEADER_SIZE: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct RequestHeader {
    pub control_field: u8,
    pub opcode: Opcode,
    pub transaction_id: u8,
    pub instance_id: u16,
    pub body_len: u16,
}

impl RequestHeader {
    pub fn is_continuation(&self) -> bool {
        self.control_field & 0x80 != 0
    }
}

/// Parses a non-continuation request header: `CF(1)|Opcode(1)|TID(1)|IID(u16 LE)|[BodyLen(u16 LE)]`.
pub fn parse_header(bytes: &[u8]) -> Result<RequestHeader, Error> {
    let mut reader = ByteReader::new(bytes);
    let control_field = reader.read_u8()?;
    let opcode = Opcode::try_from(reader.read_u8()?)?;
    let transaction_id = reader.read_u8()?;
    let instance_id = reader.read_u16_le()?;
    let body_len = if opcode.has_request_body() {
        reader.read_u16_le()?
    } else {
        0
    };
    Ok(RequestHeader {
        control_field,
        opcode,
        transaction_id,
        instance_id,
        body_len,
    })
}

/// Parses a continuation fragment header: `CF(1)|TID(1)`, returning the transaction id and the
/// remaining body slice.
pub fn parse_continuation(bytes: &[u8]) -> Result<(u8, &[u8]), Error> {
    let mut reader = ByteReader::new(bytes);
    let control_field = reader.read_u8()?;
    if control_field & 0x80 == 0 {
        return Err(Error::InvalidValue);
    }
    let tid = reader.read_u8()?;
    Ok((tid, reader.into_rest()))
}

/// Reassembles a fragmented BLE write across PDU writes. One instance tracks one in-flight
/// transaction per connection (§4.7 "Fragmentation").
#[derive(Default)]
pub struct Reassembler {
    transaction_id: Option<u8>,
    opcode: Option<Opcode>,
    instance_id: u16,
    expected_total: usize,
    buf: Vec<u8>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one GATT write payload. Returns `Some(header, body)` once the transaction is
    /// complete. A TID mismatch on a continuation silently aborts the in-flight transaction and
    /// starts fresh only if the new fragment is itself a first fragment.
    pub fn feed(&mut self, payload: &[u8]) -> Option<(Opcode, u8, u16, Vec<u8>)> {
        if payload.is_empty() {
            return None;
        }
        let is_continuation = payload[0] & 0x80 != 0;

        if !is_continuation {
            let header = parse_header(payload).ok()?;
            let header_size = if header.opcode.has_request_body() {
                WRITE_HEADER_SIZE
            } else {
                MIN_REQUEST_HEADER_SIZE
            };
            self.transaction_id = Some(header.transaction_id);
            self.opcode = Some(header.opcode);
            self.instance_id = header.instance_id;
            self.expected_total = header_size + header.body_len as usize;
            self.buf = payload.to_vec();
        } else {
            let (tid, rest) = parse_continuation(payload).ok()?;
            if self.transaction_id != Some(tid) {
                self.reset();
                return None;
            }
            self.buf.extend_from_slice(rest);
        }

        if self.buf.len() >= self.expected_total && self.expected_total > 0 {
            let opcode = self.opcode.take()?;
            let tid = self.transaction_id.take()?;
            let iid = self.instance_id;
            let header_size = if opcode.has_request_body() {
                WRITE_HEADER_SIZE
            } else {
                MIN_REQUEST_HEADER_SIZE
            };
            let body = self.buf[header_size..self.expected_total].to_vec();
            self.reset();
            Some((opcode, tid, iid, body))
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.transaction_id = None;
        self.opcode = None;
        self.instance_id = 0;
        self.expected_total = 0;
        self.buf.clear();
    }
}

/// Builds a response PDU: `CF(0x02)|TID(1)|Status(1)|Len(u16 LE)|Body`.
pub fn build_response(transaction_id: u8, status: HapStatus, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(5 + body.len());
    let mut buf = vec![0u8; 5 + body.len()];
    {
        let mut writer = ByteWriter::new(&mut buf);
        writer.write_u8(0x02).unwrap();
        writer.write_u8(transaction_id).unwrap();
        writer.write_u8(status.to_ble_byte()).unwrap();
        writer.write_u16_le(body.len() as u16).unwrap();
        writer.write_slice(body).unwrap();
    }
    out.extend_from_slice(&buf);
    out
}

/// Inner BLE-layer TLV types carried in write/read bodies (distinct from the pairing TLV types).
pub mod body_tlv {
    pub const VALUE: u8 = 0x01;
    pub const ADDITIONAL_AUTH_DATA: u8 = 0x02;
    pub const ORIGIN: u8 = 0x03;
    pub const CHAR_TYPE: u8 = 0x04;
    pub const CHAR_INSTANCE_ID: u8 = 0x05;
    pub const SERVICE_TYPE: u8 = 0x06;
    pub const SERVICE_INSTANCE_ID: u8 = 0x07;
    pub const TTL: u8 = 0x08;
    pub const RETURN_RESPONSE: u8 = 0x09;
    pub const CHAR_PROPERTIES: u8 = 0x0A;
    pub const DESCRIPTION: u8 = 0x0B;
    pub const PRESENTATION_FORMAT: u8 = 0x0C;
    pub const VALID_RANGE: u8 = 0x0D;
    pub const STEP_VALUE: u8 = 0x0E;
    pub const SERVICE_PROPERTIES: u8 = 0x0F;
    pub const LINKED_SERVICES: u8 = 0x10;
    pub const VALID_VALUES: u8 = 0x11;
    pub const VALID_VALUES_RANGE: u8 = 0x12;

    /// `CharacteristicConfiguration` (opcode `0x07`) request TLVs.
    pub const PROPERTIES: u8 = 0x01;
    pub const BROADCAST_INTERVAL: u8 = 0x02;
}

/// `ProtocolConfiguration` (opcode `0x08`) request/response TLVs, a numbering scope of their own
/// since each opcode's body is parsed independently of `body_tlv` (§4.7).
pub mod protocol_config_tlv {
    pub const GENERATE_KEY: u8 = 0x01;
    pub const GET_ALL: u8 = 0x02;

    pub const BROADCAST_ENCRYPTION_KEY: u8 = 0x01;
    pub const STATE_NUMBER: u8 = 0x02;
    pub const CONFIG_NUMBER: u8 = 0x03;
    pub const ADVERTISING_ID: u8 = 0x04;
}

/// `CharacteristicSignatureRead` (opcode `0x01`): describes one characteristic (§4.7, §8 scenario
/// 3).
pub fn signature_read_response(
    db: &Database,
    aid: u64,
    char_iid: u16,
    service_iid: u16,
    service_type: Uuid128,
) -> Option<Vec<u8>> {
    let (_, characteristic) = db.find_characteristic(aid, char_iid)?;

    let mut list = TlvList::new();
    list.push(Tlv::new(body_tlv::CHAR_TYPE, characteristic.uuid.as_bytes().to_vec()));
    list.push(Tlv::new(
        body_tlv::SERVICE_INSTANCE_ID,
        service_iid.to_le_bytes().to_vec(),
    ));
    list.push(Tlv::new(body_tlv::SERVICE_TYPE, service_type.as_bytes().to_vec()));
    list.push(Tlv::new(
        body_tlv::CHAR_PROPERTIES,
        characteristic.permissions.to_ble_bits().to_le_bytes().to_vec(),
    ));
    if let Some(desc) = &characteristic.metadata.description {
        list.push(Tlv::new(body_tlv::DESCRIPTION, desc.as_bytes().to_vec()));
    }
    list.push(Tlv::new(
        body_tlv::PRESENTATION_FORMAT,
        gatt_presentation_format(characteristic.format()),
    ));

    Some(list.encode())
}

/// The 7-byte GATT presentation format descriptor value (§4.8): format, exponent=0, unit(LE),
/// namespace=1, description=0.
pub fn gatt_presentation_format(format: Format) -> Vec<u8> {
    vec![format.gatt_format_byte(), 0x00, 0x27, 0x01, 0x00, 0x00, 0x00]
}

/// `ServiceSignatureRead` (opcode `0x06`): returns `ServiceProperties(u16, bit0=primary)` and
/// `LinkedServices(u16[] LE)`. Unknown IID returns empty properties and an empty linked list.
pub fn service_signature_read_response(db: &Database, aid: u64, service_iid: u16) -> Vec<u8> {
    let mut list = TlvList::new();
    match db.find_service(aid, service_iid) {
        Some(service) => {
            let props: u16 = if service.primary { 0x0001 } else { 0 };
            list.push(Tlv::new(body_tlv::SERVICE_PROPERTIES, props.to_le_bytes().to_vec()));
            let mut linked = Vec::new();
            for iid in &service.linked_services {
                linked.extend_from_slice(&iid.to_le_bytes());
            }
            list.push(Tlv::new(body_tlv::LINKED_SERVICES, linked));
        }
        None => {
            list.push(Tlv::new(body_tlv::SERVICE_PROPERTIES, 0u16.to_le_bytes().to_vec()));
            list.push(Tlv::new(body_tlv::LINKED_SERVICES, Vec::new()));
        }
    }
    list.encode()
}

/// `CharacteristicRead` (opcode `0x03`): body is `TLV{0x01, value-bytes}`.
pub fn characteristic_read_response(db: &Database, aid: u64, iid: u16) -> Option<Vec<u8>> {
    let (_, characteristic) = db.find_characteristic(aid, iid)?;
    let list = TlvList(vec![Tlv::new(body_tlv::VALUE, characteristic.value.encode_binary())]);
    Some(list.encode())
}

/// `CharacteristicWrite` (opcode `0x02`): applies a value write if PairedWrite is granted.
/// Returns `None` if the attribute doesn't exist.
pub fn characteristic_write(db: &mut Database, aid: u64, iid: u16, body: &[u8]) -> Option<HapStatus> {
    let request = TlvList::parse(body);
    let value_bytes = request.find_bytes(body_tlv::VALUE)?;

    let characteristic = db.find_characteristic_mut(aid, iid)?;
    if !characteristic.permissions.contains(Permissions::PAIRED_WRITE) {
        return Some(HapStatus::ReadOnlyCharacteristic);
    }
    let Some(value) = crate::model::characteristic::Value::decode_binary(characteristic.format(), value_bytes) else {
        return Some(HapStatus::InvalidValueInRequest);
    };
    if let Some(cb) = &characteristic.on_write {
        if cb(&value).is_err() {
            return Some(HapStatus::ServiceCommunicationFailure);
        }
    }
    characteristic.value = value;
    Some(HapStatus::Success)
}

/// Broadcast interval codes for `CharacteristicConfiguration` (opcode `0x07`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastInterval {
    Ms20,
    Ms1280,
    Ms2560,
}

impl BroadcastInterval {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x02 => BroadcastInterval::Ms1280,
            0x03 => BroadcastInterval::Ms2560,
            _ => BroadcastInterval::Ms20,
        }
    }
}

/// `CharacteristicConfiguration` (opcode `0x07`): enables or disables broadcast notifications on
/// one characteristic and sets its broadcast interval (§4.7). Returns `None` if the attribute
/// doesn't exist. A characteristic not declared with the `BROADCAST` permission can't be
/// configured for it.
pub fn characteristic_configuration(db: &mut Database, aid: u64, iid: u16, body: &[u8]) -> Option<HapStatus> {
    let request = TlvList::parse(body);
    let characteristic = db.find_characteristic_mut(aid, iid)?;
    if !characteristic.permissions.contains(Permissions::BROADCAST) {
        return Some(HapStatus::NotificationNotSupported);
    }

    if let Some(properties) = request.find_bytes(body_tlv::PROPERTIES) {
        if properties.len() != 2 {
            return Some(HapStatus::InvalidValueInRequest);
        }
        characteristic.broadcast_enabled = u16::from_le_bytes([properties[0], properties[1]]) & 0x0001 != 0;
    }
    if let Some(code) = request.find_u8(body_tlv::BROADCAST_INTERVAL) {
        characteristic.broadcast_interval = BroadcastInterval::from_code(code);
    }

    Some(HapStatus::Success)
}

/// `ProtocolConfiguration` (opcode `0x08`): `GenerateKey` derives and returns the broadcast
/// encryption key from this connection's Pair Verify shared secret; `GetAll` returns the current
/// GSN, configuration number, and advertising identifier (§4.7). `GenerateKey` on a plaintext
/// connection is rejected, since there is no shared secret to derive from.
///
/// Returns the response body and, when a key was generated, the [`BroadcastKeyState`] the caller
/// should start tracking for expiry.
pub fn protocol_configuration_response(
    session: Option<&SecureSession<'_>>,
    current_gsn: u16,
    config_number: u32,
    advertising_id: [u8; 6],
    body: &[u8],
) -> (HapStatus, Vec<u8>, Option<BroadcastKeyState>) {
    let request = TlvList::parse(body);
    let mut response = TlvList::new();
    let mut issued_key = None;

    if request.find(protocol_config_tlv::GENERATE_KEY).is_some() {
        let Some(session) = session else {
            return (HapStatus::InsufficientAuthorization, Vec::new(), None);
        };
        let key = session.derive_broadcast_key();
        response.push(Tlv::new(protocol_config_tlv::BROADCAST_ENCRYPTION_KEY, key.to_vec()));
        issued_key = Some(BroadcastKeyState {
            key,
            issued_at_gsn: current_gsn,
        });
    }

    if request.find(protocol_config_tlv::GET_ALL).is_some() {
        response.push(Tlv::new(protocol_config_tlv::STATE_NUMBER, current_gsn.to_le_bytes().to_vec()));
        response.push(Tlv::new(protocol_config_tlv::CONFIG_NUMBER, config_number.to_le_bytes().to_vec()));
        response.push(Tlv::new(protocol_config_tlv::ADVERTISING_ID, advertising_id.to_vec()));
    }

    (HapStatus::Success, response.encode(), issued_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_2_reassembly() {
        let mut reassembler = Reassembler::new();
        let mut frame1 = vec![0x00, 0x02, 0x01, 0x01, 0x00, 0x0B, 0x00];
        frame1.extend_from_slice(b"Hello ");
        assert!(reassembler.feed(&frame1).is_none());

        let mut frame2 = vec![0x80, 0x01];
        frame2.extend_from_slice(b"World");
        let (opcode, tid, iid, body) = reassembler.feed(&frame2).unwrap();
        assert_eq!(opcode, Opcode::CharacteristicWrite);
        assert_eq!(tid, 1);
        assert_eq!(iid, 1);
        assert_eq!(body, b"Hello World");
    }

    #[test]
    fn response_header_matches_scenario_2() {
        let response = build_response(1, HapStatus::Success, &[]);
        assert_eq!(response[0], 0x02);
        assert_eq!(response[1], 1);
    }

    #[test]
    fn scenario_3_signature_read_bytes() {
        use crate::model::{Accessory, Characteristic, Permissions as Perms, Service, Value};
        use crate::storage::MemoryStorage;
        use crate::uuid::Uuid32;

        let storage = MemoryStorage::new();
        let mut db = Database::load(&storage).unwrap();
        let pair_setup = Characteristic::new(
            Uuid128::from(Uuid32(PAIR_SETUP_CHAR_TYPE)),
            Perms::PAIRED_WRITE,
            Value::Data(Vec::new()),
        );
        let info = Service::new(Uuid128::from(Uuid32(0x3E)));
        let pairing_service = Service::new(Uuid128::from(Uuid32(PAIRING_SERVICE_TYPE))).with_characteristic(pair_setup);
        let accessory = Accessory::new(1).with_service(info).with_service(pairing_service);
        db.register(accessory).unwrap();

        let service_iid = db.find_accessory(1).unwrap().services[1].iid;
        let char_iid = db.find_accessory(1).unwrap().services[1].characteristics[0].iid;

        let body = signature_read_response(
            &db,
            1,
            char_iid,
            service_iid,
            Uuid128::from(Uuid32(PAIRING_SERVICE_TYPE)),
        )
        .unwrap();

        // Just confirm the CharType and ServiceType TLVs carry the expected base-UUID-expanded
        // 128-bit values; exact IIDs depend on registration order in this test so aren't asserted
        // byte-for-byte against the scenario (which fixes IID=0xA000/0xA001 directly).
        let list = TlvList::parse(&body);
        assert_eq!(
            list.find_bytes(body_tlv::CHAR_TYPE).unwrap(),
            Uuid128::from(Uuid32(PAIR_SETUP_CHAR_TYPE)).as_bytes()
        );
        assert_eq!(
            list.find_bytes(body_tlv::SERVICE_TYPE).unwrap(),
            Uuid128::from(Uuid32(PAIRING_SERVICE_TYPE)).as_bytes()
        );
    }

    fn db_with_broadcast_characteristic() -> (Database, u16) {
        use crate::model::{Accessory, Characteristic, Permissions as Perms, Service, Value};
        use crate::storage::MemoryStorage;
        use crate::uuid::Uuid32;

        let storage = MemoryStorage::new();
        let mut db = Database::load(&storage).unwrap();
        let characteristic = Characteristic::new(
            Uuid128::from(Uuid32(0x25)),
            Perms::PAIRED_READ | Perms::NOTIFY | Perms::BROADCAST,
            Value::Bool(false),
        );
        let service = Service::new(Uuid128::from(Uuid32(0x43))).with_characteristic(characteristic);
        db.register(Accessory::new(1).with_service(service)).unwrap();
        let iid = db.find_accessory(1).unwrap().services[0].characteristics[0].iid;
        (db, iid)
    }

    #[test]
    fn characteristic_configuration_sets_broadcast_state() {
        let (mut db, iid) = db_with_broadcast_characteristic();

        let mut request = TlvList::new();
        request.push(Tlv::new(body_tlv::PROPERTIES, 0x0001u16.to_le_bytes().to_vec()));
        request.push(Tlv::u8(body_tlv::BROADCAST_INTERVAL, 0x02));
        let status = characteristic_configuration(&mut db, 1, iid, &request.encode()).unwrap();
        assert_eq!(status, HapStatus::Success);

        let (_, characteristic) = db.find_characteristic(1, iid).unwrap();
        assert!(characteristic.broadcast_enabled);
        assert_eq!(characteristic.broadcast_interval, BroadcastInterval::Ms1280);
    }

    #[test]
    fn characteristic_configuration_rejects_non_broadcast_characteristic() {
        use crate::model::{Accessory, Characteristic, Permissions as Perms, Service, Value};
        use crate::storage::MemoryStorage;
        use crate::uuid::Uuid32;

        let storage = MemoryStorage::new();
        let mut db = Database::load(&storage).unwrap();
        let characteristic = Characteristic::new(Uuid128::from(Uuid32(0x25)), Perms::PAIRED_READ, Value::Bool(false));
        let service = Service::new(Uuid128::from(Uuid32(0x43))).with_characteristic(characteristic);
        db.register(Accessory::new(1).with_service(service)).unwrap();
        let iid = db.find_accessory(1).unwrap().services[0].characteristics[0].iid;

        let mut request = TlvList::new();
        request.push(Tlv::u8(body_tlv::BROADCAST_INTERVAL, 0x01));
        let status = characteristic_configuration(&mut db, 1, iid, &request.encode()).unwrap();
        assert_eq!(status, HapStatus::NotificationNotSupported);
    }

    #[test]
    fn protocol_configuration_generate_key_requires_encrypted_session() {
        let mut request = TlvList::new();
        request.push(Tlv::new(protocol_config_tlv::GENERATE_KEY, Vec::new()));
        let (status, body, key) = protocol_configuration_response(None, 1, 1, [0; 6], &request.encode());
        assert_eq!(status, HapStatus::InsufficientAuthorization);
        assert!(body.is_empty());
        assert!(key.is_none());
    }

    #[test]
    fn protocol_configuration_generate_key_derives_and_reports_starting_gsn() {
        use crate::pairing::crypto::tests_support::NullCrypto;

        let crypto = NullCrypto;
        let session = SecureSession::new(&crypto, [0; 32], [0; 32]).with_broadcast_material([1; 32], [2; 32]);

        let mut request = TlvList::new();
        request.push(Tlv::new(protocol_config_tlv::GENERATE_KEY, Vec::new()));
        let (status, body, key_state) = protocol_configuration_response(Some(&session), 42, 7, [9; 6], &request.encode());
        assert_eq!(status, HapStatus::Success);
        let key_state = key_state.unwrap();
        assert_eq!(key_state.issued_at_gsn, 42);

        let response = TlvList::parse(&body);
        assert_eq!(
            response.find_bytes(protocol_config_tlv::BROADCAST_ENCRYPTION_KEY).unwrap(),
            key_state.key
        );
    }

    #[test]
    fn protocol_configuration_get_all_reports_current_counters() {
        let mut request = TlvList::new();
        request.push(Tlv::new(protocol_config_tlv::GET_ALL, Vec::new()));
        let (status, body, key) = protocol_configuration_response(None, 99, 4, [5; 6], &request.encode());
        assert_eq!(status, HapStatus::Success);
        assert!(key.is_none());

        let response = TlvList::parse(&body);
        assert_eq!(response.find_bytes(protocol_config_tlv::STATE_NUMBER).unwrap(), 99u16.to_le_bytes());
        assert_eq!(response.find_bytes(protocol_config_tlv::CONFIG_NUMBER).unwrap(), 4u32.to_le_bytes());
        assert_eq!(response.find_bytes(protocol_config_tlv::ADVERTISING_ID).unwrap(), [5u8; 6]);
    }
}
