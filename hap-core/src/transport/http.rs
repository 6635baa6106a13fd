//! The IP transport: an incremental HTTP/1.1 parser, a response builder, and the `/pair-*`,
//! `/pairings`, `/accessories`, `/characteristics`, `/prepare`, `/identify` endpoints (§4.6).

use crate::model::db::Database;
use crate::model::json;
use crate::transport::HapStatus;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    RequestLine,
    Headers,
    Body,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Feeds arbitrary chunks and yields complete requests as they finish. One instance serves one
/// connection for its lifetime (pipelined requests simply restart the state machine).
pub struct RequestParser {
    state: ParseState,
    buf: Vec<u8>,
    method: String,
    path: String,
    query: String,
    headers: HashMap<String, String>,
    content_length: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        RequestParser {
            state: ParseState::RequestLine,
            buf: Vec::new(),
            method: String::new(),
            path: String::new(),
            query: String::new(),
            headers: HashMap::new(),
            content_length: 0,
        }
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Request> {
        self.buf.extend_from_slice(bytes);
        let mut requests = Vec::new();

        loop {
            match self.state {
                ParseState::RequestLine => {
                    let Some(pos) = find_crlf(&self.buf) else { break };
                    let line = String::from_utf8_lossy(&self.buf[..pos]).to_string();
                    self.buf.drain(..pos + 2);
                    let mut parts = line.split_whitespace();
                    self.method = parts.next().unwrap_or_default().to_string();
                    let full_path = parts.next().unwrap_or_default().to_string();
                    let mut split = full_path.splitn(2, '?');
                    self.path = split.next().unwrap_or_default().to_string();
                    self.query = split.next().unwrap_or_default().to_string();
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let Some(pos) = find_crlf(&self.buf) else { break };
                    if pos == 0 {
                        self.buf.drain(..2);
                        self.content_length = self
                            .headers
                            .get("content-length")
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0);
                        self.state = ParseState::Body;
                        continue;
                    }
                    let line = String::from_utf8_lossy(&self.buf[..pos]).to_string();
                    self.buf.drain(..pos + 2);
                    if let Some((name, value)) = line.split_once(':') {
                        self.headers
                            .insert(name.trim().to_lowercase(), value.trim().to_string());
                    }
                }
                ParseState::Body => {
                    if self.buf.len() < self.content_length {
                        break;
                    }
                    let body = self.buf.drain(..self.content_length).collect();
                    requests.push(Request {
                        method: std::mem::take(&mut self.method),
                        path: std::mem::take(&mut self.path),
                        query: std::mem::take(&mut self.query),
                        headers: std::mem::take(&mut self.headers),
                        body,
                    });
                    self.state = ParseState::RequestLine;
                }
            }
        }

        requests
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    pub fn json(status: u16, reason: &'static str, body: serde_json::Value) -> Self {
        Response {
            status,
            reason,
            content_type: "application/hap+json",
            body: serde_json::to_vec(&body).unwrap_or_default(),
        }
    }

    pub fn no_content() -> Self {
        Response {
            status: 204,
            reason: "No Content",
            content_type: "application/hap+json",
            body: Vec::new(),
        }
    }

    pub fn tlv8(status: u16, reason: &'static str, body: Vec<u8>) -> Self {
        Response {
            status,
            reason,
            content_type: "application/pairing+tlv8",
            body,
        }
    }

    pub fn bad_request(reason: &'static str) -> Self {
        Response::json(400, reason, serde_json::json!({ "status": HapStatus::InvalidValueInRequest.to_i32() }))
    }

    /// Serializes the full HTTP/1.1 response line, headers, and body.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
            self.status,
            self.reason,
            self.content_type,
            self.body.len()
        )
        .into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Builds a HAP event push, same body shape as a characteristics read (§4.6).
pub fn encode_event(body: serde_json::Value) -> Vec<u8> {
    let payload = serde_json::to_vec(&body).unwrap_or_default();
    let mut out = format!(
        "EVENT/1.0 200 OK\r\nContent-Type: application/hap+json\r\nContent-Length: {}\r\n\r\n",
        payload.len()
    )
    .into_bytes();
    out.extend_from_slice(&payload);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    pub method: &'static str,
    pub path: &'static str,
}

/// Whether a route requires an established secure session before it will be served.
pub fn requires_pairing(route: Route) -> bool {
    !matches!(
        (route.method, route.path),
        ("POST", "/pair-setup") | ("POST", "/pair-verify") | ("POST", "/identify")
    )
}

/// Builds the `GET /accessories` response body (§4.6, §8 scenario 4).
pub fn handle_get_accessories(db: &Database) -> Response {
    Response::json(200, "OK", json::accessories_tree(db))
}

/// Parses `?id=a.i,a.i,...` and reads each characteristic, building the per-entry array described
/// in §4.6. Unknown attributes get `-70409`; write-only characteristics get `-70405`.
pub fn handle_get_characteristics(db: &Database, query: &str) -> Response {
    let pairs: Vec<(u64, u16)> = query
        .strip_prefix("id=")
        .unwrap_or(query)
        .split(',')
        .filter_map(|pair| {
            let (aid, iid) = pair.split_once('.')?;
            Some((aid.parse().ok()?, iid.parse().ok()?))
        })
        .collect();

    if pairs.is_empty() {
        return Response::bad_request("missing id query parameter");
    }

    let mut any_error = false;
    let results: Vec<serde_json::Value> = pairs
        .into_iter()
        .map(|(aid, iid)| match db.find_characteristic(aid, iid) {
            Some((_, characteristic)) => {
                if !characteristic
                    .permissions
                    .contains(crate::model::characteristic::Permissions::PAIRED_READ)
                {
                    any_error = true;
                    serde_json::json!({"aid": aid, "iid": iid, "status": HapStatus::WriteOnlyCharacteristic.to_i32()})
                } else {
                    serde_json::json!({"aid": aid, "iid": iid, "value": characteristic.value.to_json()})
                }
            }
            None => {
                any_error = true;
                serde_json::json!({"aid": aid, "iid": iid, "status": HapStatus::ResourceDoesNotExist.to_i32()})
            }
        })
        .collect();

    let status = if any_error { 207 } else { 200 };
    Response::json(status, if any_error { "Multi-Status" } else { "OK" }, serde_json::json!({ "characteristics": results }))
}

/// One write entry from a `PUT /characteristics` body.
struct WriteEntry {
    aid: u64,
    iid: u16,
    ev: Option<bool>,
    value: Option<serde_json::Value>,
    pid: Option<u64>,
}

fn parse_write_entries(body: &[u8]) -> Option<Vec<WriteEntry>> {
    let json: serde_json::Value = serde_json::from_slice(body).ok()?;
    let entries = json.get("characteristics")?.as_array()?;
    entries
        .iter()
        .map(|entry| {
            Some(WriteEntry {
                aid: entry.get("aid")?.as_u64()?,
                iid: entry.get("iid")?.as_u64()? as u16,
                ev: entry.get("ev").and_then(|v| v.as_bool()),
                value: entry.get("value").cloned(),
                pid: entry.get("pid").and_then(|v| v.as_u64()),
            })
        })
        .collect()
}

/// A side effect [`handle_put_characteristics`] asks its caller to apply against connection state
/// that lives outside the attribute database (subscriptions, timed-write tokens). Folded into one
/// callback type so the caller only has to hand over a single closure over its connection table
/// rather than two independently-capturing ones.
pub enum ConnectionOp {
    Subscribe { aid: u64, iid: u16, want: bool },
    ValidateTimedWrite { pid: u64 },
}

/// Applies a `PUT /characteristics` body. `connection_op` is called for subscribe/unsubscribe
/// requests and, for entries whose target characteristic requires `TimedWrite`, to validate the
/// write's `pid` against a previously prepared transaction (the return value is only consulted for
/// `ValidateTimedWrite`).
pub fn handle_put_characteristics(
    db: &mut Database,
    body: &[u8],
    mut connection_op: impl FnMut(ConnectionOp) -> bool,
) -> Response {
    use crate::model::characteristic::Permissions;

    let Some(entries) = parse_write_entries(body) else {
        return Response::bad_request("malformed characteristics body");
    };

    let mut any_error = false;
    let mut any_write_response = false;
    let mut statuses = Vec::with_capacity(entries.len());

    for entry in &entries {
        let status = 'status: {
            let Some(characteristic) = db.find_characteristic_mut(entry.aid, entry.iid) else {
                break 'status HapStatus::ResourceDoesNotExist;
            };

            if let Some(want_notify) = entry.ev {
                if !characteristic.permissions.contains(Permissions::NOTIFY) {
                    break 'status HapStatus::NotificationNotSupported;
                }
                connection_op(ConnectionOp::Subscribe { aid: entry.aid, iid: entry.iid, want: want_notify });
            }

            if let Some(value) = &entry.value {
                if !characteristic.permissions.contains(Permissions::PAIRED_WRITE) {
                    break 'status HapStatus::ReadOnlyCharacteristic;
                }
                if characteristic.permissions.contains(Permissions::TIMED_WRITE) {
                    let Some(pid) = entry.pid else {
                        break 'status HapStatus::InvalidValueInRequest;
                    };
                    if !connection_op(ConnectionOp::ValidateTimedWrite { pid }) {
                        break 'status HapStatus::InvalidValueInRequest;
                    }
                }
                let Some(decoded) = crate::model::characteristic::Value::from_json(characteristic.format(), value)
                else {
                    break 'status HapStatus::InvalidValueInRequest;
                };
                if let Some(cb) = &characteristic.on_write {
                    if cb(&decoded).is_err() {
                        break 'status HapStatus::ServiceCommunicationFailure;
                    }
                }
                characteristic.value = decoded;
                if characteristic.permissions.contains(Permissions::WRITE_RESPONSE) {
                    any_write_response = true;
                }
            }

            HapStatus::Success
        };

        if status != HapStatus::Success {
            any_error = true;
        }
        statuses.push((entry.aid, entry.iid, status));
    }

    if any_error {
        let results: Vec<_> = statuses
            .iter()
            .map(|(aid, iid, status)| serde_json::json!({"aid": aid, "iid": iid, "status": status.to_i32()}))
            .collect();
        return Response::json(207, "Multi-Status", serde_json::json!({ "characteristics": results }));
    }

    if any_write_response {
        let results: Vec<_> = entries
            .iter()
            .filter_map(|e| {
                let (_, c) = db.find_characteristic(e.aid, e.iid)?;
                Some(serde_json::json!({"aid": e.aid, "iid": e.iid, "value": c.value.to_json()}))
            })
            .collect();
        return Response::json(200, "OK", serde_json::json!({ "characteristics": results }));
    }

    Response::no_content()
}

/// `POST /prepare`: records a one-shot timed-write token, expiring at `now + ttl`.
pub fn handle_prepare(body: &[u8], mut register: impl FnMut(u64, crate::time::Duration)) -> Response {
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) else {
        return Response::bad_request("malformed prepare body");
    };
    let (Some(ttl), Some(pid)) = (
        json.get("ttl").and_then(|v| v.as_u64()),
        json.get("pid").and_then(|v| v.as_u64()),
    ) else {
        return Response::bad_request("missing ttl/pid");
    };
    register(pid, crate::time::Duration::from_millis(ttl));
    Response::json(200, "OK", serde_json::json!({ "status": HapStatus::Success.to_i32() }))
}

/// `POST /identify`: only valid on an unencrypted connection before the accessory is paired.
pub fn handle_identify(already_paired: bool, identify: impl FnOnce()) -> Response {
    if already_paired {
        return Response::json(400, "Bad Request", serde_json::json!({ "status": HapStatus::InsufficientPrivileges.to_i32() }));
    }
    identify();
    Response::no_content()
}

/// `POST /pairings`: Add-Pairing / Remove-Pairing / List-Pairings, all admin-only and requiring
/// an encrypted session (§4.6).
pub fn handle_pairings(
    storage: &dyn crate::storage::Storage,
    is_encrypted: bool,
    is_admin: bool,
    requester_id: &str,
    body: &[u8],
) -> (Response, bool) {
    use crate::pairing::store::{Pairing, PairingStore};
    use crate::pairing::tlv_types::{PairingMethod, TlvType};
    use crate::tlv::{Tlv, TlvList};

    if !is_encrypted {
        return (Response::bad_request("pairing required"), false);
    }

    let request = TlvList::parse(body);
    let Some(method_byte) = request.find_u8(TlvType::Method as u8) else {
        return (Response::bad_request("missing method"), false);
    };
    let Ok(method) = PairingMethod::try_from(method_byte) else {
        return (Response::bad_request("unknown method"), false);
    };

    if !is_admin {
        return (
            Response::tlv8(200, "OK", TlvList(vec![Tlv::u8(TlvType::State as u8, 2)]).encode()),
            false,
        );
    }

    let mut close_after = false;
    let response = match method {
        PairingMethod::AddPairing => {
            let id = request.find_string(TlvType::Identifier as u8).unwrap_or_default();
            let ltpk = request.find_bytes(TlvType::PublicKey as u8).unwrap_or_default();
            let ok = match (PairingStore::find_pairing(storage, id), ltpk.len()) {
                (Ok(Some(existing)), 32) => existing.ltpk == ltpk,
                (Ok(None), 32) => {
                    let mut arr = [0u8; 32];
                    arr.copy_from_slice(ltpk);
                    PairingStore::add_pairing(storage, &Pairing { controller_id: id.to_string(), ltpk: arr, admin: true }).is_ok()
                }
                _ => false,
            };
            TlvList(vec![Tlv::u8(TlvType::State as u8, 2), Tlv::u8(TlvType::Error as u8, if ok { 0 } else { 1 })])
        }
        PairingMethod::RemovePairing => {
            let id = request.find_string(TlvType::Identifier as u8).unwrap_or_default();
            let _ = PairingStore::remove_pairing(storage, id);
            if id == requester_id {
                close_after = true;
            }
            TlvList(vec![Tlv::u8(TlvType::State as u8, 2)])
        }
        PairingMethod::ListPairings => {
            let mut items = vec![Tlv::u8(TlvType::State as u8, 2)];
            let ids = PairingStore::list_ids(storage).unwrap_or_default();
            for (i, id) in ids.iter().enumerate() {
                if i > 0 {
                    items.push(Tlv::new(TlvType::Separator as u8, Vec::new()));
                }
                if let Ok(Some(pairing)) = PairingStore::find_pairing(storage, id) {
                    items.push(Tlv::new(TlvType::Identifier as u8, pairing.controller_id.into_bytes()));
                    items.push(Tlv::new(TlvType::PublicKey as u8, pairing.ltpk.to_vec()));
                    items.push(Tlv::u8(TlvType::Permissions as u8, pairing.admin as u8));
                }
            }
            TlvList(items)
        }
        _ => TlvList(vec![Tlv::u8(TlvType::State as u8, 2), Tlv::u8(TlvType::Error as u8, 1)]),
    };

    (Response::tlv8(200, "OK", response.encode()), close_after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Accessory, Characteristic, Permissions, Service, Value};
    use crate::storage::MemoryStorage;
    use crate::uuid::{Uuid128, Uuid32};

    fn sample_db() -> Database {
        let storage = MemoryStorage::new();
        let mut db = Database::load(&storage).unwrap();
        let info = Service::new(Uuid128::from(Uuid32(0x3E))).with_characteristic(Characteristic::new(
            Uuid128::from(Uuid32(0x23)),
            Permissions::PAIRED_READ,
            Value::String("Test".to_string()),
        ));
        db.register(Accessory::new(1).with_service(info)).unwrap();
        db
    }

    #[test]
    fn get_accessories_matches_scenario_4_shape() {
        let db = sample_db();
        let response = handle_get_accessories(&db);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["accessories"][0]["aid"], 1);
        assert_eq!(body["accessories"][0]["services"][0]["type"], "3E");
        let characteristic = &body["accessories"][0]["services"][0]["characteristics"][0];
        assert_eq!(characteristic["type"], "23");
        assert_eq!(characteristic["iid"], 2);
        assert_eq!(characteristic["perms"], serde_json::json!(["pr"]));
        assert_eq!(characteristic["format"], "string");
        assert_eq!(characteristic["value"], "Test");
    }

    #[test]
    fn request_parser_splits_on_content_length() {
        let mut parser = RequestParser::new();
        let raw = b"POST /pair-setup HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let requests = parser.feed(raw);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/pair-setup");
        assert_eq!(requests[0].body, b"hello");
    }

    #[test]
    fn request_parser_strips_query_string_from_path() {
        let mut parser = RequestParser::new();
        let raw = b"GET /characteristics?id=1.2 HTTP/1.1\r\nContent-Length: 0\r\n\r\n";
        let requests = parser.feed(raw);
        assert_eq!(requests[0].path, "/characteristics");
    }

    #[test]
    fn missing_characteristic_returns_multi_status_with_70409() {
        let db = sample_db();
        let response = handle_get_characteristics(&db, "id=1.999");
        assert_eq!(response.status, 207);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["characteristics"][0]["status"], -70409);
    }
}
