//! The orchestrator: wires configuration, the attribute database, both pairing engines, and both
//! transports together, and routes characteristic-change events out to subscribed connections
//! (§2 "Orchestrator", §5).

use crate::config::AccessoryConfig;
use crate::connection::ConnectionContext;
use crate::mdns::MdnsPublisher;
use crate::model::db::Database;
use crate::pairing::crypto::Crypto;
use crate::pairing::setup::PairSetup;
use crate::pairing::store::PairingStore;
use crate::pairing::verify::PairVerify;
use crate::platform::Network;
use crate::scheduler::Scheduler;
use crate::session::{IpFrameReassembler, SecureSession};
use crate::storage::Storage;
use crate::time::Instant;
use crate::transport::http::{self, Request, RequestParser, Response, Route};
use std::collections::{HashMap, HashSet};

const KEY_CONFIG_NUMBER: &str = "config_number";
const KEY_GSN: &str = "gsn";

enum PairingInProgress<'a> {
    Setup(PairSetup<'a>),
    Verify(PairVerify<'a>),
}

/// Per-IP-connection state layered on top of the shared [`ConnectionContext`].
struct IpConnection<'a> {
    context: ConnectionContext<'a>,
    parser: RequestParser,
    reassembler: IpFrameReassembler,
    pairing: Option<PairingInProgress<'a>>,
}

impl<'a> IpConnection<'a> {
    fn new(id: u64) -> Self {
        IpConnection {
            context: ConnectionContext::new(id),
            parser: RequestParser::new(),
            reassembler: IpFrameReassembler::new(),
            pairing: None,
        }
    }
}

/// Ties the attribute database, pairing engines, persisted pairing list, mDNS, and the IP
/// transport together behind a single `on_tcp_receive`/`on_tcp_disconnect` surface. BLE
/// connections are handled the same way a host would use [`crate::transport::ble`] directly;
/// the orchestrator's job there is limited to GSN/advertising bookkeeping
/// ([`Server::notify_characteristic_changed`]).
pub struct Server<'a> {
    config: AccessoryConfig,
    storage: &'a dyn Storage,
    crypto: &'a dyn Crypto,
    network: &'a dyn Network,
    db: Database,
    connections: HashMap<u64, IpConnection<'a>>,
    mdns: MdnsPublisher,
    scheduler: Scheduler,
    config_number: u32,
    state_number: u16,
    /// Connections that have already bumped the GSN once since they last (re)connected, so a
    /// burst of writes from the same connection only counts as one GSN increment (§3 "GSN").
    gsn_bumped_connections: HashSet<u64>,
}

impl<'a> Server<'a> {
    pub fn new(
        config: AccessoryConfig,
        storage: &'a dyn Storage,
        crypto: &'a dyn Crypto,
        network: &'a dyn Network,
    ) -> Result<Self, crate::Error> {
        storage.set("accessory_id", config.accessory_id_string().as_bytes())?;
        let db = Database::load(storage)?;
        let config_number = load_config_number(storage)?;
        let state_number = load_gsn(storage)?;
        Ok(Server {
            config,
            storage,
            crypto,
            network,
            db,
            connections: HashMap::new(),
            mdns: MdnsPublisher::new(),
            scheduler: Scheduler::new(),
            config_number,
            state_number,
            gsn_bumped_connections: HashSet::new(),
        })
    }

    /// Registers an accessory, bumping the configuration number if the attribute tree's structural
    /// hash changed since the last run (§4.2).
    pub fn register_accessory(&mut self, accessory: crate::model::Accessory) -> Result<(), crate::Error> {
        let keys = self
            .db
            .register(accessory)
            .map_err(crate::Error::Validation)?;
        let hash = crate::model::iid::structure_hash(&keys);
        if self.db.iid_manager().has_structure_changed(self.storage, &hash)? {
            self.config_number = self.config_number.wrapping_add(1).max(1);
            self.db.iid_manager().update_stored_hash(self.storage, &hash)?;
            self.storage.set(KEY_CONFIG_NUMBER, self.config_number.to_string().as_bytes())?;
        }
        self.db.save_iid_state(self.storage)?;
        Ok(())
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    /// Publishes (or refreshes) the mDNS TXT record; call after startup and after any pairing
    /// change.
    pub fn refresh_mdns(&mut self, port: u16) -> Result<(), crate::Error> {
        let paired = PairingStore::is_paired(self.storage)?;
        self.mdns
            .publish(self.network, &self.config, port, self.config_number, self.state_number, paired);
        Ok(())
    }

    pub fn on_tcp_connect(&mut self, connection_id: u64) {
        debug!("connection {} opened", connection_id);
        self.connections.insert(connection_id, IpConnection::new(connection_id));
    }

    pub fn on_tcp_disconnect(&mut self, connection_id: u64) {
        debug!("connection {} closed", connection_id);
        self.connections.remove(&connection_id);
        self.gsn_bumped_connections.remove(&connection_id);
    }

    /// Feeds raw inbound TCP bytes for one connection, returning raw outbound TCP bytes (possibly
    /// spanning multiple HTTP responses if several requests arrived in one chunk). Decrypts
    /// incoming frames and encrypts outgoing ones once a secure session is established, mirroring
    /// the "connection context → AEAD decrypt → HTTP parser → router → endpoint → AEAD encrypt"
    /// pipeline (§2 Data flow (IP)).
    pub fn on_tcp_receive(&mut self, connection_id: u64, now: Instant, bytes: &[u8]) -> Vec<u8> {
        let Some(conn) = self.connections.get_mut(&connection_id) else {
            return Vec::new();
        };

        let plaintext = if conn.context.is_encrypted() {
            conn.reassembler.feed(bytes);
            let mut out = Vec::new();
            while let Some((len, frame)) = conn.reassembler.pop_frame() {
                match conn.context.session_mut().unwrap().decrypt_ip_frame(len, &frame) {
                    Ok(mut decrypted) => out.append(&mut decrypted),
                    Err(_) => {
                        warn!("AEAD verification failed on connection {}, closing", connection_id);
                        conn.context.request_close();
                        return Vec::new();
                    }
                }
            }
            out
        } else {
            bytes.to_vec()
        };

        let requests = conn.parser.feed(&plaintext);
        let mut out = Vec::new();
        for request in requests {
            let response_bytes = self.handle_request(connection_id, now, &request);
            out.extend_from_slice(&response_bytes);
        }
        out
    }

    fn handle_request(&mut self, connection_id: u64, now: Instant, request: &Request) -> Vec<u8> {
        let route = Route {
            method: leak_method(&request.method),
            path: leak_path(&request.path),
        };

        let is_encrypted = self.connections.get(&connection_id).map(|c| c.context.is_encrypted()).unwrap_or(false);
        if http::requires_pairing(route) && !is_encrypted {
            return Response::bad_request("pairing required").encode();
        }

        let response = match (request.method.as_str(), request.path.as_str()) {
            ("POST", "/pair-setup") => {
                let conn = self.connections.get_mut(&connection_id).unwrap();
                let pairing = conn.pairing.get_or_insert_with(|| {
                    PairingInProgress::Setup(PairSetup::new(self.crypto, self.storage, self.config.setup_code.clone()))
                });
                let PairingInProgress::Setup(setup) = pairing else {
                    return Response::bad_request("pair-verify in progress").encode();
                };
                let body = setup.handle_request(&request.body);
                Response::tlv8(200, "OK", body)
            }
            ("POST", "/pair-verify") => {
                let conn = self.connections.get_mut(&connection_id).unwrap();
                let pairing = conn
                    .pairing
                    .get_or_insert_with(|| PairingInProgress::Verify(PairVerify::new(self.crypto, self.storage)));
                let PairingInProgress::Verify(verify) = pairing else {
                    return Response::bad_request("pair-setup in progress").encode();
                };
                let body = verify.handle_request(&request.body);
                if verify.is_verified() {
                    let keys = verify.session_keys();
                    let controller_id = verify.controller_id().to_string();
                    info!("pair-verify succeeded for controller {} on connection {}", controller_id, connection_id);
                    let session = SecureSession::new(self.crypto, keys.a2c, keys.c2a)
                        .with_broadcast_material(keys.shared_secret, keys.controller_ltpk);
                    conn.context.upgrade_to_secure(session, controller_id);
                    conn.pairing = None;
                }
                Response::tlv8(200, "OK", body)
            }
            ("GET", "/accessories") => http::handle_get_accessories(&self.db),
            ("GET", "/characteristics") => http::handle_get_characteristics(&self.db, &request.query),
            ("PUT", "/characteristics") => {
                let id = connection_id;
                let connections = &mut self.connections;
                let db = &mut self.db;
                http::handle_put_characteristics(db, &request.body, |op| match op {
                    http::ConnectionOp::Subscribe { aid, iid, want } => {
                        if let Some(c) = connections.get_mut(&id) {
                            if want {
                                c.context.subscribe(aid, iid);
                            } else {
                                c.context.unsubscribe(aid, iid);
                            }
                        }
                        true
                    }
                    http::ConnectionOp::ValidateTimedWrite { pid } => connections
                        .get_mut(&id)
                        .map(|c| c.context.validate_timed_write(pid, now))
                        .unwrap_or(false),
                })
            }
            ("PUT", "/prepare") => {
                let id = connection_id;
                let connections = &mut self.connections;
                http::handle_prepare(&request.body, |pid, ttl| {
                    if let Some(c) = connections.get_mut(&id) {
                        c.context.prepare_timed_write(pid, ttl, now);
                    }
                })
            }
            ("POST", "/identify") => {
                let paired = PairingStore::is_paired(self.storage).unwrap_or(true);
                let identify = self.config.identify.as_deref();
                http::handle_identify(paired, || {
                    if let Some(cb) = identify {
                        cb();
                    }
                })
            }
            ("POST", "/pairings") => {
                let conn = self.connections.get_mut(&connection_id).unwrap();
                let admin = conn.context.is_admin();
                let requester = conn.context.controller_id().unwrap_or_default().to_string();
                let (response, close) = http::handle_pairings(self.storage, conn.context.is_encrypted(), admin, &requester, &request.body);
                if close {
                    conn.context.request_close();
                }
                response
            }
            _ => Response::bad_request("unknown route"),
        };

        self.frame_response(connection_id, &response.encode())
    }

    /// Encrypts a plaintext HTTP response into IP frames if the connection is secured, else
    /// returns it as-is.
    fn frame_response(&mut self, connection_id: u64, plaintext: &[u8]) -> Vec<u8> {
        let conn = self.connections.get_mut(&connection_id).unwrap();
        match conn.context.session_mut() {
            Some(session) => session.encrypt_ip_frames(plaintext),
            None => plaintext.to_vec(),
        }
    }

    /// Fans an `EVENT` push out to every encrypted connection subscribed to `(aid, iid)`, except
    /// `originating_connection` (§4.6, §2 "Event flow... fans out to subscribed connections").
    ///
    /// Also maintains the GSN (§3): it bumps once per connection on that connection's first
    /// attributable change, and once more if no connection actually received the event (the
    /// Disconnected Event case, §4.7).
    pub fn notify_characteristic_changed(&mut self, aid: u64, iid: u16, originating_connection: Option<u64>) -> HashMap<u64, Vec<u8>> {
        let Some((_, characteristic)) = self.db.find_characteristic(aid, iid) else {
            return HashMap::new();
        };
        let value_json = characteristic.value.to_json();
        let event_body = serde_json::json!({
            "characteristics": [{ "aid": aid, "iid": iid, "value": value_json }]
        });
        let event_bytes = http::encode_event(event_body);

        let mut outbound = HashMap::new();
        for (id, conn) in self.connections.iter_mut() {
            if Some(*id) == originating_connection {
                continue;
            }
            if conn.context.is_subscribed(aid, iid) {
                if let Some(session) = conn.context.session_mut() {
                    outbound.insert(*id, session.encrypt_ip_frames(&event_bytes));
                }
            }
        }

        if let Some(origin) = originating_connection {
            if self.gsn_bumped_connections.insert(origin) {
                self.bump_gsn();
            }
        } else if outbound.is_empty() {
            self.bump_gsn();
        }

        outbound
    }

    /// Current Global State Number, for a host assembling a BLE advertisement (§4.7).
    pub fn gsn(&self) -> u16 {
        self.state_number
    }

    /// Current configuration number, for a host assembling a BLE advertisement (§4.7).
    pub fn config_number(&self) -> u32 {
        self.config_number
    }

    /// Increments the GSN (wrapping 0 to 1, never resting on 0, §3) and persists it.
    fn bump_gsn(&mut self) {
        self.state_number = self.state_number.wrapping_add(1);
        if self.state_number == 0 {
            self.state_number = 1;
        }
        if let Err(e) = self.storage.set(KEY_GSN, &self.state_number.to_le_bytes()) {
            warn!("failed to persist gsn: {}", e);
        }
    }

    /// Drives the cooperative scheduler; call regularly from the host's event loop (§5).
    pub fn tick(&mut self, now: Instant) {
        self.scheduler.tick(now);
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }
}

/// Routing by `&'static str` only needs to distinguish known verbs/paths; anything else falls
/// through to the catch-all arm in [`Server::handle_request`], so an unrecognized method or path
/// is safely mapped to a placeholder rather than leaked for real.
fn leak_method(method: &str) -> &'static str {
    match method {
        "GET" => "GET",
        "PUT" => "PUT",
        "POST" => "POST",
        _ => "OTHER",
    }
}

/// Loads the persisted configuration number, ASCII decimal per §6, defaulting to 1 (matching
/// `IidManager`'s own absent-key-means-fresh-start convention) if never stored.
fn load_config_number(storage: &dyn Storage) -> Result<u32, crate::Error> {
    match storage.get(KEY_CONFIG_NUMBER)? {
        Some(bytes) => {
            let text = String::from_utf8(bytes).map_err(|_| crate::Error::Storage("config_number not utf8".into()))?;
            text.parse().map_err(|_| crate::Error::Storage("config_number not a number".into()))
        }
        None => Ok(1),
    }
}

/// Loads the persisted GSN, 2 bytes little-endian per §6, defaulting to 1 on a factory-reset
/// accessory (§9 Open Question).
fn load_gsn(storage: &dyn Storage) -> Result<u16, crate::Error> {
    match storage.get(KEY_GSN)? {
        Some(bytes) if bytes.len() == 2 => Ok(u16::from_le_bytes([bytes[0], bytes[1]])),
        _ => Ok(1),
    }
}

fn leak_path(path: &str) -> &'static str {
    match path {
        "/pair-setup" => "/pair-setup",
        "/pair-verify" => "/pair-verify",
        "/pairings" => "/pairings",
        "/accessories" => "/accessories",
        "/characteristics" => "/characteristics",
        "/prepare" => "/prepare",
        "/identify" => "/identify",
        _ => "/unknown",
    }
}
