//! A [`Network`] implementation over a plain `TcpListener` and `mdns-sd`'s `_hap._tcp` responder.
//!
//! Registration is push-style, matching the trait: each accepted connection gets a dedicated
//! reader thread that calls back into the core via `on_receive`/`on_disconnect`, rather than the
//! core polling sockets itself.

use hap_core::platform::Network;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

pub struct TcpNetwork {
    streams: Arc<Mutex<HashMap<u64, TcpStream>>>,
    next_id: Arc<AtomicU64>,
    mdns: ServiceDaemon,
    device_name: String,
    registered: RwLock<Option<(String, u16)>>,
}

impl TcpNetwork {
    pub fn new(device_name: impl Into<String>) -> std::io::Result<Self> {
        let mdns = ServiceDaemon::new().map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(TcpNetwork {
            streams: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            mdns,
            device_name: device_name.into(),
            registered: RwLock::new(None),
        })
    }

    fn service_info(&self, port: u16, txt: &[(String, String)]) -> ServiceInfo {
        let host_name = format!("{}.local.", sanitize(&self.device_name));
        let properties: HashMap<String, String> = txt.iter().cloned().collect();
        ServiceInfo::new(
            "_hap._tcp.local.",
            &sanitize(&self.device_name),
            &host_name,
            "",
            port,
            Some(properties),
        )
        .expect("well-formed mDNS service parameters")
        .enable_addr_auto()
    }
}

impl Network for TcpNetwork {
    fn tcp_listen(
        &self,
        port: u16,
        on_connect: Box<dyn Fn(u64) + Send + Sync>,
        on_receive: Box<dyn Fn(u64, &[u8]) + Send + Sync>,
        on_disconnect: Box<dyn Fn(u64) + Send + Sync>,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        let streams = self.streams.clone();
        let next_id = self.next_id.clone();
        let on_connect = Arc::from(on_connect);
        let on_receive = Arc::from(on_receive);
        let on_disconnect = Arc::from(on_disconnect);

        thread::spawn(move || {
            for incoming in listener.incoming() {
                let stream = match incoming {
                    Ok(s) => s,
                    Err(e) => {
                        log::warn!("accept failed: {}", e);
                        continue;
                    }
                };
                let id = next_id.fetch_add(1, Ordering::SeqCst);
                let Ok(read_stream) = stream.try_clone() else { continue };
                streams.lock().unwrap().insert(id, stream);
                on_connect(id);

                let streams = streams.clone();
                let on_receive: Arc<dyn Fn(u64, &[u8]) + Send + Sync> = on_receive.clone();
                let on_disconnect: Arc<dyn Fn(u64) + Send + Sync> = on_disconnect.clone();
                let mut read_stream = read_stream;
                thread::spawn(move || {
                    let mut buf = [0u8; 4096];
                    loop {
                        match read_stream.read(&mut buf) {
                            Ok(0) | Err(_) => {
                                streams.lock().unwrap().remove(&id);
                                on_disconnect(id);
                                break;
                            }
                            Ok(n) => on_receive(id, &buf[..n]),
                        }
                    }
                });
            }
        });
        Ok(())
    }

    fn send(&self, connection_id: u64, bytes: &[u8]) -> std::io::Result<()> {
        let mut streams = self.streams.lock().unwrap();
        match streams.get_mut(&connection_id) {
            Some(stream) => stream.write_all(bytes),
            None => Err(std::io::Error::new(std::io::ErrorKind::NotConnected, "unknown connection")),
        }
    }

    fn disconnect(&self, connection_id: u64) {
        if let Some(stream) = self.streams.lock().unwrap().remove(&connection_id) {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    fn mdns_register(&self, _service_type: &str, port: u16, txt: &[(String, String)]) {
        let info = self.service_info(port, txt);
        let fullname = info.get_fullname().to_string();
        match self.mdns.register(info) {
            Ok(()) => *self.registered.write().unwrap() = Some((fullname, port)),
            Err(e) => log::warn!("mDNS registration failed: {}", e),
        }
    }

    /// `mdns-sd` has no in-place TXT update; unregister the old instance and register a fresh one
    /// with the same name and port, matching "On first publication, register; thereafter, update
    /// TXT in place" from the accessory's perspective.
    fn mdns_update_txt(&self, txt: &[(String, String)]) {
        let Some((fullname, port)) = self.registered.read().unwrap().clone() else {
            return;
        };
        let _ = self.mdns.unregister(&fullname);
        self.mdns_register("_hap._tcp.local.", port, txt);
    }
}

/// mDNS instance names can't contain `.`; HAP device names are free-form UTF-8, so collapse
/// anything the responder would choke on.
fn sanitize(name: &str) -> String {
    name.chars().map(|c| if c == '.' { '-' } else { c }).collect()
}
