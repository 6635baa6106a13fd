//! A single-accessory HomeKit lightbulb, reachable over the IP transport only.
//!
//! Run it, then pair with a real controller using the printed setup code. The lightbulb's `On`
//! characteristic just flips an in-memory bool and logs the change; there's no real hardware here.

use hap_core::config::{AccessoryConfig, Category, TransportConfig};
use hap_core::model::{Accessory, Characteristic, Permissions, Service, Value};
use hap_core::platform::Network;
use hap_core::server::Server;
use hap_core::storage::Storage;
use hap_core::time::Clock;
use hap_core::uuid::{Uuid128, Uuid32};
use hap_std::{FileStorage, StdCrypto, StdSystem, TcpNetwork};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

const ACCESSORY_INFORMATION_SERVICE: u32 = 0x3E;
const IDENTIFY_CHARACTERISTIC: u32 = 0x14;
const MANUFACTURER_CHARACTERISTIC: u32 = 0x20;
const MODEL_CHARACTERISTIC: u32 = 0x21;
const NAME_CHARACTERISTIC: u32 = 0x23;
const SERIAL_NUMBER_CHARACTERISTIC: u32 = 0x30;
const FIRMWARE_REVISION_CHARACTERISTIC: u32 = 0x52;

const LIGHTBULB_SERVICE: u32 = 0x43;
const ON_CHARACTERISTIC: u32 = 0x25;

const PORT: u16 = 51826;

fn main() {
    env_logger::init();

    let storage: &'static FileStorage =
        Box::leak(Box::new(FileStorage::open("linux-accessory.json").expect("open storage file")));
    let crypto: &'static StdCrypto = Box::leak(Box::new(StdCrypto));
    let network: &'static TcpNetwork = Box::leak(Box::new(TcpNetwork::new("Lamp").expect("bind mDNS responder")));
    let clock = Arc::new(StdSystem::new());

    storage
        .set("accessory_id", b"11:22:33:44:55:66")
        .expect("seed accessory id");

    let config = AccessoryConfig {
        accessory_id: [0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
        setup_code: "123-45-678".into(),
        setup_id: *b"ABCD",
        device_name: "Lamp".into(),
        model: "Lamp1,1".into(),
        category: Category::LIGHTBULB,
        transport: TransportConfig::Ip { port: PORT },
        identify: Some(Box::new(|| log::info!("identify requested"))),
    };

    let mut server = Server::new(config, storage, crypto, network).expect("construct server");
    server.register_accessory(lightbulb_accessory()).expect("register lightbulb");
    server.refresh_mdns(PORT).expect("publish mDNS");

    let server = Arc::new(Mutex::new(server));

    let connect_server = server.clone();
    let on_connect = Box::new(move |id: u64| {
        connect_server.lock().unwrap().on_tcp_connect(id);
    });

    let receive_server = server.clone();
    let receive_clock = clock.clone();
    let on_receive = Box::new(move |id: u64, bytes: &[u8]| {
        let now = receive_clock.now();
        let response = receive_server.lock().unwrap().on_tcp_receive(id, now, bytes);
        if !response.is_empty() {
            let _ = network.send(id, &response);
        }
    });

    let disconnect_server = server.clone();
    let on_disconnect = Box::new(move |id: u64| {
        disconnect_server.lock().unwrap().on_tcp_disconnect(id);
    });

    network
        .tcp_listen(PORT, on_connect, on_receive, on_disconnect)
        .expect("listen on HAP port");

    log::info!("Lamp listening on port {}, setup code 123-45-678", PORT);

    loop {
        std::thread::sleep(StdDuration::from_millis(50));
        server.lock().unwrap().tick(clock.now());
    }
}

fn lightbulb_accessory() -> Accessory {
    Accessory::new(1)
        .with_service(
            Service::new(Uuid128::from(Uuid32(ACCESSORY_INFORMATION_SERVICE)))
                .primary(false)
                .with_characteristic(Characteristic::new(
                    Uuid128::from(Uuid32(IDENTIFY_CHARACTERISTIC)),
                    Permissions::PAIRED_WRITE,
                    Value::Bool(false),
                ))
                .with_characteristic(Characteristic::new(
                    Uuid128::from(Uuid32(MANUFACTURER_CHARACTERISTIC)),
                    Permissions::PAIRED_READ,
                    Value::String("Acme".into()),
                ))
                .with_characteristic(Characteristic::new(
                    Uuid128::from(Uuid32(MODEL_CHARACTERISTIC)),
                    Permissions::PAIRED_READ,
                    Value::String("Lamp1,1".into()),
                ))
                .with_characteristic(Characteristic::new(
                    Uuid128::from(Uuid32(NAME_CHARACTERISTIC)),
                    Permissions::PAIRED_READ,
                    Value::String("Lamp".into()),
                ))
                .with_characteristic(Characteristic::new(
                    Uuid128::from(Uuid32(SERIAL_NUMBER_CHARACTERISTIC)),
                    Permissions::PAIRED_READ,
                    Value::String("0001".into()),
                ))
                .with_characteristic(Characteristic::new(
                    Uuid128::from(Uuid32(FIRMWARE_REVISION_CHARACTERISTIC)),
                    Permissions::PAIRED_READ,
                    Value::String("1.0.0".into()),
                )),
        )
        .with_service(
            Service::new(Uuid128::from(Uuid32(LIGHTBULB_SERVICE)))
                .primary(true)
                .with_characteristic(on_characteristic()),
        )
}

fn on_characteristic() -> Characteristic {
    let mut characteristic = Characteristic::new(
        Uuid128::from(Uuid32(ON_CHARACTERISTIC)),
        Permissions::PAIRED_READ | Permissions::PAIRED_WRITE | Permissions::NOTIFY,
        Value::Bool(false),
    );
    characteristic.on_write = Some(Box::new(|value| {
        log::info!("lightbulb On set to {:?}", value);
        Ok(())
    }));
    characteristic
}
