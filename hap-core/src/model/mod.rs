//! The accessory/service/characteristic attribute database (§3, §4.2).

pub mod accessory;
pub mod characteristic;
pub mod db;
pub mod iid;
pub mod json;
pub mod service;
pub mod validation;

pub use accessory::Accessory;
pub use characteristic::{Characteristic, Format, Permissions, Value};
pub use db::Database;
pub use service::Service;
