//! A HAP service: UUID, stable IID, flags, and an ordered list of characteristics.

use crate::model::characteristic::Characteristic;
use crate::uuid::Uuid128;

pub struct Service {
    pub uuid: Uuid128,
    pub iid: u16,
    pub primary: bool,
    pub hidden: bool,
    pub characteristics: Vec<Characteristic>,
    /// IIDs of services this one links to (e.g. a valve linked to an irrigation system).
    pub linked_services: Vec<u16>,
}

impl Service {
    pub fn new(uuid: Uuid128) -> Self {
        Service {
            uuid,
            iid: 0,
            primary: false,
            hidden: false,
            characteristics: Vec::new(),
            linked_services: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}
