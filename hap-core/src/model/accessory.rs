//! An accessory: a 64-bit AID plus an ordered list of services.

use crate::model::service::Service;

pub struct Accessory {
    pub aid: u64,
    pub services: Vec<Service>,
}

impl Accessory {
    pub fn new(aid: u64) -> Self {
        Accessory {
            aid,
            services: Vec::new(),
        }
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    pub fn has_accessory_information(&self) -> bool {
        self.services.iter().any(|s| {
            s.uuid == crate::uuid::Uuid128::from(crate::uuid::Uuid32(
                crate::model::validation::ACCESSORY_INFORMATION_SERVICE_TYPE,
            ))
        })
    }
}
