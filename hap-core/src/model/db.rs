//! The attribute database: an ordered list of accessories, with stable IID assignment and
//! `(aid, iid)` lookup.
//!
//! Entities are owned directly in the `Vec<Accessory>` tree (accessories own services own
//! characteristics) rather than through shared pointers, per the arena-and-handle strategy in the
//! design notes: the handle here is simply `(aid, iid)`, resolved by a linear walk. That's
//! adequate at the database sizes this spec allows (150 accessories × 100 services × 100
//! characteristics, and in practice far smaller).

use crate::model::accessory::Accessory;
use crate::model::iid::{characteristic_key, service_key, IidManager};
use crate::model::validation::{
    ValidationError, MAX_ACCESSORIES_PER_BRIDGE, MAX_CHARACTERISTICS_PER_SERVICE,
    MAX_SERVICES_PER_ACCESSORY,
};
use crate::storage::Storage;
use crate::Error;

pub struct Database {
    pub accessories: Vec<Accessory>,
    iid_manager: IidManager,
}

impl Database {
    pub fn load(storage: &dyn Storage) -> Result<Self, Error> {
        Ok(Database {
            accessories: Vec::new(),
            iid_manager: IidManager::load(storage)?,
        })
    }

    /// Registers an accessory, assigning stable IIDs to every service and characteristic and
    /// validating size limits and AID uniqueness. Returns the structural keys touched, so the
    /// caller can fold them into a database hash.
    pub fn register(&mut self, mut accessory: Accessory) -> Result<Vec<String>, ValidationError> {
        if self.accessories.len() >= MAX_ACCESSORIES_PER_BRIDGE {
            return Err(ValidationError::TooManyAccessories);
        }
        if self.accessories.iter().any(|a| a.aid == accessory.aid) {
            return Err(ValidationError::DuplicateAccessoryId);
        }
        if !accessory.has_accessory_information() {
            return Err(ValidationError::MissingAccessoryInformation);
        }
        if accessory.services.len() > MAX_SERVICES_PER_ACCESSORY {
            return Err(ValidationError::TooManyServices);
        }
        for service in &accessory.services {
            if service.characteristics.len() > MAX_CHARACTERISTICS_PER_SERVICE {
                return Err(ValidationError::TooManyCharacteristics);
            }
        }

        let mut keys = Vec::new();
        for service in &mut accessory.services {
            let skey = service_key(service.uuid, accessory.aid);
            service.iid = self.iid_manager.get_or_assign(&skey);
            keys.push(skey.clone());
            for characteristic in &mut service.characteristics {
                let ckey = characteristic_key(characteristic.uuid, service.uuid, accessory.aid);
                characteristic.iid = self.iid_manager.get_or_assign(&ckey);
                keys.push(ckey);
            }
        }

        self.accessories.push(accessory);
        Ok(keys)
    }

    pub fn save_iid_state(&mut self, storage: &dyn Storage) -> Result<(), Error> {
        self.iid_manager.save(storage)
    }

    pub fn iid_manager(&self) -> &IidManager {
        &self.iid_manager
    }

    pub fn find_accessory(&self, aid: u64) -> Option<&Accessory> {
        self.accessories.iter().find(|a| a.aid == aid)
    }

    pub fn find_accessory_mut(&mut self, aid: u64) -> Option<&mut Accessory> {
        self.accessories.iter_mut().find(|a| a.aid == aid)
    }

    pub fn find_characteristic(
        &self,
        aid: u64,
        iid: u16,
    ) -> Option<(&crate::model::service::Service, &crate::model::characteristic::Characteristic)> {
        let accessory = self.find_accessory(aid)?;
        for service in &accessory.services {
            if let Some(c) = service.characteristics.iter().find(|c| c.iid == iid) {
                return Some((service, c));
            }
        }
        None
    }

    pub fn find_characteristic_mut(
        &mut self,
        aid: u64,
        iid: u16,
    ) -> Option<&mut crate::model::characteristic::Characteristic> {
        let accessory = self.find_accessory_mut(aid)?;
        for service in &mut accessory.services {
            if let Some(c) = service.characteristics.iter_mut().find(|c| c.iid == iid) {
                return Some(c);
            }
        }
        None
    }

    pub fn find_service(&self, aid: u64, iid: u16) -> Option<&crate::model::service::Service> {
        self.find_accessory(aid)?
            .services
            .iter()
            .find(|s| s.iid == iid)
    }
}
