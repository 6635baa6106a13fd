//! Wall-clock [`Clock`]/[`System`] implementation, relative to process start.

use hap_core::time::{Clock, Instant};
use hap_core::platform::System;
use rand_core::{OsRng, RngCore};
use std::time::Instant as StdInstant;

pub struct StdSystem {
    start: StdInstant,
}

impl StdSystem {
    pub fn new() -> Self {
        StdSystem { start: StdInstant::now() }
    }
}

impl Default for StdSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdSystem {
    fn now(&self) -> Instant {
        Instant::from_raw_millis(self.start.elapsed().as_millis() as u64)
    }
}

impl System for StdSystem {
    fn random_bytes(&self, out: &mut [u8]) {
        OsRng.fill_bytes(out);
    }
}
