//! BLE manufacturer-data advertisement payload and the fast/slow cadence that follows a
//! characteristic-change event (§4.7 "Advertising").

use crate::pairing::crypto::Crypto;
use crate::time::{Duration, Instant};

pub const FAST_INTERVAL_MS: u64 = 20;
pub const SLOW_INTERVAL_MS: u64 = 1000;
pub const FAST_DURATION_MS: u64 = 3000;

/// `StatusFlags` bit 0: set while the accessory has no completed pairing (§4.7).
pub const STATUS_FLAG_UNPAIRED: u8 = 0x01;

/// Builds the manufacturer-specific advertisement payload: `Type=0x06 | STL=0x31 | StatusFlags |
/// DeviceID(6) | ACID(u16 LE) | GSN(u16 LE) | CN(u8) | CV=0x02 | SetupHash(4)`.
pub fn manufacturer_data(
    crypto: &dyn Crypto,
    device_id: [u8; 6],
    setup_id: &[u8; 4],
    category_id: u16,
    gsn: u16,
    config_number: u8,
    paired: bool,
) -> Vec<u8> {
    let status_flags = if paired { 0x00 } else { STATUS_FLAG_UNPAIRED };
    let setup_hash = setup_hash(crypto, setup_id, &device_id);

    let mut out = Vec::with_capacity(2 + 0x31);
    out.push(0x06);
    out.push(0x31);
    out.push(status_flags);
    out.extend_from_slice(&device_id);
    out.extend_from_slice(&category_id.to_le_bytes());
    out.extend_from_slice(&gsn.to_le_bytes());
    out.push(config_number);
    out.push(0x02);
    out.extend_from_slice(&setup_hash);
    out
}

/// First 4 bytes of `SHA-512(SetupID ‖ DeviceID)`.
pub fn setup_hash(crypto: &dyn Crypto, setup_id: &[u8; 4], device_id: &[u8; 6]) -> [u8; 4] {
    let mut input = Vec::with_capacity(10);
    input.extend_from_slice(setup_id);
    input.extend_from_slice(device_id);
    let digest = crypto.sha512(&input);
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Encrypts the 12-byte broadcast event payload `GSN(u16) ‖ IID(u16) ‖ Value(8, zero-padded)` and
/// returns the ciphertext with only the first 4 tag bytes kept, per the broadcast advertisement
/// format (§4.7 "Broadcasted Event").
pub fn encrypt_broadcast_event(
    crypto: &dyn Crypto,
    broadcast_key: &[u8; 32],
    device_id: &[u8; 6],
    gsn: u16,
    iid: u16,
    value: &[u8],
) -> Vec<u8> {
    let mut plaintext = Vec::with_capacity(12);
    plaintext.extend_from_slice(&gsn.to_le_bytes());
    plaintext.extend_from_slice(&iid.to_le_bytes());
    let mut padded_value = [0u8; 8];
    let n = value.len().min(8);
    padded_value[..n].copy_from_slice(&value[..n]);
    plaintext.extend_from_slice(&padded_value);

    let mut nonce = [0u8; 12];
    nonce[..2].copy_from_slice(&gsn.to_le_bytes());

    let sealed = crypto.chacha20_poly1305_encrypt(broadcast_key, &nonce, device_id, &plaintext);
    let (ciphertext, tag) = sealed.split_at(12);
    let mut out = ciphertext.to_vec();
    out.extend_from_slice(&tag[..4]);
    out
}

/// A broadcast key expires after this many GSN increments since it was issued (§4.7).
pub const BROADCAST_KEY_MAX_GSN_DELTA: u16 = 32_767;

pub struct BroadcastKeyState {
    pub key: [u8; 32],
    pub issued_at_gsn: u16,
}

impl BroadcastKeyState {
    pub fn is_expired(&self, current_gsn: u16) -> bool {
        current_gsn.wrapping_sub(self.issued_at_gsn) > BROADCAST_KEY_MAX_GSN_DELTA
    }
}

/// Tracks the fast-then-slow advertising cadence triggered by a characteristic-change event: 3
/// seconds at the fast interval, then reverting to the slow interval indefinitely (§4.7).
pub struct AdvertisingCadence {
    fast_until: Option<Instant>,
}

impl AdvertisingCadence {
    pub fn new() -> Self {
        AdvertisingCadence { fast_until: None }
    }

    /// Call when a characteristic change bumps the GSN; restarts the fast window.
    pub fn trigger(&mut self, now: Instant) {
        self.fast_until = Some(now + Duration::from_millis(FAST_DURATION_MS));
    }

    pub fn current_interval_ms(&self, now: Instant) -> u64 {
        match self.fast_until {
            Some(until) if now < until => FAST_INTERVAL_MS,
            _ => SLOW_INTERVAL_MS,
        }
    }
}

impl Default for AdvertisingCadence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::crypto::tests_support::NullCrypto;

    #[test]
    fn manufacturer_data_has_expected_length_and_header() {
        let crypto = NullCrypto;
        let data = manufacturer_data(&crypto, [1, 2, 3, 4, 5, 6], b"ABCD", 5, 1, 1, false);
        assert_eq!(data.len(), 2 + 0x31);
        assert_eq!(data[0], 0x06);
        assert_eq!(data[1], 0x31);
        assert_eq!(data[2], STATUS_FLAG_UNPAIRED);
        assert_eq!(&data[3..9], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn paired_clears_status_flag() {
        let crypto = NullCrypto;
        let data = manufacturer_data(&crypto, [0; 6], b"ABCD", 1, 0, 0, true);
        assert_eq!(data[2], 0x00);
    }

    #[test]
    fn cadence_reverts_to_slow_after_fast_window() {
        let mut cadence = AdvertisingCadence::new();
        let t0 = Instant::from_raw_millis(0);
        assert_eq!(cadence.current_interval_ms(t0), SLOW_INTERVAL_MS);
        cadence.trigger(t0);
        assert_eq!(cadence.current_interval_ms(t0 + Duration::from_millis(100)), FAST_INTERVAL_MS);
        assert_eq!(
            cadence.current_interval_ms(t0 + Duration::from_millis(FAST_DURATION_MS + 1)),
            SLOW_INTERVAL_MS
        );
    }

    #[test]
    fn broadcast_key_expires_after_max_delta() {
        let state = BroadcastKeyState {
            key: [0; 32],
            issued_at_gsn: 10,
        };
        assert!(!state.is_expired(10 + BROADCAST_KEY_MAX_GSN_DELTA));
        assert!(state.is_expired(10 + BROADCAST_KEY_MAX_GSN_DELTA + 1));
    }
}
