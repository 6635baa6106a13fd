//! HAP service/characteristic UUIDs.
//!
//! HAP assigns 32-bit aliases to all of Apple's built-in service and characteristic types. They
//! are transmitted in JSON as bare hex strings with leading zeros stripped (e.g. `"3E"` for the
//! Accessory Information service), and can be expanded to their full 128-bit form by placing them
//! in the first 4 bytes of the HAP Base UUID, `00000000-0000-1000-8000-0026BB765291`.
//!
//! Custom (vendor) UUIDs are full 128-bit values and round-trip through JSON as the standard
//! dashed, lowercase string form.

use crate::bytes::*;
use crate::Error;
use std::fmt;

const BASE_UUID: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x26, 0xBB, 0x76, 0x52, 0x91,
];

/// A 32-bit HAP UUID alias (Apple-defined service/characteristic type).
#[derive(PartialEq, Eq, Copy, Clone, Hash)]
pub struct Uuid32(pub u32);

/// A full 128-bit UUID, either a HAP alias expanded against the base UUID or a custom vendor UUID.
#[derive(PartialEq, Eq, Copy, Clone, Hash)]
pub struct Uuid128([u8; 16]);

impl Uuid128 {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// True if `self` is a HAP short-form UUID, i.e. it matches the base UUID past the first 4
    /// bytes. Such UUIDs serialize as a bare hex string rather than the full dashed form.
    pub fn is_short_form(&self) -> bool {
        self.0[4..] == BASE_UUID[4..]
    }

    /// Returns the 32-bit alias if this is a short-form UUID.
    pub fn as_short(&self) -> Option<u32> {
        if self.is_short_form() {
            Some(u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]))
        } else {
            None
        }
    }

    /// Parses either a bare hex alias (`"3E"`, `"43"`) or a full dashed UUID string, as used in
    /// HAP's JSON `"type"` fields.
    pub fn parse(s: &str) -> Result<Self, Error> {
        if s.len() <= 8 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            let value = u32::from_str_radix(s, 16).map_err(|_| Error::InvalidValue)?;
            return Ok(Uuid32(value).into());
        }
        Self::parse_dashed(s)
    }

    fn parse_dashed(s: &str) -> Result<Self, Error> {
        let s = s.replace('-', "");
        if s.len() != 32 {
            return Err(Error::InvalidValue);
        }
        let mut bytes = [0u8; 16];
        for (i, chunk) in bytes.iter_mut().enumerate() {
            let byte_str = &s[i * 2..i * 2 + 2];
            *chunk = u8::from_str_radix(byte_str, 16).map_err(|_| Error::InvalidValue)?;
        }
        Ok(Uuid128(bytes))
    }

    /// Renders in the representation HAP expects in JSON: a bare uppercase hex alias for short-form
    /// UUIDs, or the full lowercase dashed form otherwise.
    pub fn to_hap_string(&self) -> String {
        match self.as_short() {
            Some(alias) => format!("{:X}", alias),
            None => format!("{:?}", self),
        }
    }

    /// Parses a UUID string literal, panicking on malformed input. Meant for `const` contexts.
    pub const fn parse_static(s: &'static str) -> Self {
        const fn parse_nibble(nibble: u8) -> u8 {
            let hex_digit_out_of_range = 1;
            match nibble {
                b'0'..=b'9' => nibble - b'0',
                b'a'..=b'f' => nibble - b'a' + 10,
                b'A'..=b'F' => nibble - b'A' + 10,
                _ => [0][hex_digit_out_of_range],
            }
        }

        let expected_dash = 1;
        let unexpected_trailing_data = 1;

        let mut index = 0;
        let mut bytes = [0; 16];

        macro_rules! eat_byte {
            ($s:ident[$i:ident..]) => {{
                let hi = parse_nibble($s.as_bytes()[$i]);
                $i += 1;
                let lo = parse_nibble($s.as_bytes()[$i]);
                $i += 1;
                (hi << 4) | lo
            }};
        }

        macro_rules! eat_dash {
            ($s:ident[$i:ident..]) => {{
                match $s.as_bytes()[$i] {
                    b'-' => {}
                    _ => [()][expected_dash],
                }
                $i += 1;
            }};
        }

        bytes[0] = eat_byte!(s[index..]);
        bytes[1] = eat_byte!(s[index..]);
        bytes[2] = eat_byte!(s[index..]);
        bytes[3] = eat_byte!(s[index..]);
        eat_dash!(s[index..]);
        bytes[4] = eat_byte!(s[index..]);
        bytes[5] = eat_byte!(s[index..]);
        eat_dash!(s[index..]);
        bytes[6] = eat_byte!(s[index..]);
        bytes[7] = eat_byte!(s[index..]);
        eat_dash!(s[index..]);
        bytes[8] = eat_byte!(s[index..]);
        bytes[9] = eat_byte!(s[index..]);
        eat_dash!(s[index..]);
        bytes[10] = eat_byte!(s[index..]);
        bytes[11] = eat_byte!(s[index..]);
        bytes[12] = eat_byte!(s[index..]);
        bytes[13] = eat_byte!(s[index..]);
        bytes[14] = eat_byte!(s[index..]);
        bytes[15] = eat_byte!(s[index..]);

        if s.len() > index {
            [()][unexpected_trailing_data];
        }

        Uuid128(bytes)
    }
}

impl From<Uuid32> for Uuid128 {
    fn from(uuid: Uuid32) -> Self {
        let mut buf = BASE_UUID;
        buf[..4].copy_from_slice(&uuid.0.to_be_bytes());
        Uuid128(buf)
    }
}

impl ToBytes for Uuid128 {
    fn to_bytes(&self, buffer: &mut ByteWriter<'_>) -> Result<(), Error> {
        buffer.write_slice(&self.0)
    }
}

impl FromBytes<'_> for Uuid128 {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        let array = bytes.read_array()?;
        Ok(Uuid128(array))
    }
}

impl fmt::Debug for Uuid32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uuid32({:08x})", self.0)
    }
}

impl fmt::Debug for Uuid128 {
    #[allow(clippy::many_single_char_names)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [b0, b1, b2, b3, b4, b5, b6, b7, b8, b9, b10, b11, b12, b13, b14, b15] = self.0;
        let a = u32::from_be_bytes([b0, b1, b2, b3]);
        let b = u16::from_be_bytes([b4, b5]);
        let c = u16::from_be_bytes([b6, b7]);
        let d = u16::from_be_bytes([b8, b9]);
        let e = u64::from_be_bytes([0, 0, b10, b11, b12, b13, b14, b15]);
        write!(f, "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}", a, b, c, d, e)
    }
}

impl serde::Serialize for Uuid128 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hap_string())
    }
}

impl<'de> serde::Deserialize<'de> for Uuid128 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Uuid128::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_round_trips() {
        let uuid = Uuid128::from(Uuid32(0x3E));
        assert_eq!(uuid.as_short(), Some(0x3E));
        assert_eq!(uuid.to_hap_string(), "3E");
    }

    #[test]
    fn parse_short_and_full() {
        let short = Uuid128::parse("3E").unwrap();
        assert_eq!(short, Uuid128::from(Uuid32(0x3E)));

        let full = Uuid128::parse("12345678-1234-1234-1234-123456789abc").unwrap();
        assert_eq!(full.as_short(), None);
        assert_eq!(
            format!("{:?}", full),
            "12345678-1234-1234-1234-123456789abc"
        );
    }

    #[test]
    fn base_uuid_matches_hap() {
        let uuid = Uuid128::parse_static("00000000-0000-1000-8000-0026bb765291");
        assert_eq!(uuid, Uuid128::from(Uuid32(0)));
    }
}
