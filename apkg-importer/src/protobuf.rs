//! Minimal protobuf wire-format reader.
//!
//! Anki 2.1.50+ stores notetype configs, template configs and the media
//! manifest as protobuf messages. Only the handful of scalar and
//! length-delimited fields the importer needs are read; everything else is
//! skipped by wire type.

/// A decoded field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

/// Read a base-128 varint starting at `*pos`, advancing it
fn read_varint(data: &[u8], pos: &mut usize) -> Option<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;

    while *pos < data.len() {
        let byte = data[*pos];
        *pos += 1;

        if shift >= 64 {
            return None;
        }
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
        shift += 7;
    }

    None
}

/// Decode the top-level fields of a message.
///
/// Stops at the first malformed field and returns what was read so far.
pub fn fields(data: &[u8]) -> Vec<(u64, WireValue<'_>)> {
    let mut out = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let Some(tag) = read_varint(data, &mut i) else {
            break;
        };
        let number = tag >> 3;

        let value = match tag & 0x07 {
            0 => match read_varint(data, &mut i) {
                Some(v) => WireValue::Varint(v),
                None => break,
            },
            1 => {
                let Some(bytes) = data.get(i..i + 8) else {
                    break;
                };
                i += 8;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                WireValue::Fixed64(u64::from_le_bytes(buf))
            }
            2 => {
                let Some(len) = read_varint(data, &mut i) else {
                    break;
                };
                let Some(end) = i.checked_add(len as usize) else {
                    break;
                };
                let Some(bytes) = data.get(i..end) else {
                    break;
                };
                i = end;
                WireValue::Bytes(bytes)
            }
            5 => {
                let Some(bytes) = data.get(i..i + 4) else {
                    break;
                };
                i += 4;
                let mut buf = [0u8; 4];
                buf.copy_from_slice(bytes);
                WireValue::Fixed32(u32::from_le_bytes(buf))
            }
            // Groups (3, 4) are not used by Anki
            _ => break,
        };

        out.push((number, value));
    }

    out
}

/// First varint value of field `number`
pub fn varint_field(data: &[u8], number: u64) -> Option<u64> {
    fields(data).into_iter().find_map(|(n, v)| match v {
        WireValue::Varint(x) if n == number => Some(x),
        _ => None,
    })
}

/// First UTF-8 string value of field `number`
pub fn string_field(data: &[u8], number: u64) -> Option<String> {
    fields(data).into_iter().find_map(|(n, v)| match v {
        WireValue::Bytes(b) if n == number => String::from_utf8(b.to_vec()).ok(),
        _ => None,
    })
}

/// All length-delimited values of a repeated field `number`, in order
pub fn repeated_bytes(data: &[u8], number: u64) -> Vec<&[u8]> {
    fields(data)
        .into_iter()
        .filter_map(|(n, v)| match v {
            WireValue::Bytes(b) if n == number => Some(b),
            _ => None,
        })
        .collect()
}
