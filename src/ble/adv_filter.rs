//! Advertising payload inspection.

use heapless::String;

/// Offset of the 128-bit service UUID in a sensor node's advertising
/// payload: a 3-byte Flags AD structure, then the 2-byte header of the
/// "Complete List of 128-bit Service UUIDs" AD structure.
pub const SIGNATURE_OFFSET: usize = 5;

/// Length of the service signature.
pub const SIGNATURE_LEN: usize = 16;

/// Check whether the advertising payload carries `filter` at the fixed
/// signature offset (exact 16-byte comparison).
pub fn matches_service_signature(data: &[u8], filter: &[u8; SIGNATURE_LEN]) -> bool {
    data.get(SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE_LEN)
        .is_some_and(|signature| signature == filter)
}

/// AD type of the shortened and the complete local name.
const AD_SHORT_NAME: u8 = 0x08;
const AD_COMPLETE_NAME: u8 = 0x09;

/// Iterate the `(ad_type, value)` structures of an advertising payload,
/// stopping at the first zero-length or truncated one.
fn ad_structures(mut data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    core::iter::from_fn(move || {
        let (&len, rest) = data.split_first()?;
        let len = len as usize;
        if len == 0 || len > rest.len() {
            return None;
        }
        let (structure, tail) = rest.split_at(len);
        data = tail;
        Some((structure[0], &structure[1..]))
    })
}

/// Local name of the advertiser, or `"Unknown"`.  Clipped to 32 chars.
pub fn extract_device_name(data: &[u8]) -> String<32> {
    let mut name = String::new();
    match ad_structures(data).find(|(ad_type, _)| matches!(*ad_type, AD_SHORT_NAME | AD_COMPLETE_NAME)) {
        Some((_, value)) => {
            for &b in value.iter().take(32) {
                let _ = name.push(b as char);
            }
        }
        None => {
            let _ = name.push_str("Unknown");
        }
    }
    name
}
