//! Wire format of the readings register.
//!
//! Each cache entry becomes one fixed-size record:
//!
//! ```text
//! [is_new:1][id:1 (battery only)][payload:payload_len]
//! ```
//!
//! Records are concatenated in snapshot order.  With nothing to report the
//! register returns a single all-zero record, so the master always reads
//! at least `entry_len` bytes.

use crate::cache::{Reading, Snapshot};
use crate::sensor::SensorKind;

/// Serialize `snapshot` into `out`, whole records only.  Returns the number
/// of bytes written.
///
/// Records that do not fit in `out` are left out; the caller can tell how
/// many made it from `written / sensor.entry_len()`.
pub fn encode_readings(sensor: SensorKind, snapshot: &Snapshot, out: &mut [u8]) -> usize {
    let entry_len = sensor.entry_len();

    if snapshot.is_empty() {
        let len = entry_len.min(out.len());
        out[..len].fill(0);
        return len;
    }

    let mut written = 0;
    for entry in snapshot.iter() {
        let Some(record) = out.get_mut(written..written + entry_len) else {
            break;
        };
        encode_entry(sensor, &entry.reading, record);
        written += entry_len;
    }
    written
}

/// Fill one record.  `record` is exactly `sensor.entry_len()` bytes.
fn encode_entry(sensor: SensorKind, reading: &Reading, record: &mut [u8]) {
    record[0] = reading.is_new as u8;
    let body = if sensor.has_id_byte() {
        record[1] = reading.id;
        &mut record[2..]
    } else {
        &mut record[1..]
    };
    body.fill(0);
    let len = reading.payload.len().min(body.len());
    body[..len].copy_from_slice(&reading.payload[..len]);
}
