//! Sensor poller.
//!
//! Once per tick, reads the sensor characteristic of every active node and
//! stores the result in the readings cache.  A failed read only skips
//! that node for the tick; it never deactivates it.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::ble::GattLink;
use crate::cache::Reading;
use crate::config::GATT_READ_MAX;
use crate::context::BridgeContext;

/// Outcome of one polling tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollStats {
    /// Active nodes read this tick.
    pub polled: usize,
    /// Cache entries written.
    pub updated: usize,
    /// Samples stored with a length mismatch.
    pub suspect: usize,
    /// Reads that failed at the transport level.
    pub failed: usize,
}

/// Poll every active node once.
///
/// The target list is copied out of the directory first; no lock is held
/// while a read is in flight.
pub async fn poll_once<M, L>(ctx: &BridgeContext<M, L>, now_ms: u64) -> PollStats
where
    M: RawMutex,
    L: GattLink,
{
    let mut stats = PollStats::default();

    for target in ctx.directory.active_targets() {
        stats.polled += 1;

        let mut buf = [0u8; GATT_READ_MAX];
        let len = match target.link.read(target.handle, &mut buf).await {
            Ok(len) => len.min(buf.len()),
            Err(e) => {
                let failures = ctx.directory.record_read_failure(&target.address);
                warn!(
                    "Read from {} failed: {} ({} so far)",
                    target.address, e, failures
                );
                stats.failed += 1;
                continue;
            }
        };

        let reading = Reading::from_sample(ctx.sensor, target.id, &buf[..len], now_ms);
        if reading.suspect {
            warn!(
                "{} sent {} bytes, expected {}",
                target.address,
                len,
                ctx.sensor.payload_len()
            );
            stats.suspect += 1;
        }
        trace!("{} -> {=[u8]}", target.address, reading.payload.as_slice());

        match ctx.cache.set(target.address, reading) {
            Ok(()) => stats.updated += 1,
            Err(e) => warn!("Cache rejected {}: {}", target.address, e),
        }
    }

    stats
}

/// Poll forever at `POLL_INTERVAL_MS`.
///
/// [`GattLink::read`] carries no timeout of its own: a read that never
/// completes stalls this tick, and every later one, until the link
/// returns.  Bounding it is the link implementation's job.
#[cfg(feature = "embedded")]
pub async fn run<M, L>(ctx: &BridgeContext<M, L>) -> !
where
    M: RawMutex,
    L: GattLink,
{
    use embassy_time::{Duration, Instant, Ticker};

    use crate::config::POLL_INTERVAL_MS;

    info!("Poller started ({} ms period)", POLL_INTERVAL_MS);
    let mut ticker = Ticker::every(Duration::from_millis(POLL_INTERVAL_MS));
    loop {
        let stats = poll_once(ctx, Instant::now().as_millis()).await;
        debug!("Poll: {}", stats);
        ticker.next().await;
    }
}
