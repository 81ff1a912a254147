//! Register-file state machine behind the I2C target.
//!
//! ```text
//!          write [reg, data..]            read
//!   IDLE ───────────────────────▶ SELECTED(reg) ──▶ reply(reg)
//!     │                                 ▲
//!     └── read ──▶ zero-filled reply    └── next write re-selects
//! ```
//!
//! Replies are built synchronously from a cache snapshot.  `is_new` flags
//! are cleared only after the driver accepted the reply, and only for the
//! entries that were actually sent.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::cache::{ReadingsCache, Snapshot};
use crate::config::{BUS_RX_LEN, MAX_REPLY_LEN, UNKNOWN_REGISTER_REPLY_LEN};
use crate::error::BusError;
use crate::i2c::encode::encode_readings;
use crate::i2c::{default_registers, BusEvent, BusTarget, RegisterKind, RegisterMap};
use crate::sensor::SensorKind;

/// A prepared reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    /// Bytes written to the output buffer.
    pub len: usize,
    /// Readings included in the reply, to be marked as reported.
    pub reported: Option<Snapshot>,
}

/// I2C register file.
pub struct TargetBridge {
    sensor: SensorKind,
    registers: RegisterMap,
    /// `None` until the master selects a register.
    last_register: Option<u8>,
}

impl TargetBridge {
    /// Bridge with the standard register map.
    pub fn new(sensor: SensorKind) -> Self {
        Self::with_registers(sensor, default_registers())
    }

    pub fn with_registers(sensor: SensorKind, registers: RegisterMap) -> Self {
        Self {
            sensor,
            registers,
            last_register: None,
        }
    }

    pub fn last_register(&self) -> Option<u8> {
        self.last_register
    }

    /// Handle bytes written by the master.  The first byte selects the
    /// register; the rest go to its write handler.
    pub fn on_write(&mut self, data: &[u8]) {
        let Some((&register, rest)) = data.split_first() else {
            return;
        };
        self.last_register = Some(register);
        match self.registers.get(&register) {
            Some(reg) if !rest.is_empty() => {
                if let Some(handler) = reg.on_write {
                    handler(rest);
                }
            }
            Some(_) => {}
            None => debug!("Write to unknown register {=u8:#x}", register),
        }
    }

    /// Build the reply to a read of the selected register into `out`.
    pub fn reply<M: RawMutex>(&self, cache: &ReadingsCache<M>, out: &mut [u8]) -> Reply {
        let register = self
            .last_register
            .and_then(|address| self.registers.get(&address));

        match register.map(|reg| reg.kind) {
            Some(RegisterKind::Fixed(data)) => {
                let len = data.len().min(out.len());
                out[..len].copy_from_slice(&data[..len]);
                Reply {
                    len,
                    reported: None,
                }
            }
            Some(RegisterKind::Readings) => self.readings_reply(cache, out),
            Some(RegisterKind::WriteOnly) | None => {
                let len = UNKNOWN_REGISTER_REPLY_LEN.min(out.len());
                out[..len].fill(0);
                Reply {
                    len,
                    reported: None,
                }
            }
        }
    }

    /// The reply was handed to the bus driver: mark its readings reported.
    pub fn complete<M: RawMutex>(&self, cache: &ReadingsCache<M>, reply: &Reply) {
        if let Some(snapshot) = &reply.reported {
            cache.mark_reported(snapshot);
        }
    }

    /// Handle one bus transaction.
    pub async fn step<T, M>(
        &mut self,
        target: &mut T,
        cache: &ReadingsCache<M>,
        rx: &mut [u8],
        out: &mut [u8],
    ) -> Result<BusEvent, BusError>
    where
        T: BusTarget,
        M: RawMutex,
    {
        let event = target.listen(rx).await?;
        let wants_reply = match event {
            BusEvent::Write(n) => {
                self.on_write(&rx[..n.min(rx.len())]);
                false
            }
            BusEvent::WriteRead(n) => {
                self.on_write(&rx[..n.min(rx.len())]);
                true
            }
            BusEvent::Read => true,
        };

        if wants_reply {
            let reply = self.reply(cache, out);
            target.respond(&out[..reply.len]).await?;
            self.complete(cache, &reply);
        }
        Ok(event)
    }

    /// Serve the bus forever.  Driver errors are logged and the next
    /// transaction is awaited.
    pub async fn serve<T, M>(&mut self, target: &mut T, cache: &ReadingsCache<M>) -> !
    where
        T: BusTarget,
        M: RawMutex,
    {
        let mut rx = [0u8; BUS_RX_LEN];
        let mut out = [0u8; MAX_REPLY_LEN];
        info!("I2C target serving {} readings", self.sensor.name());
        loop {
            match self.step(target, cache, &mut rx, &mut out).await {
                Ok(event) => trace!("I2C {}", event),
                Err(e) => warn!("I2C transaction failed: {}", e),
            }
        }
    }

    fn readings_reply<M: RawMutex>(&self, cache: &ReadingsCache<M>, out: &mut [u8]) -> Reply {
        let mut snapshot = cache.get_snapshot();
        let len = encode_readings(self.sensor, &snapshot, out);
        if snapshot.is_empty() {
            return Reply {
                len,
                reported: None,
            };
        }
        let included = len / self.sensor.entry_len();
        if included < snapshot.len() {
            warn!(
                "Reply buffer holds {} of {} readings",
                included,
                snapshot.len()
            );
        }
        snapshot.truncate(included);
        Reply {
            len,
            reported: Some(snapshot),
        }
    }
}
