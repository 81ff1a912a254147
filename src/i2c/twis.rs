//! nRF52840 TWIS implementation of the [`BusTarget`] port.

use embassy_nrf::twis::{self, Command, Twis};

use crate::error::BusError;
use crate::i2c::{BusEvent, BusTarget};

/// TWIS peripheral answering at one 7-bit address.
pub struct TwisTarget<'d, T: twis::Instance> {
    twis: Twis<'d, T>,
}

impl<'d, T: twis::Instance> TwisTarget<'d, T> {
    pub fn new(twis: Twis<'d, T>) -> Self {
        Self { twis }
    }
}

impl<T: twis::Instance> BusTarget for TwisTarget<'_, T> {
    async fn listen(&mut self, rx: &mut [u8]) -> Result<BusEvent, BusError> {
        match self.twis.listen(rx).await {
            Ok(Command::Write(n)) => Ok(BusEvent::Write(n)),
            Ok(Command::WriteRead(n)) => Ok(BusEvent::WriteRead(n)),
            Ok(Command::Read) => Ok(BusEvent::Read),
            Err(twis::Error::Overflow) => Err(BusError::Overflow),
            Err(e) => {
                debug!("TWIS listen: {}", e);
                Err(BusError::Listen)
            }
        }
    }

    async fn respond(&mut self, data: &[u8]) -> Result<(), BusError> {
        match self.twis.respond_to_read(data).await {
            Ok(_) => Ok(()),
            // Whole reply sent; the master kept clocking ORC bytes.
            Err(twis::Error::OverRead) => Ok(()),
            Err(e) => {
                debug!("TWIS respond: {}", e);
                Err(BusError::Reply)
            }
        }
    }
}
