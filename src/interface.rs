//! Register-level transport used by the driver.
//!
//! The device only knows "read N bytes starting at register R" and "write
//! these bytes starting at register R". [`I2cInterface`] and [`SpiInterface`]
//! map that onto the `embedded-hal` bus traits.

use embedded_hal::i2c::I2c;
use embedded_hal::spi::{Operation, SpiDevice};

/// Bus transport consumed by the driver.
///
/// Errors are passed through as-is, implementations must not retry.
pub trait RegisterBus {
    type Error;

    /// Burst-read `buf.len()` bytes starting at `register`.
    fn read(&mut self, address: u8, register: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write `data` to consecutive registers starting at `register`.
    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), Self::Error>;
}

/// I2C transport
pub struct I2cInterface<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> I2cInterface<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> RegisterBus for I2cInterface<I2C> {
    type Error = I2C::Error;

    fn read(&mut self, address: u8, register: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.i2c.write_read(address, &[register], buf)
    }

    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), Self::Error> {
        // No auto-increment on writes, every byte gets its own address
        for (offset, byte) in data.iter().enumerate() {
            self.i2c.write(address, &[register.wrapping_add(offset as u8), *byte])?;
        }
        Ok(())
    }
}

/// 4-wire SPI transport. The bus address is ignored, chip select is owned by
/// the `SpiDevice`.
/// Clock speed must not exceed 10MHz
/// Accept mode 0 or 3.
pub struct SpiInterface<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice> SpiInterface<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI: SpiDevice> RegisterBus for SpiInterface<SPI> {
    type Error = SPI::Error;

    fn read(&mut self, _address: u8, register: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        // bit 7 set selects a read
        self.spi
            .transaction(&mut [Operation::Write(&[register | 0x80]), Operation::Read(buf)])
    }

    fn write(&mut self, _address: u8, register: u8, data: &[u8]) -> Result<(), Self::Error> {
        for (offset, byte) in data.iter().enumerate() {
            let reg = register.wrapping_add(offset as u8) & 0x7F;
            self.spi.write(&[reg, *byte])?;
        }
        Ok(())
    }
}
