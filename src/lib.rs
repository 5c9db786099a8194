//! Drivers for the Bosch BMP280/BME280 environmental sensors and an NMEA
//! 0183 decoder for GPS receivers.
//!
//! Both sides are `no_std` and allocation free. Every device is a caller-owned
//! [`Bmx280`] instance holding its own bus and calibration, so several sensors
//! can share a firmware image.
#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

#[macro_use]
mod fmt;

pub mod calibration;
pub mod command;
pub mod compensation;
pub mod config;
pub mod error;
pub mod interface;
pub mod nmea;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use embedded_hal::spi::SpiDevice;

pub use calibration::{Calibration, HumidityCalibration};
use calibration::{CALIB_H_LEN, CALIB_TP_LEN};
use command::{Command, Register, STATUS_MEASURING};
pub use compensation::{FineTemperature, RawSample};
pub use config::{Filter, Mode, Oversampling, Settings, Standby};
pub use error::{DeviceError, NmeaError};
pub use interface::{I2cInterface, RegisterBus, SpiInterface};

/// Standard atmosphere at sea level, Pa.
pub const SEA_LEVEL_PRESSURE: f32 = 101_325.0;

/// Status polls after the worst-case conversion time has elapsed.
const MAX_STATUS_POLLS: u8 = 10;

/// I2C address selected by the SDO pin
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    /// SDO to GND
    Primary,
    /// SDO to VDDIO
    Secondary,
}

impl Address {
    pub fn value(&self) -> u8 {
        match *self {
            Address::Primary => 0x76,
            Address::Secondary => 0x77,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Variant {
    /// Pressure and temperature
    Bmp280,
    /// Pressure, temperature and humidity
    Bme280,
}

impl Variant {
    /// 0x56/0x57 are BMP280 engineering samples.
    pub fn from_chip_id(id: u8) -> Option<Variant> {
        match id {
            0x60 => Some(Variant::Bme280),
            0x56..=0x58 => Some(Variant::Bmp280),
            _ => None,
        }
    }

    pub fn has_humidity(&self) -> bool {
        *self == Variant::Bme280
    }
}

/// One compensated sample.
///
/// The raw fixed-point values are kept so results stay bit-exact; the
/// accessors convert to physical units.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    /// 0.01 °C
    pub temperature: i32,
    /// Pa in Q24.8, 0 when the sample had to be discarded
    pub pressure: u32,
    /// %RH in Q22.10, BME280 only
    pub humidity: Option<u32>,
    /// Metres relative to the reference pressure, `None` with the pressure
    pub altitude: Option<f32>,
}

impl Measurement {
    pub fn temperature_celsius(&self) -> f32 {
        self.temperature as f32 / 100.0
    }

    pub fn pressure_pa(&self) -> Option<f32> {
        (self.pressure != 0).then(|| self.pressure as f32 / 256.0)
    }

    pub fn humidity_percent(&self) -> Option<f32> {
        self.humidity.map(|h| h as f32 / 1024.0)
    }
}

pub struct Bmx280<BUS> {
    bus: BUS,
    address: u8,
    variant: Option<Variant>,
    calibration: Option<Calibration>, // loaded by init/probe, never touched afterwards
    settings: Settings,
    reference_pressure: f32,
}

impl<I2C: I2c> Bmx280<I2cInterface<I2C>> {
    /// Create a new instance on an I2C bus
    pub fn new_i2c(i2c: I2C, address: Address, reference_pressure: f32) -> Self {
        Self::new(I2cInterface::new(i2c), address, reference_pressure)
    }
}

impl<SPI: SpiDevice> Bmx280<SpiInterface<SPI>> {
    /// Create a new instance on a 4-wire SPI device
    pub fn new_spi(spi: SPI, reference_pressure: f32) -> Self {
        Self::new(SpiInterface::new(spi), Address::Primary, reference_pressure)
    }
}

impl<BUS> Bmx280<BUS>
where
    BUS: RegisterBus,
{
    /// Create a new instance. Nothing is sent until [`Bmx280::init`].
    ///
    /// `reference_pressure` (Pa) is the zero level of the reported altitude,
    /// use [`SEA_LEVEL_PRESSURE`] when no local value is known.
    pub fn new(bus: BUS, address: Address, reference_pressure: f32) -> Self {
        Self {
            bus,
            address: address.value(),
            variant: None,
            calibration: None,
            settings: Settings::default(),
            reference_pressure,
        }
    }

    /// Look for a device on 0x76, then on 0x77, and initialize the first one
    /// that answers with a known chip ID.
    ///
    /// When both ID reads fail on the bus, the error from 0x77 is returned.
    /// If any address answered with an unknown ID the result is `NotPresent`.
    pub fn probe(bus: BUS, reference_pressure: f32) -> Result<Self, DeviceError<BUS::Error>> {
        let mut device = Self::new(bus, Address::Primary, reference_pressure);
        let mut bus_error = None;
        let mut answered = false;
        for address in [Address::Primary, Address::Secondary] {
            device.address = address.value();
            match device.chip_id() {
                Ok(id) => match Variant::from_chip_id(id) {
                    Some(variant) => {
                        device.setup(variant)?;
                        return Ok(device);
                    }
                    None => {
                        debug!("bmx280: unknown id {=u8:#04x} at {}", id, address);
                        answered = true;
                    }
                },
                Err(err) => {
                    debug!("bmx280: no answer at {}", address);
                    bus_error = Some(err);
                }
            }
        }
        match bus_error {
            Some(err) if !answered => Err(err),
            _ => Err(DeviceError::NotPresent),
        }
    }

    /// Check the chip ID, load the calibration and apply the default settings.
    pub fn init(&mut self) -> Result<(), DeviceError<BUS::Error>> {
        let id = self.chip_id()?;
        let variant = Variant::from_chip_id(id).ok_or(DeviceError::InvalidChipId(id))?;
        self.setup(variant)
    }

    fn setup(&mut self, variant: Variant) -> Result<(), DeviceError<BUS::Error>> {
        debug!("bmx280: {} at {=u8:#04x}", variant, self.address);
        let calibration = self.read_calibration(variant)?;
        self.variant = Some(variant);
        self.calibration = Some(calibration);
        self.configure(Settings::default())
    }

    fn read_calibration(
        &mut self,
        variant: Variant,
    ) -> Result<Calibration, DeviceError<BUS::Error>> {
        let mut tp = [0u8; CALIB_TP_LEN];
        self.read_register(Register::CalibTp, &mut tp)?;
        let calibration = if variant.has_humidity() {
            let mut h = [0u8; CALIB_H_LEN];
            self.read_register(Register::CalibH, &mut h)?;
            Calibration::with_humidity(&tp, &h)
        } else {
            Calibration::new(&tp)
        };
        trace!("bmx280: calibration {}", calibration);
        Ok(calibration)
    }

    /// Write `settings` and leave the device in sleep mode.
    ///
    /// `ctrl_hum` only takes effect after a `ctrl_meas` write, so it goes
    /// first. `config` is written while the device sleeps.
    pub fn configure(&mut self, settings: Settings) -> Result<(), DeviceError<BUS::Error>> {
        if self.has_humidity() {
            self.send(Command::CtrlHum(settings.humidity))?;
        }
        self.send(Command::Config(settings.standby, settings.filter))?;
        self.send(Command::CtrlMeas(settings.temperature, settings.pressure, Mode::Sleep))?;
        self.settings = settings;
        debug!("bmx280: configured {}", settings);
        Ok(())
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), DeviceError<BUS::Error>> {
        self.send(Command::CtrlMeas(self.settings.temperature, self.settings.pressure, mode))
    }

    pub fn sleep(&mut self) -> Result<(), DeviceError<BUS::Error>> {
        self.set_mode(Mode::Sleep)
    }

    /// Free-running conversions, one every standby period.
    /// Read them with [`Bmx280::read_measurement`].
    pub fn normal(&mut self) -> Result<(), DeviceError<BUS::Error>> {
        self.set_mode(Mode::Normal)
    }

    /// Run one forced conversion and return the compensated result.
    ///
    /// Waits the worst-case conversion time for the current settings, then
    /// polls the `measuring` bit every millisecond.
    pub fn forced_measure<D: DelayNs>(
        &mut self,
        delay: &mut D,
    ) -> Result<Measurement, DeviceError<BUS::Error>> {
        if self.calibration.is_none() {
            return Err(DeviceError::Uncalibrated);
        }
        self.set_mode(Mode::Forced)?;
        delay.delay_us(self.settings.max_measurement_time_us(self.has_humidity()));

        let mut polls = 0;
        while self.read_status()? & STATUS_MEASURING != 0 {
            polls += 1;
            if polls >= MAX_STATUS_POLLS {
                warn!("bmx280: conversion still running after {=u8} polls", polls);
                return Err(DeviceError::Timeout);
            }
            delay.delay_ms(1);
        }
        self.read_measurement()
    }

    /// Read and compensate the most recent conversion.
    pub fn read_measurement(&mut self) -> Result<Measurement, DeviceError<BUS::Error>> {
        let calibration = self.calibration.ok_or(DeviceError::Uncalibrated)?;
        let with_humidity = calibration.humidity.is_some();

        // press[3] temp[3], hum[2] on the BME280
        let mut buf = [0u8; 8];
        let len = if with_humidity { 8 } else { 6 };
        self.read_register(Register::RawData, &mut buf[..len])?;
        let raw = RawSample::unpack(&buf, with_humidity);
        trace!("bmx280: raw {}", raw);

        Ok(self.compensate(&calibration, &raw))
    }

    fn compensate(&self, calibration: &Calibration, raw: &RawSample) -> Measurement {
        let (temperature, t_fine) = calibration.compensate_temperature(raw.temperature);
        let pressure = calibration.compensate_pressure(raw.pressure, t_fine);
        let humidity = raw
            .humidity
            .and_then(|h| calibration.compensate_humidity(h, t_fine));

        let altitude = if pressure == 0 {
            warn!("bmx280: pressure sentinel, sample discarded");
            None
        } else {
            Some(compensation::altitude(
                temperature as f32 / 100.0,
                pressure as f32 / 256.0,
                self.reference_pressure,
            ))
        };

        Measurement {
            temperature,
            pressure,
            humidity,
            altitude,
        }
    }

    /// Power-on reset, then the default settings are written again.
    ///
    /// The reset clears every control register (all channels skipped), the
    /// calibration is kept since it lives in ROM.
    pub fn soft_reset<D: DelayNs>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), DeviceError<BUS::Error>> {
        self.send(Command::Reset)?;
        // t_startup
        delay.delay_ms(2);
        self.configure(Settings::default())
    }

    pub fn chip_id(&mut self) -> Result<u8, DeviceError<BUS::Error>> {
        let mut id = [0u8; 1];
        self.read_register(Register::Id, &mut id)?;
        Ok(id[0])
    }

    /// `None` before a successful `init`.
    pub fn variant(&self) -> Option<Variant> {
        self.variant
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn set_reference_pressure(&mut self, reference_pressure: f32) {
        self.reference_pressure = reference_pressure;
    }

    /// Destroy the driver and hand back the bus.
    pub fn release(self) -> BUS {
        self.bus
    }

    fn has_humidity(&self) -> bool {
        self.variant.is_some_and(|v| v.has_humidity())
    }

    fn read_status(&mut self) -> Result<u8, DeviceError<BUS::Error>> {
        let mut status = [0u8; 1];
        self.read_register(Register::Status, &mut status)?;
        Ok(status[0])
    }

    fn read_register(
        &mut self,
        register: Register,
        buf: &mut [u8],
    ) -> Result<(), DeviceError<BUS::Error>> {
        self.bus.read(self.address, register.addr(), buf)?;
        Ok(())
    }

    fn send(&mut self, command: Command) -> Result<(), DeviceError<BUS::Error>> {
        self.bus
            .write(self.address, command.register().addr(), &[command.value()])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::tests::{H_BURST, TP_BURST};
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};
    use std::vec::Vec;

    const BURST: [u8; 8] = [0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x75, 0x30];

    fn read(address: u8, register: u8, data: &[u8]) -> I2cTransaction {
        I2cTransaction::write_read(address, vec![register], data.to_vec())
    }

    fn write(address: u8, register: u8, value: u8) -> I2cTransaction {
        I2cTransaction::write(address, vec![register, value])
    }

    fn bme280_init(address: u8) -> Vec<I2cTransaction> {
        vec![
            read(address, 0xD0, &[0x60]),
            read(address, 0x88, &TP_BURST),
            read(address, 0xE1, &H_BURST),
            write(address, 0xF2, 0x01),
            write(address, 0xF5, 0x00),
            write(address, 0xF4, 0x24),
        ]
    }

    fn bmp280_init(address: u8, tp: &[u8]) -> Vec<I2cTransaction> {
        vec![
            read(address, 0xD0, &[0x58]),
            read(address, 0x88, tp),
            write(address, 0xF5, 0x00),
            write(address, 0xF4, 0x24),
        ]
    }

    #[test]
    fn check_init_bme280() {
        let expectations = bme280_init(0x76);
        let i2c = I2cMock::new(&expectations);

        let mut device = Bmx280::new_i2c(i2c, Address::Primary, SEA_LEVEL_PRESSURE);
        assert!(device.calibration().is_none());
        device.init().unwrap();
        assert_eq!(device.variant(), Some(Variant::Bme280));
        let calibration = device.calibration().unwrap();
        assert_eq!(calibration.dig_t1, 27504);
        assert_eq!(calibration.humidity.unwrap().dig_h1, 75);
        assert_eq!(device.settings(), Settings::default());

        device.release().release().done();
    }

    #[test]
    fn check_init_invalid_chip_id() {
        let expectations = [read(0x76, 0xD0, &[0x55])];
        let i2c = I2cMock::new(&expectations);

        let mut device = Bmx280::new_i2c(i2c, Address::Primary, SEA_LEVEL_PRESSURE);
        assert_eq!(device.init(), Err(DeviceError::InvalidChipId(0x55)));
        assert!(device.variant().is_none());

        device.release().release().done();
    }

    #[test]
    fn check_bus_error_is_passed_through() {
        let expectations = [read(0x77, 0xD0, &[0x00]).with_error(ErrorKind::Other)];
        let i2c = I2cMock::new(&expectations);

        let mut device = Bmx280::new_i2c(i2c, Address::Secondary, SEA_LEVEL_PRESSURE);
        assert_eq!(device.init(), Err(DeviceError::Bus(ErrorKind::Other)));

        device.release().release().done();
    }

    #[test]
    fn check_probe_falls_back_to_secondary() {
        let mut expectations = vec![read(0x76, 0xD0, &[0x00]).with_error(ErrorKind::Other)];
        expectations.extend(bmp280_init(0x77, &TP_BURST));
        let i2c = I2cMock::new(&expectations);

        let device = Bmx280::probe(I2cInterface::new(i2c), SEA_LEVEL_PRESSURE).unwrap();
        assert_eq!(device.variant(), Some(Variant::Bmp280));
        assert!(device.calibration().unwrap().humidity.is_none());

        device.release().release().done();
    }

    #[test]
    fn check_probe_skips_unknown_chip() {
        let mut expectations = vec![read(0x76, 0xD0, &[0x61])];
        expectations.extend(bme280_init(0x77));
        let i2c = I2cMock::new(&expectations);

        let device = Bmx280::probe(I2cInterface::new(i2c), SEA_LEVEL_PRESSURE).unwrap();
        assert_eq!(device.variant(), Some(Variant::Bme280));

        device.release().release().done();
    }

    #[test]
    fn check_probe_bus_error_on_both_addresses() {
        let expectations = [
            read(0x76, 0xD0, &[0x00]).with_error(ErrorKind::Other),
            read(0x77, 0xD0, &[0x00]).with_error(ErrorKind::Other),
        ];
        let i2c = I2cMock::new(&expectations);

        match Bmx280::probe(I2cInterface::new(i2c.clone()), SEA_LEVEL_PRESSURE) {
            Err(DeviceError::Bus(ErrorKind::Other)) => {}
            _ => panic!("expected the bus error"),
        }
        let mut i2c = i2c;
        i2c.done();
    }

    #[test]
    fn check_probe_unknown_chip_and_no_answer() {
        let expectations = [
            read(0x76, 0xD0, &[0x61]),
            read(0x77, 0xD0, &[0x00]).with_error(ErrorKind::Other),
        ];
        let i2c = I2cMock::new(&expectations);

        match Bmx280::probe(I2cInterface::new(i2c.clone()), SEA_LEVEL_PRESSURE) {
            Err(DeviceError::NotPresent) => {}
            _ => panic!("expected NotPresent"),
        }
        let mut i2c = i2c;
        i2c.done();
    }

    #[test]
    fn check_forced_measure_bme280() {
        let mut expectations = bme280_init(0x76);
        expectations.extend([
            write(0x76, 0xF4, 0x25),
            read(0x76, 0xF3, &[0x08]),
            read(0x76, 0xF3, &[0x00]),
            read(0x76, 0xF7, &BURST),
        ]);
        let i2c = I2cMock::new(&expectations);

        let mut device = Bmx280::new_i2c(i2c, Address::Primary, SEA_LEVEL_PRESSURE);
        device.init().unwrap();
        let measurement = device.forced_measure(&mut NoopDelay::new()).unwrap();

        assert_eq!(measurement.temperature, 2508);
        assert_eq!(measurement.pressure, 25767233);
        assert_eq!(measurement.humidity, Some(56317));
        assert_eq!(measurement.temperature_celsius(), 25.08);
        assert!((measurement.pressure_pa().unwrap() - 100653.27).abs() < 0.05);
        assert!((measurement.humidity_percent().unwrap() - 54.997).abs() < 0.01);
        let altitude = measurement.altitude.unwrap();
        assert!(altitude > 50.0 && altitude < 65.0, "{}", altitude);

        device.release().release().done();
    }

    #[test]
    fn check_forced_measure_timeout() {
        let mut expectations = bme280_init(0x76);
        expectations.push(write(0x76, 0xF4, 0x25));
        for _ in 0..MAX_STATUS_POLLS {
            expectations.push(read(0x76, 0xF3, &[0x08]));
        }
        let i2c = I2cMock::new(&expectations);

        let mut device = Bmx280::new_i2c(i2c, Address::Primary, SEA_LEVEL_PRESSURE);
        device.init().unwrap();
        assert_eq!(
            device.forced_measure(&mut NoopDelay::new()),
            Err(DeviceError::Timeout)
        );

        device.release().release().done();
    }

    #[test]
    fn check_uncalibrated() {
        let i2c = I2cMock::new(&[]);

        let mut device = Bmx280::new_i2c(i2c, Address::Primary, SEA_LEVEL_PRESSURE);
        assert_eq!(
            device.forced_measure(&mut NoopDelay::new()),
            Err(DeviceError::Uncalibrated)
        );
        assert_eq!(device.read_measurement(), Err(DeviceError::Uncalibrated));

        device.release().release().done();
    }

    #[test]
    fn check_pressure_sentinel() {
        let mut tp = TP_BURST;
        // dig_P1 = 0
        tp[6] = 0;
        tp[7] = 0;
        let mut expectations = bmp280_init(0x76, &tp);
        expectations.push(read(0x76, 0xF7, &BURST[..6]));
        let i2c = I2cMock::new(&expectations);

        let mut device = Bmx280::new_i2c(i2c, Address::Primary, SEA_LEVEL_PRESSURE);
        device.init().unwrap();
        let measurement = device.read_measurement().unwrap();
        assert_eq!(measurement.temperature, 2508);
        assert_eq!(measurement.pressure, 0);
        assert_eq!(measurement.pressure_pa(), None);
        assert_eq!(measurement.altitude, None);
        assert_eq!(measurement.humidity, None);

        device.release().release().done();
    }

    #[test]
    fn check_soft_reset_restores_humidity_channel() {
        let mut expectations = bme280_init(0x76);
        expectations.extend([
            write(0x76, 0xE0, 0xB6),
            // ctrl_hum reads 0x00 (skipped) after a reset
            write(0x76, 0xF2, 0x01),
            write(0x76, 0xF5, 0x00),
            write(0x76, 0xF4, 0x24),
            write(0x76, 0xF4, 0x25),
            read(0x76, 0xF3, &[0x00]),
            read(0x76, 0xF7, &BURST),
        ]);
        let i2c = I2cMock::new(&expectations);

        let mut device = Bmx280::new_i2c(i2c, Address::Primary, SEA_LEVEL_PRESSURE);
        device.init().unwrap();
        device.soft_reset(&mut NoopDelay::new()).unwrap();
        assert_eq!(device.settings().humidity, Oversampling::X1);
        let measurement = device.forced_measure(&mut NoopDelay::new()).unwrap();
        assert_eq!(measurement.humidity, Some(56317));

        device.release().release().done();
    }

    #[test]
    fn check_configure_and_modes() {
        let settings = Settings {
            temperature: Oversampling::X2,
            pressure: Oversampling::X16,
            humidity: Oversampling::X4,
            standby: Standby::Ms1000,
            filter: Filter::X16,
        };
        let mut expectations = bme280_init(0x76);
        expectations.extend([
            write(0x76, 0xF2, 0b011),
            write(0x76, 0xF5, 0b101_100_00),
            write(0x76, 0xF4, 0b010_101_00),
            write(0x76, 0xF4, 0b010_101_11),
            write(0x76, 0xF4, 0b010_101_00),
            write(0x76, 0xE0, 0xB6),
            write(0x76, 0xF2, 0x01),
            write(0x76, 0xF5, 0x00),
            write(0x76, 0xF4, 0x24),
        ]);
        let i2c = I2cMock::new(&expectations);

        let mut device = Bmx280::new_i2c(i2c, Address::Primary, SEA_LEVEL_PRESSURE);
        device.init().unwrap();
        device.configure(settings).unwrap();
        assert_eq!(device.settings(), settings);
        device.normal().unwrap();
        device.sleep().unwrap();
        device.soft_reset(&mut NoopDelay::new()).unwrap();
        assert_eq!(device.settings(), Settings::default());
        assert!(device.calibration().is_some());

        device.release().release().done();
    }

    #[test]
    fn check_spi_bmp280() {
        let expectations = [
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0xD0]),
            SpiTransaction::read_vec(vec![0x58]),
            SpiTransaction::transaction_end(),
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0x88]),
            SpiTransaction::read_vec(TP_BURST.to_vec()),
            SpiTransaction::transaction_end(),
            // register addresses go out with bit 7 cleared on writes
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0x75, 0x00]),
            SpiTransaction::transaction_end(),
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0x74, 0x24]),
            SpiTransaction::transaction_end(),
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0xF7]),
            SpiTransaction::read_vec(BURST[..6].to_vec()),
            SpiTransaction::transaction_end(),
        ];
        let spi = SpiMock::new(&expectations);

        let mut device = Bmx280::new_spi(spi, SEA_LEVEL_PRESSURE);
        device.init().unwrap();
        assert_eq!(device.variant(), Some(Variant::Bmp280));
        let measurement = device.read_measurement().unwrap();
        assert_eq!(measurement.temperature, 2508);
        assert_eq!(measurement.pressure, 25767233);
        assert_eq!(measurement.humidity, None);

        device.release().release().done();
    }
}
