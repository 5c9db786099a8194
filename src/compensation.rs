//! Fixed-point compensation formulas of the BMP280/BME280 datasheets.
//!
//! Integer-only and truncating, so results match the Bosch reference code
//! bit-for-bit. Arithmetic wraps like the 32/64-bit two's complement
//! reference instead of panicking on out-of-range input.

use num_traits::Float;

use crate::calibration::{Calibration, HumidityCalibration};

/// Upper clamp of the humidity accumulator, 100 %RH in Q22.10 before `>> 12`.
pub const HUMIDITY_MAX: i32 = 419_430_400;

/// Intermediate temperature needed by the pressure and humidity formulas.
///
/// Only [`Calibration::compensate_temperature`] creates one, so pressure and
/// humidity cannot be compensated before temperature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FineTemperature(i32);

impl FineTemperature {
    pub fn raw(&self) -> i32 {
        self.0
    }
}

/// Unpacked ADC values of one burst read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    /// 20-bit
    pub pressure: u32,
    /// 20-bit
    pub temperature: u32,
    /// 16-bit, only in 8-byte bursts
    pub humidity: Option<u16>,
}

impl RawSample {
    /// Decode a burst starting at `press_msb` (0xF7).
    ///
    /// Needs at least 6 bytes; humidity is decoded when 8 or more are given.
    pub fn from_burst(buf: &[u8]) -> Option<RawSample> {
        let len = buf.len().min(8);
        if len < 6 {
            return None;
        }
        let mut burst = [0u8; 8];
        burst[..len].copy_from_slice(&buf[..len]);
        Some(RawSample::unpack(&burst, len == 8))
    }

    pub(crate) fn unpack(buf: &[u8; 8], with_humidity: bool) -> RawSample {
        // msb[7:0] = x[19:12], lsb[7:0] = x[11:4], xlsb[7:4] = x[3:0]
        let adc20 = |b: &[u8]| ((b[0] as u32) << 12) | ((b[1] as u32) << 4) | ((b[2] as u32) >> 4);
        RawSample {
            pressure: adc20(&buf[0..3]),
            temperature: adc20(&buf[3..6]),
            humidity: with_humidity.then(|| u16::from_be_bytes([buf[6], buf[7]])),
        }
    }
}

impl Calibration {
    /// Returns the temperature in 0.01 °C and the fine temperature carry.
    pub fn compensate_temperature(&self, raw_t: u32) -> (i32, FineTemperature) {
        let adc_t = raw_t as i32;
        let t1 = self.dig_t1 as i32;

        let var1 = ((adc_t >> 3).wrapping_sub(t1 << 1)).wrapping_mul(self.dig_t2 as i32) >> 11;
        let d = (adc_t >> 4).wrapping_sub(t1);
        let var2 = (d.wrapping_mul(d) >> 12).wrapping_mul(self.dig_t3 as i32) >> 14;

        let t_fine = var1.wrapping_add(var2);
        let temperature = t_fine.wrapping_mul(5).wrapping_add(128) >> 8;
        (temperature, FineTemperature(t_fine))
    }

    /// Returns the pressure in Pa as Q24.8 (divide by 256).
    ///
    /// Returns 0 when the calibration makes the divisor vanish; treat that
    /// sample as invalid.
    pub fn compensate_pressure(&self, raw_p: u32, t_fine: FineTemperature) -> u32 {
        let adc_p = raw_p as i64;

        let mut var1 = (t_fine.0 as i64) - 128000;
        let mut var2 = var1.wrapping_mul(var1).wrapping_mul(self.dig_p6 as i64);
        var2 = var2.wrapping_add(var1.wrapping_mul(self.dig_p5 as i64) << 17);
        var2 = var2.wrapping_add((self.dig_p4 as i64) << 35);
        var1 = (var1.wrapping_mul(var1).wrapping_mul(self.dig_p3 as i64) >> 8)
            .wrapping_add(var1.wrapping_mul(self.dig_p2 as i64) << 12);
        var1 = ((1i64 << 47).wrapping_add(var1)).wrapping_mul(self.dig_p1 as i64) >> 33;

        if var1 == 0 {
            return 0;
        }

        let mut p = 1_048_576 - adc_p;
        p = ((p << 31).wrapping_sub(var2)).wrapping_mul(3125).wrapping_div(var1);
        var1 = (self.dig_p9 as i64).wrapping_mul(p >> 13).wrapping_mul(p >> 13) >> 25;
        var2 = (self.dig_p8 as i64).wrapping_mul(p) >> 19;
        p = (p.wrapping_add(var1).wrapping_add(var2) >> 8).wrapping_add((self.dig_p7 as i64) << 4);

        p as u32
    }

    /// Humidity as Q22.10 (divide by 1024), `None` without humidity trimming.
    pub fn compensate_humidity(&self, raw_h: u16, t_fine: FineTemperature) -> Option<u32> {
        self.humidity
            .as_ref()
            .map(|h| h.compensate_humidity(raw_h, t_fine))
    }
}

impl HumidityCalibration {
    /// Returns the relative humidity as Q22.10, always within 0..=102400.
    pub fn compensate_humidity(&self, raw_h: u16, t_fine: FineTemperature) -> u32 {
        let adc_h = raw_h as i32;
        let h1 = self.dig_h1 as i32;
        let h2 = self.dig_h2 as i32;
        let h3 = self.dig_h3 as i32;
        let h4 = self.dig_h4 as i32;
        let h5 = self.dig_h5 as i32;
        let h6 = self.dig_h6 as i32;

        let mut v = t_fine.0.wrapping_sub(76800);
        let offset = (adc_h << 14)
            .wrapping_sub(h4 << 20)
            .wrapping_sub(h5.wrapping_mul(v))
            .wrapping_add(16384)
            >> 15;
        let scale = ((((v.wrapping_mul(h6) >> 10)
            .wrapping_mul((v.wrapping_mul(h3) >> 11).wrapping_add(32768))
            >> 10)
            .wrapping_add(2_097_152))
        .wrapping_mul(h2)
        .wrapping_add(8192))
            >> 14;
        v = offset.wrapping_mul(scale);
        v = v.wrapping_sub((((v >> 15).wrapping_mul(v >> 15) >> 7).wrapping_mul(h1)) >> 4);
        v = v.clamp(0, HUMIDITY_MAX);

        (v >> 12) as u32
    }
}

/// Barometric altitude in metres relative to `reference_pa`.
///
/// `29.254 * (T + 273.15) * ln(p0 / p)`, derived from the measurement, not
/// measured by the sensor.
pub fn altitude(temperature_c: f32, pressure_pa: f32, reference_pa: f32) -> f32 {
    29.254 * (temperature_c + 273.15) * Float::ln(reference_pa / pressure_pa)
}
