/// Length of the temperature/pressure trimming burst (0x88..=0xA1).
pub const CALIB_TP_LEN: usize = 26;
/// Length of the humidity trimming burst (0xE1..=0xE7).
pub const CALIB_H_LEN: usize = 7;

/// Factory calibration read from the trimming ROM.
///
/// Loaded once by the driver and never modified afterwards. Each device
/// instance owns its own copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,
    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,
    /// Present on humidity-capable parts (BME280) only.
    pub humidity: Option<HumidityCalibration>,
}

/// Humidity trimming coefficients of the BME280
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HumidityCalibration {
    pub dig_h1: u8,
    pub dig_h2: i16,
    pub dig_h3: u8,
    /// 12-bit signed
    pub dig_h4: i16,
    /// 12-bit signed
    pub dig_h5: i16,
    pub dig_h6: i8,
}

impl Calibration {
    /// Decode the 0x88..=0xA1 burst. All words are little-endian.
    pub fn new(buf: &[u8; CALIB_TP_LEN]) -> Calibration {
        let u = |i: usize| u16::from_le_bytes([buf[i], buf[i + 1]]);
        let s = |i: usize| i16::from_le_bytes([buf[i], buf[i + 1]]);
        Calibration {
            dig_t1: u(0),
            dig_t2: s(2),
            dig_t3: s(4),
            dig_p1: u(6),
            dig_p2: s(8),
            dig_p3: s(10),
            dig_p4: s(12),
            dig_p5: s(14),
            dig_p6: s(16),
            dig_p7: s(18),
            dig_p8: s(20),
            dig_p9: s(22),
            // buf[24] (0xA0) is unused, buf[25] is dig_H1
            humidity: None,
        }
    }

    /// Decode both bursts of a BME280.
    pub fn with_humidity(tp: &[u8; CALIB_TP_LEN], h: &[u8; CALIB_H_LEN]) -> Calibration {
        Calibration {
            humidity: Some(HumidityCalibration::new(tp[CALIB_TP_LEN - 1], h)),
            ..Calibration::new(tp)
        }
    }
}

impl HumidityCalibration {
    /// `dig_h1` lives at 0xA1, the rest comes from the 0xE1..=0xE7 burst.
    pub fn new(dig_h1: u8, buf: &[u8; CALIB_H_LEN]) -> HumidityCalibration {
        // H4 = 0xE4[7:0] << 4 | 0xE5[3:0], H5 = 0xE6[7:0] << 4 | 0xE5[7:4]
        HumidityCalibration {
            dig_h1,
            dig_h2: i16::from_le_bytes([buf[0], buf[1]]),
            dig_h3: buf[2],
            dig_h4: ((buf[3] as i8 as i16) << 4) | (buf[4] & 0x0F) as i16,
            dig_h5: ((buf[5] as i8 as i16) << 4) | (buf[4] >> 4) as i16,
            dig_h6: buf[6] as i8,
        }
    }
}
