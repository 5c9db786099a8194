/// Oversampling for the temperature, pressure and humidity channels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Oversampling {
    /// Channel skipped, output held at 0x80000
    Skip,
    #[default]
    X1,
    X2,
    X4,
    X8,
    X16,
}

impl Oversampling {
    pub fn value(&self) -> u8 {
        match *self {
            Oversampling::Skip => 0b000,
            Oversampling::X1 => 0b001,
            Oversampling::X2 => 0b010,
            Oversampling::X4 => 0b011,
            Oversampling::X8 => 0b100,
            Oversampling::X16 => 0b101,
        }
    }

    /// Number of conversions averaged per sample.
    pub fn samples(&self) -> u32 {
        match *self {
            Oversampling::Skip => 0,
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
            Oversampling::X16 => 16,
        }
    }
}

/// Inactive period between conversions in normal mode.
///
/// The two last codes differ between parts: 2000/4000 ms on the BMP280,
/// 10/20 ms on the BME280.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Standby {
    #[default]
    Ms0_5,
    Ms62_5,
    Ms125,
    Ms250,
    Ms500,
    Ms1000,
    Ms2000,
    Ms4000,
}

impl Standby {
    pub fn value(&self) -> u8 {
        match *self {
            Standby::Ms0_5 => 0b000,
            Standby::Ms62_5 => 0b001,
            Standby::Ms125 => 0b010,
            Standby::Ms250 => 0b011,
            Standby::Ms500 => 0b100,
            Standby::Ms1000 => 0b101,
            Standby::Ms2000 => 0b110,
            Standby::Ms4000 => 0b111,
        }
    }
}

/// IIR filter coefficient
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Filter {
    #[default]
    Off,
    X2,
    X4,
    X8,
    X16,
}

impl Filter {
    pub fn value(&self) -> u8 {
        match *self {
            Filter::Off => 0b000,
            Filter::X2 => 0b001,
            Filter::X4 => 0b010,
            Filter::X8 => 0b011,
            Filter::X16 => 0b100,
        }
    }
}

/// Power mode, bits [1:0] of `ctrl_meas`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    #[default]
    Sleep,
    Forced,
    Normal,
}

impl Mode {
    pub fn value(&self) -> u8 {
        match *self {
            Mode::Sleep => 0b00,
            Mode::Forced => 0b01,
            Mode::Normal => 0b11,
        }
    }
}

/// Measurement settings applied by [`crate::Bmx280::configure`].
///
/// The default (x1 on every channel, 0.5 ms standby, filter off) is the
/// configuration written during initialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    pub temperature: Oversampling,
    pub pressure: Oversampling,
    /// Ignored on the BMP280.
    pub humidity: Oversampling,
    pub standby: Standby,
    pub filter: Filter,
}

impl Settings {
    /// Worst-case duration of one forced conversion in MICROSECONDS.
    // t_max = 1.25 + 2.3*osrs_t + (2.3*osrs_p + 0.575) + (2.3*osrs_h + 0.575) ms
    pub fn max_measurement_time_us(&self, with_humidity: bool) -> u32 {
        let mut t = 1250 + 2300 * self.temperature.samples();
        if self.pressure != Oversampling::Skip {
            t += 2300 * self.pressure.samples() + 575;
        }
        if with_humidity && self.humidity != Oversampling::Skip {
            t += 2300 * self.humidity.samples() + 575;
        }
        t
    }
}
