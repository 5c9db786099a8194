use crate::config::{Filter, Mode, Oversampling, Standby};

/// Value written to `reset` to trigger a power-on reset.
pub const SOFT_RESET: u8 = 0xB6;

/// `measuring` bit of the status register, set while a conversion runs.
pub const STATUS_MEASURING: u8 = 1 << 3;

/// Register map shared by the BMP280 and the BME280
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    CalibTp,  // 0x88..=0xA1, includes dig_H1 at 0xA1
    Id,
    Reset,
    CalibH,   // 0xE1..=0xE7
    CtrlHum,
    Status,
    CtrlMeas,
    Config,
    RawData,  // press[3] temp[3] hum[2]
}

impl Register {
    pub fn addr(&self) -> u8 {
        match *self {
            Register::CalibTp => 0x88,
            Register::Id => 0xD0,
            Register::Reset => 0xE0,
            Register::CalibH => 0xE1,
            Register::CtrlHum => 0xF2,
            Register::Status => 0xF3,
            Register::CtrlMeas => 0xF4,
            Register::Config => 0xF5,
            Register::RawData => 0xF7,
        }
    }
}

/// Single-register writes understood by the device.
pub enum Command {
    Reset,
    CtrlHum(Oversampling),
    CtrlMeas(Oversampling, Oversampling, Mode), // (osrs_t, osrs_p, mode)
    Config(Standby, Filter),
}

impl Command {
    pub fn register(&self) -> Register {
        match self {
            Command::Reset => Register::Reset,
            Command::CtrlHum(_) => Register::CtrlHum,
            Command::CtrlMeas(..) => Register::CtrlMeas,
            Command::Config(..) => Register::Config,
        }
    }

    pub fn value(&self) -> u8 {
        match self {
            Command::Reset => SOFT_RESET,
            Command::CtrlHum(osrs_h) => osrs_h.value(),
            Command::CtrlMeas(osrs_t, osrs_p, mode) => {
                (osrs_t.value() << 5) | (osrs_p.value() << 2) | mode.value()
            }
            // spi3w_en stays cleared
            Command::Config(standby, filter) => (standby.value() << 5) | (filter.value() << 2),
        }
    }
}
