use core::fmt;

/// Errors returned by the BMx280 driver.
///
/// Bus errors are handed back untouched; the driver never retries a
/// transfer on its own.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceError<E> {
    /// Transport failure (timeout, busy, nack...) from the underlying bus.
    Bus(E),
    /// The ID register holds a value that is neither a BMP280 nor a BME280.
    InvalidChipId(u8),
    /// Neither the primary nor the secondary address holds a known chip.
    NotPresent,
    /// Calibration has not been read yet, call `init` or `probe` first.
    Uncalibrated,
    /// The `measuring` status bit never cleared.
    Timeout,
}

impl<E> From<E> for DeviceError<E> {
    fn from(err: E) -> Self {
        DeviceError::Bus(err)
    }
}

impl<E: fmt::Debug> fmt::Display for DeviceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Bus(err) => write!(f, "bus error: {:?}", err),
            DeviceError::InvalidChipId(id) => write!(f, "unexpected chip id 0x{:02X}", id),
            DeviceError::NotPresent => f.write_str("no BMx280 found on 0x76 or 0x77"),
            DeviceError::Uncalibrated => f.write_str("calibration not loaded"),
            DeviceError::Timeout => f.write_str("measurement did not complete"),
        }
    }
}

/// Reasons an NMEA line is rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NmeaError {
    /// Missing `$`/`*` framing or the XOR checksum does not match.
    Checksum,
    /// The payload does not fit the sentence template, or it reports no fix.
    Field,
    /// The line does not fit in the parser's fixed buffers.
    TooLong,
}

impl fmt::Display for NmeaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NmeaError::Checksum => f.write_str("checksum mismatch"),
            NmeaError::Field => f.write_str("field template mismatch"),
            NmeaError::TooLong => f.write_str("sentence too long"),
        }
    }
}
