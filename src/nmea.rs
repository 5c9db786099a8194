//! NMEA 0183 sentence decoding for the GGA (fix) and VTG (track) sentences.
//!
//! ```text
//! $GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n
//!  ^^    ^^^
//!  talker type                                          checksum ^^
//! ```
//!
//! A line is accepted only when its XOR checksum matches. Empty fields
//! (`,,`) are then filled with `0` so every value stays at its position,
//! and the payload is matched field by field against the sentence template.

use core::str::{FromStr, Split};

use heapless::Vec;
use num_traits::Float;

use crate::error::NmeaError;

/// Longest line accepted, the standard allows 82 characters including CRLF.
pub const MAX_SENTENCE_LEN: usize = 96;

/// Filling empty fields can at most double a line.
pub const REPAIRED_LEN: usize = 2 * MAX_SENTENCE_LEN;

/// Position fix from a GGA sentence
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GgaRecord {
    /// UTC time as transmitted, hhmmss.sss
    pub utc_time: f64,
    /// ddmm.mmmm
    pub latitude: f64,
    /// 'N' or 'S'
    pub ns: char,
    /// dddmm.mmmm
    pub longitude: f64,
    /// 'E' or 'W'
    pub ew: char,
    /// 1 = GPS, 2 = DGPS, ... never 0 in a decoded record
    pub fix_quality: u8,
    pub satellites: u8,
    pub hdop: f32,
    /// Metres above mean sea level
    pub altitude: f32,
}

impl GgaRecord {
    /// Latitude in signed decimal degrees, south negative.
    pub fn latitude_degrees(&self) -> f64 {
        let degrees = to_degrees(self.latitude);
        if self.ns == 'S' {
            -degrees
        } else {
            degrees
        }
    }

    /// Longitude in signed decimal degrees, west negative.
    pub fn longitude_degrees(&self) -> f64 {
        let degrees = to_degrees(self.longitude);
        if self.ew == 'W' {
            -degrees
        } else {
            degrees
        }
    }

    pub fn seconds_of_day(&self) -> f64 {
        let hours = Float::trunc(self.utc_time / 10_000.0);
        let minutes = Float::trunc((self.utc_time / 100.0) % 100.0);
        let seconds = self.utc_time % 100.0;
        hours * 3600.0 + minutes * 60.0 + seconds
    }
}

fn to_degrees(ddmm: f64) -> f64 {
    let degrees = Float::trunc(ddmm / 100.0);
    degrees + (ddmm - degrees * 100.0) / 60.0
}

/// Course and speed over ground from a VTG sentence
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VtgRecord {
    /// Degrees, true north
    pub course: f32,
    pub speed_knots: f32,
    pub speed_kmh: f32,
}

impl VtgRecord {
    pub fn speed_mps(&self) -> f32 {
        self.speed_kmh / 3.6
    }
}

/// A successfully validated sentence.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Sentence {
    Gga(GgaRecord),
    Vtg(VtgRecord),
    /// Valid NMEA of a type that is not decoded (GSA, GSV, RMC...).
    Unhandled,
}

/// Check the XOR of everything between `$` and `*` against the two hex
/// digits after `*`. Trailing CR/LF is ignored, hex case is not significant.
pub fn checksum_valid(line: &[u8]) -> bool {
    let Some(start) = line.iter().position(|&b| b == b'$') else {
        return false;
    };
    let body = &line[start + 1..];
    let Some(star) = body.iter().position(|&b| b == b'*') else {
        return false;
    };
    let computed = body[..star].iter().fold(0u8, |acc, b| acc ^ b);

    let mut digits = &body[star + 1..];
    while let [rest @ .., b'\r' | b'\n'] = digits {
        digits = rest;
    }
    match digits {
        [hi, lo] => match (hex_digit(*hi), hex_digit(*lo)) {
            (Some(hi), Some(lo)) => ((hi << 4) | lo) == computed,
            _ => false,
        },
        _ => false,
    }
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// Insert a `0` between every pair of adjacent commas before `*`.
///
/// Builds a new buffer, the input is left untouched. Applying it twice gives
/// the same result as applying it once.
pub fn repair_empty_fields(line: &[u8]) -> Result<Vec<u8, REPAIRED_LEN>, NmeaError> {
    if line.len() > MAX_SENTENCE_LEN {
        return Err(NmeaError::TooLong);
    }
    // the sentence ends at the first `*` after `$`, as for the checksum
    let end = line
        .iter()
        .position(|&b| b == b'$')
        .and_then(|start| {
            line[start..]
                .iter()
                .position(|&b| b == b'*')
                .map(|star| start + star)
        })
        .unwrap_or(line.len());

    let mut out = Vec::new();
    for (i, &b) in line.iter().enumerate() {
        out.push(b).map_err(|_| NmeaError::TooLong)?;
        if b == b',' && i + 1 < end && line[i + 1] == b',' {
            out.push(b'0').map_err(|_| NmeaError::TooLong)?;
        }
    }
    Ok(out)
}

/// Validate and decode one sentence.
///
/// Checksum failures and template failures are reported separately so the
/// caller can tell line noise from a misbehaving receiver.
pub fn parse(line: &[u8]) -> Result<Sentence, NmeaError> {
    if !checksum_valid(line) {
        debug!("nmea: checksum rejected");
        return Err(NmeaError::Checksum);
    }
    let repaired = repair_empty_fields(line)?;

    // both markers exist, the checksum pass found them
    let start = repaired.iter().position(|&b| b == b'$').ok_or(NmeaError::Checksum)?;
    let sentence = &repaired[start..];
    let star = sentence.iter().position(|&b| b == b'*').ok_or(NmeaError::Checksum)?;
    let body = core::str::from_utf8(&sentence[..star]).map_err(|_| NmeaError::Field)?;

    // $ + 2 talker chars, then the type code
    let kind = body.get(3..6).ok_or(NmeaError::Field)?;
    let mut fields = body.split(',');
    fields.next();

    let result = match kind {
        "GGA" => parse_gga(fields).map(Sentence::Gga),
        "VTG" => parse_vtg(fields).map(Sentence::Vtg),
        _ => Ok(Sentence::Unhandled),
    };
    if result.is_err() {
        debug!("nmea: {=str} rejected by template", kind);
    }
    result
}

// time,lat,N/S,lon,E/W,quality,sats,hdop,alt,M,geoid,...
fn parse_gga(mut fields: Split<'_, char>) -> Result<GgaRecord, NmeaError> {
    let record = GgaRecord {
        utc_time: number(fields.next())?,
        latitude: number(fields.next())?,
        ns: single_char(fields.next())?,
        longitude: number(fields.next())?,
        ew: single_char(fields.next())?,
        fix_quality: number(fields.next())?,
        satellites: number(fields.next())?,
        hdop: number(fields.next())?,
        altitude: number(fields.next())?,
    };
    literal(fields.next(), "M")?;
    // geoid separation must be present but is not kept
    let _: f32 = number(fields.next())?;

    if record.fix_quality == 0 {
        return Err(NmeaError::Field);
    }
    Ok(record)
}

// course,T,0,M,knots,N,kmh,K,mode
fn parse_vtg(mut fields: Split<'_, char>) -> Result<VtgRecord, NmeaError> {
    let course = number(fields.next())?;
    let true_course = single_char(fields.next())?;
    literal(fields.next(), "0")?;
    literal(fields.next(), "M")?;
    let speed_knots = number(fields.next())?;
    literal(fields.next(), "N")?;
    let speed_kmh = number(fields.next())?;
    literal(fields.next(), "K")?;
    let mode = single_char(fields.next())?;

    if mode == 'N' || true_course == 'F' {
        return Err(NmeaError::Field);
    }
    Ok(VtgRecord {
        course,
        speed_knots,
        speed_kmh,
    })
}

fn number<T: FromStr>(field: Option<&str>) -> Result<T, NmeaError> {
    field.and_then(|f| f.parse().ok()).ok_or(NmeaError::Field)
}

fn single_char(field: Option<&str>) -> Result<char, NmeaError> {
    let mut chars = field.ok_or(NmeaError::Field)?.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(NmeaError::Field),
    }
}

fn literal(field: Option<&str>, expected: &str) -> Result<(), NmeaError> {
    match field {
        Some(f) if f == expected => Ok(()),
        _ => Err(NmeaError::Field),
    }
}

/// Assembles sentences from a serial byte stream and keeps the latest fix.
///
/// The stored records are replaced only by sentences that decode, a
/// rejected line leaves the previous values in place.
pub struct NmeaReceiver {
    line: Vec<u8, MAX_SENTENCE_LEN>,
    overflow: bool,
    gga: Option<GgaRecord>,
    vtg: Option<VtgRecord>,
}

impl NmeaReceiver {
    pub const fn new() -> Self {
        Self {
            line: Vec::new(),
            overflow: false,
            gga: None,
            vtg: None,
        }
    }

    /// Feed one byte. Returns the parse outcome when `\n` closes a line.
    ///
    /// Bytes before the first `$` are dropped, a new `$` restarts the line.
    pub fn push_byte(&mut self, byte: u8) -> Option<Result<Sentence, NmeaError>> {
        match byte {
            b'$' => {
                self.line.clear();
                self.overflow = false;
                // capacity is never zero
                let _ = self.line.push(byte);
                None
            }
            b'\n' if !self.line.is_empty() => {
                let result = if self.overflow {
                    warn!("nmea: line overflow, dropped");
                    Err(NmeaError::TooLong)
                } else {
                    parse(&self.line)
                };
                self.line.clear();
                self.overflow = false;
                if let Ok(sentence) = result {
                    self.update(&sentence);
                }
                Some(result)
            }
            _ if self.line.is_empty() => None,
            _ => {
                if self.line.push(byte).is_err() {
                    self.overflow = true;
                }
                None
            }
        }
    }

    /// Store a decoded sentence as the latest fix or track.
    pub fn update(&mut self, sentence: &Sentence) {
        match *sentence {
            Sentence::Gga(gga) => self.gga = Some(gga),
            Sentence::Vtg(vtg) => self.vtg = Some(vtg),
            Sentence::Unhandled => {}
        }
    }

    pub fn gga(&self) -> Option<&GgaRecord> {
        self.gga.as_ref()
    }

    pub fn vtg(&self) -> Option<&VtgRecord> {
        self.vtg.as_ref()
    }
}

impl Default for NmeaReceiver {
    fn default() -> Self {
        Self::new()
    }
}
