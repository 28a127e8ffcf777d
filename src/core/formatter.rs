//! Conversion of raw sensor samples into single-line payloads.
//!
//! A payload has the exact shape `<timestamp>,<module>,<sensor-name>,<value>`
//! where the timestamp is the local time in `asctime` layout. Formatting never
//! fails: a temperature sample that does not start with an integer degrades
//! according to [`MalformedReading`].

use std::{borrow::Cow, fmt};

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use super::sensor::SensorDescriptor;

/// Largest number of bytes read from a device file per cycle.
pub const SAMPLE_CAPACITY: usize = 7;

/// `asctime` layout without the trailing newline.
const ASCTIME: &str = "%a %b %e %H:%M:%S %Y";

/// Bytes read from a device file during a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    bytes: [u8; SAMPLE_CAPACITY],
    len: usize,
}

impl RawSample {
    /// Copies at most [`SAMPLE_CAPACITY`] bytes from `bytes`.
    pub fn new(bytes: &[u8]) -> Self {
        let len = bytes.len().min(SAMPLE_CAPACITY);
        let mut buf = [0u8; SAMPLE_CAPACITY];
        buf[..len].copy_from_slice(&bytes[..len]);
        Self { bytes: buf, len }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Text up to the first NUL byte, with surrounding whitespace removed.
    pub fn text(&self) -> Cow<'_, str> {
        let raw = self.as_bytes();
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        match String::from_utf8_lossy(&raw[..end]) {
            Cow::Borrowed(s) => Cow::Borrowed(s.trim()),
            Cow::Owned(s) => Cow::Owned(s.trim().to_string()),
        }
    }
}

impl From<&str> for RawSample {
    fn from(value: &str) -> Self {
        RawSample::new(value.as_bytes())
    }
}

/// What a temperature sample that cannot be read as a number turns into.
///
/// `Zero` keeps the historical best-effort behavior, which makes an unparsable
/// reading indistinguishable from a genuine 0 degrees. Consumers that need to
/// tell the two apart should switch to `Marker`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedReading {
    /// Render `0.00`.
    #[default]
    Zero,
    /// Render `NaN`.
    Marker,
}

/// One formatted reading, ready for publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedPayload(String);

impl FormattedPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The converted value, i.e. the last comma separated field.
    pub fn value(&self) -> &str {
        self.0.rsplit(',').next().unwrap_or_default()
    }
}

impl fmt::Display for FormattedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Applies the per-measurement conversion policy and lays out the payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct Formatter {
    malformed: MalformedReading,
}

impl Formatter {
    pub fn new(malformed: MalformedReading) -> Self {
        Self { malformed }
    }

    /// Builds `<timestamp>,<module>,<sensor-name>,<converted-value>`.
    pub fn format<Tz>(
        &self,
        sensor: &SensorDescriptor,
        sample: &RawSample,
        now: &DateTime<Tz>,
    ) -> FormattedPayload
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let value = self.convert(sensor, sample);
        let stamp = timestamp_field(&now.format(ASCTIME).to_string());

        FormattedPayload(format!(
            "{}{},{},{}",
            stamp,
            sensor.module(),
            sensor.name(),
            value
        ))
    }

    /// Converts a sample according to the sensor's measurement type.
    ///
    /// Temperatures arrive as integer milli-degrees and are rendered in degrees
    /// with two decimals. Everything else is passed through untouched.
    pub fn convert(&self, sensor: &SensorDescriptor, sample: &RawSample) -> String {
        let text = sample.text();
        if !sensor.is_temperature() {
            return text.into_owned();
        }

        match parse_millidegrees(&text) {
            Some(milli) => {
                let converted = format!("{:.2}", milli as f64 / 1000.0);
                trace!("sensorData converted to {}", converted);
                converted
            }
            None => {
                warn!(
                    "Unparsable temperature sample {:?} from '{}'",
                    text.as_ref(),
                    sensor.name()
                );
                match self.malformed {
                    MalformedReading::Zero => "0.00".to_string(),
                    MalformedReading::Marker => "NaN".to_string(),
                }
            }
        }
    }
}

/// Replaces trailing newlines of a rendered time with a single comma.
fn timestamp_field(rendered: &str) -> String {
    let mut field = rendered.trim_end_matches(['\n', '\r']).to_string();
    field.push(',');
    field
}

/// Reads the longest leading `[+-]?[0-9]+` prefix of `text`.
fn parse_millidegrees(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }

    let magnitude = rest[..digits].parse::<i64>().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
