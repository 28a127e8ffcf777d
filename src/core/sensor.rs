//! Sensor identity and addressing.
//!
//! A [`SensorDescriptor`] is built once at startup from configuration and is
//! never mutated afterwards. The device path is recomputed on every call
//! because the kernel may rebind a one-wire or I2C device between cycles.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use super::error::SensorError;

/// Default mount point of the kernel device tree.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// Measurement type that receives milli-degree to degree conversion.
pub const TEMPERATURE: &str = "temperature";

/// Bus family a sensor is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputType {
    #[serde(rename = "w1")]
    W1,
    #[serde(rename = "i2c")]
    I2c,
}

impl InputType {
    /// Every supported input type, in the order they are documented.
    pub const ALL: [InputType; 2] = [InputType::W1, InputType::I2c];

    /// Name of the bus directory under `<sysfs>/bus/`.
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::W1 => "w1",
            InputType::I2c => "i2c",
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputType {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InputType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SensorError::UnsupportedInputType(s.to_string()))
    }
}

/// One physical sensor channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDescriptor {
    name: String,
    module: String,
    bus_address: String,
    measurement_type: String,
    input_type: InputType,
    poll_interval: Duration,
    sysfs_root: PathBuf,
}

impl SensorDescriptor {
    /// Creates a descriptor rooted at [`DEFAULT_SYSFS_ROOT`].
    pub fn new(
        name: impl Into<String>,
        module: impl Into<String>,
        bus_address: impl Into<String>,
        measurement_type: impl Into<String>,
        input_type: InputType,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            bus_address: bus_address.into(),
            measurement_type: measurement_type.into(),
            input_type,
            poll_interval,
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
        }
    }

    /// Replaces the device tree root used by [`device_path`](Self::device_path).
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn bus_address(&self) -> &str {
        &self.bus_address
    }

    pub fn measurement_type(&self) -> &str {
        &self.measurement_type
    }

    pub fn input_type(&self) -> InputType {
        self.input_type
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Poll interval in whole milliseconds, as handed to the multiplexed wait.
    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval.as_millis() as u64
    }

    pub fn sysfs_root(&self) -> &Path {
        &self.sysfs_root
    }

    /// Whether readings of this sensor are converted from milli-degrees.
    pub fn is_temperature(&self) -> bool {
        self.measurement_type == TEMPERATURE
    }

    /// `<root>/bus/<input_type>/devices/<bus_address>/<measurement_type>`.
    pub fn device_path(&self) -> PathBuf {
        self.sysfs_root
            .join("bus")
            .join(self.input_type.as_str())
            .join("devices")
            .join(&self.bus_address)
            .join(&self.measurement_type)
    }
}

impl fmt::Display for SensorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({} {} @ {})",
            self.module, self.name, self.input_type, self.measurement_type, self.bus_address
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(input_type: InputType, address: &str, kind: &str) -> SensorDescriptor {
        SensorDescriptor::new(
            "insideTemp",
            "beehive",
            address,
            kind,
            input_type,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_device_path_for_one_wire_temperature() {
        let sensor = descriptor(InputType::W1, "28-012033dcea3b", "temperature");
        assert_eq!(
            sensor.device_path(),
            PathBuf::from("/sys/bus/w1/devices/28-012033dcea3b/temperature")
        );
    }

    #[test]
    fn test_device_path_matches_layout_for_every_input_type() {
        let cases = [
            ("28-012033dcea3b", "temperature"),
            ("1-0040", "humidity"),
            ("0-0077", "pressure"),
        ];

        for input_type in InputType::ALL {
            for (address, kind) in cases {
                let sensor = descriptor(input_type, address, kind);
                let expected = format!("/sys/bus/{}/devices/{}/{}", input_type, address, kind);
                assert_eq!(sensor.device_path(), PathBuf::from(expected));
            }
        }
    }

    #[test]
    fn test_device_path_uses_custom_root() {
        let sensor =
            descriptor(InputType::I2c, "1-0040", "humidity").with_sysfs_root("/tmp/fake-sys");
        assert_eq!(
            sensor.device_path(),
            PathBuf::from("/tmp/fake-sys/bus/i2c/devices/1-0040/humidity")
        );
    }

    #[test]
    fn test_input_type_parse() {
        assert_eq!("w1".parse::<InputType>().unwrap(), InputType::W1);
        assert_eq!("i2c".parse::<InputType>().unwrap(), InputType::I2c);
    }

    #[test]
    fn test_input_type_rejects_unknown_bus() {
        for bad in ["spi", "W1", "", "i2c "] {
            let err = bad.parse::<InputType>().unwrap_err();
            assert!(matches!(err, SensorError::UnsupportedInputType(ref v) if v == bad));
        }
    }

    #[test]
    fn test_poll_interval_ms() {
        let sensor = descriptor(InputType::W1, "28-1", "temperature");
        assert_eq!(sensor.poll_interval_ms(), 60_000);
    }

    #[test]
    fn test_is_temperature() {
        assert!(descriptor(InputType::W1, "28-1", "temperature").is_temperature());
        assert!(!descriptor(InputType::I2c, "1-0040", "humidity").is_temperature());
    }
}
