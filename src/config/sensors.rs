//! Sensor list configuration.
//!
//! Sensors are described by four parallel lists plus values shared by every
//! sensor of the run. Index `i` of each list belongs to the same sensor.

use std::{collections::HashSet, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::core::{
    error::SensorError,
    formatter::MalformedReading,
    sensor::{InputType, SensorDescriptor, DEFAULT_SYSFS_ROOT},
};

/// The `[sensors]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_sensor_lists"))]
pub struct SensorsConfig {
    /// Logical grouping shared by all sensors, e.g. the site or device name.
    #[validate(length(min = 1, message = "Module name must not be empty"))]
    pub module: String,

    /// Operator-facing sensor labels.
    pub names: Vec<String>,

    /// Measurement types, e.g. `temperature` or `humidity`.
    pub types: Vec<String>,

    /// Bus addresses, e.g. one-wire serial ids.
    pub serials: Vec<String>,

    /// Bus families, each `w1` or `i2c`.
    pub input_types: Vec<String>,

    /// Shared poll interval in seconds.
    #[validate(range(min = 1, message = "Delay must be at least 1 second"))]
    pub delay: u64,

    /// Mount point of the device tree.
    pub sysfs_root: PathBuf,

    /// Rendering of temperature samples that are not numeric.
    pub malformed_reading: MalformedReading,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            module: "beehive".to_string(),
            names: vec!["insideTemp".to_string()],
            types: vec!["temperature".to_string()],
            serials: vec!["28-012033dcea3b".to_string()],
            input_types: vec!["w1".to_string()],
            delay: 60,
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            malformed_reading: MalformedReading::default(),
        }
    }
}

impl SensorsConfig {
    /// The shared poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.delay)
    }

    /// Builds one descriptor per configured sensor, in configuration order.
    ///
    /// # Errors
    ///
    /// Fails if the lists differ in length or are empty, if an input type is
    /// not supported, or if a name appears twice.
    pub fn descriptors(&self) -> Result<Vec<SensorDescriptor>, SensorError> {
        let lengths = [
            self.names.len(),
            self.types.len(),
            self.serials.len(),
            self.input_types.len(),
        ];
        if lengths.iter().any(|len| *len != lengths[0]) {
            return Err(SensorError::ListLengthMismatch {
                names: self.names.len(),
                types: self.types.len(),
                serials: self.serials.len(),
                input_types: self.input_types.len(),
            });
        }
        if self.names.is_empty() {
            return Err(SensorError::Empty);
        }

        let input_types = self
            .input_types
            .iter()
            .map(|s| s.parse::<InputType>())
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::with_capacity(self.names.len());
        if let Some(dup) = self.names.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(SensorError::DuplicateName(dup.clone()));
        }

        let poll_interval = self.poll_interval();
        Ok(self
            .names
            .iter()
            .zip(&self.types)
            .zip(&self.serials)
            .zip(input_types)
            .map(|(((name, kind), serial), input_type)| {
                SensorDescriptor::new(
                    name.as_str(),
                    self.module.as_str(),
                    serial.as_str(),
                    kind.as_str(),
                    input_type,
                    poll_interval,
                )
                .with_sysfs_root(&self.sysfs_root)
            })
            .collect())
    }
}

fn validate_sensor_lists(config: &SensorsConfig) -> Result<(), ValidationError> {
    config.descriptors().map(|_| ()).map_err(|e| {
        let mut err = ValidationError::new("invalid_sensors");
        err.message = Some(e.to_string().into());
        err
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn config(
        names: &[&str],
        types: &[&str],
        serials: &[&str],
        inputs: &[&str],
    ) -> SensorsConfig {
        let owned = |v: &[&str]| -> Vec<String> { v.iter().map(|s| s.to_string()).collect() };
        SensorsConfig {
            names: owned(names),
            types: owned(types),
            serials: owned(serials),
            input_types: owned(inputs),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_matches_single_one_wire_sensor() {
        let cfg = SensorsConfig::default();
        assert!(cfg.validate().is_ok());

        let sensors = cfg.descriptors().unwrap();
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].name(), "insideTemp");
        assert_eq!(sensors[0].module(), "beehive");
        assert_eq!(sensors[0].poll_interval_ms(), 60_000);
        assert_eq!(
            sensors[0].device_path(),
            Path::new("/sys/bus/w1/devices/28-012033dcea3b/temperature")
        );
    }

    #[test]
    fn test_descriptors_keep_configuration_order() {
        let cfg = config(
            &["a", "b", "c"],
            &["temperature", "humidity", "temperature"],
            &["28-1", "1-0040", "28-3"],
            &["w1", "i2c", "w1"],
        );

        let sensors = cfg.descriptors().unwrap();
        let names: Vec<_> = sensors.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(sensors[1].input_type(), InputType::I2c);
        assert_eq!(sensors[1].measurement_type(), "humidity");
    }

    #[test]
    fn test_mismatched_list_lengths_are_rejected() {
        let cases = [
            config(&["a", "b"], &["temperature"], &["28-1"], &["w1"]),
            config(&["a"], &["temperature", "humidity"], &["28-1"], &["w1"]),
            config(&["a"], &["temperature"], &["28-1", "28-2"], &["w1"]),
            config(&["a"], &["temperature"], &["28-1"], &["w1", "w1"]),
        ];

        for cfg in cases {
            assert!(matches!(
                cfg.descriptors(),
                Err(SensorError::ListLengthMismatch { .. })
            ));
            assert!(cfg.validate().is_err());
        }
    }

    #[test]
    fn test_unsupported_input_type_is_rejected() {
        let cfg = config(&["a", "b"], &["temperature"; 2], &["28-1", "28-2"], &["w1", "spi"]);

        assert_eq!(
            cfg.descriptors().unwrap_err(),
            SensorError::UnsupportedInputType("spi".into())
        );
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("spi is not supported"));
    }

    #[test]
    fn test_empty_lists_are_rejected() {
        let cfg = config(&[], &[], &[], &[]);
        assert_eq!(cfg.descriptors().unwrap_err(), SensorError::Empty);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let cfg = config(&["a", "a"], &["temperature"; 2], &["28-1", "28-2"], &["w1"; 2]);
        assert_eq!(
            cfg.descriptors().unwrap_err(),
            SensorError::DuplicateName("a".into())
        );
    }

    #[test]
    fn test_zero_delay_is_rejected() {
        let cfg = SensorsConfig {
            delay: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_sysfs_root_is_applied() {
        let cfg = SensorsConfig {
            sysfs_root: PathBuf::from("/srv/fake"),
            ..Default::default()
        };
        let sensors = cfg.descriptors().unwrap();
        assert!(sensors[0].device_path().starts_with("/srv/fake/bus/w1"));
    }
}
