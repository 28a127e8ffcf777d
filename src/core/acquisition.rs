//! The polling loop.
//!
//! Every cycle re-opens each sensor's device file, waits once on all of them
//! with the shared poll interval as timeout, and then either drains the ready
//! handles in configuration order or, when nothing became ready, logs a
//! timeout for every sensor. Handles live for exactly one cycle.
//!
//! Open and read failures only affect the sensor concerned. A hangup or error
//! condition on any handle, or a failing wait, ends the loop.

use std::{
    convert::Infallible,
    fs::{File, OpenOptions},
    io::{self, Read},
    os::{fd::AsRawFd, unix::fs::OpenOptionsExt},
    time::Duration,
};

use chrono::Local;
use tracing::{debug, error, info, trace, warn};

use super::{
    error::AcquisitionError,
    formatter::{Formatter, RawSample, SAMPLE_CAPACITY},
    poll::{empty_slot, readable_slot, Multiplexer, PollSlot, POLLERR, POLLHUP, POLLIN, POLLNVAL},
    sensor::SensorDescriptor,
    sink::{Outbound, PayloadSink},
};

/// What happened during one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Payloads handed to the sink.
    pub published: usize,
    /// Sensors reported as timed out (all of them, or none).
    pub timed_out: usize,
    /// Sensors skipped because of a soft error.
    pub skipped: usize,
    /// Payloads read and formatted but refused by the sink.
    pub dropped: usize,
}

/// Owns the sensor set and polls it forever.
pub struct AcquisitionLoop<M, S> {
    sensors: Vec<SensorDescriptor>,
    poll_interval: Duration,
    formatter: Formatter,
    multiplexer: M,
    sink: S,
}

impl<M, S> AcquisitionLoop<M, S>
where
    M: Multiplexer,
    S: PayloadSink,
{
    /// Creates a loop over `sensors`, polled in the given order.
    ///
    /// `poll_interval` bounds every multiplexed wait and is shared by all
    /// sensors.
    pub fn new(
        sensors: Vec<SensorDescriptor>,
        poll_interval: Duration,
        formatter: Formatter,
        multiplexer: M,
        sink: S,
    ) -> Self {
        Self {
            sensors,
            poll_interval,
            formatter,
            multiplexer,
            sink,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn multiplexer(&self) -> &M {
        &self.multiplexer
    }

    /// Runs cycles until a hard error occurs.
    pub fn run(&mut self) -> Result<Infallible, AcquisitionError> {
        info!(
            "Poll loop starting with {} sensors (interval: {} ms)",
            self.sensors.len(),
            self.poll_interval.as_millis()
        );

        let mut published: u64 = 0;
        let mut dropped: u64 = 0;
        loop {
            let report = self.cycle()?;
            published += report.published as u64;
            dropped += report.dropped as u64;
            if report.dropped > 0 {
                warn!(
                    "Publisher is falling behind: {} payloads dropped this cycle, {} in total",
                    report.dropped, dropped
                );
            }
            trace!("Cycle finished: {:?}, total published: {}", report, published);
        }
    }

    /// Performs one open, wait, drain-or-timeout cycle.
    pub fn cycle(&mut self) -> Result<CycleReport, AcquisitionError> {
        let mut report = CycleReport::default();

        let handles = self.open_handles(&mut report);
        let mut slots: Vec<PollSlot> = handles
            .iter()
            .map(|handle| match handle {
                Some(file) => readable_slot(file.as_raw_fd()),
                None => empty_slot(),
            })
            .collect();

        let ready = self
            .multiplexer
            .wait(&mut slots, self.poll_interval)
            .map_err(|e| {
                error!("Multiplexed wait failed: {}", e);
                AcquisitionError::Wait(e)
            })?;
        debug!("{} handles ready", ready);

        if ready == 0 {
            self.handle_timeout(&handles, &mut slots, &mut report);
        } else {
            self.drain_ready(&handles, &mut slots, &mut report)?;
        }

        Ok(report)
    }

    /// Opens every device path afresh. A failed open leaves `None` in place so
    /// indices keep matching the sensor order.
    fn open_handles(&self, report: &mut CycleReport) -> Vec<Option<File>> {
        self.sensors
            .iter()
            .enumerate()
            .map(|(index, sensor)| {
                let path = sensor.device_path();
                match open_nonblocking(&path) {
                    Ok(file) => {
                        debug!("fds[{}] opened {}", index, path.display());
                        Some(file)
                    }
                    Err(e) => {
                        warn!(
                            "Failed to open {} for '{}': {}",
                            path.display(),
                            sensor.name(),
                            e
                        );
                        report.skipped += 1;
                        None
                    }
                }
            })
            .collect()
    }

    fn drain_ready(
        &mut self,
        handles: &[Option<File>],
        slots: &mut [PollSlot],
        report: &mut CycleReport,
    ) -> Result<(), AcquisitionError> {
        for (index, sensor) in self.sensors.iter().enumerate() {
            let revents = slots[index].revents;

            if revents & POLLIN != 0 {
                let Some(file) = handles[index].as_ref() else {
                    warn!("'{}' reported readable without an open handle", sensor.name());
                    continue;
                };

                trace!("Read from Device: {}", sensor.name());
                match read_sample(file) {
                    Ok(sample) => {
                        debug!("Read {} bytes from '{}'", sample.as_bytes().len(), sensor.name());
                        let payload = self.formatter.format(sensor, &sample, &Local::now());
                        debug!("Payload for '{}': {}", sensor.name(), payload);

                        match self.sink.deliver(Outbound::new(sensor, payload)) {
                            Ok(()) => report.published += 1,
                            Err(e) => {
                                warn!("Dropping payload for '{}': {}", sensor.name(), e);
                                report.dropped += 1;
                            }
                        }

                        slots[index].events = 0;
                        slots[index].revents = 0;
                    }
                    Err(e) => {
                        error!("Read Error on '{}': {}", sensor.name(), e);
                        report.skipped += 1;
                    }
                }
            } else if revents & POLLHUP != 0 {
                error!("Hangup on '{}'", sensor.name());
                return Err(AcquisitionError::Hangup {
                    sensor: sensor.name().to_string(),
                    path: sensor.device_path(),
                });
            } else if revents & POLLERR != 0 {
                error!("Poll Error on '{}'", sensor.name());
                return Err(AcquisitionError::PollError {
                    sensor: sensor.name().to_string(),
                    path: sensor.device_path(),
                });
            } else if revents & POLLNVAL != 0 {
                warn!("Invalid handle for '{}', skipping this cycle", sensor.name());
                report.skipped += 1;
            }
        }

        Ok(())
    }

    /// Nothing became ready: warn for every sensor and take one diagnostic
    /// read whose value is only logged.
    fn handle_timeout(
        &self,
        handles: &[Option<File>],
        slots: &mut [PollSlot],
        report: &mut CycleReport,
    ) {
        for (index, sensor) in self.sensors.iter().enumerate() {
            warn!("Timed out waiting for '{}'", sensor.name());
            slots[index].events = POLLIN;
            slots[index].revents = 0;
            report.timed_out += 1;

            if let Some(file) = handles[index].as_ref() {
                match read_sample(file) {
                    Ok(sample) => {
                        warn!("Timeout read value for '{}': {}", sensor.name(), sample.text())
                    }
                    Err(e) => debug!("Timeout read for '{}' failed: {}", sensor.name(), e),
                }
            }
        }
    }
}

fn open_nonblocking(path: &std::path::Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

fn read_sample(mut file: &File) -> io::Result<RawSample> {
    let mut buf = [0u8; SAMPLE_CAPACITY];
    let n = file.read(&mut buf)?;
    Ok(RawSample::new(&buf[..n]))
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, fs, path::Path};

    use libc::c_short;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    use super::*;
    use crate::core::{poll::SystemPoll, sensor::InputType, sink};

    enum Step {
        Ready(Vec<c_short>),
        Timeout,
        Fail(io::ErrorKind),
    }

    #[derive(Default)]
    struct Scripted {
        steps: VecDeque<Step>,
        calls: usize,
    }

    impl Scripted {
        fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                steps: steps.into_iter().collect(),
                calls: 0,
            }
        }
    }

    impl Multiplexer for Scripted {
        fn wait(&mut self, slots: &mut [PollSlot], _timeout: Duration) -> io::Result<usize> {
            self.calls += 1;
            match self.steps.pop_front().unwrap_or(Step::Timeout) {
                Step::Ready(flags) => {
                    for (slot, flag) in slots.iter_mut().zip(flags) {
                        slot.revents = flag;
                    }
                    Ok(slots.iter().filter(|s| s.revents != 0).count())
                }
                Step::Timeout => Ok(0),
                Step::Fail(kind) => Err(io::Error::new(kind, "scripted failure")),
            }
        }
    }

    /// Lays out a fake device tree and returns descriptors rooted in it.
    fn fake_tree(root: &Path, sensors: &[(&str, &str, &str, Option<&str>)]) -> Vec<SensorDescriptor> {
        sensors
            .iter()
            .map(|(name, address, kind, value)| {
                let sensor = SensorDescriptor::new(
                    *name,
                    "beehive",
                    *address,
                    *kind,
                    InputType::W1,
                    Duration::from_millis(50),
                )
                .with_sysfs_root(root);

                if let Some(value) = value {
                    let path = sensor.device_path();
                    fs::create_dir_all(path.parent().unwrap()).unwrap();
                    fs::write(&path, value).unwrap();
                }
                sensor
            })
            .collect()
    }

    fn three_sensors(root: &Path) -> Vec<SensorDescriptor> {
        fake_tree(
            root,
            &[
                ("outsideTemp", "28-000000000001", "temperature", Some("12500\n")),
                ("insideTemp", "28-000000000002", "temperature", Some("34750\n")),
                ("insideHumidity", "28-000000000003", "humidity", Some("61\n")),
            ],
        )
    }

    fn build<M: Multiplexer>(
        sensors: Vec<SensorDescriptor>,
        multiplexer: M,
    ) -> AcquisitionLoop<M, Vec<Outbound>> {
        AcquisitionLoop::new(
            sensors,
            Duration::from_millis(50),
            Formatter::default(),
            multiplexer,
            Vec::new(),
        )
    }

    #[test]
    fn test_ready_handles_are_drained_in_configuration_order() {
        let dir = TempDir::new().unwrap();
        let mut acquisition = build(three_sensors(dir.path()), SystemPoll);

        let report = acquisition.cycle().unwrap();

        assert_eq!(report.published, 3);
        assert_eq!(report.timed_out, 0);
        let produced: Vec<_> = acquisition
            .sink()
            .iter()
            .map(|o| (o.sensor.as_str(), o.payload.value()))
            .collect();
        assert_eq!(
            produced,
            [
                ("outsideTemp", "12.50"),
                ("insideTemp", "34.75"),
                ("insideHumidity", "61"),
            ]
        );
    }

    #[test]
    fn test_payload_names_module_and_sensor() {
        let dir = TempDir::new().unwrap();
        let mut acquisition = build(three_sensors(dir.path()), SystemPoll);
        acquisition.cycle().unwrap();

        let first = acquisition.sink()[0].payload.as_str().to_string();
        assert!(first.ends_with(",beehive,outsideTemp,12.50"));
        assert_eq!(first.split(',').count(), 4);
    }

    #[test]
    fn test_ordering_holds_when_readiness_is_reported_out_of_order() {
        let dir = TempDir::new().unwrap();
        let scripted = Scripted::new([Step::Ready(vec![POLLIN, POLLIN, POLLIN])]);
        let mut acquisition = build(three_sensors(dir.path()), scripted);

        acquisition.cycle().unwrap();

        let names: Vec<_> = acquisition.sink().iter().map(|o| o.sensor.as_str()).collect();
        assert_eq!(names, ["outsideTemp", "insideTemp", "insideHumidity"]);
    }

    #[test]
    #[traced_test]
    fn test_missing_device_is_skipped_without_aborting_cycle() {
        let dir = TempDir::new().unwrap();
        let sensors = fake_tree(
            dir.path(),
            &[
                ("present", "28-000000000001", "temperature", Some("20000")),
                ("absent", "28-00000000dead", "temperature", None),
                ("alsoPresent", "28-000000000003", "temperature", Some("21000")),
            ],
        );
        let mut acquisition = build(sensors, SystemPoll);

        let report = acquisition.cycle().unwrap();

        assert_eq!(report.published, 2);
        assert_eq!(report.skipped, 1);
        let names: Vec<_> = acquisition.sink().iter().map(|o| o.sensor.as_str()).collect();
        assert_eq!(names, ["present", "alsoPresent"]);
        assert!(logs_contain("Failed to open"));
    }

    #[test]
    fn test_device_reappearing_is_picked_up_next_cycle() {
        let dir = TempDir::new().unwrap();
        let sensors = fake_tree(
            dir.path(),
            &[("flaky", "28-000000000001", "temperature", None)],
        );
        let path = sensors[0].device_path();
        let mut acquisition = build(sensors, SystemPoll);

        let first = acquisition.cycle().unwrap();
        assert_eq!(first.published, 0);
        assert_eq!(first.timed_out, 1);

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "19000\n").unwrap();

        let second = acquisition.cycle().unwrap();
        assert_eq!(second.published, 1);
        assert_eq!(acquisition.sink()[0].payload.value(), "19.00");
    }

    #[test]
    #[traced_test]
    fn test_timeout_produces_no_payload_and_warns_per_sensor() {
        let dir = TempDir::new().unwrap();
        let mut acquisition = build(three_sensors(dir.path()), Scripted::new([Step::Timeout]));

        let report = acquisition.cycle().unwrap();

        assert_eq!(report.published, 0);
        assert_eq!(report.timed_out, 3);
        assert!(acquisition.sink().is_empty());
        assert!(logs_contain("Timeout read value for 'insideTemp': 34750"));
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("Timed out waiting for")).count() {
                3 => Ok(()),
                n => Err(format!("expected 3 timeout warnings, got {}", n)),
            }
        });
    }

    #[test]
    #[traced_test]
    fn test_read_error_is_soft() {
        let dir = TempDir::new().unwrap();
        let sensors = three_sensors(dir.path());
        // A directory opens fine but fails every read.
        let broken = sensors[1].device_path();
        fs::remove_file(&broken).unwrap();
        fs::create_dir(&broken).unwrap();

        let scripted = Scripted::new([Step::Ready(vec![POLLIN, POLLIN, POLLIN])]);
        let mut acquisition = build(sensors, scripted);

        let report = acquisition.cycle().unwrap();

        assert_eq!(report.published, 2);
        assert_eq!(report.skipped, 1);
        assert!(logs_contain("Read Error on 'insideTemp'"));
    }

    #[test]
    fn test_hangup_is_fatal() {
        let dir = TempDir::new().unwrap();
        let scripted = Scripted::new([Step::Ready(vec![POLLIN, POLLHUP, POLLIN])]);
        let mut acquisition = build(three_sensors(dir.path()), scripted);

        let err = acquisition.cycle().unwrap_err();

        match err {
            AcquisitionError::Hangup { sensor, path } => {
                assert_eq!(sensor, "insideTemp");
                assert!(path.ends_with("28-000000000002/temperature"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Sensors before the hangup were already drained, later ones never are.
        let names: Vec<_> = acquisition.sink().iter().map(|o| o.sensor.as_str()).collect();
        assert_eq!(names, ["outsideTemp"]);
    }

    #[test]
    fn test_poll_error_is_fatal() {
        let dir = TempDir::new().unwrap();
        let scripted = Scripted::new([Step::Ready(vec![0, 0, POLLERR])]);
        let mut acquisition = build(three_sensors(dir.path()), scripted);

        let err = acquisition.cycle().unwrap_err();
        assert!(matches!(err, AcquisitionError::PollError { ref sensor, .. } if sensor == "insideHumidity"));
    }

    #[test]
    fn test_invalid_handle_is_skipped() {
        let dir = TempDir::new().unwrap();
        let scripted = Scripted::new([Step::Ready(vec![POLLNVAL, POLLIN, 0])]);
        let mut acquisition = build(three_sensors(dir.path()), scripted);

        let report = acquisition.cycle().unwrap();
        assert_eq!(report.published, 1);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_wait_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let scripted = Scripted::new([Step::Fail(io::ErrorKind::InvalidInput)]);
        let mut acquisition = build(three_sensors(dir.path()), scripted);

        let err = acquisition.cycle().unwrap_err();
        assert!(matches!(err, AcquisitionError::Wait(ref e) if e.kind() == io::ErrorKind::InvalidInput));
    }

    #[test]
    fn test_run_stops_after_hangup_without_further_cycles() {
        let dir = TempDir::new().unwrap();
        let scripted = Scripted::new([
            Step::Ready(vec![POLLIN, POLLIN, POLLIN]),
            Step::Timeout,
            Step::Ready(vec![POLLHUP, 0, 0]),
            Step::Ready(vec![POLLIN, POLLIN, POLLIN]),
        ]);
        let mut acquisition = build(three_sensors(dir.path()), scripted);

        let err = acquisition.run().unwrap_err();

        assert!(matches!(err, AcquisitionError::Hangup { .. }));
        assert_eq!(acquisition.multiplexer().calls, 3);
        assert_eq!(acquisition.sink().len(), 3);
    }

    #[test]
    #[traced_test]
    fn test_undrained_channel_does_not_stall_cycles() {
        let dir = TempDir::new().unwrap();
        let (sink, mut rx) = sink::channel(2);
        let mut acquisition = AcquisitionLoop::new(
            three_sensors(dir.path()),
            Duration::from_millis(50),
            Formatter::default(),
            SystemPoll,
            sink,
        );

        let first = acquisition.cycle().unwrap();
        assert_eq!(first.published, 2);
        assert_eq!(first.dropped, 1);

        for _ in 0..2 {
            let report = acquisition.cycle().unwrap();
            assert_eq!(report.published, 0);
            assert_eq!(report.dropped, 3);
        }

        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|l| l.contains("Dropping payload") && l.contains("Payload channel full"))
                .count()
            {
                7 => Ok(()),
                n => Err(format!("expected 7 dropped payloads, got {}", n)),
            }
        });
        // Only the first two readings ever made it into the channel.
        assert_eq!(rx.try_recv().unwrap().sensor, "outsideTemp");
        assert_eq!(rx.try_recv().unwrap().sensor, "insideTemp");
        assert!(rx.try_recv().is_err());
    }
}
