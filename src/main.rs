use std::{process, sync::Arc, thread, time::Duration};

use hive_telemetry::{
    cli::{self, Args, Command},
    config::Config,
    core::{
        acquisition::AcquisitionLoop,
        error::AcquisitionError,
        formatter::Formatter,
        poll::{self, SystemPoll},
        publisher::{Dispatcher, LogPublisher, Publisher},
        sensor::SensorDescriptor,
        sink,
    },
    logger::LoggerManager,
    print_error,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Payloads buffered between the acquisition thread and the dispatcher.
const PAYLOAD_CHANNEL_CAPACITY: usize = 64;

/// How long a graceful shutdown waits for the MQTT disconnect.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[cfg(feature = "mqtt")]
type Transport = Option<hive_telemetry_mqtt::MqttInstance>;
#[cfg(not(feature = "mqtt"))]
type Transport = Option<()>;

fn parse_args() -> Args {
    match Command::parse(std::env::args().skip(1)) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            println!("{}", cli::usage());
            process::exit(0);
        }
        Ok(Command::Version) => {
            println!("{}", cli::version());
            process::exit(0);
        }
        Err(e) => {
            print_error!("{}", e);
            eprintln!("{}", cli::usage());
            process::exit(1);
        }
    }
}

fn load_config(args: &Args) -> Config {
    let mut cfg = Config::new(args.config.as_deref()).unwrap_or_else(|e| {
        print_error!("{}", e);
        process::exit(1);
    });
    if let Some(level) = &args.log_level {
        cfg.logger.override_level(level.as_str());
    }
    cfg
}

#[cfg(feature = "mqtt")]
fn start_publisher(cfg: &Config) -> (Arc<dyn Publisher>, Transport) {
    if !cfg.transport.enabled {
        info!("MQTT transport disabled, payloads are only logged");
        return (Arc::new(LogPublisher), None);
    }

    debug!("{:#?}", cfg.transport);
    let manager = hive_telemetry_mqtt::MqttManager::from_config(cfg.transport.clone())
        .unwrap_or_else(|e| {
            error!("Failed to create MqttManager: {}", e);
            process::exit(1);
        });
    let instance = manager.start().unwrap_or_else(|e| {
        error!("Failed to start MQTT client: {}", e);
        process::exit(1);
    });
    info!("MQTT client started");

    (Arc::new(instance.publisher()), Some(instance))
}

#[cfg(not(feature = "mqtt"))]
fn start_publisher(_cfg: &Config) -> (Arc<dyn Publisher>, Transport) {
    info!("Running without MQTT, payloads are only logged");
    (Arc::new(LogPublisher), None)
}

#[cfg(feature = "mqtt")]
async fn stop_transport(transport: Transport) {
    let Some(instance) = transport else {
        return;
    };
    debug!("Cancellation token triggered, MQTT disconnecting...");
    match tokio::time::timeout(SHUTDOWN_GRACE, instance.shutdown()).await {
        Ok(Ok(())) => debug!("MQTT client stopped"),
        Ok(Err(e)) => error!("MQTT client stopped with error: {}", e),
        Err(_) => error!("MQTT client did not stop within {:?}", SHUTDOWN_GRACE),
    }
}

#[cfg(not(feature = "mqtt"))]
async fn stop_transport(_transport: Transport) {}

/// Runs the acquisition loop on its own OS thread. The receiver resolves
/// only if the loop stops, which always means a fatal error.
fn spawn_acquisition(
    sensors: Vec<SensorDescriptor>,
    poll_interval: Duration,
    formatter: Formatter,
    sink: sink::ChannelSink,
) -> oneshot::Receiver<AcquisitionError> {
    let (done_tx, done_rx) = oneshot::channel();

    let spawned = thread::Builder::new()
        .name("acquisition".into())
        .spawn(move || {
            if let Err(e) = poll::block_termination_signals() {
                warn!("Failed to block termination signals on acquisition thread: {}", e);
            }
            let mut acquisition =
                AcquisitionLoop::new(sensors, poll_interval, formatter, SystemPoll, sink);
            let err = match acquisition.run() {
                Ok(never) => match never {},
                Err(e) => e,
            };
            let _ = done_tx.send(err);
        });

    if let Err(e) = spawned {
        error!("Failed to spawn acquisition thread: {}", e);
        process::exit(1);
    }

    done_rx
}

#[tokio::main]
async fn main() {
    let args = parse_args();
    let cfg = load_config(&args);

    let logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting hive-telemetry version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log filter: {}", cfg.logger.filter_directives());

    let sensors = cfg.sensors.descriptors().unwrap_or_else(|e| {
        error!("{}", e);
        process::exit(1);
    });
    for sensor in &sensors {
        info!("Sensor {}", sensor);
    }

    let (publisher, transport) = start_publisher(&cfg);

    let (sink, rx) = sink::channel(PAYLOAD_CHANNEL_CAPACITY);
    let dispatcher = tokio::spawn(Dispatcher::new(publisher, rx).run());

    let acquisition = spawn_acquisition(
        sensors,
        cfg.sensors.poll_interval(),
        Formatter::new(cfg.sensors.malformed_reading),
        sink,
    );

    tokio::select! {
        result = acquisition => {
            match result {
                Ok(e) => error!("Acquisition stopped: {}", e),
                Err(_) => error!("Acquisition thread exited unexpectedly"),
            }
            process::exit(1);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
            dispatcher.abort();
            stop_transport(transport).await;
            info!("Shutdown complete");
        }
    }
}
