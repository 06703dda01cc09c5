//! tracker-link - Simulated tracker node daemon
//!
//! Runs a [`Session`] against a real tracking server with simulated IMUs in
//! place of hardware. Discovery goes to the configured address (broadcast by
//! default); once a server answers, sensor info and bundled motion stream at
//! the configured tick rate until Ctrl-C.

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracker_link::config::LinkConfig;
use tracker_link::error::{Error, Result};
use tracker_link::protocol::NODE_SENSOR_ID;
use tracker_link::sim::{NoiseGenerator, SimulatedImu};
use tracker_link::{ConnectionState, MonotonicClock, Sensor, ServerEvent, Session, UdpTransport};

/// Default config location
const DEFAULT_CONFIG_PATH: &str = "tracker.toml";

/// Battery report period
const BATTERY_INTERVAL: Duration = Duration::from_secs(10);

/// Link statistics log period
const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Parse config path from command line arguments.
///
/// Supports:
/// - `tracker-link <path>` (positional)
/// - `tracker-link --config <path>` (flag-based)
/// - `tracker-link -c <path>` (short flag)
///
/// Defaults to `tracker.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    DEFAULT_CONFIG_PATH.to_string()
}

fn load_config(path: &str) -> Result<LinkConfig> {
    if Path::new(path).exists() {
        LinkConfig::from_file(path)
    } else {
        Ok(LinkConfig::default())
    }
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = load_config(&config_path)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("tracker-link v{} starting...", env!("CARGO_PKG_VERSION"));
    if Path::new(&config_path).exists() {
        log::info!("Using config: {}", config_path);
    } else {
        log::info!("No config at {}, using defaults", config_path);
    }
    log::info!(
        "Server {}, {} simulated sensor(s) at {} ms",
        config.server.socket_addr(),
        config.simulation.sensors,
        config.simulation.tick_ms
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Io(std::io::Error::other(e)))?;

    let transport = UdpTransport::bind("0.0.0.0:0")?;
    let mut session = Session::new(transport, MonotonicClock::new(), &config);

    let sim = &config.simulation;
    let mut imus: Vec<SimulatedImu> = (0..sim.sensors)
        .map(|id| {
            let seed = match sim.seed {
                0 => 0,
                s => s.wrapping_add(u64::from(id)),
            };
            SimulatedImu::new(id, sim, NoiseGenerator::new(seed))
        })
        .collect();

    let tick = Duration::from_millis(sim.tick_ms);
    let mut state = session.state();
    let mut last_battery = Instant::now();
    let mut last_stats = Instant::now();

    while running.load(Ordering::Relaxed) {
        let started = Instant::now();

        for imu in &mut imus {
            imu.step(sim.tick_ms);
        }
        session.update(&imus);

        while let Some(event) = session.poll_event() {
            handle_event(event, &mut imus);
        }

        if session.state() != state {
            state = session.state();
            log::info!("Link state: {:?}", state);
        }

        if state == ConnectionState::Connected {
            if let Err(e) = session.publish_motion(&imus) {
                log::debug!("Motion not sent: {}", e);
            }
            if last_battery.elapsed() >= BATTERY_INTERVAL {
                last_battery = Instant::now();
                if let Err(e) = session.send_battery_level(4.0, 0.9) {
                    log::debug!("Battery level not sent: {}", e);
                }
            }
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            last_stats = Instant::now();
            log::info!("Link stats: {:?}", session.stats());
        }

        if let Some(remaining) = tick.checked_sub(started.elapsed()) {
            thread::sleep(remaining);
        }
    }

    session.reset();
    log::info!("Final link stats: {:?}", session.stats());
    log::info!("tracker-link stopped");
    Ok(())
}

fn handle_event(event: ServerEvent, imus: &mut [SimulatedImu]) {
    match event {
        ServerEvent::Vibrate => log::info!("Server requested vibration"),
        ServerEvent::SetConfigFlag {
            sensor_id,
            toggle,
            enabled,
        } => {
            for imu in imus
                .iter_mut()
                .filter(|imu| sensor_id == NODE_SENSOR_ID || imu.id() == sensor_id)
            {
                if !imu.apply_config(toggle, enabled) {
                    log::warn!("Sensor {} does not support {:?}", imu.id(), toggle);
                }
            }
        }
    }
}
