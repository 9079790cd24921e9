// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements the `run` command (i.e., running the daemon).

use std::fmt::Write;
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use env_logger::Env;
use log::{debug, error, info, warn};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use almanac::catalog::Catalog;
use almanac::ctl::{self, Outcome};
use almanac::zone::EventType;

use crate::args::RunArgs;
use crate::config::{self, Config, ZoneConfig};
use crate::control::LineChannel;
use crate::zones;

/// The longest the event worker sleeps before checking for due events.
const MAX_EVENT_WAIT: Duration = Duration::from_secs(1);

/// Runs the daemon.
pub fn run(args: RunArgs) {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));

    if let Err(e) = try_running(args) {
        let mut message = String::from("Failed to run:");
        for (i, cause) in e.chain().enumerate() {
            let _ = write!(message, "\n[{}] {}", i + 1, cause);
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Exiting with success.");
}

/// Requests made of the main thread by the signal and control threads.
#[derive(Debug)]
enum Action {
    Reload,
    Stop,
}

fn try_running(run_args: RunArgs) -> Result<()> {
    info!(
        "Almanac daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    // Get the configuration, either from the file system or from the
    // command line arguments, as appropriate.
    let (config, reload_source) = if let Some(config_path) = run_args.config.clone() {
        info!("Loading the configuration from {}.", config_path.display());
        let config = config::load_from_path(&config_path, false)
            .context("failed to load the configuration")?;
        (config, ReloadSource::Config(config_path))
    } else {
        info!("Loading the configuration from the command line.");
        let config = config::load_from_args(run_args);
        let reload_source = ReloadSource::Args(config.zones.clone());
        (config, reload_source)
    };
    let journal_max_size = config.journal.max_size;

    // Load the zones.
    if config.zones.len() == 1 {
        info!("Beginning to load 1 zone.");
    } else {
        info!("Beginning to load {} zones.", config.zones.len());
    }
    let catalog = Arc::new(Catalog::new());
    zones::load(&config.zones, journal_max_size, &catalog);

    // Set up signal handling, then start the worker threads.
    let signals = set_up_signal_handling().context("failed to set up signal handling")?;
    let (actions, action_receiver) = mpsc::channel();
    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_thread(signals, actions.clone())?;
    let event_worker = spawn_event_worker(catalog.clone(), shutdown.clone())?;
    spawn_control_thread(catalog.clone(), actions)?;
    info!("Set-up is complete; serving control requests on standard input.");

    // Process incoming actions.
    for action in action_receiver {
        match action {
            Action::Reload => {
                info!("Reloading the configuration.");
                if let Err(e) = reload(&reload_source, journal_max_size, &catalog) {
                    let mut message = String::from("Failed to reload the configuration:");
                    for (i, cause) in e.chain().enumerate() {
                        let _ = write!(message, "\n[{}] {}", i + 1, cause);
                    }
                    error!("{}", message);
                }
                event_worker.thread().unpark();
            }
            Action::Stop => break,
        }
    }

    // Shut down: stop the event worker, then write out every zone that
    // has unflushed changes.
    shutdown.store(true, Ordering::SeqCst);
    event_worker.thread().unpark();
    if event_worker.join().is_err() {
        error!("The event worker panicked.");
    }
    for zone in catalog.zones() {
        if zone.contents().is_some() && zone.journal().is_some() {
            if let Err(e) = zone.flush() {
                warn!("Zone {}: failed to flush on shutdown: {}", zone.name(), e);
            }
        }
    }
    info!("Shutdown complete.");
    Ok(())
}

fn set_up_signal_handling() -> Result<Signals> {
    let all_signals = &[SIGHUP, SIGINT, SIGTERM];
    let term_signals = &[SIGINT, SIGTERM];
    let already_terminating = Arc::new(AtomicBool::new(false));

    // This sets up signal handlers to exit immediately if a second
    // termination signal arrives before the process finishes shutting
    // down gracefully.
    for sig in term_signals {
        signal_hook::flag::register_conditional_shutdown(*sig, 1, already_terminating.clone())?;
        signal_hook::flag::register(*sig, already_terminating.clone())?;
    }

    Signals::new(all_signals).map_err(Into::into)
}

fn spawn_signal_thread(mut signals: Signals, actions: Sender<Action>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("signals".to_owned())
        .spawn(move || {
            for signal in signals.forever() {
                let action = match signal {
                    SIGHUP => {
                        info!("Received SIGHUP; reloading zones.");
                        Action::Reload
                    }
                    SIGINT => {
                        info!("Received SIGINT; shutting down.");
                        Action::Stop
                    }
                    SIGTERM => {
                        info!("Received SIGTERM; shutting down.");
                        Action::Stop
                    }
                    _ => continue,
                };
                if actions.send(action).is_err() {
                    break;
                }
            }
        })
        .context("failed to start the signal thread")
}

/// Starts the thread that runs zone events as they fall due. Events
/// that the zones do not carry out themselves belong to the transfer,
/// NOTIFY, and dynamic update machinery, which this daemon does not
/// run; they are logged and dropped.
fn spawn_event_worker(catalog: Arc<Catalog>, shutdown: Arc<AtomicBool>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("events".to_owned())
        .spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                let now = Instant::now();
                for (zone, event) in catalog.run_due_events(now) {
                    if event == EventType::Update {
                        let mut dropped = 0;
                        while zone.dequeue_update().is_some() {
                            dropped += 1;
                        }
                        if dropped > 0 {
                            warn!(
                                "Zone {}: dropped {} dynamic update(s), \
                                 which are not processed by this server",
                                zone.name(),
                                dropped,
                            );
                        }
                    } else {
                        debug!("Zone {}: no handler for the {} event", zone.name(), event);
                    }
                }
                let wait = catalog
                    .next_event()
                    .map_or(MAX_EVENT_WAIT, |at| at.saturating_duration_since(now))
                    .min(MAX_EVENT_WAIT);
                if !wait.is_zero() {
                    thread::park_timeout(wait);
                }
            }
        })
        .context("failed to start the event worker")
}

/// Starts the thread that serves control requests from standard input,
/// answering on standard output.
fn spawn_control_thread(catalog: Arc<Catalog>, actions: Sender<Action>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("control".to_owned())
        .spawn(move || {
            let stdin = io::stdin();
            let mut channel = LineChannel::new(stdin.lock(), io::stdout());
            while !channel.is_closed() {
                let action = match ctl::process(&catalog, &mut channel) {
                    Ok(Outcome::Continue) => continue,
                    Ok(Outcome::Reload) => Action::Reload,
                    Ok(Outcome::Stop) => Action::Stop,
                    Err(e) => {
                        error!("Control channel failed: {}", e);
                        break;
                    }
                };
                if actions.send(action).is_err() {
                    break;
                }
            }
            debug!("Control channel closed.");
        })
        .context("failed to start the control thread")
}

/// Where the zone configuration is reloaded from.
enum ReloadSource {
    Args(Vec<ZoneConfig>),
    Config(PathBuf),
}

fn reload(reload_source: &ReloadSource, journal_max_size: u64, catalog: &Catalog) -> Result<()> {
    let zone_configs = match reload_source {
        ReloadSource::Args(zone_configs) => zone_configs.clone(),
        ReloadSource::Config(path) => {
            let Config { zones, .. } =
                config::load_from_path(path, true).context("failed to reload the configuration")?;
            zones
        }
    };
    zones::reload(&zone_configs, journal_max_size, catalog);
    Ok(())
}
