//! Stemsync Player - plays a session of stem tracks in sync
//!
//! Loads every track of a session file, each into its own audio graph on the
//! output device, and takes line commands on stdin (`help` lists them).
//!
//! ## Command line flags
//!
//! - `--config <engine.yaml>`: engine settings (default: the user config dir)
//! - `--reference <N>`: sync every track to track N once loaded
//! - `--bounce <out.wav>`: render offline to a WAV file instead of playing
//! - `--seconds <S>`: bounce length
//! - `--list-devices`: print output devices and exit

mod args;
mod bounce;
mod commands;

use std::io::BufRead;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use stemsync_core::audio::get_output_devices;
use stemsync_core::backend::GraphFactory;
use stemsync_core::config::{default_config_path, load_config, EngineConfig, SessionConfig};
use stemsync_core::engine::{MixerHandle, SyncMode, TrackEngine};
use stemsync_core::graph::{DeviceGraphFactory, OfflineGraphFactory};
use stemsync_core::{LoadEvent, Session};

use args::{parse_args, Args};
use commands::{parse_command, Command, HELP};

/// Longest wait for a session's stems before giving up
const LOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// How often the command loop checks for finished loads
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    if args.list_devices {
        print_devices();
        return Ok(());
    }

    // Name the decode pool's threads so they are recognizable in profilers
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("rayon-decode-{}", i))
        .build_global()
    {
        log::warn!("Rayon thread pool already initialized: {}", e);
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| default_config_path("engine.yaml"));
    let engine: EngineConfig = load_config(&config_path);

    let session_path = args.session.as_deref().context("No session file given")?;
    let session_config = SessionConfig::load(session_path)?;
    log::info!("stemsync-player starting with {} tracks", session_config.tracks.len());

    if let Some(out) = &args.bounce {
        let factory = OfflineGraphFactory::new(engine.output.sample_rate, engine.pitch_quality);
        let mut session = Session::from_config(factory, &engine, &session_config)?;
        report(&session.wait_for_loads(LOAD_TIMEOUT));
        apply_reference(&mut session, &args);
        let frames = bounce::bounce(&mut session, out, args.seconds)?;
        println!("Wrote {} frames to {}", frames, out.display());
        return Ok(());
    }

    let factory = DeviceGraphFactory::new(&engine.output, engine.pitch_quality)
        .context("Failed to open the audio output")?;
    let mut session = Session::from_config(factory, &engine, &session_config)?;
    run_interactive(&mut session, &args, engine.jump_seconds)
}

fn run_interactive<F: GraphFactory>(session: &mut Session<F>, args: &Args, jump_seconds: f64) -> Result<()> {
    let (line_tx, line_rx) = mpsc::channel::<String>();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines().map_while(Result::ok) {
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn stdin reader")?;

    println!("Loading stems... (type \"help\" for commands)");
    let mut reference_pending = args.reference.is_some();

    loop {
        let events = session.pump();
        report(&events);
        if reference_pending && session.pending_count() == 0 {
            apply_reference(session, args);
            reference_pending = false;
        }

        let line = match line_rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => line,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };

        match parse_command(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => execute(session, command, jump_seconds),
            Ok(None) => {}
            Err(e) => println!("{:#}", e),
        }
    }

    session.pause_all();
    log::info!("stemsync-player shutting down");
    Ok(())
}

fn execute<F: GraphFactory>(session: &mut Session<F>, command: Command, jump_seconds: f64) {
    match command {
        Command::Play => session.play_all(),
        Command::Pause => session.pause_all(),
        Command::Jump(seconds) => session.jump(seconds),
        Command::Forward => session.jump(jump_seconds),
        Command::Back => session.jump(-jump_seconds),
        Command::Volume { track, stem, pct } => match session.registry_mut().get_mut(track) {
            Some(engine) => engine.set_volume_pct(&stem, pct),
            None => println!("No track {}", track + 1),
        },
        Command::ResetVolumes(Some(track)) => match session.registry_mut().get_mut(track) {
            Some(engine) => engine.reset_volumes(),
            None => println!("No track {}", track + 1),
        },
        Command::ResetVolumes(None) => session.registry_mut().all_mut().for_each(|e| e.reset_volumes()),
        Command::Sync { reference, mode } => match session.sync(reference, mode) {
            Ok(report) => println!(
                "Synced to track {}: {} corrected, {} skipped",
                reference + 1,
                report.corrected,
                report.skipped
            ),
            Err(e) => println!("{}", e),
        },
        Command::Reset => session.reset_sync(),
        Command::Status => print_status(session),
        Command::Devices => print_devices(),
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
}

fn apply_reference<F: GraphFactory>(session: &mut Session<F>, args: &Args) {
    let Some(track) = args.reference else { return };
    if let Err(e) = session.sync(track - 1, SyncMode::TempoAndPitch) {
        log::warn!("Could not sync to track {}: {}", track, e);
    }
}

fn report(events: &[LoadEvent]) {
    for event in events {
        match event {
            LoadEvent::Ready { track, handle } => log::info!("Track {} ready as {}", track, handle),
            LoadEvent::Failed { track, error } => println!("Track {} failed to load: {}", track, error),
        }
    }
}

fn print_status<F: GraphFactory>(session: &Session<F>) {
    if session.registry().is_empty() {
        println!("No tracks ready ({} loading)", session.pending_count());
        return;
    }
    for (index, engine) in session.registry().all().enumerate() {
        println!("{:>2}. {}", index + 1, describe(engine));
        let stems: Vec<String> = engine
            .stems()
            .iter()
            .map(|s| format!("{} {:.0}%{}", s.name, s.pct, if s.muted { " (muted)" } else { "" }))
            .collect();
        println!("    {}", stems.join(", "));
    }
    if session.pending_count() > 0 {
        println!("    ({} loading)", session.pending_count());
    }
}

fn describe<B: stemsync_core::backend::RenderBackend>(engine: &TrackEngine<B>) -> String {
    let metadata = engine.metadata();
    format!(
        "{} [{:?}] {:.1}s  {} @ {:.1} BPM  rate {:.4}  pitch {:+.3} st",
        engine.label(),
        engine.state(),
        engine.current_position(),
        metadata.key_label(),
        metadata.tempo,
        MixerHandle::playback_rate(engine),
        MixerHandle::pitch_shift(engine),
    )
}

fn print_devices() {
    match get_output_devices() {
        Ok(devices) if devices.is_empty() => println!("No output devices found"),
        Ok(devices) => {
            for device in devices {
                println!("{} - {} ch, rates {:?}", device, device.max_channels, device.sample_rates);
            }
        }
        Err(e) => println!("Failed to list devices: {}", e),
    }
}
