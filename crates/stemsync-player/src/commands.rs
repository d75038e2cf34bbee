//! Line commands read from stdin
//!
//! Track numbers are 1-based registry positions, as shown by `status`.

use anyhow::{bail, Context, Result};
use stemsync_core::engine::SyncMode;

pub const HELP: &str = "\
Commands:
  play | pause                  start/stop every track
  jump <seconds>                move every track (negative goes back)
  ff | rw                       jump forward/back by the configured step
  vol <track> <stem> <0-100>    set one stem's volume (0 mutes)
  reset-volumes [track]         back to the baseline volume
  sync <track>                  match tempo and key to a track
  sync-tempo <track>            match tempo only, keeping each key
  sync-pitch <track>            match key only
  reset                         rate 1.0 and no pitch shift everywhere
  status                        show every track
  devices                       list output devices
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Jump(f64),
    Forward,
    Back,
    Volume { track: usize, stem: String, pct: f64 },
    ResetVolumes(Option<usize>),
    Sync { reference: usize, mode: SyncMode },
    Reset,
    Status,
    Devices,
    Help,
    Quit,
}

/// Parse one input line. Blank lines give `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (name, args.as_slice()) {
        ("play", []) => Command::Play,
        ("pause", []) => Command::Pause,
        ("jump", [seconds]) => Command::Jump(number(seconds)?),
        ("ff", []) => Command::Forward,
        ("rw", []) => Command::Back,
        ("vol", [track, stem, pct]) => Command::Volume {
            track: position(track)?,
            stem: stem.to_string(),
            pct: number(pct)?,
        },
        ("reset-volumes", []) => Command::ResetVolumes(None),
        ("reset-volumes", [track]) => Command::ResetVolumes(Some(position(track)?)),
        ("sync", [track]) => sync(track, SyncMode::TempoAndPitch)?,
        ("sync-tempo", [track]) => sync(track, SyncMode::TempoOnly)?,
        ("sync-pitch", [track]) => sync(track, SyncMode::PitchOnly)?,
        ("reset", []) => Command::Reset,
        ("status", []) => Command::Status,
        ("devices", []) => Command::Devices,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit" | "q", []) => Command::Quit,
        (name, _) => bail!("Unrecognized command {:?} (try \"help\")", name),
    };
    Ok(Some(command))
}

fn sync(track: &str, mode: SyncMode) -> Result<Command> {
    Ok(Command::Sync {
        reference: position(track)?,
        mode,
    })
}

fn number(s: &str) -> Result<f64> {
    let value: f64 = s.parse().with_context(|| format!("Not a number: {:?}", s))?;
    if !value.is_finite() {
        bail!("Not a finite number: {:?}", s);
    }
    Ok(value)
}

/// 1-based track number to registry position
fn position(s: &str) -> Result<usize> {
    let n: usize = s.parse().with_context(|| format!("Not a track number: {:?}", s))?;
    n.checked_sub(1).context("Track numbers start at 1")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        parse_command(line).unwrap().unwrap()
    }

    #[test]
    fn test_transport_commands() {
        assert_eq!(parse("play"), Command::Play);
        assert_eq!(parse("  pause  "), Command::Pause);
        assert_eq!(parse("jump -10"), Command::Jump(-10.0));
        assert_eq!(parse("ff"), Command::Forward);
        assert_eq!(parse("q"), Command::Quit);
    }

    #[test]
    fn test_track_numbers_are_one_based() {
        assert_eq!(
            parse("vol 2 drums 0"),
            Command::Volume {
                track: 1,
                stem: "drums".to_string(),
                pct: 0.0
            }
        );
        assert_eq!(
            parse("sync 1"),
            Command::Sync {
                reference: 0,
                mode: SyncMode::TempoAndPitch
            }
        );
        assert_eq!(parse("reset-volumes 3"), Command::ResetVolumes(Some(2)));
        assert!(parse_command("sync 0").is_err());
    }

    #[test]
    fn test_sync_modes() {
        assert!(matches!(parse("sync-tempo 2"), Command::Sync { mode: SyncMode::TempoOnly, .. }));
        assert!(matches!(parse("sync-pitch 2"), Command::Sync { mode: SyncMode::PitchOnly, .. }));
    }

    #[test]
    fn test_blank_and_bad_lines() {
        assert!(parse_command("").unwrap().is_none());
        assert!(parse_command("   ").unwrap().is_none());
        assert!(parse_command("dance").is_err());
        assert!(parse_command("jump").is_err());
        assert!(parse_command("jump far").is_err());
        assert!(parse_command("jump NaN").is_err());
        assert!(parse_command("vol 1 drums").is_err());
    }
}
