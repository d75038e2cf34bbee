//! Command line flags
//!
//! ```text
//! stemsync-player <session.yaml> [--config <engine.yaml>] [--reference <N>]
//!                 [--bounce <out.wav>] [--seconds <S>] [--list-devices]
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// Length of a bounce when `--seconds` is not given
pub const DEFAULT_BOUNCE_SECONDS: f64 = 30.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub session: Option<PathBuf>,
    /// Engine config; the default config path when absent
    pub config: Option<PathBuf>,
    /// 1-based track to sync everything to once loaded
    pub reference: Option<usize>,
    pub bounce: Option<PathBuf>,
    pub seconds: f64,
    pub list_devices: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            session: None,
            config: None,
            reference: None,
            bounce: None,
            seconds: DEFAULT_BOUNCE_SECONDS,
            list_devices: false,
        }
    }
}

/// Parse everything after the program name
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => parsed.config = Some(PathBuf::from(value(&mut args, "--config")?)),
            "--bounce" => parsed.bounce = Some(PathBuf::from(value(&mut args, "--bounce")?)),
            "--reference" => {
                let n: usize = value(&mut args, "--reference")?
                    .parse()
                    .context("--reference expects a track number")?;
                if n == 0 {
                    bail!("Track numbers start at 1");
                }
                parsed.reference = Some(n);
            }
            "--seconds" => {
                let seconds: f64 = value(&mut args, "--seconds")?
                    .parse()
                    .context("--seconds expects a number")?;
                if !seconds.is_finite() || seconds <= 0.0 {
                    bail!("--seconds must be positive, got {}", seconds);
                }
                parsed.seconds = seconds;
            }
            "--list-devices" => parsed.list_devices = true,
            flag if flag.starts_with("--") => bail!("Unknown flag: {}", flag),
            path => {
                if parsed.session.is_some() {
                    bail!("Only one session file may be given");
                }
                parsed.session = Some(PathBuf::from(path));
            }
        }
    }

    if parsed.session.is_none() && !parsed.list_devices {
        bail!("Usage: stemsync-player <session.yaml> [--config <engine.yaml>] [--reference <N>] [--bounce <out.wav>] [--seconds <S>] [--list-devices]");
    }
    Ok(parsed)
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next().with_context(|| format!("{} expects a value", flag))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Args> {
        parse_args(line.split_whitespace().map(String::from))
    }

    #[test]
    fn test_session_only() {
        let args = parse("set.yaml").unwrap();
        assert_eq!(args.session, Some(PathBuf::from("set.yaml")));
        assert_eq!(args.seconds, DEFAULT_BOUNCE_SECONDS);
        assert!(args.bounce.is_none());
    }

    #[test]
    fn test_bounce_flags() {
        let args = parse("set.yaml --bounce mix.wav --seconds 12.5 --reference 2").unwrap();
        assert_eq!(args.bounce, Some(PathBuf::from("mix.wav")));
        assert_eq!(args.seconds, 12.5);
        assert_eq!(args.reference, Some(2));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse("").is_err());
        assert!(parse("set.yaml --seconds").is_err());
        assert!(parse("set.yaml --seconds -3").is_err());
        assert!(parse("set.yaml --reference 0").is_err());
        assert!(parse("set.yaml --loud").is_err());
        assert!(parse("a.yaml b.yaml").is_err());
    }

    #[test]
    fn test_list_devices_needs_no_session() {
        assert!(parse("--list-devices").unwrap().list_devices);
    }
}
