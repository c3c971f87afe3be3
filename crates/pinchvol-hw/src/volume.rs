//! System output volume control.
//!
//! The default output device is driven through the desktop mixer CLI:
//! `wpctl` on PipeWire, `pactl` on PulseAudio (or pipewire-pulse). Both take
//! the linear volume scalar the gesture mapper produces.

use serde::Deserialize;
use std::process::{Command, Stdio};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("audio control disabled by configuration")]
    Disabled,
    #[error("no usable audio mixer found (tried: {0})")]
    NoMixer(String),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: &'static str,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Capability: set the master output volume to a linear scalar in [0, 1].
pub trait VolumeSink {
    fn name(&self) -> &str;
    fn set_volume(&mut self, scalar: f64) -> Result<(), VolumeError>;
}

/// Which mixer to drive, as configured by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeBackend {
    /// Probe `wpctl`, then `pactl`.
    #[default]
    Auto,
    Wpctl,
    Pactl,
    /// Never touch the system volume.
    None,
}

impl FromStr for VolumeBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "wpctl" | "pipewire" => Ok(Self::Wpctl),
            "pactl" | "pulse" | "pulseaudio" => Ok(Self::Pactl),
            "none" | "off" => Ok(Self::None),
            other => Err(format!(
                "unknown volume backend '{other}' (expected auto, wpctl, pactl, none)"
            )),
        }
    }
}

impl std::fmt::Display for VolumeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Wpctl => "wpctl",
            Self::Pactl => "pactl",
            Self::None => "none",
        })
    }
}

/// A mixer command-line tool and how to address the default sink with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mixer {
    Wpctl,
    Pactl,
}

impl Mixer {
    pub fn program(&self) -> &'static str {
        match self {
            Mixer::Wpctl => "wpctl",
            Mixer::Pactl => "pactl",
        }
    }

    /// Arguments for a read-only query that succeeds iff the default sink is reachable.
    fn probe_args(&self) -> Vec<String> {
        match self {
            Mixer::Wpctl => vec!["get-volume".into(), "@DEFAULT_AUDIO_SINK@".into()],
            Mixer::Pactl => vec!["get-sink-volume".into(), "@DEFAULT_SINK@".into()],
        }
    }

    /// Arguments that set the default sink to `scalar` (clamped to [0, 1]).
    pub fn set_args(&self, scalar: f64) -> Vec<String> {
        let scalar = if scalar.is_nan() {
            0.0
        } else {
            scalar.clamp(0.0, 1.0)
        };
        match self {
            Mixer::Wpctl => vec![
                "set-volume".into(),
                "@DEFAULT_AUDIO_SINK@".into(),
                format!("{scalar:.3}"),
            ],
            Mixer::Pactl => vec![
                "set-sink-volume".into(),
                "@DEFAULT_SINK@".into(),
                format!("{:.1}%", scalar * 100.0),
            ],
        }
    }

    fn run(&self, args: &[String]) -> Result<(), VolumeError> {
        let program = self.program();
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| VolumeError::Spawn { program, source })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(VolumeError::CommandFailed {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Volume sink that shells out to a mixer CLI for every set call.
#[derive(Debug)]
pub struct CommandSink {
    mixer: Mixer,
}

impl CommandSink {
    /// Use `mixer` after checking that it can reach the default sink.
    pub fn probe(mixer: Mixer) -> Result<Self, VolumeError> {
        mixer.run(&mixer.probe_args())?;
        Ok(Self { mixer })
    }
}

impl VolumeSink for CommandSink {
    fn name(&self) -> &str {
        self.mixer.program()
    }

    fn set_volume(&mut self, scalar: f64) -> Result<(), VolumeError> {
        let args = self.mixer.set_args(scalar);
        tracing::trace!(mixer = self.mixer.program(), ?args, "setting volume");
        self.mixer.run(&args)
    }
}

/// Open the default output sink for the configured backend.
pub fn open_default_sink(backend: VolumeBackend) -> Result<CommandSink, VolumeError> {
    let candidates: &[Mixer] = match backend {
        VolumeBackend::None => return Err(VolumeError::Disabled),
        VolumeBackend::Wpctl => &[Mixer::Wpctl],
        VolumeBackend::Pactl => &[Mixer::Pactl],
        VolumeBackend::Auto => &[Mixer::Wpctl, Mixer::Pactl],
    };

    let mut last_err = None;
    for &mixer in candidates {
        match CommandSink::probe(mixer) {
            Ok(sink) => {
                tracing::info!(mixer = mixer.program(), "audio control initialized");
                return Ok(sink);
            }
            Err(e) => {
                tracing::debug!(mixer = mixer.program(), error = %e, "mixer probe failed");
                last_err = Some(e);
            }
        }
    }

    match (candidates, last_err) {
        ([_], Some(e)) => Err(e),
        _ => Err(VolumeError::NoMixer(
            candidates
                .iter()
                .map(|m| m.program())
                .collect::<Vec<_>>()
                .join(", "),
        )),
    }
}
