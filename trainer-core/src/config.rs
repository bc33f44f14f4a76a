//! # Settings
//!
//! Runtime configuration for the tuner and the note trainer, loaded from a
//! TOML file. Every field has a default, so a partial file (or no file at
//! all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::Result;
use crate::tuning;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub audio: AudioSettings,
    pub pitch: PitchSettings,
    pub tuner: TunerSettings,
    pub trainer: TrainerSettings,
    pub scores: ScoreSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioSettings {
    /// Case-insensitive substring of the input device name. `None` picks
    /// the host's default input device.
    pub device: Option<String>,
    pub sample_rate: u32,
    /// Samples per analysis window.
    pub frame_size: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 44100,
            frame_size: 2048,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PitchSettings {
    /// RMS below which a window is treated as silence.
    pub amplitude_threshold: f32,
    /// Largest normalised YIN dip still accepted as a pitched tone.
    pub clarity_threshold: f32,
    pub refine_with_spectrum: bool,
}

impl Default for PitchSettings {
    fn default() -> Self {
        Self {
            amplitude_threshold: 0.01,
            clarity_threshold: 0.1,
            refine_with_spectrum: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TunerSettings {
    pub a4_frequency: f32,
    /// Consecutive ticks that must agree on a new note before the display
    /// switches to it.
    pub debounce_ticks: u32,
    /// Length of the needle-angle averaging window.
    pub needle_window: usize,
    pub in_tune_threshold_cents: f32,
    pub tick_interval_ms: u64,
}

impl Default for TunerSettings {
    fn default() -> Self {
        Self {
            a4_frequency: tuning::DEFAULT_A4_FREQUENCY,
            debounce_ticks: 3,
            needle_window: 10,
            in_tune_threshold_cents: 5.0,
            tick_interval_ms: 30,
        }
    }
}

impl TunerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainerSettings {
    pub time_per_guess_s: u32,
    pub total_trials: u32,
    /// Lowest MIDI note accepted while recording a guess.
    pub min_note: i32,
    /// Highest MIDI note accepted while recording a guess.
    pub max_note: i32,
    pub poll_interval_ms: u64,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            time_per_guess_s: 10,
            total_trials: 10,
            min_note: 40,
            max_note: 85,
            poll_interval_ms: 50,
        }
    }
}

impl TrainerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoreSettings {
    pub path: Option<PathBuf>,
}

impl ScoreSettings {
    /// The configured score file, or `<data_dir>/guitar-trainer/scores.json`.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("guitar-trainer")
                .join("scores.json")
        })
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the default XDG config path (~/.config/guitar-trainer/config.toml)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("guitar-trainer").join("config.toml"))
    }

    /// Loads settings from the default path if the file exists. A file that
    /// fails to parse is reported and replaced by defaults.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to parse settings at {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }
}
