//! Test doubles for driving trials and sessions without audio hardware.
//!
//! The scripted source hands out silent windows and counts opens, closes and
//! reads; the estimators decide what "was played"; the playback records cues
//! and can pull the cancel token at a chosen moment.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use trainer_core::audio::{AudioSource, AudioStream};
use trainer_core::config::{AudioSettings, Settings};
use trainer_core::pitch::{PitchEstimate, PitchEstimator};
use trainer_core::playback::{Cue, Playback};
use trainer_core::{CancelToken, Error, GuitarString, NoteTable, Position, Result, TrialSpec};

pub const TEST_SAMPLE_RATE: u32 = 8_000;
pub const TEST_FRAME_SIZE: usize = 1_000;

/// Windows per one-second trial at the test rate.
pub const FRAMES_PER_SECOND: usize = TEST_SAMPLE_RATE as usize / TEST_FRAME_SIZE;

pub const C4_HZ: f32 = 261.63;
pub const D4_HZ: f32 = 293.66;

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.audio.sample_rate = TEST_SAMPLE_RATE;
    settings.audio.frame_size = TEST_FRAME_SIZE;
    settings.trainer.time_per_guess_s = 1;
    settings
}

/// B string, low position, C: note number 60.
pub fn b_string_low_c() -> TrialSpec {
    TrialSpec::new(GuitarString::B, Position::Low, "C")
}

#[derive(Debug, Default)]
pub struct SourceStats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub frames_read: AtomicUsize,
}

impl SourceStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn frames_read(&self) -> usize {
        self.frames_read.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    pub stats: Arc<SourceStats>,
    /// Every stream fails on the read after this many windows.
    pub fail_after: Option<usize>,
    pub read_delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(frames: usize) -> Self {
        Self {
            fail_after: Some(frames),
            ..Self::default()
        }
    }

    pub fn slow(read_delay: Duration) -> Self {
        Self {
            read_delay: Some(read_delay),
            ..Self::default()
        }
    }
}

pub struct ScriptedStream {
    stats: Arc<SourceStats>,
    fail_after: Option<usize>,
    read_delay: Option<Duration>,
    reads: usize,
}

impl AudioSource for ScriptedSource {
    type Stream = ScriptedStream;

    fn open(&self, _settings: &AudioSettings) -> Result<ScriptedStream> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedStream {
            stats: self.stats.clone(),
            fail_after: self.fail_after,
            read_delay: self.read_delay,
            reads: 0,
        })
    }
}

impl AudioStream for ScriptedStream {
    fn sample_rate(&self) -> u32 {
        TEST_SAMPLE_RATE
    }

    fn read(&mut self) -> Result<Vec<f32>> {
        if self.fail_after.is_some_and(|limit| self.reads >= limit) {
            return Err(Error::Audio("device unplugged".to_string()));
        }
        if let Some(delay) = self.read_delay {
            thread::sleep(delay);
        }
        self.reads += 1;
        self.stats.frames_read.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.0; TEST_FRAME_SIZE])
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Reports the same frequency for every window; `None` is silence.
#[derive(Debug, Clone, Copy)]
pub struct ConstantPitch(pub Option<f32>);

impl PitchEstimator for ConstantPitch {
    fn estimate(&mut self, _signal: &[f32], _sample_rate: u32) -> Option<PitchEstimate> {
        self.0.map(|frequency_hz| PitchEstimate {
            frequency_hz,
            confidence: 1.0,
        })
    }
}

/// Hears `frequency_hz` and pulls the cancel token after `windows` windows.
pub struct CancellingPitch {
    pub frequency_hz: f32,
    pub windows: usize,
    pub cancel: CancelToken,
    seen: usize,
}

impl CancellingPitch {
    pub fn new(frequency_hz: f32, windows: usize, cancel: CancelToken) -> Self {
        Self {
            frequency_hz,
            windows,
            cancel,
            seen: 0,
        }
    }
}

impl PitchEstimator for CancellingPitch {
    fn estimate(&mut self, _signal: &[f32], _sample_rate: u32) -> Option<PitchEstimate> {
        self.seen += 1;
        if self.seen == self.windows {
            self.cancel.cancel();
        }
        Some(PitchEstimate {
            frequency_hz: self.frequency_hz,
            confidence: 1.0,
        })
    }
}

pub struct PanickingPitch;

impl PitchEstimator for PanickingPitch {
    fn estimate(&mut self, _signal: &[f32], _sample_rate: u32) -> Option<PitchEstimate> {
        panic!("estimator blew up");
    }
}

/// Records every cue. Optionally cancels when a given cue is played for
/// the n-th time.
#[derive(Clone, Default)]
pub struct RecordingPlayback {
    pub cues: Arc<Mutex<Vec<Cue>>>,
    cancel_on: Option<(Cue, usize, CancelToken)>,
}

impl RecordingPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_on(cue: Cue, nth: usize, cancel: CancelToken) -> Self {
        Self {
            cues: Arc::default(),
            cancel_on: Some((cue, nth, cancel)),
        }
    }

    pub fn played(&self) -> Vec<Cue> {
        self.cues.lock().unwrap().clone()
    }
}

impl Playback for RecordingPlayback {
    fn play(&mut self, cue: &Cue) {
        let mut cues = self.cues.lock().unwrap();
        cues.push(cue.clone());
        if let Some((trigger, nth, cancel)) = &self.cancel_on {
            if cues.iter().filter(|c| *c == trigger).count() == *nth {
                cancel.cancel();
            }
        }
    }
}

/// Always draws the same target.
#[derive(Debug, Clone)]
pub struct FixedTable {
    pub spec: TrialSpec,
    pub expected: Option<i32>,
}

impl FixedTable {
    pub fn b_string_low_c() -> Self {
        Self {
            spec: b_string_low_c(),
            expected: Some(60),
        }
    }

    /// Draws a target it cannot resolve.
    pub fn broken() -> Self {
        Self {
            spec: b_string_low_c(),
            expected: None,
        }
    }
}

impl NoteTable for FixedTable {
    fn random_trial_spec(&self, _rng: &mut dyn rand::RngCore) -> TrialSpec {
        self.spec.clone()
    }

    fn expected_note_number(&self, _spec: &TrialSpec) -> Option<i32> {
        self.expected
    }
}
