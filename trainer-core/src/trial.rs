//! # Trial Engine
//!
//! One note-recognition trial: prompt the target, record the player for a
//! fixed window, then judge the median detected note against the target.
//!
//! ```text
//! Prompting -> Recording -> Judging -> Correct | Incorrect | NoPlay
//!     \            \
//!      `------------`-----------------> Cancelled
//! ```
//!
//! Cancellation is cooperative: it is checked before every cue and once per
//! captured audio window. A window already being read is allowed to finish.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use tracing::{debug, info};

use crate::audio::{AudioSource, AudioStream};
use crate::cancel::CancelToken;
use crate::config::{AudioSettings, Settings};
use crate::fretboard::{NoteTable, TrialSpec};
use crate::pitch::PitchEstimator;
use crate::playback::{Cue, Playback};
use crate::tuning;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOutcome {
    Correct,
    Incorrect,
    /// The window closed without a single usable note.
    NoPlay,
    Cancelled,
}

/// Where a trial currently is. The four outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Prompting,
    Recording,
    Judging,
    Finished(TrialOutcome),
}

/// The judged result of one trial. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialResult {
    pub spec: TrialSpec,
    pub outcome: TrialOutcome,
    /// Label of what was played; `None` for no-play, cancellation, or a
    /// note with no label.
    pub played_note: Option<String>,
}

impl TrialResult {
    pub fn is_correct(&self) -> bool {
        self.outcome == TrialOutcome::Correct
    }
}

/// Notes captured during one recording window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recording {
    /// In-range note numbers, in capture order.
    pub notes: Vec<i32>,
    pub frames_read: usize,
    pub cancelled: bool,
}

/// Median of the captured note numbers. An even count averages the two
/// middle values and truncates toward zero.
pub fn median_note(notes: &[i32]) -> Option<i32> {
    if notes.is_empty() {
        return None;
    }
    let mut sorted = notes.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some(((sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0) as i32)
    }
}

/// Decides the outcome of a finished recording.
pub fn judge(
    spec: &TrialSpec,
    expected: i32,
    recording: &Recording,
    table: &(impl NoteTable + ?Sized),
) -> TrialResult {
    let (outcome, played_note) = if recording.cancelled {
        (TrialOutcome::Cancelled, None)
    } else {
        match median_note(&recording.notes) {
            None => (TrialOutcome::NoPlay, None),
            Some(played) if played == expected => (TrialOutcome::Correct, Some(spec.note.clone())),
            Some(played) => (TrialOutcome::Incorrect, table.label_for_note_number(played)),
        }
    };
    TrialResult {
        spec: spec.clone(),
        outcome,
        played_note,
    }
}

/// Runs trials against one set of collaborators.
pub struct TrialEngine<S, E, P, T> {
    source: S,
    estimator: E,
    playback: P,
    table: T,
    audio: AudioSettings,
    a4_freq: f32,
    note_range: RangeInclusive<i32>,
    state: Option<TrialState>,
}

impl<S, E, P, T> TrialEngine<S, E, P, T>
where
    S: AudioSource,
    E: PitchEstimator,
    P: Playback,
    T: NoteTable,
{
    pub fn new(source: S, estimator: E, playback: P, table: T, settings: &Settings) -> Self {
        Self {
            source,
            estimator,
            playback,
            table,
            audio: settings.audio.clone(),
            a4_freq: settings.tuner.a4_frequency,
            note_range: settings.trainer.min_note..=settings.trainer.max_note,
            state: None,
        }
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    /// State of the current or most recent trial.
    pub fn state(&self) -> Option<TrialState> {
        self.state
    }

    /// Runs one trial to a terminal outcome.
    ///
    /// Errors are reserved for failures (no device, broken stream, a target
    /// missing from the note table); silence and cancellation are outcomes.
    pub fn run(
        &mut self,
        spec: &TrialSpec,
        time_per_guess_s: u32,
        cancel: &CancelToken,
    ) -> Result<TrialResult> {
        let expected = self
            .table
            .expected_note_number(spec)
            .ok_or_else(|| Error::UnknownTarget(spec.to_string()))?;

        self.transition(TrialState::Prompting);
        info!("Play {}.", spec);
        let prompts = [
            Cue::String(spec.string),
            Cue::Position(spec.position),
            Cue::Note(spec.note.clone()),
            Cue::Clack,
        ];
        for cue in &prompts {
            if !self.cue(cue, cancel) {
                let result = judge(spec, expected, &Recording::cancelled(), &self.table);
                return Ok(self.finish(result));
            }
        }

        self.transition(TrialState::Recording);
        let recording = self.record(time_per_guess_s, cancel)?;
        debug!(
            "Recorded {} frames, {} usable notes",
            recording.frames_read,
            recording.notes.len()
        );

        self.transition(TrialState::Judging);
        let result = judge(spec, expected, &recording, &self.table);
        match result.outcome {
            TrialOutcome::Correct => {
                self.cue(&Cue::Correct, cancel);
                info!("Correct!");
            }
            TrialOutcome::Incorrect => {
                self.cue(&Cue::Incorrect, cancel);
                match &result.played_note {
                    Some(played) => {
                        if self.cue(&Cue::YouPlayed, cancel) {
                            self.cue(&Cue::Note(played.clone()), cancel);
                        }
                        info!("Incorrect. You played {}.", played);
                    }
                    None => info!("Incorrect."),
                }
            }
            TrialOutcome::NoPlay => info!("No note played."),
            TrialOutcome::Cancelled => info!("Trial cancelled."),
        }
        Ok(self.finish(result))
    }

    /// Captures `duration_s` seconds of audio, keeping every in-range note.
    /// The stream is closed when this returns, on every path.
    pub fn record(&mut self, duration_s: u32, cancel: &CancelToken) -> Result<Recording> {
        let mut stream = self.source.open(&self.audio)?;
        let sample_rate = stream.sample_rate();
        let target_samples = duration_s as u64 * sample_rate as u64;

        let mut recording = Recording::default();
        let mut captured: u64 = 0;
        while captured < target_samples {
            if cancel.is_cancelled() {
                recording.cancelled = true;
                break;
            }
            let frame = stream.read()?;
            if frame.is_empty() {
                return Err(Error::Audio("Audio source returned an empty window".to_string()));
            }
            recording.frames_read += 1;
            captured += frame.len() as u64;

            let note = self
                .estimator
                .estimate(&frame, sample_rate)
                .and_then(|estimate| {
                    tuning::nearest_note_number(estimate.frequency_hz, self.a4_freq)
                });
            if let Some(note) = note.filter(|n| self.note_range.contains(n)) {
                recording.notes.push(note);
            }
        }
        Ok(recording)
    }

    /// Plays `cue` unless cancellation is set. Returns whether it played.
    fn cue(&mut self, cue: &Cue, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        self.playback.play(cue);
        true
    }

    fn transition(&mut self, state: TrialState) {
        debug!("Trial state: {:?} -> {:?}", self.state, state);
        self.state = Some(state);
    }

    fn finish(&mut self, result: TrialResult) -> TrialResult {
        self.transition(TrialState::Finished(result.outcome));
        result
    }
}

impl Recording {
    fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }
}
