//! # Tuner Smoothing Pipeline
//!
//! Converts raw frequencies into a steady tuning readout, one poll tick at
//! a time:
//! - nearest note and cents offset under equal temperament
//! - a debounced displayed note, so a single octave misread or overtone
//!   does not flip the note name
//! - a needle angle averaged over a short ring buffer to calm jitter
//!
//! Ticks without a new reading leave the readout untouched.

use std::collections::VecDeque;

use crate::channel::ReadingChannel;
use crate::config::TunerSettings;
use crate::tuning::{self, A4_NOTE_NUMBER};

/// Full-scale needle deflection in degrees (one semitone off).
const NEEDLE_FULL_SCALE_DEGREES: f32 = 90.0;

/// Which way the player should turn the peg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneHint {
    InTune,
    /// Flat: raise the pitch.
    TuneUp,
    /// Sharp: lower the pitch.
    TuneDown,
}

/// Mutable state carried between ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedTunerState {
    /// Note currently shown; only changes after the debounce window.
    pub buffered_note_number: i32,
    pub needle_angle_avg: f32,
    /// `(nearest_freq - freq) / semitone_step * 100`; positive when flat.
    pub cents_offset: f32,
    pub in_tune: bool,
}

impl Default for SmoothedTunerState {
    fn default() -> Self {
        Self {
            buffered_note_number: A4_NOTE_NUMBER,
            needle_angle_avg: 0.0,
            cents_offset: 0.0,
            in_tune: true,
        }
    }
}

/// What the display shows after a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TunerReadout {
    pub note_number: i32,
    pub note_name: String,
    pub frequency_hz: f32,
    /// Displayed cents, `-cents_offset` rounded to 0.1. Positive is sharp.
    pub display_cents: f32,
    pub needle_angle: f32,
    pub in_tune: bool,
    pub hint: TuneHint,
}

/// Nearest-note analysis of a single frequency, before any smoothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteAnalysis {
    pub nearest: i32,
    pub cents_offset: f32,
    pub needle_angle: f32,
}

/// Pure per-frequency math: nearest note, cents offset, raw needle angle.
///
/// A zero semitone step yields zero cents and a centred needle.
pub fn analyse_frequency(freq: f32, a4_freq: f32) -> NoteAnalysis {
    let number = tuning::frequency_to_number(freq, a4_freq);
    let nearest = number.round() as i32;
    let nearest_freq = tuning::number_to_frequency(nearest, a4_freq);
    let freq_difference = nearest_freq - freq;
    let semitone_step = nearest_freq - tuning::number_to_frequency(nearest - 1, a4_freq);

    let (cents_offset, needle_angle) = if semitone_step != 0.0 {
        let ratio = freq_difference / semitone_step;
        (ratio * 100.0, -NEEDLE_FULL_SCALE_DEGREES * 2.0 * ratio)
    } else {
        (0.0, 0.0)
    };

    NoteAnalysis {
        nearest,
        cents_offset,
        needle_angle,
    }
}

#[derive(Debug, Clone)]
pub struct TunerSmoother {
    a4_freq: f32,
    debounce_ticks: u32,
    in_tune_threshold_cents: f32,
    needle_window: usize,
    needle_buffer: VecDeque<f32>,
    candidate: Option<i32>,
    mismatch_count: u32,
    state: SmoothedTunerState,
    readout: Option<TunerReadout>,
}

impl TunerSmoother {
    pub fn new(settings: &TunerSettings) -> Self {
        let needle_window = settings.needle_window.max(1);
        Self {
            a4_freq: settings.a4_frequency,
            debounce_ticks: settings.debounce_ticks.max(1),
            in_tune_threshold_cents: settings.in_tune_threshold_cents,
            needle_window,
            needle_buffer: VecDeque::with_capacity(needle_window),
            candidate: None,
            mismatch_count: 0,
            state: SmoothedTunerState::default(),
            readout: None,
        }
    }

    pub fn state(&self) -> &SmoothedTunerState {
        &self.state
    }

    /// The latest readout, `None` until the first pitched reading.
    pub fn readout(&self) -> Option<&TunerReadout> {
        self.readout.as_ref()
    }

    /// One poll tick: takes the freshest reading and folds it in.
    ///
    /// Returns the new readout, or `None` when nothing changed (no reading,
    /// or a reading without pitch).
    pub fn tick(&mut self, channel: &ReadingChannel) -> Option<&TunerReadout> {
        let freq = channel.take()?.frequency_hz?;
        self.apply(freq)
    }

    /// Folds one detected frequency into the smoothed state.
    pub fn apply(&mut self, freq: f32) -> Option<&TunerReadout> {
        if !freq.is_finite() || freq <= 0.0 {
            return None;
        }
        let analysis = analyse_frequency(freq, self.a4_freq);

        self.debounce(analysis.nearest);

        if self.needle_buffer.len() == self.needle_window {
            self.needle_buffer.pop_front();
        }
        self.needle_buffer.push_back(analysis.needle_angle);
        let needle_angle_avg =
            self.needle_buffer.iter().sum::<f32>() / self.needle_buffer.len() as f32;

        let in_tune = analysis.cents_offset.abs() <= self.in_tune_threshold_cents;
        self.state.needle_angle_avg = needle_angle_avg;
        self.state.cents_offset = analysis.cents_offset;
        self.state.in_tune = in_tune;

        let display_cents = (-analysis.cents_offset * 10.0).round() / 10.0;
        let hint = if in_tune {
            TuneHint::InTune
        } else if display_cents > 0.0 {
            TuneHint::TuneDown
        } else {
            TuneHint::TuneUp
        };

        let note_number = self.state.buffered_note_number;
        self.readout = Some(TunerReadout {
            note_number,
            note_name: tuning::note_name(note_number),
            frequency_hz: freq,
            display_cents,
            needle_angle: needle_angle_avg,
            in_tune,
            hint,
        });
        self.readout.as_ref()
    }

    /// Commits `nearest` once it has been seen on `debounce_ticks`
    /// consecutive ticks. A tick matching the displayed note, or proposing a
    /// different candidate, restarts the count.
    fn debounce(&mut self, nearest: i32) {
        if nearest == self.state.buffered_note_number {
            self.candidate = None;
            self.mismatch_count = 0;
            return;
        }

        if self.candidate != Some(nearest) {
            self.candidate = Some(nearest);
            self.mismatch_count = 0;
        }
        self.mismatch_count += 1;

        if self.mismatch_count >= self.debounce_ticks {
            self.state.buffered_note_number = nearest;
            self.candidate = None;
            self.mismatch_count = 0;
        }
    }
}
