//! # Musical Tuning Module
//!
//! Equal-temperament conversions between frequencies and MIDI note numbers,
//! plus the note-label table used to name what a player actually played.
//!
//! Note numbers follow MIDI: A4 is 69 whatever reference frequency is
//! configured, so tuning A4 to 432 Hz shifts frequencies, not numbers.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// MIDI number of A4.
pub const A4_NOTE_NUMBER: i32 = 69;

/// Default concert pitch.
pub const DEFAULT_A4_FREQUENCY: f32 = 440.0;

/// Pitch-class labels, C first. Enharmonic pairs share a label.
pub const PITCH_CLASS_LABELS: [&str; 12] = [
    "C", "C#/Db", "D", "D#/Eb", "E", "F", "F#/Gb", "G", "G#/Ab", "A", "A#/Bb", "B",
];

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Every MIDI note number (0-127) grouped under its pitch-class label.
///
/// Built once on first use; lookups by label are O(log n).
static NOTE_LABELS: Lazy<BTreeMap<&'static str, Vec<i32>>> = Lazy::new(|| {
    let mut labels: BTreeMap<&'static str, Vec<i32>> = BTreeMap::new();
    for number in 0..128 {
        let label = PITCH_CLASS_LABELS[number as usize % 12];
        labels.entry(label).or_default().push(number);
    }
    labels
});

/// Converts a frequency into a continuous note number.
///
/// `12 * log2(freq / a4) + 69`; an exact semitone yields an integral value.
pub fn frequency_to_number(freq: f32, a4_freq: f32) -> f32 {
    12.0 * (freq / a4_freq).log2() + A4_NOTE_NUMBER as f32
}

/// Frequency of an integral note number under equal temperament.
pub fn number_to_frequency(number: i32, a4_freq: f32) -> f32 {
    a4_freq * 2.0_f32.powf((number - A4_NOTE_NUMBER) as f32 / 12.0)
}

/// Nearest integral note number for `freq`, or `None` for non-positive or
/// non-finite input.
pub fn nearest_note_number(freq: f32, a4_freq: f32) -> Option<i32> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    Some(frequency_to_number(freq, a4_freq).round() as i32)
}

/// Scientific pitch name with sharps, e.g. `A4`, `C#3`.
pub fn note_name(number: i32) -> String {
    let pitch_class = number.rem_euclid(12) as usize;
    let octave = number.div_euclid(12) - 1;
    format!("{}{}", SHARP_NAMES[pitch_class], octave)
}

/// Reverse lookup of a MIDI note number to its pitch-class label.
///
/// Returns `None` outside the MIDI range.
pub fn label_for_note_number(number: i32) -> Option<&'static str> {
    NOTE_LABELS
        .iter()
        .find(|(_, numbers)| numbers.contains(&number))
        .map(|(label, _)| *label)
}
