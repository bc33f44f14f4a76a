//! # Fretboard Module
//!
//! Where each trial target lives on the neck. A target is a string, a
//! region of that string (`low` = frets 0-11, `high` = frets 12-21) and a
//! pitch-class label; the table knows which MIDI note that combination is.

use rand::RngCore;
use rand::seq::{IteratorRandom, SliceRandom};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::tuning::{self, PITCH_CLASS_LABELS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GuitarString {
    #[serde(rename = "E")]
    LowE,
    A,
    D,
    G,
    B,
    #[serde(rename = "e")]
    HighE,
}

impl GuitarString {
    pub const ALL: [GuitarString; 6] = [
        GuitarString::LowE,
        GuitarString::A,
        GuitarString::D,
        GuitarString::G,
        GuitarString::B,
        GuitarString::HighE,
    ];

    /// Short name as printed on tablature, lower-case `e` for the top string.
    pub fn id(self) -> &'static str {
        match self {
            GuitarString::LowE => "E",
            GuitarString::A => "A",
            GuitarString::D => "D",
            GuitarString::G => "G",
            GuitarString::B => "B",
            GuitarString::HighE => "e",
        }
    }

    /// MIDI note of the open string in standard tuning.
    pub fn open_note_number(self) -> i32 {
        match self {
            GuitarString::LowE => 40,
            GuitarString::A => 45,
            GuitarString::D => 50,
            GuitarString::G => 55,
            GuitarString::B => 59,
            GuitarString::HighE => 64,
        }
    }
}

impl fmt::Display for GuitarString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Low,
    High,
}

impl Position {
    pub const ALL: [Position; 2] = [Position::Low, Position::High];

    pub fn frets(self) -> std::ops::RangeInclusive<i32> {
        match self {
            Position::Low => 0..=11,
            Position::High => 12..=21,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Position::Low => "low",
            Position::High => "high",
        })
    }
}

/// One trial target. Immutable once drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialSpec {
    pub string: GuitarString,
    pub position: Position,
    /// Pitch-class label, e.g. `"F#/Gb"`.
    pub note: String,
}

impl TrialSpec {
    pub fn new(string: GuitarString, position: Position, note: impl Into<String>) -> Self {
        Self {
            string,
            position,
            note: note.into(),
        }
    }
}

impl fmt::Display for TrialSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} string, {} {}", self.string, self.position, self.note)
    }
}

/// Source of trial targets and of the note-number/label mapping used to
/// judge them.
pub trait NoteTable {
    /// Draws a target uniformly: string, then position, then note.
    fn random_trial_spec(&self, rng: &mut dyn RngCore) -> TrialSpec;

    /// MIDI note the player must produce for `spec`, `None` if the table
    /// does not contain it.
    fn expected_note_number(&self, spec: &TrialSpec) -> Option<i32>;

    /// Label of an arbitrary note number, `None` if nothing matches.
    fn label_for_note_number(&self, number: i32) -> Option<String> {
        tuning::label_for_note_number(number).map(str::to_owned)
    }
}

/// Six-string guitar in standard tuning.
#[derive(Debug, Clone)]
pub struct GuitarNoteTable {
    notes: BTreeMap<(GuitarString, Position), Vec<(&'static str, i32)>>,
}

impl GuitarNoteTable {
    pub fn standard() -> Self {
        let mut notes = BTreeMap::new();
        for string in GuitarString::ALL {
            for position in Position::ALL {
                let labelled = position
                    .frets()
                    .map(|fret| {
                        let number = string.open_note_number() + fret;
                        (PITCH_CLASS_LABELS[number as usize % 12], number)
                    })
                    .collect();
                notes.insert((string, position), labelled);
            }
        }
        Self { notes }
    }

    /// Labels available on one string region, in fret order.
    pub fn notes_on(
        &self,
        string: GuitarString,
        position: Position,
    ) -> impl Iterator<Item = &'static str> + '_ {
        self.notes
            .get(&(string, position))
            .into_iter()
            .flatten()
            .map(|(label, _)| *label)
    }
}

impl Default for GuitarNoteTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl NoteTable for GuitarNoteTable {
    fn random_trial_spec(&self, rng: &mut dyn RngCore) -> TrialSpec {
        let string = *GuitarString::ALL.choose(rng).unwrap_or(&GuitarString::LowE);
        let position = *Position::ALL.choose(rng).unwrap_or(&Position::Low);
        let note = self
            .notes_on(string, position)
            .choose(rng)
            .unwrap_or(PITCH_CLASS_LABELS[string.open_note_number() as usize % 12]);
        TrialSpec::new(string, position, note)
    }

    fn expected_note_number(&self, spec: &TrialSpec) -> Option<i32> {
        self.notes
            .get(&(spec.string, spec.position))?
            .iter()
            .find(|(label, _)| *label == spec.note)
            .map(|(_, number)| *number)
    }
}
