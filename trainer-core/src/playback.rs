//! Spoken prompts and feedback sounds for the note trainer.
//!
//! Playing sound files is left to the front end; the trial engine only
//! decides which cue to play and when.

use tracing::debug;

use crate::fretboard::{GuitarString, Position};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cue {
    String(GuitarString),
    Position(Position),
    Note(String),
    /// Click marking the start of the recording window.
    Clack,
    Correct,
    Incorrect,
    YouPlayed,
}

impl Cue {
    /// Sound-file name without extension: `#` for sharps, `b` for flats and
    /// `or` between enharmonic spellings (`C#/Db` becomes `C#orDb`).
    pub fn file_stem(&self) -> String {
        match self {
            Cue::String(string) => string.id().to_string(),
            Cue::Position(position) => position.to_string(),
            Cue::Note(label) => label
                .replace('♯', "#")
                .replace('♭', "b")
                .replace('/', "or"),
            Cue::Clack => "clack".to_string(),
            Cue::Correct => "correct".to_string(),
            Cue::Incorrect => "incorrect".to_string(),
            Cue::YouPlayed => "you_played".to_string(),
        }
    }
}

/// Fire-and-forget cue player. Implementations may block until the cue has
/// finished sounding.
pub trait Playback {
    fn play(&mut self, cue: &Cue);
}

impl<P: Playback + ?Sized> Playback for Box<P> {
    fn play(&mut self, cue: &Cue) {
        (**self).play(cue)
    }
}

/// Plays nothing; cues are only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentPlayback;

impl Playback for SilentPlayback {
    fn play(&mut self, cue: &Cue) {
        debug!("Cue: {}", cue.file_stem());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stems_follow_sound_naming() {
        assert_eq!(Cue::Note("C#/Db".into()).file_stem(), "C#orDb");
        assert_eq!(Cue::Note("F♯/G♭".into()).file_stem(), "F#orGb");
        assert_eq!(Cue::Note("E".into()).file_stem(), "E");
        assert_eq!(Cue::String(GuitarString::HighE).file_stem(), "e");
        assert_eq!(Cue::Position(Position::High).file_stem(), "high");
        assert_eq!(Cue::YouPlayed.file_stem(), "you_played");
    }
}
