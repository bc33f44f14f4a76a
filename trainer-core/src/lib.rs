// trainer-core/src/lib.rs

//! The core logic for the guitar fretboard trainer.
//! This crate handles audio capture, pitch detection, the tuner readout and
//! the note-recognition game with its score history. It is headless: sound
//! playback and presentation belong to the front end.

pub mod audio;
pub mod cancel;
pub mod capture;
pub mod channel;
pub mod config;
pub mod error;
pub mod fft;
pub mod fretboard;
pub mod pitch;
pub mod playback;
pub mod scores;
pub mod session;
pub mod smoothing;
pub mod trial;
pub mod tuning;

pub use cancel::CancelToken;
pub use channel::{Reading, ReadingChannel};
pub use config::Settings;
pub use error::{Error, Result};
pub use fretboard::{GuitarNoteTable, GuitarString, NoteTable, Position, TrialSpec};
pub use session::{GameSession, SessionConfig, SessionEvent, SessionHandle, SessionWorker};
pub use smoothing::{TuneHint, TunerReadout, TunerSmoother};
pub use trial::{TrialEngine, TrialOutcome, TrialResult};
