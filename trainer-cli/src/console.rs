//! Terminal stand-ins for the sound cues and the stop button.

use crossbeam_channel::Receiver;
use std::io::{self, BufRead, Write};
use std::thread;
use tracing::debug;

use trainer_core::playback::{Cue, Playback};

/// Prints each cue as a spoken word would sound.
#[derive(Debug, Default)]
pub struct ConsolePlayback;

impl Playback for ConsolePlayback {
    fn play(&mut self, cue: &Cue) {
        let text = match cue {
            Cue::String(string) => format!("{string} string"),
            Cue::Position(position) => position.to_string(),
            Cue::Note(note) => note.clone(),
            Cue::Clack => "*clack* go!".to_string(),
            Cue::Correct => "correct".to_string(),
            Cue::Incorrect => "incorrect".to_string(),
            Cue::YouPlayed => "you played".to_string(),
        };
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "  > {text}");
        let _ = stdout.flush();
    }
}

/// Fires once when the user presses Enter. Closed stdin never fires.
pub fn enter_pressed() -> io::Result<Receiver<()>> {
    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name("stdin-listener".to_string())
        .spawn(move || {
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(n) if n > 0 => {
                    let _ = stop_tx.send(());
                }
                _ => debug!("stdin closed; Enter-to-stop disabled"),
            }
        })?;
    Ok(stop_rx)
}
