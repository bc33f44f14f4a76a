//! # Cent Meter
//!
//! One-line text rendering of the tuner readout: note, frequency, cents
//! and a needle bar. The needle follows the smoothed needle angle, so it
//! moves calmly while the cents figure shows the latest reading.

use trainer_core::{TuneHint, TunerReadout};

/// Needle angle at either end of the bar (half a semitone off).
const METER_RANGE_DEGREES: f32 = 90.0;

/// Bar cells on each side of the centre mark.
const HALF_WIDTH: usize = 20;

/// Renders the needle bar, e.g. `[-------------|---*---]` for a sharp note.
pub fn needle_bar(needle_angle: f32) -> String {
    let clamped = needle_angle.clamp(-METER_RANGE_DEGREES, METER_RANGE_DEGREES);
    let offset = (clamped / METER_RANGE_DEGREES * HALF_WIDTH as f32).round() as isize;
    let needle = (HALF_WIDTH as isize + offset) as usize;

    let mut bar = String::with_capacity(HALF_WIDTH * 2 + 3);
    bar.push('[');
    for cell in 0..=HALF_WIDTH * 2 {
        bar.push(if cell == needle {
            '*'
        } else if cell == HALF_WIDTH {
            '|'
        } else {
            '-'
        });
    }
    bar.push(']');
    bar
}

fn hint_text(hint: TuneHint) -> &'static str {
    match hint {
        TuneHint::InTune => "in tune",
        TuneHint::TuneUp => "tune up",
        TuneHint::TuneDown => "tune down",
    }
}

pub fn render(readout: &TunerReadout) -> String {
    format!(
        "{:<4} {:>7.2} Hz {:>+6.1} cents {} {}",
        readout.note_name,
        readout.frequency_hz,
        readout.display_cents,
        needle_bar(readout.needle_angle),
        hint_text(readout.hint),
    )
}
