//! Text tables for the score history commands.

use std::fmt::Write;

use trainer_core::scores::{GameBucket, MissedTarget, ScoreRecord};

/// Best games of one configuration, ranked.
pub fn high_score_table(bucket: GameBucket, records: &[ScoreRecord]) -> String {
    let mut out = format!(
        "{} trials, {} s per guess\n",
        bucket.total_trials, bucket.time_per_guess_s
    );
    let _ = writeln!(out, "{:>4}  {:>6}  {:>5}  {}", "Rank", "Game", "Score", "Played");
    for (rank, record) in records.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>4}  {:>6}  {:>5}  {}",
            rank + 1,
            record.game_id,
            format!("{}/{}", record.total_correct, record.total_trials),
            record.timestamp.format("%Y-%m-%d %H:%M"),
        );
    }
    out
}

pub fn missed_table(missed: &[MissedTarget]) -> String {
    if missed.is_empty() {
        return "No missed notes yet.\n".to_string();
    }
    let mut out = format!("{:<8}  {:<8}  {:<6}  {}\n", "String", "Position", "Note", "Missed");
    for target in missed {
        let _ = writeln!(
            out,
            "{:<8}  {:<8}  {:<6}  {}",
            target.string.id(),
            target.position.to_string(),
            target.note,
            target.count,
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use trainer_core::{GuitarString, Position};

    #[test]
    fn missed_rows_follow_input_order() {
        let missed = vec![
            MissedTarget {
                string: GuitarString::HighE,
                position: Position::High,
                note: "F#/Gb".to_string(),
                count: 4,
            },
            MissedTarget {
                string: GuitarString::A,
                position: Position::Low,
                note: "C".to_string(),
                count: 1,
            },
        ];
        let table = missed_table(&missed);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("e "));
        assert!(lines[1].contains("F#/Gb"));
        assert!(lines[1].ends_with('4'));
        assert!(lines[2].starts_with("A "));
    }

    #[test]
    fn empty_history_says_so() {
        assert_eq!(missed_table(&[]), "No missed notes yet.\n");
    }
}
