//! # Score History
//!
//! Per-trial rows and per-game final scores, plus the queries the trainer
//! needs: next game id, best-score comparison, high-score tables and the
//! most-missed targets.
//!
//! [`MemoryScoreStore`] keeps everything in memory; [`JsonScoreStore`]
//! wraps it and rewrites a JSON document after every append.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::fretboard::{GuitarString, Position};
use crate::{Error, Result};

/// One persisted trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRow {
    pub timestamp: DateTime<Local>,
    pub game_id: u64,
    pub time_per_guess_s: u32,
    /// Trials requested for the game, not necessarily completed.
    pub total_trials: u32,
    /// 1-based position in the game.
    pub trial_number: u32,
    pub target_string: GuitarString,
    pub target_position: Position,
    pub target_note: String,
    pub played_note: Option<String>,
    pub is_correct: bool,
}

/// One persisted game. `total_trials` counts attempted trials only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub timestamp: DateTime<Local>,
    pub game_id: u64,
    pub time_per_guess_s: u32,
    pub total_trials: u32,
    pub total_correct: u32,
}

/// A target the player got wrong, with how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissedTarget {
    pub string: GuitarString,
    pub position: Position,
    pub note: String,
    pub count: usize,
}

/// A distinct `(total_trials, time_per_guess_s)` game configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GameBucket {
    pub total_trials: u32,
    pub time_per_guess_s: u32,
}

/// How a finished game compares with the best earlier game of the same
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BestScore {
    NewHighScore,
    MatchedPrevious,
    PreviousBest { best: u32, trials: u32 },
}

impl BestScore {
    pub fn compare(previous_best: Option<u32>, num_correct: u32, trials: u32) -> Self {
        match previous_best {
            None => BestScore::NewHighScore,
            Some(best) if num_correct > best => BestScore::NewHighScore,
            Some(best) if num_correct == best => BestScore::MatchedPrevious,
            Some(best) => BestScore::PreviousBest { best, trials },
        }
    }
}

impl fmt::Display for BestScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BestScore::NewHighScore => f.write_str("New high score!"),
            BestScore::MatchedPrevious => f.write_str("Matched previous best."),
            BestScore::PreviousBest { best, trials } => write!(f, "Previous best: {best}/{trials}"),
        }
    }
}

pub trait ScoreStore {
    /// `max(existing game id) + 1`, or 1 for an empty history. Callers must
    /// not allocate ids for two sessions concurrently.
    fn next_game_id(&self) -> Result<u64>;

    fn append_trial(&mut self, row: TrialRow) -> Result<()>;

    fn append_trials(&mut self, rows: Vec<TrialRow>) -> Result<()> {
        for row in rows {
            self.append_trial(row)?;
        }
        Ok(())
    }

    fn append_final_score(&mut self, record: ScoreRecord) -> Result<()>;

    /// Highest `total_correct` among games with exactly this configuration.
    fn previous_best(&self, time_per_guess_s: u32, total_trials: u32) -> Result<Option<u32>>;

    fn best_score(
        &self,
        time_per_guess_s: u32,
        trials: u32,
        num_correct: u32,
    ) -> Result<BestScore> {
        let previous = self.previous_best(time_per_guess_s, trials)?;
        Ok(BestScore::compare(previous, num_correct, trials))
    }

    /// Games of one configuration, best first, ties by game id.
    fn high_scores(&self, total_trials: u32, time_per_guess_s: u32) -> Result<Vec<ScoreRecord>>;

    /// Configurations that have at least one finished game, most trials
    /// first, then shortest guess time.
    fn trial_time_combos(&self) -> Result<Vec<GameBucket>>;

    /// Incorrectly answered targets, most missed first.
    fn top_incorrect(&self, limit: Option<usize>) -> Result<Vec<MissedTarget>>;
}

impl<S: ScoreStore + ?Sized> ScoreStore for Arc<Mutex<S>> {
    fn next_game_id(&self) -> Result<u64> {
        lock(&**self)?.next_game_id()
    }

    fn append_trial(&mut self, row: TrialRow) -> Result<()> {
        lock(&**self)?.append_trial(row)
    }

    fn append_trials(&mut self, rows: Vec<TrialRow>) -> Result<()> {
        lock(&**self)?.append_trials(rows)
    }

    fn append_final_score(&mut self, record: ScoreRecord) -> Result<()> {
        lock(&**self)?.append_final_score(record)
    }

    fn previous_best(&self, time_per_guess_s: u32, total_trials: u32) -> Result<Option<u32>> {
        lock(&**self)?.previous_best(time_per_guess_s, total_trials)
    }

    fn high_scores(&self, total_trials: u32, time_per_guess_s: u32) -> Result<Vec<ScoreRecord>> {
        lock(&**self)?.high_scores(total_trials, time_per_guess_s)
    }

    fn trial_time_combos(&self) -> Result<Vec<GameBucket>> {
        lock(&**self)?.trial_time_combos()
    }

    fn top_incorrect(&self, limit: Option<usize>) -> Result<Vec<MissedTarget>> {
        lock(&**self)?.top_incorrect(limit)
    }
}

fn lock<S: ?Sized>(store: &Mutex<S>) -> Result<std::sync::MutexGuard<'_, S>> {
    store
        .lock()
        .map_err(|_| Error::Store("score store lock poisoned".to_string()))
}

/// Score history held in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryScoreStore {
    pub trials: Vec<TrialRow>,
    pub final_scores: Vec<ScoreRecord>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScoreStore for MemoryScoreStore {
    fn next_game_id(&self) -> Result<u64> {
        let latest = self
            .trials
            .iter()
            .map(|row| row.game_id)
            .chain(self.final_scores.iter().map(|record| record.game_id))
            .max();
        Ok(latest.map_or(1, |id| id + 1))
    }

    fn append_trial(&mut self, row: TrialRow) -> Result<()> {
        self.trials.push(row);
        Ok(())
    }

    fn append_final_score(&mut self, record: ScoreRecord) -> Result<()> {
        self.final_scores.push(record);
        Ok(())
    }

    fn previous_best(&self, time_per_guess_s: u32, total_trials: u32) -> Result<Option<u32>> {
        Ok(self
            .final_scores
            .iter()
            .filter(|r| r.time_per_guess_s == time_per_guess_s && r.total_trials == total_trials)
            .map(|r| r.total_correct)
            .max())
    }

    fn high_scores(&self, total_trials: u32, time_per_guess_s: u32) -> Result<Vec<ScoreRecord>> {
        let mut records: Vec<ScoreRecord> = self
            .final_scores
            .iter()
            .filter(|r| r.time_per_guess_s == time_per_guess_s && r.total_trials == total_trials)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.total_correct
                .cmp(&a.total_correct)
                .then(a.game_id.cmp(&b.game_id))
        });
        Ok(records)
    }

    fn trial_time_combos(&self) -> Result<Vec<GameBucket>> {
        let mut combos: Vec<GameBucket> = self
            .final_scores
            .iter()
            .map(|r| GameBucket {
                total_trials: r.total_trials,
                time_per_guess_s: r.time_per_guess_s,
            })
            .collect();
        combos.sort_by(|a, b| {
            b.total_trials
                .cmp(&a.total_trials)
                .then(a.time_per_guess_s.cmp(&b.time_per_guess_s))
        });
        combos.dedup();
        Ok(combos)
    }

    fn top_incorrect(&self, limit: Option<usize>) -> Result<Vec<MissedTarget>> {
        let mut counts: BTreeMap<(GuitarString, Position, &str), usize> = BTreeMap::new();
        for row in self.trials.iter().filter(|row| !row.is_correct) {
            *counts
                .entry((row.target_string, row.target_position, row.target_note.as_str()))
                .or_default() += 1;
        }

        let mut missed: Vec<MissedTarget> = counts
            .into_iter()
            .map(|((string, position, note), count)| MissedTarget {
                string,
                position,
                note: note.to_string(),
                count,
            })
            .collect();
        missed.sort_by(|a, b| b.count.cmp(&a.count));
        if let Some(limit) = limit {
            missed.truncate(limit);
        }
        Ok(missed)
    }
}

/// Score history persisted as a single JSON document.
#[derive(Debug)]
pub struct JsonScoreStore {
    path: PathBuf,
    history: MemoryScoreStore,
}

impl JsonScoreStore {
    /// Opens the history at `path`; a missing file is an empty history.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let history = if path.exists() {
            let data = fs::read_to_string(&path)?;
            serde_json::from_str(&data)?
        } else {
            MemoryScoreStore::default()
        };
        info!(
            "Loaded score history from {} ({} games)",
            path.display(),
            history.final_scores.len()
        );
        Ok(Self { path, history })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn history(&self) -> &MemoryScoreStore {
        &self.history
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json_string = serde_json::to_string_pretty(&self.history)?;
        let mut file = File::create(&self.path)?;
        file.write_all(json_string.as_bytes())?;
        debug!("Score history saved to {}", self.path.display());
        Ok(())
    }
}

impl ScoreStore for JsonScoreStore {
    fn next_game_id(&self) -> Result<u64> {
        self.history.next_game_id()
    }

    fn append_trial(&mut self, row: TrialRow) -> Result<()> {
        self.history.append_trial(row)?;
        self.save()
    }

    fn append_trials(&mut self, rows: Vec<TrialRow>) -> Result<()> {
        self.history.append_trials(rows)?;
        self.save()
    }

    fn append_final_score(&mut self, record: ScoreRecord) -> Result<()> {
        self.history.append_final_score(record)?;
        self.save()
    }

    fn previous_best(&self, time_per_guess_s: u32, total_trials: u32) -> Result<Option<u32>> {
        self.history.previous_best(time_per_guess_s, total_trials)
    }

    fn high_scores(&self, total_trials: u32, time_per_guess_s: u32) -> Result<Vec<ScoreRecord>> {
        self.history.high_scores(total_trials, time_per_guess_s)
    }

    fn trial_time_combos(&self) -> Result<Vec<GameBucket>> {
        self.history.trial_time_combos()
    }

    fn top_incorrect(&self, limit: Option<usize>) -> Result<Vec<MissedTarget>> {
        self.history.top_incorrect(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        game_id: u64,
        time_per_guess_s: u32,
        total_trials: u32,
        total_correct: u32,
    ) -> ScoreRecord {
        ScoreRecord {
            timestamp: Local::now(),
            game_id,
            time_per_guess_s,
            total_trials,
            total_correct,
        }
    }

    fn row(game_id: u64, string: GuitarString, note: &str, is_correct: bool) -> TrialRow {
        TrialRow {
            timestamp: Local::now(),
            game_id,
            time_per_guess_s: 5,
            total_trials: 10,
            trial_number: 1,
            target_string: string,
            target_position: Position::Low,
            target_note: note.to_string(),
            played_note: None,
            is_correct,
        }
    }

    #[test]
    fn best_score_messages() {
        assert_eq!(BestScore::compare(None, 3, 10), BestScore::NewHighScore);
        assert_eq!(BestScore::compare(Some(7), 8, 10), BestScore::NewHighScore);
        assert_eq!(BestScore::compare(Some(7), 7, 10), BestScore::MatchedPrevious);
        assert_eq!(
            BestScore::compare(Some(7), 5, 10),
            BestScore::PreviousBest { best: 7, trials: 10 }
        );

        assert_eq!(BestScore::NewHighScore.to_string(), "New high score!");
        assert_eq!(BestScore::MatchedPrevious.to_string(), "Matched previous best.");
        assert_eq!(BestScore::compare(Some(7), 5, 10).to_string(), "Previous best: 7/10");
    }

    #[test]
    fn best_score_only_compares_same_bucket() {
        let mut store = MemoryScoreStore::new();
        store.append_final_score(record(1, 10, 10, 7)).unwrap();
        store.append_final_score(record(2, 5, 10, 9)).unwrap();
        store.append_final_score(record(3, 10, 3, 3)).unwrap();

        assert_eq!(store.best_score(10, 10, 7).unwrap(), BestScore::MatchedPrevious);
        assert_eq!(store.best_score(10, 10, 8).unwrap(), BestScore::NewHighScore);
        assert_eq!(store.best_score(10, 2, 0).unwrap(), BestScore::NewHighScore);
    }

    #[test]
    fn game_ids_increase_from_one() {
        let mut store = MemoryScoreStore::new();
        assert_eq!(store.next_game_id().unwrap(), 1);
        store.append_trial(row(4, GuitarString::A, "C", true)).unwrap();
        assert_eq!(store.next_game_id().unwrap(), 5);
    }

    #[test]
    fn high_scores_sorted_best_first() {
        let mut store = MemoryScoreStore::new();
        store.append_final_score(record(1, 10, 10, 4)).unwrap();
        store.append_final_score(record(2, 10, 10, 9)).unwrap();
        store.append_final_score(record(3, 10, 10, 4)).unwrap();
        store.append_final_score(record(4, 5, 10, 10)).unwrap();

        let ids: Vec<u64> = store.high_scores(10, 10).unwrap().iter().map(|r| r.game_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn combos_are_distinct_and_ordered() {
        let mut store = MemoryScoreStore::new();
        store.append_final_score(record(1, 10, 5, 1)).unwrap();
        store.append_final_score(record(2, 3, 10, 1)).unwrap();
        store.append_final_score(record(3, 10, 10, 1)).unwrap();
        store.append_final_score(record(4, 3, 10, 2)).unwrap();

        let combos = store.trial_time_combos().unwrap();
        assert_eq!(
            combos,
            vec![
                GameBucket { total_trials: 10, time_per_guess_s: 3 },
                GameBucket { total_trials: 10, time_per_guess_s: 10 },
                GameBucket { total_trials: 5, time_per_guess_s: 10 },
            ]
        );
    }

    #[test]
    fn most_missed_targets_first() {
        let mut store = MemoryScoreStore::new();
        store
            .append_trials(vec![
                row(1, GuitarString::G, "F#/Gb", false),
                row(1, GuitarString::A, "C", false),
                row(1, GuitarString::G, "F#/Gb", false),
                row(1, GuitarString::G, "F#/Gb", true),
                row(2, GuitarString::D, "E", true),
            ])
            .unwrap();

        let missed = store.top_incorrect(None).unwrap();
        assert_eq!(missed.len(), 2);
        assert_eq!(missed[0].note, "F#/Gb");
        assert_eq!(missed[0].count, 2);
        assert_eq!(missed[1].string, GuitarString::A);

        assert_eq!(store.top_incorrect(Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scores.json");

        {
            let mut store = JsonScoreStore::open(&path).unwrap();
            assert_eq!(store.next_game_id().unwrap(), 1);
            store.append_trial(row(1, GuitarString::B, "D", false)).unwrap();
            store.append_final_score(record(1, 5, 1, 0)).unwrap();
        }

        let reopened = JsonScoreStore::open(&path).unwrap();
        assert_eq!(reopened.next_game_id().unwrap(), 2);
        assert_eq!(reopened.history().trials.len(), 1);
        assert_eq!(reopened.high_scores(1, 5).unwrap()[0].total_correct, 0);
    }

    #[test]
    fn corrupt_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(JsonScoreStore::open(&path), Err(Error::Serde(_))));
    }

    #[test]
    fn shared_store_delegates() {
        let shared = Arc::new(Mutex::new(MemoryScoreStore::new()));
        let mut handle = Arc::clone(&shared);
        handle.append_final_score(record(1, 10, 10, 6)).unwrap();
        assert_eq!(shared.previous_best(10, 10).unwrap(), Some(6));
    }
}
