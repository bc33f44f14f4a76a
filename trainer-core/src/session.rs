//! # Session Worker
//!
//! Runs a game of back-to-back trials on its own thread and reports
//! progress as [`SessionEvent`]s on an unbounded FIFO channel. The owner
//! polls the channel; the only other shared state is the cancel token.
//!
//! Failures never cross the thread boundary as errors or panics: anything
//! that goes wrong inside the loop becomes one `GameError` event, and the
//! trials finished before it stay recorded.

use chrono::Local;
use crossbeam_channel::{Receiver, Sender};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::audio::AudioSource;
use crate::cancel::CancelToken;
use crate::fretboard::{NoteTable, TrialSpec};
use crate::pitch::PitchEstimator;
use crate::playback::Playback;
use crate::scores::{ScoreRecord, ScoreStore, TrialRow};
use crate::trial::{TrialEngine, TrialOutcome, TrialResult};
use crate::{Error, Result};

/// Message shown when a session ends before its first trial completes.
pub const NO_TRIALS_MESSAGE: &str = "No trials completed.";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    TrialStart {
        spec: TrialSpec,
        /// 1-based.
        trial_index: u32,
        total_trials: u32,
    },
    TrialResult {
        is_correct: bool,
        result: TrialResult,
    },
    GameComplete {
        num_correct: u32,
        trials_attempted: u32,
        best_score_message: String,
        cancelled: bool,
    },
    GameError {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub time_per_guess_s: u32,
    pub total_trials: u32,
}

/// The trials of one game, in the order they were played.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSession {
    pub game_id: u64,
    pub time_per_guess_s: u32,
    pub total_trials: u32,
    pub trials: Vec<TrialResult>,
}

impl GameSession {
    pub fn trials_attempted(&self) -> u32 {
        self.trials.len() as u32
    }

    pub fn num_correct(&self) -> u32 {
        self.trials.iter().filter(|t| t.is_correct()).count() as u32
    }
}

pub struct SessionWorker<S, E, P, T, St> {
    engine: TrialEngine<S, E, P, T>,
    store: St,
    config: SessionConfig,
    rng: StdRng,
}

impl<S, E, P, T, St> SessionWorker<S, E, P, T, St>
where
    S: AudioSource + Send + 'static,
    E: PitchEstimator + Send + 'static,
    P: Playback + Send + 'static,
    T: NoteTable + Send + 'static,
    St: ScoreStore + Send + 'static,
{
    pub fn new(engine: TrialEngine<S, E, P, T>, store: St, config: SessionConfig) -> Self {
        Self {
            engine,
            store,
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Makes the sequence of drawn targets reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Starts the game on a new thread with a fresh cancel token.
    pub fn spawn(self) -> Result<SessionHandle> {
        self.spawn_with(CancelToken::new())
    }

    /// Starts the game on a new thread, stopping when `cancel` is set.
    pub fn spawn_with(self, cancel: CancelToken) -> Result<SessionHandle> {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let worker_cancel = cancel.clone();
        let thread = thread::Builder::new()
            .name("note-trainer".to_string())
            .spawn(move || self.run(&worker_cancel, &event_tx))?;

        Ok(SessionHandle {
            events: event_rx,
            cancel,
            thread: Some(thread),
        })
    }

    /// Plays the whole game on the calling thread. Always ends with exactly
    /// one `GameComplete` or `GameError` event.
    pub fn run(mut self, cancel: &CancelToken, events: &Sender<SessionEvent>) -> GameSession {
        let mut session = GameSession {
            game_id: 0,
            time_per_guess_s: self.config.time_per_guess_s,
            total_trials: self.config.total_trials,
            trials: Vec::new(),
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.play(&mut session, cancel, events)
        }));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };
        if let Some(message) = failure {
            error!("Session {} failed: {}", session.game_id, message);
            emit(events, SessionEvent::GameError { message });
        }
        session
    }

    fn play(
        &mut self,
        session: &mut GameSession,
        cancel: &CancelToken,
        events: &Sender<SessionEvent>,
    ) -> Result<()> {
        let SessionConfig {
            time_per_guess_s,
            total_trials,
        } = self.config;
        session.game_id = self.store.next_game_id()?;
        info!(
            "Starting game {}: {} trials, {} s per guess",
            session.game_id, total_trials, time_per_guess_s
        );

        for trial_index in 1..=total_trials {
            if cancel.is_cancelled() {
                info!("Session cancelled before trial {}", trial_index);
                break;
            }

            let spec = self.engine.table().random_trial_spec(&mut self.rng);
            emit(
                events,
                SessionEvent::TrialStart {
                    spec: spec.clone(),
                    trial_index,
                    total_trials,
                },
            );

            let result = self.engine.run(&spec, time_per_guess_s, cancel)?;
            if result.outcome == TrialOutcome::Cancelled {
                info!("Trial {} cancelled after it started", trial_index);
            }

            let is_correct = result.is_correct();
            self.store.append_trial(TrialRow {
                timestamp: Local::now(),
                game_id: session.game_id,
                time_per_guess_s,
                total_trials,
                trial_number: trial_index,
                target_string: spec.string,
                target_position: spec.position,
                target_note: spec.note.clone(),
                played_note: result.played_note.clone(),
                is_correct,
            })?;
            emit(
                events,
                SessionEvent::TrialResult {
                    is_correct,
                    result: result.clone(),
                },
            );
            session.trials.push(result);
        }

        let trials_attempted = session.trials_attempted();
        let num_correct = session.num_correct();
        let best_score_message = if trials_attempted > 0 {
            let best = self
                .store
                .best_score(time_per_guess_s, trials_attempted, num_correct)?;
            self.store.append_final_score(ScoreRecord {
                timestamp: Local::now(),
                game_id: session.game_id,
                time_per_guess_s,
                total_trials: trials_attempted,
                total_correct: num_correct,
            })?;
            best.to_string()
        } else {
            NO_TRIALS_MESSAGE.to_string()
        };

        info!(
            "Game {} finished: {}/{} correct",
            session.game_id, num_correct, trials_attempted
        );
        emit(
            events,
            SessionEvent::GameComplete {
                num_correct,
                trials_attempted,
                best_score_message,
                cancelled: cancel.is_cancelled(),
            },
        );
        Ok(())
    }
}

fn emit(events: &Sender<SessionEvent>, event: SessionEvent) {
    if events.send(event).is_err() {
        debug!("Session event dropped: receiver gone");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("session worker panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("session worker panicked: {message}")
    } else {
        "session worker panicked".to_string()
    }
}

/// Owner's side of a running session.
///
/// Dropping the handle of a running session cancels it and waits for the
/// worker to reach its next checkpoint.
#[derive(Debug)]
pub struct SessionHandle {
    events: Receiver<SessionEvent>,
    cancel: CancelToken,
    thread: Option<JoinHandle<GameSession>>,
}

impl SessionHandle {
    pub fn cancel(&self) {
        info!("Session cancellation requested");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Every event queued so far, oldest first. Never blocks.
    pub fn try_recv_events(&self) -> Vec<SessionEvent> {
        self.events.try_iter().collect()
    }

    /// Blocks for the next event; `None` once the worker has exited and the
    /// queue is drained.
    pub fn recv(&self) -> Option<SessionEvent> {
        self.events.recv().ok()
    }

    /// Waits up to `timeout` for the next event. `None` on timeout or once
    /// the worker has exited and the queue is drained.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SessionEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the worker and returns the trials it completed.
    pub fn join(mut self) -> Result<GameSession> {
        let thread = self
            .thread
            .take()
            .ok_or_else(|| Error::Worker("session already joined".to_string()))?;
        thread
            .join()
            .map_err(|payload| Error::Worker(panic_message(payload.as_ref())))
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.cancel.cancel();
            if thread.join().is_err() {
                error!("Session worker panicked during shutdown");
            }
        }
    }
}
