//! Tuner capture thread.
//!
//! Reads windows from an [`AudioSource`], runs the pitch estimator on each
//! one and publishes the result into a [`ReadingChannel`]. Windows with no
//! pitch publish a silent reading so the display can tell "nothing heard"
//! from "nothing new".

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::audio::{AudioSource, AudioStream};
use crate::cancel::CancelToken;
use crate::channel::{Reading, ReadingChannel};
use crate::config::Settings;
use crate::pitch::PitchEstimator;
use crate::{Error, Result};

/// A running capture thread. Stopping (or dropping) it closes the stream.
#[derive(Debug)]
pub struct TunerCapture {
    stop: CancelToken,
    thread_handle: Option<JoinHandle<()>>,
}

impl TunerCapture {
    /// Spawns the capture thread, which opens the stream itself and reports
    /// back before capturing; open failures are returned here.
    pub fn start<S, E>(
        source: S,
        estimator: E,
        channel: Arc<ReadingChannel>,
        settings: &Settings,
    ) -> Result<Self>
    where
        S: AudioSource + Send + 'static,
        E: PitchEstimator + Send + 'static,
    {
        let audio = settings.audio.clone();
        let stop = CancelToken::new();
        let thread_stop = stop.clone();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);

        let thread_handle = thread::Builder::new()
            .name("tuner-capture".to_string())
            .spawn(move || {
                let stream = match source.open(&audio) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                capture_loop(stream, estimator, &channel, &thread_stop);
            })?;

        let startup = ready_rx.recv().unwrap_or_else(|_| {
            Err(Error::Worker(
                "capture thread exited during startup".to_string(),
            ))
        });
        if let Err(e) = startup {
            if thread_handle.join().is_err() {
                error!("Tuner capture thread panicked during startup");
            }
            return Err(e);
        }

        Ok(Self {
            stop,
            thread_handle: Some(thread_handle),
        })
    }

    /// True once the thread has exited, whether stopped or after a read
    /// failure.
    pub fn is_finished(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Signals the thread and waits for it. The current window is allowed
    /// to finish first.
    pub fn stop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("Tuner capture thread panicked");
            }
        }
    }
}

impl Drop for TunerCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop<A, E>(mut stream: A, mut estimator: E, channel: &ReadingChannel, stop: &CancelToken)
where
    A: AudioStream,
    E: PitchEstimator,
{
    let sample_rate = stream.sample_rate();
    info!("Tuner capture running at {} Hz", sample_rate);

    while !stop.is_cancelled() {
        let frame = match stream.read() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Tuner capture stopped: {}", e);
                break;
            }
        };

        let estimate = panic::catch_unwind(AssertUnwindSafe(|| {
            estimator.estimate(&frame, sample_rate)
        }))
        .unwrap_or_else(|_| {
            warn!("Pitch estimator panicked, treating window as silent");
            None
        });

        channel.publish(match estimate {
            Some(estimate) => Reading::pitched(estimate.frequency_hz),
            None => Reading::silent(),
        });
    }

    drop(stream);
    debug!("Tuner capture thread finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioSettings;
    use crate::pitch::PitchEstimate;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    /// Yields `frames` windows of a constant level, then fails.
    struct Scripted {
        frames: usize,
        closed: Arc<AtomicBool>,
    }

    struct ScriptedStream {
        remaining: usize,
        closed: Arc<AtomicBool>,
    }

    impl AudioSource for Scripted {
        type Stream = ScriptedStream;

        fn open(&self, _settings: &AudioSettings) -> Result<ScriptedStream> {
            Ok(ScriptedStream {
                remaining: self.frames,
                closed: self.closed.clone(),
            })
        }
    }

    impl AudioStream for ScriptedStream {
        fn sample_rate(&self) -> u32 {
            8_000
        }

        fn read(&mut self) -> Result<Vec<f32>> {
            if self.remaining == 0 {
                return Err(Error::Audio("script exhausted".into()));
            }
            self.remaining -= 1;
            thread::sleep(Duration::from_millis(1));
            Ok(vec![0.5; 64])
        }
    }

    impl Drop for ScriptedStream {
        fn drop(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct Fixed(Option<f32>);

    impl PitchEstimator for Fixed {
        fn estimate(&mut self, _signal: &[f32], _sample_rate: u32) -> Option<PitchEstimate> {
            self.0.map(|frequency_hz| PitchEstimate {
                frequency_hz,
                confidence: 1.0,
            })
        }
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn publishes_detected_frequency() {
        let closed = Arc::new(AtomicBool::new(false));
        let source = Scripted {
            frames: usize::MAX,
            closed: closed.clone(),
        };
        let channel = Arc::new(ReadingChannel::new());
        let mut capture =
            TunerCapture::start(source, Fixed(Some(110.0)), channel.clone(), &Settings::default())
                .unwrap();

        let mut reading = None;
        wait_until(|| {
            reading = channel.take();
            reading.is_some()
        });
        assert_eq!(reading, Some(Reading::pitched(110.0)));

        capture.stop();
        assert!(capture.is_finished());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn unpitched_windows_publish_silence() {
        let source = Scripted {
            frames: usize::MAX,
            closed: Arc::new(AtomicBool::new(false)),
        };
        let channel = Arc::new(ReadingChannel::new());
        let _capture =
            TunerCapture::start(source, Fixed(None), channel.clone(), &Settings::default())
                .unwrap();

        let mut reading = None;
        wait_until(|| {
            reading = channel.take();
            reading.is_some()
        });
        assert_eq!(reading, Some(Reading::silent()));
    }

    #[test]
    fn read_failure_ends_thread_and_closes_stream() {
        let closed = Arc::new(AtomicBool::new(false));
        let source = Scripted {
            frames: 3,
            closed: closed.clone(),
        };
        let channel = Arc::new(ReadingChannel::new());
        let capture =
            TunerCapture::start(source, Fixed(Some(82.4)), channel, &Settings::default()).unwrap();

        wait_until(|| capture.is_finished());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn open_failure_is_returned_to_the_caller() {
        struct NoDevice;

        impl AudioSource for NoDevice {
            type Stream = ScriptedStream;

            fn open(&self, _settings: &AudioSettings) -> Result<ScriptedStream> {
                Err(Error::NoInputDevice)
            }
        }

        let channel = Arc::new(ReadingChannel::new());
        let err = TunerCapture::start(NoDevice, Fixed(None), channel, &Settings::default())
            .unwrap_err();
        assert!(matches!(err, Error::NoInputDevice));
    }
}
