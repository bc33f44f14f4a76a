//! # Audio Capture Module
//!
//! Fixed-size windows of mono `f32` samples from an input device.
//!
//! Capture code is written against [`AudioSource`] / [`AudioStream`] so the
//! trial recorder and the tuner thread can run on scripted audio in tests.
//! [`CpalSource`] is the real implementation on top of CPAL.
//!
//! A stream is a scoped resource: dropping it stops capture and releases
//! the device, so every exit path (completion, cancellation, error) closes
//! the handle.

use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::AudioSettings;
use crate::{Error, Result};

/// How long `read` waits for the next window before giving up.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Windows buffered between the device callback and the reader.
const FRAME_QUEUE_DEPTH: usize = 32;

/// An open capture stream. Dropping it closes the device.
pub trait AudioStream {
    /// Rate the device actually runs at, which may differ from the request.
    fn sample_rate(&self) -> u32;

    /// Blocks until the next window of `frame_size` samples is available.
    fn read(&mut self) -> Result<Vec<f32>>;
}

/// Something that can open capture streams.
pub trait AudioSource {
    type Stream: AudioStream;

    fn open(&self, settings: &AudioSettings) -> Result<Self::Stream>;
}

/// Input devices reached through the host's default CPAL backend.
#[derive(Debug, Clone, Default)]
pub struct CpalSource;

impl CpalSource {
    pub fn new() -> Self {
        Self
    }

    /// Picks the input device.
    ///
    /// # Arguments
    /// * `host` - CPAL host to enumerate
    /// * `wanted` - Case-insensitive part of the device name, or `None` for
    ///   the host default
    ///
    /// # Returns
    /// * `Ok(device)` - First device whose name contains `wanted`
    /// * `Err(NoInputDevice)` - No default input exists
    /// * `Err(Audio)` - Enumeration failed or nothing matched
    fn select_device(host: &cpal::Host, wanted: Option<&str>) -> Result<cpal::Device> {
        match wanted {
            None => host.default_input_device().ok_or(Error::NoInputDevice),
            Some(wanted) => {
                let wanted_lower = wanted.to_lowercase();
                host.input_devices()
                    .map_err(Error::audio)?
                    .find(|device| {
                        device
                            .name()
                            .map(|name| name.to_lowercase().contains(&wanted_lower))
                            .unwrap_or(false)
                    })
                    .ok_or_else(|| Error::Audio(format!("No input device matching '{wanted}'")))
            }
        }
    }
}

impl AudioSource for CpalSource {
    type Stream = CpalStream;

    /// Opens and starts an input stream.
    ///
    /// 1. Selects the device named in `settings`, or the default one
    /// 2. Chooses an `f32` configuration nearest the requested rate
    /// 3. Starts a callback that downmixes and re-chunks into windows
    ///
    /// # Arguments
    /// * `settings` - Device name, sample rate and window size
    ///
    /// # Returns
    /// * `Ok(stream)` - Running stream; its `sample_rate` is the rate
    ///   actually granted by the device
    /// * `Err(e)` - No device, no usable configuration, or the backend
    ///   refused to start
    fn open(&self, settings: &AudioSettings) -> Result<CpalStream> {
        let host = cpal::default_host();
        let device = Self::select_device(&host, settings.device.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        info!("Using audio input device: {}", device_name);

        let configs = device
            .supported_input_configs()
            .map_err(Error::audio)?
            .collect::<Vec<_>>();
        let supported_config = find_supported_config(configs, settings.sample_rate)
            .ok_or_else(|| Error::UnsupportedConfig(device_name.clone()))?;

        let rate = settings.sample_rate.clamp(
            supported_config.min_sample_rate().0,
            supported_config.max_sample_rate().0,
        );
        let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
        let sample_rate = config.sample_rate().0;
        let channels = config.channels().max(1) as usize;
        let config: cpal::StreamConfig = config.into();
        info!("Selected sample rate: {} Hz, {} channel(s)", sample_rate, channels);

        let (frame_tx, frame_rx) = crossbeam_channel::bounded(FRAME_QUEUE_DEPTH);
        let stream = device
            .build_input_stream(
                &config,
                {
                    let mut chunker = FrameChunker::new(frame_tx, channels, settings.frame_size);
                    move |data: &[f32], _: &cpal::InputCallbackInfo| chunker.push(data)
                },
                |err| error!("An error occurred on the audio stream: {}", err),
                None,
            )
            .map_err(Error::audio)?;
        stream.play().map_err(Error::audio)?;

        Ok(CpalStream {
            stream,
            frames: frame_rx,
            sample_rate,
        })
    }
}

/// Re-chunks device callbacks into mono windows of `frame_size` samples.
///
/// Windows are dropped if the reader falls behind.
struct FrameChunker {
    sender: Sender<Vec<f32>>,
    channels: usize,
    frame_size: usize,
    audio_buffer: Vec<f32>,
}

impl FrameChunker {
    /// # Arguments
    /// * `sender` - Bounded queue the finished windows go to
    /// * `channels` - Interleaved channel count of the device data
    /// * `frame_size` - Samples per mono window
    fn new(sender: Sender<Vec<f32>>, channels: usize, frame_size: usize) -> Self {
        Self {
            sender,
            channels: channels.max(1),
            frame_size: frame_size.max(1),
            audio_buffer: Vec::with_capacity(frame_size * 2),
        }
    }

    /// Appends one callback's worth of interleaved samples and sends every
    /// complete window. A full queue drops the window.
    fn push(&mut self, data: &[f32]) {
        if self.channels == 1 {
            self.audio_buffer.extend_from_slice(data);
        } else {
            self.audio_buffer.extend(
                data.chunks(self.channels)
                    .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
            );
        }

        while self.audio_buffer.len() >= self.frame_size {
            let frame_to_send = self.audio_buffer[..self.frame_size].to_vec();
            let _ = self.sender.try_send(frame_to_send);
            self.audio_buffer.drain(..self.frame_size);
        }
    }
}

/// Finds the best supported configuration for the target sample rate.
///
/// Only `f32` configurations are considered. Among those, a range that
/// contains the target wins, then the closest range, then mono over
/// multi-channel.
///
/// # Arguments
/// * `configs` - Supported input configurations of the device
/// * `target_rate` - Desired sample rate in Hz
///
/// # Returns
/// * `Some(config)` - Best matching configuration
/// * `None` - The device offers no `f32` input
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let in_range =
                c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0;
            let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
            let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
            let rate_diff = if in_range { 0 } else { min_diff.min(max_diff) };
            (rate_diff, c.channels() != 1, c.channels())
        })
}

/// A live CPAL input stream delivering mono windows.
pub struct CpalStream {
    stream: cpal::Stream,
    frames: Receiver<Vec<f32>>,
    sample_rate: u32,
}

impl AudioStream for CpalStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self) -> Result<Vec<f32>> {
        match self.frames.recv_timeout(READ_TIMEOUT) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => {
                Err(Error::Audio("Timed out waiting for audio input".to_string()))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::Audio("Audio stream closed".to_string()))
            }
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            warn!("Error pausing audio stream: {}", e);
        }
        debug!("Audio stream released");
    }
}
