//! # Pitch Detection Module
//!
//! Turns one window of audio into a fundamental frequency and a confidence.
//! The tuner and the trial recorder only see the [`PitchEstimator`] trait;
//! [`YinEstimator`] is the implementation used with a real microphone.
//!
//! ## YIN, as used here
//! - RMS gate in front, so silence never reaches the difference function
//! - first dip near the global minimum, not the global minimum itself
//! - parabolic interpolation around the chosen lag
//! - optional FFT peak refinement, bounded to half a semitone

use crate::config::PitchSettings;
use crate::fft::SpectrumAnalyzer;

/// A detected pitch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub frequency_hz: f32,
    /// 0.0 (noise) to 1.0 (pure periodic tone).
    pub confidence: f32,
}

/// Maps a window of mono samples to a pitch, or `None` when the window is
/// silent, noisy or otherwise unpitched.
pub trait PitchEstimator {
    fn estimate(&mut self, samples: &[f32], sample_rate: u32) -> Option<PitchEstimate>;
}

impl<E: PitchEstimator + ?Sized> PitchEstimator for Box<E> {
    fn estimate(&mut self, samples: &[f32], sample_rate: u32) -> Option<PitchEstimate> {
        (**self).estimate(samples, sample_rate)
    }
}

/// YIN estimator with an RMS noise gate and optional FFT refinement.
#[derive(Debug)]
pub struct YinEstimator {
    amplitude_threshold: f32,
    clarity_threshold: f32,
    spectrum: Option<SpectrumAnalyzer>,
}

impl YinEstimator {
    pub fn new(settings: &PitchSettings) -> Self {
        Self {
            amplitude_threshold: settings.amplitude_threshold,
            clarity_threshold: settings.clarity_threshold,
            spectrum: settings.refine_with_spectrum.then(SpectrumAnalyzer::new),
        }
    }
}

impl Default for YinEstimator {
    fn default() -> Self {
        Self::new(&PitchSettings::default())
    }
}

impl PitchEstimator for YinEstimator {
    fn estimate(&mut self, samples: &[f32], sample_rate: u32) -> Option<PitchEstimate> {
        let (rough_freq, confidence) = detect_pitch_yin(
            samples,
            sample_rate,
            self.amplitude_threshold,
            self.clarity_threshold,
        )?;

        let frequency_hz = match self.spectrum.as_mut() {
            Some(analyzer) => {
                let magnitudes = analyzer.magnitudes(samples);
                refine_from_spectrum(&magnitudes, rough_freq, sample_rate).unwrap_or(rough_freq)
            }
            None => rough_freq,
        };

        Some(PitchEstimate {
            frequency_hz,
            confidence,
        })
    }
}

/// Distance below the deepest dip within which the first dip is accepted.
const DIP_TOLERANCE: f32 = 0.05;

/// Lowest frequency reported; anything below is treated as a misread.
const MIN_FREQUENCY_HZ: f32 = 20.0;

/// Spectrum refinement may move the estimate by at most this ratio.
const MAX_REFINEMENT_RATIO: f32 = 0.03;

/// YIN pitch detection on one window.
///
/// 1. Rejects windows whose RMS is below `amplitude_threshold`
/// 2. Computes the cumulative mean normalised difference `d'(tau)`
/// 3. Takes the first dip and refines its lag with parabolic interpolation
///
/// # Arguments
/// * `signal` - Mono samples, at least two periods of the lowest pitch
/// * `sample_rate` - Sample rate of `signal` in Hz
/// * `amplitude_threshold` - RMS level below which the window is silent
/// * `clarity_threshold` - Largest `d'(tau)` still counted as periodic
///
/// # Returns
/// * `Some((frequency, confidence))` - Confidence is `1 - d'(tau)` at the
///   chosen period
/// * `None` - Silence, noise, or a window too short to hold two periods
pub fn detect_pitch_yin(
    signal: &[f32],
    sample_rate: u32,
    amplitude_threshold: f32,
    clarity_threshold: f32,
) -> Option<(f32, f32)> {
    let half = signal.len() / 2;
    if half < 3 || rms(signal) < amplitude_threshold {
        return None;
    }

    let cmnd = cumulative_mean_normalised(signal, half);
    let period = first_dip(&cmnd)?;
    let dip = cmnd[period];
    if dip > clarity_threshold || period + 1 >= half {
        return None;
    }

    let refined_period = period as f32
        + parabolic_offset(cmnd[period - 1], dip, cmnd[period + 1]).unwrap_or(0.0);
    let frequency = sample_rate as f32 / refined_period;
    (frequency.is_finite() && frequency > MIN_FREQUENCY_HZ)
        .then(|| (frequency, (1.0 - dip).clamp(0.0, 1.0)))
}

fn rms(signal: &[f32]) -> f32 {
    (signal.iter().map(|s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
}

/// `d'(tau)` for `tau` in `0..half`, with `d'(0) = 1`.
fn cumulative_mean_normalised(signal: &[f32], half: usize) -> Vec<f32> {
    let mut cmnd = vec![1.0; half];
    let mut running_sum = 0.0;
    for tau in 1..half {
        let diff: f32 = signal[..half]
            .iter()
            .zip(&signal[tau..tau + half])
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        running_sum += diff;
        if running_sum != 0.0 {
            cmnd[tau] = diff * tau as f32 / running_sum;
        }
    }
    cmnd
}

/// The first lag whose value comes within [`DIP_TOLERANCE`] of the deepest
/// dip, followed downhill to its local minimum. Taking the first rather
/// than the deepest dip avoids locking onto a multiple of the period.
fn first_dip(cmnd: &[f32]) -> Option<usize> {
    let deepest = cmnd.iter().skip(1).copied().fold(f32::INFINITY, f32::min);
    let mut tau = (2..cmnd.len()).find(|&tau| cmnd[tau] < deepest + DIP_TOLERANCE)?;
    while tau + 1 < cmnd.len() && cmnd[tau + 1] < cmnd[tau] {
        tau += 1;
    }
    Some(tau)
}

/// Offset of the vertex of the parabola through three equally spaced
/// points, relative to the middle one. `None` when they are collinear.
fn parabolic_offset(left: f32, centre: f32, right: f32) -> Option<f32> {
    let curvature = left - 2.0 * centre + right;
    (curvature.abs() > 1e-6).then(|| (left - right) / (2.0 * curvature))
}

/// Sharpens `rough_freq` using a magnitude spectrum of the same window.
///
/// Interpolates the log-magnitude peak within two bins of `rough_freq`.
/// A result more than about half a semitone away belongs to a neighbouring
/// partial, so the rough estimate is kept instead.
///
/// # Arguments
/// * `magnitudes` - Half spectrum from [`SpectrumAnalyzer::magnitudes`]
/// * `rough_freq` - Time-domain estimate in Hz
/// * `sample_rate` - Sample rate of the analysed window in Hz
///
/// # Returns
/// * `Some(freq)` - Refined frequency, or `rough_freq` when no better peak
///   is found
/// * `None` - Non-positive `rough_freq` or a spectrum under three bins
pub fn refine_from_spectrum(
    magnitudes: &[f32],
    rough_freq: f32,
    sample_rate: u32,
) -> Option<f32> {
    if rough_freq <= 0.0 || magnitudes.len() < 3 {
        return None;
    }
    let fft_len = (magnitudes.len() * 2) as f32;
    let bin_hz = sample_rate as f32 / fft_len;
    let last = magnitudes.len() - 1;

    let target_bin = rough_freq / bin_hz;
    let lo = (target_bin - 2.0).max(0.0) as usize;
    let hi = ((target_bin + 2.0).min(last as f32) as usize).min(last);
    if lo >= hi {
        return Some(rough_freq);
    }

    let peak = (lo..=hi).max_by(|&a, &b| magnitudes[a].total_cmp(&magnitudes[b]))?;
    if peak == 0 || peak == last {
        return Some(rough_freq);
    }

    let [left, centre, right] = [peak - 1, peak, peak + 1].map(|bin| magnitudes[bin].ln());
    if !(left.is_finite() && centre.is_finite() && right.is_finite()) {
        return Some(rough_freq);
    }
    let Some(offset) = parabolic_offset(left, centre, right) else {
        return Some(rough_freq);
    };

    let refined = (peak as f32 + offset) * bin_hz;
    let close_enough = (refined / rough_freq - 1.0).abs() < MAX_REFINEMENT_RATIO;
    Some(if refined.is_finite() && refined > 0.0 && close_enough {
        refined
    } else {
        rough_freq
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44100;

    fn sine(freq: f32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                (2.0 * std::f32::consts::PI * freq * t).sin() * amplitude
            })
            .collect()
    }

    fn plain_yin() -> YinEstimator {
        YinEstimator::new(&PitchSettings {
            refine_with_spectrum: false,
            ..PitchSettings::default()
        })
    }

    #[test]
    fn detects_a440() {
        let estimate = plain_yin().estimate(&sine(440.0, 2048, 0.5), SAMPLE_RATE).unwrap();
        assert!((estimate.frequency_hz - 440.0).abs() < 2.0, "got {}", estimate.frequency_hz);
        assert!(estimate.confidence > 0.9);
    }

    #[test]
    fn detects_low_e_string() {
        let estimate = plain_yin().estimate(&sine(82.41, 2048, 0.5), SAMPLE_RATE).unwrap();
        assert!((estimate.frequency_hz - 82.41).abs() < 1.0, "got {}", estimate.frequency_hz);
    }

    #[test]
    fn refinement_stays_near_the_fundamental() {
        let mut yin = YinEstimator::default();
        let estimate = yin.estimate(&sine(440.0, 2048, 0.5), SAMPLE_RATE).unwrap();
        assert!((estimate.frequency_hz - 440.0).abs() < 5.0, "got {}", estimate.frequency_hz);
    }

    #[test]
    fn silence_has_no_pitch() {
        assert_eq!(plain_yin().estimate(&vec![0.0; 2048], SAMPLE_RATE), None);
        assert_eq!(plain_yin().estimate(&sine(440.0, 2048, 0.001), SAMPLE_RATE), None);
    }

    #[test]
    fn noise_has_no_pitch() {
        let mut state = 0x2545_f491_u32;
        let noise: Vec<f32> = (0..2048)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect();
        assert_eq!(plain_yin().estimate(&noise, SAMPLE_RATE), None);
    }

    #[test]
    fn tiny_window_is_rejected() {
        assert_eq!(detect_pitch_yin(&[0.5, -0.5, 0.5, -0.5], SAMPLE_RATE, 0.01, 0.1), None);
    }

    #[test]
    fn parabola_vertex_offset() {
        assert_eq!(parabolic_offset(1.0, 0.0, 1.0), Some(0.0));
        assert_eq!(parabolic_offset(1.0, 1.0, 1.0), None);
        // Lower right neighbour pulls the vertex right.
        assert!(parabolic_offset(1.0, 0.0, 0.5).unwrap() > 0.0);
    }
}
