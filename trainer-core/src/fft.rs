//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectra for refining pitch estimates. Windows of any length
//! are accepted; the planner caches FFT plans per length.

use rustfft::{FftPlanner, num_complex::Complex};

/// Mean-removed, Hann-windowed copy of `signal` as complex input.
fn windowed_input(signal: &[f32]) -> Vec<Complex<f32>> {
    let mean = signal.iter().sum::<f32>() / signal.len() as f32;
    let span = signal.len().saturating_sub(1).max(1) as f32;
    let tau = 2.0 * std::f32::consts::PI;
    signal
        .iter()
        .enumerate()
        .map(|(i, &sample)| {
            let hann = if signal.len() < 2 {
                1.0
            } else {
                0.5 - 0.5 * (tau * i as f32 / span).cos()
            };
            Complex::new((sample - mean) * hann, 0.0)
        })
        .collect()
}

/// Reusable forward transform producing magnitude spectra.
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f32>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer").finish_non_exhaustive()
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Magnitude spectrum of one window.
    ///
    /// 1. Removes the DC offset
    /// 2. Applies a Hann window
    /// 3. Runs a forward FFT, planned once per window length
    ///
    /// # Arguments
    /// * `signal` - Mono samples of any length
    ///
    /// # Returns
    /// Magnitudes of the first `signal.len() / 2` bins (up to Nyquist), bin
    /// `k` at `k * sample_rate / signal.len()` Hz. Empty for an empty signal.
    pub fn magnitudes(&mut self, signal: &[f32]) -> Vec<f32> {
        if signal.is_empty() {
            return Vec::new();
        }

        let mut buffer = windowed_input(signal);
        self.planner.plan_fft_forward(buffer.len()).process(&mut buffer);

        buffer
            .iter()
            .take(signal.len() / 2)
            .map(|c| c.norm())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_peaks_at_its_bin() {
        let sample_rate = 8000.0;
        let n = 1024;
        // Exactly bin 64.
        let freq = 64.0 * sample_rate / n as f32;
        let signal: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect();

        let mut analyzer = SpectrumAnalyzer::new();
        let mags = analyzer.magnitudes(&signal);
        assert_eq!(mags.len(), n / 2);

        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(64));
    }

    #[test]
    fn empty_signal_has_empty_spectrum() {
        assert!(SpectrumAnalyzer::new().magnitudes(&[]).is_empty());
    }
}
