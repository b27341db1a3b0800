//! Welch power spectral density of the population spike count signal.

use meso_core::{AnalysisError, Result, SparseMatrix, Time};
use meso_preprocess::SpikeCount;
use ndarray::Array1;
use num_complex::Complex64;
use rustfft::FftPlanner;
use std::f64::consts::PI;

/// Overlap of consecutive segments as a fraction of the window length
pub const SEGMENT_OVERLAP: f64 = 0.75;

/// Symmetric Hann window of length `n`
fn hann(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / denom).cos())
        .collect()
}

/// One-sided power spectral density of `x` sampled at `fs`.
///
/// Segments of `nfft` samples overlap by 75 %, are mean-detrended and Hann
/// windowed; a signal shorter than `nfft` is zero padded. The periodograms are
/// scaled to a density (`/fs`, `/Σw²`, doubled except at DC and Nyquist) and
/// averaged. Returns `(frequencies, psd)`.
pub fn welch_psd(x: &[f64], fs: f64, nfft: usize) -> Result<(Array1<f64>, Array1<f64>)> {
    if nfft < 2 {
        return Err(AnalysisError::Configuration(format!(
            "FFT length must be at least 2, got {nfft}"
        )));
    }
    let noverlap = (SEGMENT_OVERLAP * nfft as f64) as usize;
    let step = nfft - noverlap;

    let mut signal = x.to_vec();
    if signal.len() < nfft {
        signal.resize(nfft, 0.0);
    }
    let n_segments = (signal.len() - nfft) / step + 1;
    let n_freqs = nfft / 2 + 1;

    let window = hann(nfft);
    let window_norm: f64 = window.iter().map(|w| w * w).sum();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(nfft);

    let mut psd = Array1::<f64>::zeros(n_freqs);
    let mut buffer = vec![Complex64::new(0.0, 0.0); nfft];
    for seg in 0..n_segments {
        let segment = &signal[seg * step..seg * step + nfft];
        let mean = segment.iter().sum::<f64>() / nfft as f64;
        for ((b, &s), &w) in buffer.iter_mut().zip(segment).zip(&window) {
            *b = Complex64::new((s - mean) * w, 0.0);
        }
        fft.process(&mut buffer);
        for (p, c) in psd.iter_mut().zip(&buffer) {
            *p += c.norm_sqr();
        }
    }

    // Nyquist only exists for even lengths
    let doubled_end = if nfft % 2 == 0 { n_freqs - 1 } else { n_freqs };
    for k in 1..doubled_end {
        psd[k] *= 2.0;
    }
    psd /= fs * window_norm * n_segments as f64;

    let frequencies = Array1::from_iter((0..n_freqs).map(|k| k as f64 * fs / nfft as f64));
    Ok((frequencies, psd))
}

/// Spectrum of the per-bin spike count summed over all neurons.
pub fn population_psd(
    sptrains_bintime: &SparseMatrix<SpikeCount>,
    binsize_time: Time,
    nfft: usize,
) -> Result<(Array1<f64>, Array1<f64>)> {
    let fs = 1000.0 / binsize_time;
    let x = sptrains_bintime.col_sums();
    welch_psd(&x.to_vec(), fs, nfft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hann_is_symmetric() {
        let w = hann(5);
        assert_relative_eq!(w[0], 0.0);
        assert_relative_eq!(w[2], 1.0);
        assert_relative_eq!(w[1], w[3], epsilon = 1e-15);
    }

    #[test]
    fn test_sinusoid_peak() {
        let fs = 2000.0;
        // on a frequency bin, so whole periods fit each segment
        let f0 = 93.75;
        let nfft = 256;
        let x: Vec<f64> = (0..4000)
            .map(|i| 3.0 + (2.0 * PI * f0 * i as f64 / fs).sin())
            .collect();
        let (freqs, psd) = welch_psd(&x, fs, nfft).unwrap();
        assert_eq!(freqs.len(), nfft / 2 + 1);

        let peak = psd
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        let resolution = fs / nfft as f64;
        assert!((freqs[peak] - f0).abs() <= resolution);
        // mean removed
        assert!(psd[0] < psd[peak] * 1e-2);
    }

    #[test]
    fn test_short_signal_is_zero_padded() {
        let (freqs, psd) = welch_psd(&[1.0, 0.0, 1.0, 0.0], 1000.0, 16).unwrap();
        assert_eq!(freqs.len(), 9);
        assert_relative_eq!(freqs[8], 500.0);
        assert!(psd.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_density_integrates_to_variance() {
        // unit-variance signal at the Nyquist frequency
        let x: Vec<f64> = (0..1024).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let fs = 100.0;
        let (freqs, psd) = welch_psd(&x, fs, 64).unwrap();
        let df = freqs[1] - freqs[0];
        let power: f64 = psd.iter().sum::<f64>() * df;
        assert!(power > 0.5 && power < 1.5);
    }
}
