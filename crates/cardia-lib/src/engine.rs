use crate::config::Parameters;
use crate::metrics::{hrv, rsa, sqi};
use crate::signal::EcgFrame;
use anyhow::{bail, Result};
use std::collections::BTreeMap;

/// Extra information emitted by peak detection alongside the per-sample flags.
#[derive(Debug, Clone)]
pub struct PeakSummary {
    pub positions: Vec<usize>,
    pub mean_rr_s: Option<f64>,
}

/// The signal-processing capability consumed by the pipeline. Windowed metric
/// computation and RSA go through this seam so per-window failure isolation
/// can be exercised against a stub engine in tests.
pub trait MetricEngine {
    /// Clean the raw ECG trace.
    fn clean(&self, raw: &[f64], fs: f64, params: &Parameters) -> Result<Vec<f64>>;

    /// Detect R-peaks; the flag vector is aligned with the input samples.
    fn detect_peaks(
        &self,
        clean: &[f64],
        fs: f64,
        params: &Parameters,
    ) -> Result<(Vec<bool>, PeakSummary)>;

    /// Full HRV metric set for the rows of one analysis window.
    fn compute_hrv(&self, window: &EcgFrame, params: &Parameters)
        -> Result<BTreeMap<String, f64>>;

    /// Single-shot RSA metric set for one segment.
    fn compute_rsa(
        &self,
        segment: &EcgFrame,
        params: &Parameters,
    ) -> Result<BTreeMap<String, f64>>;

    /// Per-sample signal quality for a cleaned trace with known peaks.
    fn signal_quality(
        &self,
        clean: &[f64],
        peak_positions: &[usize],
        fs: f64,
        params: &Parameters,
    ) -> Result<Vec<f64>>;
}

/// Average heart rate over a window: beats per minute from the peak count and
/// the window length in samples.
pub fn heart_rate_bpm(n_peaks: u32, window_len: usize, fs: f64) -> f64 {
    if window_len == 0 {
        return 0.0;
    }
    let seconds = window_len as f64 / fs;
    (60.0 / seconds) * n_peaks as f64
}

/// Clean a raw series, detect peaks, and score quality, assembling the full
/// preprocessed frame indexed `0..n`.
pub fn preprocess(raw: &[f64], engine: &dyn MetricEngine, params: &Parameters) -> Result<EcgFrame> {
    let fs = params.general.sampling_frequency;
    let clean = engine.clean(raw, fs, params)?;
    let (peaks, summary) = engine.detect_peaks(&clean, fs, params)?;
    let quality = engine.signal_quality(&clean, &summary.positions, fs, params)?;
    let index = (0..raw.len()).map(|i| i as f64).collect();
    Ok(EcgFrame::new(
        fs,
        index,
        raw.to_vec(),
        clean,
        peaks,
        quality,
    )?)
}

/// Built-in engine: drift/powerline cleaning, Pan-Tompkins-style peak
/// detection, and the HRV/RSA/SQI routines from `metrics`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEngine;

impl MetricEngine for NativeEngine {
    fn clean(&self, raw: &[f64], fs: f64, params: &Parameters) -> Result<Vec<f64>> {
        match params.cleaning.method.as_str() {
            "bandpass" => {
                let detrended = single_pole_highpass(raw, fs, 0.5);
                Ok(powerline_notch(&detrended, fs, params.cleaning.powerline))
            }
            other => bail!("unknown cleaning method '{other}'"),
        }
    }

    fn detect_peaks(
        &self,
        clean: &[f64],
        fs: f64,
        params: &Parameters,
    ) -> Result<(Vec<bool>, PeakSummary)> {
        match params.peak_detection.method.as_str() {
            "pan-tompkins" => {
                let mut positions = pan_tompkins_peaks(clean, fs);
                if params.peak_detection.correct_artifacts {
                    positions = drop_implausible_peaks(positions, fs);
                }
                let mean_rr_s = (positions.len() > 1).then(|| {
                    let spans: f64 = positions
                        .windows(2)
                        .map(|w| (w[1] - w[0]) as f64 / fs)
                        .sum();
                    spans / (positions.len() - 1) as f64
                });
                let mut flags = vec![false; clean.len()];
                for &p in &positions {
                    flags[p] = true;
                }
                Ok((flags, PeakSummary { positions, mean_rr_s }))
            }
            other => bail!("unknown peak detection method '{other}'"),
        }
    }

    fn compute_hrv(
        &self,
        window: &EcgFrame,
        params: &Parameters,
    ) -> Result<BTreeMap<String, f64>> {
        let rr = crate::signal::RRSeries::from_frame(window);
        let mut metrics = hrv::hrv_time_indices(&rr)?;
        if params.general.compute_hrv_frequency_metrics {
            metrics.extend(hrv::hrv_frequency_indices(
                &rr,
                &params.hrv_frequency_settings,
            )?);
        }
        Ok(metrics)
    }

    fn compute_rsa(
        &self,
        segment: &EcgFrame,
        params: &Parameters,
    ) -> Result<BTreeMap<String, f64>> {
        rsa::rsa_indices(segment, &params.hrv_frequency_settings)
    }

    fn signal_quality(
        &self,
        clean: &[f64],
        peak_positions: &[usize],
        fs: f64,
        params: &Parameters,
    ) -> Result<Vec<f64>> {
        sqi::signal_quality(clean, peak_positions, fs, &params.signal_quality_index.method)
    }
}

/// Pan-Tompkins-style detection: band-pass, differentiate, square, integrate
/// over a moving window, then pick peaks with an adaptive threshold and a
/// search-back to the local band-passed maximum.
fn pan_tompkins_peaks(clean: &[f64], fs: f64) -> Vec<usize> {
    if clean.is_empty() {
        return Vec::new();
    }
    let qrs_band = single_pole_lowpass(&single_pole_highpass(clean, fs, 5.0), fs, 15.0);
    let mut derivative = vec![0.0; qrs_band.len()];
    for i in 1..qrs_band.len() {
        derivative[i] = qrs_band[i] - qrs_band[i - 1];
    }
    let squared: Vec<f64> = derivative.iter().map(|x| x * x).collect();
    let mwi_len = ((0.150 * fs).round() as usize).max(1);
    let envelope = trailing_moving_average(&squared, mwi_len);

    let refractory = ((0.2 * fs).round() as usize).max(1);
    let search_back = ((0.150 * fs).round() as usize).max(1);

    let warmup = envelope.len().min((fs as usize).max(1));
    let initial = envelope[..warmup].iter().sum::<f64>() / warmup.max(1) as f64;
    let mut signal_level = initial;
    let mut noise_level = initial * 0.5;
    let mut threshold = noise_level + 0.6 * (signal_level - noise_level).max(0.0);

    let mut peaks: Vec<usize> = Vec::new();
    let mut last_detection = 0usize;
    for (i, &sample) in envelope.iter().enumerate() {
        let past_refractory = peaks.is_empty() || i - last_detection >= refractory;
        if sample >= threshold && past_refractory {
            let start = i.saturating_sub(search_back);
            let apex = (start..=i.min(qrs_band.len() - 1))
                .max_by(|&a, &b| qrs_band[a].total_cmp(&qrs_band[b]))
                .unwrap_or(i);
            peaks.push(apex);
            last_detection = i;
            signal_level = 0.125 * sample + 0.875 * signal_level;
        } else {
            noise_level = 0.125 * sample + 0.875 * noise_level;
        }
        threshold = noise_level + 0.6 * (signal_level - noise_level).max(0.0);
    }
    peaks.sort_unstable();
    peaks.dedup();
    peaks
}

/// Artifact correction: successive detections closer than a physiological
/// refractory period keep only the earlier peak.
fn drop_implausible_peaks(positions: Vec<usize>, fs: f64) -> Vec<usize> {
    let min_gap = ((0.24 * fs).round() as usize).max(1);
    let mut kept: Vec<usize> = Vec::with_capacity(positions.len());
    for p in positions {
        match kept.last() {
            Some(&last) if p - last < min_gap => {}
            _ => kept.push(p),
        }
    }
    kept
}

fn single_pole_highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = rc / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev_y = data[0];
    let mut prev_x = data[0];
    for &x in data {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }
    out
}

fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = dt / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = data[0];
    for &x in data {
        prev = prev + alpha * (x - prev);
        out.push(prev);
    }
    out
}

/// Suppress mains interference by averaging over one powerline period.
fn powerline_notch(data: &[f64], fs: f64, powerline_hz: f64) -> Vec<f64> {
    if powerline_hz <= 0.0 {
        return data.to_vec();
    }
    let period = ((fs / powerline_hz).round() as usize).max(1);
    trailing_moving_average(data, period)
}

fn trailing_moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if data.is_empty() || win <= 1 {
        return data.to_vec();
    }
    let mut out = vec![0.0; data.len()];
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= win {
            acc -= data[i - win];
        }
        out[i] = acc / win.min(i + 1) as f64;
    }
    out
}
