use crate::config::HrvFrequencySettings;
use crate::metrics::hrv::{interpolate_rr_ms, welch_psd};
use crate::signal::{EcgFrame, RRSeries};
use anyhow::{bail, Result};
use std::collections::BTreeMap;

const TACHOGRAM_FS: f64 = 4.0;

/// Respiratory sinus arrhythmia indices for one segment, quantified from the
/// respiratory-band oscillation of the RR tachogram:
/// - `RSA_PorgesBohrer`: natural log of HF-band RR power (ms^2),
/// - `RSA_P2T_*`: peak-to-trough excursion statistics of the band-limited
///   tachogram, one excursion per respiratory cycle.
pub fn rsa_indices(
    frame: &EcgFrame,
    settings: &HrvFrequencySettings,
) -> Result<BTreeMap<String, f64>> {
    let rr = RRSeries::from_frame(frame);
    if rr.rr.len() < 2 {
        bail!(
            "need at least 3 detected peaks for RSA, got {}",
            rr.rr.len() + 1
        );
    }

    let hf_power = welch_psd(&rr, TACHOGRAM_FS).band_power(settings.hf);
    if hf_power <= 0.0 {
        bail!("no respiratory-band power in the RR tachogram");
    }

    let tachogram = interpolate_rr_ms(&rr, TACHOGRAM_FS);
    let band_limited = respiratory_band_filter(&tachogram, settings.hf, TACHOGRAM_FS);
    let excursions = peak_to_trough_excursions(&band_limited);
    if excursions.is_empty() {
        bail!("no respiratory cycles found in the RR tachogram");
    }

    let n = excursions.len() as f64;
    let mean = excursions.iter().sum::<f64>() / n;
    let sd = (excursions.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();

    let mut out = BTreeMap::new();
    out.insert("RSA_P2T_Mean".into(), mean);
    out.insert("RSA_P2T_Mean_log".into(), mean.ln());
    out.insert("RSA_P2T_SD".into(), sd);
    out.insert("RSA_PorgesBohrer".into(), hf_power.ln());
    Ok(out)
}

/// Crude band-pass onto the respiratory band: subtract a moving average wider
/// than the slowest breath, then smooth with one narrower than the fastest.
fn respiratory_band_filter(signal: &[f64], band: [f64; 2], fs: f64) -> Vec<f64> {
    let lo_win = ((fs / band[0].max(1e-3)).round() as usize).max(1);
    let hi_win = ((fs / band[1].max(1e-3)).round() as usize).max(1);
    let trend = centered_moving_average(signal, lo_win);
    let detrended: Vec<f64> = signal.iter().zip(&trend).map(|(x, t)| x - t).collect();
    centered_moving_average(&detrended, hi_win)
}

fn centered_moving_average(signal: &[f64], win: usize) -> Vec<f64> {
    if signal.is_empty() || win <= 1 {
        return signal.to_vec();
    }
    let half = win / 2;
    let mut out = Vec::with_capacity(signal.len());
    for i in 0..signal.len() {
        let lo = i.saturating_sub(half);
        let hi = (i + half + 1).min(signal.len());
        let mean = signal[lo..hi].iter().sum::<f64>() / (hi - lo) as f64;
        out.push(mean);
    }
    out
}

/// Heights of trough-to-peak swings, one per oscillation cycle.
fn peak_to_trough_excursions(signal: &[f64]) -> Vec<f64> {
    let mut extrema: Vec<(usize, f64)> = Vec::new();
    for i in 1..signal.len().saturating_sub(1) {
        let (prev, cur, next) = (signal[i - 1], signal[i], signal[i + 1]);
        if (cur > prev && cur >= next) || (cur < prev && cur <= next) {
            extrema.push((i, cur));
        }
    }
    extrema
        .windows(2)
        .filter_map(|pair| {
            let swing = pair[1].1 - pair[0].1;
            (swing > 0.0).then_some(swing)
        })
        .collect()
}
