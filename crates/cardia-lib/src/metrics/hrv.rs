use crate::config::HrvFrequencySettings;
use crate::signal::RRSeries;
use anyhow::{bail, Result};
use realfft::RealFftPlanner;
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Resampling rate for the interpolated RR tachogram used by the PSD.
const TACHOGRAM_FS: f64 = 4.0;

/// Time-domain HRV indices in milliseconds, keyed with the `HRV_` prefix.
/// Needs at least two RR intervals; shorter windows are a per-window failure.
pub fn hrv_time_indices(rr: &RRSeries) -> Result<BTreeMap<String, f64>> {
    let n = rr.rr.len();
    if n < 2 {
        bail!("need at least 2 RR intervals for time-domain HRV, got {n}");
    }
    let rr_ms: Vec<f64> = rr.rr.iter().map(|s| s * 1000.0).collect();
    let mean = rr_ms.iter().sum::<f64>() / n as f64;
    let sdnn =
        (rr_ms.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0)).sqrt();
    let rmssd = (rr_ms
        .windows(2)
        .map(|w| (w[1] - w[0]).powi(2))
        .sum::<f64>()
        / (n as f64 - 1.0))
        .sqrt();
    let nn50 = rr_ms.windows(2).filter(|w| (w[1] - w[0]).abs() > 50.0).count();
    let pnn50 = 100.0 * nn50 as f64 / (n as f64 - 1.0);

    let mut out = BTreeMap::new();
    out.insert("HRV_MeanNN".into(), mean);
    out.insert("HRV_SDNN".into(), sdnn);
    out.insert("HRV_RMSSD".into(), rmssd);
    out.insert("HRV_pNN50".into(), pnn50);
    out.insert("HRV_CVNN".into(), if mean != 0.0 { sdnn / mean } else { 0.0 });
    Ok(out)
}

/// Frequency-domain HRV indices over the configured bands (Welch PSD of the
/// interpolated tachogram). Band powers are in ms^2.
pub fn hrv_frequency_indices(
    rr: &RRSeries,
    settings: &HrvFrequencySettings,
) -> Result<BTreeMap<String, f64>> {
    if rr.rr.len() < 4 {
        bail!(
            "need at least 4 RR intervals for frequency-domain HRV, got {}",
            rr.rr.len()
        );
    }
    let psd = welch_psd(rr, TACHOGRAM_FS);
    if psd.freqs.is_empty() {
        bail!("tachogram too short for PSD estimation");
    }

    let bands = [
        ("HRV_ULF", settings.ulf),
        ("HRV_VLF", settings.vlf),
        ("HRV_LF", settings.lf),
        ("HRV_HF", settings.hf),
        ("HRV_VHF", settings.vhf),
    ];
    let mut out = BTreeMap::new();
    for (name, band) in bands {
        out.insert(name.to_string(), psd.band_power(band));
    }
    let total: f64 = psd.powers.iter().sum();
    out.insert("HRV_TotalPower".into(), total);

    let lf = out["HRV_LF"];
    let hf = out["HRV_HF"];
    out.insert("HRV_LFHF".into(), if hf > 0.0 { lf / hf } else { 0.0 });
    if settings.normalize {
        let denom = lf + hf;
        let (lfn, hfn) = if denom > 0.0 {
            (lf / denom, hf / denom)
        } else {
            (0.0, 0.0)
        };
        out.insert("HRV_LFn".into(), lfn);
        out.insert("HRV_HFn".into(), hfn);
    }
    Ok(out)
}

/// One-sided Welch power spectrum.
pub struct PsdEstimate {
    pub freqs: Vec<f64>,
    pub powers: Vec<f64>,
}

impl PsdEstimate {
    /// Summed power over `[lo, hi)`.
    pub fn band_power(&self, band: [f64; 2]) -> f64 {
        self.freqs
            .iter()
            .zip(&self.powers)
            .filter(|(f, _)| **f >= band[0] && **f < band[1])
            .map(|(_, p)| *p)
            .sum()
    }
}

/// Welch PSD of the RR tachogram: interpolate to a uniform rate, then average
/// Hann-windowed periodograms over half-overlapping frames.
pub fn welch_psd(rr: &RRSeries, fs_interp: f64) -> PsdEstimate {
    let tachogram = interpolate_rr_ms(rr, fs_interp);
    let n = tachogram.len();
    if n == 0 {
        return PsdEstimate {
            freqs: Vec::new(),
            powers: Vec::new(),
        };
    }
    let frame_len = ((fs_interp * 30.0).max(4.0).min(n as f64)) as usize;
    let step = (frame_len / 2).max(1);
    let taper = hann(frame_len);

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(frame_len);

    let mut freqs = Vec::new();
    let mut powers = Vec::new();
    let mut frames = 0usize;
    let mut pos = 0usize;
    while pos + frame_len <= n {
        let mut buf: Vec<f64> = tachogram[pos..pos + frame_len]
            .iter()
            .zip(&taper)
            .map(|(x, w)| x * w)
            .collect();
        let mut spectrum = r2c.make_output_vec();
        if r2c.process(&mut buf, &mut spectrum).is_err() {
            break;
        }
        let scale = 1.0 / frame_len as f64;
        for (k, val) in spectrum.iter().enumerate() {
            if frames == 0 {
                freqs.push(k as f64 * fs_interp / frame_len as f64);
                powers.push(0.0);
            }
            let one_sided = if k == 0 || (frame_len % 2 == 0 && k == frame_len / 2) {
                val.norm_sqr()
            } else {
                2.0 * val.norm_sqr()
            };
            powers[k] += one_sided * scale;
        }
        frames += 1;
        pos += step;
    }
    if frames > 0 {
        for p in &mut powers {
            *p /= frames as f64;
        }
    }
    PsdEstimate { freqs, powers }
}

/// Step-interpolate the RR series (ms) onto a uniform time grid.
pub fn interpolate_rr_ms(rr: &RRSeries, fs: f64) -> Vec<f64> {
    let mut beat_times = Vec::with_capacity(rr.rr.len());
    let mut acc = 0.0;
    for interval in &rr.rr {
        acc += interval;
        beat_times.push(acc);
    }
    let Some(&duration) = beat_times.last() else {
        return Vec::new();
    };
    let n = (duration * fs).ceil() as usize;
    let mut out = Vec::with_capacity(n);
    let mut idx = 0;
    for i in 0..n {
        let t = i as f64 / fs;
        while idx + 1 < beat_times.len() && beat_times[idx] < t {
            idx += 1;
        }
        out.push(rr.rr[idx] * 1000.0);
    }
    out
}

fn hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rr_series() -> RRSeries {
        RRSeries {
            rr: vec![
                0.82, 0.78, 0.80, 0.79, 0.83, 0.77, 0.84, 0.88, 0.86, 0.81, 0.79, 0.82, 0.85,
                0.78, 0.80, 0.79, 0.83, 0.84, 0.82, 0.81,
            ],
        }
    }

    #[test]
    fn time_domain_indices_match_hand_computation() {
        let rr = RRSeries {
            rr: vec![0.8, 0.9, 0.8],
        };
        let m = hrv_time_indices(&rr).unwrap();
        let mean = (800.0 + 900.0 + 800.0) / 3.0;
        assert!((m["HRV_MeanNN"] - mean).abs() < 1e-9);
        // successive diffs: +100, -100 -> rmssd = sqrt(20000/2) = 100
        assert!((m["HRV_RMSSD"] - 100.0).abs() < 1e-9);
        // both diffs exceed 50 ms
        assert!((m["HRV_pNN50"] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn single_interval_is_an_error() {
        let rr = RRSeries { rr: vec![0.8] };
        assert!(hrv_time_indices(&rr).is_err());
    }

    #[test]
    fn frequency_indices_cover_configured_bands() {
        let settings = crate::config::Parameters::default().hrv_frequency_settings;
        let m = hrv_frequency_indices(&rr_series(), &settings).unwrap();
        assert!(m.contains_key("HRV_LF"));
        assert!(m.contains_key("HRV_HF"));
        assert!(m.contains_key("HRV_LFn"));
        assert!(m["HRV_TotalPower"] >= m["HRV_HF"]);
        assert!(m["HRV_LF"] >= 0.0 && m["HRV_HF"] >= 0.0);
    }

    #[test]
    fn normalized_components_sum_to_one() {
        let settings = crate::config::Parameters::default().hrv_frequency_settings;
        let m = hrv_frequency_indices(&rr_series(), &settings).unwrap();
        if m["HRV_LF"] + m["HRV_HF"] > 0.0 {
            assert!((m["HRV_LFn"] + m["HRV_HFn"] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn band_power_respects_half_open_edges() {
        let psd = PsdEstimate {
            freqs: vec![0.0, 0.1, 0.2, 0.3],
            powers: vec![1.0, 2.0, 4.0, 8.0],
        };
        assert_eq!(psd.band_power([0.1, 0.3]), 6.0);
    }

    #[test]
    fn interpolation_spans_total_rr_duration() {
        let rr = RRSeries {
            rr: vec![1.0, 1.0, 0.5],
        };
        let tacho = interpolate_rr_ms(&rr, 4.0);
        assert_eq!(tacho.len(), 10);
        assert!((tacho[0] - 1000.0).abs() < 1e-9);
    }
}
