use anyhow::{bail, Result};

/// Continuous signal-quality index in [0, 1], one value per sample.
///
/// The `average-qrs` method compares every detected beat against the average
/// beat template: beats that correlate well with the template score near 1,
/// distorted beats near 0. Samples inherit the score of their nearest beat.
/// The index is relative to the recording itself and should be read with
/// caution on uniformly bad signals.
pub fn signal_quality(
    clean: &[f64],
    peak_positions: &[usize],
    fs: f64,
    method: &str,
) -> Result<Vec<f64>> {
    match method {
        "average-qrs" => Ok(average_qrs_quality(clean, peak_positions, fs)),
        other => bail!("unknown signal quality method '{other}'"),
    }
}

fn average_qrs_quality(clean: &[f64], peak_positions: &[usize], fs: f64) -> Vec<f64> {
    let n = clean.len();
    if n == 0 {
        return Vec::new();
    }
    let half = ((0.25 * fs).round() as usize).max(1);
    let beats: Vec<&usize> = peak_positions
        .iter()
        .filter(|&&p| p >= half && p + half < n)
        .collect();
    if beats.len() < 2 {
        // Not enough complete beats to form a template.
        return vec![0.0; n];
    }

    let width = 2 * half;
    let mut template = vec![0.0; width];
    for &&p in &beats {
        for (i, t) in template.iter_mut().enumerate() {
            *t += clean[p - half + i];
        }
    }
    for t in &mut template {
        *t /= beats.len() as f64;
    }

    let scores: Vec<(usize, f64)> = beats
        .iter()
        .map(|&&p| {
            let r = pearson(&clean[p - half..p + half], &template);
            (p, r.max(0.0))
        })
        .collect();

    // Each sample takes the score of its nearest scored beat.
    let mut out = vec![0.0; n];
    let mut beat_idx = 0;
    for (i, slot) in out.iter_mut().enumerate() {
        while beat_idx + 1 < scores.len()
            && scores[beat_idx + 1].0.abs_diff(i) < scores[beat_idx].0.abs_diff(i)
        {
            beat_idx += 1;
        }
        *slot = scores[beat_idx].1;
    }
    out
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beat_train(fs: f64, n: usize, beat_every: usize) -> (Vec<f64>, Vec<usize>) {
        let width = 0.02;
        let positions: Vec<usize> = (1..).map(|k| k * beat_every).take_while(|&p| p < n).collect();
        let mut signal = vec![0.0; n];
        for (i, s) in signal.iter_mut().enumerate() {
            for &p in &positions {
                let dt = (i as f64 - p as f64) / fs;
                *s += (-0.5 * (dt / width).powi(2)).exp();
            }
        }
        (signal, positions)
    }

    #[test]
    fn identical_beats_score_high_everywhere() {
        let (signal, positions) = beat_train(250.0, 5000, 250);
        let q = signal_quality(&signal, &positions, 250.0, "average-qrs").unwrap();
        assert_eq!(q.len(), signal.len());
        assert!(q.iter().all(|&v| v > 0.9));
    }

    #[test]
    fn distorted_beat_scores_below_clean_ones() {
        let (mut signal, positions) = beat_train(250.0, 5000, 250);
        let bad = positions[positions.len() / 2];
        for s in &mut signal[bad.saturating_sub(30)..bad + 30] {
            *s = -*s;
        }
        let q = signal_quality(&signal, &positions, 250.0, "average-qrs").unwrap();
        let clean_score = q[positions[1]];
        assert!(q[bad] < clean_score);
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert!(signal_quality(&[0.0; 10], &[], 250.0, "zhao2018").is_err());
    }

    #[test]
    fn too_few_beats_yield_zero_quality() {
        let q = signal_quality(&[0.0; 100], &[50], 250.0, "average-qrs").unwrap();
        assert!(q.iter().all(|&v| v == 0.0));
    }
}
