use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Preprocessed ECG timeseries: one row per sample, indexed by a monotonically
/// non-decreasing time key (sample index or timestamp). Column vectors are
/// always the same length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcgFrame {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Time key per row; preserved across slicing so segment rows keep their
    /// position in the original recording.
    pub index: Vec<f64>,
    /// Raw ECG signal (mV)
    pub raw: Vec<f64>,
    /// Cleaned ECG signal
    pub clean: Vec<f64>,
    /// R-peak flags, true where a beat was detected
    pub peaks: Vec<bool>,
    /// Per-sample signal quality in [0, 1]
    pub quality: Vec<f64>,
}

impl EcgFrame {
    pub fn new(
        fs: f64,
        index: Vec<f64>,
        raw: Vec<f64>,
        clean: Vec<f64>,
        peaks: Vec<bool>,
        quality: Vec<f64>,
    ) -> Result<Self> {
        let n = index.len();
        if raw.len() != n || clean.len() != n || peaks.len() != n || quality.len() != n {
            return Err(PipelineError::InputType(format!(
                "column lengths differ: index={}, raw={}, clean={}, peaks={}, quality={}",
                n,
                raw.len(),
                clean.len(),
                peaks.len(),
                quality.len()
            )));
        }
        if index.windows(2).any(|w| w[1] < w[0]) {
            return Err(PipelineError::InputType(
                "index is not monotonically non-decreasing".into(),
            ));
        }
        Ok(Self {
            fs,
            index,
            raw,
            clean,
            peaks,
            quality,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.fs
    }

    /// Smallest index value in the frame.
    pub fn start_index(&self) -> Option<f64> {
        self.index.first().copied()
    }

    /// Largest index value in the frame.
    pub fn end_index(&self) -> Option<f64> {
        self.index.last().copied()
    }

    pub fn n_peaks(&self) -> u32 {
        self.peaks.iter().filter(|&&p| p).count() as u32
    }

    /// Rows whose index falls in the half-open range `[onset, offset)`.
    pub fn slice_index_range(&self, onset: f64, offset: f64) -> EcgFrame {
        let lo = self.index.partition_point(|&t| t < onset);
        let hi = self.index.partition_point(|&t| t < offset);
        self.slice_rows(lo, hi)
    }

    /// Rows `[lo, hi)` by position.
    pub fn slice_rows(&self, lo: usize, hi: usize) -> EcgFrame {
        let hi = hi.min(self.len());
        let lo = lo.min(hi);
        EcgFrame {
            fs: self.fs,
            index: self.index[lo..hi].to_vec(),
            raw: self.raw[lo..hi].to_vec(),
            clean: self.clean[lo..hi].to_vec(),
            peaks: self.peaks[lo..hi].to_vec(),
            quality: self.quality[lo..hi].to_vec(),
        }
    }

    /// Positions of flagged R-peaks within this frame.
    pub fn peak_positions(&self) -> Vec<usize> {
        self.peaks
            .iter()
            .enumerate()
            .filter_map(|(i, &p)| p.then_some(i))
            .collect()
    }
}

/// RR intervals (seconds) derived from consecutive peak positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    pub fn from_peak_positions(positions: &[usize], fs: f64) -> Self {
        let rr = positions
            .windows(2)
            .map(|w| (w[1] as f64 - w[0] as f64) / fs)
            .collect();
        Self { rr }
    }

    pub fn from_frame(frame: &EcgFrame) -> Self {
        Self::from_peak_positions(&frame.peak_positions(), frame.fs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: usize) -> EcgFrame {
        EcgFrame::new(
            500.0,
            (0..n).map(|i| i as f64).collect(),
            vec![0.0; n],
            vec![0.0; n],
            vec![false; n],
            vec![1.0; n],
        )
        .unwrap()
    }

    #[test]
    fn rejects_mismatched_columns() {
        let err = EcgFrame::new(
            500.0,
            vec![0.0, 1.0],
            vec![0.0],
            vec![0.0, 0.0],
            vec![false, false],
            vec![1.0, 1.0],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InputType(_)));
    }

    #[test]
    fn rejects_decreasing_index() {
        let err = EcgFrame::new(
            500.0,
            vec![1.0, 0.0],
            vec![0.0, 0.0],
            vec![0.0, 0.0],
            vec![false, false],
            vec![1.0, 1.0],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InputType(_)));
    }

    #[test]
    fn half_open_slice_excludes_offset_row() {
        let f = frame(10);
        let s = f.slice_index_range(2.0, 5.0);
        assert_eq!(s.index, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn rr_from_positions() {
        let rr = RRSeries::from_peak_positions(&[0, 500, 1000, 1400], 500.0);
        assert_eq!(rr.rr, vec![1.0, 1.0, 0.8]);
    }
}
