use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Outlier column name derived from a metric column.
pub fn outlier_column(metric: &str) -> String {
    format!("{metric}_outlier")
}

/// One row of computed metrics: per analysis window for HRV, per segment for
/// RSA (`analysis_window` is None there).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRow {
    pub subject_id: String,
    pub segment_name: String,
    /// Zero-based window index within the segment; None for per-segment rows.
    pub analysis_window: Option<usize>,
    /// Smallest index value of the window/segment.
    pub start_time: f64,
    /// Largest index value of the window/segment.
    pub end_time: f64,
    pub heart_rate_bpm: f64,
    pub n_peaks_detected: u32,
    /// Engine-owned metric columns, e.g. HRV_SDNN or RSA_P2T_Mean.
    pub metrics: BTreeMap<String, f64>,
    /// Set by the usability gate; None until flagged.
    pub window_has_enough_peaks: Option<bool>,
    /// Three-valued outlier flags keyed by `<metric>_outlier`:
    /// Some(1.0) outlier, Some(0.0) clear, None not evaluated.
    pub outliers: BTreeMap<String, Option<f64>>,
    /// Set by the usability gate; None until flagged.
    pub usable_window: Option<bool>,
}

impl MetricsRow {
    pub fn new(
        segment_start: f64,
        segment_end: f64,
        analysis_window: Option<usize>,
        heart_rate_bpm: f64,
        n_peaks_detected: u32,
        metrics: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            subject_id: String::new(),
            segment_name: String::new(),
            analysis_window,
            start_time: segment_start,
            end_time: segment_end,
            heart_rate_bpm,
            n_peaks_detected,
            metrics,
            window_has_enough_peaks: None,
            outliers: BTreeMap::new(),
            usable_window: None,
        }
    }
}

/// All metric rows for one subject, in segment-then-window order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsTable {
    pub rows: Vec<MetricsRow>,
}

impl MetricsTable {
    pub fn new(rows: Vec<MetricsRow>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Union of metric column names across rows, in stable sorted order. Rows
    /// that failed mid-run may carry fewer columns than their siblings.
    pub fn metric_columns(&self) -> Vec<String> {
        let mut cols = BTreeSet::new();
        for row in &self.rows {
            cols.extend(row.metrics.keys().cloned());
        }
        cols.into_iter().collect()
    }

    /// Union of outlier column names across rows, sorted.
    pub fn outlier_columns(&self) -> Vec<String> {
        let mut cols = BTreeSet::new();
        for row in &self.rows {
            cols.extend(row.outliers.keys().cloned());
        }
        cols.into_iter().collect()
    }

    /// Tag every row with the subject identifier.
    pub fn with_subject_id(mut self, subject_id: &str) -> Self {
        for row in &mut self.rows {
            row.subject_id = subject_id.to_string();
        }
        self
    }
}
