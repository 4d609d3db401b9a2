use crate::config::Parameters;
use crate::engine::{heart_rate_bpm, MetricEngine};
use crate::error::PipelineError;
use crate::plot::{figure_from_window, PlotSink};
use crate::segment::{Segment, WindowIter};
use crate::signal::EcgFrame;
use crate::table::{MetricsRow, MetricsTable};
use crate::io::storage;
use anyhow::{Context, Result};
use log::{error, warn};
use std::path::{Path, PathBuf};

/// QA plot rendering for analysis windows. Failures are logged and never
/// interrupt metric computation.
pub struct QaPlots<'a> {
    pub sink: &'a mut dyn PlotSink,
    pub figure_dir: PathBuf,
}

/// Concatenated preprocessed signal data for one subject, one entry per
/// segment in segment order.
#[derive(Debug, Clone)]
pub struct PreprocessedEcg {
    pub subject_id: String,
    pub segments: Vec<(String, EcgFrame)>,
}

/// HRV metrics for one segment, one row per analysis window in window order.
///
/// A window whose metric computation fails contributes no row; the failure is
/// logged with the window index and the sibling windows are unaffected. An
/// empty table is a valid result.
pub fn windowed_hrv_metrics(
    segment: &Segment,
    engine: &dyn MetricEngine,
    params: &Parameters,
    mut qa: Option<&mut QaPlots<'_>>,
) -> Result<MetricsTable> {
    let window_size = params.analysis_window_samples()?;
    let fs = params.general.sampling_frequency;
    let mut rows = Vec::new();

    for (window_count, range) in WindowIter::new(segment.frame.len(), window_size)?.enumerate() {
        let window = segment.frame.slice_rows(range.start, range.end);
        let start_time = window.start_index().unwrap_or(f64::NAN);
        let end_time = window.end_index().unwrap_or(f64::NAN);
        let n_peaks = window.n_peaks();

        match engine.compute_hrv(&window, params) {
            Ok(metrics) => {
                let heart_rate = heart_rate_bpm(n_peaks, window.len(), fs);
                rows.push(MetricsRow::new(
                    start_time,
                    end_time,
                    Some(window_count),
                    heart_rate,
                    n_peaks,
                    metrics,
                ));
            }
            Err(err) => {
                error!(
                    "HRV metrics failed for window {window_count} of segment '{}': {err:#}",
                    segment.name
                );
            }
        }

        if let Some(qa) = qa.as_deref_mut() {
            render_window_plot(qa, &window, &segment.name, window_count);
        }
    }
    Ok(MetricsTable::new(rows))
}

fn render_window_plot(qa: &mut QaPlots<'_>, window: &EcgFrame, segment_name: &str, index: usize) {
    let safe_name: String = segment_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let path = qa.figure_dir.join(format!("{safe_name}_{index}.png"));
    let figure = figure_from_window(window, segment_name);
    if let Err(err) = std::fs::create_dir_all(&qa.figure_dir)
        .map_err(anyhow::Error::from)
        .and_then(|_| qa.sink.render(&figure, &path))
    {
        warn!("QA plot for window {index} of segment '{segment_name}' failed: {err:#}");
    }
}

/// Windowed HRV across every segment of a subject: per-segment metric rows are
/// tagged with the segment name, concatenated in segment order, tagged with
/// the subject id, and persisted alongside the preprocessed signal data.
pub fn compute_windowed_hrv_across_segments(
    segments: &[Segment],
    engine: &dyn MetricEngine,
    params: &Parameters,
    subject_id: &str,
    data_output_dir: &Path,
    mut qa: Option<QaPlots<'_>>,
) -> Result<(MetricsTable, PreprocessedEcg)> {
    let mut rows = Vec::new();
    let mut preprocessed = Vec::new();

    for segment in segments {
        let mut table = windowed_hrv_metrics(segment, engine, params, qa.as_mut())?;
        for row in &mut table.rows {
            row.segment_name = segment.name.clone();
        }
        rows.extend(table.rows);
        preprocessed.push((segment.name.clone(), segment.frame.clone()));
    }

    let table = MetricsTable::new(rows).with_subject_id(subject_id);
    let preprocessed = PreprocessedEcg {
        subject_id: subject_id.to_string(),
        segments: preprocessed,
    };

    storage::write_metrics_table(&table, &data_output_dir.join("hrv_metrics.csv"))
        .context("persisting HRV metrics")?;
    storage::write_preprocessed_ecg(&preprocessed, &data_output_dir.join("preprocessed_ecg.csv"))
        .context("persisting preprocessed ECG")?;
    Ok((table, preprocessed))
}

/// Single-shot RSA per segment. A segment whose RSA computation fails is
/// logged and skipped; the surviving rows are tagged, concatenated, persisted
/// and returned.
pub fn rsa_per_segment(
    segments: &[Segment],
    engine: &dyn MetricEngine,
    params: &Parameters,
    subject_id: &str,
    data_output_dir: &Path,
) -> Result<MetricsTable> {
    if segments.iter().any(|s| s.frame.is_empty()) {
        return Err(PipelineError::InvalidSegmentList(
            "one or more segments contain no data".into(),
        )
        .into());
    }

    let fs = params.general.sampling_frequency;
    let mut rows = Vec::new();
    for segment in segments {
        let metrics = match engine.compute_rsa(&segment.frame, params) {
            Ok(metrics) => metrics,
            Err(err) => {
                error!("RSA metrics failed for segment '{}': {err:#}", segment.name);
                continue;
            }
        };
        let n_peaks = segment.frame.n_peaks();
        let mut row = MetricsRow::new(
            segment.start_time(),
            segment.end_time(),
            None,
            heart_rate_bpm(n_peaks, segment.frame.len(), fs),
            n_peaks,
            metrics,
        );
        row.segment_name = segment.name.clone();
        rows.push(row);
    }

    let table = MetricsTable::new(rows).with_subject_id(subject_id);
    storage::write_metrics_table(&table, &data_output_dir.join("rsa_metrics.csv"))
        .context("persisting RSA metrics")?;
    Ok(table)
}
