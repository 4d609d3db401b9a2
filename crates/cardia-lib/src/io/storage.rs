use crate::segment::Segment;
use crate::signal::EcgFrame;
use crate::table::MetricsTable;
use crate::windowed::PreprocessedEcg;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

fn fmt_opt_bool(value: Option<bool>) -> String {
    match value {
        Some(true) => "true".to_string(),
        Some(false) => "false".to_string(),
        None => String::new(),
    }
}

/// Write a metrics table as CSV. The header is the fixed identity columns,
/// then the sorted union of metric columns, then the gating columns. Rows
/// missing a metric (a sibling window failed differently) leave the cell
/// empty; a not-evaluated outlier flag is written as NaN.
pub fn write_metrics_table(table: &MetricsTable, path: &Path) -> Result<()> {
    let metric_cols = table.metric_columns();
    let outlier_cols = table.outlier_columns();

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let mut header = vec![
        "subject_id".to_string(),
        "segment_name".to_string(),
        "analysis_window".to_string(),
        "start_time".to_string(),
        "end_time".to_string(),
        "heart_rate_bpm".to_string(),
        "n_peaks_detected".to_string(),
    ];
    header.extend(metric_cols.iter().cloned());
    header.push("window_has_enough_peaks".to_string());
    header.extend(outlier_cols.iter().cloned());
    header.push("usable_window".to_string());
    writer.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![
            row.subject_id.clone(),
            row.segment_name.clone(),
            row.analysis_window.map(|w| w.to_string()).unwrap_or_default(),
            row.start_time.to_string(),
            row.end_time.to_string(),
            row.heart_rate_bpm.to_string(),
            row.n_peaks_detected.to_string(),
        ];
        for col in &metric_cols {
            record.push(
                row.metrics
                    .get(col)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        record.push(fmt_opt_bool(row.window_has_enough_peaks));
        for col in &outlier_cols {
            let cell = match row.outliers.get(col) {
                Some(Some(flag)) => flag.to_string(),
                Some(None) => "NaN".to_string(),
                None => String::new(),
            };
            record.push(cell);
        }
        record.push(fmt_opt_bool(row.usable_window));
        writer.write_record(&record)?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Write the concatenated preprocessed signal data, one row per sample,
/// segments in order.
pub fn write_preprocessed_ecg(data: &PreprocessedEcg, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record([
        "subject_id",
        "segment_name",
        "index",
        "ecg_raw",
        "ecg_clean",
        "ecg_peak",
        "ecg_quality",
    ])?;
    for (name, frame) in &data.segments {
        for i in 0..frame.len() {
            writer.write_record([
                data.subject_id.as_str(),
                name.as_str(),
                &frame.index[i].to_string(),
                &frame.raw[i].to_string(),
                &frame.clean[i].to_string(),
                if frame.peaks[i] { "1" } else { "0" },
                &frame.quality[i].to_string(),
            ])?;
        }
    }
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))
}

#[derive(Default)]
struct SegmentRows {
    labels: Vec<String>,
    index: Vec<f64>,
    raw: Vec<f64>,
    clean: Vec<f64>,
    peaks: Vec<bool>,
    quality: Vec<f64>,
}

/// Re-ingest a persisted preprocessed table into per-segment frames, e.g. for
/// the single-shot RSA stage. Rows are grouped by their segment label in
/// order of first appearance; every group is validated to carry exactly one
/// distinct label before it becomes a [`Segment`].
pub fn read_preprocessed_ecg(path: &Path, fs: f64) -> Result<(String, Vec<Segment>)> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut subject_id = String::new();
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, SegmentRows> = HashMap::new();

    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("row {} of {}", idx + 1, path.display()))?;
        if record.len() != 7 {
            return Err(crate::error::PipelineError::InputType(format!(
                "row {} of {} has {} fields, expected 7",
                idx + 1,
                path.display(),
                record.len()
            ))
            .into());
        }
        let parse = |field: usize| -> Result<f64> {
            record[field]
                .parse::<f64>()
                .with_context(|| format!("row {} field {} of {}", idx + 1, field, path.display()))
        };
        if subject_id.is_empty() {
            subject_id = record[0].to_string();
        }
        let name = record[1].to_string();
        if !groups.contains_key(&name) {
            order.push(name.clone());
        }
        let rows = groups.entry(name.clone()).or_default();
        rows.labels.push(name);
        rows.index.push(parse(2)?);
        rows.raw.push(parse(3)?);
        rows.clean.push(parse(4)?);
        rows.peaks.push(&record[5] == "1");
        rows.quality.push(parse(6)?);
    }

    let mut segments = Vec::with_capacity(order.len());
    for name in order {
        let rows = groups.remove(&name).unwrap_or_default();
        let frame = EcgFrame::new(fs, rows.index, rows.raw, rows.clean, rows.peaks, rows.quality)?;
        segments.push(Segment::from_labeled_frame(frame, &rows.labels)?);
    }
    Ok((subject_id, segments))
}

/// Serialize a value to a YAML file.
pub fn write_yaml<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let text = serde_yaml::to_string(value).context("serializing YAML")?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

/// Deserialize a value from a YAML file.
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parameters;
    use crate::table::MetricsRow;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn sample_table() -> MetricsTable {
        let mut metrics = BTreeMap::new();
        metrics.insert("HRV_SDNN".to_string(), 42.5);
        let mut row = MetricsRow::new(1000.0, 15999.0, Some(0), 72.0, 30, metrics);
        row.subject_id = "07".into();
        row.segment_name = "Baseline".into();
        row.window_has_enough_peaks = Some(true);
        row.outliers.insert("HRV_SDNN_outlier".into(), Some(0.0));
        row.usable_window = Some(true);

        let mut sentinel = MetricsRow::new(16000.0, 30999.0, Some(1), 0.0, 3, BTreeMap::new());
        sentinel.subject_id = "07".into();
        sentinel.segment_name = "Baseline".into();
        sentinel.window_has_enough_peaks = Some(false);
        sentinel.outliers.insert("HRV_SDNN_outlier".into(), None);
        sentinel.usable_window = Some(false);

        MetricsTable::new(vec![row, sentinel])
    }

    #[test]
    fn metrics_csv_carries_gating_columns_and_sentinels() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hrv_metrics.csv");
        write_metrics_table(&sample_table(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert_eq!(
            header,
            "subject_id,segment_name,analysis_window,start_time,end_time,\
             heart_rate_bpm,n_peaks_detected,HRV_SDNN,window_has_enough_peaks,\
             HRV_SDNN_outlier,usable_window"
        );
        let first = lines.next().unwrap();
        assert!(first.ends_with("true,0,true"));
        let second = lines.next().unwrap();
        assert!(second.ends_with("false,NaN,false"));
    }

    #[test]
    fn preprocessed_csv_has_one_row_per_sample() {
        use crate::engine::test_support::preprocessed_frame;
        let dir = tempdir().unwrap();
        let path = dir.path().join("preprocessed_ecg.csv");
        let frame = preprocessed_frame(250.0, &[0.8; 5]);
        let n = frame.len();
        let data = PreprocessedEcg {
            subject_id: "07".into(),
            segments: vec![("Baseline".into(), frame)],
        };
        write_preprocessed_ecg(&data, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), n + 1);
    }

    #[test]
    fn preprocessed_round_trip_reassembles_segments() {
        use crate::engine::test_support::preprocessed_frame;
        let dir = tempdir().unwrap();
        let path = dir.path().join("preprocessed_ecg.csv");
        let baseline = preprocessed_frame(250.0, &[0.8; 6]);
        let story = preprocessed_frame(250.0, &[0.75; 4]);
        let data = PreprocessedEcg {
            subject_id: "07".into(),
            segments: vec![("Baseline".into(), baseline.clone()), ("Story 1".into(), story)],
        };
        write_preprocessed_ecg(&data, &path).unwrap();

        let (subject_id, segments) = read_preprocessed_ecg(&path, 250.0).unwrap();
        assert_eq!(subject_id, "07");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].name, "Baseline");
        assert_eq!(segments[1].name, "Story 1");
        assert_eq!(segments[0].frame.len(), baseline.len());
        assert_eq!(segments[0].frame.n_peaks(), baseline.n_peaks());
    }

    #[test]
    fn yaml_round_trip_preserves_parameters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parameters.yaml");
        let params = Parameters::default();
        write_yaml(&params, &path).unwrap();
        let back: Parameters = read_yaml(&path).unwrap();
        assert_eq!(
            back.general.sampling_frequency,
            params.general.sampling_frequency
        );
        assert_eq!(back.segmentation.len(), params.segmentation.len());
    }
}
