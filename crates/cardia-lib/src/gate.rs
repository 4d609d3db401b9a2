use crate::error::{PipelineError, Result};
use crate::table::{outlier_column, MetricsTable};

/// Windows with fewer detected peaks than this cannot support stable HRV
/// estimates.
pub const DEFAULT_MIN_PEAKS_REQUIRED: u32 = 20;

/// Metric whose outlier flag decides window usability.
pub const USABILITY_METRIC: &str = "HRV_SDNN";

/// Flag every window by peak sufficiency:
/// `window_has_enough_peaks = n_peaks_detected >= min_peaks_required`.
/// Recomputes the column wholesale, so repeated application is idempotent.
pub fn flag_peak_sufficiency(mut table: MetricsTable, min_peaks_required: u32) -> MetricsTable {
    for row in &mut table.rows {
        row.window_has_enough_peaks = Some(row.n_peaks_detected >= min_peaks_required);
    }
    table
}

/// Flag `|z| > z_threshold` outliers in `column`, considering only rows with
/// enough peaks. Mean and population standard deviation (ddof = 0) are taken
/// over those rows alone. Rows with insufficient peaks receive the
/// not-evaluated sentinel (None) rather than a 0/1 flag.
///
/// Requires `flag_peak_sufficiency` to have run first.
pub fn flag_zscore_outliers(
    mut table: MetricsTable,
    column: &str,
    z_threshold: f64,
) -> Result<MetricsTable> {
    if table.rows.iter().any(|r| r.window_has_enough_peaks.is_none()) {
        return Err(PipelineError::Precheck("window_has_enough_peaks"));
    }

    let values: Vec<f64> = table
        .rows
        .iter()
        .filter(|r| r.window_has_enough_peaks == Some(true))
        .filter_map(|r| r.metrics.get(column).copied())
        .collect();
    let n = values.len() as f64;
    let mean = if n > 0.0 { values.iter().sum::<f64>() / n } else { 0.0 };
    let sd = if n > 0.0 {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
    } else {
        0.0
    };

    let flag_column = outlier_column(column);
    for row in &mut table.rows {
        let flag = if row.window_has_enough_peaks == Some(true) {
            match row.metrics.get(column) {
                Some(&value) if sd > 0.0 => {
                    let z = (value - mean) / sd;
                    Some(if z.abs() > z_threshold { 1.0 } else { 0.0 })
                }
                // A constant column (or a row missing the metric) has no
                // outliers to flag.
                Some(_) | None => Some(0.0),
            }
        } else {
            None
        };
        row.outliers.insert(flag_column.clone(), flag);
    }
    Ok(table)
}

/// Combine the peak-sufficiency and SDNN-outlier flags into the final
/// per-window usability verdict:
/// `usable_window = window_has_enough_peaks && HRV_SDNN_outlier == 0.0`.
/// A not-evaluated outlier sentinel never counts as 0.0.
///
/// Requires both upstream gating steps to have run.
pub fn flag_usable_windows(mut table: MetricsTable) -> Result<MetricsTable> {
    if table.rows.iter().any(|r| r.window_has_enough_peaks.is_none()) {
        return Err(PipelineError::Precheck("window_has_enough_peaks"));
    }
    let flag_column = outlier_column(USABILITY_METRIC);
    if table.rows.iter().any(|r| !r.outliers.contains_key(&flag_column)) {
        return Err(PipelineError::Precheck("HRV_SDNN_outlier"));
    }

    for row in &mut table.rows {
        let enough = row.window_has_enough_peaks == Some(true);
        let clear = row.outliers.get(&flag_column) == Some(&Some(0.0));
        row.usable_window = Some(enough && clear);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::MetricsRow;
    use std::collections::BTreeMap;

    fn row(n_peaks: u32, sdnn: f64) -> MetricsRow {
        let mut metrics = BTreeMap::new();
        metrics.insert("HRV_SDNN".to_string(), sdnn);
        MetricsRow::new(0.0, 1.0, Some(0), 60.0, n_peaks, metrics)
    }

    fn table(rows: Vec<MetricsRow>) -> MetricsTable {
        MetricsTable::new(rows)
    }

    #[test]
    fn peak_sufficiency_boundary_is_inclusive() {
        let t = flag_peak_sufficiency(
            table(vec![row(19, 1.0), row(20, 1.0), row(21, 1.0)]),
            DEFAULT_MIN_PEAKS_REQUIRED,
        );
        let flags: Vec<_> = t.rows.iter().map(|r| r.window_has_enough_peaks).collect();
        assert_eq!(flags, vec![Some(false), Some(true), Some(true)]);
    }

    #[test]
    fn zscore_flags_the_single_extreme_value() {
        // [10, 10, 10, 10, 100] at threshold 1.5 -> only 100 is an outlier
        let rows = [10.0, 10.0, 10.0, 10.0, 100.0]
            .iter()
            .map(|&v| row(30, v))
            .collect();
        let t = flag_peak_sufficiency(table(rows), 20);
        let t = flag_zscore_outliers(t, "HRV_SDNN", 1.5).unwrap();
        let flags: Vec<_> = t
            .rows
            .iter()
            .map(|r| r.outliers["HRV_SDNN_outlier"])
            .collect();
        assert_eq!(
            flags,
            vec![Some(0.0), Some(0.0), Some(0.0), Some(0.0), Some(1.0)]
        );
    }

    #[test]
    fn insufficient_rows_get_the_missing_sentinel() {
        let t = flag_peak_sufficiency(table(vec![row(5, 999.0), row(30, 10.0), row(30, 11.0)]), 20);
        let t = flag_zscore_outliers(t, "HRV_SDNN", 1.5).unwrap();
        assert_eq!(t.rows[0].outliers["HRV_SDNN_outlier"], None);
        // the 999 value is excluded from the statistics entirely
        assert_eq!(t.rows[1].outliers["HRV_SDNN_outlier"], Some(0.0));
    }

    #[test]
    fn zscore_requires_peak_flags_first() {
        let err = flag_zscore_outliers(table(vec![row(30, 1.0)]), "HRV_SDNN", 1.5).unwrap_err();
        assert!(matches!(err, PipelineError::Precheck(_)));
    }

    #[test]
    fn usable_requires_both_columns() {
        let t = table(vec![row(30, 1.0)]);
        assert!(matches!(
            flag_usable_windows(t.clone()),
            Err(PipelineError::Precheck("window_has_enough_peaks"))
        ));
        let t = flag_peak_sufficiency(t, 20);
        assert!(matches!(
            flag_usable_windows(t),
            Err(PipelineError::Precheck("HRV_SDNN_outlier"))
        ));
    }

    #[test]
    fn usable_window_truth_table() {
        // Enough clear rows that the extreme value's |z| can exceed the
        // threshold: for [10, 10, 10, 10, 100] the 100 sits at z = 2.
        let rows = vec![
            row(30, 10.0),
            row(30, 10.0),
            row(30, 10.0),
            row(30, 10.0),
            row(30, 100.0),
            row(5, 10.0),
        ];
        let t = flag_peak_sufficiency(table(rows), 20);
        let t = flag_zscore_outliers(t, "HRV_SDNN", 1.5).unwrap();
        let t = flag_usable_windows(t).unwrap();
        let usable: Vec<_> = t.rows.iter().map(|r| r.usable_window).collect();
        // four clear rows + the outlier + the not-evaluated sentinel
        assert_eq!(
            usable,
            vec![
                Some(true),
                Some(true),
                Some(true),
                Some(true),
                Some(false),
                Some(false)
            ]
        );
    }

    #[test]
    fn gating_is_idempotent() {
        let rows = vec![row(30, 10.0), row(30, 100.0), row(5, 10.0)];
        let once = flag_usable_windows(
            flag_zscore_outliers(flag_peak_sufficiency(table(rows), 20), "HRV_SDNN", 1.5)
                .unwrap(),
        )
        .unwrap();
        let twice = flag_usable_windows(
            flag_zscore_outliers(
                flag_peak_sufficiency(once.clone(), 20),
                "HRV_SDNN",
                1.5,
            )
            .unwrap(),
        )
        .unwrap();
        for (a, b) in once.rows.iter().zip(&twice.rows) {
            assert_eq!(a.window_has_enough_peaks, b.window_has_enough_peaks);
            assert_eq!(a.outliers, b.outliers);
            assert_eq!(a.usable_window, b.usable_window);
        }
    }

    #[test]
    fn constant_column_flags_nothing() {
        let rows = vec![row(30, 42.0), row(30, 42.0), row(30, 42.0)];
        let t = flag_zscore_outliers(
            flag_peak_sufficiency(table(rows), 20),
            "HRV_SDNN",
            1.5,
        )
        .unwrap();
        assert!(t
            .rows
            .iter()
            .all(|r| r.outliers["HRV_SDNN_outlier"] == Some(0.0)));
    }
}
