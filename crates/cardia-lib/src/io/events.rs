use crate::error::PipelineError;
use crate::events::EventRecord;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse an experiment event log: delimited text with a time column followed
/// by an event-name column. Tab and comma delimiters are both accepted; the
/// first row (recording-start marker written before the protocol begins) is
/// dropped.
pub fn parse_event_log(text: &str) -> Result<Vec<EventRecord>> {
    let delimiter = if text.lines().next().is_some_and(|l| l.contains('\t')) {
        b'\t'
    } else {
        b','
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("event log row {}", idx + 1))?;
        if idx == 0 {
            continue;
        }
        if record.len() < 2 {
            return Err(PipelineError::InputType(format!(
                "event log row {} has {} fields, expected time and name",
                idx + 1,
                record.len()
            ))
            .into());
        }
        let time_field = &record[0];
        let time: f64 = time_field
            .parse()
            .or_else(|_| time_field.replace(',', ".").parse())
            .map_err(|_| {
                PipelineError::InputType(format!(
                    "event log row {} time '{}' is not numeric",
                    idx + 1,
                    time_field
                ))
            })?;
        records.push(EventRecord {
            time,
            name: record[1].to_string(),
        });
    }
    Ok(records)
}

/// Read and parse an event log from disk.
pub fn read_event_log(path: &Path) -> Result<Vec<EventRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_event_log(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tab_delimited_and_drops_first_row() {
        let log = "0\tRecordingStart\n1000\tBaseline\n151000\tBaseline\n";
        let records = parse_event_log(log).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].time, 1000.0);
        assert_eq!(records[0].name, "Baseline");
        assert_eq!(records[1].time, 151000.0);
    }

    #[test]
    fn parses_comma_delimited() {
        let log = "time,name\n500,Story 1\n900,Story 1\n";
        let records = parse_event_log(log).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name, "Story 1");
    }

    #[test]
    fn rejects_short_rows() {
        let err = parse_event_log("header\tname\n1000\n").unwrap_err();
        let err = err.downcast::<PipelineError>().unwrap();
        assert!(matches!(err, PipelineError::InputType(_)));
    }

    #[test]
    fn rejects_non_numeric_time() {
        let err = parse_event_log("time\tname\nsoon\tBaseline\n").unwrap_err();
        assert!(matches!(
            err.downcast::<PipelineError>().unwrap(),
            PipelineError::InputType(_)
        ));
    }

    #[test]
    fn tolerates_decimal_comma_times_in_tsv() {
        let log = "time\tname\n1000,5\tBaseline\n";
        let records = parse_event_log(log).unwrap();
        assert_eq!(records[0].time, 1000.5);
    }
}
