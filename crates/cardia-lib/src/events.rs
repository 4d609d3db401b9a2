use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Whether a marked event row opens or closes its named event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnOffset {
    Onset,
    Offset,
}

/// One row of the raw experiment event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position of the event on the recording's index (sample units).
    pub time: f64,
    /// Experimental event name, e.g. "Baseline" or "Story 1".
    pub name: String,
}

/// An event row with its derived onset/offset label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkedEvent {
    pub time: f64,
    pub name: String,
    pub on_offset: OnOffset,
}

/// Label each event row: the first occurrence of a name (in sequence order) is
/// its onset, every later occurrence of the same name is an offset. Rows are
/// neither removed nor reordered.
pub fn mark_on_offsets(records: &[EventRecord]) -> Vec<MarkedEvent> {
    let mut seen: HashSet<&str> = HashSet::new();
    records
        .iter()
        .map(|r| {
            let on_offset = if seen.insert(r.name.as_str()) {
                OnOffset::Onset
            } else {
                OnOffset::Offset
            };
            MarkedEvent {
                time: r.time,
                name: r.name.clone(),
                on_offset,
            }
        })
        .collect()
}

/// Time of the first marked row matching `name` and `on_offset`, or None when
/// the event never occurs in that role. Earlier rows win ties.
pub fn event_time(events: &[MarkedEvent], name: &str, on_offset: OnOffset) -> Option<f64> {
    events
        .iter()
        .find(|e| e.name == name && e.on_offset == on_offset)
        .map(|e| e.time)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(time: f64, name: &str) -> EventRecord {
        EventRecord {
            time,
            name: name.into(),
        }
    }

    #[test]
    fn first_occurrence_is_onset_rest_are_offsets() {
        let log = [
            record(0.0, "Baseline"),
            record(100.0, "Baseline"),
            record(200.0, "Story 1"),
            record(300.0, "Story 1"),
            record(350.0, "Story 1"),
        ];
        let marked = mark_on_offsets(&log);
        let onsets = marked
            .iter()
            .filter(|e| e.on_offset == OnOffset::Onset)
            .count();
        assert_eq!(onsets, 2);
        assert_eq!(marked[0].on_offset, OnOffset::Onset);
        assert_eq!(marked[1].on_offset, OnOffset::Offset);
        assert_eq!(marked[3].on_offset, OnOffset::Offset);
        assert_eq!(marked[4].on_offset, OnOffset::Offset);
    }

    #[test]
    fn marking_preserves_row_count_and_order() {
        let log = [record(5.0, "A"), record(1.0, "B"), record(9.0, "A")];
        let marked = mark_on_offsets(&log);
        assert_eq!(marked.len(), 3);
        assert_eq!(marked[1].name, "B");
        assert_eq!(marked[1].time, 1.0);
    }

    #[test]
    fn lookup_takes_earliest_match() {
        let marked = mark_on_offsets(&[
            record(10.0, "Story 2"),
            record(50.0, "Story 2"),
            record(80.0, "Story 2"),
        ]);
        assert_eq!(event_time(&marked, "Story 2", OnOffset::Onset), Some(10.0));
        assert_eq!(event_time(&marked, "Story 2", OnOffset::Offset), Some(50.0));
        assert_eq!(event_time(&marked, "Story 9", OnOffset::Onset), None);
    }
}
