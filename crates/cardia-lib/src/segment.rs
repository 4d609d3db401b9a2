use crate::config::Parameters;
use crate::error::{PipelineError, Result};
use crate::events::{event_time, MarkedEvent, OnOffset};
use crate::signal::EcgFrame;
use log::warn;
use std::ops::Range;

/// Number of segments a standard recording is expected to yield with the
/// default segmentation (baseline + five stories).
pub const EXPECTED_SEGMENT_COUNT: usize = 6;

/// A contiguous slice of the recording, tagged with the event that bounds it.
/// Non-empty by construction.
#[derive(Debug, Clone)]
pub struct Segment {
    pub name: String,
    pub frame: EcgFrame,
}

impl Segment {
    /// Build a segment from rows that carry a per-row segment label, e.g. when
    /// re-assembling segments from a persisted preprocessed table. Fails when
    /// the rows do not all share one label.
    pub fn from_labeled_frame(frame: EcgFrame, labels: &[String]) -> Result<Segment> {
        let mut distinct: Vec<&str> = labels.iter().map(String::as_str).collect();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() != 1 {
            return Err(PipelineError::AmbiguousSegment {
                names: distinct.len(),
            });
        }
        Ok(Segment {
            name: distinct[0].to_string(),
            frame,
        })
    }

    pub fn start_time(&self) -> f64 {
        self.frame.start_index().unwrap_or(f64::NAN)
    }

    pub fn end_time(&self) -> f64 {
        self.frame.end_index().unwrap_or(f64::NAN)
    }
}

/// Slice the recording into one segment per configured spec, in declaration
/// order. A spec whose event never occurs is skipped with a warning; a
/// non-baseline segment with an onset but no offset aborts the run.
pub fn segment_recording(
    frame: &EcgFrame,
    events: &[MarkedEvent],
    params: &Parameters,
) -> Result<Vec<Segment>> {
    let fs = params.general.sampling_frequency;
    let mut segments = Vec::new();

    for spec in &params.segmentation {
        let onset = event_time(events, &spec.event_name, OnOffset::Onset);
        let offset = event_time(events, &spec.event_name, OnOffset::Offset);

        let (onset, offset) = match (onset, offset) {
            (None, None) => {
                warn!("event '{}' not found in the recording; skipping", spec.event_name);
                continue;
            }
            (Some(onset), None) => {
                if spec.event_name == "Baseline" {
                    let duration = spec
                        .default_duration_seconds
                        .as_ref()
                        .ok_or_else(|| {
                            PipelineError::Config(format!(
                                "segment '{}' has no offset marker and no default_duration_seconds",
                                spec.event_name
                            ))
                        })?
                        .as_whole_seconds()?;
                    (onset, onset + duration * fs)
                } else {
                    return Err(PipelineError::MissingBoundary {
                        segment: spec.event_name.clone(),
                        onset,
                    });
                }
            }
            // Unreachable when the log was labeled by `mark_on_offsets`: an
            // offset implies an earlier onset row for the same name.
            (None, Some(_)) => {
                warn!(
                    "event '{}' has an offset but no onset; skipping",
                    spec.event_name
                );
                continue;
            }
            (Some(onset), Some(offset)) => (onset, offset),
        };

        let sliced = frame.slice_index_range(onset, offset);
        if sliced.is_empty() {
            return Err(PipelineError::EmptySegment {
                segment: spec.event_name.clone(),
                onset,
                offset,
            });
        }
        segments.push(Segment {
            name: spec.event_name.clone(),
            frame: sliced,
        });
    }

    if segments.len() != EXPECTED_SEGMENT_COUNT {
        warn!(
            "recording produced {} segments, expected {}",
            segments.len(),
            EXPECTED_SEGMENT_COUNT
        );
    }
    Ok(segments)
}

/// Lazy, restartable partition of `len` rows into consecutive chunks of
/// `window_size`; the final chunk may be shorter.
#[derive(Debug, Clone)]
pub struct WindowIter {
    len: usize,
    window_size: usize,
    pos: usize,
}

impl WindowIter {
    pub fn new(len: usize, window_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(PipelineError::InvalidWindowSize(window_size as i64));
        }
        Ok(Self {
            len,
            window_size,
            pos: 0,
        })
    }
}

impl Iterator for WindowIter {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Range<usize>> {
        if self.pos >= self.len {
            return None;
        }
        let start = self.pos;
        let end = (start + self.window_size).min(self.len);
        self.pos = end;
        Some(start..end)
    }
}
