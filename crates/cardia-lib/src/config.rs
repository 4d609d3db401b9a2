use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Immutable run configuration. Built once per run (defaults, a YAML file, or
/// `configure_for_subject`) and passed by reference through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Parameters {
    pub general: GeneralParams,
    pub cleaning: CleaningParams,
    pub peak_detection: PeakDetectionParams,
    pub signal_quality_index: SignalQualityParams,
    pub hrv_frequency_settings: HrvFrequencySettings,
    /// Segments are produced in declaration order.
    pub segmentation: Vec<SegmentSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralParams {
    pub sampling_frequency: f64,
    /// HRV metrics are computed in non-overlapping windows of this length.
    pub analysis_window_seconds: f64,
    /// Frequency-domain metrics may be unreliable for short analysis windows.
    pub compute_hrv_frequency_metrics: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleaningParams {
    pub method: String,
    /// Mains frequency to notch out, 50 or 60 Hz.
    pub powerline: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeakDetectionParams {
    pub method: String,
    pub correct_artifacts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalQualityParams {
    pub method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HrvFrequencySettings {
    pub ulf: [f64; 2],
    pub vlf: [f64; 2],
    pub lf: [f64; 2],
    pub hf: [f64; 2],
    pub vhf: [f64; 2],
    pub psd_method: String,
    pub normalize: bool,
}

/// One configured segment: which event bounds it and, for baseline-style
/// segments, how long to assume it runs when the offset marker is missing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentSpec {
    pub key: String,
    pub event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_duration_seconds: Option<DurationSeconds>,
}

/// Duration value as it arrives from configuration files: either a number or a
/// string, possibly with a comma as the decimal separator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DurationSeconds {
    Number(f64),
    Text(String),
}

impl DurationSeconds {
    /// Coerce to seconds, accepting comma-decimal strings like `"300,5"`.
    pub fn as_seconds(&self) -> Result<f64> {
        match self {
            DurationSeconds::Number(v) => Ok(*v),
            DurationSeconds::Text(s) => comma_str_to_f64(s),
        }
    }

    /// Coerce to whole seconds; the baseline fallback path requires an
    /// integral duration.
    pub fn as_whole_seconds(&self) -> Result<f64> {
        let v = self.as_seconds()?;
        if v.fract() != 0.0 || !v.is_finite() {
            return Err(PipelineError::Config(format!(
                "default_duration_seconds must be a whole number of seconds, got {v}"
            )));
        }
        Ok(v)
    }
}

/// Convert a possibly comma-decimal string to f64 (`"0,5"` -> 0.5).
pub fn comma_str_to_f64(s: &str) -> Result<f64> {
    s.trim()
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| PipelineError::Config(format!("expected a number, got '{s}'")))
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            general: GeneralParams {
                sampling_frequency: 500.0,
                analysis_window_seconds: 30.0,
                compute_hrv_frequency_metrics: false,
            },
            cleaning: CleaningParams {
                method: "bandpass".into(),
                powerline: 50.0,
            },
            peak_detection: PeakDetectionParams {
                method: "pan-tompkins".into(),
                correct_artifacts: true,
            },
            signal_quality_index: SignalQualityParams {
                method: "average-qrs".into(),
            },
            hrv_frequency_settings: HrvFrequencySettings {
                ulf: [0.0, 0.0033],
                vlf: [0.0033, 0.04],
                lf: [0.04, 0.15],
                hf: [0.15, 0.4],
                vhf: [0.4, 0.5],
                psd_method: "welch".into(),
                normalize: true,
            },
            segmentation: default_segmentation(),
        }
    }
}

fn default_segmentation() -> Vec<SegmentSpec> {
    let mut specs = vec![SegmentSpec {
        key: "Baseline".into(),
        event_name: "Baseline".into(),
        default_duration_seconds: Some(DurationSeconds::Number(300.0)),
    }];
    for story in 1..=5 {
        specs.push(SegmentSpec {
            key: format!("Story {story}"),
            event_name: format!("Story {story}"),
            default_duration_seconds: None,
        });
    }
    specs
}

impl Parameters {
    /// Analysis window length in samples.
    pub fn analysis_window_samples(&self) -> Result<usize> {
        let w = self.general.analysis_window_seconds * self.general.sampling_frequency;
        if !w.is_finite() || w < 1.0 {
            return Err(PipelineError::Config(format!(
                "analysis window of {} s at {} Hz yields no samples",
                self.general.analysis_window_seconds, self.general.sampling_frequency
            )));
        }
        Ok(w as usize)
    }
}

/// Per-subject parameter customization. Returns a new value; the base
/// configuration is never mutated. Extend the match as subjects with
/// recording quirks turn up.
pub fn configure_for_subject(subject_id: &str, base: &Parameters) -> Parameters {
    let params = base.clone();
    match subject_id {
        // e.g. a subject recorded on 60 Hz mains:
        // "08" => params.cleaning.powerline = 60.0,
        _ => {}
    }
    params
}
