use crate::signal::EcgFrame;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Color(pub u32);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Scatter(ScatterSeries),
}

/// Backend-agnostic figure description. Rendering lives behind [`PlotSink`]
/// so the library carries no drawing dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }
}

/// Renders figures to files. Implemented by the CLI with a bitmap drawer;
/// tests substitute recording sinks.
pub trait PlotSink {
    fn render(&mut self, figure: &Figure, path: &Path) -> anyhow::Result<()>;
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

/// QA figure for one analysis window: raw and cleaned traces over the index
/// axis, detected peaks marked on the cleaned trace.
pub fn figure_from_window(window: &EcgFrame, title: &str) -> Figure {
    figure_from_window_limit(window, title, 4096)
}

pub fn figure_from_window_limit(window: &EcgFrame, title: &str, max_points: usize) -> Figure {
    let mut fig = Figure::new(Some(title.to_string()));
    fig.x.label = Some("index".into());
    fig.y.label = Some("amplitude".into());

    let raw: Vec<[f64; 2]> = window
        .index
        .iter()
        .zip(&window.raw)
        .map(|(&x, &y)| [x, y])
        .collect();
    fig.add_series(Series::Line(LineSeries {
        name: "raw".into(),
        points: decimate_points(&raw, max_points),
        style: Style {
            width: 1.0,
            dash: None,
            color: Color(0x9999AA),
        },
    }));

    let clean: Vec<[f64; 2]> = window
        .index
        .iter()
        .zip(&window.clean)
        .map(|(&x, &y)| [x, y])
        .collect();
    fig.add_series(Series::Line(LineSeries {
        name: "clean".into(),
        points: decimate_points(&clean, max_points),
        style: Style {
            width: 1.4,
            dash: None,
            color: Color(0x0055CC),
        },
    }));

    // Peak markers are never decimated; there are few of them and each one
    // matters for QA review.
    let peaks: Vec<[f64; 2]> = window
        .peak_positions()
        .into_iter()
        .map(|i| [window.index[i], window.clean[i]])
        .collect();
    fig.add_series(Series::Scatter(ScatterSeries {
        name: "peaks".into(),
        points: peaks,
        color: Color(0xCC2200),
    }));

    fig
}
