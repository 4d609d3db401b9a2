use anyhow::{Context, Result};
use cardia_lib::{
    config::{self, Parameters},
    engine::{preprocess, NativeEngine},
    events::mark_on_offsets,
    gate,
    io::{ecg as ecg_io, events as events_io, storage},
    plot::{Figure, PlotSink, Series},
    segment::segment_recording,
    windowed::{compute_windowed_hrv_across_segments, rsa_per_segment, QaPlots},
};
use clap::{Parser, Subcommand};
use log::info;
use plotters::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "cardia",
    version,
    about = "Windowed HRV and RSA metrics for segmented ECG recordings"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: preprocess, segment, windowed HRV, RSA, usability gate
    Run {
        /// Newline-delimited raw ECG samples
        #[arg(long)]
        ecg: PathBuf,
        /// Experiment event log (TSV or CSV: time, name)
        #[arg(long)]
        events: PathBuf,
        #[arg(long)]
        subject_id: String,
        /// Parameters YAML; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
        /// Render one QA figure per analysis window under <out-dir>/figures
        #[arg(long, default_value_t = false)]
        qa_plots: bool,
        #[arg(long, default_value_t = gate::DEFAULT_MIN_PEAKS_REQUIRED)]
        min_peaks: u32,
        #[arg(long, default_value_t = 3.0)]
        z_threshold: f64,
    },
    /// Resolve segment boundaries and print them as JSON
    Segment {
        #[arg(long)]
        ecg: PathBuf,
        #[arg(long)]
        events: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the default parameters as YAML
    DefaultConfig,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            ecg,
            events,
            subject_id,
            config,
            out_dir,
            qa_plots,
            min_peaks,
            z_threshold,
        } => cmd_run(
            &ecg,
            &events,
            &subject_id,
            config.as_deref(),
            &out_dir,
            qa_plots,
            min_peaks,
            z_threshold,
        )?,
        Commands::Segment {
            ecg,
            events,
            config,
        } => cmd_segment(&ecg, &events, config.as_deref())?,
        Commands::DefaultConfig => {
            print!("{}", serde_yaml::to_string(&Parameters::default())?);
        }
    }
    Ok(())
}

fn load_parameters(config: Option<&Path>) -> Result<Parameters> {
    match config {
        Some(path) => storage::read_yaml(path),
        None => Ok(Parameters::default()),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    ecg: &Path,
    events: &Path,
    subject_id: &str,
    config: Option<&Path>,
    out_dir: &Path,
    qa_plots: bool,
    min_peaks: u32,
    z_threshold: f64,
) -> Result<()> {
    let params = config::configure_for_subject(subject_id, &load_parameters(config)?);

    let raw = ecg_io::read_f64_series(ecg)?;
    info!("loaded {} samples from {}", raw.len(), ecg.display());
    let frame = preprocess(&raw, &NativeEngine, &params)?;

    let log = events_io::read_event_log(events)?;
    let marked = mark_on_offsets(&log);
    let segments = segment_recording(&frame, &marked, &params)?;
    info!("resolved {} segments", segments.len());

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut sink = PlottersSink;
    let mut qa = qa_plots.then(|| QaPlots {
        sink: &mut sink,
        figure_dir: out_dir.join("figures"),
    });

    let (table, _preprocessed) = compute_windowed_hrv_across_segments(
        &segments,
        &NativeEngine,
        &params,
        subject_id,
        out_dir,
        qa.take(),
    )?;

    let table = gate::flag_peak_sufficiency(table, min_peaks);
    let table = gate::flag_zscore_outliers(table, gate::USABILITY_METRIC, z_threshold)?;
    let table = gate::flag_usable_windows(table)?;
    storage::write_metrics_table(&table, &out_dir.join("hrv_metrics.csv"))
        .context("persisting gated HRV metrics")?;

    // RSA runs over the persisted preprocessed data, reassembled per segment.
    let (_, rsa_segments) = storage::read_preprocessed_ecg(
        &out_dir.join("preprocessed_ecg.csv"),
        params.general.sampling_frequency,
    )?;
    let rsa = rsa_per_segment(&rsa_segments, &NativeEngine, &params, subject_id, out_dir)?;

    storage::write_yaml(&params, &out_dir.join("parameters.yaml"))
        .context("persisting effective parameters")?;

    #[derive(Serialize)]
    struct RunSummary {
        segments: usize,
        hrv_windows: usize,
        usable_windows: usize,
        rsa_segments: usize,
    }
    let summary = RunSummary {
        segments: segments.len(),
        hrv_windows: table.len(),
        usable_windows: table
            .rows
            .iter()
            .filter(|r| r.usable_window == Some(true))
            .count(),
        rsa_segments: rsa.len(),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_segment(ecg: &Path, events: &Path, config: Option<&Path>) -> Result<()> {
    let params = load_parameters(config)?;
    let raw = ecg_io::read_f64_series(ecg)?;
    let frame = preprocess(&raw, &NativeEngine, &params)?;
    let log = events_io::read_event_log(events)?;
    let segments = segment_recording(&frame, &mark_on_offsets(&log), &params)?;

    #[derive(Serialize)]
    struct Boundary {
        name: String,
        start_time: f64,
        end_time: f64,
        samples: usize,
    }
    let boundaries: Vec<Boundary> = segments
        .iter()
        .map(|s| Boundary {
            name: s.name.clone(),
            start_time: s.start_time(),
            end_time: s.end_time(),
            samples: s.frame.len(),
        })
        .collect();
    println!("{}", serde_json::to_string(&boundaries)?);
    Ok(())
}

struct PlottersSink;

impl PlotSink for PlottersSink {
    fn render(&mut self, figure: &Figure, path: &Path) -> Result<()> {
        draw_plotters_figure(path, figure)
    }
}

fn rgb(color: cardia_lib::plot::Color) -> RGBColor {
    RGBColor(
        ((color.0 >> 16) & 0xFF) as u8,
        ((color.0 >> 8) & 0xFF) as u8,
        (color.0 & 0xFF) as u8,
    )
}

fn draw_plotters_figure(path: &Path, fig: &Figure) -> Result<()> {
    let backend = BitMapBackend::new(path, (1024, 480));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;

    let points = fig.series.iter().flat_map(|series| match series {
        Series::Line(line) => line.points.iter(),
        Series::Scatter(scatter) => scatter.points.iter(),
    });
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    for p in points {
        x_min = x_min.min(p[0]);
        x_max = x_max.max(p[0]);
        y_min = y_min.min(p[1]);
        y_max = y_max.max(p[1]);
    }
    if !x_min.is_finite() || !y_min.is_finite() {
        (x_min, x_max, y_min, y_max) = (0.0, 1.0, 0.0, 1.0);
    }

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    chart.configure_mesh().draw()?;

    for series in &fig.series {
        match series {
            Series::Line(line) => {
                chart.draw_series(LineSeries::new(
                    line.points.iter().map(|p| (p[0], p[1])),
                    &rgb(line.style.color),
                ))?;
            }
            Series::Scatter(scatter) => {
                let color = rgb(scatter.color);
                chart.draw_series(
                    scatter
                        .points
                        .iter()
                        .map(|p| Circle::new((p[0], p[1]), 3, color.filled())),
                )?;
            }
        }
    }
    root.present()?;
    Ok(())
}
