pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod io;
pub mod metrics;
pub mod plot;
pub mod segment;
pub mod signal;
pub mod table;
pub mod windowed;

pub use config::Parameters;
pub use engine::{MetricEngine, NativeEngine};
pub use error::PipelineError;
pub use signal::{EcgFrame, RRSeries};
pub use table::{MetricsRow, MetricsTable};
