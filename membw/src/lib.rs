use std::fmt;
use std::path::PathBuf;

pub use membw_types::{
    BenchmarkConfig, RunConfig, TrialKind, TrialResult, UnrollWidth, WriteVariant,
};

mod buffer;
pub mod kernels;
pub mod sink;
mod sweep;
pub mod timing;
mod validation;

pub use crate::buffer::{AlignedBuffer, BUFFER_ALIGN};
pub use crate::sink::ResultSink;
pub use crate::sweep::{run, Sweep};

#[derive(Debug)]
pub enum Error {
    InvalidConfig(String),
    Allocation { len: usize, align: usize },
    SinkOpen { path: PathBuf, source: std::io::Error },
    SinkWrite(std::io::Error),
    ThreadPool(rayon::ThreadPoolBuildError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::Allocation { len, align } => write!(
                f,
                "Memory allocation failed ({} doubles, {}-byte aligned)",
                len, align
            ),
            Error::SinkOpen { path, source } => write!(
                f,
                "Failed to open file for writing: {}: {}",
                path.display(),
                source
            ),
            Error::SinkWrite(e) => write!(f, "Failed to write result row: {}", e),
            Error::ThreadPool(e) => write!(f, "Failed to build worker pool: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::SinkOpen { source, .. } => Some(source),
            Error::SinkWrite(e) => Some(e),
            Error::ThreadPool(e) => Some(e),
            Error::InvalidConfig(_) | Error::Allocation { .. } => None,
        }
    }
}
