use std::fs::{File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use membw_types::{TrialResult, UnrollWidth, READ_RESULTS_FILE, WRITE_RESULTS_FILE};
use tracing::debug;

use crate::Error;

/// Append-only CSV destinations for write and read trials.
///
/// Rows are flushed as soon as they are recorded. The sink is neither `Send` nor
/// `Sync`, so it cannot be captured by a parallel kernel closure.
pub struct ResultSink {
    write_log: File,
    read_log: File,
    _orchestrator_only: PhantomData<*const ()>,
}

impl ResultSink {
    pub fn open(dir: &Path) -> Result<Self, Error> {
        let write_log = open_append(dir.join(WRITE_RESULTS_FILE))?;
        let read_log = open_append(dir.join(READ_RESULTS_FILE))?;
        Ok(Self {
            write_log,
            read_log,
            _orchestrator_only: PhantomData,
        })
    }

    pub fn record_write(&mut self, result: &TrialResult) -> Result<(), Error> {
        let row = write_row(
            &result.label(),
            result.config.threads,
            result.bandwidth_mb_per_s,
        );
        append(&mut self.write_log, &row)
    }

    /// One row per unroll width, one bandwidth column per thread count.
    pub fn record_read(&mut self, width: UnrollWidth, bandwidths: &[f64]) -> Result<(), Error> {
        append(&mut self.read_log, &read_row(width, bandwidths))
    }
}

fn open_append(path: PathBuf) -> Result<File, Error> {
    debug!(path = %path.display(), "sink_open");
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(&path)
        .map_err(|source| Error::SinkOpen { path, source })
}

fn append(file: &mut File, row: &str) -> Result<(), Error> {
    debug_assert!(
        rayon::current_thread_index().is_none(),
        "result rows must be written from the orchestrator thread"
    );
    file.write_all(row.as_bytes()).map_err(Error::SinkWrite)?;
    file.flush().map_err(Error::SinkWrite)
}

pub fn write_row(label: &str, threads: usize, bandwidth_mb_per_s: f64) -> String {
    format!("{},{},{:.6}\n", label, threads, bandwidth_mb_per_s)
}

pub fn read_row(width: UnrollWidth, bandwidths: &[f64]) -> String {
    let mut row = width.to_string();
    for bw in bandwidths {
        row.push_str(&format!(",{:.6}", bw));
    }
    row.push('\n');
    row
}
