use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Size of one buffer element in bytes.
pub const ELEMENT_BYTES: usize = std::mem::size_of::<f64>();

pub const DEFAULT_LEN: usize = 1000 * 1000 * 1000;
pub const DEFAULT_UNROLL_WIDTHS: [usize; 5] = [1, 2, 4, 8, 16];
pub const DEFAULT_OUTPUT_DIR: &str = "output";

pub const WRITE_RESULTS_FILE: &str = "write_results.csv";
pub const READ_RESULTS_FILE: &str = "read_results.csv";

/// Appended to a write label when its streaming stores fell back to ordinary ones.
pub const ORDINARY_STORES_SUFFIX: &str = " (ordinary stores)";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteVariant {
    NoOptimization,
    ZeroedBeforeTiming,
    NonTemporalZeroed,
}

impl WriteVariant {
    /// Sweep order of the write trials.
    pub const ALL: [WriteVariant; 3] = [
        WriteVariant::NoOptimization,
        WriteVariant::ZeroedBeforeTiming,
        WriteVariant::NonTemporalZeroed,
    ];

    /// Label written to the results file.
    pub fn label(self) -> &'static str {
        match self {
            WriteVariant::NoOptimization => "No Optimization",
            WriteVariant::ZeroedBeforeTiming => "Set Mem to Zero Before Timing",
            WriteVariant::NonTemporalZeroed => {
                "Non-Temporal Writes + Set Mem to Zero Before Timing"
            }
        }
    }

    /// Label used for progress output.
    pub fn short_label(self) -> &'static str {
        match self {
            WriteVariant::NonTemporalZeroed => "Non-Temp + Mem Set",
            other => other.label(),
        }
    }

    pub fn zeroes_first(self) -> bool {
        !matches!(self, WriteVariant::NoOptimization)
    }

    pub fn non_temporal(self) -> bool {
        matches!(self, WriteVariant::NonTemporalZeroed)
    }
}

/// Number of consecutive elements summed per inner pass of the read kernel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnrollWidth(NonZeroUsize);

impl UnrollWidth {
    pub const fn new(width: usize) -> Option<Self> {
        match NonZeroUsize::new(width) {
            Some(w) => Some(Self(w)),
            None => None,
        }
    }

    pub const fn get(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for UnrollWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialKind {
    Write(WriteVariant),
    Read(UnrollWidth),
}

/// One point of the sweep. Built by the orchestrator, consumed by exactly one trial.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub kind: TrialKind,
    pub threads: usize,
}

impl BenchmarkConfig {
    pub fn label(&self) -> String {
        match self.kind {
            TrialKind::Write(variant) => variant.label().to_string(),
            TrialKind::Read(width) => width.to_string(),
        }
    }

    pub fn unroll_width(&self) -> Option<UnrollWidth> {
        match self.kind {
            TrialKind::Write(_) => None,
            TrialKind::Read(width) => Some(width),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub config: BenchmarkConfig,
    pub bandwidth_mb_per_s: f64,
    /// The trial asked for streaming stores but ran with ordinary ones, so its
    /// number is not a cache-bypassing measurement.
    #[serde(default)]
    pub ordinary_stores: bool,
}

impl TrialResult {
    pub fn label(&self) -> String {
        self.flag(self.config.label())
    }

    pub fn short_label(&self) -> String {
        match self.config.kind {
            TrialKind::Write(variant) => self.flag(variant.short_label().to_string()),
            TrialKind::Read(_) => self.label(),
        }
    }

    fn flag(&self, mut label: String) -> String {
        if self.ordinary_stores {
            label.push_str(ORDINARY_STORES_SUFFIX);
        }
        label
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Buffer length in elements.
    pub len: usize,
    pub threads: usize,
    pub verbosity: i32,
    pub unroll_widths: Vec<UnrollWidth>,
    pub output_dir: PathBuf,
}

impl RunConfig {
    pub fn verbose(&self) -> bool {
        self.verbosity > 0
    }

    pub fn buffer_bytes(&self) -> usize {
        self.len * ELEMENT_BYTES
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            len: DEFAULT_LEN,
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            verbosity: 0,
            unroll_widths: DEFAULT_UNROLL_WIDTHS
                .iter()
                .filter_map(|&w| UnrollWidth::new(w))
                .collect(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}
