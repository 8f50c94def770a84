use std::hint::black_box;

use membw_types::{BenchmarkConfig, RunConfig, TrialKind, TrialResult, UnrollWidth, WriteVariant};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, info_span, warn};

use crate::buffer::AlignedBuffer;
use crate::kernels::{non_temporal_uniform_write, strided_reduction_read, uniform_write, StorePath};
use crate::sink::ResultSink;
use crate::timing::{Measurement, Timer};
use crate::validation::validate;
use crate::Error;

/// Allocates the buffer, opens the sinks and runs every trial once.
///
/// The buffer and the sinks are released when this returns, on success or error.
pub fn run(config: &RunConfig) -> Result<(), Error> {
    validate(config)?;
    match serde_json::to_string(config) {
        Ok(json) => debug!(stage = "setup", config = %json),
        Err(err) => debug!(stage = "setup", len = config.len, %err, "config not serialisable"),
    }

    let mut buffer = AlignedBuffer::new(config.len)?;
    let mut sink = ResultSink::open(&config.output_dir)?;
    let sweep = Sweep::new(config)?;

    sweep.run(&mut buffer, &mut sink)?;

    debug!(stage = "teardown");
    Ok(())
}

/// The fixed trial sequence over one buffer, driven from a single thread.
///
/// Kernels fork onto a dedicated pool of `config.threads` workers and join before
/// the next trial starts; timing and result rows stay on the calling thread.
pub struct Sweep<'a> {
    config: &'a RunConfig,
    pool: ThreadPool,
    timer: Timer,
}

impl<'a> Sweep<'a> {
    pub fn new(config: &'a RunConfig) -> Result<Self, Error> {
        validate(config)?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("membw-worker-{}", i))
            .build()
            .map_err(Error::ThreadPool)?;

        Ok(Self {
            config,
            pool,
            timer: Timer::new(),
        })
    }

    /// Write variants in sweep order, then one read trial per unroll width.
    pub fn plan(&self) -> Vec<BenchmarkConfig> {
        let threads = self.config.threads;
        let writes = WriteVariant::ALL.iter().map(|&v| TrialKind::Write(v));
        let reads = self.config.unroll_widths.iter().map(|&w| TrialKind::Read(w));
        writes
            .chain(reads)
            .map(|kind| BenchmarkConfig { kind, threads })
            .collect()
    }

    pub fn run(&self, buffer: &mut [f64], sink: &mut ResultSink) -> Result<(), Error> {
        if self.config.verbose() {
            println!("Running bandwidth test.");
        }

        for config in self.plan() {
            let _span =
                info_span!("trial", label = %config.label(), threads = config.threads).entered();
            match config.kind {
                TrialKind::Write(variant) => {
                    let result = self.write_trial(buffer, config, variant);
                    sink.record_write(&result)?;
                }
                TrialKind::Read(width) => {
                    let result = self.read_trial(buffer, config, width);
                    sink.record_read(width, &[result.bandwidth_mb_per_s])?;
                }
            }
        }

        Ok(())
    }

    fn write_trial(
        &self,
        buffer: &mut [f64],
        config: BenchmarkConfig,
        variant: WriteVariant,
    ) -> TrialResult {
        let kernel = |buf: &mut [f64], value: f64| {
            if variant.non_temporal() {
                non_temporal_uniform_write(buf, value)
            } else {
                uniform_write(buf, value);
                StorePath::Ordinary
            }
        };

        if variant.zeroes_first() {
            debug!("zeroing buffer");
            self.pool.install(|| kernel(buffer, 0.0));
        }

        let len = buffer.len();
        let timer = &self.timer;
        let (path, measurement) = self
            .pool
            .install(|| timer.measure(len, || kernel(buffer, 1.0)));

        let ordinary_stores = variant.non_temporal() && path == StorePath::Ordinary;
        if ordinary_stores {
            warn!("streaming stores unavailable, trial ran with ordinary stores");
        }
        self.finish(config, measurement, ordinary_stores)
    }

    fn read_trial(
        &self,
        buffer: &[f64],
        config: BenchmarkConfig,
        width: UnrollWidth,
    ) -> TrialResult {
        let len = buffer.len();
        let timer = &self.timer;
        let (sum, measurement) = self
            .pool
            .install(|| timer.measure(len, || strided_reduction_read(buffer, width)));

        debug!(sum = black_box(sum), "read checksum");
        self.finish(config, measurement, false)
    }

    fn finish(
        &self,
        config: BenchmarkConfig,
        measurement: Measurement,
        ordinary_stores: bool,
    ) -> TrialResult {
        let result = TrialResult {
            config,
            bandwidth_mb_per_s: measurement.bandwidth_mb_per_s,
            ordinary_stores,
        };
        info!(
            bandwidth_mb_s = result.bandwidth_mb_per_s,
            elapsed_s = measurement.elapsed.as_secs_f64(),
            "trial complete"
        );
        if let Ok(json) = serde_json::to_string(&result) {
            debug!(result = %json);
        }

        // Logs are compiled out of release builds; these go to stderr regardless.
        for notice in notices(&result, &measurement) {
            eprintln!("{}", notice);
        }

        if self.config.verbose() {
            match config.kind {
                TrialKind::Write(_) => println!(
                    "{}, Threads: {}, Bandwidth: {:.6} MB/s",
                    result.short_label(),
                    config.threads,
                    result.bandwidth_mb_per_s
                ),
                TrialKind::Read(width) => println!(
                    "Unroll Size {}, Threads: {}, Bandwidth: {:.6} MB/s",
                    width, config.threads, result.bandwidth_mb_per_s
                ),
            }
        }

        result
    }
}

/// Conditions that make a trial's number misleading, as user-facing lines.
fn notices(result: &TrialResult, measurement: &Measurement) -> Vec<String> {
    let mut lines = Vec::new();
    if result.ordinary_stores {
        lines.push(format!(
            "warning: {}: streaming stores unavailable, measured with ordinary stores",
            result.config.label()
        ));
    }
    if measurement.elapsed.is_zero() {
        warn!("trial completed in zero measurable time");
        lines.push(format!(
            "warning: {}: completed in zero measurable time, bandwidth is not meaningful",
            result.label()
        ));
    }
    lines
}
