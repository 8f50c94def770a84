//! Timed bandwidth kernels.
//!
//! Every kernel runs on the ambient rayon pool (the orchestrator installs its own
//! sized pool around each call) and returns only after all workers have joined.
//! Indices are split so that each element is touched by exactly one worker.

use std::ops::Range;

use membw_types::UnrollWidth;
use rayon::prelude::*;
use tracing::trace;

/// Elements per wide store in the non-temporal kernel (256 bits of `f64`).
pub const SIMD_WIDTH: usize = 4;

/// Groups of `SIMD_WIDTH` handed to one rayon task by the non-temporal kernel.
const GROUPS_PER_TASK: usize = 1024;

/// Whether `non_temporal_uniform_write` issues real cache-bypassing stores on this target.
pub const NON_TEMPORAL_STORES: bool = stream::SUPPORTED;

/// Store instructions actually used for the bulk of a non-temporal write.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StorePath {
    Streaming,
    /// Ordinary cached stores: the target has no streaming stores or the slice is
    /// not 32-byte aligned.
    Ordinary,
}

/// Split of `[0, len)` into a stride-aligned bulk and a trailing remainder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    pub bulk: Range<usize>,
    pub remainder: Range<usize>,
}

pub fn partition(len: usize, stride: usize) -> Partition {
    debug_assert!(stride > 0, "stride must be non-zero");
    let split = len - len % stride;
    Partition {
        bulk: 0..split,
        remainder: split..len,
    }
}

/// Stores `value` into every element.
pub fn uniform_write(buf: &mut [f64], value: f64) {
    trace!(len = buf.len(), value, "uniform_write");
    buf.par_iter_mut().for_each(|x| *x = value);
}

/// Stores `value` into every element, bypassing the cache for the bulk region.
///
/// The bulk is written in groups of [`SIMD_WIDTH`] with one streaming store each,
/// the remainder with scalar stores. A store fence is then issued on every worker
/// of the current pool and on the caller, so all writes are globally visible when
/// this returns.
///
/// Returns which store path the bulk took, so callers can flag a measurement that
/// fell back to ordinary stores.
pub fn non_temporal_uniform_write(buf: &mut [f64], value: f64) -> StorePath {
    let mode = stream::StoreMode::detect(buf);
    trace!(len = buf.len(), value, ?mode, "non_temporal_uniform_write");

    let split = partition(buf.len(), SIMD_WIDTH);
    let (bulk, rest) = buf.split_at_mut(split.bulk.end);

    bulk.par_chunks_mut(SIMD_WIDTH * GROUPS_PER_TASK)
        .for_each(|chunk| stream::fill(chunk, value, mode));

    for x in rest {
        *x = value;
    }

    rayon::broadcast(|_| stream::store_fence());
    stream::store_fence();

    mode.path()
}

/// Sums every element, reading the bulk in blocks of `width` consecutive elements.
///
/// Partial sums are per rayon task and combined in no particular order, so the
/// result is only reproducible up to floating-point rounding.
pub fn strided_reduction_read(buf: &[f64], width: UnrollWidth) -> f64 {
    match width.get() {
        1 => sum_unrolled::<1>(buf),
        2 => sum_unrolled::<2>(buf),
        4 => sum_unrolled::<4>(buf),
        8 => sum_unrolled::<8>(buf),
        16 => sum_unrolled::<16>(buf),
        w => sum_strided(buf, w),
    }
}

fn sum_unrolled<const S: usize>(buf: &[f64]) -> f64 {
    let split = partition(buf.len(), S);
    let (bulk, rest) = buf.split_at(split.bulk.end);

    let bulk_sum: f64 = bulk
        .par_chunks_exact(S)
        .fold(|| 0.0, inner_pass::<S>)
        .sum();

    bulk_sum + rest.iter().sum::<f64>()
}

#[inline(always)]
fn inner_pass<const S: usize>(mut acc: f64, block: &[f64]) -> f64 {
    for &x in &block[..S] {
        acc += x;
    }
    acc
}

fn sum_strided(buf: &[f64], width: usize) -> f64 {
    let split = partition(buf.len(), width);
    let (bulk, rest) = buf.split_at(split.bulk.end);

    let bulk_sum: f64 = bulk
        .par_chunks_exact(width)
        .fold(
            || 0.0,
            |mut acc, block| {
                for &x in block {
                    acc += x;
                }
                acc
            },
        )
        .sum();

    bulk_sum + rest.iter().sum::<f64>()
}

#[cfg(target_arch = "x86_64")]
mod stream {
    use std::arch::x86_64::{
        _mm256_set1_pd, _mm256_stream_pd, _mm_set1_pd, _mm_sfence, _mm_stream_pd,
    };

    use super::{StorePath, SIMD_WIDTH};

    pub const SUPPORTED: bool = true;

    const STREAM_ALIGN: usize = SIMD_WIDTH * std::mem::size_of::<f64>();

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum StoreMode {
        Avx,
        Sse2,
        Scalar,
    }

    impl StoreMode {
        pub fn detect(buf: &[f64]) -> Self {
            if buf.as_ptr() as usize % STREAM_ALIGN != 0 {
                tracing::warn!(
                    addr = buf.as_ptr() as usize,
                    "buffer not 32-byte aligned, using ordinary stores"
                );
                return StoreMode::Scalar;
            }
            if is_x86_feature_detected!("avx") {
                StoreMode::Avx
            } else {
                StoreMode::Sse2
            }
        }

        pub fn path(self) -> StorePath {
            match self {
                StoreMode::Avx | StoreMode::Sse2 => StorePath::Streaming,
                StoreMode::Scalar => StorePath::Ordinary,
            }
        }
    }

    /// `chunk` starts on a 32-byte boundary and holds whole groups.
    pub fn fill(chunk: &mut [f64], value: f64, mode: StoreMode) {
        debug_assert_eq!(chunk.len() % SIMD_WIDTH, 0);
        match mode {
            // SAFETY: avx was detected at runtime; groups are 32-byte aligned.
            StoreMode::Avx => unsafe { fill_avx(chunk, value) },
            // SAFETY: sse2 is part of the x86_64 baseline; groups are 32-byte aligned.
            StoreMode::Sse2 => unsafe { fill_sse2(chunk, value) },
            StoreMode::Scalar => chunk.fill(value),
        }
    }

    #[target_feature(enable = "avx")]
    unsafe fn fill_avx(chunk: &mut [f64], value: f64) {
        let v = _mm256_set1_pd(value);
        for group in chunk.chunks_exact_mut(SIMD_WIDTH) {
            _mm256_stream_pd(group.as_mut_ptr(), v);
        }
    }

    unsafe fn fill_sse2(chunk: &mut [f64], value: f64) {
        let v = _mm_set1_pd(value);
        for group in chunk.chunks_exact_mut(SIMD_WIDTH) {
            let p = group.as_mut_ptr();
            _mm_stream_pd(p, v);
            _mm_stream_pd(p.add(2), v);
        }
    }

    pub fn store_fence() {
        // SAFETY: sse is part of the x86_64 baseline.
        unsafe { _mm_sfence() }
    }
}

#[cfg(not(target_arch = "x86_64"))]
mod stream {
    use std::sync::atomic::{fence, Ordering};

    use super::StorePath;

    pub const SUPPORTED: bool = false;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum StoreMode {
        Scalar,
    }

    impl StoreMode {
        pub fn detect(_buf: &[f64]) -> Self {
            StoreMode::Scalar
        }

        pub fn path(self) -> StorePath {
            StorePath::Ordinary
        }
    }

    pub fn fill(chunk: &mut [f64], value: f64, _mode: StoreMode) {
        chunk.fill(value);
    }

    pub fn store_fence() {
        fence(Ordering::SeqCst);
    }
}
