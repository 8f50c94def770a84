use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use tracing::debug;

use crate::Error;

/// Alignment of the benchmark buffer: one cache line, enough for 256-bit streaming stores.
pub const BUFFER_ALIGN: usize = 64;

/// Fixed-length, cache-line aligned `f64` buffer shared by every kernel of a run.
pub struct AlignedBuffer {
    ptr: NonNull<f64>,
    len: usize,
    layout: Layout,
}

// The buffer owns its allocation exclusively, like a `Box<[f64]>`.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    pub fn new(len: usize) -> Result<Self, Error> {
        let alloc_err = || Error::Allocation {
            len,
            align: BUFFER_ALIGN,
        };

        let size = len
            .checked_mul(std::mem::size_of::<f64>())
            .ok_or_else(alloc_err)?;
        // Zero-sized layouts cannot go through the global allocator.
        let layout = Layout::from_size_align(size.max(BUFFER_ALIGN), BUFFER_ALIGN)
            .map_err(|_| alloc_err())?;

        let raw = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw as *mut f64) else {
            return Err(alloc_err());
        };

        debug!(len, bytes = size, align = BUFFER_ALIGN, "buffer_allocated");
        Ok(Self { ptr, len, layout })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for AlignedBuffer {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut [f64] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        debug!(len = self.len, "buffer_released");
        unsafe { dealloc(self.ptr.as_ptr() as *mut u8, self.layout) };
    }
}
