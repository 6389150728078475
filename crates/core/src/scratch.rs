use std::any::Any;
use std::ffi::c_void;

use crate::error::Result;
use crate::layout;
use crate::types::TypeDesc;
use crate::value::Value;

/// Memory owned by a single invocation.
///
/// Wrappers allocate argument storage here during the prologue. Everything is
/// released when the scratch is dropped, on success and on error alike,
/// including native allocations the caller was asked to free.
#[derive(Default)]
pub struct Scratch {
    blocks: Vec<Box<[u64]>>,
    retained: Vec<Box<dyn Any + Send>>,
    native: Vec<usize>,
}

impl Scratch {
    pub fn new() -> Self {
        Scratch::default()
    }

    /// Allocates `size` zeroed bytes aligned to 8 and returns their address.
    pub fn alloc(&mut self, size: usize) -> *mut u8 {
        let mut block = vec![0u64; size.div_ceil(8).max(1)].into_boxed_slice();
        let ptr = block.as_mut_ptr().cast::<u8>();
        self.blocks.push(block);
        ptr
    }

    /// Copies `bytes` into scratch memory.
    pub fn copy_bytes(&mut self, bytes: &[u8]) -> usize {
        let ptr = self.alloc(bytes.len());
        // SAFETY: `alloc` returned at least `bytes.len()` writable bytes.
        unsafe { ptr.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len()) };
        ptr as usize
    }

    /// Stores `value` in its native representation and returns its address.
    pub fn store(&mut self, ty: &TypeDesc, value: &Value) -> Result<usize> {
        let size = ty.size().unwrap_or(0);
        let ptr = self.alloc(size);
        // SAFETY: the block is `size` bytes long.
        unsafe { layout::write(ty, value, ptr)? };
        Ok(ptr as usize)
    }

    /// Keeps `value` alive until the invocation finishes.
    pub fn retain(&mut self, value: impl Any + Send) {
        self.retained.push(Box::new(value));
    }

    /// Frees native memory at `ptr` with the C allocator once the
    /// invocation finishes.
    pub fn free_native(&mut self, ptr: usize) {
        if ptr != 0 {
            self.native.push(ptr);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.retained.is_empty() && self.native.is_empty()
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        for ptr in self.native.drain(..) {
            // SAFETY: only addresses handed out by the C allocator are queued.
            unsafe { libc::free(ptr as *mut c_void) };
        }
    }
}
