use std::fmt::{Display, Formatter};

use crate::allocator::usable_size;

/// A block pointer as it appears in the allocation trace: `H<offset>.<usable>`,
/// where the offset is signed and relative to the allocator's anchor address.
/// A null pointer renders as `NULL`.
#[derive(Debug, Clone, Copy)]
pub struct TracePtr {
    ptr: *const u8,
    base: usize,
}

impl TracePtr {
    pub fn new(ptr: *const u8, base: usize) -> Self {
        Self { ptr, base }
    }

    /// The signed distance from the anchor. The anchor is never dereferenced.
    pub fn offset(&self) -> i64 {
        (self.ptr as usize).wrapping_sub(self.base) as isize as i64
    }
}

impl Display for TracePtr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.ptr.is_null() {
            return write!(f, "NULL");
        }

        // SAFETY: non-null trace pointers are live blocks from the platform allocator
        let usable = unsafe { usable_size(self.ptr) };
        write!(f, "H{:+06}.{}", self.offset(), usable)
    }
}
