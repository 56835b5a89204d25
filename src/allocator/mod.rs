//! An engine allocator over the platform `malloc` that counts live blocks,
//! enforces a byte cap, and writes one trace line per allocation event.

use std::{
    fmt,
    io::{self, Write},
    ptr,
    sync::Arc,
};

use parking_lot::Mutex;
use rquickjs::allocator::Allocator;

use crate::compile_time_config::MALLOC_OVERHEAD;

pub mod trace_format;

use trace_format::TracePtr;

/// The usable size of a live platform-allocator block.
///
/// # Safety
/// `ptr` must be null or a live block returned by the platform allocator.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub unsafe fn usable_size(ptr: *const u8) -> usize {
    if ptr.is_null() {
        return 0;
    }
    libc::malloc_usable_size(ptr as *mut libc::c_void)
}

/// The usable size of a live platform-allocator block.
///
/// # Safety
/// `ptr` must be null or a live block returned by the platform allocator.
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub unsafe fn usable_size(ptr: *const u8) -> usize {
    if ptr.is_null() {
        return 0;
    }
    libc::malloc_size(ptr as *const libc::c_void)
}

/// The usable size of a live platform-allocator block. Platforms without an
/// introspection call report 0, and only the overhead is accounted.
///
/// # Safety
/// Always safe, but kept `unsafe` to match the introspecting variants.
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "macos",
    target_os = "ios"
)))]
pub unsafe fn usable_size(_ptr: *const u8) -> usize {
    0
}

/// A snapshot of the allocator's books.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocStats {
    /// Sum of `usable + MALLOC_OVERHEAD` over live blocks
    pub live_bytes: usize,
    /// Number of live blocks
    pub live_count: usize,
    /// Requests that would take `live_bytes` past this are refused
    pub byte_limit: usize,
}

impl AllocStats {
    fn new(byte_limit: usize) -> Self {
        Self {
            live_bytes: 0,
            live_count: 0,
            byte_limit,
        }
    }

    /// Can `requested` more bytes be taken, with `released` given back?
    fn admits(&self, requested: usize, released: usize) -> bool {
        self.live_bytes
            .saturating_add(requested)
            .saturating_sub(released)
            <= self.byte_limit
    }
}

/// A read-only view of a [`TraceAllocator`]'s books that outlives the move of
/// the allocator into the runtime.
#[derive(Debug, Clone)]
pub struct AllocHandle(Arc<Mutex<AllocStats>>);

impl AllocHandle {
    pub fn stats(&self) -> AllocStats {
        *self.0.lock()
    }
}

/// The tracing allocator.
pub struct TraceAllocator {
    /// Address of a freed throwaway block. Used for offset arithmetic only.
    base: usize,
    stats: Arc<Mutex<AllocStats>>,
    sink: Box<dyn Write>,
}

impl TraceAllocator {
    /// Create a new allocator that traces to stdout. A `byte_limit` of 0 means
    /// unlimited.
    pub fn new(byte_limit: usize) -> Self {
        Self::with_sink(byte_limit, io::stdout())
    }

    /// Create a new allocator that traces to `sink`.
    pub fn with_sink<W>(byte_limit: usize, sink: W) -> Self
    where
        W: Write + 'static,
    {
        let byte_limit = if byte_limit == 0 {
            usize::MAX
        } else {
            byte_limit
        };

        // SAFETY: the block is released immediately. Only its address is kept.
        let base = unsafe {
            let block = libc::malloc(8);
            libc::free(block);
            block as usize
        };

        Self {
            base,
            stats: Arc::new(Mutex::new(AllocStats::new(byte_limit))),
            sink: Box::new(sink),
        }
    }

    pub fn stats(&self) -> AllocStats {
        *self.stats.lock()
    }

    pub fn handle(&self) -> AllocHandle {
        AllocHandle(self.stats.clone())
    }

    fn trace_ptr(&self, ptr: *const u8) -> TracePtr {
        TracePtr::new(ptr, self.base)
    }

    fn trace(&mut self, args: fmt::Arguments) {
        // a failed trace write must not fail the allocation
        let _ = self.sink.write_fmt(args);
    }

    /// Book a newly live block.
    ///
    /// # Safety
    /// `ptr` must be a live platform block.
    unsafe fn charge(&self, ptr: *const u8) {
        let mut stats = self.stats.lock();
        stats.live_count += 1;
        stats.live_bytes += usable_size(ptr) + MALLOC_OVERHEAD;
    }

    /// Unbook a block about to be freed.
    ///
    /// # Safety
    /// `ptr` must be a live platform block previously charged.
    unsafe fn release(&self, ptr: *const u8) {
        let mut stats = self.stats.lock();
        stats.live_count = stats.live_count.saturating_sub(1);
        stats.live_bytes = stats
            .live_bytes
            .saturating_sub(usable_size(ptr) + MALLOC_OVERHEAD);
    }
}

impl fmt::Debug for TraceAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceAllocator")
            .field("base", &format_args!("{:#x}", self.base))
            .field("stats", &self.stats())
            .finish()
    }
}

unsafe impl Allocator for TraceAllocator {
    fn alloc(&mut self, size: usize) -> *mut u8 {
        // zero-byte requests are refused, like a cap refusal
        if size == 0 {
            return ptr::null_mut();
        }

        if !self.stats.lock().admits(size, 0) {
            return ptr::null_mut();
        }

        // SAFETY: plain platform allocation
        let block = unsafe { libc::malloc(size) } as *mut u8;
        let shown = self.trace_ptr(block);
        self.trace(format_args!("A {size} -> {shown}\n"));

        if !block.is_null() {
            // SAFETY: `block` was just returned by malloc
            unsafe { self.charge(block) };
        }

        block
    }

    fn calloc(&mut self, count: usize, size: usize) -> *mut u8 {
        let Some(total) = count.checked_mul(size).filter(|&total| total != 0) else {
            return ptr::null_mut();
        };

        if !self.stats.lock().admits(total, 0) {
            return ptr::null_mut();
        }

        // SAFETY: plain platform allocation
        let block = unsafe { libc::calloc(count, size) } as *mut u8;
        let shown = self.trace_ptr(block);
        self.trace(format_args!("C {count} {size} -> {shown}\n"));

        if !block.is_null() {
            // SAFETY: `block` was just returned by calloc
            unsafe { self.charge(block) };
        }

        block
    }

    unsafe fn dealloc(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        let shown = self.trace_ptr(ptr);
        self.trace(format_args!("F {shown}\n"));
        self.release(ptr);
        libc::free(ptr as *mut libc::c_void);
    }

    unsafe fn realloc(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        if ptr.is_null() {
            if new_size == 0 {
                return ptr::null_mut();
            }
            return self.alloc(new_size);
        }

        let old_size = usable_size(ptr);
        let shown = self.trace_ptr(ptr);

        if new_size == 0 {
            self.trace(format_args!("R 0 {shown}\n"));
            self.release(ptr);
            libc::free(ptr as *mut libc::c_void);
            return ptr::null_mut();
        }

        if !self.stats.lock().admits(new_size, old_size) {
            return ptr::null_mut();
        }

        self.trace(format_args!("R {new_size} {shown}"));
        let block = libc::realloc(ptr as *mut libc::c_void, new_size) as *mut u8;
        let shown = self.trace_ptr(block);
        self.trace(format_args!(" -> {shown}\n"));

        if !block.is_null() {
            let mut stats = self.stats.lock();
            stats.live_bytes = stats.live_bytes - old_size + usable_size(block);
        }

        block
    }

    unsafe fn usable_size(ptr: *mut u8) -> usize {
        usable_size(ptr)
    }
}
