//! The `--dump` report: the engine's memory usage snapshot laid out the way the
//! engine's own host prints it.

use std::{
    fmt::{self, Display, Formatter},
    mem,
};

use rquickjs::{qjs, runtime::MemoryUsage};

use crate::compile_time_config::MALLOC_OVERHEAD;

/// Size of one engine value, used to turn fast-array element counts into bytes.
const VALUE_SIZE: i64 = mem::size_of::<qjs::JSValue>() as i64;

/// A printable memory usage snapshot.
pub struct MemoryReport<'a> {
    usage: &'a MemoryUsage,
    version: String,
}

impl<'a> MemoryReport<'a> {
    pub fn new<T>(usage: &'a MemoryUsage, version: T) -> Self
    where
        T: Into<String>,
    {
        Self {
            usage,
            version: version.into(),
        }
    }
}

fn ratio(num: i64, den: i64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn row(f: &mut Formatter, name: &str, count: i64, size: i64) -> fmt::Result {
    write!(f, "{name:<20} {count:>8} {size:>8}")
}

impl Display for MemoryReport<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = self.usage;
        let endian = if cfg!(target_endian = "big") {
            "Big"
        } else {
            "Little"
        };

        writeln!(
            f,
            "QuickJS-ng memory usage -- {} version, {}-bit, {endian} Endian, malloc limit: {}\n",
            self.version,
            usize::BITS,
            s.malloc_limit
        )?;
        writeln!(f, "{:<20} {:>8} {:>8}", "NAME", "COUNT", "SIZE")?;

        if s.malloc_count != 0 {
            row(f, "memory allocated", s.malloc_count, s.malloc_size)?;
            writeln!(f, "  ({:.1} per block)", ratio(s.malloc_size, s.malloc_count))?;
            row(f, "memory used", s.memory_used_count, s.memory_used_size)?;
            writeln!(
                f,
                "  ({MALLOC_OVERHEAD} overhead, {:.1} average slack)",
                ratio(s.malloc_size - s.memory_used_size, s.memory_used_count)
            )?;
        }

        if s.atom_count != 0 {
            row(f, "atoms", s.atom_count, s.atom_size)?;
            writeln!(f, "  ({:.1} per atom)", ratio(s.atom_size, s.atom_count))?;
        }

        if s.str_count != 0 {
            row(f, "strings", s.str_count, s.str_size)?;
            writeln!(f, "  ({:.1} per string)", ratio(s.str_size, s.str_count))?;
        }

        if s.obj_count != 0 {
            row(f, "objects", s.obj_count, s.obj_size)?;
            writeln!(f, "  ({:.1} per object)", ratio(s.obj_size, s.obj_count))?;
            row(f, "  properties", s.prop_count, s.prop_size)?;
            writeln!(f, "  ({:.1} per object)", ratio(s.prop_count, s.obj_count))?;
            row(f, "  shapes", s.shape_count, s.shape_size)?;
            writeln!(f, "  ({:.1} per shape)", ratio(s.shape_size, s.shape_count))?;
        }

        if s.js_func_count != 0 {
            row(f, "bytecode functions", s.js_func_count, s.js_func_size)?;
            writeln!(f)?;
            row(f, "  bytecode", s.js_func_count, s.js_func_code_size)?;
            writeln!(
                f,
                "  ({:.1} per function)",
                ratio(s.js_func_code_size, s.js_func_count)
            )?;
            if s.js_func_pc2line_count != 0 {
                row(f, "  pc2line", s.js_func_pc2line_count, s.js_func_pc2line_size)?;
                writeln!(
                    f,
                    "  ({:.1} per function)",
                    ratio(s.js_func_pc2line_size, s.js_func_pc2line_count)
                )?;
            }
        }

        if s.c_func_count != 0 {
            writeln!(f, "{:<20} {:>8}", "C functions", s.c_func_count)?;
        }

        if s.array_count != 0 {
            writeln!(f, "{:<20} {:>8}", "arrays", s.array_count)?;
            if s.fast_array_count != 0 {
                writeln!(f, "{:<20} {:>8}", "  fast arrays", s.fast_array_count)?;
                row(
                    f,
                    "  elements",
                    s.fast_array_elements,
                    s.fast_array_elements * VALUE_SIZE,
                )?;
                writeln!(
                    f,
                    "  ({:.1} per fast array)",
                    ratio(s.fast_array_elements, s.fast_array_count)
                )?;
            }
        }

        if s.binary_object_count != 0 {
            row(f, "binary objects", s.binary_object_count, s.binary_object_size)?;
            writeln!(f)?;
        }

        Ok(())
    }
}

/// Resident bytes of the host process, as jemalloc sees them.
#[cfg(not(target_env = "msvc"))]
pub fn host_resident() -> Option<usize> {
    use jemalloc_ctl::{epoch, stats};

    epoch::advance().ok()?;
    stats::resident::read().ok()
}

#[cfg(target_env = "msvc")]
pub fn host_resident() -> Option<usize> {
    None
}
