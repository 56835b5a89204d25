/// This module contains all compile-time configuration

pub use qjs_rs_utils::config::MAX_INCLUDE_FILES;

/// The program name used in usage text and diagnostics.
pub const PROG_NAME: &str = "qjs";

/// Bytes charged per live block on top of its usable size. Darwin's
/// `malloc_size` already counts the block header.
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub const MALLOC_OVERHEAD: usize = 0;
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub const MALLOC_OVERHEAD: usize = 8;

/// How many instantiation rounds the micro-benchmark takes the minimum over.
pub const BENCH_ITERATIONS: usize = 100;

/// The file name inline `-e` expressions are compiled under.
pub const CMDLINE_NAME: &str = "<cmdline>";

/// The file name the `--std` shim module is compiled under.
pub const STD_SHIM_NAME: &str = "<input>";

/// Publishes the `std` and `os` modules as globals for non-module code.
pub const STD_SHIM_SOURCE: &str = "import * as std from 'std';\n\
                                   import * as os from 'os';\n\
                                   globalThis.std = std;\n\
                                   globalThis.os = os;\n";

/// The file name `std.evalScript` compiles its argument under.
pub const EVAL_SCRIPT_NAME: &str = "<evalScript>";
