//! Loading buffers and files into the engine.

use std::path::Path;

use qjs_rs_errors::{QjsError, Result};
use qjs_rs_utils::config::ModuleMode;
use rquickjs::Ctx;
use tracing::{debug, instrument};

use crate::host::{self, event_loop};

pub mod compile;
pub mod exception;

use exception::report_error;

/// How a buffer is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Script,
    Module,
}

impl SourceKind {
    /// Pick the kind for `source` loaded from `filename`. Autodetect means
    /// `.mjs` files, and buffers the engine classifies as modules, are modules.
    pub fn resolve(mode: ModuleMode, filename: &str, source: &[u8]) -> Self {
        let is_module = match mode {
            ModuleMode::Module => true,
            ModuleMode::Script => false,
            ModuleMode::Autodetect => {
                filename.ends_with(".mjs") || compile::detect_module(source)
            }
        };

        if is_module {
            SourceKind::Module
        } else {
            SourceKind::Script
        }
    }
}

/// The `import.meta.url` for a top-level input. Names that already look like
/// URLs are kept as they are.
pub fn module_url(filename: &str) -> String {
    if filename.contains(':') {
        return filename.to_string();
    }

    match fs_err::canonicalize(filename) {
        Ok(path) => format!("file://{}", path.display()),
        Err(_) => format!("file://{filename}"),
    }
}

/// Evaluate `source` under `filename`.
///
/// Modules are compiled first, get their `import.meta` stamped, then run, and
/// their top-level promise is awaited. On failure the exception is printed to
/// stderr and an eval error is returned.
#[instrument(skip(ctx, source), fields(len = source.len()))]
pub fn eval_buf(ctx: &Ctx, source: &[u8], filename: &str, kind: SourceKind) -> Result<()> {
    let strip = host::strip_flags(ctx);

    let outcome = match kind {
        SourceKind::Script => compile::eval_script(ctx, source, filename, strip).map(drop),
        SourceKind::Module => compile::compile_module(ctx, source, filename, strip).and_then(|module| {
            compile::set_import_meta(ctx, &module, &module_url(filename), true)?;
            let promise = compile::run_compiled(ctx, &module)?;
            event_loop::await_value(ctx, promise).map(drop)
        }),
    };

    outcome.map_err(|e| {
        report_error(ctx, &e);
        debug!(filename, "evaluation failed");
        Box::new(QjsError::new_eval(format!("evaluation of {filename} failed")))
    })
}

/// Read `filename` and evaluate it. Read failures are I/O errors.
pub fn eval_file(ctx: &Ctx, filename: &str, mode: ModuleMode) -> Result<()> {
    let source = fs_err::read(Path::new(filename))?;
    let kind = SourceKind::resolve(mode, filename, &source);
    debug!(filename, ?kind, "evaluating file");

    eval_buf(ctx, &source, filename, kind)
}
