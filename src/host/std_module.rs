//! The `std` native module.

use std::io::{self, BufRead, Write};

use rquickjs::{
    module::{Declarations, Exports, ModuleDef},
    Coerced, Ctx, Function, Result, Value,
};
use tracing::debug;

use crate::{
    compile_time_config::EVAL_SCRIPT_NAME,
    eval::compile,
    host,
};

/// Exported names, in declaration order.
const EXPORTS: &[&str] = &[
    "exit",
    "getenv",
    "loadFile",
    "evalScript",
    "puts",
    "getline",
    "gc",
];

pub struct StdModule;

impl ModuleDef for StdModule {
    fn declare(decl: &Declarations) -> Result<()> {
        for name in EXPORTS {
            decl.declare(*name)?;
        }

        Ok(())
    }

    fn evaluate<'js>(ctx: &Ctx<'js>, exports: &Exports<'js>) -> Result<()> {
        exports.export("exit", Function::new(ctx.clone(), exit)?.with_name("exit")?)?;
        exports.export(
            "getenv",
            Function::new(ctx.clone(), getenv)?.with_name("getenv")?,
        )?;
        exports.export(
            "loadFile",
            Function::new(ctx.clone(), load_file)?.with_name("loadFile")?,
        )?;
        exports.export(
            "evalScript",
            Function::new(ctx.clone(), |ctx: Ctx<'js>, source: Coerced<String>| {
                eval_script(ctx, source.0)
            })?
            .with_name("evalScript")?,
        )?;
        exports.export(
            "puts",
            Function::new(ctx.clone(), |text: Coerced<String>| puts(&text.0))?.with_name("puts")?,
        )?;
        exports.export(
            "getline",
            Function::new(ctx.clone(), getline)?.with_name("getline")?,
        )?;
        exports.export(
            "gc",
            Function::new(ctx.clone(), |ctx: Ctx<'js>| ctx.run_gc())?.with_name("gc")?,
        )?;

        Ok(())
    }
}

/// Flush stdout and end the process with `code`.
fn exit(code: i32) {
    debug!(code, "script requested exit");
    let _ = io::stdout().flush();
    std::process::exit(code);
}

fn getenv(name: String) -> Option<String> {
    std::env::var(name).ok()
}

/// The file's contents, or `null` if it cannot be read as text.
fn load_file(path: String) -> Option<String> {
    fs_err::read_to_string(path).ok()
}

/// Evaluate `source` as a global script. Strip flags apply as they do to
/// top-level inputs.
fn eval_script(ctx: Ctx<'_>, source: String) -> Result<Value<'_>> {
    let strip = host::strip_flags(&ctx);
    compile::eval_script(&ctx, source.as_bytes(), EVAL_SCRIPT_NAME, strip)
}

fn puts(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;

    Ok(())
}

/// Read one line from stdin, without its line ending. `null` at end of input.
fn getline() -> Result<Option<String>> {
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }

    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);

    Ok(Some(line))
}
