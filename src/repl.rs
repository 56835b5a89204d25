//! The interactive REPL, precompiled from `js/repl.js` at build time.

use rquickjs::{Ctx, Result};
use tracing::debug;

use crate::{eval::compile, host::event_loop};

/// Engine bytecode for the REPL module.
pub static REPL_BYTECODE: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/repl.bin"));

/// Load and run precompiled bytecode. Modules are linked, stamped as the main
/// module, evaluated, and their top-level promise awaited.
pub fn eval_binary(ctx: &Ctx, bytecode: &[u8]) -> Result<()> {
    let compiled = compile::read_bytecode(ctx, bytecode)?;
    compile::resolve_module(ctx, &compiled)?;
    compile::set_import_meta(ctx, &compiled, "<repl>", true)?;

    let result = compile::run_compiled(ctx, &compiled)?;
    event_loop::await_value(ctx, result)?;

    Ok(())
}

/// Run the REPL until end of input or `.quit`.
pub fn run(ctx: &Ctx) -> Result<()> {
    debug!(len = REPL_BYTECODE.len(), "starting REPL");
    eval_binary(ctx, REPL_BYTECODE)
}
