//! Printing engine exceptions the way the engine's own host does: the value
//! coerced to a string, then the stack for `Error` objects.

use std::io::{self, Write};

use rquickjs::{Coerced, Ctx, Value};

/// Text shown when an exception cannot be turned into a string.
const UNPRINTABLE: &str = "[exception]";

/// Write `exception` to `writer`.
pub fn write_exception<W>(writer: &mut W, exception: &Value) -> io::Result<()>
where
    W: Write + ?Sized,
{
    match exception.get::<Coerced<String>>() {
        Ok(text) => writeln!(writer, "{}", text.0)?,
        Err(_) => {
            // the failed coercion left its own exception pending
            let _ = exception.ctx().catch();
            writeln!(writer, "{UNPRINTABLE}")?
        }
    }

    if exception.is_error() {
        if let Some(stack) = exception
            .as_object()
            .and_then(|error| error.get::<_, Option<Coerced<String>>>("stack").ok())
            .flatten()
        {
            write!(writer, "{}", stack.0)?;
            if !stack.0.ends_with('\n') {
                writeln!(writer)?;
            }
        }
    }

    Ok(())
}

/// Take the pending exception from `ctx` and print it to stderr.
pub fn dump_error(ctx: &Ctx) {
    let exception = ctx.catch();
    // nowhere left to report a failed stderr write
    let _ = write_exception(&mut io::stderr().lock(), &exception);
}

/// Print a non-exception engine failure to stderr.
pub fn dump_engine_error(error: &rquickjs::Error) {
    eprintln!("{error}");
}

/// Print whatever `error` stands for: the pending exception when it is one,
/// the engine error otherwise.
pub fn report_error(ctx: &Ctx, error: &rquickjs::Error) {
    match error {
        rquickjs::Error::Exception => dump_error(ctx),
        other => dump_engine_error(other),
    }
}
