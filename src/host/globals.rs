//! Global helpers for scripts: `console.log`, `print` and `scriptArgs`.

use std::io::{self, Write};

use itertools::Itertools;
use rquickjs::{function::Rest, Coerced, Ctx, Function, Object, Value};

/// Write the arguments space-separated, with a trailing newline, to stdout.
pub fn print_values<'js>(values: Rest<Value<'js>>) -> rquickjs::Result<()> {
    let line = values
        .0
        .iter()
        .map(|value| value.get::<Coerced<String>>().map(|text| text.0))
        .collect::<rquickjs::Result<Vec<_>>>()?
        .iter()
        .join(" ");

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{line}")?;

    Ok(())
}

/// Install the helpers on `ctx`'s global object. `script_argv` becomes
/// `scriptArgs`.
pub fn add_helpers<'js>(ctx: &Ctx<'js>, script_argv: &[String]) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    let console = Object::new(ctx.clone())?;
    console.set(
        "log",
        Function::new(ctx.clone(), |values: Rest<Value<'js>>| print_values(values))?
            .with_name("log")?,
    )?;
    globals.set("console", console)?;

    globals.set(
        "print",
        Function::new(ctx.clone(), |values: Rest<Value<'js>>| print_values(values))?
            .with_name("print")?,
    )?;

    globals.set("scriptArgs", script_argv.to_vec())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::with_host_context;

    #[test]
    fn test_script_args() {
        with_host_context(|ctx| {
            add_helpers(&ctx, &["main.js".to_string(), "-x".to_string()]).unwrap();
            let args: Vec<String> = ctx.eval("scriptArgs").unwrap();
            assert_eq!(args, vec!["main.js", "-x"]);
        });
    }

    #[test]
    fn test_helpers_are_functions() {
        with_host_context(|ctx| {
            add_helpers(&ctx, &[]).unwrap();
            let kinds: String = ctx
                .eval("[typeof console.log, typeof print, print.name].join(',')")
                .unwrap();
            assert_eq!(kinds, "function,function,print");
        });
    }

    #[test]
    fn test_unprintable_argument_throws() {
        with_host_context(|ctx| {
            add_helpers(&ctx, &[]).unwrap();
            let caught: bool = ctx
                .eval("try { print(Symbol('s')); false } catch (e) { e instanceof TypeError }")
                .unwrap();
            assert!(caught);
        });
    }
}
