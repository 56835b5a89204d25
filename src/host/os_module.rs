//! The `os` native module: timers, sleeping, the clock and a little about the
//! host platform.

use std::{thread, time::Duration, time::Instant};

use once_cell::sync::Lazy;
use rquickjs::{
    function::Opt,
    module::{Declarations, Exports, ModuleDef},
    Ctx, Exception, Function, Persistent, Result,
};
use tracing::trace;

use crate::host::HostState;

/// Process start, as far as `os.now()` is concerned.
static START: Lazy<Instant> = Lazy::new(Instant::now);

const EXPORTS: &[&str] = &[
    "setTimeout",
    "clearTimeout",
    "sleep",
    "now",
    "platform",
    "getcwd",
];

pub struct OsModule;

impl ModuleDef for OsModule {
    fn declare(decl: &Declarations) -> Result<()> {
        for name in EXPORTS {
            decl.declare(*name)?;
        }

        Ok(())
    }

    fn evaluate<'js>(ctx: &Ctx<'js>, exports: &Exports<'js>) -> Result<()> {
        Lazy::force(&START);

        exports.export(
            "setTimeout",
            Function::new(
                ctx.clone(),
                |ctx: Ctx<'js>, callback: Function<'js>, delay: Opt<f64>| {
                    set_timeout(ctx, callback, delay.0.unwrap_or(0.0))
                },
            )?
            .with_name("setTimeout")?,
        )?;
        exports.export(
            "clearTimeout",
            Function::new(ctx.clone(), |ctx: Ctx<'js>, id: i32| clear_timeout(&ctx, id))?
                .with_name("clearTimeout")?,
        )?;
        exports.export(
            "sleep",
            Function::new(ctx.clone(), sleep)?.with_name("sleep")?,
        )?;
        exports.export("now", Function::new(ctx.clone(), now)?.with_name("now")?)?;
        exports.export("platform", platform())?;
        exports.export(
            "getcwd",
            Function::new(ctx.clone(), getcwd)?.with_name("getcwd")?,
        )?;

        Ok(())
    }
}

/// Clamp a script-supplied millisecond count to a duration. Negative and
/// non-finite counts are zero, as the engine's integer conversion makes them.
fn millis(ms: f64) -> Duration {
    if !ms.is_finite() || ms <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX)
}

fn set_timeout<'js>(ctx: Ctx<'js>, callback: Function<'js>, delay: f64) -> Result<i32> {
    let Some(state) = ctx.userdata::<HostState>() else {
        return Err(Exception::throw_internal(&ctx, "timers are not available"));
    };

    let callback = Persistent::save(&ctx, callback);
    let id = state.timers.lock().schedule(callback, millis(delay));
    trace!(id, delay, "timer scheduled");

    Ok(id)
}

fn clear_timeout(ctx: &Ctx, id: i32) {
    let cancelled = ctx
        .userdata::<HostState>()
        .and_then(|state| state.timers.lock().cancel(id));

    // dropped here, while the runtime is alive
    drop(cancelled);
}

fn sleep(ms: f64) {
    thread::sleep(millis(ms));
}

/// Milliseconds since the module was first evaluated, with sub-millisecond
/// precision.
fn now() -> f64 {
    START.elapsed().as_secs_f64() * 1000.0
}

/// The platform name as scripts written for the engine's own host expect it.
fn platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

fn getcwd() -> Result<String> {
    Ok(std::env::current_dir()?.display().to_string())
}
