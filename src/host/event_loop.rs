//! Pumping the engine's job queue and the host's timers.

use std::{ptr, thread, time::Instant};

use rquickjs::{function::This, promise::PromiseState, qjs, Ctx, Function, Promise, Value};
use tracing::{trace, warn};

use crate::{eval::exception::dump_error, host::HostState};

/// The result of one attempt to run a pending engine job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// The queue was empty.
    Idle,
    Ran,
    /// The job threw. The exception has been printed.
    Failed,
}

/// Run a single pending job, if there is one.
pub fn execute_pending_job(ctx: &Ctx) -> JobStatus {
    let mut job_ctx = ptr::null_mut();

    // SAFETY: `ctx` is live and its runtime is locked for the duration of `with`
    let status = unsafe {
        let rt = qjs::JS_GetRuntime(ctx.as_raw().as_ptr());
        qjs::JS_ExecutePendingJob(rt, &mut job_ctx)
    };

    match status {
        0 => JobStatus::Idle,
        s if s > 0 => JobStatus::Ran,
        _ => {
            dump_error(ctx);
            JobStatus::Failed
        }
    }
}

/// Run every job that is ready, then every timer that is already due. Never
/// sleeps.
pub fn run_ready(ctx: &Ctx) {
    loop {
        while execute_pending_job(ctx) != JobStatus::Idle {}

        if !fire_due_timer(ctx, Instant::now()) {
            break;
        }
    }
}

/// Take one step: run a pending job if there is one, otherwise wait for the
/// earliest timer and fire it. Returns `false` once there is nothing left to do.
pub fn run_once(ctx: &Ctx) -> bool {
    if execute_pending_job(ctx) != JobStatus::Idle {
        return true;
    }

    let Some(deadline) = next_timer_deadline(ctx) else {
        return false;
    };

    let now = Instant::now();
    if deadline > now {
        trace!(wait = ?(deadline - now), "sleeping until the next timer");
        thread::sleep(deadline - now);
    }

    fire_due_timer(ctx, Instant::now());
    true
}

/// Drain jobs and timers until both are empty.
pub fn run_until_idle(ctx: &Ctx) {
    while run_once(ctx) {}
}

/// Pump the loop until `value` settles, if it is a promise. Returns the
/// fulfilled value, or `Err(Exception)` with the rejection reason thrown.
/// A rejection taken this way counts as handled, so the rejection tracker
/// does not report it again.
///
/// A promise that can never settle, because nothing is left to run, is taken
/// as done and yields `undefined`.
pub fn await_value<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<Value<'js>> {
    let Some(promise) = value.as_promise().cloned() else {
        return Ok(value);
    };

    loop {
        match promise.state() {
            PromiseState::Pending => {
                if !run_once(ctx) {
                    warn!("awaited promise can never settle");
                    return Ok(Value::new_undefined(ctx.clone()));
                }
            }
            PromiseState::Resolved => {
                return promise
                    .result::<Value>()
                    .unwrap_or_else(|| Ok(Value::new_undefined(ctx.clone())));
            }
            PromiseState::Rejected => {
                mark_handled(ctx, &promise)?;
                return promise
                    .result::<Value>()
                    .unwrap_or_else(|| Ok(Value::new_undefined(ctx.clone())));
            }
        }
    }
}

/// Attach an empty rejection handler to `promise`.
fn mark_handled<'js>(ctx: &Ctx<'js>, promise: &Promise<'js>) -> rquickjs::Result<()> {
    let ignore = Function::new(ctx.clone(), || ())?;
    let _: Value = promise.catch()?.call((This(promise.clone()), ignore))?;
    Ok(())
}

fn next_timer_deadline(ctx: &Ctx) -> Option<Instant> {
    let state = ctx.userdata::<HostState>()?;
    let deadline = state.timers.lock().next_deadline();
    deadline
}

/// Fire the earliest timer if it is due. Returns `true` if one fired.
fn fire_due_timer(ctx: &Ctx, now: Instant) -> bool {
    let timer = {
        let Some(state) = ctx.userdata::<HostState>() else {
            return false;
        };
        let timer = state.timers.lock().pop_due(now);
        timer
    };

    let Some(timer) = timer else {
        return false;
    };

    trace!(id = timer.id, "firing timer");

    let outcome = timer
        .callback
        .restore(ctx)
        .and_then(|callback: Function| callback.call::<_, Value>(()));

    if outcome.is_err() {
        dump_error(ctx);
    }

    true
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use qjs_rs_utils::config::StripFlags;
    use rquickjs::{Context, Runtime};

    use super::*;
    use crate::host::{new_context, HostHandlers};

    fn with_host<F>(f: F)
    where
        F: for<'js> FnOnce(Ctx<'js>),
    {
        let rt = Runtime::new().unwrap();
        let handlers = HostHandlers::init(StripFlags::None);
        let context: Context = new_context(&rt, &handlers).unwrap();
        context.with(f);
        handlers.release(&context);
    }

    #[test]
    fn test_execute_pending_job() {
        with_host(|ctx| {
            let _: () = ctx
                .eval(indoc! { r#"
                    globalThis.order = [];
                    Promise.resolve().then(() => order.push("job"));
                "# })
                .unwrap();
            assert_eq!(execute_pending_job(&ctx), JobStatus::Ran);
            assert_eq!(execute_pending_job(&ctx), JobStatus::Idle);

            let order: Vec<String> = ctx.eval("order").unwrap();
            assert_eq!(order, vec!["job"]);
        });
    }

    #[test]
    fn test_throwing_reaction_still_runs() {
        with_host(|ctx| {
            let _: () = ctx
                .eval("Promise.resolve().then(() => { throw new Error('boom'); });")
                .unwrap();
            // a throwing reaction rejects its derived promise instead of failing the job
            assert_eq!(execute_pending_job(&ctx), JobStatus::Ran);
        });
    }

    #[test]
    fn test_await_value_passes_plain_values_through() {
        with_host(|ctx| {
            let value: Value = ctx.eval("42").unwrap();
            let result = await_value(&ctx, value).unwrap();
            assert_eq!(result.as_int(), Some(42));
        });
    }

    #[test]
    fn test_await_value_resolves() {
        with_host(|ctx| {
            let value: Value = ctx
                .eval("new Promise(resolve => resolve(7)).then(x => x * 6)")
                .unwrap();
            let result = await_value(&ctx, value).unwrap();
            assert_eq!(result.as_int(), Some(42));
        });
    }

    #[test]
    fn test_await_value_rejects() {
        with_host(|ctx| {
            let value: Value = ctx.eval("Promise.reject(new Error('nope'))").unwrap();
            assert!(await_value(&ctx, value).is_err());

            let thrown = ctx.catch();
            let message: String = thrown.as_object().unwrap().get("message").unwrap();
            assert_eq!(message, "nope");
        });
    }

    #[test]
    fn test_never_settling_promise_is_done() {
        with_host(|ctx| {
            let value: Value = ctx.eval("new Promise(() => {})").unwrap();
            let result = await_value(&ctx, value).unwrap();
            assert!(result.is_undefined());
        });
    }
}
