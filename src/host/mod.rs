//! Host glue installed around every context: the `std` and `os` native
//! modules, the global helpers, timers, the module loader and the rejection
//! tracker.

use parking_lot::Mutex;
use qjs_rs_utils::config::StripFlags;
use rquickjs::{Context, Ctx, JsLifetime, Module, Runtime};
use tracing::{debug, warn};

pub mod event_loop;
pub mod globals;
pub mod loader;
pub mod os_module;
pub mod rejection;
pub mod std_module;
pub mod timers;

use os_module::OsModule;
use std_module::StdModule;
use timers::TimerQueue;

/// Builds a context under a runtime and registers the host modules on it.
/// Installed on the driver before the first context exists, so every context
/// it builds is configured the same way.
pub type ContextFactory = fn(&Runtime, &HostHandlers) -> rquickjs::Result<Context>;

/// Per-runtime host state, stored as engine userdata.
pub struct HostState {
    pub timers: Mutex<TimerQueue>,
    strip: StripFlags,
}

unsafe impl<'js> JsLifetime<'js> for HostState {
    type Changed<'to> = HostState;
}

impl HostState {
    pub fn strip(&self) -> StripFlags {
        self.strip
    }
}

/// The host's standard handlers. Created against a runtime, attached to each
/// context, and released before the context is dropped.
#[derive(Debug, Clone, Copy)]
pub struct HostHandlers {
    strip: StripFlags,
}

impl HostHandlers {
    /// Create handlers whose contexts strip compiled code per `strip`.
    pub fn init(strip: StripFlags) -> Self {
        debug!(?strip, "host handlers initialized");
        Self { strip }
    }

    pub fn strip(&self) -> StripFlags {
        self.strip
    }

    /// Install the host state on `ctx`'s runtime, unless it is already there.
    pub fn attach(&self, ctx: &Ctx) -> rquickjs::Result<()> {
        if ctx.userdata::<HostState>().is_some() {
            return Ok(());
        }

        let state = HostState {
            timers: Mutex::new(TimerQueue::default()),
            strip: self.strip,
        };

        if ctx.store_userdata(state).is_err() {
            warn!("host state is busy and was not installed");
        }

        Ok(())
    }

    /// Drop the host state, and with it any timers still pending. Must run
    /// before the context and runtime are dropped.
    pub fn release(self, context: &Context) {
        context.with(|ctx| match ctx.remove_userdata::<HostState>() {
            Ok(Some(state)) => {
                let pending = state.timers.lock().len();
                debug!(pending, "releasing host handlers");
            }
            Ok(None) => {}
            Err(_) => warn!("host state is still borrowed at release"),
        });
    }
}

/// The strip flags in effect for code compiled under `ctx`.
pub fn strip_flags(ctx: &Ctx) -> StripFlags {
    ctx.userdata::<HostState>()
        .map_or(StripFlags::None, |state| state.strip())
}

/// The default [`ContextFactory`]: a full context with the host state and the
/// `std` and `os` modules.
pub fn new_context(rt: &Runtime, handlers: &HostHandlers) -> rquickjs::Result<Context> {
    let context = Context::full(rt)?;

    context.with(|ctx| -> rquickjs::Result<()> {
        handlers.attach(&ctx)?;
        Module::declare_def::<StdModule, _>(ctx.clone(), "std")?;
        Module::declare_def::<OsModule, _>(ctx.clone(), "os")?;
        Ok(())
    })?;

    Ok(context)
}

#[cfg(test)]
mod tests {
    use claims::assert_ok;

    use super::*;

    #[test]
    fn test_new_context_attaches_state() {
        let rt = Runtime::new().unwrap();
        let handlers = HostHandlers::init(StripFlags::Debug);
        let context = assert_ok!(new_context(&rt, &handlers));

        context.with(|ctx| {
            assert_eq!(strip_flags(&ctx), StripFlags::Debug);
        });

        handlers.release(&context);

        context.with(|ctx| {
            assert!(ctx.userdata::<HostState>().is_none());
            assert_eq!(strip_flags(&ctx), StripFlags::None);
        });
    }

    #[test]
    fn test_attach_is_idempotent() {
        let rt = Runtime::new().unwrap();
        let handlers = HostHandlers::init(StripFlags::None);
        let context = new_context(&rt, &handlers).unwrap();

        context.with(|ctx| {
            let other = HostHandlers {
                strip: StripFlags::Source,
            };
            assert_ok!(other.attach(&ctx));
            assert_eq!(strip_flags(&ctx), StripFlags::None);
        });

        handlers.release(&context);
    }
}
