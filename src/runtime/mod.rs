//! The runtime driver: builds the engine from a [`Config`], evaluates the
//! configured inputs, and tears everything down in order.

use std::{
    fmt,
    io::{self, Write},
};

use qjs_rs_errors::{QjsError, Result};
use qjs_rs_utils::config::Config;
use rquickjs::{Context, Ctx, Runtime};
use tracing::{debug, info_span, trace, warn};

use crate::{
    allocator::{AllocHandle, TraceAllocator},
    compile_time_config::{BENCH_ITERATIONS, CMDLINE_NAME, STD_SHIM_NAME, STD_SHIM_SOURCE},
    eval::{self, compile::engine_version, exception::report_error, SourceKind},
    host::{
        event_loop,
        globals::add_helpers,
        loader::{FsLoader, FsResolver},
        new_context,
        rejection::RejectionTracker,
        ContextFactory, HostHandlers,
    },
    repl,
};

pub mod bench;
pub mod memory_report;

use memory_report::MemoryReport;

/// Runs one `qjs` invocation.
pub struct Driver {
    config: Config,
    factory: ContextFactory,
}

impl Driver {
    /// Create a driver that builds its contexts with [`new_context`].
    pub fn new(config: Config) -> Self {
        Self {
            config,
            factory: new_context,
        }
    }

    /// Replace the context factory. Every context the driver creates goes
    /// through it.
    pub fn with_context_factory(mut self, factory: ContextFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn new_runtime(&self) -> Result<(Runtime, Option<AllocHandle>)> {
        let config = &self.config;

        let built = if config.trace_memory {
            let allocator = TraceAllocator::new(config.memory_limit_bytes);
            let handle = allocator.handle();
            Runtime::new_with_alloc(allocator).map(|rt| (rt, Some(handle)))
        } else {
            Runtime::new().map(|rt| (rt, None))
        };

        let (rt, handle) = built.map_err(|e| {
            debug!(%e, "runtime construction failed");
            Box::new(QjsError::new_engine("cannot allocate JS runtime"))
        })?;

        if config.memory_limit_bytes != 0 {
            rt.set_memory_limit(config.memory_limit_bytes);
        }

        if config.stack_size_bytes != 0 {
            rt.set_max_stack_size(config.stack_size_bytes);
        }

        Ok((rt, handle))
    }

    /// Run the invocation to completion. Teardown happens on every path.
    pub fn run(&self) -> Result<()> {
        let config = &self.config;
        let _span = info_span!("runtime").entered();

        let (rt, alloc) = self.new_runtime()?;
        let handlers = HostHandlers::init(config.strip_flags);

        let context = (self.factory)(&rt, &handlers).map_err(|e| {
            debug!(%e, "context construction failed");
            Box::new(QjsError::new_engine("cannot allocate JS context"))
        })?;

        rt.set_loader(FsResolver, FsLoader);

        let tracker = config.track_unhandled_rejections.then(RejectionTracker::new);
        if let Some(tracker) = &tracker {
            tracker.install(&rt);
        }

        let outcome = if config.empty_run {
            Ok(())
        } else {
            context.with(|ctx| self.run_inputs(&ctx, tracker.as_ref()))
        };

        if let Some(tracker) = &tracker {
            tracker.flush();
        }

        if outcome.is_ok() && config.dump_memory {
            let usage = rt.memory_usage();
            print_memory_report(&MemoryReport::new(&usage, engine_version()));
        }

        {
            let _span = info_span!("teardown").entered();
            if let Some(tracker) = &tracker {
                tracker.detach();
            }
            handlers.release(&context);
            drop(context);
            trace!("context freed");
            drop(rt);
            trace!("runtime freed");

            if let Some(alloc) = alloc {
                let stats = alloc.stats();
                debug!(
                    live_count = stats.live_count,
                    live_bytes = stats.live_bytes,
                    "allocator books after teardown"
                );
            }
        }

        if outcome.is_ok() && config.empty_run && config.dump_memory {
            let times = bench::measure(BENCH_ITERATIONS)?;
            println!("{times}");
        }

        outcome
    }

    /// Everything that happens inside the main context: helpers, the `std`
    /// shim, includes, the main input, the REPL, and the final drain.
    fn run_inputs(&self, ctx: &Ctx, tracker: Option<&RejectionTracker>) -> Result<()> {
        let config = &self.config;
        let _span = info_span!("eval").entered();

        add_helpers(ctx, &config.script_argv)?;

        if config.load_std {
            // a failed shim leaves the globals unset, and the inputs find out
            if eval::eval_buf(ctx, STD_SHIM_SOURCE.as_bytes(), STD_SHIM_NAME, SourceKind::Module)
                .is_err()
            {
                warn!("std shim failed to load");
            }
        }

        for file in &config.include_files {
            eval::eval_file(ctx, file, config.module_mode)?;
        }

        if let Some(expression) = &config.expression {
            eval::eval_buf(ctx, expression.as_bytes(), CMDLINE_NAME, SourceKind::Script)?;
        } else if let Some(path) = &config.script_path {
            eval::eval_file(ctx, path, config.module_mode)?;
        }

        if config.runs_interactive() {
            if let Some(tracker) = tracker {
                tracker.flush();
                tracker.detach();
            }

            repl::run(ctx).map_err(|e| {
                report_error(ctx, &e);
                Box::new(QjsError::new_eval("the REPL failed"))
            })?;
        }

        event_loop::run_until_idle(ctx);

        Ok(())
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn print_memory_report(report: &MemoryReport) {
    let mut stdout = io::stdout().lock();
    // nowhere left to report a failed stdout write
    let _ = write!(stdout, "{report}");

    if let Some(resident) = memory_report::host_resident() {
        let _ = writeln!(stdout, "{:<20} {:>8} {:>8}", "host resident", "", resident);
    }
    let _ = stdout.flush();
}

#[cfg(test)]
mod tests {
    use claims::assert_ok;
    use qjs_rs_errors::ErrorKind;
    use qjs_rs_utils::config::ConfigBuilder;

    use super::*;

    fn driver(builder: &mut ConfigBuilder) -> Driver {
        Driver::new(builder.build().unwrap())
    }

    #[test]
    fn test_expression() {
        let result = driver(ConfigBuilder::default().expression("1 + 2")).run();
        assert_ok!(result);
    }

    #[test]
    fn test_eval_failure() {
        let err = driver(ConfigBuilder::default().expression("throw new Error('x')"))
            .run()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Eval);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_missing_script_is_io() {
        let err = driver(ConfigBuilder::default().script_path("/no/such/script.js"))
            .run()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
    }

    #[test]
    fn test_empty_run() {
        assert_ok!(driver(ConfigBuilder::default().empty_run(true)).run());
    }

    #[test]
    fn test_memory_limit() {
        let err = driver(
            ConfigBuilder::default()
                .memory_limit_bytes(4 * 1024 * 1024)
                .expression("var a = []; for (;;) a.push({})"),
        )
        .run()
        .unwrap_err();
        assert!(err.is_eval());
    }

    #[test]
    fn test_context_factory_is_used() {
        fn failing(_rt: &Runtime, _handlers: &HostHandlers) -> rquickjs::Result<Context> {
            Err(rquickjs::Error::Allocation)
        }

        let err = driver(ConfigBuilder::default().expression("1"))
            .with_context_factory(failing)
            .run()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Engine);
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.message(), "cannot allocate JS context");
    }

    #[test]
    fn test_includes_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.js");
        let second = dir.path().join("second.js");
        fs_err::write(&first, "globalThis.order = ['first'];").unwrap();
        fs_err::write(&second, "order.push('second');").unwrap();

        let mut builder = ConfigBuilder::default();
        builder
            .include_file(first.to_str().unwrap())
            .include_file(second.to_str().unwrap())
            .expression("if (order.join() !== 'first,second') throw new Error(order.join())");
        assert_ok!(driver(&mut builder).run());
    }

    #[test]
    fn test_failed_include_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.js");
        fs_err::write(&bad, "throw 1;").unwrap();

        let mut builder = ConfigBuilder::default();
        builder
            .include_file(bad.to_str().unwrap())
            .expression("globalThis.unreachable = true");
        let err = driver(&mut builder).run().unwrap_err();
        assert!(err.is_eval());
    }

    #[test]
    fn test_failed_std_shim_only_warns() {
        fn without_native_modules(rt: &Runtime, handlers: &HostHandlers) -> rquickjs::Result<Context> {
            let context = Context::full(rt)?;
            context.with(|ctx| handlers.attach(&ctx))?;
            Ok(context)
        }

        let mut builder = ConfigBuilder::default();
        builder
            .load_std(true)
            .expression("if (typeof std !== 'undefined') throw new Error('std was published')");
        let result = driver(&mut builder)
            .with_context_factory(without_native_modules)
            .run();
        assert_ok!(result);
    }

    #[test]
    fn test_std_shim() {
        let mut builder = ConfigBuilder::default();
        builder
            .load_std(true)
            .expression("if (typeof std.getenv !== 'function' || typeof os.now !== 'function') throw 0");
        assert_ok!(driver(&mut builder).run());
    }
}
