#![forbid(unsafe_code)]

use std::{io::Write, process};

use qjs_rs::{
    cli::{self, Invocation},
    eval::compile::engine_version,
    runtime::Driver,
};
use qjs_rs_errors::QjsError;
use qjs_rs_utils::{config::ConfigBuilder, logging::init_tracing_subscriber};
use tracing::debug;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn print_usage() {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(cli::usage(&engine_version()).as_bytes());
    let _ = stdout.flush();
}

fn fail(error: &QjsError) -> ! {
    let _ = std::io::stdout().flush();
    error.emit_diagnostics();
    if error.shows_help() {
        print_usage();
    }
    process::exit(error.exit_code());
}

fn main() {
    let mut builder = ConfigBuilder::default();
    builder.load_env(None::<&str>);

    let args = match cli::utf8_args(std::env::args_os().skip(1)) {
        Ok(args) => args,
        Err(e) => fail(&e),
    };

    let config = match cli::parse_args_with(builder, args) {
        Ok(Invocation::Run(config)) => config,
        Ok(Invocation::Help) => {
            print_usage();
            process::exit(1);
        }
        Err(e) => fail(&e),
    };

    if let Err(e) = init_tracing_subscriber(&config) {
        e.emit_diagnostics();
    }

    debug!(?config, "starting");

    if let Err(e) = Driver::new(config).run() {
        fail(&e);
    }
}
