//! Compiles `js/repl.js` to engine bytecode, embedded by `src/repl.rs`.

use std::{env, fs, path::PathBuf, process};

use rquickjs::{module::ModuleDef, Context, Module, Runtime};

const REPL_SOURCE: &str = "js/repl.js";

/// Stands in for a native module so imports resolve while compiling. The real
/// module is linked in when the bytecode is loaded.
struct Placeholder;

impl ModuleDef for Placeholder {}

/// Bytecode is written in the target's byte order, which may not be the host's.
fn swap_endianness() -> bool {
    let target_big = env::var("CARGO_CFG_TARGET_ENDIAN")
        .map_or(cfg!(target_endian = "big"), |endian| endian == "big");
    target_big != cfg!(target_endian = "big")
}

fn compile(source: &str) -> rquickjs::Result<Vec<u8>> {
    let rt = Runtime::new()?;
    let context = Context::full(&rt)?;

    context.with(|ctx| {
        Module::declare_def::<Placeholder, _>(ctx.clone(), "std")?;
        Module::declare_def::<Placeholder, _>(ctx.clone(), "os")?;

        let module = Module::declare(ctx.clone(), "<repl>", source).map_err(|e| {
            if e.is_exception() {
                eprintln!("{:?}", ctx.catch());
            }
            e
        })?;

        module.write(swap_endianness())
    })
}

fn main() {
    println!("cargo:rerun-if-changed={REPL_SOURCE}");
    println!("cargo:rerun-if-changed=build.rs");

    let source = match fs::read_to_string(REPL_SOURCE) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("cannot read {REPL_SOURCE}: {e}");
            process::exit(1);
        }
    };

    let bytecode = match compile(&source) {
        Ok(bytecode) => bytecode,
        Err(e) => {
            eprintln!("cannot compile {REPL_SOURCE}: {e}");
            process::exit(1);
        }
    };

    let out_dir = match env::var_os("OUT_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            eprintln!("OUT_DIR is not set");
            process::exit(1);
        }
    };

    if let Err(e) = fs::write(out_dir.join("repl.bin"), bytecode) {
        eprintln!("cannot write repl.bin: {e}");
        process::exit(1);
    }
}
