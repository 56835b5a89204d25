//! The `qjs` argument walker.
//!
//! Everything from the first operand onward belongs to the script, including
//! tokens that look like options, so this walks `argv` by hand instead of
//! handing it to an option library.

use std::ffi::OsString;

use qjs_rs_errors::{QjsError, Result};
use qjs_rs_utils::{
    config::{Config, ConfigBuilder, ModuleMode, StripFlags},
    size::parse_size,
};
use tracing::trace;

use crate::compile_time_config::{MAX_INCLUDE_FILES, PROG_NAME};

/// What the command line asked for.
#[derive(Debug)]
pub enum Invocation {
    /// Run with this configuration.
    Run(Config),
    /// Print usage and exit 1.
    Help,
}

/// Every option the walker recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opt {
    Help,
    Eval,
    Include,
    Interactive,
    Module,
    Script,
    Dump,
    Trace,
    Std,
    NoUnhandledRejection,
    Quit,
    MemoryLimit,
    StackSize,
    StripDebug,
    StripSource,
}

impl Opt {
    fn from_short(c: char) -> Option<Self> {
        let opt = match c {
            'h' | '?' => Opt::Help,
            'e' => Opt::Eval,
            'I' => Opt::Include,
            'i' => Opt::Interactive,
            'm' => Opt::Module,
            'd' => Opt::Dump,
            'T' => Opt::Trace,
            'q' => Opt::Quit,
            's' => Opt::StripDebug,
            _ => return None,
        };

        Some(opt)
    }

    fn from_long(name: &str) -> Option<Self> {
        let opt = match name {
            "help" => Opt::Help,
            "eval" => Opt::Eval,
            "include" => Opt::Include,
            "interactive" => Opt::Interactive,
            "module" => Opt::Module,
            "script" => Opt::Script,
            "dump" => Opt::Dump,
            "trace" => Opt::Trace,
            "std" => Opt::Std,
            "no-unhandled-rejection" => Opt::NoUnhandledRejection,
            "quit" => Opt::Quit,
            "memory-limit" => Opt::MemoryLimit,
            "stack-size" => Opt::StackSize,
            "strip-source" => Opt::StripSource,
            _ => return None,
        };

        Some(opt)
    }

    /// The diagnostic for a missing argument, and its exit status.
    fn missing_argument(self) -> Box<QjsError> {
        let error = match self {
            Opt::Eval => QjsError::new("missing expression for -e").with_exit_code(2),
            Opt::Include => QjsError::new("expecting filename"),
            Opt::MemoryLimit => QjsError::new("expecting memory limit"),
            Opt::StackSize => QjsError::new("expecting stack size"),
            opt => unreachable!("{opt:?} takes no argument"),
        };

        Box::new(error)
    }
}

/// A cursor over `argv`, with `argv[0]` already removed.
#[derive(Debug)]
struct ArgCursor<'a> {
    args: &'a [String],
    optind: usize,
}

impl<'a> ArgCursor<'a> {
    fn new(args: &'a [String]) -> Self {
        Self { args, optind: 0 }
    }

    fn peek(&self) -> Option<&'a str> {
        self.args.get(self.optind).map(String::as_str)
    }

    /// Consume and return the next token, if any.
    fn next_token(&mut self) -> Option<&'a str> {
        let token = self.peek()?;
        self.optind += 1;
        Some(token)
    }

    /// Everything not consumed by option scanning.
    fn rest(&self) -> &'a [String] {
        &self.args[self.optind..]
    }
}

/// Whether an applied option ends the walk.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Stop scanning the current short cluster.
    EndCluster,
    Help,
}

/// Parse `args` (without the program name) into an [`Invocation`].
pub fn parse_args<I, S>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parse_args_with(ConfigBuilder::default(), args)
}

/// Parse `args` on top of a builder that may already carry ambient settings,
/// such as logging values from the environment.
pub fn parse_args_with<I, S>(mut builder: ConfigBuilder, args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args = args.into_iter().map(Into::into).collect::<Vec<String>>();
    let mut cursor = ArgCursor::new(&args);

    while let Some(token) = cursor.peek() {
        // operands, and a bare `-`, stay in the script's argv
        let Some(body) = token.strip_prefix('-') else {
            break;
        };
        if body.is_empty() {
            break;
        }
        cursor.next_token();

        if let Some(name) = body.strip_prefix('-') {
            if name.is_empty() {
                break;
            }

            let Some(opt) = Opt::from_long(name) else {
                return Err(unknown_option(&format!("--{name}")));
            };

            if apply(opt, None, &mut cursor, &mut builder)? == Flow::Help {
                return Ok(Invocation::Help);
            }

            continue;
        }

        let mut cluster = body;
        while let Some(c) = cluster.chars().next() {
            cluster = &cluster[c.len_utf8()..];

            let Some(opt) = Opt::from_short(c) else {
                return Err(unknown_option(&format!("-{c}")));
            };

            match apply(opt, Some(cluster), &mut cursor, &mut builder)? {
                Flow::Continue => {}
                Flow::EndCluster => break,
                Flow::Help => return Ok(Invocation::Help),
            }
        }
    }

    let operands = cursor.rest();
    trace!(optind = cursor.optind, ?operands, "option scan finished");

    if !builder.has_expression() {
        match operands.first() {
            Some(path) => {
                builder.script_path(path.clone());
            }
            None => {
                builder.interactive(true);
            }
        }
    }

    builder.script_argv(operands.to_vec());

    Ok(Invocation::Run(builder.build()?))
}

/// Apply one option. `inline` is the remainder of a short cluster, which only
/// `-e` takes as its argument.
fn apply(
    opt: Opt,
    inline: Option<&str>,
    cursor: &mut ArgCursor,
    builder: &mut ConfigBuilder,
) -> Result<Flow> {
    match opt {
        Opt::Help => return Ok(Flow::Help),
        Opt::Eval => {
            let expression = match inline {
                Some(rest) if !rest.is_empty() => rest,
                _ => cursor.next_token().ok_or_else(|| opt.missing_argument())?,
            };
            builder.expression(expression);
            return Ok(Flow::EndCluster);
        }
        Opt::Include => {
            let file = cursor.next_token().ok_or_else(|| opt.missing_argument())?;
            if builder.include_count() >= MAX_INCLUDE_FILES {
                return Err(Box::new(QjsError::new("too many included files")));
            }
            builder.include_file(file);
        }
        Opt::Interactive => {
            builder.interactive(true);
        }
        Opt::Module => {
            builder.module_mode(ModuleMode::Module);
        }
        Opt::Script => {
            builder.module_mode(ModuleMode::Script);
        }
        Opt::Dump => {
            builder.dump_memory(true);
        }
        Opt::Trace => {
            builder.trace_memory(true);
        }
        Opt::Std => {
            builder.load_std(true);
        }
        Opt::NoUnhandledRejection => {
            builder.track_unhandled_rejections(false);
        }
        Opt::Quit => {
            builder.empty_run(true);
        }
        Opt::MemoryLimit => {
            let value = cursor.next_token().ok_or_else(|| opt.missing_argument())?;
            builder.memory_limit_bytes(parse_size(value)?);
        }
        Opt::StackSize => {
            let value = cursor.next_token().ok_or_else(|| opt.missing_argument())?;
            builder.stack_size_bytes(parse_size(value)?);
        }
        Opt::StripDebug => {
            builder.strip_flags(StripFlags::Debug);
        }
        Opt::StripSource => {
            builder.strip_flags(StripFlags::Source);
        }
    }

    Ok(Flow::Continue)
}

/// Convert the process arguments to strings. Script code only sees strings, so
/// an argument that is not valid UTF-8 is an invocation error rather than
/// being passed on altered.
pub fn utf8_args<I>(args: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            arg.into_string().map_err(|arg| {
                Box::new(QjsError::new(format!(
                    "argument is not valid UTF-8: {}",
                    arg.to_string_lossy()
                )))
            })
        })
        .collect()
}

fn unknown_option(display: &str) -> Box<QjsError> {
    Box::new(QjsError::new(format!("unknown option '{display}'")).with_help())
}

/// The usage text printed by `--help` and after an unknown option.
pub fn usage(version: &str) -> String {
    format!(
        "QuickJS-ng version {version}\n\
         usage: {PROG_NAME} [options] [file [args]]\n\
         -h  --help         list options\n\
         -e  --eval EXPR    evaluate EXPR\n\
         -i  --interactive  go to interactive mode\n\
         -m  --module       load as ES6 module (default=autodetect)\n    \
         --script       load as ES6 script (default=autodetect)\n\
         -I  --include file include an additional file\n    \
         --std          make 'std' and 'os' available to the loaded script\n\
         -T  --trace        trace memory allocation\n\
         -d  --dump         dump the memory usage stats\n    \
         --memory-limit n  limit the memory usage to 'n' bytes (SI suffixes allowed)\n    \
         --stack-size n    limit the stack size to 'n' bytes (SI suffixes allowed)\n    \
         --no-unhandled-rejection  ignore unhandled promise rejections\n\
         -s                    strip all the debug info\n    \
         --strip-source    strip the source code\n\
         -q  --quit         just instantiate the interpreter and quit\n"
    )
}
