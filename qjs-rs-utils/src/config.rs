use std::{collections::HashMap, path::Path};

use derive_builder::Builder;
use tracing::info;

/// The most `-I` files a single invocation may name.
pub const MAX_INCLUDE_FILES: usize = 32;

/// How a source buffer is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleMode {
    /// `.mjs` files, and buffers the engine classifies as modules, are modules.
    #[default]
    Autodetect,
    Module,
    Script,
}

/// What to discard from compiled code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StripFlags {
    #[default]
    None,
    Debug,
    Source,
}

/// The configuration record for one `qjs` invocation.
#[derive(Debug, Clone, Builder)]
#[builder(build_fn(error = "qjs_rs_errors::QjsError", validate = "Self::validate"))]
#[readonly::make]
pub struct Config {
    /// Inline source given with `-e`
    #[builder(setter(into, strip_option), default = "None")]
    pub expression: Option<String>,

    /// Files evaluated, in order, before the main input
    #[builder(default = "vec![]")]
    pub include_files: Vec<String>,

    #[builder(setter(into, strip_option), default = "None")]
    pub script_path: Option<String>,

    /// Everything from the first non-option onward. `script_argv[0]` is the
    /// script name when there is one.
    #[builder(default = "vec![]")]
    pub script_argv: Vec<String>,

    #[builder(default)]
    pub module_mode: ModuleMode,

    #[builder(default = "false")]
    pub interactive: bool,

    #[builder(default = "false")]
    pub load_std: bool,

    #[builder(default = "false")]
    pub trace_memory: bool,

    #[builder(default = "false")]
    pub dump_memory: bool,

    #[builder(default = "true")]
    pub track_unhandled_rejections: bool,

    #[builder(default = "false")]
    pub empty_run: bool,

    /// 0 means unlimited
    #[builder(default = "0")]
    pub memory_limit_bytes: usize,

    /// 0 means the engine default
    #[builder(default = "0")]
    pub stack_size_bytes: usize,

    #[builder(default)]
    pub strip_flags: StripFlags,

    #[builder(setter(into, strip_option), default = "None")]
    pub log_file: Option<String>,

    #[builder(setter(strip_option), default = "None")]
    pub log_level: Option<tracing::Level>,
}

impl ConfigBuilder {
    /// Set logging values from a `dotenv` file and the environment. If
    /// `env_path` is `None`, the default `.env` is used. Option flags are never
    /// read from the environment.
    pub fn load_env<P>(&mut self, env_path: Option<P>) -> &mut Self
    where
        P: AsRef<Path>,
    {
        let _ = match env_path {
            Some(p) => {
                dotenvy::from_filename(p).map_err(|e| info!(".env not loaded: {}", e.to_string()))
            }
            None => dotenvy::dotenv().map_err(|e| info!(".env not loaded: {}", e.to_string())),
        };

        let env = std::env::vars()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect::<HashMap<_, _>>();

        self.apply_env(&env)
    }

    fn apply_env(&mut self, env: &HashMap<String, String>) -> &mut Self {
        if let Some(file) = env.get("QJS_LOG_FILE").or_else(|| env.get("LOG_FILE")) {
            self.log_file = Some(Some(file.clone()));
        }

        if let Some(level) = env.get("QJS_LOG_LEVEL").or_else(|| env.get("LOG_LEVEL")) {
            match level.parse::<tracing::Level>() {
                Ok(level) => self.log_level = Some(Some(level)),
                Err(e) => info!("ignoring log level `{level}`: {e}"),
            }
        }

        self
    }

    /// Append one file to the include list.
    pub fn include_file<S>(&mut self, file: S) -> &mut Self
    where
        S: Into<String>,
    {
        self.include_files
            .get_or_insert_with(Vec::new)
            .push(file.into());
        self
    }

    /// How many include files have been pushed so far.
    pub fn include_count(&self) -> usize {
        self.include_files.as_ref().map_or(0, Vec::len)
    }

    /// Has an inline expression been set?
    pub fn has_expression(&self) -> bool {
        matches!(self.expression, Some(Some(_)))
    }

    fn validate(&self) -> Result<(), String> {
        if self.include_count() > MAX_INCLUDE_FILES {
            return Err("too many included files".to_string());
        }

        if let (Some(Some(_)), Some(Some(_))) = (&self.expression, &self.script_path) {
            return Err("an expression and a script path are mutually exclusive".to_string());
        }

        Ok(())
    }
}

impl Config {
    /// True when no source was supplied, or `-i` was given.
    pub fn runs_interactive(&self) -> bool {
        self.interactive || (self.expression.is_none() && self.script_path.is_none())
    }
}

impl Default for Config {
    fn default() -> Self {
        // every field has a default and the default passes validation
        match ConfigBuilder::default().build() {
            Ok(config) => config,
            Err(e) => unreachable!("default config is invalid: {e}"),
        }
    }
}
