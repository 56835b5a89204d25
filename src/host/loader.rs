//! Resolving and loading imported modules from the file system.

use std::path::Path;

use path_dedot::ParseDot;
use rquickjs::{
    loader::{Loader, Resolver},
    module::Declared,
    Ctx, Error, Module, Result,
};
use tracing::{debug, trace};

use crate::eval::module_url;

/// Is `name` written relative to the importing module?
fn is_relative(name: &str) -> bool {
    name.starts_with("./") || name.starts_with("../")
}

/// Maps import specifiers to module names. Relative specifiers are joined to
/// the importing module's directory and normalized. Everything else, including
/// the native `std` and `os` modules, passes through.
#[derive(Debug, Default)]
pub struct FsResolver;

impl Resolver for FsResolver {
    fn resolve<'js>(&mut self, _ctx: &Ctx<'js>, base: &str, name: &str) -> Result<String> {
        if !is_relative(name) {
            return Ok(name.to_string());
        }

        let dir = Path::new(base).parent().unwrap_or_else(|| Path::new(""));
        let joined = dir.join(name);
        let normalized = joined
            .parse_dot()
            .map_err(|_| Error::new_resolving(base, name))?;

        let resolved = normalized.to_string_lossy().into_owned();
        trace!(base, name, %resolved, "resolved import");

        Ok(resolved)
    }
}

/// Loads resolved module names from disk. `.json` files become a module with
/// the parsed value as its default export.
#[derive(Debug, Default)]
pub struct FsLoader;

impl FsLoader {
    fn load_json<'js>(ctx: &Ctx<'js>, name: &str, text: &str) -> Result<Module<'js, Declared>> {
        // reject bad JSON with the parser's own error, before it becomes module source
        ctx.json_parse(text)?;

        // the text goes through JSON.parse, not the JS parser, so keys like
        // `__proto__` stay own properties
        let Some(quoted) = ctx.json_stringify(text)? else {
            return Err(Error::new_loading_message(name, "cannot quote JSON text"));
        };
        let source = format!("export default JSON.parse({});", quoted.to_string()?);

        Module::declare(ctx.clone(), name, source)
    }
}

impl Loader for FsLoader {
    fn load<'js>(&mut self, ctx: &Ctx<'js>, name: &str) -> Result<Module<'js, Declared>> {
        let text = fs_err::read_to_string(name)
            .map_err(|e| Error::new_loading_message(name, e.to_string()))?;
        debug!(name, "loading module");

        if name.ends_with(".json") {
            return Self::load_json(ctx, name, &text);
        }

        let module = Module::declare(ctx.clone(), name, text)?;
        let meta = module.meta()?;
        meta.set("url", module_url(name))?;
        meta.set("main", false)?;

        Ok(module)
    }
}
