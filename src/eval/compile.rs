//! Engine calls the safe binding does not expose with the flags this host
//! needs: file-named eval, compile-only eval, bytecode round trips, module
//! resolution and `import.meta`.

use std::{
    ffi::{CStr, CString},
    os::raw::c_int,
    slice,
};

use qjs_rs_utils::config::StripFlags;
use rquickjs::{qjs, Ctx, Error, Result, Value};

/// Take ownership of a raw engine result.
fn wrap<'js>(ctx: &Ctx<'js>, raw: qjs::JSValue) -> Result<Value<'js>> {
    // SAFETY: `raw` is a fresh, owned value produced under `ctx`
    unsafe {
        if qjs::JS_IsException(raw) {
            return Err(Error::Exception);
        }
        Ok(Value::from_raw(ctx.clone(), raw))
    }
}

/// Copy `source` with the terminating NUL the engine reads past its length.
/// NUL bytes inside the source are kept.
fn nul_terminated(source: &[u8]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(source.len() + 1);
    buffer.extend_from_slice(source);
    buffer.push(0);
    buffer
}

fn is_module(value: &Value) -> bool {
    // SAFETY: reading the tag of a live value
    unsafe { qjs::JS_VALUE_GET_TAG(value.as_raw()) == qjs::JS_TAG_MODULE }
}

/// Run `JS_Eval` with explicit flags and file name.
pub fn raw_eval<'js>(ctx: &Ctx<'js>, source: &[u8], filename: &str, flags: u32) -> Result<Value<'js>> {
    let length = source.len();
    let source = nul_terminated(source);
    let filename = CString::new(filename)?;

    // SAFETY: both buffers outlive the call
    let raw = unsafe {
        qjs::JS_Eval(
            ctx.as_raw().as_ptr(),
            source.as_ptr().cast(),
            length as qjs::size_t,
            filename.as_ptr(),
            flags as c_int,
        )
    };

    wrap(ctx, raw)
}

/// Serialize a compiled function or module to bytecode.
pub fn write_bytecode(ctx: &Ctx, value: &Value, flags: u32) -> Result<Vec<u8>> {
    let ctx_ptr = ctx.as_raw().as_ptr();
    let mut length: qjs::size_t = 0;

    // SAFETY: the buffer is copied out, then released with the engine's allocator
    unsafe {
        let buffer = qjs::JS_WriteObject(ctx_ptr, &mut length, value.as_raw(), flags as c_int);
        if buffer.is_null() {
            return Err(Error::Exception);
        }

        let bytes = slice::from_raw_parts(buffer, length as usize).to_vec();
        qjs::js_free(ctx_ptr, buffer as *mut _);
        Ok(bytes)
    }
}

/// Deserialize bytecode produced by [`write_bytecode`].
pub fn read_bytecode<'js>(ctx: &Ctx<'js>, bytes: &[u8]) -> Result<Value<'js>> {
    // SAFETY: the engine copies what it needs out of `bytes`
    let raw = unsafe {
        qjs::JS_ReadObject(
            ctx.as_raw().as_ptr(),
            bytes.as_ptr(),
            bytes.len() as qjs::size_t,
            qjs::JS_READ_OBJ_BYTECODE as c_int,
        )
    };

    wrap(ctx, raw)
}

/// Resolve the imports of a module read back from bytecode. Other values are
/// left alone.
pub fn resolve_module(ctx: &Ctx, module: &Value) -> Result<()> {
    if !is_module(module) {
        return Ok(());
    }

    // SAFETY: `module` is a live module value
    let status = unsafe { qjs::JS_ResolveModule(ctx.as_raw().as_ptr(), module.as_raw()) };
    if status < 0 {
        return Err(Error::Exception);
    }

    Ok(())
}

/// Round-trip compiled code through the bytecode writer, discarding what
/// `strip` names.
pub fn strip_compiled<'js>(ctx: &Ctx<'js>, compiled: &Value<'js>, strip: StripFlags) -> Result<Value<'js>> {
    let strip_bits = match strip {
        StripFlags::None => return Ok(compiled.clone()),
        StripFlags::Debug => qjs::JS_WRITE_OBJ_STRIP_DEBUG | qjs::JS_WRITE_OBJ_STRIP_SOURCE,
        StripFlags::Source => qjs::JS_WRITE_OBJ_STRIP_SOURCE,
    };

    let bytes = write_bytecode(ctx, compiled, qjs::JS_WRITE_OBJ_BYTECODE | strip_bits)?;
    let stripped = read_bytecode(ctx, &bytes)?;
    resolve_module(ctx, &stripped)?;

    Ok(stripped)
}

/// Run a compiled script function, or evaluate a compiled module. Modules
/// yield a promise.
pub fn run_compiled<'js>(ctx: &Ctx<'js>, compiled: &Value<'js>) -> Result<Value<'js>> {
    // SAFETY: `JS_EvalFunction` consumes its argument, so it gets its own reference
    let raw = unsafe {
        let ctx_ptr = ctx.as_raw().as_ptr();
        qjs::JS_EvalFunction(ctx_ptr, qjs::JS_DupValue(ctx_ptr, compiled.as_raw()))
    };

    wrap(ctx, raw)
}

/// Evaluate a global script under `filename`, stripped per `strip`. Returns
/// the completion value.
pub fn eval_script<'js>(ctx: &Ctx<'js>, source: &[u8], filename: &str, strip: StripFlags) -> Result<Value<'js>> {
    if strip == StripFlags::None {
        return raw_eval(ctx, source, filename, qjs::JS_EVAL_TYPE_GLOBAL);
    }

    let compiled = raw_eval(
        ctx,
        source,
        filename,
        qjs::JS_EVAL_TYPE_GLOBAL | qjs::JS_EVAL_FLAG_COMPILE_ONLY,
    )?;
    let stripped = strip_compiled(ctx, &compiled, strip)?;
    run_compiled(ctx, &stripped)
}

/// Compile a module without running it. Its imports are resolved.
pub fn compile_module<'js>(ctx: &Ctx<'js>, source: &[u8], filename: &str, strip: StripFlags) -> Result<Value<'js>> {
    let compiled = raw_eval(
        ctx,
        source,
        filename,
        qjs::JS_EVAL_TYPE_MODULE | qjs::JS_EVAL_FLAG_COMPILE_ONLY,
    )?;

    strip_compiled(ctx, &compiled, strip)
}

/// Set `import.meta.url` and `import.meta.main` on a compiled module.
pub fn set_import_meta(ctx: &Ctx, module: &Value, url: &str, main: bool) -> Result<()> {
    if !is_module(module) {
        return Ok(());
    }

    // SAFETY: a module value's pointer is its module definition
    let raw = unsafe {
        let def = qjs::JS_VALUE_GET_PTR(module.as_raw()) as *mut qjs::JSModuleDef;
        qjs::JS_GetImportMeta(ctx.as_raw().as_ptr(), def)
    };

    let meta = wrap(ctx, raw)?;
    let Some(meta) = meta.as_object() else {
        return Ok(());
    };

    meta.set("url", url)?;
    meta.set("main", main)?;

    Ok(())
}

/// The engine's heuristic: does this buffer look like a module?
pub fn detect_module(source: &[u8]) -> bool {
    let length = source.len();
    let source = nul_terminated(source);

    // SAFETY: `source` is NUL-terminated past `length`
    unsafe { qjs::JS_DetectModule(source.as_ptr().cast(), length as qjs::size_t) }
}

/// The engine's version string.
pub fn engine_version() -> String {
    // SAFETY: the engine returns a static NUL-terminated string
    unsafe { CStr::from_ptr(qjs::JS_GetVersion()) }
        .to_string_lossy()
        .into_owned()
}
