use std::{
    cell::RefCell,
    io::{self, Write},
    rc::Rc,
};

use qjs_rs_utils::config::StripFlags;
use rquickjs::{Ctx, Runtime};

use crate::host::{
    loader::{FsLoader, FsResolver},
    new_context, HostHandlers,
};

/// Module for various test utilities that are shared among unit tests.

#[macro_export]
macro_rules! assert_regex {
    ($string:expr, $regex:expr) => {
        let re = regex::Regex::new($regex).unwrap();
        assert!(
            re.is_match($string),
            "Expected '{}' to match '{}'",
            $string,
            $regex
        )
    };
}

/// A `Write` sink tests can read back after handing a clone away.
#[derive(Debug, Clone, Default)]
pub struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` inside a context configured the way the driver configures one:
/// host state, native modules and the file system loader.
pub fn with_host_context<F>(f: F)
where
    F: for<'js> FnOnce(Ctx<'js>),
{
    let rt = Runtime::new().unwrap();
    rt.set_loader(FsResolver, FsLoader);
    let handlers = HostHandlers::init(StripFlags::None);
    let context = new_context(&rt, &handlers).unwrap();

    context.with(f);

    handlers.release(&context);
}
