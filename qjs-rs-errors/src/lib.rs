#![forbid(unsafe_code)]

use std::{
    convert::Infallible,
    error::Error,
    fmt::{Debug, Display, Formatter},
    io::{self, Write},
    result,
};

use derive_builder::UninitializedFieldError;
use itertools::Itertools;

/// Every diagnostic the host prints to stderr starts with this.
pub const DIAGNOSTIC_PREFIX: &str = "qjs";

/// Broad classes of failure. Each has a default process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad option, missing option argument, unparseable size, too many includes.
    Invocation,
    /// A file could not be read.
    Io,
    /// The runtime or context could not be created.
    Engine,
    /// User code threw. The exception has already been printed.
    Eval,
}

impl ErrorKind {
    pub fn default_exit_code(self) -> i32 {
        match self {
            ErrorKind::Invocation | ErrorKind::Io | ErrorKind::Eval => 1,
            ErrorKind::Engine => 2,
        }
    }
}

/// A convenience helper for creating a new `QjsError`. (`Invocation` kind)
#[macro_export]
macro_rules! qjs_error {
    ($fmt:literal, $($arg:tt)*) => {
        $crate::QjsError::new(format!($fmt, $($arg)*)).into()
    };
    ($msg:literal $(,)?) => {
        $crate::QjsError::new($msg).into()
    };
    ($err:expr $(,)?) => {
        $crate::QjsError::new($err).into()
    };
}

/// A convenience helper for creating a new `QjsError`. (`Io` kind)
#[macro_export]
macro_rules! qjs_io_error {
    ($fmt:literal, $($arg:tt)*) => {
        $crate::QjsError::new_io(format!($fmt, $($arg)*)).into()
    };
    ($msg:literal $(,)?) => {
        $crate::QjsError::new_io($msg).into()
    };
    ($err:expr $(,)?) => {
        $crate::QjsError::new_io($err).into()
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QjsError {
    /// The main message to be printed out
    message: String,
    /// Additional lines printed after the message.
    notes: Vec<String>,
    /// Process exit status this error maps to.
    exit_code: i32,
    /// Print usage text after the diagnostic.
    show_help: bool,
    pub kind: ErrorKind,
}

impl QjsError {
    fn with_kind<T>(message: T, kind: ErrorKind) -> Self
    where
        T: Into<String>,
    {
        Self {
            message: message.into(),
            notes: vec![],
            exit_code: kind.default_exit_code(),
            show_help: false,
            kind,
        }
    }

    /// Create a new `QjsError` of kind [`ErrorKind::Invocation`]
    pub fn new<T>(message: T) -> Self
    where
        T: Into<String>,
    {
        Self::with_kind(message, ErrorKind::Invocation)
    }

    /// Create a new `QjsError` of kind [`ErrorKind::Io`]
    pub fn new_io<T>(message: T) -> Self
    where
        T: Into<String>,
    {
        Self::with_kind(message, ErrorKind::Io)
    }

    /// Create a new `QjsError` of kind [`ErrorKind::Engine`]
    pub fn new_engine<T>(message: T) -> Self
    where
        T: Into<String>,
    {
        Self::with_kind(message, ErrorKind::Engine)
    }

    /// Create a new `QjsError` of kind [`ErrorKind::Eval`]. The engine's
    /// exception text is printed where it is caught, so this one stays quiet.
    pub fn new_eval<T>(message: T) -> Self
    where
        T: Into<String>,
    {
        Self::with_kind(message, ErrorKind::Eval)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn shows_help(&self) -> bool {
        self.show_help
    }

    pub fn is_eval(&self) -> bool {
        self.kind == ErrorKind::Eval
    }

    /// Add a note to the diagnostic
    pub fn with_note<T>(mut self, note: T) -> Self
    where
        T: Into<String>,
    {
        self.notes.push(note.into());

        self
    }

    /// Override the default exit status for this error's kind
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;

        self
    }

    /// Request that usage text follows the diagnostic
    pub fn with_help(mut self) -> Self {
        self.show_help = true;

        self
    }

    /// The diagnostic as it will appear on stderr, without a trailing newline.
    pub fn diagnostic_string(&self) -> String {
        let mut out = format!("{DIAGNOSTIC_PREFIX}: {}", self.message);

        if !self.notes.is_empty() {
            out.push('\n');
            out.push_str(&self.notes.iter().join("\n"));
        }

        out
    }

    /// Write this error's diagnostic to `writer`. Eval errors write nothing.
    pub fn emit_to<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: Write + ?Sized,
    {
        if self.is_eval() {
            return Ok(());
        }

        writeln!(writer, "{}", self.diagnostic_string())
    }

    /// Emit this error's diagnostic to stderr
    pub fn emit_diagnostics(&self) {
        // nowhere left to report a failed stderr write
        let _ = self.emit_to(&mut io::stderr().lock());
    }
}

impl Display for QjsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for QjsError {}

impl AsRef<str> for QjsError {
    fn as_ref(&self) -> &str {
        &self.message
    }
}

impl From<io::Error> for QjsError {
    fn from(e: io::Error) -> Self {
        Self::new_io(e.to_string())
    }
}

impl From<io::Error> for Box<QjsError> {
    fn from(e: io::Error) -> Self {
        Box::new(QjsError::from(e))
    }
}

impl From<UninitializedFieldError> for QjsError {
    fn from(e: UninitializedFieldError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<String> for QjsError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Engine-level failures that reach the host outside of user code.
impl From<rquickjs::Error> for QjsError {
    fn from(e: rquickjs::Error) -> Self {
        match e {
            rquickjs::Error::Allocation => Self::new_engine("out of memory"),
            rquickjs::Error::Exception => Self::new_eval("uncaught exception"),
            e => Self::new_engine(e.to_string()),
        }
    }
}

impl From<rquickjs::Error> for Box<QjsError> {
    fn from(e: rquickjs::Error) -> Self {
        Box::new(QjsError::from(e))
    }
}

impl From<Infallible> for Box<QjsError> {
    fn from(_e: Infallible) -> Self {
        unreachable!("this better be unreachable.")
    }
}

/// Common `Result` type
pub type Result<T> = result::Result<T, Box<QjsError>>;

#[cfg(test)]
mod tests {
    use claims::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_builder() {
        let error = QjsError::new("missing expression for -e")
            .with_note("try qjs --help")
            .with_exit_code(2)
            .with_help();

        assert_eq!(error.message(), "missing expression for -e");
        assert_eq!(error.notes(), &["try qjs --help".to_string()]);
        assert_eq!(error.exit_code(), 2);
        assert!(error.shows_help());
    }

    #[test]
    fn test_default_exit_codes() {
        assert_eq!(QjsError::new("x").exit_code(), 1);
        assert_eq!(QjsError::new_io("x").exit_code(), 1);
        assert_eq!(QjsError::new_engine("x").exit_code(), 2);
        assert_eq!(QjsError::new_eval("x").exit_code(), 1);
    }

    #[test]
    fn test_emit_to() {
        let mut buf = vec![];
        let error = QjsError::new("unknown option '-z'").with_note("second line");
        assert_ok!(error.emit_to(&mut buf));
        assert_eq!(
            String::from_utf8_lossy(&buf),
            "qjs: unknown option '-z'\nsecond line\n"
        );
    }

    #[test]
    fn test_eval_errors_are_silent() {
        let mut buf = vec![];
        assert_ok!(QjsError::new_eval("boom").emit_to(&mut buf));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_macros() {
        let e: Box<QjsError> = qjs_error!("invalid suffix: {}", "x");
        assert_eq!(e.to_string(), "invalid suffix: x");
        assert_eq!(e.kind, ErrorKind::Invocation);

        let e: Box<QjsError> = qjs_io_error!("could not load '{}'", "a.js");
        assert_eq!(e.kind, ErrorKind::Io);

        let r: Result<()> = Err(qjs_error!("nope"));
        assert_err!(r);
    }

    #[test]
    fn test_from_io_error() {
        let e: Box<QjsError> = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(e.kind, ErrorKind::Io);
        assert_eq!(e.exit_code(), 1);
    }

    #[test]
    fn test_from_engine_error() {
        let e = QjsError::from(rquickjs::Error::Allocation);
        assert_eq!(e.kind, ErrorKind::Engine);
        assert_eq!(e.exit_code(), 2);

        let e = QjsError::from(rquickjs::Error::Exception);
        assert!(e.is_eval());
    }
}
