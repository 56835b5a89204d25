use std::{
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
};

/// The finished run of one `qjs` invocation.
#[derive(Debug)]
pub struct Run {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
}

impl From<Output> for Run {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
        }
    }
}

/// Run the built `qjs` with `args`, in `dir`, with empty stdin.
pub fn qjs_in<P>(dir: P, args: &[&str]) -> Run
where
    P: AsRef<Path>,
{
    Command::new(env!("CARGO_BIN_EXE_qjs"))
        .args(args)
        .current_dir(dir)
        .env_remove("QJS_LOG_LEVEL")
        .env_remove("LOG_LEVEL")
        .stdin(Stdio::null())
        .output()
        .expect("failed to run qjs")
        .into()
}

pub fn qjs(args: &[&str]) -> Run {
    qjs_in(std::env::temp_dir(), args)
}

/// Write `files` into a fresh temporary directory.
pub fn fixture(files: &[(&str, &str)]) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("failed to create a temp dir");
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).expect("failed to write fixture");
    }
    let path = dir.path().to_path_buf();

    (dir, path)
}
