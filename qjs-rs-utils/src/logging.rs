use std::sync::Mutex;

use if_chain::if_chain;
use qjs_rs_errors::{QjsError, Result};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use crate::config::Config;

/// Writing logs here means writing them to standard error.
pub const STDERR_LOG: &str = "STDERR";

/// Install the global `tracing` subscriber if the config asks for logging.
///
/// Logs never share stdout with script output. `RUST_LOG` directives refine the
/// configured level.
pub fn init_tracing_subscriber(config: &Config) -> Result<()> {
    if_chain! {
        if let Some(level) = config.log_level;
        let file = config.log_file.as_deref().unwrap_or(STDERR_LOG);
        then {
            let filter = EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(level).into())
                .from_env_lossy();

            let result = match file {
                STDERR_LOG => tracing::subscriber::set_global_default(
                    tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(std::io::stderr)
                        .finish(),
                ),
                path => {
                    let file = fs_err::File::create(path)?;
                    tracing::subscriber::set_global_default(
                        tracing_subscriber::fmt()
                            .with_env_filter(filter)
                            .with_ansi(false)
                            .with_writer(Mutex::new(file))
                            .finish(),
                    )
                }
            };

            result.map_err(|e| {
                Box::new(QjsError::new(format!("setting tracing default failed: {e}")))
            })?;
        }
    }

    Ok(())
}
