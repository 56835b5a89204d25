//! The instantiation micro-benchmark `-q -d` runs after teardown.

use std::{
    fmt::{self, Display, Formatter},
    time::{Duration, Instant},
};

use qjs_rs_errors::{QjsError, Result};
use rquickjs::{Context, Runtime};
use tracing::debug;

/// The best observed time, in milliseconds, of each instantiation phase.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InstantiationTimes {
    pub new_runtime: f64,
    pub new_context: f64,
    pub free_context: f64,
    pub free_runtime: f64,
}

impl InstantiationTimes {
    pub fn total(&self) -> f64 {
        self.new_runtime + self.new_context + self.free_context + self.free_runtime
    }

    /// Fold one round into the running minimums.
    fn keep_best(&mut self, round: [Duration; 4], first: bool) {
        let [a, b, c, d] = round.map(|phase| phase.as_secs_f64() * 1000.0);

        if first {
            *self = Self {
                new_runtime: a,
                new_context: b,
                free_context: c,
                free_runtime: d,
            };
            return;
        }

        self.new_runtime = self.new_runtime.min(a);
        self.new_context = self.new_context.min(b);
        self.free_context = self.free_context.min(c);
        self.free_runtime = self.free_runtime.min(d);
    }
}

impl Display for InstantiationTimes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\nInstantiation times (ms): {:.3} = {:.3}+{:.3}+{:.3}+{:.3}",
            self.total(),
            self.new_runtime,
            self.new_context,
            self.free_context,
            self.free_runtime
        )
    }
}

/// Time `iterations` rounds of creating and freeing a bare runtime and
/// context. The numbers are informational. Jitter on a busy or virtualized
/// host can exceed them.
pub fn measure(iterations: usize) -> Result<InstantiationTimes> {
    let mut best = InstantiationTimes::default();

    for i in 0..iterations {
        let t0 = Instant::now();
        let rt = Runtime::new()
            .map_err(|_| Box::new(QjsError::new_engine("cannot allocate JS runtime")))?;
        let t1 = Instant::now();
        let context = Context::full(&rt)
            .map_err(|_| Box::new(QjsError::new_engine("cannot allocate JS context")))?;
        let t2 = Instant::now();
        drop(context);
        let t3 = Instant::now();
        drop(rt);
        let t4 = Instant::now();

        best.keep_best([t1 - t0, t2 - t1, t3 - t2, t4 - t3], i == 0);
    }

    debug!(?best, iterations, "instantiation benchmark finished");
    Ok(best)
}
