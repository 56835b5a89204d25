//! Reporting promise rejections nobody handled.
//!
//! The engine calls the tracker as soon as a promise without handlers is
//! rejected, and again if a handler is attached later. Reports are held back
//! until [`RejectionTracker::flush`], so a rejection that gets handled in the
//! same turn is never reported.

use std::{
    cell::{Cell, RefCell},
    io::{self, Write},
    rc::Rc,
};

use rquickjs::{Ctx, Persistent, Runtime, Value};
use tracing::trace;

use crate::eval::exception::write_exception;

const UNHANDLED_PREFIX: &str = "Possibly unhandled promise rejection: ";

/// A rejection reason seen without a handler, with every promise it rejected.
/// Holding the promises keeps them alive, so none can be mistaken for another.
#[derive(Debug)]
struct Unhandled {
    promises: Vec<Persistent<Value<'static>>>,
    reason: Persistent<Value<'static>>,
    report: Vec<u8>,
}

fn same_value<'js>(ctx: &Ctx<'js>, held: &Persistent<Value<'static>>, value: &Value<'js>) -> bool {
    held.clone()
        .restore(ctx)
        .map_or(false, |held| held == *value)
}

impl Unhandled {
    fn rejected<'js>(&self, ctx: &Ctx<'js>, promise: &Value<'js>) -> bool {
        self.promises.iter().any(|held| same_value(ctx, held, promise))
    }
}

struct TrackerState {
    enabled: Cell<bool>,
    pending: RefCell<Vec<Unhandled>>,
    sink: RefCell<Box<dyn Write>>,
}

/// The host's rejection tracker.
///
/// Pending reports hold engine values. They are released by [`flush`] and
/// [`detach`], one of which must run before the runtime is dropped.
///
/// [`flush`]: RejectionTracker::flush
/// [`detach`]: RejectionTracker::detach
#[derive(Clone)]
pub struct RejectionTracker(Rc<TrackerState>);

impl RejectionTracker {
    /// A tracker that reports to stderr.
    pub fn new() -> Self {
        Self::with_sink(io::stderr())
    }

    pub fn with_sink<W>(sink: W) -> Self
    where
        W: Write + 'static,
    {
        Self(Rc::new(TrackerState {
            enabled: Cell::new(true),
            pending: RefCell::new(vec![]),
            sink: RefCell::new(Box::new(sink)),
        }))
    }

    /// Register with `rt`. Must be called outside of any `Context::with`.
    pub fn install(&self, rt: &Runtime) {
        let tracker = self.clone();
        rt.set_host_promise_rejection_tracker(Some(Box::new(
            move |ctx, promise, reason, is_handled| tracker.track(&ctx, promise, reason, is_handled),
        )));
    }

    /// Stop reporting, and forget anything not yet reported. Safe to call
    /// while a context is entered.
    pub fn detach(&self) {
        trace!("rejection tracker detached");
        self.0.enabled.set(false);
        self.0.pending.take();
    }

    pub fn is_enabled(&self) -> bool {
        self.0.enabled.get()
    }

    /// How many rejection reasons are waiting to be reported.
    pub fn pending(&self) -> usize {
        self.0.pending.borrow().len()
    }

    fn track<'js>(&self, ctx: &Ctx<'js>, promise: Value<'js>, reason: Value<'js>, is_handled: bool) {
        if !self.is_enabled() {
            return;
        }

        if is_handled {
            // a handled promise settles its reason for every promise it rejected
            let handled = {
                let mut pending = self.0.pending.borrow_mut();
                let before = pending.len();
                let (handled, kept): (Vec<_>, Vec<_>) = pending
                    .drain(..)
                    .partition(|unhandled| unhandled.rejected(ctx, &promise));
                *pending = kept;
                trace!(before, after = pending.len(), "rejection handled");
                handled
            };
            drop(handled);
            return;
        }

        {
            let mut pending = self.0.pending.borrow_mut();
            if let Some(unhandled) = pending
                .iter_mut()
                .find(|unhandled| same_value(ctx, &unhandled.reason, &reason))
            {
                unhandled.promises.push(Persistent::save(ctx, promise));
                return;
            }
        }

        // rendering runs script code, which may reject more promises
        let mut report = UNHANDLED_PREFIX.as_bytes().to_vec();
        let _ = write_exception(&mut report, &reason);
        self.0.pending.borrow_mut().push(Unhandled {
            promises: vec![Persistent::save(ctx, promise)],
            reason: Persistent::save(ctx, reason),
            report,
        });
    }

    /// Report every rejection that is still unhandled.
    pub fn flush(&self) {
        let pending = self.0.pending.take();
        if pending.is_empty() {
            return;
        }

        trace!(count = pending.len(), "reporting unhandled rejections");
        let mut sink = self.0.sink.borrow_mut();
        for unhandled in &pending {
            // nowhere left to report a failed write
            let _ = sink.write_all(&unhandled.report);
        }
        let _ = sink.flush();
    }
}

impl Default for RejectionTracker {
    fn default() -> Self {
        Self::new()
    }
}
