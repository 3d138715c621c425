//! Inbound report dispatch.
//!
//! A [`ReportDispatcher`] belongs to exactly one device. It decodes each raw
//! frame through the device's [`ReportTable`] and calls the handler
//! registered for the resolved report type.
//!
//! # Handler registry
//!
//! At most one handler exists per report type. **Last registration wins**:
//! registering a second handler for the same type replaces the first, it
//! never adds a second subscriber. The protocol carries no correlation id, so
//! a caller waiting for a reply must register for the reply's type before
//! sending the command, and only one such expectation per type is safe.
//!
//! # Outcomes
//!
//! | Frame | Outcome | Logged |
//! |-------|---------|--------|
//! | undecodable / unknown id | [`DispatchOutcome::Dropped`] | `warn` |
//! | decoded, no handler | [`DispatchOutcome::Unhandled`] | `trace` |
//! | decoded, handler present | [`DispatchOutcome::Handled`] | `trace` |
//!
//! Handlers run synchronously on the thread that called
//! [`ReportDispatcher::dispatch`], which is normally the transport's single
//! inbound consumer. They must return quickly: every device sharing that
//! consumer stalls while a handler runs.

use crate::report::Report;
use crate::table::ReportTable;
use egm_core::{Error, ReportId};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

type Handler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Result of dispatching one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The registered handler ran.
    Handled { id: ReportId, name: &'static str },

    /// The frame decoded but nothing is registered for its type.
    Unhandled { id: ReportId, name: &'static str },

    /// The frame could not be decoded and was dropped.
    Dropped(Error),
}

impl DispatchOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled { .. })
    }

    /// Returns `true` if the frame decoded, handled or not.
    pub fn is_decoded(&self) -> bool {
        !matches!(self, DispatchOutcome::Dropped(_))
    }
}

/// Counters of dispatch outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub handled: u64,
    pub unhandled: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    handled: AtomicU64,
    unhandled: AtomicU64,
    dropped: AtomicU64,
}

/// Routes decoded reports to one handler per report type.
///
/// # Example
///
/// ```
/// use egm_protocol::{ReportDispatcher, ReportTable, encode};
/// use egm_protocol::reports::{CoinFault, CoinFaultStatus};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let dispatcher = ReportDispatcher::new(ReportTable::new());
/// let seen = Arc::new(AtomicUsize::new(0));
///
/// let counter = Arc::clone(&seen);
/// dispatcher.register::<CoinFaultStatus, _>(move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// let frame = encode(&CoinFaultStatus { fault: CoinFault::Jam }).unwrap();
/// assert!(dispatcher.dispatch(&frame).is_handled());
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
pub struct ReportDispatcher {
    table: RwLock<ReportTable>,
    handlers: RwLock<HashMap<TypeId, Handler>>,
    counters: Counters,
}

impl ReportDispatcher {
    /// Create a dispatcher over the device family's report catalog.
    ///
    /// Reports known to `table` but never registered are decoded and then
    /// silently dropped.
    pub fn new(table: ReportTable) -> Self {
        Self {
            table: RwLock::new(table),
            handlers: RwLock::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Register the handler for report type `R`, adding `R` to the catalog.
    ///
    /// Returns `true` if a previous handler for `R` was replaced.
    pub fn register<R, F>(&self, handler: F) -> bool
    where
        R: Report,
        F: Fn(&R) + Send + Sync + 'static,
    {
        self.table.write().insert::<R>();

        let handler: Handler = Arc::new(move |report: &dyn Any| {
            if let Some(report) = report.downcast_ref::<R>() {
                handler(report);
            }
        });

        let replaced = self
            .handlers
            .write()
            .insert(TypeId::of::<R>(), handler)
            .is_some();

        if replaced {
            debug!(report = R::NAME, "Replaced report handler");
        } else {
            trace!(report = R::NAME, "Registered report handler");
        }
        replaced
    }

    /// Remove the handler for `R`. Returns `true` if one was registered.
    pub fn unregister<R: Report>(&self) -> bool {
        self.handlers.write().remove(&TypeId::of::<R>()).is_some()
    }

    pub fn is_registered<R: Report>(&self) -> bool {
        self.handlers.read().contains_key(&TypeId::of::<R>())
    }

    /// Add `R` to the catalog without registering a handler.
    pub fn learn<R: Report>(&self) {
        self.table.write().insert::<R>();
    }

    /// Returns `true` if `id` decodes to a known report type.
    pub fn knows(&self, id: ReportId) -> bool {
        self.table.read().contains(id)
    }

    /// Decode `frame` and run the handler registered for its type.
    pub fn dispatch(&self, frame: &[u8]) -> DispatchOutcome {
        let decoded = match self.table.read().decode(frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, len = frame.len(), "Dropping undecodable frame");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                return DispatchOutcome::Dropped(e);
            }
        };

        // Clone the handler out so it runs without the registry lock held.
        let handler = self.handlers.read().get(&decoded.report_type()).cloned();

        match handler {
            Some(handler) => {
                trace!(id = %decoded.id, report = decoded.name, "Dispatching report");
                handler(decoded.as_any());
                self.counters.handled.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Handled {
                    id: decoded.id,
                    name: decoded.name,
                }
            }
            None => {
                trace!(id = %decoded.id, report = decoded.name, "No handler registered");
                self.counters.unhandled.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Unhandled {
                    id: decoded.id,
                    name: decoded.name,
                }
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            handled: self.counters.handled.load(Ordering::Relaxed),
            unhandled: self.counters.unhandled.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for ReportDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportDispatcher")
            .field("table", &*self.table.read())
            .field("handlers", &self.handlers.read().len())
            .field("stats", &self.stats())
            .finish()
    }
}
