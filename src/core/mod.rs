//! Queue consumption and event routing.
//!
//! This module contains:
//! - Consumer: the polling drain loop and per-item dispatch
//! - Router: event-id priority and remote writes
//! - Resolver: daily event fetch-or-create with a date-bound cache
//! - ErrorSink: the overflow queue for failed items
//! - Progress: the console activity indicator

pub mod clock;
pub mod consumer;
pub mod error;
pub mod error_sink;
pub mod progress;
pub mod resolver;
pub mod router;
pub mod shutdown;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use consumer::{DrainStats, QueueConsumer, RunSummary};
pub use error::{DispatchError, ResolveError};
pub use error_sink::ErrorSink;
pub use progress::{ProgressHandle, ProgressReporter};
pub use resolver::{DailyEventCache, DailyEventResolver, EventNameTemplate};
pub use router::{EventRouter, OperationMode};
pub use shutdown::{Shutdown, ShutdownTrigger};
