//! Observability for result stores
//!
//! - Structured JSON logging with a process-wide minimum severity
//! - Typed lifecycle events
//! - Relaxed atomic counters
//! - Begin/complete scopes around payload transfer
//!
//! # Usage
//!
//! ```ignore
//! use searchstore::observability::{log_event, Event, MetricsRegistry};
//!
//! log_event(Event::StoreCreated, &[("store", "table-1")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_rows_added();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

/// Log a lifecycle event at the event's own severity.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
