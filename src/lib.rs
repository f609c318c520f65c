//! Buffered, aggregating metrics client.
//!
//! Application code reports gauge, counter, and histogram observations
//! through a [`BufferedLogger`]; the crate aggregates them in memory per
//! series and periodically hands a normalized batch of
//! [`SeriesPoint`]s to a [`Reporter`] for delivery. Firing an HTTP request
//! per data point would be absurd; buffering over a flush window is the whole
//! point of this crate.
//!
//! Delivery is best effort. The core guarantees a correctly aggregated,
//! correctly shaped batch; once a batch is handed to the reporter it is never
//! re-buffered, retried, or persisted here.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::perf)]
#![deny(clippy::suspicious)]
#![deny(clippy::complexity)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

pub mod aggregator;
pub mod logger;
pub mod metric;
pub mod reporter;
pub mod series;
mod signal;

pub use aggregator::Aggregator;
pub use logger::{BufferedLogger, Config};
pub use metric::MetricKind;
pub use reporter::{DatadogReporter, NullReporter, Reporter};
pub use series::{PointKind, SeriesPoint};
