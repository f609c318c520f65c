//! Wire representation of a flushed metric series.
//!
//! A [`SeriesPoint`] is the unit handed to a
//! [`Reporter`](crate::reporter::Reporter) and its serialized form is the
//! de-facto contract with the downstream intake: changing the field names or
//! the `[[seconds, value]]` point encoding breaks interoperability.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// The intake-visible type of a [`SeriesPoint`].
///
/// Note this is narrower than [`MetricKind`](crate::metric::MetricKind): a
/// flushed histogram decomposes into gauge and count points.
pub enum PointKind {
    /// A point-at-time value.
    Gauge,
    /// A value accumulated over the flush window.
    Count,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
/// A single series observation in the shape the intake API expects.
pub struct SeriesPoint {
    /// Full metric name, prefix and any histogram suffix included.
    pub metric: String,
    /// Observations as `[posix_seconds, value]` pairs. The aggregator always
    /// emits exactly one pair per point.
    pub points: Vec<(u64, f64)>,
    #[serde(rename = "type")]
    /// Whether the intake should treat this as a gauge or a count.
    pub kind: PointKind,
    /// Host the observation was taken on. Empty when unconfigured.
    pub host: String,
    /// Tags in reporting order: the aggregator's default tags first, then the
    /// tags the point was submitted with.
    pub tags: Vec<String>,
}

/// Normalize an optional millisecond timestamp to whole posix seconds.
///
/// Unset means "now". Milliseconds are rounded to the nearest second, not
/// truncated: `1500 -> 2`, `1499 -> 1`. An explicit 0 is a legal timestamp,
/// distinct from unset.
pub(crate) fn posix_timestamp(timestamp_millis: Option<u64>) -> u64 {
    let millis = timestamp_millis.unwrap_or_else(now_millis);
    (millis + 500) / 1_000
}

#[allow(clippy::cast_possible_truncation)]
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock set before UNIX epoch")
        .as_millis() as u64
}
