//! Routing of incoming points to per-series accumulators.
//!
//! The aggregator owns a buffer mapping series keys to live accumulators. A
//! key is derived from a metric's name and tag set, independent of tag order,
//! so `["a", "b"]` and `["b", "a"]` land on the same accumulator. Flushing
//! drains the whole buffer into a flat batch and resets it; accumulation
//! state never survives a flush.

use rustc_hash::FxHashMap;

use crate::metric::{Accumulator, MetricKind};
use crate::series::SeriesPoint;

/// Errors produced by [`Aggregator`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A point was submitted under a key whose accumulator holds a different
    /// metric kind. The original accumulator is left untouched.
    #[error("series `{name}` accumulates as {existing}, point submitted as {submitted}")]
    KindMismatch {
        /// Metric name of the offending point.
        name: String,
        /// Kind the series was first created with.
        existing: MetricKind,
        /// Kind of the rejected submission.
        submitted: MetricKind,
    },
}

/// Compute the buffer key for a name and tag set.
///
/// Tags are sorted lexicographically before joining so permutations of the
/// same tag set share a key. An empty tag set is normalized to a single
/// empty-string tag, keeping the key stable whether tags are absent or not.
pub(crate) fn series_key(name: &str, tags: &[String]) -> String {
    let mut sorted: Vec<&str> = if tags.is_empty() {
        vec![""]
    } else {
        tags.iter().map(String::as_str).collect()
    };
    sorted.sort_unstable();
    format!("{name}#{}", sorted.join("."))
}

#[derive(Debug)]
/// Buffers per-series accumulators between flushes.
pub struct Aggregator {
    buffer: FxHashMap<String, Accumulator>,
    /// Prepended to every flushed point's tags.
    default_tags: Vec<String>,
}

impl Aggregator {
    /// Create an [`Aggregator`] stamping `default_tags` onto every flushed
    /// point.
    #[must_use]
    pub fn new(default_tags: Vec<String>) -> Self {
        Self {
            buffer: FxHashMap::default(),
            default_tags,
        }
    }

    /// Route a point to its series accumulator, creating the accumulator on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KindMismatch`] if the series already accumulates
    /// under a different [`MetricKind`]. The point is dropped.
    pub fn add_point(
        &mut self,
        kind: MetricKind,
        name: &str,
        value: f64,
        tags: &[String],
        host: &str,
        timestamp_millis: Option<u64>,
    ) -> Result<(), Error> {
        let key = series_key(name, tags);
        let accumulator = self.buffer.entry(key).or_insert_with(|| {
            Accumulator::new(kind, name.to_string(), tags.to_vec(), host.to_string())
        });

        if accumulator.kind() != kind {
            return Err(Error::KindMismatch {
                name: name.to_string(),
                existing: accumulator.kind(),
                submitted: kind,
            });
        }

        accumulator.add_point(value, timestamp_millis);
        Ok(())
    }

    /// Drain every accumulator into one flat batch and reset the buffer.
    ///
    /// The buffer is taken before any accumulator is drained, so the returned
    /// batch is fully owned by the caller and points arriving afterwards
    /// start fresh accumulators. Default tags are prepended to each point's
    /// own tags; order is significant downstream.
    pub fn flush(&mut self) -> Vec<SeriesPoint> {
        let buffer = std::mem::take(&mut self.buffer);

        let mut series = Vec::new();
        for accumulator in buffer.into_values() {
            series.extend(accumulator.flush());
        }

        if !self.default_tags.is_empty() {
            for point in &mut series {
                point.tags.splice(0..0, self.default_tags.iter().cloned());
            }
        }

        series
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::PointKind;
    use proptest::prelude::*;

    #[test]
    fn key_ignores_tag_order() {
        let forward = vec!["env:prod".to_string(), "region:us".to_string()];
        let backward = vec!["region:us".to_string(), "env:prod".to_string()];
        assert_eq!(series_key("m", &forward), series_key("m", &backward));
    }

    #[test]
    fn empty_tag_set_has_a_stable_key() {
        assert_eq!(series_key("m", &[]), "m#");
        assert_ne!(series_key("m", &[]), series_key("n", &[]));
    }

    #[test]
    fn points_with_permuted_tags_share_an_accumulator() {
        let mut agg = Aggregator::new(Vec::new());
        let forward = vec!["a:1".to_string(), "b:2".to_string()];
        let backward = vec!["b:2".to_string(), "a:1".to_string()];

        agg.add_point(MetricKind::Counter, "hits", 1.0, &forward, "", Some(0))
            .expect("add failed");
        agg.add_point(MetricKind::Counter, "hits", 2.0, &backward, "", Some(0))
            .expect("add failed");

        let series = agg.flush();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].points[0].1, 3.0);
        // Reported tags keep the first submission's arrival order.
        assert_eq!(series[0].tags, forward);
    }

    #[test]
    fn kind_mismatch_is_rejected_and_original_preserved() {
        let mut agg = Aggregator::new(Vec::new());
        agg.add_point(MetricKind::Gauge, "m", 5.0, &[], "", Some(0))
            .expect("add failed");

        let err = agg
            .add_point(MetricKind::Counter, "m", 1.0, &[], "", Some(0))
            .expect_err("mismatch accepted");
        assert_eq!(
            err,
            Error::KindMismatch {
                name: "m".to_string(),
                existing: MetricKind::Gauge,
                submitted: MetricKind::Counter,
            }
        );

        let series = agg.flush();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].kind, PointKind::Gauge);
        assert_eq!(series[0].points[0].1, 5.0);
    }

    #[test]
    fn flush_resets_the_buffer() {
        let mut agg = Aggregator::new(Vec::new());
        agg.add_point(MetricKind::Counter, "m", 1.0, &[], "", Some(0))
            .expect("add failed");

        assert_eq!(agg.flush().len(), 1);
        assert!(agg.flush().is_empty());

        // A reappearing series starts a brand-new accumulator.
        agg.add_point(MetricKind::Counter, "m", 7.0, &[], "", Some(0))
            .expect("add failed");
        let series = agg.flush();
        assert_eq!(series[0].points[0].1, 7.0);
    }

    #[test]
    fn default_tags_come_first() {
        let mut agg = Aggregator::new(vec!["env:prod".to_string()]);
        agg.add_point(
            MetricKind::Gauge,
            "m",
            1.0,
            &["region:us".to_string()],
            "",
            Some(0),
        )
        .expect("add failed");

        let series = agg.flush();
        assert_eq!(
            series[0].tags,
            vec!["env:prod".to_string(), "region:us".to_string()]
        );
    }

    #[test]
    fn distinct_tag_sets_are_distinct_series() {
        let mut agg = Aggregator::new(Vec::new());
        agg.add_point(MetricKind::Counter, "m", 1.0, &["a:1".to_string()], "", Some(0))
            .expect("add failed");
        agg.add_point(MetricKind::Counter, "m", 1.0, &["a:2".to_string()], "", Some(0))
            .expect("add failed");

        assert_eq!(agg.flush().len(), 2);
    }

    proptest! {
        #[test]
        fn key_is_permutation_invariant(
            (tags, shuffled) in prop::collection::vec("[a-z]{1,8}:[a-z0-9]{1,8}", 0..6)
                .prop_flat_map(|tags| {
                    let original = tags.clone();
                    (Just(original), Just(tags).prop_shuffle())
                })
        ) {
            prop_assert_eq!(series_key("metric", &tags), series_key("metric", &shuffled));
        }

        #[test]
        fn counter_flush_is_the_sum(values in prop::collection::vec(0u32..1_000, 1..50)) {
            let mut agg = Aggregator::new(Vec::new());
            for v in &values {
                agg.add_point(MetricKind::Counter, "m", f64::from(*v), &[], "", Some(0))
                    .expect("add failed");
            }

            let series = agg.flush();
            prop_assert_eq!(series.len(), 1);
            let expected: f64 = values.iter().map(|v| f64::from(*v)).sum();
            prop_assert_eq!(series[0].points[0].1, expected);
        }

        #[test]
        fn gauge_flush_is_the_last_value(values in prop::collection::vec(0u32..1_000, 1..50)) {
            let mut agg = Aggregator::new(Vec::new());
            for v in &values {
                agg.add_point(MetricKind::Gauge, "m", f64::from(*v), &[], "", Some(0))
                    .expect("add failed");
            }

            let series = agg.flush();
            prop_assert_eq!(series.len(), 1);
            let last = f64::from(*values.last().expect("non-empty by construction"));
            prop_assert_eq!(series[0].points[0].1, last);
        }
    }
}
