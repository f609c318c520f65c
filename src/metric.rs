//! The three metric accumulators.
//!
//! Each accumulator gathers observations for a single series between two
//! flushes. An accumulator exists only after the first point lands on its
//! series and is discarded wholesale when its owning
//! [`Aggregator`](crate::aggregator::Aggregator) flushes, so `flush` here
//! consumes the accumulator rather than resetting it in place.

use crate::series::{PointKind, SeriesPoint, posix_timestamp};

/// Percentiles summarized by a flushed [`Histogram`], fixed by the intake
/// naming convention.
const PERCENTILES: [f64; 4] = [0.75, 0.85, 0.95, 0.99];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The kinds of accumulation a series may use.
pub enum MetricKind {
    /// Last value in the window wins.
    Gauge,
    /// Values sum over the window.
    Counter,
    /// Distribution summary: min/max/sum/count/avg plus percentiles.
    Histogram,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Histogram => write!(f, "histogram"),
        }
    }
}

#[derive(Debug)]
/// A live accumulator for one series.
pub(crate) enum Accumulator {
    Gauge(Gauge),
    Counter(Counter),
    Histogram(Histogram),
}

impl Accumulator {
    /// Factory keyed on [`MetricKind`].
    pub(crate) fn new(kind: MetricKind, name: String, tags: Vec<String>, host: String) -> Self {
        let common = Common { name, tags, host, timestamp: 0 };
        match kind {
            MetricKind::Gauge => Accumulator::Gauge(Gauge { common, value: 0.0 }),
            MetricKind::Counter => Accumulator::Counter(Counter { common, value: 0.0 }),
            MetricKind::Histogram => Accumulator::Histogram(Histogram {
                common,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
                sum: 0.0,
                count: 0,
                samples: Vec::new(),
            }),
        }
    }

    pub(crate) fn kind(&self) -> MetricKind {
        match self {
            Accumulator::Gauge(_) => MetricKind::Gauge,
            Accumulator::Counter(_) => MetricKind::Counter,
            Accumulator::Histogram(_) => MetricKind::Histogram,
        }
    }

    pub(crate) fn add_point(&mut self, value: f64, timestamp_millis: Option<u64>) {
        match self {
            Accumulator::Gauge(g) => g.add_point(value, timestamp_millis),
            Accumulator::Counter(c) => c.add_point(value, timestamp_millis),
            Accumulator::Histogram(h) => h.add_point(value, timestamp_millis),
        }
    }

    /// Drain this accumulator into series points. Consuming; a series that
    /// reappears after a flush starts from a brand-new accumulator.
    pub(crate) fn flush(self) -> Vec<SeriesPoint> {
        match self {
            Accumulator::Gauge(g) => g.flush(),
            Accumulator::Counter(c) => c.flush(),
            Accumulator::Histogram(h) => h.flush(),
        }
    }
}

#[derive(Debug)]
/// State shared by all accumulator variants.
struct Common {
    name: String,
    /// Tags in arrival order, not the sort-normalized key form.
    tags: Vec<String>,
    host: String,
    /// Posix seconds of the most recent point.
    timestamp: u64,
}

impl Common {
    fn update_timestamp(&mut self, timestamp_millis: Option<u64>) {
        self.timestamp = posix_timestamp(timestamp_millis);
    }

    fn point(&self, name: String, value: f64, kind: PointKind) -> SeriesPoint {
        SeriesPoint {
            metric: name,
            points: vec![(self.timestamp, value)],
            kind,
            host: self.host.clone(),
            tags: self.tags.clone(),
        }
    }
}

#[derive(Debug)]
/// Last-write-wins accumulator.
pub(crate) struct Gauge {
    common: Common,
    value: f64,
}

impl Gauge {
    fn add_point(&mut self, value: f64, timestamp_millis: Option<u64>) {
        self.value = value;
        self.common.update_timestamp(timestamp_millis);
    }

    fn flush(self) -> Vec<SeriesPoint> {
        let name = self.common.name.clone();
        vec![self.common.point(name, self.value, PointKind::Gauge)]
    }
}

#[derive(Debug)]
/// Sum-accumulating counter.
pub(crate) struct Counter {
    common: Common,
    value: f64,
}

impl Counter {
    fn add_point(&mut self, value: f64, timestamp_millis: Option<u64>) {
        self.value += value;
        self.common.update_timestamp(timestamp_millis);
    }

    fn flush(self) -> Vec<SeriesPoint> {
        let name = self.common.name.clone();
        vec![self.common.point(name, self.value, PointKind::Count)]
    }
}

#[derive(Debug)]
/// Distribution summary over the window.
///
/// Raw samples are retained unbounded in arrival order; memory grows with
/// sample volume between flushes. That tradeoff is accepted, not a bug.
pub(crate) struct Histogram {
    common: Common,
    min: f64,
    max: f64,
    sum: f64,
    count: u64,
    samples: Vec<f64>,
}

impl Histogram {
    fn add_point(&mut self, value: f64, timestamp_millis: Option<u64>) {
        self.common.update_timestamp(timestamp_millis);

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
        self.samples.push(value);
    }

    #[allow(clippy::cast_precision_loss)]
    fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn flush(mut self) -> Vec<SeriesPoint> {
        // A zero-sample histogram has no min/max and no ranked samples to
        // select from. Unreachable through the aggregator, which only creates
        // an accumulator on the first point, but guarded all the same.
        if self.count == 0 {
            return Vec::new();
        }

        let name = self.common.name.clone();
        let mut series = vec![
            self.common
                .point(format!("{name}.min"), self.min, PointKind::Gauge),
            self.common
                .point(format!("{name}.max"), self.max, PointKind::Gauge),
            self.common
                .point(format!("{name}.sum"), self.sum, PointKind::Gauge),
            self.common
                .point(format!("{name}.count"), self.count as f64, PointKind::Count),
            self.common
                .point(format!("{name}.avg"), self.average(), PointKind::Gauge),
        ];

        // Numeric, not lexicographic, ordering of the raw samples.
        self.samples.sort_by(f64::total_cmp);

        for p in PERCENTILES {
            // Nearest-rank: 1-indexed rank round(p * n), converted to
            // 0-indexed. With count >= 1 and p >= 0.75 the rank is >= 1.
            let rank = (p * self.samples.len() as f64).round() as usize;
            let value = self.samples[rank - 1];
            let label = (p * 100.0).floor() as u32;
            series.push(self.common.point(
                format!("{name}.{label}percentile"),
                value,
                PointKind::Gauge,
            ));
        }

        series
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulator(kind: MetricKind) -> Accumulator {
        Accumulator::new(
            kind,
            "app.metric".to_string(),
            vec!["env:test".to_string()],
            "host-a".to_string(),
        )
    }

    #[test]
    fn gauge_keeps_last_value_only() {
        let mut acc = accumulator(MetricKind::Gauge);
        acc.add_point(1.0, Some(1_000));
        acc.add_point(2.0, Some(2_000));
        acc.add_point(3.0, Some(3_000));

        let series = acc.flush();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].metric, "app.metric");
        assert_eq!(series[0].kind, PointKind::Gauge);
        assert_eq!(series[0].points, vec![(3, 3.0)]);
        assert_eq!(series[0].host, "host-a");
        assert_eq!(series[0].tags, vec!["env:test".to_string()]);
    }

    #[test]
    fn counter_sums_over_the_window() {
        let mut acc = accumulator(MetricKind::Counter);
        for value in [1.0, 2.0, 3.0, 4.0] {
            acc.add_point(value, Some(5_000));
        }

        let series = acc.flush();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].kind, PointKind::Count);
        assert_eq!(series[0].points, vec![(5, 10.0)]);
    }

    #[test]
    fn histogram_summarizes_distribution() {
        let mut acc = accumulator(MetricKind::Histogram);
        // Out of arrival order on purpose, flush must sort numerically.
        for value in [10.0, 1.0, 9.0, 2.0, 8.0, 3.0, 7.0, 4.0, 6.0, 5.0] {
            acc.add_point(value, Some(1_000));
        }

        let series = acc.flush();
        let by_name: Vec<(&str, f64)> = series
            .iter()
            .map(|s| (s.metric.as_str(), s.points[0].1))
            .collect();
        assert_eq!(
            by_name,
            vec![
                ("app.metric.min", 1.0),
                ("app.metric.max", 10.0),
                ("app.metric.sum", 55.0),
                ("app.metric.count", 10.0),
                ("app.metric.avg", 5.5),
                // round(0.75 * 10) - 1 = index 7 in the sorted samples.
                ("app.metric.75percentile", 8.0),
                ("app.metric.85percentile", 9.0),
                ("app.metric.95percentile", 10.0),
                ("app.metric.99percentile", 10.0),
            ]
        );

        // count is the only count-typed point in the batch.
        for point in &series {
            let expected = if point.metric.ends_with(".count") {
                PointKind::Count
            } else {
                PointKind::Gauge
            };
            assert_eq!(point.kind, expected);
        }
    }

    #[test]
    fn histogram_single_sample() {
        let mut acc = accumulator(MetricKind::Histogram);
        acc.add_point(42.0, Some(1_000));

        let series = acc.flush();
        // Every percentile of a single sample is that sample.
        for suffix in ["75", "85", "95", "99"] {
            let name = format!("app.metric.{suffix}percentile");
            let point = series
                .iter()
                .find(|s| s.metric == name)
                .expect("missing percentile point");
            assert_eq!(point.points[0].1, 42.0);
        }
    }

    #[test]
    fn empty_histogram_average_is_zero() {
        let Accumulator::Histogram(hist) = accumulator(MetricKind::Histogram) else {
            unreachable!("factory returned wrong variant");
        };
        assert_eq!(hist.average(), 0.0);
    }

    #[test]
    fn empty_histogram_flushes_nothing() {
        let acc = accumulator(MetricKind::Histogram);
        assert!(acc.flush().is_empty());
    }

    #[test]
    fn lexicographic_sort_would_be_wrong() {
        // 9.0 > 10.0 as strings; the numeric comparator must place 10 last.
        let mut acc = accumulator(MetricKind::Histogram);
        for value in [9.0, 10.0, 100.0, 2.0] {
            acc.add_point(value, Some(1_000));
        }

        let series = acc.flush();
        let p99 = series
            .iter()
            .find(|s| s.metric == "app.metric.99percentile")
            .expect("missing percentile point");
        assert_eq!(p99.points[0].1, 100.0);
    }
}
