//! The buffered metrics logger façade.
//!
//! [`BufferedLogger`] is what application code holds: typed convenience calls
//! for the three metric kinds, a manual [`flush`](BufferedLogger::flush), and
//! the auto-flush timer lifecycle. Points are cheap synchronous writes into
//! the aggregation buffer; only a flush touches the reporter.
//!
//! The timer is an explicit lifecycle: [`start`](BufferedLogger::start)
//! spawns a detached background task, [`stop`](BufferedLogger::stop) signals
//! it and waits for it to exit. The task is advisory; it cannot keep a
//! finished runtime alive and losing it loses nothing but cadence.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::aggregator::{self, Aggregator};
use crate::metric::MetricKind;
use crate::reporter::{self, DatadogReporter, Reporter};
use crate::signal;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
/// Configuration of a [`BufferedLogger`].
pub struct Config {
    /// Tags applied to every flushed point, ahead of per-point tags.
    #[serde(default)]
    pub default_tags: Vec<String>,
    /// Host stamped on every metric. Empty when unset.
    #[serde(default)]
    pub host: String,
    /// Prefix prepended to every metric name.
    #[serde(default)]
    pub prefix: String,
    /// Auto-flush cadence in seconds. Unset disables the flush timer; callers
    /// must flush manually.
    #[serde(default)]
    pub flush_interval_seconds: Option<u64>,
    /// Intake API key for the default reporter. Falls back to the
    /// `DATADOG_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Intake site for the default reporter, e.g. `https://api.datadoghq.eu`.
    /// Unset means the public US intake.
    #[serde(default)]
    pub site: Option<String>,
}

/// Errors produced by [`BufferedLogger`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Wrapper around [`aggregator::Error`].
    #[error(transparent)]
    Aggregator(#[from] aggregator::Error),
    /// Wrapper around [`reporter::Error`].
    #[error(transparent)]
    Reporter(#[from] reporter::Error),
}

/// State shared between the logger handle and the flush timer task.
#[derive(Debug)]
struct Inner<R> {
    aggregator: Mutex<Aggregator>,
    reporter: R,
    prefix: String,
    host: String,
}

#[derive(Debug)]
struct Timer {
    shutdown: signal::Broadcaster,
    handle: tokio::task::JoinHandle<()>,
}

#[derive(Debug)]
/// Buffering metrics logger.
///
/// Gauge, counter, and histogram observations accumulate in memory; a flush,
/// manual or timer-driven, drains the buffer into one batch and hands it to
/// the reporter.
pub struct BufferedLogger<R> {
    inner: Arc<Inner<R>>,
    flush_interval: Option<Duration>,
    timer: Option<Timer>,
}

impl BufferedLogger<DatadogReporter> {
    /// Create a logger wired to the default [`DatadogReporter`].
    ///
    /// # Errors
    ///
    /// Returns [`reporter::Error::MissingApiKey`] (wrapped) when no API key
    /// is configured or present in the environment. The logger never starts
    /// half-configured.
    pub fn new(config: Config) -> Result<Self, Error> {
        let reporter = DatadogReporter::new(config.api_key.clone(), config.site.as_deref())?;
        Ok(Self::with_reporter(config, reporter))
    }
}

impl<R> BufferedLogger<R>
where
    R: Reporter,
{
    /// Create a logger delivering through `reporter`, with the aggregator
    /// built from the config's default tags.
    pub fn with_reporter(config: Config, reporter: R) -> Self {
        let aggregator = Aggregator::new(config.default_tags.clone());
        Self::with_parts(config, aggregator, reporter)
    }

    /// Create a logger from explicit parts. Useful for tests that want to
    /// pre-seed or inspect the aggregator.
    pub fn with_parts(config: Config, aggregator: Aggregator, reporter: R) -> Self {
        if let Some(seconds) = config.flush_interval_seconds {
            debug!(interval_seconds = seconds, "auto-flush configured");
        } else {
            debug!("auto-flush disabled");
        }

        Self {
            inner: Arc::new(Inner {
                aggregator: Mutex::new(aggregator),
                reporter,
                prefix: config.prefix,
                host: config.host,
            }),
            flush_interval: config.flush_interval_seconds.map(Duration::from_secs),
            timer: None,
        }
    }

    /// Record the current value of `name`. The last value submitted in a
    /// flush window wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the series already accumulates under a different
    /// metric kind.
    pub fn gauge(
        &self,
        name: &str,
        value: f64,
        tags: &[String],
        timestamp_millis: Option<u64>,
    ) -> Result<(), Error> {
        self.add_point(MetricKind::Gauge, name, value, tags, timestamp_millis)
    }

    /// Add `value` (default 1) to the counter `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the series already accumulates under a different
    /// metric kind.
    pub fn increment(
        &self,
        name: &str,
        value: Option<f64>,
        tags: &[String],
        timestamp_millis: Option<u64>,
    ) -> Result<(), Error> {
        self.add_point(
            MetricKind::Counter,
            name,
            value.unwrap_or(1.0),
            tags,
            timestamp_millis,
        )
    }

    /// Sample `value` into the histogram `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the series already accumulates under a different
    /// metric kind.
    pub fn histogram(
        &self,
        name: &str,
        value: f64,
        tags: &[String],
        timestamp_millis: Option<u64>,
    ) -> Result<(), Error> {
        self.add_point(MetricKind::Histogram, name, value, tags, timestamp_millis)
    }

    fn add_point(
        &self,
        kind: MetricKind,
        name: &str,
        value: f64,
        tags: &[String],
        timestamp_millis: Option<u64>,
    ) -> Result<(), Error> {
        let name = format!("{}{name}", self.inner.prefix);
        self.inner
            .aggregator
            .lock()
            .expect("aggregator lock poisoned")
            .add_point(kind, &name, value, tags, &self.inner.host, timestamp_millis)?;
        Ok(())
    }

    /// Drain the buffer and deliver the batch.
    ///
    /// The buffer is reset before the reporter is called: points submitted
    /// while the report is in flight land in the next window. An empty buffer
    /// returns `Ok` without touching the reporter at all.
    ///
    /// # Errors
    ///
    /// Passes through the reporter's delivery error. The batch is not
    /// re-buffered on failure.
    pub async fn flush(&self) -> Result<(), Error> {
        let batch = self
            .inner
            .aggregator
            .lock()
            .expect("aggregator lock poisoned")
            .flush();

        if batch.is_empty() {
            debug!("nothing to flush");
            return Ok(());
        }

        debug!(points = batch.len(), "flushing series batch");
        self.inner.reporter.report(batch).await?;
        Ok(())
    }

    /// Start the flush lifecycle.
    ///
    /// Performs one immediate flush from a background task and, if an
    /// interval is configured, keeps flushing every interval until
    /// [`stop`](BufferedLogger::stop). The cadence is trigger-to-trigger:
    /// each report is spawned fire-and-forget so a slow intake does not
    /// stretch the interval. Calling `start` on a running logger is a no-op.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start(&mut self) {
        if self.timer.is_some() {
            return;
        }

        let (watcher, broadcaster) = signal::signal();
        let inner = Arc::clone(&self.inner);
        let interval = self.flush_interval;
        let handle = tokio::spawn(run_flush_timer(inner, interval, watcher));

        self.timer = Some(Timer {
            shutdown: broadcaster,
            handle,
        });
    }

    /// Stop the flush timer and wait for its task to exit.
    ///
    /// Points still buffered stay buffered; callers wanting a final drain
    /// should [`flush`](BufferedLogger::flush) after stopping. A report
    /// already in flight is not cancelled.
    pub async fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.shutdown.signal();
            // The task never panics; a JoinError here means the runtime is
            // already tearing down.
            let _ = timer.handle.await;
        }
    }
}

/// Body of the background flush task.
///
/// Flushes once immediately. Without an interval that is the whole job;
/// otherwise it is a self-rescheduling loop, sleeping the interval after each
/// flush and racing the shutdown signal.
async fn run_flush_timer<R>(inner: Arc<Inner<R>>, interval: Option<Duration>, shutdown: signal::Watcher)
where
    R: Reporter,
{
    let shutdown_wait = shutdown.recv();
    tokio::pin!(shutdown_wait);

    loop {
        flush_detached(&inner);

        let Some(period) = interval else {
            return;
        };

        tokio::select! {
            () = tokio::time::sleep(period) => {}
            () = &mut shutdown_wait => {
                info!("flush timer shutting down");
                return;
            }
        }
    }
}

/// Drain the buffer and spawn the report as its own task so report latency
/// never delays the next scheduled flush. Failures are logged and the batch
/// dropped.
fn flush_detached<R>(inner: &Arc<Inner<R>>)
where
    R: Reporter,
{
    let batch = inner
        .aggregator
        .lock()
        .expect("aggregator lock poisoned")
        .flush();

    if batch.is_empty() {
        debug!("nothing to flush");
        return;
    }

    debug!(points = batch.len(), "flushing series batch");
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        if let Err(err) = inner.reporter.report(batch).await {
            warn!(%err, "scheduled flush failed, dropping batch");
        }
    });
}
