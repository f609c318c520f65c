//! Delivery of flushed batches to a metrics sink.
//!
//! The aggregation core hands a fully-owned batch to a [`Reporter`] and is
//! done with it: no retry, no re-buffering. A failed batch is lost, which is
//! the accepted policy for best-effort telemetry.

use std::future::Future;

use tracing::debug;

use crate::series::SeriesPoint;

/// Default intake endpoint for [`DatadogReporter`].
const DEFAULT_SITE: &str = "https://api.datadoghq.com";

/// Errors produced by reporters.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No API key was configured and `DATADOG_API_KEY` is unset.
    #[error("no api_key configured and DATADOG_API_KEY environment variable not set")]
    MissingApiKey,
    /// Transport-level failure talking to the intake.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),
    /// The intake rejected the batch.
    #[error("series intake rejected batch: status {status}: {body}")]
    Status {
        /// HTTP status returned by the intake.
        status: u16,
        /// Response body, best effort.
        body: String,
    },
}

/// Capability to deliver a flushed batch to a sink.
///
/// Exactly one outcome per call: `Ok` once the sink has accepted the batch,
/// `Err` otherwise. Implementations take ownership of the batch; the
/// aggregation buffer it came from was reset before this call began.
pub trait Reporter: Send + Sync + 'static {
    /// Deliver `series` to the sink.
    fn report(&self, series: Vec<SeriesPoint>) -> impl Future<Output = Result<(), Error>> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
/// Discards every batch, reporting success. For tests and disabled telemetry.
pub struct NullReporter;

impl Reporter for NullReporter {
    async fn report(&self, _series: Vec<SeriesPoint>) -> Result<(), Error> {
        Ok(())
    }
}

/// Resolve the intake API key: explicit configuration wins, the environment
/// is the fallback, absence is fatal.
fn resolve_api_key(explicit: Option<String>, env: Option<String>) -> Result<String, Error> {
    explicit.or(env).ok_or(Error::MissingApiKey)
}

#[derive(Debug, Clone)]
/// Posts batches to the Datadog series intake API.
pub struct DatadogReporter {
    client: reqwest::Client,
    api_key: String,
    series_url: String,
}

impl DatadogReporter {
    /// Create a [`DatadogReporter`] posting to `site`, or the public intake
    /// when `site` is unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingApiKey`] when `api_key` is unset and the
    /// `DATADOG_API_KEY` environment variable is too. Construction fails
    /// rather than letting a half-configured reporter limp along.
    pub fn new(api_key: Option<String>, site: Option<&str>) -> Result<Self, Error> {
        let api_key = resolve_api_key(api_key, std::env::var("DATADOG_API_KEY").ok())?;
        let site = site.unwrap_or(DEFAULT_SITE).trim_end_matches('/');

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            series_url: format!("{site}/api/v1/series"),
        })
    }
}

impl Reporter for DatadogReporter {
    async fn report(&self, series: Vec<SeriesPoint>) -> Result<(), Error> {
        debug!(points = series.len(), url = %self.series_url, "posting series batch");

        let response = self
            .client
            .post(&self.series_url)
            .header("DD-API-KEY", &self.api_key)
            .json(&serde_json::json!({ "series": series }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(status = %status, "series intake accepted batch");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}
