// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Test helpers for asserting on emitted logs and metrics.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

/// Captures formatted log output for inspection in tests.
///
/// # Example
///
/// ```
/// use cohere_cache::testing::LogCapture;
///
/// let capture = LogCapture::new();
/// let _guard = tracing::subscriber::set_default(capture.subscriber());
///
/// tracing::info!(refresher.name = "template", "refresher.event");
/// capture.assert_contains("refresher.event");
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Creates an empty capture buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the captured log output.
    #[must_use]
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).to_string()
    }

    /// Asserts that the captured output contains `expected`.
    ///
    /// # Panics
    ///
    /// Panics if the output does not contain `expected`.
    pub fn assert_contains(&self, expected: &str) {
        let output = self.output();
        assert!(
            output.contains(expected),
            "log output does not contain '{expected}', got:\n{output}"
        );
    }

    /// Creates a subscriber writing into this buffer. Use with `set_default()` for thread-local capture.
    #[must_use]
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        use tracing_subscriber::layer::SubscriberExt;
        tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_writer(self.clone()).with_ansi(false))
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

/// Writer that appends to a [`LogCapture`] buffer.
#[derive(Debug)]
pub struct LogCaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(all(test, feature = "metrics"))]
pub(crate) use metric_tester::MetricTester;

#[cfg(all(test, feature = "metrics"))]
mod metric_tester {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData};
    use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};

    /// Collects `OTel` metrics in memory.
    #[derive(Debug)]
    pub(crate) struct MetricTester {
        exporter: InMemoryMetricExporter,
        provider: SdkMeterProvider,
    }

    impl MetricTester {
        pub fn new() -> Self {
            let exporter = InMemoryMetricExporter::default();
            Self {
                provider: SdkMeterProvider::builder().with_periodic_exporter(exporter.clone()).build(),
                exporter,
            }
        }

        pub fn meter_provider(&self) -> &SdkMeterProvider {
            &self.provider
        }

        pub fn assert_attributes_contain(&self, key_values: &[KeyValue]) {
            self.provider.force_flush().expect("flush metrics");

            let attributes: Vec<KeyValue> = self
                .exporter
                .get_finished_metrics()
                .expect("finished metrics")
                .iter()
                .flat_map(opentelemetry_sdk::metrics::data::ResourceMetrics::scope_metrics)
                .flat_map(opentelemetry_sdk::metrics::data::ScopeMetrics::metrics)
                .flat_map(|metric| match metric.data() {
                    AggregatedMetrics::U64(MetricData::Sum(data)) => {
                        data.data_points().flat_map(|p| p.attributes().cloned()).collect::<Vec<_>>()
                    }
                    _ => Vec::new(),
                })
                .collect();

            for attr in key_values {
                assert!(
                    attributes.contains(attr),
                    "attribute {attr:?} not found in collected attributes: {attributes:?}"
                );
            }
        }
    }
}
