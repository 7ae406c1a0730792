// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache telemetry.
//!
//! Every cache operation can be recorded as a structured `tracing` event and, with the `metrics` feature,
//! as an OpenTelemetry counter increment carrying the same attributes.

use std::sync::Arc;

use tracing::Level;

pub(crate) mod attributes;
#[cfg(feature = "metrics")]
pub(crate) mod metrics;

/// Records cache operations as logs and metrics.
///
/// Construct one per process and hand it to the cache builders. Cloning is cheap.
///
/// # Example
///
/// ```
/// use cohere_cache::CacheTelemetry;
///
/// let telemetry = CacheTelemetry::new(true);
/// assert!(telemetry.logging_enabled());
/// ```
#[derive(Clone, Debug)]
pub struct CacheTelemetry {
    inner: Arc<CacheTelemetryInner>,
}

#[derive(Debug)]
struct CacheTelemetryInner {
    logging_enabled: bool,
    #[cfg(feature = "metrics")]
    event_counter: Option<opentelemetry::metrics::Counter<u64>>,
}

impl Default for CacheTelemetry {
    fn default() -> Self {
        Self::new(true)
    }
}

impl CacheTelemetry {
    /// Creates telemetry that only emits logs, if `logging_enabled`.
    #[must_use]
    pub fn new(logging_enabled: bool) -> Self {
        Self {
            inner: Arc::new(CacheTelemetryInner {
                logging_enabled,
                #[cfg(feature = "metrics")]
                event_counter: None,
            }),
        }
    }

    /// Creates telemetry that emits logs, if `logging_enabled`, and metrics through `meter`.
    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn with_meter(logging_enabled: bool, meter: &opentelemetry::metrics::Meter) -> Self {
        Self {
            inner: Arc::new(CacheTelemetryInner {
                logging_enabled,
                event_counter: Some(metrics::create_event_counter(meter)),
            }),
        }
    }

    /// Creates telemetry that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(false)
    }

    /// Returns `true` if cache events are logged.
    #[must_use]
    pub fn logging_enabled(&self) -> bool {
        self.inner.logging_enabled
    }

    #[inline]
    pub(crate) fn record(&self, cache_name: &'static str, operation: CacheOperation, activity: CacheActivity) {
        #[cfg(feature = "metrics")]
        if let Some(counter) = &self.inner.event_counter {
            counter.add(
                1,
                &[
                    opentelemetry::KeyValue::new(attributes::CACHE_NAME, cache_name),
                    opentelemetry::KeyValue::new(attributes::CACHE_OPERATION_NAME, operation.as_str()),
                    opentelemetry::KeyValue::new(attributes::CACHE_ACTIVITY_NAME, activity.as_str()),
                ],
            );
        }

        if self.inner.logging_enabled {
            Self::emit(cache_name, operation, activity);
        }
    }

    fn emit(cache_name: &'static str, operation: CacheOperation, activity: CacheActivity) {
        let op = operation.as_str();
        let ev = activity.as_str();

        // Tracing level must be constant, so the level is selected through a macro.
        // Field names must match constants in attributes.rs.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(cache.name = cache_name, cache.operation = op, cache.activity = ev, "cache.event")
            };
        }

        let level = activity.level();
        if level == Level::ERROR {
            emit_event!(error);
        } else if level == Level::INFO {
            emit_event!(info);
        } else {
            emit_event!(debug);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheOperation {
    Get,
    Insert,
    Invalidate,
    Clear,
    Search,
}

impl CacheOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "cache.get",
            Self::Insert => "cache.insert",
            Self::Invalidate => "cache.invalidate",
            Self::Clear => "cache.clear",
            Self::Search => "cache.search",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    Hit,
    Miss,
    Coalesced,
    Absent,
    Inserted,
    Invalidated,
    Ok,
    Error,
}

impl CacheActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "cache.hit",
            Self::Miss => "cache.miss",
            Self::Coalesced => "cache.coalesced",
            Self::Absent => "cache.absent",
            Self::Inserted => "cache.inserted",
            Self::Invalidated => "cache.invalidated",
            Self::Ok => "cache.ok",
            Self::Error => "cache.error",
        }
    }

    pub fn level(self) -> Level {
        match self {
            Self::Hit | Self::Miss | Self::Coalesced | Self::Absent | Self::Ok => Level::DEBUG,
            Self::Inserted | Self::Invalidated => Level::INFO,
            Self::Error => Level::ERROR,
        }
    }
}
