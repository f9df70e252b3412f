//! Observer hooks for conversion events.
//!
//! Inject an [`ObserverHandle`] via
//! [`crate::config::ConverterConfigBuilder::observer`] to receive an event
//! when a conversion starts, after every engine attempt, and a
//! [`TelemetryEvent`] when the conversion finishes. The library does not
//! aggregate anything; forwarding events to a metrics backend is the host's
//! job.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docconv::{ConversionObserver, ConverterConfig, TelemetryEvent};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Failures(AtomicUsize);
//!
//! impl ConversionObserver for Failures {
//!     fn on_conversion_complete(&self, event: &TelemetryEvent) {
//!         if !event.success {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let config = ConverterConfig::builder()
//!     .observer(Arc::new(Failures(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::format::FormatPair;
use crate::output::{EngineAttempt, ErrorInfo};

/// Summary handed to the telemetry collaborator after every conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Operation name, e.g. `"convert:docx→pdf"`.
    pub operation: String,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Receives conversion lifecycle events.
///
/// Implementations must be `Send + Sync`: batch conversions call these
/// methods concurrently from different tasks. Every method defaults to a
/// no-op.
pub trait ConversionObserver: Send + Sync {
    /// Called once the request has been validated, before the gate is taken.
    fn on_conversion_start(&self, pair: FormatPair) {
        let _ = pair;
    }

    /// Called after each engine in the fallback chain finishes.
    fn on_attempt(&self, attempt: &EngineAttempt) {
        let _ = attempt;
    }

    /// Called exactly once per request, on success and on failure.
    fn on_conversion_complete(&self, event: &TelemetryEvent) {
        let _ = event;
    }
}

/// Used when no observer is configured.
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {}

/// Writes every event to the `tracing` subscriber.
pub struct TracingObserver;

impl ConversionObserver for TracingObserver {
    fn on_conversion_start(&self, pair: FormatPair) {
        debug!(%pair, "conversion started");
    }

    fn on_attempt(&self, attempt: &EngineAttempt) {
        match &attempt.error {
            None => debug!(engine = %attempt.engine, ms = attempt.duration_ms, "engine attempt succeeded"),
            Some(err) => debug!(engine = %attempt.engine, ms = attempt.duration_ms, kind = %err.kind, "engine attempt failed"),
        }
    }

    fn on_conversion_complete(&self, event: &TelemetryEvent) {
        match &event.error {
            None => info!(operation = %event.operation, ms = event.duration_ms, "conversion telemetry"),
            Some(err) => warn!(
                operation = %event.operation,
                ms = event.duration_ms,
                kind = %err.kind,
                message = %err.message,
                "conversion telemetry"
            ),
        }
    }
}

/// Type stored in [`crate::config::ConverterConfig`].
pub type ObserverHandle = Arc<dyn ConversionObserver>;

pub(crate) fn operation_name(pair: Option<FormatPair>) -> String {
    match pair {
        Some(pair) => format!("convert:{pair}"),
        None => "convert:invalid".to_string(),
    }
}
