//! Stage telemetry events.
//!
//! The coordinator reports stage starts and completions through a
//! [`TelemetrySink`]. Events carry a per-analysis sequence number that
//! increases by one per event, so consumers can detect gaps and reorder
//! lines read from interleaved streams.

use chrono::{DateTime, Utc};
use geohis_common::Stage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Standard event names.
pub mod event_names {
    pub const ANALYSIS_STARTED: &str = "analysis_started";
    pub const ANALYSIS_COMPLETED: &str = "analysis_completed";
    pub const ANALYSIS_FAILED: &str = "analysis_failed";
    pub const ANALYSIS_CANCELLED: &str = "analysis_cancelled";

    pub const STAGE_STARTED: &str = "stage_started";
    pub const STAGE_COMPLETED: &str = "stage_completed";

    pub const FACTOR_DROPPED: &str = "factor_dropped";
}

/// One telemetry event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub seq: u64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
}

impl StageEvent {
    pub fn new(event: impl Into<String>, stage: Option<Stage>) -> Self {
        Self {
            seq: 0,
            event: event.into(),
            stage,
            session_id: String::new(),
            timestamp: Utc::now(),
            elapsed_ms: None,
            details: BTreeMap::new(),
        }
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
        }
        self
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// Receiver of telemetry events.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: StageEvent);
}

/// Writes one JSON object per line.
pub struct JsonlSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> TelemetrySink for JsonlSink<W> {
    fn emit(&self, event: StageEvent) {
        let line = event.to_jsonl();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
            let _ = writer.flush();
        }
    }
}

/// Forwards events to several sinks.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }
}

impl TelemetrySink for FanoutSink {
    fn emit(&self, event: StageEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<StageEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StageEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for CollectingSink {
    fn emit(&self, event: StageEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Per-analysis emitter: stamps session id, sequence number and elapsed
/// time, then forwards to the sink (if any).
pub struct EventStream {
    session_id: String,
    sink: Option<Arc<dyn TelemetrySink>>,
    next_seq: AtomicU64,
    started: Instant,
}

impl EventStream {
    pub fn new(session_id: impl Into<String>, sink: Option<Arc<dyn TelemetrySink>>) -> Self {
        Self {
            session_id: session_id.into(),
            sink,
            next_seq: AtomicU64::new(1),
            started: Instant::now(),
        }
    }

    /// A stream that discards events.
    pub fn disabled() -> Self {
        Self::new(String::new(), None)
    }

    pub fn emit(&self, mut event: StageEvent) {
        let Some(sink) = &self.sink else {
            return;
        };
        event.seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        event.session_id = self.session_id.clone();
        if event.elapsed_ms.is_none() {
            event.elapsed_ms = Some(self.started.elapsed().as_millis() as u64);
        }
        sink.emit(event);
    }

    pub fn stage_started(&self, stage: Stage) {
        self.emit(StageEvent::new(event_names::STAGE_STARTED, Some(stage)));
    }

    pub fn stage_completed(&self, stage: Stage, details: &[(&str, Value)]) {
        let mut event = StageEvent::new(event_names::STAGE_COMPLETED, Some(stage));
        for (key, value) in details {
            event.details.insert(key.to_string(), value.clone());
        }
        self.emit(event);
    }
}
