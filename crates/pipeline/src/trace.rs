//! Per-run stage trace.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Classify,
    Scope,
    Retrieve,
    Rank,
    Budget,
    Assemble,
    Tag,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classify => "CLASSIFY",
            Self::Scope => "SCOPE",
            Self::Retrieve => "RETRIEVE",
            Self::Rank => "RANK",
            Self::Budget => "BUDGET",
            Self::Assemble => "ASSEMBLE",
            Self::Tag => "TAG",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageEvent {
    pub stage: Stage,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

/// Stage events for one assembly run.
#[derive(Debug, Clone)]
pub struct StageTrace {
    trace_id: String,
    events: Vec<StageEvent>,
}

impl StageTrace {
    pub fn new() -> Self {
        Self {
            trace_id: new_trace_id(),
            events: Vec::new(),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Record a finished stage that began at `started`.
    pub fn record(&mut self, stage: Stage, started: Instant, details: Value) {
        let duration_ms = (started.elapsed().as_secs_f64() * 100_000.0).round() / 100.0;
        debug!(trace_id = %self.trace_id, stage = %stage, duration_ms, "Stage complete");
        self.events.push(StageEvent {
            stage,
            duration_ms,
            details,
        });
    }

    pub fn events(&self) -> &[StageEvent] {
        &self.events
    }

    pub fn total_duration_ms(&self) -> f64 {
        self.events.iter().map(|e| e.duration_ms).sum()
    }

    pub fn into_events(self) -> Vec<StageEvent> {
        self.events
    }
}

impl Default for StageTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// `ctx-` followed by 12 lowercase hex digits.
pub fn new_trace_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("ctx-{}", &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trace_ids_have_the_expected_shape() {
        let id = new_trace_id();
        assert_eq!(id.len(), 16);
        assert!(id.starts_with("ctx-"));
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(new_trace_id(), new_trace_id());
    }

    #[test]
    fn events_keep_stage_order() {
        let mut trace = StageTrace::new();
        trace.record(Stage::Classify, Instant::now(), json!({"archetype": "worker"}));
        trace.record(Stage::Scope, Instant::now(), Value::Null);
        let stages: Vec<Stage> = trace.events().iter().map(|e| e.stage).collect();
        assert_eq!(stages, vec![Stage::Classify, Stage::Scope]);
        assert!(trace.total_duration_ms() >= 0.0);
    }

    #[test]
    fn events_serialize_with_uppercase_stage_names() {
        let mut trace = StageTrace::new();
        trace.record(Stage::Tag, Instant::now(), Value::Null);
        let value = serde_json::to_value(trace.events()).unwrap();
        assert_eq!(value[0]["stage"], "TAG");
        assert!(value[0].get("details").is_none());
    }
}
