//! Telemetry abstraction for solve sessions
//!
//! Session state transitions and progress are published through a trait so
//! the engine can feed any progress UI or transport (Zenoh, console, ...).

use crate::session::SessionState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One session state transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: Uuid,
    pub state: SessionState,
    pub previous: SessionState,
    pub message: Option<String>,
    pub elapsed_secs: f64,
    pub timestamp: DateTime<Utc>,
}

/// Batch progress within a computing session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressData {
    pub session_id: Uuid,
    pub solved: usize,
    pub total: usize,
    pub elapsed_secs: f64,
    pub timestamp: DateTime<Utc>,
}

/// Trait for publishing session telemetry
#[async_trait]
pub trait SessionTelemetry: Send + Sync {
    async fn publish_state(&self, event: &SessionEvent) -> anyhow::Result<()>;

    async fn publish_progress(&self, data: &ProgressData) -> anyhow::Result<()>;

    /// Optional: publish custom telemetry data
    async fn publish_custom(&self, topic: &str, data: &serde_json::Value) -> anyhow::Result<()> {
        let _ = (topic, data);
        Ok(())
    }
}

/// Discards all telemetry
#[derive(Debug, Clone)]
pub struct NoOpTelemetry;

#[async_trait]
impl SessionTelemetry for NoOpTelemetry {
    async fn publish_state(&self, _event: &SessionEvent) -> anyhow::Result<()> {
        Ok(())
    }

    async fn publish_progress(&self, _data: &ProgressData) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Prints telemetry to stderr as JSON, keeping stdout for results
#[derive(Debug, Clone)]
pub struct ConsoleTelemetry {
    pub pretty_print: bool,
}

impl ConsoleTelemetry {
    pub fn new() -> Self {
        Self { pretty_print: false }
    }

    pub fn pretty() -> Self {
        Self { pretty_print: true }
    }

    fn render<T: Serialize>(&self, data: &T) -> serde_json::Result<String> {
        if self.pretty_print {
            serde_json::to_string_pretty(data)
        } else {
            serde_json::to_string(data)
        }
    }
}

impl Default for ConsoleTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionTelemetry for ConsoleTelemetry {
    async fn publish_state(&self, event: &SessionEvent) -> anyhow::Result<()> {
        eprintln!("[STATE] {}", self.render(event)?);
        Ok(())
    }

    async fn publish_progress(&self, data: &ProgressData) -> anyhow::Result<()> {
        eprintln!("[PROGRESS] {}", self.render(data)?);
        Ok(())
    }

    async fn publish_custom(&self, topic: &str, data: &serde_json::Value) -> anyhow::Result<()> {
        eprintln!("[{}] {}", topic, self.render(data)?);
        Ok(())
    }
}
