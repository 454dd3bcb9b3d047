//! Zenoh telemetry publisher for solve sessions

use anyhow::Result;
use armreach_core::telemetry::{ProgressData, SessionEvent, SessionTelemetry};
use async_trait::async_trait;
use tracing::{debug, error};
use zenoh::{pubsub::Publisher, Session};

pub const DEFAULT_TOPIC_PREFIX: &str = "armreach/session";

/// Publishes session transitions and progress to Zenoh topics
pub struct ZenohTelemetry {
    session: Session,
    state_publisher: Publisher<'static>,
    progress_publisher: Publisher<'static>,
}

impl ZenohTelemetry {
    pub async fn new(topic_prefix: &str) -> Result<Self> {
        let session = zenoh::open(zenoh::Config::default())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open Zenoh session: {}", e))?;
        Self::with_session(session, topic_prefix).await
    }

    /// Share an already open session
    pub async fn with_session(session: Session, topic_prefix: &str) -> Result<Self> {
        let state_publisher = session
            .declare_publisher(format!("{}/state", topic_prefix))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create state publisher: {}", e))?;

        let progress_publisher = session
            .declare_publisher(format!("{}/progress", topic_prefix))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create progress publisher: {}", e))?;

        Ok(Self {
            session,
            state_publisher,
            progress_publisher,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

#[async_trait]
impl SessionTelemetry for ZenohTelemetry {
    async fn publish_state(&self, event: &SessionEvent) -> Result<()> {
        let json = serde_json::to_string(event)
            .map_err(|e| anyhow::anyhow!("Failed to serialize session event: {}", e))?;

        self.state_publisher.put(json).await.map_err(|e| {
            error!("Failed to publish session event to Zenoh: {}", e);
            anyhow::anyhow!("Zenoh publish failed: {}", e)
        })?;

        debug!("Published session state {} to Zenoh", event.state);
        Ok(())
    }

    async fn publish_progress(&self, data: &ProgressData) -> Result<()> {
        let json = serde_json::to_string(data)
            .map_err(|e| anyhow::anyhow!("Failed to serialize progress data: {}", e))?;

        self.progress_publisher.put(json).await.map_err(|e| {
            error!("Failed to publish progress to Zenoh: {}", e);
            anyhow::anyhow!("Zenoh publish failed: {}", e)
        })?;

        Ok(())
    }

    async fn publish_custom(&self, topic: &str, data: &serde_json::Value) -> Result<()> {
        let json = serde_json::to_string(data)
            .map_err(|e| anyhow::anyhow!("Failed to serialize custom data: {}", e))?;

        self.session.put(topic, json).await.map_err(|e| {
            error!("Failed to publish custom data to Zenoh topic {}: {}", topic, e);
            anyhow::anyhow!("Zenoh publish failed: {}", e)
        })?;

        debug!("Published custom data to Zenoh topic: {}", topic);
        Ok(())
    }
}
