//! Zenoh RPC service implementation for armreach
//!
//! Serves the JSON solve contract on `armreach/solve` and provides the
//! matching client backend so sessions can solve remotely.

use armreach_core::config::SessionConfig;
use armreach_core::{
    EngineConfig, ReachError, ReachService, SessionHandle, SolveBackend, SolveRequest,
    SolveResponse, TrajectoryResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use zenoh::{
    handlers::{RingChannel, RingChannelHandler},
    query::{Query, Queryable},
    Session,
};

pub const SOLVE_KEY: &str = "armreach/solve";
pub const DISCOVER_KEY: &str = "armreach/discover";

/// Service discovery response with RPC services and publishers
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceDiscoveryResponse {
    pub rpc_services: Vec<ServiceInfo>,
    pub publishers: Vec<PublisherInfo>,
}

/// Information about an available RPC service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub topic: String,
    pub name: String,
    pub description: String,
    pub request_schema: HashMap<String, String>,
    pub response_schema: HashMap<String, String>,
}

/// Information about an available publisher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherInfo {
    pub topic: String,
    pub name: String,
    pub description: String,
    pub message_schema: HashMap<String, String>,
    pub message_type: String,
}

fn schema(fields: &[(&str, &str)]) -> HashMap<String, String> {
    fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Zenoh RPC service answering solve requests with the local engine
pub struct ZenohSolveService {
    session: Session,
    reach_service: ReachService,
    shutdown_signal: Arc<AtomicBool>,
}

impl ZenohSolveService {
    pub async fn new(
        reach_service: ReachService,
        shutdown_signal: Arc<AtomicBool>,
    ) -> anyhow::Result<Self> {
        info!("Initializing Zenoh session for solve service");
        let session = zenoh::open(zenoh::Config::default())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open Zenoh session: {}", e))?;

        Ok(Self {
            session,
            reach_service,
            shutdown_signal,
        })
    }

    /// Start answering queries on `armreach/solve`
    pub async fn start_solve_service(&self) -> anyhow::Result<()> {
        info!("Starting solve service at '{}'", SOLVE_KEY);

        let reach_service = self.reach_service.clone();
        let shutdown_signal = Arc::clone(&self.shutdown_signal);
        let queryable = self
            .session
            .declare_queryable(SOLVE_KEY)
            .with(RingChannel::new(50))
            .complete(true)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to declare solve queryable: {}", e))?;

        tokio::spawn(async move {
            Self::handle_solve_queries(queryable, reach_service, shutdown_signal).await;
        });

        info!("Solve service started successfully");
        Ok(())
    }

    /// Start the service discovery service
    pub async fn start_discovery_service(&self) -> anyhow::Result<()> {
        info!("Starting service discovery service at '{}'", DISCOVER_KEY);

        let shutdown_signal = Arc::clone(&self.shutdown_signal);
        let queryable = self
            .session
            .declare_queryable(DISCOVER_KEY)
            .with(RingChannel::new(10))
            .complete(true)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to declare discovery queryable: {}", e))?;

        tokio::spawn(async move {
            Self::handle_discovery_queries(queryable, shutdown_signal).await;
        });

        info!("Service discovery service started successfully");
        Ok(())
    }

    async fn handle_solve_queries(
        queryable: Queryable<RingChannelHandler<Query>>,
        reach_service: ReachService,
        shutdown_signal: Arc<AtomicBool>,
    ) {
        info!("Solve RPC handler started, waiting for queries...");

        while !shutdown_signal.load(Ordering::Relaxed) {
            match queryable.recv_timeout(Duration::from_millis(100)) {
                Ok(Some(query)) => {
                    let service = reach_service.clone();
                    tokio::spawn(async move {
                        Self::process_solve_query(query, service).await;
                    });
                }
                // Timeout or error, loop to check shutdown
                Ok(None) | Err(_) => continue,
            }
        }

        info!("Solve RPC handler shutting down");
    }

    async fn handle_discovery_queries(
        queryable: Queryable<RingChannelHandler<Query>>,
        shutdown_signal: Arc<AtomicBool>,
    ) {
        while !shutdown_signal.load(Ordering::Relaxed) {
            match queryable.recv_timeout(Duration::from_millis(100)) {
                Ok(Some(query)) => {
                    tokio::spawn(async move {
                        Self::process_discovery_query(query).await;
                    });
                }
                Ok(None) | Err(_) => continue,
            }
        }

        info!("Service discovery handler shutting down");
    }

    async fn process_solve_query(query: Query, reach_service: ReachService) {
        let start_time = std::time::Instant::now();

        let request: SolveRequest = match Self::parse_query_payload(&query) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejecting malformed solve request: {}", e);
                Self::reply(&query, &SolveResponse::error(format!("Invalid request: {}", e))).await;
                return;
            }
        };

        let waypoints = request.waypoints.len();
        // IK is CPU bound, keep it off the runtime workers
        let solve = tokio::task::spawn_blocking(move || reach_service.solve_request(&request));
        let response = match solve.await {
            Ok(result) => SolveResponse::Solved(result),
            Err(e) => {
                error!("Solve task failed: {}", e);
                SolveResponse::error(ReachError::from(e).to_string())
            }
        };

        debug!(
            "Answered solve request for {} waypoints in {}ms",
            waypoints,
            start_time.elapsed().as_millis()
        );
        Self::reply(&query, &response).await;
    }

    async fn process_discovery_query(query: Query) {
        let response = ServiceDiscoveryResponse {
            rpc_services: Self::get_rpc_services(),
            publishers: Self::get_publishers(),
        };

        match serde_json::to_string(&response) {
            Ok(json) => {
                if let Err(e) = query.reply(query.key_expr().clone(), json).await {
                    error!("Failed to send discovery response: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize discovery response: {}", e),
        }
    }

    fn get_rpc_services() -> Vec<ServiceInfo> {
        vec![ServiceInfo {
            topic: SOLVE_KEY.to_string(),
            name: "solve".to_string(),
            description: "Solve tool-tip waypoints (robot base frame, meters) into joint vectors"
                .to_string(),
            request_schema: schema(&[
                ("waypoints", "array<waypoint>"),
                ("tcpOffset", "tcp_offset"),
                ("initialGuess", "optional<[f64; 6]>"),
                ("chunkStart", "optional<usize>"),
                ("chunkSize", "optional<usize>"),
            ]),
            response_schema: schema(&[
                ("trajectory", "array<optional<[f64; 6]>>"),
                ("reachability", "array<bool>"),
                ("reachableCount", "usize"),
                ("totalPoints", "usize"),
                ("reachabilityPercent", "f64"),
                ("error", "optional<string>"),
            ]),
        }]
    }

    fn get_publishers() -> Vec<PublisherInfo> {
        vec![
            PublisherInfo {
                topic: "armreach/session/state".to_string(),
                name: "state".to_string(),
                description: "Solve session state transitions".to_string(),
                message_schema: schema(&[
                    ("session_id", "uuid"),
                    ("state", "string"),
                    ("previous", "string"),
                    ("message", "optional<string>"),
                    ("elapsed_secs", "f64"),
                ]),
                message_type: "SessionEvent".to_string(),
            },
            PublisherInfo {
                topic: "armreach/session/progress".to_string(),
                name: "progress".to_string(),
                description: "Waypoints solved so far in a computing session".to_string(),
                message_schema: schema(&[
                    ("session_id", "uuid"),
                    ("solved", "usize"),
                    ("total", "usize"),
                    ("elapsed_secs", "f64"),
                ]),
                message_type: "ProgressData".to_string(),
            },
        ]
    }

    fn parse_query_payload<T: for<'de> Deserialize<'de>>(query: &Query) -> anyhow::Result<T> {
        let payload = query
            .payload()
            .ok_or_else(|| anyhow::anyhow!("query carries no payload"))?
            .to_bytes();
        Ok(serde_json::from_slice(&payload)?)
    }

    async fn reply(query: &Query, response: &SolveResponse) {
        match serde_json::to_string(response) {
            Ok(json) => {
                if let Err(e) = query.reply(query.key_expr().clone(), json).await {
                    error!("Failed to send solve response: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize solve response: {}", e),
        }
    }
}

/// Session backend that solves over Zenoh
///
/// With a chunk size set, long requests are split so a cancelled session
/// stops after the chunk in flight.
pub struct ZenohSolveBackend {
    session: Session,
    key: String,
    timeout: Duration,
    chunk_size: Option<usize>,
}

impl ZenohSolveBackend {
    pub async fn new() -> anyhow::Result<Self> {
        let session = zenoh::open(zenoh::Config::default())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open Zenoh session: {}", e))?;
        Ok(Self::with_session(session))
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session,
            key: SOLVE_KEY.to_string(),
            timeout: SessionConfig::default().remote_query_timeout(),
            chunk_size: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Query timeout and chunk size taken from the engine configuration
    pub fn with_engine_config(self, config: &EngineConfig) -> Self {
        self.with_timeout(config.session().remote_query_timeout())
            .with_chunk_size(config.batch().chunk_size())
    }

    /// Split requests into chunks of `size` waypoints (0 disables chunking)
    pub fn with_chunk_size(mut self, size: Option<usize>) -> Self {
        self.chunk_size = size.filter(|s| *s > 0);
        self
    }

    /// One query, racing the session's abort flag
    async fn query(
        &self,
        request: &SolveRequest,
        handle: &SessionHandle,
    ) -> armreach_core::Result<TrajectoryResult> {
        let cancelled = async {
            while !handle.is_cancelled() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };

        tokio::select! {
            result = self.query_once(request) => result,
            _ = cancelled => Err(ReachError::Cancelled),
        }
    }

    async fn query_once(&self, request: &SolveRequest) -> armreach_core::Result<TrajectoryResult> {
        let payload = serde_json::to_string(request)?;
        let replies = self
            .session
            .get(&self.key)
            .payload(payload)
            .timeout(self.timeout)
            .await
            .map_err(|e| {
                ReachError::SolverUnavailable(format!("failed to query {}: {}", self.key, e))
            })?;

        while let Ok(reply) = replies.recv_async().await {
            match reply.into_result() {
                Ok(sample) => {
                    let response: SolveResponse =
                        serde_json::from_slice(&sample.payload().to_bytes()).map_err(|e| {
                            ReachError::SolverUnavailable(format!("unreadable reply: {}", e))
                        })?;
                    return response.into_result();
                }
                Err(e) => warn!("Error reply from {}: {:?}", self.key, e),
            }
        }

        Err(ReachError::SolverUnavailable(format!("no reply from {}", self.key)))
    }
}

#[async_trait]
impl SolveBackend for ZenohSolveBackend {
    fn name(&self) -> &str {
        "zenoh"
    }

    async fn solve(
        &self,
        request: &SolveRequest,
        handle: &SessionHandle,
    ) -> armreach_core::Result<TrajectoryResult> {
        let size = match self.chunk_size {
            Some(size) if !request.is_chunked() && request.waypoints.len() > size => size,
            _ => {
                let result = self.query(request, handle).await?;
                handle.progress_counter().store(result.len(), Ordering::Relaxed);
                return Ok(result);
            }
        };

        let mut result = TrajectoryResult::default();
        let mut seed = request.initial_guess;
        for start in (0..request.waypoints.len()).step_by(size) {
            if handle.is_cancelled() {
                return Err(ReachError::Cancelled);
            }

            let chunk_request = request.clone().with_initial_guess(seed).with_chunk(start, size);
            let chunk = self.query(&chunk_request, handle).await?;
            seed = chunk.last_reachable().or(seed);
            result.append(chunk);
            handle.progress_counter().store(result.len(), Ordering::Relaxed);
            debug!("Received chunk at {} ({} solved)", start, result.len());
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_lists_solve_contract_fields() {
        let services = ZenohSolveService::get_rpc_services();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].topic, SOLVE_KEY);
        for field in ["waypoints", "tcpOffset", "initialGuess", "chunkStart", "chunkSize"] {
            assert!(services[0].request_schema.contains_key(field), "{}", field);
        }
        assert!(services[0].response_schema.contains_key("reachabilityPercent"));
    }

    #[test]
    fn publishers_match_telemetry_topics() {
        let topics: Vec<String> = ZenohSolveService::get_publishers()
            .into_iter()
            .map(|p| p.topic)
            .collect();
        assert_eq!(
            topics,
            vec![
                format!("{}/state", crate::telemetry::DEFAULT_TOPIC_PREFIX),
                format!("{}/progress", crate::telemetry::DEFAULT_TOPIC_PREFIX),
            ]
        );
    }
}
