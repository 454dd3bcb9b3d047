//! Armreach Zenoh - Zenoh transport wrapper for the armreach engine
//!
//! Serves the JSON solve contract over a Zenoh queryable, provides the
//! client backend that lets sessions solve remotely (falling back to the
//! local engine when nobody answers) and publishes session telemetry.

pub mod rpc_service;
pub mod telemetry;

// Re-export core functionality
pub use armreach_core::{
    EngineConfig, IkSessionController, ReachError, ReachService, Result, SessionTelemetry,
    SolveBackend, SolveRequest, SolveResponse, Toolpath,
};

// Zenoh-specific exports
pub use rpc_service::{
    PublisherInfo, ServiceDiscoveryResponse, ServiceInfo, ZenohSolveBackend, ZenohSolveService,
    DISCOVER_KEY, SOLVE_KEY,
};
pub use telemetry::{ZenohTelemetry, DEFAULT_TOPIC_PREFIX};
