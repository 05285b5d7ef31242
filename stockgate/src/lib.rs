//! # stockgate — gateway toolkit for unreliable stock-media provider APIs
//!
//! `stockgate` fronts calls to third-party content providers (stock-media
//! and licensing APIs) with two coupled responsibilities: an HTTP response
//! cache with status-aware TTLs and stale-while-revalidate semantics, and
//! real-time detection of provider outages (5xx spikes, rate-limit storms,
//! timeout spikes, connection failures) with incident lifecycle tracking.
//!
//! ## Features
//!
//! - **Status-aware caching**: per-status-class TTL bounds (success,
//!   rate-limited, server error, client error) with clamping.
//! - **Stale-while-revalidate**: expired-but-usable entries are served while
//!   the caller is told a refresh is due; the cache never fetches.
//! - **Bounded storage**: FIFO capacity eviction plus a cancellable
//!   background sweep, against a pluggable storage trait with an in-memory
//!   reference implementation.
//! - **Conditional requests**: ETag / Last-Modified validator matching,
//!   surfaced to the caller instead of synthesizing 304s.
//! - **Outage detection**: rolling per-provider history, request-weighted
//!   baseline, absolute and relative spike classification, severity ladder.
//! - **Incident lifecycle**: date-scoped deterministic ids, same-day merge,
//!   stability-checked auto-resolution, events to an injected sink.
//! - **One service object**: cache + detector + middleware constructed once
//!   from config, explicit background-task shutdown, no globals.
//!
//! ## Modules
//!
//! - `cache`: the response cache (re-export of `stockgate-cache`).
//! - `incident`: outage detection (re-export of `stockgate-incident`).
//! - `middleware`: request-path orchestration and boundary types.
//! - `config`: YAML config loading for embedding services.
//! - `service`: the `GatewayService` wiring everything together.
pub mod config;
pub mod middleware;
pub mod prelude;
pub mod service;

pub use stockgate_cache as cache;
pub use stockgate_incident as incident;

// re-export
pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use serde_yaml;
pub use thiserror;
pub use tracing;
pub use tracing_subscriber;
