//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//!     → /health and /metrics JSON snapshots (served by the HTTP layer)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Raw tokens are never logged; token length is
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
