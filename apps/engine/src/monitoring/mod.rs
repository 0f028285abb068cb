/// Monitoring engine module - everything that happens to one service in a tick
///
/// This module is responsible for:
/// - Probing HTTP/HTTPS targets and inspecting their certificates
/// - Classifying probe outcomes as up, down or degraded
/// - Maintaining the uptime and latency caches from the check log
/// - Scheduling one pass over the roster
pub mod aggregator;
pub mod checker;
pub mod classifier;
pub mod content;
pub mod executor;
pub mod scheduler;
pub mod ssl;
pub mod types;

pub use checker::{HttpProber, ProbeOutcome, Prober};
pub use executor::MonitoringExecutor;
pub use scheduler::CheckScheduler;
pub use ssl::{CertificateInspector, TlsInspector};
pub use types::MonitorStatus;
