//! PulseCheck engine - probes monitored services, records every check and
//! keeps service status, uptime and downtime alerts in step with the check log.
//!
//! A single [`orchestrator::Orchestrator::run_tick`] call is one scheduler pass
//! over the roster. Nothing is kept in memory between ticks.

pub mod alerting;
pub mod clock;
pub mod config;
pub mod database;
pub mod monitoring;
pub mod orchestrator;
pub mod pool;
pub mod validation;

pub use monitoring::scheduler::{ServiceTickResult, TickReport};
pub use monitoring::types::MonitorStatus;
pub use orchestrator::Orchestrator;
