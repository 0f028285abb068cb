//! Downtime incidents: an alert opens on an up → down edge and is resolved on
//! the matching down → up edge. Nothing else touches it.
pub mod manager;
pub mod transitions;

pub use manager::{IncidentManager, IncidentOutcome, downtime_minutes};
pub use transitions::{AlertAction, transition};
