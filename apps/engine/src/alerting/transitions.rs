use crate::monitoring::types::MonitorStatus;

/// Side effect of one status edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertAction {
    NoOp,
    OpenDowntime,
    ResolveDowntime,
}

/// The full transition table, keyed by (status before this tick, new status).
///
/// Every pair is listed so a new status cannot slip through unnoticed.
/// `Unknown` only ever appears as the previous status of a never-checked
/// service.
pub fn transition(previous: MonitorStatus, current: MonitorStatus) -> AlertAction {
    use MonitorStatus::*;

    match (previous, current) {
        (Up, Down) => AlertAction::OpenDowntime,
        (Down, Up) => AlertAction::ResolveDowntime,

        (Up, Up) | (Up, Degraded) | (Up, Unknown) => AlertAction::NoOp,
        (Down, Down) | (Down, Degraded) | (Down, Unknown) => AlertAction::NoOp,
        (Degraded, Up) | (Degraded, Down) | (Degraded, Degraded) | (Degraded, Unknown) => AlertAction::NoOp,
        (Unknown, Up) | (Unknown, Down) | (Unknown, Degraded) | (Unknown, Unknown) => AlertAction::NoOp,
    }
}
