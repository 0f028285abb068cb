use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a service or of a single check.
///
/// Checks are only ever `Up`, `Down` or `Degraded`. `Unknown` is the status of
/// a service that has never been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    Degraded,
    Unknown,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
            MonitorStatus::Degraded => "degraded",
            MonitorStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognised monitor status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for MonitorStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(MonitorStatus::Up),
            "down" => Ok(MonitorStatus::Down),
            "degraded" => Ok(MonitorStatus::Degraded),
            "unknown" => Ok(MonitorStatus::Unknown),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_round_trips() {
        for status in
            [MonitorStatus::Up, MonitorStatus::Down, MonitorStatus::Degraded, MonitorStatus::Unknown]
        {
            assert_eq!(status.to_string().parse::<MonitorStatus>().unwrap(), status);
        }
        assert!("UP".parse::<MonitorStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&MonitorStatus::Degraded).unwrap(), "\"degraded\"");
    }
}
