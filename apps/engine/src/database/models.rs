use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::monitoring::ssl::CertificateInfo;
use crate::monitoring::types::MonitorStatus;

/// `alert_type` of the alerts this engine opens and resolves.
pub const DOWNTIME_ALERT: &str = "downtime";

/// Convert a timestamp to the epoch milliseconds stored in the database
pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert stored epoch milliseconds back to a timestamp
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// A monitored target together with its cached, derived fields.
///
/// `status`, `last_check`, `uptime_percentage`, `avg_response_time` and the
/// SSL fields are a materialized view of the check log. They can always be
/// rebuilt from `checks` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    /// Minutes between checks
    pub check_interval: u32,
    pub is_paused: bool,
    pub content_keyword: Option<String>,
    pub status: MonitorStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub uptime_percentage: f64,
    pub avg_response_time: u64,
    pub ssl_expiry_date: Option<DateTime<Utc>>,
    pub ssl_issuer: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Service {
    /// Create a new, never-checked service
    pub fn new(name: impl Into<String>, url: impl Into<String>, check_interval: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url: url.into(),
            check_interval,
            is_paused: false,
            content_keyword: None,
            status: MonitorStatus::Unknown,
            last_check: None,
            uptime_percentage: 0.0,
            avg_response_time: 0,
            ssl_expiry_date: None,
            ssl_issuer: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.content_keyword = Some(keyword.into());
        self
    }

    /// The configured keyword, if it holds anything besides whitespace
    pub fn keyword(&self) -> Option<&str> {
        self.content_keyword.as_deref().map(str::trim).filter(|kw| !kw.is_empty())
    }

    pub fn interval(&self) -> Duration {
        Duration::minutes(i64::from(self.check_interval))
    }

    /// Whether this service should be probed at `now`.
    pub fn is_due(&self, now: DateTime<Utc>, force: bool) -> bool {
        if force {
            return true;
        }
        match self.last_check {
            None => true,
            Some(last_check) => now - last_check >= self.interval(),
        }
    }
}

/// One probe outcome. Append-only; never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub id: Uuid,
    pub service_id: Uuid,
    pub status: MonitorStatus,
    /// Total time in milliseconds, including draining the body
    pub response_time: u64,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    /// Time to first byte in milliseconds
    pub ttfb: Option<u64>,
    pub response_size: Option<u64>,
    pub checked_at: DateTime<Utc>,
    pub check_region: String,
}

/// Fields written back to a service at the end of its tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceUpdate {
    pub status: MonitorStatus,
    pub last_check: DateTime<Utc>,
    pub uptime_percentage: f64,
    pub avg_response_time: u64,
    /// Left untouched in the store when `None`
    pub certificate: Option<CertificateInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Info => "info",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "critical" => Some(AlertSeverity::Critical),
            "warning" => Some(AlertSeverity::Warning),
            "info" => Some(AlertSeverity::Info),
            _ => None,
        }
    }
}

/// Alert metadata, stored as JSON. `service_id` is a lookup key, not a
/// foreign key: alert history outlives changes to the service row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMetadata {
    pub service_id: Uuid,
    pub url: String,
    pub down_since: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downtime_minutes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub severity: AlertSeverity,
    pub alert_type: String,
    pub title: String,
    pub description: String,
    pub is_dismissed: bool,
    pub created_at: DateTime<Utc>,
    pub metadata: AlertMetadata,
}

impl Alert {
    /// A fresh, open downtime alert for `service`
    pub fn downtime(service: &Service, down_since: DateTime<Utc>, reason: Option<&str>) -> Self {
        let reason = reason.unwrap_or("no response");
        Self {
            id: Uuid::new_v4(),
            severity: AlertSeverity::Critical,
            alert_type: DOWNTIME_ALERT.to_string(),
            title: format!("{} is down", service.name),
            description: format!("{} failed its health check: {}", service.url, reason),
            is_dismissed: false,
            created_at: down_since,
            metadata: AlertMetadata {
                service_id: service.id,
                url: service.url.clone(),
                down_since,
                resolved_at: None,
                downtime_minutes: None,
            },
        }
    }

    pub fn is_open(&self) -> bool {
        !self.is_dismissed && self.metadata.resolved_at.is_none()
    }
}

/// Fields an alert update may change.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertUpdate {
    pub is_dismissed: bool,
    pub metadata: AlertMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_rules() {
        let now = Utc::now();
        let mut service = Service::new("api", "https://example.com", 5);

        // Never checked
        assert!(service.is_due(now, false));

        service.last_check = Some(now - Duration::minutes(4));
        assert!(!service.is_due(now, false));
        assert!(service.is_due(now, true));

        // Exactly one interval counts as due
        service.last_check = Some(now - Duration::minutes(5));
        assert!(service.is_due(now, false));
    }

    #[test]
    fn test_blank_keyword_is_ignored() {
        let service = Service::new("api", "https://example.com", 5).with_keyword("   ");
        assert_eq!(service.keyword(), None);

        let service = Service::new("api", "https://example.com", 5).with_keyword(" OK ");
        assert_eq!(service.keyword(), Some("OK"));
    }

    #[test]
    fn test_open_alert_metadata_omits_resolution() {
        let service = Service::new("api", "https://example.com", 5);
        let alert = Alert::downtime(&service, Utc::now(), Some("Request timed out"));

        assert!(alert.is_open());
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.alert_type, DOWNTIME_ALERT);

        let json = serde_json::to_value(&alert.metadata).unwrap();
        assert_eq!(json["service_id"], service.id.to_string());
        assert!(json.get("resolved_at").is_none());
        assert!(json.get("downtime_minutes").is_none());
    }

    #[test]
    fn test_millis_conversion() {
        let now = from_millis(to_millis(Utc::now())).unwrap();
        assert_eq!(from_millis(to_millis(now)), Some(now));
    }
}
