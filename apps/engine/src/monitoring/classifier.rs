//! Turns a raw probe outcome into the status recorded on the check.
//!
//! | probe                         | keyword found | status   |
//! |-------------------------------|---------------|----------|
//! | transport error / timeout     | n/a           | down     |
//! | HTTP 200..=499                | yes / not set | up       |
//! | HTTP 200..=499                | no            | degraded |
//! | HTTP >= 500 or < 200          | n/a           | down     |
//!
//! 4xx counts as up: the target answered, which is what uptime measures.

use super::checker::ProbeOutcome;
use super::content::validate_content;
use super::types::MonitorStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: MonitorStatus,
    pub error_message: Option<String>,
}

impl Verdict {
    fn up() -> Self {
        Self { status: MonitorStatus::Up, error_message: None }
    }

    fn down(message: String) -> Self {
        Self { status: MonitorStatus::Down, error_message: Some(message) }
    }

    fn degraded(message: String) -> Self {
        Self { status: MonitorStatus::Degraded, error_message: Some(message) }
    }
}

pub fn classify(outcome: &ProbeOutcome, keyword: Option<&str>) -> Verdict {
    let response = match outcome {
        ProbeOutcome::Failed { error, .. } => return Verdict::down(error.to_string()),
        ProbeOutcome::Response(response) => response,
    };

    match response.status_code {
        200..=499 => match keyword {
            Some(keyword) => match validate_content(&response.body, keyword) {
                Ok(()) => Verdict::up(),
                Err(e) => Verdict::degraded(e.to_string()),
            },
            None => Verdict::up(),
        },
        code if code >= 500 => Verdict::down(format!("Server error: HTTP {code}")),
        code => Verdict::down(format!("Unexpected status: HTTP {code}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::checker::{ProbeError, ProbeResponse, TIMEOUT_MESSAGE};

    fn response(status_code: u16, body: &str) -> ProbeOutcome {
        ProbeOutcome::Response(ProbeResponse {
            status_code,
            ttfb_ms: 10,
            total_ms: 20,
            body: body.to_string(),
            size: body.len() as u64,
        })
    }

    #[test]
    fn test_success_range_is_up() {
        assert_eq!(classify(&response(200, ""), None).status, MonitorStatus::Up);
        assert_eq!(classify(&response(302, ""), None).status, MonitorStatus::Up);
        assert_eq!(classify(&response(404, ""), None).status, MonitorStatus::Up);
        assert_eq!(classify(&response(499, ""), None).status, MonitorStatus::Up);
    }

    #[test]
    fn test_server_errors_are_down() {
        let verdict = classify(&response(500, ""), None);
        assert_eq!(verdict.status, MonitorStatus::Down);
        assert_eq!(verdict.error_message.as_deref(), Some("Server error: HTTP 500"));

        assert_eq!(classify(&response(503, "OK"), Some("OK")).status, MonitorStatus::Down);
        assert_eq!(classify(&response(101, ""), None).status, MonitorStatus::Down);
    }

    #[test]
    fn test_missing_keyword_degrades_never_downs() {
        let verdict = classify(&response(200, "<html>maintenance</html>"), Some("OK"));
        assert_eq!(verdict.status, MonitorStatus::Degraded);
        assert_eq!(
            verdict.error_message.as_deref(),
            Some("Keyword \"OK\" not found in response body")
        );

        // 4xx without the keyword is degraded too
        assert_eq!(classify(&response(404, "not here"), Some("OK")).status, MonitorStatus::Degraded);
    }

    #[test]
    fn test_keyword_present_is_up() {
        assert_eq!(classify(&response(200, "status: ok"), Some("OK")), Verdict::up());
    }

    #[test]
    fn test_transport_failures_are_down() {
        let timeout = ProbeOutcome::Failed { error: ProbeError::Timeout, elapsed_ms: 10_000 };
        let verdict = classify(&timeout, Some("OK"));
        assert_eq!(verdict.status, MonitorStatus::Down);
        assert_eq!(verdict.error_message.as_deref(), Some(TIMEOUT_MESSAGE));

        let refused = ProbeOutcome::Failed {
            error: ProbeError::Connect("Connection refused (os error 111)".into()),
            elapsed_ms: 3,
        };
        assert_eq!(
            classify(&refused, None).error_message.as_deref(),
            Some("Connection failed: Connection refused (os error 111)")
        );
    }
}
