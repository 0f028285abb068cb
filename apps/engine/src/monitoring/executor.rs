use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::checker::{HttpProber, Prober};
use super::classifier::{Verdict, classify};
use super::ssl::{CertificateInfo, CertificateInspector, TlsInspector, is_https};
use crate::config::{ProbeConfig, SslConfig};
use crate::database::models::{Check, Service};

/// Everything one probe produced for one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedCheck {
    pub verdict: Verdict,
    pub response_time: u64,
    pub status_code: Option<u16>,
    pub ttfb: Option<u64>,
    pub response_size: Option<u64>,
    /// `None` for http targets and whenever the inspection failed
    pub certificate: Option<CertificateInfo>,
}

impl ExecutedCheck {
    /// The immutable check-log record for this probe
    pub fn to_check(&self, service_id: Uuid, checked_at: DateTime<Utc>, region: &str) -> Check {
        Check {
            id: Uuid::new_v4(),
            service_id,
            status: self.verdict.status,
            response_time: self.response_time,
            status_code: self.status_code,
            error_message: self.verdict.error_message.clone(),
            ttfb: self.ttfb,
            response_size: self.response_size,
            checked_at,
            check_region: region.to_string(),
        }
    }
}

/// Monitoring executor - probes, validates and inspects one service
pub struct MonitoringExecutor {
    prober: Arc<dyn Prober>,
    inspector: Arc<dyn CertificateInspector>,
}

impl MonitoringExecutor {
    pub fn new(prober: Arc<dyn Prober>, inspector: Arc<dyn CertificateInspector>) -> Self {
        Self { prober, inspector }
    }

    /// Executor backed by the real HTTP prober and TLS inspector
    pub fn from_config(probe: &ProbeConfig, ssl: &SslConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(HttpProber::new(probe.timeout(), &probe.user_agent)?),
            Arc::new(TlsInspector::new(ssl.timeout())?),
        ))
    }

    /// Probe → validate → (ssl). Never fails: every problem becomes part of
    /// the verdict, or is dropped in the case of certificate inspection.
    pub async fn execute_check(&self, service: &Service, now: DateTime<Utc>) -> ExecutedCheck {
        let outcome = self.prober.probe(&service.url).await;
        let verdict = classify(&outcome, service.keyword());

        let certificate = if is_https(&service.url) {
            match self.inspector.inspect(&service.url, now).await {
                Ok(info) => Some(info),
                Err(e) => {
                    debug!(service_id = %service.id, error = %e, "Certificate inspection failed");
                    None
                }
            }
        } else {
            None
        };

        let response = outcome.response();
        ExecutedCheck {
            verdict,
            response_time: outcome.elapsed_ms(),
            status_code: response.map(|r| r.status_code),
            ttfb: response.map(|r| r.ttfb_ms),
            response_size: response.map(|r| r.size),
            certificate,
        }
    }
}
