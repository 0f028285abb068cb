use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::transitions::{AlertAction, transition};
use crate::database::models::{Alert, AlertMetadata, AlertUpdate, Service};
use crate::database::{CheckStore, StoreError};
use crate::monitoring::types::MonitorStatus;

/// What the incident manager did for one status edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncidentOutcome {
    Unchanged,
    Opened(Uuid),
    /// Up → down while an alert for the service was still open
    AlreadyOpen(Uuid),
    Resolved { alert_id: Uuid, downtime_minutes: i64 },
    /// Down → up without an open alert to resolve
    NothingToResolve,
}

/// Whole minutes between `down_since` and `resolved_at`, never less than one
pub fn downtime_minutes(down_since: DateTime<Utc>, resolved_at: DateTime<Utc>) -> i64 {
    let millis = (resolved_at - down_since).num_milliseconds();
    ((millis as f64 / 60_000.0).round() as i64).max(1)
}

pub struct IncidentManager {
    store: Arc<dyn CheckStore>,
}

impl IncidentManager {
    pub fn new(store: Arc<dyn CheckStore>) -> Self {
        Self { store }
    }

    /// Apply the side effect of moving `service` from its cached status to
    /// `current`. `service.status` must still hold the status from before
    /// this tick.
    pub async fn on_status_change(
        &self,
        service: &Service,
        current: MonitorStatus,
        now: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<IncidentOutcome, StoreError> {
        match transition(service.status, current) {
            AlertAction::NoOp => Ok(IncidentOutcome::Unchanged),
            AlertAction::OpenDowntime => self.open(service, now, reason).await,
            AlertAction::ResolveDowntime => self.resolve(service, now).await,
        }
    }

    async fn open(
        &self,
        service: &Service,
        now: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<IncidentOutcome, StoreError> {
        if let Some(existing) = self.store.find_open_down_alert(service.id).await? {
            warn!(service_id = %service.id, alert_id = %existing.id, "Downtime alert already open");
            return Ok(IncidentOutcome::AlreadyOpen(existing.id));
        }

        let alert = Alert::downtime(service, now, reason);
        self.store.create_alert(&alert).await?;
        info!(service_id = %service.id, alert_id = %alert.id, "Service went down, alert opened");
        Ok(IncidentOutcome::Opened(alert.id))
    }

    async fn resolve(&self, service: &Service, now: DateTime<Utc>) -> Result<IncidentOutcome, StoreError> {
        let Some(alert) = self.store.find_open_down_alert(service.id).await? else {
            warn!(service_id = %service.id, "Service recovered but no open downtime alert was found");
            return Ok(IncidentOutcome::NothingToResolve);
        };

        let minutes = downtime_minutes(alert.metadata.down_since, now);
        let update = AlertUpdate {
            is_dismissed: true,
            metadata: AlertMetadata {
                resolved_at: Some(now),
                downtime_minutes: Some(minutes),
                ..alert.metadata
            },
        };
        self.store.update_alert(alert.id, &update).await?;
        info!(service_id = %service.id, alert_id = %alert.id, downtime_minutes = minutes, "Service recovered, alert resolved");

        Ok(IncidentOutcome::Resolved { alert_id: alert.id, downtime_minutes: minutes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::test_support::test_store;
    use chrono::Duration;

    #[test]
    fn test_downtime_minutes_rounding() {
        let start = Utc::now();
        assert_eq!(downtime_minutes(start, start), 1);
        assert_eq!(downtime_minutes(start, start + Duration::seconds(20)), 1);
        assert_eq!(downtime_minutes(start, start + Duration::seconds(89)), 1);
        assert_eq!(downtime_minutes(start, start + Duration::seconds(90)), 2);
        assert_eq!(downtime_minutes(start, start + Duration::minutes(47)), 47);
    }

    #[tokio::test]
    async fn test_incident_lifecycle() -> anyhow::Result<()> {
        let (store, _dir) = test_store().await?;
        let store: Arc<dyn CheckStore> = Arc::new(store);
        let manager = IncidentManager::new(store.clone());

        let mut service = Service::new("api", "https://api.example.com", 5);
        service.status = MonitorStatus::Up;
        let down_at = Utc::now();

        let outcome = manager.on_status_change(&service, MonitorStatus::Down, down_at, Some("Request timed out")).await?;
        let IncidentOutcome::Opened(alert_id) = outcome else {
            panic!("expected an alert, got {outcome:?}");
        };

        let open = store.find_open_down_alert(service.id).await?.expect("open alert");
        assert_eq!(open.id, alert_id);
        assert_eq!(open.metadata.down_since.timestamp_millis(), down_at.timestamp_millis());
        assert_eq!(open.title, "api is down");

        service.status = MonitorStatus::Down;
        let up_at = down_at + Duration::minutes(12);
        let outcome = manager.on_status_change(&service, MonitorStatus::Up, up_at, None).await?;
        assert_eq!(outcome, IncidentOutcome::Resolved { alert_id, downtime_minutes: 12 });

        assert!(store.find_open_down_alert(service.id).await?.is_none());
        let alerts = store.list_alerts(10).await?;
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].is_dismissed);
        assert_eq!(alerts[0].metadata.downtime_minutes, Some(12));
        assert!(alerts[0].metadata.resolved_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_second_down_edge_does_not_duplicate() -> anyhow::Result<()> {
        let (store, _dir) = test_store().await?;
        let store: Arc<dyn CheckStore> = Arc::new(store);
        let manager = IncidentManager::new(store.clone());

        let mut service = Service::new("api", "https://api.example.com", 5);
        service.status = MonitorStatus::Up;

        let first = manager.on_status_change(&service, MonitorStatus::Down, Utc::now(), None).await?;
        let second = manager.on_status_change(&service, MonitorStatus::Down, Utc::now(), None).await?;

        let IncidentOutcome::Opened(id) = first else {
            panic!("expected an alert, got {first:?}");
        };
        assert_eq!(second, IncidentOutcome::AlreadyOpen(id));
        assert_eq!(store.list_alerts(10).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_recovery_without_alert_is_harmless() -> anyhow::Result<()> {
        let (store, _dir) = test_store().await?;
        let manager = IncidentManager::new(Arc::new(store));

        let mut service = Service::new("api", "https://api.example.com", 5);
        service.status = MonitorStatus::Down;

        let outcome = manager.on_status_change(&service, MonitorStatus::Up, Utc::now(), None).await?;
        assert_eq!(outcome, IncidentOutcome::NothingToResolve);
        Ok(())
    }

    #[tokio::test]
    async fn test_silent_edges_leave_no_alerts() -> anyhow::Result<()> {
        let (store, _dir) = test_store().await?;
        let store: Arc<dyn CheckStore> = Arc::new(store);
        let manager = IncidentManager::new(store.clone());

        let edges = [
            (MonitorStatus::Up, MonitorStatus::Up),
            (MonitorStatus::Down, MonitorStatus::Down),
            (MonitorStatus::Up, MonitorStatus::Degraded),
            (MonitorStatus::Degraded, MonitorStatus::Down),
            (MonitorStatus::Unknown, MonitorStatus::Down),
        ];
        for (previous, current) in edges {
            let mut service = Service::new("api", "https://api.example.com", 5);
            service.status = previous;
            let outcome = manager.on_status_change(&service, current, Utc::now(), None).await?;
            assert_eq!(outcome, IncidentOutcome::Unchanged, "{previous} -> {current}");
        }
        assert!(store.list_alerts(10).await?.is_empty());
        Ok(())
    }
}
