//! Orchestrator - wires configuration, store, executor and scheduler together.
//!
//! Both the CLI and the HTTP trigger go through [`Orchestrator`]; neither
//! touches the scheduler or the store directly.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::database::models::Service;
use crate::database::{CheckStore, LibsqlStore, StoreError, initialize_database};
use crate::monitoring::aggregator::rebuild_service_cache;
use crate::monitoring::scheduler::{CheckScheduler, SchedulerOptions, TickReport};
use crate::monitoring::MonitoringExecutor;
use crate::pool::{LibsqlPool, open_pool};
use crate::validation::{validate_check_interval, validate_service_url};

/// A service to add to the roster
#[derive(Debug, Clone)]
pub struct NewService {
    pub name: String,
    pub url: String,
    pub check_interval: u32,
    pub content_keyword: Option<String>,
    pub allow_private: bool,
}

/// Entry point of the engine
pub struct Orchestrator {
    store: Arc<dyn CheckStore>,
    scheduler: CheckScheduler,
}

impl Orchestrator {
    /// Assemble an orchestrator from already built parts
    pub fn new(
        store: Arc<dyn CheckStore>,
        executor: Arc<MonitoringExecutor>,
        clock: Arc<dyn Clock>,
        options: SchedulerOptions,
    ) -> Self {
        let scheduler = CheckScheduler::new(store.clone(), executor, clock, options);
        Self { store, scheduler }
    }

    /// Open the database, bring its schema up to date and build the real
    /// HTTP and TLS clients
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = Self::open_database(config).await?;
        let store = Arc::new(LibsqlStore::new_from_pool(pool));
        let executor = Arc::new(MonitoringExecutor::from_config(&config.probe, &config.ssl)?);

        Ok(Self::new(
            store,
            executor,
            Arc::new(SystemClock),
            SchedulerOptions::from(&config.scheduler),
        ))
    }

    /// Open the configured database and run pending migrations
    pub async fn open_database(config: &Config) -> Result<LibsqlPool> {
        let pool = open_pool(&config.database.path, config.database.pool_size)
            .await
            .with_context(|| format!("Failed to open database {}", config.database.path))?;

        let conn = pool.get().await?;
        info!(path = %config.database.path, "Initializing database schema...");
        initialize_database(&conn).await?;
        drop(conn);

        Ok(pool)
    }

    pub fn store(&self) -> Arc<dyn CheckStore> {
        self.store.clone()
    }

    /// Run one pass over the roster
    pub async fn run_tick(&self, force: bool) -> Result<TickReport> {
        self.scheduler.run_tick(force).await.context("Failed to read the service roster")
    }

    /// Rebuild cached service fields from the check log, for one service or
    /// for every active one. Returns how many services were rewritten.
    pub async fn recompute(&self, service_id: Option<Uuid>) -> Result<usize> {
        let ids = match service_id {
            Some(id) => {
                let service = self.store.get_service(id).await?.ok_or_else(|| anyhow!("Unknown service {id}"))?;
                vec![service.id]
            }
            None => self.store.list_active_services().await?.into_iter().map(|s| s.id).collect(),
        };

        let mut rebuilt = 0;
        let mut failed = 0;
        for id in ids {
            match self.rebuild_one(id).await {
                Ok(true) => rebuilt += 1,
                Ok(false) => warn!(service_id = %id, "No checks recorded, leaving cache as is"),
                Err(e) if service_id.is_some() => return Err(e.into()),
                Err(e) => {
                    error!(service_id = %id, error = %e, "Failed to rebuild service cache");
                    failed += 1;
                }
            }
        }

        info!(rebuilt, failed, "Service caches rebuilt from check log");
        Ok(rebuilt)
    }

    async fn rebuild_one(&self, service_id: Uuid) -> Result<bool, StoreError> {
        let Some(update) = rebuild_service_cache(self.store.as_ref(), service_id).await? else {
            return Ok(false);
        };
        self.store.update_service(service_id, &update).await?;
        Ok(true)
    }

    /// Validate and store a new service
    pub async fn add_service(&self, new: NewService) -> Result<Service> {
        let url = validate_service_url(&new.url, new.allow_private)?;
        validate_check_interval(new.check_interval)?;

        let mut service = Service::new(new.name, url.as_str(), new.check_interval);
        if let Some(keyword) = new.content_keyword {
            service = service.with_keyword(keyword);
        }

        self.store.save_service(&service).await?;
        info!(service_id = %service.id, url = %service.url, "Service added");
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::database::repository::test_support::{check_at, corrupt_checks, test_store};
    use crate::monitoring::checker::{ProbeOutcome, ProbeResponse, Prober};
    use crate::monitoring::ssl::{CertificateInfo, CertificateInspector, SslInspectionError};
    use crate::monitoring::types::MonitorStatus;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};

    struct AlwaysUp;

    #[async_trait]
    impl Prober for AlwaysUp {
        async fn probe(&self, _url: &str) -> ProbeOutcome {
            ProbeOutcome::Response(ProbeResponse {
                status_code: 200,
                ttfb_ms: 10,
                total_ms: 30,
                body: "OK".into(),
                size: 2,
            })
        }
    }

    struct NoTls;

    #[async_trait]
    impl CertificateInspector for NoTls {
        async fn inspect(&self, _url: &str, _now: DateTime<Utc>) -> Result<CertificateInfo, SslInspectionError> {
            Err(SslInspectionError::NoCertificate)
        }
    }

    fn orchestrator(store: Arc<dyn CheckStore>) -> Orchestrator {
        let executor = MonitoringExecutor::new(Arc::new(AlwaysUp), Arc::new(NoTls));
        Orchestrator::new(
            store,
            Arc::new(executor),
            Arc::new(ManualClock::new(Utc::now())),
            SchedulerOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_add_service_validates_input() -> Result<()> {
        let (store, _dir) = test_store().await?;
        let orchestrator = orchestrator(Arc::new(store));

        let new = NewService {
            name: "api".into(),
            url: "https://example.com/health".into(),
            check_interval: 5,
            content_keyword: Some("OK".into()),
            allow_private: false,
        };
        let service = orchestrator.add_service(new.clone()).await?;
        assert_eq!(service.status, MonitorStatus::Unknown);
        assert!(orchestrator.store().get_service(service.id).await?.is_some());

        let private = NewService { url: "http://127.0.0.1:8080".into(), ..new.clone() };
        assert!(orchestrator.add_service(private).await.is_err());

        let never = NewService { check_interval: 0, ..new };
        assert!(orchestrator.add_service(never).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_restores_caches_from_log() -> Result<()> {
        let (store, _dir) = test_store().await?;
        let store: Arc<dyn CheckStore> = Arc::new(store);
        let orchestrator = orchestrator(store.clone());

        let service = Service::new("api", "https://example.com", 5);
        store.save_service(&service).await?;
        assert_eq!(orchestrator.recompute(None).await?, 0);

        // Checks appended without the matching service update, as after a crash
        let now = Utc::now();
        let checks = [
            check_at(service.id, MonitorStatus::Up, 100, now - Duration::minutes(10)),
            check_at(service.id, MonitorStatus::Down, 0, now - Duration::minutes(5)),
        ];
        for check in &checks {
            store.append_check(check).await?;
        }

        assert_eq!(orchestrator.recompute(Some(service.id)).await?, 1);
        let stored = store.get_service(service.id).await?.expect("service");
        assert_eq!(stored.status, MonitorStatus::Down);
        assert_eq!(stored.uptime_percentage, 50.0);
        assert_eq!(stored.avg_response_time, 100);
        assert_eq!(stored.last_check.map(|t| t.timestamp_millis()), Some(checks[1].checked_at.timestamp_millis()));

        assert!(orchestrator.recompute(Some(Uuid::new_v4())).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_continues_past_unreadable_service() -> Result<()> {
        let (store, _dir) = test_store().await?;
        let now = Utc::now();

        let broken = Service::new("broken", "https://broken.example.com", 5);
        let fine = Service::new("fine", "https://fine.example.com", 5);
        for service in [&broken, &fine] {
            store.save_service(service).await?;
            store.append_check(&check_at(service.id, MonitorStatus::Up, 100, now)).await?;
        }
        corrupt_checks(&store, broken.id).await?;

        let store: Arc<dyn CheckStore> = Arc::new(store);
        let orchestrator = orchestrator(store.clone());

        assert_eq!(orchestrator.recompute(None).await?, 1);
        let stored = store.get_service(fine.id).await?.expect("service");
        assert_eq!(stored.status, MonitorStatus::Up);
        assert_eq!(stored.uptime_percentage, 100.0);

        // Asking for the broken service alone still reports the failure
        assert!(orchestrator.recompute(Some(broken.id)).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_tick_runs_through_orchestrator() -> Result<()> {
        let (store, _dir) = test_store().await?;
        let store: Arc<dyn CheckStore> = Arc::new(store);
        let orchestrator = orchestrator(store.clone());
        store.save_service(&Service::new("api", "http://example.com", 5)).await?;

        let report = orchestrator.run_tick(false).await?;
        assert_eq!(report.checked, 1);
        assert_eq!(report.results[0].status, MonitorStatus::Up);
        assert_eq!(report.results[0].response_time, 30);

        let again = orchestrator.run_tick(false).await?;
        assert_eq!(again.checked, 0);
        assert_eq!(again.skipped, 1);
        Ok(())
    }
}
