use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::aggregator;
use super::executor::MonitoringExecutor;
use super::types::MonitorStatus;
use crate::alerting::IncidentManager;
use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::database::models::{Service, ServiceUpdate, from_millis, to_millis};
use crate::database::{CheckStore, StoreError};

/// How a tick runs
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Services processed at once; 1 is strictly sequential
    pub concurrency: usize,
    /// Once spent, no further service is started in this tick
    pub time_budget: Option<Duration>,
    pub region: String,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SchedulerOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            time_budget: config.time_budget(),
            region: config.region.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTickResult {
    pub service_id: Uuid,
    pub status: MonitorStatus,
    pub response_time: u64,
}

/// Outcome of one pass over the roster
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    /// Due services that were probed
    pub checked: usize,
    /// Services processed to the end, in completion order
    pub results: Vec<ServiceTickResult>,
    /// Active services that were not due
    pub skipped: usize,
    /// Due services left for the next tick because the time budget ran out
    pub deferred: usize,
    /// Services whose processing stopped at a store write
    pub failed: usize,
}

/// Step of the per-service pipeline that touched the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AppendCheck,
    Aggregate,
    Alert,
    UpdateService,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::AppendCheck => "append_check",
            Stage::Aggregate => "aggregate",
            Stage::Alert => "alert",
            Stage::UpdateService => "update_service",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Persistence failed for service {service_id} at {stage}: {source}")]
    Persistence {
        service_id: Uuid,
        stage: Stage,
        #[source]
        source: StoreError,
    },
}

impl ServiceError {
    fn at(service_id: Uuid, stage: Stage) -> impl FnOnce(StoreError) -> Self {
        move |source| ServiceError::Persistence { service_id, stage, source }
    }
}

enum ServiceRun {
    Completed(ServiceTickResult),
    Failed,
    Deferred,
}

/// Drives one pass over the roster. Holds no state between ticks.
pub struct CheckScheduler {
    store: Arc<dyn CheckStore>,
    executor: Arc<MonitoringExecutor>,
    incidents: IncidentManager,
    clock: Arc<dyn Clock>,
    options: SchedulerOptions,
}

impl CheckScheduler {
    pub fn new(
        store: Arc<dyn CheckStore>,
        executor: Arc<MonitoringExecutor>,
        clock: Arc<dyn Clock>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            incidents: IncidentManager::new(store.clone()),
            store,
            executor,
            clock,
            options,
        }
    }

    /// Run one tick. Only a failure to read the roster is returned as an
    /// error; anything that goes wrong for a single service is logged and
    /// counted in the report.
    pub async fn run_tick(&self, force: bool) -> Result<TickReport, StoreError> {
        let started = Instant::now();
        let services = self.store.list_active_services().await?;
        let tick_now = self.clock.now();

        let (due, not_due): (Vec<Service>, Vec<Service>) =
            services.into_iter().partition(|service| service.is_due(tick_now, force));
        info!(due = due.len(), skipped = not_due.len(), force, "Starting check tick");

        let runs: Vec<ServiceRun> = stream::iter(due)
            .map(|service| self.run_service(service, started))
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        let mut report = TickReport { skipped: not_due.len(), ..TickReport::default() };
        for run in runs {
            match run {
                ServiceRun::Completed(result) => {
                    report.checked += 1;
                    report.results.push(result);
                }
                ServiceRun::Failed => {
                    report.checked += 1;
                    report.failed += 1;
                }
                ServiceRun::Deferred => report.deferred += 1,
            }
        }

        info!(
            checked = report.checked,
            failed = report.failed,
            deferred = report.deferred,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Check tick finished"
        );
        Ok(report)
    }

    async fn run_service(&self, service: Service, started: Instant) -> ServiceRun {
        if let Some(budget) = self.options.time_budget {
            if started.elapsed() >= budget {
                debug!(service_id = %service.id, "Time budget spent, deferring");
                return ServiceRun::Deferred;
            }
        }

        match self.process_service(&service).await {
            Ok(result) => ServiceRun::Completed(result),
            Err(e) => {
                error!(service_id = %service.id, error = %e, "Service check aborted");
                ServiceRun::Failed
            }
        }
    }

    /// Timestamp for this service's check, strictly after its previous one.
    /// Truncated to the millisecond precision the store keeps.
    fn check_time(&self, service: &Service) -> DateTime<Utc> {
        let now = self.clock.now();
        let now = from_millis(to_millis(now)).unwrap_or(now);
        match service.last_check {
            Some(last_check) if now <= last_check => {
                warn!(service_id = %service.id, %now, %last_check, "Clock behind last check");
                last_check + chrono::Duration::milliseconds(1)
            }
            _ => now,
        }
    }

    /// probe → validate → (ssl) → append → aggregate → alert → update
    async fn process_service(&self, service: &Service) -> Result<ServiceTickResult, ServiceError> {
        let now = self.check_time(service);
        let executed = self.executor.execute_check(service, now).await;

        let check = executed.to_check(service.id, now, &self.options.region);
        self.store
            .append_check(&check)
            .await
            .map_err(ServiceError::at(service.id, Stage::AppendCheck))?;

        let stats = aggregator::compute(self.store.as_ref(), service.id, now)
            .await
            .map_err(ServiceError::at(service.id, Stage::Aggregate))?;

        self.incidents
            .on_status_change(service, check.status, now, check.error_message.as_deref())
            .await
            .map_err(ServiceError::at(service.id, Stage::Alert))?;

        let update = ServiceUpdate {
            status: check.status,
            last_check: now,
            uptime_percentage: stats.uptime_percentage,
            avg_response_time: stats.avg_response_time,
            certificate: executed.certificate,
        };
        self.store
            .update_service(service.id, &update)
            .await
            .map_err(ServiceError::at(service.id, Stage::UpdateService))?;

        debug!(
            service_id = %service.id,
            status = %check.status,
            response_time = check.response_time,
            "Service checked"
        );
        Ok(ServiceTickResult {
            service_id: service.id,
            status: check.status,
            response_time: check.response_time,
        })
    }
}
