//! Uptime and latency caches, derived from the check log with aggregate
//! reads only. No code path here scans the raw rows of the long window.

use chrono::{DateTime, Months, Utc};
use uuid::Uuid;

use crate::database::models::ServiceUpdate;
use crate::database::{CheckStore, StoreError};
use crate::monitoring::types::MonitorStatus;

/// Number of most recent up checks averaged into `avg_response_time`
pub const LATENCY_WINDOW: usize = 20;

/// Length of the rolling uptime window
pub const UPTIME_WINDOW_MONTHS: u32 = 12;

/// Derived values written back to the service
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UptimeStats {
    pub uptime_percentage: f64,
    pub avg_response_time: u64,
}

/// Start of the uptime window ending at `now`
pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(UPTIME_WINDOW_MONTHS))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Percentage with two decimals. An empty window reads as 0%.
pub fn uptime_percentage(up: u64, total: u64) -> f64 {
    let ratio = up as f64 / total.max(1) as f64;
    (ratio * 10_000.0).round() / 100.0
}

/// Rounded arithmetic mean in milliseconds, 0 for no samples
pub fn mean_response_time(samples: &[u64]) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let sum: u128 = samples.iter().map(|&s| u128::from(s)).sum();
    (sum as f64 / samples.len() as f64).round() as u64
}

/// Recompute both caches for `service_id` as of `now`
pub async fn compute(
    store: &dyn CheckStore,
    service_id: Uuid,
    now: DateTime<Utc>,
) -> Result<UptimeStats, StoreError> {
    let since = window_start(now);
    let total = store.count_checks(service_id, since, None).await?;
    let up = store.count_checks(service_id, since, Some(MonitorStatus::Up)).await?;
    let recent = store.recent_up_checks(service_id, LATENCY_WINDOW).await?;

    Ok(UptimeStats {
        uptime_percentage: uptime_percentage(up, total),
        avg_response_time: mean_response_time(&recent),
    })
}

/// Rebuild a service's cached fields from its check log alone.
///
/// The latest check supplies status and `last_check` and is the reference
/// time for the uptime window, so rebuilding twice gives the same result.
/// Certificate fields are not part of the log and stay untouched.
/// Returns `None` for a service without checks.
pub async fn rebuild_service_cache(
    store: &dyn CheckStore,
    service_id: Uuid,
) -> Result<Option<ServiceUpdate>, StoreError> {
    let Some(latest) = store.latest_check(service_id).await? else {
        return Ok(None);
    };
    let stats = compute(store, service_id, latest.checked_at).await?;

    Ok(Some(ServiceUpdate {
        status: latest.status,
        last_check: latest.checked_at,
        uptime_percentage: stats.uptime_percentage,
        avg_response_time: stats.avg_response_time,
        certificate: None,
    }))
}
