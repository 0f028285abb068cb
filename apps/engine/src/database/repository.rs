use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use uuid::Uuid;

use super::error::StoreError;
use super::models::{
    Alert, AlertMetadata, AlertSeverity, AlertUpdate, Check, DOWNTIME_ALERT, Service, ServiceUpdate,
    from_millis, to_millis,
};
use crate::monitoring::types::MonitorStatus;
use crate::pool::{LibsqlManager, LibsqlPool};

/// Upper bound applied to every row-returning read of the check log.
///
/// Hosted stores silently truncate large result sets, so nothing that needs
/// an exact answer may be computed from rows. Counts use `COUNT(*)` instead.
pub const ROW_RETURN_CAP: usize = 1000;

/// How many of the most recent open downtime alerts are searched when
/// resolving an incident.
pub const OPEN_ALERT_SEARCH_WINDOW: usize = 10;

/// The service directory and check store the engine runs against.
#[async_trait]
pub trait CheckStore: Send + Sync {
    /// Every service that is not paused, due or not
    async fn list_active_services(&self) -> Result<Vec<Service>, StoreError>;

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, StoreError>;

    /// Insert a service, or replace its configuration and caches
    async fn save_service(&self, service: &Service) -> Result<(), StoreError>;

    /// Append a check. Re-appending the same id is a no-op.
    async fn append_check(&self, check: &Check) -> Result<(), StoreError>;

    /// Number of checks at or after `since`, optionally of one status only
    async fn count_checks(
        &self,
        service_id: Uuid,
        since: DateTime<Utc>,
        status: Option<MonitorStatus>,
    ) -> Result<u64, StoreError>;

    /// Response times of the most recent `limit` up checks, newest first
    async fn recent_up_checks(&self, service_id: Uuid, limit: usize) -> Result<Vec<u64>, StoreError>;

    async fn latest_check(&self, service_id: Uuid) -> Result<Option<Check>, StoreError>;

    /// Newest first, capped at [`ROW_RETURN_CAP`]
    async fn recent_checks(&self, service_id: Uuid, limit: usize) -> Result<Vec<Check>, StoreError>;

    async fn update_service(&self, service_id: Uuid, update: &ServiceUpdate) -> Result<(), StoreError>;

    /// Most recent open downtime alert for `service_id`, searched among the
    /// last [`OPEN_ALERT_SEARCH_WINDOW`] open downtime alerts
    async fn find_open_down_alert(&self, service_id: Uuid) -> Result<Option<Alert>, StoreError>;

    async fn create_alert(&self, alert: &Alert) -> Result<(), StoreError>;

    async fn update_alert(&self, id: Uuid, update: &AlertUpdate) -> Result<(), StoreError>;

    /// Newest first
    async fn list_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError>;
}

const SERVICE_COLUMNS: &str = "id, name, url, check_interval, is_paused, content_keyword, status, last_check, uptime_percentage, avg_response_time, ssl_expiry_date, ssl_issuer, created_at";
const CHECK_COLUMNS: &str = "id, service_id, status, response_time, status_code, error_message, ttfb, response_size, checked_at, check_region";
const ALERT_COLUMNS: &str =
    "id, severity, alert_type, title, description, is_dismissed, created_at, metadata";

/// LibSQL implementation of [`CheckStore`]
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>, StoreError> {
        Ok(self.pool.get().await?)
    }
}

fn parse_uuid(table: &'static str, raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::malformed(table, format!("bad id {raw:?}: {e}")))
}

fn parse_status(table: &'static str, raw: &str) -> Result<MonitorStatus, StoreError> {
    raw.parse().map_err(|e| StoreError::malformed(table, e))
}

fn parse_time(table: &'static str, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    from_millis(millis).ok_or_else(|| StoreError::malformed(table, format!("timestamp out of range: {millis}")))
}

fn clamp_limit(limit: usize) -> i64 {
    limit.min(ROW_RETURN_CAP) as i64
}

fn service_from_row(row: &Row) -> Result<Service, StoreError> {
    const TABLE: &str = "services";
    let id: String = row.get(0)?;
    let status: String = row.get(6)?;

    Ok(Service {
        id: parse_uuid(TABLE, &id)?,
        name: row.get(1)?,
        url: row.get(2)?,
        check_interval: row.get::<i64>(3)?.clamp(0, i64::from(u32::MAX)) as u32,
        is_paused: row.get::<i64>(4)? != 0,
        content_keyword: row.get(5)?,
        status: parse_status(TABLE, &status)?,
        last_check: row.get::<Option<i64>>(7)?.map(|ms| parse_time(TABLE, ms)).transpose()?,
        uptime_percentage: row.get(8)?,
        avg_response_time: row.get::<i64>(9)?.max(0) as u64,
        ssl_expiry_date: row.get::<Option<i64>>(10)?.map(|ms| parse_time(TABLE, ms)).transpose()?,
        ssl_issuer: row.get(11)?,
        created_at: parse_time(TABLE, row.get(12)?)?,
    })
}

fn check_from_row(row: &Row) -> Result<Check, StoreError> {
    const TABLE: &str = "checks";
    let id: String = row.get(0)?;
    let service_id: String = row.get(1)?;
    let status: String = row.get(2)?;

    Ok(Check {
        id: parse_uuid(TABLE, &id)?,
        service_id: parse_uuid(TABLE, &service_id)?,
        status: parse_status(TABLE, &status)?,
        response_time: row.get::<i64>(3)?.max(0) as u64,
        status_code: row.get::<Option<i64>>(4)?.map(|v| v as u16),
        error_message: row.get(5)?,
        ttfb: row.get::<Option<i64>>(6)?.map(|v| v.max(0) as u64),
        response_size: row.get::<Option<i64>>(7)?.map(|v| v.max(0) as u64),
        checked_at: parse_time(TABLE, row.get(8)?)?,
        check_region: row.get(9)?,
    })
}

fn alert_from_row(row: &Row) -> Result<Alert, StoreError> {
    const TABLE: &str = "alerts";
    let id: String = row.get(0)?;
    let severity: String = row.get(1)?;
    let metadata: String = row.get(7)?;

    Ok(Alert {
        id: parse_uuid(TABLE, &id)?,
        severity: AlertSeverity::parse(&severity)
            .ok_or_else(|| StoreError::malformed(TABLE, format!("unknown severity {severity:?}")))?,
        alert_type: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        is_dismissed: row.get::<i64>(5)? != 0,
        created_at: parse_time(TABLE, row.get(6)?)?,
        metadata: serde_json::from_str::<AlertMetadata>(&metadata)?,
    })
}

#[async_trait]
impl CheckStore for LibsqlStore {
    async fn list_active_services(&self) -> Result<Vec<Service>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {SERVICE_COLUMNS} FROM services WHERE is_paused = 0 ORDER BY created_at"),
                (),
            )
            .await?;

        let mut services = Vec::new();
        while let Some(row) = rows.next().await? {
            services.push(service_from_row(&row)?);
        }
        Ok(services)
    }

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"), params![id.to_string()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(service_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_service(&self, service: &Service) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO services (id, name, url, check_interval, is_paused, content_keyword, status, last_check, uptime_percentage, avg_response_time, ssl_expiry_date, ssl_issuer, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                check_interval = excluded.check_interval,
                is_paused = excluded.is_paused,
                content_keyword = excluded.content_keyword,
                status = excluded.status,
                last_check = excluded.last_check,
                uptime_percentage = excluded.uptime_percentage,
                avg_response_time = excluded.avg_response_time,
                ssl_expiry_date = excluded.ssl_expiry_date,
                ssl_issuer = excluded.ssl_issuer",
            params![
                service.id.to_string(),
                service.name.clone(),
                service.url.clone(),
                i64::from(service.check_interval),
                if service.is_paused { 1 } else { 0 },
                service.content_keyword.clone(),
                service.status.as_str(),
                service.last_check.map(to_millis),
                service.uptime_percentage,
                service.avg_response_time as i64,
                service.ssl_expiry_date.map(to_millis),
                service.ssl_issuer.clone(),
                to_millis(service.created_at)
            ],
        )
        .await?;
        Ok(())
    }

    async fn append_check(&self, check: &Check) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT OR IGNORE INTO checks (id, service_id, status, response_time, status_code, error_message, ttfb, response_size, checked_at, check_region) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                check.id.to_string(),
                check.service_id.to_string(),
                check.status.as_str(),
                check.response_time as i64,
                check.status_code.map(i64::from),
                check.error_message.clone(),
                check.ttfb.map(|v| v as i64),
                check.response_size.map(|v| v as i64),
                to_millis(check.checked_at),
                check.check_region.clone()
            ],
        )
        .await?;
        Ok(())
    }

    async fn count_checks(
        &self,
        service_id: Uuid,
        since: DateTime<Utc>,
        status: Option<MonitorStatus>,
    ) -> Result<u64, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = match status {
            Some(status) => {
                conn.query(
                    "SELECT COUNT(*) FROM checks WHERE service_id = ? AND checked_at >= ? AND status = ?",
                    params![service_id.to_string(), to_millis(since), status.as_str()],
                )
                .await?
            }
            None => {
                conn.query(
                    "SELECT COUNT(*) FROM checks WHERE service_id = ? AND checked_at >= ?",
                    params![service_id.to_string(), to_millis(since)],
                )
                .await?
            }
        };

        let row = rows.next().await?.ok_or(StoreError::NotFound)?;
        Ok(row.get::<i64>(0)?.max(0) as u64)
    }

    async fn recent_up_checks(&self, service_id: Uuid, limit: usize) -> Result<Vec<u64>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT response_time FROM checks WHERE service_id = ? AND status = ? ORDER BY checked_at DESC LIMIT ?",
                params![service_id.to_string(), MonitorStatus::Up.as_str(), clamp_limit(limit)],
            )
            .await?;

        let mut samples = Vec::new();
        while let Some(row) = rows.next().await? {
            samples.push(row.get::<i64>(0)?.max(0) as u64);
        }
        Ok(samples)
    }

    async fn latest_check(&self, service_id: Uuid) -> Result<Option<Check>, StoreError> {
        Ok(self.recent_checks(service_id, 1).await?.into_iter().next())
    }

    async fn recent_checks(&self, service_id: Uuid, limit: usize) -> Result<Vec<Check>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CHECK_COLUMNS} FROM checks WHERE service_id = ? ORDER BY checked_at DESC LIMIT ?"
                ),
                params![service_id.to_string(), clamp_limit(limit)],
            )
            .await?;

        let mut checks = Vec::new();
        while let Some(row) = rows.next().await? {
            checks.push(check_from_row(&row)?);
        }
        Ok(checks)
    }

    async fn update_service(&self, service_id: Uuid, update: &ServiceUpdate) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        let changed = match &update.certificate {
            Some(certificate) => {
                conn.execute(
                    "UPDATE services SET status = ?, last_check = ?, uptime_percentage = ?, avg_response_time = ?, ssl_expiry_date = ?, ssl_issuer = ? WHERE id = ?",
                    params![
                        update.status.as_str(),
                        to_millis(update.last_check),
                        update.uptime_percentage,
                        update.avg_response_time as i64,
                        to_millis(certificate.expires_at),
                        certificate.issuer.clone(),
                        service_id.to_string()
                    ],
                )
                .await?
            }
            None => {
                conn.execute(
                    "UPDATE services SET status = ?, last_check = ?, uptime_percentage = ?, avg_response_time = ? WHERE id = ?",
                    params![
                        update.status.as_str(),
                        to_millis(update.last_check),
                        update.uptime_percentage,
                        update.avg_response_time as i64,
                        service_id.to_string()
                    ],
                )
                .await?
            }
        };

        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn find_open_down_alert(&self, service_id: Uuid) -> Result<Option<Alert>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ALERT_COLUMNS} FROM alerts WHERE is_dismissed = 0 AND alert_type = ? ORDER BY created_at DESC LIMIT ?"
                ),
                params![DOWNTIME_ALERT, OPEN_ALERT_SEARCH_WINDOW as i64],
            )
            .await?;

        while let Some(row) = rows.next().await? {
            // One unreadable alert must not hide another service's incident.
            let alert = match alert_from_row(&row) {
                Ok(alert) => alert,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable alert during open-alert lookup");
                    continue;
                }
            };
            if alert.metadata.service_id == service_id && alert.metadata.resolved_at.is_none() {
                return Ok(Some(alert));
            }
        }
        Ok(None)
    }

    async fn create_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        let metadata = serde_json::to_string(&alert.metadata)?;
        conn.execute(
            &format!("INSERT INTO alerts ({ALERT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                alert.id.to_string(),
                alert.severity.as_str(),
                alert.alert_type.clone(),
                alert.title.clone(),
                alert.description.clone(),
                if alert.is_dismissed { 1 } else { 0 },
                to_millis(alert.created_at),
                metadata
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_alert(&self, id: Uuid, update: &AlertUpdate) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        let metadata = serde_json::to_string(&update.metadata)?;
        let changed = conn
            .execute(
                "UPDATE alerts SET is_dismissed = ?, metadata = ? WHERE id = ?",
                params![if update.is_dismissed { 1 } else { 0 }, metadata, id.to_string()],
            )
            .await?;

        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {ALERT_COLUMNS} FROM alerts ORDER BY created_at DESC LIMIT ?"),
                params![clamp_limit(limit)],
            )
            .await?;

        let mut alerts = Vec::new();
        while let Some(row) = rows.next().await? {
            alerts.push(alert_from_row(&row)?);
        }
        Ok(alerts)
    }
}
