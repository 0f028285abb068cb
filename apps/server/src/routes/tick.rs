use actix_web::{HttpResponse, post, web};
use pulsecheck_engine::Orchestrator;
use serde::Deserialize;
use tracing::error;

use crate::error::AppError;

#[derive(Debug, Default, Deserialize)]
pub struct TickParams {
    #[serde(default)]
    force: bool,
}

/// Run one tick now. Used by cron webhooks and the "check now" button.
#[post("/tick")]
pub async fn tick_route(
    orchestrator: web::Data<Orchestrator>,
    params: web::Query<TickParams>,
) -> Result<HttpResponse, AppError> {
    let report = orchestrator.run_tick(params.force).await.map_err(|e| {
        error!(error = %e, "Tick failed");
        AppError::Tick(e)
    })?;

    Ok(HttpResponse::Ok().json(report))
}
