#![warn(clippy::all, clippy::pedantic)]

use std::env;

use actix_web::{App, HttpServer, web};
use pulsecheck_engine::config::Config;
use pulsecheck_engine::Orchestrator;
use tracing::info;

mod error;
mod routes;

use error::AppError;
use logger::init_tracing;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_config(env::var_os("PULSECHECK_CONFIG"))?;
    let orchestrator = Orchestrator::from_config(&config).await.map_err(AppError::Startup)?;

    run_server(&config.server.bind, config.server.port, web::Data::new(orchestrator)).await
}

async fn run_server(bind: &str, port: u16, orchestrator: web::Data<Orchestrator>) -> Result<(), AppError> {
    info!(bind, port, "Starting HTTP trigger");

    HttpServer::new(move || App::new().app_data(orchestrator.clone()).configure(routes::routes))
        .bind((bind, port))?
        .run()
        .await?;

    Ok(())
}
