use actix_web::web::ServiceConfig;

mod health;
mod tick;

pub fn routes(cfg: &mut ServiceConfig) {
    cfg.service(health::health_route).service(tick::tick_route);
}

#[cfg(test)]
mod tests {
    use actix_web::{App, test, web};
    use pulsecheck_engine::Orchestrator;
    use pulsecheck_engine::config::Config;
    use serde_json::Value;

    async fn orchestrator(dir: &tempfile::TempDir) -> web::Data<Orchestrator> {
        let mut config = Config::default();
        config.database.path = dir.path().join("server.db").to_string_lossy().into_owned();
        web::Data::new(Orchestrator::from_config(&config).await.unwrap())
    }

    #[actix_web::test]
    async fn test_health_route() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(orchestrator(&dir).await).configure(super::routes)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_tick_on_empty_roster() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(orchestrator(&dir).await).configure(super::routes)).await;

        let req = test::TestRequest::post().uri("/tick?force=true").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["checked"], 0);
        assert_eq!(body["results"], Value::Array(vec![]));

        let req = test::TestRequest::get().uri("/tick").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_client_error());
    }
}
