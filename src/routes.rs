//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod metrics;
mod pipelines;
mod schema;

use crate::config::Settings;
use crate::error::{ApiResult, AppError};
use crate::state::SharedState;
use axum::{
    extract::State,
    http::{header, Method},
    routing::{get, post},
    Json, Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        // Health
        .route("/api/health", get(health_check))
        .route("/api/health/ready", get(readiness_check))

        // Warehouse metrics
        .route("/api/metrics/summary", get(metrics::get_metrics_summary))
        .route("/api/pipelines/recent", get(metrics::get_recent_pipelines))
        .route("/api/data-quality/score", get(metrics::get_data_quality_score))
        .route("/api/warehouse/schema", get(schema::get_schema_report))

        // Data Factory
        .route("/api/pipelines/trigger", post(pipelines::trigger_pipeline))
        .route("/api/pipelines/runs", get(pipelines::list_runs))
        .route("/api/pipelines/runs/{run_id}", get(pipelines::get_run))
        .route("/api/pipelines/runs/{run_id}/wait", post(pipelines::wait_for_run))

        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let layer = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    };

    layer
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// Liveness: the process is up
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness: the warehouse answers a round trip
async fn readiness_check(State(state): State<SharedState>) -> ApiResult<Json<serde_json::Value>> {
    state
        .warehouse
        .ping()
        .await
        .map_err(|e| AppError::Unavailable(format!("Warehouse is not reachable: {}", e)))?;

    let data_factory = if state.orchestrator.is_some() {
        "configured"
    } else {
        "not configured"
    };

    Ok(Json(serde_json::json!({
        "status": "ready",
        "warehouse": "reachable",
        "data_factory": data_factory,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollConfig;
    use crate::models::{EtlControlRow, LoadSummaryCounts, QualityCounts};
    use crate::orchestration::poller::cancel_channel;
    use crate::orchestration::{PipelineOrchestrator, RunPoller, RunStatus};
    use crate::state::AppState;
    use crate::testing::{run_record, FakeWarehouse, ScriptedOrchestrator};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::sync::watch;
    use tower::ServiceExt;

    const RUN_ID: &str = "0b5a3c1e-8f2d-4d9a-9c1b-2e7f6a5d4c3b";

    struct TestApp {
        router: Router,
        warehouse: Arc<FakeWarehouse>,
        orchestrator: Option<Arc<ScriptedOrchestrator>>,
        shutdown: watch::Sender<bool>,
    }

    fn app(warehouse: FakeWarehouse, orchestrator: Option<ScriptedOrchestrator>) -> TestApp {
        let settings = Settings::from_lookup(|_| None).unwrap();
        let warehouse = Arc::new(warehouse);
        let orchestrator = orchestrator.map(Arc::new);
        let (shutdown, signal) = cancel_channel();
        let poller = RunPoller::new(PollConfig {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(3600),
        });

        let state = Arc::new(AppState::new(
            warehouse.clone(),
            orchestrator
                .clone()
                .map(|o| o as Arc<dyn PipelineOrchestrator>),
            poller,
            signal,
        ));

        TestApp {
            router: create_router(state, &settings),
            warehouse,
            orchestrator,
            shutdown,
        }
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn control_row(table: &str, status: &str) -> EtlControlRow {
        EtlControlRow {
            table_name: table.to_string(),
            load_date: None,
            status: Some(status.to_string()),
            records_processed: 100,
            modified_date: None,
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(FakeWarehouse::default(), None);
        let (status, body) = send(app.router, get_request("/api/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("healthy"));
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_readiness_reports_unreachable_warehouse() {
        let warehouse = FakeWarehouse {
            unreachable: true,
            ..FakeWarehouse::default()
        };
        let app = app(warehouse, None);
        let (status, body) = send(app.router, get_request("/api/health/ready")).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("not reachable"));
    }

    #[tokio::test]
    async fn test_summary_eight_of_ten_successful() {
        let warehouse = FakeWarehouse {
            summary: LoadSummaryCounts {
                total: 10,
                successful: 8,
                total_records: 5000,
                avg_duration_minutes: 12.0,
            },
            ..FakeWarehouse::default()
        };
        let app = app(warehouse, None);
        let (status, body) = send(app.router, get_request("/api/metrics/summary")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "total_pipelines": 10,
                "successful_pipelines": 8,
                "total_records": 5000,
                "avg_duration_minutes": 12.0,
                "success_rate": 80.0
            })
        );
    }

    #[tokio::test]
    async fn test_summary_with_empty_control_table() {
        let app = app(FakeWarehouse::default(), None);
        let (status, body) = send(app.router, get_request("/api/metrics/summary")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success_rate"], json!(0.0));
    }

    #[tokio::test]
    async fn test_summary_surfaces_warehouse_errors() {
        let warehouse = FakeWarehouse {
            unreachable: true,
            ..FakeWarehouse::default()
        };
        let app = app(warehouse, None);
        let (status, body) = send(app.router, get_request("/api/metrics/summary")).await;

        assert!(!status.is_success());
        assert_eq!(body["error"], json!("warehouse unreachable"));
    }

    #[tokio::test]
    async fn test_quality_score_with_no_checks() {
        let app = app(FakeWarehouse::default(), None);
        let (status, body) = send(app.router, get_request("/api/data-quality/score")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "quality_score": 100.0,
                "total_checks": 0,
                "passed_checks": 0,
                "failed_checks": 0
            })
        );
    }

    #[tokio::test]
    async fn test_quality_score_with_failures() {
        let warehouse = FakeWarehouse {
            quality: QualityCounts { total: 4, passed: 3 },
            ..FakeWarehouse::default()
        };
        let app = app(warehouse, None);
        let (_, body) = send(app.router, get_request("/api/data-quality/score")).await;

        assert_eq!(body["quality_score"], json!(75.0));
        assert_eq!(body["failed_checks"], json!(1));
    }

    #[tokio::test]
    async fn test_recent_pipelines_default_limit() {
        let warehouse = FakeWarehouse {
            loads: (0..15).map(|i| control_row(&format!("t{}", i), "Success")).collect(),
            ..FakeWarehouse::default()
        };
        let app = app(warehouse, None);
        let (status, body) = send(app.router, get_request("/api/pipelines/recent")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 10);
        assert_eq!(body[0]["table_name"], json!("t0"));
        assert_eq!(*app.warehouse.last_limit.lock().unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_recent_pipelines_passes_limit_through() {
        let app = app(FakeWarehouse::default(), None);
        let (status, _) = send(app.router, get_request("/api/pipelines/recent?limit=25")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(*app.warehouse.last_limit.lock().unwrap(), Some(25));
    }

    #[tokio::test]
    async fn test_recent_pipelines_rejects_out_of_range_limits() {
        for uri in [
            "/api/pipelines/recent?limit=0",
            "/api/pipelines/recent?limit=101",
            "/api/pipelines/recent?limit=10;DROP%20TABLE%20x",
        ] {
            let app = app(FakeWarehouse::default(), None);
            let (status, body) = send(app.router, get_request(uri)).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert!(body["error"].is_string());
            assert_eq!(*app.warehouse.last_limit.lock().unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_trigger_missing_pipeline_name_is_client_error() {
        let app = app(FakeWarehouse::default(), Some(ScriptedOrchestrator::default()));
        let (status, body) = send(app.router, post_json("/api/pipelines/trigger", json!({}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("pipeline_name is required"));
        assert!(app.orchestrator.unwrap().triggered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_malformed_body_is_client_error() {
        let app = app(FakeWarehouse::default(), Some(ScriptedOrchestrator::default()));
        let request = Request::builder()
            .method("POST")
            .uri("/api/pipelines/trigger")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(app.router, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_trigger_starts_run() {
        let app = app(FakeWarehouse::default(), Some(ScriptedOrchestrator::default()));
        let (status, body) = send(
            app.router,
            post_json(
                "/api/pipelines/trigger",
                json!({
                    "pipeline_name": "PL_FullLoad_OnPremToAzureDW",
                    "parameters": { "LastLoadDate": "2024-01-01" }
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("triggered"));
        assert_eq!(body["pipeline_name"], json!("PL_FullLoad_OnPremToAzureDW"));
        assert_eq!(body["run_id"], json!("run-1"));

        let orchestrator = app.orchestrator.unwrap();
        let triggered = orchestrator.triggered.lock().unwrap();
        assert_eq!(triggered[0].0, "PL_FullLoad_OnPremToAzureDW");
        assert_eq!(triggered[0].1["LastLoadDate"], json!("2024-01-01"));
    }

    #[tokio::test]
    async fn test_trigger_unknown_pipeline_is_not_found() {
        let app = app(FakeWarehouse::default(), Some(ScriptedOrchestrator::default()));
        let (status, _) = send(
            app.router,
            post_json("/api/pipelines/trigger", json!({ "pipeline_name": "PL_Missing" })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_trigger_without_factory_is_unavailable() {
        let app = app(FakeWarehouse::default(), None);
        let (status, body) = send(
            app.router,
            post_json("/api/pipelines/trigger", json!({ "pipeline_name": "PL_FullLoad" })),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], json!("NOT_CONFIGURED"));
    }

    #[tokio::test]
    async fn test_get_run_requires_guid() {
        let app = app(FakeWarehouse::default(), Some(ScriptedOrchestrator::default()));
        let (status, _) = send(app.router, get_request("/api/pipelines/runs/not-a-guid")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_run() {
        let orchestrator = ScriptedOrchestrator::with_statuses(&[RunStatus::Queued]);
        let app = app(FakeWarehouse::default(), Some(orchestrator));
        let (status, body) = send(app.router, get_request(&format!("/api/pipelines/runs/{}", RUN_ID))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["run_id"], json!(RUN_ID));
        assert_eq!(body["status"], json!("Queued"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_terminal_run() {
        let orchestrator = ScriptedOrchestrator::with_statuses(&[RunStatus::InProgress, RunStatus::Failed]);
        let app = app(FakeWarehouse::default(), Some(orchestrator));
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/pipelines/runs/{}/wait", RUN_ID))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("Failed"));
        assert_eq!(app.orchestrator.unwrap().status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cancelled_by_shutdown() {
        let app = app(FakeWarehouse::default(), Some(ScriptedOrchestrator::default()));
        app.shutdown.send(true).unwrap();

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/pipelines/runs/{}/wait", RUN_ID))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app.router, request).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_list_runs() {
        let orchestrator = ScriptedOrchestrator::with_runs(vec![
            run_record("a", RunStatus::Succeeded),
            run_record("b", RunStatus::InProgress),
        ]);
        let app = app(FakeWarehouse::default(), Some(orchestrator));
        let (status, body) = send(app.router, get_request("/api/pipelines/runs?hours=6")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_runs_rejects_large_window() {
        let app = app(FakeWarehouse::default(), Some(ScriptedOrchestrator::default()));
        let (status, body) = send(app.router, get_request("/api/pipelines/runs?hours=1000")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("VALIDATION_ERROR"));
    }

    #[tokio::test]
    async fn test_schema_report() {
        let app = app(FakeWarehouse::default(), None);
        let (status, body) = send(app.router, get_request("/api/warehouse/schema")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], json!(true));
        assert_eq!(body["objects"][0], json!({
            "kind": "table",
            "schema": "staging",
            "name": "customers",
            "exists": true
        }));
    }
}
