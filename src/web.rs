use anyhow::Result;
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::departure_service::DepartureService;
use crate::errors::DepartureError;

// App state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DepartureService>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn status_for(e: &DepartureError) -> StatusCode {
    match e {
        DepartureError::NetworkUnavailable(_) | DepartureError::MalformedSnapshot(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Departure count per watched airport; unresolved airports are `null`
async fn get_departures(State(state): State<AppState>) -> Response {
    let report = match state.service.current_departures().await {
        Ok(report) => report,
        Err(e) => {
            error!("Departure cycle failed: {}", e);
            return json_error(status_for(&e), &e.to_string());
        }
    };

    match report.to_json() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode departure report: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode JSON").into_response()
        }
    }
}

async fn get_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics recorder not installed").into_response(),
    }
}

// Middleware for request logging with correlation ID
async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = Uuid::new_v4().to_string()[..8].to_string();
    let start_time = Instant::now();

    info!("Started {} {} [{}]", method, path, request_id);

    let response = next.run(request).await;
    let duration = start_time.elapsed();
    let status = response.status();

    metrics::histogram!("http_request_duration_seconds").record(duration.as_secs_f64());
    info!(
        "Completed {} {} [{}] {} in {:.2}ms",
        method,
        path,
        request_id,
        status.as_u16(),
        duration.as_secs_f64() * 1000.0
    );

    response
}

/// Routes for the result surface. Only GET is routed, other methods get 405.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/departures", get(get_departures))
        .route("/metrics", get(get_metrics))
        .with_state(state)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(CorsLayer::permissive())
}

pub async fn start_web_server(interface: String, port: u16, state: AppState) -> Result<()> {
    info!("Starting web server on {}:{}", interface, port);

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", interface, port)).await?;
    info!("Web server listening on http://{}:{}", interface, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Web server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
