use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use busy_airports::config::Config;
use busy_airports::departure_service::DepartureService;
use busy_airports::metrics::init_metrics;
use busy_airports::web::{AppState, start_web_server};

pub async fn handle_serve(
    config: Config,
    interface: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let interface = interface.unwrap_or_else(|| config.server.interface.clone());
    let port = port.unwrap_or(config.server.port);

    let metrics = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {:#}", e);
            None
        }
    };

    let service = DepartureService::from_config(&config)
        .context("Failed to build the departure service")?;
    let lookups = service
        .initialize()
        .await
        .context("Failed to load airport references")?;
    super::log_lookups(&lookups);
    info!(
        "{} of {} airport references available",
        service.cache().len(),
        service.watch_list().len()
    );

    let state = AppState {
        service: Arc::new(service),
        metrics,
    };
    start_web_server(interface, port, state).await
}
