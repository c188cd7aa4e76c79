use anyhow::{Context, Result, bail};
use tracing::info;

use busy_airports::config::Config;
use busy_airports::departure_service::DepartureService;

pub async fn handle_refresh_airports(config: Config) -> Result<()> {
    info!(
        "Refreshing {} airport references into {:?}",
        config.watch_list.len(),
        config.store_path
    );

    let service = DepartureService::from_config(&config)
        .context("Failed to build the departure service")?;
    let lookups = service
        .refresh_references()
        .await
        .context("Failed to refresh airport references")?;
    super::log_lookups(&lookups);

    let resolved = lookups.values().filter(|l| l.is_resolved()).count();
    if resolved == 0 {
        bail!("No airport reference could be fetched");
    }
    info!("Refreshed {} of {} airport references", resolved, lookups.len());
    Ok(())
}
