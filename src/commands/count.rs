use anyhow::{Context, Result};

use busy_airports::config::Config;
use busy_airports::departure_service::DepartureService;

/// Run one departure cycle and print the result
pub async fn handle_count(config: Config, json: bool) -> Result<()> {
    let service = DepartureService::from_config(&config)
        .context("Failed to build the departure service")?;
    service
        .initialize()
        .await
        .context("Failed to load airport references")?;

    // initialize already tried every missing airport once
    let report = service
        .current_departures_cached()
        .await
        .context("Departure cycle failed")?;

    if json {
        let body = report.to_json()?;
        println!("{}", String::from_utf8_lossy(&body));
        return Ok(());
    }

    for (icao, count) in &report.0 {
        match count {
            Some(n) => println!("{} pilots are departing {} at the moment", n, icao),
            None => println!("{}: airport reference unavailable", icao),
        }
    }
    Ok(())
}
