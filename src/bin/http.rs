#[cfg(feature = "http_api")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::net::SocketAddr;

    use campus_calendar::{
        CalendarSnapshot, EngineConfig, SchedulingEngine, http_api, load_snapshot_from_json, logging,
    };

    logging::init();

    let addr: SocketAddr = std::env::var("CAMPUS_CALENDAR_HTTP_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        .parse()?;
    let config = EngineConfig::from_env()?;
    let snapshot = match std::env::var("CAMPUS_CALENDAR_SNAPSHOT") {
        Ok(path) => load_snapshot_from_json(path)?,
        Err(_) => CalendarSnapshot::default(),
    };

    tracing::info!(%addr, "campus-calendar HTTP API listening");
    http_api::serve(addr, SchedulingEngine::with_config(snapshot, config)).await?;
    Ok(())
}

#[cfg(not(feature = "http_api"))]
fn main() {
    eprintln!("Rebuild with the `http_api` feature to enable the HTTP server.");
}
