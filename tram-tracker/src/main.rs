use std::process::ExitCode;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tram_tracker::config::{Settings, Upstream};
use tram_tracker::domain::{LineCatalog, Point, Position};
use tram_tracker::tracker::{MatchOutcome, Tracker, TrackerError};
use tram_tracker::vasttrafik::{MockTransitClient, TransitApi, VasttrafikClient};

/// How many ranked candidates to report per position.
const REPORT_TOP: usize = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Tram tracker failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), TrackerError> {
    let settings = Settings::from_env();

    let catalog = LineCatalog::load(&settings.lines_path)?;
    info!(
        lines = catalog.len(),
        path = %settings.lines_path.display(),
        "Loaded line catalog"
    );

    match settings.upstream {
        Upstream::Mock(dir) => {
            info!(dir = %dir.display(), "Using mock transit data");
            let client = MockTransitClient::from_dir(&dir)?;
            track(Tracker::new(catalog, client, settings.tracker)).await
        }
        Upstream::Vasttrafik(config) => {
            if config.client_id.is_empty() || config.client_secret.is_empty() {
                warn!("VASTTRAFIK_CLIENT_ID or VASTTRAFIK_CLIENT_SECRET not set");
            }
            let client = VasttrafikClient::new(config)?;
            track(Tracker::new(catalog, client, settings.tracker)).await
        }
    }
}

/// Read `lat,lon` lines from stdin until EOF, matching each one.
async fn track<A: TransitApi>(tracker: Tracker<A>) -> Result<(), TrackerError> {
    tracker.start_background();
    info!("Reading positions from stdin (one \"lat,lon\" per line)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let position: Point = match line.parse() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Skipping line");
                continue;
            }
        };

        match tracker.on_position(Position::new(position, Utc::now())).await {
            Ok(MatchOutcome::NoMatch) => info!(%position, "No tram matches this position"),
            Ok(outcome) => report(&outcome),
            Err(e) => warn!(%position, error = %e, "Could not match position"),
        }
    }

    let stats = tracker.stats().await;
    info!(
        arrival_entities = stats.arrival_entities.size,
        journey_entities = stats.journey_entities.size,
        journey_cache_hit_rate = stats.journey_cache.hit_rate,
        "Shutting down"
    );
    tracker.shutdown().await;
    Ok(())
}

fn report(outcome: &MatchOutcome) {
    for (rank, candidate) in outcome.ranked().iter().take(REPORT_TOP).enumerate() {
        let journey = &candidate.arrival.service_journey;
        info!(
            rank = rank + 1,
            line = journey.line.label(),
            direction = journey.direction.as_deref().unwrap_or("?"),
            stop = %candidate.arrival.stop_point.name,
            error_ms = candidate.score().millis(),
            "Candidate"
        );
    }
}
