use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, instrument, warn};

use crate::{
    client::SourceClient,
    error::{PipelineError, SourceError},
    grid::GridResolver,
    model::{Alert, Coordinate},
    sources::{ForecastPeriod, GridData, GridPoint, SunTimes, UvEntry},
};

/// Everything one poll gathered. Secondary sources are `None` when their
/// branch failed or was skipped.
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub coordinate: Coordinate,
    pub grid_point: GridPoint,
    pub time_zone: Tz,
    pub grid: GridData,
    pub forecast: Option<Vec<ForecastPeriod>>,
    pub hourly: Option<Vec<ForecastPeriod>>,
    pub sun: Option<SunTimes>,
    pub uv: Option<Vec<UvEntry>>,
    pub alerts: Option<Vec<Alert>>,
}

/// Picks the zone from the grid document, then the point document, then
/// `fallback`. Unknown zone names are skipped.
pub fn resolve_time_zone(grid: &GridData, point: &GridPoint, fallback: Tz) -> Tz {
    [grid.time_zone.as_deref(), point.time_zone.as_deref()]
        .into_iter()
        .flatten()
        .find_map(|name| match name.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(e) => {
                warn!(zone = name, "Ignoring unknown time zone: {e}");
                None
            }
        })
        .unwrap_or(fallback)
}

fn settle<T>(branch: &'static str, result: Result<T, SourceError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(branch, "Source unavailable, continuing without it: {e}");
            None
        }
    }
}

/// Resolves the grid and fetches its raw document, then fans out the
/// secondary sources concurrently. Only the grid steps are fatal.
#[instrument(skip(client, grid, zipcode), fields(zipcode = zipcode.unwrap_or("-")))]
pub async fn fetch_all(
    client: &SourceClient,
    grid: &GridResolver,
    coordinate: Coordinate,
    zipcode: Option<&str>,
    fallback_tz: Tz,
    now: DateTime<Utc>,
) -> Result<PipelineInputs, PipelineError> {
    let grid_point = grid.resolve(client, coordinate).await?;
    let grid_data = client.fetch_grid_data(&grid_point.address).await?;

    let time_zone = resolve_time_zone(&grid_data, &grid_point, fallback_tz);
    let today = now.with_timezone(&time_zone).date_naive();
    let address = &grid_point.address;

    let uv = async {
        match zipcode {
            Some(zip) => client.fetch_uv(zip).await.map(Some),
            None => {
                debug!("No zipcode supplied, skipping UV index");
                Ok(None)
            }
        }
    };

    let (forecast, hourly, sun, uv, alerts) = tokio::join!(
        client.fetch_forecast(address),
        client.fetch_hourly_forecast(address),
        client.fetch_sun_times(coordinate, today),
        uv,
        client.fetch_alerts(coordinate),
    );

    Ok(PipelineInputs {
        coordinate,
        time_zone,
        grid: grid_data,
        forecast: settle("forecast", forecast),
        hourly: settle("hourly forecast", hourly),
        sun: settle("sunrise/sunset", sun),
        uv: settle("uv index", uv).flatten(),
        alerts: settle("alerts", alerts),
        grid_point,
    })
}
