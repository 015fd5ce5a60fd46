use async_trait::async_trait;
use chrono::{DateTime, Offset, Utc};
use chrono_tz::Tz;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

use crate::{
    aggregate::{Aggregator, DAILY_COUNT, HOURLY_COUNT},
    client::SourceClient,
    config::Endpoints,
    error::{PipelineError, SourceError},
    fetch::{PipelineInputs, fetch_all},
    grid::GridResolver,
    model::{ForecastRequest, NormalizedForecast, Units},
    revision::RevisionCache,
};

use super::WeatherProvider;

/// Pipeline over the keyless U.S. sources (weather.gov grid and text
/// forecasts, sunrise/sunset, EPA UV index, active alerts).
///
/// Owns the grid-address cache for its lifetime; the revision cache lives on
/// disk and is read at the start and written at the end of each poll.
#[derive(Debug)]
pub struct NwsProvider {
    client: SourceClient,
    grid: GridResolver,
    fallback_tz: Tz,
    cache_path: PathBuf,
}

impl NwsProvider {
    pub fn new(
        user_agent: &str,
        endpoints: Endpoints,
        fallback_tz: Tz,
        cache_path: PathBuf,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client: SourceClient::new(user_agent, endpoints)?,
            grid: GridResolver::new(),
            fallback_tz,
            cache_path,
        })
    }

    pub fn grid_resolver(&self) -> &GridResolver {
        &self.grid
    }

    /// One poll with a pinned clock; every "now"-relative step uses `now`.
    #[instrument(skip(self, request), fields(lat = ?request.latitude, lon = ?request.longitude))]
    pub async fn poll_at(
        &self,
        request: &ForecastRequest,
        now: DateTime<Utc>,
    ) -> Result<NormalizedForecast, PipelineError> {
        let (coordinate, zipcode) = request.validate()?;
        let mut cache = RevisionCache::load(&self.cache_path);

        let inputs = fetch_all(
            &self.client,
            &self.grid,
            coordinate,
            zipcode,
            self.fallback_tz,
            now,
        )
        .await?;

        let mut forecast = assemble(&inputs, now);

        cache.merge(&mut forecast.daily, &coordinate.location_key(), now);
        cache.prune(now.with_timezone(&inputs.time_zone).date_naive());
        if let Err(e) = cache.save(&self.cache_path) {
            warn!(path = %self.cache_path.display(), "Failed to persist revision cache: {e}");
        }

        info!(
            office = %inputs.grid_point.address.office_id,
            hourly = forecast.hourly.len(),
            daily = forecast.daily.len(),
            alerts = forecast.alerts.len(),
            "Forecast poll complete"
        );

        Ok(forecast.into_units(request.units))
    }
}

/// Builds the metric forecast object from gathered inputs.
pub fn assemble(inputs: &PipelineInputs, now: DateTime<Utc>) -> NormalizedForecast {
    let aggregator = Aggregator::new(inputs, now);
    let offset = now
        .with_timezone(&inputs.time_zone)
        .offset()
        .fix()
        .local_minus_utc();

    NormalizedForecast {
        lat: inputs.coordinate.latitude,
        lon: inputs.coordinate.longitude,
        timezone: inputs.time_zone.name().to_string(),
        timezone_offset: offset,
        units: Units::Metric,
        current: aggregator.build_current(),
        hourly: aggregator.build_hourly(HOURLY_COUNT),
        daily: aggregator.build_daily(DAILY_COUNT),
        alerts: inputs.alerts.clone().unwrap_or_default(),
    }
}

#[async_trait]
impl WeatherProvider for NwsProvider {
    async fn get_forecast(
        &self,
        request: &ForecastRequest,
    ) -> Result<NormalizedForecast, PipelineError> {
        self.poll_at(request, Utc::now()).await
    }
}
