use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    Config, ForecastRequest, NormalizedForecast, error::PipelineError,
    provider::nws::NwsProvider,
};

pub mod nws;

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Runs one poll and returns the normalized forecast.
    async fn get_forecast(
        &self,
        request: &ForecastRequest,
    ) -> Result<NormalizedForecast, PipelineError>;
}

/// Construct the free-source provider from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let cache_path = config.revision_cache_path()?;
    let provider = NwsProvider::new(
        &config.user_agent,
        config.endpoints.clone(),
        config.fallback_tz()?,
        cache_path,
    )?;

    Ok(Box::new(provider))
}
