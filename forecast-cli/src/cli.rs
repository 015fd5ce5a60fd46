use anyhow::Context;
use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand};
use forecast_core::{
    Config, ForecastRequest, NormalizedForecast, Units, WeatherProvider, provider_from_config,
};
use inquire::{CustomType, Text};
use std::time::Duration;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "forecast", version, about = "Forecast from free U.S. government sources")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Location and unit overrides shared by `show` and `watch`.
#[derive(Debug, Args)]
pub struct Target {
    /// Latitude in decimal degrees; defaults to the configured location.
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude in decimal degrees; defaults to the configured location.
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// ZIP code for the UV index.
    #[arg(long)]
    zip: Option<String>,

    /// "imperial" or "metric".
    #[arg(long)]
    units: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the default location and client identification.
    Configure {
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
        #[arg(long)]
        zip: Option<String>,
        #[arg(long)]
        units: Option<String>,
        /// Contact string sent as User-Agent to weather.gov.
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Fetch and print the forecast once.
    Show {
        #[command(flatten)]
        target: Target,

        /// Print the full normalized forecast as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Poll periodically and print each result.
    Watch {
        #[command(flatten)]
        target: Target,

        #[arg(long, default_value_t = 15)]
        interval_minutes: u64,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { lat, lon, zip, units, user_agent } => {
                configure(lat, lon, zip, units, user_agent)
            }
            Command::Show { target, json } => {
                let config = Config::load()?;
                let request = target.request(&config)?;
                let provider = provider_from_config(&config)?;
                let forecast = provider.get_forecast(&request).await?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&forecast)?);
                } else {
                    print_summary(&forecast);
                }
                Ok(())
            }
            Command::Watch { target, interval_minutes } => {
                let config = Config::load()?;
                let request = target.request(&config)?;
                let provider = provider_from_config(&config)?;
                watch(provider.as_ref(), &request, interval_minutes).await;
                Ok(())
            }
        }
    }
}

impl Target {
    fn request(&self, config: &Config) -> anyhow::Result<ForecastRequest> {
        let units = match &self.units {
            Some(u) => Units::try_from(u.as_str())?,
            None => config.units,
        };

        let (latitude, longitude, zipcode) = match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => (lat, lon, self.zip.clone()),
            (None, None) => {
                let loc = config.default_location()?;
                (loc.latitude, loc.longitude, self.zip.clone().or_else(|| loc.zipcode.clone()))
            }
            _ => anyhow::bail!("--lat and --lon must be given together"),
        };

        Ok(ForecastRequest {
            latitude: Some(latitude),
            longitude: Some(longitude),
            zipcode,
            units,
        })
    }
}

fn configure(
    lat: Option<f64>,
    lon: Option<f64>,
    zip: Option<String>,
    units: Option<String>,
    user_agent: Option<String>,
) -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let latitude = match lat {
        Some(v) => v,
        None => CustomType::<f64>::new("Latitude:")
            .with_error_message("Please enter a decimal number")
            .prompt()
            .context("Failed to read latitude")?,
    };
    let longitude = match lon {
        Some(v) => v,
        None => CustomType::<f64>::new("Longitude:")
            .with_error_message("Please enter a decimal number")
            .prompt()
            .context("Failed to read longitude")?,
    };
    let zipcode = match zip {
        Some(z) => Some(z),
        None => Text::new("ZIP code (optional, enables UV index):")
            .prompt_skippable()
            .context("Failed to read ZIP code")?,
    };

    config.set_location(latitude, longitude, zipcode);
    if let Some(u) = units {
        config.units = Units::try_from(u.as_str())?;
    }
    if let Some(agent) = user_agent {
        config.user_agent = agent;
    }
    config.save()?;

    println!(
        "Saved location {latitude}, {longitude} to {}",
        Config::config_file_path()?.display()
    );
    Ok(())
}

/// A slow poll delays the next tick rather than bursting to catch up.
fn poll_interval(interval_minutes: u64) -> Interval {
    let mut interval = time::interval(Duration::from_secs(interval_minutes.max(1) * 60));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn watch(provider: &dyn WeatherProvider, request: &ForecastRequest, interval_minutes: u64) {
    let mut interval = poll_interval(interval_minutes);
    info!("Polling every {} minutes", interval_minutes.max(1));

    let mut last_success: Option<DateTime<Local>> = None;
    loop {
        interval.tick().await;
        match provider.get_forecast(request).await {
            Ok(forecast) => {
                last_success = Some(Local::now());
                print_summary(&forecast);
            }
            Err(e) => {
                error!("Forecast poll failed: {e}");
                match last_success {
                    Some(at) => warn!("Forecast is stale; last update at {}", at.format("%H:%M")),
                    None => warn!("No forecast has been fetched yet"),
                }
            }
        }
    }
}

fn fmt_value(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "--".to_string(), |v| format!("{v:.0}{unit}"))
}

fn print_summary(forecast: &NormalizedForecast) {
    let (temp_unit, speed_unit) = match forecast.units {
        Units::Imperial => ("°F", " mph"),
        Units::Metric => ("°C", " m/s"),
    };
    let now = &forecast.current;

    println!(
        "{} ({:.2}, {:.2}) at {}",
        forecast.timezone,
        forecast.lat,
        forecast.lon,
        now.dt.with_timezone(&Local).format("%a %H:%M")
    );
    println!(
        "  Now: {} {} (feels {}), humidity {}, wind {}, UV {:.0}",
        fmt_value(now.temp, temp_unit),
        now.condition.description,
        fmt_value(now.feels_like, temp_unit),
        fmt_value(now.humidity, "%"),
        fmt_value(now.wind_speed, speed_unit),
        now.uvi,
    );

    println!("  Next hours:");
    for hour in forecast.hourly.iter().take(6) {
        println!(
            "    {}  {:>6}  {:<20} pop {}",
            hour.dt.with_timezone(&Local).format("%H:%M"),
            fmt_value(hour.temp, temp_unit),
            hour.condition.description,
            fmt_value(hour.pop.map(|p| p * 100.0), "%"),
        );
    }

    println!("  Daily:");
    for day in &forecast.daily {
        println!(
            "    {}  {:>6} / {:<6}  {:<20} pop {}  wind {}",
            day.date.format("%a %d"),
            fmt_value(day.temp.max, temp_unit),
            fmt_value(day.temp.min, temp_unit),
            day.condition.description,
            fmt_value(day.pop.map(|p| p * 100.0), "%"),
            fmt_value(day.wind_speed, speed_unit),
        );
    }

    for alert in &forecast.alerts {
        println!("  ALERT: {} ({})", alert.event, alert.sender_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(lat: Option<f64>, lon: Option<f64>, zip: Option<&str>) -> Target {
        Target { lat, lon, zip: zip.map(String::from), units: None }
    }

    #[test]
    fn explicit_coordinates_override_config() {
        let mut config = Config::default();
        config.set_location(39.95, -75.16, Some("19103".into()));

        let req = target(Some(34.05), Some(-118.25), None).request(&config).unwrap();
        assert_eq!(req.latitude, Some(34.05));
        assert_eq!(req.zipcode, None);
    }

    #[test]
    fn configured_location_fills_gaps() {
        let mut config = Config::default();
        config.set_location(39.95, -75.16, Some("19103".into()));
        config.units = Units::Metric;

        let req = target(None, None, None).request(&config).unwrap();
        assert_eq!(req.longitude, Some(-75.16));
        assert_eq!(req.zipcode.as_deref(), Some("19103"));
        assert_eq!(req.units, Units::Metric);
    }

    #[tokio::test]
    async fn poll_interval_delays_missed_ticks() {
        let interval = poll_interval(0);
        assert_eq!(interval.missed_tick_behavior(), MissedTickBehavior::Delay);
        assert_eq!(interval.period(), Duration::from_secs(60));
    }

    #[test]
    fn lone_latitude_is_rejected() {
        let err = target(Some(1.0), None, None).request(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("--lat and --lon"));
    }
}
