use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PipelineError;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Exact key used by the grid-address cache.
    pub fn cache_key(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }

    /// Key used by the revision cache to detect a location change.
    pub fn location_key(&self) -> String {
        format!("{:.2},{:.2}", self.latitude, self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4},{:.4}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Imperial,
    Metric,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Imperial => "imperial",
            Units::Metric => "metric",
        }
    }

    fn temperature(&self, celsius: f64) -> f64 {
        match self {
            Units::Imperial => celsius * 9.0 / 5.0 + 32.0,
            Units::Metric => celsius,
        }
    }

    fn speed(&self, meters_per_second: f64) -> f64 {
        match self {
            Units::Imperial => meters_per_second * 2.236_936,
            Units::Metric => meters_per_second,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Units {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "imperial" => Ok(Units::Imperial),
            "metric" => Ok(Units::Metric),
            _ => Err(anyhow::anyhow!(
                "Unknown units '{value}'. Supported units: imperial, metric."
            )),
        }
    }
}

/// Inbound request from a display collaborator.
#[derive(Debug, Clone, Default)]
pub struct ForecastRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub zipcode: Option<String>,
    pub units: Units,
}

impl ForecastRequest {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            latitude: Some(coordinate.latitude),
            longitude: Some(coordinate.longitude),
            ..Self::default()
        }
    }

    pub fn with_zipcode(mut self, zipcode: impl Into<String>) -> Self {
        self.zipcode = Some(zipcode.into());
        self
    }

    pub fn with_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    /// Checks the request before any network activity.
    pub fn validate(&self) -> Result<(Coordinate, Option<&str>), PipelineError> {
        let latitude = self
            .latitude
            .ok_or_else(|| PipelineError::Validation("latitude is required".into()))?;
        let longitude = self
            .longitude
            .ok_or_else(|| PipelineError::Validation("longitude is required".into()))?;

        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(PipelineError::Validation(format!(
                "latitude {latitude} is out of range"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(PipelineError::Validation(format!(
                "longitude {longitude} is out of range"
            )));
        }

        let zipcode = self
            .zipcode
            .as_deref()
            .map(str::trim)
            .filter(|z| !z.is_empty());

        Ok((Coordinate::new(latitude, longitude), zipcode))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionCategory {
    Clear,
    Clouds,
    Rain,
    Snow,
    Sleet,
    Thunderstorm,
    Fog,
    Wind,
}

impl ConditionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Clouds => "Clouds",
            Self::Rain => "Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Thunderstorm => "Thunderstorm",
            Self::Fog => "Fog",
            Self::Wind => "Wind",
        }
    }

    /// Severity rank; lower ranks win when several phenomena coincide.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Thunderstorm => 0,
            Self::Sleet => 1,
            Self::Snow => 2,
            Self::Rain => 3,
            Self::Fog => 4,
            Self::Clouds => 5,
            Self::Clear => 6,
            Self::Wind => 7,
        }
    }
}

/// A normalized weather condition with a day/night icon code such as `"10d"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: u16,
    pub category: ConditionCategory,
    pub description: String,
    pub icon: String,
    pub is_daytime: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointForecast {
    pub dt: DateTime<Utc>,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub temp: Option<f64>,
    pub feels_like: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
    pub dew_point: Option<f64>,
    pub uvi: f64,
    pub clouds: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
    pub wind_deg: Option<f64>,
    /// Probability of precipitation as a 0-1 fraction.
    pub pop: Option<f64>,
    /// Precipitation over the hour, in mm.
    pub rain: Option<f64>,
    pub snow: Option<f64>,
    pub condition: Condition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyTemperature {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub day: Option<f64>,
    pub night: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyForecast {
    /// Calendar date in the forecast location's time zone.
    pub date: NaiveDate,
    /// Local midnight that starts `date`.
    pub dt: DateTime<Utc>,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub temp: DailyTemperature,
    pub pressure: Option<f64>,
    pub humidity: f64,
    pub dew_point: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
    pub wind_deg: f64,
    pub clouds: Option<f64>,
    pub pop: Option<f64>,
    pub rain: Option<f64>,
    pub snow: Option<f64>,
    pub uvi: f64,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub sender_name: String,
    pub event: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub description: String,
    pub tags: Vec<String>,
}

/// The pipeline's output, shaped like a commercial one-call forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedForecast {
    pub lat: f64,
    pub lon: f64,
    pub timezone: String,
    pub timezone_offset: i32,
    pub units: Units,
    pub current: PointForecast,
    pub hourly: Vec<PointForecast>,
    pub daily: Vec<DailyForecast>,
    pub alerts: Vec<Alert>,
}

impl NormalizedForecast {
    /// Converts a forecast computed in canonical metric units (°C, m/s).
    pub fn into_units(mut self, units: Units) -> Self {
        self.units = units;
        convert_point(&mut self.current, units);
        for hour in &mut self.hourly {
            convert_point(hour, units);
        }
        for day in &mut self.daily {
            let t = &mut day.temp;
            for value in [&mut t.min, &mut t.max, &mut t.day, &mut t.night] {
                *value = value.map(|v| units.temperature(v));
            }
            day.dew_point = day.dew_point.map(|v| units.temperature(v));
            day.wind_speed = day.wind_speed.map(|v| units.speed(v));
            day.wind_gust = day.wind_gust.map(|v| units.speed(v));
        }
        self
    }
}

fn convert_point(point: &mut PointForecast, units: Units) {
    for value in [&mut point.temp, &mut point.feels_like, &mut point.dew_point] {
        *value = value.map(|v| units.temperature(v));
    }
    for value in [&mut point.wind_speed, &mut point.wind_gust] {
        *value = value.map(|v| units.speed(v));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_key_rounds_to_two_decimals() {
        let c = Coordinate::new(40.004_9, -75.001);
        assert_eq!(c.location_key(), "40.00,-75.00");
        assert_eq!(c.cache_key(), "40.0049,-75.001");
    }

    #[test]
    fn validate_rejects_missing_coordinates() {
        let req = ForecastRequest { longitude: Some(-75.0), ..Default::default() };
        let err = req.validate().unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(err.to_string().contains("latitude"));

        let req = ForecastRequest { latitude: Some(40.0), ..Default::default() };
        assert!(matches!(req.validate(), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let req = ForecastRequest::new(Coordinate::new(91.0, 0.0));
        assert!(matches!(req.validate(), Err(PipelineError::Validation(_))));

        let req = ForecastRequest::new(Coordinate::new(f64::NAN, 0.0));
        assert!(matches!(req.validate(), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn validate_treats_blank_zipcode_as_absent() {
        let req = ForecastRequest::new(Coordinate::new(40.0, -75.0)).with_zipcode("  ");
        let (_, zip) = req.validate().expect("valid request");
        assert_eq!(zip, None);

        let req = ForecastRequest::new(Coordinate::new(40.0, -75.0)).with_zipcode("19103");
        let (coord, zip) = req.validate().expect("valid request");
        assert_eq!(zip, Some("19103"));
        assert_eq!(coord, Coordinate::new(40.0, -75.0));
    }

    #[test]
    fn units_try_from_str() {
        assert_eq!(Units::try_from("METRIC").unwrap(), Units::Metric);
        let err = Units::try_from("kelvin").unwrap_err();
        assert!(err.to_string().contains("Unknown units"));
    }

    #[test]
    fn imperial_conversion() {
        assert!((Units::Imperial.temperature(100.0) - 212.0).abs() < 1e-9);
        assert!((Units::Imperial.speed(10.0) - 22.369_36).abs() < 1e-6);
        assert_eq!(Units::Metric.temperature(3.5), 3.5);
    }
}
