//! Upstream documents and the fetch for each source.
//!
//! Wire shapes stay private to this module; every fetch returns decoded
//! domain values in canonical units.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    client::SourceClient,
    error::SourceError,
    model::{Alert, Coordinate},
    timeseries::{RawSeries, TimeSeries},
};

/// Number of hourly text periods kept from the hourly forecast.
pub const HOURLY_PERIODS: usize = 48;

/// Opaque forecast tile: issuing office plus grid coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridAddress {
    pub office_id: String,
    pub grid_x: u32,
    pub grid_y: u32,
}

impl GridAddress {
    fn path(&self) -> String {
        format!("/gridpoints/{}/{},{}", self.office_id, self.grid_x, self.grid_y)
    }
}

/// Result of point resolution: the grid address plus the point's zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridPoint {
    pub address: GridAddress,
    pub time_zone: Option<String>,
}

/// Structured phenomenon code from the grid `weather` series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WeatherCode {
    pub coverage: Option<String>,
    pub weather: Option<String>,
    pub intensity: Option<String>,
}

/// Decoded grid-properties document.
#[derive(Debug, Clone, Default)]
pub struct GridData {
    pub time_zone: Option<String>,
    pub temperature: TimeSeries<f64>,
    pub dewpoint: TimeSeries<f64>,
    pub max_temperature: TimeSeries<f64>,
    pub min_temperature: TimeSeries<f64>,
    pub relative_humidity: TimeSeries<f64>,
    pub apparent_temperature: TimeSeries<f64>,
    pub sky_cover: TimeSeries<f64>,
    pub wind_direction: TimeSeries<f64>,
    pub wind_speed: TimeSeries<f64>,
    pub wind_gust: TimeSeries<f64>,
    pub probability_of_precipitation: TimeSeries<f64>,
    pub quantitative_precipitation: TimeSeries<f64>,
    pub snowfall_amount: TimeSeries<f64>,
    pub pressure: TimeSeries<f64>,
    pub weather: TimeSeries<Vec<WeatherCode>>,
}

/// A named day or night block from a text forecast, temperature in °C.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPeriod {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_daytime: bool,
    pub short_text: String,
    pub detailed_text: Option<String>,
    pub temperature: Option<f64>,
}

impl ForecastPeriod {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunTimes {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

impl SunTimes {
    pub fn shifted_days(&self, days: i64) -> Self {
        let offset = chrono::Duration::days(days);
        Self { sunrise: self.sunrise + offset, sunset: self.sunset + offset }
    }
}

/// One hourly UV forecast row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UvEntry {
    #[serde(rename = "ORDER", default)]
    pub order: u32,
    #[serde(rename = "DATE_TIME", default)]
    pub date_time: String,
    #[serde(rename = "UV_VALUE", default)]
    pub value: f64,
}

impl UvEntry {
    /// Local hour (0-23) of this row, read from the trailing `hh AM|PM` of
    /// `DATE_TIME`. Rows are ordered from 04 AM, so `ORDER` is the fallback.
    pub fn hour(&self) -> u32 {
        parse_uv_hour(&self.date_time).unwrap_or((self.order + 3) % 24)
    }
}

fn parse_uv_hour(date_time: &str) -> Option<u32> {
    let mut parts = date_time.split_whitespace().rev();
    let meridiem = parts.next()?.to_ascii_uppercase();
    let hour: u32 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    match meridiem.as_str() {
        "AM" => Some(hour % 12),
        "PM" => Some(hour % 12 + 12),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct PointDocument {
    properties: PointProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointProperties {
    grid_id: Option<String>,
    grid_x: Option<u32>,
    grid_y: Option<u32>,
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GridpointDocument {
    properties: RawGridProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawGridProperties {
    time_zone: Option<String>,
    temperature: Option<RawSeries<Option<f64>>>,
    dewpoint: Option<RawSeries<Option<f64>>>,
    max_temperature: Option<RawSeries<Option<f64>>>,
    min_temperature: Option<RawSeries<Option<f64>>>,
    relative_humidity: Option<RawSeries<Option<f64>>>,
    apparent_temperature: Option<RawSeries<Option<f64>>>,
    sky_cover: Option<RawSeries<Option<f64>>>,
    wind_direction: Option<RawSeries<Option<f64>>>,
    wind_speed: Option<RawSeries<Option<f64>>>,
    wind_gust: Option<RawSeries<Option<f64>>>,
    probability_of_precipitation: Option<RawSeries<Option<f64>>>,
    quantitative_precipitation: Option<RawSeries<Option<f64>>>,
    snowfall_amount: Option<RawSeries<Option<f64>>>,
    pressure: Option<RawSeries<Option<f64>>>,
    weather: Option<RawSeries<Vec<WeatherCode>>>,
}

fn numeric(raw: &Option<RawSeries<Option<f64>>>) -> TimeSeries<f64> {
    raw.as_ref().map(TimeSeries::from_raw).unwrap_or_default()
}

impl From<RawGridProperties> for GridData {
    fn from(raw: RawGridProperties) -> Self {
        let weather = raw
            .weather
            .as_ref()
            .map(|series| {
                TimeSeries::from_raw_with(series, |codes: &Vec<WeatherCode>| {
                    Some(codes.iter().filter(|c| c.weather.is_some()).cloned().collect())
                })
            })
            .unwrap_or_default();

        Self {
            time_zone: raw.time_zone.clone(),
            temperature: numeric(&raw.temperature),
            dewpoint: numeric(&raw.dewpoint),
            max_temperature: numeric(&raw.max_temperature),
            min_temperature: numeric(&raw.min_temperature),
            relative_humidity: numeric(&raw.relative_humidity),
            apparent_temperature: numeric(&raw.apparent_temperature),
            sky_cover: numeric(&raw.sky_cover),
            wind_direction: numeric(&raw.wind_direction),
            wind_speed: numeric(&raw.wind_speed),
            wind_gust: numeric(&raw.wind_gust),
            probability_of_precipitation: numeric(&raw.probability_of_precipitation),
            quantitative_precipitation: numeric(&raw.quantitative_precipitation),
            snowfall_amount: numeric(&raw.snowfall_amount),
            pressure: numeric(&raw.pressure),
            weather,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ForecastDocument {
    properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
struct ForecastProperties {
    #[serde(default)]
    periods: Vec<RawPeriod>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPeriod {
    #[serde(default)]
    name: String,
    start_time: String,
    end_time: String,
    is_daytime: bool,
    temperature: Option<f64>,
    temperature_unit: Option<String>,
    #[serde(default)]
    short_forecast: String,
    detailed_forecast: Option<String>,
}

impl RawPeriod {
    fn decode(self) -> Option<ForecastPeriod> {
        let start = DateTime::parse_from_rfc3339(&self.start_time).ok()?.with_timezone(&Utc);
        let end = DateTime::parse_from_rfc3339(&self.end_time).ok()?.with_timezone(&Utc);
        let fahrenheit = self.temperature_unit.as_deref().is_none_or(|u| u.eq_ignore_ascii_case("F"));
        let temperature = self
            .temperature
            .map(|t| if fahrenheit { (t - 32.0) * 5.0 / 9.0 } else { t });

        Some(ForecastPeriod {
            name: self.name,
            start,
            end,
            is_daytime: self.is_daytime,
            short_text: self.short_forecast,
            detailed_text: self.detailed_forecast.filter(|d| !d.is_empty()),
            temperature,
        })
    }
}

fn decode_periods(raw: Vec<RawPeriod>) -> Vec<ForecastPeriod> {
    let total = raw.len();
    let periods: Vec<_> = raw.into_iter().filter_map(RawPeriod::decode).collect();
    if periods.len() < total {
        debug!("Dropped {} forecast periods with unparseable times", total - periods.len());
    }
    periods
}

#[derive(Debug, Deserialize)]
struct SunDocument {
    results: Option<SunResults>,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct SunResults {
    sunrise: String,
    sunset: String,
}

#[derive(Debug, Deserialize)]
struct AlertDocument {
    #[serde(default)]
    features: Vec<AlertFeature>,
}

#[derive(Debug, Deserialize)]
struct AlertFeature {
    properties: AlertProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertProperties {
    #[serde(default)]
    event: String,
    #[serde(default)]
    sender_name: String,
    #[serde(default)]
    description: String,
    severity: Option<String>,
    onset: Option<DateTime<Utc>>,
    ends: Option<DateTime<Utc>>,
    expires: Option<DateTime<Utc>>,
}

impl From<AlertProperties> for Alert {
    fn from(p: AlertProperties) -> Self {
        Self {
            sender_name: p.sender_name,
            event: p.event,
            start: p.onset,
            end: p.ends.or(p.expires),
            description: p.description,
            tags: p.severity.into_iter().collect(),
        }
    }
}

impl SourceClient {
    /// Translates a coordinate into its grid address.
    #[instrument(skip(self))]
    pub async fn fetch_point(&self, coordinate: Coordinate) -> Result<GridPoint, SourceError> {
        const SOURCE: &str = "points";
        let doc: PointDocument = self
            .get_weather_gov(SOURCE, &format!("/points/{coordinate}"), &[])
            .await?;

        let p = doc.properties;
        let missing = |field| SourceError::Missing { source_name: SOURCE, field };
        let address = GridAddress {
            office_id: p.grid_id.filter(|id| !id.is_empty()).ok_or_else(|| missing("gridId"))?,
            grid_x: p.grid_x.ok_or_else(|| missing("gridX"))?,
            grid_y: p.grid_y.ok_or_else(|| missing("gridY"))?,
        };

        Ok(GridPoint { address, time_zone: p.time_zone })
    }

    /// Raw time-series document for a grid tile.
    #[instrument(skip(self))]
    pub async fn fetch_grid_data(&self, address: &GridAddress) -> Result<GridData, SourceError> {
        let doc: GridpointDocument =
            self.get_weather_gov("gridpoints", &address.path(), &[]).await?;
        Ok(doc.properties.into())
    }

    /// Alternating day/night text periods.
    #[instrument(skip(self))]
    pub async fn fetch_forecast(
        &self,
        address: &GridAddress,
    ) -> Result<Vec<ForecastPeriod>, SourceError> {
        let path = format!("{}/forecast", address.path());
        let doc: ForecastDocument = self.get_weather_gov("forecast", &path, &[]).await?;
        Ok(decode_periods(doc.properties.periods))
    }

    /// One-hour text periods, truncated to [`HOURLY_PERIODS`].
    #[instrument(skip(self))]
    pub async fn fetch_hourly_forecast(
        &self,
        address: &GridAddress,
    ) -> Result<Vec<ForecastPeriod>, SourceError> {
        let path = format!("{}/forecast/hourly", address.path());
        let mut doc: ForecastDocument =
            self.get_weather_gov("hourly forecast", &path, &[]).await?;
        doc.properties.periods.truncate(HOURLY_PERIODS);
        Ok(decode_periods(doc.properties.periods))
    }

    #[instrument(skip(self))]
    pub async fn fetch_sun_times(
        &self,
        coordinate: Coordinate,
        date: NaiveDate,
    ) -> Result<SunTimes, SourceError> {
        const SOURCE: &str = "sunrise/sunset";
        let url = format!("{}/json", self.endpoints().sunrise_sunset);
        let query = [
            ("lat", coordinate.latitude.to_string()),
            ("lng", coordinate.longitude.to_string()),
            ("date", date.format("%Y-%m-%d").to_string()),
            ("formatted", "0".to_string()),
        ];
        let doc: SunDocument = self.get_public(SOURCE, url, &query).await?;

        let missing = |field| SourceError::Missing { source_name: SOURCE, field };
        if !doc.status.eq_ignore_ascii_case("OK") {
            return Err(missing("OK status"));
        }
        let results = doc.results.ok_or_else(|| missing("results"))?;
        let parse = |raw: &str, field| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| missing(field))
        };

        Ok(SunTimes {
            sunrise: parse(&results.sunrise, "sunrise")?,
            sunset: parse(&results.sunset, "sunset")?,
        })
    }

    /// Hourly UV index for the current day, keyed by ZIP code.
    #[instrument(skip(self))]
    pub async fn fetch_uv(&self, zipcode: &str) -> Result<Vec<UvEntry>, SourceError> {
        let url = format!("{}/getEnvirofactsUVHOURLY/ZIP/{zipcode}/JSON", self.endpoints().uv);
        self.get_public("uv index", url, &[]).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_alerts(&self, coordinate: Coordinate) -> Result<Vec<Alert>, SourceError> {
        let query = [("point", coordinate.to_string())];
        let doc: AlertDocument = self.get_weather_gov("alerts", "/alerts/active", &query).await?;
        Ok(doc.features.into_iter().map(|f| f.properties.into()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn uv(order: u32, date_time: &str) -> UvEntry {
        UvEntry { order, date_time: date_time.into(), value: 1.0 }
    }

    #[test]
    fn uv_hour_from_text() {
        assert_eq!(uv(1, "DEC/20/2025 03 AM").hour(), 3);
        assert_eq!(uv(1, "DEC/20/2025 11 PM").hour(), 23);
        assert_eq!(uv(1, "DEC/20/2025 12 AM").hour(), 0);
        assert_eq!(uv(1, "DEC/20/2025 12 PM").hour(), 12);
    }

    #[test]
    fn uv_hour_falls_back_to_order() {
        assert_eq!(uv(1, "").hour(), 4);
        assert_eq!(uv(9, "DEC/20/2025 noon").hour(), 12);
        assert_eq!(uv(21, "garbage").hour(), 0);
    }

    #[test]
    fn uv_rows_deserialize() {
        let rows: Vec<UvEntry> = serde_json::from_value(json!([
            {"ORDER": 1, "ZIP": 19103, "DATE_TIME": "DEC/20/2025 04 AM", "UV_VALUE": 0},
            {"ORDER": 9, "ZIP": 19103, "DATE_TIME": "DEC/20/2025 12 PM", "UV_VALUE": 2}
        ]))
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].hour(), 12);
        assert_eq!(rows[1].value, 2.0);
    }

    #[test]
    fn periods_convert_fahrenheit() {
        let doc: ForecastDocument = serde_json::from_value(json!({
            "properties": {"periods": [
                {
                    "name": "Tonight",
                    "startTime": "2025-12-20T18:00:00-05:00",
                    "endTime": "2025-12-21T06:00:00-05:00",
                    "isDaytime": false,
                    "temperature": 50,
                    "temperatureUnit": "F",
                    "shortForecast": "Mostly Cloudy",
                    "detailedForecast": ""
                },
                {
                    "name": "Broken",
                    "startTime": "not a time",
                    "endTime": "2025-12-21T06:00:00-05:00",
                    "isDaytime": true,
                    "temperature": 50
                }
            ]}
        }))
        .unwrap();

        let periods = decode_periods(doc.properties.periods);
        assert_eq!(periods.len(), 1);
        let p = &periods[0];
        assert_eq!(p.start, Utc.with_ymd_and_hms(2025, 12, 20, 23, 0, 0).unwrap());
        assert!((p.temperature.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(p.detailed_text, None);
        assert!(!p.is_daytime);
    }

    #[test]
    fn grid_document_decodes_weather_codes() {
        let doc: GridpointDocument = serde_json::from_value(json!({
            "properties": {
                "timeZone": "America/Chicago",
                "temperature": {
                    "uom": "wmoUnit:degC",
                    "values": [{"validTime": "2025-12-20T12:00:00+00:00/PT2H", "value": 4.5}]
                },
                "weather": {
                    "values": [
                        {"validTime": "2025-12-20T12:00:00+00:00/PT3H", "value": [
                            {"coverage": null, "weather": null, "intensity": null}
                        ]},
                        {"validTime": "2025-12-20T15:00:00+00:00/PT3H", "value": [
                            {"coverage": "chance", "weather": "rain_showers", "intensity": "light"}
                        ]}
                    ]
                }
            }
        }))
        .unwrap();

        let grid: GridData = doc.properties.into();
        assert_eq!(grid.time_zone.as_deref(), Some("America/Chicago"));
        let noon = Utc.with_ymd_and_hms(2025, 12, 20, 12, 0, 0).unwrap();
        assert_eq!(grid.temperature.number_at(noon), Some(4.5));
        assert!(grid.weather.value_at(noon).unwrap().is_empty());
        let later = grid.weather.value_at(noon + chrono::Duration::hours(4)).unwrap();
        assert_eq!(later[0].weather.as_deref(), Some("rain_showers"));
        assert!(grid.wind_speed.is_empty());
    }

    #[test]
    fn alert_end_falls_back_to_expires() {
        let doc: AlertDocument = serde_json::from_value(json!({
            "features": [{"properties": {
                "event": "Wind Advisory",
                "senderName": "NWS Philadelphia",
                "description": "Gusts to 50 mph.",
                "severity": "Moderate",
                "onset": "2025-12-20T15:00:00-05:00",
                "ends": null,
                "expires": "2025-12-21T03:00:00-05:00"
            }}]
        }))
        .unwrap();

        let alerts: Vec<Alert> = doc.features.into_iter().map(|f| f.properties.into()).collect();
        assert_eq!(alerts[0].event, "Wind Advisory");
        assert_eq!(alerts[0].end, Some(Utc.with_ymd_and_hms(2025, 12, 21, 8, 0, 0).unwrap()));
        assert_eq!(alerts[0].tags, vec!["Moderate".to_string()]);
    }
}
