//! Builds the current, hourly and daily forecast arrays from one poll's
//! inputs. Everything here is in canonical metric units.

use chrono::{DateTime, Days, DurationRound, NaiveDate, NaiveTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::{
    classify::{classify_codes, classify_sky_cover, classify_text, resolve_daytime},
    fetch::PipelineInputs,
    model::{Condition, DailyForecast, DailyTemperature, PointForecast},
    sources::{ForecastPeriod, GridData, SunTimes},
    timeseries::TimeSeries,
};

pub const HOURLY_COUNT: usize = 48;
pub const DAILY_COUNT: usize = 7;
const DEFAULT_HUMIDITY: f64 = 50.0;

pub struct Aggregator<'a> {
    inputs: &'a PipelineInputs,
    tz: Tz,
    now: DateTime<Utc>,
}

impl<'a> Aggregator<'a> {
    pub fn new(inputs: &'a PipelineInputs, now: DateTime<Utc>) -> Self {
        Self { inputs, tz: inputs.time_zone, now }
    }

    fn grid(&self) -> &GridData {
        &self.inputs.grid
    }

    fn today(&self) -> NaiveDate {
        self.now.with_timezone(&self.tz).date_naive()
    }

    /// UTC instant of local midnight starting `date`, stepping past a DST gap.
    pub fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let naive = date.and_time(NaiveTime::MIN);
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| self.tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc())
    }

    fn day_offset(&self, instant: DateTime<Utc>) -> i64 {
        (instant.with_timezone(&self.tz).date_naive() - self.today()).num_days()
    }

    fn sun_for_offset(&self, days: i64) -> Option<SunTimes> {
        self.inputs.sun.map(|sun| sun.shifted_days(days))
    }

    /// Hourly text period covering `instant`, else the 7-period one.
    fn period_at(&self, instant: DateTime<Utc>) -> Option<&ForecastPeriod> {
        [self.inputs.hourly.as_deref(), self.inputs.forecast.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|periods| periods.iter().find(|p| p.contains(instant)))
    }

    fn structured_condition(&self, instant: DateTime<Utc>, is_daytime: bool) -> Condition {
        self.grid()
            .weather
            .value_at(instant)
            .and_then(|codes| classify_codes(codes, is_daytime))
            .or_else(|| {
                self.grid()
                    .sky_cover
                    .number_at(instant)
                    .map(|cover| classify_sky_cover(cover, is_daytime))
            })
            .unwrap_or_else(|| classify_text("", is_daytime))
    }

    /// Text classification when a period covers `instant`, structured codes
    /// otherwise.
    pub fn condition_at(&self, instant: DateTime<Utc>) -> Condition {
        let period = self.period_at(instant);
        let sun = self.inputs.sun;
        let is_daytime =
            resolve_daytime(instant, period.map(|p| p.is_daytime), sun.as_ref(), self.tz);

        match period.filter(|p| !p.short_text.trim().is_empty()) {
            Some(p) => classify_text(&p.short_text, is_daytime),
            None => self.structured_condition(instant, is_daytime),
        }
    }

    /// UV for the local hour of `instant`; today only.
    fn uv_for_hour(&self, instant: DateTime<Utc>) -> Option<f64> {
        if self.day_offset(instant) != 0 {
            return None;
        }
        let hour = instant.with_timezone(&self.tz).hour();
        self.inputs
            .uv
            .as_deref()?
            .iter()
            .find(|entry| entry.hour() == hour)
            .map(|entry| entry.value)
    }

    fn uv_day_max(&self) -> Option<f64> {
        self.inputs
            .uv
            .as_deref()?
            .iter()
            .map(|entry| entry.value)
            .reduce(f64::max)
    }

    fn point(&self, instant: DateTime<Utc>, uvi: f64) -> PointForecast {
        let g = self.grid();
        let sun = self.sun_for_offset(self.day_offset(instant));

        PointForecast {
            dt: instant,
            sunrise: sun.map(|s| s.sunrise),
            sunset: sun.map(|s| s.sunset),
            temp: g.temperature.number_at(instant),
            feels_like: g.apparent_temperature.number_at(instant),
            pressure: g.pressure.number_at(instant),
            humidity: g.relative_humidity.number_at(instant),
            dew_point: g.dewpoint.number_at(instant),
            uvi,
            clouds: g.sky_cover.number_at(instant),
            wind_speed: g.wind_speed.number_at(instant),
            wind_gust: g.wind_gust.number_at(instant),
            wind_deg: g.wind_direction.number_at(instant),
            pop: g.probability_of_precipitation.number_at(instant).map(|p| p / 100.0),
            rain: g.quantitative_precipitation.hourly_rate_at(instant),
            snow: g.snowfall_amount.hourly_rate_at(instant),
            condition: self.condition_at(instant),
        }
    }

    pub fn build_current(&self) -> PointForecast {
        let uvi = self
            .uv_for_hour(self.now)
            .or_else(|| self.uv_day_max())
            .unwrap_or(0.0);
        self.point(self.now, uvi)
    }

    /// One entry per hour, starting with the hour containing now.
    pub fn build_hourly(&self, count: usize) -> Vec<PointForecast> {
        let first = self.now.duration_trunc(TimeDelta::hours(1)).unwrap_or(self.now);
        (0..count as i64)
            .map(|h| {
                let instant = first + TimeDelta::hours(h);
                let uvi = self.uv_for_hour(instant).unwrap_or(0.0);
                self.point(instant, uvi)
            })
            .collect()
    }

    /// One entry per local calendar day, starting today.
    pub fn build_daily(&self, count: usize) -> Vec<DailyForecast> {
        let periods = self.inputs.forecast.as_deref().unwrap_or(&[]);
        let mut cursor = 0;
        let today = self.today();

        (0..count as u64)
            .map(|i| {
                let date = today + Days::new(i);
                let (day, night) = next_day_pair(periods, &mut cursor);
                self.day(i as i64, date, day, night)
            })
            .collect()
    }

    fn day(
        &self,
        offset: i64,
        date: NaiveDate,
        day_period: Option<&ForecastPeriod>,
        night_period: Option<&ForecastPeriod>,
    ) -> DailyForecast {
        let g = self.grid();
        let start = self.local_midnight(date);
        let end = self.local_midnight(date + Days::new(1));
        let future_only = offset == 0;
        let over = |series: &TimeSeries<f64>| -> Vec<f64> {
            series
                .values_overlapping_day(start, end, future_only, self.now)
                .into_iter()
                .copied()
                .collect()
        };

        let max_temp = day_period
            .and_then(|p| p.temperature)
            .or_else(|| max(over(&g.max_temperature)));
        let min_temp = night_period
            .and_then(|p| p.temperature)
            .or_else(|| min(over(&g.min_temperature)));

        let headline = day_period.or(night_period);
        let condition = match headline.filter(|p| !p.short_text.trim().is_empty()) {
            Some(p) => classify_text(&p.short_text, p.is_daytime),
            None => {
                let noon = start + TimeDelta::hours(12);
                let at = if offset == 0 { noon.max(self.now) } else { noon };
                self.structured_condition(at, true)
            }
        };
        let sun = self.sun_for_offset(offset);
        let uvi = if offset == 0 { self.uv_day_max().unwrap_or(0.0) } else { 0.0 };

        DailyForecast {
            date,
            dt: start,
            sunrise: sun.map(|s| s.sunrise),
            sunset: sun.map(|s| s.sunset),
            summary: headline.and_then(|p| p.detailed_text.clone()),
            temp: DailyTemperature {
                min: min_temp,
                max: max_temp,
                day: day_period.and_then(|p| p.temperature),
                night: night_period.and_then(|p| p.temperature),
            },
            pressure: mean(over(&g.pressure)),
            humidity: mean(over(&g.relative_humidity)).unwrap_or(DEFAULT_HUMIDITY),
            dew_point: mean(over(&g.dewpoint)),
            wind_speed: max(over(&g.wind_speed)),
            wind_gust: max(over(&g.wind_gust)),
            wind_deg: over(&g.wind_direction).first().copied().unwrap_or(0.0),
            clouds: mean(over(&g.sky_cover)),
            pop: max(over(&g.probability_of_precipitation)).map(|p| p / 100.0),
            rain: sum(over(&g.quantitative_precipitation)),
            snow: sum(over(&g.snowfall_amount)),
            uvi,
            condition,
        }
    }
}

/// Takes the next day's periods in document order: a daytime period
/// followed by a night period, or a lone night period when the sequence is
/// on a night (e.g. the document starts with "Tonight").
fn next_day_pair<'p>(
    periods: &'p [ForecastPeriod],
    cursor: &mut usize,
) -> (Option<&'p ForecastPeriod>, Option<&'p ForecastPeriod>) {
    let Some(first) = periods.get(*cursor) else {
        return (None, None);
    };
    *cursor += 1;

    if !first.is_daytime {
        return (None, Some(first));
    }
    match periods.get(*cursor) {
        Some(next) if !next.is_daytime => {
            *cursor += 1;
            (Some(first), Some(next))
        }
        _ => (Some(first), None),
    }
}

fn max(values: Vec<f64>) -> Option<f64> {
    values.into_iter().reduce(f64::max)
}

fn min(values: Vec<f64>) -> Option<f64> {
    values.into_iter().reduce(f64::min)
}

fn sum(values: Vec<f64>) -> Option<f64> {
    values.into_iter().reduce(|a, b| a + b)
}

fn mean(values: Vec<f64>) -> Option<f64> {
    let count = values.len();
    sum(values).map(|total| total / count as f64)
}
