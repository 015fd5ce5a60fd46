//! Decoding of grid time series.
//!
//! Grid documents describe each quantity as a list of `validTime`/`value`
//! records, where `validTime` is `"<ISO 8601 instant>/<ISO 8601 duration>"`.
//! Values are normalized to canonical units here (°C, m/s, mm, hPa, %) so
//! nothing downstream needs to look at `uom` again.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RawPoint<T> {
    #[serde(rename = "validTime")]
    pub valid_time: String,
    pub value: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSeries<T> {
    #[serde(default)]
    pub uom: Option<String>,
    #[serde(default = "Vec::new")]
    pub values: Vec<RawPoint<T>>,
}

/// A value valid over `[start, start + duration)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesPoint<T> {
    pub start: DateTime<Utc>,
    pub duration: Duration,
    pub value: T,
}

impl<T> TimeSeriesPoint<T> {
    /// Saturates at the latest representable instant.
    pub fn end(&self) -> DateTime<Utc> {
        self.start
            .checked_add_signed(self.duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration.num_milliseconds()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end()
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end() > start
    }
}

/// Points ascending by start time.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries<T> {
    points: Vec<TimeSeriesPoint<T>>,
}

impl<T> Default for TimeSeries<T> {
    fn default() -> Self {
        Self { points: Vec::new() }
    }
}

impl<T> TimeSeries<T> {
    pub fn new(mut points: Vec<TimeSeriesPoint<T>>) -> Self {
        points.sort_by_key(|p| p.start);
        Self { points }
    }

    pub fn points(&self) -> &[TimeSeriesPoint<T>] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point_at(&self, instant: DateTime<Utc>) -> Option<&TimeSeriesPoint<T>> {
        self.points
            .iter()
            .find(|p| p.contains(instant))
            .or_else(|| self.points.first())
    }

    /// The value whose interval contains `instant`, falling back to the first
    /// point when none does. `None` only for an empty series.
    pub fn value_at(&self, instant: DateTime<Utc>) -> Option<&T> {
        self.point_at(instant).map(|p| &p.value)
    }

    /// Values whose interval overlaps `[day_start, day_end)`. With
    /// `future_only`, points that ended at or before `now` are skipped.
    pub fn values_overlapping_day(
        &self,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
        future_only: bool,
        now: DateTime<Utc>,
    ) -> Vec<&T> {
        self.points
            .iter()
            .filter(|p| p.overlaps(day_start, day_end))
            .filter(|p| !future_only || p.end() > now)
            .map(|p| &p.value)
            .collect()
    }
}

impl TimeSeries<f64> {
    /// Decodes a numeric series, dropping null values and unparseable
    /// intervals and converting to canonical units.
    pub fn from_raw(raw: &RawSeries<Option<f64>>) -> Self {
        let convert = unit_converter(raw.uom.as_deref());
        let points = raw
            .values
            .iter()
            .filter_map(|p| {
                let value = p.value.filter(|v| v.is_finite())?;
                let (start, duration) = decode_interval(&p.valid_time)?;
                Some(TimeSeriesPoint { start, duration, value: convert(value) })
            })
            .collect();
        Self::new(points)
    }

    pub fn number_at(&self, instant: DateTime<Utc>) -> Option<f64> {
        self.value_at(instant).copied()
    }

    /// Amount per hour at `instant`, spreading a multi-hour total evenly.
    pub fn hourly_rate_at(&self, instant: DateTime<Utc>) -> Option<f64> {
        let point = self.point_at(instant)?;
        let hours = point.duration_ms() as f64 / 3_600_000.0;
        if hours <= 0.0 {
            return Some(point.value);
        }
        Some(point.value / hours)
    }
}

impl<T> TimeSeries<T> {
    pub fn from_raw_with<R>(raw: &RawSeries<R>, decode: impl Fn(&R) -> Option<T>) -> Self {
        let points = raw
            .values
            .iter()
            .filter_map(|p| {
                let (start, duration) = decode_interval(&p.valid_time)?;
                Some(TimeSeriesPoint { start, duration, value: decode(&p.value)? })
            })
            .collect();
        Self::new(points)
    }
}

/// Splits `"<instant>/<duration>"`. An unparseable instant yields `None`;
/// a missing or unrecognized duration defaults to one hour.
pub fn decode_interval(raw: &str) -> Option<(DateTime<Utc>, Duration)> {
    let (instant, duration) = match raw.split_once('/') {
        Some((instant, duration)) => (instant, Some(duration)),
        None => (raw, None),
    };

    let start = DateTime::parse_from_rfc3339(instant.trim()).ok()?.with_timezone(&Utc);
    let duration = duration
        .and_then(parse_duration)
        .unwrap_or_else(|| Duration::hours(1));

    Some((start, duration))
}

/// Parses `P`/`PT` durations made of `D`, `H` and `M` components, e.g.
/// `PT3H`, `PT30M`, `P1D`, `P1DT6H`. `M` is always minutes. Out-of-range
/// amounts yield `None`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let upper = raw.trim().to_ascii_uppercase();
    let body = upper.strip_prefix('P').unwrap_or(&upper);

    let mut total = Duration::zero();
    let mut digits = String::new();
    let mut components = 0;

    for c in body.chars() {
        match c {
            'T' if digits.is_empty() => {}
            '0'..='9' => digits.push(c),
            'D' | 'H' | 'M' if !digits.is_empty() => {
                let n: i64 = digits.parse().ok()?;
                let component = match c {
                    'D' => Duration::try_days(n),
                    'H' => Duration::try_hours(n),
                    _ => Duration::try_minutes(n),
                }?;
                total = total.checked_add(&component)?;
                digits.clear();
                components += 1;
            }
            _ => return None,
        }
    }

    if components == 0 || !digits.is_empty() || total <= Duration::zero() {
        return None;
    }
    Some(total)
}

fn unit_converter(uom: Option<&str>) -> fn(f64) -> f64 {
    let unit = uom.map(|u| u.rsplit(':').next().unwrap_or(u));
    match unit {
        Some("degF") => |v| (v - 32.0) * 5.0 / 9.0,
        Some("K") => |v| v - 273.15,
        Some("km_h-1") => |v| v / 3.6,
        Some("kt") => |v| v * 0.514_444,
        Some("Pa") => |v| v / 100.0,
        Some("cm") => |v| v * 10.0,
        Some("m") => |v| v * 1000.0,
        Some("in") => |v| v * 25.4,
        _ => |v| v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 17, h, m, 0).unwrap()
    }

    fn series(points: &[(&str, f64)]) -> TimeSeries<f64> {
        let raw = RawSeries {
            uom: None,
            values: points
                .iter()
                .map(|(t, v)| RawPoint { valid_time: t.to_string(), value: Some(*v) })
                .collect(),
        };
        TimeSeries::from_raw(&raw)
    }

    #[test]
    fn decode_interval_hours() {
        let (start, d) = decode_interval("2024-12-17T18:00:00+00:00/PT3H").unwrap();
        assert_eq!(start, at(18, 0));
        assert_eq!(d.num_milliseconds(), 3 * 3_600_000);
    }

    #[test]
    fn decode_interval_minutes() {
        let (_, d) = decode_interval("2024-12-17T18:00:00+00:00/PT30M").unwrap();
        assert_eq!(d, Duration::minutes(30));
    }

    #[test]
    fn decode_interval_days_and_mixed() {
        let (_, d) = decode_interval("2024-12-17T18:00:00+00:00/P1D").unwrap();
        assert_eq!(d, Duration::days(1));
        let (_, d) = decode_interval("2024-12-17T18:00:00+00:00/P1DT6H").unwrap();
        assert_eq!(d, Duration::hours(30));
        let (_, d) = decode_interval("2024-12-17T18:00:00+00:00/pt2h").unwrap();
        assert_eq!(d, Duration::hours(2));
    }

    #[test]
    fn decode_interval_defaults_to_one_hour() {
        for raw in [
            "2024-12-17T18:00:00+00:00",
            "2024-12-17T18:00:00+00:00/",
            "2024-12-17T18:00:00+00:00/PTXH",
            "2024-12-17T18:00:00+00:00/P3W",
            "2024-12-17T18:00:00+00:00/PT",
        ] {
            let (start, d) = decode_interval(raw).unwrap();
            assert_eq!(start, at(18, 0), "{raw}");
            assert_eq!(d.num_milliseconds(), 3_600_000, "{raw}");
        }
    }

    #[test]
    fn overflowing_duration_defaults_to_one_hour() {
        for raw in [
            "2024-12-17T18:00:00+00:00/PT9999999999999999H",
            "2024-12-17T18:00:00+00:00/P999999999999D",
            "2024-12-17T18:00:00+00:00/PT99999999999999999999M",
        ] {
            let (start, d) = decode_interval(raw).unwrap();
            assert_eq!(start, at(18, 0), "{raw}");
            assert_eq!(d, Duration::hours(1), "{raw}");
        }
    }

    #[test]
    fn end_saturates_instead_of_overflowing() {
        let point = TimeSeriesPoint {
            start: at(18, 0),
            duration: Duration::MAX,
            value: 1.0,
        };
        assert_eq!(point.end(), DateTime::<Utc>::MAX_UTC);
        assert!(point.contains(at(19, 0)));
    }

    #[test]
    fn decode_interval_rejects_bad_instant() {
        assert!(decode_interval("yesterday/PT1H").is_none());
    }

    #[test]
    fn value_at_finds_containing_point() {
        let s = series(&[
            ("2024-12-17T12:00:00+00:00/PT3H", 1.0),
            ("2024-12-17T15:00:00+00:00/PT3H", 2.0),
        ]);
        assert_eq!(s.number_at(at(12, 0)), Some(1.0));
        assert_eq!(s.number_at(at(14, 59)), Some(1.0));
        assert_eq!(s.number_at(at(15, 0)), Some(2.0));
    }

    #[test]
    fn value_at_falls_back_to_first_point() {
        let s = series(&[
            ("2024-12-17T12:00:00+00:00/PT1H", 7.0),
            ("2024-12-17T13:00:00+00:00/PT1H", 8.0),
        ]);
        assert_eq!(s.number_at(at(9, 0)), Some(7.0));
        assert_eq!(s.number_at(at(23, 0)), Some(7.0));
        assert_eq!(TimeSeries::<f64>::default().number_at(at(9, 0)), None);
    }

    #[test]
    fn null_values_are_dropped() {
        let raw: RawSeries<Option<f64>> = serde_json::from_value(serde_json::json!({
            "uom": "wmoUnit:percent",
            "values": [
                {"validTime": "2024-12-17T12:00:00+00:00/PT1H", "value": null},
                {"validTime": "2024-12-17T13:00:00+00:00/PT1H", "value": 40}
            ]
        }))
        .unwrap();
        let s = TimeSeries::from_raw(&raw);
        assert_eq!(s.points().len(), 1);
        assert_eq!(s.number_at(at(12, 0)), Some(40.0));
    }

    #[test]
    fn units_are_normalized() {
        let raw: RawSeries<Option<f64>> = serde_json::from_value(serde_json::json!({
            "uom": "wmoUnit:km_h-1",
            "values": [{"validTime": "2024-12-17T12:00:00+00:00/PT1H", "value": 36}]
        }))
        .unwrap();
        assert_eq!(TimeSeries::from_raw(&raw).number_at(at(12, 0)), Some(10.0));

        let raw: RawSeries<Option<f64>> = serde_json::from_value(serde_json::json!({
            "uom": "wmoUnit:degF",
            "values": [{"validTime": "2024-12-17T12:00:00+00:00/PT1H", "value": 212}]
        }))
        .unwrap();
        assert_eq!(TimeSeries::from_raw(&raw).number_at(at(12, 0)), Some(100.0));
    }

    #[test]
    fn future_only_skips_elapsed_points() {
        let s = series(&[
            ("2024-12-17T05:00:00+00:00/PT6H", 20.0),
            ("2024-12-17T11:00:00+00:00/PT6H", 14.0),
            ("2024-12-17T17:00:00+00:00/PT6H", 9.0),
        ]);
        let day_start = at(5, 0);
        let day_end = day_start + Duration::days(1);
        let now = at(12, 0);

        let remaining = s.values_overlapping_day(day_start, day_end, true, now);
        assert_eq!(remaining, vec![&14.0, &9.0]);

        let whole = s.values_overlapping_day(day_start, day_end, false, now);
        assert_eq!(whole, vec![&20.0, &14.0, &9.0]);
    }

    #[test]
    fn overlapping_day_includes_partial_overlaps() {
        let s = series(&[
            ("2024-12-16T22:00:00+00:00/PT6H", 1.0),
            ("2024-12-18T04:00:00+00:00/PT6H", 2.0),
            ("2024-12-18T05:00:00+00:00/PT6H", 3.0),
        ]);
        let start = at(0, 0);
        let end = start + Duration::days(1) + Duration::hours(5);
        let values = s.values_overlapping_day(start, end, false, start);
        assert_eq!(values, vec![&1.0, &2.0]);
    }

    #[test]
    fn hourly_rate_spreads_amounts() {
        let s = series(&[("2024-12-17T12:00:00+00:00/PT6H", 6.0)]);
        assert_eq!(s.hourly_rate_at(at(13, 0)), Some(1.0));
    }
}
