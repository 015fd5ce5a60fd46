//! Persisted per-day extremes that keep today's high/low monotonic across
//! polls while letting future days follow revised forecasts.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, io::Write, path::Path};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::{error::CacheError, model::DailyForecast};

pub const CACHE_VERSION: u32 = 1;
/// Days of history kept behind today.
pub const RETENTION_DAYS: u64 = 7;
pub const MAX_ENTRIES: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCacheEntry {
    pub max_temp: Option<f64>,
    pub min_temp: Option<f64>,
    pub max_wind: Option<f64>,
    pub max_gust: Option<f64>,
    pub max_pop: Option<f64>,
    pub total_rain: Option<f64>,
    pub total_snow: Option<f64>,
    pub max_uvi: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionCache {
    pub version: u32,
    /// Coordinate rounded to two decimals.
    pub location: String,
    #[serde(default)]
    pub days: BTreeMap<String, DailyCacheEntry>,
}

impl Default for RevisionCache {
    fn default() -> Self {
        Self { version: CACHE_VERSION, location: String::new(), days: BTreeMap::new() }
    }
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

/// Combines two readings, deferring to whichever side is present.
fn combine(cached: Option<f64>, new: Option<f64>, pick: fn(f64, f64) -> f64) -> Option<f64> {
    match (usable(cached), usable(new)) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, b) => b.or(a),
    }
}

fn freshest(cached: Option<f64>, new: Option<f64>) -> Option<f64> {
    usable(new).or(usable(cached))
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl RevisionCache {
    /// Reads the cache file. A missing, unreadable or corrupt file, or one
    /// written by another version, yields an empty cache.
    pub fn load(path: &Path) -> Self {
        match Self::read(path) {
            Ok(Some(cache)) if cache.version == CACHE_VERSION => cache,
            Ok(Some(cache)) => {
                info!(version = cache.version, "Discarding revision cache from another version");
                Self::default()
            }
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(path = %path.display(), "Revision cache unusable, starting empty: {e}");
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Option<Self>, CacheError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Writes to a temporary file beside `path`, then renames it into place.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.flush()?;
        file.persist(path).map_err(|e| CacheError::Io(e.error))?;

        debug!(path = %path.display(), days = self.days.len(), "Saved revision cache");
        Ok(())
    }

    /// Merges a fresh daily array into the cache and writes the merged
    /// values back into `daily`. Index 0 is today.
    pub fn merge(&mut self, daily: &mut [DailyForecast], location_key: &str, now: DateTime<Utc>) {
        if self.location != location_key {
            if !self.location.is_empty() {
                info!(from = %self.location, to = location_key, "Location changed, resetting revision cache");
            }
            *self = Self { location: location_key.to_string(), ..Self::default() };
        }

        for (index, day) in daily.iter_mut().enumerate() {
            let key = date_key(day.date);
            let entry = match self.days.get(&key) {
                Some(cached) if index == 0 => merge_today(cached, day, now),
                Some(cached) => merge_future(cached, day, now),
                None => entry_from(day, now),
            };
            apply(&entry, day);
            self.days.insert(key, entry);
        }
    }

    /// Drops entries older than [`RETENTION_DAYS`] before `today`, then the
    /// oldest remaining ones until at most [`MAX_ENTRIES`] are left.
    pub fn prune(&mut self, today: NaiveDate) {
        let oldest = today.checked_sub_days(Days::new(RETENTION_DAYS)).unwrap_or(today);
        let oldest = date_key(oldest);
        self.days.retain(|key, _| key.as_str() >= oldest.as_str());

        while self.days.len() > MAX_ENTRIES {
            self.days.pop_first();
        }
    }
}

fn entry_from(day: &DailyForecast, now: DateTime<Utc>) -> DailyCacheEntry {
    DailyCacheEntry {
        max_temp: usable(day.temp.max),
        min_temp: usable(day.temp.min),
        max_wind: usable(day.wind_speed),
        max_gust: usable(day.wind_gust),
        max_pop: usable(day.pop),
        total_rain: usable(day.rain),
        total_snow: usable(day.snow),
        max_uvi: usable(Some(day.uvi)),
        last_updated: now,
    }
}

/// Today's window only narrows, so keep the most extreme reading seen.
fn merge_today(cached: &DailyCacheEntry, day: &DailyForecast, now: DateTime<Utc>) -> DailyCacheEntry {
    let new = entry_from(day, now);
    DailyCacheEntry {
        max_temp: combine(cached.max_temp, new.max_temp, f64::max),
        min_temp: combine(cached.min_temp, new.min_temp, f64::min),
        max_wind: combine(cached.max_wind, new.max_wind, f64::max),
        max_gust: combine(cached.max_gust, new.max_gust, f64::max),
        max_pop: combine(cached.max_pop, new.max_pop, f64::max),
        total_rain: combine(cached.total_rain, new.total_rain, f64::max),
        total_snow: combine(cached.total_snow, new.total_snow, f64::max),
        max_uvi: combine(cached.max_uvi, new.max_uvi, f64::max),
        last_updated: now,
    }
}

/// Future days are genuine revisions: new values win, cache fills gaps.
fn merge_future(cached: &DailyCacheEntry, day: &DailyForecast, now: DateTime<Utc>) -> DailyCacheEntry {
    let new = entry_from(day, now);
    DailyCacheEntry {
        max_temp: freshest(cached.max_temp, new.max_temp),
        min_temp: freshest(cached.min_temp, new.min_temp),
        max_wind: freshest(cached.max_wind, new.max_wind),
        max_gust: freshest(cached.max_gust, new.max_gust),
        max_pop: freshest(cached.max_pop, new.max_pop),
        total_rain: freshest(cached.total_rain, new.total_rain),
        total_snow: freshest(cached.total_snow, new.total_snow),
        max_uvi: freshest(cached.max_uvi, new.max_uvi),
        last_updated: now,
    }
}

fn apply(entry: &DailyCacheEntry, day: &mut DailyForecast) {
    day.temp.max = entry.max_temp;
    day.temp.min = entry.min_temp;
    day.wind_speed = entry.max_wind;
    day.wind_gust = entry.max_gust;
    day.pop = entry.max_pop;
    day.rain = entry.total_rain;
    day.snow = entry.total_snow;
    day.uvi = entry.max_uvi.unwrap_or(0.0);
}
