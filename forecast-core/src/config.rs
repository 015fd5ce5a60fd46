use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::model::{Coordinate, Units};

pub const DEFAULT_USER_AGENT: &str = "forecast-core (contact@example.com)";
pub const DEFAULT_TIME_ZONE: &str = "America/New_York";

/// Base URLs of the upstream services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub weather_gov: String,
    pub sunrise_sunset: String,
    pub uv: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            weather_gov: "https://api.weather.gov".into(),
            sunrise_sunset: "https://api.sunrise-sunset.org".into(),
            uv: "https://data.epa.gov/efservice".into(),
        }
    }
}

impl Endpoints {
    /// Points every source at one base URL. Used with local mock servers.
    pub fn all(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        Self {
            weather_gov: base.clone(),
            sunrise_sunset: base.clone(),
            uv: base,
        }
    }
}

/// Default location to forecast when none is given on the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub zipcode: Option<String>,
}

impl LocationConfig {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sent as `User-Agent` on every weather.gov request.
    pub user_agent: String,
    pub units: Units,
    /// IANA zone used when the grid documents carry none.
    pub fallback_time_zone: String,

    /// Example TOML:
    /// [location]
    /// latitude = 39.95
    /// longitude = -75.16
    /// zipcode = "19103"
    pub location: Option<LocationConfig>,

    pub cache_file: Option<PathBuf>,
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.into(),
            units: Units::default(),
            fallback_time_zone: DEFAULT_TIME_ZONE.into(),
            location: None,
            cache_file: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    /// Return the configured default location.
    pub fn default_location(&self) -> Result<&LocationConfig> {
        self.location.as_ref().ok_or_else(|| {
            anyhow!(
                "No location configured.\n\
                 Hint: run `forecast configure` or pass --lat and --lon."
            )
        })
    }

    pub fn set_location(&mut self, latitude: f64, longitude: f64, zipcode: Option<String>) {
        let zipcode = zipcode.filter(|z| !z.trim().is_empty());
        self.location = Some(LocationConfig { latitude, longitude, zipcode });
    }

    pub fn fallback_tz(&self) -> Result<Tz> {
        self.fallback_time_zone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Invalid fallback_time_zone '{}': {e}", self.fallback_time_zone))
    }

    /// Load config from disk, or return the default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "forecast", "forecast-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Path to the revision cache, honoring `cache_file` when set.
    pub fn revision_cache_path(&self) -> Result<PathBuf> {
        match &self.cache_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.cache_dir().join("revision-cache.json")),
        }
    }
}
