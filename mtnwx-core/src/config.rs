use anyhow::{Context, Result, anyhow};
use chrono::TimeDelta;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf};

use crate::{cache::CachePolicy, model::RegionId};

pub const DEFAULT_FORECAST_URL: &str = "https://nwac.us/api/v2/mountain-weather-forecast/";

/// Where to find the observation-zone KML for one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSourceConfig {
    pub kml_url: String,
}

/// Staleness and retention for one cache, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub stale_after_secs: u64,
    pub retain_for_secs: u64,
}

impl CacheSettings {
    pub fn policy(&self) -> Result<CachePolicy> {
        CachePolicy::new(seconds(self.stale_after_secs)?, seconds(self.retain_for_secs)?)
    }
}

fn seconds(secs: u64) -> Result<TimeDelta> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| anyhow!("Cache duration of {secs}s is out of range"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub forecast: CacheSettings,
    pub zones: CacheSettings,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            forecast: CacheSettings {
                stale_after_secs: 60 * 60,
                retain_for_secs: 24 * 60 * 60,
            },
            zones: CacheSettings {
                stale_after_secs: 24 * 60 * 60,
                retain_for_secs: 7 * 24 * 60 * 60,
            },
        }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Region used when a command does not name one.
    pub default_region: Option<String>,

    pub forecast_url: String,

    /// Example TOML:
    /// [zone_sources.west-slopes-central]
    /// kml_url = "https://..."
    pub zone_sources: HashMap<String, ZoneSourceConfig>,

    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_region: None,
            forecast_url: DEFAULT_FORECAST_URL.to_string(),
            zone_sources: HashMap::new(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Return the default region as a validated [`RegionId`].
    pub fn default_region_id(&self) -> Result<RegionId> {
        let s = self.default_region.as_ref().ok_or_else(|| {
            anyhow!(
                "No default region configured.\n\
                 Hint: run `mtnwx configure <region>` (e.g. `mtnwx configure west-slopes-central`) first."
            )
        })?;

        s.parse()
    }

    /// `explicit` if given, otherwise the configured default.
    pub fn resolve_region(&self, explicit: Option<&str>) -> Result<RegionId> {
        match explicit {
            Some(region) => region.parse(),
            None => self.default_region_id(),
        }
    }

    pub fn set_default_region(&mut self, region: &RegionId) {
        self.default_region = Some(region.to_string());
    }

    /// Load config from disk, or return defaults if it doesn't exist yet.
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
        let cfg: Config = toml::from_str(contents)?;
        cfg.cache.forecast.policy().context("Invalid [cache.forecast] settings")?;
        cfg.cache.zones.policy().context("Invalid [cache.zones] settings")?;
        Ok(cfg)
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

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "mtnwx", "mtnwx-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Set/replace the KML source for a region; the first region configured becomes the default.
    pub fn upsert_zone_source(&mut self, region: &RegionId, kml_url: String) {
        self.zone_sources
            .insert(region.to_string(), ZoneSourceConfig { kml_url });

        if self.default_region.is_none() {
            self.set_default_region(region);
        }
    }

    pub fn zone_source_url(&self, region: &RegionId) -> Option<&str> {
        self.zone_sources
            .get(region.as_str())
            .map(|source| source.kml_url.as_str())
    }

    /// Like [`Config::zone_source_url`], with a hint when it is missing.
    pub fn require_zone_source_url(&self, region: &RegionId) -> Result<&str> {
        self.zone_source_url(region).ok_or_else(|| {
            anyhow!(
                "No zone KML configured for region '{region}'.\n\
                 Hint: run `mtnwx configure {region}` and enter the KML URL."
            )
        })
    }
}
