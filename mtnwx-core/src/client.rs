use anyhow::Context;
use reqwest::Client;
use std::{sync::Arc, time::Duration};

use crate::{
    Config,
    cache::{Clock, QueryCache},
    error::{ErrorReporter, FetchError},
    forecast::{ForecastClient, ForecastQuery, ForecastResponse},
    geojson::FeatureCollection,
    kml::{ZoneClient, ZoneQuery},
    model::{RegionId, RequestedTime},
};

/// Cached access to forecasts and observation zones.
///
/// Everything it depends on is passed in; clones share the same caches.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    forecasts: ForecastClient,
    zones: ZoneClient,
    forecast_cache: QueryCache<ForecastResponse>,
    zone_cache: QueryCache<FeatureCollection>,
    clock: Arc<dyn Clock>,
}

impl WeatherClient {
    pub fn new(
        config: &Config,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("mtnwx/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let forecast_policy = config
            .cache
            .forecast
            .policy()
            .context("Invalid forecast cache settings")?;
        let zone_policy = config
            .cache
            .zones
            .policy()
            .context("Invalid zone cache settings")?;

        Ok(Self {
            forecasts: ForecastClient::new(http.clone(), config.forecast_url.clone(), reporter),
            zones: ZoneClient::new(http),
            forecast_cache: QueryCache::new(forecast_policy, Arc::clone(&clock)),
            zone_cache: QueryCache::new(zone_policy, Arc::clone(&clock)),
            clock,
        })
    }

    fn forecast_query(&self, region: &RegionId, requested: RequestedTime) -> ForecastQuery {
        let published = requested.normalize(self.clock.now());
        self.forecasts.query(region.clone(), published)
    }

    pub async fn forecast(
        &self,
        region: &RegionId,
        requested: RequestedTime,
    ) -> Result<ForecastResponse, FetchError> {
        let query = self.forecast_query(region, requested);
        self.forecast_cache.fetch(query).await
    }

    pub async fn prefetch_forecast(&self, region: &RegionId, requested: RequestedTime) {
        let query = self.forecast_query(region, requested);
        self.forecast_cache.prefetch(query).await;
    }

    fn zone_query(&self, config: &Config, region: &RegionId) -> anyhow::Result<ZoneQuery> {
        let url = config.require_zone_source_url(region)?;
        Ok(self.zones.query(url, region.clone()))
    }

    /// Observation zones for `region`, from the KML source configured for it.
    pub async fn observation_zones(
        &self,
        config: &Config,
        region: &RegionId,
    ) -> anyhow::Result<FeatureCollection> {
        let query = self.zone_query(config, region)?;
        Ok(self.zone_cache.fetch(query).await?)
    }

    pub async fn prefetch_observation_zones(
        &self,
        config: &Config,
        region: &RegionId,
    ) -> anyhow::Result<()> {
        let query = self.zone_query(config, region)?;
        self.zone_cache.prefetch(query).await;
        Ok(())
    }

    pub fn forecast_cache(&self) -> &QueryCache<ForecastResponse> {
        &self.forecast_cache
    }

    pub fn zone_cache(&self) -> &QueryCache<FeatureCollection> {
        &self.zone_cache
    }
}
