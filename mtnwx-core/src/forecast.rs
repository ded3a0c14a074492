use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

use crate::{
    cache::{Query, QueryKey},
    error::{ErrorReporter, FetchError, ValidationError},
    model::RegionId,
};

pub mod schema;

pub use schema::{ForecastObject, ForecastResponse, TimeOfDay};

pub(crate) const SOURCE: &str = "mountain-weather-forecast";

/// HTTP access to the mountain weather forecast endpoint.
#[derive(Debug, Clone)]
pub struct ForecastClient {
    http: Client,
    url: String,
    reporter: Arc<dyn ErrorReporter>,
}

impl ForecastClient {
    pub fn new(http: Client, url: impl Into<String>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            http,
            url: url.into(),
            reporter,
        }
    }

    /// Fetch and validate the forecast for `region` published at `published`.
    pub async fn fetch(
        &self,
        region: &RegionId,
        published: DateTime<Utc>,
    ) -> Result<ForecastResponse, FetchError> {
        let published = published.to_rfc3339_opts(SecondsFormat::Secs, true);
        debug!(%region, %published, "fetching mountain weather forecast");

        let res = self
            .http
            .get(&self.url)
            .query(&[
                ("zone_id", region.as_str()),
                ("published_datetime", published.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::transport(&self.url, e))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| FetchError::transport(&self.url, e))?;

        if !status.is_success() {
            return Err(FetchError::transport(
                &self.url,
                format!("status {}: {}", status, truncate_body(&body)),
            ));
        }

        let validated = serde_json::from_str::<serde_json::Value>(&body)
            .map_err(|e| ValidationError::new("$", format!("response is not JSON: {e}")))
            .and_then(schema::validate);

        validated.map_err(|err| {
            self.reporter.report_validation(SOURCE, &err);
            FetchError::Validation(err)
        })
    }

    /// Cacheable query for one region at one normalized instant.
    pub fn query(&self, region: RegionId, published: DateTime<Utc>) -> ForecastQuery {
        ForecastQuery {
            client: self.clone(),
            region,
            published,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForecastQuery {
    client: ForecastClient,
    region: RegionId,
    published: DateTime<Utc>,
}

#[async_trait]
impl Query for ForecastQuery {
    type Output = ForecastResponse;

    fn key(&self) -> QueryKey {
        QueryKey::new(
            SOURCE,
            [self.region.to_string(), self.published.to_rfc3339()],
        )
    }

    async fn fetch(&self) -> Result<ForecastResponse, FetchError> {
        self.client.fetch(&self.region, self.published).await
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
