//! Observation zones from a KML document.
//!
//! The pipeline runs XML text -> element tree -> validated placemarks ->
//! coordinate rings -> features. A broken document yields an empty
//! collection; a placemark with bad properties is dropped on its own.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, warn};

use crate::{
    cache::{Query, QueryKey},
    error::FetchError,
    forecast::truncate_body,
    geojson::{Feature, FeatureCollection, FeatureId, Geometry, ZoneProperties},
    model::RegionId,
};

pub mod coordinates;
pub mod schema;
pub mod xml;

pub use schema::{KmlDocument, Placemark};

pub(crate) const SOURCE: &str = "observation-zones";

/// Turn KML text into observation-zone features for `region`.
///
/// Never fails: malformed or mis-shaped documents produce an empty collection.
pub fn zones_from_kml(text: &str, region: &RegionId) -> FeatureCollection {
    let root = match xml::parse(text) {
        Ok(root) => root,
        Err(err) => {
            warn!(%region, error = %err, "zone KML is not well-formed XML");
            return FeatureCollection::empty();
        }
    };

    match schema::validate(&root) {
        Ok(document) => build_collection(&document, region),
        Err(err) => {
            warn!(%region, path = %err.path, reason = %err.reason, "zone KML has unexpected shape");
            FeatureCollection::empty()
        }
    }
}

/// Features for every placemark whose properties validate, in document order.
///
/// Ids come from the placemark's position in the document, so dropping one
/// placemark does not shift the ids of the others.
pub fn build_collection(document: &KmlDocument, region: &RegionId) -> FeatureCollection {
    let features = document
        .placemarks
        .iter()
        .enumerate()
        .filter_map(|(index, placemark)| {
            match ZoneProperties::validate(placemark.name.as_deref(), region) {
                Ok(properties) => Some(Feature {
                    id: FeatureId::synthetic(index),
                    geometry: Geometry::polygon(coordinates::parse_coordinates(
                        &placemark.coordinates,
                    )),
                    properties,
                }),
                Err(err) => {
                    error!(
                        index,
                        %region,
                        path = %err.path,
                        reason = %err.reason,
                        "dropping zone placemark"
                    );
                    None
                }
            }
        })
        .collect();

    FeatureCollection { features }
}

/// Fetches zone KML over HTTP.
#[derive(Debug, Clone)]
pub struct ZoneClient {
    http: Client,
}

impl ZoneClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "fetching zone KML");

        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| FetchError::transport(url, e))?;

        if !status.is_success() {
            return Err(FetchError::transport(
                url,
                format!("status {}: {}", status, truncate_body(&body)),
            ));
        }
        Ok(body)
    }

    /// Fetch `url` and convert it. Only transport failures are errors.
    pub async fn fetch_zones(
        &self,
        url: &str,
        region: &RegionId,
    ) -> Result<FeatureCollection, FetchError> {
        let text = self.fetch_text(url).await?;
        let zones = zones_from_kml(&text, region);
        debug!(%region, zones = zones.len(), "converted zone KML");
        Ok(zones)
    }

    pub fn query(&self, url: impl Into<String>, region: RegionId) -> ZoneQuery {
        ZoneQuery {
            client: self.clone(),
            url: url.into(),
            region,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZoneQuery {
    client: ZoneClient,
    url: String,
    region: RegionId,
}

#[async_trait]
impl Query for ZoneQuery {
    type Output = FeatureCollection;

    fn key(&self) -> QueryKey {
        QueryKey::new(SOURCE, [self.region.to_string(), self.url.clone()])
    }

    async fn fetch(&self) -> Result<FeatureCollection, FetchError> {
        self.client.fetch_zones(&self.url, &self.region).await
    }
}
