//! GeoJSON-shaped output for observation zones.

use serde::Serialize;
use std::fmt;

use crate::{error::ValidationError, kml::coordinates::Position, model::RegionId};

/// Feature identifier.
///
/// Zones synthesized from KML get ids at or below [`FeatureId::SYNTHETIC_BASE`],
/// a range the upstream zone service never hands out (its ids are positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FeatureId(i64);

impl FeatureId {
    pub const SYNTHETIC_BASE: i64 = -100_000;

    /// Id for the placemark at `ordinal` (zero-based, document order).
    pub fn synthetic(ordinal: usize) -> Self {
        let ordinal = i64::try_from(ordinal).unwrap_or(i64::MAX);
        Self(Self::SYNTHETIC_BASE.saturating_sub(ordinal))
    }

    pub fn is_synthetic(self) -> bool {
        self.0 <= Self::SYNTHETIC_BASE
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Geometry {
    /// Outer ring only.
    Polygon { coordinates: Vec<Vec<Position>> },
}

impl Geometry {
    pub fn polygon(ring: Vec<Position>) -> Self {
        Geometry::Polygon {
            coordinates: vec![ring],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneProperties {
    pub name: String,
    #[serde(rename = "region_identifier")]
    pub region: RegionId,
}

impl ZoneProperties {
    /// `name` must be present and not blank.
    pub fn validate(name: Option<&str>, region: &RegionId) -> Result<Self, ValidationError> {
        let name = name.ok_or_else(|| ValidationError::missing("properties.name"))?;
        if name.trim().is_empty() {
            return Err(ValidationError::new("properties.name", "must not be blank"));
        }

        Ok(Self {
            name: name.to_string(),
            region: region.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: Geometry,
    pub properties: ZoneProperties,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
