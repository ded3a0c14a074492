//! Typed shape of the mountain weather forecast endpoint.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Pagination envelope returned alongside every list response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub limit: u32,
    pub offset: u32,
    pub total_count: u32,
    pub next: Option<String>,
    pub previous: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub meta: Meta,
    pub objects: Vec<ForecastObject>,
}

impl ForecastResponse {
    /// The forecast the endpoint considers current for the request, if any.
    pub fn current(&self) -> Option<&ForecastObject> {
        self.objects.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastObject {
    pub id: i64,
    pub forecaster: Forecaster,
    pub mountain_weather_forecast: MountainWeatherForecast,
    /// Period labels, e.g. "Saturday" / "Saturday Night".
    pub periods: Vec<String>,
    /// Finer labels within a period, e.g. "Morning".
    pub sub_periods: Vec<String>,
    pub temperatures: Vec<TemperatureForecast>,
    pub precipitation_by_location: Vec<LocationPrecipitation>,
    pub snow_levels: Vec<SnowLevel>,
    pub ridgeline_winds: Vec<RidgelineWind>,
    pub weather_forecasts: Vec<TimedForecast>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecaster {
    pub first_name: String,
    pub last_name: String,
}

impl Forecaster {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountainWeatherForecast {
    pub id: i64,
    #[serde(with = "naive_utc")]
    pub creation_date: DateTime<Utc>,
    #[serde(with = "naive_utc")]
    pub publish_date: DateTime<Utc>,
    pub synopsis_day1_day2: String,
    pub extended_synopsis: String,
    #[serde(default)]
    pub special_header_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureForecast {
    pub location: String,
    /// One entry per period; `None` where the forecaster left it blank.
    pub max_temps: Vec<Option<i32>>,
    pub min_temps: Vec<Option<i32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPrecipitation {
    pub location: String,
    /// Free-form amounts per sub-period, e.g. "0.25 - 0.50".
    pub precipitation: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnowLevel {
    pub period: String,
    pub elevation_ft: Option<i32>,
    #[serde(default)]
    pub time_of_day: Option<TimeOfDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgelineWind {
    pub period: String,
    pub direction: String,
    pub speed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedForecast {
    pub date: NaiveDate,
    pub time_of_day: TimeOfDay,
    pub forecast_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Day,
    Evening,
    Night,
    Overnight,
}

impl TimeOfDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "Morning",
            TimeOfDay::Afternoon => "Afternoon",
            TimeOfDay::Day => "Day",
            TimeOfDay::Evening => "Evening",
            TimeOfDay::Night => "Night",
            TimeOfDay::Overnight => "Overnight",
        }
    }
}

/// Check a raw JSON value against the forecast shape.
pub fn validate(value: serde_json::Value) -> Result<ForecastResponse, ValidationError> {
    serde_path_to_error::deserialize(value).map_err(|err| {
        let path = err.path().to_string();
        ValidationError::new(path, err.into_inner().to_string())
    })
}

/// Timestamps sent as `YYYY-MM-DD HH:MM:SS` without an offset; they are UTC.
mod naive_utc {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|e| D::Error::custom(format!("invalid timestamp '{raw}': {e}")))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn accepts_well_formed_response() {
        let response = validate(fixtures::forecast_json()).unwrap();
        let object = response.current().unwrap();

        assert_eq!(response.meta.total_count, 1);
        assert_eq!(object.forecaster.full_name(), "Dana Reyes");
        assert_eq!(
            object.mountain_weather_forecast.creation_date,
            Utc.with_ymd_and_hms(2024, 1, 15, 13, 45, 0).unwrap()
        );
        assert_eq!(object.temperatures[0].max_temps, vec![Some(31), None]);
        assert_eq!(object.snow_levels[1].time_of_day, None);
        assert_eq!(object.weather_forecasts[1].time_of_day, TimeOfDay::Night);
    }

    #[test]
    fn missing_creation_date_is_a_validation_error() {
        let mut json = fixtures::forecast_json();
        json["objects"][0]["mountain_weather_forecast"]
            .as_object_mut()
            .unwrap()
            .remove("creation_date");

        let err = validate(json).unwrap_err();
        assert_eq!(err.path, "objects[0].mountain_weather_forecast");
        assert!(err.reason.contains("creation_date"), "{}", err.reason);
    }

    #[test]
    fn timestamp_with_offset_is_rejected() {
        let mut json = fixtures::forecast_json();
        json["objects"][0]["mountain_weather_forecast"]["publish_date"] =
            "2024-01-15T14:00:00Z".into();

        let err = validate(json).unwrap_err();
        assert_eq!(err.path, "objects[0].mountain_weather_forecast.publish_date");
    }

    #[test]
    fn unknown_time_of_day_is_rejected() {
        let mut json = fixtures::forecast_json();
        json["objects"][0]["weather_forecasts"][0]["time_of_day"] = "Dusk".into();

        let err = validate(json).unwrap_err();
        assert_eq!(err.path, "objects[0].weather_forecasts[0].time_of_day");
    }

    #[test]
    fn naive_timestamps_serialize_back_without_offset() {
        let response = validate(fixtures::forecast_json()).unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json["objects"][0]["mountain_weather_forecast"]["creation_date"],
            "2024-01-15 13:45:00"
        );
    }
}
