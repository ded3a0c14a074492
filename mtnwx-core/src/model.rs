use chrono::{DateTime, DurationRound, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Organizational area a forecast or observation zone belongs to, e.g. `west-slopes-north`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionId(String);

impl RegionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RegionId {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Err(anyhow::anyhow!("Region identifier must not be empty"));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(anyhow::anyhow!(
                "Invalid region identifier '{value}': whitespace is not allowed."
            ));
        }
        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for RegionId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RegionId> for String {
    fn from(id: RegionId) -> Self {
        id.0
    }
}

/// Which forecast the caller wants: the latest one, or the one in effect at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestedTime {
    #[default]
    Latest,
    At(DateTime<Utc>),
}

impl RequestedTime {
    /// Canonical instant used for cache keys and the `published_datetime` parameter.
    ///
    /// `Latest` collapses into the start of the current UTC hour.
    pub fn normalize(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            RequestedTime::Latest => now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now),
            RequestedTime::At(at) => at,
        }
    }
}

impl fmt::Display for RequestedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedTime::Latest => f.write_str("latest"),
            RequestedTime::At(at) => write!(f, "{}", at.to_rfc3339()),
        }
    }
}

impl FromStr for RequestedTime {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("latest") || trimmed.eq_ignore_ascii_case("now") {
            return Ok(RequestedTime::Latest);
        }

        if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(RequestedTime::At(at.with_timezone(&Utc)));
        }

        let day = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| {
            anyhow::anyhow!(
                "Invalid date '{value}'. Expected `latest`, an RFC 3339 instant or YYYY-MM-DD."
            )
        })?;
        let midnight = day
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow::anyhow!("Invalid date '{value}'"))?;

        Ok(RequestedTime::At(midnight.and_utc()))
    }
}
