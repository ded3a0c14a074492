use mtnwx_core::{ForecastObject, ForecastResponse, RegionId};
use std::fmt;

/// Human-readable summary of the current forecast in `response`.
pub fn render_forecast(region: &RegionId, response: &ForecastResponse) -> String {
    match response.current() {
        Some(forecast) => Summary { region, forecast }.to_string().trim_end().to_string(),
        None => format!("No mountain weather forecast published for {region}."),
    }
}

struct Summary<'a> {
    region: &'a RegionId,
    forecast: &'a ForecastObject,
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let forecast = self.forecast;
        let mwf = &forecast.mountain_weather_forecast;

        writeln!(f, "Mountain weather forecast for {}", self.region)?;
        writeln!(
            f,
            "Issued {} UTC by {}",
            mwf.publish_date.format("%Y-%m-%d %H:%M"),
            forecast.forecaster.full_name()
        )?;

        if let Some(notes) = mwf.special_header_notes.as_deref().filter(|n| !n.trim().is_empty()) {
            writeln!(f, "\n{notes}")?;
        }

        writeln!(f, "\n{}", mwf.synopsis_day1_day2)?;

        for timed in &forecast.weather_forecasts {
            writeln!(
                f,
                "\n{} {}: {}",
                timed.date.format("%a %b %-d"),
                timed.time_of_day.as_str(),
                timed.forecast_text
            )?;
        }

        if !forecast.snow_levels.is_empty() {
            writeln!(f, "\nSnow levels")?;
            for level in &forecast.snow_levels {
                let elevation = level
                    .elevation_ft
                    .map_or_else(|| "n/a".to_string(), |ft| format!("{ft} ft"));
                writeln!(f, "  {:<20} {elevation}", level.period)?;
            }
        }

        if !forecast.ridgeline_winds.is_empty() {
            writeln!(f, "\nRidgeline winds")?;
            for wind in &forecast.ridgeline_winds {
                writeln!(f, "  {:<20} {} {} mph", wind.period, wind.direction, wind.speed)?;
            }
        }

        if !mwf.extended_synopsis.trim().is_empty() {
            writeln!(f, "\nExtended: {}", mwf.extended_synopsis)?;
        }
        Ok(())
    }
}
