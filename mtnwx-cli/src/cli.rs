use anyhow::Context;
use clap::{Parser, Subcommand};
use inquire::{Confirm, Text};
use mtnwx_core::{Config, LogReporter, RegionId, RequestedTime, SystemClock, WeatherClient};
use std::sync::Arc;

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "mtnwx", version, about = "Mountain weather forecasts and observation zones")]
pub struct Cli {
    /// Log debug output to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure the observation-zone KML source for a region.
    Configure {
        /// Region identifier, e.g. "west-slopes-central".
        region: String,
    },

    /// Show the mountain weather forecast for a region.
    Forecast {
        /// Region identifier; defaults to the configured region.
        region: Option<String>,

        /// `latest`, an RFC 3339 instant or YYYY-MM-DD; if absent, means "latest".
        #[arg(long)]
        date: Option<String>,
    },

    /// Print the observation zones for a region as GeoJSON.
    Zones {
        /// Region identifier; defaults to the configured region.
        region: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = Config::load()?;

        match self.command {
            Command::Configure { region } => {
                let region: RegionId = region.parse()?;
                configure(&mut config, &region)?;
            }
            Command::Forecast { region, date } => {
                let region = config.resolve_region(region.as_deref())?;
                let requested = match date.as_deref() {
                    Some(date) => date.parse::<RequestedTime>()?,
                    None => RequestedTime::Latest,
                };

                let client = client(&config)?;
                let forecast = client
                    .forecast(&region, requested)
                    .await
                    .with_context(|| format!("Failed to load forecast for '{region}'"))?;

                println!("{}", output::render_forecast(&region, &forecast));
            }
            Command::Zones { region } => {
                let region = config.resolve_region(region.as_deref())?;
                let zones = client(&config)?.observation_zones(&config, &region).await?;

                println!(
                    "{}",
                    serde_json::to_string_pretty(&zones).context("Failed to serialize zones")?
                );
            }
        }

        Ok(())
    }
}

fn client(config: &Config) -> anyhow::Result<WeatherClient> {
    WeatherClient::new(config, Arc::new(SystemClock), Arc::new(LogReporter))
}

fn configure(config: &mut Config, region: &RegionId) -> anyhow::Result<()> {
    let message = format!("Observation zone KML URL for {region}:");
    let mut prompt = Text::new(&message);
    let current = config.zone_source_url(region).map(str::to_string);
    if let Some(current) = current.as_deref() {
        prompt = prompt.with_default(current);
    }

    let kml_url = prompt.prompt().context("Failed to read KML URL")?;
    if kml_url.trim().is_empty() {
        anyhow::bail!("KML URL must not be empty");
    }
    config.upsert_zone_source(region, kml_url.trim().to_string());

    let is_default = config.default_region.as_deref() == Some(region.as_str());
    if !is_default {
        let make_default = Confirm::new(&format!("Use {region} as the default region?"))
            .with_default(false)
            .prompt()
            .context("Failed to read answer")?;
        if make_default {
            config.set_default_region(region);
        }
    }

    config.save()?;
    println!(
        "Saved configuration to {}",
        Config::config_file_path()?.display()
    );
    Ok(())
}
