/*!
 * accessim demonstration driver.
 *
 * Runs scripted sessions against each built-in accessory: register it in a
 * fresh registry, connect, send a scripted command sequence, print the resulting
 * state and disconnect.
 */
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::debug;

use accessim_core::config::ConfigBuilder;

mod demo;

use demo::Printer;

/// Which scripted session to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DemoKind {
    /// RGB LED controller: brightness, color, pattern and power
    Lighting,
    /// Temperature sensor: readings and data logging
    Sensor,
    /// Game controller: input and vibration
    Controller,
    /// Every demo in turn
    All,
}

#[derive(Parser, Debug)]
#[command(name = "accessim")]
#[command(version, about = "Accessory protocol simulator", long_about = None)]
struct Args {
    /// Demo to run
    #[arg(long, value_enum, default_value_t = DemoKind::All)]
    demo: DemoKind,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print responses as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = ConfigBuilder::new().with_default_environment();
    if let Some(path) = &args.config {
        builder = builder.with_config_file(path);
    }
    let mut config = builder.build().context("Failed to load configuration")?;
    if args.verbose {
        config.logging.level = "debug".to_string();
    }
    accessim_core::init(&config).context("Failed to initialize logging")?;
    debug!(?args, "Starting demo");

    let printer = Printer::new(args.json);
    match args.demo {
        DemoKind::Lighting => demo::lighting(&config, &printer).await?,
        DemoKind::Sensor => demo::sensor(&config, &printer).await?,
        DemoKind::Controller => demo::controller(&config, &printer).await?,
        DemoKind::All => {
            demo::lighting(&config, &printer).await?;
            demo::sensor(&config, &printer).await?;
            demo::controller(&config, &printer).await?;
            printer.banner("All demos completed");
        }
    }

    Ok(())
}
