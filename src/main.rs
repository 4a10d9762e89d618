use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use crisisctrl::config::{DispatchConfig, LoggingConfig};
use crisisctrl::dispatch::zones::location_zones;

#[derive(Parser)]
#[command(
    name = "crisisctrl",
    about = "Real-time emergency incident dispatch engine",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + detection loop)
    Serve {
        /// Path to a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// List the unit registry in declaration order
    Units {
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List monitored locations and their risk zones
    Locations {
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show which unit an incident type would be assigned to
    Assign {
        /// Incident type, e.g. "Cyclone Warning"
        incident_type: String,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<DispatchConfig> {
    match path {
        Some(p) => DispatchConfig::load(p),
        None => DispatchConfig::discover(),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, bind } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            init_tracing(&cfg.logging);
            tracing::info!(bind = %cfg.server.bind, "Starting CrisisCtrl daemon");
            crisisctrl::serve(cfg).await?;
        }
        Commands::Units { config, json } => {
            let cfg = load_config(config.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&cfg.units)?);
            } else {
                println!("{:<14} | {:<18} | {:<20} | Specialty", "Unit", "Operation", "Base");
                println!("{:-<14}-|-{:-<18}-|-{:-<20}-|-{:-<40}", "", "", "", "");
                for unit in &cfg.units {
                    let base = format!("{:.4}, {:.4}", unit.base.lat, unit.base.lng);
                    println!(
                        "{:<14} | {:<18} | {:<20} | {}",
                        unit.id,
                        unit.operation,
                        base,
                        unit.specialty.join(", ")
                    );
                }
                println!("\nFallback unit: {}", cfg.assignment.default_unit);
            }
        }
        Commands::Locations { config, json } => {
            let cfg = load_config(config.as_deref())?;
            let zones = location_zones(&cfg.locations, cfg.zones.location_radius_m);
            if json {
                let out = serde_json::json!({ "locations": cfg.locations, "riskZones": zones });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{:<14} | {:<10} | {:<10} | Radius (m)", "Location", "Lat", "Lon");
                println!("{:-<14}-|-{:-<10}-|-{:-<10}-|-{:-<10}", "", "", "", "");
                for (loc, zone) in cfg.locations.iter().zip(&zones) {
                    println!(
                        "{:<14} | {:<10.4} | {:<10.4} | {}",
                        loc.name, loc.lat, loc.lon, zone.radius
                    );
                }
            }
        }
        Commands::Assign {
            incident_type,
            config,
        } => {
            let cfg = load_config(config.as_deref())?;
            println!("{}", cfg.assigner().assign(&incident_type));
        }
    }

    Ok(())
}
