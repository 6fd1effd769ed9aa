use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use zf_app::{AppError, AppResult, config_service};
use zf_scheduler::{best_match, parse_event};

#[derive(Parser)]
#[command(name = "zf-cli")]
#[command(about = "ZoneFlow CLI - Multi-zone climate control tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate config file syntax and structure
    Validate {
        /// Path to the config YAML or JSON file
        config_path: PathBuf,
    },
    /// List zones in a config
    Zones {
        /// Path to the config YAML or JSON file
        config_path: PathBuf,
    },
    /// Parse a calendar event into a period name and zone settings
    ParseSettings {
        /// Event title, e.g. "Night: setpoint 18, non-voting"
        title: String,
        /// Event description, YAML settings
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Show which schedule period every zone is in at a given time
    MatchSchedule {
        /// Path to the config YAML or JSON file
        config_path: PathBuf,
        /// Local date and time, e.g. 2024-01-15T10:00:00 (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Replay recorded readings through the whole system
    Replay {
        /// Path to the config YAML or JSON file
        config_path: PathBuf,
        /// Readings, one JSON object per line
        readings_path: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> AppResult<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config_path } => cmd_validate(&config_path),
        Commands::Zones { config_path } => cmd_zones(&config_path),
        Commands::ParseSettings { title, description } => cmd_parse_settings(&title, description.as_deref()),
        Commands::MatchSchedule { config_path, at } => cmd_match_schedule(&config_path, at.as_deref()),
        Commands::Replay {
            config_path,
            readings_path,
            json,
        } => cmd_replay(&config_path, &readings_path, json),
    }
}

fn cmd_validate(config_path: &Path) -> AppResult<()> {
    println!("Validating config: {}", config_path.display());
    let config = config_service::load_config(config_path)?;
    config_service::validate(&config)?;
    println!("✓ Config is valid ({} zones, {} schedule entries)", config.zones.len(), config.schedule.len());
    Ok(())
}

fn cmd_zones(config_path: &Path) -> AppResult<()> {
    let config = config_service::load_config(config_path)?;
    let zones = config_service::list_zones(&config);

    println!("Zones in {} (unit: {}, {}):", config.name, config.unit.name, config.unit.mode);
    for zone in zones {
        let mut flags = Vec::new();
        if !zone.enabled {
            flags.push("off");
        }
        if !zone.voting {
            flags.push("non-voting");
        }
        if zone.has_economizer {
            flags.push("economizer");
        }
        println!(
            "  {} - setpoint {} ({}..{}), {} sources, median {}, {} periods {}",
            zone.name,
            zone.setpoint,
            zone.range.0,
            zone.range.1,
            zone.source_count,
            zone.median_depth,
            zone.schedule_periods,
            if flags.is_empty() { String::new() } else { format!("[{}]", flags.join(", ")) }
        );
    }
    Ok(())
}

fn cmd_parse_settings(title: &str, description: Option<&str>) -> AppResult<()> {
    let (name, settings) = parse_event(title, description)?;
    println!("Period:   {}", name);
    println!("Settings: {}", settings);
    Ok(())
}

fn parse_local(text: &str) -> AppResult<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .ok_or_else(|| AppError::InvalidInput(format!("can't parse '{}' as a local date and time", text)))
}

fn cmd_match_schedule(config_path: &Path, at: Option<&str>) -> AppResult<()> {
    let config = config_service::load_config(config_path)?;
    let schedules = zf_app::build_schedules(&config)?;
    let at = match at {
        Some(text) => parse_local(text)?,
        None => Local::now().naive_local(),
    };
    debug!(%at, zones = schedules.len(), "matching");

    println!("Periods at {}:", at.format("%a %Y-%m-%d %H:%M"));
    for zone in &config.zones {
        let matched = schedules.get(&zone.name).and_then(|schedule| best_match(schedule, at));
        match matched {
            Some((period, settings)) => println!("  {}: {} -> {}", zone.name, period, settings),
            None => println!("  {}: no period", zone.name),
        }
    }
    Ok(())
}

fn cmd_replay(config_path: &Path, readings_path: &Path, json: bool) -> AppResult<()> {
    let config = config_service::load_config(config_path)?;
    let text = std::fs::read_to_string(readings_path)?;
    let readings = zf_app::parse_readings(&text)?;
    let report = zf_app::replay(&config, &readings)?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&report).map_err(|e| AppError::InvalidInput(format!("can't render report: {}", e)))?;
        println!("{}", rendered);
        return Ok(());
    }

    println!("Replayed {} readings ({} unrouted)", report.readings, report.unrouted);

    if !report.schedule.is_empty() {
        println!("\nSchedule:");
        for event in &report.schedule {
            println!("  {}", event);
        }
    }

    println!("\nUnit commands:");
    if report.commands.is_empty() {
        println!("  none");
    }
    for record in &report.commands {
        println!(
            "  {}  demand {:>7.3} -> power {:.2}, fan {:.2}",
            record.at.format("%Y-%m-%d %H:%M:%S"),
            record.demand,
            record.command.demand,
            record.command.fan_speed
        );
    }

    println!("\nZones:");
    for (name, state) in &report.zones {
        println!("  {}: {}", name, state);
    }
    Ok(())
}
