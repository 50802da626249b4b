//! gpsgate: CLI + TCP listener for GPS vehicle trackers.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gpsgate_core::config::{self, Config};
use gpsgate_core::frame;
use gpsgate_core::tracker::Tracker;

mod db;
mod listener;

#[derive(Parser)]
#[command(name = "gpsgate", version, about = "GPS tracker gateway and decoder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode tracker frames from a file (or `-` for stdin)
    Decode {
        /// Path to a capture of raw tracker traffic
        file: PathBuf,

        /// Print one JSON object per decoded event
        #[arg(long, conflicts_with = "raw")]
        json: bool,

        /// Show raw decoded events instead of the device table
        #[arg(short, long)]
        raw: bool,
    },

    /// Listen for tracker connections and persist what they send
    Serve {
        /// Bind address (default from config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (default from config)
        #[arg(long)]
        port: Option<u16>,

        /// SQLite database path (default from config)
        #[arg(long, env = "GPSGATE_DB")]
        db_path: Option<String>,
    },

    /// Show stored positions for one device
    History {
        /// Device IMEI
        imei: String,

        /// SQLite database path (default from config)
        #[arg(long, env = "GPSGATE_DB")]
        db_path: Option<String>,

        /// Number of positions to show
        #[arg(long, default_value = "20")]
        limit: i64,

        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show database statistics
    Stats {
        /// SQLite database path (default from config)
        #[arg(long, env = "GPSGATE_DB")]
        db_path: Option<String>,
    },

    /// Show the active configuration
    Config {
        /// Write the configuration to ~/.gpsgate/config.yaml
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config();
    init_logging(&config.logging.filter);

    match cli.command {
        Commands::Decode { file, json, raw } => cmd_decode(&file, json, raw, &config),
        Commands::Serve {
            host,
            port,
            db_path,
        } => {
            let mut config = config;
            if let Some(host) = host {
                config.listener.host = host;
            }
            if let Some(port) = port {
                config.listener.port = port;
            }
            if let Some(path) = db_path {
                config.database.path = path;
            }
            cmd_serve(config).await
        }
        Commands::History {
            imei,
            db_path,
            limit,
            json,
        } => cmd_history(
            &imei,
            db_path.as_deref().unwrap_or(&config.database.path),
            limit,
            json,
        ),
        Commands::Stats { db_path } => {
            cmd_stats(db_path.as_deref().unwrap_or(&config.database.path))
        }
        Commands::Config { init } => cmd_config(&config, init),
    }
}

/// `RUST_LOG` wins over the configured filter. Logs go to stderr so
/// command output on stdout stays clean.
fn init_logging(filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

fn cmd_decode(file: &Path, json: bool, raw: bool, config: &Config) -> anyhow::Result<()> {
    let mut bytes = Vec::new();
    if file.to_str() == Some("-") {
        io::stdin().lock().read_to_end(&mut bytes)?;
    } else {
        std::fs::File::open(file)
            .with_context(|| format!("opening {}", file.display()))?
            .read_to_end(&mut bytes)?;
    }
    let text = String::from_utf8_lossy(&bytes);

    let mut tracker = Tracker::new(
        config.tracker.stale_timeout_secs,
        config.tracker.moving_speed_kmh,
    );
    let now = listener::received_now();
    let mut total_frames = 0u64;
    let mut decoded_frames = 0u64;

    for raw_frame in frame::split_all(&text) {
        if frame::login_reply(raw_frame).is_some() {
            continue;
        }
        total_frames += 1;

        let Some(event) = gpsgate_core::decode_at(raw_frame, now) else {
            continue;
        };
        decoded_frames += 1;

        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else if raw {
            println!("{event:?}");
        }
        tracker.update(&event, now);
    }

    if !json && !raw {
        print_summary(&tracker, total_frames, decoded_frames);
    }
    Ok(())
}

async fn cmd_serve(config: Config) -> anyhow::Result<()> {
    let database = db::Database::open(&config.database.path)
        .with_context(|| format!("opening database {}", config.database.path))?;
    let tracker = Tracker::new(
        config.tracker.stale_timeout_secs,
        config.tracker.moving_speed_kmh,
    );

    let addr = config.listener.addr();
    let socket = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(db = %config.database.path, "gpsgate ready");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let stored = listener::serve(socket, database, tracker, shutdown).await?;
    info!(stored, "gpsgate stopped");
    Ok(())
}

fn cmd_history(imei: &str, db_path: &str, limit: i64, json: bool) -> anyhow::Result<()> {
    let database = db::Database::open(db_path)
        .with_context(|| format!("opening database {db_path}"))?;

    let Some(device) = database.get_device(imei)? else {
        anyhow::bail!("no device {imei} in {db_path}");
    };
    let positions = database.get_positions(imei, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&positions)?);
        return Ok(());
    }

    println!();
    println!(
        "Device {} ({}), {}, state {}",
        device.imei,
        device.format.as_deref().unwrap_or("-"),
        device.status,
        device.current_state.as_deref().unwrap_or("-"),
    );
    println!(
        "  First seen {}, last seen {}, {} messages",
        device.first_seen, device.last_seen, device.message_count
    );
    if let Some(alarm) = &device.last_alarm {
        println!("  Last alarm: {alarm}");
    }
    println!();

    let events = database.get_events(Some(imei), 10)?;
    if !events.is_empty() {
        println!("Recent events:");
        for e in &events {
            println!(
                "  {}  {:<12} {}",
                e.timestamp,
                e.event_type,
                e.description.as_deref().unwrap_or("")
            );
        }
        println!();
    }

    if positions.is_empty() {
        println!("No positions stored.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Time", "Lat", "Lon", "Speed", "Dir", "GPS", "Fuel 1", "Fuel 2", "Alarm",
    ]);
    for p in &positions {
        table.add_row(vec![
            Cell::new(&p.timestamp),
            Cell::new(format!("{:.5}", p.lat)),
            Cell::new(format!("{:.5}", p.lon)),
            Cell::new(opt(p.speed, |s| format!("{s:.1}"))),
            Cell::new(opt(p.direction, |d| format!("{d:.0}"))),
            Cell::new(p.gps_status.as_deref().unwrap_or("-")),
            Cell::new(opt(p.fuel_tank1, |f| format!("{f:.1}%"))),
            Cell::new(opt(p.fuel_tank2, |f| format!("{f:.1}%"))),
            Cell::new(p.alarm.as_deref().unwrap_or("-")),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn cmd_stats(db_path: &str) -> anyhow::Result<()> {
    let database = db::Database::open(db_path)
        .with_context(|| format!("opening database {db_path}"))?;

    let stats = database.stats();

    println!();
    println!("Database: {db_path}");
    println!();
    println!("  Devices:    {}", stats.devices);
    println!("  Positions:  {}", stats.positions);
    println!("  Events:     {}", stats.events);
    println!("  Raw frames: {} ({} undecoded)", stats.raw_logs, stats.undecoded);
    println!();

    let devices = database.get_all_devices()?;
    if devices.is_empty() {
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "IMEI", "Format", "Status", "State", "Since", "Last alarm", "Msgs", "Last seen",
    ]);
    for d in &devices {
        table.add_row(vec![
            Cell::new(&d.imei),
            Cell::new(d.format.as_deref().unwrap_or("-")),
            Cell::new(&d.status),
            Cell::new(d.current_state.as_deref().unwrap_or("-")),
            Cell::new(d.state_start_time.as_deref().unwrap_or("-")),
            Cell::new(d.last_alarm.as_deref().unwrap_or("-")),
            Cell::new(d.message_count),
            Cell::new(&d.last_seen),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn cmd_config(config: &Config, init: bool) -> anyhow::Result<()> {
    if init {
        let path = config::save_config(config)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }
    println!("# {}", config::config_file().display());
    print!("{}", config::serialize_config(config));
    Ok(())
}

fn opt(value: Option<f64>, fmt: impl Fn(f64) -> String) -> String {
    value.map(fmt).unwrap_or_else(|| "-".into())
}

fn print_summary(tracker: &Tracker, total_frames: u64, decoded_frames: u64) {
    println!();
    println!(
        "Frames: {total_frames} parsed, {decoded_frames} decoded, {} devices",
        tracker.devices.len()
    );
    println!(
        "  {} positions, {} heartbeats",
        tracker.position_updates, tracker.heartbeats
    );
    println!();

    if tracker.devices.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "IMEI", "Format", "Lat", "Lon", "Speed", "Dir", "State", "Alarm", "Msgs", "HB",
    ]);

    let mut sorted: Vec<_> = tracker.devices.values().collect();
    sorted.sort_by_key(|d| std::cmp::Reverse(d.message_count));

    for dev in sorted {
        table.add_row(vec![
            Cell::new(&dev.imei),
            Cell::new(dev.format.map(|f| f.as_str()).unwrap_or("-")),
            Cell::new(opt(dev.lat, |l| format!("{l:.5}"))),
            Cell::new(opt(dev.lon, |l| format!("{l:.5}"))),
            Cell::new(opt(dev.speed, |s| format!("{s:.1}"))),
            Cell::new(opt(dev.direction, |d| format!("{d:.0}"))),
            Cell::new(dev.motion.map(|m| m.as_str()).unwrap_or("-")),
            Cell::new(dev.last_alarm.map(|a| a.as_str()).unwrap_or("-")),
            Cell::new(dev.message_count),
            Cell::new(dev.heartbeat_count),
        ]);
    }

    println!("{table}");
}
