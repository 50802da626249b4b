//! gpsgate-sim: drives a simulated vehicle against a gpsgate listener.
//!
//! Connects over TCP, logs in, then sends one frame per interval following
//! the scenario cycle in [`route`]. With `--stdout` the frames are printed
//! instead, ready to pipe into `gpsgate decode -`.

use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use gpsgate_core::encode;
use gpsgate_core::frame::LOGIN_REPLY;

use route::{Dialect, Vehicle};

mod route;

#[derive(Debug, Parser)]
#[command(
    name = "gpsgate-sim",
    version,
    about = "Simulated GPS tracker traffic"
)]
struct Cli {
    /// Listener host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Listener port
    #[arg(short, long, default_value = "5001")]
    port: u16,

    /// Device IMEI
    #[arg(long, default_value = "359586018966098")]
    imei: String,

    /// Dialect for driving frames (SOS always uses the standard dialect)
    #[arg(long, value_enum, default_value = "hq")]
    format: Dialect,

    /// Seconds between frames
    #[arg(short, long, default_value = "2.0")]
    interval: f64,

    /// Stop after this many position frames
    #[arg(short, long)]
    count: Option<u64>,

    /// Send a simple heartbeat after every N position frames
    #[arg(long)]
    heartbeat_every: Option<u64>,

    /// Print frames to stdout instead of connecting
    #[arg(long)]
    stdout: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    anyhow::ensure!(
        cli.interval >= 0.0 && cli.interval.is_finite(),
        "interval must be a non-negative number of seconds"
    );

    if cli.stdout {
        let mut out = tokio::io::stdout();
        return run(&cli, &mut out).await;
    }

    let addr = format!("{}:{}", cli.host, cli.port);
    let mut stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    info!(%addr, imei = %cli.imei, "connected");

    stream
        .write_all(encode::login_frame(&cli.imei).as_bytes())
        .await?;
    let mut reply = [0u8; LOGIN_REPLY.len()];
    match tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut reply)).await {
        Ok(Ok(_)) if reply == LOGIN_REPLY.as_bytes() => info!("login acknowledged"),
        Ok(Ok(_)) => warn!(reply = %String::from_utf8_lossy(&reply), "unexpected login reply"),
        Ok(Err(e)) => return Err(e).context("reading login reply"),
        Err(_) => warn!("no login reply, continuing"),
    }

    run(&cli, &mut stream).await
}

/// Send the scenario to `out` until `--count` frames have gone out (or forever).
async fn run<W: AsyncWrite + Unpin>(cli: &Cli, out: &mut W) -> anyhow::Result<()> {
    let mut vehicle = Vehicle::new(&cli.imei, cli.format);
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(cli.interval.max(0.001)));
    let mut sent = 0u64;

    while cli.count.map_or(true, |n| sent < n) {
        if !cli.stdout {
            ticker.tick().await;
        }

        let (phase, frame) = vehicle.tick(Local::now().naive_local());
        debug!(?phase, %frame, "sending");
        send(out, &frame, cli.stdout).await?;
        sent += 1;

        if let Some(every) = cli.heartbeat_every.filter(|&n| n > 0) {
            if sent % every == 0 {
                send(out, &encode::simple_heartbeat(&cli.imei), cli.stdout).await?;
            }
        }
    }

    out.flush().await?;
    info!(sent, "done");
    Ok(())
}

async fn send<W: AsyncWrite + Unpin>(out: &mut W, frame: &str, line: bool) -> anyhow::Result<()> {
    out.write_all(frame.as_bytes()).await?;
    if line {
        out.write_all(b"\n").await?;
    }
    Ok(())
}
