//! Thermolog CLI
//!
//! Command-line interface for managing the Thermolog daemon and inspecting
//! sensor data.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thermolog_core::{ThermologConfig, TimeRange};
use thermolog_ipc::{Dataset, IpcClient, Request, Response, ResponseData, Settings};

#[derive(Parser)]
#[command(name = "thermolog")]
#[command(about = "Thermolog - temperature sensor history")]
#[command(version)]
struct Cli {
    /// Control socket (default: from ~/.thermolog/config.yaml)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Thermolog daemon
    Start {
        /// Run in foreground (for debugging)
        #[arg(short, long)]
        foreground: bool,
    },

    /// Stop the Thermolog daemon
    Stop,

    /// Show daemon status
    Status,

    /// Check if daemon is running
    Ping,

    /// Publish one reading as if it came from a sensor
    Publish {
        /// Sensor id
        sensor: String,
        /// Temperature in degrees Celsius
        #[arg(allow_hyphen_values = true)]
        temperature: f64,
    },

    /// Show chart data
    Chart {
        /// hour, day, week, month, year or all
        #[arg(short, long, default_value = "day")]
        range: String,

        /// Point budget per sensor
        #[arg(short, long)]
        max_points: Option<usize>,

        /// Only this sensor
        #[arg(short, long)]
        sensor: Option<String>,

        /// Print the raw chart JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the latest reading of every sensor
    Current,

    /// Show or edit sensor settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// List settings of every sensor
    List,

    /// Change settings of one sensor
    Set {
        /// Sensor id
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        order: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Simple logging for CLI
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt().with_target(false).init();
    }

    let cli = Cli::parse();
    let socket = cli
        .socket
        .unwrap_or_else(|| ThermologConfig::load().socket_path);
    tracing::debug!(socket = %socket.display(), "Using control socket");
    let client = IpcClient::with_socket_path(&socket);

    match cli.command {
        Commands::Start { foreground } => cmd_start(&client, foreground).await,
        Commands::Stop => cmd_stop(&client).await,
        Commands::Status => cmd_status(&client).await,
        Commands::Ping => cmd_ping(&client).await,
        Commands::Publish {
            sensor,
            temperature,
        } => cmd_publish(&client, &sensor, temperature).await,
        Commands::Chart {
            range,
            max_points,
            sensor,
            json,
        } => cmd_chart(&client, &range, max_points, sensor.as_deref(), json).await,
        Commands::Current => cmd_current(&client).await,
        Commands::Settings { command } => match command {
            SettingsCommand::List => cmd_settings_list(&client).await,
            SettingsCommand::Set {
                id,
                name,
                color,
                order,
            } => cmd_settings_set(&client, &id, name, color, order).await,
        },
    }
}

async fn cmd_start(client: &IpcClient, foreground: bool) -> Result<()> {
    if foreground {
        println!("Starting Thermolog daemon in foreground...");
        println!("Press Ctrl+C to stop.");

        let status = std::process::Command::new("thermolog-daemon")
            .status()
            .context("Failed to start daemon. Is thermolog-daemon in PATH?")?;

        if !status.success() {
            anyhow::bail!("Daemon exited with error");
        }
    } else {
        if client.is_daemon_running() {
            println!("Thermolog daemon is already running.");
            return Ok(());
        }

        let child = std::process::Command::new("thermolog-daemon")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .context("Failed to start daemon")?;

        println!("✓ Thermolog daemon started (PID: {})", child.id());
    }

    Ok(())
}

async fn cmd_stop(client: &IpcClient) -> Result<()> {
    if !client.is_daemon_running() {
        println!("Thermolog daemon is not running.");
        return Ok(());
    }

    match client.request(Request::Shutdown).await {
        Ok(Response::Ok { .. }) | Ok(Response::Ack) => {
            println!("✓ Thermolog daemon stopping...");

            tokio::time::sleep(std::time::Duration::from_millis(500)).await;

            if !client.is_daemon_running() {
                println!("✓ Daemon stopped.");
            }
        }
        Ok(resp) => {
            println!("Unexpected response: {:?}", resp);
        }
        Err(e) => {
            println!("Failed to stop daemon: {}", e);
        }
    }

    Ok(())
}

async fn cmd_status(client: &IpcClient) -> Result<()> {
    if !client.is_daemon_running() {
        println!("Thermolog daemon is not running.");
        println!("\nStart with: thermolog start");
        return Ok(());
    }

    match client.get_status().await {
        Ok(ResponseData::Status {
            version,
            uptime_secs,
            sensors,
            readings_stored,
            readings_ingested,
            payloads_rejected,
            requests_total,
            avg_latency_ms,
        }) => {
            println!("Thermolog Daemon v{}", version);
            println!();
            println!("  Status:     Running");
            println!("  Uptime:     {}", format_duration(uptime_secs));
            println!("  Sensors:    {}", sensors);
            println!("  Readings:   {} stored", readings_stored);
            println!();
            println!("  Ingested:   {}", readings_ingested);
            println!("  Rejected:   {}", payloads_rejected);
            println!("  Requests:   {}", requests_total);
            println!("  Avg Latency: {}ms", avg_latency_ms);
        }
        Ok(_) => {
            println!("Unexpected status response");
        }
        Err(e) => {
            println!("Failed to get status: {}", e);
        }
    }

    Ok(())
}

async fn cmd_ping(client: &IpcClient) -> Result<()> {
    if !client.is_daemon_running() {
        println!("✗ Daemon not running");
        return Ok(());
    }

    let start = std::time::Instant::now();
    match client.request(Request::Ping).await {
        Ok(Response::Ok {
            data: Some(ResponseData::Pong { .. }),
        }) => {
            let elapsed = start.elapsed();
            println!("✓ Pong! ({:.2}ms)", elapsed.as_secs_f64() * 1000.0);
        }
        Ok(_) => {
            println!("✗ Unexpected response");
        }
        Err(e) => {
            println!("✗ Error: {}", e);
        }
    }

    Ok(())
}

async fn cmd_publish(client: &IpcClient, sensor: &str, temperature: f64) -> Result<()> {
    match client.publish_reading(sensor, temperature).await {
        Ok(()) => println!("✓ Queued {:.2}°C for {}", temperature, sensor),
        Err(e) => println!("✗ Error: {}", e),
    }
    Ok(())
}

async fn cmd_chart(
    client: &IpcClient,
    range: &str,
    max_points: Option<usize>,
    sensor: Option<&str>,
    json: bool,
) -> Result<()> {
    let range = TimeRange::parse(range);

    let datasets = match sensor {
        Some(id) => match client.sensor_chart(id, range.as_str(), max_points).await {
            Ok(dataset) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&dataset)?);
                    return Ok(());
                }
                vec![dataset]
            }
            Err(e) => {
                println!("✗ Error: {}", e);
                return Ok(());
            }
        },
        None => match client.chart(range.as_str(), max_points).await {
            Ok(chart) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&chart)?);
                    return Ok(());
                }
                chart.datasets
            }
            Err(e) => {
                println!("✗ Error: {}", e);
                return Ok(());
            }
        },
    };

    println!("{}", range.title());
    println!();
    if datasets.is_empty() {
        println!("  No sensors yet.");
    }
    for dataset in &datasets {
        println!("  {}", summarize(dataset));
    }

    Ok(())
}

async fn cmd_current(client: &IpcClient) -> Result<()> {
    match client.current_temperatures().await {
        Ok(sensors) if sensors.is_empty() => println!("No readings yet."),
        Ok(sensors) => {
            for sensor in sensors {
                println!(
                    "  {:<20} {:>7.2}°C  ({})",
                    sensor.name,
                    sensor.temperature,
                    sensor.time.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Err(e) => println!("✗ Error: {}", e),
    }
    Ok(())
}

async fn cmd_settings_list(client: &IpcClient) -> Result<()> {
    match client.list_settings().await {
        Ok(sensors) if sensors.is_empty() => println!("No sensors yet."),
        Ok(sensors) => {
            println!("  {:<5} {:<16} {:<20} COLOR", "ORDER", "ID", "NAME");
            for s in sensors {
                println!("  {:<5} {:<16} {:<20} {}", s.order, s.id, s.name, s.color);
            }
        }
        Err(e) => println!("✗ Error: {}", e),
    }
    Ok(())
}

async fn cmd_settings_set(
    client: &IpcClient,
    id: &str,
    name: Option<String>,
    color: Option<String>,
    order: Option<u32>,
) -> Result<()> {
    let current = match client.list_settings().await {
        Ok(sensors) => sensors.into_iter().find(|s| s.id == id),
        Err(e) => {
            println!("✗ Error: {}", e);
            return Ok(());
        }
    };

    let Some(current) = current else {
        println!("✗ Unknown sensor: {}", id);
        return Ok(());
    };

    let settings = Settings::new(
        name.unwrap_or(current.name),
        color.unwrap_or(current.color),
        order.unwrap_or(current.order),
    );

    let mut updates = BTreeMap::new();
    updates.insert(id.to_string(), settings);

    match client.update_settings(updates).await {
        Ok(results) => {
            for result in results {
                if result.ok {
                    println!("✓ Updated {}", result.id);
                } else {
                    println!(
                        "✗ {}: {}",
                        result.id,
                        result.message.unwrap_or_default()
                    );
                }
            }
        }
        Err(e) => println!("✗ Error: {}", e),
    }

    Ok(())
}

/// One line per dataset: label, point count and temperature span.
fn summarize(dataset: &Dataset) -> String {
    let temps = dataset.data.iter().map(|p| p.y);
    let min = temps.clone().fold(f64::INFINITY, f64::min);
    let max = temps.fold(f64::NEG_INFINITY, f64::max);

    match dataset.data.last() {
        Some(last) => format!(
            "{:<20} {:>4} points  min {:.1}  max {:.1}  last {:.1}",
            dataset.label,
            dataset.data.len(),
            min,
            max,
            last.y
        ),
        None => format!("{:<20} no readings in range", dataset.label),
    }
}

fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use thermolog_ipc::ChartPoint;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7260), "2h 1m");
        assert_eq!(format_duration(90000), "1d 1h");
    }

    #[test]
    fn test_summarize() {
        let at = |m| Utc.with_ymd_and_hms(2024, 1, 1, 0, m, 0).unwrap();
        let dataset = Dataset {
            label: "Kitchen".to_string(),
            data: vec![
                ChartPoint { x: at(0), y: 19.0 },
                ChartPoint { x: at(1), y: 23.5 },
                ChartPoint { x: at(2), y: 21.0 },
            ],
            border_color: "#ff0000".to_string(),
            background_color: "#ff0000".to_string(),
        };
        let line = summarize(&dataset);
        assert!(line.contains("3 points"));
        assert!(line.contains("min 19.0"));
        assert!(line.contains("max 23.5"));
        assert!(line.contains("last 21.0"));
    }

    #[test]
    fn test_cli_parses_settings_set() {
        let cli = Cli::try_parse_from([
            "thermolog", "settings", "set", "s1", "--name", "Kitchen", "--order", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Settings {
                command: SettingsCommand::Set { id, name, order, color },
            } => {
                assert_eq!(id, "s1");
                assert_eq!(name.as_deref(), Some("Kitchen"));
                assert_eq!(order, Some(2));
                assert!(color.is_none());
            }
            _ => panic!("Expected settings set"),
        }
    }

    #[test]
    fn test_cli_parses_negative_temperature() {
        let cli = Cli::try_parse_from(["thermolog", "publish", "garage", "-4.5"]).unwrap();
        match cli.command {
            Commands::Publish { sensor, temperature } => {
                assert_eq!(sensor, "garage");
                assert_eq!(temperature, -4.5);
            }
            _ => panic!("Expected publish"),
        }
    }
}
