//! CLI Entry Point for sensor-logger
//!
//! Connects to the sensor board's WebSocket endpoint and logs every complete
//! frame to `<name>_<YYYYMMDD_HHMMSS>.csv` and `.xlsx` until the operator types
//! `q` (or presses Ctrl-C).
//!
//! # Usage
//!
//! Interactive (prompts for endpoint and file name):
//! ```bash
//! sensor-logger
//! ```
//!
//! Unattended:
//! ```bash
//! sensor-logger --url ws://192.168.4.1/ws --name glove --output-dir runs --no-prompt
//! ```

use anyhow::{anyhow, Result};
use clap::Parser;
use sensor_logger::command::{self, ask};
use sensor_logger::config::LoggerConfig;
use sensor_logger::session::{Session, StartRequest};
use sensor_logger::transport::WsTransport;
use sensor_logger::{app, tracing_init};
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "sensor-logger")]
#[command(about = "Log MPU6050 and flex sensor frames from a WebSocket to CSV and XLSX", long_about = None)]
struct Cli {
    /// WebSocket endpoint (prompted for when omitted)
    #[arg(long)]
    url: Option<String>,

    /// Base file name (prompted for when omitted)
    #[arg(long)]
    name: Option<String>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the CSV and XLSX files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Do not write the CSV log
    #[arg(long)]
    no_csv: bool,

    /// Do not write the XLSX workbook
    #[arg(long)]
    no_xlsx: bool,

    /// Never prompt; use configured defaults for anything not given
    #[arg(long)]
    no_prompt: bool,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Override the configured log format (pretty, compact, json)
    #[arg(long)]
    log_format: Option<String>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut LoggerConfig) {
        if let Some(dir) = &self.output_dir {
            config.storage.output_dir = dir.clone();
        }
        if self.no_csv {
            config.storage.csv_enabled = false;
        }
        if self.no_xlsx {
            config.storage.xlsx_enabled = false;
        }
        if let Some(level) = &self.log_level {
            config.application.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.application.log_format = format.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => LoggerConfig::load_from(path)?,
        None => LoggerConfig::load()?,
    };
    cli.apply_overrides(&mut config);
    config.validate()?;
    tracing_init::init_from_config(&config).map_err(|e| anyhow!(e))?;

    println!("{}", config.application.name);

    let default_url = config.connection.default_url.clone();
    let (url, custom_name) = if cli.no_prompt {
        (cli.url.unwrap_or(default_url), cli.name)
    } else {
        let mut input = std::io::stdin().lock();
        let mut output = std::io::stdout();
        let url = match cli.url {
            Some(url) => url,
            None => ask(
                &mut input,
                &mut output,
                &format!("Enter WebSocket URL (default {default_url}): "),
            )?
            .unwrap_or(default_url),
        };
        let name = match cli.name {
            Some(name) => Some(name),
            None => ask(&mut input, &mut output, "Enter Custom Filename (optional): ")?,
        };
        (url, name)
    };

    let request = StartRequest {
        url,
        custom_name: custom_name.or(Some(config.storage.default_prefix.clone())),
        output_dir: config.storage.output_dir.clone(),
        csv_enabled: config.storage.csv_enabled,
        xlsx_enabled: config.storage.xlsx_enabled,
        event_buffer: config.connection.event_buffer,
    };

    let mut session = Session::new();
    let events = session.start(request, Arc::new(WsTransport))?;

    let (tx, commands) = command::channel();
    command::spawn_reader(BufReader::new(std::io::stdin()), tx.clone())?;
    command::spawn_interrupt(tx);

    let reason = app::run(&mut session, events, commands).await;
    info!(%reason, "Session ended");
    println!("Exiting...");
    Ok(ExitCode::SUCCESS)
}
