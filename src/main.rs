//! BioTrack SmartBand monitor
//!
//! Polls the band's HTTP endpoint, classifies glucose, pH and oxygen
//! readings, keeps them in a local SQLite history and draws live charts.
//! When the band does not answer at start-up, simulated readings are used
//! for the rest of the session.
//!
//! Usage:
//!   biotrack                       - Launch GUI
//!   biotrack monitor [options]     - Headless monitoring (JSON lines on stdout)
//!   biotrack --help                - Show help
//!   BIOTRACK_DBG=1 biotrack monitor - Enable debug output

mod acquisition;
mod auth;
mod buffer;
mod config;
mod error;
mod export;
mod gui;
mod sample;
mod session;
mod settings;
mod source;
mod storage;
mod units;

#[cfg(test)]
mod test_support;

use std::env;
use std::path::PathBuf;
use std::sync::mpsc::channel;

use chrono::Local;
use log::warn;

use crate::acquisition::AcquisitionEvent;
use crate::config::{Config, config_file_path, default_database_path, ensure_data_dir, settings_file_path};
use crate::error::BioTrackError;
use crate::sample::{ClassifiedSample, parse_day};
use crate::session::{MonitoringSession, SessionOptions};
use crate::settings::AppSettings;
use crate::source::{AdapterKind, SampleSource, SourceAdapter};
use crate::storage::{Persister, Storage};

const DEFAULT_USER: &str = "local";

fn main() -> Result<(), BioTrackError> {
    let args: Vec<String> = env::args().collect();

    // Check for debug mode
    let debug_mode = env::var("BIOTRACK_DBG").is_ok();

    // Initialize logger
    if debug_mode {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp(None)
            .init();
    }

    // Ensure data directory exists
    if let Err(e) = ensure_data_dir() {
        eprintln!("Warning: Could not create data directory: {}", e);
    }

    // Create default config if it doesn't exist
    let cfg_path = config_file_path();
    if !cfg_path.exists() {
        if let Err(e) = Config::create_default(&cfg_path) {
            warn!("Could not create default config: {}", e);
        }
    }

    // Try loading config from data directory first, then current directory
    let config = load_config(&[cfg_path, PathBuf::from("config.txt")]);

    let rest = args.get(2..).unwrap_or(&[]);

    match args.get(1).map(|s| s.as_str()) {
        Some("monitor") => cmd_monitor(&config, rest)?,
        Some("probe") => cmd_probe(&config, rest),
        Some("history") => cmd_history(&config, rest)?,
        Some("export") => cmd_export(&config, rest)?,
        Some("--help") | Some("-h") | Some("help") => print_help(),
        Some("--version") | Some("-V") => {
            println!("biotrack {}", env!("CARGO_PKG_VERSION"));
        }
        Some("path") | Some("paths") => cmd_show_paths(&config),
        Some(other) => {
            eprintln!("Unknown command '{}'", other);
            print_help();
        }
        None => {
            gui::run_gui(config).map_err(|e| BioTrackError::Gui(e.to_string()))?;
        }
    }

    Ok(())
}

/// First config file that exists and parses. A broken file is reported,
/// not silently replaced by defaults.
fn load_config(candidates: &[PathBuf]) -> Config {
    for path in candidates.iter().filter(|path| path.exists()) {
        match Config::load(path) {
            Ok(config) => return config,
            Err(e) => eprintln!("Warning: Ignoring config file {}: {}", path.display(), e),
        }
    }
    warn!("No usable config file, using defaults");
    Config::default()
}

/// Value following `flag`, e.g. `--user alice`
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

/// First argument that is neither a flag nor a flag's value
fn positional(args: &[String]) -> Option<&str> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") {
            iter.next();
        } else {
            return Some(arg);
        }
    }
    None
}

fn device_ip<'a>(config: &'a Config, settings: &'a AppSettings, args: &'a [String]) -> &'a str {
    flag_value(args, "--ip").unwrap_or_else(|| settings.effective_device_ip(&config.device_ip))
}

/// Headless monitoring, one classified sample per line
fn cmd_monitor(config: &Config, args: &[String]) -> Result<(), BioTrackError> {
    let settings = AppSettings::load(settings_file_path());
    let user = flag_value(args, "--user").unwrap_or(DEFAULT_USER);
    let cycles: Option<u64> = match flag_value(args, "--cycles") {
        Some(value) => Some(value.parse().map_err(|_| {
            BioTrackError::Config(format!("--cycles expects a number, got '{}'", value))
        })?),
        None => None,
    };

    let options = SessionOptions {
        device_ip: device_ip(config, &settings, args).to_string(),
        fetch_timeout: config.fetch_timeout,
        poll_interval: config.poll_interval,
    };

    let storage = Storage::new(config.database_path())?;
    let (tx, rx) = channel();
    let mut session = MonitoringSession::new();
    let kind = session.start(user, &options, storage, Some(tx))?;
    eprintln!("Monitoring {} ({} data) for user {}", options.device_ip, kind.label(), user);

    let mut seen = 0u64;
    for event in rx.iter() {
        match event {
            AcquisitionEvent::SampleReady(sample) => {
                println!("{}", serde_json::to_string(&ClassifiedSample::from(sample))?);
                seen += 1;
            }
            AcquisitionEvent::Connectivity(false) if kind == AdapterKind::Live => {
                eprintln!("Device disconnected");
            }
            AcquisitionEvent::Connectivity(_) => {}
        }
        if cycles.is_some_and(|limit| seen >= limit) {
            break;
        }
    }

    session.stop();
    Ok(())
}

/// One reachability probe, as done at the start of every session
fn cmd_probe(config: &Config, args: &[String]) {
    let settings = AppSettings::load(settings_file_path());
    let ip = device_ip(config, &settings, args);
    let mut adapter = SourceAdapter::select(ip, config.fetch_timeout);

    println!("Device {}: {} data", ip, adapter.kind().label());
    if adapter.is_live() {
        match adapter.fetch() {
            Ok(sample) => match serde_json::to_string_pretty(&ClassifiedSample::from(sample)) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Could not format sample: {}", e),
            },
            Err(e) => eprintln!("{}", e),
        }
    }
}

/// Print stored readings, newest first
fn cmd_history(config: &Config, args: &[String]) -> Result<(), BioTrackError> {
    let user = flag_value(args, "--user").unwrap_or(DEFAULT_USER);
    let start = flag_value(args, "--from").map(|d| parse_day(d, false)).transpose()?;
    let end = flag_value(args, "--to").map(|d| parse_day(d, true)).transpose()?;

    let storage = Storage::new(config.database_path())?;
    if args.iter().any(|arg| arg == "--latest") {
        match storage.latest(user)? {
            Some(sample) => println!("{}", serde_json::to_string_pretty(&ClassifiedSample::from(sample))?),
            None => eprintln!("No readings stored for {}", user),
        }
        return Ok(());
    }

    let readings: Vec<ClassifiedSample> = storage
        .query(user, start, end)?
        .into_iter()
        .map(ClassifiedSample::from)
        .collect();

    println!("{}", serde_json::to_string_pretty(&readings)?);
    eprintln!("{} readings ({} stored for {})", readings.len(), storage.count(user)?, user);
    Ok(())
}

fn cmd_export(config: &Config, args: &[String]) -> Result<(), BioTrackError> {
    let user = flag_value(args, "--user").unwrap_or(DEFAULT_USER);
    let path = match positional(args) {
        Some(path) => path.to_string(),
        None => export::default_export_name(Local::now().date_naive()),
    };

    let storage = Storage::new(config.database_path())?;
    let readings = storage.get_readings(user, None, None)?;
    let written = export::export_to_csv(&path, &readings)?;
    eprintln!("Exported {} readings to {}", written, path);
    Ok(())
}

/// Show data paths
fn cmd_show_paths(config: &Config) {
    use crate::config::{default_export_dir, get_data_dir};

    println!("BioTrack Data Paths:");
    println!("  Data directory:  {}", get_data_dir().display());
    println!("  Database:        {}", config.database_path());
    println!("  Config file:     {}", config_file_path().display());
    println!("  Settings file:   {}", settings_file_path().display());
    println!("  Export default:  {}", default_export_dir().display());
}

fn print_help() {
    eprintln!("{} v{}", config::APP_NAME, env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("  biotrack                         Launch GUI application");
    eprintln!("  biotrack monitor [--user ID] [--ip IP] [--cycles N]");
    eprintln!("                                   Monitor without GUI, one JSON line per reading");
    eprintln!("  biotrack probe [--ip IP]         Check whether the band answers");
    eprintln!("  biotrack history [--user ID] [--from YYYY-MM-DD] [--to YYYY-MM-DD] [--latest]");
    eprintln!("                                   Print stored readings, newest first");
    eprintln!("  biotrack export [FILE] [--user ID]");
    eprintln!("                                   Export stored readings to CSV");
    eprintln!("  biotrack path                    Show data file locations");
    eprintln!("  biotrack help                    Show this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("  BIOTRACK_DBG=1                   Enable debug output");
    eprintln!();
    eprintln!("DATA LOCATIONS:");
    eprintln!("  Database:  {}", default_database_path().display());
    eprintln!("  Config:    {}", config_file_path().display());
}
