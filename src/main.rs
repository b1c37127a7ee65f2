mod app;
mod controller;
mod error;
mod hotkey;
mod input;
mod keys;
mod prefs;
mod signal;
mod startup;
mod worker;

#[cfg(test)]
mod tests;

use clap::Parser;
use eframe::egui;
use error::AppError;
use keys::KeyStatePort;
use prefs::FilePrefsStore;
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use tracing_subscriber::EnvFilter;
use worker::Ports;

#[derive(Parser, Debug)]
#[command(name = "auto_clicker", version, about = "Auto clicker & typer with start/stop hotkeys")]
struct Cli {
    /// Preferences file (defaults to ~/.autoclicker_config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init();
}

#[cfg(not(feature = "hooks"))]
fn key_state() -> Result<Arc<dyn KeyStatePort>, AppError> {
    Ok(Arc::new(keys::DeviceKeyState::probe()?))
}

#[cfg(feature = "hooks")]
fn key_state() -> Result<Arc<dyn KeyStatePort>, AppError> {
    Ok(Arc::new(keys::HookKeyState::spawn()?))
}

fn run(cli: Cli) -> Result<(), AppError> {
    let ports = Ports::new(Arc::new(input::EnigoInput), key_state()?);
    let store = match cli.config {
        Some(path) => FilePrefsStore::with_path(path),
        None => FilePrefsStore::new(),
    };
    tracing::info!(prefs = %store.path().display(), "starting");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([650.0, 600.0])
            .with_resizable(true),
        ..Default::default()
    };
    eframe::run_native(
        "Auto Clicker & Typer",
        options,
        Box::new(move |cc| Box::new(app::AutoClickerApp::new(cc, ports, Box::new(store)))),
    )?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("{e}");
            ExitCode::from(1)
        }
    }
}
