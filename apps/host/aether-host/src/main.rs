use aether_host::error::HostError;
use aether_host::host_loop::run_until_stopped;
use aether_host::logger::{default_log_dir, initialize as LoggerInitialize};
use aether_host::python_executor::PythonExecutor;

use bridge_core::config::{BridgeConfig, default_config_dir};
use bridge_core::service::BridgeService;

use common::ErrorLocation;

use std::fs::create_dir_all;
use std::panic::Location;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), HostError> {
    let log_dir = default_log_dir()?;
    create_dir_all(&log_dir).map_err(|e| HostError::Logger {
        message: format!("Failed to create log directory: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    // Initialize logger FIRST
    LoggerInitialize(&log_dir)?;

    info!("Aether host starting");
    info!("Log directory: {}", log_dir.display());

    let config_dir = default_config_dir()?;
    let config = BridgeConfig::load_with_env(&config_dir)?;
    info!("Config directory: {}", config_dir.display());

    let executor = PythonExecutor::from_settings(&config.executor);
    info!("Executing code with '{}'", executor.interpreter());

    let mut service = BridgeService::enable(&config, executor)?;

    let stop = Arc::new(AtomicBool::new(false));
    match service.runtime_handle() {
        Some(handle) => {
            let stop = Arc::clone(&stop);
            handle.spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Interrupt received, shutting down");
                        stop.store(true, Ordering::SeqCst);
                    }
                    Err(e) => warn!("Failed to listen for interrupt: {e}"),
                }
            });
        }
        None => warn!("No transport runtime, interrupt handling disabled"),
    }

    run_until_stopped(&mut service, &stop);
    service.disable();

    info!("Aether host stopped");
    Ok(())
}
