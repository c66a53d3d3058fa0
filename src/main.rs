// ABOUTME: Entry point for the shipwright CLI application.
// ABOUTME: Wires settings, logging, and collaborators together and maps the run outcome to an exit code.

mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use shipwright::config::{Descriptor, Settings};
use shipwright::deploy::{DeploymentRequest, Orchestrator};
use shipwright::error::{ErrorKind, Result};
use shipwright::logging::{self, AuditTrail, LogConfig};
use shipwright::monitor::{Channels, HttpTransport, Monitor};
use shipwright::output::Output;
use shipwright::platform::{CommandPlatform, CommandRunner};
use shipwright::store::{FileStore, StateStore};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new(cli.output_mode());

    let kind = run(cli, &output).await;

    // Every code in the taxonomy fits in a u8
    ExitCode::from(u8::try_from(kind.code()).unwrap_or(1))
}

/// Run one deployment. The log guard and lock are dropped before this returns.
async fn run(cli: Cli, output: &Output) -> ErrorKind {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            output.error(&e.to_string());
            return e.kind();
        }
    };

    let level = settings.effective_log_level(cli.debug);
    let log_config = LogConfig::new(level).with_dir(&settings.log_dir);
    let _log_guard = match logging::init(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            output.error(&e.to_string());
            return e.kind();
        }
    };

    let request = match DeploymentRequest::parse(&cli.environment, &cli.version) {
        Ok(request) => request.with_dry_run(cli.dry_run).with_debug(cli.debug),
        Err(e) => {
            tracing::error!(kind = %e.kind(), "{e}");
            output.error(&e.to_string());
            return e.kind();
        }
    };

    let orchestrator = match build_orchestrator(&cli, &settings) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!(kind = %e.kind(), "{e}");
            output.error(&e.to_string());
            return e.kind();
        }
    };

    // Losing the race to a signal drops the run, which releases its lock
    tokio::select! {
        run = orchestrator.run(request) => {
            output.report(&run);
            run.exit_kind()
        }
        signal = shutdown_signal() => {
            output.error(&format!("cancelled by {signal}"));
            orchestrator.cancelled(request, signal).await
        }
    }
}

fn build_orchestrator(cli: &Cli, settings: &Settings) -> Result<Orchestrator> {
    let cwd = std::env::current_dir()?;
    let (descriptor, project_dir) = match &cli.config {
        Some(path) => (Descriptor::load(path)?, project_dir_of(path, &cwd)),
        None => (Descriptor::discover(&cwd)?, cwd),
    };

    let store: Arc<dyn StateStore> = Arc::new(FileStore::new(&settings.state_dir));
    let platform = CommandPlatform::new(descriptor.clone(), CommandRunner::new(&project_dir));
    let monitor = Monitor::new(
        Channels::from_settings(settings),
        Arc::new(HttpTransport::default()),
    );

    Ok(Orchestrator::new(descriptor, Arc::new(platform), store)
        .with_project_dir(project_dir)
        .with_registry(settings.registry.clone())
        .with_monitor(monitor)
        .with_audit(AuditTrail::new(&settings.log_dir)))
}

/// Relative paths in a descriptor resolve against the directory holding it.
fn project_dir_of(descriptor: &Path, cwd: &Path) -> PathBuf {
    match descriptor.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => cwd.join(parent),
        _ => cwd.to_path_buf(),
    }
}

/// Resolves with the name of the first termination signal received.
async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                tracing::warn!("Failed to listen for SIGINT: {e}");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        signal = interrupt => signal,
        signal = terminate => signal,
    }
}
