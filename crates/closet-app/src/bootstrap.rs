use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use closet_api::{ApiServer, ApiState};
use closet_config::{AppConfig, StageCommand, StageCommands};
use closet_pipeline::{Pipeline, PipelineStages, ProcessStage, StageKind};
use closet_scratch::ScratchDir;
use closet_telemetry::{GlobalContextGuard, LoggingConfig, Metrics, init_logging};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

/// Dependencies required to bootstrap the closet server.
pub(crate) struct BootstrapDependencies {
    config: AppConfig,
    telemetry: Metrics,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment.
    pub(crate) fn from_env() -> AppResult<Self> {
        let config =
            AppConfig::from_env().map_err(|err| AppError::config("config.from_env", err))?;
        let telemetry =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self { config, telemetry })
    }
}

/// Entry point for the closet boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, logging, scratch storage, or the HTTP
/// listener cannot be set up.
pub async fn run_app() -> AppResult<()> {
    let BootstrapDependencies { config, telemetry } = BootstrapDependencies::from_env()?;
    let logging = LoggingConfig {
        level: &config.logging.level,
        format: config.logging.format,
        ..LoggingConfig::default()
    };
    init_logging(&logging).map_err(|err| AppError::telemetry("telemetry.init", err))?;
    run_app_with(config, telemetry, shutdown_signal()).await
}

/// Boot sequence over injected configuration; serves until `shutdown` resolves.
///
/// Logging must already be installed by the caller.
///
/// # Errors
///
/// Returns an error if the scratch directory is unusable or the listener fails.
pub async fn run_app_with<F>(config: AppConfig, telemetry: Metrics, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let _context = GlobalContextGuard::new("closet-app");
    let addr = config.server.socket_addr();
    info!(
        addr = %addr,
        scratch_dir = %config.scratch.dir.display(),
        "closet bootstrap starting"
    );

    let scratch = ScratchDir::ensure(&config.scratch.dir)
        .map_err(|err| AppError::scratch("scratch.ensure", err))?
        .with_sweep_roots(config.scratch.sweep_roots.iter().cloned());

    let pipeline = build_pipeline(&config.stages, telemetry.clone());
    let sweeper = config.scratch.sweep_interval.map(|interval| {
        info!(
            interval_secs = interval.as_secs(),
            max_age_secs = config.scratch.max_age.as_secs(),
            "scratch sweeper enabled"
        );
        scratch.spawn_sweeper(interval, config.scratch.max_age, telemetry.clone())
    });

    let state = ApiState::new(pipeline, scratch, telemetry)
        .with_max_upload_bytes(config.limits.max_upload_bytes)
        .with_cleanup_request_files(config.scratch.cleanup_request_files);
    let serve_result = ApiServer::new(state).serve(addr, shutdown).await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
        if let Err(err) = sweeper.await
            && !err.is_cancelled()
        {
            warn!(error = %err, "scratch sweeper join failed");
        }
    }

    serve_result.map_err(|err| AppError::api_server("api_server.serve", err))?;
    info!("closet shutdown complete");
    Ok(())
}

/// Build the production pipeline: one worker process per stage.
#[must_use]
pub fn build_pipeline(commands: &StageCommands, telemetry: Metrics) -> Pipeline {
    let stage = |kind: StageKind, command: &StageCommand| {
        warn_if_script_missing(kind, command);
        Arc::new(ProcessStage::new(
            kind,
            command.program.clone(),
            command.args.clone(),
            commands.timeout,
        ))
    };
    Pipeline::new(
        PipelineStages {
            background_removal: stage(StageKind::BackgroundRemoval, &commands.remove_bg),
            normalization: stage(StageKind::Normalization, &commands.normalize),
            classification: stage(StageKind::Classification, &commands.classify),
        },
        telemetry,
    )
}

fn warn_if_script_missing(kind: StageKind, command: &StageCommand) {
    for arg in &command.args {
        let path = Path::new(arg);
        if path.extension().is_some_and(|ext| ext == "py") && !path.is_file() {
            warn!(
                stage = kind.as_str(),
                script = %path.display(),
                "stage worker script not found; requests will fail at this stage"
            );
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}
