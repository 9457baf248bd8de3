use crate::cli::commands::{LogsCommand, ServerCommand};
use crate::config::{LoggingSettings, Settings};
use crate::hyper::HyperClient;
use crate::manager::KubeHyperManager;
use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use std::net::SocketAddr;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_log::LogTracer;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// Logs go to stderr unless a log file is configured. The returned guard
/// must be held for the life of the process so buffered file output is
/// flushed.
pub fn init_logging(logging: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let level: Level = logging.level.parse().unwrap_or(Level::INFO);
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(logging.filter.as_deref().unwrap_or_default());

    let (writer, guard) = match &logging.file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path {} has no file name", path.display()))?;
            let appender = RollingFileAppender::new(Rotation::NEVER, directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(logging.file.is_none())
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;
    LogTracer::init().context("Failed to initialize log tracer")?;

    Ok(guard)
}

fn hyper_client(settings: &Settings) -> Result<HyperClient> {
    HyperClient::new(&settings.hyper.endpoint, settings.timeout())
        .with_context(|| format!("Failed to create hyperd client for {}", settings.hyper.endpoint))
}

/// Runs the kubelet-facing server until Ctrl-C.
pub async fn handle_server(cmd: ServerCommand, settings: Settings) -> Result<()> {
    let listen = cmd.listen.unwrap_or_else(|| settings.server.listen.clone());
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("Invalid listen address {}", listen))?;

    let client = hyper_client(&settings)?;
    let shutdown = CancellationToken::new();
    let manager = KubeHyperManager::new(client)
        .await
        .context("Failed to initialize hyperd runtime")?
        .with_shutdown(shutdown.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            shutdown.cancel();
        }
    });

    info!("Using hyperd at {}", settings.hyper.endpoint);
    manager.serve(addr).await.context("Server error")?;
    Ok(())
}

pub async fn handle_version(settings: Settings) -> Result<()> {
    let version = hyper_client(&settings)?
        .version()
        .await
        .context("Failed to query hyperd version")?;

    println!("hyperlet {}", env!("CARGO_PKG_VERSION"));
    println!("hyperd   {} (API {})", version.version, version.api_version);
    Ok(())
}

pub async fn handle_logs(cmd: LogsCommand, settings: Settings) -> Result<()> {
    let client = hyper_client(&settings)?;
    let mut stdout = tokio::io::stdout();

    if cmd.follow {
        let logs = client
            .follow_container_logs(&cmd.container)
            .await
            .with_context(|| format!("Failed to follow logs of {}", cmd.container))?;
        tokio::pin!(logs);
        while let Some(chunk) = logs.next().await {
            stdout.write_all(&chunk?).await?;
            stdout.flush().await?;
        }
    } else {
        let logs = client
            .container_logs(&cmd.container)
            .await
            .with_context(|| format!("Failed to get logs of {}", cmd.container))?;
        stdout.write_all(&logs).await?;
        stdout.flush().await?;
    }
    Ok(())
}
