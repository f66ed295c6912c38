use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
mod config;
mod error;
mod events;
mod services;
mod utils;

use config::{Config, LoggingConfig};
use error::AppDetectError;
use services::{create_focus_backend, FocusTracker, IpcServer, SharedStateCell};

#[derive(Parser, Debug)]
#[command(name = "appdetect")]
#[command(about = "Сообщает через локальный сокет, какое приложение сейчас в фокусе")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "appdetect.toml")]
    config: PathBuf,

    /// Путь к сокету (перекрывает server.socket_path)
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Режим сухого запуска (эмуляция событий фокуса)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (перекрывает logging.level)
    #[arg(long)]
    log_level: Option<String>,

    /// Не запускать демон, а один раз опросить работающий
    #[arg(short, long)]
    query: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config).map_err(AppDetectError::Config)?;
    if let Some(socket) = args.socket {
        config.server.socket_path = socket;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate().map_err(AppDetectError::Config)?;

    if args.query {
        let line = services::client::query(&config.server.socket_path, Duration::from_secs(2))
            .await
            .with_context(|| format!("Не удалось опросить {}", config.server.socket_path.display()))?;
        println!("{}", line);
        return Ok(());
    }

    init_tracing(&config.logging)?;

    info!("Запуск appdetect v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config.display());

    if args.dry_run {
        warn!("Режим сухого запуска - события фокуса эмулируются");
    }

    utils::permissions::check_environment(&config.server.socket_path);

    let state = Arc::new(SharedStateCell::new());

    // Подписка на фокус раньше, чем сервер начнёт принимать клиентов
    let tracker = match create_focus_backend(&config, args.dry_run) {
        Ok(backend) => match FocusTracker::start(backend, state.clone()).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Отслеживание фокуса недоступно: {}", e);
                None
            }
        },
        Err(e) => {
            warn!("Отслеживание фокуса недоступно: {}", e);
            None
        }
    };

    let server = IpcServer::bind(&config.server, state.clone())
        .await
        .context("Не удалось запустить сервер")?;
    info!("Сервер готов: {}", server.socket_path().display());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_handle = tokio::spawn(server.run(shutdown_rx));

    wait_for_shutdown_signal().await;

    info!("Завершение работы...");

    let _ = shutdown_tx.send(true);
    if let Some(tracker) = &tracker {
        tracker.abort();
    }

    match tokio::time::timeout(Duration::from_secs(5), server_handle).await {
        Ok(Ok(Ok(()))) => info!("Сервер завершил работу корректно"),
        Ok(Ok(Err(e))) => error!("Сервер завершился с ошибкой: {}", e),
        Ok(Err(e)) => error!("Задача сервера аварийно завершилась: {}", e),
        Err(_) => warn!("Таймаут при остановке сервера"),
    }

    info!("Обработано событий фокуса: {}", state.generation());
    info!("appdetect завершил работу");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Не удалось подписаться на SIGTERM: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Ошибка при ожидании сигнала завершения: {}", e);
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Получен сигнал завершения (Ctrl+C)"),
            Err(e) => error!("Ошибка при ожидании сигнала завершения: {}", e),
        },
        _ = terminate.recv() => info!("Получен SIGTERM"),
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))?;

    let registry = tracing_subscriber::registry().with(filter);

    match logging.format.as_str() {
        "json" => registry.with(fmt::layer().json()).init(),
        "pretty" => registry.with(fmt::layer().pretty()).init(),
        _ => registry.with(fmt::layer().compact()).init(),
    }

    Ok(())
}
