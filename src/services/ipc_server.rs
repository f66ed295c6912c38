use crate::config::ServerConfig;
use crate::error::{AppDetectError, Result};
use crate::events::WindowInfo;
use crate::services::state_cell::SharedStateCell;
use crate::services::wire::encode_line;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixSocket, UnixStream};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Пауза после ошибки accept: EMFILE/ENFILE не проходят сами за одну итерацию
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
struct ResponseOptions {
    write_timeout: Duration,
    include_document: bool,
}

/// Local socket server. Read-only towards the state cell: every accepted
/// connection gets the snapshot current at accept time, one line, then EOF.
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
    state: Arc<SharedStateCell>,
    options: ResponseOptions,
    served: Arc<AtomicU64>,
}

impl IpcServer {
    /// Remove a stale socket, bind and listen. Any failure here is fatal for the daemon.
    pub async fn bind(config: &ServerConfig, state: Arc<SharedStateCell>) -> Result<Self> {
        let path = config.socket_path.as_path();
        remove_stale_socket(path).await?;

        let socket = UnixSocket::new_stream().map_err(|e| AppDetectError::bind(path, e))?;
        socket.bind(path).map_err(|e| AppDetectError::bind(path, e))?;
        let listener = socket
            .listen(config.backlog)
            .map_err(|e| AppDetectError::bind(path, e))?;

        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!("Не удалось выставить права 0600 на {}: {}", path.display(), e);
        }

        info!("Слушаем {} (backlog {})", path.display(), config.backlog);

        Ok(Self {
            listener,
            socket_path: path.to_path_buf(),
            state,
            options: ResponseOptions {
                write_timeout: Duration::from_millis(config.write_timeout_ms),
                include_document: config.include_document,
            },
            served: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept loop. Runs until `shutdown` flips to `true` or its sender is dropped,
    /// then removes the socket file.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accept = self.listener.accept() => {
                    match accept {
                        Ok((stream, _addr)) => {
                            let snapshot = self.state.snapshot();
                            let options = self.options;
                            let served = self.served.clone();
                            tokio::spawn(async move {
                                if respond(stream, &snapshot, options).await {
                                    served.fetch_add(1, Ordering::Relaxed);
                                }
                            });
                        }
                        Err(e) => accept_error_backoff(&e).await,
                    }
                }
            }
        }

        info!(
            "Сервер остановлен, обслужено подключений: {}",
            self.served.load(Ordering::Relaxed)
        );
        self.remove_socket_file();
        Ok(())
    }

    fn remove_socket_file(&self) {
        match fs::remove_file(&self.socket_path) {
            Ok(()) => debug!("Сокет {} удалён", self.socket_path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Не удалось удалить сокет {}: {}", self.socket_path.display(), e),
        }
    }
}

/// A path that still accepts connections belongs to a live server; anything
/// else at the path is a leftover from a previous run.
async fn remove_stale_socket(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            warn!("Не удалось проверить {}: {}", path.display(), e);
            return Ok(());
        }
    }

    if UnixStream::connect(path).await.is_ok() {
        return Err(AppDetectError::SocketInUse {
            path: path.to_path_buf(),
        });
    }

    match fs::remove_file(path) {
        Ok(()) => debug!("Удалён устаревший сокет {}", path.display()),
        // Если удалить не вышло, решит bind
        Err(e) => warn!("Не удалось удалить устаревший сокет {}: {}", path.display(), e),
    }
    Ok(())
}

async fn accept_error_backoff(error: &std::io::Error) {
    warn!("Ошибка accept: {}", error);
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

/// Write the response line and close. `write_all` loops over short writes.
async fn respond(mut stream: UnixStream, snapshot: &WindowInfo, options: ResponseOptions) -> bool {
    let line = match encode_line(snapshot, options.include_document) {
        Ok(line) => line,
        Err(e) => {
            warn!("{}", e);
            return false;
        }
    };

    if snapshot.is_unknown() {
        trace!("Отдаём начальное состояние: событий фокуса ещё не было");
    }

    let write = async {
        stream.write_all(&line).await?;
        stream.shutdown().await
    };

    match tokio::time::timeout(options.write_timeout, write).await {
        Ok(Ok(())) => {
            trace!("Ответ отправлен: {}", snapshot);
            true
        }
        Ok(Err(e)) => {
            warn!("Ошибка записи клиенту: {}", e);
            false
        }
        Err(_) => {
            warn!("Клиент не принял ответ за {:?}, соединение закрыто", options.write_timeout);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::WindowAttributes;
    use crate::services::client::query;
    use tokio::task::JoinHandle;

    const QUERY_TIMEOUT: Duration = Duration::from_secs(2);

    fn server_config(dir: &Path) -> ServerConfig {
        let mut config = Config::default().server;
        config.socket_path = dir.join("appdetect.sock");
        config
    }

    async fn start(
        config: &ServerConfig,
        state: Arc<SharedStateCell>,
    ) -> (watch::Sender<bool>, JoinHandle<Result<()>>) {
        let server = IpcServer::bind(config, state).await.unwrap();
        let (tx, rx) = watch::channel(false);
        (tx, tokio::spawn(server.run(rx)))
    }

    #[tokio::test]
    async fn serves_sentinel_before_any_focus_event() {
        let dir = tempfile::tempdir().unwrap();
        let config = server_config(dir.path());
        let (_tx, _handle) = start(&config, Arc::new(SharedStateCell::new())).await;

        let line = query(&config.socket_path, QUERY_TIMEOUT).await.unwrap();
        assert_eq!(line, "{\"application\": \"unknown\"}");
    }

    #[tokio::test]
    async fn serves_latest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = server_config(dir.path());
        let state = Arc::new(SharedStateCell::new());
        let (_tx, _handle) = start(&config, state.clone()).await;

        state.replace(
            WindowInfo::new("Notes").with_attributes(
                WindowAttributes::absent()
                    .with_title("Untitled")
                    .with_document("Untitled.txt"),
            ),
        );
        let line = query(&config.socket_path, QUERY_TIMEOUT).await.unwrap();
        assert_eq!(line, "{\"application\": \"Notes\", \"metadata\": \"Untitled\"}");

        state.replace(WindowInfo::new("Finder"));
        let line = query(&config.socket_path, QUERY_TIMEOUT).await.unwrap();
        assert_eq!(line, "{\"application\": \"Finder\"}");
    }

    #[tokio::test]
    async fn includes_document_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = server_config(dir.path());
        config.include_document = true;
        let state = Arc::new(SharedStateCell::new());
        let (_tx, _handle) = start(&config, state.clone()).await;

        state.replace(
            WindowInfo::new("Notes").with_attributes(
                WindowAttributes::absent()
                    .with_title("Untitled")
                    .with_document("Untitled.txt"),
            ),
        );
        let line = query(&config.socket_path, QUERY_TIMEOUT).await.unwrap();
        assert_eq!(
            line,
            "{\"application\": \"Notes\", \"metadata\": \"Untitled\", \"document\": \"Untitled.txt\"}"
        );
    }

    #[tokio::test]
    async fn concurrent_clients_get_whole_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let config = server_config(dir.path());
        let state = Arc::new(SharedStateCell::new());
        let (_tx, _handle) = start(&config, state.clone()).await;

        let before = "{\"application\": \"unknown\"}".to_string();
        let after = "{\"application\": \"Notes\", \"metadata\": \"Untitled\"}".to_string();

        let clients: Vec<_> = (0..32)
            .map(|i| {
                let path = config.socket_path.clone();
                let state = state.clone();
                tokio::spawn(async move {
                    if i == 16 {
                        state.replace(
                            WindowInfo::new("Notes")
                                .with_attributes(WindowAttributes::absent().with_title("Untitled")),
                        );
                    }
                    query(&path, QUERY_TIMEOUT).await.unwrap()
                })
            })
            .collect();

        for client in clients {
            let line = client.await.unwrap();
            assert!(line == before || line == after, "неожиданный ответ: {}", line);
        }
        assert_eq!(query(&config.socket_path, QUERY_TIMEOUT).await.unwrap(), after);
    }

    #[tokio::test]
    async fn replaces_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = server_config(dir.path());
        fs::write(&config.socket_path, b"leftover").unwrap();

        let (_tx, _handle) = start(&config, Arc::new(SharedStateCell::new())).await;
        assert!(query(&config.socket_path, QUERY_TIMEOUT).await.is_ok());
    }

    #[tokio::test]
    async fn refuses_socket_owned_by_live_server() {
        let dir = tempfile::tempdir().unwrap();
        let config = server_config(dir.path());
        let (_tx, _handle) = start(&config, Arc::new(SharedStateCell::new())).await;

        let err = IpcServer::bind(&config, Arc::new(SharedStateCell::new()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppDetectError::SocketInUse { .. }));

        // Первый сервер продолжает работать
        assert!(query(&config.socket_path, QUERY_TIMEOUT).await.is_ok());
    }

    #[tokio::test]
    async fn bind_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = server_config(dir.path());
        config.socket_path = dir.path().join("missing").join("appdetect.sock");

        let err = IpcServer::bind(&config, Arc::new(SharedStateCell::new()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppDetectError::Bind { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn accept_error_pauses_before_next_accept() {
        let started = tokio::time::Instant::now();
        accept_error_backoff(&std::io::Error::from_raw_os_error(24)).await;
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn shutdown_removes_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = server_config(dir.path());
        let (tx, handle) = start(&config, Arc::new(SharedStateCell::new())).await;

        assert!(config.socket_path.exists());
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
        assert!(!config.socket_path.exists());
    }
}
