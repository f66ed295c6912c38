use crate::config::Config;
use crate::error::{AppDetectError, Result};
use crate::events::{FocusEvent, WindowAttributes};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// OS focus-change notifications.
///
/// `register` must establish the subscription (spawn the watcher, open the
/// stream) so that it is live before the server accepts clients. `run` then
/// forwards events to `sink` in delivery order until the stream ends.
#[async_trait::async_trait]
pub trait FocusSource: Send {
    fn name(&self) -> &'static str;

    async fn register(&mut self) -> Result<()>;

    async fn run(self: Box<Self>, sink: mpsc::UnboundedSender<FocusEvent>) -> Result<()>;
}

/// Window introspection for a process. Best-effort: failures come back as absent fields.
#[async_trait::async_trait]
pub trait WindowIntrospector: Send + Sync {
    async fn display_name(&self, pid: u32) -> Option<String>;

    async fn window_attributes(&self, pid: u32) -> WindowAttributes;
}

pub struct FocusBackend {
    pub source: Box<dyn FocusSource>,
    pub introspector: Arc<dyn WindowIntrospector>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopEnvironment {
    Sway,
    X11,
    Unknown,
}

pub fn detect_desktop_environment() -> DesktopEnvironment {
    if std::env::var_os("SWAYSOCK").is_some() {
        return DesktopEnvironment::Sway;
    }

    if let Ok(desktop) = std::env::var("XDG_CURRENT_DESKTOP") {
        if desktop.to_lowercase().contains("sway") {
            return DesktopEnvironment::Sway;
        }
    }

    // XWayland тоже даёт DISPLAY, но _NET_ACTIVE_WINDOW там видит только X-окна
    if std::env::var_os("DISPLAY").is_some() {
        return DesktopEnvironment::X11;
    }

    DesktopEnvironment::Unknown
}

/// Factory: picks a backend from `tracker.backend`, or the dry-run one when asked.
pub fn create_focus_backend(config: &Config, dry_run: bool) -> Result<FocusBackend> {
    let backend = if dry_run { "dry_run" } else { config.tracker.backend.as_str() };

    let backend = match backend {
        "auto" => match detect_desktop_environment() {
            DesktopEnvironment::Sway => "sway",
            DesktopEnvironment::X11 => "x11",
            DesktopEnvironment::Unknown => {
                return Err(AppDetectError::ServiceUnavailable(
                    "Не удалось определить графическую сессию (нет SWAYSOCK и DISPLAY)".to_string(),
                ))
            }
        },
        other => other,
    };

    info!("Бэкенд отслеживания фокуса: {}", backend);

    match backend {
        "sway" => Ok(FocusBackend {
            source: Box::new(super::sway::SwayFocusSource::new()),
            introspector: Arc::new(super::sway::SwayIntrospector::new()),
        }),
        "x11" => Ok(FocusBackend {
            source: Box::new(super::x11::X11FocusSource::new()),
            introspector: Arc::new(super::x11::X11Introspector::new()),
        }),
        "dry_run" => Ok(FocusBackend {
            source: Box::new(super::dry_run::DryRunFocusSource::new(Duration::from_millis(
                config.tracker.dry_run_interval_ms,
            ))),
            introspector: Arc::new(super::dry_run::DryRunIntrospector),
        }),
        other => Err(AppDetectError::Internal(format!(
            "Неизвестный бэкенд отслеживания фокуса: {}",
            other
        ))),
    }
}
