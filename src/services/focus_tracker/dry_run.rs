use crate::error::Result;
use crate::events::{FocusEvent, WindowAttributes};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::info;

use super::r#trait::{FocusSource, WindowIntrospector};

/// Фиктивные приложения: (pid, имя, заголовок, документ)
const FAKE_APPS: &[(u32, &str, Option<&str>, Option<&str>)] = &[
    (1001, "Terminal", Some("~ - zsh"), None),
    (1002, "Notes", Some("Untitled"), Some("Untitled.txt")),
    (1003, "Browser", Some("The Rust Programming Language"), None),
    // Finder "отказывает" в доступе к атрибутам
    (1004, "Finder", None, None),
];

pub struct DryRunFocusSource {
    period: Duration,
}

impl DryRunFocusSource {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

#[async_trait::async_trait]
impl FocusSource for DryRunFocusSource {
    fn name(&self) -> &'static str {
        "dry_run"
    }

    async fn register(&mut self) -> Result<()> {
        info!("Dry-run режим - события фокуса эмулируются каждые {:?}", self.period);
        Ok(())
    }

    async fn run(self: Box<Self>, sink: mpsc::UnboundedSender<FocusEvent>) -> Result<()> {
        let mut interval = interval(self.period);

        for (pid, name, _, _) in FAKE_APPS.iter().cycle() {
            interval.tick().await;

            info!("Dry-run: эмулируем фокус на {}", name);
            if sink.send(FocusEvent::for_pid(*pid).with_app_name(*name)).is_err() {
                break;
            }
        }

        Ok(())
    }
}

pub struct DryRunIntrospector;

#[async_trait::async_trait]
impl WindowIntrospector for DryRunIntrospector {
    async fn display_name(&self, pid: u32) -> Option<String> {
        FAKE_APPS
            .iter()
            .find(|(p, ..)| *p == pid)
            .map(|(_, name, ..)| name.to_string())
    }

    async fn window_attributes(&self, pid: u32) -> WindowAttributes {
        let Some((_, _, title, document)) = FAKE_APPS.iter().find(|(p, ..)| *p == pid) else {
            return WindowAttributes::absent();
        };

        let mut attributes = WindowAttributes::absent();
        if let Some(title) = title {
            attributes = attributes.with_title(*title);
        }
        if let Some(document) = document {
            attributes = attributes.with_document(*document);
        }
        attributes
    }
}
