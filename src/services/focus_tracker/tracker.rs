use crate::error::Result;
use crate::events::{FocusEvent, WindowAttributes, WindowInfo, UNKNOWN_APPLICATION};
use crate::services::state_cell::SharedStateCell;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::r#trait::{FocusBackend, WindowIntrospector};

/// Single writer of `SharedStateCell`.
///
/// Events are applied one at a time in the order the source delivered them;
/// per-event work is never fanned out, so A-then-B can't be observed as B-then-A.
pub struct FocusTracker {
    state: Arc<SharedStateCell>,
    introspector: Arc<dyn WindowIntrospector>,
}

/// Задачи подписки и обработки событий
pub struct TrackerHandle {
    source: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

impl TrackerHandle {
    pub fn abort(&self) {
        self.source.abort();
        self.consumer.abort();
    }
}

impl FocusTracker {
    pub fn new(state: Arc<SharedStateCell>, introspector: Arc<dyn WindowIntrospector>) -> Self {
        Self { state, introspector }
    }

    /// Registers the subscription, then spawns the source and the consumer.
    ///
    /// Returns only after `register` completed, so callers can start serving
    /// knowing that focus changes from now on reach the cell.
    pub async fn start(backend: FocusBackend, state: Arc<SharedStateCell>) -> Result<TrackerHandle> {
        let FocusBackend {
            mut source,
            introspector,
        } = backend;

        let source_name = source.name();
        source.register().await?;
        info!("Подписка на смену фокуса активна ({})", source_name);

        let (tx, rx) = mpsc::unbounded_channel();

        let source = tokio::spawn(async move {
            match source.run(tx).await {
                Ok(()) => info!("Источник событий фокуса {} завершился", source_name),
                Err(e) => error!("Источник событий фокуса {} остановлен: {}", source_name, e),
            }
        });

        let tracker = FocusTracker::new(state, introspector);
        let consumer = tokio::spawn(tracker.run(rx));

        Ok(TrackerHandle { source, consumer })
    }

    pub async fn run(self, mut events: mpsc::UnboundedReceiver<FocusEvent>) {
        while let Some(event) = events.recv().await {
            self.apply(event).await;
        }
        warn!("Канал событий фокуса закрыт, последний снимок остаётся актуальным");
    }

    /// Build a fresh snapshot for `event` and swap it in. Returns the new generation.
    pub async fn apply(&self, event: FocusEvent) -> u64 {
        trace!("Событие фокуса: {}", event);

        let name = match (event.app_name, event.pid) {
            (Some(name), _) => name,
            (None, Some(pid)) => self
                .introspector
                .display_name(pid)
                .await
                .unwrap_or_else(|| UNKNOWN_APPLICATION.to_string()),
            (None, None) => UNKNOWN_APPLICATION.to_string(),
        };

        let attributes = match event.pid {
            Some(pid) => self.introspector.window_attributes(pid).await,
            None => WindowAttributes::absent(),
        };

        if attributes.title.is_none() {
            trace!("Заголовок окна для '{}' недоступен", name);
        }

        let info = WindowInfo::new(name).with_attributes(attributes);
        debug!("Приложение в фокусе: {}", info);

        self.state.replace(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::r#trait::FocusSource;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Introspector with canned answers; pids missing from the table behave
    /// like a permission-denied query.
    #[derive(Default)]
    struct FakeIntrospector {
        names: HashMap<u32, String>,
        attributes: HashMap<u32, WindowAttributes>,
        delays_ms: HashMap<u32, u64>,
    }

    #[async_trait::async_trait]
    impl WindowIntrospector for FakeIntrospector {
        async fn display_name(&self, pid: u32) -> Option<String> {
            self.names.get(&pid).cloned()
        }

        async fn window_attributes(&self, pid: u32) -> WindowAttributes {
            if let Some(ms) = self.delays_ms.get(&pid) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            self.attributes.get(&pid).cloned().unwrap_or_default()
        }
    }

    struct ScriptedSource {
        events: Vec<FocusEvent>,
        registered: Arc<Mutex<bool>>,
    }

    #[async_trait::async_trait]
    impl FocusSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn register(&mut self) -> Result<()> {
            *self.registered.lock() = true;
            Ok(())
        }

        async fn run(self: Box<Self>, sink: mpsc::UnboundedSender<FocusEvent>) -> Result<()> {
            for event in self.events {
                let _ = sink.send(event);
            }
            Ok(())
        }
    }

    fn notes_introspector() -> FakeIntrospector {
        let mut fake = FakeIntrospector::default();
        fake.attributes.insert(
            100,
            WindowAttributes::absent()
                .with_title("Untitled")
                .with_document("Untitled.txt"),
        );
        fake
    }

    #[tokio::test]
    async fn applies_name_title_and_document() {
        let state = Arc::new(SharedStateCell::new());
        let tracker = FocusTracker::new(state.clone(), Arc::new(notes_introspector()));

        tracker.apply(FocusEvent::for_pid(100).with_app_name("Notes")).await;

        let snap = state.snapshot();
        assert_eq!(&*snap.application_name, "Notes");
        assert_eq!(snap.title.as_deref(), Some("Untitled"));
        assert_eq!(snap.document.as_deref(), Some("Untitled.txt"));
    }

    #[tokio::test]
    async fn failed_attribute_query_keeps_application_name() {
        let state = Arc::new(SharedStateCell::new());
        let tracker = FocusTracker::new(state.clone(), Arc::new(FakeIntrospector::default()));

        tracker.apply(FocusEvent::for_pid(200).with_app_name("Finder")).await;

        let snap = state.snapshot();
        assert_eq!(&*snap.application_name, "Finder");
        assert!(snap.title.is_none());
        assert!(snap.document.is_none());
    }

    #[tokio::test]
    async fn name_falls_back_to_introspector_then_unknown() {
        let mut fake = FakeIntrospector::default();
        fake.names.insert(300, "foot".to_string());
        let state = Arc::new(SharedStateCell::new());
        let tracker = FocusTracker::new(state.clone(), Arc::new(fake));

        tracker.apply(FocusEvent::for_pid(300)).await;
        assert_eq!(&*state.snapshot().application_name, "foot");

        tracker.apply(FocusEvent::for_pid(301)).await;
        assert_eq!(&*state.snapshot().application_name, "unknown");

        tracker.apply(FocusEvent::new(None, Some("Dock".to_string()))).await;
        assert_eq!(&*state.snapshot().application_name, "Dock");
        assert_eq!(state.generation(), 3);
    }

    #[tokio::test]
    async fn each_event_is_reflected_in_delivery_order() {
        let mut fake = FakeIntrospector::default();
        for pid in 1..=20u32 {
            fake.attributes
                .insert(pid, WindowAttributes::absent().with_title(format!("title-{}", pid)));
            // Ранние события отвечают медленнее поздних
            fake.delays_ms.insert(pid, u64::from(21 - pid));
        }
        let state = Arc::new(SharedStateCell::new());
        let tracker = FocusTracker::new(state.clone(), Arc::new(fake));

        for pid in 1..=20u32 {
            let generation = tracker
                .apply(FocusEvent::for_pid(pid).with_app_name(format!("app-{}", pid)))
                .await;
            let snap = state.snapshot();
            assert_eq!(generation, u64::from(pid));
            assert_eq!(&*snap.application_name, format!("app-{}", pid));
            assert_eq!(snap.title.as_deref(), Some(format!("title-{}", pid).as_str()));
        }
    }

    #[tokio::test]
    async fn start_registers_before_returning_and_drains_in_order() {
        let registered = Arc::new(Mutex::new(false));
        let events: Vec<FocusEvent> = (1..=50u32)
            .map(|pid| FocusEvent::for_pid(pid).with_app_name(format!("app-{}", pid)))
            .collect();
        let backend = FocusBackend {
            source: Box::new(ScriptedSource {
                events,
                registered: registered.clone(),
            }),
            introspector: Arc::new(FakeIntrospector::default()),
        };
        let state = Arc::new(SharedStateCell::new());

        let handle = FocusTracker::start(backend, state.clone()).await.unwrap();
        assert!(*registered.lock());

        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while state.generation() < 50 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(drained.is_ok());
        assert_eq!(&*state.snapshot().application_name, "app-50");

        handle.abort();
    }
}
