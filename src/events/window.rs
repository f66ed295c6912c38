use std::fmt;
use std::sync::Arc;

/// Имя приложения, пока ни одного события фокуса ещё не было
pub const UNKNOWN_APPLICATION: &str = "unknown";

/// Снимок приложения в фокусе.
///
/// Never edited in place: every focus change builds a new value and the
/// state cell swaps it in whole.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowInfo {
    pub application_name: Arc<str>,
    pub title: Option<Arc<str>>,
    pub document: Option<Arc<str>>,
}

impl WindowInfo {
    pub fn new(application_name: impl Into<Arc<str>>) -> Self {
        Self {
            application_name: application_name.into(),
            title: None,
            document: None,
        }
    }

    /// Sentinel served before the first focus event arrives.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_APPLICATION)
    }

    pub fn with_attributes(mut self, attributes: WindowAttributes) -> Self {
        self.title = attributes.title.map(Arc::from);
        self.document = attributes.document.map(Arc::from);
        self
    }

    pub fn is_unknown(&self) -> bool {
        &*self.application_name == UNKNOWN_APPLICATION && self.title.is_none()
    }
}

impl Default for WindowInfo {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for WindowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.title {
            Some(title) => write!(f, "{} \"{}\"", self.application_name, title),
            None => write!(f, "{}", self.application_name),
        }
    }
}

/// Атрибуты окна в фокусе; отсутствие поля = ОС его не отдала.
/// Пустая строка - это значение, а не отсутствие.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowAttributes {
    pub title: Option<String>,
    pub document: Option<String>,
}

impl WindowAttributes {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }
}

/// Событие смены приложения в фокусе, как его доставила ОС
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusEvent {
    pub pid: Option<u32>,
    pub app_name: Option<String>,
    pub timestamp: std::time::Instant,
}

impl FocusEvent {
    pub fn new(pid: Option<u32>, app_name: Option<String>) -> Self {
        Self {
            pid,
            app_name: app_name.filter(|name| !name.trim().is_empty()),
            timestamp: std::time::Instant::now(),
        }
    }

    pub fn for_pid(pid: u32) -> Self {
        Self::new(Some(pid), None)
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.app_name = Some(name);
        }
        self
    }
}

impl fmt::Display for FocusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pid={} app={} ({}ms ago)",
            self.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            self.app_name.as_deref().unwrap_or("-"),
            self.timestamp.elapsed().as_millis()
        )
    }
}
