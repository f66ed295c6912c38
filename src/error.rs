use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppDetectError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Сокет {} уже обслуживается другим процессом", .path.display())]
    SocketInUse { path: PathBuf },

    #[error("Не удалось открыть сокет {}: {source}", .path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Сервис недоступен: {0}")]
    ServiceUnavailable(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl AppDetectError {
    pub fn bind(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppDetectError::Bind {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppDetectError>;

// Удобный макрос для создания ошибок
#[macro_export]
macro_rules! appdetect_error {
    (service_unavailable, $($arg:tt)*) => {
        $crate::error::AppDetectError::ServiceUnavailable(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::AppDetectError::Internal(format!($($arg)*))
    };
}
