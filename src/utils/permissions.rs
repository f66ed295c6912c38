use std::path::Path;
use tracing::{info, warn};

/// Проверить окружение перед запуском. Ничего не прерывает, только предупреждает.
pub fn check_environment(socket_path: &Path) {
    info!("Проверка окружения...");

    check_display_session();
    check_socket_directory(socket_path);
    check_not_root();

    info!("Проверка окружения завершена");
}

fn check_display_session() {
    let sway = std::env::var_os("SWAYSOCK").is_some();
    let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
    let x11 = std::env::var_os("DISPLAY").is_some();

    match (sway, wayland, x11) {
        (true, _, _) => info!("Обнаружена сессия sway"),
        (false, true, true) => {
            warn!("Wayland без sway: через XWayland будут видны только X11-окна")
        }
        (false, true, false) => warn!("Wayland-композитор не поддерживается, фокус отслеживаться не будет"),
        (false, false, true) => info!("Обнаружена X11-сессия"),
        (false, false, false) => {
            warn!("Графическая сессия не найдена (нет SWAYSOCK, WAYLAND_DISPLAY, DISPLAY)");
            warn!("   Сервер будет отдавать {{\"application\": \"unknown\"}}");
        }
    }
}

fn check_socket_directory(socket_path: &Path) {
    let Some(dir) = socket_path.parent().filter(|d| !d.as_os_str().is_empty()) else {
        return;
    };

    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => warn!("{} не является директорией, bind не удастся", dir.display()),
        Err(e) => warn!("Директория сокета {} недоступна: {}", dir.display(), e),
    }
}

fn check_not_root() {
    match std::env::var("USER") {
        Ok(user) if user == "root" => {
            warn!("⚠️  Приложение запущено от имени root!");
            warn!("   Запросы к оконной системе пойдут в сессию root, а не пользователя");
        }
        Ok(user) => {
            info!("Приложение запущено от имени пользователя: {}", user);
        }
        Err(_) => {
            warn!("Не удалось определить пользователя");
        }
    }
}
