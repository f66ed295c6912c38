use crate::error::{AppDetectError, Result};
use sysinfo::{Pid as SysinfoPid, ProcessesToUpdate, System};
use tokio::process::Command;
use tracing::trace;

/// Имя процесса по pid через sysinfo (в отдельном blocking-потоке)
pub async fn process_name(pid: u32) -> Option<String> {
    tokio::task::spawn_blocking(move || {
        let mut system = System::new();
        let pid_obj = SysinfoPid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid_obj]), true);
        system
            .process(pid_obj)
            .map(|process| process.name().to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
    })
    .await
    .ok()
    .flatten()
}

/// Run a helper tool to completion and return its stdout.
pub async fn command_output(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| AppDetectError::ServiceUnavailable(format!("{} не найден: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        trace!("{} {:?} вернул ошибку: {}", program, args, stderr.trim());
        return Err(AppDetectError::Internal(format!(
            "{} вернул код {}",
            program, output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
