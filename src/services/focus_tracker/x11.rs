use crate::appdetect_error;
use crate::error::Result;
use crate::events::{FocusEvent, WindowAttributes};
use crate::utils::process::{command_output, process_name};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::r#trait::{FocusSource, WindowIntrospector};

/// Window id from a `_NET_ACTIVE_WINDOW(WINDOW): window id # 0x3a00007` line.
/// `0x0` (nothing focused) maps to `None`.
fn parse_active_window_line(line: &str) -> Option<u64> {
    let (_, id) = line.rsplit_once('#')?;
    let id = id.trim();
    let hex = id.strip_prefix("0x").unwrap_or(id);
    // Иногда xprop печатает список через запятую
    let hex = hex.split(',').next()?.trim();
    match u64::from_str_radix(hex, 16) {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(id),
    }
}

/// `NAME(TYPE) = value` lines of `xprop -id` output; `NAME:  not found.` lines are skipped.
fn parse_properties(output: &str) -> HashMap<&str, &str> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(" = ")?;
            let key = key.split('(').next()?.trim();
            Some((key, value.trim()))
        })
        .collect()
}

/// `"navigator", "firefox"` -> `["navigator", "firefox"]`, honouring `\"` and `\\`.
fn parse_quoted_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', false) => in_quotes = true,
            ('"', true) => {
                items.push(std::mem::take(&mut current));
                in_quotes = false;
            }
            ('\\', true) => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            (c, true) => current.push(c),
            _ => {}
        }
    }

    items
}

#[derive(Debug, Default, PartialEq, Eq)]
struct X11Window {
    pid: Option<u32>,
    class: Option<String>,
    title: Option<String>,
}

fn parse_window(output: &str) -> X11Window {
    let props = parse_properties(output);

    let pid = props.get("_NET_WM_PID").and_then(|v| v.parse().ok());
    // WM_CLASS = "instance", "Class"
    let class = props
        .get("WM_CLASS")
        .map(|v| parse_quoted_list(v))
        .and_then(|mut list| list.pop())
        .filter(|c| !c.is_empty());
    let title = props
        .get("_NET_WM_NAME")
        .or_else(|| props.get("WM_NAME"))
        .and_then(|v| parse_quoted_list(v).into_iter().next());

    X11Window { pid, class, title }
}

async fn query_window(id: u64) -> Result<X11Window> {
    let id = format!("0x{:x}", id);
    let output = command_output(
        "xprop",
        &["-id", &id, "_NET_WM_PID", "WM_CLASS", "_NET_WM_NAME", "WM_NAME"],
    )
    .await?;
    Ok(parse_window(&output))
}

/// Event-driven source: `xprop -spy -root _NET_ACTIVE_WINDOW`.
#[derive(Default)]
pub struct X11FocusSource {
    child: Option<Child>,
}

impl X11FocusSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl FocusSource for X11FocusSource {
    fn name(&self) -> &'static str {
        "x11"
    }

    async fn register(&mut self) -> Result<()> {
        let child = Command::new("xprop")
            .args(["-spy", "-root", "_NET_ACTIVE_WINDOW"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| appdetect_error!(service_unavailable, "xprop не запускается: {}", e))?;

        self.child = Some(child);
        Ok(())
    }

    async fn run(self: Box<Self>, sink: mpsc::UnboundedSender<FocusEvent>) -> Result<()> {
        let Some(mut child) = self.child else {
            return Err(appdetect_error!(internal, "run() до register()"));
        };
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| appdetect_error!(internal, "stdout xprop недоступен"))?;

        // Первая строка от -spy - текущее активное окно
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            let event = match parse_active_window_line(&line) {
                Some(id) => match query_window(id).await {
                    Ok(window) => FocusEvent::new(window.pid, window.class),
                    Err(e) => {
                        trace!("xprop -id 0x{:x}: {}", id, e);
                        FocusEvent::new(None, None)
                    }
                },
                None => FocusEvent::new(None, None),
            };

            debug!("x11: смена фокуса {}", event);
            if sink.send(event).is_err() {
                return Ok(());
            }
        }

        let status = child.wait().await?;
        Err(appdetect_error!(service_unavailable, "xprop -spy завершился: {}", status))
    }
}

#[derive(Default)]
pub struct X11Introspector;

impl X11Introspector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl WindowIntrospector for X11Introspector {
    async fn display_name(&self, pid: u32) -> Option<String> {
        process_name(pid).await
    }

    async fn window_attributes(&self, pid: u32) -> WindowAttributes {
        let Ok(root) = command_output("xprop", &["-root", "_NET_ACTIVE_WINDOW"]).await else {
            return WindowAttributes::absent();
        };
        let Some(id) = parse_active_window_line(&root) else {
            return WindowAttributes::absent();
        };
        let Ok(window) = query_window(id).await else {
            return WindowAttributes::absent();
        };

        if window.pid != Some(pid) {
            return WindowAttributes::absent();
        }

        match window.title {
            Some(title) => WindowAttributes::absent().with_title(title),
            None => WindowAttributes::absent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_active_window_lines() {
        assert_eq!(
            parse_active_window_line("_NET_ACTIVE_WINDOW(WINDOW): window id # 0x3a00007"),
            Some(0x3a00007)
        );
        assert_eq!(parse_active_window_line("_NET_ACTIVE_WINDOW(WINDOW): window id # 0x0"), None);
        assert_eq!(parse_active_window_line("_NET_ACTIVE_WINDOW:  not found."), None);
    }

    #[test]
    fn parses_window_properties() {
        let output = "_NET_WM_PID(CARDINAL) = 4242\n\
                      WM_CLASS(STRING) = \"navigator\", \"firefox\"\n\
                      _NET_WM_NAME(UTF8_STRING) = \"Say \\\"hi\\\" - Mozilla Firefox\"\n";
        let window = parse_window(output);
        assert_eq!(window.pid, Some(4242));
        assert_eq!(window.class.as_deref(), Some("firefox"));
        assert_eq!(window.title.as_deref(), Some("Say \"hi\" - Mozilla Firefox"));
    }

    #[test]
    fn missing_properties_are_absent() {
        let output = "_NET_WM_PID:  not found.\n\
                      WM_CLASS:  not found.\n\
                      _NET_WM_NAME:  not found.\n\
                      WM_NAME(STRING) = \"xterm\"\n";
        let window = parse_window(output);
        assert_eq!(window.pid, None);
        assert_eq!(window.class, None);
        assert_eq!(window.title.as_deref(), Some("xterm"));
    }

    #[test]
    fn default_source_is_not_registered() {
        let source = X11FocusSource::default();
        assert_eq!(source.name(), "x11");
        assert!(source.child.is_none());
    }
}
