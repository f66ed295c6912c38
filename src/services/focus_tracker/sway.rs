use crate::appdetect_error;
use crate::error::Result;
use crate::events::{FocusEvent, WindowAttributes};
use crate::utils::process::{command_output, process_name};
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::r#trait::{FocusSource, WindowIntrospector};

/// Узел дерева sway (`get_tree`) или контейнер из события `window`
#[derive(Debug, Clone, Default, Deserialize)]
struct SwayNode {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    focused: bool,
    #[serde(default)]
    pid: Option<u32>,
    #[serde(default)]
    app_id: Option<String>,
    #[serde(default)]
    window_properties: Option<WindowProperties>,
    #[serde(default)]
    nodes: Vec<SwayNode>,
    #[serde(default)]
    floating_nodes: Vec<SwayNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WindowProperties {
    #[serde(default)]
    class: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SwayWindowEvent {
    change: String,
    container: SwayNode,
}

impl SwayNode {
    /// Native Wayland clients report `app_id`, XWayland ones a WM class.
    fn app_name(&self) -> Option<String> {
        self.app_id
            .clone()
            .or_else(|| self.window_properties.as_ref().and_then(|p| p.class.clone()))
            .filter(|name| !name.is_empty())
    }

    fn find_focused(&self) -> Option<&SwayNode> {
        if self.focused {
            return Some(self);
        }
        self.nodes
            .iter()
            .chain(self.floating_nodes.iter())
            .find_map(SwayNode::find_focused)
    }

    fn to_focus_event(&self) -> FocusEvent {
        FocusEvent::new(self.pid, self.app_name())
    }
}

fn parse_window_event(line: &str) -> Option<FocusEvent> {
    let event: SwayWindowEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            trace!("Не удалось разобрать событие sway: {}", e);
            return None;
        }
    };

    if event.change != "focus" {
        return None;
    }

    Some(event.container.to_focus_event())
}

fn parse_tree(json: &str) -> Option<SwayNode> {
    serde_json::from_str(json).ok()
}

async fn focused_node() -> Option<SwayNode> {
    let tree = command_output("swaymsg", &["-t", "get_tree", "-r"]).await.ok()?;
    let root = parse_tree(&tree)?;
    root.find_focused().cloned()
}

/// Event-driven source: `swaymsg -t subscribe -m '["window"]'`.
#[derive(Default)]
pub struct SwayFocusSource {
    child: Option<Child>,
}

impl SwayFocusSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl FocusSource for SwayFocusSource {
    fn name(&self) -> &'static str {
        "sway"
    }

    async fn register(&mut self) -> Result<()> {
        let child = Command::new("swaymsg")
            .args(["-t", "subscribe", "-m", "[\"window\"]"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| appdetect_error!(service_unavailable, "swaymsg не запускается: {}", e))?;

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
            .ok_or_else(|| appdetect_error!(internal, "stdout swaymsg недоступен"))?;

        // Подписка не присылает текущее состояние, берём его из дерева
        if let Some(node) = focused_node().await {
            if sink.send(node.to_focus_event()).is_err() {
                return Ok(());
            }
        }

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(event) = parse_window_event(&line) {
                debug!("sway: смена фокуса {}", event);
                if sink.send(event).is_err() {
                    return Ok(());
                }
            }
        }

        let status = child.wait().await?;
        Err(appdetect_error!(service_unavailable, "swaymsg subscribe завершился: {}", status))
    }
}

#[derive(Default)]
pub struct SwayIntrospector;

impl SwayIntrospector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl WindowIntrospector for SwayIntrospector {
    async fn display_name(&self, pid: u32) -> Option<String> {
        process_name(pid).await
    }

    async fn window_attributes(&self, pid: u32) -> WindowAttributes {
        let Some(node) = focused_node().await else {
            return WindowAttributes::absent();
        };

        // Фокус мог уже уйти к другому процессу
        if node.pid != Some(pid) {
            return WindowAttributes::absent();
        }

        match node.name {
            Some(title) => WindowAttributes::absent().with_title(title),
            None => WindowAttributes::absent(),
        }
    }
}
