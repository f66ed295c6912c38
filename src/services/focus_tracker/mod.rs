//! FocusTracker service: responsibility and boundaries
//!
//! This module and its submodules subscribe to OS focus-change notifications,
//! ask the window-introspection layer for title/document of the new foreground
//! process, and replace the shared snapshot. They MUST NOT talk to clients;
//! serving snapshots belongs to the IPC server, which only reads the cell.

mod dry_run;
mod sway;
mod tracker;
mod r#trait;
mod x11;

pub use self::r#trait::create_focus_backend;
pub use self::tracker::FocusTracker;
