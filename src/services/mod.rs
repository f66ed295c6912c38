pub mod client;
pub mod focus_tracker;
pub mod ipc_server;
pub mod state_cell;
pub mod wire;

pub use focus_tracker::{create_focus_backend, FocusTracker};
pub use ipc_server::IpcServer;
pub use state_cell::SharedStateCell;
