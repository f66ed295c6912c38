pub mod window;

pub use window::{FocusEvent, WindowAttributes, WindowInfo, UNKNOWN_APPLICATION};
