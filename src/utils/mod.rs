pub mod permissions;
pub mod process;
