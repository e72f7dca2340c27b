use std::path::{Path, PathBuf};

pub use coinbridge_core::config::{bridge_root, database_path, run_dir};

pub const CONTROL_SOCKET: &str = "control.sock";

pub fn control_socket_path(home: &Path) -> PathBuf {
    run_dir(home).join(CONTROL_SOCKET)
}
