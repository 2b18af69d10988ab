use std::path::{Path, PathBuf};

use steward_core::paths::run_dir;

pub const DAEMON_LABEL: &str = "dev.steward.daemon";
pub const DAEMON_SOCKET: &str = "steward.sock";

pub fn socket_path(home: &Path) -> PathBuf {
    run_dir(home).join(DAEMON_SOCKET)
}
