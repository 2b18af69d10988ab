//! Daemon runtime: change watcher + pass scheduler + socket server.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod watcher;

pub use error::DaemonError;
pub use protocol::{
    request_run, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking, SharedReport};
pub use watcher::ChangeWatcher;
