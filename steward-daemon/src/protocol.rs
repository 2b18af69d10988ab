//! Newline-delimited JSON protocol over the daemon's unix socket.
//!
//! One request per line, one response per line. Requests are a closed
//! command set; anything else fails deserialization on the daemon side and
//! gets an error response instead of silently doing nothing.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use steward_engine::PassReport;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// How long `request_status` keeps retrying while a just-launched daemon
/// binds its socket.
const STATUS_RETRIES: u32 = 5;
const STATUS_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A daemon command; `{"cmd": "status"}` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum DaemonRequest {
    Status,
    Run,
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// The payload, with a daemon-reported failure surfaced as an error.
    pub fn into_data(self) -> Result<Value, DaemonError> {
        if self.ok {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(DaemonError::Protocol(self.error.unwrap_or_else(|| {
                "unknown daemon error".to_string()
            })))
        }
    }
}

/// Send one command to the daemon socket and read back one response.
pub fn send_request(home: &Path, request: DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    let mut stream = connect(&socket)?;

    let mut line = serde_json::to_string(&request)?;
    line.push('\n');
    stream
        .write_all(line.as_bytes())
        .and_then(|()| stream.flush())
        .map_err(|e| io_err(&socket, e))?;

    let mut reply = String::new();
    let read = BufReader::new(stream)
        .read_line(&mut reply)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }
    Ok(serde_json::from_str(reply.trim_end())?)
}

/// Daemon status payload, retrying briefly so `daemon status` right after
/// `daemon start` does not race the socket bind.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let mut attempts_left = STATUS_RETRIES;
    loop {
        match send_request(home, DaemonRequest::Status) {
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                attempts_left -= 1;
                if attempts_left == 0 {
                    return Err(err);
                }
                sleep(STATUS_RETRY_DELAY);
            }
            other => return other?.into_data(),
        }
    }
}

/// Request graceful shutdown.
pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    send_request(home, DaemonRequest::Stop)?
        .into_data()
        .map(|_| ())
}

/// Ask the daemon to run one reconciliation pass now and return its report.
pub fn request_run(home: &Path) -> Result<PassReport, DaemonError> {
    let data = send_request(home, DaemonRequest::Run)?.into_data()?;
    Ok(serde_json::from_value(data)?)
}

fn connect(socket: &Path) -> Result<UnixStream, DaemonError> {
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        });
    }
    UnixStream::connect(socket).map_err(|err| match err.kind() {
        // Socket file left behind by a dead daemon.
        ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
            DaemonError::DaemonNotRunning {
                socket: socket.to_path_buf(),
            }
        }
        _ => io_err(socket, err),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_keep_the_cmd_wire_shape() {
        assert_eq!(
            serde_json::to_string(&DaemonRequest::Status).unwrap(),
            r#"{"cmd":"status"}"#
        );
        let parsed: DaemonRequest = serde_json::from_str(r#"{"cmd":"run"}"#).unwrap();
        assert_eq!(parsed, DaemonRequest::Run);
        assert!(serde_json::from_str::<DaemonRequest>(r#"{"cmd":"reboot"}"#).is_err());
    }

    #[test]
    fn response_into_data_maps_failures() {
        let data = DaemonResponse::ok(json!({"x": 1})).into_data().unwrap();
        assert_eq!(data["x"], 1);

        let err = DaemonResponse::error("boom").into_data().unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn run_response_payload_parses_into_a_report() {
        let payload = json!({
            "started_at": "2026-08-30T12:00:00Z",
            "duration_ms": 3,
            "processed": 1,
            "created": 1,
            "updated": 0,
            "unchanged": 0,
            "deleted": 0,
            "failed": 0,
            "deferred": 0,
            "transitions": [],
        });
        let report: PassReport = serde_json::from_value(payload).unwrap();
        assert_eq!(report.created, 1);
        assert!(report.transitions.is_empty());
    }
}
