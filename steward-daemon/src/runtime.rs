use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::MissedTickBehavior;

use steward_core::config::ReconcileConfig;
use steward_core::paths::{deploy_dir, run_dir, state_dir};
use steward_core::plugin::PluginRegistry;
use steward_core::source::FsContentSource;
use steward_engine::{run_pass, DeferralBook, PassReport, TracingRecorder};
use steward_manifest::default_registry_at;

use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, DAEMON_LABEL};
use crate::watcher::ChangeWatcher;

pub type SharedReport = Arc<RwLock<Option<PassReport>>>;

struct PassJob {
    respond_to: oneshot::Sender<Result<PassReport, String>>,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let config = ReconcileConfig::load_at(&home)?;
    let registry_root = config.registry_root_at(&home);
    ensure_runtime_dirs(&home, &registry_root)?;

    let registry = default_registry_at(&home, &config);
    let last_report: SharedReport = Arc::new(RwLock::new(None));
    let started_at_unix = unix_seconds_now();

    let (pass_tx, pass_rx) = mpsc::channel::<PassJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let registry = registry.clone();
        let registry_root = registry_root.clone();
        let config = config.clone();
        let last_report = last_report.clone();
        tokio::spawn(async move {
            let result = scheduler_task(
                registry,
                registry_root,
                config,
                last_report,
                pass_rx,
                shutdown.subscribe(),
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let registry_root = registry_root.clone();
        let last_report = last_report.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                registry_root,
                last_report,
                pass_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (scheduler_result, socket_result, signal_result) =
        tokio::join!(scheduler_handle, socket_handle, signal_handle);

    handle_join("scheduler", scheduler_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Single-flight pass scheduler: owns the watcher and the deferral book, so
/// at most one pass runs at a time and manual runs share the same budget
/// state as interval runs.
async fn scheduler_task(
    registry: PluginRegistry,
    registry_root: PathBuf,
    config: ReconcileConfig,
    last_report: SharedReport,
    mut pass_rx: mpsc::Receiver<PassJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut watcher = ChangeWatcher::new();
    watcher.start(&registry_root)?;

    let mut book = DeferralBook::new();
    let mut interval = tokio::time::interval(config.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Deferred artefacts keep the scheduler ticking even without file
    // events; starts true so the first tick reconciles whatever is already
    // on disk.
    let mut pending = true;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = pass_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let outcome = execute_pass(
                    &registry,
                    &registry_root,
                    &config,
                    &watcher,
                    &mut book,
                    &last_report,
                )
                .await;
                if let Ok(report) = &outcome {
                    pending = report.has_pending();
                }
                let _ = job.respond_to.send(outcome.map_err(|e| e.to_string()));
            }
            _ = interval.tick() => {
                if !watcher.is_dirty() && !pending {
                    continue;
                }
                match execute_pass(
                    &registry,
                    &registry_root,
                    &config,
                    &watcher,
                    &mut book,
                    &last_report,
                )
                .await
                {
                    Ok(report) => pending = report.has_pending(),
                    Err(err) => {
                        tracing::error!(error = %err, "scheduled reconciliation pass failed");
                    }
                }
            }
        }
    }

    Ok(())
}

async fn execute_pass(
    registry: &PluginRegistry,
    registry_root: &Path,
    config: &ReconcileConfig,
    watcher: &ChangeWatcher,
    book: &mut DeferralBook,
    last_report: &SharedReport,
) -> Result<PassReport, DaemonError> {
    // Clear before, not after: events arriving mid-pass re-dirty the flag
    // and schedule a follow-up rather than being lost.
    watcher.clear();

    let registry = registry.clone();
    let config = config.clone();
    let source = FsContentSource::new(registry_root);
    let taken = std::mem::take(book);

    let (returned, outcome) = tokio::task::spawn_blocking(move || {
        let mut book = taken;
        let mut recorder = TracingRecorder;
        let outcome = run_pass(&registry, &source, &config, &mut book, &mut recorder);
        (book, outcome)
    })
    .await
    .map_err(|err| DaemonError::Protocol(format!("pass task join error: {err}")))?;
    *book = returned;

    match outcome {
        Ok(report) => {
            tracing::info!(
                processed = report.processed,
                created = report.created,
                updated = report.updated,
                deleted = report.deleted,
                failed = report.failed,
                deferred = report.deferred,
                duration_ms = report.duration_ms,
                "reconciliation pass completed",
            );
            *last_report.write().await = Some(report.clone());
            Ok(report)
        }
        Err(err) => {
            // Nothing settled this pass; re-arm so the next tick retries.
            watcher.force();
            Err(err.into())
        }
    }
}

async fn socket_server_task(
    home: PathBuf,
    registry_root: PathBuf,
    last_report: SharedReport,
    pass_tx: mpsc::Sender<PassJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let run = run_dir(&home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let registry_root = registry_root.clone();
                let last_report = last_report.clone();
                let pass_tx = pass_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        registry_root,
                        last_report,
                        pass_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    registry_root: PathBuf,
    last_report: SharedReport,
    pass_tx: mpsc::Sender<PassJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    use crate::protocol::{DaemonRequest, DaemonResponse};

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request {
            DaemonRequest::Status => {
                let payload = build_status_payload(
                    &home,
                    &registry_root,
                    last_report.clone(),
                    started_at_unix,
                )
                .await;
                DaemonResponse::ok(payload)
            }
            DaemonRequest::Run => match enqueue_pass(&pass_tx).await {
                Ok(report) => match serde_json::to_value(&report) {
                    Ok(value) => DaemonResponse::ok(value),
                    Err(err) => DaemonResponse::error(err.to_string()),
                },
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            DaemonRequest::Stop => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
        };

        write_response(&mut writer, &response).await?;
        if request == DaemonRequest::Stop {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(
    home: &Path,
    registry_root: &Path,
    last_report: SharedReport,
    started_at_unix: u64,
) -> Value {
    let last_pass = {
        let report = last_report.read().await;
        report
            .as_ref()
            .and_then(|r| serde_json::to_value(r).ok())
            .unwrap_or(Value::Null)
    };

    json!({
        "running": true,
        "label": DAEMON_LABEL,
        "started_at_unix": started_at_unix,
        "registry_root": registry_root.display().to_string(),
        "socket": socket_path(home).display().to_string(),
        "last_pass": last_pass,
    })
}

async fn enqueue_pass(pass_tx: &mpsc::Sender<PassJob>) -> Result<PassReport, DaemonError> {
    let (tx, rx) = oneshot::channel();
    pass_tx
        .send(PassJob { respond_to: tx })
        .await
        .map_err(|_| DaemonError::ChannelClosed("pass queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("pass response"))?;
    outcome.map_err(DaemonError::Protocol)
}

fn ensure_runtime_dirs(home: &Path, registry_root: &Path) -> Result<(), DaemonError> {
    for dir in [
        registry_root.to_path_buf(),
        state_dir(home),
        deploy_dir(home),
        run_dir(home),
    ] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &crate::protocol::DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DaemonRequest, DaemonResponse};
    use tempfile::TempDir;
    use tokio::sync::{broadcast, mpsc};

    fn write_manifest(root: &Path, name: &str, yaml: &str) {
        let dir = root.join("manifest");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{name}.manifest")), yaml).unwrap();
    }

    #[tokio::test]
    async fn execute_pass_reconciles_the_registry_tree() {
        let home = TempDir::new().unwrap();
        let config = ReconcileConfig::default();
        let registry_root = config.registry_root_at(home.path());
        ensure_runtime_dirs(home.path(), &registry_root).unwrap();
        write_manifest(&registry_root, "gateway", "name: gateway\nspec:\n  port: 8080\n");

        let registry = default_registry_at(home.path(), &config);
        let watcher = ChangeWatcher::new();
        let mut book = DeferralBook::new();
        let last_report: SharedReport = Arc::new(RwLock::new(None));

        let report = execute_pass(
            &registry,
            &registry_root,
            &config,
            &watcher,
            &mut book,
            &last_report,
        )
        .await
        .unwrap();

        assert_eq!(report.created, 1);
        assert!(!watcher.is_dirty(), "flag cleared at pass start");
        assert!(last_report.read().await.is_some());
        assert!(home
            .path()
            .join(".steward/deploy/manifest/gateway.json")
            .exists());
    }

    #[tokio::test]
    async fn second_execute_pass_is_quiet() {
        let home = TempDir::new().unwrap();
        let config = ReconcileConfig::default();
        let registry_root = config.registry_root_at(home.path());
        ensure_runtime_dirs(home.path(), &registry_root).unwrap();
        write_manifest(&registry_root, "gateway", "name: gateway\n");

        let registry = default_registry_at(home.path(), &config);
        let watcher = ChangeWatcher::new();
        let mut book = DeferralBook::new();
        let last_report: SharedReport = Arc::new(RwLock::new(None));

        execute_pass(&registry, &registry_root, &config, &watcher, &mut book, &last_report)
            .await
            .unwrap();
        let report = execute_pass(
            &registry,
            &registry_root,
            &config,
            &watcher,
            &mut book,
            &last_report,
        )
        .await
        .unwrap();
        assert!(report.is_quiet());
        assert_eq!(report.unchanged, 1);
    }

    #[tokio::test]
    async fn socket_protocol_status_and_stop_over_in_memory_channels() {
        let (request_tx, mut request_rx) = mpsc::channel::<Vec<u8>>(8);
        let (response_tx, mut response_rx) = mpsc::channel::<Vec<u8>>(8);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        tokio::spawn(async move {
            while let Some(bytes) = request_rx.recv().await {
                let line = String::from_utf8(bytes).expect("utf8");
                let request: DaemonRequest = serde_json::from_str(line.trim()).expect("request");
                let response = match request {
                    DaemonRequest::Status => DaemonResponse::ok(json!({"running": true})),
                    DaemonRequest::Stop => {
                        let _ = shutdown_tx.send(());
                        DaemonResponse::ok(json!({"stopping": true}))
                    }
                    DaemonRequest::Run => DaemonResponse::error("no scheduler in this test"),
                };
                let encoded = serde_json::to_vec(&response).expect("encode response");
                if response_tx.send(encoded).await.is_err() {
                    break;
                }
            }
        });

        request_tx
            .send(br#"{"cmd":"status"}"#.to_vec())
            .await
            .expect("send status request");
        let status_response = response_rx.recv().await.expect("status response");
        let status_json: serde_json::Value =
            serde_json::from_slice(&status_response).expect("decode status");
        assert_eq!(status_json["ok"], serde_json::Value::Bool(true));

        request_tx
            .send(br#"{"cmd":"stop"}"#.to_vec())
            .await
            .expect("send stop request");
        let stop_response = response_rx.recv().await.expect("stop response");
        let stop_json: serde_json::Value =
            serde_json::from_slice(&stop_response).expect("decode stop");
        assert_eq!(stop_json["ok"], serde_json::Value::Bool(true));

        shutdown_rx.recv().await.expect("shutdown signal");
    }

    #[tokio::test]
    async fn status_payload_before_first_pass() {
        let home = TempDir::new().unwrap();
        let last_report: SharedReport = Arc::new(RwLock::new(None));
        let payload = build_status_payload(
            home.path(),
            &home.path().join("registry"),
            last_report,
            1_000_000,
        )
        .await;

        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["label"], json!(DAEMON_LABEL));
        assert_eq!(payload["started_at_unix"], json!(1_000_000u64));
        assert_eq!(payload["last_pass"], Value::Null);
    }
}
