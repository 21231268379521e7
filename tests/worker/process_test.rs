//! Integration tests for worker process supervision.
//!
//! These tests run the `mock_worker` binary as the worker.

use std::time::{Duration, Instant};

use jmxlink::worker::{probe, FramedChannel, JmxConnectionError, WorkerProcess, WorkerSettings};
use tokio_util::sync::CancellationToken;

fn mock(mode: &str) -> WorkerSettings {
    WorkerSettings::with_path(env!("CARGO_BIN_EXE_mock_worker")).with_args(["--mode", mode])
}

#[tokio::test]
async fn test_running_worker_is_healthy() {
    let mut process = WorkerProcess::start(&mock("silent")).await.unwrap();

    assert!(process.is_running());
    assert!(process.error().is_ok());
    assert!(process.pid().is_some());

    process.terminate();
}

#[tokio::test]
async fn test_crash_on_start_captures_stderr() {
    let mut process = WorkerProcess::start(&mock("crash-on-start")).await.unwrap();

    let err = process.wait_exit(Duration::from_secs(5)).await.unwrap_err();
    assert!(err.is_connection_error());

    let message = err.to_string();
    assert!(message.contains("exit status: 3"), "{message}");
    assert!(message.contains("could not start the JVM"), "{message}");
    assert!(!message.contains('\n'), "{message}");

    assert!(process.stderr_contents().contains("IllegalStateException"));
    assert!(!process.is_running());
}

#[tokio::test]
async fn test_health_signal_fires_once() {
    let mut process = WorkerProcess::start(&mock("exit-clean")).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), process.health_signal().recv())
        .await
        .unwrap();
    assert_eq!(first, Some(Ok(())));

    let second = tokio::time::timeout(Duration::from_millis(200), process.health_signal().recv())
        .await
        .unwrap();
    assert_eq!(second, None);

    let err = process.error().unwrap_err();
    assert_eq!(
        err.as_connection_error(),
        Some(&JmxConnectionError::not_running())
    );
}

#[tokio::test]
async fn test_terminate_is_idempotent() {
    let mut process = WorkerProcess::start(&mock("silent")).await.unwrap();

    process.terminate();
    process.terminate();

    // Killed by a signal, so the exit is not clean.
    let result = process.wait_exit(Duration::from_secs(5)).await;
    assert!(result.is_err());
    assert!(!process.is_running());

    process.terminate();
    assert!(process.error().is_err());
}

#[tokio::test]
async fn test_wait_exit_timeout_kills_worker() {
    let mut process = WorkerProcess::start(&mock("silent")).await.unwrap();

    let started = Instant::now();
    let err = process
        .wait_exit(Duration::from_millis(500))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("timeout exceeded"));
    // The silent worker logs its startup line before going quiet.
    assert!(err.to_string().contains("mock worker started"));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!process.is_running());
}

#[tokio::test]
async fn test_ping_silent_worker_times_out() {
    let mut process = WorkerProcess::start(&mock("silent")).await.unwrap();
    let (stdin, stdout) = process.take_streams().unwrap();
    assert!(process.take_streams().is_none());
    let mut channel = FramedChannel::open(stdin, stdout);

    let started = Instant::now();
    let err = probe::ping(
        &mut channel,
        process.health_signal(),
        Duration::from_millis(300),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(
        err.as_connection_error(),
        Some(&JmxConnectionError::ping_timeout())
    );
    assert!(started.elapsed() < Duration::from_millis(300 + 1000));
    process.terminate();
}

#[tokio::test]
async fn test_ping_normal_worker() {
    let mut process = WorkerProcess::start(&mock("normal")).await.unwrap();
    let (stdin, stdout) = process.take_streams().unwrap();
    let mut channel = FramedChannel::open(stdin, stdout);

    let version = probe::ping(
        &mut channel,
        process.health_signal(),
        Duration::from_secs(10),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(version, env!("CARGO_PKG_VERSION"));

    // Closing stdin makes the worker exit cleanly.
    drop(channel);
    process.wait_exit(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_ping_crashed_worker_does_not_hang() {
    let mut process = WorkerProcess::start(&mock("crash-on-start")).await.unwrap();
    let (stdin, stdout) = process.take_streams().unwrap();
    let mut channel = FramedChannel::open(stdin, stdout);

    let started = Instant::now();
    let err = probe::ping(
        &mut channel,
        process.health_signal(),
        Duration::from_secs(10),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(err.is_connection_error());
    assert!(err.to_string().contains("exit status: 3"));
    assert!(started.elapsed() < Duration::from_secs(5));
}
