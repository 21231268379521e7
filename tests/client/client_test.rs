//! Integration tests for the JMX client against the `mock_worker` binary.

use std::time::{Duration, Instant};

use jmxlink::worker::{ErrorKind, JmxConnectionError};
use jmxlink::{ConnectionConfig, JmxClient, WorkerSettings};

fn mock(mode: &str) -> WorkerSettings {
    WorkerSettings {
        exit_timeout_ms: 2_000,
        ..WorkerSettings::with_path(env!("CARGO_BIN_EXE_mock_worker")).with_args(["--mode", mode])
    }
}

fn local() -> ConnectionConfig {
    ConnectionConfig::new("localhost", 9999).with_credentials("monitor", "secret")
}

async fn open(settings: WorkerSettings) -> JmxClient {
    let mut client = JmxClient::new(settings);
    client.open(&local()).await.unwrap();
    client
}

#[tokio::test]
async fn test_open_and_query_names() {
    let mut client = open(mock("normal")).await;
    assert!(client.is_running());
    assert!(client.pid().is_some());

    assert_eq!(
        client.client_version().await.unwrap(),
        env!("CARGO_PKG_VERSION")
    );

    let names = client.query_mbean_names("java.lang:type=*").await.unwrap();
    assert_eq!(
        names,
        vec!["java.lang:type=Memory", "java.lang:type=OperatingSystem"]
    );

    let attributes = client
        .get_mbean_attribute_names("java.lang:type=Memory")
        .await
        .unwrap();
    assert_eq!(attributes, vec!["ObjectPendingFinalizationCount", "Verbose"]);

    client.close().await.unwrap();
    assert!(!client.is_running());
}

#[tokio::test]
async fn test_domain_error_keeps_worker_alive() {
    let mut client = open(mock("normal")).await;

    let err = client.query_mbean_names("not-a-pattern").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Domain);
    let jmx = err.as_jmx_error().unwrap();
    assert!(jmx.message.contains("not-a-pattern"));
    assert!(!err.to_string().contains('\n'));

    assert!(client.error().is_ok());
    assert!(client.query_mbean_names("*:*").await.is_ok());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_attribute_values() {
    let mut client = open(mock("normal")).await;

    let records = client
        .get_mbean_attributes(
            "test:type=Cat,name=tomas",
            &["Name".to_string(), "NullValue".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "test:type=Cat,name=tomas,attr=Name");
    assert_eq!(records[0].value.to_string(), "tomas");
    assert!(records[1].is_error());
    assert!(records[1].status_message().contains("null"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_connect_failure_terminates_worker() {
    let mut client = JmxClient::new(mock("normal"));
    let err = client
        .open(&ConnectionConfig::new("unreachable", 9999))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.to_string().contains("Connection refused"));
    assert!(!client.is_running());
    assert!(client.query_mbean_names("*:*").await.is_err());
}

#[tokio::test]
async fn test_open_twice_is_rejected() {
    let mut client = open(mock("normal")).await;

    let err = client.open(&local()).await.unwrap_err();
    assert_eq!(
        err.as_connection_error(),
        Some(&JmxConnectionError::already_running())
    );
    assert!(client.error().is_ok());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_reopen_after_close() {
    let mut client = open(mock("normal")).await;
    client.close().await.unwrap();

    client.open(&local()).await.unwrap();
    assert!(client.query_mbean_names("*:*").await.is_ok());
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_ping_timeout() {
    let settings = WorkerSettings {
        ping_timeout_ms: 300,
        ..mock("silent")
    };
    let mut client = JmxClient::new(settings);

    let started = Instant::now();
    let err = client.open(&local()).await.unwrap_err();

    assert_eq!(
        err.as_connection_error(),
        Some(&JmxConnectionError::ping_timeout())
    );
    assert!(started.elapsed() < Duration::from_millis(300 + 1000));
}

#[tokio::test]
async fn test_crash_on_start() {
    let mut client = JmxClient::new(mock("crash-on-start"));

    let started = Instant::now();
    let err = client.open(&local()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.to_string().contains("could not start the JVM"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_clean_exit_before_ping_is_not_running() {
    let mut client = JmxClient::new(mock("exit-clean"));

    let err = client.open(&local()).await.unwrap_err();
    assert_eq!(
        err.as_connection_error(),
        Some(&JmxConnectionError::not_running())
    );
}

#[tokio::test]
async fn test_transport_failure_reports_exit_cause() {
    // Answers the ping and the connect, then crashes on the next call.
    let settings = mock("crash-on-call").with_args(["--fail-after", "2"]);
    let mut client = open(settings).await;

    let err = client.query_mbean_names("*:*").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);

    let message = err.to_string();
    assert!(message.contains("exit status: 3"), "{message}");
    assert!(message.contains("crashed while handling queryMBeanNames"), "{message}");
    assert!(!message.contains("transport failure"), "{message}");

    // Later calls fail fast without touching the channel.
    let started = Instant::now();
    let err = client.query_mbean_names("*:*").await.unwrap_err();
    assert_eq!(
        err.as_connection_error(),
        Some(&JmxConnectionError::not_running())
    );
    assert!(started.elapsed() < Duration::from_millis(500));
}

/// Message of the connection error returned by the first query after the
/// worker answered the ping and the connect.
async fn failed_query_message(client: &mut JmxClient) -> String {
    let err = client.query_mbean_names("*:*").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection, "{err}");
    err.as_connection_error().unwrap().message.clone()
}

async fn assert_not_running_fast(client: &mut JmxClient) {
    let started = Instant::now();
    let err = client.query_mbean_names("*:*").await.unwrap_err();
    assert_eq!(
        err.as_connection_error(),
        Some(&JmxConnectionError::not_running())
    );
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(!client.is_running());
}

#[tokio::test]
async fn test_malformed_reply_carries_stderr() {
    let settings = mock("garbage-reply").with_args(["--fail-after", "2"]);
    let mut client = open(settings).await;

    let message = failed_query_message(&mut client).await;
    assert!(
        message.starts_with("worker process exited during queryMBeanNames: failed to decode frame"),
        "{message}"
    );
    assert!(message.contains("stderr: "), "{message}");
    assert!(message.contains("corrupting reply to queryMBeanNames"), "{message}");

    assert_not_running_fast(&mut client).await;
}

#[tokio::test]
async fn test_wrong_reply_variant_escalates() {
    let settings = mock("wrong-reply").with_args(["--fail-after", "2"]);
    let mut client = open(settings).await;

    let message = failed_query_message(&mut client).await;
    assert!(
        message.contains("unexpected reply to queryMBeanNames: received version"),
        "{message}"
    );
    assert!(
        message.contains("answering queryMBeanNames with a version reply"),
        "{message}"
    );

    assert_not_running_fast(&mut client).await;
}

#[tokio::test]
async fn test_worker_hanging_after_malformed_reply_is_killed() {
    let settings = WorkerSettings {
        exit_timeout_ms: 500,
        ..mock("hang-after-garbage").with_args(["--fail-after", "2"])
    };
    let mut client = open(settings).await;

    let started = Instant::now();
    let message = failed_query_message(&mut client).await;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(
        message.starts_with("timeout exceeded while waiting for"),
        "{message}"
    );
    assert!(message.contains("failed to decode frame"), "{message}");
    assert!(message.contains("corrupting reply to queryMBeanNames"), "{message}");

    assert_not_running_fast(&mut client).await;
}

#[tokio::test]
async fn test_close_after_crash_returns_health_error() {
    let settings = mock("crash-on-call").with_args(["--fail-after", "2"]);
    let mut client = open(settings).await;

    let _ = client.query_mbean_names("*:*").await;
    assert!(client.close().await.is_err());
    assert!(client.close().await.is_err());
}

#[tokio::test]
async fn test_terminate_twice() {
    let mut client = open(mock("normal")).await;

    client.terminate();
    client.terminate();

    let err = client.query_mbean_names("*:*").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn test_internal_stats() {
    let mut client = JmxClient::new(mock("normal"));
    client
        .open(&local().with_internal_stats(100))
        .await
        .unwrap();

    client.query_mbean("test:type=Cat,name=tomas").await.unwrap();

    let stats = client.internal_stats();
    let keys: Vec<_> = stats.iter().map(|(key, _)| key.as_str()).collect();
    assert!(keys.contains(&"connect"));
    assert!(keys.contains(&"queryMBeanNames:test:type=Cat,name=tomas"));

    let (_, attributes) = stats
        .iter()
        .find(|(key, _)| key == "getMBeanAttributes:test:type=Cat,name=tomas")
        .unwrap();
    // Six attributes, one of which the worker refuses to read.
    assert_eq!(attributes.calls, 6);
    assert_eq!(attributes.failures, 1);

    assert!(client.internal_stats().is_empty());

    let worker_stats = client.worker_internal_stats().await.unwrap();
    assert_eq!(worker_stats.len(), 6);
    assert!(worker_stats.iter().all(|s| s.mbean == "test:type=Cat,name=tomas"));
    assert_eq!(worker_stats.iter().filter(|s| !s.successful).count(), 1);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_internal_stats_disabled_by_default() {
    let mut client = open(mock("normal")).await;
    client.query_mbean_names("*:*").await.unwrap();

    assert!(client.internal_stats().is_empty());
    assert!(client.worker_internal_stats().await.unwrap().is_empty());

    client.close().await.unwrap();
}
