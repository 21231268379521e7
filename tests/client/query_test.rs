//! Integration tests for pattern queries against the `mock_worker` binary.

use jmxlink::worker::ErrorKind;
use jmxlink::{AttributeValue, ConnectionConfig, JmxClient, QueryItem, WorkerSettings};

fn mock(args: &[&str]) -> WorkerSettings {
    WorkerSettings {
        exit_timeout_ms: 2_000,
        ..WorkerSettings::with_path(env!("CARGO_BIN_EXE_mock_worker"))
            .with_args(args.iter().copied())
    }
}

async fn open(args: &[&str]) -> JmxClient {
    let mut client = JmxClient::new(mock(args));
    client
        .open(&ConnectionConfig::new("localhost", 9999))
        .await
        .unwrap();
    client
}

#[tokio::test]
async fn test_query_all_success() {
    let mut client = open(&[]).await;

    let outcome = client.query_mbean("java.lang:type=*").await.unwrap();
    let names: Vec<_> = outcome
        .valid_attributes()
        .into_iter()
        .map(|record| record.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "java.lang:type=Memory,attr=ObjectPendingFinalizationCount",
            "java.lang:type=Memory,attr=Verbose",
            "java.lang:type=OperatingSystem,attr=AvailableProcessors",
            "java.lang:type=OperatingSystem,attr=SystemLoadAverage",
        ]
    );
    assert_eq!(outcome.errors().count(), 0);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_query_partial_failure_keeps_order() {
    let mut client = open(&[]).await;

    let outcome = client.query_mbean("test:type=Cat,*").await.unwrap();
    let items = outcome.into_items();
    assert_eq!(items.len(), 7);

    let expected_success = [
        ("Name", AttributeValue::String("tomas".to_string())),
        ("FloatValue", AttributeValue::Double(2.222222)),
        ("BoolValue", AttributeValue::Bool(true)),
        ("NumberValue", AttributeValue::Integer(3)),
    ];
    for (item, (name, value)) in items.iter().zip(expected_success.iter()) {
        let record = item.attribute().unwrap();
        assert_eq!(record.name, format!("test:type=Cat,name=tomas,attr={}", name));
        assert_eq!(&record.value, value);
    }

    // Unreadable value: still a successful entry.
    assert!(items[4].is_success());
    assert!(items[4].attribute().unwrap().is_error());

    // Attribute-level JMX error.
    let QueryItem::Error(message) = &items[5] else {
        panic!("expected an error entry, got {:?}", items[5]);
    };
    assert!(message.starts_with(
        "error while querying mBean 'test:type=Cat,name=tomas', attribute: 'Secret'"
    ));

    // MBean-level JMX error for the second MBean.
    let QueryItem::Error(message) = &items[6] else {
        panic!("expected an error entry, got {:?}", items[6]);
    };
    assert!(message.starts_with(
        "error while querying mBean name: 'test:type=Cat,name=boss', error message: can't get attribute names"
    ));
    assert!(message.contains(r#"stacktrace: "java.lang.SecurityException: access denied\n\tat Cat.getMBeanInfo""#));

    assert!(client.error().is_ok());
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_query_bad_pattern_fails() {
    let mut client = open(&[]).await;

    let err = client.query_mbean("no-domain").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Domain);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_query_aborts_when_worker_dies() {
    // Ping, connect, the name lookup and one attribute listing succeed.
    let mut client = open(&["--mode", "crash-on-call", "--fail-after", "4"]).await;

    let err = client.query_mbean("java.lang:type=*").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.to_string().contains("exit status: 3"));
    assert!(!client.is_running());
}
