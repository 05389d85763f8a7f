//! Process-wide events and configuration through the facade.

use crate::common::*;
use casio::{CasioConfig, Consistency, GatewayEvent, LogLevel, QueryMetadata};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_failed_statement_reaches_subscribers_and_caller() {
    let fx = Fixture::new();
    let mut rx = fx.keyspace.subscribe();
    fx.gateway.fail_next(Error::storage("timed out"));

    let err = fx.user.find(Query::new()).await.unwrap_err();
    assert_eq!(err, Error::storage("timed out"));

    match rx.recv().await.unwrap() {
        GatewayEvent::Error { statement, error } => {
            assert!(statement.starts_with("SELECT * FROM User"));
            assert_eq!(error, err);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_timing_events_for_every_statement() {
    let fx = Fixture::new();
    fx.gateway.set_metadata(Some(QueryMetadata {
        host: "node-1".into(),
        query_latency: Duration::from_micros(250),
        pool_latency: Duration::from_micros(20),
    }));
    let mut rx = fx.keyspace.subscribe();

    fx.create_user("ann", "ann@example.com").await;
    fx.user.find(Query::new()).await.unwrap();

    let mut hosts = Vec::new();
    for _ in 0..2 {
        match rx.recv().await.unwrap() {
            GatewayEvent::Timing { host, .. } => hosts.push(host),
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(hosts, vec!["node-1", "node-1"]);
}

#[tokio::test]
async fn test_driver_log_lines_are_forwarded() {
    let fx = Fixture::new();
    let mut rx = fx.keyspace.subscribe();
    fx.gateway.log(LogLevel::Warn, "host node-2 marked down");

    assert_eq!(
        rx.recv().await.unwrap(),
        GatewayEvent::Log {
            level: LogLevel::Warn,
            message: "host node-2 marked down".into(),
        }
    );
}

#[tokio::test]
async fn test_configured_defaults_flow_into_statements() {
    let config = CasioConfig::from_toml_str(
        r#"
        key_alias = "id"

        [consistency]
        select = "QUORUM"
        "#,
    )
    .unwrap();
    let gateway = Arc::new(MemoryGateway::new());
    let keyspace = Keyspace::with_config(Arc::clone(&gateway), config);

    let mut note = keyspace.model("Note");
    note.property("noteId", Attribute::new(AttributeType::Uuid).primary())
        .unwrap()
        .property("body", Attribute::new(AttributeType::Text))
        .unwrap();
    let notes = keyspace.register(note).unwrap();

    let mut first = notes.build([("body", "hello")]);
    first.create().await.unwrap();
    let insert = gateway.last_statement().unwrap();
    assert_eq!(insert.assignments()[0].0, "id");

    let loaded = notes.get(first.get("noteId")).await.unwrap().unwrap();
    assert_eq!(loaded.get("body"), Value::from("hello"));
    let select = gateway.last_statement().unwrap();
    assert_eq!(select.consistency_level(), Consistency::Quorum);
    assert_eq!(select.key_column(), "id");
}
