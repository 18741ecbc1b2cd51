//! Connection contract tests.
//!
//! SQLite runs everywhere; the server backends run only when
//! `TPCH_TEST_PG_URL` / `TPCH_TEST_MYSQL_URL` are set.

use futures::FutureExt;
use tpch_runner::config::ConnectionConfig;
use tpch_runner::db::{self, scoped, Backend, ExecStatus};
use tpch_runner::error::RunnerError;

use super::common::workspace;

fn server_config(var: &str) -> Option<ConnectionConfig> {
    let url = std::env::var(var).ok()?;
    ConnectionConfig::from_connection_string(&url).ok()
}

#[tokio::test]
async fn test_factory_builds_each_backend() {
    for (url, backend) in [
        ("postgres://u:p@localhost:5432/tpch", Backend::Postgres),
        ("mysql://u:p@localhost:3306/tpch", Backend::MySql),
        ("sqlite:///tmp/tpch.db", Backend::Sqlite),
    ] {
        let config = ConnectionConfig::from_connection_string(url).unwrap();
        let conn = db::connect(&config).unwrap();
        assert_eq!(conn.backend(), backend);
        assert!(!conn.is_open());
    }
}

#[tokio::test]
async fn test_scoped_acquisition_closes_on_error() {
    let ws = workspace();
    let mut conn = db::connect(&ws.connection_config()).unwrap();

    let err = scoped(conn.as_mut(), |c| {
        async move {
            assert!(c.is_open());
            c.execute("select * from missing_table").await
        }
        .boxed()
    })
    .await
    .unwrap_err();
    assert!(matches!(err, RunnerError::Statement { .. }));
    assert!(!conn.is_open());
    assert_eq!(conn.execute("select 1").await.unwrap(), ExecStatus::Closed);
    assert!(!conn.commit().await.unwrap());

    let rows = scoped(conn.as_mut(), |c| {
        async move { Ok(c.fetch("select 1 as one").await?.map(|set| set.rows.len())) }.boxed()
    })
    .await
    .unwrap();
    assert_eq!(rows, Some(1));
    assert!(!conn.is_open());
}

#[tokio::test(flavor = "current_thread")]
async fn test_connect_to_unreachable_server() {
    let config = ConnectionConfig {
        backend: Backend::Postgres,
        host: Some("127.0.0.1".to_string()),
        port: Some(1),
        database: Some("tpch".to_string()),
        user: Some("tpch".to_string()),
        ..Default::default()
    };
    let mut conn = db::connect(&config).unwrap();

    let err = conn.open().await.unwrap_err();
    assert!(matches!(err, RunnerError::Connection(_)));
    assert!(!conn.is_open());
}

#[tokio::test]
async fn test_server_backends_round_trip() {
    for var in ["TPCH_TEST_PG_URL", "TPCH_TEST_MYSQL_URL"] {
        let Some(config) = server_config(var) else {
            eprintln!("Skipping {var}: not set");
            continue;
        };
        let mut conn = db::connect(&config).unwrap();
        let set = scoped(conn.as_mut(), |c| {
            async move { c.fetch("select 1 as one").await }.boxed()
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(set.columns, vec!["one".to_string()]);
        assert_eq!(set.rows.len(), 1);
    }
}
