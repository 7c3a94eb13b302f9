//! Tests for health checking

use std::sync::Arc;

use codecheck_core::{AccessMode, ColumnMeta, QueryResult, Row, Value};

use super::{DatabaseInfo, HealthStatus};
use crate::pool::{ConnectionPool, PoolConfig};
use crate::test_support::{MockConnectionFactory, MockDatabase};

fn mock_pool(config: PoolConfig) -> (ConnectionPool, Arc<MockConnectionFactory>, Arc<MockDatabase>) {
    let db = MockDatabase::new();
    let factory = MockConnectionFactory::new(Arc::clone(&db));
    let pool = ConnectionPool::new(config, Arc::clone(&factory));
    (pool, factory, db)
}

#[test]
fn test_health_status_serialization() {
    assert_eq!(serde_json::to_value(HealthStatus::Healthy).unwrap(), "healthy");
    assert_eq!(HealthStatus::Unhealthy.to_string(), "unhealthy");
    assert!(HealthStatus::Healthy.is_healthy());
    assert!(!HealthStatus::Unhealthy.is_healthy());
}

#[test]
fn test_database_info_from_result() {
    let now = chrono::Utc::now();
    let columns = vec!["version".to_string(), "is_replica".to_string(), "database_time".to_string()];
    let result = QueryResult::from_rows(
        vec![ColumnMeta {
            name: "version".into(),
            data_type: "text".into(),
            ordinal: 0,
        }],
        vec![Row::new(
            columns,
            vec![Value::from("PostgreSQL 16.2"), Value::Bool(true), Value::DateTimeUtc(now)],
        )],
    );

    let info = DatabaseInfo::from_result(&result);
    assert_eq!(info.version.as_deref(), Some("PostgreSQL 16.2"));
    assert_eq!(info.is_replica, Some(true));
    assert_eq!(info.time, Some(now));

    assert_eq!(DatabaseInfo::from_result(&QueryResult::empty()), DatabaseInfo::default());
}

#[tokio::test]
async fn test_health_check_reports_database_metadata() {
    let (pool, _factory, db) = mock_pool(PoolConfig::new(1, 2));

    let report = pool.health_check().await;

    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.database_version.as_deref(), Some("PostgreSQL 16.2 (mock)"));
    assert_eq!(report.is_replica, Some(false));
    assert!(report.database_time.is_some());
    assert!(report.error.is_none());
    assert_eq!(report.consecutive_failures, 0);
    assert_eq!(report.pool_stats.active(), 0);
    assert_eq!(report.pool_stats.available(), 1);

    // probe runs in a read-only scope
    assert!(db.statements().contains(&"BEGIN READ ONLY".to_string()));
}

#[tokio::test]
async fn test_health_check_never_fails_when_database_down() {
    let (pool, _factory, db) = mock_pool(PoolConfig::new(1, 2));
    db.set_down(true);

    let first = pool.health_check().await;
    let second = pool.health_check().await;

    assert_eq!(first.status, HealthStatus::Unhealthy);
    assert!(first.error.as_deref().is_some_and(|e| e.contains("could not connect")));
    assert!(first.database_version.is_none());
    assert_eq!(first.consecutive_failures, 1);
    assert_eq!(second.consecutive_failures, 2);

    db.set_down(false);
    let recovered = pool.health_check().await;
    assert_eq!(recovered.status, HealthStatus::Healthy);
    assert_eq!(recovered.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_health_check_is_bounded_by_timeout() {
    let config = PoolConfig::new(0, 1)
        .with_acquire_timeout_ms(60_000)
        .with_health_check_timeout_ms(1_000);
    let (pool, _factory, _db) = mock_pool(config);
    let held = pool.acquire(AccessMode::ReadWrite).await.expect("acquire");

    let report = pool.health_check().await;

    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert!(report.error.as_deref().is_some_and(|e| e.contains("timed out")));
    assert!(report.latency_ms >= 1_000 && report.latency_ms < 60_000);
    assert_eq!(report.pool_stats.waiting(), 0);

    pool.release(held, true).await;
}

#[tokio::test]
async fn test_health_check_after_shutdown() {
    let (pool, _factory, _db) = mock_pool(PoolConfig::new(1, 2));
    pool.shutdown().await;

    let report = pool.health_check().await;
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert!(report.error.as_deref().is_some_and(|e| e.contains("shut down")));
}

#[tokio::test]
async fn test_health_report_serializes_for_monitoring() {
    let (pool, _factory, _db) = mock_pool(PoolConfig::new(1, 2));
    let report = pool.health_check().await;

    let json = serde_json::to_value(&report).expect("serialize");
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["pool_stats"]["max_size"], 2);
}
