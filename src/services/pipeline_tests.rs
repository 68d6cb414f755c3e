//! End-to-end pipeline tests over an in-memory store: ingest through the
//! validator, then observe the registry, alert and aggregation views.

use chrono::{Duration, Utc};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, EntityTrait};

use crate::entities::{alert, log_entry};
use crate::error::ApiError;
use crate::services::analytics::{self, ThreatPatterns, Timeframe, Window};
use crate::services::intake::{self, IngestRequest, RawLogRecord};
use crate::services::query::{self, LogFilter, PageParams};

async fn test_db() -> DatabaseConnection {
    // a single connection keeps every statement on the same in-memory db
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = Database::connect(options).await.unwrap();
    crate::db::create_schema(&db).await.unwrap();
    db
}

fn record(level: &str, message: &str, timestamp: chrono::DateTime<Utc>) -> RawLogRecord {
    RawLogRecord {
        timestamp: Some(timestamp.to_rfc3339()),
        level: Some(level.into()),
        logger: Some("core.engine".into()),
        message: Some(message.into()),
        module: None,
        function: None,
        line: None,
        component: Some("scanner".into()),
        metadata: None,
    }
}

fn batch(client_id: &str, logs: Vec<RawLogRecord>) -> IngestRequest {
    IngestRequest {
        client_id: client_id.into(),
        hostname: "host-a".into(),
        version: "2.3.1".into(),
        os: "Windows 11".into(),
        logs,
    }
}

#[tokio::test]
async fn accepted_count_matches_batch_and_rows_are_queryable() {
    let db = test_db().await;
    let now = Utc::now();

    let receipt = intake::ingest(
        &db,
        batch(
            "c1",
            vec![
                record("INFO", "scan started", now - Duration::minutes(3)),
                record("INFO", "scan running", now - Duration::minutes(2)),
                record("WARNING", "slow disk", now - Duration::minutes(1)),
            ],
        ),
    )
    .await
    .unwrap();
    assert_eq!(receipt.accepted, 3);

    let filter = LogFilter {
        client_id: Some("c1".into()),
        ..Default::default()
    };
    let page = query::query_logs(&db, &filter, PageParams::normalized(None, None))
        .await
        .unwrap();
    assert_eq!(page.pagination.total_count, 3);
    assert_eq!(page.logs.len(), 3);
    // owner snapshot is joined in
    assert_eq!(page.logs[0].client.as_ref().unwrap().hostname, "host-a");
}

#[tokio::test]
async fn invalid_batch_is_rejected_atomically() {
    let db = test_db().await;
    let now = Utc::now();

    let mut bad = record("INFO", "fine", now);
    bad.level = None;
    let result = intake::ingest(
        &db,
        batch("c1", vec![record("INFO", "fine", now), bad]),
    )
    .await;

    match result {
        Err(ApiError::Validation(details)) => {
            assert_eq!(details, vec!["logs[1].level: required"]);
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    // nothing from the batch was persisted, not even the valid entry
    let stored = log_entry::Entity::find().all(&db).await.unwrap();
    assert!(stored.is_empty());
    let clients = crate::entities::client::Entity::find().all(&db).await.unwrap();
    assert!(clients.is_empty());
}

#[tokio::test]
async fn error_and_critical_entries_produce_linked_alerts() {
    let db = test_db().await;
    let now = Utc::now();

    intake::ingest(
        &db,
        batch(
            "c1",
            vec![
                record("INFO", "routine", now - Duration::minutes(3)),
                record("ERROR", "scan engine stalled", now - Duration::minutes(2)),
                record("CRITICAL", "ransomware detected", now - Duration::minutes(1)),
            ],
        ),
    )
    .await
    .unwrap();

    let alerts = alert::Entity::find().all(&db).await.unwrap();
    assert_eq!(alerts.len(), 2);

    let critical = alerts.iter().find(|a| a.severity == "CRITICAL").unwrap();
    assert_eq!(critical.description, "ransomware detected");
    assert_eq!(critical.title, "CRITICAL: scanner");
    assert!(!critical.resolved);

    // the alert points at the row that carries its source message
    let source = log_entry::Entity::find_by_id(critical.log_entry_id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(source.message, "ransomware detected");

    let high = alerts.iter().find(|a| a.severity == "HIGH").unwrap();
    assert_eq!(high.description, "scan engine stalled");
}

#[tokio::test]
async fn pages_concatenate_without_duplicates_or_gaps() {
    let db = test_db().await;
    let now = Utc::now();

    let logs: Vec<RawLogRecord> = (0..25)
        .map(|i| record("INFO", &format!("event {i}"), now - Duration::minutes(i)))
        .collect();
    intake::ingest(&db, batch("c1", logs)).await.unwrap();

    let filter = LogFilter::default();
    let mut seen = Vec::new();
    let mut prev_timestamp = None;

    for page_no in 1..=3 {
        let page = query::query_logs(
            &db,
            &filter,
            PageParams::normalized(Some(page_no), Some(10)),
        )
        .await
        .unwrap();

        assert_eq!(page.pagination.total_count, 25);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.has_prev_page, page_no > 1);
        assert_eq!(page.pagination.has_next_page, page_no < 3);

        for log in &page.logs {
            // newest-first across page boundaries
            if let Some(prev) = prev_timestamp {
                assert!(log.timestamp <= prev);
            }
            prev_timestamp = Some(log.timestamp);
            seen.push(log.id.clone());
        }
    }

    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 25);
}

#[tokio::test]
async fn window_scoping_counts_only_in_range_entries() {
    let db = test_db().await;
    let now = Utc::now();

    intake::ingest(
        &db,
        batch(
            "c1",
            vec![
                record("INFO", "recent", now - Duration::minutes(30)),
                record("INFO", "earlier today", now - Duration::hours(2)),
                record("INFO", "days ago", now - Duration::days(2)),
            ],
        ),
    )
    .await
    .unwrap();

    for (timeframe, expected) in [
        (Timeframe::OneHour, 1),
        (Timeframe::Day, 2),
        (Timeframe::Week, 3),
    ] {
        let window = Window::current(timeframe, Utc::now());
        let count = analytics::logs_in_window(&db, &window).await.unwrap();
        assert_eq!(count, expected, "timeframe {:?}", timeframe);
    }
}

#[tokio::test]
async fn dashboard_reflects_a_fresh_batch() {
    let db = test_db().await;
    let now = Utc::now();

    intake::ingest(
        &db,
        batch(
            "c1",
            vec![
                record("INFO", "startup complete", now - Duration::minutes(3)),
                record("WARNING", "definitions stale", now - Duration::minutes(2)),
                record("CRITICAL", "keylogger detected in explorer.exe", now - Duration::minutes(1)),
            ],
        ),
    )
    .await
    .unwrap();

    let report = analytics::dashboard(&db, Timeframe::Day).await.unwrap();

    assert!(report.overview.total_clients >= 1);
    assert!(report.overview.active_clients >= 1);
    assert_eq!(report.overview.total_logs, 3);
    assert!(report.overview.critical_alerts >= 1);
    // no previous window data, so the trend must be the 0 policy value
    assert_eq!(report.overview.trends.logs_trend, 0.0);

    for expected in ["INFO", "WARNING", "CRITICAL"] {
        let entry = report
            .charts
            .logs_by_level
            .iter()
            .find(|c| c.level == expected)
            .unwrap();
        assert_eq!(entry.count, 1);
    }

    assert_eq!(report.charts.top_clients.len(), 1);
    assert_eq!(report.charts.top_clients[0].client_id, "c1");
    assert_eq!(report.charts.top_clients[0].count, 3);
    assert!(report.charts.top_clients[0].client.is_some());

    assert!(!report.recent_alerts.is_empty());
    assert!(report.recent_alerts[0].client.is_some());
}

#[tokio::test]
async fn threat_report_counts_keywords_and_critical_entries() {
    let db = test_db().await;
    let now = Utc::now();

    intake::ingest(
        &db,
        batch(
            "c1",
            vec![
                record("CRITICAL", "trojan blocked in download folder", now - Duration::minutes(5)),
                record("ERROR", "suspicious process terminated", now - Duration::minutes(4)),
                record("WARNING", "virus definitions outdated", now - Duration::minutes(3)),
                record("INFO", "heartbeat", now - Duration::minutes(2)),
            ],
        ),
    )
    .await
    .unwrap();

    let patterns = ThreatPatterns::new();
    let report = analytics::threats(&db, &patterns, Timeframe::Day)
        .await
        .unwrap();

    assert_eq!(report.summary.total_threats, 3);
    assert_eq!(report.summary.critical_threats, 1);

    assert!(report
        .patterns
        .keywords
        .iter()
        .any(|k| k.keyword == "trojan" && k.count == 1));
    assert!(report
        .patterns
        .keywords
        .iter()
        .any(|k| k.keyword == "blocked" && k.count == 1));
    assert!(!report.patterns.keywords.iter().any(|k| k.count == 0));

    assert_eq!(report.critical_alerts.len(), 1);
    assert_eq!(report.critical_alerts[0].client.as_ref().unwrap().hostname, "host-a");
    // entries may straddle an hour boundary, so assert over all buckets
    assert_eq!(report.timeline.iter().map(|b| b.total).sum::<u64>(), 3);
    assert_eq!(report.timeline.iter().map(|b| b.critical).sum::<u64>(), 1);
}

#[tokio::test]
async fn client_stats_report_windows_and_status() {
    let db = test_db().await;
    let now = Utc::now();

    intake::ingest(
        &db,
        batch(
            "c1",
            vec![
                record("ERROR", "old failure", now - Duration::days(3)),
                record("ERROR", "recent failure", now - Duration::hours(1)),
                record("CRITICAL", "spyware found", now - Duration::minutes(10)),
            ],
        ),
    )
    .await
    .unwrap();

    let report = analytics::client_stats(&db, Timeframe::Day, 100, false)
        .await
        .unwrap();

    assert_eq!(report.total, 1);
    let view = &report.clients[0];
    assert_eq!(view.client_id, "c1");
    assert_eq!(view.stats.total_logs, 3);
    assert_eq!(view.stats.recent_logs, 2);
    assert_eq!(view.stats.critical_logs, 1);
    assert_eq!(view.stats.error_logs, 1);
    // the batch just refreshed last_seen
    assert_eq!(view.stats.status, "online");
}

#[tokio::test]
async fn filters_and_unknown_clients_behave_as_absence() {
    let db = test_db().await;
    let now = Utc::now();

    intake::ingest(
        &db,
        batch(
            "c1",
            vec![
                record("ERROR", "one", now - Duration::minutes(2)),
                record("INFO", "two", now - Duration::minutes(1)),
            ],
        ),
    )
    .await
    .unwrap();

    let by_level = query::query_logs(
        &db,
        &LogFilter {
            level: Some("ERROR".into()),
            client_id: Some("c1".into()),
            ..Default::default()
        },
        PageParams::normalized(None, None),
    )
    .await
    .unwrap();
    assert_eq!(by_level.pagination.total_count, 1);
    assert_eq!(by_level.logs[0].message, "one");

    // absence is an empty result set, not an error
    let unknown = query::query_logs(
        &db,
        &LogFilter {
            client_id: Some("ghost".into()),
            ..Default::default()
        },
        PageParams::normalized(None, None),
    )
    .await
    .unwrap();
    assert!(unknown.logs.is_empty());
    assert_eq!(unknown.pagination.total_count, 0);
    assert_eq!(unknown.pagination.total_pages, 0);
    assert!(!unknown.pagination.has_next_page);
}
