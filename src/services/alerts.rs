use chrono::Utc;
use sea_orm::{ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::entities::{alert, log_entry};
use crate::services::intake::{LogLevel, ValidatedRecord};

/// Alert severity derived from the source log level.
pub fn severity_for(level: LogLevel) -> Option<&'static str> {
    match level {
        LogLevel::Critical => Some("CRITICAL"),
        LogLevel::Error => Some("HIGH"),
        _ => None,
    }
}

/// `"{level}: {component-or-logger}"`, e.g. `"CRITICAL: iast_detector"`.
pub fn alert_title(record: &ValidatedRecord) -> String {
    let subsystem = record.component.as_deref().unwrap_or(&record.logger);
    format!("{}: {}", record.level, subsystem)
}

/// Scans a just-persisted batch and creates one alert per ERROR/CRITICAL
/// entry, linked through the entry's idempotency key. Best-effort: a row
/// that cannot be found or an insert that fails is logged and skipped, never
/// failing the enclosing ingest. Returns the number of alerts created.
pub async fn derive_alerts(
    db: &DatabaseConnection,
    client_id: &str,
    records: &[ValidatedRecord],
) -> usize {
    let mut created = 0;

    for record in records {
        let Some(severity) = severity_for(record.level) else {
            continue;
        };

        let entry = match log_entry::Entity::find()
            .filter(log_entry::Column::EntryKey.eq(record.entry_key))
            .one(db)
            .await
        {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::warn!(
                    client_id,
                    entry_key = %record.entry_key,
                    "skipping alert: source log entry not found"
                );
                continue;
            }
            Err(err) => {
                tracing::warn!(client_id, "skipping alert: lookup failed: {err}");
                continue;
            }
        };

        let row = alert::ActiveModel {
            log_entry_id: Set(entry.id),
            severity: Set(severity.to_owned()),
            title: Set(alert_title(record)),
            description: Set(record.message.clone()),
            resolved: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        match alert::Entity::insert(row).exec(db).await {
            Ok(_) => created += 1,
            Err(err) => {
                tracing::warn!(client_id, "skipping alert: insert failed: {err}");
            }
        }
    }

    created
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(level: LogLevel, component: Option<&str>) -> ValidatedRecord {
        ValidatedRecord {
            entry_key: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            logger: "core.engine".into(),
            message: "keylogger detected in process 4242".into(),
            module: None,
            function: None,
            line: None,
            component: component.map(str::to_owned),
            metadata: None,
        }
    }

    #[test]
    fn only_error_and_critical_become_alerts() {
        assert_eq!(severity_for(LogLevel::Critical), Some("CRITICAL"));
        assert_eq!(severity_for(LogLevel::Error), Some("HIGH"));
        assert_eq!(severity_for(LogLevel::Warning), None);
        assert_eq!(severity_for(LogLevel::Info), None);
        assert_eq!(severity_for(LogLevel::Debug), None);
    }

    #[test]
    fn title_prefers_component_over_logger() {
        let with_component = record(LogLevel::Critical, Some("iast_detector"));
        assert_eq!(alert_title(&with_component), "CRITICAL: iast_detector");

        let without = record(LogLevel::Error, None);
        assert_eq!(alert_title(&without), "ERROR: core.engine");
    }
}
