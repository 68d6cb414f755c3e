use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait};
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::log_entry;
use crate::error::ApiError;
use crate::services::{alerts, registry};

/// Serialized metadata larger than this is rejected at validation time.
pub const MAX_METADATA_BYTES: usize = 16 * 1024;

/// Log severity levels, ordered. The wire format is the uppercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One intake batch as posted by an agent. Every field is defaulted so a
/// structurally valid JSON body always deserializes; required-field checks
/// run in [`validate`], which reports all problems at once. Unknown extra
/// fields are tolerated and dropped.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub logs: Vec<RawLogRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogRecord {
    pub timestamp: Option<String>,
    pub level: Option<String>,
    pub logger: Option<String>,
    pub message: Option<String>,
    pub module: Option<String>,
    pub function: Option<String>,
    pub line: Option<i32>,
    pub component: Option<String>,
    // older agents send the payload as "data"
    #[serde(alias = "data")]
    pub metadata: Option<serde_json::Value>,
}

/// A record that passed validation, stamped with the idempotency key the
/// stored row and any derived alert will share.
#[derive(Debug, Clone)]
pub struct ValidatedRecord {
    pub entry_key: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub logger: String,
    pub message: String,
    pub module: Option<String>,
    pub function: Option<String>,
    pub line: Option<i32>,
    pub component: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestReceipt {
    pub accepted: usize,
}

/// Accepts RFC 3339 as well as the zone-less ISO form some agents emit,
/// which is taken as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Checks the whole batch and reports every offending field. The batch is
/// all-or-nothing: a single bad entry rejects the entire payload.
pub fn validate(request: &IngestRequest) -> Result<Vec<ValidatedRecord>, ApiError> {
    let mut issues = Vec::new();

    for (field, value) in [
        ("clientId", &request.client_id),
        ("hostname", &request.hostname),
        ("version", &request.version),
        ("os", &request.os),
    ] {
        if value.trim().is_empty() {
            issues.push(format!("{field}: required"));
        }
    }

    if request.logs.is_empty() {
        issues.push("logs: must contain at least one entry".to_string());
    }

    let mut records = Vec::with_capacity(request.logs.len());

    for (index, raw) in request.logs.iter().enumerate() {
        let timestamp = match raw.timestamp.as_deref() {
            None => {
                issues.push(format!("logs[{index}].timestamp: required"));
                None
            }
            Some(value) => match parse_timestamp(value) {
                Some(ts) => Some(ts),
                None => {
                    issues.push(format!(
                        "logs[{index}].timestamp: not a valid ISO-8601 instant"
                    ));
                    None
                }
            },
        };

        let level = match raw.level.as_deref() {
            None => {
                issues.push(format!("logs[{index}].level: required"));
                None
            }
            Some(value) => match LogLevel::parse(value) {
                Some(level) => Some(level),
                None => {
                    issues.push(format!(
                        "logs[{index}].level: must be one of DEBUG, INFO, WARNING, ERROR, CRITICAL"
                    ));
                    None
                }
            },
        };

        let logger = match raw.logger.as_deref() {
            Some(value) if !value.trim().is_empty() => Some(value.to_string()),
            _ => {
                issues.push(format!("logs[{index}].logger: required"));
                None
            }
        };

        let message = match raw.message.as_deref() {
            Some(value) if !value.is_empty() => Some(value.to_string()),
            _ => {
                issues.push(format!("logs[{index}].message: required"));
                None
            }
        };

        if let Some(metadata) = &raw.metadata {
            let size = serde_json::to_string(metadata).map(|s| s.len()).unwrap_or(0);
            if size > MAX_METADATA_BYTES {
                issues.push(format!(
                    "logs[{index}].metadata: exceeds {MAX_METADATA_BYTES} byte limit"
                ));
            }
        }

        if let (Some(timestamp), Some(level), Some(logger), Some(message)) =
            (timestamp, level, logger, message)
        {
            records.push(ValidatedRecord {
                entry_key: Uuid::new_v4(),
                timestamp,
                level,
                logger,
                message,
                module: raw.module.clone(),
                function: raw.function.clone(),
                line: raw.line,
                component: raw.component.clone(),
                metadata: raw.metadata.clone(),
            });
        }
    }

    if issues.is_empty() {
        Ok(records)
    } else {
        Err(ApiError::Validation(issues))
    }
}

/// Full intake path: validate, upsert the client (the entries reference it),
/// persist the batch in one multi-row insert, then derive alerts. Alert
/// derivation is best-effort and never fails the ingest.
pub async fn ingest(
    db: &DatabaseConnection,
    request: IngestRequest,
) -> Result<IngestReceipt, ApiError> {
    let records = validate(&request)?;

    let client = registry::upsert_client(
        db,
        &request.client_id,
        &request.hostname,
        &request.version,
        &request.os,
    )
    .await?;

    let rows = records.iter().map(|record| log_entry::ActiveModel {
        entry_key: Set(record.entry_key),
        client_id: Set(client.client_id.clone()),
        timestamp: Set(record.timestamp),
        level: Set(record.level.as_str().to_owned()),
        logger: Set(record.logger.clone()),
        message: Set(record.message.clone()),
        module: Set(record.module.clone()),
        function: Set(record.function.clone()),
        line: Set(record.line),
        component: Set(record.component.clone()),
        metadata: Set(record.metadata.clone()),
        ..Default::default()
    });

    log_entry::Entity::insert_many(rows).exec(db).await?;

    let accepted = records.len();
    alerts::derive_alerts(db, &client.client_id, &records).await;

    tracing::info!(
        client_id = %client.client_id,
        accepted,
        "ingested log batch"
    );

    Ok(IngestReceipt { accepted })
}
