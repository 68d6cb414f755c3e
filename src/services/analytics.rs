use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;

use crate::entities::{alert, client, log_entry};
use crate::error::ApiError;
use crate::services::intake::LogLevel;
use crate::services::registry;

pub const TRUNCATE_LIST: usize = 100;
pub const TRUNCATE_THREAT_MESSAGE: usize = 150;
pub const TRUNCATE_ALERT_DESCRIPTION: usize = 200;

/// Timeframe token accepted by every aggregation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeframe {
    OneHour,
    SixHours,
    #[default]
    Day,
    Week,
    Month,
}

impl Timeframe {
    /// Unknown or absent tokens fall back to 24h.
    pub fn parse(token: Option<&str>) -> Self {
        match token {
            Some("1h") => Self::OneHour,
            Some("6h") => Self::SixHours,
            Some("24h") => Self::Day,
            Some("7d") => Self::Week,
            Some("30d") => Self::Month,
            _ => Self::Day,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Self::OneHour => Duration::hours(1),
            Self::SixHours => Duration::hours(6),
            Self::Day => Duration::hours(24),
            Self::Week => Duration::days(7),
            Self::Month => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::SixHours => "6h",
            Self::Day => "24h",
            Self::Week => "7d",
            Self::Month => "30d",
        }
    }
}

/// Request-scoped time range every aggregation query is bounded by.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn current(timeframe: Timeframe, now: DateTime<Utc>) -> Self {
        Self {
            start: now - timeframe.duration(),
            end: now,
        }
    }

    /// The immediately preceding window of equal length.
    pub fn previous(&self) -> Self {
        Self {
            start: self.start - (self.end - self.start),
            end: self.start,
        }
    }

    pub fn hours(&self) -> i64 {
        (self.end - self.start).num_hours()
    }
}

/// Percentage change against the previous window, rounded to two decimals.
/// An empty previous window reports 0 rather than a division blowup.
pub fn trend_percent(current: u64, previous: u64) -> f64 {
    if previous == 0 {
        return 0.0;
    }
    let delta = current as f64 - previous as f64;
    (delta / previous as f64 * 100.0 * 100.0).round() / 100.0
}

/// View-layer truncation with an ellipsis marker. Stored values are never
/// shortened; this applies only to what is returned.
pub fn truncate_for_display(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        message.to_string()
    } else {
        let head: String = message.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp() - ts.timestamp().rem_euclid(3600);
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or(ts)
}

pub const THREAT_KEYWORDS: [&str; 10] = [
    "malware",
    "virus",
    "keylogger",
    "suspicious",
    "blocked",
    "threat",
    "detected",
    "ransomware",
    "trojan",
    "spyware",
];

/// Case-insensitive keyword rules over log messages, one compiled pattern
/// per keyword. Constructed once and injected through app state.
pub struct ThreatPatterns {
    rules: Vec<(&'static str, Regex)>,
}

impl ThreatPatterns {
    pub fn new() -> Self {
        let rules = THREAT_KEYWORDS
            .iter()
            .map(|keyword| (*keyword, Regex::new(&format!("(?i){keyword}")).unwrap()))
            .collect();
        Self { rules }
    }

    pub fn matches_any(&self, message: &str) -> bool {
        self.rules.iter().any(|(_, re)| re.is_match(message))
    }

    /// Per-keyword match counts, sorted descending, zero counts omitted.
    /// Ties keep the fixed keyword order.
    pub fn keyword_counts<S: AsRef<str>>(&self, messages: &[S]) -> Vec<KeywordCount> {
        let mut counts: Vec<KeywordCount> = self
            .rules
            .iter()
            .map(|(keyword, re)| KeywordCount {
                keyword: keyword.to_string(),
                count: messages.iter().filter(|m| re.is_match(m.as_ref())).count() as u64,
            })
            .filter(|entry| entry.count > 0)
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count));
        counts
    }
}

impl Default for ThreatPatterns {
    fn default() -> Self {
        Self::new()
    }
}

// ---- report shapes -------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordCount {
    pub keyword: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelCount {
    pub level: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentCount {
    pub component: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourBucket {
    pub hour: DateTime<Utc>,
    pub count: u64,
    pub errors: u64,
    pub critical: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatBucket {
    pub timestamp: DateTime<Utc>,
    pub warning: u64,
    pub error: u64,
    pub critical: u64,
    pub total: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSnapshot {
    pub hostname: String,
    pub version: String,
    pub os: String,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopClient {
    pub client_id: String,
    pub count: u64,
    pub client: Option<ClientSnapshot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertClientRef {
    pub client_id: String,
    pub hostname: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertView {
    pub id: String,
    pub severity: String,
    pub title: String,
    pub description: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub client: Option<AlertClientRef>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trends {
    pub logs_trend: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_clients: u64,
    pub active_clients: u64,
    pub total_logs: u64,
    pub critical_alerts: u64,
    pub high_alerts: u64,
    pub trends: Trends,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Charts {
    pub logs_by_level: Vec<LevelCount>,
    pub logs_by_component: Vec<ComponentCount>,
    pub hourly_activity: Vec<HourBucket>,
    pub top_clients: Vec<TopClient>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub overview: Overview,
    pub charts: Charts,
    pub recent_alerts: Vec<AlertView>,
    pub timeframe: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatSummary {
    pub total_threats: u64,
    pub critical_threats: u64,
    pub timeframe: String,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatDistribution {
    pub by_level: Vec<LevelCount>,
    pub by_component: Vec<ComponentCount>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatView {
    pub message: String,
    pub level: String,
    pub component: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub client_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatPatternsReport {
    pub keywords: Vec<KeywordCount>,
    pub top_threats: Vec<ThreatView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalEntryView {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub component: Option<String>,
    pub client: Option<AlertClientRef>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatReport {
    pub summary: ThreatSummary,
    pub distribution: ThreatDistribution,
    pub patterns: ThreatPatternsReport,
    pub critical_alerts: Vec<CriticalEntryView>,
    pub timeline: Vec<ThreatBucket>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStats {
    pub total_logs: u64,
    pub recent_logs: u64,
    pub critical_logs: u64,
    pub error_logs: u64,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatsView {
    pub id: String,
    pub client_id: String,
    pub hostname: String,
    pub version: String,
    pub os: String,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub stats: ClientStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientsReport {
    pub clients: Vec<ClientStatsView>,
    pub total: usize,
}

// ---- bucketing -----------------------------------------------------------

/// Hour-truncated activity buckets, ascending. Input order is irrelevant.
pub fn bucket_hourly(rows: &[(DateTime<Utc>, LogLevel)]) -> Vec<HourBucket> {
    let mut buckets: BTreeMap<DateTime<Utc>, HourBucket> = BTreeMap::new();
    for (ts, level) in rows {
        let hour = truncate_to_hour(*ts);
        let bucket = buckets.entry(hour).or_insert(HourBucket {
            hour,
            count: 0,
            errors: 0,
            critical: 0,
        });
        bucket.count += 1;
        match level {
            LogLevel::Error => bucket.errors += 1,
            LogLevel::Critical => bucket.critical += 1,
            _ => {}
        }
    }
    buckets.into_values().collect()
}

/// Windows longer than a day keep only the 24 most recent buckets.
pub fn cap_buckets(buckets: Vec<HourBucket>, window_hours: i64) -> Vec<HourBucket> {
    if window_hours > 24 && buckets.len() > 24 {
        let skip = buckets.len() - 24;
        buckets.into_iter().skip(skip).collect()
    } else {
        buckets
    }
}

/// WARNING/ERROR/CRITICAL activity per hour, ascending.
pub fn bucket_threat_hours(rows: &[(DateTime<Utc>, LogLevel)]) -> Vec<ThreatBucket> {
    let mut buckets: BTreeMap<DateTime<Utc>, ThreatBucket> = BTreeMap::new();
    for (ts, level) in rows {
        let (warning, error, critical) = match level {
            LogLevel::Warning => (1, 0, 0),
            LogLevel::Error => (0, 1, 0),
            LogLevel::Critical => (0, 0, 1),
            _ => continue,
        };
        let hour = truncate_to_hour(*ts);
        let bucket = buckets.entry(hour).or_insert(ThreatBucket {
            timestamp: hour,
            warning: 0,
            error: 0,
            critical: 0,
            total: 0,
        });
        bucket.warning += warning;
        bucket.error += error;
        bucket.critical += critical;
        bucket.total += 1;
    }
    buckets.into_values().collect()
}

// ---- shared query helpers ------------------------------------------------

pub async fn logs_in_window(
    db: &DatabaseConnection,
    window: &Window,
) -> Result<u64, sea_orm::DbErr> {
    log_entry::Entity::find()
        .filter(log_entry::Column::Timestamp.gte(window.start))
        .filter(log_entry::Column::Timestamp.lte(window.end))
        .count(db)
        .await
}

async fn unresolved_alert_count(
    db: &DatabaseConnection,
    severity: &str,
    window: &Window,
) -> Result<u64, sea_orm::DbErr> {
    alert::Entity::find()
        .filter(alert::Column::Severity.eq(severity))
        .filter(alert::Column::Resolved.eq(false))
        .filter(alert::Column::CreatedAt.gte(window.start))
        .count(db)
        .await
}

async fn level_distribution(
    db: &DatabaseConnection,
    window: &Window,
    levels: Option<&[&str]>,
) -> Result<Vec<LevelCount>, sea_orm::DbErr> {
    let mut query = log_entry::Entity::find()
        .select_only()
        .column(log_entry::Column::Level)
        .column_as(log_entry::Column::Id.count(), "count")
        .filter(log_entry::Column::Timestamp.gte(window.start))
        .filter(log_entry::Column::Timestamp.lte(window.end));
    if let Some(levels) = levels {
        query = query.filter(log_entry::Column::Level.is_in(levels.iter().copied()));
    }
    let rows: Vec<(String, i64)> = query
        .group_by(log_entry::Column::Level)
        .order_by_desc(log_entry::Column::Id.count())
        .into_tuple()
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(level, count)| LevelCount {
            level,
            count: count as u64,
        })
        .collect())
}

async fn component_distribution(
    db: &DatabaseConnection,
    window: &Window,
    levels: Option<&[&str]>,
) -> Result<Vec<ComponentCount>, sea_orm::DbErr> {
    let mut query = log_entry::Entity::find()
        .select_only()
        .column(log_entry::Column::Component)
        .column_as(log_entry::Column::Id.count(), "count")
        .filter(log_entry::Column::Timestamp.gte(window.start))
        .filter(log_entry::Column::Timestamp.lte(window.end))
        .filter(log_entry::Column::Component.is_not_null());
    if let Some(levels) = levels {
        query = query.filter(log_entry::Column::Level.is_in(levels.iter().copied()));
    }
    let rows: Vec<(Option<String>, i64)> = query
        .group_by(log_entry::Column::Component)
        .order_by_desc(log_entry::Column::Id.count())
        .limit(10)
        .into_tuple()
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(component, count)| {
            component.map(|component| ComponentCount {
                component,
                count: count as u64,
            })
        })
        .collect())
}

async fn client_snapshots(
    db: &DatabaseConnection,
    client_ids: Vec<String>,
) -> Result<HashMap<String, client::Model>, sea_orm::DbErr> {
    if client_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let clients = client::Entity::find()
        .filter(client::Column::ClientId.is_in(client_ids))
        .all(db)
        .await?;
    Ok(clients
        .into_iter()
        .map(|c| (c.client_id.clone(), c))
        .collect())
}

// ---- reports -------------------------------------------------------------

/// The dashboard bundle: summary counts, distributions, hourly activity,
/// top clients, recent alerts and the trend against the previous window.
pub async fn dashboard(
    db: &DatabaseConnection,
    timeframe: Timeframe,
) -> Result<DashboardReport, ApiError> {
    let now = Utc::now();
    let window = Window::current(timeframe, now);

    let total_clients = client::Entity::find()
        .filter(client::Column::IsActive.eq(true))
        .count(db)
        .await?;

    let active_clients = client::Entity::find()
        .filter(client::Column::IsActive.eq(true))
        .filter(client::Column::LastSeen.gte(registry::online_cutoff(now)))
        .count(db)
        .await?;

    let total_logs = logs_in_window(db, &window).await?;
    let critical_alerts = unresolved_alert_count(db, "CRITICAL", &window).await?;
    let high_alerts = unresolved_alert_count(db, "HIGH", &window).await?;

    let logs_by_level = level_distribution(db, &window, None).await?;
    let logs_by_component = component_distribution(db, &window, None).await?;

    // hourly activity is bucketed here rather than in SQL so the grouping is
    // identical across store backends
    let activity_rows: Vec<(DateTime<Utc>, String)> = log_entry::Entity::find()
        .select_only()
        .column(log_entry::Column::Timestamp)
        .column(log_entry::Column::Level)
        .filter(log_entry::Column::Timestamp.gte(window.start))
        .filter(log_entry::Column::Timestamp.lte(window.end))
        .into_tuple()
        .all(db)
        .await?;
    let parsed: Vec<(DateTime<Utc>, LogLevel)> = activity_rows
        .into_iter()
        .filter_map(|(ts, level)| LogLevel::parse(&level).map(|level| (ts, level)))
        .collect();
    let hourly_activity = cap_buckets(bucket_hourly(&parsed), window.hours());

    // top clients by volume, enriched with a registry snapshot
    let top_rows: Vec<(String, i64)> = log_entry::Entity::find()
        .select_only()
        .column(log_entry::Column::ClientId)
        .column_as(log_entry::Column::Id.count(), "count")
        .filter(log_entry::Column::Timestamp.gte(window.start))
        .filter(log_entry::Column::Timestamp.lte(window.end))
        .group_by(log_entry::Column::ClientId)
        .order_by_desc(log_entry::Column::Id.count())
        .limit(5)
        .into_tuple()
        .all(db)
        .await?;
    let snapshots =
        client_snapshots(db, top_rows.iter().map(|(id, _)| id.clone()).collect()).await?;
    let top_clients = top_rows
        .into_iter()
        .map(|(client_id, count)| {
            let client = snapshots.get(&client_id).map(|c| ClientSnapshot {
                hostname: c.hostname.clone(),
                version: c.version.clone(),
                os: c.os.clone(),
                last_seen: c.last_seen,
            });
            TopClient {
                client_id,
                count: count as u64,
                client,
            }
        })
        .collect();

    let recent_alerts = recent_alerts(db, &window).await?;

    let previous = window.previous();
    let previous_logs = log_entry::Entity::find()
        .filter(log_entry::Column::Timestamp.gte(previous.start))
        .filter(log_entry::Column::Timestamp.lt(previous.end))
        .count(db)
        .await?;
    let logs_trend = trend_percent(total_logs, previous_logs);

    Ok(DashboardReport {
        overview: Overview {
            total_clients,
            active_clients,
            total_logs,
            critical_alerts,
            high_alerts,
            trends: Trends { logs_trend },
        },
        charts: Charts {
            logs_by_level,
            logs_by_component,
            hourly_activity,
            top_clients,
        },
        recent_alerts,
        timeframe: timeframe.as_str().to_string(),
        generated_at: now,
    })
}

async fn recent_alerts(
    db: &DatabaseConnection,
    window: &Window,
) -> Result<Vec<AlertView>, ApiError> {
    let rows = alert::Entity::find()
        .filter(alert::Column::CreatedAt.gte(window.start))
        .order_by_desc(alert::Column::CreatedAt)
        .limit(10)
        .find_also_related(log_entry::Entity)
        .all(db)
        .await?;

    let client_ids: Vec<String> = rows
        .iter()
        .filter_map(|(_, entry)| entry.as_ref().map(|e| e.client_id.clone()))
        .collect();
    let snapshots = client_snapshots(db, client_ids).await?;

    Ok(rows
        .into_iter()
        .map(|(alert, entry)| {
            let client = entry.as_ref().and_then(|e| {
                snapshots.get(&e.client_id).map(|c| AlertClientRef {
                    client_id: c.client_id.clone(),
                    hostname: c.hostname.clone(),
                })
            });
            AlertView {
                id: alert.id.to_string(),
                severity: alert.severity,
                title: alert.title,
                description: truncate_for_display(&alert.description, TRUNCATE_LIST),
                resolved: alert.resolved,
                created_at: alert.created_at,
                client,
            }
        })
        .collect())
}

/// The threat analysis bundle: WARNING/ERROR/CRITICAL distributions, keyword
/// patterns over message text, recent critical entries and an hourly threat
/// timeline.
pub async fn threats(
    db: &DatabaseConnection,
    patterns: &ThreatPatterns,
    timeframe: Timeframe,
) -> Result<ThreatReport, ApiError> {
    const THREAT_LEVELS: [&str; 3] = ["WARNING", "ERROR", "CRITICAL"];

    let now = Utc::now();
    let window = Window::current(timeframe, now);

    let by_level = level_distribution(db, &window, Some(&THREAT_LEVELS)).await?;
    let by_component = component_distribution(db, &window, Some(&THREAT_LEVELS)).await?;

    // one sweep over the window feeds keyword counts, the matched-threat
    // list and the hourly timeline
    let rows: Vec<(DateTime<Utc>, String, Option<String>, String, String)> =
        log_entry::Entity::find()
            .select_only()
            .column(log_entry::Column::Timestamp)
            .column(log_entry::Column::Level)
            .column(log_entry::Column::Component)
            .column(log_entry::Column::Message)
            .column(log_entry::Column::ClientId)
            .filter(log_entry::Column::Timestamp.gte(window.start))
            .filter(log_entry::Column::Timestamp.lte(window.end))
            .order_by_desc(log_entry::Column::Timestamp)
            .into_tuple()
            .all(db)
            .await?;

    let messages: Vec<&str> = rows.iter().map(|(_, _, _, message, _)| message.as_str()).collect();
    let keywords = patterns.keyword_counts(&messages);

    let top_threats: Vec<ThreatView> = rows
        .iter()
        .filter(|(_, _, _, message, _)| patterns.matches_any(message))
        .take(10)
        .map(|(timestamp, level, component, message, client_id)| ThreatView {
            message: truncate_for_display(message, TRUNCATE_THREAT_MESSAGE),
            level: level.clone(),
            component: component.clone(),
            timestamp: *timestamp,
            client_id: client_id.clone(),
        })
        .collect();

    let threat_rows: Vec<(DateTime<Utc>, LogLevel)> = rows
        .iter()
        .filter_map(|(ts, level, _, _, _)| LogLevel::parse(level).map(|level| (*ts, level)))
        .filter(|(_, level)| *level >= LogLevel::Warning)
        .collect();
    let timeline = bucket_threat_hours(&threat_rows);

    let total_threats = threat_rows.len() as u64;
    let critical_threats = threat_rows
        .iter()
        .filter(|(_, level)| *level == LogLevel::Critical)
        .count() as u64;

    let critical_alerts = critical_entries(db, &window).await?;

    Ok(ThreatReport {
        summary: ThreatSummary {
            total_threats,
            critical_threats,
            timeframe: timeframe.as_str().to_string(),
            last_update: now,
        },
        distribution: ThreatDistribution {
            by_level,
            by_component,
        },
        patterns: ThreatPatternsReport {
            keywords,
            top_threats,
        },
        critical_alerts,
        timeline,
    })
}

async fn critical_entries(
    db: &DatabaseConnection,
    window: &Window,
) -> Result<Vec<CriticalEntryView>, ApiError> {
    let rows = log_entry::Entity::find()
        .filter(log_entry::Column::Timestamp.gte(window.start))
        .filter(log_entry::Column::Timestamp.lte(window.end))
        .filter(log_entry::Column::Level.eq("CRITICAL"))
        .order_by_desc(log_entry::Column::Timestamp)
        .limit(20)
        .find_also_related(client::Entity)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(entry, client)| CriticalEntryView {
            id: entry.id.to_string(),
            timestamp: entry.timestamp,
            message: truncate_for_display(&entry.message, TRUNCATE_ALERT_DESCRIPTION),
            component: entry.component,
            client: client.map(|c| AlertClientRef {
                client_id: c.client_id,
                hostname: c.hostname,
            }),
        })
        .collect())
}

/// Per-client rollups for the fleet view: lifetime volume, windowed volume,
/// windowed CRITICAL/ERROR counts and the derived online/offline status.
pub async fn client_stats(
    db: &DatabaseConnection,
    timeframe: Timeframe,
    limit: u64,
    include_inactive: bool,
) -> Result<ClientsReport, ApiError> {
    let now = Utc::now();
    let window = Window::current(timeframe, now);

    let mut query = client::Entity::find();
    if !include_inactive {
        query = query.filter(client::Column::IsActive.eq(true));
    }
    let clients = query
        .order_by_desc(client::Column::LastSeen)
        .limit(limit)
        .all(db)
        .await?;

    let mut views = Vec::with_capacity(clients.len());
    for c in clients {
        let total_logs = log_entry::Entity::find()
            .filter(log_entry::Column::ClientId.eq(&c.client_id))
            .count(db)
            .await?;
        let recent_logs = windowed_client_count(db, &c.client_id, &window, None).await?;
        let critical_logs = windowed_client_count(db, &c.client_id, &window, Some("CRITICAL")).await?;
        let error_logs = windowed_client_count(db, &c.client_id, &window, Some("ERROR")).await?;

        let status = if registry::is_online(c.last_seen, now) {
            "online"
        } else {
            "offline"
        };

        views.push(ClientStatsView {
            id: c.id.to_string(),
            client_id: c.client_id,
            hostname: c.hostname,
            version: c.version,
            os: c.os,
            last_seen: c.last_seen,
            is_active: c.is_active,
            created_at: c.created_at,
            stats: ClientStats {
                total_logs,
                recent_logs,
                critical_logs,
                error_logs,
                status,
            },
        });
    }

    let total = views.len();
    Ok(ClientsReport {
        clients: views,
        total,
    })
}

async fn windowed_client_count(
    db: &DatabaseConnection,
    client_id: &str,
    window: &Window,
    level: Option<&str>,
) -> Result<u64, sea_orm::DbErr> {
    let mut query = log_entry::Entity::find()
        .filter(log_entry::Column::ClientId.eq(client_id))
        .filter(log_entry::Column::Timestamp.gte(window.start))
        .filter(log_entry::Column::Timestamp.lte(window.end));
    if let Some(level) = level {
        query = query.filter(log_entry::Column::Level.eq(level));
    }
    query.count(db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timeframe_tokens_resolve_and_default() {
        assert_eq!(Timeframe::parse(Some("1h")), Timeframe::OneHour);
        assert_eq!(Timeframe::parse(Some("6h")), Timeframe::SixHours);
        assert_eq!(Timeframe::parse(Some("7d")), Timeframe::Week);
        assert_eq!(Timeframe::parse(Some("30d")), Timeframe::Month);
        assert_eq!(Timeframe::parse(Some("90d")), Timeframe::Day);
        assert_eq!(Timeframe::parse(None), Timeframe::Day);
    }

    #[test]
    fn previous_window_abuts_the_current_one() {
        let now = Utc.with_ymd_and_hms(2025, 5, 4, 12, 0, 0).unwrap();
        let window = Window::current(Timeframe::Day, now);
        let previous = window.previous();
        assert_eq!(previous.end, window.start);
        assert_eq!(window.start - previous.start, Duration::hours(24));
    }

    #[test]
    fn trend_is_zero_for_empty_previous_window() {
        assert_eq!(trend_percent(5, 0), 0.0);
        assert_eq!(trend_percent(0, 0), 0.0);
    }

    #[test]
    fn trend_is_rounded_percentage_change() {
        assert_eq!(trend_percent(75, 50), 50.0);
        assert_eq!(trend_percent(50, 75), -33.33);
        assert_eq!(trend_percent(0, 4), -100.0);
    }

    #[test]
    fn truncation_appends_ellipsis_only_when_needed() {
        assert_eq!(truncate_for_display("short", 10), "short");
        let long = "x".repeat(120);
        let shown = truncate_for_display(&long, 100);
        assert_eq!(shown.chars().count(), 103);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn hourly_buckets_truncate_sort_and_count_levels() {
        let base = Utc.with_ymd_and_hms(2025, 5, 4, 10, 15, 0).unwrap();
        let rows = vec![
            (base, LogLevel::Info),
            (base + Duration::minutes(20), LogLevel::Error),
            (base + Duration::minutes(40), LogLevel::Critical),
            (base - Duration::hours(2), LogLevel::Info),
        ];
        let buckets = bucket_hourly(&rows);
        assert_eq!(buckets.len(), 2);
        // ascending order
        assert!(buckets[0].hour < buckets[1].hour);
        assert_eq!(buckets[1].count, 3);
        assert_eq!(buckets[1].errors, 1);
        assert_eq!(buckets[1].critical, 1);
        assert_eq!(buckets[1].hour.to_rfc3339(), "2025-05-04T10:00:00+00:00");
    }

    #[test]
    fn long_windows_keep_only_the_most_recent_24_buckets() {
        let base = Utc.with_ymd_and_hms(2025, 5, 1, 0, 30, 0).unwrap();
        let rows: Vec<(DateTime<Utc>, LogLevel)> = (0..40)
            .map(|h| (base + Duration::hours(h), LogLevel::Info))
            .collect();
        let buckets = bucket_hourly(&rows);
        assert_eq!(buckets.len(), 40);

        let capped = cap_buckets(buckets.clone(), Timeframe::Week.duration().num_hours());
        assert_eq!(capped.len(), 24);
        assert_eq!(capped.last().unwrap().hour, buckets.last().unwrap().hour);

        // a 24h window is never capped
        let short = cap_buckets(buckets, Timeframe::Day.duration().num_hours());
        assert_eq!(short.len(), 40);
    }

    #[test]
    fn threat_buckets_split_levels_and_skip_benign_rows() {
        let base = Utc.with_ymd_and_hms(2025, 5, 4, 9, 5, 0).unwrap();
        let rows = vec![
            (base, LogLevel::Warning),
            (base + Duration::minutes(1), LogLevel::Error),
            (base + Duration::minutes(2), LogLevel::Critical),
            (base + Duration::minutes(3), LogLevel::Info),
        ];
        let buckets = bucket_threat_hours(&rows);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].warning, 1);
        assert_eq!(buckets[0].error, 1);
        assert_eq!(buckets[0].critical, 1);
        assert_eq!(buckets[0].total, 3);
    }

    #[test]
    fn keyword_counts_sort_descending_and_omit_zeroes() {
        let patterns = ThreatPatterns::new();
        let messages = vec![
            "Malware signature match",
            "malware quarantined",
            "Suspicious outbound connection blocked",
            "routine heartbeat",
        ];
        let counts = patterns.keyword_counts(&messages);
        assert_eq!(counts[0].keyword, "malware");
        assert_eq!(counts[0].count, 2);
        assert!(counts.iter().all(|c| c.count > 0));
        assert!(!counts.iter().any(|c| c.keyword == "ransomware"));
        // "blocked" and "suspicious" each matched once
        assert!(counts.iter().any(|c| c.keyword == "blocked" && c.count == 1));
        assert!(counts.iter().any(|c| c.keyword == "suspicious" && c.count == 1));
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let patterns = ThreatPatterns::new();
        assert!(patterns.matches_any("KEYLOGGER detected in memory"));
        assert!(patterns.matches_any("Trojan.Gen.2 removed"));
        assert!(!patterns.matches_any("scan completed without findings"));
    }
}
