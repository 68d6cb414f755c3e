use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::{client, log_entry};
use crate::error::ApiError;

pub const DEFAULT_PAGE_SIZE: u64 = 100;
pub const MAX_PAGE_SIZE: u64 = 1000;

/// Exact-match filters, combined with AND; absent filters impose nothing.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub level: Option<String>,
    pub client_id: Option<String>,
    pub component: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PageParams {
    pub page: u64,
    pub limit: u64,
}

impl PageParams {
    /// Clamps caller input: pages are 1-based, the limit is capped so a
    /// single request can never pull an unbounded result set.
    pub fn normalized(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSnapshot {
    pub hostname: String,
    pub version: String,
    pub os: String,
}

/// One stored entry as returned to dashboards. The row id crosses the wire
/// as a decimal string.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogView {
    pub id: String,
    pub entry_key: Uuid,
    pub client_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub logger: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub client: Option<OwnerSnapshot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_count: u64,
    pub limit: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub logs: Vec<LogView>,
    pub pagination: PaginationMeta,
}

fn apply_filter(filter: &LogFilter) -> sea_orm::Select<log_entry::Entity> {
    let mut query = log_entry::Entity::find();
    if let Some(level) = &filter.level {
        query = query.filter(log_entry::Column::Level.eq(level));
    }
    if let Some(client_id) = &filter.client_id {
        query = query.filter(log_entry::Column::ClientId.eq(client_id));
    }
    if let Some(component) = &filter.component {
        query = query.filter(log_entry::Column::Component.eq(component));
    }
    query
}

/// Filtered, newest-first page of log entries. The id tiebreak keeps the
/// order total, so concatenating pages yields every row exactly once. An
/// unknown clientId is an empty page, not an error.
pub async fn query_logs(
    db: &DatabaseConnection,
    filter: &LogFilter,
    page: PageParams,
) -> Result<LogPage, ApiError> {
    let total_count = apply_filter(filter).count(db).await?;

    let rows = apply_filter(filter)
        .order_by_desc(log_entry::Column::Timestamp)
        .order_by_desc(log_entry::Column::Id)
        .offset(page.skip())
        .limit(page.limit)
        .find_also_related(client::Entity)
        .all(db)
        .await?;

    let logs = rows
        .into_iter()
        .map(|(entry, owner)| LogView {
            id: entry.id.to_string(),
            entry_key: entry.entry_key,
            client_id: entry.client_id,
            timestamp: entry.timestamp,
            level: entry.level,
            logger: entry.logger,
            message: entry.message,
            module: entry.module,
            function: entry.function,
            line: entry.line,
            component: entry.component,
            metadata: entry.metadata,
            client: owner.map(|c| OwnerSnapshot {
                hostname: c.hostname,
                version: c.version,
                os: c.os,
            }),
        })
        .collect();

    let total_pages = total_count.div_ceil(page.limit);

    Ok(LogPage {
        logs,
        pagination: PaginationMeta {
            current_page: page.page,
            total_pages,
            total_count,
            limit: page.limit,
            has_next_page: page.page < total_pages,
            has_prev_page: page.page > 1,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_params_clamp_out_of_range_input() {
        let p = PageParams::normalized(Some(0), Some(5000));
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, MAX_PAGE_SIZE);

        let defaults = PageParams::normalized(None, None);
        assert_eq!(defaults.page, 1);
        assert_eq!(defaults.limit, DEFAULT_PAGE_SIZE);

        assert_eq!(PageParams::normalized(Some(3), Some(40)).skip(), 80);
    }
}
