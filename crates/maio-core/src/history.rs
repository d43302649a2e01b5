//! History ledger: read access to scheduler execution records.
//!
//! Pages are keyed on `(created_at, id)`. Records appended while a client is
//! paging sort after every cursor already handed out, so no page shifts.

use crate::config::HistoryConfig;
use crate::error::{MaioError, Result};
use crate::models::{Cursor, Page, PageInfo, PageRequest, SchedulerHistory};
use crate::store::{self, Store};

#[derive(Clone)]
pub struct HistoryLedger {
    store: Store,
}

impl HistoryLedger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn get(&self, id: i64) -> Result<SchedulerHistory> {
        self.store.read(|conn| {
            store::history::get(conn, id)?.ok_or_else(|| MaioError::not_found("history record", id))
        })
    }

    /// One page of a scheduler's history, oldest first.
    pub fn list(&self, scheduler_id: i64, request: &PageRequest) -> Result<Page<SchedulerHistory>> {
        let limit = match request.limit {
            Some(0) => return Err(MaioError::validation("limit", "must be at least 1")),
            Some(limit) => limit.min(HistoryConfig::MAX_PAGE_SIZE),
            None => HistoryConfig::DEFAULT_PAGE_SIZE,
        };
        let after = request.after.as_deref().map(Cursor::decode).transpose()?;

        let mut items = self.store.read(|conn| {
            if store::schedulers::get(conn, scheduler_id)?.is_none() {
                return Err(MaioError::not_found("scheduler", scheduler_id));
            }
            store::history::page_after(conn, scheduler_id, after.as_ref(), limit + 1)
        })?;

        let has_next_page = items.len() > limit;
        items.truncate(limit);
        let end_cursor = items.last().map(|last| {
            Cursor {
                created_at: last.created_at,
                id: last.id,
            }
            .encode()
        });

        Ok(Page {
            items,
            page_info: PageInfo {
                has_next_page,
                end_cursor,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;
    use crate::store::time;

    fn ledger_with_records(count: usize) -> (HistoryLedger, Store, i64) {
        let store = Store::open_in_memory().unwrap();
        let scheduler_id = store
            .write(|tx| {
                let now = time::now();
                tx.execute_batch(&format!(
                    "INSERT INTO models (name, datasource_id, output_tag_json, created_by, created_at, updated_at)
                     VALUES ('M1', 1, '{{\"label\":\"y\"}}', 1, '{now}', '{now}');
                     INSERT INTO model_versions (model_id, name, version, status, version_type, created_at, updated_at)
                     VALUES (1, 'v1', 1, 'DEPLOYED', 'ANOMALY_DETECTION', '{now}', '{now}');
                     INSERT INTO schedulers (version_id, datasource_id, start_time, interval_seconds, created_by, created_at)
                     VALUES (1, 1, '{now}', 60, 1, '{now}');",
                    now = time::to_sql(&now)
                ))?;
                for _ in 0..count {
                    store::history::append(tx, 1, TaskStatus::Pending, 1, &now)?;
                }
                Ok(1)
            })
            .unwrap();
        (HistoryLedger::new(store.clone()), store, scheduler_id)
    }

    #[test]
    fn test_pages_cover_everything_once() {
        let (ledger, _store, scheduler_id) = ledger_with_records(7);
        let mut seen = Vec::new();
        let mut request = PageRequest {
            after: None,
            limit: Some(3),
        };
        loop {
            let page = ledger.list(scheduler_id, &request).unwrap();
            seen.extend(page.items.iter().map(|r| r.counter));
            if !page.page_info.has_next_page {
                break;
            }
            request.after = page.page_info.end_cursor;
        }
        assert_eq!(seen, (1..=7).collect::<Vec<_>>());
    }

    #[test]
    fn test_appends_do_not_shift_pages() {
        let (ledger, store, scheduler_id) = ledger_with_records(4);
        let first = ledger
            .list(
                scheduler_id,
                &PageRequest {
                    after: None,
                    limit: Some(2),
                },
            )
            .unwrap();

        store
            .write(|tx| store::history::append(tx, scheduler_id, TaskStatus::Pending, 1, &time::now()))
            .unwrap();

        let second = ledger
            .list(
                scheduler_id,
                &PageRequest {
                    after: first.page_info.end_cursor,
                    limit: Some(2),
                },
            )
            .unwrap();
        let counters: Vec<i64> = second.items.iter().map(|r| r.counter).collect();
        assert_eq!(counters, vec![3, 4]);
        assert!(second.page_info.has_next_page);
    }

    #[test]
    fn test_empty_and_invalid_requests() {
        let (ledger, _store, scheduler_id) = ledger_with_records(0);
        let page = ledger.list(scheduler_id, &PageRequest::default()).unwrap();
        assert!(page.items.is_empty());
        assert!(!page.page_info.has_next_page);
        assert!(page.page_info.end_cursor.is_none());

        let err = ledger
            .list(
                scheduler_id,
                &PageRequest {
                    after: None,
                    limit: Some(0),
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = ledger.list(404, &PageRequest::default()).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
