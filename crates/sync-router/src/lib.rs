mod backend;
mod event;

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, error};

pub use backend::{IndexSinkLike, RowSourceLike};
pub use event::RowEvent;
use event::column_index;

use sync_schema::{Document, Rule, Value};
use sync_sink::SinkError;
use sync_source::SourceError;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Consumes decoded row events and drives the fixed routing table of
/// spec.md §4.4.
pub struct EventRouter<S, K> {
    source: S,
    sink: K,
}

impl<S, K> EventRouter<S, K>
where
    S: RowSourceLike,
    K: IndexSinkLike,
{
    pub fn new(source: S, sink: K) -> Self {
        Self { source, sink }
    }

    /// Route one event. Per spec.md §7, a failure here is logged and
    /// swallowed — the next event touching the same row recovers the state.
    pub async fn handle(&self, event: &RowEvent) {
        if let Err(e) = self.route(event).await {
            error!(error = %e, table = event.table_name(), "event routing failed, will recover on a later event");
        }
    }

    async fn route(&self, event: &RowEvent) -> Result<(), RouterError> {
        let rule = self.source.rule();
        if event.table_name() == rule.main.table_name {
            self.route_main(event, rule).await
        } else if rule.joins.contains_key(event.table_name()) {
            self.route_join(event, rule).await
        } else {
            debug!(table = event.table_name(), "event for an untracked table, ignoring");
            Ok(())
        }
    }

    async fn route_main(&self, event: &RowEvent, rule: &Rule) -> Result<(), RouterError> {
        let Some(idx) = column_index(event.columns(), &rule.main.primary_column_name) else {
            return Ok(());
        };
        match event {
            RowEvent::Insert { rows, .. } => {
                let ids = dedup_ids(rows.iter().filter_map(|row| row.get(idx).and_then(Value::as_i64)));
                if ids.is_empty() {
                    return Ok(());
                }
                let docs = self.refresh(&ids).await?;
                self.sink.bulk_insert(&docs).await?;
            }
            RowEvent::Update { rows, .. } => {
                let ids = dedup_ids(rows.iter().filter_map(|(_, after)| after.get(idx).and_then(Value::as_i64)));
                if ids.is_empty() {
                    return Ok(());
                }
                for doc in self.refresh(&ids).await? {
                    self.sink.upsert(&doc).await?;
                }
            }
            RowEvent::Delete { rows, .. } => {
                for row in rows {
                    if let Some(id) = row.get(idx) {
                        self.sink.delete(id).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Join-table events never delete the main document: a join row going
    /// away only changes the main document's fields, so every action here
    /// resolves to a refresh + upsert (spec.md §4.4 Rationale).
    async fn route_join(&self, event: &RowEvent, rule: &Rule) -> Result<(), RouterError> {
        let join = rule.joins.get(event.table_name()).expect("caller checked membership");
        let Some(idx) = column_index(event.columns(), &join.local_join_column_name) else {
            return Ok(());
        };

        let mut seen_keys = HashSet::new();
        let mut keys = Vec::new();
        let mut collect = |v: &Value| {
            if seen_keys.insert(v.clone()) {
                keys.push(v.clone());
            }
        };
        match event {
            RowEvent::Insert { rows, .. } | RowEvent::Delete { rows, .. } => {
                for row in rows {
                    if let Some(v) = row.get(idx) {
                        collect(v);
                    }
                }
            }
            RowEvent::Update { rows, .. } => {
                for (before, after) in rows {
                    if let Some(v) = before.get(idx) {
                        collect(v);
                    }
                    if let Some(v) = after.get(idx) {
                        collect(v);
                    }
                }
            }
        }

        let mut seen_ids = HashSet::new();
        let mut ids = Vec::new();
        for key in &keys {
            for id in self.source.main_ids_for_join_key(event.table_name(), key).await? {
                if seen_ids.insert(id) {
                    ids.push(id);
                }
            }
        }
        if ids.is_empty() {
            return Ok(());
        }
        for doc in self.refresh(&ids).await? {
            self.sink.upsert(&doc).await?;
        }
        Ok(())
    }

    async fn refresh(&self, ids: &[i64]) -> Result<Vec<Document>, RouterError> {
        let rows = self.source.full_by_ids(ids).await?;
        Ok(rows.iter().map(|row| self.source.rule().document_for(row)).collect())
    }
}

fn dedup_ids(ids: impl Iterator<Item = i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use indexmap::IndexMap;
    use sync_schema::{Column, ColumnType, JoinTable, MainTable, Row};

    fn rule_with_join() -> Rule {
        let mut main_cols = IndexMap::new();
        main_cols.insert(
            "id".to_string(),
            Column {
                name: "id".into(),
                table_name: "users".into(),
                ty: ColumnType::BigInt,
                mapping_name: "id".into(),
            },
        );
        main_cols.insert(
            "addr_id".to_string(),
            Column {
                name: "addr_id".into(),
                table_name: "users".into(),
                ty: ColumnType::BigInt,
                mapping_name: "addr_id".into(),
            },
        );
        let main = MainTable {
            table_name: "users".into(),
            columns: main_cols,
            primary_column_name: "id".into(),
        };

        let mut join_cols = IndexMap::new();
        join_cols.insert(
            "city".to_string(),
            Column {
                name: "city".into(),
                table_name: "addresses".into(),
                ty: ColumnType::Varchar,
                mapping_name: "city".into(),
            },
        );
        let join = JoinTable {
            table_name: "addresses".into(),
            columns: join_cols,
            local_join_column_name: "id".into(),
            main_side_column_name: "addr_id".into(),
        };
        let mut joins = IndexMap::new();
        joins.insert("addresses".to_string(), join);
        Rule::new(main, joins).unwrap()
    }

    struct FakeSource {
        rule: Rule,
        join_key_to_ids: HashMap<String, Vec<i64>>,
        rows_by_id: HashMap<i64, Row>,
        full_by_ids_calls: Mutex<Vec<Vec<i64>>>,
        join_lookup_calls: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl RowSourceLike for FakeSource {
        fn rule(&self) -> &Rule {
            &self.rule
        }

        async fn full_by_ids(&self, ids: &[i64]) -> Result<Vec<Row>, SourceError> {
            self.full_by_ids_calls.lock().unwrap().push(ids.to_vec());
            Ok(ids.iter().filter_map(|id| self.rows_by_id.get(id).cloned()).collect())
        }

        async fn main_ids_for_join_key(&self, _join_table_name: &str, join_key: &Value) -> Result<Vec<i64>, SourceError> {
            self.join_lookup_calls.lock().unwrap().push(join_key.clone());
            Ok(self.join_key_to_ids.get(&join_key.to_string()).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct FakeSink {
        upserted: Mutex<Vec<Document>>,
        bulk_inserted: Mutex<Vec<Document>>,
        deleted: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl IndexSinkLike for FakeSink {
        async fn upsert(&self, doc: &Document) -> Result<(), SinkError> {
            self.upserted.lock().unwrap().push(doc.clone());
            Ok(())
        }

        async fn bulk_insert(&self, docs: &[Document]) -> Result<(), SinkError> {
            self.bulk_inserted.lock().unwrap().extend(docs.iter().cloned());
            Ok(())
        }

        async fn delete(&self, id: &Value) -> Result<(), SinkError> {
            self.deleted.lock().unwrap().push(id.clone());
            Ok(())
        }
    }

    fn row(id: i64, addr_id: i64, city: &str) -> Row {
        let mut row = Row::new();
        row.insert("users.id", Value::I64(id));
        row.insert("users.addr_id", Value::I64(addr_id));
        row.insert("addresses.city", Value::Str(city.to_string()));
        row
    }

    #[tokio::test]
    async fn main_table_insert_bulk_inserts_refreshed_docs() {
        let rule = rule_with_join();
        let mut rows_by_id = HashMap::new();
        rows_by_id.insert(3, row(3, 10, "X"));
        let source = FakeSource {
            rule,
            join_key_to_ids: HashMap::new(),
            rows_by_id,
            full_by_ids_calls: Mutex::new(vec![]),
            join_lookup_calls: Mutex::new(vec![]),
        };
        let sink = FakeSink::default();
        let router = EventRouter::new(source, sink);

        let event = RowEvent::Insert {
            table_name: "users".to_string(),
            columns: vec!["id".to_string(), "addr_id".to_string()],
            rows: vec![vec![Value::I64(3), Value::I64(10)]],
        };
        router.handle(&event).await;

        let inserted = router.sink.bulk_inserted.lock().unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].id, Value::I64(3));
    }

    #[tokio::test]
    async fn main_table_delete_deletes_by_id_without_refresh() {
        let rule = rule_with_join();
        let source = FakeSource {
            rule,
            join_key_to_ids: HashMap::new(),
            rows_by_id: HashMap::new(),
            full_by_ids_calls: Mutex::new(vec![]),
            join_lookup_calls: Mutex::new(vec![]),
        };
        let sink = FakeSink::default();
        let router = EventRouter::new(source, sink);

        let event = RowEvent::Delete {
            table_name: "users".to_string(),
            columns: vec!["id".to_string(), "addr_id".to_string()],
            rows: vec![vec![Value::I64(2), Value::I64(10)]],
        };
        router.handle(&event).await;

        assert_eq!(*router.sink.deleted.lock().unwrap(), vec![Value::I64(2)]);
        assert!(router.source.full_by_ids_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn join_table_update_with_unchanged_key_resolves_once() {
        let rule = rule_with_join();
        let mut join_key_to_ids = HashMap::new();
        join_key_to_ids.insert("10".to_string(), vec![1_i64]);
        let mut rows_by_id = HashMap::new();
        rows_by_id.insert(1, row(1, 10, "Y"));
        let source = FakeSource {
            rule,
            join_key_to_ids,
            rows_by_id,
            full_by_ids_calls: Mutex::new(vec![]),
            join_lookup_calls: Mutex::new(vec![]),
        };
        let sink = FakeSink::default();
        let router = EventRouter::new(source, sink);

        // before and after both carry join key 10 -> exactly one resolution.
        let event = RowEvent::Update {
            table_name: "addresses".to_string(),
            columns: vec!["id".to_string(), "city".to_string()],
            rows: vec![(vec![Value::I64(10), Value::Str("X".into())], vec![Value::I64(10), Value::Str("Y".into())])],
        };
        router.handle(&event).await;

        assert_eq!(router.source.join_lookup_calls.lock().unwrap().len(), 1);
        let upserted = router.sink.upserted.lock().unwrap();
        assert_eq!(upserted.len(), 1);
        assert_eq!(upserted[0].fields.get("city"), Some(&Value::Str("Y".to_string())));
    }

    #[tokio::test]
    async fn join_table_update_with_changed_key_resolves_both_keys() {
        let rule = rule_with_join();
        let mut join_key_to_ids = HashMap::new();
        join_key_to_ids.insert("10".to_string(), vec![2_i64]);
        join_key_to_ids.insert("11".to_string(), vec![1_i64]);
        let mut rows_by_id = HashMap::new();
        rows_by_id.insert(1, row(1, 11, "Y"));
        rows_by_id.insert(2, row(2, 10, "X"));
        let source = FakeSource {
            rule,
            join_key_to_ids,
            rows_by_id,
            full_by_ids_calls: Mutex::new(vec![]),
            join_lookup_calls: Mutex::new(vec![]),
        };
        let sink = FakeSink::default();
        let router = EventRouter::new(source, sink);

        let event = RowEvent::Update {
            table_name: "addresses".to_string(),
            columns: vec!["id".to_string(), "city".to_string()],
            rows: vec![(vec![Value::I64(10), Value::Str("X".into())], vec![Value::I64(11), Value::Str("X".into())])],
        };
        router.handle(&event).await;

        assert_eq!(router.source.join_lookup_calls.lock().unwrap().len(), 2);
        assert_eq!(router.sink.upserted.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn event_for_untracked_table_is_ignored() {
        let rule = rule_with_join();
        let source = FakeSource {
            rule,
            join_key_to_ids: HashMap::new(),
            rows_by_id: HashMap::new(),
            full_by_ids_calls: Mutex::new(vec![]),
            join_lookup_calls: Mutex::new(vec![]),
        };
        let sink = FakeSink::default();
        let router = EventRouter::new(source, sink);

        let event = RowEvent::Insert {
            table_name: "unrelated_table".to_string(),
            columns: vec!["id".to_string()],
            rows: vec![vec![Value::I64(1)]],
        };
        router.handle(&event).await;

        assert!(router.sink.bulk_inserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_column_in_event_is_skipped_without_error() {
        let rule = rule_with_join();
        let source = FakeSource {
            rule,
            join_key_to_ids: HashMap::new(),
            rows_by_id: HashMap::new(),
            full_by_ids_calls: Mutex::new(vec![]),
            join_lookup_calls: Mutex::new(vec![]),
        };
        let sink = FakeSink::default();
        let router = EventRouter::new(source, sink);

        // schema drift: event carries no `id` column at all.
        let event = RowEvent::Insert {
            table_name: "users".to_string(),
            columns: vec!["addr_id".to_string()],
            rows: vec![vec![Value::I64(10)]],
        };
        router.handle(&event).await;

        assert!(router.sink.bulk_inserted.lock().unwrap().is_empty());
    }
}
