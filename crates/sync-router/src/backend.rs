use std::sync::Arc;

use async_trait::async_trait;

use sync_schema::{Document, Row, Rule, Value};
use sync_sink::{IndexSink, SinkError};
use sync_source::{RowSource, SourceError};

/// The subset of [`sync_source::RowSource`] the router depends on,
/// abstracted so tests can exercise the routing table against an in-memory
/// fake (SPEC_FULL.md "Test tooling").
#[async_trait]
pub trait RowSourceLike: Send + Sync {
    fn rule(&self) -> &Rule;
    async fn full_by_ids(&self, ids: &[i64]) -> Result<Vec<Row>, SourceError>;
    async fn main_ids_for_join_key(&self, join_table_name: &str, join_key: &Value) -> Result<Vec<i64>, SourceError>;
}

#[async_trait]
impl RowSourceLike for RowSource {
    fn rule(&self) -> &Rule {
        RowSource::rule(self)
    }

    async fn full_by_ids(&self, ids: &[i64]) -> Result<Vec<Row>, SourceError> {
        RowSource::full_by_ids(self, ids).await
    }

    async fn main_ids_for_join_key(&self, join_table_name: &str, join_key: &Value) -> Result<Vec<i64>, SourceError> {
        RowSource::main_ids_for_join_key(self, join_table_name, join_key).await
    }
}

/// Lets `sync-daemon` share one `RowSource`/`IndexSink` between the
/// `EventRouter` and the background checkpoint/delay tasks.
#[async_trait]
impl<T: RowSourceLike> RowSourceLike for Arc<T> {
    fn rule(&self) -> &Rule {
        T::rule(self)
    }

    async fn full_by_ids(&self, ids: &[i64]) -> Result<Vec<Row>, SourceError> {
        T::full_by_ids(self, ids).await
    }

    async fn main_ids_for_join_key(&self, join_table_name: &str, join_key: &Value) -> Result<Vec<i64>, SourceError> {
        T::main_ids_for_join_key(self, join_table_name, join_key).await
    }
}

/// The subset of [`sync_sink::IndexSink`] the router depends on.
#[async_trait]
pub trait IndexSinkLike: Send + Sync {
    async fn upsert(&self, doc: &Document) -> Result<(), SinkError>;
    async fn bulk_insert(&self, docs: &[Document]) -> Result<(), SinkError>;
    async fn delete(&self, id: &Value) -> Result<(), SinkError>;
}

#[async_trait]
impl IndexSinkLike for IndexSink {
    async fn upsert(&self, doc: &Document) -> Result<(), SinkError> {
        IndexSink::upsert(self, doc).await
    }

    async fn bulk_insert(&self, docs: &[Document]) -> Result<(), SinkError> {
        IndexSink::bulk_insert(self, docs).await
    }

    async fn delete(&self, id: &Value) -> Result<(), SinkError> {
        IndexSink::delete(self, id).await
    }
}

#[async_trait]
impl<T: IndexSinkLike> IndexSinkLike for Arc<T> {
    async fn upsert(&self, doc: &Document) -> Result<(), SinkError> {
        T::upsert(self, doc).await
    }

    async fn bulk_insert(&self, docs: &[Document]) -> Result<(), SinkError> {
        T::bulk_insert(self, docs).await
    }

    async fn delete(&self, id: &Value) -> Result<(), SinkError> {
        T::delete(self, id).await
    }
}
