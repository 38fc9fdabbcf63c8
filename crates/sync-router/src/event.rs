use sync_schema::Value;

/// One decoded row event off the replication stream, in the shape spec.md
/// §4.4 requires: an action, the table it was raised on, the event's own
/// ordered column vector, and the affected row(s). Decoding the raw binlog
/// frame into this shape is out of scope (spec.md §1); `sync-daemon` is
/// responsible for the translation.
pub enum RowEvent {
    Insert {
        table_name: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Update {
        table_name: String,
        columns: Vec<String>,
        /// One (before, after) pair per logical update.
        rows: Vec<(Vec<Value>, Vec<Value>)>,
    },
    Delete {
        table_name: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
}

impl RowEvent {
    pub fn table_name(&self) -> &str {
        match self {
            RowEvent::Insert { table_name, .. } => table_name,
            RowEvent::Update { table_name, .. } => table_name,
            RowEvent::Delete { table_name, .. } => table_name,
        }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            RowEvent::Insert { columns, .. } => columns,
            RowEvent::Update { columns, .. } => columns,
            RowEvent::Delete { columns, .. } => columns,
        }
    }
}

pub(crate) fn column_index(columns: &[String], name: &str) -> Option<usize> {
    columns.iter().position(|c| c == name)
}
