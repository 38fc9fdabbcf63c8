use indexmap::IndexMap;
use std::collections::HashMap;

use crate::column::Column;
use crate::row::{Document, Row};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("main table primary column `{0}` not found among its own columns")]
    MissingPrimaryColumn(String),
    #[error("main table primary column `{table}.{column}` must be an integral type for the snapshot range scan")]
    NonIntegralPrimaryColumn { table: String, column: String },
    #[error("join table `{0}` shares its name with the main table")]
    JoinSharesMainName(String),
    #[error("join table `{join}` references unknown main column `{main_side}`")]
    UnknownMainSideColumn { join: String, main_side: String },
}

/// The table that owns document identity (spec.md §3).
#[derive(Debug, Clone)]
pub struct MainTable {
    pub table_name: String,
    pub columns: IndexMap<String, Column>,
    pub primary_column_name: String,
}

impl MainTable {
    pub fn primary_column(&self) -> Option<&Column> {
        self.columns.get(&self.primary_column_name)
    }
}

/// A table contributing additional fields, joined via
/// `main.<main_side_column_name> = join.<local_join_column_name>` (spec.md §3).
#[derive(Debug, Clone)]
pub struct JoinTable {
    pub table_name: String,
    pub columns: IndexMap<String, Column>,
    pub local_join_column_name: String,
    pub main_side_column_name: String,
}

/// The whole schema-driven mapping between one main table and its join
/// tables. Exactly one [`MainTable`] exists per process.
#[derive(Debug, Clone)]
pub struct Rule {
    pub main: MainTable,
    pub joins: IndexMap<String, JoinTable>,
}

impl Rule {
    pub fn new(main: MainTable, joins: IndexMap<String, JoinTable>) -> Result<Self, RuleError> {
        let primary = main
            .columns
            .get(&main.primary_column_name)
            .ok_or_else(|| RuleError::MissingPrimaryColumn(main.primary_column_name.clone()))?;
        if !primary.ty.is_integral() {
            return Err(RuleError::NonIntegralPrimaryColumn {
                table: main.table_name.clone(),
                column: primary.name.clone(),
            });
        }
        for join in joins.values() {
            if join.table_name == main.table_name {
                return Err(RuleError::JoinSharesMainName(join.table_name.clone()));
            }
            if !main.columns.contains_key(&join.main_side_column_name) {
                return Err(RuleError::UnknownMainSideColumn {
                    join: join.table_name.clone(),
                    main_side: join.main_side_column_name.clone(),
                });
            }
        }
        Ok(Self { main, joins })
    }

    /// Every `Column` across the main table and all join tables, in the
    /// fixed order used to build the SELECT list (main first, then joins in
    /// map order). This order is what `sync-source` relies on to keep
    /// result-row positions aligned across process lifetime.
    pub fn all_columns(&self) -> Vec<&Column> {
        let mut cols: Vec<&Column> = self.main.columns.values().collect();
        for join in self.joins.values() {
            cols.extend(join.columns.values());
        }
        cols
    }

    /// Build the [`Document`] for a denormalized [`Row`], per spec.md §3.
    pub fn document_for(&self, row: &Row) -> Document {
        let mut fields = HashMap::new();
        for col in self.all_columns() {
            let value = row.get(&col.qualified_name()).cloned().unwrap_or(crate::Value::Null);
            fields.insert(col.mapping_name.clone(), value);
        }
        let primary = self
            .main
            .primary_column()
            .expect("Rule::new guarantees the primary column exists");
        let id = row.get(&primary.qualified_name()).cloned().unwrap_or(crate::Value::Null);
        Document { id, fields }
    }
}
