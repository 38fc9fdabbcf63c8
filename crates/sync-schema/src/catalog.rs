use std::collections::HashMap;

use indexmap::IndexMap;
use mysql_async::params;
use mysql_async::prelude::Queryable;
use thiserror::Error;
use tracing::info;

use crate::column::{Column, ColumnType};
use crate::rule::{JoinTable, MainTable, Rule, RuleError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{table}.{column} type unsupported")]
    UnsupportedColumn { table: String, column: String },
    #[error("mysql error while describing `{table}`: {source}")]
    Mysql {
        table: String,
        #[source]
        source: mysql_async::Error,
    },
    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// What the user configured for the main table, before column types are known.
#[derive(Debug, Clone)]
pub struct MainTableSpec {
    pub table_name: String,
    pub primary_column_name: String,
    /// Empty means "auto-populate every discovered column".
    pub mapping: HashMap<String, String>,
}

/// What the user configured for one join table, before column types are known.
#[derive(Debug, Clone)]
pub struct JoinTableSpec {
    pub table_name: String,
    pub local_join_column_name: String,
    pub main_side_column_name: String,
    pub mapping: HashMap<String, String>,
}

/// Discovers and classifies column metadata for the main table and every
/// join table, then builds the immutable [`Rule`] the rest of the pipeline
/// runs against. See spec.md §4.1.
pub struct SchemaCatalog;

impl SchemaCatalog {
    pub async fn prepare(
        pool: &mysql_async::Pool,
        main: MainTableSpec,
        joins: Vec<JoinTableSpec>,
    ) -> Result<Rule, CatalogError> {
        let main_columns = Self::discover(pool, &main.table_name, &main.mapping).await?;
        info!(
            table = %main.table_name,
            columns = ?main_columns.values().map(|c| format!("{}:{:?}", c.name, c.ty)).collect::<Vec<_>>(),
            "discovered main table columns"
        );
        let main_table = MainTable {
            table_name: main.table_name,
            columns: main_columns,
            primary_column_name: main.primary_column_name,
        };

        let mut join_tables = IndexMap::new();
        for join in joins {
            let columns = Self::discover(pool, &join.table_name, &join.mapping).await?;
            info!(
                table = %join.table_name,
                columns = ?columns.values().map(|c| format!("{}:{:?}", c.name, c.ty)).collect::<Vec<_>>(),
                "discovered join table columns"
            );
            join_tables.insert(
                join.table_name.clone(),
                JoinTable {
                    table_name: join.table_name,
                    columns,
                    local_join_column_name: join.local_join_column_name,
                    main_side_column_name: join.main_side_column_name,
                },
            );
        }

        Ok(Rule::new(main_table, join_tables)?)
    }

    /// Query `(column_name, declared type)` for one table and classify each,
    /// applying spec.md §4.1's auto-populate/refine split.
    async fn discover(
        pool: &mysql_async::Pool,
        table_name: &str,
        mapping: &HashMap<String, String>,
    ) -> Result<IndexMap<String, Column>, CatalogError> {
        let mut conn = pool.get_conn().await.map_err(|source| CatalogError::Mysql {
            table: table_name.to_string(),
            source,
        })?;
        let rows: Vec<(String, String)> = conn
            .exec(
                "SELECT column_name, column_type FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND table_name = :table \
                 ORDER BY ordinal_position",
                params! { "table" => table_name },
            )
            .await
            .map_err(|source| CatalogError::Mysql {
                table: table_name.to_string(),
                source,
            })?;

        let auto_populate = mapping.is_empty();
        let mut columns = IndexMap::new();

        if auto_populate {
            for (name, declared) in rows {
                let ty = ColumnType::classify(&declared);
                columns.insert(
                    name.clone(),
                    Column {
                        mapping_name: name.clone(),
                        table_name: table_name.to_string(),
                        name,
                        ty,
                    },
                );
            }
        } else {
            let discovered: HashMap<String, String> = rows.into_iter().collect();
            for (name, mapping_name) in mapping {
                let declared = discovered.get(name);
                let ty = declared.map(|d| ColumnType::classify(d)).unwrap_or(ColumnType::Unknown);
                if ty == ColumnType::Unknown {
                    return Err(CatalogError::UnsupportedColumn {
                        table: table_name.to_string(),
                        column: name.clone(),
                    });
                }
                columns.insert(
                    name.clone(),
                    Column {
                        name: name.clone(),
                        table_name: table_name.to_string(),
                        ty,
                        mapping_name: mapping_name.clone(),
                    },
                );
            }
        }

        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prefixes() {
        assert_eq!(ColumnType::classify("int(11)"), ColumnType::Int);
        assert_eq!(ColumnType::classify("bigint(20) unsigned"), ColumnType::UnsignedBigInt);
        assert_eq!(ColumnType::classify("bigint(20)"), ColumnType::BigInt);
        assert_eq!(ColumnType::classify("smallint(6) unsigned"), ColumnType::UnsignedSmallInt);
        assert_eq!(ColumnType::classify("smallint(6)"), ColumnType::SmallInt);
        assert_eq!(ColumnType::classify("varchar(255)"), ColumnType::Varchar);
        assert_eq!(ColumnType::classify("mediumtext"), ColumnType::Text);
        assert_eq!(ColumnType::classify("double"), ColumnType::Unknown);
    }
}
