pub mod error;

use std::time::Duration;

use mysql_async::prelude::Queryable;
use mysql_async::{Opts, OptsBuilder, Pool};
use once_cell::sync::OnceCell;
use tracing::warn;

pub use error::SourceError;
use sync_schema::{ColumnType, Row, Rule, Value};

const CONNECT_RETRIES: u32 = 3;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Connection parameters for the RDBMS source, per spec.md §6 `mysql`.
#[derive(Debug, Clone)]
pub struct MysqlOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub read_timeout: Duration,
}

/// Create the connection pool, retrying a bounded number of times on a
/// transient initial-connection failure (supplemented from
/// `original_source/`; see SPEC_FULL.md).
pub async fn connect(opts: &MysqlOptions) -> Result<Pool, SourceError> {
    let mysql_opts: Opts = OptsBuilder::default()
        .ip_or_hostname(opts.host.clone())
        .tcp_port(opts.port)
        .user(Some(opts.user.clone()))
        .pass(Some(opts.password.clone()))
        .db_name(Some(opts.database.clone()))
        .read_timeout(Some(opts.read_timeout))
        .into();
    let pool = Pool::new(mysql_opts);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match pool.get_conn().await {
            Ok(_) => return Ok(pool),
            Err(e) if attempt < CONNECT_RETRIES => {
                warn!(attempt, error = %e, "initial mysql connection failed, retrying");
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(e) => return Err(SourceError::Mysql(e)),
        }
    }
}

struct QueryBase {
    select_from_join: String,
}

/// Issues the two read shapes of spec.md §4.2 against a join-expanded row
/// set, and resolves join-key -> main-id lookups.
pub struct RowSource {
    pool: Pool,
    rule: Rule,
    base: OnceCell<QueryBase>,
}

impl RowSource {
    pub fn new(pool: Pool, rule: Rule) -> Self {
        Self {
            pool,
            rule,
            base: OnceCell::new(),
        }
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    fn base(&self) -> &QueryBase {
        self.base.get_or_init(|| {
            let select = self
                .rule
                .all_columns()
                .iter()
                .map(|c| format!("`{}`.`{}`", c.table_name, c.name))
                .collect::<Vec<_>>()
                .join(", ");
            let mut sql = format!("SELECT {} FROM `{}`", select, self.rule.main.table_name);
            for join in self.rule.joins.values() {
                sql.push_str(&format!(
                    " LEFT JOIN `{}` ON `{}`.`{}` = `{}`.`{}`",
                    join.table_name,
                    join.table_name,
                    join.local_join_column_name,
                    self.rule.main.table_name,
                    join.main_side_column_name,
                ));
            }
            QueryBase { select_from_join: sql }
        })
    }

    /// `SELECT MAX(pk), MIN(pk) FROM main`. Fatal (§4.2) if either bound is
    /// zero, taken to mean an empty table the pipeline was not meant to run
    /// against.
    pub async fn id_range(&self) -> Result<(i64, i64), SourceError> {
        let sql = format!(
            "SELECT MAX(`{pk}`), MIN(`{pk}`) FROM `{table}`",
            pk = self.rule.main.primary_column_name,
            table = self.rule.main.table_name,
        );
        let mut conn = self.pool.get_conn().await?;
        let row: Option<(Option<i64>, Option<i64>)> = conn.query_first(sql).await?;
        let (max_id, min_id) = row.unwrap_or((None, None));
        let (max_id, min_id) = (max_id.unwrap_or(0), min_id.unwrap_or(0));
        if max_id == 0 || min_id == 0 {
            return Err(SourceError::EmptyTable);
        }
        Ok((min_id, max_id))
    }

    /// Closed-interval range scan, spec.md §4.2 "Range template".
    pub async fn full_range(&self, start: i64, end: i64) -> Result<Vec<Row>, SourceError> {
        let sql = format!(
            "{} WHERE `{}`.`{}` BETWEEN {} AND {}",
            self.base().select_from_join,
            self.rule.main.table_name,
            self.rule.main.primary_column_name,
            start,
            end,
        );
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<mysql_async::Row> = conn.query(sql).await?;
        rows.into_iter().map(|r| self.decode(r)).collect()
    }

    /// Id-list fetch, spec.md §4.2 "Id-list template". The primary column is
    /// guaranteed integral by `Rule::new`, so ids are rendered as bare
    /// integer literals rather than bound parameters.
    pub async fn full_by_ids(&self, ids: &[i64]) -> Result<Vec<Row>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let list = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "{} WHERE `{}`.`{}` IN ({})",
            self.base().select_from_join,
            self.rule.main.table_name,
            self.rule.main.primary_column_name,
            list,
        );
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<mysql_async::Row> = conn.query(sql).await?;
        rows.into_iter().map(|r| self.decode(r)).collect()
    }

    /// `SELECT main.primary FROM main WHERE main.<main_side_column> = <join_key>`,
    /// spec.md §4.2. The literal is quoted iff the main-side column is a
    /// string type.
    pub async fn main_ids_for_join_key(&self, join_table_name: &str, join_key: &Value) -> Result<Vec<i64>, SourceError> {
        let join = self
            .rule
            .joins
            .get(join_table_name)
            .ok_or_else(|| SourceError::UnknownJoinTable(join_table_name.to_string()))?;
        let main_side = self
            .rule
            .main
            .columns
            .get(&join.main_side_column_name)
            .ok_or_else(|| SourceError::UnknownMainSideColumn(join.main_side_column_name.clone()))?;
        let literal = join_key.to_sql_literal(main_side.ty.is_string());
        let sql = format!(
            "SELECT `{table}`.`{pk}` FROM `{table}` WHERE `{table}`.`{col}` = {lit}",
            table = self.rule.main.table_name,
            pk = self.rule.main.primary_column_name,
            col = main_side.name,
            lit = literal,
        );
        let mut conn = self.pool.get_conn().await?;
        let ids: Vec<i64> = conn.query(sql).await?;
        Ok(ids)
    }

    /// `SHOW BINARY LOGS`, returning the first (oldest) log name.
    pub async fn oldest_log_name(&self) -> Result<String, SourceError> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<(String, u64)> = conn.query("SHOW BINARY LOGS").await?;
        rows.into_iter().next().map(|(name, _)| name).ok_or(SourceError::NoBinaryLogs)
    }

    /// Decode one result row into a [`Row`], in the fixed `all_columns()`
    /// order. A NULL-conversion failure is swallowed to [`Value::Null`]; any
    /// other conversion failure is fatal (spec.md §7).
    fn decode(&self, mut sql_row: mysql_async::Row) -> Result<Row, SourceError> {
        let mut row = Row::new();
        for (idx, col) in self.rule.all_columns().into_iter().enumerate() {
            let value = match col.ty {
                ColumnType::Int | ColumnType::BigInt | ColumnType::TinyInt | ColumnType::SmallInt => {
                    decode_cell::<i64>(&mut sql_row, idx, col)?.map(Value::I64).unwrap_or(Value::Null)
                }
                ColumnType::UnsignedSmallInt | ColumnType::UnsignedBigInt => {
                    decode_cell::<u64>(&mut sql_row, idx, col)?.map(Value::U64).unwrap_or(Value::Null)
                }
                ColumnType::Varchar | ColumnType::Text => {
                    decode_cell::<String>(&mut sql_row, idx, col)?.map(Value::Str).unwrap_or(Value::Null)
                }
                ColumnType::Unknown => Value::Null,
            };
            row.insert(col.qualified_name(), value);
        }
        Ok(row)
    }
}

/// Scan one cell, returning `Ok(None)` for a NULL database value (which is
/// tolerated, per spec.md §4.2) and `Err` for any other conversion failure
/// (which is fatal).
fn decode_cell<T>(sql_row: &mut mysql_async::Row, idx: usize, col: &sync_schema::Column) -> Result<Option<T>, SourceError>
where
    T: mysql_async::prelude::FromValue,
{
    match sql_row.take_opt::<T, usize>(idx) {
        Some(Ok(v)) => Ok(Some(v)),
        Some(Err(e)) if e.0 == mysql_async::Value::NULL => Ok(None),
        Some(Err(_)) => Err(SourceError::Decode {
            context: "row decode",
            column: col.qualified_name(),
        }),
        None => Ok(None),
    }
}
