use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("main table is empty (MAX/MIN id resolved to zero) — check the configuration")]
    EmptyTable,
    #[error("join table `{0}` is not part of this rule")]
    UnknownJoinTable(String),
    #[error("main-side column for join table `{0}` not found on the main table")]
    UnknownMainSideColumn(String),
    #[error("server reports no binary logs")]
    NoBinaryLogs,
    #[error("{context}: column `{column}` failed to decode as a non-null value")]
    Decode { context: &'static str, column: String },
    #[error(transparent)]
    Mysql(#[from] mysql_async::Error),
}
