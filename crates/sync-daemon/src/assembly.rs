use std::time::Duration;

use sync_checkpoint::CheckpointStore;
use sync_config::Config;
use sync_schema::{JoinTableSpec, MainTableSpec, SchemaCatalog};
use sync_sink::IndexSink;
use sync_source::{MysqlOptions, RowSource};

/// The wiring spec.md §4.1-§4.3 and §4.5 describe, assembled once at startup
/// from a validated [`Config`].
pub struct Assembly {
    pub source: RowSource,
    pub sink: IndexSink,
    pub checkpoint: CheckpointStore,
    /// Kept alongside `source` so the replication stream adapter can open
    /// its own dedicated connection for `COM_BINLOG_DUMP`, independent of
    /// the pooled connections `RowSource` uses for snapshot/refresh queries.
    pub pool: mysql_async::Pool,
    pub server_id: u32,
}

/// Per SPEC_FULL.md, chosen once at startup uniformly at random from the
/// range conventionally reserved for transient replication clients, rather
/// than read from configuration.
const SERVER_ID_RANGE: std::ops::RangeInclusive<u32> = 1001..=2000;

pub async fn assemble(config: &Config) -> anyhow::Result<Assembly> {
    let server_id = rand::random_range(SERVER_ID_RANGE);
    let opts = MysqlOptions {
        host: config.mysql.host.clone(),
        port: config.mysql.port,
        user: config.mysql.user.clone(),
        password: config.mysql.password.clone(),
        database: config.mysql.database.clone(),
        read_timeout: Duration::from_millis(config.mysql.read_timeout_ms),
    };
    let pool = sync_source::connect(&opts).await?;

    let main_name = config.main_table_name()?.to_string();
    let main_conf = &config.rule.tables[&main_name];
    let main_spec = MainTableSpec {
        table_name: main_name.clone(),
        primary_column_name: main_conf
            .main_coll
            .clone()
            .ok_or_else(|| anyhow::anyhow!("table `{main_name}` has main = true but no main_coll"))?,
        mapping: main_conf.mapping.clone(),
    };

    let mut join_specs = Vec::new();
    for name in config.join_table_names() {
        let table = &config.rule.tables[name];
        join_specs.push(JoinTableSpec {
            table_name: name.to_string(),
            local_join_column_name: table
                .join_coll
                .clone()
                .ok_or_else(|| anyhow::anyhow!("join table `{name}` has no join_coll"))?,
            main_side_column_name: table
                .join_main_coll
                .clone()
                .ok_or_else(|| anyhow::anyhow!("join table `{name}` has no join_main_coll"))?,
            mapping: table.mapping.clone(),
        });
    }

    let rule = SchemaCatalog::prepare(&pool, main_spec, join_specs).await?;
    let source = RowSource::new(pool.clone(), rule);

    let sink = IndexSink::new(&config.es.host, config.es.port, &config.es.index, &config.es.doc_type);

    let checkpoint = CheckpointStore::new(
        &config.binlog.bin_log_status_file_path,
        &config.es.host,
        config.es.port,
        &config.es.index,
        &config.es.doc_type,
    );

    Ok(Assembly {
        source,
        sink,
        checkpoint,
        pool,
        server_id,
    })
}
