use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use sync_checkpoint::{CheckpointStore, ReplicationPosition};
use sync_config::Config;
use sync_router::EventRouter;
use sync_sink::IndexSink;
use sync_source::RowSource;

use crate::delay::DelayObserver;
use crate::replication::ReplicationStream;
use crate::shutdown;

const SNAPSHOT_BATCH: i64 = 1000;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Owns the lifecycle of spec.md §4.6: decide snapshot vs. incremental,
/// run whichever applies, then hand off to the replication stream until a
/// shutdown signal arrives.
pub struct Synchronizer {
    source: Arc<RowSource>,
    sink: Arc<IndexSink>,
    checkpoint: CheckpointStore,
    pool: mysql_async::Pool,
    server_id: u32,
    configured_start: ReplicationPosition,
}

impl Synchronizer {
    pub async fn build(config: &Config) -> anyhow::Result<Self> {
        let assembly = crate::assembly::assemble(config).await?;
        let configured_start = ReplicationPosition {
            log_name: config.binlog.start_bin_log_name.clone(),
            log_offset: config.binlog.start_bin_log_position,
        };
        Ok(Self {
            source: Arc::new(assembly.source),
            sink: Arc::new(assembly.sink),
            checkpoint: assembly.checkpoint,
            pool: assembly.pool,
            server_id: assembly.server_id,
            configured_start,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let (closed_tx, closed_rx) = watch::channel(false);
        shutdown::watch_for_signals(closed_tx.clone());

        let count = self.sink.count().await;
        let start = self.resolve_initial_position(count).await?;

        if count == 0 {
            info!("index is empty, running full snapshot before starting from {start:?}");
            self.run_snapshot(closed_rx.clone()).await?;
        } else {
            info!(?start, "resuming from a previously synced position");
        }

        if *closed_rx.borrow() {
            return Ok(());
        }

        self.run_incremental(start, closed_tx, closed_rx).await
    }

    /// Decide the position incremental replication should start from
    /// (spec.md §4.6 step 2): the checkpoint file if the index is non-empty
    /// and one exists, else the configured start, else the oldest retained
    /// log at its first event.
    async fn resolve_initial_position(&self, count: u64) -> anyhow::Result<ReplicationPosition> {
        if count > 0 {
            if let Some(position) = self.checkpoint.read() {
                return Ok(position);
            }
        }
        if !self.configured_start.log_name.is_empty() {
            return Ok(self.configured_start.clone());
        }
        let log_name = self.source.oldest_log_name().await?;
        Ok(ReplicationPosition { log_name, log_offset: 4 })
    }

    /// Full-table snapshot, spec.md §4.6 step 3: walk `[min_id, max_id]` in
    /// closed 1000-row windows, bulk-inserting each batch. A batch that
    /// fails to sink is logged and skipped, not retried — the incremental
    /// stream that follows will correct any row it subsequently touches.
    async fn run_snapshot(&self, mut closed: watch::Receiver<bool>) -> anyhow::Result<()> {
        let (min_id, max_id) = self.source.id_range().await?;
        let mut start = min_id;
        while start <= max_id {
            if *closed.borrow_and_update() {
                warn!("shutdown requested mid-snapshot, stopping early");
                return Ok(());
            }
            let end = (start + SNAPSHOT_BATCH - 1).min(max_id);
            let rows = self.source.full_range(start, end).await?;
            let docs: Vec<_> = rows.iter().map(|row| self.source.rule().document_for(row)).collect();
            if let Err(e) = self.sink.bulk_insert(&docs).await {
                warn!(error = %e, start, end, "snapshot batch failed to sink, continuing");
            }
            start = end + 1;
        }
        info!(min_id, max_id, "snapshot complete");
        Ok(())
    }

    /// Incremental tailing, spec.md §4.6 step 4: open the replication
    /// stream at `start`, route every decoded event, and run the
    /// checkpoint-writer and delay-observer tasks alongside until shutdown.
    async fn run_incremental(self, start: ReplicationPosition, closed_tx: watch::Sender<bool>, mut closed_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut stream = ReplicationStream::open(&self.pool, self.server_id, self.source.rule(), start.clone()).await?;
        let router = EventRouter::new(self.source.clone(), self.sink.clone());

        let (position_tx, position_rx) = watch::channel(start);
        let (event_time_tx, event_time_rx) = watch::channel(0u32);
        let checkpoint = self.checkpoint;
        let checkpoint_task = tokio::spawn({
            let position_rx = position_rx.clone();
            let closed_rx = closed_rx.clone();
            async move { checkpoint.run(position_rx, closed_rx).await }
        });
        let delay_observer = DelayObserver::new();
        let delay_task = tokio::spawn({
            let closed_rx = closed_rx.clone();
            async move { delay_observer.run(event_time_rx, closed_rx).await }
        });

        let outcome = loop {
            tokio::select! {
                event = stream.next_event() => {
                    match event {
                        Some(event) => {
                            router.handle(&event).await;
                            let _ = position_tx.send(stream.position());
                            let _ = event_time_tx.send(stream.last_event_unix_time());
                        }
                        None => break Err(anyhow::anyhow!("binlog stream closed unexpectedly")),
                    }
                }
                _ = closed_rx.changed() => {
                    if *closed_rx.borrow() {
                        break Ok(());
                    }
                }
            }
        };

        let _ = closed_tx.send(true);
        let _ = checkpoint_task.await;
        let _ = delay_task.await;

        if outcome.is_ok() {
            info!(grace_seconds = SHUTDOWN_GRACE.as_secs(), "shutting down gracefully");
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        }
        outcome
    }
}
