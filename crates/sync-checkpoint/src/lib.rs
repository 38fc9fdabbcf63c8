use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `{ log_name, log_offset }`, monotone with respect to the source's
/// logical progress (spec.md §3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationPosition {
    pub log_name: String,
    pub log_offset: u64,
}

impl ReplicationPosition {
    pub fn is_empty(&self) -> bool {
        self.log_name.is_empty() && self.log_offset == 0
    }

    fn parse(line: &str) -> Option<Self> {
        let (name, offset) = line.trim_end_matches(['\n', '\r']).split_once('\t')?;
        let offset = offset.parse().ok()?;
        Some(Self {
            log_name: name.to_string(),
            log_offset: offset,
        })
    }

    fn render(&self) -> String {
        format!("{}\t{}", self.log_name, self.log_offset)
    }
}

/// CRC-32/IEEE of `host+port+index+type`, used to name the checkpoint file
/// so multiple pipelines sharing a directory are safe by construction
/// (spec.md §4.5, §8 invariant 5).
pub fn destination_hash(host: &str, port: u16, index: &str, doc_type: &str) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(host.as_bytes());
    hasher.update(port.to_string().as_bytes());
    hasher.update(index.as_bytes());
    hasher.update(doc_type.as_bytes());
    hasher.finalize()
}

/// A single-line file holding the last-persisted [`ReplicationPosition`],
/// read once at startup and rewritten on a fixed period while the engine
/// runs (spec.md §4.5).
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(status_dir: &Path, host: &str, port: u16, index: &str, doc_type: &str) -> Self {
        let hash = destination_hash(host, port, index, doc_type);
        Self {
            path: status_dir.join(format!("{hash}.status")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the position if the file exists and parses; `None` otherwise
    /// (spec.md §4.5: the Synchronizer resolves the starting position from
    /// configuration in that case).
    pub fn read(&self) -> Option<ReplicationPosition> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        ReplicationPosition::parse(content.trim())
    }

    /// Truncate and rewrite the file with `position`. Write errors are
    /// logged, never fatal (spec.md §7).
    pub fn write(&self, position: &ReplicationPosition) -> Result<(), CheckpointError> {
        std::fs::write(&self.path, position.render()).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Run the once-a-second writer (activity "C" of spec.md §5) until
    /// `closed` is signalled. `current` is sampled, not driven — the caller
    /// updates it from the replication stream's synced position.
    pub async fn run(&self, current: watch::Receiver<ReplicationPosition>, mut closed: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let position = current.borrow().clone();
                    if let Err(e) = self.write(&position) {
                        error!(error = %e, "checkpoint write failed, will retry next tick");
                    }
                }
                _ = closed.changed() => {
                    if *closed.borrow() {
                        info!(path = %self.path.display(), "checkpoint writer stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_render_round_trip() {
        let pos = ReplicationPosition {
            log_name: "binlog.000007".to_string(),
            log_offset: 4242,
        };
        let rendered = pos.render();
        assert_eq!(rendered, "binlog.000007\t4242");
        assert_eq!(ReplicationPosition::parse(&rendered), Some(pos));
    }

    #[test]
    fn hash_is_a_pure_function_of_destination() {
        let a = destination_hash("localhost", 9200, "users", "_doc");
        let b = destination_hash("localhost", 9200, "users", "_doc");
        let c = destination_hash("localhost", 9200, "addresses", "_doc");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn malformed_checkpoint_line_does_not_parse() {
        assert_eq!(ReplicationPosition::parse("not-a-valid-line"), None);
        assert_eq!(ReplicationPosition::parse("binlog.000001\tnotanumber"), None);
    }
}
